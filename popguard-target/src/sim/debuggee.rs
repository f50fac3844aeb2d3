//! 被デバッグ側スレッド
//!
//! READY を送信した後、コントローラからの GO / QUIT に従って動作します。

use super::{GoBehavior, Shared, SimConfig, STATUS_CHANNEL_CLOSED};
use crate::{CommandChannel, Event, EventSet, Result, UnixChannel};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// プロセスが異常終了したときの終了ステータス
const STATUS_DIED: i32 = 1;

pub(super) fn spawn(shared: Arc<Shared>, channel: UnixChannel, config: SimConfig) -> Result<()> {
    thread::Builder::new()
        .name("sim-debuggee".to_string())
        .spawn(move || run(&shared, channel, &config))?;
    Ok(())
}

fn run(shared: &Shared, mut channel: UnixChannel, config: &SimConfig) {
    if let Err(e) = channel.send_line("READY") {
        warn!("debuggee failed to send READY: {}", e);
        shared.finish(STATUS_CHANNEL_CLOSED);
        return;
    }

    loop {
        let line = match channel.read_line() {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                debug!("debuggee command channel closed");
                shared.finish(STATUS_CHANNEL_CLOSED);
                return;
            }
        };
        shared.state().received.push(line.clone());

        match line.trim().to_ascii_uppercase().as_str() {
            "GO" => {
                if !on_go(shared, config.on_go) {
                    return;
                }
            }
            "QUIT" => {
                let status = shared
                    .state()
                    .quit_status(&config.field_name, config.exit_status);
                debug!("debuggee exiting with status {}", status);
                shared.finish(status);
                return;
            }
            other => warn!("debuggee ignored unknown command: {}", other),
        }
    }
}

/// GO を処理する。プロセスが終了した場合は false を返す
fn on_go(shared: &Shared, behavior: GoBehavior) -> bool {
    shared.state().start_running();
    shared.push_events(EventSet::single(Event::Other(
        "ThreadStartEvent".to_string(),
    )));

    match behavior {
        GoBehavior::ReachBreakpoint => {
            let hit = shared.state().reach_stop_line();
            match hit {
                Some((request, thread, location)) => {
                    debug!("debuggee suspended at {} by request {}", location, request);
                    shared.push_events(EventSet::single(Event::BreakpointHit {
                        request,
                        thread,
                        location,
                    }));
                }
                None => debug!("debuggee passed the stop line without an enabled request"),
            }
            true
        }
        GoBehavior::NeverReach => true,
        GoBehavior::Die => {
            shared.push_events(EventSet::single(Event::Terminated));
            shared.finish(STATUS_DIED);
            false
        }
        GoBehavior::Disconnect => {
            shared.state().disconnect();
            shared.push_events(EventSet::single(Event::Disconnected));
            true
        }
    }
}
