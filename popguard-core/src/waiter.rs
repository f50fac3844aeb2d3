//! ブレークポイントイベントの待機
//!
//! イベントキューを短い間隔でポーリングし、待機中のブレークポイント要求に
//! 一致するイベントが届くか、期限が切れるまでブロックします。
//! ポーリングは専用のウォッチャースレッドで行い、結果は単一メッセージの
//! チャネルでメインスレッドへ返されます。中断は協調的なフラグで伝えます。

use crate::{ProcessGone, Result, SessionError};
use popguard_target::{Event, EventSource, Location, RequestId, ThreadRef};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// イベントキューのポーリング間隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 一致したブレークポイントイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHit {
    pub thread: ThreadRef,
    pub location: Location,
}

/// イベント待機器
pub struct EventWaiter {
    source: Box<dyn EventSource>,
    cancel: Arc<AtomicBool>,
}

impl EventWaiter {
    pub fn new(source: Box<dyn EventSource>) -> Self {
        Self {
            source,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 協調的な中断フラグを取得する
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// `request` のブレークポイントイベントを最大 `deadline` だけ待つ
    ///
    /// 一度の取り出しで得たイベントはすべて順に調べます。
    /// 切断・終了イベントは同じバッチ内の後続イベントを見ずに即座に失敗します。
    pub fn await_breakpoint(&mut self, request: RequestId, deadline: Duration) -> Result<BreakpointHit> {
        // 表現できない期限は無期限として扱う
        let until = Instant::now().checked_add(deadline);

        while !self.cancel.load(Ordering::Acquire) {
            let quantum = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        error!("no expected breakpoint event within {:?}", deadline);
                        return Err(SessionError::Timeout(deadline));
                    }
                    POLL_INTERVAL.min(until - now)
                }
                None => POLL_INTERVAL,
            };

            let Some(events) = self.source.remove(quantum)? else {
                continue;
            };
            debug!("received {} event(s)", events.len());

            for event in events {
                match event {
                    Event::BreakpointHit {
                        request: id,
                        thread,
                        location,
                    } if id == request => {
                        info!(
                            "expected breakpoint event occurred in {} @ {}",
                            thread, location
                        );
                        return Ok(BreakpointHit { thread, location });
                    }
                    Event::Disconnected => {
                        error!("unexpected disconnect event");
                        return Err(SessionError::ProcessGone(ProcessGone::Disconnected));
                    }
                    Event::Terminated => {
                        error!("unexpected death event");
                        return Err(SessionError::ProcessGone(ProcessGone::Terminated));
                    }
                    other => debug!("following event occurred: {}", other),
                }
            }
        }

        debug!("breakpoint wait cancelled");
        Err(SessionError::Cancelled)
    }
}

/// ウォッチャースレッドへのハンドル
pub struct Watcher {
    result: mpsc::Receiver<Result<BreakpointHit>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// ウォッチャースレッドを開始する
    ///
    /// スレッドがポーリングを開始する直前まで待ってから返るため、
    /// 呼び出し側はこの後に GO を送信すればイベントを取りこぼしません。
    pub fn spawn(mut waiter: EventWaiter, request: RequestId, deadline: Duration) -> Result<Self> {
        let cancel = waiter.cancel_flag();
        let (started_tx, started_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("breakpoint-watcher".to_string())
            .spawn(move || {
                let _ = started_tx.send(());
                let result = waiter.await_breakpoint(request, deadline);
                let _ = result_tx.send(result);
            })
            .map_err(|e| SessionError::Target(e.into()))?;

        started_rx.recv().map_err(|_| SessionError::WatcherLost)?;

        Ok(Self {
            result: result_rx,
            cancel,
            handle: Some(handle),
        })
    }

    /// ウォッチャーの結果を最大 `deadline` だけ待つ
    ///
    /// 期限切れの場合は中断フラグを立ててタイムアウトを返します。
    /// ウォッチャーは1ポーリング間隔以内にフラグを観測して終了します。
    pub fn join(mut self, deadline: Duration) -> Result<BreakpointHit> {
        match self.result.recv_timeout(deadline) {
            Ok(result) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                self.cancel.store(true, Ordering::Release);
                Err(SessionError::Timeout(deadline))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::WatcherLost),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}
