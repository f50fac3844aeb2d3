//! popguard CLI - コマンドラインインターフェース
//!
//! ターゲットをブレークポイントで停止させ、他スレッドのフレームを
//! ポップしようとしたときに拒否されることを検査します。

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use popguard_core::parse::parse_position;
use popguard_core::{Session, SessionConfig, SessionReport};
use popguard_target::sim::{self, GoBehavior, PopBehavior, SimConfig};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// popguard - cross-thread pop-frames checker
#[derive(Parser)]
#[command(name = "popguard")]
#[command(version)]
#[command(about = "Checks that popping a frame of another thread is rejected", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CheckCommand,
}

#[derive(Subcommand)]
enum CheckCommand {
    /// Run the check against the in-process simulated target
    Simulate {
        /// Behavior of the simulated target
        #[arg(long, value_enum, default_value_t = Scenario::Reject)]
        scenario: Scenario,

        /// Breakpoint position as CLASS:LINE
        #[arg(long = "break", default_value = "PopFramesTarget:86")]
        position: String,

        /// Minutes to wait for the breakpoint event
        #[arg(long, default_value_t = 2)]
        wait_time: u64,

        /// Thread asked to pop the frame
        #[arg(long, default_value = "Main")]
        main_thread: String,

        /// Thread the frame is taken from
        #[arg(long, default_value = "Aux")]
        aux_thread: String,

        /// Local variable identifying the frame
        #[arg(long, default_value = "findMe")]
        local: String,

        /// Boolean field that lets the debuggee leave its blocking method
        #[arg(long, default_value = "leaveMethod")]
        field: String,

        /// Restrict the breakpoint request to the main thread
        #[arg(long)]
        main_thread_only: bool,
    },
}

/// シミュレーションターゲットの振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Rejects the foreign frame as required
    Reject,
    /// Pops the foreign frame without complaint
    Accept,
    /// Reports pop-frames as unsupported and does not advertise it
    Unsupported,
    /// Reports pop-frames as unsupported while advertising it
    Inconsistent,
    /// Never reaches the breakpoint
    NoBreakpoint,
    /// Dies before reaching the breakpoint
    Die,
}

impl Scenario {
    fn apply(self, sim: &mut SimConfig) {
        match self {
            Scenario::Reject => {}
            Scenario::Accept => sim.pop_behavior = PopBehavior::Accept,
            Scenario::Unsupported => {
                sim.pop_behavior = PopBehavior::Unsupported;
                sim.can_pop_frames = false;
            }
            Scenario::Inconsistent => {
                sim.pop_behavior = PopBehavior::Unsupported;
                sim.can_pop_frames = true;
            }
            Scenario::NoBreakpoint => sim.on_go = GoBehavior::NeverReach,
            Scenario::Die => sim.on_go = GoBehavior::Die,
        }
    }
}

fn main() -> Result<ExitCode> {
    println!("popguard - cross-thread pop-frames checker");
    println!("Version {}", env!("CARGO_PKG_VERSION"));
    println!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let report = match cli.command {
        CheckCommand::Simulate {
            scenario,
            position,
            wait_time,
            main_thread,
            aux_thread,
            local,
            field,
            main_thread_only,
        } => {
            let config = SessionConfig {
                position: parse_position(&position)?,
                main_thread,
                aux_thread,
                local_name: local,
                field_name: field,
                filter_main_thread: main_thread_only,
                ..SessionConfig::default()
            }
            .with_wait_minutes(wait_time);
            run_simulation(scenario, config)?
        }
    };

    print_report(&report);
    Ok(ExitCode::from(report.exit_code() as u8))
}

/// ログ出力を初期化する（RUST_LOG が優先される）
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// シミュレーションターゲットを起動してセッションを実行する
fn run_simulation(scenario: Scenario, config: SessionConfig) -> Result<SessionReport> {
    // 被デバッグ側はセッション設定と同じ名前で構成する
    let mut sim_config = SimConfig {
        class_name: config.position.class.clone(),
        main_thread: config.main_thread.clone(),
        aux_thread: config.aux_thread.clone(),
        local_name: config.local_name.clone(),
        field_name: config.field_name.clone(),
        ..SimConfig::default()
    };
    scenario.apply(&mut sim_config);

    let mut launched = sim::launch(sim_config)?;
    launched
        .channel
        .set_read_timeout(Some(config.wait_time.max(Duration::from_secs(1))))?;

    info!("running scenario {:?} against {}", scenario, config.position);
    let report = Session::new(launched.target, launched.channel, config).run();

    if report.result.is_passed() {
        info!("scenario {:?} passed", scenario);
    } else {
        error!(
            "scenario {:?} failed (exit code {})",
            scenario,
            report.exit_code()
        );
    }
    Ok(report)
}

fn print_report(report: &SessionReport) {
    println!();
    println!("Phases: {:?}", report.phases);
    if let Some(verdict) = &report.verdict {
        println!("Verdict: {}", verdict);
    }
    if let Some(error) = &report.error {
        if report.timed_out() {
            println!("Timeout: {}", error);
        } else {
            println!("Fatal: {}", error);
        }
    }
    if let Some(status) = report.debuggee_status {
        println!("Debuggee exit status: {}", status);
    }
    println!(
        "Result: {:?} (exit code {})",
        report.result,
        report.exit_code()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate_args() {
        let cli = Cli::try_parse_from([
            "popguard",
            "simulate",
            "--scenario",
            "no-breakpoint",
            "--break",
            "Target:12",
            "--wait-time",
            "1",
        ])
        .unwrap();

        match cli.command {
            CheckCommand::Simulate {
                scenario,
                position,
                wait_time,
                ..
            } => {
                assert_eq!(scenario, Scenario::NoBreakpoint);
                assert_eq!(position, "Target:12");
                assert_eq!(wait_time, 1);
            }
        }
    }

    fn quick_config() -> SessionConfig {
        SessionConfig {
            wait_time: Duration::from_secs(1),
            exit_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_reject_scenario_passes() {
        let report = run_simulation(Scenario::Reject, quick_config()).unwrap();
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_failing_scenarios_exit_with_failure() {
        for scenario in [
            Scenario::Accept,
            Scenario::Inconsistent,
            Scenario::NoBreakpoint,
            Scenario::Die,
        ] {
            let report = run_simulation(scenario, quick_config()).unwrap();
            assert_eq!(report.exit_code(), 2, "scenario {:?}", scenario);
        }
    }

    #[test]
    fn test_main_thread_only_flag() {
        let cli = Cli::try_parse_from(["popguard", "simulate", "--main-thread-only"]).unwrap();
        let CheckCommand::Simulate {
            main_thread_only, ..
        } = cli.command;
        assert!(main_thread_only);
    }

    #[test]
    fn test_scenario_apply() {
        let mut sim = SimConfig::default();
        Scenario::Inconsistent.apply(&mut sim);
        assert_eq!(sim.pop_behavior, PopBehavior::Unsupported);
        assert!(sim.can_pop_frames);

        let mut sim = SimConfig::default();
        Scenario::Unsupported.apply(&mut sim);
        assert!(!sim.can_pop_frames);
    }
}
