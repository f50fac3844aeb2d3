//! セッション制御
//!
//! フェーズは `Init → Handshake → SuspendedAtBreakpoint → Validated →
//! ForcedExit → Closed` の順に一方向にだけ進みます。致命的エラーが起きた場合は
//! 途中のフェーズを飛ばして後始末へ進みますが、後戻りはしません。
//! 強制終了とクローズはどの経路でもちょうど一度だけ実行されます。

use crate::{
    BreakpointCoordinator, Command, CrossThreadValidator, EventWaiter, Result, SessionConfig,
    SessionError, StackInspector, Verdict, Watcher,
};
use popguard_target::{
    CommandChannel, DebugTarget, FieldRef, FrameHandle, ObjectHandle, RequestScope, ThreadRef,
    Value,
};
use std::mem;
use tracing::{debug, error, info, warn};

/// 成功時の終了コード
pub const EXIT_PASSED: i32 = 0;

/// 失敗時の終了コード
pub const EXIT_FAILED: i32 = 2;

/// セッションのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Handshake,
    SuspendedAtBreakpoint,
    Validated,
    ForcedExit,
    Closed,
}

/// セッション全体の合否
///
/// 成功から失敗へ一方向にだけ変化します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResult {
    Passed,
    Failed,
}

impl SessionResult {
    /// 失敗に格下げする
    pub fn downgrade(&mut self) {
        *self = SessionResult::Failed;
    }

    pub fn is_passed(&self) -> bool {
        *self == SessionResult::Passed
    }

    /// プロセスの終了コード
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionResult::Passed => EXIT_PASSED,
            SessionResult::Failed => EXIT_FAILED,
        }
    }
}

/// セッションの最終報告
#[derive(Debug)]
pub struct SessionReport {
    pub result: SessionResult,
    /// 検証フェーズに到達した場合の検証結果
    pub verdict: Option<Verdict>,
    /// 検査を中断させた致命的エラー
    pub error: Option<SessionError>,
    /// 被デバッグ側の終了ステータス
    pub debuggee_status: Option<i32>,
    /// 通過したフェーズ（順序どおり）
    pub phases: Vec<Phase>,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        self.result.exit_code()
    }

    /// ブレークポイント待機のタイムアウトで中断したか
    pub fn timed_out(&self) -> bool {
        self.error.as_ref().is_some_and(SessionError::is_timeout)
    }
}

/// 一回分の検査セッション
pub struct Session<T: DebugTarget, C: CommandChannel> {
    target: T,
    channel: C,
    config: SessionConfig,
    phase: Phase,
    phases: Vec<Phase>,
    result: SessionResult,
    coordinator: BreakpointCoordinator,
    /// フレームから得た、終了フラグを持つオブジェクト
    blocker: Option<ObjectHandle>,
    exit_field: Option<FieldRef>,
    verdict: Option<Verdict>,
    debuggee_status: Option<i32>,
    torn_down: bool,
}

impl<T: DebugTarget, C: CommandChannel> Session<T, C> {
    /// 起動済みのターゲットとコマンドチャネルからセッションを作成する
    pub fn new(target: T, channel: C, config: SessionConfig) -> Self {
        Self {
            target,
            channel,
            config,
            phase: Phase::Init,
            phases: vec![Phase::Init],
            result: SessionResult::Passed,
            coordinator: BreakpointCoordinator::new(),
            blocker: None,
            exit_field: None,
            verdict: None,
            debuggee_status: None,
            torn_down: false,
        }
    }

    /// 現在のフェーズ
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// セッションを最後まで実行する
    ///
    /// 検査中のエラーで途中終了しても、後始末を実行してから報告を返します。
    pub fn run(mut self) -> SessionReport {
        let error = self.run_checks().err();
        if let Some(e) = &error {
            error!("TEST FAILURE: {}", e);
            self.result.downgrade();
        }

        self.teardown();

        SessionReport {
            result: self.result,
            verdict: self.verdict.take(),
            error,
            debuggee_status: self.debuggee_status,
            phases: mem::take(&mut self.phases),
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "phase {:?} -> {:?}", self.phase, next);
        debug!("phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.phases.push(next);
    }

    fn run_checks(&mut self) -> Result<()> {
        self.config.validate()?;
        self.handshake()?;

        let main = self.resolve_thread(&self.config.main_thread)?;
        let aux = self.resolve_thread(&self.config.aux_thread)?;

        self.suspend_at_breakpoint(&main)?;

        let class = self.target.class_by_name(&self.config.position.class)?;
        let field = self
            .target
            .field_by_name(&class, &self.config.field_name)?
            .ok_or_else(|| SessionError::FieldNotFound {
                class: class.name().to_string(),
                field: self.config.field_name.clone(),
            })?;
        self.exit_field = Some(field);

        let located = StackInspector::new(&self.target).locate_frame(&aux, &self.config.local_name)?;
        self.blocker = Some(located.object);

        let location = self.target.frame_location(&located.frame)?;
        info!(
            "Trying to pop {} at {} got from {}, which is not on the call stack of {}",
            located.frame, location, aux, main
        );

        self.validate(&main, &located.frame);
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        self.advance(Phase::Handshake);
        let line = self.channel.read_line()?.ok_or(SessionError::ChannelClosed)?;
        match Command::parse(&line) {
            Some(Command::Ready) => {
                debug!("debuggee is ready");
                Ok(())
            }
            _ => Err(SessionError::UnexpectedHandshake(line)),
        }
    }

    fn resolve_thread(&self, name: &str) -> Result<ThreadRef> {
        self.target
            .thread_by_name(name)?
            .ok_or_else(|| SessionError::ThreadNotFound(name.to_string()))
    }

    /// ブレークポイントを設定し、GO を送ってイベントを待つ
    ///
    /// GO はウォッチャーがポーリングを開始した後にだけ送信します。
    /// 要求は結果にかかわらず無効化されます。
    fn suspend_at_breakpoint(&mut self, main: &ThreadRef) -> Result<()> {
        let scope = if self.config.filter_main_thread {
            RequestScope::Thread(main.clone())
        } else {
            RequestScope::Global
        };
        let request = self
            .coordinator
            .arm(&self.target, scope, &self.config.position)?;

        let wait_time = self.config.wait_time;
        info!(
            "Starting potential timed out section: waiting {:?} for breakpoint event",
            wait_time
        );

        let waiter = EventWaiter::new(self.target.event_source());
        let channel = &mut self.channel;
        let hit = Watcher::spawn(waiter, request.id, wait_time).and_then(|watcher| {
            channel.send_line(Command::Go.as_str())?;
            watcher.join(wait_time)
        });

        if let Err(e) = self.coordinator.disable(&self.target) {
            warn!("failed to disable breakpoint request {}: {}", request.id, e);
        }

        let hit = hit?;
        info!(
            "Potential timed out section successfully passed: suspended in {} @ {}",
            hit.thread, hit.location
        );
        self.advance(Phase::SuspendedAtBreakpoint);
        Ok(())
    }

    fn validate(&mut self, main: &ThreadRef, frame: &FrameHandle) {
        let verdict = CrossThreadValidator::new(&self.target).check_rejects_foreign_frame(main, frame);

        match &verdict {
            Verdict::ExpectedRejection { .. } => info!("{}", verdict),
            Verdict::UnsupportedAndCapabilityAbsent { .. } => warn!("{}", verdict),
            Verdict::UnexpectedFailure { detail, .. } => {
                error!("{}", verdict);
                error!("error detail: {}", detail);
            }
            Verdict::UnsupportedButCapabilityPresent { .. } | Verdict::NoRejectionOccurred => {
                error!("{}", verdict)
            }
        }

        if verdict.is_failure() {
            self.result.downgrade();
        }
        self.verdict = Some(verdict);
        self.advance(Phase::Validated);
    }

    /// 強制終了とクローズを一度だけ実行する
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.force_exit();
        self.close();
    }

    /// 被デバッグ側のメソッドを抜けさせるフラグを立てる（ベストエフォート）
    fn force_exit(&mut self) {
        self.advance(Phase::ForcedExit);
        match (self.blocker.take(), self.exit_field.take()) {
            (Some(object), Some(field)) => {
                if let Err(e) = self.target.set_field_value(&object, &field, Value::Boolean(true)) {
                    warn!("failed to set {} on {}: {}", field.name, object, e);
                }
            }
            _ => debug!("no blocker object located, skipping forced exit signal"),
        }
    }

    /// ターゲットを再開して QUIT を送り、終了ステータスを取り込む
    fn close(&mut self) {
        self.advance(Phase::Closed);
        info!("Final resumption of debuggee");

        if let Err(e) = self.target.resume() {
            warn!("failed to resume debuggee: {}", e);
        }
        if let Err(e) = self.channel.send_line(Command::Quit.as_str()) {
            warn!("failed to send {}: {}", Command::Quit.as_str(), e);
        }

        match self.target.wait_for_exit(self.config.exit_timeout) {
            Ok(status) => {
                self.debuggee_status = Some(status);
                if status == self.config.expected_exit_status {
                    info!("Debuggee process finished with the status: {}", status);
                } else {
                    error!("TEST FAILED: debuggee process finished with status: {}", status);
                    self.result.downgrade();
                }
            }
            Err(e) => {
                error!("TEST FAILED: debuggee process did not finish: {}", e);
                self.result.downgrade();
            }
        }
    }
}

impl<T: DebugTarget, C: CommandChannel> Drop for Session<T, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
