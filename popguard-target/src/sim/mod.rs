//! インプロセスのシミュレーションターゲット
//!
//! 2つの名前付きスレッドを持つデバッグ対象を模倣します。
//! 補助スレッドのスタックには、フラグフィールドを持つブロッカーオブジェクトを
//! ローカル変数として保持するフレームがあり、その内側にはネイティブメソッドと
//! デバッグ情報のないメソッドのフレームが積まれています。
//! 被デバッグ側スレッドは行プロトコル（READY / GO / QUIT）で制御されます。

mod debuggee;
mod state;

use crate::{
    ClassRef, DebugTarget, EventSet, EventSource, FieldRef, FrameHandle, LocalVariable, Location,
    ObjectHandle, RequestId, RequestScope, Result, TargetError, ThreadRef, UnixChannel, Value,
};
use state::SimState;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// 被デバッグ側の正常終了ステータス（ステータス基数 95 + 成功 0）
pub const STATUS_PASSED: i32 = 95;

/// コマンドチャネルが閉じられたときの終了ステータス
pub const STATUS_CHANNEL_CLOSED: i32 = 97;

/// 補助スレッドがブロッキングメソッドから抜けられないまま QUIT を受けたときの終了ステータス
pub const STATUS_STILL_BLOCKED: i32 = 96;

/// `pop_frames` の振る舞い
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopBehavior {
    /// 他スレッドのフレームを `FrameNotOnStack` で拒否する
    RejectForeignFrame,
    /// 何も検査せずに成功する
    Accept,
    /// `Unsupported` で失敗する
    Unsupported,
    /// 任意のエラーで失敗する
    Fail(String),
}

/// GO 受信後の被デバッグ側の振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoBehavior {
    /// 停止行に到達し、有効なブレークポイントがあれば停止する
    ReachBreakpoint,
    /// 停止行に到達しない
    NeverReach,
    /// プロセスが終了する
    Die,
    /// デバッグ接続が切断される
    Disconnect,
}

/// シミュレーションターゲットの設定
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub class_name: String,
    pub stop_line: u32,
    pub main_thread: String,
    pub aux_thread: String,
    pub local_name: String,
    pub field_name: String,
    pub pop_behavior: PopBehavior,
    pub can_pop_frames: bool,
    pub on_go: GoBehavior,
    /// フィールドへの書き込みをすべて失敗させる
    pub reject_field_writes: bool,
    pub exit_status: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            class_name: "PopFramesTarget".to_string(),
            stop_line: 86,
            main_thread: "Main".to_string(),
            aux_thread: "Aux".to_string(),
            local_name: "findMe".to_string(),
            field_name: "leaveMethod".to_string(),
            pop_behavior: PopBehavior::RejectForeignFrame,
            can_pop_frames: true,
            on_go: GoBehavior::ReachBreakpoint,
            reject_field_writes: false,
            exit_status: STATUS_PASSED,
        }
    }
}

/// ターゲット状態とイベントキューの共有部分
pub(crate) struct Shared {
    state: Mutex<SimState>,
    exit_cv: Condvar,
    events: Mutex<VecDeque<EventSet>>,
    events_cv: Condvar,
}

impl Shared {
    pub(crate) fn state(&self) -> MutexGuard<'_, SimState> {
        // 保持中にパニックしても状態自体は一貫している
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn push_events(&self, set: EventSet) {
        if set.is_empty() {
            return;
        }
        let mut queue = self.events.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(set);
        self.events_cv.notify_all();
    }

    pub(crate) fn finish(&self, status: i32) {
        let mut state = self.state();
        state.exit(status);
        self.exit_cv.notify_all();
    }
}

/// 起動済みのシミュレーションターゲット
pub struct Launched {
    pub target: SimTarget,
    /// コントローラ側のコマンドチャネル
    pub channel: UnixChannel,
}

/// シミュレーションターゲットを起動する
///
/// 被デバッグ側スレッドを開始し、READY を送信した状態で返ります。
pub fn launch(config: SimConfig) -> Result<Launched> {
    let (controller_end, debuggee_end) = UnixChannel::pair()?;

    let shared = Arc::new(Shared {
        state: Mutex::new(SimState::new(&config)),
        exit_cv: Condvar::new(),
        events: Mutex::new(VecDeque::new()),
        events_cv: Condvar::new(),
    });

    debuggee::spawn(Arc::clone(&shared), debuggee_end, config.clone())?;

    Ok(Launched {
        target: SimTarget { shared, config },
        channel: controller_end,
    })
}

/// シミュレーションターゲットへの制御ハンドル
///
/// 複製したハンドルは同じターゲットを指します。
#[derive(Clone)]
pub struct SimTarget {
    shared: Arc<Shared>,
    config: SimConfig,
}

impl SimTarget {
    /// ターゲットが停止中か
    pub fn is_suspended(&self) -> bool {
        self.shared.state().suspended
    }

    /// 現在の停止エポック
    pub fn epoch(&self) -> crate::SuspendEpoch {
        self.shared.state().epoch
    }

    /// 要求が有効か
    pub fn is_request_enabled(&self, request: RequestId) -> Option<bool> {
        self.shared.state().request_enabled(request)
    }

    /// 作成されたブレークポイント要求の数
    pub fn request_count(&self) -> usize {
        self.shared.state().requests.len()
    }

    /// ブロッカーオブジェクトの終了フラグが立てられたか
    pub fn leave_flag_set(&self) -> bool {
        self.shared.state().leave_flag(&self.config.field_name)
    }

    /// `pop_frames` が呼ばれた回数
    pub fn pop_attempts(&self) -> usize {
        self.shared.state().pop_attempts
    }

    /// 被デバッグ側が受信したコマンド（受信順）
    pub fn received_commands(&self) -> Vec<String> {
        self.shared.state().received.clone()
    }

    /// GO 受信時点でブレークポイント要求が有効だったか（GO 未受信なら `None`）
    pub fn request_enabled_at_go(&self) -> Option<bool> {
        self.shared.state().enabled_at_go
    }

    /// 終了済みであれば終了ステータス
    pub fn exit_status(&self) -> Option<i32> {
        self.shared.state().exit_status
    }
}

impl DebugTarget for SimTarget {
    fn class_by_name(&self, name: &str) -> Result<ClassRef> {
        let state = self.shared.state();
        state.ensure_connected()?;
        if name == state.class_name {
            Ok(ClassRef::new(name))
        } else {
            Err(TargetError::NoSuchClass(name.to_string()))
        }
    }

    fn thread_by_name(&self, name: &str) -> Result<Option<ThreadRef>> {
        let state = self.shared.state();
        state.ensure_connected()?;
        Ok(state
            .threads
            .iter()
            .find(|t| t.name == name)
            .map(|t| ThreadRef::new(t.id, t.name.clone())))
    }

    fn all_line_locations(&self, class: &ClassRef) -> Result<Vec<Location>> {
        let state = self.shared.state();
        state.ensure_connected()?;
        if class.name() != state.class_name {
            return Err(TargetError::NoSuchClass(class.name().to_string()));
        }
        Ok(state.line_table.clone())
    }

    fn create_breakpoint_request(
        &self,
        location: &Location,
        scope: &RequestScope,
    ) -> Result<RequestId> {
        let mut state = self.shared.state();
        state.ensure_connected()?;
        Ok(state.add_request(location.clone(), scope.clone()))
    }

    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> Result<()> {
        let mut state = self.shared.state();
        state.ensure_connected()?;
        state.set_request_enabled(request, enabled)
    }

    fn event_source(&self) -> Box<dyn EventSource> {
        Box::new(SimEventSource {
            shared: Arc::clone(&self.shared),
        })
    }

    fn frames(&self, thread: &ThreadRef) -> Result<Vec<FrameHandle>> {
        let state = self.shared.state();
        state.ensure_suspended()?;
        let depth = state.thread(thread.id())?.frames.len();
        Ok((0..depth)
            .map(|d| FrameHandle::new(thread.id(), d, state.epoch))
            .collect())
    }

    fn frame_location(&self, frame: &FrameHandle) -> Result<Location> {
        let state = self.shared.state();
        Ok(state.frame(frame)?.location.clone())
    }

    fn visible_variable(&self, frame: &FrameHandle, name: &str) -> Result<Option<LocalVariable>> {
        let state = self.shared.state();
        state.frame(frame)?.visible_variable(name)
    }

    fn variable_value(&self, frame: &FrameHandle, variable: &LocalVariable) -> Result<Value> {
        let state = self.shared.state();
        let value = state.frame(frame)?.value_at(variable.slot)?;
        Ok(state.to_value(value))
    }

    fn field_by_name(&self, class: &ClassRef, name: &str) -> Result<Option<FieldRef>> {
        let state = self.shared.state();
        state.ensure_connected()?;
        Ok(state.field_by_name(class.name(), name))
    }

    fn set_field_value(&self, object: &ObjectHandle, field: &FieldRef, value: Value) -> Result<()> {
        if self.config.reject_field_writes {
            return Err(TargetError::Internal(format!(
                "write to field '{}' rejected",
                field.name
            )));
        }
        let mut state = self.shared.state();
        state.set_field_value(object, field, value)
    }

    fn pop_frames(&self, thread: &ThreadRef, frame: &FrameHandle) -> Result<()> {
        let mut state = self.shared.state();
        state.pop_frames(thread, frame, &self.config.pop_behavior)
    }

    fn can_pop_frames(&self) -> bool {
        self.config.can_pop_frames
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.shared.state();
        state.ensure_connected()?;
        state.resume();
        Ok(())
    }

    fn wait_for_exit(&self, timeout: Duration) -> Result<i32> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state();
        loop {
            if let Some(status) = state.exit_status {
                return Ok(status);
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TargetError::Timeout(timeout));
                    }
                    self.shared
                        .exit_cv
                        .wait_timeout(state, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self
                    .shared
                    .exit_cv
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

/// シミュレーションターゲットのイベントキュー
pub struct SimEventSource {
    shared: Arc<Shared>,
}

impl EventSource for SimEventSource {
    fn remove(&mut self, timeout: Duration) -> Result<Option<EventSet>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.shared.events.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(set) = queue.pop_front() {
                return Ok(Some(set));
            }
            queue = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.shared
                        .events_cv
                        .wait_timeout(queue, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self
                    .shared
                    .events_cv
                    .wait(queue)
                    .unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandChannel, Event};

    fn launch_default() -> Launched {
        launch(SimConfig::default()).unwrap()
    }

    fn suspend_at_breakpoint(launched: &mut Launched) -> RequestId {
        let target = &launched.target;
        let class = target.class_by_name("PopFramesTarget").unwrap();
        let location = target
            .all_line_locations(&class)
            .unwrap()
            .into_iter()
            .find(|l| l.line == 86)
            .unwrap();
        let request = target
            .create_breakpoint_request(&location, &RequestScope::Global)
            .unwrap();
        target.set_request_enabled(request, true).unwrap();

        let mut events = target.event_source();
        assert_eq!(launched.channel.read_line().unwrap().as_deref(), Some("READY"));
        launched.channel.send_line("GO").unwrap();

        loop {
            let set = events.remove(Duration::from_secs(5)).unwrap().unwrap();
            if set
                .iter()
                .any(|e| matches!(e, Event::BreakpointHit { request: r, .. } if *r == request))
            {
                return request;
            }
        }
    }

    #[test]
    fn test_launch_sends_ready() {
        let mut launched = launch_default();
        assert_eq!(launched.channel.read_line().unwrap().as_deref(), Some("READY"));
        assert!(!launched.target.is_suspended());
    }

    #[test]
    fn test_frames_require_suspension() {
        let launched = launch_default();
        let main = launched.target.thread_by_name("Main").unwrap().unwrap();
        assert!(matches!(
            launched.target.frames(&main),
            Err(TargetError::NotSuspended)
        ));
    }

    #[test]
    fn test_breakpoint_suspends_target() {
        let mut launched = launch_default();
        suspend_at_breakpoint(&mut launched);
        assert!(launched.target.is_suspended());

        let aux = launched.target.thread_by_name("Aux").unwrap().unwrap();
        let frames = launched.target.frames(&aux).unwrap();
        assert_eq!(frames.len(), 4);
        assert!(matches!(
            launched.target.visible_variable(&frames[0], "findMe"),
            Err(TargetError::NativeMethod(_))
        ));
        assert!(matches!(
            launched.target.visible_variable(&frames[1], "findMe"),
            Err(TargetError::AbsentInformation(_))
        ));
        assert!(launched
            .target
            .visible_variable(&frames[2], "findMe")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_foreign_frame_is_rejected() {
        let mut launched = launch_default();
        suspend_at_breakpoint(&mut launched);

        let main = launched.target.thread_by_name("Main").unwrap().unwrap();
        let aux = launched.target.thread_by_name("Aux").unwrap().unwrap();
        let frame = launched.target.frames(&aux).unwrap().remove(2);

        assert!(matches!(
            launched.target.pop_frames(&main, &frame),
            Err(TargetError::FrameNotOnStack { .. })
        ));
        assert_eq!(launched.target.pop_attempts(), 1);
    }

    #[test]
    fn test_resume_invalidates_handles() {
        let mut launched = launch_default();
        suspend_at_breakpoint(&mut launched);

        let aux = launched.target.thread_by_name("Aux").unwrap().unwrap();
        let frame = launched.target.frames(&aux).unwrap().remove(2);
        launched.target.resume().unwrap();

        assert!(matches!(
            launched.target.frame_location(&frame),
            Err(TargetError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_quit_exits_with_configured_status() {
        let mut launched = launch_default();
        assert_eq!(launched.channel.read_line().unwrap().as_deref(), Some("READY"));
        launched.channel.send_line("QUIT").unwrap();
        let status = launched
            .target
            .wait_for_exit(Duration::from_secs(5))
            .unwrap();
        assert_eq!(status, STATUS_PASSED);
        assert_eq!(launched.target.received_commands(), vec!["QUIT".to_string()]);
    }

    #[test]
    fn test_wait_for_exit_with_unbounded_timeout() {
        let mut launched = launch_default();
        assert_eq!(launched.channel.read_line().unwrap().as_deref(), Some("READY"));
        launched.channel.send_line("QUIT").unwrap();
        let status = launched.target.wait_for_exit(Duration::MAX).unwrap();
        assert_eq!(status, STATUS_PASSED);
    }

    #[test]
    fn test_event_source_with_unbounded_timeout() {
        let mut launched = launch_default();
        let mut events = launched.target.event_source();
        assert_eq!(launched.channel.read_line().unwrap().as_deref(), Some("READY"));
        launched.channel.send_line("GO").unwrap();

        let set = events.remove(Duration::MAX).unwrap().unwrap();
        assert!(matches!(set.iter().next(), Some(Event::Other(_))));
        assert_eq!(launched.target.request_enabled_at_go(), Some(false));
    }

    #[test]
    fn test_quit_while_blocked_reports_failure() {
        let mut launched = launch_default();
        suspend_at_breakpoint(&mut launched);
        launched.target.resume().unwrap();
        launched.channel.send_line("QUIT").unwrap();

        let status = launched
            .target
            .wait_for_exit(Duration::from_secs(5))
            .unwrap();
        assert_eq!(status, STATUS_STILL_BLOCKED);
        assert_eq!(launched.target.request_enabled_at_go(), Some(true));
    }

    #[test]
    fn test_rejected_field_write() {
        let mut launched = launch(SimConfig {
            reject_field_writes: true,
            ..SimConfig::default()
        })
        .unwrap();
        suspend_at_breakpoint(&mut launched);

        let target = &launched.target;
        let class = target.class_by_name("PopFramesTarget").unwrap();
        let field = target.field_by_name(&class, "leaveMethod").unwrap().unwrap();
        let object = ObjectHandle::new(100, target.epoch());
        assert!(matches!(
            target.set_field_value(&object, &field, Value::Boolean(true)),
            Err(TargetError::Internal(_))
        ));
        assert!(!target.leave_flag_set());
    }

    #[test]
    fn test_empty_event_sets_are_not_queued() {
        let launched = launch_default();
        launched.target.shared.push_events(EventSet::new(Vec::new()));
        let mut events = launched.target.event_source();
        assert!(events.remove(Duration::from_millis(50)).unwrap().is_none());
    }

    #[test]
    fn test_event_source_times_out_when_idle() {
        let launched = launch_default();
        let mut events = launched.target.event_source();
        let started = Instant::now();
        assert!(events.remove(Duration::from_millis(50)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
