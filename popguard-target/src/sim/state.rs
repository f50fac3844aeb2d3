//! シミュレーションターゲットの内部状態

use super::{PopBehavior, SimConfig, STATUS_STILL_BLOCKED};
use crate::{
    FieldRef, FrameHandle, LocalVariable, Location, ObjectHandle, ObjectId, RequestId,
    RequestScope, Result, SuspendEpoch, TargetError, ThreadId, ThreadRef, Value,
};
use std::collections::HashMap;

const MAIN_THREAD_ID: ThreadId = 1;
const AUX_THREAD_ID: ThreadId = 2;
const BLOCKER_OBJECT_ID: ObjectId = 100;

/// フレームのメソッド種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Managed,
    NoDebugInfo,
    Native,
}

/// 状態内部で保持する値（オブジェクトはIDのみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimValue {
    Null,
    Boolean(bool),
    Int(i64),
    Object(ObjectId),
}

impl SimValue {
    fn kind(&self) -> &'static str {
        match self {
            SimValue::Null => "null",
            SimValue::Boolean(_) => "boolean",
            SimValue::Int(_) => "int",
            SimValue::Object(_) => "object",
        }
    }
}

pub(crate) struct SimFrame {
    pub(crate) location: Location,
    kind: FrameKind,
    locals: Vec<(LocalVariable, SimValue)>,
}

impl SimFrame {
    fn new(location: Location, kind: FrameKind) -> Self {
        Self {
            location,
            kind,
            locals: Vec::new(),
        }
    }

    fn with_local(mut self, name: &str, type_name: &str, value: SimValue) -> Self {
        let slot = self.locals.len();
        self.locals.push((
            LocalVariable {
                name: name.to_string(),
                type_name: type_name.to_string(),
                slot,
            },
            value,
        ));
        self
    }

    fn qualified_method(&self) -> String {
        format!("{}.{}", self.location.class, self.location.method)
    }

    pub(crate) fn visible_variable(&self, name: &str) -> Result<Option<LocalVariable>> {
        match self.kind {
            FrameKind::Native => Err(TargetError::NativeMethod(self.qualified_method())),
            FrameKind::NoDebugInfo => Err(TargetError::AbsentInformation(self.qualified_method())),
            FrameKind::Managed => Ok(self
                .locals
                .iter()
                .find(|(var, _)| var.name == name)
                .map(|(var, _)| var.clone())),
        }
    }

    pub(crate) fn value_at(&self, slot: usize) -> Result<SimValue> {
        self.locals
            .get(slot)
            .map(|(_, value)| *value)
            .ok_or_else(|| TargetError::Protocol(format!("no local variable in slot {}", slot)))
    }
}

pub(crate) struct SimThread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    /// 最内フレームが先頭
    pub(crate) frames: Vec<SimFrame>,
}

struct SimObject {
    fields: HashMap<String, SimValue>,
}

pub(crate) struct SimRequest {
    pub(crate) id: RequestId,
    pub(crate) location: Location,
    pub(crate) scope: RequestScope,
    pub(crate) enabled: bool,
}

pub(crate) struct SimState {
    pub(crate) class_name: String,
    pub(crate) line_table: Vec<Location>,
    pub(crate) threads: Vec<SimThread>,
    objects: HashMap<ObjectId, SimObject>,
    pub(crate) requests: Vec<SimRequest>,
    next_request: RequestId,
    pub(crate) epoch: SuspendEpoch,
    pub(crate) suspended: bool,
    connected: bool,
    pub(crate) exit_status: Option<i32>,
    pub(crate) pop_attempts: usize,
    pub(crate) received: Vec<String>,
    /// GO 受信時点で有効な要求があったか
    pub(crate) enabled_at_go: Option<bool>,
    /// 補助スレッドがブロッキングメソッドに入っているか
    aux_blocked: bool,
}

impl SimState {
    pub(crate) fn new(config: &SimConfig) -> Self {
        let class = config.class_name.as_str();
        let at = |method: &str, line: u32| Location::new(class, method, line);

        let mut line_table = vec![at("run", 55), at("run", 57), at("main", 70), at("main", 71)];
        line_table.push(at("stopHere", config.stop_line));
        line_table.push(at("stopHere", config.stop_line.saturating_add(1)));

        let main = SimThread {
            id: MAIN_THREAD_ID,
            name: config.main_thread.clone(),
            frames: vec![
                SimFrame::new(at("stopHere", config.stop_line), FrameKind::Managed).with_local(
                    "counter",
                    "int",
                    SimValue::Int(0),
                ),
                SimFrame::new(at("main", 71), FrameKind::Managed),
            ],
        };

        let aux = SimThread {
            id: AUX_THREAD_ID,
            name: config.aux_thread.clone(),
            frames: vec![
                SimFrame::new(Location::new("Blocker", "park", 0), FrameKind::Native),
                SimFrame::new(Location::new("Blocker", "spin", 0), FrameKind::NoDebugInfo),
                SimFrame::new(at("run", 57), FrameKind::Managed).with_local(
                    &config.local_name,
                    class,
                    SimValue::Object(BLOCKER_OBJECT_ID),
                ),
                SimFrame::new(at("run", 55), FrameKind::Managed),
            ],
        };

        let mut objects = HashMap::new();
        objects.insert(
            BLOCKER_OBJECT_ID,
            SimObject {
                fields: HashMap::from([(config.field_name.clone(), SimValue::Boolean(false))]),
            },
        );

        Self {
            class_name: config.class_name.clone(),
            line_table,
            threads: vec![main, aux],
            objects,
            requests: Vec::new(),
            next_request: 1,
            epoch: SuspendEpoch::default(),
            suspended: false,
            connected: true,
            exit_status: None,
            pop_attempts: 0,
            received: Vec::new(),
            enabled_at_go: None,
            aux_blocked: false,
        }
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if !self.connected || self.exit_status.is_some() {
            return Err(TargetError::Disconnected);
        }
        Ok(())
    }

    pub(crate) fn ensure_suspended(&self) -> Result<()> {
        self.ensure_connected()?;
        if !self.suspended {
            return Err(TargetError::NotSuspended);
        }
        Ok(())
    }

    fn check_epoch(&self, handle: SuspendEpoch) -> Result<()> {
        if handle != self.epoch {
            return Err(TargetError::StaleHandle {
                handle,
                current: self.epoch,
            });
        }
        Ok(())
    }

    pub(crate) fn thread(&self, id: ThreadId) -> Result<&SimThread> {
        self.threads
            .iter()
            .find(|t| t.id == id)
            .ok_or(TargetError::InvalidThread(id))
    }

    pub(crate) fn frame(&self, handle: &FrameHandle) -> Result<&SimFrame> {
        self.ensure_suspended()?;
        self.check_epoch(handle.epoch())?;
        self.thread(handle.thread())?
            .frames
            .get(handle.depth())
            .ok_or(TargetError::InvalidFrame {
                thread: handle.thread(),
                depth: handle.depth(),
            })
    }

    pub(crate) fn to_value(&self, value: SimValue) -> Value {
        match value {
            SimValue::Null => Value::Null,
            SimValue::Boolean(b) => Value::Boolean(b),
            SimValue::Int(i) => Value::Int(i),
            SimValue::Object(id) => Value::Object(ObjectHandle::new(id, self.epoch)),
        }
    }

    pub(crate) fn add_request(&mut self, location: Location, scope: RequestScope) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        self.requests.push(SimRequest {
            id,
            location,
            scope,
            enabled: false,
        });
        id
    }

    pub(crate) fn set_request_enabled(&mut self, id: RequestId, enabled: bool) -> Result<()> {
        let request = self
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(TargetError::InvalidRequest(id))?;
        request.enabled = enabled;
        Ok(())
    }

    pub(crate) fn request_enabled(&self, id: RequestId) -> Option<bool> {
        self.requests.iter().find(|r| r.id == id).map(|r| r.enabled)
    }

    pub(crate) fn field_by_name(&self, class: &str, name: &str) -> Option<FieldRef> {
        if class != self.class_name {
            return None;
        }
        self.objects
            .get(&BLOCKER_OBJECT_ID)
            .filter(|obj| obj.fields.contains_key(name))
            .map(|_| FieldRef {
                class: class.to_string(),
                name: name.to_string(),
            })
    }

    pub(crate) fn set_field_value(
        &mut self,
        object: &ObjectHandle,
        field: &FieldRef,
        value: Value,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.check_epoch(object.epoch())?;

        let new_value = match value {
            Value::Null => SimValue::Null,
            Value::Boolean(b) => SimValue::Boolean(b),
            Value::Int(i) => SimValue::Int(i),
            Value::Object(handle) => {
                self.check_epoch(handle.epoch())?;
                SimValue::Object(handle.id())
            }
        };

        let slot = self
            .objects
            .get_mut(&object.id())
            .ok_or(TargetError::InvalidObject(object.id()))?
            .fields
            .get_mut(&field.name)
            .ok_or_else(|| TargetError::NoSuchField(field.name.clone()))?;

        if std::mem::discriminant(&*slot) != std::mem::discriminant(&new_value) {
            return Err(TargetError::TypeMismatch {
                expected: slot.kind(),
                found: new_value.kind(),
            });
        }
        *slot = new_value;
        Ok(())
    }

    /// GO を受けて補助スレッドがブロッキングメソッドに入る
    pub(crate) fn start_running(&mut self) {
        self.enabled_at_go = Some(self.requests.iter().any(|r| r.enabled));
        self.aux_blocked = true;
    }

    /// QUIT 受信時の終了ステータス
    ///
    /// 補助スレッドが終了フラグを受け取っていなければ抜けられず、正常終了できません。
    pub(crate) fn quit_status(&self, field_name: &str, configured: i32) -> i32 {
        if self.aux_blocked && !self.leave_flag(field_name) {
            STATUS_STILL_BLOCKED
        } else {
            configured
        }
    }

    pub(crate) fn leave_flag(&self, field_name: &str) -> bool {
        self.objects
            .get(&BLOCKER_OBJECT_ID)
            .and_then(|obj| obj.fields.get(field_name))
            .is_some_and(|v| *v == SimValue::Boolean(true))
    }

    pub(crate) fn pop_frames(
        &mut self,
        thread: &ThreadRef,
        frame: &FrameHandle,
        behavior: &PopBehavior,
    ) -> Result<()> {
        self.pop_attempts += 1;
        self.frame(frame)?;
        self.thread(thread.id())?;

        match behavior {
            PopBehavior::RejectForeignFrame => {
                if frame.thread() != thread.id() {
                    return Err(TargetError::FrameNotOnStack {
                        thread: thread.name().to_string(),
                    });
                }
                let owner = self
                    .threads
                    .iter_mut()
                    .find(|t| t.id == thread.id())
                    .ok_or(TargetError::InvalidThread(thread.id()))?;
                owner.frames.drain(..=frame.depth());
                Ok(())
            }
            PopBehavior::Accept => Ok(()),
            PopBehavior::Unsupported => Err(TargetError::Unsupported("popFrames".to_string())),
            PopBehavior::Fail(msg) => Err(TargetError::Internal(msg.clone())),
        }
    }

    /// メインスレッドが停止行に到達したときの処理
    ///
    /// 有効なブレークポイント要求が一致すればターゲットを停止させ、その要求を返します。
    pub(crate) fn reach_stop_line(&mut self) -> Option<(RequestId, ThreadRef, Location)> {
        let main = self.thread(MAIN_THREAD_ID).ok()?;
        let thread = ThreadRef::new(main.id, main.name.clone());
        let location = main.frames.first()?.location.clone();

        let request = self
            .requests
            .iter()
            .find(|r| r.enabled && r.location == location && r.scope.matches(&thread))?
            .id;

        self.suspended = true;
        Some((request, thread, location))
    }

    pub(crate) fn resume(&mut self) {
        if self.suspended {
            self.suspended = false;
            self.epoch = self.epoch.next();
        }
    }

    pub(crate) fn disconnect(&mut self) {
        self.connected = false;
        self.suspended = false;
    }

    pub(crate) fn exit(&mut self, status: i32) {
        if self.exit_status.is_none() {
            self.exit_status = Some(status);
        }
        self.suspended = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended_state() -> SimState {
        let mut state = SimState::new(&SimConfig::default());
        let location = Location::new("PopFramesTarget", "stopHere", 86);
        let id = state.add_request(location, RequestScope::Global);
        state.set_request_enabled(id, true).unwrap();
        assert!(state.reach_stop_line().is_some());
        state
    }

    #[test]
    fn test_disabled_request_does_not_suspend() {
        let mut state = SimState::new(&SimConfig::default());
        let location = Location::new("PopFramesTarget", "stopHere", 86);
        state.add_request(location, RequestScope::Global);
        assert!(state.reach_stop_line().is_none());
        assert!(!state.suspended);
    }

    #[test]
    fn test_set_field_type_mismatch() {
        let mut state = suspended_state();
        let field = state.field_by_name("PopFramesTarget", "leaveMethod").unwrap();
        let object = ObjectHandle::new(BLOCKER_OBJECT_ID, state.epoch);

        assert!(matches!(
            state.set_field_value(&object, &field, Value::Int(1)),
            Err(TargetError::TypeMismatch { .. })
        ));
        state
            .set_field_value(&object, &field, Value::Boolean(true))
            .unwrap();
        assert!(state.leave_flag("leaveMethod"));
    }

    #[test]
    fn test_pop_own_frame_truncates_stack() {
        let mut state = suspended_state();
        let aux = ThreadRef::new(AUX_THREAD_ID, "Aux");
        let frame = FrameHandle::new(AUX_THREAD_ID, 2, state.epoch);
        state
            .pop_frames(&aux, &frame, &PopBehavior::RejectForeignFrame)
            .unwrap();
        assert_eq!(state.thread(AUX_THREAD_ID).unwrap().frames.len(), 1);
    }

    #[test]
    fn test_quit_status_depends_on_leave_flag() {
        let mut state = suspended_state();
        assert_eq!(state.quit_status("leaveMethod", 95), 95);

        state.start_running();
        assert_eq!(state.enabled_at_go, Some(true));
        assert_eq!(state.quit_status("leaveMethod", 95), STATUS_STILL_BLOCKED);

        let field = state.field_by_name("PopFramesTarget", "leaveMethod").unwrap();
        let object = ObjectHandle::new(BLOCKER_OBJECT_ID, state.epoch);
        state
            .set_field_value(&object, &field, Value::Boolean(true))
            .unwrap();
        assert_eq!(state.quit_status("leaveMethod", 95), 95);
    }

    #[test]
    fn test_exit_status_is_sticky() {
        let mut state = SimState::new(&SimConfig::default());
        state.exit(95);
        state.exit(1);
        assert_eq!(state.exit_status, Some(95));
        assert!(matches!(state.ensure_connected(), Err(TargetError::Disconnected)));
    }
}
