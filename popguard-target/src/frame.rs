//! フレーム・オブジェクトハンドルと値
//!
//! ハンドルはターゲットが停止している間だけ有効です。
//! ターゲットは再開のたびに [`SuspendEpoch`] を進め、古いエポックの
//! ハンドルを使った操作は `StaleHandle` で失敗します。

use crate::ThreadId;
use std::fmt;

/// 停止サイクルの世代番号
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuspendEpoch(pub u64);

impl SuspendEpoch {
    /// 次の世代を返す
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SuspendEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ソース上の位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub class: String,
    pub method: String,
    pub line: u32,
}

impl Location {
    pub fn new(class: impl Into<String>, method: impl Into<String>, line: u32) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.method, self.line)
    }
}

/// ロード済みクラスへの参照
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassRef {
    name: String,
}

impl ClassRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// クラスのフィールドへの参照
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
}

/// スタックフレームへのハンドル
///
/// `depth` は最内フレームを 0 とするスタック上の位置です。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    thread: ThreadId,
    depth: usize,
    epoch: SuspendEpoch,
}

impl FrameHandle {
    pub fn new(thread: ThreadId, depth: usize, epoch: SuspendEpoch) -> Self {
        Self {
            thread,
            depth,
            epoch,
        }
    }

    /// フレームを取得したスレッドのID
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn epoch(&self) -> SuspendEpoch {
        self.epoch
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame #{} of thread #{} (epoch {})",
            self.depth, self.thread, self.epoch
        )
    }
}

/// オブジェクトID
pub type ObjectId = u64;

/// ターゲット内オブジェクトへのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    id: ObjectId,
    epoch: SuspendEpoch,
}

impl ObjectHandle {
    pub fn new(id: ObjectId, epoch: SuspendEpoch) -> Self {
        Self { id, epoch }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn epoch(&self) -> SuspendEpoch {
        self.epoch
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object #{} (epoch {})", self.id, self.epoch)
    }
}

/// フレーム内で可視なローカル変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub type_name: String,
    /// フレーム内のスロット番号
    pub slot: usize,
}

/// ターゲット上の値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Object(ObjectHandle),
}

impl Value {
    /// 値の種類名
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Object(_) => "object",
        }
    }

    /// オブジェクト参照であればハンドルを返す
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Object(handle) => write!(f, "{}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_advances() {
        let epoch = SuspendEpoch::default();
        assert_eq!(epoch.next(), SuspendEpoch(1));
        assert!(epoch.next() > epoch);
    }

    #[test]
    fn test_value_as_object() {
        let handle = ObjectHandle::new(7, SuspendEpoch(3));
        assert_eq!(Value::Object(handle).as_object(), Some(handle));
        assert_eq!(Value::Boolean(true).as_object(), None);
        assert_eq!(Value::Null.kind(), "null");
    }

    #[test]
    fn test_location_display() {
        let loc = Location::new("Target", "stopHere", 86);
        assert_eq!(loc.to_string(), "Target.stopHere:86");
    }
}
