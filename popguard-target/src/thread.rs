//! スレッド参照

use std::fmt;

/// スレッドID
pub type ThreadId = u64;

/// デバッグ対象のスレッドへの参照
///
/// セッション開始時に名前で一度だけ解決され、以後は変更されません。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadRef {
    id: ThreadId,
    name: String,
}

impl ThreadRef {
    /// スレッド参照を作成する
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// スレッドIDを取得する
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// スレッド名を取得する
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread '{}' (#{})", self.name, self.id)
    }
}
