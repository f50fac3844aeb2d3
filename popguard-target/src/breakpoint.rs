//! ブレークポイント要求の識別子とスコープ

use crate::ThreadRef;

/// ターゲットが発行するイベント要求のID
pub type RequestId = u32;

/// ブレークポイント要求の適用範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestScope {
    /// すべてのスレッドで停止する
    Global,
    /// 指定スレッドでのみ停止する
    Thread(ThreadRef),
}

impl RequestScope {
    /// 指定スレッドがこのスコープに含まれるか
    pub fn matches(&self, thread: &ThreadRef) -> bool {
        match self {
            RequestScope::Global => true,
            RequestScope::Thread(t) => t.id() == thread.id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matches() {
        let main = ThreadRef::new(1, "Main");
        let aux = ThreadRef::new(2, "Aux");
        assert!(RequestScope::Global.matches(&aux));
        assert!(RequestScope::Thread(main.clone()).matches(&main));
        assert!(!RequestScope::Thread(main).matches(&aux));
    }
}
