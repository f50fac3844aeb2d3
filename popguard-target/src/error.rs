//! ターゲット操作のエラー

use crate::{ObjectId, RequestId, SuspendEpoch, ThreadId};
use std::time::Duration;
use thiserror::Error;

/// デバッグプロトコル操作で発生するエラー
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("class '{0}' is not loaded in the target")]
    NoSuchClass(String),

    /// フレームのメソッドにデバッグ情報がない
    #[error("no debug information available for {0}")]
    AbsentInformation(String),

    #[error("{0} is a native method")]
    NativeMethod(String),

    /// 指定フレームが操作対象スレッドのコールスタック上にない
    #[error("frame is not on the call stack of thread '{thread}'")]
    FrameNotOnStack { thread: String },

    #[error("operation not supported by the target: {0}")]
    Unsupported(String),

    #[error("stale handle: obtained in epoch {handle}, target is at epoch {current}")]
    StaleHandle {
        handle: SuspendEpoch,
        current: SuspendEpoch,
    },

    #[error("target is not suspended")]
    NotSuspended,

    #[error("invalid thread reference #{0}")]
    InvalidThread(ThreadId),

    #[error("invalid frame depth {depth} for thread #{thread}")]
    InvalidFrame { thread: ThreadId, depth: usize },

    #[error("invalid object reference #{0}")]
    InvalidObject(ObjectId),

    #[error("invalid event request id {0}")]
    InvalidRequest(RequestId),

    #[error("no field '{0}'")]
    NoSuchField(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("target disconnected")]
    Disconnected,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal target error: {0}")]
    Internal(String),
}
