//! セッションの致命的エラー

use crate::BreakpointPosition;
use popguard_target::TargetError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 待機中にターゲットが失われた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessGone {
    Disconnected,
    Terminated,
}

impl fmt::Display for ProcessGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessGone::Disconnected => write!(f, "unexpected disconnect event"),
            ProcessGone::Terminated => write!(f, "unexpected death event"),
        }
    }
}

/// 残りの検査フェーズを中断させるエラー
///
/// いずれの場合も後始末（強制終了とクローズ）は実行されます。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown debuggee message at handshake: {0:?}")]
    UnexpectedHandshake(String),

    #[error("debuggee closed the command channel before handshake")]
    ChannelClosed,

    #[error("thread '{0}' not found in the target")]
    ThreadNotFound(String),

    #[error("location corresponding to source line {position} not found")]
    PositionNotFound { position: BreakpointPosition },

    #[error("a breakpoint request has already been created for this session")]
    AlreadyArmed,

    #[error("field '{field}' not found in class '{class}'")]
    FieldNotFound { class: String, field: String },

    #[error("no stack frame of thread '{thread}' exposes local '{name}'")]
    BindingNotFound { thread: String, name: String },

    #[error("local '{name}' holds a {kind} value instead of an object reference")]
    NotAnObject { name: String, kind: &'static str },

    #[error("timeout occurred while waiting for breakpoint event ({0:?})")]
    Timeout(Duration),

    #[error("target gone while waiting for breakpoint event: {0}")]
    ProcessGone(ProcessGone),

    #[error("breakpoint wait was cancelled")]
    Cancelled,

    #[error("event watcher terminated without reporting a result")]
    WatcherLost,

    #[error(transparent)]
    Target(#[from] TargetError),
}

impl SessionError {
    /// ブレークポイント待機のタイムアウトか
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout(_))
    }
}
