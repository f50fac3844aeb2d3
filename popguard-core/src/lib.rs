//! popguard のコア機能
//!
//! このクレートは、ターゲットプロセスをブレークポイントで停止させ、
//! 他スレッドのフレームに対するフレームポップが拒否されることを検証する
//! セッション制御のロジックを提供します。

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod errors;
pub mod parse;
pub mod session;
pub mod stack;
pub mod validator;
pub mod waiter;

pub use breakpoint::{BreakpointCoordinator, BreakpointRequest};
pub use command::Command;
pub use config::{BreakpointPosition, SessionConfig};
pub use errors::{ProcessGone, SessionError};
pub use session::{Phase, Session, SessionReport, SessionResult};
pub use stack::{LocatedFrame, StackInspector};
pub use validator::{CrossThreadValidator, PopOutcome, Verdict};
pub use waiter::{BreakpointHit, EventWaiter, Watcher, POLL_INTERVAL};

// 他のクレートから使用するために再エクスポート
pub use popguard_target::{DebugTarget, TargetError};

/// セッション処理の結果型
pub type Result<T> = std::result::Result<T, SessionError>;
