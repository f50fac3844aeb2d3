//! popguard ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象プロセスを制御するためのプロトコル面を提供します。
//! スレッド・フレーム・オブジェクトのハンドル、ブレークポイント要求、イベントキュー、
//! 行指向のコマンドチャネル、およびインプロセスのシミュレーションターゲットを含みます。

pub mod breakpoint;
pub mod channel;
pub mod error;
pub mod event;
pub mod frame;
pub mod sim;
pub mod target;
pub mod thread;

pub use breakpoint::{RequestId, RequestScope};
pub use channel::{CommandChannel, LineChannel, UnixChannel};
pub use error::TargetError;
pub use event::{Event, EventSet};
pub use frame::{
    ClassRef, FieldRef, FrameHandle, LocalVariable, Location, ObjectHandle, ObjectId,
    SuspendEpoch, Value,
};
pub use target::{DebugTarget, EventSource};
pub use thread::{ThreadId, ThreadRef};

/// ターゲット制御の結果型
pub type Result<T> = std::result::Result<T, TargetError>;
