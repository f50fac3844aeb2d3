//! スタックフレームの探索

use crate::{Result, SessionError};
use popguard_target::{DebugTarget, FrameHandle, ObjectHandle, TargetError, ThreadRef};
use tracing::debug;

/// ローカル変数で特定したフレームと、その変数が指すオブジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedFrame {
    pub frame: FrameHandle,
    pub object: ObjectHandle,
}

/// スタックインスペクタ
pub struct StackInspector<'a, T: ?Sized> {
    target: &'a T,
}

impl<'a, T: DebugTarget + ?Sized> StackInspector<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    /// `binding` という名前のローカル変数を公開するフレームを探す
    ///
    /// 最内フレームから外側へ順に走査し、最初に見つかったフレームを返します。
    /// デバッグ情報のないフレームとネイティブメソッドのフレームは読み飛ばします。
    /// それ以外のエラーは走査を中断して返します。
    pub fn locate_frame(&self, thread: &ThreadRef, binding: &str) -> Result<LocatedFrame> {
        for frame in self.target.frames(thread)? {
            match self.target.visible_variable(&frame, binding) {
                Ok(Some(variable)) => {
                    let value = self.target.variable_value(&frame, &variable)?;
                    let object = value.as_object().ok_or_else(|| SessionError::NotAnObject {
                        name: binding.to_string(),
                        kind: value.kind(),
                    })?;
                    debug!("found '{}' in {} -> {}", binding, frame, object);
                    return Ok(LocatedFrame { frame, object });
                }
                Ok(None) => {}
                // このフレームではない
                Err(TargetError::AbsentInformation(method)) => {
                    debug!("no debug information for {}, skipping", method);
                }
                Err(TargetError::NativeMethod(method)) => {
                    debug!("{} is native, skipping", method);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SessionError::BindingNotFound {
            thread: thread.name().to_string(),
            name: binding.to_string(),
        })
    }
}
