//! 他スレッドのフレームに対するポップ操作の検証
//!
//! 操作の結果を閉じた [`PopOutcome`] に変換し、ケーパビリティ情報と合わせて
//! [`Verdict`] に分類します。

use popguard_target::{DebugTarget, FrameHandle, TargetError, ThreadRef};
use std::fmt;

/// ポップ操作の結果
#[derive(Debug)]
pub enum PopOutcome {
    /// エラーなく完了した
    Completed,
    /// フレームがスレッドのスタック上にないとして拒否された
    FrameNotOnStack(TargetError),
    /// ターゲットが操作をサポートしていない
    Unsupported(TargetError),
    /// その他のエラー
    Failed(TargetError),
}

impl From<popguard_target::Result<()>> for PopOutcome {
    fn from(result: popguard_target::Result<()>) -> Self {
        match result {
            Ok(()) => PopOutcome::Completed,
            Err(e @ TargetError::FrameNotOnStack { .. }) => PopOutcome::FrameNotOnStack(e),
            Err(e @ TargetError::Unsupported(_)) => PopOutcome::Unsupported(e),
            Err(e) => PopOutcome::Failed(e),
        }
    }
}

/// 検証結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 期待どおり拒否された
    ExpectedRejection { error: String },
    /// 操作が未サポートで、ケーパビリティも無いと報告されている
    UnsupportedAndCapabilityAbsent { error: String },
    /// 操作が未サポートなのに、ケーパビリティは有ると報告されている
    UnsupportedButCapabilityPresent { error: String },
    /// 拒否されなかった
    NoRejectionOccurred,
    /// 想定外のエラー
    UnexpectedFailure { error: String, detail: String },
}

impl Verdict {
    /// 結果を分類する
    ///
    /// `can_pop_frames` は操作が未サポートだった場合にのみ呼ばれます。
    pub fn classify(outcome: PopOutcome, can_pop_frames: impl FnOnce() -> bool) -> Self {
        match outcome {
            PopOutcome::FrameNotOnStack(e) => Verdict::ExpectedRejection {
                error: e.to_string(),
            },
            PopOutcome::Completed => Verdict::NoRejectionOccurred,
            PopOutcome::Unsupported(e) => {
                let error = e.to_string();
                if can_pop_frames() {
                    Verdict::UnsupportedButCapabilityPresent { error }
                } else {
                    Verdict::UnsupportedAndCapabilityAbsent { error }
                }
            }
            PopOutcome::Failed(e) => Verdict::UnexpectedFailure {
                error: e.to_string(),
                detail: format!("{:?}", e),
            },
        }
    }

    /// セッションを失敗させる結果か
    pub fn is_failure(&self) -> bool {
        match self {
            Verdict::ExpectedRejection { .. } | Verdict::UnsupportedAndCapabilityAbsent { .. } => {
                false
            }
            Verdict::UnsupportedButCapabilityPresent { .. }
            | Verdict::NoRejectionOccurred
            | Verdict::UnexpectedFailure { .. } => true,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::ExpectedRejection { error } => {
                write!(f, "CHECK PASSED: caught expected error: {}", error)
            }
            Verdict::UnsupportedAndCapabilityAbsent { error } => write!(
                f,
                "unable to test the assertion: caught '{}' and the target does not support popping frames either",
                error
            ),
            Verdict::UnsupportedButCapabilityPresent { error } => write!(
                f,
                "TEST FAILED: caught '{}', however the target reports that it does support popping frames",
                error
            ),
            Verdict::NoRejectionOccurred => write!(
                f,
                "TEST FAILED: expected error not thrown when popping a frame that is not on the thread's call stack"
            ),
            Verdict::UnexpectedFailure { error, .. } => write!(
                f,
                "TEST FAILED: caught unexpected error '{}' instead of frame-not-on-stack",
                error
            ),
        }
    }
}

/// クロススレッドのフレームポップ検証器
pub struct CrossThreadValidator<'a, T: ?Sized> {
    target: &'a T,
}

impl<'a, T: DebugTarget + ?Sized> CrossThreadValidator<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }

    /// 他スレッドから取得した `frame` を `owner` のスタックからポップさせ、結果を分類する
    pub fn check_rejects_foreign_frame(&self, owner: &ThreadRef, frame: &FrameHandle) -> Verdict {
        let outcome = PopOutcome::from(self.target.pop_frames(owner, frame));
        Verdict::classify(outcome, || self.target.can_pop_frames())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn rejected() -> PopOutcome {
        PopOutcome::FrameNotOnStack(TargetError::FrameNotOnStack {
            thread: "Main".to_string(),
        })
    }

    fn unsupported() -> PopOutcome {
        PopOutcome::Unsupported(TargetError::Unsupported("popFrames".to_string()))
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(matches!(PopOutcome::from(Ok(())), PopOutcome::Completed));
        assert!(matches!(
            PopOutcome::from(Err(TargetError::FrameNotOnStack {
                thread: "Main".to_string()
            })),
            PopOutcome::FrameNotOnStack(_)
        ));
        assert!(matches!(
            PopOutcome::from(Err(TargetError::Unsupported("x".to_string()))),
            PopOutcome::Unsupported(_)
        ));
        assert!(matches!(
            PopOutcome::from(Err(TargetError::NotSuspended)),
            PopOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            Verdict::classify(rejected(), || true),
            Verdict::ExpectedRejection { .. }
        ));
        assert_eq!(
            Verdict::classify(PopOutcome::Completed, || true),
            Verdict::NoRejectionOccurred
        );
        assert!(matches!(
            Verdict::classify(unsupported(), || false),
            Verdict::UnsupportedAndCapabilityAbsent { .. }
        ));
        assert!(matches!(
            Verdict::classify(unsupported(), || true),
            Verdict::UnsupportedButCapabilityPresent { .. }
        ));
        let verdict = Verdict::classify(
            PopOutcome::Failed(TargetError::Internal("boom".to_string())),
            || true,
        );
        match verdict {
            Verdict::UnexpectedFailure { error, detail } => {
                assert!(error.contains("boom"));
                assert!(detail.contains("Internal"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn test_capability_queried_only_when_unsupported() {
        let queried = Cell::new(0);
        let query = || {
            queried.set(queried.get() + 1);
            true
        };
        Verdict::classify(rejected(), query);
        Verdict::classify(PopOutcome::Completed, query);
        assert_eq!(queried.get(), 0);
        Verdict::classify(unsupported(), query);
        assert_eq!(queried.get(), 1);
    }

    #[test]
    fn test_failure_flags() {
        assert!(!Verdict::ExpectedRejection {
            error: String::new()
        }
        .is_failure());
        assert!(!Verdict::UnsupportedAndCapabilityAbsent {
            error: String::new()
        }
        .is_failure());
        assert!(Verdict::UnsupportedButCapabilityPresent {
            error: String::new()
        }
        .is_failure());
        assert!(Verdict::NoRejectionOccurred.is_failure());
        assert!(Verdict::UnexpectedFailure {
            error: String::new(),
            detail: String::new()
        }
        .is_failure());
    }

    #[test]
    fn test_no_rejection_message() {
        assert!(Verdict::NoRejectionOccurred
            .to_string()
            .contains("expected error not thrown"));
    }
}
