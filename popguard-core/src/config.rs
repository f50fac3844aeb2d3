//! セッション設定

use crate::{Result, SessionError};
use std::fmt;
use std::time::Duration;

/// 被デバッグ側の正常終了ステータス（ステータス基数 95 + 成功 0）
pub const DEFAULT_EXIT_STATUS: i32 = 95;

/// ブレークポイント待機時間の上限（1日）
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(24 * 60 * 60);

/// ブレークポイントを設定するソース位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointPosition {
    pub class: String,
    pub line: u32,
}

impl BreakpointPosition {
    pub fn new(class: impl Into<String>, line: u32) -> Self {
        Self {
            class: class.into(),
            line,
        }
    }
}

impl fmt::Display for BreakpointPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class, self.line)
    }
}

/// セッション設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 停止させるソース位置
    pub position: BreakpointPosition,
    /// フレームのポップを要求するスレッド
    pub main_thread: String,
    /// ポップ対象フレームを取得するスレッド
    pub aux_thread: String,
    /// 対象フレームを特定するローカル変数名
    pub local_name: String,
    /// 被デバッグ側のメソッドを抜けさせるフラグフィールド名
    pub field_name: String,
    /// ブレークポイントイベントの待機時間
    pub wait_time: Duration,
    /// 被デバッグ側プロセスの終了待機時間
    pub exit_timeout: Duration,
    /// ブレークポイント要求をメインスレッドに限定する
    pub filter_main_thread: bool,
    /// 期待する被デバッグ側の終了ステータス
    pub expected_exit_status: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            position: BreakpointPosition::new("PopFramesTarget", 86),
            main_thread: "Main".to_string(),
            aux_thread: "Aux".to_string(),
            local_name: "findMe".to_string(),
            field_name: "leaveMethod".to_string(),
            wait_time: Duration::from_secs(2 * 60),
            exit_timeout: Duration::from_secs(30),
            filter_main_thread: false,
            expected_exit_status: DEFAULT_EXIT_STATUS,
        }
    }
}

impl SessionConfig {
    /// 待機時間を分単位で設定する
    ///
    /// 桁あふれする値は飽和させ、上限の検査は [`validate`](Self::validate) に任せます。
    pub fn with_wait_minutes(mut self, minutes: u64) -> Self {
        self.wait_time = Duration::from_secs(minutes.saturating_mul(60));
        self
    }

    /// 設定を検証する
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("class", &self.position.class),
            ("main thread", &self.main_thread),
            ("aux thread", &self.aux_thread),
            ("local variable", &self.local_name),
            ("field", &self.field_name),
        ];
        if let Some((what, _)) = names.iter().find(|(_, name)| name.trim().is_empty()) {
            return Err(SessionError::InvalidConfig(format!("{} name is empty", what)));
        }
        if self.main_thread == self.aux_thread {
            return Err(SessionError::InvalidConfig(format!(
                "main and aux thread must differ, both are '{}'",
                self.main_thread
            )));
        }
        if self.position.line == 0 {
            return Err(SessionError::InvalidConfig(
                "breakpoint line must be positive".to_string(),
            ));
        }
        if self.wait_time.is_zero() {
            return Err(SessionError::InvalidConfig(
                "wait time must be positive".to_string(),
            ));
        }
        if self.wait_time > MAX_WAIT_TIME || self.exit_timeout > MAX_WAIT_TIME {
            return Err(SessionError::InvalidConfig(format!(
                "wait times must not exceed {:?}",
                MAX_WAIT_TIME
            )));
        }
        Ok(())
    }
}
