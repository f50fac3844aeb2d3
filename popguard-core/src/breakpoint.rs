//! ブレークポイント管理
//!
//! セッションごとに一つだけブレークポイント要求を作成し、
//! イベント照合用のキーとして保持します。自身は待機しません。

use crate::{BreakpointPosition, Result, SessionError};
use popguard_target::{DebugTarget, Event, Location, RequestId, RequestScope};
use tracing::{debug, info};

/// ブレークポイント要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRequest {
    pub id: RequestId,
    pub location: Location,
    pub enabled: bool,
}

impl BreakpointRequest {
    /// イベントがこの要求によるブレークポイントヒットか
    pub fn is_hit_by(&self, event: &Event) -> bool {
        matches!(event, Event::BreakpointHit { request, .. } if *request == self.id)
    }
}

/// ブレークポイントコーディネータ
#[derive(Debug, Default)]
pub struct BreakpointCoordinator {
    request: Option<BreakpointRequest>,
}

impl BreakpointCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// ソース位置を解決してブレークポイント要求を作成し、有効化する
    ///
    /// クラスの行テーブルで最初に行番号が一致した位置を使います。
    /// 要求はセッションにつき一度しか作成できません。
    pub fn arm<T: DebugTarget + ?Sized>(
        &mut self,
        target: &T,
        scope: RequestScope,
        position: &BreakpointPosition,
    ) -> Result<BreakpointRequest> {
        if self.request.is_some() {
            return Err(SessionError::AlreadyArmed);
        }

        let class = target.class_by_name(&position.class)?;
        let location = target
            .all_line_locations(&class)?
            .into_iter()
            .find(|loc| loc.line == position.line)
            .ok_or_else(|| SessionError::PositionNotFound {
                position: position.clone(),
            })?;

        let id = target.create_breakpoint_request(&location, &scope)?;
        target.set_request_enabled(id, true)?;
        info!(
            "created breakpoint request {} for {} ; line={}",
            id, position.class, position.line
        );

        let request = BreakpointRequest {
            id,
            location,
            enabled: true,
        };
        self.request = Some(request.clone());
        Ok(request)
    }

    /// ブレークポイント要求を無効化する
    ///
    /// 何度呼んでも安全で、要求が未作成・未発火でも成功します。
    pub fn disable<T: DebugTarget + ?Sized>(&mut self, target: &T) -> Result<()> {
        if let Some(request) = self.request.as_mut().filter(|r| r.enabled) {
            target.set_request_enabled(request.id, false)?;
            request.enabled = false;
            debug!("disabled breakpoint request {}", request.id);
        }
        Ok(())
    }

    /// 作成済みの要求
    pub fn request(&self) -> Option<&BreakpointRequest> {
        self.request.as_ref()
    }
}
