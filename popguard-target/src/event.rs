//! ターゲットから非同期に届くイベント

use crate::{Location, RequestId, ThreadRef};
use std::fmt;

/// ターゲットイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// ブレークポイント要求が発火した
    BreakpointHit {
        request: RequestId,
        thread: ThreadRef,
        location: Location,
    },
    /// デバッグ接続が切断された
    Disconnected,
    /// ターゲットプロセスが終了した
    Terminated,
    /// その他のイベント（スレッド開始など）
    Other(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::BreakpointHit {
                request,
                thread,
                location,
            } => write!(
                f,
                "BreakpointEvent(request={}) in {} @ {}",
                request, thread, location
            ),
            Event::Disconnected => write!(f, "DisconnectEvent"),
            Event::Terminated => write!(f, "DeathEvent"),
            Event::Other(desc) => write!(f, "{}", desc),
        }
    }
}

/// 一度の取り出しで得られるイベントの集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSet {
    events: Vec<Event>,
}

impl EventSet {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// 単一イベントのセットを作成する
    pub fn single(event: Event) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for EventSet {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
