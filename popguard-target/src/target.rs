//! デバッグ制御プロトコルの抽象
//!
//! コントローラが必要とするターゲット操作の集合です。
//! 実装は内部可変性を持ち、すべての操作は `&self` で呼び出されます。

use crate::{
    ClassRef, EventSet, FieldRef, FrameHandle, LocalVariable, Location, ObjectHandle, RequestId,
    RequestScope, Result, ThreadRef, Value,
};
use std::time::Duration;

/// 非同期イベントキュー
///
/// ウォッチャースレッドへ所有権ごと渡されるため `Send` が必要です。
pub trait EventSource: Send {
    /// 最大 `timeout` だけ待機してイベントセットを一つ取り出す
    ///
    /// タイムアウトした場合は `Ok(None)` を返します。
    fn remove(&mut self, timeout: Duration) -> Result<Option<EventSet>>;
}

/// デバッグ対象プロセスへの制御インターフェース
pub trait DebugTarget {
    /// ロード済みクラスを名前で検索する
    fn class_by_name(&self, name: &str) -> Result<ClassRef>;

    /// スレッドを名前で検索する
    fn thread_by_name(&self, name: &str) -> Result<Option<ThreadRef>>;

    /// クラスの実行可能な行位置をすべて取得する
    fn all_line_locations(&self, class: &ClassRef) -> Result<Vec<Location>>;

    /// ブレークポイント要求を作成する（作成直後は無効）
    fn create_breakpoint_request(
        &self,
        location: &Location,
        scope: &RequestScope,
    ) -> Result<RequestId>;

    /// イベント要求の有効・無効を切り替える
    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> Result<()>;

    /// イベントキューを取得する
    fn event_source(&self) -> Box<dyn EventSource>;

    /// スレッドのコールスタックを最内フレームから順に取得する
    fn frames(&self, thread: &ThreadRef) -> Result<Vec<FrameHandle>>;

    /// フレームの現在位置を取得する
    fn frame_location(&self, frame: &FrameHandle) -> Result<Location>;

    /// フレームで可視なローカル変数を名前で検索する
    ///
    /// デバッグ情報のないメソッドでは `AbsentInformation`、
    /// ネイティブメソッドでは `NativeMethod` で失敗します。
    fn visible_variable(&self, frame: &FrameHandle, name: &str) -> Result<Option<LocalVariable>>;

    /// ローカル変数の値を読み取る
    fn variable_value(&self, frame: &FrameHandle, variable: &LocalVariable) -> Result<Value>;

    /// クラスのフィールドを名前で検索する
    fn field_by_name(&self, class: &ClassRef, name: &str) -> Result<Option<FieldRef>>;

    /// オブジェクトのフィールドに値を書き込む
    fn set_field_value(&self, object: &ObjectHandle, field: &FieldRef, value: Value) -> Result<()>;

    /// `frame` までのフレームを `thread` のスタックからポップする
    ///
    /// `frame` が `thread` のスタック上にない場合は `FrameNotOnStack`、
    /// ターゲットが機能を持たない場合は `Unsupported` で失敗します。
    fn pop_frames(&self, thread: &ThreadRef, frame: &FrameHandle) -> Result<()>;

    /// ターゲットがフレームのポップをサポートするか
    fn can_pop_frames(&self) -> bool;

    /// ターゲット全体を実行再開する
    fn resume(&self) -> Result<()>;

    /// プロセスの終了を最大 `timeout` だけ待機し、終了ステータスを返す
    fn wait_for_exit(&self, timeout: Duration) -> Result<i32>;
}
