//! JobStatus - ジョブの状態遷移

use serde::{Deserialize, Serialize};

/// ジョブの状態
///
/// 遷移（キューエンジンが駆動する）:
/// - New -> Queued（受け付け時に可視）
/// - New -> Scheduled -> Queued（可視時刻が未来、到達したら昇格）
/// - Queued -> (checkout) -> Completed
/// - Queued -> (checkout) -> Pending -> Queued/Scheduled（バックオフ付きリトライ）
/// - Queued -> (checkout) -> Failed（リトライ上限、dead-letter へ）
/// - Queued/Scheduled -> Paused | Deferred -> Queued（退避して resume）
/// - Queued/Scheduled/Paused/Deferred -> Cancelled
///
/// `Job::update_status` は正当性を検査しない。呼ぶのはエンジンだけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 作成直後、まだ受け付けられていない
    #[default]
    New,

    /// リトライ待ち（再受け付けの直前）
    Pending,

    /// 優先度ヒープにいる
    Queued,

    /// 保持されているが可視時刻が未来
    Scheduled,

    /// consumer が ack した
    Completed,

    /// リトライ上限に達した
    Failed,

    /// resume まで呼び出し側が延期した
    Deferred,

    /// 明示的に取り消された
    Cancelled,

    /// 一時的に配信対象外
    Paused,
}

impl JobStatus {
    /// ここから先の遷移はない
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 保持はされるが配信対象外
    pub fn is_parked(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Deferred)
    }

    /// `enqueue` が受け付ける状態
    pub fn is_admissible(self) -> bool {
        matches!(self, JobStatus::New | JobStatus::Pending)
    }
}
