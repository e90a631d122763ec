//! Errors - エラー型と分類
//!
//! すべての失敗は `SiftError` の variant として区別でき、
//! `ErrorKind` によって「後で再試行」「入力を直す」「ライフサイクル終了」を判別できます。

use std::time::Duration;

use thiserror::Error;

use super::ids::JobId;
use super::state::JobStatus;

/// ErrorKind は運用上の分類
///
/// - Transient: 一時的（時間をおいて再試行すれば通る可能性がある）
/// - Permanent: 恒久的（設定や入力を直さない限り通らない）
/// - Terminal: ライフサイクル上の終端（キュー停止、リトライ上限）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Terminal,
}

/// キュー構築パラメータの不備
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("priority order cannot be empty")]
    EmptyPriorityOrder,

    #[error("buffer size must be greater than zero (got {0})")]
    InvalidBufferSize(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiftError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("invalid priority value: {0}")]
    InvalidPriority(i64),

    #[error("failed to generate job id: {0}")]
    IdGenerationFailed(String),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already held by the queue: {0}")]
    DuplicateJob(JobId),

    /// 受け付けられるのは New / Pending のジョブだけ
    #[error("job {id} cannot be admitted from status {status:?}")]
    InvalidState { id: JobId, status: JobStatus },

    /// 不変条件を満たさないシリアライズ済みレコード
    #[error("invalid job record: {0}")]
    InvalidRecord(String),

    #[error("max attempts reached for {id} after {retry_count} retries")]
    MaxAttemptsReached { id: JobId, retry_count: u32 },

    #[error("queue has been shut down")]
    Cancelled,

    #[error("no job became eligible within {0:?}")]
    Timeout(Duration),
}

impl SiftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SiftError::QueueEmpty
            | SiftError::QueueFull { .. }
            | SiftError::Timeout(_)
            | SiftError::IdGenerationFailed(_) => ErrorKind::Transient,
            SiftError::InvalidConfiguration(_)
            | SiftError::InvalidPriority(_)
            | SiftError::JobNotFound(_)
            | SiftError::DuplicateJob(_)
            | SiftError::InvalidState { .. }
            | SiftError::InvalidRecord(_) => ErrorKind::Permanent,
            SiftError::MaxAttemptsReached { .. } | SiftError::Cancelled => ErrorKind::Terminal,
        }
    }

    /// Worth retrying the same call later?
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
