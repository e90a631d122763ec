//! sift-core
//!
//! プロセス内で動く優先度付きジョブキュー
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, status, metadata, job, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **queue**: キュー本体（PriorityQueue, QueueConfig, RetryPolicy, comparator）
//! - **observability**: 状態のスナップショット（QueueCounts）

pub mod domain;
pub mod observability;
pub mod ports;
pub mod queue;

pub use domain::{
    ConfigError, DEFAULT_MAX_RETRIES, ErrorKind, Job, JobId, JobStatus, Metadata, Payload,
    Priority, SiftError,
};
pub use observability::QueueCounts;
pub use ports::{Clock, IdGenerator, ManualClock, SystemClock, UlidGenerator};
pub use queue::{NackOutcome, PriorityQueue, QueueConfig, RetryPolicy};
