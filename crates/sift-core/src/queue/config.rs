//! QueueConfig - キュー構築時のパラメータ

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RetryPolicy;
use crate::domain::{ConfigError, DEFAULT_MAX_RETRIES, Priority};

/// キューが構築時に必要とするもの。実行中は変わらない
///
/// 部分的な JSON からデシリアライズでき、欠けたフィールドはデフォルト値になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// このキューが受け付ける優先度
    pub priority_levels: Vec<Priority>,

    /// 保持中（queued / scheduled / parked）と checkout 中のジョブの合計上限。
    /// 超える `enqueue` は `QueueFull`。nack による再投入は checkout 中の枠を引き継ぐので上限を超えない
    pub buffer_capacity: usize,

    /// `PriorityQueue::create_job` で上限を指定しなかったときのリトライ上限
    pub default_max_retries: u32,

    /// nack されたジョブに適用するバックオフ
    pub retry: RetryPolicy,

    /// キューを識別するための任意のラベル（ログと運用向け）
    pub tags: BTreeMap<String, String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            priority_levels: Priority::all().collect(),
            buffer_capacity: 1024,
            default_max_retries: DEFAULT_MAX_RETRIES,
            retry: RetryPolicy::default(),
            tags: BTreeMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn new(priority_levels: Vec<Priority>, buffer_capacity: usize) -> Self {
        Self {
            priority_levels,
            buffer_capacity,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.priority_levels.is_empty() {
            return Err(ConfigError::EmptyPriorityOrder);
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidBufferSize(self.buffer_capacity));
        }
        Ok(())
    }

    pub fn admits(&self, priority: Priority) -> bool {
        self.priority_levels.contains(&priority)
    }
}
