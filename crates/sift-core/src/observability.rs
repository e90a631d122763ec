//! キュー状態のスナップショット

use serde::{Deserialize, Serialize};

/// いまジョブがどこにいるか
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// 可視。ヒープで配信待ち
    pub queued: usize,
    /// 可視時刻待ち
    pub scheduled: usize,
    /// pause / defer 中
    pub parked: usize,
    /// checkout 中（ack / nack 待ち）
    pub in_flight: usize,
    pub dead_lettered: usize,
}

impl QueueCounts {
    /// これから配信されうる保持中のジョブ数
    pub fn held(&self) -> usize {
        self.queued + self.scheduled + self.parked
    }
}
