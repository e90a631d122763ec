//! ReadyHeap - 配信可能なジョブのインデックス付き二分ヒープ
//!
//! # 設計
//! - `entries` がヒープ配列。各ジョブは自分の位置を `Job::index` に持つ
//! - `slots` は JobId -> 位置。id 指定の削除と優先度変更は O(log n)
//! - comparator で同順位なら到着順（seq）で決める。順序は常に全順序

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Job, JobId};

/// どのジョブを先に配信するかを決める順序。`Less` が「先」
pub type Comparator = Arc<dyn Fn(&Job, &Job) -> Ordering + Send + Sync>;

/// priority 昇順、次に作成時刻、最後に更新時刻
pub fn default_comparator(a: &Job, b: &Job) -> Ordering {
    a.priority()
        .cmp(&b.priority())
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.updated_at().cmp(&b.updated_at()))
}

struct Entry {
    job: Job,
    seq: u64,
}

pub(crate) struct ReadyHeap {
    entries: Vec<Entry>,
    slots: HashMap<JobId, usize>,
    comparator: Comparator,
}

impl ReadyHeap {
    pub(crate) fn new(comparator: Comparator) -> Self {
        Self {
            entries: Vec::new(),
            slots: HashMap::new(),
            comparator,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn contains(&self, id: &JobId) -> bool {
        self.slots.contains_key(id)
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<&Job> {
        self.slots.get(id).map(|&slot| &self.entries[slot].job)
    }

    pub(crate) fn peek(&self) -> Option<&Job> {
        self.entries.first().map(|e| &e.job)
    }

    pub(crate) fn push(&mut self, mut job: Job, seq: u64) {
        let slot = self.entries.len();
        job.index = Some(slot);
        self.slots.insert(job.id().clone(), slot);
        self.entries.push(Entry { job, seq });
        self.sift_up(slot);
    }

    pub(crate) fn pop(&mut self) -> Option<(Job, u64)> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    pub(crate) fn remove(&mut self, id: &JobId) -> Option<(Job, u64)> {
        let slot = *self.slots.get(id)?;
        Some(self.remove_at(slot))
    }

    /// ジョブをその場で書き換え、その位置からヒープ順序を直す
    pub(crate) fn update<R>(&mut self, id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let slot = *self.slots.get(id)?;
        let result = f(&mut self.entries[slot].job);
        self.fix(slot);
        Some(result)
    }

    fn remove_at(&mut self, slot: usize) -> (Job, u64) {
        let Entry { mut job, seq } = self.entries.swap_remove(slot);
        self.slots.remove(job.id());
        job.index = None;
        if slot < self.entries.len() {
            // 末尾にいたエントリが `slot` に来ている
            self.reindex(slot);
            self.fix(slot);
        }
        (job, seq)
    }

    fn less(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);
        (self.comparator)(&a.job, &b.job).then(a.seq.cmp(&b.seq)) == Ordering::Less
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.reindex(i);
        self.reindex(j);
    }

    fn reindex(&mut self, slot: usize) {
        let job = &mut self.entries[slot].job;
        job.index = Some(slot);
        if let Some(s) = self.slots.get_mut(job.id()) {
            *s = slot;
        }
    }

    fn fix(&mut self, slot: usize) {
        if !self.sift_up(slot) {
            self.sift_down(slot);
        }
    }

    /// 動いたら true
    fn sift_up(&mut self, mut slot: usize) -> bool {
        let start = slot;
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(slot, parent) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
        slot != start
    }

    fn sift_down(&mut self, mut slot: usize) {
        let n = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, slot) {
                break;
            }
            self.swap(slot, child);
            slot = child;
        }
    }
}
