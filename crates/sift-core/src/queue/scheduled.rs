//! ScheduledIndex - まだ可視でない保持中ジョブを可視時刻順に並べる

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::{Job, JobId};

type Key = (DateTime<Utc>, u64);

/// 可視時刻を待っているジョブ
///
/// キーは (visibility_at, 到着順)。同じ時刻に可視になるジョブは到着順で昇格する。
#[derive(Default)]
pub(crate) struct ScheduledIndex {
    by_deadline: BTreeMap<Key, Job>,
    keys: HashMap<JobId, Key>,
}

impl ScheduledIndex {
    pub(crate) fn len(&self) -> usize {
        self.by_deadline.len()
    }

    pub(crate) fn contains(&self, id: &JobId) -> bool {
        self.keys.contains_key(id)
    }

    /// 可視時刻のないジョブは即時に期限到来として扱う
    pub(crate) fn insert(&mut self, job: Job, seq: u64) {
        let at = job.visibility_at().unwrap_or(DateTime::<Utc>::MIN_UTC);
        let key = (at, seq);
        self.keys.insert(job.id().clone(), key);
        self.by_deadline.insert(key, job);
    }

    pub(crate) fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.by_deadline.first_key_value().map(|((at, _), _)| *at)
    }

    /// 可視時刻が `now` 以前で最も早いジョブを取り出す
    pub(crate) fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(Job, u64)> {
        if self.next_deadline()? > now {
            return None;
        }
        let ((_, seq), job) = self.by_deadline.pop_first()?;
        self.keys.remove(job.id());
        Some((job, seq))
    }

    pub(crate) fn remove(&mut self, id: &JobId) -> Option<(Job, u64)> {
        let key = self.keys.remove(id)?;
        self.by_deadline.remove(&key).map(|job| (job, key.1))
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<&Job> {
        self.keys.get(id).and_then(|key| self.by_deadline.get(key))
    }

    /// `visibility_at` はキーの一部なので、ここで書き換えてはいけない
    pub(crate) fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        let key = self.keys.get(id)?;
        self.by_deadline.get_mut(key)
    }
}
