//! PriorityQueue - インメモリの優先度付きジョブキュー
//!
//! # 設計
//! - `Mutex<QueueState>` 1 つがすべてのインデックスを守り、`Condvar` 1 つが待機中の consumer を起こす
//! - 可視なジョブはインデックス付きヒープ、遅延中のジョブは可視時刻順のインデックスに置く。
//!   遅延ジョブは consumer が覗くたびにロック内で昇格させる（lazy promotion）
//! - dequeue したジョブは checkout 状態になる。呼び出し側はコピーを受け取り、
//!   キューは `in_flight` に控えを持って ack / nack まで触らない
//!
//! # 起床の規則
//! - 可視なジョブが増えた: `notify_one`
//! - 可視時刻が変わった（遅延ジョブの受け付け、visibility 変更）: `notify_all`。
//!   タイマーなしで寝ている consumer にも待ち時間を計算し直させる
//! - checkout 後もヒープが空でなければ、次の consumer に起床を引き継ぐ

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::QueueConfig;
use super::heap::{Comparator, ReadyHeap, default_comparator};
use super::scheduled::ScheduledIndex;
use crate::domain::{Job, JobId, JobStatus, Metadata, Payload, Priority, SiftError};
use crate::observability::QueueCounts;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// `nack` がジョブをどう扱ったか
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// 再受け付けされた。`delay` 経過後に再び配信対象になる
    ///
    /// ジョブは `Pending` を経由するが、同じロック内で `Queued`（delay 0）か
    /// `Scheduled` に置き直されるため、`Pending` は外からは観測されない。
    Retrying { retry_count: u32, delay: Duration },

    /// リトライ上限。ジョブは `Failed` として dead-letter に入った
    DeadLettered { id: JobId, retry_count: u32 },
}

impl NackOutcome {
    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, NackOutcome::DeadLettered { .. })
    }

    /// 「もう一度走るか」だけを知りたい呼び出し側向け。
    /// dead-letter 行きは `SiftError::MaxAttemptsReached` になる
    pub fn into_result(self) -> Result<u32, SiftError> {
        match self {
            NackOutcome::Retrying { retry_count, .. } => Ok(retry_count),
            NackOutcome::DeadLettered { id, retry_count } => {
                Err(SiftError::MaxAttemptsReached { id, retry_count })
            }
        }
    }
}

struct QueueState {
    /// 可視なジョブ（優先度順）
    ready: ReadyHeap,

    /// 可視時刻が未来のジョブ
    scheduled: ScheduledIndex,

    /// pause / defer されたジョブ
    parked: HashMap<JobId, Job>,

    /// checkout 中（ack / nack 待ち）
    in_flight: HashMap<JobId, Job>,

    dead_letter: Vec<Job>,

    /// 到着順カウンタ（ヒープ順序の最後のタイブレーク）
    next_seq: u64,

    closed: bool,
}

impl QueueState {
    fn new(comparator: Comparator) -> Self {
        Self {
            ready: ReadyHeap::new(comparator),
            scheduled: ScheduledIndex::default(),
            parked: HashMap::new(),
            in_flight: HashMap::new(),
            dead_letter: Vec::new(),
            next_seq: 0,
            closed: false,
        }
    }

    fn held_len(&self) -> usize {
        self.ready.len() + self.scheduled.len() + self.parked.len()
    }

    /// `buffer_capacity` の対象（保持中 + checkout 中）
    fn occupied(&self) -> usize {
        self.held_len() + self.in_flight.len()
    }

    fn knows(&self, id: &JobId) -> bool {
        self.ready.contains(id)
            || self.scheduled.contains(id)
            || self.parked.contains_key(id)
            || self.in_flight.contains_key(id)
    }

    /// 可視性に応じてジョブを置く。すぐ配信できるなら true
    fn admit(&mut self, mut job: Job, now: DateTime<Utc>) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        if job.is_visible_at(now) {
            job.update_status(JobStatus::Queued);
            self.ready.push(job, seq);
            true
        } else {
            job.update_status(JobStatus::Scheduled);
            self.scheduled.insert(job, seq);
            false
        }
    }

    /// 可視時刻を過ぎたジョブをヒープへ移す。移した件数を返す
    fn promote_due(&mut self, now: DateTime<Utc>) -> usize {
        let mut promoted = 0;
        while let Some((mut job, seq)) = self.scheduled.pop_due(now) {
            job.update_status(JobStatus::Queued);
            debug!(job_id = %job.id(), "scheduled job became visible");
            self.ready.push(job, seq);
            promoted += 1;
        }
        promoted
    }

    fn check_out(&mut self) -> Option<Job> {
        let (job, _) = self.ready.pop()?;
        self.in_flight.insert(job.id().clone(), job.clone());
        Some(job)
    }

    /// 保持中（checkout 中ではない）のジョブをどのインデックスからでも外す
    fn take_held(&mut self, id: &JobId) -> Option<Job> {
        if let Some((job, _)) = self.ready.remove(id) {
            return Some(job);
        }
        if let Some((job, _)) = self.scheduled.remove(id) {
            return Some(job);
        }
        self.parked.remove(id)
    }

    fn find(&self, id: &JobId) -> Option<&Job> {
        self.ready
            .get(id)
            .or_else(|| self.scheduled.get(id))
            .or_else(|| self.parked.get(id))
            .or_else(|| self.in_flight.get(id))
            .or_else(|| self.dead_letter.iter().find(|job| job.id() == id))
    }

    fn counts(&self) -> QueueCounts {
        QueueCounts {
            queued: self.ready.len(),
            scheduled: self.scheduled.len(),
            parked: self.parked.len(),
            in_flight: self.in_flight.len(),
            dead_lettered: self.dead_letter.len(),
        }
    }
}

/// スレッド安全な優先度付きジョブキュー
///
/// producer と consumer の間では `Arc<PriorityQueue>` で共有する。
/// `buffer_capacity` を超える受け付けは `QueueFull` で拒否する（ブロックしない）。
/// 待つのは `dequeue` だけ。
pub struct PriorityQueue {
    id: String,
    config: QueueConfig,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PriorityQueue {
    /// デフォルトの comparator（priority -> created_at -> updated_at）で作る
    pub fn new(config: QueueConfig) -> Result<Self, SiftError> {
        Self::with_comparator(config, default_comparator)
    }

    /// 任意の順序で作る。max-heap が欲しければ比較を逆にした comparator を渡す
    pub fn with_comparator<F>(config: QueueConfig, comparator: F) -> Result<Self, SiftError>
    where
        F: Fn(&Job, &Job) -> Ordering + Send + Sync + 'static,
    {
        config.validate()?;
        let comparator: Comparator = Arc::new(comparator);
        Ok(Self {
            id: format!("queue-{}", Ulid::new()),
            config,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            clock: Arc::new(SystemClock),
            state: Mutex::new(QueueState::new(comparator)),
            available: Condvar::new(),
        })
    }

    /// `create_job` が使う ID 生成器を差し替える
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// 可視時刻とバックオフの判定に使う時計を差し替える
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 構築時に割り当てられるキューの識別子
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.config.tags
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// このキューの ID 生成器でジョブを作る。`max_retries: None` は設定のデフォルト
    pub fn create_job(
        &self,
        job_type: impl Into<String>,
        payload: Payload,
        priority: Priority,
        max_retries: Option<u32>,
        metadata: Option<&Metadata>,
    ) -> Result<Job, SiftError> {
        let max_retries = max_retries.unwrap_or(self.config.default_max_retries);
        Job::new(
            &*self.ids,
            job_type,
            payload,
            priority,
            i64::from(max_retries),
            metadata,
        )
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // インデックスを更新途中のまま抜けるクリティカルセクションはない
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ロックを手放した後に呼ぶ
    fn wake(&self, deliverable: bool) {
        if deliverable {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// ジョブを受け付ける。可視なら `Queued`、可視時刻が未来なら `Scheduled`
    ///
    /// 受け付けるのは `New` / `Pending` のジョブだけ。ack 済み・取消済み・dead-letter 済みの
    /// ジョブを入れ直すと `InvalidState`。
    pub fn enqueue(&self, job: Job) -> Result<(), SiftError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SiftError::Cancelled);
        }
        if !job.status().is_admissible() {
            return Err(SiftError::InvalidState {
                id: job.id().clone(),
                status: job.status(),
            });
        }
        if !self.config.admits(job.priority()) {
            warn!(job_id = %job.id(), priority = %job.priority(), "priority not configured for this queue");
            return Err(SiftError::InvalidPriority(i64::from(job.priority())));
        }
        if state.knows(job.id()) {
            return Err(SiftError::DuplicateJob(job.id().clone()));
        }
        let capacity = self.config.buffer_capacity;
        if state.occupied() >= capacity {
            warn!(job_id = %job.id(), capacity, "queue full, admission rejected");
            return Err(SiftError::QueueFull { capacity });
        }

        let (id, priority) = (job.id().clone(), job.priority());
        let visible = state.admit(job, self.clock.now());
        debug!(job_id = %id, %priority, visible, "job enqueued");

        drop(state);
        self.wake(visible);
        Ok(())
    }

    /// 可視なジョブが現れるまで待ち、最も優先度の高いものを checkout する
    ///
    /// キューが close されると `Cancelled`。
    pub fn dequeue(&self) -> Result<Job, SiftError> {
        self.next_job(None)
    }

    /// `dequeue` と同じ。ただし `timeout` で諦めて `Timeout` を返す
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Job, SiftError> {
        self.next_job(Some(timeout))
    }

    /// 待たない dequeue。いま配信できるものがなければ `QueueEmpty`
    pub fn try_dequeue(&self) -> Result<Job, SiftError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SiftError::Cancelled);
        }
        let promoted = state.promote_due(self.clock.now());
        let job = state.check_out().ok_or(SiftError::QueueEmpty)?;
        if promoted > 0 && !state.ready.is_empty() {
            self.available.notify_one();
        }
        Ok(job)
    }

    fn next_job(&self, timeout: Option<Duration>) -> Result<Job, SiftError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t).map(|at| (at, t)));
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(SiftError::Cancelled);
            }

            let now = self.clock.now();
            state.promote_due(now);
            if let Some(job) = state.check_out() {
                debug!(job_id = %job.id(), priority = %job.priority(), "job checked out");
                if !state.ready.is_empty() {
                    self.available.notify_one();
                }
                return Ok(job);
            }

            // 最も近い可視時刻・呼び出し側のタイムアウト・通知のいずれか早いものまで寝る
            let until_visible = state
                .scheduled
                .next_deadline()
                .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO));
            let until_timeout = match deadline {
                Some((at, timeout)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(SiftError::Timeout(timeout));
                    }
                    Some(left)
                }
                None => None,
            };
            let wait = match (until_visible, until_timeout) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            state = match wait {
                Some(wait) => {
                    self.available
                        .wait_timeout(state, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// 次に `dequeue` されるジョブ（checkout はしない）
    pub fn peek(&self) -> Result<Job, SiftError> {
        let mut state = self.lock();
        let promoted = state.promote_due(self.clock.now());
        let head = state.ready.peek().cloned().ok_or(SiftError::QueueEmpty);

        drop(state);
        if promoted > 0 {
            self.available.notify_all();
        }
        head
    }

    /// 実行成功。ジョブは `Completed` になり、キューから消える
    pub fn ack(&self, id: &JobId) -> Result<Job, SiftError> {
        let mut state = self.lock();
        let mut job = state
            .in_flight
            .remove(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;
        job.update_status(JobStatus::Completed);
        debug!(job_id = %id, "job completed");
        Ok(job)
    }

    /// 実行失敗
    ///
    /// リトライが残っていればバックオフ後に再び配信対象になり、なければ dead-letter へ。
    /// 再受け付けは checkout 中の枠をそのまま使うので `buffer_capacity` を超えない。
    pub fn nack(&self, id: &JobId) -> Result<NackOutcome, SiftError> {
        let mut state = self.lock();
        let mut job = state
            .in_flight
            .remove(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;

        job.increment_retry_count();
        let retry_count = job.retry_count();
        if job.status() == JobStatus::Failed {
            info!(queue_id = %self.id, job_id = %id, retry_count, "retries exhausted, job dead-lettered");
            state.dead_letter.push(job);
            return Ok(NackOutcome::DeadLettered {
                id: id.clone(),
                retry_count,
            });
        }

        let now = self.clock.now();
        let delay = self.config.retry.next_delay(retry_count);
        job.set_visibility_from(now, delay);
        let visible = state.admit(job, now);
        debug!(job_id = %id, retry_count, delay_ms = delay.as_millis() as u64, "job scheduled for retry");

        drop(state);
        self.wake(visible);
        Ok(NackOutcome::Retrying { retry_count, delay })
    }

    /// 保持中のジョブの優先度を変える。ヒープ上のジョブはその位置から sift し直す
    ///
    /// checkout 中のジョブは触らず `JobNotFound`。
    pub fn renice(&self, id: &JobId, priority: i64) -> Result<(), SiftError> {
        let validated = Priority::new(priority)?;
        if !self.config.admits(validated) {
            return Err(SiftError::InvalidPriority(priority));
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(result) = state.ready.update(id, |job| job.renice(priority)) {
            return result;
        }
        // scheduled のキーに priority は含まれないのでその場で書き換えてよい
        if let Some(job) = state.scheduled.get_mut(id) {
            return job.renice(priority);
        }
        match state.parked.get_mut(id) {
            Some(job) => job.renice(priority),
            None => Err(SiftError::JobNotFound(id.clone())),
        }
    }

    /// 保持中のジョブを `delay` の間隠す。0 なら即座に可視にする
    pub fn set_visibility(&self, id: &JobId, delay: Duration) -> Result<(), SiftError> {
        let now = self.clock.now();
        let mut state = self.lock();
        if let Some(job) = state.parked.get_mut(id) {
            job.set_visibility_from(now, delay);
            return Ok(());
        }
        let mut job = state
            .take_held(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;
        job.set_visibility_from(now, delay);
        let visible = state.admit(job, now);

        drop(state);
        self.wake(visible);
        Ok(())
    }

    /// 保持中のジョブを取り消す。checkout 中のジョブは `JobNotFound`
    pub fn cancel(&self, id: &JobId) -> Result<Job, SiftError> {
        let mut state = self.lock();
        let mut job = state
            .take_held(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;
        job.update_status(JobStatus::Cancelled);
        info!(queue_id = %self.id, job_id = %id, "job cancelled");
        Ok(job)
    }

    /// resume まで配信対象から外す
    pub fn pause(&self, id: &JobId) -> Result<(), SiftError> {
        self.park(id, JobStatus::Paused)
    }

    /// resume まで延期する。visibility と違って期限はない
    pub fn defer(&self, id: &JobId) -> Result<(), SiftError> {
        self.park(id, JobStatus::Deferred)
    }

    fn park(&self, id: &JobId, status: JobStatus) -> Result<(), SiftError> {
        let mut state = self.lock();
        if let Some(job) = state.parked.get_mut(id) {
            job.update_status(status);
            return Ok(());
        }
        let mut job = state
            .take_held(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;
        job.update_status(status);
        debug!(job_id = %id, ?status, "job parked");
        state.parked.insert(id.clone(), job);
        Ok(())
    }

    /// pause / defer したジョブを再受け付けする
    pub fn resume(&self, id: &JobId) -> Result<(), SiftError> {
        let mut state = self.lock();
        let job = state
            .parked
            .remove(id)
            .ok_or_else(|| SiftError::JobNotFound(id.clone()))?;
        let visible = state.admit(job, self.clock.now());
        debug!(job_id = %id, visible, "job resumed");

        drop(state);
        self.wake(visible);
        Ok(())
    }

    /// キュー内のどこかにあるジョブのスナップショット（checkout 中・dead-letter 含む）
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.lock().find(id).cloned()
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.lock().find(id).map(Job::status)
    }

    /// リトライ上限に達したジョブ（古い順）
    pub fn dead_letter(&self) -> Vec<Job> {
        self.lock().dead_letter.clone()
    }

    /// 運用者による dead-letter の回収
    pub fn purge_dead_letter(&self) -> Vec<Job> {
        let drained = mem::take(&mut self.lock().dead_letter);
        info!(queue_id = %self.id, count = drained.len(), "dead-letter sink purged");
        drained
    }

    /// 保持中のジョブ数（queued + scheduled + parked）。checkout 中と dead-letter は含まない
    pub fn len(&self) -> usize {
        self.lock().held_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut state = self.lock();
        let promoted = state.promote_due(self.clock.now());
        let counts = state.counts();

        drop(state);
        if promoted > 0 {
            self.available.notify_all();
        }
        counts
    }

    /// キューを止める。待機中と以後の `dequeue` は `Cancelled`、新規の受け付けもしない。
    /// checkout 中のジョブの `ack` / `nack` は引き続き使える
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        info!(
            queue_id = %self.id,
            held = state.held_len(),
            in_flight = state.in_flight.len(),
            "queue closed"
        );

        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
