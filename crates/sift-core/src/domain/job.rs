//! Job - ジョブ本体と status / retry / visibility の状態遷移

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::SiftError;
use super::ids::JobId;
use super::metadata::Metadata;
use super::priority::Priority;
use super::state::JobStatus;
use crate::ports::IdGenerator;

/// `max_retries` に負の値が渡されたときのリトライ上限
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// ジョブのペイロード（中身の解釈は呼び出し側と job_type のハンドラが決める）
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Job は実行単位
///
/// # 設計
/// - `id` は `IdGenerator` が一度だけ割り当て、以後変わらない
/// - 状態遷移はメソッド経由。どの遷移が正当かはキューエンジンが判断する
/// - `index` はキューが持つヒープ上の位置で、ジョブの同一性には含まれない
/// - デシリアライズは `JobRecord` を経由して不変条件を検証する
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "JobRecord")]
pub struct Job {
    id: JobId,
    pub job_type: String,
    pub payload: Payload,
    priority: Priority,
    retry_count: u32,
    max_retries: u32,
    status: JobStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
    #[serde(skip)]
    pub(crate) index: Option<usize>,
}

/// シリアライズ済みのジョブ（検証前）
#[derive(Debug, Deserialize)]
struct JobRecord {
    id: JobId,
    job_type: String,
    payload: Payload,
    priority: Priority,
    retry_count: u32,
    max_retries: u32,
    status: JobStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    visibility_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Metadata,
}

impl TryFrom<JobRecord> for Job {
    type Error = SiftError;

    fn try_from(r: JobRecord) -> Result<Self, Self::Error> {
        if r.retry_count > r.max_retries {
            return Err(SiftError::InvalidRecord(format!(
                "{}: retry_count {} exceeds max_retries {}",
                r.id, r.retry_count, r.max_retries
            )));
        }
        if r.updated_at < r.created_at {
            return Err(SiftError::InvalidRecord(format!(
                "{}: updated_at precedes created_at",
                r.id
            )));
        }
        Ok(Self {
            id: r.id,
            job_type: r.job_type,
            payload: r.payload,
            priority: r.priority,
            retry_count: r.retry_count,
            max_retries: r.max_retries,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
            visibility_at: r.visibility_at,
            metadata: r.metadata,
            index: None,
        })
    }
}

impl Job {
    /// status `New` のジョブを作る
    ///
    /// - 負の `max_retries` は [`DEFAULT_MAX_RETRIES`] に置き換える
    /// - `metadata` はコピーする（呼び出し側の後からの変更は届かない）
    /// - ID 生成に失敗したらジョブは作られない
    pub fn new(
        ids: &dyn IdGenerator,
        job_type: impl Into<String>,
        payload: Payload,
        priority: Priority,
        max_retries: i64,
        metadata: Option<&Metadata>,
    ) -> Result<Self, SiftError> {
        let id = ids.generate_id()?;
        let max_retries = u32::try_from(max_retries).unwrap_or(DEFAULT_MAX_RETRIES);
        let now = Utc::now();
        Ok(Self {
            id,
            job_type: job_type.into(),
            payload,
            priority,
            retry_count: 0,
            max_retries,
            status: JobStatus::New,
            created_at: now,
            updated_at: now,
            visibility_at: None,
            metadata: metadata.cloned().unwrap_or_default(),
            index: None,
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn visibility_at(&self) -> Option<DateTime<Utc>> {
        self.visibility_at
    }

    /// ヒープ上の位置。キューの優先度ヒープにいないときは `None`
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 無条件に遷移する
    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        self.touch();
    }

    /// 失敗した実行を 1 回記録する
    ///
    /// 上限に達していなければ `retry_count` を 1 増やして `Pending` に、
    /// 達していれば回数はそのままで `Failed` にする。
    pub fn increment_retry_count(&mut self) {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.update_status(JobStatus::Pending);
        } else {
            self.update_status(JobStatus::Failed);
        }
    }

    pub fn reset_retry_count(&mut self) {
        self.retry_count = 0;
        self.update_status(JobStatus::New);
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 優先度を変える。不正な値ならジョブは変更しない
    pub fn renice(&mut self, priority: i64) -> Result<(), SiftError> {
        self.priority = Priority::new(priority)?;
        self.touch();
        Ok(())
    }

    /// 現在時刻から `delay` の間ジョブを隠す。0 なら即座に可視に戻す
    pub fn set_visibility(&mut self, delay: Duration) {
        self.set_visibility_from(Utc::now(), delay);
    }

    /// `now` を基準に可視時刻を決める（キューは自分の Clock の時刻を渡す）
    pub fn set_visibility_from(&mut self, now: DateTime<Utc>, delay: Duration) {
        self.visibility_at = if delay.is_zero() {
            None
        } else {
            // chrono の範囲を超える delay は「永久に不可視」
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            Some(
                now.checked_add_signed(delay)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            )
        };
        self.touch();
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible_at(Utc::now())
    }

    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.visibility_at.is_none_or(|at| at <= now)
    }

    /// 可視になるまでの残り時間。すでに可視なら `None`
    pub fn visible_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.visibility_at?;
        (at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.set(key, value);
        self.touch();
    }

    pub fn metadata_map(&self) -> &Metadata {
        &self.metadata
    }

    fn touch(&mut self) {
        // Utc::now は単調ではないので updated_at >= created_at を保つ
        self.updated_at = Utc::now().max(self.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};
    use rstest::rstest;
    use serde_json::json;

    struct BrokenIds;

    impl IdGenerator for BrokenIds {
        fn generate_id(&self) -> Result<JobId, SiftError> {
            Err(SiftError::IdGenerationFailed("entropy exhausted".to_string()))
        }
    }

    fn job(max_retries: i64) -> Job {
        Job::new(
            &UlidGenerator::new(SystemClock),
            "email",
            Payload::new(),
            Priority::MEDIUM,
            max_retries,
            None,
        )
        .unwrap()
    }

    #[test]
    fn new_job_starts_fresh() {
        let job = job(3);
        assert_eq!(job.status(), JobStatus::New);
        assert_eq!(job.retry_count(), 0);
        assert_eq!(job.max_retries(), 3);
        assert_eq!(job.index(), None);
        assert!(job.is_visible());
        assert!(job.updated_at() >= job.created_at());
    }

    #[test]
    fn negative_max_retries_uses_default() {
        assert_eq!(job(-1).max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn id_failure_aborts_creation() {
        let result = Job::new(&BrokenIds, "email", Payload::new(), Priority::HIGH, 1, None);
        assert!(matches!(result, Err(SiftError::IdGenerationFailed(_))));
    }

    #[test]
    fn metadata_is_copied_at_creation() {
        let mut meta = Metadata::new();
        meta.set("tenant", "acme");
        let job = Job::new(
            &UlidGenerator::new(SystemClock),
            "email",
            Payload::new(),
            Priority::LOW,
            1,
            Some(&meta),
        )
        .unwrap();

        meta.set("tenant", "other");
        assert_eq!(job.metadata("tenant"), Some(&json!("acme")));
        assert_eq!(job.metadata("missing"), None);
    }

    #[rstest]
    #[case::no_retries(0)]
    #[case::one(1)]
    #[case::several(4)]
    fn increments_until_failed(#[case] max_retries: u32) {
        let mut job = job(i64::from(max_retries));
        for expected in 1..=max_retries {
            job.increment_retry_count();
            assert_eq!(job.retry_count(), expected);
            assert_eq!(job.status(), JobStatus::Pending);
        }
        assert!(!job.is_retryable());

        job.increment_retry_count();
        assert_eq!(job.retry_count(), max_retries);
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn reset_returns_to_new() {
        let mut job = job(2);
        job.increment_retry_count();
        job.reset_retry_count();
        assert_eq!(job.retry_count(), 0);
        assert_eq!(job.status(), JobStatus::New);
        assert!(job.is_retryable());
    }

    #[test]
    fn invalid_renice_changes_nothing() {
        let mut job = job(1);
        let before = job.updated_at();

        assert_eq!(job.renice(11), Err(SiftError::InvalidPriority(11)));
        assert_eq!(job.priority(), Priority::MEDIUM);
        assert_eq!(job.updated_at(), before);

        job.renice(1).unwrap();
        assert_eq!(job.priority(), Priority::HIGH);
    }

    #[test]
    fn visibility_roundtrip() {
        let mut job = job(1);
        job.set_visibility(Duration::from_millis(30));
        assert!(!job.is_visible());
        assert!(job.visible_in(Utc::now()).is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(job.is_visible());

        job.set_visibility(Duration::from_secs(60));
        job.set_visibility(Duration::ZERO);
        assert!(job.is_visible());
        assert_eq!(job.visibility_at(), None);
    }

    #[test]
    fn serializes_as_flat_record_without_index() {
        let mut job = job(2);
        job.index = Some(4);
        job.set_metadata("trace", "abc");

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job_type"], "email");
        assert_eq!(value["priority"], 5);
        assert_eq!(value["status"], "new");
        assert_eq!(value["metadata"]["trace"], "abc");
        assert!(value.get("index").is_none());

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back.id(), job.id());
        assert_eq!(back.index(), None);
    }

    #[test]
    fn visibility_is_measured_from_the_given_instant() {
        let mut job = job(1);
        let base = Utc::now() + chrono::Duration::hours(1);
        job.set_visibility_from(base, Duration::from_secs(10));

        assert_eq!(job.visibility_at(), Some(base + chrono::Duration::seconds(10)));
        assert!(!job.is_visible_at(base));
        assert!(job.is_visible_at(base + chrono::Duration::seconds(10)));
    }

    #[rstest]
    #[case::retries_over_budget(json!({ "retry_count": 4, "max_retries": 3 }))]
    #[case::updated_before_created(json!({ "updated_at": "2020-01-01T00:00:00Z" }))]
    fn rejects_records_that_break_invariants(#[case] patch: serde_json::Value) {
        let mut value = serde_json::to_value(job(3)).unwrap();
        for (k, v) in patch.as_object().unwrap() {
            value[k] = v.clone();
        }

        let err = serde_json::from_value::<Job>(value).unwrap_err();
        assert!(err.to_string().contains("invalid job record"));
    }
}
