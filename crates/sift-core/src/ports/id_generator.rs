//! IdGenerator port - ID 生成の抽象化
//!
//! コアは ID の生成アルゴリズムを知りません。失敗し得る操作として扱い、
//! 失敗した場合は Job の生成そのものを中止します（リトライはしない）。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（デフォルト）

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::{JobId, SiftError};
use crate::ports::Clock;

/// IdGenerator は一意な JobId を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の producer から共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> Result<JobId, SiftError>;
}

impl<T: IdGenerator + ?Sized> IdGenerator for Arc<T> {
    fn generate_id(&self) -> Result<JobId, SiftError> {
        (**self).generate_id()
    }
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock の時刻をタイムスタンプ部に、乱数をランダム部に使います。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_id(&self) -> Result<JobId, SiftError> {
        let millis = self.clock.now().timestamp_millis();
        // ULID のタイムスタンプは 48-bit の unix millis
        let timestamp_ms = u64::try_from(millis)
            .ok()
            .filter(|ms| *ms < (1 << 48))
            .ok_or_else(|| {
                SiftError::IdGenerationFailed(format!("clock out of ULID range: {millis}ms"))
            })?;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Ok(JobId::from(ulid))
    }
}
