//! RetryPolicy - 失敗した実行の間のバックオフを決める

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// nack されたジョブをキューに戻すときの指数バックオフ
///
/// 遅延はそのままジョブの visibility 遅延になる。経過するまでジョブは保持されるが配信されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最初のリトライまでの遅延
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// リトライごとの倍率
    pub multiplier: f64,

    /// 1 回の遅延の上限
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// リトライしたジョブをすぐ配信対象に戻す
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// `retry_count` 回目（1 始まり）のリトライまでの遅延
    ///
    /// `base_delay * multiplier^(retry_count - 1)` を `max_delay` で頭打ちにする。
    /// base=2s, multiplier=2.0 なら 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
