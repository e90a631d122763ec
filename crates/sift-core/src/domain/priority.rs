//! 優先度のスケール

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::SiftError;

/// `1..=10` の優先度
///
/// 数字が小さいほど優先度が高い。derive した `Ord` がクレート全体の配信順序になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 10;

    pub const HIGH: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(5);
    pub const LOW: Priority = Priority(10);

    /// 範囲外は丸めずに `InvalidPriority`
    pub fn new(value: i64) -> Result<Self, SiftError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SiftError::InvalidPriority(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// 全レベル（高い順）
    pub fn all() -> impl Iterator<Item = Priority> {
        (Self::MIN..=Self::MAX).map(|v| Priority(v as u8))
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl TryFrom<i64> for Priority {
    type Error = SiftError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        i64::from(priority.0)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
