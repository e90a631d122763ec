//! ドメインの識別子
//!
//! `JobId` は不透明な文字列 ID です。生成方法（ULID, nanoid, DB sequence など）は
//! `ports::IdGenerator` に任せ、ドメイン側は中身を解釈しません。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// ULID 由来の ID に付けるプレフィックス
pub const JOB_ID_PREFIX: &str = "job-";

/// ジョブの識別子。ジョブの生存中は変わらない
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self(format!("{JOB_ID_PREFIX}{ulid}"))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
