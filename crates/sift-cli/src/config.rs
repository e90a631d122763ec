//! プロセス設定: 任意の JSON ファイルと環境変数による上書き
//!
//! - `SIFT_CONFIG`: [`CliConfig`] の形をした JSON ファイルのパス。欠けたフィールドはデフォルト
//! - `SIFT_WORKERS`: ワーカー数。ファイルの値より優先

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sift_core::QueueConfig;

use crate::error::CliError;

pub const CONFIG_PATH_VAR: &str = "SIFT_CONFIG";
pub const WORKERS_VAR: &str = "SIFT_WORKERS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub queue: QueueConfig,
    pub workers: usize,
    /// ワーカーが shutdown を確認し直すまでキューで待つ時間
    pub poll_interval_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            workers: 2,
            poll_interval_ms: 200,
        }
    }
}

impl CliConfig {
    pub fn from_env() -> Result<Self, CliError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(raw) = std::env::var(WORKERS_VAR) {
            config.workers = parse_workers(&raw)?;
        }
        if config.workers == 0 {
            return Err(CliError::InvalidSetting {
                name: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn parse_workers(raw: &str) -> Result<usize, CliError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| CliError::InvalidSetting {
            name: WORKERS_VAR,
            reason: e.to_string(),
        })
}
