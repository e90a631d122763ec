//! バイナリのエラー型

use sift_core::SiftError;
use thiserror::Error;

/// デモバイナリとワーカーランタイムのエラー
#[derive(Debug, Error)]
pub enum CliError {
    #[error("handler already registered for job type: {0}")]
    DuplicateHandler(String),

    #[error("no handler registered for job type: {0}")]
    HandlerNotFound(String),

    #[error("handler failed: {0}")]
    HandlerFailed(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("queue error: {0}")]
    Queue(#[from] SiftError),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
