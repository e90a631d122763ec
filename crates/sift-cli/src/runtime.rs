//! ハンドラの登録と job_type によるディスパッチ

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sift_core::Job;
use tracing::warn;

use crate::error::CliError;

/// ある `job_type` のジョブを実行する
///
/// ハンドラはジョブのコピーを受け取る。payload のデコードはハンドラ次第。
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), CliError>;
}

/// ハンドラの登録簿（job_type -> handler）
///
/// 初期化時に組み立て、ワーカー起動後は読み取り専用。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), CliError> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(CliError::DuplicateHandler(job_type));
        }
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get(&self, job_type: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// checkout したジョブを型に対応するハンドラへ渡す
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        if registry.is_empty() {
            warn!("runtime has no handlers; every job will fail with HandlerNotFound");
        }
        Self { registry }
    }

    pub async fn execute(&self, job: &Job) -> Result<(), CliError> {
        let handler = self
            .registry
            .get(&job.job_type)
            .ok_or_else(|| CliError::HandlerNotFound(job.job_type.clone()))?;

        handler.handle(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{Payload, Priority, PriorityQueue, QueueConfig};

    struct OkHandler;

    #[async_trait]
    impl JobHandler for OkHandler {
        async fn handle(&self, _job: &Job) -> Result<(), CliError> {
            Ok(())
        }
    }

    fn job(job_type: &str) -> Job {
        PriorityQueue::new(QueueConfig::default())
            .unwrap()
            .create_job(job_type, Payload::new(), Priority::MEDIUM, None, None)
            .unwrap()
    }

    #[tokio::test]
    async fn runtime_executes_registered_handler() {
        let mut reg = HandlerRegistry::new();
        assert!(reg.is_empty());
        reg.register("ok", Arc::new(OkHandler)).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());

        let rt = Runtime::new(Arc::new(reg));
        rt.execute(&job("ok")).await.unwrap();
    }

    #[tokio::test]
    async fn runtime_errors_when_handler_missing() {
        let rt = Runtime::new(Arc::new(HandlerRegistry::new()));
        let err = rt.execute(&job("missing")).await.unwrap_err();
        assert!(matches!(err, CliError::HandlerNotFound(t) if t == "missing"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register("ok", Arc::new(OkHandler)).unwrap();
        let err = reg.register("ok", Arc::new(OkHandler)).unwrap_err();
        assert!(matches!(err, CliError::DuplicateHandler(_)));
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());
    }
}
