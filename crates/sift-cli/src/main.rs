//! sift デモ: ハンドラを登録し、いくつかの優先度でジョブを流して結果を出す

mod config;
mod error;
mod runtime;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sift_core::{Job, Payload, Priority, PriorityQueue};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::error::CliError;
use crate::runtime::{HandlerRegistry, JobHandler, Runtime};
use crate::worker::WorkerGroup;

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

/// 指定回数だけ失敗してから挨拶する
struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl JobHandler for HelloHandler {
    async fn handle(&self, job: &Job) -> Result<(), CliError> {
        let p: HelloPayload = serde_json::from_value(job.payload.clone().into())?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(CliError::HandlerFailed(format!(
                "intentional failure (left={left})"
            )));
        }

        info!(job_id = %job.id(), priority = %job.priority(), "Hello, {}!", p.name);
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();

    let config = CliConfig::from_env()?;
    let queue = Arc::new(PriorityQueue::new(config.queue.clone())?);
    info!(queue_id = queue.id(), tags = ?queue.tags(), "queue ready");

    let mut reg = HandlerRegistry::new();
    reg.register("hello", Arc::new(HelloHandler::new(2)))?;
    info!(handlers = reg.len(), workers = config.workers, "starting workers");
    let runtime = Arc::new(Runtime::new(Arc::new(reg)));

    let group = WorkerGroup::spawn(
        config.workers,
        Arc::clone(&queue),
        runtime,
        config.poll_interval(),
    );

    // 設定で最も優先度の高いレベルに急ぎのジョブを入れる
    let levels = &queue.config().priority_levels;
    let urgent = levels.iter().min().copied().unwrap_or(Priority::HIGH);
    let relaxed = levels.iter().max().copied().unwrap_or(Priority::LOW);
    for (name, priority) in [("later", relaxed), ("sift", urgent), ("world", relaxed)] {
        let job = queue.create_job(
            "hello",
            payload(serde_json::json!({ "name": name })),
            priority,
            None,
            None,
        )?;
        info!(job_id = %job.id(), %priority, "enqueue");
        queue.enqueue(job)?;
    }

    while !(queue.is_empty() && queue.in_flight_len() == 0) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let counts = queue.counts();
    info!(counts = %serde_json::to_string(&counts)?, "queue drained");
    for job in queue.dead_letter() {
        info!(job_id = %job.id(), retry_count = job.retry_count(), "dead-lettered");
    }

    queue.close();
    group.shutdown_and_join().await;
    Ok(())
}
