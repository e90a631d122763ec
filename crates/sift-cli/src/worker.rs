//! tokio 上のワーカー: キューから取り出し、実行し、ack / nack する

use std::sync::Arc;
use std::time::Duration;

use sift_core::{NackOutcome, PriorityQueue, SiftError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::runtime::Runtime;

/// ワーカー群のハンドル
/// - `request_shutdown` で新しいジョブの取得を止める
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
/// - キューを `close()` してもワーカーは抜ける
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// `n` 個のワーカーを起動する。1 回の待ちは最大 `poll`
    pub fn spawn(
        n: usize,
        queue: Arc<PriorityQueue>,
        runtime: Arc<Runtime>,
        poll: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let q = Arc::clone(&queue);
                let rt = Arc::clone(&runtime);
                let rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, q, rt, poll, rx))
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    /// 新しいジョブの取得を止める。実行中のハンドラは最後まで走り、結果を報告する
    pub fn request_shutdown(&self) {
        // 受信側はもういないかもしれない
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(e) = j.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<PriorityQueue>,
    runtime: Arc<Runtime>,
    poll: Duration,
    shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // dequeue は condvar で寝るので blocking pool で動かす
        let q = Arc::clone(&queue);
        let next = tokio::task::spawn_blocking(move || q.dequeue_timeout(poll)).await;

        let job = match next {
            Ok(Ok(job)) => job,
            Ok(Err(SiftError::Timeout(_))) => continue,
            Ok(Err(SiftError::Cancelled)) => break,
            Ok(Err(e)) => {
                error!(worker_id, error = %e, "dequeue failed");
                break;
            }
            Err(e) => {
                error!(worker_id, error = %e, "dequeue task panicked");
                break;
            }
        };

        let id = job.id().clone();
        match runtime.execute(&job).await {
            Ok(()) => {
                if let Err(e) = queue.ack(&id) {
                    warn!(worker_id, job_id = %id, error = %e, "ack failed");
                }
            }
            Err(err) => {
                warn!(worker_id, job_id = %id, error = %err, "job failed");
                match queue.nack(&id) {
                    Ok(NackOutcome::Retrying { retry_count, delay }) => {
                        debug!(worker_id, job_id = %id, retry_count, ?delay, "retry scheduled");
                    }
                    Ok(NackOutcome::DeadLettered { retry_count, .. }) => {
                        info!(worker_id, job_id = %id, retry_count, "job dead-lettered");
                    }
                    Err(e) => warn!(worker_id, job_id = %id, error = %e, "nack failed"),
                }
            }
        }
    }
    debug!(worker_id, "worker stopped");
}
