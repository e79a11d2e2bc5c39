//! Worker Pool
//!
//! Fixed set of consumer tasks that pull deliveries from the broker and run
//! them through the job processor. Store-level failures requeue the delivery
//! up to a delivery cap; job-level failures are already persisted by the
//! processor and need no redelivery.

use crate::broker::{Delivery, JobBroker};
use crate::client::JobProcessor;
use crate::job::JobStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delivery cap per job, counting the first delivery.
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,

    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,

    /// How long an idle worker blocks on the broker before rechecking the
    /// running flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_workers() -> usize {
    5
}

fn default_max_deliveries() -> u32 {
    3
}

fn default_redelivery_delay_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_deliveries: default_max_deliveries(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be positive".to_string());
        }
        if self.max_deliveries == 0 {
            return Err("max_deliveries must be positive".to_string());
        }
        Ok(())
    }
}

/// Counters shared by all workers in a pool.
#[derive(Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    redelivered: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub redelivered: u64,
    pub dropped: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Pool of broker consumers.
pub struct WorkerPool {
    broker: Arc<dyn JobBroker>,
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        processor: Arc<JobProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            broker,
            processor,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(WorkerStats::default()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the configured number of worker tasks. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(workers = self.config.workers, "starting worker pool");

        let mut handles = self.handles.lock();
        for worker_id in 0..self.config.workers {
            let broker = self.broker.clone();
            let processor = self.processor.clone();
            let running = self.running.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, broker, processor, running, stats, config).await;
            }));
        }
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping worker pool");
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task panicked during shutdown");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    broker: Arc<dyn JobBroker>,
    processor: Arc<JobProcessor>,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    config: WorkerConfig,
) {
    debug!(worker_id, "worker started");
    let poll = Duration::from_millis(config.poll_interval_ms);

    while running.load(Ordering::SeqCst) {
        let Some(delivery) = broker.next(poll).await else {
            continue;
        };
        handle_delivery(
            worker_id, &broker, &processor, &stats, &config, delivery,
        )
        .await;
    }

    debug!(worker_id, "worker stopped");
}

async fn handle_delivery(
    worker_id: usize,
    broker: &Arc<dyn JobBroker>,
    processor: &Arc<JobProcessor>,
    stats: &Arc<WorkerStats>,
    config: &WorkerConfig,
    delivery: Delivery,
) {
    match processor.process(delivery.job_id).await {
        Ok(job) => match job.status {
            JobStatus::Completed => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            JobStatus::Failed => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            JobStatus::Cancelled => {
                stats.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            status => {
                // The processor only returns terminal jobs; anything else
                // indicates a store regression worth surfacing loudly.
                error!(worker_id, job_id = %job.id, %status, "non-terminal job returned by processor");
            }
        },
        Err(err) if delivery.attempt < config.max_deliveries => {
            warn!(
                worker_id,
                job_id = %delivery.job_id,
                attempt = delivery.attempt,
                error = %err,
                "delivery failed, requeueing"
            );
            stats.redelivered.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(config.redelivery_delay_ms)).await;
            if let Err(requeue_err) = broker.requeue(delivery).await {
                error!(
                    worker_id,
                    job_id = %delivery.job_id,
                    error = %requeue_err,
                    "requeue failed, dropping delivery"
                );
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(err) => {
            error!(
                worker_id,
                job_id = %delivery.job_id,
                attempt = delivery.attempt,
                error = %err,
                "delivery attempts exhausted"
            );
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            // Best effort: record the failure on the job so callers polling
            // its status are not left with a job stuck in processing.
            let _ = processor.finish_failed(
                delivery.job_id,
                format!("delivery attempts exhausted: {}", err),
            );
        }
    }
}
