//! Job Broker
//!
//! Queue abstraction between submission and the worker pool. Only job ids
//! travel through the broker; job state lives in the store, so a lost or
//! duplicated delivery is recoverable. `ChannelBroker` is the in-process
//! implementation used by the default deployment.

use crate::error::PipelineError;
use crate::job::JobId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// One queued unit of work. `attempt` counts deliveries of this job id,
/// starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub job_id: JobId,
    pub attempt: u32,
}

impl Delivery {
    pub fn first(job_id: JobId) -> Self {
        Self { job_id, attempt: 1 }
    }

    pub fn redelivered(self) -> Self {
        Self {
            job_id: self.job_id,
            attempt: self.attempt + 1,
        }
    }
}

/// Queue interface for handing jobs to workers.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Enqueue a job for asynchronous processing.
    async fn enqueue(&self, job_id: JobId) -> Result<(), PipelineError>;

    /// Take the next delivery, waiting up to `wait` for one to arrive.
    /// Returns `None` on timeout or when the broker is closed and drained.
    async fn next(&self, wait: Duration) -> Option<Delivery>;

    /// Put a delivery back for another attempt.
    async fn requeue(&self, delivery: Delivery) -> Result<(), PipelineError>;

    /// Stop accepting new work. Queued deliveries remain consumable.
    async fn close(&self);

    async fn len(&self) -> usize;
}

/// In-process FIFO broker backed by a deque and a wakeup signal.
pub struct ChannelBroker {
    queue: Mutex<BrokerState>,
    notify: Notify,
}

struct BrokerState {
    deliveries: VecDeque<Delivery>,
    closed: bool,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(BrokerState {
                deliveries: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    async fn push(&self, delivery: Delivery) -> Result<(), PipelineError> {
        let mut state = self.queue.lock().await;
        if state.closed {
            return Err(PipelineError::BrokerUnavailable("broker closed".into()));
        }
        state.deliveries.push_back(delivery);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }
}

impl Default for ChannelBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobBroker for ChannelBroker {
    async fn enqueue(&self, job_id: JobId) -> Result<(), PipelineError> {
        self.push(Delivery::first(job_id)).await?;
        debug!(job_id = %job_id, "job enqueued");
        Ok(())
    }

    async fn next(&self, wait: Duration) -> Option<Delivery> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            {
                let mut state = self.queue.lock().await;
                if let Some(delivery) = state.deliveries.pop_front() {
                    return Some(delivery);
                }
                if state.closed {
                    return None;
                }
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    async fn requeue(&self, delivery: Delivery) -> Result<(), PipelineError> {
        self.push(delivery.redelivered()).await
    }

    async fn close(&self) {
        self.queue.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    async fn len(&self) -> usize {
        self.queue.lock().await.deliveries.len()
    }
}
