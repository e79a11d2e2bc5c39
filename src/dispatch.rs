//! Queue Dispatcher
//!
//! Submission entry point. A submitted job is durably created first, then
//! handed to the broker; if enqueueing fails (or no broker is configured)
//! the job runs inline on the caller's task so that submission never loses
//! work. Callers observe progress by polling `status`.

use crate::broker::JobBroker;
use crate::client::JobProcessor;
use crate::error::PipelineError;
use crate::job::{Job, JobId, JobKind, JobStatus};
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Caller-facing view of a job, safe to serialize out of the process.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            status: job.status,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Routes submitted jobs to the broker or, failing that, inline execution.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    processor: Arc<JobProcessor>,
    broker: Option<Arc<dyn JobBroker>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<JobProcessor>,
        broker: Option<Arc<dyn JobBroker>>,
    ) -> Self {
        Self {
            store,
            processor,
            broker,
        }
    }

    /// Submit a job.
    ///
    /// With a healthy broker this returns as soon as the job is queued, with
    /// the job still `pending`. On the inline path the returned job is
    /// already terminal.
    pub async fn submit(
        &self,
        kind: JobKind,
        input: serde_json::Value,
        caller: Option<String>,
    ) -> Result<JobStatusView, PipelineError> {
        let job = self.store.create(kind, input, caller)?;
        info!(job_id = %job.id, kind = %kind, "job submitted");

        if let Some(broker) = &self.broker {
            match broker.enqueue(job.id).await {
                Ok(()) => return Ok(job.into()),
                Err(err) => {
                    warn!(
                        job_id = %job.id,
                        error = %err,
                        "enqueue failed, executing inline"
                    );
                }
            }
        }

        let finished = self.processor.process(job.id).await?;
        Ok(finished.into())
    }

    /// Current state of a job. `Ok(None)` when the id is unknown.
    pub fn status(&self, id: JobId) -> Result<Option<JobStatusView>, PipelineError> {
        Ok(self.store.get(id)?.map(JobStatusView::from))
    }

    /// Request cancellation and return the resulting view.
    pub fn cancel(&self, id: JobId) -> Result<JobStatusView, PipelineError> {
        let job = self.store.request_cancel(id)?;
        info!(job_id = %id, status = %job.status, "cancellation requested");
        Ok(job.into())
    }
}
