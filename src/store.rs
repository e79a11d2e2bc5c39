//! Job Store
//!
//! Persistence interface for job records. The pipeline treats each call as
//! transactional; `finish` is the single terminal-write point and is
//! idempotent so that broker redelivery of an already-finished job cannot
//! corrupt state.

pub mod memory;
pub mod persistence;

pub use memory::MemoryJobStore;
pub use persistence::SledJobStore;

use crate::error::StoreError;
use crate::job::{Job, JobId, JobKind, JobOutcome, JobStatus};

/// Job Store interface
pub trait JobStore: Send + Sync {
    /// Durably create a new job in `pending` state.
    fn create(
        &self,
        kind: JobKind,
        input: serde_json::Value,
        caller: Option<String>,
    ) -> Result<Job, StoreError>;

    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Move a pending job to `processing` and return it. A job already in a
    /// terminal state is returned unchanged so the caller can skip it; a job
    /// already `processing` is an invalid transition (a second executor).
    fn mark_processing(&self, id: JobId) -> Result<Job, StoreError>;

    /// Persist the terminal outcome. Writes `cancelled` instead of the
    /// outcome when cancellation was requested mid-flight; no-op when the job
    /// is already terminal.
    fn finish(&self, id: JobId, outcome: JobOutcome) -> Result<Job, StoreError>;

    /// Request cancellation: a `pending` job transitions straight to
    /// `cancelled`; a `processing` job is flagged and finishes as `cancelled`
    /// when its in-flight call completes; terminal jobs are untouched.
    fn request_cancel(&self, id: JobId) -> Result<Job, StoreError>;

    fn cancel_requested(&self, id: JobId) -> Result<bool, StoreError>;
}

/// Shared transition logic for `mark_processing`.
pub(crate) fn begin_processing(job: &mut Job) -> Result<(), StoreError> {
    match job.status {
        JobStatus::Pending => {
            job.status = JobStatus::Processing;
            Ok(())
        }
        status if status.is_terminal() => Ok(()),
        status => Err(StoreError::InvalidTransition {
            from: status,
            to: JobStatus::Processing,
        }),
    }
}

/// Shared transition logic for `request_cancel`.
pub(crate) fn apply_cancel_request(job: &mut Job) {
    match job.status {
        JobStatus::Pending => {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(chrono::Utc::now());
        }
        JobStatus::Processing => {
            job.cancel_requested = true;
        }
        _ => {}
    }
}
