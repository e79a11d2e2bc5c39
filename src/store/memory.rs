//! In-memory job store for inline mode and tests.

use crate::error::StoreError;
use crate::job::{Job, JobId, JobKind, JobOutcome};
use crate::store::{apply_cancel_request, begin_processing, JobStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// HashMap-backed `JobStore`. All mutation happens under one write lock, so
/// every trait call is atomic with respect to concurrent executors.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    next_id: AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        f(job)
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for MemoryJobStore {
    fn create(
        &self,
        kind: JobKind,
        input: serde_json::Value,
        caller: Option<String>,
    ) -> Result<Job, StoreError> {
        let id = JobId::from_u64(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Job::new(id, kind, input, caller);
        self.jobs.write().insert(id, job.clone());
        Ok(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    fn mark_processing(&self, id: JobId) -> Result<Job, StoreError> {
        self.with_job(id, |job| {
            begin_processing(job)?;
            Ok(job.clone())
        })
    }

    fn finish(&self, id: JobId, outcome: JobOutcome) -> Result<Job, StoreError> {
        self.with_job(id, |job| {
            job.apply_outcome(outcome);
            Ok(job.clone())
        })
    }

    fn request_cancel(&self, id: JobId) -> Result<Job, StoreError> {
        self.with_job(id, |job| {
            apply_cancel_request(job);
            Ok(job.clone())
        })
    }

    fn cancel_requested(&self, id: JobId) -> Result<bool, StoreError> {
        self.jobs
            .read()
            .get(&id)
            .map(|job| job.cancel_requested)
            .ok_or(StoreError::JobNotFound(id))
    }
}
