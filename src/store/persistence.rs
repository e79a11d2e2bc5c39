//! Sled-backed job store.

use crate::error::StoreError;
use crate::job::{Job, JobId, JobKind, JobOutcome};
use crate::store::{apply_cancel_request, begin_processing, JobStore};
use parking_lot::Mutex;
use std::path::Path;

/// Sled-based implementation of `JobStore`.
///
/// Records are JSON-encoded under the job id's big-endian bytes; the job
/// input and result are arbitrary JSON documents, which rules out
/// non-self-describing codecs. Read-
/// modify-write sequences run under a process-local mutex; the pipeline
/// guarantees at most one active executor per job, the lock only protects
/// against concurrent control calls (e.g. cancel racing finish).
pub struct SledJobStore {
    db: sled::Db,
    write_lock: Mutex<()>,
}

impl SledJobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn encode(job: &Job) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(job).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Job, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn load(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        match self
            .db
            .get(id.as_u64().to_be_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, job: &Job) -> Result<(), StoreError> {
        let bytes = Self::encode(job)?;
        self.db
            .insert(job.id.as_u64().to_be_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn update<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock();
        let mut job = self.load(id)?.ok_or(StoreError::JobNotFound(id))?;
        let out = f(&mut job)?;
        self.save(&job)?;
        Ok(out)
    }
}

impl JobStore for SledJobStore {
    fn create(
        &self,
        kind: JobKind,
        input: serde_json::Value,
        caller: Option<String>,
    ) -> Result<Job, StoreError> {
        let raw_id = self
            .db
            .generate_id()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let job = Job::new(JobId::from_u64(raw_id), kind, input, caller);
        self.save(&job)?;
        Ok(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.load(id)
    }

    fn mark_processing(&self, id: JobId) -> Result<Job, StoreError> {
        self.update(id, |job| {
            begin_processing(job)?;
            Ok(job.clone())
        })
    }

    fn finish(&self, id: JobId, outcome: JobOutcome) -> Result<Job, StoreError> {
        self.update(id, |job| {
            job.apply_outcome(outcome);
            Ok(job.clone())
        })
    }

    fn request_cancel(&self, id: JobId) -> Result<Job, StoreError> {
        self.update(id, |job| {
            apply_cancel_request(job);
            Ok(job.clone())
        })
    }

    fn cancel_requested(&self, id: JobId) -> Result<bool, StoreError> {
        self.load(id)?
            .map(|job| job.cancel_requested)
            .ok_or(StoreError::JobNotFound(id))
    }
}
