//! Generation Client
//!
//! Drives a single job through credential acquisition, provider calls,
//! extraction and the two-level retry scheme: bounded retries on one
//! credential for transient failures, then rotation to the next credential.
//! A credential rejection quarantines the credential and rotates immediately;
//! malformed output fails the job with no rotation, since a parse failure
//! says nothing about the credential.

use crate::credential::CredentialPool;
use crate::error::PipelineError;
use crate::extract;
use crate::job::{Job, JobId, JobKind, JobOutcome};
use crate::provider::{GenerationProvider, ProviderRequest};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::JobStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Renders a job into provider prompts.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, job: &Job) -> Result<ProviderRequest, PipelineError>;
}

/// Default prompt builder: a fixed instruction per job kind with the job's
/// input payload embedded as JSON.
#[derive(Default)]
pub struct TemplatePromptBuilder;

impl TemplatePromptBuilder {
    fn instruction(kind: JobKind) -> &'static str {
        match kind {
            JobKind::Generate => {
                "Generate the requested content from the input below. \
                 Respond with a single JSON object and nothing else."
            }
            JobKind::Synthesize => {
                "Synthesize the source materials in the input below into one \
                 coherent result. Respond with a single JSON object and nothing else."
            }
            JobKind::Analyze => {
                "Analyze the content in the input below. \
                 Respond with a single JSON object and nothing else."
            }
            JobKind::Improve => {
                "Improve the draft in the input below, preserving its structure. \
                 Respond with a single JSON object and nothing else."
            }
        }
    }
}

impl PromptBuilder for TemplatePromptBuilder {
    fn build(&self, job: &Job) -> Result<ProviderRequest, PipelineError> {
        let input = serde_json::to_string_pretty(&job.input)
            .map_err(|e| PipelineError::Config(format!("unserializable job input: {}", e)))?;
        Ok(ProviderRequest {
            system_prompt: Self::instruction(job.kind).to_string(),
            user_prompt: format!("Input:\n{}", input),
        })
    }
}

/// Executes generation calls with retry and credential rotation.
pub struct GenerationClient {
    provider: Arc<dyn GenerationProvider>,
    credentials: Arc<CredentialPool>,
    prompts: Arc<dyn PromptBuilder>,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        credentials: Arc<CredentialPool>,
        prompts: Arc<dyn PromptBuilder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            credentials,
            prompts,
            retry,
        }
    }

    /// Run the job's generation call to a structured payload.
    ///
    /// Tries each acquired credential in order. Transient failures are
    /// retried on the same credential per the retry policy before rotating;
    /// the last error is surfaced when every credential is exhausted.
    pub async fn execute(&self, job: &Job) -> Result<Value, PipelineError> {
        let request = self.prompts.build(job)?;
        let candidates = self.credentials.acquire(job.caller.as_deref());
        if candidates.is_empty() {
            return Err(PipelineError::NoCredentials);
        }

        let total = candidates.len();
        let mut last_err = PipelineError::NoCredentials;
        for (index, credential) in candidates.iter().enumerate() {
            debug!(
                job_id = %job.id,
                tier = ?credential.source,
                candidate = index + 1,
                total,
                "attempting credential"
            );

            let provider = &self.provider;
            let request_ref = &request;
            let attempt = with_retry(&self.retry, || async move {
                let raw = provider.send(credential, request_ref).await?;
                extract::extract(&raw)
            })
            .await;

            match attempt {
                Ok(value) => {
                    self.credentials.clear(&credential.value);
                    return Ok(value);
                }
                Err(err) if err.is_credential_rejection() => {
                    warn!(
                        job_id = %job.id,
                        tier = ?credential.source,
                        error = %err,
                        "credential rejected, quarantining and rotating"
                    );
                    self.credentials.quarantine(&credential.value);
                    last_err = err;
                }
                Err(err @ PipelineError::MalformedOutput(_)) => {
                    // Not a credential problem; rotating would re-run the
                    // same prompt against the same model.
                    return Err(err);
                }
                Err(err) => {
                    debug!(
                        job_id = %job.id,
                        tier = ?credential.source,
                        error = %err,
                        "retries exhausted on credential, rotating"
                    );
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

/// Runs a single job end to end against the store.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    client: GenerationClient,
}

impl JobProcessor {
    pub fn new(store: Arc<dyn JobStore>, client: GenerationClient) -> Self {
        Self { store, client }
    }

    /// Process one job: claim it, execute the generation call, persist the
    /// terminal outcome. A job already in a terminal state (a redelivery) is
    /// returned as-is without touching the provider.
    pub async fn process(&self, id: JobId) -> Result<Job, PipelineError> {
        let job = self.store.mark_processing(id)?;
        if job.status.is_terminal() {
            debug!(job_id = %id, status = %job.status, "job already terminal, skipping");
            return Ok(job);
        }

        info!(job_id = %id, kind = %job.kind, "processing job");
        let outcome = match self.client.execute(&job).await {
            Ok(value) => JobOutcome::Success(value),
            Err(err) => {
                warn!(job_id = %id, error = %err, "job execution failed");
                JobOutcome::Failure(err.failure_reason())
            }
        };

        let finished = self.store.finish(id, outcome)?;
        info!(job_id = %id, status = %finished.status, "job finished");
        Ok(finished)
    }

    /// Persist a failure outcome directly, bypassing execution. Used when a
    /// queued delivery can no longer be processed.
    pub fn finish_failed(
        &self,
        id: JobId,
        reason: String,
    ) -> Result<Job, crate::error::StoreError> {
        self.store.finish(id, JobOutcome::Failure(reason))
    }
}
