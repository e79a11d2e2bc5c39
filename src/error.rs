//! Error types for the scribe generation pipeline.

use crate::job::{JobId, JobStatus};
use std::time::Duration;
use thiserror::Error;

/// Persistence-layer errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Pipeline errors surfaced by dispatch, execution and extraction
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider reported the credential as invalid, revoked or leaked.
    /// Never retried on the same credential; triggers quarantine and rotation.
    #[error("credential rejected by provider: {0}")]
    CredentialRejected(String),

    /// Provider rate-limit or quota response. Retryable; `retry_after` carries
    /// the provider's delay hint when one was present.
    #[error("provider rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Network-level failure (timeout, connect error, 5xx). Retryable.
    #[error("provider request failed: {0}")]
    RequestFailed(String),

    /// Provider returned a transient status message instead of data. Retryable.
    #[error("provider returned a transient status message: {0}")]
    StatusMessage(String),

    /// Provider returned text with no recoverable structured payload and no
    /// transient-status indicators. Not retried.
    #[error("provider response could not be parsed into a structured payload: {0}")]
    MalformedOutput(String),

    #[error("no credentials available")]
    NoCredentials,

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Whether the retry controller may retry this error on the same credential.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited { .. }
                | PipelineError::RequestFailed(_)
                | PipelineError::StatusMessage(_)
        )
    }

    /// Whether this error means the credential itself is bad.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, PipelineError::CredentialRejected(_))
    }

    /// Provider-supplied delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PipelineError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Render this error as a persisted job-failure reason.
    ///
    /// Status-message exhaustion means the provider never produced anything
    /// parseable, so the stored reason says that instead of echoing the
    /// transient wording.
    pub fn failure_reason(&self) -> String {
        match self {
            PipelineError::StatusMessage(msg) => format!(
                "provider response could not be parsed into a structured payload: \
                 only transient status messages were returned: {}",
                msg
            ),
            other => other.to_string(),
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
