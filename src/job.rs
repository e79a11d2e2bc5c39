//! Job data model
//!
//! A job is a single unit of asynchronous generation work with a persisted
//! lifecycle: `pending -> processing -> {completed | failed}`, with
//! `cancelled` as an additional terminal state reachable from `pending` or
//! `processing`. Transitions are monotonic; a terminal job never moves again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier, assigned by the store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub fn from_u64(value: u64) -> Self {
        JobId(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(JobId)
    }
}

/// Closed set of generation operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Generate,
    Synthesize,
    Analyze,
    Improve,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generate => "generate",
            JobKind::Synthesize => "synthesize",
            JobKind::Analyze => "analyze",
            JobKind::Improve => "improve",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(JobKind::Generate),
            "synthesize" => Ok(JobKind::Synthesize),
            "analyze" => Ok(JobKind::Analyze),
            "improve" => Ok(JobKind::Improve),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the status machine permits moving from `self` to `next`.
    /// Rewriting a terminal status with the identical status is allowed so
    /// that broker redelivery of an already-finished job stays a no-op.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Processing | JobStatus::Failed | JobStatus::Cancelled
            ),
            JobStatus::Processing => matches!(
                next,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
            ),
            terminal => *terminal == next,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of the job-processing routine.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success(serde_json::Value),
    Failure(String),
}

/// Persisted job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Opaque structured payload, interpreted by the prompt builder.
    pub input: serde_json::Value,
    /// Present only when `status == Completed`.
    pub result: Option<serde_json::Value>,
    /// Human-readable failure reason, present only when `status == Failed`.
    pub error: Option<String>,
    /// Caller identity used for credential lookup.
    pub caller: Option<String>,
    /// Set while processing when cancellation was requested; the finish path
    /// checks it before persisting a result.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on first transition into a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind, input: serde_json::Value, caller: Option<String>) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            input,
            result: None,
            error: None,
            caller,
            cancel_requested: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Apply a terminal outcome in place, honoring a pending cancellation
    /// request. Idempotent: an already-terminal job is left untouched.
    pub fn apply_outcome(&mut self, outcome: JobOutcome) {
        if self.status.is_terminal() {
            return;
        }
        if self.cancel_requested {
            self.status = JobStatus::Cancelled;
        } else {
            match outcome {
                JobOutcome::Success(value) => {
                    self.status = JobStatus::Completed;
                    self.result = Some(value);
                }
                JobOutcome::Failure(reason) => {
                    self.status = JobStatus::Failed;
                    self.error = Some(reason);
                }
            }
        }
        self.completed_at = Some(Utc::now());
    }
}
