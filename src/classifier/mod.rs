//! Batch classifier seam.
//!
//! The engine never talks to a live classification service directly; it
//! talks to the [`BatchClassifier`] trait. A production implementation wraps
//! an external batch API, tests use an in-memory fake. The contract is
//! deliberately asynchronous-by-polling: submit a batch, poll its status,
//! fetch per-item outcomes once the job has ended.

mod parser;
mod retry;

pub use parser::{parse_audience_response, parse_tag_response};
pub use retry::with_backoff;

use crate::Result;

/// One item in a submitted batch.
///
/// `custom_id` ties the result back to the insight it was produced for; the
/// classifier echoes it verbatim.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// Caller-chosen correlation id, echoed in the matching result entry.
    pub custom_id: String,
    /// Full prompt text for this item.
    pub prompt: String,
}

/// Opaque external job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Wraps a raw job id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Items are still being processed.
    InProgress,
    /// Every item has reached a terminal outcome; results may be fetched.
    Ended,
}

/// Status snapshot for a polled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    /// Current lifecycle state.
    pub state: JobState,
    /// Items still processing.
    pub processing: usize,
    /// Items that produced a response.
    pub succeeded: usize,
    /// Items that failed terminally.
    pub errored: usize,
    /// Items canceled before completion.
    pub canceled: usize,
    /// Items that expired unprocessed.
    pub expired: usize,
}

/// Terminal outcome of a single batch item.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The classifier produced a response body.
    Succeeded {
        /// Raw response text, possibly fenced.
        text: String,
    },
    /// The item failed terminally.
    Errored,
    /// The item expired before processing.
    Expired,
    /// The item was canceled.
    Canceled,
}

/// A single item's result, correlated by `custom_id`.
#[derive(Debug, Clone)]
pub struct JobResultEntry {
    /// The correlation id passed at submit time.
    pub custom_id: String,
    /// What happened to this item.
    pub outcome: JobOutcome,
}

/// An external batch classification service.
///
/// Implementations must be safe to share across threads; the pipeline holds
/// one behind an `Arc`. Transient faults (network, throttling) should be
/// reported as [`crate::Error::Transient`] so the retry layer re-attempts
/// them; anything else is terminal.
pub trait BatchClassifier: Send + Sync {
    /// Submits a batch of prompts, returning the external job id.
    ///
    /// # Errors
    ///
    /// Returns `Transient` for retryable faults, `OperationFailed`
    /// otherwise.
    fn submit(&self, requests: &[ClassificationRequest]) -> Result<JobId>;

    /// Polls the job's status.
    ///
    /// # Errors
    ///
    /// Returns `Transient` for retryable faults; an unknown job id is
    /// `OperationFailed`.
    fn status(&self, job: &JobId) -> Result<JobStatus>;

    /// Fetches per-item results for an ended job.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the job has not ended or is unknown.
    fn results(&self, job: &JobId) -> Result<Vec<JobResultEntry>>;
}
