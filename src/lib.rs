//! # Coachdb
//!
//! Embedded insight retrieval and annotation engine for coaching assistants.
//!
//! Coachdb keeps a canonical SQLite store of short "insight" records, a
//! derived FTS5 full-text index that never drifts out of sync with it, and
//! an asynchronous batch pipeline that annotates insights with methodology
//! tags and audience classifications produced by an external classifier.
//!
//! ## Features
//!
//! - Single-writer, multi-reader SQLite store with WAL
//! - Trigger-maintained FTS5 index (row and index commit or roll back together)
//! - Two ranking strategies: index-backed bm25 and an in-memory hybrid scorer
//! - Defensive parsing of semi-structured classifier output
//! - Facet filtering by deal stage, expert, methodology, and audience role
//!
//! ## Example
//!
//! ```rust,ignore
//! use coachdb::{Engine, EngineConfig, Filters, Page, SearchMode};
//!
//! let engine = Engine::open(EngineConfig::default(), classifier)?;
//! engine.upsert_insight(&insight)?;
//! let hits = engine.search(
//!     SearchMode::Index,
//!     Some("cold outreach follow up"),
//!     &Filters::new(),
//!     Page::first(),
//! )?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod classifier;
pub mod config;
pub mod engine;
pub mod models;
pub mod query;
pub mod ranking;
pub mod storage;
pub mod tagging;

// Re-exports for convenience
pub use classifier::{
    BatchClassifier, ClassificationRequest, JobId, JobOutcome, JobResultEntry, JobState, JobStatus,
};
pub use config::{EngineConfig, RetryConfig};
pub use engine::{Engine, SearchMode};
pub use models::{
    AudienceClassification, AudienceRole, DealStage, Filters, Insight, InsightId, Methodology,
    MethodologyComponent, MethodologyTag, Page, RankedInsight, SourceKind, StageGroup,
};
pub use query::QueryComposer;
pub use ranking::{HybridRanking, IndexRanking, RankingStrategy};
pub use storage::{AnnotationKind, Store, StoreStats};
pub use tagging::{CancelFlag, Report, TaggingPipeline};

/// Error type for coachdb operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Unknown component id, malformed annotation pair, out-of-range confidence |
/// | `Parse` | Classifier response is not the expected JSON shape |
/// | `Transient` | Classifier call failed in a retryable way; surfaced after retries are exhausted |
/// | `Consistency` | Row store and search index disagree; writes halt until reconciled |
/// | `OperationFailed` | `SQLite` errors, I/O errors, poisoned state |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input rejected at the write boundary.
    ///
    /// Raised when:
    /// - `tag_methodology` references a component id that is not registered
    /// - `set_audience` is given an empty role list
    /// - A confidence value falls outside `[0.0, 1.0]`
    /// - An insight record fails field validation on upsert
    #[error("validation failed: {0}")]
    Validation(String),

    /// A classifier response could not be parsed.
    ///
    /// Counted and skipped per batch item; never fatal to a pipeline run.
    #[error("parse error: {cause}")]
    Parse {
        /// What was wrong with the response.
        cause: String,
    },

    /// A transient I/O failure (classifier network hiccup, storage blip).
    ///
    /// Retried with exponential backoff up to a small fixed cap, then
    /// surfaced as the terminal failure for that pipeline run.
    #[error("transient failure in '{operation}': {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The row store and the search index disagree.
    ///
    /// Structurally impossible while all writes go through the trigger-backed
    /// store, but detectable by `integrity_check`. Once raised, mutating
    /// operations are refused until manual reconciliation.
    #[error("consistency violation: {detail}")]
    Consistency {
        /// What the integrity check found.
        detail: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail to prepare or execute
    /// - A transaction cannot be committed
    /// - A persisted batch job record is missing or corrupt
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for coachdb operations.
pub type Result<T> = std::result::Result<T, Error>;
