//! Data models for coachdb.
//!
//! This module contains all the core data structures used throughout the engine.

mod audience;
mod insight;
mod methodology;
mod query;
mod stage;

pub use audience::AudienceRole;
pub use insight::{AudienceClassification, Insight, InsightId, SourceKind};
pub(crate) use insight::validate_audience;
pub use methodology::{Methodology, MethodologyComponent, MethodologyTag};
pub use query::{Filters, Page, RankedInsight};
pub use stage::{DealStage, StageGroup, stage_synonym_groups};
