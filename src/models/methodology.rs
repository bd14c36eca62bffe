//! Methodology reference data and tag edges.

use serde::{Deserialize, Serialize};

use super::InsightId;

/// A named sales methodology with its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Methodology {
    /// Stable methodology id, e.g. `meddic`.
    pub id: String,
    /// Display name, e.g. `MEDDIC`.
    pub name: String,
    /// Short description of the framework.
    pub overview: String,
    /// The methodology's components, in presentation order.
    pub components: Vec<MethodologyComponent>,
}

/// A sub-concept of a methodology, used as a tagging target.
///
/// The keyword list is hinting material for the classifier prompt only; it
/// plays no part in ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodologyComponent {
    /// Stable component id, e.g. `meddic_champion`.
    pub id: String,
    /// Id of the methodology this component belongs to.
    pub methodology_id: String,
    /// Display name, e.g. `Champion`.
    pub name: String,
    /// What this component means.
    pub description: String,
    /// Classifier hint keywords.
    pub keywords: Vec<String>,
}

/// An edge tagging an insight with a methodology component.
///
/// `(insight_id, component_id)` is the composite key; re-tagging the same
/// pair upserts the confidence rather than duplicating the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyTag {
    /// The tagged insight.
    pub insight_id: InsightId,
    /// The referenced component. Must exist in the reference data.
    pub component_id: String,
    /// Classifier confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Who produced the tag (classifier model name, or `manual`).
    pub tagged_by: String,
}
