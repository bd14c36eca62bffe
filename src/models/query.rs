//! Facet filters, pagination, and ranked results.

use super::{AudienceRole, Insight, StageGroup};

/// Facet filter criteria, AND-composed.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Restrict to one expert by slug.
    pub expert_id: Option<String>,
    /// Restrict to insights whose primary or secondary stage falls in a group.
    pub stage_group: Option<StageGroup>,
    /// Restrict to insights tagged with any component of this methodology.
    pub methodology_id: Option<String>,
    /// Restrict to insights classified for any of these roles.
    pub roles: Vec<AudienceRole>,
    /// Minimum confidence for tag/audience gated filters. Falls back to the
    /// engine default (0.7) when unset.
    pub min_confidence: Option<f64>,
}

impl Filters {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            expert_id: None,
            stage_group: None,
            methodology_id: None,
            roles: Vec::new(),
            min_confidence: None,
        }
    }

    /// Restricts results to one expert.
    #[must_use]
    pub fn with_expert(mut self, expert_id: impl Into<String>) -> Self {
        self.expert_id = Some(expert_id.into());
        self
    }

    /// Restricts results to a stage group.
    #[must_use]
    pub const fn with_stage_group(mut self, group: StageGroup) -> Self {
        self.stage_group = Some(group);
        self
    }

    /// Restricts results to insights tagged with a methodology.
    #[must_use]
    pub fn with_methodology(mut self, methodology_id: impl Into<String>) -> Self {
        self.methodology_id = Some(methodology_id.into());
        self
    }

    /// Restricts results to insights classified for a role.
    #[must_use]
    pub fn with_role(mut self, role: AudienceRole) -> Self {
        self.roles.push(role);
        self
    }

    /// Sets the confidence floor for gated filters.
    #[must_use]
    pub const fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    /// Convenience preset for leadership content: VP Sales / CRO roles.
    #[must_use]
    pub fn leadership(mut self) -> Self {
        self.roles.extend_from_slice(AudienceRole::leadership());
        self
    }

    /// Returns true if the filter is empty (matches all).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expert_id.is_none()
            && self.stage_group.is_none()
            && self.methodology_id.is_none()
            && self.roles.is_empty()
            && self.min_confidence.is_none()
    }
}

/// A page slice over an ordered result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Zero-based page number.
    pub number: usize,
    /// Items per page.
    pub size: usize,
}

impl Page {
    /// First page with the default size of 20.
    #[must_use]
    pub const fn first() -> Self {
        Self { number: 0, size: 20 }
    }

    /// Creates a page descriptor. A zero size yields empty pages.
    #[must_use]
    pub const fn new(number: usize, size: usize) -> Self {
        Self { number, size }
    }

    /// Returns the offset of this page's first item.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.number * self.size
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first()
    }
}

/// An insight together with its relevance score.
#[derive(Debug, Clone)]
pub struct RankedInsight {
    /// The matched insight.
    pub insight: Insight,
    /// Strategy-specific relevance score; comparable only within one
    /// strategy's result list.
    pub score: f64,
}
