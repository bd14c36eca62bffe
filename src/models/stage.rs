//! Deal stage enum, stage groups, and the stage synonym table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed deal stage an insight applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStage {
    /// Cold outreach and pipeline generation.
    Prospecting,
    /// Establishing fit, budget, authority, timeline.
    Qualification,
    /// Understanding the buyer's needs.
    Discovery,
    /// Product demonstrations and presentations.
    Demo,
    /// Handling pushback and concerns.
    Objection,
    /// Pricing and contract terms.
    Negotiation,
    /// Getting to signature.
    Closing,
    /// Re-engaging silent or stalled buyers.
    Followup,
}

impl DealStage {
    /// Returns all stage variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Prospecting,
            Self::Qualification,
            Self::Discovery,
            Self::Demo,
            Self::Objection,
            Self::Negotiation,
            Self::Closing,
            Self::Followup,
        ]
    }

    /// Returns the stage as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prospecting => "prospecting",
            Self::Qualification => "qualification",
            Self::Discovery => "discovery",
            Self::Demo => "demo",
            Self::Objection => "objection",
            Self::Negotiation => "negotiation",
            Self::Closing => "closing",
            Self::Followup => "followup",
        }
    }

    /// Parses a stage from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prospecting" => Some(Self::Prospecting),
            "qualification" => Some(Self::Qualification),
            "discovery" => Some(Self::Discovery),
            "demo" => Some(Self::Demo),
            "objection" => Some(Self::Objection),
            "negotiation" => Some(Self::Negotiation),
            "closing" => Some(Self::Closing),
            "followup" => Some(Self::Followup),
            _ => None,
        }
    }
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A curated set of deal stages for coarse facet filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageGroup {
    /// Top of funnel: prospecting and qualification.
    Outbound,
    /// Needs analysis: discovery and demo.
    Discovery,
    /// Deal control: objections and negotiation.
    DealControl,
    /// Getting to ink: closing and follow-up.
    Closing,
}

impl StageGroup {
    /// Returns all group variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Outbound, Self::Discovery, Self::DealControl, Self::Closing]
    }

    /// Returns the underlying stages in this group.
    #[must_use]
    pub const fn stages(&self) -> &'static [DealStage] {
        match self {
            Self::Outbound => &[DealStage::Prospecting, DealStage::Qualification],
            Self::Discovery => &[DealStage::Discovery, DealStage::Demo],
            Self::DealControl => &[DealStage::Objection, DealStage::Negotiation],
            Self::Closing => &[DealStage::Closing, DealStage::Followup],
        }
    }

    /// Returns true if the insight's primary or any secondary stage is in
    /// this group.
    #[must_use]
    pub fn contains(&self, primary: DealStage, secondary: &[DealStage]) -> bool {
        self.stages().contains(&primary) || secondary.iter().any(|s| self.stages().contains(s))
    }

    /// Returns the group as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Discovery => "discovery",
            Self::DealControl => "deal-control",
            Self::Closing => "closing",
        }
    }
}

/// Informal query terms mapped to the stage they signal.
///
/// Each group's boost applies once per query regardless of how many of its
/// terms the query hits. Used by the hybrid scorer only; the FTS index
/// matches stage names directly.
#[must_use]
pub const fn stage_synonym_groups() -> &'static [(DealStage, &'static [&'static str])] {
    &[
        (
            DealStage::Discovery,
            &["discovery", "discover", "question", "ask", "learn", "understand", "needs"],
        ),
        (
            DealStage::Prospecting,
            &["prospect", "cold", "outreach", "email", "call", "reach", "sdr"],
        ),
        (
            DealStage::Negotiation,
            &["negotiate", "negotiation", "price", "pricing", "discount", "contract"],
        ),
        (
            DealStage::Closing,
            &["close", "closing", "deal", "sign", "commit", "decision", "won"],
        ),
        (
            DealStage::Objection,
            &["objection", "pushback", "concern", "hesitation", "resist", "but"],
        ),
        (
            DealStage::Demo,
            &["demo", "presentation", "present", "show", "demonstrate"],
        ),
        (
            DealStage::Qualification,
            &["qualify", "qualification", "fit", "budget", "authority", "timeline", "bant"],
        ),
        (
            DealStage::Followup,
            &["follow", "followup", "silent", "ghost", "respond", "reply"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("prospecting", Some(DealStage::Prospecting))]
    #[test_case("negotiation", Some(DealStage::Negotiation))]
    #[test_case("followup", Some(DealStage::Followup))]
    #[test_case("onboarding", None)]
    fn test_parse_roundtrip(input: &str, expected: Option<DealStage>) {
        assert_eq!(DealStage::parse(input), expected);
        if let Some(stage) = expected {
            assert_eq!(stage.as_str(), input);
        }
    }

    #[test]
    fn test_every_stage_belongs_to_exactly_one_group() {
        for stage in DealStage::all() {
            let groups: Vec<_> = StageGroup::all()
                .iter()
                .filter(|g| g.stages().contains(stage))
                .collect();
            assert_eq!(groups.len(), 1, "stage {stage} in {} groups", groups.len());
        }
    }

    #[test]
    fn test_group_contains_checks_secondary_stages() {
        let group = StageGroup::DealControl;
        assert!(group.contains(DealStage::Negotiation, &[]));
        assert!(group.contains(DealStage::Closing, &[DealStage::Objection]));
        assert!(!group.contains(DealStage::Closing, &[DealStage::Demo]));
    }

    #[test]
    fn test_synonym_groups_cover_every_stage() {
        let covered: Vec<_> = stage_synonym_groups().iter().map(|(s, _)| *s).collect();
        for stage in DealStage::all() {
            assert!(covered.contains(stage));
        }
    }
}
