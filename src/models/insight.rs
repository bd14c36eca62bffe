//! Insight types and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AudienceRole, DealStage};

/// Unique identifier for an insight.
///
/// Insight ids are stable external keys assigned by the ingestion step; the
/// engine never generates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsightId(String);

impl InsightId {
    /// Creates a new insight ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InsightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InsightId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InsightId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where an insight was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A written post (blog, LinkedIn, newsletter).
    WebPost,
    /// A transcript of a video or talk.
    VideoTranscript,
}

impl SourceKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebPost => "web-post",
            Self::VideoTranscript => "video-transcript",
        }
    }

    /// Parses a kind from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web-post" => Some(Self::WebPost),
            "video-transcript" => Some(Self::VideoTranscript),
            _ => None,
        }
    }
}

/// Classifier-produced audience annotation.
///
/// The three audience fields travel together: an insight either has a full
/// classification or none at all. Wrapping them in one struct behind an
/// `Option` makes the null-pairing invariant unrepresentable to violate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceClassification {
    /// Role tags this insight is most useful for, most specific first.
    pub roles: Vec<AudienceRole>,
    /// Classifier confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// One-sentence classifier reasoning.
    pub reasoning: String,
}

/// An atomic piece of recorded advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Stable external key.
    pub id: InsightId,
    /// Slug of the expert this insight came from.
    pub expert_id: String,
    /// Display name of the expert.
    pub expert_name: String,
    /// Where the insight was collected from.
    pub source_kind: SourceKind,
    /// URL of the source material.
    pub source_url: String,
    /// When the insight was collected.
    pub collected_at: DateTime<Utc>,
    /// The deal stage this insight primarily applies to.
    pub primary_stage: DealStage,
    /// Additional applicable stages, ordered, no duplicates.
    pub secondary_stages: Vec<DealStage>,
    /// The core advice, one short paragraph.
    pub summary_text: String,
    /// Concrete steps to act on the advice.
    pub action_steps: Vec<String>,
    /// Producer-assigned keywords.
    pub keywords: Vec<String>,
    /// Situations where the advice applies.
    pub situation_examples: Vec<String>,
    /// The most quotable line from the source.
    pub best_quote: String,
    /// Producer-assigned quality score, 0-10.
    pub quality_score: u8,
    /// Audience annotation, written only by the tagging pipeline.
    pub audience: Option<AudienceClassification>,
}

impl Insight {
    /// Concatenates every text-bearing field, lowercased, for keyword matching.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(256);
        text.push_str(&self.summary_text);
        text.push(' ');
        text.push_str(self.primary_stage.as_str());
        for stage in &self.secondary_stages {
            text.push(' ');
            text.push_str(stage.as_str());
        }
        for part in self
            .action_steps
            .iter()
            .chain(self.keywords.iter())
            .chain(self.situation_examples.iter())
        {
            text.push(' ');
            text.push_str(part);
        }
        text.push(' ');
        text.push_str(&self.best_quote);
        text.to_lowercase()
    }

    /// Validates producer-supplied fields before storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on an empty id, empty summary, or a
    /// quality score above 10.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(crate::Error::Validation("insight id is empty".to_string()));
        }
        if self.summary_text.trim().is_empty() {
            return Err(crate::Error::Validation(format!(
                "insight '{}' has empty summary text",
                self.id
            )));
        }
        if self.quality_score > 10 {
            return Err(crate::Error::Validation(format!(
                "insight '{}' quality score {} exceeds 10",
                self.id, self.quality_score
            )));
        }
        if let Some(ref audience) = self.audience {
            validate_audience(&audience.roles, audience.confidence)?;
        }
        Ok(())
    }
}

/// Validates an audience role list and confidence pair.
///
/// # Errors
///
/// Returns `Error::Validation` on an empty role list or a confidence outside
/// `[0.0, 1.0]`.
pub(crate) fn validate_audience(roles: &[AudienceRole], confidence: f64) -> crate::Result<()> {
    if roles.is_empty() {
        return Err(crate::Error::Validation(
            "audience classification requires at least one role".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(crate::Error::Validation(format!(
            "audience confidence {confidence} outside [0.0, 1.0]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Insight {
        Insight {
            id: InsightId::new("chris-voss-001"),
            expert_id: "chris-voss".to_string(),
            expert_name: "Chris Voss".to_string(),
            source_kind: SourceKind::VideoTranscript,
            source_url: "https://example.com/talk".to_string(),
            collected_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
            primary_stage: DealStage::Negotiation,
            secondary_stages: vec![DealStage::Objection],
            summary_text: "Label the other side's fears before they voice them".to_string(),
            action_steps: vec!["Open with 'it seems like'".to_string()],
            keywords: vec!["labeling".to_string(), "tactical empathy".to_string()],
            situation_examples: vec!["Price pushback on renewal".to_string()],
            best_quote: "No deal is better than a bad deal".to_string(),
            quality_score: 9,
            audience: None,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        let mut insight = sample();
        insight.id = InsightId::new("  ");
        assert!(matches!(
            insight.validate(),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_quality_over_ten() {
        let mut insight = sample();
        insight.quality_score = 11;
        assert!(matches!(
            insight.validate(),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_audience_pair() {
        let mut insight = sample();
        insight.audience = Some(AudienceClassification {
            roles: vec![],
            confidence: 0.8,
            reasoning: "n/a".to_string(),
        });
        assert!(matches!(
            insight.validate(),
            Err(crate::Error::Validation(_))
        ));

        insight.audience = Some(AudienceClassification {
            roles: vec![AudienceRole::Ae],
            confidence: 1.3,
            reasoning: "n/a".to_string(),
        });
        assert!(matches!(
            insight.validate(),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_searchable_text_covers_all_fields() {
        let text = sample().searchable_text();
        assert!(text.contains("label the other side"));
        assert!(text.contains("negotiation"));
        assert!(text.contains("objection"));
        assert!(text.contains("tactical empathy"));
        assert!(text.contains("price pushback"));
        assert!(text.contains("no deal is better"));
    }
}
