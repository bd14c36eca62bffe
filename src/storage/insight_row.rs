//! Row-to-model mapping for insight queries.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::models::{AudienceClassification, AudienceRole, DealStage, Insight, InsightId, SourceKind};
use crate::{Error, Result};

/// Raw column values of one `insights` row, in `INSIGHT_COLUMNS` order.
pub struct InsightRow {
    id: String,
    expert_id: String,
    expert_name: String,
    source_kind: String,
    source_url: String,
    collected_at: String,
    primary_stage: String,
    secondary_stages: String,
    summary_text: String,
    action_steps: String,
    keywords: String,
    situation_examples: String,
    best_quote: String,
    quality_score: i64,
    target_audience: Option<String>,
    audience_confidence: Option<f64>,
    audience_reasoning: Option<String>,
}

impl InsightRow {
    /// Reads the row from a query whose select list is `INSIGHT_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            expert_id: row.get(1)?,
            expert_name: row.get(2)?,
            source_kind: row.get(3)?,
            source_url: row.get(4)?,
            collected_at: row.get(5)?,
            primary_stage: row.get(6)?,
            secondary_stages: row.get(7)?,
            summary_text: row.get(8)?,
            action_steps: row.get(9)?,
            keywords: row.get(10)?,
            situation_examples: row.get(11)?,
            best_quote: row.get(12)?,
            quality_score: row.get(13)?,
            target_audience: row.get(14)?,
            audience_confidence: row.get(15)?,
            audience_reasoning: row.get(16)?,
        })
    }

    /// Converts the raw row into an `Insight`.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if a stored enum or JSON column does not
    /// decode; only this crate writes these columns, so a failure here means
    /// the database was edited out of band.
    pub fn into_insight(self) -> Result<Insight> {
        let source_kind = SourceKind::parse(&self.source_kind).ok_or_else(|| {
            decode_error(&self.id, "source_kind", &self.source_kind)
        })?;
        let primary_stage = DealStage::parse(&self.primary_stage).ok_or_else(|| {
            decode_error(&self.id, "primary_stage", &self.primary_stage)
        })?;

        let secondary_names: Vec<String> = decode_json_list(&self.id, "secondary_stages", &self.secondary_stages)?;
        let mut secondary_stages = Vec::with_capacity(secondary_names.len());
        for name in &secondary_names {
            secondary_stages.push(
                DealStage::parse(name).ok_or_else(|| decode_error(&self.id, "secondary_stages", name))?,
            );
        }

        let collected_at = self
            .collected_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| decode_error(&self.id, "collected_at", &e.to_string()))?;

        // Annotation columns are written atomically as a triplet; a row with
        // only some of them set can only come from out-of-band edits.
        let audience = match (self.target_audience, self.audience_confidence) {
            (Some(roles_json), Some(confidence)) => {
                let role_names: Vec<String> = decode_json_list(&self.id, "target_audience", &roles_json)?;
                let mut roles = Vec::with_capacity(role_names.len());
                for name in &role_names {
                    roles.push(
                        AudienceRole::parse(name)
                            .ok_or_else(|| decode_error(&self.id, "target_audience", name))?,
                    );
                }
                Some(AudienceClassification {
                    roles,
                    confidence,
                    reasoning: self.audience_reasoning.unwrap_or_default(),
                })
            },
            (None, None) => None,
            _ => {
                return Err(decode_error(
                    &self.id,
                    "audience columns",
                    "half-set annotation pair",
                ));
            },
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let quality_score = self.quality_score.clamp(0, 10) as u8;

        Ok(Insight {
            id: InsightId::new(self.id),
            expert_id: self.expert_id,
            expert_name: self.expert_name,
            source_kind,
            source_url: self.source_url,
            collected_at,
            primary_stage,
            secondary_stages,
            summary_text: self.summary_text,
            action_steps: decode_json_list_raw(&self.action_steps),
            keywords: decode_json_list_raw(&self.keywords),
            situation_examples: decode_json_list_raw(&self.situation_examples),
            best_quote: self.best_quote,
            quality_score,
            audience,
        })
    }
}

fn decode_error(id: &str, column: &str, value: &str) -> Error {
    Error::OperationFailed {
        operation: "decode_insight_row".to_string(),
        cause: format!("insight '{id}': bad {column} value '{value}'"),
    }
}

fn decode_json_list(id: &str, column: &str, json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).map_err(|e| decode_error(id, column, &e.to_string()))
}

/// Lenient variant for plain string lists; an undecodable column yields an
/// empty list rather than failing the whole read.
fn decode_json_list_raw(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Encodes a string list for storage.
pub fn encode_json_list<S: AsRef<str>>(items: &[S]) -> String {
    let strs: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    serde_json::to_string(&strs).unwrap_or_else(|_| "[]".to_string())
}
