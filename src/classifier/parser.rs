//! Defensive parsing of classifier response bodies.
//!
//! Classifier output is untrusted input: it may be wrapped in markdown code
//! fences, carry unknown ids, or not be JSON at all. Parsers here strip the
//! fencing, decode, and validate; a bad body becomes `Error::Parse` for the
//! caller to count, never a panic or a silent write.

use serde::Deserialize;

use crate::models::AudienceRole;
use crate::{Error, Result};

/// Strips a markdown code fence from a response body, if present.
///
/// Handles ` ```json `-tagged and bare ` ``` ` fences; anything else is
/// returned trimmed as-is.
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Deserialize)]
struct TagEntry {
    component_id: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct TagBody {
    tags: Vec<TagEntry>,
}

/// Parses a methodology tagging response into `(component_id, confidence)`
/// pairs.
///
/// Accepts either a bare JSON array of tag objects or an object with a
/// `tags` array. Returned pairs are syntactically valid only; component-id
/// existence and confidence floors are the pipeline's concern.
///
/// # Errors
///
/// Returns `Parse` if the body is not decodable JSON in either shape.
pub fn parse_tag_response(response: &str) -> Result<Vec<(String, f64)>> {
    let body = extract_json(response);

    let entries: Vec<TagEntry> = serde_json::from_str::<Vec<TagEntry>>(body)
        .or_else(|_| serde_json::from_str::<TagBody>(body).map(|b| b.tags))
        .map_err(|e| Error::Parse {
            cause: format!("tag response is not valid JSON: {e}"),
        })?;

    Ok(entries
        .into_iter()
        .map(|entry| (entry.component_id, entry.confidence))
        .collect())
}

#[derive(Deserialize)]
struct AudienceBody {
    roles: Vec<String>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parses an audience classification response.
///
/// Unknown role names are dropped; the result must still name at least one
/// known role and carry an in-range confidence, otherwise the whole body is
/// rejected. This keeps the never-half-set rule intact: either a complete
/// valid triplet comes back, or nothing does.
///
/// # Errors
///
/// Returns `Parse` on undecodable JSON, an empty or all-unknown role list,
/// or a confidence outside `[0.0, 1.0]`.
pub fn parse_audience_response(response: &str) -> Result<(Vec<AudienceRole>, f64, String)> {
    let body = extract_json(response);
    let decoded: AudienceBody = serde_json::from_str(body).map_err(|e| Error::Parse {
        cause: format!("audience response is not valid JSON: {e}"),
    })?;

    let mut roles = Vec::with_capacity(decoded.roles.len());
    for name in &decoded.roles {
        match AudienceRole::parse(name) {
            Some(role) => {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            },
            None => tracing::warn!(role = %name, "dropping unknown audience role"),
        }
    }

    if roles.is_empty() {
        return Err(Error::Parse {
            cause: "audience response named no known roles".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&decoded.confidence) {
        return Err(Error::Parse {
            cause: format!(
                "audience confidence {} outside [0.0, 1.0]",
                decoded.confidence
            ),
        });
    }

    Ok((roles, decoded.confidence, decoded.reasoning))
}
