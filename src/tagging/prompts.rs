//! Prompt construction for batch classification.

use std::fmt::Write;

use crate::models::{AudienceRole, Insight, Methodology};

/// Builds the methodology tagging prompt for one insight.
///
/// The component catalog is embedded verbatim so the classifier can only
/// answer in terms of registered ids; anything else is dropped during
/// reconciliation.
#[must_use]
pub fn tagging_prompt(insight: &Insight, methodologies: &[Methodology]) -> String {
    let mut catalog = String::new();
    for methodology in methodologies {
        let _ = writeln!(catalog, "## {} ({})", methodology.name, methodology.id);
        for component in &methodology.components {
            let _ = writeln!(
                catalog,
                "- id: {} | {} — {} (keywords: {})",
                component.id,
                component.name,
                component.description,
                component.keywords.join(", ")
            );
        }
    }

    format!(
        "You are tagging sales coaching insights with the methodology components they \
         demonstrate.\n\n\
         # Component catalog\n{catalog}\n\
         # Insight\nExpert: {expert}\nStage: {stage}\nSummary: {summary}\n\
         Action steps: {steps}\nQuote: {quote}\n\n\
         Respond with a JSON array of objects, each with \"component_id\" (one of the \
         catalog ids above) and \"confidence\" (0.0 to 1.0). Only include components the \
         insight clearly demonstrates. Respond with [] if none apply. No prose.",
        expert = insight.expert_name,
        stage = insight.primary_stage,
        summary = insight.summary_text,
        steps = insight.action_steps.join("; "),
        quote = insight.best_quote,
    )
}

/// Builds the audience classification prompt for one insight.
#[must_use]
pub fn audience_prompt(insight: &Insight) -> String {
    let roles: Vec<&str> = AudienceRole::all().iter().map(AudienceRole::as_str).collect();

    format!(
        "You are classifying which sales roles a coaching insight is aimed at.\n\n\
         Valid roles: {roles}\n\n\
         # Insight\nExpert: {expert}\nStage: {stage}\nSummary: {summary}\n\
         Action steps: {steps}\n\n\
         Respond with a JSON object with \"roles\" (non-empty array of valid role names), \
         \"confidence\" (0.0 to 1.0), and \"reasoning\" (one sentence). Use \
         [\"general\"] when the insight applies to any seller. No prose outside the JSON.",
        roles = roles.join(", "),
        expert = insight.expert_name,
        stage = insight.primary_stage,
        summary = insight.summary_text,
        steps = insight.action_steps.join("; "),
    )
}
