//! Keyword/stage/quality hybrid ranking over an in-memory snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::instrument;

use super::RankingStrategy;
use crate::Result;
use crate::models::{
    Filters, Insight, InsightId, RankedInsight, stage_synonym_groups,
};
use crate::storage::Store;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Query words shorter than this carry no signal (articles, "how", "to").
const MIN_WORD_LEN: usize = 4;

const KEYWORD_WEIGHT: f64 = 2.0;
const STAGE_WEIGHT: f64 = 3.0;
const QUALITY_DIVISOR: f64 = 5.0;

/// Scores a loaded snapshot by keyword overlap, stage-synonym awareness,
/// and a quality prior.
///
/// Per insight: 2 points per distinct query word (length > 3) found in the
/// searchable text, 3 points per stage-synonym group named in the query
/// whose stage the insight serves, plus `quality_score / 5` once any text
/// signal matched. Insights with no text signal are excluded entirely, so
/// the quality prior can never surface an unrelated insight.
pub struct HybridRanking {
    insights: Vec<Insight>,
    /// `(methodology_id, confidence)` pairs per insight, for the
    /// methodology facet filter.
    methodology_tags: HashMap<InsightId, Vec<(String, f64)>>,
    min_confidence: f64,
}

impl HybridRanking {
    /// Creates a ranker over a pre-loaded snapshot with no methodology tag
    /// data; the methodology facet filter will then match nothing.
    #[must_use]
    pub fn new(insights: Vec<Insight>, min_confidence: f64) -> Self {
        Self {
            insights,
            methodology_tags: HashMap::new(),
            min_confidence,
        }
    }

    /// Snapshots the full corpus (insights, tags, methodology reference)
    /// out of `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn from_store(store: &Store, min_confidence: f64) -> Result<Self> {
        let insights = store.list_all()?;
        let ids: Vec<InsightId> = insights.iter().map(|i| i.id.clone()).collect();

        // Component id -> owning methodology id.
        let mut component_owner: HashMap<String, String> = HashMap::new();
        for methodology in store.methodology_tree()? {
            for component in methodology.components {
                component_owner.insert(component.id, methodology.id.clone());
            }
        }

        let mut methodology_tags: HashMap<InsightId, Vec<(String, f64)>> = HashMap::new();
        for (insight_id, tags) in store.tags_for_insights(&ids)? {
            let entry = methodology_tags.entry(insight_id).or_default();
            for tag in tags {
                if let Some(owner) = component_owner.get(&tag.component_id) {
                    entry.push((owner.clone(), tag.confidence));
                }
            }
        }

        Ok(Self { insights, methodology_tags, min_confidence })
    }

    fn passes_filters(&self, insight: &Insight, filters: &Filters, min_confidence: f64) -> bool {
        if let Some(ref expert_id) = filters.expert_id {
            if insight.expert_id != *expert_id {
                return false;
            }
        }

        if let Some(group) = filters.stage_group {
            if !group.contains(insight.primary_stage, &insight.secondary_stages) {
                return false;
            }
        }

        if let Some(ref methodology_id) = filters.methodology_id {
            let tagged = self
                .methodology_tags
                .get(&insight.id)
                .is_some_and(|tags| {
                    tags.iter()
                        .any(|(m, conf)| m == methodology_id && *conf >= min_confidence)
                });
            if !tagged {
                return false;
            }
        }

        if !filters.roles.is_empty() {
            let Some(ref audience) = insight.audience else {
                return false;
            };
            if audience.confidence < min_confidence {
                return false;
            }
            if !filters.roles.iter().any(|r| audience.roles.contains(r)) {
                return false;
            }
        }

        true
    }
}

/// Splits a query into lowercased scoring words, dropping short ones.
fn query_words(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|w| w.len() >= MIN_WORD_LEN)
        .collect()
}

/// Text-signal score: keyword overlap plus stage-synonym group hits.
fn text_score(insight: &Insight, words: &[String], query_lower: &str) -> f64 {
    let text = insight.searchable_text();

    let mut score = 0.0;
    for word in words {
        if text.contains(word.as_str()) {
            score += KEYWORD_WEIGHT;
        }
    }

    for (stage, synonyms) in stage_synonym_groups() {
        let named = synonyms.iter().any(|s| query_lower.contains(s));
        if !named {
            continue;
        }
        if insight.primary_stage == *stage || insight.secondary_stages.contains(stage) {
            score += STAGE_WEIGHT;
        }
    }

    score
}

impl RankingStrategy for HybridRanking {
    #[instrument(skip(self, query, filters), fields(strategy = self.name(), limit = limit))]
    fn search(&self, query: &str, filters: &Filters, limit: usize) -> Result<Vec<RankedInsight>> {
        let query_lower = query.to_lowercase();
        let words = query_words(query);
        if words.is_empty() && query_lower.trim().is_empty() {
            return Ok(Vec::new());
        }

        let min_confidence = filters.min_confidence.unwrap_or(self.min_confidence);
        let mut scored: Vec<RankedInsight> = self
            .insights
            .iter()
            .filter(|insight| self.passes_filters(insight, filters, min_confidence))
            .filter_map(|insight| {
                let base = text_score(insight, &words, &query_lower);
                if base > 0.0 {
                    Some(RankedInsight {
                        insight: insight.clone(),
                        score: base + f64::from(insight.quality_score) / QUALITY_DIVISOR,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Stable descending sort: equal scores keep snapshot order, so
        // results stay deterministic across runs.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AudienceClassification, AudienceRole, DealStage, SourceKind, StageGroup,
    };
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn insight(id: &str, summary: &str, stage: DealStage, quality: u8) -> Insight {
        Insight {
            id: InsightId::new(id),
            expert_id: "becc-holland".to_string(),
            expert_name: "Becc Holland".to_string(),
            source_kind: SourceKind::WebPost,
            source_url: format!("https://example.com/{id}"),
            collected_at: Utc.with_ymd_and_hms(2025, 4, 2, 8, 0, 0).unwrap(),
            primary_stage: stage,
            secondary_stages: vec![],
            summary_text: summary.to_string(),
            action_steps: vec![],
            keywords: vec![],
            situation_examples: vec![],
            best_quote: String::new(),
            quality_score: quality,
            audience: None,
        }
    }

    #[test]
    fn test_more_overlap_scores_higher() {
        let corpus = vec![
            insight("h-1", "objection handling and price objection reframes", DealStage::Objection, 5),
            insight("h-2", "price anchoring basics", DealStage::Negotiation, 5),
        ];
        let ranker = HybridRanking::new(corpus, 0.7);
        let hits = ranker
            .search("price objection handling", &Filters::new(), 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].insight.id.as_str(), "h-1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_zero_text_signal_is_excluded() {
        // Quality alone never qualifies a result.
        let corpus = vec![insight("h-3", "Completely unrelated advice", DealStage::Closing, 10)];
        let ranker = HybridRanking::new(corpus, 0.7);
        assert!(
            ranker
                .search("discovery questions", &Filters::new(), 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_stage_synonym_boost() {
        // "cold call" names the prospecting synonym group, so the
        // prospecting-stage insight outranks an equal keyword match.
        let corpus = vec![
            insight("h-4", "Scripts that work", DealStage::Prospecting, 5),
            insight("h-5", "Scripts that work", DealStage::Closing, 5),
        ];
        let ranker = HybridRanking::new(corpus, 0.7);
        let hits = ranker.search("cold call scripts", &Filters::new(), 10).unwrap();
        assert_eq!(hits[0].insight.id.as_str(), "h-4");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_quality_breaks_text_ties() {
        let corpus = vec![
            insight("h-6", "discovery question frameworks", DealStage::Discovery, 3),
            insight("h-7", "discovery question frameworks", DealStage::Discovery, 9),
        ];
        let ranker = HybridRanking::new(corpus, 0.7);
        let hits = ranker.search("discovery question", &Filters::new(), 10).unwrap();
        assert_eq!(hits[0].insight.id.as_str(), "h-7");
    }

    #[test]
    fn test_role_filter_requires_confident_audience() {
        let mut classified = insight("h-8", "pipeline coaching for leaders", DealStage::Discovery, 8);
        classified.audience = Some(AudienceClassification {
            roles: vec![AudienceRole::VpSales],
            confidence: 0.9,
            reasoning: "leadership framing".to_string(),
        });
        let mut weak = insight("h-9", "pipeline coaching for leaders", DealStage::Discovery, 8);
        weak.audience = Some(AudienceClassification {
            roles: vec![AudienceRole::VpSales],
            confidence: 0.3,
            reasoning: "weak signal".to_string(),
        });
        let unclassified = insight("h-10", "pipeline coaching for leaders", DealStage::Discovery, 8);

        let ranker = HybridRanking::new(vec![classified, weak, unclassified], 0.7);
        let filters = Filters::new().with_role(AudienceRole::VpSales);
        let hits = ranker.search("pipeline coaching", &filters, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].insight.id.as_str(), "h-8");
    }

    #[test]
    fn test_stage_group_filter() {
        let corpus = vec![
            insight("h-11", "booking meetings from cold email", DealStage::Prospecting, 6),
            insight("h-12", "booking executive sponsors late-stage", DealStage::Negotiation, 6),
        ];
        let ranker = HybridRanking::new(corpus, 0.7);
        let filters = Filters::new().with_stage_group(StageGroup::Outbound);
        let hits = ranker.search("booking meetings", &filters, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].insight.id.as_str(), "h-11");
    }

    proptest! {
        #[test]
        fn prop_results_sorted_and_positive(queries in proptest::collection::vec("[a-z]{4,10}", 1..4)) {
            let corpus = vec![
                insight("p-1", "discovery question frameworks for champions", DealStage::Discovery, 7),
                insight("p-2", "negotiation anchoring and concession planning", DealStage::Negotiation, 4),
                insight("p-3", "cold outreach personalization at scale", DealStage::Prospecting, 9),
            ];
            let ranker = HybridRanking::new(corpus, 0.7);
            let query = queries.join(" ");
            let hits = ranker.search(&query, &Filters::new(), 10).unwrap();
            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for hit in &hits {
                prop_assert!(hit.score > 0.0);
            }
        }
    }
}
