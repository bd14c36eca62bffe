//! FTS5-backed ranking.

use tracing::instrument;

use super::RankingStrategy;
use crate::Result;
use crate::models::{Filters, RankedInsight};
use crate::storage::Store;

/// Ranks by delegating to the store's FTS5 index.
///
/// Scoring is bm25 as computed by `SQLite`; facet filters are pushed down
/// into the same query so filtering never disturbs rank order.
pub struct IndexRanking<'a> {
    store: &'a Store,
    min_confidence: f64,
}

impl<'a> IndexRanking<'a> {
    /// Creates an index-backed ranker over `store`.
    ///
    /// `min_confidence` is the default annotation-confidence floor applied
    /// when the filters do not carry their own.
    #[must_use]
    pub const fn new(store: &'a Store, min_confidence: f64) -> Self {
        Self { store, min_confidence }
    }
}

impl RankingStrategy for IndexRanking<'_> {
    #[instrument(skip(self, query, filters), fields(strategy = self.name(), limit = limit))]
    fn search(&self, query: &str, filters: &Filters, limit: usize) -> Result<Vec<RankedInsight>> {
        self.store.search_fts(query, filters, limit, self.min_confidence)
    }

    fn name(&self) -> &'static str {
        "index"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DealStage, Insight, InsightId, SourceKind};
    use chrono::{TimeZone, Utc};

    fn insight(id: &str, summary: &str, keywords: &[&str]) -> Insight {
        Insight {
            id: InsightId::new(id),
            expert_id: "morgan-ingram".to_string(),
            expert_name: "Morgan J Ingram".to_string(),
            source_kind: SourceKind::VideoTranscript,
            source_url: format!("https://example.com/{id}"),
            collected_at: Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap(),
            primary_stage: DealStage::Prospecting,
            secondary_stages: vec![],
            summary_text: summary.to_string(),
            action_steps: vec![],
            keywords: keywords.iter().map(ToString::to_string).collect(),
            situation_examples: vec![],
            best_quote: String::new(),
            quality_score: 6,
            audience: None,
        }
    }

    #[test]
    fn test_index_ranking_orders_and_limits() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_insight(&insight(
                "ix-1",
                "Video prospecting scripts for cold outreach",
                &["video", "prospecting", "outreach"],
            ))
            .unwrap();
        // The stage column is part of the FTS document, so the non-match
        // must sit in a different stage as well.
        let mut gatekeeper = insight("ix-2", "Handling gatekeepers", &["gatekeeper"]);
        gatekeeper.primary_stage = DealStage::Negotiation;
        store.upsert_insight(&gatekeeper).unwrap();
        store
            .upsert_insight(&insight(
                "ix-3",
                "Prospecting cadence length",
                &["prospecting", "cadence"],
            ))
            .unwrap();

        let ranker = IndexRanking::new(&store, 0.7);
        let hits = ranker.search("prospecting", &Filters::new(), 10).unwrap();
        assert_eq!(hits.len(), 2);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let limited = ranker.search("prospecting", &Filters::new(), 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_index_ranking_empty_query() {
        let store = Store::in_memory().unwrap();
        let ranker = IndexRanking::new(&store, 0.7);
        assert!(ranker.search("  ", &Filters::new(), 10).unwrap().is_empty());
    }
}
