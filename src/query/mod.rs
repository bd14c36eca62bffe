//! Query composition: free text, facets, and pagination in one request.

use tracing::instrument;

use crate::Result;
use crate::models::{Filters, Page, RankedInsight};
use crate::ranking::RankingStrategy;
use crate::storage::Store;

/// Composes optional free text with facet filters and pagination.
///
/// With text, ordering comes from the supplied [`RankingStrategy`]; without
/// it, from store order (best quality first, id tie-break). Facet filters
/// AND together and never reorder results; pagination slices the filtered
/// ordering, so the same request with a later page continues where the
/// previous one left off.
pub struct QueryComposer<'a> {
    store: &'a Store,
    default_min_confidence: f64,
}

impl<'a> QueryComposer<'a> {
    /// Creates a composer over `store`.
    ///
    /// `default_min_confidence` gates confidence-sensitive facets when the
    /// filters carry no floor of their own.
    #[must_use]
    pub const fn new(store: &'a Store, default_min_confidence: f64) -> Self {
        Self { store, default_min_confidence }
    }

    /// Executes a composed query.
    ///
    /// `text` of `None` (or pure whitespace) selects the browse path; in
    /// that case scores carry the quality prior so the result shape stays
    /// uniform across both paths.
    ///
    /// # Errors
    ///
    /// Returns any error from the ranking strategy or the store.
    #[instrument(skip(self, ranking, text, filters), fields(page.number = page.number, page.size = page.size))]
    pub fn execute(
        &self,
        ranking: &dyn RankingStrategy,
        text: Option<&str>,
        filters: &Filters,
        page: Page,
    ) -> Result<Vec<RankedInsight>> {
        match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => {
                // Rank deep enough to cover the requested page, then slice.
                let needed = page.offset().saturating_add(page.size);
                let ranked = ranking.search(text, filters, needed)?;
                Ok(ranked.into_iter().skip(page.offset()).collect())
            },
            None => {
                let insights =
                    self.store
                        .list_by_facets(filters, page, self.default_min_confidence)?;
                Ok(insights
                    .into_iter()
                    .map(|insight| RankedInsight {
                        score: f64::from(insight.quality_score),
                        insight,
                    })
                    .collect())
            },
        }
    }
}
