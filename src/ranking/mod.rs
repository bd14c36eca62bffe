//! Pluggable ranking strategies over the insight corpus.
//!
//! Two interchangeable implementations sit behind [`RankingStrategy`]:
//! [`IndexRanking`] delegates to the store's FTS5 index and ranks by bm25,
//! while [`HybridRanking`] scores an in-memory snapshot with keyword overlap,
//! stage-synonym awareness, and a quality prior. Both are deterministic for
//! a fixed corpus; their orderings are allowed to disagree.

mod hybrid;
mod index;

pub use hybrid::HybridRanking;
pub use index::IndexRanking;

use crate::Result;
use crate::models::{Filters, RankedInsight};

/// A search strategy producing scored insights, best first.
///
/// Scores are comparable only within one strategy; callers must not mix
/// scores across implementations.
pub trait RankingStrategy: Send + Sync {
    /// Searches the corpus for `query`, applying `filters`, returning at
    /// most `limit` results ordered by descending relevance with a
    /// deterministic tie-break.
    ///
    /// An empty or whitespace-only query yields no results.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying corpus cannot be consulted.
    fn search(&self, query: &str, filters: &Filters, limit: usize) -> Result<Vec<RankedInsight>>;

    /// Human-readable strategy name, used in logs.
    fn name(&self) -> &'static str;
}
