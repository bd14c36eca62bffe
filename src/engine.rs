//! Engine facade tying the store, ranking, query, and tagging layers
//! together behind one handle.

use std::sync::Arc;
use tracing::instrument;

use crate::classifier::{BatchClassifier, JobId};
use crate::config::EngineConfig;
use crate::models::{
    Filters, Insight, InsightId, Methodology, Page, RankedInsight,
};
use crate::query::QueryComposer;
use crate::ranking::{HybridRanking, IndexRanking, RankingStrategy};
use crate::storage::{AnnotationKind, Store, StoreStats};
use crate::tagging::{CancelFlag, Report, TaggingPipeline};
use crate::Result;

/// Which ranking strategy a search should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// FTS5 index with bm25 relevance.
    #[default]
    Index,
    /// In-memory keyword/stage/quality scoring.
    Hybrid,
}

/// The retrieval and annotation engine.
///
/// Owns the store and a classifier handle; everything callers need goes
/// through here. Cheap to share behind an `Arc` since the store serializes
/// its own writes.
pub struct Engine {
    store: Store,
    classifier: Arc<dyn BatchClassifier>,
    config: EngineConfig,
}

impl Engine {
    /// Opens an engine per `config`, creating the database if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or initialized.
    pub fn open(config: EngineConfig, classifier: Arc<dyn BatchClassifier>) -> Result<Self> {
        let store = match &config.db_path {
            Some(path) => Store::open(path.clone())?,
            None => Store::in_memory()?,
        };
        tracing::info!(db_path = ?store.db_path(), "engine ready");
        Ok(Self { store, classifier, config })
    }

    /// Direct access to the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Ingestion and reference data
    // -----------------------------------------------------------------

    /// Inserts or replaces an insight, preserving any existing annotations.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed record, `Consistency` while
    /// writes are halted.
    pub fn upsert_insight(&self, insight: &Insight) -> Result<()> {
        self.store.upsert_insight(insight)
    }

    /// Fetches one insight.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on storage errors.
    pub fn get_insight(&self, id: &InsightId) -> Result<Option<Insight>> {
        self.store.get_insight(id)
    }

    /// Removes an insight, its tags, and its index entry.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` while writes are halted.
    pub fn delete_insight(&self, id: &InsightId) -> Result<bool> {
        self.store.delete_insight(id)
    }

    /// Registers (or replaces) a methodology and its components.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` while writes are halted.
    pub fn register_methodology(&self, methodology: &Methodology) -> Result<()> {
        self.store.upsert_methodology(methodology)
    }

    /// Returns all methodologies with components nested.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on storage errors.
    pub fn methodology_tree(&self) -> Result<Vec<Methodology>> {
        self.store.methodology_tree()
    }

    // -----------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------

    /// Searches with optional free text, facets, and pagination.
    ///
    /// # Errors
    ///
    /// Returns any error from the store or ranking layer.
    #[instrument(skip(self, text, filters), fields(mode = ?mode))]
    pub fn search(
        &self,
        mode: SearchMode,
        text: Option<&str>,
        filters: &Filters,
        page: Page,
    ) -> Result<Vec<RankedInsight>> {
        let composer = QueryComposer::new(&self.store, self.config.default_min_confidence);
        match mode {
            SearchMode::Index => {
                let ranker = IndexRanking::new(&self.store, self.config.default_min_confidence);
                composer.execute(&ranker, text, filters, page)
            },
            SearchMode::Hybrid => {
                let ranker =
                    HybridRanking::from_store(&self.store, self.config.default_min_confidence)?;
                composer.execute(&ranker, text, filters, page)
            },
        }
    }

    /// Lists insights matching the facets in store order (best quality
    /// first), page-sliced. The no-text browse path without the ranked
    /// result wrapper.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on storage errors.
    pub fn list_by_facets(&self, filters: &Filters, page: Page) -> Result<Vec<Insight>> {
        self.store
            .list_by_facets(filters, page, self.config.default_min_confidence)
    }

    /// Searches with a caller-supplied ranking strategy.
    ///
    /// # Errors
    ///
    /// Returns any error from the store or ranking layer.
    pub fn search_with(
        &self,
        ranking: &dyn RankingStrategy,
        text: Option<&str>,
        filters: &Filters,
        page: Page,
    ) -> Result<Vec<RankedInsight>> {
        QueryComposer::new(&self.store, self.config.default_min_confidence)
            .execute(ranking, text, filters, page)
    }

    /// Convenience: confidence-gated leadership content search.
    ///
    /// Facets to the leadership roles (VP Sales, CRO) at the configured
    /// default confidence floor.
    ///
    /// # Errors
    ///
    /// Returns any error from the store or ranking layer.
    pub fn search_leadership(
        &self,
        text: Option<&str>,
        page: Page,
    ) -> Result<Vec<RankedInsight>> {
        self.search(SearchMode::Index, text, &Filters::new().leadership(), page)
    }

    // -----------------------------------------------------------------
    // Annotation pipelines
    // -----------------------------------------------------------------

    /// Runs methodology tagging over untagged insights (all insights when
    /// `force` is set).
    ///
    /// Blocks until the batch ends or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns any error from the classifier or store.
    pub fn run_methodology_tagging(&self, force: bool, cancel: CancelFlag) -> Result<Report> {
        self.pipeline(cancel).run_methodology(force)
    }

    /// Runs audience classification over unclassified insights.
    ///
    /// # Errors
    ///
    /// Returns any error from the classifier or store.
    pub fn run_audience_classification(&self, cancel: CancelFlag) -> Result<Report> {
        self.pipeline(cancel).run_audience()
    }

    /// Resumes a previously submitted batch job by id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unknown job id.
    pub fn resume_tagging(&self, job_id: &JobId, cancel: CancelFlag) -> Result<Report> {
        self.pipeline(cancel).resume(job_id)
    }

    /// Lists insights still lacking the given annotation.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on storage errors.
    pub fn pending_annotations(&self, kind: AnnotationKind) -> Result<Vec<Insight>> {
        crate::tagging::pending_for(&self.store, kind)
    }

    fn pipeline(&self, cancel: CancelFlag) -> TaggingPipeline<'_> {
        TaggingPipeline::new(&self.store, self.classifier.as_ref(), &self.config)
            .with_cancel(cancel)
    }

    // -----------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------

    /// Verifies row/index parity; a failure halts writes until
    /// [`Store::acknowledge_reconciled`] is called on the store.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` describing any drift found.
    pub fn integrity_check(&self) -> Result<()> {
        self.store.integrity_check()
    }

    /// Row counts for every engine-owned table.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on storage errors.
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }
}
