//! Canonical row store with a trigger-maintained FTS5 index.
//!
//! The `Store` is the single source of truth: one `insights` table, two
//! annotation surfaces (methodology tag edges, audience columns), reference
//! data for methodologies, and the derived `insight_search` FTS5 index. The
//! index is written only by the schema triggers, so every row mutation and
//! its index mirror commit or roll back as one transaction. Single-writer,
//! multi-reader: one connection behind a mutex, WAL for concurrent readers.

mod insight_row;
mod sql;

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::instrument;

use crate::models::{
    Filters, Insight, InsightId, Methodology, MethodologyComponent, MethodologyTag, Page,
    RankedInsight,
};
use crate::models::AudienceRole;
use crate::{Error, Result};

pub(crate) use insight_row::encode_json_list;
use insight_row::InsightRow;
use sql::{INSIGHT_COLUMNS, SCHEMA_SQL};

/// Which annotation a pipeline run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Methodology component tags.
    Methodology,
    /// Audience role classification.
    Audience,
}

impl AnnotationKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Methodology => "methodology",
            Self::Audience => "audience",
        }
    }

    /// Parses a kind from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "methodology" => Some(Self::Methodology),
            "audience" => Some(Self::Audience),
            _ => None,
        }
    }
}

/// Row counts for every engine-owned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Insight rows.
    pub insights: usize,
    /// Methodology reference rows.
    pub methodologies: usize,
    /// Methodology component reference rows.
    pub components: usize,
    /// Methodology tag edges.
    pub tags: usize,
}

/// Bookkeeping row for an external batch classification job.
#[derive(Debug, Clone)]
pub struct BatchJobRecord {
    /// External job id as reported by the classifier.
    pub job_id: String,
    /// Which annotation the job targets.
    pub kind: AnnotationKind,
    /// `polling` while in flight, `done` once reconciled.
    pub state: String,
    /// Number of requests submitted in the job.
    pub submitted: usize,
}

/// Acquires the connection mutex, recovering from poison.
///
/// A panic in a previous critical section leaves the connection itself in a
/// valid state, so recovery is safe; the incident is logged and counted.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("store mutex was poisoned, recovering");
            metrics::counter!("coachdb_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// The canonical insight store.
pub struct Store {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database file (None for in-memory).
    db_path: Option<PathBuf>,
    /// Latched by a failed integrity check; refuses writes until cleared.
    writes_halted: AtomicBool,
}

impl Store {
    /// Opens (creating if needed) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_store".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
            writes_halted: AtomicBool::new(false),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Opens an in-memory store (useful for testing and index-less callers).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_store_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
            writes_halted: AtomicBool::new(false),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // WAL gives snapshot-isolated readers alongside the single writer.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "foreign_keys", "ON");

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::OperationFailed {
                operation: "initialize_schema".to_string(),
                cause: e.to_string(),
            })
    }

    /// Refuses mutation while the consistency latch is set.
    fn ensure_writable(&self) -> Result<()> {
        if self.writes_halted.load(Ordering::SeqCst) {
            return Err(Error::Consistency {
                detail: "writes halted after failed integrity check; reconcile and call acknowledge_reconciled"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
        metrics::counter!(
            "coachdb_store_operations_total",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "coachdb_store_operation_duration_ms",
            "operation" => operation,
            "status" => status
        )
        .record(start.elapsed().as_secs_f64() * 1000.0);
    }

    // -----------------------------------------------------------------
    // Insight CRUD
    // -----------------------------------------------------------------

    /// Inserts or replaces an insight.
    ///
    /// Replaces every producer-owned field and refreshes `updated_at`; the
    /// annotation columns (`target_audience`, `audience_confidence`,
    /// `audience_reasoning`) are never touched here, in either direction.
    /// Any `audience` value on the passed record is ignored — annotations
    /// enter the store only through the tagging pipeline.
    ///
    /// The FTS5 entry is refreshed by the insert/update triggers inside the
    /// same implicit transaction as this statement.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the record fails field validation,
    /// `Consistency` while writes are halted, or `OperationFailed` on SQL
    /// errors.
    #[instrument(skip(self, insight), fields(insight.id = %insight.id))]
    pub fn upsert_insight(&self, insight: &Insight) -> Result<()> {
        let start = Instant::now();
        self.ensure_writable()?;
        insight.validate()?;

        let secondary: Vec<&str> = insight
            .secondary_stages
            .iter()
            .map(crate::models::DealStage::as_str)
            .collect();
        let result = {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO insights (
                    id, expert_id, expert_name, source_kind, source_url,
                    collected_at, primary_stage, secondary_stages, summary_text,
                    action_steps, keywords, situation_examples, best_quote,
                    quality_score
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(id) DO UPDATE SET
                    expert_id = excluded.expert_id,
                    expert_name = excluded.expert_name,
                    source_kind = excluded.source_kind,
                    source_url = excluded.source_url,
                    collected_at = excluded.collected_at,
                    primary_stage = excluded.primary_stage,
                    secondary_stages = excluded.secondary_stages,
                    summary_text = excluded.summary_text,
                    action_steps = excluded.action_steps,
                    keywords = excluded.keywords,
                    situation_examples = excluded.situation_examples,
                    best_quote = excluded.best_quote,
                    quality_score = excluded.quality_score,
                    updated_at = datetime('now')",
                params![
                    insight.id.as_str(),
                    insight.expert_id,
                    insight.expert_name,
                    insight.source_kind.as_str(),
                    insight.source_url,
                    insight.collected_at.to_rfc3339(),
                    insight.primary_stage.as_str(),
                    encode_json_list(&secondary),
                    insight.summary_text,
                    encode_json_list(&insight.action_steps),
                    encode_json_list(&insight.keywords),
                    encode_json_list(&insight.situation_examples),
                    insight.best_quote,
                    i64::from(insight.quality_score),
                ],
            )
            .map(|_| ())
            .map_err(|e| Error::OperationFailed {
                operation: "upsert_insight".to_string(),
                cause: e.to_string(),
            })
        };

        let status = if result.is_ok() { "success" } else { "error" };
        Self::record_operation_metrics("upsert_insight", start, status);
        result
    }

    /// Fetches a single insight by id.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL or row-decoding errors.
    pub fn get_insight(&self, id: &InsightId) -> Result<Option<Insight>> {
        let conn = acquire_lock(&self.conn);
        let sql = format!("SELECT {INSIGHT_COLUMNS} FROM insights i WHERE i.id = ?1");
        let row = conn
            .query_row(&sql, params![id.as_str()], InsightRow::from_row)
            .optional()
            .map_err(|e| Error::OperationFailed {
                operation: "get_insight".to_string(),
                cause: e.to_string(),
            })?;
        row.map(InsightRow::into_insight).transpose()
    }

    /// Deletes an insight, its tags, and its index entry.
    ///
    /// Administrative operation; the delete trigger removes the FTS5 entry
    /// in the same transaction so the index cannot go stale.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` while writes are halted, or `OperationFailed`
    /// on SQL errors.
    #[instrument(skip(self), fields(insight.id = %id))]
    pub fn delete_insight(&self, id: &InsightId) -> Result<bool> {
        let start = Instant::now();
        self.ensure_writable()?;

        let result = (|| {
            let conn = acquire_lock(&self.conn);
            conn.execute("BEGIN IMMEDIATE", [])
                .map_err(|e| Error::OperationFailed {
                    operation: "begin_transaction".to_string(),
                    cause: e.to_string(),
                })?;

            let result = (|| {
                conn.execute(
                    "DELETE FROM methodology_tags WHERE insight_id = ?1",
                    params![id.as_str()],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "delete_tags".to_string(),
                    cause: e.to_string(),
                })?;

                let deleted = conn
                    .execute("DELETE FROM insights WHERE id = ?1", params![id.as_str()])
                    .map_err(|e| Error::OperationFailed {
                        operation: "delete_insight".to_string(),
                        cause: e.to_string(),
                    })?;

                Ok(deleted > 0)
            })();

            if result.is_ok() {
                conn.execute("COMMIT", [])
                    .map_err(|e| Error::OperationFailed {
                        operation: "commit_transaction".to_string(),
                        cause: e.to_string(),
                    })?;
            } else {
                let _ = conn.execute("ROLLBACK", []);
            }
            result
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        Self::record_operation_metrics("delete_insight", start, status);
        result
    }

    /// Lists insights lacking the given annotation, ordered by id.
    ///
    /// Stable across calls with no intervening write, which makes pipeline
    /// re-runs naturally idempotent.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL or row-decoding errors.
    pub fn list_untagged(&self, kind: AnnotationKind) -> Result<Vec<Insight>> {
        let clause = match kind {
            AnnotationKind::Methodology => {
                "i.id NOT IN (SELECT DISTINCT insight_id FROM methodology_tags)"
            },
            AnnotationKind::Audience => "i.target_audience IS NULL",
        };
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights i WHERE {clause} ORDER BY i.id"
        );
        self.query_insights(&sql, &[])
    }

    /// Lists every insight, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL or row-decoding errors.
    pub fn list_all(&self) -> Result<Vec<Insight>> {
        let sql = format!("SELECT {INSIGHT_COLUMNS} FROM insights i ORDER BY i.id");
        self.query_insights(&sql, &[])
    }

    fn query_insights(&self, sql: &str, sql_params: &[Box<dyn ToSql>]) -> Result<Vec<Insight>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(|e| Error::OperationFailed {
            operation: "prepare_query_insights".to_string(),
            cause: e.to_string(),
        })?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(sql_params.iter()), InsightRow::from_row)
            .map_err(|e| Error::OperationFailed {
                operation: "query_insights".to_string(),
                cause: e.to_string(),
            })?;

        let mut insights = Vec::new();
        for row in rows {
            let row = row.map_err(|e| Error::OperationFailed {
                operation: "read_insight_row".to_string(),
                cause: e.to_string(),
            })?;
            insights.push(row.into_insight()?);
        }
        Ok(insights)
    }

    // -----------------------------------------------------------------
    // Annotations
    // -----------------------------------------------------------------

    /// Upserts a methodology tag on the `(insight_id, component_id)` key.
    ///
    /// Re-tagging the same pair replaces the confidence, never duplicates
    /// the row; racing pipeline runs serialize here.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the component id is not registered or the
    /// confidence is out of range, `Consistency` while writes are halted,
    /// or `OperationFailed` on SQL errors.
    #[instrument(skip(self, tagged_by), fields(insight.id = %insight_id, component = component_id))]
    pub fn tag_methodology(
        &self,
        insight_id: &InsightId,
        component_id: &str,
        confidence: f64,
        tagged_by: &str,
    ) -> Result<()> {
        let start = Instant::now();
        self.ensure_writable()?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::Validation(format!(
                "tag confidence {confidence} outside [0.0, 1.0]"
            )));
        }

        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let known: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM methodology_components WHERE id = ?1",
                    params![component_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::OperationFailed {
                    operation: "check_component".to_string(),
                    cause: e.to_string(),
                })?;
            if known.is_none() {
                return Err(Error::Validation(format!(
                    "unknown methodology component '{component_id}'"
                )));
            }

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM insights WHERE id = ?1",
                    params![insight_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::OperationFailed {
                    operation: "check_insight".to_string(),
                    cause: e.to_string(),
                })?;
            if exists.is_none() {
                return Err(Error::Validation(format!(
                    "unknown insight '{insight_id}'"
                )));
            }

            conn.execute(
                "INSERT INTO methodology_tags (insight_id, component_id, confidence, tagged_by)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(insight_id, component_id) DO UPDATE SET
                     confidence = excluded.confidence,
                     tagged_by = excluded.tagged_by",
                params![insight_id.as_str(), component_id, confidence, tagged_by],
            )
            .map(|_| ())
            .map_err(|e| Error::OperationFailed {
                operation: "tag_methodology".to_string(),
                cause: e.to_string(),
            })
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        Self::record_operation_metrics("tag_methodology", start, status);
        result
    }

    /// Sets the audience classification triplet atomically.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on an empty role list, out-of-range confidence,
    /// or unknown insight id; `Consistency` while writes are halted.
    #[instrument(skip(self, roles, reasoning), fields(insight.id = %insight_id))]
    pub fn set_audience(
        &self,
        insight_id: &InsightId,
        roles: &[AudienceRole],
        confidence: f64,
        reasoning: &str,
    ) -> Result<()> {
        let start = Instant::now();
        self.ensure_writable()?;
        crate::models::validate_audience(roles, confidence)?;

        let role_names: Vec<&str> = roles.iter().map(AudienceRole::as_str).collect();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let updated = conn
                .execute(
                    "UPDATE insights
                     SET target_audience = ?1,
                         audience_confidence = ?2,
                         audience_reasoning = ?3,
                         updated_at = datetime('now')
                     WHERE id = ?4",
                    params![
                        encode_json_list(&role_names),
                        confidence,
                        reasoning,
                        insight_id.as_str()
                    ],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "set_audience".to_string(),
                    cause: e.to_string(),
                })?;

            if updated == 0 {
                return Err(Error::Validation(format!(
                    "unknown insight '{insight_id}'"
                )));
            }
            Ok(())
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        Self::record_operation_metrics("set_audience", start, status);
        result
    }

    /// Returns methodology tags for a batch of insights, grouped by insight.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn tags_for_insights(
        &self,
        ids: &[InsightId],
    ) -> Result<HashMap<InsightId, Vec<MethodologyTag>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = acquire_lock(&self.conn);
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT insight_id, component_id, confidence, tagged_by
             FROM methodology_tags
             WHERE insight_id IN ({})
             ORDER BY confidence DESC",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
            operation: "prepare_tags_for_insights".to_string(),
            cause: e.to_string(),
        })?;

        let id_strs: Vec<&str> = ids.iter().map(InsightId::as_str).collect();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(id_strs.iter()), |row| {
                Ok(MethodologyTag {
                    insight_id: InsightId::new(row.get::<_, String>(0)?),
                    component_id: row.get(1)?,
                    confidence: row.get(2)?,
                    tagged_by: row.get(3)?,
                })
            })
            .map_err(|e| Error::OperationFailed {
                operation: "tags_for_insights".to_string(),
                cause: e.to_string(),
            })?;

        let mut grouped: HashMap<InsightId, Vec<MethodologyTag>> = HashMap::new();
        for row in rows {
            let tag = row.map_err(|e| Error::OperationFailed {
                operation: "read_tag_row".to_string(),
                cause: e.to_string(),
            })?;
            grouped.entry(tag.insight_id.clone()).or_default().push(tag);
        }
        Ok(grouped)
    }

    // -----------------------------------------------------------------
    // Methodology reference data
    // -----------------------------------------------------------------

    /// Inserts or replaces a methodology with all its components.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` while writes are halted, or `OperationFailed`
    /// on SQL errors.
    pub fn upsert_methodology(&self, methodology: &Methodology) -> Result<()> {
        self.ensure_writable()?;
        let conn = acquire_lock(&self.conn);

        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| Error::OperationFailed {
                operation: "begin_transaction".to_string(),
                cause: e.to_string(),
            })?;

        let result = (|| {
            conn.execute(
                "INSERT OR REPLACE INTO methodologies (id, name, overview)
                 VALUES (?1, ?2, ?3)",
                params![methodology.id, methodology.name, methodology.overview],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "upsert_methodology".to_string(),
                cause: e.to_string(),
            })?;

            for component in &methodology.components {
                conn.execute(
                    "INSERT OR REPLACE INTO methodology_components
                         (id, methodology_id, name, description, keywords)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        component.id,
                        methodology.id,
                        component.name,
                        component.description,
                        encode_json_list(&component.keywords),
                    ],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "upsert_component".to_string(),
                    cause: e.to_string(),
                })?;
            }
            Ok(())
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])
                .map_err(|e| Error::OperationFailed {
                    operation: "commit_transaction".to_string(),
                    cause: e.to_string(),
                })?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }
        result
    }

    /// Returns all methodologies with their components nested.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn methodology_tree(&self) -> Result<Vec<Methodology>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare("SELECT id, name, overview FROM methodologies ORDER BY name")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_methodology_tree".to_string(),
                cause: e.to_string(),
            })?;
        let methodologies: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .and_then(std::iter::Iterator::collect)
            .map_err(|e| Error::OperationFailed {
                operation: "list_methodologies".to_string(),
                cause: e.to_string(),
            })?;

        let mut comp_stmt = conn
            .prepare(
                "SELECT id, name, description, keywords
                 FROM methodology_components
                 WHERE methodology_id = ?1
                 ORDER BY id",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_components".to_string(),
                cause: e.to_string(),
            })?;

        let mut tree = Vec::with_capacity(methodologies.len());
        for (id, name, overview) in methodologies {
            let components: Vec<MethodologyComponent> = comp_stmt
                .query_map(params![id], |row| {
                    let keywords_json: String = row.get(3)?;
                    Ok(MethodologyComponent {
                        id: row.get(0)?,
                        methodology_id: id.clone(),
                        name: row.get(1)?,
                        description: row.get(2)?,
                        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
                    })
                })
                .and_then(std::iter::Iterator::collect)
                .map_err(|e| Error::OperationFailed {
                    operation: "list_components".to_string(),
                    cause: e.to_string(),
                })?;

            tree.push(Methodology { id, name, overview, components });
        }
        Ok(tree)
    }

    /// Returns the set of registered component ids.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn component_ids(&self) -> Result<HashSet<String>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT id FROM methodology_components")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_component_ids".to_string(),
                cause: e.to_string(),
            })?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(std::iter::Iterator::collect)
            .map_err(|e| Error::OperationFailed {
                operation: "component_ids".to_string(),
                cause: e.to_string(),
            })?;
        Ok(ids)
    }

    // -----------------------------------------------------------------
    // Search and facet listing
    // -----------------------------------------------------------------

    /// Full-text search via the FTS5 index with facet post-filters.
    ///
    /// Query terms are OR'd and quoted so FTS5 operators in user input match
    /// literally. Results order by bm25 relevance (id as deterministic
    /// tie-break). An empty or whitespace-only query returns no results.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL or row-decoding errors.
    #[instrument(skip(self, query, filters), fields(query_length = query.len(), limit = limit))]
    pub fn search_fts(
        &self,
        query: &str,
        filters: &Filters,
        limit: usize,
        default_min_confidence: f64,
    ) -> Result<Vec<RankedInsight>> {
        let start = Instant::now();
        let Some(fts_query) = build_fts_query(query) else {
            return Ok(Vec::new());
        };

        let result = (|| {
            let (facet_clause, facet_params, _) =
                build_facet_clause(filters, default_min_confidence, 2);

            let sql = format!(
                "SELECT {INSIGHT_COLUMNS}, bm25(insight_search) AS score
                 FROM insight_search
                 JOIN insights i ON i.id = insight_search.id
                 WHERE insight_search MATCH ?1 {facet_clause}
                 ORDER BY score, i.id
                 LIMIT {limit}"
            );

            let conn = acquire_lock(&self.conn);
            let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
                operation: "prepare_search".to_string(),
                cause: e.to_string(),
            })?;

            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(
                        std::iter::once(Box::new(fts_query) as Box<dyn ToSql>)
                            .chain(facet_params),
                    ),
                    |row| {
                        let insight_row = InsightRow::from_row(row)?;
                        let score: f64 = row.get(17)?;
                        Ok((insight_row, score))
                    },
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "execute_search".to_string(),
                    cause: e.to_string(),
                })?;

            let mut results = Vec::new();
            for row in rows {
                let (insight_row, score) = row.map_err(|e| Error::OperationFailed {
                    operation: "read_search_row".to_string(),
                    cause: e.to_string(),
                })?;
                // bm25() is negative with more negative = better; negate so
                // higher = better for callers.
                results.push(RankedInsight {
                    insight: insight_row.into_insight()?,
                    score: -score,
                });
            }
            Ok(results)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        Self::record_operation_metrics("search_fts", start, status);
        result
    }

    /// Lists insights matching the facets, best quality first, page-sliced.
    ///
    /// Store order is descending `quality_score` with ascending id as the
    /// deterministic tie-break.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL or row-decoding errors.
    pub fn list_by_facets(
        &self,
        filters: &Filters,
        page: Page,
        default_min_confidence: f64,
    ) -> Result<Vec<Insight>> {
        let (facet_clause, facet_params, _) =
            build_facet_clause(filters, default_min_confidence, 1);
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS}
             FROM insights i
             WHERE 1=1 {facet_clause}
             ORDER BY i.quality_score DESC, i.id
             LIMIT {} OFFSET {}",
            page.size,
            page.offset()
        );
        self.query_insights(&sql, &facet_params)
    }

    // -----------------------------------------------------------------
    // Batch job bookkeeping
    // -----------------------------------------------------------------

    /// Records a submitted batch job so polling can resume after a restart.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn record_batch_job(
        &self,
        job_id: &str,
        kind: AnnotationKind,
        submitted: usize,
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO batch_jobs (job_id, kind, state, submitted)
             VALUES (?1, ?2, 'polling', ?3)",
            params![job_id, kind.as_str(), i64::try_from(submitted).unwrap_or(i64::MAX)],
        )
        .map(|_| ())
        .map_err(|e| Error::OperationFailed {
            operation: "record_batch_job".to_string(),
            cause: e.to_string(),
        })
    }

    /// Marks a batch job as fully reconciled.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn finish_batch_job(&self, job_id: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE batch_jobs SET state = 'done', updated_at = datetime('now')
             WHERE job_id = ?1",
            params![job_id],
        )
        .map(|_| ())
        .map_err(|e| Error::OperationFailed {
            operation: "finish_batch_job".to_string(),
            cause: e.to_string(),
        })
    }

    /// Looks up a recorded batch job.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn get_batch_job(&self, job_id: &str) -> Result<Option<BatchJobRecord>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT job_id, kind, state, submitted FROM batch_jobs WHERE job_id = ?1",
            params![job_id],
            |row| {
                let kind_str: String = row.get(1)?;
                let submitted: i64 = row.get(3)?;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Ok(BatchJobRecord {
                    job_id: row.get(0)?,
                    kind: AnnotationKind::parse(&kind_str).unwrap_or(AnnotationKind::Methodology),
                    state: row.get(2)?,
                    submitted: submitted.max(0) as usize,
                })
            },
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_batch_job".to_string(),
            cause: e.to_string(),
        })
    }

    // -----------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------

    /// Verifies row/index parity and content freshness.
    ///
    /// Structurally this cannot fail while all writes go through the
    /// triggers; a detected mismatch means out-of-band edits. On mismatch
    /// the store latches writes closed and returns `Consistency` — it never
    /// self-heals.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` describing the drift, or `OperationFailed` on
    /// SQL errors.
    #[instrument(skip(self))]
    pub fn integrity_check(&self) -> Result<()> {
        let (missing, orphaned, stale, duplicated) = {
            let conn = acquire_lock(&self.conn);
            conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM insights i
                     WHERE NOT EXISTS (SELECT 1 FROM insight_search s WHERE s.id = i.id)),
                    (SELECT COUNT(*) FROM insight_search s
                     WHERE NOT EXISTS (SELECT 1 FROM insights i WHERE i.id = s.id)),
                    (SELECT COUNT(*) FROM insights i
                     JOIN insight_search s ON s.id = i.id
                     WHERE s.summary != i.summary_text),
                    (SELECT COUNT(*) - COUNT(DISTINCT id) FROM insight_search)",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .map_err(|e| Error::OperationFailed {
                operation: "integrity_check".to_string(),
                cause: e.to_string(),
            })?
        };

        if missing == 0 && orphaned == 0 && stale == 0 && duplicated == 0 {
            return Ok(());
        }

        self.writes_halted.store(true, Ordering::SeqCst);
        metrics::counter!("coachdb_integrity_failures_total").increment(1);
        let detail = format!(
            "{missing} rows without index entry, {orphaned} orphaned index entries, {stale} stale index entries, {duplicated} duplicated index entries"
        );
        tracing::error!("integrity check failed, halting writes: {detail}");
        Err(Error::Consistency { detail })
    }

    /// Clears the writes-halted latch after manual reconciliation.
    pub fn acknowledge_reconciled(&self) {
        self.writes_halted.store(false, Ordering::SeqCst);
        tracing::info!("writes re-enabled after reconciliation");
    }

    /// Returns row counts for every engine-owned table.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` on SQL errors.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM insights),
                (SELECT COUNT(*) FROM methodologies),
                (SELECT COUNT(*) FROM methodology_components),
                (SELECT COUNT(*) FROM methodology_tags)",
            [],
            |row| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Ok(StoreStats {
                    insights: row.get::<_, i64>(0)?.max(0) as usize,
                    methodologies: row.get::<_, i64>(1)?.max(0) as usize,
                    components: row.get::<_, i64>(2)?.max(0) as usize,
                    tags: row.get::<_, i64>(3)?.max(0) as usize,
                })
            },
        )
        .map_err(|e| Error::OperationFailed {
            operation: "stats".to_string(),
            cause: e.to_string(),
        })
    }

    /// Test/repair hook: runs arbitrary SQL against the store.
    ///
    /// Bypasses the triggers' own protections deliberately; exists so
    /// integrity-check tests and manual reconciliation can touch the index
    /// directly.
    #[doc(hidden)]
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(sql).map_err(|e| Error::OperationFailed {
            operation: "execute_raw".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Builds an OR'd, quoted FTS5 match expression from free text.
///
/// Returns `None` for queries with no usable terms.
fn build_fts_query(query: &str) -> Option<String> {
    let terms: Vec<_> = query.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }

    let estimated_len = terms.iter().map(|t| t.len() + 8).sum::<usize>();
    let mut fts_query = String::with_capacity(estimated_len);
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            fts_query.push_str(" OR ");
        }
        fts_query.push('"');
        for c in term.chars() {
            if c == '"' {
                fts_query.push_str("\"\"");
            } else {
                fts_query.push(c);
            }
        }
        fts_query.push('"');
    }
    Some(fts_query)
}

/// Builds an AND-composed facet WHERE fragment with numbered parameters.
///
/// Returns the clause (prefixed with ` AND` when non-empty), its parameters,
/// and the next free parameter index.
fn build_facet_clause(
    filters: &Filters,
    default_min_confidence: f64,
    start_param: usize,
) -> (String, Vec<Box<dyn ToSql>>, usize) {
    let mut conditions = Vec::new();
    let mut sql_params: Vec<Box<dyn ToSql>> = Vec::new();
    let mut param_idx = start_param;
    let min_confidence = filters.min_confidence.unwrap_or(default_min_confidence);

    if let Some(ref expert_id) = filters.expert_id {
        conditions.push(format!("i.expert_id = ?{param_idx}"));
        param_idx += 1;
        sql_params.push(Box::new(expert_id.clone()));
    }

    if let Some(group) = filters.stage_group {
        // Primary stage in the group, or any secondary stage (stored as a
        // JSON string array) containing a group member.
        let mut parts = Vec::new();
        let in_placeholders: Vec<String> = group
            .stages()
            .iter()
            .map(|_| {
                let p = format!("?{param_idx}");
                param_idx += 1;
                p
            })
            .collect();
        parts.push(format!(
            "i.primary_stage IN ({})",
            in_placeholders.join(", ")
        ));
        for stage in group.stages() {
            sql_params.push(Box::new(stage.as_str()));
        }
        for stage in group.stages() {
            parts.push(format!("i.secondary_stages LIKE ?{param_idx}"));
            param_idx += 1;
            sql_params.push(Box::new(format!("%\"{}\"%", stage.as_str())));
        }
        conditions.push(format!("({})", parts.join(" OR ")));
    }

    if let Some(ref methodology_id) = filters.methodology_id {
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM methodology_tags t
                     JOIN methodology_components mc ON mc.id = t.component_id
                     WHERE t.insight_id = i.id
                       AND mc.methodology_id = ?{param_idx}
                       AND t.confidence >= ?{})",
            param_idx + 1
        ));
        param_idx += 2;
        sql_params.push(Box::new(methodology_id.clone()));
        sql_params.push(Box::new(min_confidence));
    }

    if !filters.roles.is_empty() {
        let role_conditions: Vec<String> = filters
            .roles
            .iter()
            .map(|role| {
                let cond = format!("i.target_audience LIKE ?{param_idx}");
                param_idx += 1;
                sql_params.push(Box::new(format!("%\"{}\"%", role.as_str())));
                cond
            })
            .collect();
        conditions.push(format!(
            "(i.audience_confidence >= ?{param_idx} AND ({}))",
            role_conditions.join(" OR ")
        ));
        param_idx += 1;
        sql_params.push(Box::new(min_confidence));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" AND {}", conditions.join(" AND "))
    };

    (clause, sql_params, param_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AudienceRole, DealStage, Insight, InsightId, Methodology, MethodologyComponent,
        SourceKind, StageGroup,
    };
    use chrono::{TimeZone, Utc};

    fn test_insight(id: &str, summary: &str) -> Insight {
        Insight {
            id: InsightId::new(id),
            expert_id: "jill-rowley".to_string(),
            expert_name: "Jill Rowley".to_string(),
            source_kind: SourceKind::WebPost,
            source_url: format!("https://example.com/{id}"),
            collected_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            primary_stage: DealStage::Prospecting,
            secondary_stages: vec![DealStage::Qualification],
            summary_text: summary.to_string(),
            action_steps: vec!["Step one".to_string()],
            keywords: vec!["outreach".to_string()],
            situation_examples: vec!["First touch".to_string()],
            best_quote: "Always be helping".to_string(),
            quality_score: 7,
            audience: None,
        }
    }

    fn seed_methodology(store: &Store) {
        store
            .upsert_methodology(&Methodology {
                id: "meddic".to_string(),
                name: "MEDDIC".to_string(),
                overview: "Qualification framework".to_string(),
                components: vec![
                    MethodologyComponent {
                        id: "meddic_champion".to_string(),
                        methodology_id: "meddic".to_string(),
                        name: "Champion".to_string(),
                        description: "Internal advocate".to_string(),
                        keywords: vec!["champion".to_string()],
                    },
                    MethodologyComponent {
                        id: "meddic_metrics".to_string(),
                        methodology_id: "meddic".to_string(),
                        name: "Metrics".to_string(),
                        description: "Quantified value".to_string(),
                        keywords: vec!["roi".to_string()],
                    },
                ],
            })
            .unwrap();
    }

    #[test]
    fn test_upsert_and_get_roundtrip() {
        let store = Store::in_memory().unwrap();
        let insight = test_insight("rt-1", "Personalize the first line of every email");
        store.upsert_insight(&insight).unwrap();

        let fetched = store.get_insight(&InsightId::new("rt-1")).unwrap().unwrap();
        assert_eq!(fetched.summary_text, insight.summary_text);
        assert_eq!(fetched.secondary_stages, vec![DealStage::Qualification]);
        assert_eq!(fetched.quality_score, 7);
        assert!(fetched.audience.is_none());
    }

    #[test]
    fn test_upsert_preserves_annotations() {
        // Replacing producer fields must not clobber annotation fields.
        let store = Store::in_memory().unwrap();
        let insight = test_insight("p1-1", "Original summary");
        store.upsert_insight(&insight).unwrap();
        store
            .set_audience(
                &insight.id,
                &[AudienceRole::VpSales],
                0.9,
                "leadership content",
            )
            .unwrap();

        let mut replacement = test_insight("p1-1", "Rewritten summary");
        replacement.audience = None;
        store.upsert_insight(&replacement).unwrap();

        let fetched = store.get_insight(&insight.id).unwrap().unwrap();
        assert_eq!(fetched.summary_text, "Rewritten summary");
        let audience = fetched.audience.expect("annotation survived upsert");
        assert_eq!(audience.roles, vec![AudienceRole::VpSales]);
        assert!((audience.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_index_follows_row_through_lifecycle() {
        // Exactly one index entry per live row, zero after delete.
        let store = Store::in_memory().unwrap();
        let insight = test_insight("p2-1", "Talk less on discovery calls");
        store.upsert_insight(&insight).unwrap();
        store.integrity_check().unwrap();

        let hits = store
            .search_fts("discovery calls", &Filters::new(), 10, 0.7)
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Update re-syncs the index in the same transaction.
        let mut updated = test_insight("p2-1", "Ask open questions early");
        updated.keywords = vec!["questions".to_string()];
        store.upsert_insight(&updated).unwrap();
        store.integrity_check().unwrap();
        assert!(
            store
                .search_fts("talk less", &Filters::new(), 10, 0.7)
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store
                .search_fts("open questions", &Filters::new(), 10, 0.7)
                .unwrap()
                .len(),
            1
        );

        assert!(store.delete_insight(&insight.id).unwrap());
        store.integrity_check().unwrap();
        assert!(
            store
                .search_fts("questions", &Filters::new(), 10, 0.7)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_tag_upsert_is_idempotent() {
        // Re-tagging the same pair keeps one row with the latest confidence.
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        let insight = test_insight("p5-1", "Find your champion early");
        store.upsert_insight(&insight).unwrap();

        store
            .tag_methodology(&insight.id, "meddic_champion", 0.6, "classifier")
            .unwrap();
        store
            .tag_methodology(&insight.id, "meddic_champion", 0.85, "classifier")
            .unwrap();

        let tags = store.tags_for_insights(&[insight.id.clone()]).unwrap();
        let insight_tags = &tags[&insight.id];
        assert_eq!(insight_tags.len(), 1);
        assert!((insight_tags[0].confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_component_rejected() {
        // Tags referencing unregistered components never land.
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        let insight = test_insight("p6-1", "Quantify the pain");
        store.upsert_insight(&insight).unwrap();

        let err = store
            .tag_methodology(&insight.id, "spin_implication", 0.9, "classifier")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.tags_for_insights(&[insight.id]).unwrap().is_empty());
    }

    #[test]
    fn test_set_audience_validates_pair() {
        let store = Store::in_memory().unwrap();
        let insight = test_insight("aud-1", "Coach reps weekly");
        store.upsert_insight(&insight).unwrap();

        assert!(matches!(
            store.set_audience(&insight.id, &[], 0.8, "n/a"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.set_audience(&insight.id, &[AudienceRole::Manager], 1.4, "n/a"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.set_audience(&InsightId::new("ghost"), &[AudienceRole::Manager], 0.8, "n/a"),
            Err(Error::Validation(_))
        ));

        store
            .set_audience(&insight.id, &[AudienceRole::Manager], 0.8, "management advice")
            .unwrap();
        let audience = store
            .get_insight(&insight.id)
            .unwrap()
            .unwrap()
            .audience
            .unwrap();
        assert_eq!(audience.roles, vec![AudienceRole::Manager]);
        assert_eq!(audience.reasoning, "management advice");
    }

    #[test]
    fn test_list_untagged_is_stable() {
        // Two reads with no intervening write agree.
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        for i in 0..4 {
            store
                .upsert_insight(&test_insight(&format!("c-{i}"), "Some advice"))
                .unwrap();
        }
        store
            .tag_methodology(&InsightId::new("c-1"), "meddic_metrics", 0.7, "classifier")
            .unwrap();

        let first = store.list_untagged(AnnotationKind::Methodology).unwrap();
        let second = store.list_untagged(AnnotationKind::Methodology).unwrap();
        let first_ids: Vec<_> = first.iter().map(|i| i.id.as_str().to_string()).collect();
        let second_ids: Vec<_> = second.iter().map(|i| i.id.as_str().to_string()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first_ids, vec!["c-0", "c-2", "c-3"]);

        // Audience untagged sees everything until classified.
        assert_eq!(store.list_untagged(AnnotationKind::Audience).unwrap().len(), 4);
        store
            .set_audience(&InsightId::new("c-0"), &[AudienceRole::Ae], 0.8, "deal work")
            .unwrap();
        assert_eq!(store.list_untagged(AnnotationKind::Audience).unwrap().len(), 3);
    }

    #[test]
    fn test_search_empty_query_returns_empty() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_insight(&test_insight("q-1", "Anything at all"))
            .unwrap();
        assert!(store.search_fts("", &Filters::new(), 10, 0.7).unwrap().is_empty());
        assert!(store.search_fts("   ", &Filters::new(), 10, 0.7).unwrap().is_empty());
    }

    #[test]
    fn test_search_on_empty_store_is_not_an_error() {
        let store = Store::in_memory().unwrap();
        assert!(
            store
                .search_fts("pipeline review", &Filters::new(), 10, 0.7)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_facet_filters_compose() {
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);

        let mut a = test_insight("f-a", "Cold email structure that books meetings");
        a.expert_id = "josh-braun".to_string();
        let mut b = test_insight("f-b", "Negotiation anchoring for renewals");
        b.expert_id = "chris-voss".to_string();
        b.primary_stage = DealStage::Negotiation;
        b.secondary_stages = vec![];
        store.upsert_insight(&a).unwrap();
        store.upsert_insight(&b).unwrap();

        let filters = Filters::new().with_stage_group(StageGroup::Outbound);
        let hits = store.list_by_facets(&filters, Page::first(), 0.7).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "f-a");

        let filters = Filters::new()
            .with_stage_group(StageGroup::DealControl)
            .with_expert("chris-voss");
        let hits = store.list_by_facets(&filters, Page::first(), 0.7).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "f-b");

        let filters = Filters::new().with_methodology("meddic");
        assert!(store.list_by_facets(&filters, Page::first(), 0.7).unwrap().is_empty());
        store
            .tag_methodology(&InsightId::new("f-a"), "meddic_metrics", 0.9, "classifier")
            .unwrap();
        let hits = store.list_by_facets(&filters, Page::first(), 0.7).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_audience_confidence_floor() {
        // Leadership search contract: the confidence floor gates visibility.
        let store = Store::in_memory().unwrap();
        let mut vp = test_insight("vp-1", "Run pipeline review as coaching, not inspection");
        vp.keywords = vec!["pipeline".to_string(), "review".to_string()];
        let mut ae = test_insight("ae-1", "Pipeline review prep for sellers");
        ae.keywords = vec!["pipeline".to_string(), "review".to_string()];
        store.upsert_insight(&vp).unwrap();
        store.upsert_insight(&ae).unwrap();

        store
            .set_audience(&vp.id, &[AudienceRole::VpSales], 0.9, "leaders run reviews")
            .unwrap();
        store
            .set_audience(&ae.id, &[AudienceRole::Ae], 0.85, "seller prep")
            .unwrap();

        let filters = Filters::new()
            .with_role(AudienceRole::VpSales)
            .with_min_confidence(0.7);
        let hits = store
            .search_fts("pipeline review", &filters, 10, 0.7)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].insight.id.as_str(), "vp-1");

        // A low-confidence classification is invisible at the 0.7 floor.
        store
            .set_audience(&ae.id, &[AudienceRole::VpSales], 0.3, "weak signal")
            .unwrap();
        let hits = store
            .search_fts("pipeline review", &filters, 10, 0.7)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].insight.id.as_str(), "vp-1");
    }

    #[test]
    fn test_confidence_floor_is_inclusive_and_numeric() {
        // The floor binds as a REAL, so a confidence exactly at the floor
        // passes the >= comparison in both facet paths.
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        store
            .upsert_insight(&test_insight("eq-1", "Champion building playbook"))
            .unwrap();
        store
            .set_audience(&InsightId::new("eq-1"), &[AudienceRole::Manager], 0.7, "at the line")
            .unwrap();
        store
            .tag_methodology(&InsightId::new("eq-1"), "meddic_champion", 0.5, "classifier")
            .unwrap();

        let filters = Filters::new()
            .with_role(AudienceRole::Manager)
            .with_min_confidence(0.7);
        let hits = store.list_by_facets(&filters, Page::first(), 0.7).unwrap();
        assert_eq!(hits.len(), 1);

        let filters = Filters::new()
            .with_methodology("meddic")
            .with_min_confidence(0.5);
        let hits = store.list_by_facets(&filters, Page::first(), 0.7).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_integrity_check_halts_writes() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_insight(&test_insight("ic-1", "Keep the index honest"))
            .unwrap();
        store.integrity_check().unwrap();

        // Sabotage the index out of band.
        store
            .execute_raw("DELETE FROM insight_search WHERE id = 'ic-1'")
            .unwrap();
        assert!(matches!(
            store.integrity_check(),
            Err(Error::Consistency { .. })
        ));

        // Writes are refused until reconciliation is acknowledged.
        assert!(matches!(
            store.upsert_insight(&test_insight("ic-2", "Blocked")),
            Err(Error::Consistency { .. })
        ));

        store
            .execute_raw("DELETE FROM insights WHERE id = 'ic-1'")
            .unwrap();
        store.acknowledge_reconciled();
        store.integrity_check().unwrap();
        store.upsert_insight(&test_insight("ic-2", "Unblocked")).unwrap();
    }

    #[test]
    fn test_integrity_check_detects_duplicate_index_entries() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_insight(&test_insight("dup-1", "One entry per row"))
            .unwrap();
        store.integrity_check().unwrap();

        // A second index entry for a live row is drift even though the row
        // itself still resolves.
        store
            .execute_raw(
                "INSERT INTO insight_search (id, summary)
                 VALUES ('dup-1', 'One entry per row')",
            )
            .unwrap();
        match store.integrity_check() {
            Err(Error::Consistency { detail }) => {
                assert!(detail.contains("1 duplicated index entries"), "{detail}");
            }
            other => panic!("expected Consistency, got {other:?}"),
        }
        assert!(matches!(
            store.upsert_insight(&test_insight("dup-2", "Blocked")),
            Err(Error::Consistency { .. })
        ));
    }

    #[test]
    fn test_batch_job_bookkeeping() {
        let store = Store::in_memory().unwrap();
        store
            .record_batch_job("batch_abc", AnnotationKind::Audience, 12)
            .unwrap();

        let record = store.get_batch_job("batch_abc").unwrap().unwrap();
        assert_eq!(record.kind, AnnotationKind::Audience);
        assert_eq!(record.state, "polling");
        assert_eq!(record.submitted, 12);

        store.finish_batch_job("batch_abc").unwrap();
        let record = store.get_batch_job("batch_abc").unwrap().unwrap();
        assert_eq!(record.state, "done");
        assert!(store.get_batch_job("nope").unwrap().is_none());
    }

    #[test]
    fn test_methodology_tree_nests_components() {
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        let tree = store.methodology_tree().unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "meddic");
        assert_eq!(tree[0].components.len(), 2);
        assert_eq!(tree[0].components[0].id, "meddic_champion");

        let ids = store.component_ids().unwrap();
        assert!(ids.contains("meddic_metrics"));
    }

    #[test]
    fn test_component_reads_surface_undecodable_rows() {
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);

        // An out-of-band blob id cannot be read as text; the reads must
        // report it rather than quietly shrink the catalog.
        store
            .execute_raw(
                "INSERT INTO methodology_components (id, methodology_id, name, description, keywords)
                 VALUES (X'00', 'meddic', 'Broken', 'broken row', '[]')",
            )
            .unwrap();
        assert!(matches!(
            store.component_ids(),
            Err(Error::OperationFailed { .. })
        ));
        assert!(matches!(
            store.methodology_tree(),
            Err(Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_stats_counts_tables() {
        let store = Store::in_memory().unwrap();
        seed_methodology(&store);
        store.upsert_insight(&test_insight("s-1", "Advice")).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.insights, 1);
        assert_eq!(stats.methodologies, 1);
        assert_eq!(stats.components, 2);
        assert_eq!(stats.tags, 0);
    }

    #[test]
    fn test_list_by_facets_orders_by_quality_and_paginates() {
        let store = Store::in_memory().unwrap();
        for (id, quality) in [("pg-a", 3), ("pg-b", 9), ("pg-c", 9), ("pg-d", 5)] {
            let mut insight = test_insight(id, "Paginated advice");
            insight.quality_score = quality;
            store.upsert_insight(&insight).unwrap();
        }

        let page_one = store
            .list_by_facets(&Filters::new(), Page::new(0, 2), 0.7)
            .unwrap();
        let ids: Vec<_> = page_one.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["pg-b", "pg-c"]);

        let page_two = store
            .list_by_facets(&Filters::new(), Page::new(1, 2), 0.7)
            .unwrap();
        let ids: Vec<_> = page_two.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["pg-d", "pg-a"]);
    }

    #[test]
    fn test_build_fts_query_quotes_terms() {
        assert_eq!(build_fts_query(""), None);
        assert_eq!(
            build_fts_query("cold outreach").as_deref(),
            Some("\"cold\" OR \"outreach\"")
        );
        // Embedded quotes are doubled, FTS5 operators neutralized.
        assert_eq!(
            build_fts_query("say \"no\" AND mean-it").as_deref(),
            Some("\"say\" OR \"\"\"no\"\"\" OR \"AND\" OR \"mean-it\"")
        );
    }
}
