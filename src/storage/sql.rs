//! Schema SQL for the coachdb store.
//!
//! The FTS5 index is maintained entirely by the three sync triggers below, so
//! every index mutation happens inside the same transaction as the row change
//! it mirrors. The update trigger deletes and reinserts the whole document;
//! FTS5 has no cheap partial field update and patching risks stale tokens.

/// Full schema: tables, indexes, FTS5 index, and its sync triggers.
///
/// Safe to execute repeatedly; everything is `IF NOT EXISTS`.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS insights (
    id TEXT PRIMARY KEY,
    expert_id TEXT NOT NULL,
    expert_name TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    source_url TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    primary_stage TEXT NOT NULL,
    secondary_stages TEXT NOT NULL,
    summary_text TEXT NOT NULL,
    action_steps TEXT NOT NULL,
    keywords TEXT NOT NULL,
    situation_examples TEXT NOT NULL,
    best_quote TEXT NOT NULL,
    quality_score INTEGER NOT NULL,
    target_audience TEXT,
    audience_confidence REAL,
    audience_reasoning TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE VIRTUAL TABLE IF NOT EXISTS insight_search USING fts5(
    id, expert_name, stage, summary, steps, keywords, situations, quote
);

CREATE TRIGGER IF NOT EXISTS insights_ai AFTER INSERT ON insights BEGIN
    INSERT INTO insight_search (id, expert_name, stage, summary, steps,
        keywords, situations, quote)
    VALUES (new.id, new.expert_name,
        new.primary_stage || ' ' || new.secondary_stages,
        new.summary_text, new.action_steps, new.keywords,
        new.situation_examples, new.best_quote);
END;

CREATE TRIGGER IF NOT EXISTS insights_au AFTER UPDATE ON insights BEGIN
    DELETE FROM insight_search WHERE id = old.id;
    INSERT INTO insight_search (id, expert_name, stage, summary, steps,
        keywords, situations, quote)
    VALUES (new.id, new.expert_name,
        new.primary_stage || ' ' || new.secondary_stages,
        new.summary_text, new.action_steps, new.keywords,
        new.situation_examples, new.best_quote);
END;

CREATE TRIGGER IF NOT EXISTS insights_ad AFTER DELETE ON insights BEGIN
    DELETE FROM insight_search WHERE id = old.id;
END;

CREATE TABLE IF NOT EXISTS methodologies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    overview TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS methodology_components (
    id TEXT PRIMARY KEY,
    methodology_id TEXT NOT NULL REFERENCES methodologies(id),
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    keywords TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS methodology_tags (
    insight_id TEXT NOT NULL REFERENCES insights(id),
    component_id TEXT NOT NULL REFERENCES methodology_components(id),
    confidence REAL NOT NULL DEFAULT 0.0,
    tagged_by TEXT NOT NULL DEFAULT 'classifier',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (insight_id, component_id)
);

CREATE TABLE IF NOT EXISTS batch_jobs (
    job_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    state TEXT NOT NULL,
    submitted INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_insights_expert ON insights(expert_id);
CREATE INDEX IF NOT EXISTS idx_insights_stage ON insights(primary_stage);
CREATE INDEX IF NOT EXISTS idx_insights_quality ON insights(quality_score DESC);
CREATE INDEX IF NOT EXISTS idx_insights_audience_conf ON insights(audience_confidence);
CREATE INDEX IF NOT EXISTS idx_tags_component ON methodology_tags(component_id);
CREATE INDEX IF NOT EXISTS idx_tags_insight ON methodology_tags(insight_id);
CREATE INDEX IF NOT EXISTS idx_components_methodology ON methodology_components(methodology_id);
";

/// Columns returned by every insight-reading query, in `InsightRow` order.
pub const INSIGHT_COLUMNS: &str = "i.id, i.expert_id, i.expert_name, i.source_kind, i.source_url, \
     i.collected_at, i.primary_stage, i.secondary_stages, i.summary_text, \
     i.action_steps, i.keywords, i.situation_examples, i.best_quote, \
     i.quality_score, i.target_audience, i.audience_confidence, i.audience_reasoning";
