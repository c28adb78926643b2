//! SQL migration definitions for the DepoIndex database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, topics, enrichment_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Analysis runs
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    source_path TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    config_json TEXT
);

-- Detected topics, anchored to page/line references
CREATE TABLE IF NOT EXISTS topics (
    id           TEXT PRIMARY KEY,
    run_id       TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    title        TEXT NOT NULL,
    page         INTEGER NOT NULL,
    line         INTEGER NOT NULL,
    excerpt      TEXT NOT NULL,
    is_key_issue INTEGER NOT NULL DEFAULT 0,
    confidence   REAL NOT NULL DEFAULT 0.7,
    related_json TEXT,
    cluster      TEXT,
    UNIQUE(run_id, title, page, line)
);

CREATE INDEX IF NOT EXISTS idx_topics_run_id ON topics(run_id);
CREATE INDEX IF NOT EXISTS idx_topics_position ON topics(run_id, page, line);

-- LLM enrichment cache keyed by prompt hash
CREATE TABLE IF NOT EXISTS enrichment_cache (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      TEXT NOT NULL,
    task_type   TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    model       TEXT NOT NULL,
    result      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(run_id, task_type, prompt_hash, model)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        let migrations = all_migrations();
        assert!(!migrations.is_empty());
        for pair in migrations.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn first_migration_creates_core_tables() {
        let sql = all_migrations()[0].sql;
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS runs"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS topics"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS enrichment_cache"));
    }
}
