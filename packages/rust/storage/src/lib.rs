//! libSQL storage layer for analysis runs, topics, and the enrichment cache.
//!
//! Each run directory owns one database at `indexes/depoindex.db`; the CLI is
//! the sole writer.

mod migrations;

use std::path::Path;

use chrono::Utc;
use depoindex_shared::{DepoIndexError, Result, Topic};
use libsql::{Connection, Database, params};
use uuid::Uuid;

/// Summary row for a stored run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: String,
    pub name: String,
    pub source_path: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DepoIndexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DepoIndexError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new analysis run record.
    pub async fn insert_run(
        &self,
        id: &str,
        name: &str,
        source_path: &str,
        config_json: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, name, source_path, created_at, updated_at, config_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, source_path, now.as_str(), now.as_str(), config_json],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_path, created_at, updated_at FROM runs WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(run_from_row(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DepoIndexError::Storage(e.to_string())),
        }
    }

    /// List all runs, newest first.
    pub async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_path, created_at, updated_at
                 FROM runs ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(run_from_row(&row)?);
        }
        Ok(results)
    }

    /// Bump a run's `updated_at` timestamp.
    pub async fn touch_run(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET updated_at = ?1 WHERE id = ?2",
                params![now.as_str(), id],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Topic operations
    // -----------------------------------------------------------------------

    /// Insert a topic for a run. Duplicate (title, page, line) rows are replaced.
    pub async fn insert_topic(
        &self,
        run_id: &str,
        topic: &Topic,
        cluster: Option<&str>,
    ) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let related_json = if topic.related.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&topic.related)
                    .map_err(|e| DepoIndexError::Storage(e.to_string()))?,
            )
        };

        self.conn
            .execute(
                "INSERT OR REPLACE INTO topics
                 (id, run_id, title, page, line, excerpt, is_key_issue, confidence, related_json, cluster)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    run_id,
                    topic.title.as_str(),
                    topic.page as i64,
                    topic.line as i64,
                    topic.excerpt.as_str(),
                    topic.is_key_issue as i32,
                    topic.confidence as f64,
                    related_json.as_deref(),
                    cluster
                ],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List a run's topics in transcript order, with their cluster name.
    pub async fn list_topics(&self, run_id: &str) -> Result<Vec<(Topic, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT title, page, line, excerpt, is_key_issue, confidence, related_json, cluster
                 FROM topics WHERE run_id = ?1 ORDER BY page, line",
                params![run_id],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let related_json: Option<String> = row
                .get(6)
                .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
            let related = match related_json {
                Some(json) => serde_json::from_str(&json)
                    .map_err(|e| DepoIndexError::Storage(format!("bad related_json: {e}")))?,
                None => Vec::new(),
            };

            let topic = Topic {
                title: get_col(&row, 0)?,
                page: row
                    .get::<u32>(1)
                    .map_err(|e| DepoIndexError::Storage(e.to_string()))?,
                line: row
                    .get::<u32>(2)
                    .map_err(|e| DepoIndexError::Storage(e.to_string()))?,
                excerpt: get_col(&row, 3)?,
                is_key_issue: row
                    .get::<i32>(4)
                    .map_err(|e| DepoIndexError::Storage(e.to_string()))?
                    != 0,
                confidence: row
                    .get::<f64>(5)
                    .map_err(|e| DepoIndexError::Storage(e.to_string()))?
                    as f32,
                related,
                legal_significance: None,
            };
            let cluster: Option<String> = row
                .get(7)
                .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
            results.push((topic, cluster));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Enrichment cache
    // -----------------------------------------------------------------------

    /// Look up a cached enrichment result.
    pub async fn get_enrichment_cache(
        &self,
        run_id: &str,
        task_type: &str,
        prompt_hash: &str,
        model: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result FROM enrichment_cache
                 WHERE run_id = ?1 AND task_type = ?2 AND prompt_hash = ?3 AND model = ?4",
                params![run_id, task_type, prompt_hash, model],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(get_col(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DepoIndexError::Storage(e.to_string())),
        }
    }

    /// Store an enrichment result, replacing any prior entry for the key.
    pub async fn set_enrichment_cache(
        &self,
        run_id: &str,
        task_type: &str,
        prompt_hash: &str,
        model: &str,
        result: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO enrichment_cache
                 (run_id, task_type, prompt_hash, model, result, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![run_id, task_type, prompt_hash, model, result, now.as_str()],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Drop every cached enrichment result for a run.
    pub async fn invalidate_enrichment_cache(&self, run_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM enrichment_cache WHERE run_id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| DepoIndexError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn run_from_row(row: &libsql::Row) -> Result<RunRecord> {
    Ok(RunRecord {
        id: get_col(row, 0)?,
        name: get_col(row, 1)?,
        source_path: get_col(row, 2)?,
        created_at: get_col(row, 3)?,
        updated_at: get_col(row, 4)?,
    })
}

fn get_col(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| DepoIndexError::Storage(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
