//! # Sync Stores
//!
//! Persistence for sync configurations and their runs.
//!
//! ## Overview
//!
//! - [`SyncConfigRepository`]: user-owned configurations, kind stored as
//!   tagged JSON
//! - [`SyncRunRepository`]: run records, unmatched songs stored as JSON
//!
//! The stores are the timestamp authority: `created_at` is assigned on insert
//! and `updated_at` is refreshed on every update. Callers re-read a record
//! after writing it to observe the authoritative values.

use crate::{Result, SyncConfig, SyncError, SyncId, SyncKind, SyncRun, SyncRunId, SyncStatus};
use async_trait::async_trait;
use bridge_traits::{Song, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

// ============================================================================
// Repository Traits
// ============================================================================

/// Persistence of sync runs
#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Insert a new run. The store assigns both timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn create_run(&self, run: &SyncRun) -> Result<()>;

    /// Overwrite status, unmatched songs and error message of a run and
    /// refresh its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RunNotFound`] if the run doesn't exist
    async fn update_run(&self, run: &SyncRun) -> Result<()>;

    /// Runs matching every given filter, newest first. `None` disables a
    /// filter; an empty list matches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_runs(
        &self,
        run_ids: Option<&[SyncRunId]>,
        sync_ids: Option<&[SyncId]>,
    ) -> Result<Vec<SyncRun>>;

    /// The most recently updated run of a sync
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn latest_run(&self, sync_id: &SyncId) -> Result<Option<SyncRun>>;

    /// Find a single run by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_run(&self, run_id: &SyncRunId) -> Result<Option<SyncRun>> {
        let runs = self.find_runs(Some(std::slice::from_ref(run_id)), None).await?;
        Ok(runs.into_iter().next())
    }
}

/// Persistence of sync configurations
#[async_trait]
pub trait SyncConfigRepository: Send + Sync {
    /// Insert a configuration. The store assigns `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn create_sync(&self, config: &SyncConfig) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn get_sync(&self, id: &SyncId) -> Result<Option<SyncConfig>>;

    /// All configurations of a user, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn list_syncs(&self, user_id: &UserId) -> Result<Vec<SyncConfig>>;

    /// Delete a configuration owned by `user_id`. Its runs are kept.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncNotFound`] if the user owns no such sync
    async fn delete_sync(&self, user_id: &UserId, id: &SyncId) -> Result<()>;
}

// ============================================================================
// Helpers
// ============================================================================

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SyncError::Database(format!("Invalid {column} '{value}': {e}")))
}

fn db_error(e: sqlx::Error) -> SyncError {
    SyncError::Database(e.to_string())
}

// ============================================================================
// SQLite Run Store
// ============================================================================

/// SQLite implementation of [`SyncRunRepository`]
pub struct SqliteSyncRunRepository {
    pool: SqlitePool,
}

impl SqliteSyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync run
#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    sync_id: String,
    status: String,
    unmatched_songs: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = SyncError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        let unmatched_songs: Vec<Song> =
            serde_json::from_str(&row.unmatched_songs).map_err(|e| {
                SyncError::Serialization(format!("unmatched songs of run {}: {e}", row.id))
            })?;

        Ok(SyncRun {
            id: SyncRunId::from_string(&row.id)?,
            sync_id: SyncId::from_string(&row.sync_id)?,
            status: row.status.parse::<SyncStatus>()?,
            unmatched_songs,
            error_message: row.error_message,
            created_at: Some(parse_timestamp("created_at", &row.created_at)?),
            updated_at: Some(parse_timestamp("updated_at", &row.updated_at)?),
        })
    }
}

const RUN_COLUMNS: &str =
    "SELECT id, sync_id, status, unmatched_songs, error_message, created_at, updated_at FROM sync_runs";

#[async_trait]
impl SyncRunRepository for SqliteSyncRunRepository {
    async fn create_run(&self, run: &SyncRun) -> Result<()> {
        let unmatched = serde_json::to_string(&run.unmatched_songs)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, sync_id, status, unmatched_songs, error_message, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(run.sync_id.as_str())
        .bind(run.status.as_str())
        .bind(unmatched)
        .bind(&run.error_message)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn update_run(&self, run: &SyncRun) -> Result<()> {
        let unmatched = serde_json::to_string(&run.unmatched_songs)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?,
                unmatched_songs = ?,
                error_message = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(unmatched)
        .bind(&run.error_message)
        .bind(now_timestamp())
        .bind(run.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::RunNotFound {
                run_id: run.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_runs(
        &self,
        run_ids: Option<&[SyncRunId]>,
        sync_ids: Option<&[SyncId]>,
    ) -> Result<Vec<SyncRun>> {
        if run_ids.is_some_and(|ids| ids.is_empty()) || sync_ids.is_some_and(|ids| ids.is_empty())
        {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(RUN_COLUMNS);
        query.push(" WHERE 1 = 1");

        if let Some(ids) = run_ids {
            query.push(" AND id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(ids) = sync_ids {
            query.push(" AND sync_id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");
        }

        query.push(" ORDER BY created_at DESC, rowid DESC");

        let rows: Vec<SyncRunRow> = query
            .build_query_as::<SyncRunRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(SyncRun::try_from).collect()
    }

    async fn latest_run(&self, sync_id: &SyncId) -> Result<Option<SyncRun>> {
        let sql = format!("{RUN_COLUMNS} WHERE sync_id = ? ORDER BY updated_at DESC, rowid DESC LIMIT 1");
        let row: Option<SyncRunRow> = sqlx::query_as(&sql)
            .bind(sync_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(SyncRun::try_from).transpose()
    }
}

// ============================================================================
// SQLite Sync Store
// ============================================================================

/// SQLite implementation of [`SyncConfigRepository`]
pub struct SqliteSyncConfigRepository {
    pool: SqlitePool,
}

impl SqliteSyncConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncConfigRow {
    id: String,
    user_id: String,
    kind: String,
    created_at: String,
}

impl TryFrom<SyncConfigRow> for SyncConfig {
    type Error = SyncError;

    fn try_from(row: SyncConfigRow) -> Result<Self> {
        let kind: SyncKind = serde_json::from_str(&row.kind)
            .map_err(|e| SyncError::Serialization(format!("kind of sync {}: {e}", row.id)))?;

        Ok(SyncConfig {
            id: SyncId::from_string(&row.id)?,
            user_id: UserId::new(row.user_id),
            kind,
            created_at: Some(parse_timestamp("created_at", &row.created_at)?),
        })
    }
}

#[async_trait]
impl SyncConfigRepository for SqliteSyncConfigRepository {
    async fn create_sync(&self, config: &SyncConfig) -> Result<()> {
        let kind = serde_json::to_string(&config.kind)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        let canonical_key = config.kind.canonical_key();

        let inserted = sqlx::query(
            r#"
            INSERT INTO sync_configs (id, user_id, kind, canonical_key, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.id.as_str())
        .bind(config.user_id.as_str())
        .bind(kind)
        .bind(&canonical_key)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                let existing: Option<String> = sqlx::query_scalar(
                    "SELECT id FROM sync_configs WHERE user_id = ? AND canonical_key = ?",
                )
                .bind(config.user_id.as_str())
                .bind(&canonical_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

                Err(SyncError::DuplicateSync(
                    existing.unwrap_or_else(|| config.id.to_string()),
                ))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn get_sync(&self, id: &SyncId) -> Result<Option<SyncConfig>> {
        let row: Option<SyncConfigRow> = sqlx::query_as(
            "SELECT id, user_id, kind, created_at FROM sync_configs WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(SyncConfig::try_from).transpose()
    }

    async fn list_syncs(&self, user_id: &UserId) -> Result<Vec<SyncConfig>> {
        let rows: Vec<SyncConfigRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, kind, created_at FROM sync_configs
            WHERE user_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(SyncConfig::try_from).collect()
    }

    async fn delete_sync(&self, user_id: &UserId, id: &SyncId) -> Result<()> {
        let result = sqlx::query("DELETE FROM sync_configs WHERE id = ? AND user_id = ?")
            .bind(id.as_str())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::SyncNotFound {
                sync_id: id.to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
