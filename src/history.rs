//! Append-only log of indexing runs.
//!
//! The most recent SUCCESS record of a repository is the low-water mark for
//! its next incremental run. Records are never updated; purging an index
//! deletes all of a repository's records at once.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{IndexError, Result};
use crate::migrate;
use crate::models::{Changeset, IndexingRun, OpenMode, Repository, RunStatus};

#[async_trait]
pub trait RunHistory: Send + Sync {
    async fn find_last_success(&self, repository: &Repository) -> Result<Option<IndexingRun>>;

    async fn append_run(
        &self,
        repository: &Repository,
        changeset: &Changeset,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()>;

    async fn delete_all_runs_for(&self, repository: &Repository) -> Result<()>;

    /// All records of `repository`, oldest first.
    async fn runs_for(&self, repository: &Repository) -> Result<Vec<IndexingRun>>;
}

fn history_err(e: sqlx::Error) -> IndexError {
    IndexError::History(e.to_string())
}

/// History kept in its own SQLite file (`history.sqlite` under the index root).
pub struct SqliteRunHistory {
    pool: SqlitePool,
}

impl SqliteRunHistory {
    pub const FILE: &'static str = "history.sqlite";

    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path, OpenMode::Write)
            .await
            .map_err(history_err)?;
        migrate::migrate_history(&pool).await.map_err(history_err)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<IndexingRun> {
    let code: i64 = row.get("status");
    let status = RunStatus::from_code(code)
        .ok_or_else(|| IndexError::History(format!("unknown run status {}", code)))?;
    Ok(IndexingRun {
        repository_key: row.get("repository"),
        changeset_id: row.get("changeset_id"),
        revision: row.get("revision"),
        status,
        message: row.get("message"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl RunHistory for SqliteRunHistory {
    async fn find_last_success(&self, repository: &Repository) -> Result<Option<IndexingRun>> {
        let row = sqlx::query(
            r#"
            SELECT repository, changeset_id, revision, status, message, created_at
            FROM indexing_runs
            WHERE repository = ? AND status = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(&repository.key)
        .bind(RunStatus::Success.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(history_err)?;

        row.as_ref().map(row_to_run).transpose()
    }

    async fn append_run(
        &self,
        repository: &Repository,
        changeset: &Changeset,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexing_runs (repository, changeset_id, revision, status, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&repository.key)
        .bind(changeset.id)
        .bind(&changeset.revision)
        .bind(status.code())
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(history_err)?;
        Ok(())
    }

    async fn delete_all_runs_for(&self, repository: &Repository) -> Result<()> {
        sqlx::query("DELETE FROM indexing_runs WHERE repository = ?")
            .bind(&repository.key)
            .execute(&self.pool)
            .await
            .map_err(history_err)?;
        Ok(())
    }

    async fn runs_for(&self, repository: &Repository) -> Result<Vec<IndexingRun>> {
        let rows = sqlx::query(
            r#"
            SELECT repository, changeset_id, revision, status, message, created_at
            FROM indexing_runs
            WHERE repository = ?
            ORDER BY id ASC
            "#,
        )
        .bind(&repository.key)
        .fetch_all(&self.pool)
        .await
        .map_err(history_err)?;

        rows.iter().map(row_to_run).collect()
    }
}

/// History held in memory, for tests.
#[derive(Default)]
pub struct InMemoryRunHistory {
    runs: Mutex<Vec<IndexingRun>>,
    fail_appends: Mutex<bool>,
}

impl InMemoryRunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append fail, simulating an unwritable log.
    pub fn fail_appends(&self, fail: bool) {
        *self
            .fail_appends
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fail;
    }

    /// Every record, across all repositories, in append order.
    pub fn all(&self) -> Vec<IndexingRun> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl RunHistory for InMemoryRunHistory {
    async fn find_last_success(&self, repository: &Repository) -> Result<Option<IndexingRun>> {
        Ok(self
            .all()
            .into_iter()
            .rev()
            .find(|r| r.repository_key == repository.key && r.status == RunStatus::Success))
    }

    async fn append_run(
        &self,
        repository: &Repository,
        changeset: &Changeset,
        status: RunStatus,
        message: Option<&str>,
    ) -> Result<()> {
        if *self
            .fail_appends
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            return Err(IndexError::History("history is read-only".to_string()));
        }
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(IndexingRun {
                repository_key: repository.key.clone(),
                changeset_id: changeset.id,
                revision: changeset.revision.clone(),
                status,
                message: message.map(str::to_string),
                created_at: chrono::Utc::now().timestamp(),
            });
        Ok(())
    }

    async fn delete_all_runs_for(&self, repository: &Repository) -> Result<()> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|r| r.repository_key != repository.key);
        Ok(())
    }

    async fn runs_for(&self, repository: &Repository) -> Result<Vec<IndexingRun>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|r| r.repository_key == repository.key)
            .collect())
    }
}
