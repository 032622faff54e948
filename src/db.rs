use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePool, SqlitePoolOptions,
};
use std::path::Path;
use std::time::Duration;

use crate::models::OpenMode;

/// Connect to the SQLite file at `db_path`.
///
/// `Write` creates the file (and its parent directory) when missing. `Read`
/// never creates anything and fails if the file does not exist.
pub async fn connect(db_path: &Path, mode: OpenMode) -> Result<SqlitePool, sqlx::Error> {
    let options = options(db_path, mode)?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Like [`connect`], but a `Write` connection takes and keeps SQLite's
/// exclusive lock, so a second writer against the same file is refused.
pub async fn connect_exclusive(db_path: &Path, mode: OpenMode) -> Result<SqlitePool, sqlx::Error> {
    if mode == OpenMode::Read {
        return connect(db_path, mode).await;
    }

    let options = options(db_path, mode)?.locking_mode(SqliteLockingMode::Exclusive);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    // In exclusive locking mode the lock is kept after the first write
    // transaction; claim it now instead of at the first document.
    sqlx::query("BEGIN EXCLUSIVE").execute(&pool).await?;
    sqlx::query("COMMIT").execute(&pool).await?;
    Ok(pool)
}

fn options(db_path: &Path, mode: OpenMode) -> Result<SqliteConnectOptions, sqlx::Error> {
    let base = SqliteConnectOptions::new()
        .filename(db_path)
        .busy_timeout(Duration::from_millis(250));

    match mode {
        OpenMode::Write => {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
            Ok(base
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Delete))
        }
        OpenMode::Read => Ok(base.read_only(true)),
    }
}
