//! Idempotent schema setup for the index store and the run history.

use sqlx::SqlitePool;

pub async fn migrate_index(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uri TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            repository TEXT NOT NULL,
            rev TEXT,
            content_type TEXT,
            body TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                doc_id UNINDEXED,
                title,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_repository ON documents(repository, rev)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn migrate_changesets(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS changeset_ids (
            repository TEXT NOT NULL,
            revision TEXT NOT NULL,
            id INTEGER NOT NULL,
            PRIMARY KEY (repository, revision),
            UNIQUE (repository, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn migrate_history(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexing_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository TEXT NOT NULL,
            changeset_id INTEGER NOT NULL,
            revision TEXT NOT NULL,
            status INTEGER NOT NULL,
            message TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexing_runs_repository ON indexing_runs(repository, status, id DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
