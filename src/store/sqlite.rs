//! SQLite [`Store`] with an FTS5 full-text table.
//!
//! Each project index is one `index.sqlite` file. Document rows live in
//! `documents`; their title and text are mirrored into `documents_fts` for
//! matching. Attribute filters are plain equality on `documents` columns.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{IndexError, Result};
use crate::migrate;
use crate::models::{DocId, IndexDocument, OpenMode};
use crate::query::{Attr, SearchCondition};

use super::{Store, StoreOpener};

pub const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteStoreOpener;

#[async_trait]
impl StoreOpener for SqliteStoreOpener {
    async fn open(&self, dir: &Path, mode: OpenMode) -> Result<Box<dyn Store>> {
        let pool = db::connect_exclusive(&dir.join(INDEX_FILE), mode)
            .await
            .map_err(|e| IndexError::StoreOpen(e.to_string()))?;
        if mode == OpenMode::Write {
            if let Err(e) = migrate::migrate_index(&pool).await {
                pool.close().await;
                return Err(IndexError::StoreOpen(e.to_string()));
            }
        }
        Ok(Box::new(SqliteStore { pool, mode }))
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
    mode: OpenMode,
}

impl SqliteStore {
    fn ensure_writable(&self, what: &str) -> Result<()> {
        match self.mode {
            OpenMode::Write => Ok(()),
            OpenMode::Read => Err(IndexError::Store(format!(
                "{} requires a store opened for writing",
                what
            ))),
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn lookup_id(&self, uri: &str) -> Result<Option<DocId>> {
        sqlx::query_scalar("SELECT id FROM documents WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))
    }

    async fn get_document(&self, id: DocId, include_text: bool) -> Result<Option<IndexDocument>> {
        let sql = if include_text {
            "SELECT uri, title, repository, rev, content_type, body FROM documents WHERE id = ?"
        } else {
            "SELECT uri, title, repository, rev, content_type, '' AS body FROM documents WHERE id = ?"
        };
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?;

        Ok(row.map(|r| IndexDocument {
            uri: r.get("uri"),
            title: r.get("title"),
            repository: r.get("repository"),
            rev: r.get("rev"),
            content_type: r.get("content_type"),
            text: r.get("body"),
        }))
    }

    async fn put_document(&self, doc: &IndexDocument) -> Result<()> {
        self.ensure_writable("put")
            .map_err(|e| IndexError::StorePut(e.to_string()))?;
        let put = async {
            let mut tx = self.pool.begin().await?;
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO documents (uri, title, repository, rev, content_type, body)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&doc.uri)
            .bind(&doc.title)
            .bind(&doc.repository)
            .bind(&doc.rev)
            .bind(&doc.content_type)
            .bind(&doc.text)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO documents_fts (doc_id, title, body) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&doc.title)
                .bind(&doc.text)
                .execute(&mut *tx)
                .await?;

            tx.commit().await
        };
        put.await.map_err(|e: sqlx::Error| IndexError::StorePut(e.to_string()))
    }

    async fn remove_document(&self, id: DocId) -> Result<bool> {
        self.ensure_writable("remove")
            .map_err(|e| IndexError::StoreRemove(e.to_string()))?;
        let remove = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM documents_fts WHERE doc_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let removed = sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            Ok::<_, sqlx::Error>(removed > 0)
        };
        remove
            .await
            .map_err(|e| IndexError::StoreRemove(e.to_string()))
    }

    async fn search(&self, condition: &SearchCondition) -> Result<Vec<String>> {
        let mut sql = String::from(
            "SELECT d.uri FROM documents_fts JOIN documents d ON d.id = documents_fts.doc_id \
             WHERE documents_fts MATCH ?",
        );
        let mut binds = vec![condition.fts_expression()];
        for attr in [Attr::Repository, Attr::Rev, Attr::ContentType] {
            if let Some(value) = condition.filter(attr) {
                sql.push_str(&format!(" AND d.{} = ?", attr.column()));
                binds.push(value.to_string());
            }
        }
        sql.push_str(" ORDER BY bm25(documents_fts), d.id");

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for value in &binds {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::Store(e.to_string()))
    }

    async fn optimize(&self) -> Result<()> {
        self.ensure_writable("optimize")
            .map_err(|e| IndexError::StoreOptimize(e.to_string()))?;
        let optimize = async {
            sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('optimize')")
                .execute(&self.pool)
                .await?;
            sqlx::query("VACUUM").execute(&self.pool).await?;
            Ok::<_, sqlx::Error>(())
        };
        optimize
            .await
            .map_err(|e| IndexError::StoreOptimize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::build_query;
    use tempfile::TempDir;

    fn doc(uri: &str, repository: &str, rev: Option<&str>, text: &str) -> IndexDocument {
        IndexDocument {
            uri: uri.to_string(),
            title: uri.rsplit('/').next().unwrap_or(uri).to_string(),
            repository: repository.to_string(),
            rev: rev.map(str::to_string),
            content_type: Some("text/plain".to_string()),
            text: text.to_string(),
        }
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_lookup_get_remove() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();

        store
            .put_document(&doc("/e/a.txt", "api", Some("main"), "hello world"))
            .await
            .unwrap();
        let id = store.lookup_id("/e/a.txt").await.unwrap().unwrap();

        let full = store.get_document(id, true).await.unwrap().unwrap();
        assert_eq!(full.text, "hello world");
        assert_eq!(full.rev.as_deref(), Some("main"));
        let bare = store.get_document(id, false).await.unwrap().unwrap();
        assert!(bare.text.is_empty());
        assert_eq!(bare.title, "a.txt");

        assert!(store.remove_document(id).await.unwrap());
        assert!(!store.remove_document(id).await.unwrap());
        assert!(store.lookup_id("/e/a.txt").await.unwrap().is_none());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_locator_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();
        let d = doc("/e/a.txt", "api", None, "one");
        store.put_document(&d).await.unwrap();
        let err = store.put_document(&d).await.unwrap_err();
        assert!(matches!(err, IndexError::StorePut(_)));
    }

    #[tokio::test]
    async fn test_search_with_filters() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();
        store
            .put_document(&doc("/e/main/a.rs", "api", Some("main"), "fn parse_config() {}"))
            .await
            .unwrap();
        store
            .put_document(&doc("/e/v1/a.rs", "api", Some("v1"), "fn parse_config() {}"))
            .await
            .unwrap();
        store
            .put_document(&doc("/e/web/b.rs", "web", Some("main"), "fn render() {}"))
            .await
            .unwrap();

        let all = build_query(&tokens(&["parse_config"]), None, None, None, true).unwrap();
        let mut hits = store.search(&all).await.unwrap();
        hits.sort();
        assert_eq!(hits, vec!["/e/main/a.rs", "/e/v1/a.rs"]);

        let on_main = build_query(&tokens(&["parse_config"]), Some("api"), Some("main"), None, true)
            .unwrap();
        assert_eq!(store.search(&on_main).await.unwrap(), vec!["/e/main/a.rs"]);

        let both = build_query(&tokens(&["parse_config", "render"]), None, None, None, true).unwrap();
        assert!(store.search(&both).await.unwrap().is_empty());

        let either =
            build_query(&tokens(&["parse_config", "render"]), None, Some("main"), None, false).unwrap();
        let mut hits = store.search(&either).await.unwrap();
        hits.sort();
        assert_eq!(hits, vec!["/e/main/a.rs", "/e/web/b.rs"]);
    }

    #[tokio::test]
    async fn test_read_mode_requires_existing_index() {
        let tmp = TempDir::new().unwrap();
        let err = SqliteStoreOpener
            .open(&tmp.path().join("missing"), OpenMode::Read)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::StoreOpen(_)));
    }

    #[tokio::test]
    async fn test_second_writer_is_refused() {
        let tmp = TempDir::new().unwrap();
        let first = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();
        let second = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await;
        assert!(matches!(second.err(), Some(IndexError::StoreOpen(_))));
        first.close().await.unwrap();

        let again = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();
        again.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_mode_rejects_mutations() {
        let tmp = TempDir::new().unwrap();
        let writer = SqliteStoreOpener.open(tmp.path(), OpenMode::Write).await.unwrap();
        writer.close().await.unwrap();

        let reader = SqliteStoreOpener.open(tmp.path(), OpenMode::Read).await.unwrap();
        let err = reader
            .put_document(&doc("/e/a.txt", "api", None, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::StorePut(_)));
        assert!(matches!(
            reader.optimize().await.unwrap_err(),
            IndexError::StoreOptimize(_)
        ));
    }
}
