//! Persistent changeset ids for backends whose native revisions are hashes.
//!
//! A commit gets an id the first time it is seen and keeps it forever. New
//! commits are numbered after every id already handed out for the same
//! repository, so anything discovered after a successful run always lands
//! above that run's low-water mark, whatever its commit date or branch.

use std::collections::HashMap;
use std::path::Path;

use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{IndexError, Result};
use crate::migrate;
use crate::models::OpenMode;

fn ids_err(e: sqlx::Error) -> IndexError {
    IndexError::Backend(format!("changeset ids: {}", e))
}

/// `sha -> id` table kept in `changesets.sqlite` under the index root.
pub struct ChangesetIds {
    pool: SqlitePool,
}

impl ChangesetIds {
    pub const FILE: &'static str = "changesets.sqlite";

    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path, OpenMode::Write)
            .await
            .map_err(ids_err)?;
        migrate::migrate_changesets(&pool).await.map_err(ids_err)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Ids of `revisions`, assigning fresh ones in slice order to any not
    /// seen before. `revisions` must list parents before children.
    ///
    /// The returned map only holds the revisions asked for.
    pub async fn assign(&self, repository: &str, revisions: &[String]) -> Result<HashMap<String, i64>> {
        let mut tx = self.pool.begin().await.map_err(ids_err)?;

        let rows = sqlx::query("SELECT revision, id FROM changeset_ids WHERE repository = ?")
            .bind(repository)
            .fetch_all(&mut *tx)
            .await
            .map_err(ids_err)?;
        let known: HashMap<String, i64> = rows
            .iter()
            .map(|row| (row.get("revision"), row.get("id")))
            .collect();
        let mut next = known.values().max().copied().unwrap_or(0) + 1;

        let mut ids = HashMap::with_capacity(revisions.len());
        for revision in revisions {
            if ids.contains_key(revision) {
                continue;
            }
            let id = match known.get(revision) {
                Some(id) => *id,
                None => {
                    let id = next;
                    next += 1;
                    sqlx::query("INSERT INTO changeset_ids (repository, revision, id) VALUES (?, ?, ?)")
                        .bind(repository)
                        .bind(revision)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(ids_err)?;
                    id
                }
            };
            ids.insert(revision.clone(), id);
        }

        tx.commit().await.map_err(ids_err)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shas(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ids_are_stable_and_new_revisions_go_last() {
        let tmp = TempDir::new().unwrap();
        let ids = ChangesetIds::open(&tmp.path().join(ChangesetIds::FILE))
            .await
            .unwrap();

        let first = ids.assign("p/[main]", &shas(&["a", "b", "c"])).await.unwrap();
        assert_eq!(first["a"], 1);
        assert_eq!(first["c"], 3);

        // A revision listed before known ones still gets the next free id.
        let second = ids
            .assign("p/[main]", &shas(&["x", "a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(second["x"], 4);
        assert_eq!(second["a"], 1);
        assert_eq!(second.len(), 4);

        // Numbering is per repository.
        let other = ids.assign("p/web", &shas(&["a"])).await.unwrap();
        assert_eq!(other["a"], 1);
        ids.close().await;
    }

    #[tokio::test]
    async fn test_ids_survive_reopen_and_unlisted_revisions_are_omitted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(ChangesetIds::FILE);
        let ids = ChangesetIds::open(&path).await.unwrap();
        ids.assign("r", &shas(&["a", "b"])).await.unwrap();
        ids.close().await;

        let ids = ChangesetIds::open(&path).await.unwrap();
        let got = ids.assign("r", &shas(&["b", "c"])).await.unwrap();
        assert_eq!(got.get("a"), None);
        assert_eq!(got["b"], 2);
        assert_eq!(got["c"], 3);
        ids.close().await;
    }
}
