//! Full-tree walk used for the first index of a repository.

use crate::backend::Backend;
use crate::error::Result;
use crate::models::{Entry, Repository};

/// Every file under the root of `repository` at `revision`, depth-first in
/// backend listing order.
///
/// Directories are expanded with a worklist rather than recursion; an empty
/// listing simply contributes nothing.
pub async fn walk_files(
    backend: &dyn Backend,
    repository: &Repository,
    revision: Option<&str>,
) -> Result<Vec<Entry>> {
    let mut files = Vec::new();
    let root = backend.entries(repository, None, revision).await?;

    // Stack of pending listings; reversed so entries pop in listing order.
    let mut pending: Vec<Entry> = root.into_iter().rev().collect();
    while let Some(entry) = pending.pop() {
        if entry.is_dir() {
            let children = backend
                .entries(repository, Some(&entry.path), revision)
                .await?;
            pending.extend(children.into_iter().rev());
        } else if entry.is_file() {
            files.push(entry);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;

    #[tokio::test]
    async fn test_walk_emits_every_file_depth_first() {
        let backend = InMemoryBackend::new()
            .with_branches(&["main"])
            .with_file(Some("main"), "a.txt", "a")
            .with_file(Some("main"), "dir/b.txt", "b")
            .with_file(Some("main"), "dir/sub/c.txt", "c")
            .with_file(Some("main"), "z.txt", "z");
        let repo = Repository::new("r", None);

        let files = walk_files(&backend, &repo, Some("main")).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["dir/sub/c.txt", "dir/b.txt", "a.txt", "z.txt"]);
    }

    #[tokio::test]
    async fn test_walk_of_empty_tree_is_empty() {
        let backend = InMemoryBackend::new();
        let repo = Repository::new("r", None);
        let files = walk_files(&backend, &repo, None).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_walk_stays_on_requested_revision() {
        let backend = InMemoryBackend::new()
            .with_file(Some("main"), "a.txt", "a")
            .with_file(Some("v1"), "old.txt", "o");
        let repo = Repository::new("r", None);
        let files = walk_files(&backend, &repo, Some("v1")).await.unwrap();
        assert_eq!(files, vec![Entry::file("old.txt")]);
    }
}
