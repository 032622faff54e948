//! In-memory [`Backend`] implementation for tests.
//!
//! Trees are stored per revision-identifier as flat `path -> bytes` maps;
//! directories are implied by path prefixes. Changesets can be appended
//! between runs to simulate a repository advancing, and individual paths can
//! be made to fail on read to simulate a backend outage.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IndexError, Result};
use crate::models::{Change, Changeset, Entry, Repository};

use super::Backend;

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
struct State {
    branches: Vec<String>,
    tags: Vec<String>,
    trees: HashMap<Option<String>, Tree>,
    /// Changesets paired with the revision-identifiers they are reachable
    /// from. An empty set means reachable from every revision.
    changesets: Vec<(Changeset, HashSet<Option<String>>)>,
    failing_paths: HashSet<String>,
    fetches: usize,
}

/// Scripted in-memory repository.
pub struct InMemoryBackend {
    root_prefix: String,
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            root_prefix: String::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Treat paths starting with `prefix` as absolute checkout paths.
    pub fn with_root_prefix(mut self, prefix: &str) -> Self {
        self.root_prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn with_branches(self, branches: &[&str]) -> Self {
        self.lock().branches = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn with_tags(self, tags: &[&str]) -> Self {
        self.lock().tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_file(self, revision: Option<&str>, path: &str, content: &str) -> Self {
        self.put_file(revision, path, content.as_bytes());
        self
    }

    pub fn with_changeset(self, id: i64, changes: Vec<Change>) -> Self {
        self.push_changeset(id, changes, &[]);
        self
    }

    /// Replace the content of `path` at `revision`.
    pub fn put_file(&self, revision: Option<&str>, path: &str, content: &[u8]) {
        self.lock()
            .trees
            .entry(revision.map(str::to_string))
            .or_default()
            .insert(path.trim_matches('/').to_string(), content.to_vec());
    }

    pub fn remove_file(&self, revision: Option<&str>, path: &str) {
        if let Some(tree) = self.lock().trees.get_mut(&revision.map(str::to_string)) {
            tree.remove(path.trim_matches('/'));
        }
    }

    /// Append a changeset reachable from `revisions` (all revisions when empty).
    pub fn push_changeset(&self, id: i64, changes: Vec<Change>, revisions: &[Option<&str>]) {
        let reachable = revisions
            .iter()
            .map(|r| r.map(str::to_string))
            .collect::<HashSet<_>>();
        let changeset = Changeset {
            id,
            revision: format!("r{}", id),
            changes,
        };
        self.lock().changesets.push((changeset, reachable));
    }

    /// Make reads of `path` fail with a backend error.
    pub fn fail_reads_of(&self, path: &str) {
        self.lock().failing_paths.insert(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_paths.clear();
    }

    /// Number of times [`Backend::fetch_changesets`] was called.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn fetch_changesets(&self, _repository: &Repository) -> Result<()> {
        self.lock().fetches += 1;
        Ok(())
    }

    async fn branches(&self, _repository: &Repository) -> Result<Vec<String>> {
        Ok(self.lock().branches.clone())
    }

    async fn tags(&self, _repository: &Repository) -> Result<Vec<String>> {
        Ok(self.lock().tags.clone())
    }

    async fn entries(
        &self,
        _repository: &Repository,
        path: Option<&str>,
        revision: Option<&str>,
    ) -> Result<Vec<Entry>> {
        let state = self.lock();
        let tree = match state.trees.get(&revision.map(str::to_string)) {
            Some(tree) => tree,
            None => return Ok(Vec::new()),
        };

        let prefix = match path.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
            Some(dir) => format!("{}/", dir),
            None => String::new(),
        };

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for file in tree.keys() {
            let rest = match file.strip_prefix(&prefix) {
                Some(rest) if !rest.is_empty() => rest,
                _ => continue,
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(format!("{}{}", prefix, dir));
                }
                None => entries.push(Entry::file(file.clone())),
            }
        }
        let mut listing: Vec<Entry> = dirs.into_iter().map(Entry::dir).collect();
        listing.extend(entries);
        Ok(listing)
    }

    async fn cat(
        &self,
        _repository: &Repository,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let state = self.lock();
        if state.failing_paths.contains(path) {
            return Err(IndexError::Backend(format!("cannot read {}", path)));
        }
        Ok(state
            .trees
            .get(&revision.map(str::to_string))
            .and_then(|tree| tree.get(path.trim_matches('/')))
            .cloned())
    }

    async fn latest_changeset(&self, _repository: &Repository) -> Result<Option<Changeset>> {
        Ok(self
            .lock()
            .changesets
            .iter()
            .map(|(cs, _)| cs)
            .max_by_key(|cs| cs.id)
            .cloned())
    }

    async fn changesets_in_range(
        &self,
        _repository: &Repository,
        revision: Option<&str>,
        from: i64,
        to: i64,
    ) -> Result<Vec<Changeset>> {
        let revision = revision.map(str::to_string);
        // Newest first, like a backend's "latest changesets" listing.
        let mut found: Vec<Changeset> = self
            .lock()
            .changesets
            .iter()
            .filter(|(cs, reachable)| {
                cs.id > from && cs.id <= to && (reachable.is_empty() || reachable.contains(&revision))
            })
            .map(|(cs, _)| cs.clone())
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(found)
    }

    fn relative_path(&self, _repository: &Repository, path: &str) -> String {
        let path = if self.root_prefix.is_empty() {
            path
        } else {
            path.strip_prefix(&self.root_prefix).unwrap_or(path)
        };
        path.trim_start_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeAction;

    fn repo() -> Repository {
        Repository::new("r", None)
    }

    #[tokio::test]
    async fn test_entries_lists_dirs_then_files() {
        let backend = InMemoryBackend::new()
            .with_file(None, "a.txt", "a")
            .with_file(None, "dir/b.txt", "b")
            .with_file(None, "dir/sub/c.txt", "c");

        let root = backend.entries(&repo(), None, None).await.unwrap();
        assert_eq!(root, vec![Entry::dir("dir"), Entry::file("a.txt")]);

        let dir = backend.entries(&repo(), Some("dir"), None).await.unwrap();
        assert_eq!(dir, vec![Entry::dir("dir/sub"), Entry::file("dir/b.txt")]);
    }

    #[tokio::test]
    async fn test_unknown_revision_has_no_entries() {
        let backend = InMemoryBackend::new().with_file(Some("main"), "a.txt", "a");
        let listing = backend.entries(&repo(), None, Some("other")).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_range_is_exclusive_inclusive_and_filtered_by_revision() {
        let backend = InMemoryBackend::new();
        backend.push_changeset(1, vec![Change::new(ChangeAction::Added, "a")], &[]);
        backend.push_changeset(2, vec![Change::new(ChangeAction::Added, "b")], &[Some("dev")]);
        backend.push_changeset(3, vec![Change::new(ChangeAction::Added, "c")], &[]);

        let main: Vec<i64> = backend
            .changesets_in_range(&repo(), Some("main"), 1, 3)
            .await
            .unwrap()
            .iter()
            .map(|cs| cs.id)
            .collect();
        assert_eq!(main, vec![3]);

        let dev: Vec<i64> = backend
            .changesets_in_range(&repo(), Some("dev"), 0, 2)
            .await
            .unwrap()
            .iter()
            .map(|cs| cs.id)
            .collect();
        assert_eq!(dev, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_failing_path_raises_backend_error() {
        let backend = InMemoryBackend::new().with_file(None, "a.txt", "a");
        backend.fail_reads_of("a.txt");
        let err = backend.cat(&repo(), "a.txt", None).await.unwrap_err();
        assert!(matches!(err, IndexError::Backend(_)));
        backend.clear_failures();
        assert!(backend.cat(&repo(), "a.txt", None).await.unwrap().is_some());
    }
}
