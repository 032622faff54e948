//! Version-control backend abstraction.
//!
//! The [`Backend`] trait is everything the indexing engine needs from a
//! source-control system: enumerating branches and tags, listing tree entries,
//! reading file contents, and listing changesets with their per-path actions.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`git::GitBackend`] | Local git repositories via the `git` CLI |
//! | [`memory::InMemoryBackend`] | Scripted repositories for tests |
//!
//! [`changeset_ids::ChangesetIds`] persists the numeric ids git commits are
//! given.

pub mod changeset_ids;
pub mod git;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Changeset, Entry, Repository};

#[async_trait]
pub trait Backend: Send + Sync {
    /// Bring the backend's view of the repository up to date (e.g. fetch
    /// from a remote). Called once at the start of every indexing run.
    async fn fetch_changesets(&self, _repository: &Repository) -> Result<()> {
        Ok(())
    }

    /// Branch names in backend order. Empty when the repository has none.
    async fn branches(&self, repository: &Repository) -> Result<Vec<String>>;

    /// Tag names in backend order. Empty when the repository has none.
    async fn tags(&self, repository: &Repository) -> Result<Vec<String>>;

    /// Immediate children of `path` (`None` = root) at `revision`
    /// (`None` = trunk/head).
    async fn entries(
        &self,
        repository: &Repository,
        path: Option<&str>,
        revision: Option<&str>,
    ) -> Result<Vec<Entry>>;

    /// The entry at exactly `path`, if it exists at `revision`.
    async fn entry(
        &self,
        repository: &Repository,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Option<Entry>> {
        let path = path.trim_matches('/');
        let parent = path.rfind('/').map(|i| &path[..i]);
        let siblings = self.entries(repository, parent, revision).await?;
        Ok(siblings.into_iter().find(|e| e.path == path))
    }

    /// Raw file content, or `None` when the file cannot be read back
    /// (missing at that revision, excluded by policy).
    async fn cat(
        &self,
        repository: &Repository,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Option<Vec<u8>>>;

    /// The changeset with the highest id, or `None` for an empty repository.
    async fn latest_changeset(&self, repository: &Repository) -> Result<Option<Changeset>>;

    /// Changesets reachable from `revision` with `from < id <= to`.
    async fn changesets_in_range(
        &self,
        repository: &Repository,
        revision: Option<&str>,
        from: i64,
        to: i64,
    ) -> Result<Vec<Changeset>>;

    /// Reduce a backend path to its repository-relative form.
    fn relative_path(&self, repository: &Repository, path: &str) -> String;
}

/// Revision-identifiers to visit for a repository: every branch, then every
/// tag. A repository without branches is visited at its trunk (`None`) first.
pub async fn revision_identifiers(
    backend: &dyn Backend,
    repository: &Repository,
) -> Result<Vec<Option<String>>> {
    let branches = backend.branches(repository).await?;
    let tags = backend.tags(repository).await?;

    let mut revisions: Vec<Option<String>> = Vec::with_capacity(branches.len() + tags.len() + 1);
    if branches.is_empty() {
        revisions.push(None);
    } else {
        revisions.extend(branches.into_iter().map(Some));
    }
    revisions.extend(tags.into_iter().map(Some));
    Ok(revisions)
}
