//! Indexing run coordination.
//!
//! An [`IndexDatabase`] owns one project's index. [`IndexDatabase::indexing`]
//! visits the project's repositories in order and, for each one, decides
//! between a full walk (never indexed), an incremental diff (new changesets
//! since the last SUCCESS record), or nothing (already current). Every run
//! that gets as far as doing work ends with exactly one SUCCESS or FAIL record.
//!
//! ```text
//!  history ──▶ last SUCCESS? ──no──▶ walk_files ─┐
//!                    │                            ├─▶ DocumentWriter ─▶ Store
//!                   yes ──▶ changesets ─▶ reduce ─┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::changeset_ids::ChangesetIds;
use crate::backend::git::{GitBackend, GitRepository};
use crate::backend::{revision_identifiers, Backend};
use crate::config::{Config, ProjectConfig};
use crate::error::{IndexError, Result};
use crate::history::RunHistory;
use crate::locator::{LocatorResolver, RouteLocator};
use crate::models::{Action, IndexDocument, IndexingRun, OpenMode, Repository, RunStatus};
use crate::query::build_query;
use crate::reducer::reduce;
use crate::store::sqlite::SqliteStoreOpener;
use crate::store::{Store, StoreOpener};
use crate::upsert::{Applied, ContentPolicy, DocumentWriter};
use crate::walker::walk_files;

/// Collaborators shared by every repository of a project.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn Backend>,
    pub opener: Arc<dyn StoreOpener>,
    pub history: Arc<dyn RunHistory>,
    pub resolver: Arc<dyn LocatorResolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Incremental,
}

/// Per-run document counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub added: u64,
    pub deleted: u64,
    /// Deletes (or unindexable updates) of documents that were not stored.
    pub absent: u64,
    pub put_failures: u64,
    pub unresolvable: u64,
}

impl RunStats {
    fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Added => self.added += 1,
            Applied::Deleted => self.deleted += 1,
            Applied::Absent => self.absent += 1,
            Applied::PutFailed => self.put_failures += 1,
            Applied::Unresolvable => self.unresolvable += 1,
        }
    }
}

/// How one repository's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Indexed {
        changeset_id: i64,
        mode: RunMode,
        stats: RunStats,
    },
    /// The last SUCCESS record is already at or past the latest changeset.
    AlreadyCurrent { changeset_id: i64 },
    /// The repository has no changesets yet.
    Empty,
    /// Recorded as FAIL (or, if no target changeset was known, only logged).
    Failed { message: String },
}

/// Outcome of [`IndexDatabase::indexing`] for one repository.
#[derive(Debug, Clone)]
pub struct RepositoryRun {
    pub repository: Repository,
    pub outcome: RunOutcome,
}

pub struct IndexDatabase {
    project: String,
    repositories: Vec<Repository>,
    path: PathBuf,
    collaborators: Collaborators,
    policy: ContentPolicy,
    store: Option<Box<dyn Store>>,
}

impl IndexDatabase {
    /// Index for `project` stored under `root/<project>`.
    ///
    /// Repositories that cannot return file contents are dropped here and
    /// never indexed.
    pub fn new(
        project: &str,
        repositories: Vec<Repository>,
        root: &Path,
        collaborators: Collaborators,
        policy: ContentPolicy,
    ) -> Self {
        let repositories = repositories
            .into_iter()
            .filter(|r| {
                if !r.supports_content {
                    tracing::warn!(
                        project = %project,
                        repository = %r.display_identifier(),
                        "repository cannot return file contents, not indexed"
                    );
                }
                r.supports_content
            })
            .collect();
        Self {
            project: project.to_string(),
            repositories,
            path: root.join(project),
            collaborators,
            policy,
            store: None,
        }
    }

    /// Build the index of a configured project backed by git and SQLite.
    /// Git commit ids are numbered through `ids`.
    pub fn for_project(
        config: &Config,
        project: &ProjectConfig,
        history: Arc<dyn RunHistory>,
        ids: Arc<ChangesetIds>,
    ) -> Result<Self> {
        let mut backend = GitBackend::new(ids);
        let mut repositories = Vec::with_capacity(project.repositories.len());
        for repo_config in &project.repositories {
            let key = repo_config.key(&project.identifier);
            let mut repository = Repository::new(&key, repo_config.identifier.as_deref());
            repository.supports_content = GitBackend::is_git_repository(&repo_config.path);
            backend.register(
                &key,
                GitRepository::new(
                    &repo_config.path,
                    repo_config.fetch,
                    &repo_config.exclude_globs,
                )?,
            );
            repositories.push(repository);
        }

        let collaborators = Collaborators {
            backend: Arc::new(backend),
            opener: Arc::new(SqliteStoreOpener),
            history,
            resolver: Arc::new(RouteLocator::new(&config.routing.base, &project.identifier)),
        };
        Ok(Self::new(
            &project.identifier,
            repositories,
            &config.index.root,
            collaborators,
            config.index.content_policy(),
        ))
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Repositories that take part in indexing, in project order.
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Directory holding this project's index.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Open the store. A no-op if a handle is already open.
    pub async fn open(&mut self, mode: OpenMode) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.path).map_err(|e| IndexError::StoreOpen(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), %mode, "open index");
        match self.collaborators.opener.open(&self.path, mode).await {
            Ok(store) => {
                self.store = Some(store);
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "open index failed");
                Err(e)
            }
        }
    }

    /// Release the store. Close failures are logged; the handle is dropped
    /// either way so the index can be opened again.
    pub async fn close(&mut self) {
        if let Some(store) = self.store.take() {
            tracing::debug!(path = %self.path.display(), "close index");
            if let Err(e) = store.close().await {
                tracing::error!(path = %self.path.display(), error = %e, "close index failed");
            }
        }
    }

    /// Delete the index and every run record of this project's repositories.
    pub async fn remove(&mut self) -> Result<()> {
        self.close().await;
        for repository in &self.repositories {
            tracing::info!(
                project = %self.project,
                repository = %repository.display_identifier(),
                "remove run history"
            );
            self.collaborators
                .history
                .delete_all_runs_for(repository)
                .await?;
        }

        tracing::info!(path = %self.path.display(), "remove index");
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn optimize(&self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "optimize index");
        self.store()?.optimize().await
    }

    /// Locators of documents matching `tokens` and the given filters.
    pub async fn search(
        &self,
        tokens: &[String],
        repository: Option<&str>,
        rev: Option<&str>,
        content_type: Option<&str>,
        all_words: bool,
    ) -> Result<Vec<String>> {
        let condition = match build_query(tokens, repository, rev, content_type, all_words) {
            Some(condition) => condition,
            None => return Ok(Vec::new()),
        };
        tracing::info!(phrase = %condition.phrase(), ?repository, ?rev, ?content_type, "search");
        self.store()?.search(&condition).await
    }

    pub async fn get_document(&self, uri: &str, include_text: bool) -> Result<Option<IndexDocument>> {
        let store = self.store()?;
        let id = match store.lookup_id(uri).await? {
            Some(id) => id,
            None => return Ok(None),
        };
        tracing::info!(uri = %uri, id, "get doc");
        store.get_document(id, include_text).await
    }

    /// The last SUCCESS record of every repository.
    pub async fn last_successes(&self) -> Result<Vec<(Repository, Option<IndexingRun>)>> {
        let mut out = Vec::with_capacity(self.repositories.len());
        for repository in &self.repositories {
            let last = self
                .collaborators
                .history
                .find_last_success(repository)
                .await?;
            out.push((repository.clone(), last));
        }
        Ok(out)
    }

    /// Bring the index up to date with every repository, one at a time.
    ///
    /// A repository's failure is recorded and the next repository is still
    /// processed. Only a failure to read or write the run history is
    /// returned as an error.
    pub async fn indexing(&mut self) -> Result<Vec<RepositoryRun>> {
        let repositories = self.repositories.clone();
        let mut runs = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let outcome = self.index_repository(&repository).await?;
            runs.push(RepositoryRun {
                repository,
                outcome,
            });
        }
        Ok(runs)
    }

    async fn index_repository(&mut self, repository: &Repository) -> Result<RunOutcome> {
        let backend = Arc::clone(&self.collaborators.backend);
        let history = Arc::clone(&self.collaborators.history);
        let repo_id = repository.display_identifier();

        tracing::info!(project = %self.project, repository = %repo_id, "fetch changesets");
        if let Err(e) = backend.fetch_changesets(repository).await {
            tracing::warn!(repository = %repo_id, error = %e, "fetch failed, indexing local state");
        }

        let latest = match backend.latest_changeset(repository).await {
            Ok(Some(changeset)) => changeset,
            Ok(None) => return Ok(RunOutcome::Empty),
            Err(e) => {
                // No target changeset to pin a FAIL record to.
                tracing::error!(repository = %repo_id, error = %e, "cannot read latest changeset");
                return Ok(RunOutcome::Failed {
                    message: e.to_string(),
                });
            }
        };
        tracing::debug!(
            project = %self.project,
            repository = %repo_id,
            revision = %latest.revision,
            "latest revision"
        );

        let last_success = history.find_last_success(repository).await?;
        let (mode, from) = match &last_success {
            None => (RunMode::Full, None),
            Some(run) if latest.id <= run.changeset_id => {
                tracing::info!(
                    repository = %repo_id,
                    from = run.changeset_id,
                    to = latest.id,
                    "already indexed"
                );
                return Ok(RunOutcome::AlreadyCurrent {
                    changeset_id: run.changeset_id,
                });
            }
            Some(run) => (RunMode::Incremental, Some(run.changeset_id)),
        };

        let result = match self.ensure_writable().await {
            Ok(()) => {
                let writer = DocumentWriter {
                    store: self.store()?,
                    backend: backend.as_ref(),
                    resolver: self.collaborators.resolver.as_ref(),
                    policy: self.policy,
                };
                match from {
                    None => index_all(&writer, repository).await,
                    Some(from) => index_diff(&writer, repository, from, latest.id).await,
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(stats) => {
                history
                    .append_run(repository, &latest, RunStatus::Success, None)
                    .await?;
                tracing::info!(
                    project = %self.project,
                    repository = %repo_id,
                    revision = %latest.revision,
                    added = stats.added,
                    deleted = stats.deleted,
                    put_failures = stats.put_failures,
                    "successfully indexed"
                );
                Ok(RunOutcome::Indexed {
                    changeset_id: latest.id,
                    mode,
                    stats,
                })
            }
            Err(e) if e.is_run_failure() => {
                let message = e.to_string();
                history
                    .append_run(repository, &latest, RunStatus::Fail, Some(&message))
                    .await?;
                tracing::error!(
                    project = %self.project,
                    repository = %repo_id,
                    revision = %latest.revision,
                    error = %message,
                    "indexing failed"
                );
                Ok(RunOutcome::Failed { message })
            }
            Err(e) => Err(e),
        }
    }

    /// Make sure a write handle is open, reopening a read handle if needed.
    async fn ensure_writable(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            if store.mode() == OpenMode::Write {
                return Ok(());
            }
            self.close().await;
        }
        self.open(OpenMode::Write).await
    }

    fn store(&self) -> Result<&dyn Store> {
        self.store.as_deref().ok_or(IndexError::StoreNotOpen)
    }
}

fn revision_label(revision: Option<&str>) -> &str {
    revision.unwrap_or("[NOBRANCH]")
}

async fn index_all(writer: &DocumentWriter<'_>, repository: &Repository) -> Result<RunStats> {
    let repo_id = repository.display_identifier();
    tracing::info!(repository = %repo_id, "indexing all");

    let mut stats = RunStats::default();
    for revision in revision_identifiers(writer.backend, repository).await? {
        let revision = revision.as_deref();
        tracing::debug!(repository = %repo_id, revision = %revision_label(revision), "walking");
        for entry in walk_files(writer.backend, repository, revision).await? {
            stats.record(writer.add_or_update(repository, revision, &entry).await?);
        }
    }
    Ok(stats)
}

async fn index_diff(
    writer: &DocumentWriter<'_>,
    repository: &Repository,
    from: i64,
    to: i64,
) -> Result<RunStats> {
    let repo_id = repository.display_identifier();
    tracing::info!(repository = %repo_id, from, to, "indexing diff");

    let mut stats = RunStats::default();
    for revision in revision_identifiers(writer.backend, repository).await? {
        let revision = revision.as_deref();
        tracing::debug!(repository = %repo_id, revision = %revision_label(revision), "walking changesets");
        let changesets = writer
            .backend
            .changesets_in_range(repository, revision, from, to)
            .await?;

        for (path, action) in reduce(changesets) {
            let applied = match action {
                Action::Delete => writer.delete(repository, revision, &path).await?,
                Action::AddOrUpdate => {
                    // Only the state at the target revision matters.
                    match writer.backend.entry(repository, &path, revision).await? {
                        Some(entry) if entry.is_file() => {
                            writer.add_or_update(repository, revision, &entry).await?
                        }
                        _ => writer.delete(repository, revision, &path).await?,
                    }
                }
            };
            stats.record(applied);
        }
    }
    Ok(stats)
}
