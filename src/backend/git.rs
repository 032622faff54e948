//! Git backend built on the `git` command-line client.
//!
//! Each configured repository points at a local clone (bare or not). Branches
//! and tags come from `git for-each-ref`, trees from `git ls-tree`, contents
//! from `git cat-file`, and per-commit path actions from `git diff-tree`.
//!
//! Changeset ids come from [`ChangesetIds`]: each commit is numbered the
//! first time any ref reaches it, in `git rev-list --all --reverse
//! --topo-order` order, and keeps that number afterwards. Merge commits are
//! diffed against their first parent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::process::Command;

use crate::error::{IndexError, Result};
use crate::models::{Change, ChangeAction, Changeset, Entry, Repository};

use super::changeset_ids::ChangesetIds;
use super::Backend;

/// A local clone registered with the backend.
#[derive(Debug, Clone)]
pub struct GitRepository {
    pub path: PathBuf,
    /// Run `git fetch --all` before each indexing run.
    pub fetch: bool,
    /// Paths matching these globs are never read back.
    pub exclude: GlobSet,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>, fetch: bool, exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            fetch,
            exclude: build_globset(exclude_globs)?,
        })
    }
}

/// Git repositories keyed by [`Repository::key`].
pub struct GitBackend {
    repositories: HashMap<String, GitRepository>,
    ids: Arc<ChangesetIds>,
}

impl GitBackend {
    pub fn new(ids: Arc<ChangesetIds>) -> Self {
        Self {
            repositories: HashMap::new(),
            ids,
        }
    }

    pub fn register(&mut self, key: &str, repository: GitRepository) {
        self.repositories.insert(key.to_string(), repository);
    }

    /// Whether `path` looks like a git repository the CLI can read.
    pub fn is_git_repository(path: &Path) -> bool {
        path.join(".git").exists() || path.join("HEAD").is_file()
    }

    fn lookup(&self, repository: &Repository) -> Result<&GitRepository> {
        self.repositories.get(&repository.key).ok_or_else(|| {
            IndexError::Backend(format!(
                "repository '{}' is not registered with the git backend",
                repository.display_identifier()
            ))
        })
    }

    /// Ids of every commit reachable from any ref.
    async fn commit_ids(
        &self,
        repository: &Repository,
        repo: &GitRepository,
    ) -> Result<HashMap<String, i64>> {
        let output = git(&repo.path, &["rev-list", "--all", "--reverse", "--topo-order"]).await?;
        let shas: Vec<String> = output
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.ids.assign(&repository.key, &shas).await
    }

    /// Paths touched by `sha` relative to its first parent (or the empty
    /// tree for a root commit).
    async fn changes_of(
        &self,
        repo: &GitRepository,
        sha: &str,
        first_parent: Option<&str>,
    ) -> Result<Vec<Change>> {
        let raw = match first_parent {
            Some(parent) => {
                git_bytes(
                    &repo.path,
                    &["diff-tree", "--name-status", "-r", "-z", parent, sha],
                )
                .await?
            }
            None => {
                git_bytes(
                    &repo.path,
                    &["diff-tree", "--no-commit-id", "--name-status", "-r", "-z", "--root", sha],
                )
                .await?
            }
        };
        Ok(parse_name_status(&raw))
    }
}

#[async_trait]
impl Backend for GitBackend {
    async fn fetch_changesets(&self, repository: &Repository) -> Result<()> {
        let repo = self.lookup(repository)?;
        if repo.fetch {
            tracing::debug!(repository = %repository.display_identifier(), "git fetch");
            git(&repo.path, &["fetch", "--all", "--prune", "--tags"]).await?;
        }
        Ok(())
    }

    async fn branches(&self, repository: &Repository) -> Result<Vec<String>> {
        let repo = self.lookup(repository)?;
        list_refs(&repo.path, "refs/heads").await
    }

    async fn tags(&self, repository: &Repository) -> Result<Vec<String>> {
        let repo = self.lookup(repository)?;
        list_refs(&repo.path, "refs/tags").await
    }

    async fn entries(
        &self,
        repository: &Repository,
        path: Option<&str>,
        revision: Option<&str>,
    ) -> Result<Vec<Entry>> {
        let repo = self.lookup(repository)?;
        let treeish = revision.unwrap_or("HEAD");
        let pathspec = path
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(|dir| format!("{}/", dir));

        let mut args = vec!["ls-tree", "-z", treeish];
        if let Some(spec) = pathspec.as_deref() {
            args.push("--");
            args.push(spec);
        }
        let raw = git_bytes(&repo.path, &args).await?;
        Ok(parse_ls_tree(&raw))
    }

    async fn cat(
        &self,
        repository: &Repository,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let repo = self.lookup(repository)?;
        let path = path.trim_matches('/');
        if repo.exclude.is_match(path) {
            return Ok(None);
        }
        let object = format!("{}:{}", revision.unwrap_or("HEAD"), path);
        let output = Command::new("git")
            .arg("-C")
            .arg(&repo.path)
            .args(["cat-file", "blob", &object])
            .output()
            .await
            .map_err(|e| IndexError::Backend(format!("Failed to execute 'git cat-file': {}", e)))?;

        // A missing object is "no content", not a backend failure.
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }

    async fn latest_changeset(&self, repository: &Repository) -> Result<Option<Changeset>> {
        let repo = self.lookup(repository)?;
        let ids = self.commit_ids(repository, repo).await?;
        Ok(ids
            .into_iter()
            .max_by_key(|(_, id)| *id)
            .map(|(sha, id)| Changeset {
                id,
                revision: sha,
                changes: Vec::new(),
            }))
    }

    async fn changesets_in_range(
        &self,
        repository: &Repository,
        revision: Option<&str>,
        from: i64,
        to: i64,
    ) -> Result<Vec<Changeset>> {
        let repo = self.lookup(repository)?;
        let ids = self.commit_ids(repository, repo).await?;
        // `--` keeps a branch named like a top-level path from being read as one.
        let reachable = git(
            &repo.path,
            &["rev-list", "--topo-order", "--parents", revision.unwrap_or("HEAD"), "--"],
        )
        .await?;

        let mut changesets = Vec::new();
        for line in reachable.lines() {
            let mut shas = line.split_whitespace();
            let sha = match shas.next() {
                Some(sha) => sha,
                None => continue,
            };
            let id = match ids.get(sha) {
                Some(id) if *id > from && *id <= to => *id,
                _ => continue,
            };
            changesets.push(Changeset {
                id,
                revision: sha.to_string(),
                changes: self.changes_of(repo, sha, shas.next()).await?,
            });
        }
        Ok(changesets)
    }

    fn relative_path(&self, repository: &Repository, path: &str) -> String {
        let relative = self
            .repositories
            .get(&repository.key)
            .and_then(|repo| Path::new(path).strip_prefix(&repo.path).ok())
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        relative.trim_start_matches('/').to_string()
    }
}

async fn git_bytes(repo_dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            IndexError::Backend(format!("Failed to execute 'git {}': {}", args[0], e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IndexError::Backend(format!(
            "git {} failed: {}",
            args[0],
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

async fn git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let stdout = git_bytes(repo_dir, args).await?;
    Ok(String::from_utf8_lossy(&stdout).to_string())
}

async fn list_refs(repo_dir: &Path, namespace: &str) -> Result<Vec<String>> {
    let output = git(
        repo_dir,
        &["for-each-ref", "--format=%(refname:short)", namespace],
    )
    .await?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse `git ls-tree -z` output: `<mode> <type> <object>\t<path>\0`.
/// Submodule (`commit`) entries are skipped.
fn parse_ls_tree(raw: &[u8]) -> Vec<Entry> {
    raw.split(|b| *b == 0)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (meta, path) = record.split_once('\t')?;
            match meta.split(' ').nth(1)? {
                "blob" => Some(Entry::file(path)),
                "tree" => Some(Entry::dir(path)),
                _ => None,
            }
        })
        .collect()
}

/// Parse `git diff-tree --name-status -z` output.
///
/// Renames and copies carry two paths; a rename deletes the old path.
fn parse_name_status(raw: &[u8]) -> Vec<Change> {
    let mut fields = raw
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).to_string());

    let mut changes = Vec::new();
    while let Some(status) = fields.next() {
        let action = match ChangeAction::from_code(&status) {
            Some(action) => action,
            None => {
                fields.next();
                continue;
            }
        };
        let first = match fields.next() {
            Some(path) => path,
            None => break,
        };
        if status.starts_with('R') || status.starts_with('C') {
            let second = match fields.next() {
                Some(path) => path,
                None => break,
            };
            if status.starts_with('R') {
                changes.push(Change::new(ChangeAction::Deleted, first));
            }
            changes.push(Change::new(action, second));
        } else {
            changes.push(Change::new(action, first));
        }
    }
    changes
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Config(format!("invalid glob set: {}", e)))
}
