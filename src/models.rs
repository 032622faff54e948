//! Core data models used throughout reposearch.
//!
//! These types describe the repositories being indexed, the tree entries and
//! changesets read from a version-control backend, the run records kept in the
//! history log, and the documents written to the search store.

use std::fmt;

/// Identifier used for a repository that has no identifier of its own.
pub const MAIN_REPOSITORY_IDENTIFIER: &str = "[main]";

/// A named, revision-addressable source tree owned by a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Backend-specific key (row id, path, ...). Stable for the repository's lifetime.
    pub key: String,
    pub identifier: Option<String>,
    /// Whether file contents can be read back from the backend.
    pub supports_content: bool,
}

impl Repository {
    pub fn new(key: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            key: key.into(),
            identifier: identifier.map(str::to_string),
            supports_content: true,
        }
    }

    /// The repository identifier, or [`MAIN_REPOSITORY_IDENTIFIER`] when absent.
    pub fn display_identifier(&self) -> &str {
        self.identifier
            .as_deref()
            .unwrap_or(MAIN_REPOSITORY_IDENTIFIER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of a repository tree at a given revision-identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Source-control action recorded for one path in a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Modified,
    Replaced,
    Deleted,
}

impl ChangeAction {
    /// Parse the single-letter SCM code (`A`, `M`, `R`, `D`).
    ///
    /// Git's copy/rename/type-change codes are folded into `Replaced`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.chars().next()? {
            'A' => Some(ChangeAction::Added),
            'M' => Some(ChangeAction::Modified),
            'R' | 'C' | 'T' => Some(ChangeAction::Replaced),
            'D' => Some(ChangeAction::Deleted),
            _ => None,
        }
    }

    /// Index-side action implied by this change.
    pub fn index_action(self) -> Action {
        match self {
            ChangeAction::Deleted => Action::Delete,
            ChangeAction::Added | ChangeAction::Modified | ChangeAction::Replaced => {
                Action::AddOrUpdate
            }
        }
    }
}

/// One path mutation within a changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub action: ChangeAction,
}

impl Change {
    pub fn new(action: ChangeAction, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
        }
    }
}

/// An atomic commit. Changesets are totally ordered by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub id: i64,
    pub revision: String,
    pub changes: Vec<Change>,
}

/// What must happen to a document for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddOrUpdate,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Fail,
}

impl RunStatus {
    /// Integer code persisted in the history log.
    pub fn code(self) -> i64 {
        match self {
            RunStatus::Success => 1,
            RunStatus::Fail => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(RunStatus::Success),
            -1 => Some(RunStatus::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Fail => write!(f, "fail"),
        }
    }
}

/// One outcome of an indexing attempt. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingRun {
    pub repository_key: String,
    pub changeset_id: i64,
    pub revision: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub created_at: i64,
}

/// A document as stored in the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub uri: String,
    pub title: String,
    pub repository: String,
    /// Branch, tag, or `None` for the trunk/head.
    pub rev: Option<String>,
    pub content_type: Option<String>,
    /// Full text; left empty when the document was fetched without text.
    pub text: String,
}

/// Store-assigned document id.
pub type DocId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "read"),
            OpenMode::Write => write!(f, "write"),
        }
    }
}
