//! In-memory [`Store`] implementation for testing.
//!
//! Indexes are kept per directory inside the opener, so a handle can be
//! closed and reopened and still see earlier writes, just like a file-backed
//! store. Keyword matching is a case-insensitive substring test.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{IndexError, Result};
use crate::models::{DocId, IndexDocument, OpenMode};
use crate::query::{Attr, SearchCondition};

use super::{Store, StoreOpener};

#[derive(Default)]
struct Index {
    next_id: DocId,
    docs: BTreeMap<DocId, IndexDocument>,
    writer_open: bool,
    puts: usize,
    removes: usize,
}

#[derive(Default)]
struct Shared {
    indexes: HashMap<PathBuf, Index>,
    rejected_uris: HashSet<String>,
    fail_close: bool,
}

/// Opener over in-memory indexes. Clones share the same indexes.
#[derive(Clone, Default)]
pub struct InMemoryStoreOpener {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryStoreOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put of `uri` fail with `StorePut`.
    pub fn reject_puts_of(&self, uri: &str) {
        lock(&self.shared).rejected_uris.insert(uri.to_string());
    }

    /// Make every subsequent close report `StoreClose`.
    pub fn fail_close(&self, fail: bool) {
        lock(&self.shared).fail_close = fail;
    }

    /// Snapshot of the documents stored under `dir`, keyed by locator.
    pub fn documents(&self, dir: &Path) -> BTreeMap<String, IndexDocument> {
        lock(&self.shared)
            .indexes
            .get(dir)
            .map(|index| {
                index
                    .docs
                    .values()
                    .map(|d| (d.uri.clone(), d.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total puts and removes performed against `dir`.
    pub fn mutations(&self, dir: &Path) -> usize {
        lock(&self.shared)
            .indexes
            .get(dir)
            .map(|index| index.puts + index.removes)
            .unwrap_or(0)
    }

    /// Drop the index stored under `dir`.
    pub fn clear(&self, dir: &Path) {
        lock(&self.shared).indexes.remove(dir);
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StoreOpener for InMemoryStoreOpener {
    async fn open(&self, dir: &Path, mode: OpenMode) -> Result<Box<dyn Store>> {
        let mut shared = lock(&self.shared);
        match mode {
            OpenMode::Read => {
                if !shared.indexes.contains_key(dir) {
                    return Err(IndexError::StoreOpen(format!(
                        "no index at {}",
                        dir.display()
                    )));
                }
            }
            OpenMode::Write => {
                let index = shared.indexes.entry(dir.to_path_buf()).or_default();
                if index.writer_open {
                    return Err(IndexError::StoreOpen(format!(
                        "{} is already open for writing",
                        dir.display()
                    )));
                }
                index.writer_open = true;
            }
        }
        Ok(Box::new(InMemoryStore {
            shared: Arc::clone(&self.shared),
            dir: dir.to_path_buf(),
            mode,
        }))
    }
}

pub struct InMemoryStore {
    shared: Arc<Mutex<Shared>>,
    dir: PathBuf,
    mode: OpenMode,
}

impl InMemoryStore {
    fn with_index<T>(&self, f: impl FnOnce(&mut Index) -> T) -> Result<T> {
        let mut shared = lock(&self.shared);
        let index = shared
            .indexes
            .get_mut(&self.dir)
            .ok_or_else(|| IndexError::Store(format!("index {} was removed", self.dir.display())))?;
        Ok(f(index))
    }
}

fn doc_matches(doc: &IndexDocument, condition: &SearchCondition) -> bool {
    let text = doc.text.to_lowercase();
    let title = doc.title.to_lowercase();
    let hit = |token: &String| {
        let token = token.to_lowercase();
        text.contains(&token) || title.contains(&token)
    };
    let phrase_ok = if condition.all_words {
        condition.tokens.iter().all(hit)
    } else {
        condition.tokens.iter().any(hit)
    };

    phrase_ok
        && condition.filters.iter().all(|f| match f.attr {
            Attr::Repository => doc.repository == f.value,
            Attr::Rev => doc.rev.as_deref() == Some(f.value.as_str()),
            Attr::ContentType => doc.content_type.as_deref() == Some(f.value.as_str()),
        })
}

#[async_trait]
impl Store for InMemoryStore {
    fn mode(&self) -> OpenMode {
        self.mode
    }

    async fn close(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if self.mode == OpenMode::Write {
            if let Some(index) = shared.indexes.get_mut(&self.dir) {
                index.writer_open = false;
            }
        }
        if shared.fail_close {
            return Err(IndexError::StoreClose("simulated close failure".to_string()));
        }
        Ok(())
    }

    async fn lookup_id(&self, uri: &str) -> Result<Option<DocId>> {
        self.with_index(|index| {
            index
                .docs
                .iter()
                .find(|(_, d)| d.uri == uri)
                .map(|(id, _)| *id)
        })
    }

    async fn get_document(&self, id: DocId, include_text: bool) -> Result<Option<IndexDocument>> {
        self.with_index(|index| {
            index.docs.get(&id).map(|d| {
                let mut doc = d.clone();
                if !include_text {
                    doc.text.clear();
                }
                doc
            })
        })
    }

    async fn put_document(&self, doc: &IndexDocument) -> Result<()> {
        if self.mode != OpenMode::Write {
            return Err(IndexError::StorePut("store opened read-only".to_string()));
        }
        if lock(&self.shared).rejected_uris.contains(&doc.uri) {
            return Err(IndexError::StorePut(format!("rejected {}", doc.uri)));
        }
        self.with_index(|index| {
            if index.docs.values().any(|d| d.uri == doc.uri) {
                return Err(IndexError::StorePut(format!("duplicate uri {}", doc.uri)));
            }
            index.next_id += 1;
            index.docs.insert(index.next_id, doc.clone());
            index.puts += 1;
            Ok(())
        })?
    }

    async fn remove_document(&self, id: DocId) -> Result<bool> {
        if self.mode != OpenMode::Write {
            return Err(IndexError::StoreRemove("store opened read-only".to_string()));
        }
        self.with_index(|index| {
            let removed = index.docs.remove(&id).is_some();
            if removed {
                index.removes += 1;
            }
            removed
        })
    }

    async fn search(&self, condition: &SearchCondition) -> Result<Vec<String>> {
        self.with_index(|index| {
            index
                .docs
                .values()
                .filter(|d| doc_matches(d, condition))
                .map(|d| d.uri.clone())
                .collect()
        })
    }

    async fn optimize(&self) -> Result<()> {
        if self.mode != OpenMode::Write {
            return Err(IndexError::StoreOptimize("store opened read-only".to_string()));
        }
        Ok(())
    }
}
