//! Per-document add-or-update and delete against the store.
//!
//! Documents are immutable once stored: an update removes whatever is stored
//! under the locator and inserts a fresh document. Content the backend cannot
//! return (missing, binary, over the size limit) turns an update into a delete.

use crate::backend::Backend;
use crate::error::{IndexError, Result};
use crate::locator::{locator, LocatorResolver};
use crate::models::{Entry, IndexDocument, Repository};
use crate::store::Store;

/// What a single add-or-update or delete ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A fresh document was stored.
    Added,
    /// A stored document was removed.
    Deleted,
    /// Nothing was stored under the locator; nothing to remove.
    Absent,
    /// The path has no locator and was left alone.
    Unresolvable,
    /// The store refused the new document; the run carries on.
    PutFailed,
}

/// Limits on what content gets indexed.
#[derive(Debug, Clone, Copy)]
pub struct ContentPolicy {
    pub max_file_size: u64,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024,
        }
    }
}

impl ContentPolicy {
    /// Decode `bytes` as indexable text, or `None` if they are too large or
    /// not text.
    pub fn text_of(&self, bytes: Vec<u8>) -> Option<String> {
        if bytes.len() as u64 > self.max_file_size || bytes.contains(&0) {
            return None;
        }
        String::from_utf8(bytes).ok()
    }
}

/// Content type guessed from the file extension.
pub fn content_type_of(path: &str) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.essence_str().to_string())
}

/// Remove whatever is stored under `uri`.
///
/// Returns `Ok(false)` when nothing was stored; a missing document is the
/// goal state, not an error.
pub async fn delete_doc(store: &dyn Store, uri: &str) -> Result<bool> {
    let id = match store.lookup_id(uri).await? {
        Some(id) => id,
        None => return Ok(false),
    };
    tracing::info!(uri = %uri, id, "delete doc");
    store.remove_document(id).await
}

/// Applies add-or-update and delete for one repository's paths.
pub struct DocumentWriter<'a> {
    pub store: &'a dyn Store,
    pub backend: &'a dyn Backend,
    pub resolver: &'a dyn LocatorResolver,
    pub policy: ContentPolicy,
}

impl DocumentWriter<'_> {
    pub async fn delete(
        &self,
        repository: &Repository,
        revision: Option<&str>,
        path: &str,
    ) -> Result<Applied> {
        let uri = match locator(self.resolver, self.backend, repository, revision, path) {
            Some(uri) => uri,
            None => return Ok(Applied::Unresolvable),
        };
        Ok(if delete_doc(self.store, &uri).await? {
            Applied::Deleted
        } else {
            Applied::Absent
        })
    }

    pub async fn add_or_update(
        &self,
        repository: &Repository,
        revision: Option<&str>,
        entry: &Entry,
    ) -> Result<Applied> {
        let uri = match locator(self.resolver, self.backend, repository, revision, &entry.path) {
            Some(uri) => uri,
            None => return Ok(Applied::Unresolvable),
        };

        let bytes = self.backend.cat(repository, &entry.path, revision).await?;
        let text = match bytes.and_then(|b| self.policy.text_of(b)) {
            Some(text) => text,
            None => {
                return Ok(if delete_doc(self.store, &uri).await? {
                    Applied::Deleted
                } else {
                    Applied::Absent
                })
            }
        };

        // Failing to remove the old version counts as a failed put; the
        // stale document stays until a later run touches the path.
        if let Err(e) = delete_doc(self.store, &uri).await {
            tracing::warn!(uri = %uri, error = %e, "document put failed, previous version not removed");
            return Ok(Applied::PutFailed);
        }

        tracing::info!(uri = %uri, "add doc");
        let doc = IndexDocument {
            uri: uri.clone(),
            title: entry.path.clone(),
            repository: repository.display_identifier().to_string(),
            rev: revision.map(str::to_string),
            content_type: content_type_of(&entry.path),
            text,
        };
        match self.store.put_document(&doc).await {
            Ok(()) => Ok(Applied::Added),
            Err(e @ IndexError::StorePut(_)) => {
                tracing::warn!(uri = %uri, error = %e, "document put failed");
                Ok(Applied::PutFailed)
            }
            Err(e) => Err(e),
        }
    }
}
