//! Document store abstraction.
//!
//! A [`StoreOpener`] opens the physical index under a directory and hands
//! back a [`Store`] handle. Documents are keyed by their locator (URI) and
//! never modified in place: an update is a remove followed by a put.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`lookup_id`](Store::lookup_id) | Resolve a locator to a store id |
//! | [`get_document`](Store::get_document) | Fetch a document, optionally without text |
//! | [`put_document`](Store::put_document) | Insert a new document |
//! | [`remove_document`](Store::remove_document) | Remove a document by id |
//! | [`search`](Store::search) | Run a [`SearchCondition`], returning locators |
//! | [`optimize`](Store::optimize) | Compact the index |
//! | [`close`](Store::close) | Release the handle |

pub mod memory;
pub mod sqlite;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocId, IndexDocument, OpenMode};
use crate::query::SearchCondition;

#[async_trait]
pub trait StoreOpener: Send + Sync {
    /// Open the index stored under `dir`. `Write` creates it if absent and
    /// fails with `StoreOpen` when another writer holds it.
    async fn open(&self, dir: &Path, mode: OpenMode) -> Result<Box<dyn Store>>;
}

#[async_trait]
pub trait Store: Send + Sync {
    fn mode(&self) -> OpenMode;

    async fn close(&self) -> Result<()>;

    async fn lookup_id(&self, uri: &str) -> Result<Option<DocId>>;

    async fn get_document(&self, id: DocId, include_text: bool) -> Result<Option<IndexDocument>>;

    /// Insert `doc`. Fails with `StorePut` if the store rejects it, including
    /// when a document already exists under the same locator.
    async fn put_document(&self, doc: &IndexDocument) -> Result<()>;

    /// Remove the document with `id`. Returns `false` if it did not exist.
    async fn remove_document(&self, id: DocId) -> Result<bool>;

    async fn search(&self, condition: &SearchCondition) -> Result<Vec<String>>;

    async fn optimize(&self) -> Result<()>;
}
