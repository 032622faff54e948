//! # reposearch
//!
//! Keeps a full-text search index in step with one or more version-controlled
//! repositories.
//!
//! The first run over a repository walks every branch and tag and indexes
//! every file. Later runs read only the changesets committed since the last
//! successful run, collapse them into one action per path, and apply those
//! actions to the index. Each run is recorded in an append-only history so
//! an interrupted or failed run is retried from the last success.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │   Backend    │──▶│   IndexDatabase  │──▶│    Store     │
//! │ git / memory │   │ walk │ diff+reduce│   │ SQLite FTS5  │
//! └──────────────┘   └────────┬─────────┘   └──────────────┘
//!                             │
//!                             ▼
//!                      ┌─────────────┐
//!                      │ RunHistory  │
//!                      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`backend`] | Version-control backends |
//! | [`walker`] | Full-tree walk |
//! | [`reducer`] | Changeset range to per-path actions |
//! | [`locator`] | Document locators |
//! | [`upsert`] | Per-document add-or-update / delete |
//! | [`store`] | Document store abstraction and backends |
//! | [`history`] | Indexing run log |
//! | [`coordinator`] | Per-project indexing runs |
//! | [`query`] | Search condition builder |
//! | [`db`] | SQLite connections |
//! | [`migrate`] | Schema setup |
//! | [`error`] | Error type shared by the engine |
//! | [`logging`] | stderr log subscriber for the binary |

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod history;
pub mod locator;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod query;
pub mod reducer;
pub mod store;
pub mod upsert;
pub mod walker;
