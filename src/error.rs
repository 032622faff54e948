//! Error taxonomy for indexing runs.
//!
//! Store and backend failures propagate out of the leaf helpers unchanged and
//! are converted into FAIL run records by the coordinator. `History` errors are
//! the exception: a run that cannot be recorded is fatal to the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Open failed (Need to create indexes) - '{0}'")]
    StoreOpen(String),

    #[error("Close failed (Try to restart) - '{0}'")]
    StoreClose(String),

    #[error("Optimize failed: {0}")]
    StoreOptimize(String),

    #[error("Document put failed - {0}")]
    StorePut(String),

    #[error("Document remove failed - {0}")]
    StoreRemove(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Store is not open")]
    StoreNotOpen,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Indexing failed: {0}")]
    Indexing(String),

    #[error("Run history error: {0}")]
    History(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl IndexError {
    /// Whether the coordinator records this error as a FAIL run and moves on.
    ///
    /// History failures are not: if the log cannot be written the low-water
    /// mark is unknown and the caller must stop.
    pub fn is_run_failure(&self) -> bool {
        !matches!(self, IndexError::History(_))
    }
}
