//! Error types for the migration ledger.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to open or create the database file.
    #[error("Failed to open ledger at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Another process holds the ledger lock.
    #[error("Another migration is already using the ledger (lock: {})", path.display())]
    Locked { path: PathBuf },

    #[error("Failed to create ledger lock {}: {source}", path.display())]
    LockFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Ledger migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    #[error("Ledger query failed: {0}")]
    Query(String),

    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("Ledger schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StateError {
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
