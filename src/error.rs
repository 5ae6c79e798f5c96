//! Error Types
//!
//! Every fallible operation in kvcell returns [`StoreError`]. Missing and
//! expired keys are not errors: reads report them as `None`, and writes of an
//! already-expired entry report [`crate::storage::WriteOutcome::Rejected`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening or using a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A statement against the backing table failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schema could not be created. The store instance is unusable.
    #[error("schema bootstrap failed: {source}")]
    Bootstrap {
        #[source]
        source: rusqlite::Error,
    },

    /// The database was written by a newer, unknown schema version.
    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedSchema { found: i64, expected: i64 },

    /// A binary value stored as hex could not be decoded.
    #[error("invalid hex value: {0}")]
    Codec(#[from] hex::FromHexError),

    /// A row holds data the store does not understand.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The database directory could not be prepared.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store configuration is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The actor thread could not be started.
    #[error("failed to spawn store actor: {0}")]
    Spawn(#[source] std::io::Error),

    /// The actor owning the store is no longer running.
    #[error("store actor has stopped")]
    ActorStopped,

    /// The actor thread panicked.
    #[error("store actor panicked")]
    ActorPanicked,
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
