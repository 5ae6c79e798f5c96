//! # kvcell - An Embedded Single-Owner Key-Value Store
//!
//! kvcell is a strongly-consistent key-value store that lives next to one
//! logical owner and persists its entries in SQLite. Each key maps to a
//! string or binary value with an optional absolute expiration time.
//!
//! ## Features
//!
//! - **Embedded**: one SQLite file (or an in-memory database), no server
//! - **Binary-safe**: raw bytes round-trip through a text column as hex
//! - **Absolute Expiry**: entries expire at a fixed Unix time; expired
//!   entries disappear from reads at once and are swept from disk later
//! - **Single Owner**: one actor thread owns the connection, so operations
//!   never interleave and reads always observe earlier writes
//!
//! ## Quick Start
//!
//! ```
//! use kvcell::{KvStore, ListOptions, StoreConfig, Value};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = KvStore::open(StoreConfig::memory()).await.unwrap();
//!
//! // Plain and binary values
//! store.put("name", "Ariz", None).await.unwrap();
//! store.put("blob", vec![0x00u8, 0xff, 0x10], None).await.unwrap();
//!
//! // Expire one hour from now
//! store.put_with_ttl("session", "token123", Duration::from_secs(3600)).await.unwrap();
//!
//! assert_eq!(store.get("name").await.unwrap(), Some(Value::from("Ariz")));
//! let keys = store.list(ListOptions::new().prefix("s")).await.unwrap();
//! assert!(keys.contains_key("session"));
//!
//! store.close().await.unwrap();
//! # });
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: schema bootstrap, value codec, expiry policy, SQL engine and actor
//! - [`config`]: store configuration
//! - [`clock`]: time sources used for expiry
//! - [`error`]: the crate error type
//!
//! ## Design Highlights
//!
//! ### Lazy + Throttled Expiry
//!
//! Keys with an expiration are handled in two ways:
//! 1. **Filter**: every read carries the live predicate, so an expired key
//!    reads as absent the moment its deadline passes
//! 2. **Sweep**: writes trigger a `DELETE` of expired rows at most once per
//!    cleanup interval (one day by default), run after the write itself
//!
//! ### Deferred Writes
//!
//! Writes return once queued. [`KvStore::flush`] waits for all queued work,
//! and closing or dropping the store completes every queued write first.

pub mod clock;
pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, StoreLocation};
pub use error::{Result, StoreError};
pub use storage::{KvStore, ListOptions, SqliteStore, StoreStats, Value, WriteOutcome};

/// The database file used when none is given
pub const DEFAULT_DB_PATH: &str = "kvcell.db";

/// Version of kvcell
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
