//! Storage Module
//!
//! This module provides the storage functionality for kvcell: a SQLite-backed
//! key-value table with absolute expirations, and the actor that serializes
//! access to it.
//!
//! ## Architecture
//!
//! ```text
//!   callers (any task)
//!         │  get / put / delete / clear / list
//!         ▼
//! ┌─────────────────────────────┐
//! │          KvStore            │  async handle
//! └──────────────┬──────────────┘
//!                │ FIFO command queue
//!                ▼
//! ┌─────────────────────────────┐
//! │   StoreActor (own thread)   │  single owner
//! │  ┌───────────────────────┐  │
//! │  │     SqliteStore       │  │
//! │  │  codec │ expiry │ SQL │  │
//! │  └───────────────────────┘  │
//! └─────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Schema bootstrap**: table and index created once, under an exclusive lock
//! - **Binary-safe values**: bytes are stored as lowercase hex in a text column
//! - **Absolute expiry**: expired entries are hidden from reads immediately
//! - **Throttled sweep**: writes trigger physical cleanup at most once per interval

pub mod actor;
pub mod codec;
pub mod engine;
pub mod expiry;
pub mod schema;

// Re-export commonly used types
pub use actor::KvStore;
pub use codec::{Value, ValueKind};
pub use engine::{ListOptions, SqliteStore, StoreStats, WriteOutcome, MATCH_ALL, MAX_LIST_LIMIT};
pub use expiry::{SweepSchedule, NEVER_EXPIRES};
pub use schema::SchemaState;
