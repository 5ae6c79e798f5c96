//! Store Configuration
//!
//! [`StoreConfig`] describes where a store lives and how it behaves. Defaults
//! match the documented behaviour: a daily cleanup interval and a generous
//! command queue.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between expiry sweeps (one day).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(86_400);

/// Default capacity of the actor's command queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time SQLite waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the backing database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file, created if missing.
    File(PathBuf),
    /// A private in-memory database, gone when the store is dropped.
    Memory,
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing database location
    pub location: StoreLocation,

    /// Minimum time between expiry sweeps
    pub cleanup_interval: Duration,

    /// Number of commands that can be queued before writers wait
    pub channel_capacity: usize,

    /// How long SQLite retries on a busy database
    pub busy_timeout: Duration,

    /// Source of the current time
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }
}

impl StoreConfig {
    /// Configuration for a database file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Checks the configuration before a store is opened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when the command queue has no
    /// capacity or the cleanup interval is shorter than one second.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval.as_secs() == 0 {
            return Err(StoreError::InvalidConfig(
                "cleanup_interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
