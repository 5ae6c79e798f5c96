//! Single-Owner Store Actor
//!
//! [`KvStore`] is the async handle applications use. It owns no database
//! state itself: every operation becomes a [`Command`] on one FIFO queue
//! consumed by a dedicated actor thread, and that thread is the only code
//! that touches the [`SqliteStore`]. This gives the mutual exclusion the store
//! needs without a lock around the connection.
//!
//! ## Actor Lifecycle
//!
//! ```text
//! 1. KvStore::open spawns the actor thread
//!        │
//!        ▼
//! 2. Actor opens the database and bootstraps the schema
//!    (the handle waits for this; failure is returned from open)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────┐
//!    │  Main Loop                           │
//!    │                                      │
//!    │  receive command ──> execute         │
//!    │        │                             │
//!    │        └─ sweep due and queue idle  │
//!    │           (or 256 commands later)?   │
//!    │               └─> run the sweep      │
//!    └──────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Last handle closed: drain queued commands, run any pending sweep
//!        │
//!        ▼
//! 5. Thread exits
//! ```
//!
//! ## Write Semantics
//!
//! `put`, `delete` and `clear` return as soon as the command is queued. The
//! actor logs a failing deferred write and keeps the first error for the next
//! [`KvStore::flush`]. Reads travel through the same queue, so a read issued
//! after a write observes it.
//!
//! A sweep made due by a write runs once the queue is idle. Under a steady
//! stream of commands it runs after at most 256 of them.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::storage::codec::Value;
use crate::storage::engine::{ListOptions, SqliteStore, StoreStats, WriteOutcome};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Commands a pending sweep may wait behind while the queue stays busy.
const MAX_SWEEP_DELAY: u32 = 256;

/// Commands sent to the store actor.
#[derive(Debug)]
enum Command {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    List {
        options: ListOptions,
        reply: oneshot::Sender<Result<BTreeMap<String, i64>>>,
    },
    Put {
        key: String,
        value: Value,
        expires_at: Option<i64>,
    },
    PutWithTtl {
        key: String,
        value: Value,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
    Clear,
    SetCleanupInterval {
        seconds: i64,
        reset_now: bool,
        reply: oneshot::Sender<bool>,
    },
    Sweep {
        reply: oneshot::Sender<Result<u64>>,
    },
    Stats {
        reply: oneshot::Sender<StoreStats>,
    },
    /// Completion barrier for everything queued before it.
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// The thread-side half: owns the store and drains the queue.
struct StoreActor {
    store: SqliteStore,
    rx: mpsc::Receiver<Command>,
    /// First deferred failure since the last flush
    deferred_error: Option<StoreError>,
    /// Commands handled while a sweep was pending
    sweep_delay: u32,
}

impl StoreActor {
    fn run(mut self) {
        info!("Store actor started");

        while let Some(command) = self.next_command() {
            self.handle_command(command);
        }

        self.run_pending_sweep();
        if let Some(e) = self.deferred_error.take() {
            warn!(error = %e, "Store actor stopped with an unreported write failure");
        }
        info!("Store actor stopped");
    }

    /// Waits for the next command, running a pending sweep when the queue is
    /// idle or the sweep has waited behind [`MAX_SWEEP_DELAY`] commands.
    fn next_command(&mut self) -> Option<Command> {
        loop {
            if !self.store.has_pending_sweep() {
                self.sweep_delay = 0;
                return self.rx.blocking_recv();
            }
            if self.sweep_delay >= MAX_SWEEP_DELAY {
                debug!(delayed = self.sweep_delay, "Running overdue sweep on a busy queue");
                self.run_pending_sweep();
                continue;
            }
            match self.rx.try_recv() {
                Ok(command) => {
                    self.sweep_delay += 1;
                    return Some(command);
                }
                Err(TryRecvError::Empty) => self.run_pending_sweep(),
                Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Get { key, reply } => {
                let _ = reply.send(self.store.get(&key));
            }
            Command::List { options, reply } => {
                let _ = reply.send(self.store.list(&options));
            }
            Command::Put {
                key,
                value,
                expires_at,
            } => {
                let result = self.store.put(&key, value, expires_at);
                self.record("put", result);
            }
            Command::PutWithTtl { key, value, ttl } => {
                let result = self.store.put_with_ttl(&key, value, ttl);
                self.record("put", result);
            }
            Command::Delete { key } => {
                let result = self.store.delete(&key);
                self.record("delete", result);
            }
            Command::Clear => {
                let result = self.store.clear();
                self.record("clear", result);
            }
            Command::SetCleanupInterval {
                seconds,
                reset_now,
                reply,
            } => {
                let _ = reply.send(self.store.set_cleanup_interval(seconds, reset_now));
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.store.sweep());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.store.stats());
            }
            Command::Flush { reply } => {
                self.run_pending_sweep();
                let result = match self.deferred_error.take() {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
        }
    }

    fn record(&mut self, op: &'static str, result: Result<WriteOutcome>) {
        match result {
            Ok(WriteOutcome::Applied) => {}
            Ok(WriteOutcome::Rejected) => debug!(op, "Write dropped by expiry policy"),
            Err(e) => self.fail(op, e),
        }
    }

    fn run_pending_sweep(&mut self) {
        if let Err(e) = self.store.run_pending_sweep() {
            self.fail("sweep", e);
        }
    }

    fn fail(&mut self, op: &'static str, e: StoreError) {
        error!(op, error = %e, "Deferred store operation failed");
        if self.deferred_error.is_none() {
            self.deferred_error = Some(e);
        }
    }
}

/// Async handle to a store owned by a dedicated actor thread.
///
/// The handle is `Send + Sync`; share it behind an `Arc` when several tasks
/// use the same store. Dropping the handle (or calling [`KvStore::close`])
/// lets the actor finish every queued operation before its thread exits.
///
/// Dropping joins the actor thread synchronously, which blocks the current
/// thread until the queue is drained. Inside an async runtime prefer
/// `close().await`, which waits on a blocking-pool thread instead.
///
/// # Example
///
/// ```
/// use kvcell::{KvStore, StoreConfig, Value};
///
/// # tokio_test::block_on(async {
/// let store = KvStore::open(StoreConfig::memory()).await.unwrap();
///
/// store.put("greeting", "hello", None).await.unwrap();
/// assert_eq!(store.get("greeting").await.unwrap(), Some(Value::from("hello")));
///
/// store.close().await.unwrap();
/// # });
/// ```
pub struct KvStore {
    tx: Option<mpsc::Sender<Command>>,
    clock: Arc<dyn Clock>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("running", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl KvStore {
    /// Opens the store and starts its actor.
    ///
    /// The schema is bootstrapped on the actor thread before any command is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the actor thread
    /// cannot be spawned, or the database cannot be opened and bootstrapped.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let clock = Arc::clone(&config.clock);

        let thread = thread::Builder::new()
            .name("kvcell-actor".to_string())
            .spawn(move || match SqliteStore::open(&config) {
                Ok(store) => {
                    let _ = ready_tx.send(Ok(()));
                    StoreActor {
                        store,
                        rx,
                        deferred_error: None,
                        sweep_delay: 0,
                    }
                    .run();
                }
                Err(e) => {
                    error!(error = %e, "Store failed to open");
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(StoreError::Spawn)?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                tx: Some(tx),
                clock,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(StoreError::ActorPanicked)
            }
        }
    }

    /// Current Unix time in seconds, from the store's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Returns the live value for `key`, or `None` if it is missing or expired.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.request(|reply| Command::Get {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    /// Queues a write of `value` under `key`.
    ///
    /// `expires_at` is an absolute Unix time in seconds (`None` = never). A
    /// write that is already expired when the actor runs it is dropped.
    pub async fn put(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        self.send(Command::Put {
            key: key.into(),
            value: value.into(),
            expires_at,
        })
        .await
    }

    /// Queues a write that expires `ttl` after the actor applies it.
    pub async fn put_with_ttl(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<()> {
        self.send(Command::PutWithTtl {
            key: key.into(),
            value: value.into(),
            ttl,
        })
        .await
    }

    /// Queues removal of `key`.
    pub async fn delete(&self, key: impl Into<String>) -> Result<()> {
        self.send(Command::Delete { key: key.into() }).await
    }

    /// Queues removal of every entry.
    pub async fn clear(&self) -> Result<()> {
        self.send(Command::Clear).await
    }

    /// Lists matching keys with their expiration (`0` = never).
    pub async fn list(&self, options: ListOptions) -> Result<BTreeMap<String, i64>> {
        self.request(|reply| Command::List { options, reply })
            .await?
    }

    /// Changes the sweep interval. Returns `false` if `seconds` is not positive.
    pub async fn set_cleanup_interval(&self, seconds: i64, reset_now: bool) -> Result<bool> {
        self.request(|reply| Command::SetCleanupInterval {
            seconds,
            reset_now,
            reply,
        })
        .await
    }

    /// Runs a sweep immediately and returns the number of rows removed.
    pub async fn sweep_now(&self) -> Result<u64> {
        self.request(|reply| Command::Sweep { reply }).await?
    }

    /// Operation counters.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Waits until everything queued so far, including a due sweep, has run.
    ///
    /// # Errors
    ///
    /// Returns the first deferred write failure since the previous flush.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    /// Finishes all queued work and stops the actor.
    ///
    /// # Errors
    ///
    /// Returns the first unreported deferred failure, or
    /// [`StoreError::ActorPanicked`] if the actor thread panicked.
    pub async fn close(mut self) -> Result<()> {
        let flushed = self.flush().await;

        self.tx.take();
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|_| StoreError::ActorPanicked)?
                .map_err(|_| StoreError::ActorPanicked)?;
        }

        debug!("Store closed");
        flushed
    }

    async fn send(&self, command: Command) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(StoreError::ActorStopped)?;
        tx.send(command)
            .await
            .map_err(|_| StoreError::ActorStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| StoreError::ActorStopped)
    }
}

impl Drop for KvStore {
    fn drop(&mut self) {
        // Closing the queue lets the actor drain it; joining waits for that.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Store actor panicked during shutdown");
            }
        }
    }
}
