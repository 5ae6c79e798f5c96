//! SQLite Storage Engine
//!
//! [`SqliteStore`] implements the key-value operations as SQL statements
//! against the bootstrapped `kv` table, composed with the value codec and the
//! expiry policy.
//!
//! ## Design Decisions
//!
//! 1. **Single owner**: the store holds one connection and is not shared.
//!    Mutations take `&mut self`; concurrent callers go through
//!    [`crate::storage::KvStore`], which serializes them on one actor thread.
//! 2. **Filter, then sweep**: reads never delete. Expired rows are hidden by
//!    the live predicate and removed later by a throttled sweep.
//! 3. **Deferred sweep**: a write only marks a sweep as pending. The owner
//!    runs it with [`SqliteStore::run_pending_sweep`] once the write has been
//!    handled, so a sweep never delays the write that triggered it.
//!
//! ## Schema
//!
//! ```text
//! kv(key TEXT PRIMARY KEY, val TEXT, ttl INTEGER, vtype INTEGER)
//!          │                 │          │            └─ 0 = string, 1 = hex-encoded bytes
//!          │                 │          └─ absolute expiry in unix seconds, 0 = never
//!          │                 └─ encoded value
//!          └─ unique key, upserted on write
//! ```

use crate::clock::Clock;
use crate::config::{StoreConfig, StoreLocation};
use crate::error::{Result, StoreError};
use crate::storage::codec::{self, Value, ValueKind};
use crate::storage::expiry::{self, SweepSchedule, NEVER_EXPIRES, SWEEP_SQL};
use crate::storage::schema::{self, SchemaState};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Largest number of entries a single `list` returns.
pub const MAX_LIST_LIMIT: i64 = 1000;

/// A prefix equal to this wildcard disables prefix filtering altogether.
pub const MATCH_ALL: &str = "%";

const GET_SQL: &str = "SELECT val, vtype FROM kv WHERE key = ?1 AND (ttl = 0 OR ttl >= ?2)";

const UPSERT_SQL: &str = "INSERT INTO kv (key, val, ttl, vtype) VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (key) DO UPDATE SET val = excluded.val, ttl = excluded.ttl, vtype = excluded.vtype";

const DELETE_SQL: &str = "DELETE FROM kv WHERE key = ?1";

const CLEAR_SQL: &str = "DELETE FROM kv";

// ?2 skips the expiry filter, a NULL ?3 skips the prefix filter.
const LIST_SQL: &str = "SELECT key, ttl FROM kv
     WHERE (?2 OR ttl = 0 OR ttl >= ?1)
       AND (?3 IS NULL OR key LIKE ?3 ESCAPE '\\')
     LIMIT ?4";

/// Result of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write reached storage.
    Applied,
    /// The entry was already expired; nothing was written.
    Rejected,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Options for [`SqliteStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix. `None` or [`MATCH_ALL`] match every key.
    pub prefix: Option<String>,
    /// Maximum entries returned, clamped to `1..=1000`. Defaults to 1000.
    pub limit: Option<i64>,
    /// Include entries whose expiry has passed but which have not been swept.
    pub ignore_expiry: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ignore_expiry(mut self, ignore: bool) -> Self {
        self.ignore_expiry = ignore;
        self
    }

    /// The limit actually applied to the query.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(MAX_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    /// The LIKE pattern for the prefix, or `None` when every key matches.
    fn like_pattern(&self) -> Option<String> {
        match self.prefix.as_deref() {
            None | Some(MATCH_ALL) => None,
            Some(prefix) => Some(format!("{}%", escape_like(prefix))),
        }
    }
}

/// Escapes LIKE metacharacters so a prefix matches literally.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub puts: u64,
    pub rejected_puts: u64,
    pub deletes: u64,
    pub clears: u64,
    pub lists: u64,
    pub sweeps: u64,
    pub swept_rows: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    rejected_puts: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
    lists: AtomicU64,
    sweeps: AtomicU64,
    swept_rows: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StoreStats {
        StoreStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            rejected_puts: self.rejected_puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            lists: self.lists.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            swept_rows: self.swept_rows.load(Ordering::Relaxed),
        }
    }
}

/// A key-value store backed by one SQLite connection.
///
/// A `SqliteStore` only exists once its schema is ready: [`SqliteStore::open`]
/// bootstraps before returning, so every operation runs against a complete
/// schema.
///
/// # Example
///
/// ```
/// use kvcell::storage::{ListOptions, SqliteStore, Value};
/// use kvcell::StoreConfig;
///
/// let mut store = SqliteStore::open(&StoreConfig::memory()).unwrap();
///
/// store.put("name", Value::from("Ariz"), None).unwrap();
/// assert_eq!(store.get("name").unwrap(), Some(Value::from("Ariz")));
///
/// store.put("bin", Value::from(vec![0x00, 0xff]), None).unwrap();
/// let listed = store.list(&ListOptions::new().prefix("b")).unwrap();
/// assert_eq!(listed.get("bin"), Some(&0));
/// ```
pub struct SqliteStore {
    conn: Connection,
    clock: Arc<dyn Clock>,
    schedule: SweepSchedule,
    sweep_pending: bool,
    counters: Counters,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("schedule", &self.schedule)
            .field("sweep_pending", &self.sweep_pending)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens the database described by `config` and bootstraps its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent directory of a database file cannot be created
    /// - The database cannot be opened or configured
    /// - Schema bootstrap fails, which leaves no usable store
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut conn = match &config.location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let conn = Connection::open(path)?;
                // Racing opens of a new file contend for the WAL switch.
                conn.busy_timeout(config.busy_timeout)?;
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(path = %path.display(), journal_mode = %mode, "Opened database file");
                conn
            }
            StoreLocation::Memory => Connection::open_in_memory()?,
        };

        conn.busy_timeout(config.busy_timeout)?;
        // Prefix matching must not fold ASCII case.
        conn.pragma_update(None, "case_sensitive_like", true)?;

        let state = schema::bootstrap(&mut conn)?;
        info!(
            location = ?config.location,
            created = state == SchemaState::Created,
            cleanup_interval_secs = config.cleanup_interval.as_secs(),
            "Store opened"
        );

        Ok(Self {
            conn,
            clock: Arc::clone(&config.clock),
            schedule: SweepSchedule::new(config.cleanup_interval),
            sweep_pending: false,
            counters: Counters::default(),
        })
    }

    /// Current Unix time in seconds, as seen by this store.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Returns the live value for `key`, or `None` if it is missing or expired.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Counters::bump(&self.counters.gets);

        let row = self
            .conn
            .prepare_cached(GET_SQL)?
            .query_row(params![key, self.now()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?;

        match row {
            Some((raw, kind)) => Ok(Some(codec::decode(raw, ValueKind::try_from(kind)?)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// `expires_at` is an absolute Unix time in seconds; `None` or `Some(0)`
    /// means the entry never expires. An expiration already in the past
    /// drops the write and returns [`WriteOutcome::Rejected`].
    pub fn put(
        &mut self,
        key: &str,
        value: Value,
        expires_at: Option<i64>,
    ) -> Result<WriteOutcome> {
        let now = self.now();
        let expires_at = expires_at.unwrap_or(NEVER_EXPIRES);

        if expiry::is_rejected(expires_at, now) {
            Counters::bump(&self.counters.rejected_puts);
            debug!(key, expires_at, now, "Dropped write of already expired entry");
            return Ok(WriteOutcome::Rejected);
        }

        let (raw, kind) = codec::encode(&value);
        self.conn
            .prepare_cached(UPSERT_SQL)?
            .execute(params![key, raw, expires_at, kind.as_i64()])?;

        Counters::bump(&self.counters.puts);
        trace!(key, expires_at, ?kind, "Put");
        Ok(self.write_applied(now))
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    pub fn put_with_ttl(
        &mut self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<WriteOutcome> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = self.now().saturating_add(ttl);
        self.put(key, value, Some(expires_at))
    }

    /// Removes `key`. Deleting a missing key is a no-op.
    pub fn delete(&mut self, key: &str) -> Result<WriteOutcome> {
        let removed = self.conn.prepare_cached(DELETE_SQL)?.execute(params![key])?;

        Counters::bump(&self.counters.deletes);
        trace!(key, removed, "Delete");
        Ok(self.write_applied(self.now()))
    }

    /// Removes every entry.
    pub fn clear(&mut self) -> Result<WriteOutcome> {
        let removed = self.conn.execute(CLEAR_SQL, [])?;

        Counters::bump(&self.counters.clears);
        debug!(removed, "Cleared store");
        Ok(self.write_applied(self.now()))
    }

    /// Lists matching keys with their expiration (`0` = never).
    ///
    /// Result order follows the storage engine and carries no meaning.
    pub fn list(&self, options: &ListOptions) -> Result<BTreeMap<String, i64>> {
        Counters::bump(&self.counters.lists);

        let pattern = options.like_pattern();
        let mut stmt = self.conn.prepare_cached(LIST_SQL)?;
        let rows = stmt.query_map(
            params![
                self.now(),
                options.ignore_expiry,
                pattern,
                options.effective_limit()
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let (key, expires_at) = row?;
            entries.insert(key, expires_at);
        }
        Ok(entries)
    }

    /// Changes the sweep interval.
    ///
    /// Non-positive values are ignored and `false` is returned. With
    /// `reset_now`, the next sweep is scheduled one interval from now.
    pub fn set_cleanup_interval(&mut self, seconds: i64, reset_now: bool) -> bool {
        let now = self.now();
        let accepted = self.schedule.set_interval(seconds, reset_now, now);
        if accepted {
            debug!(
                interval_secs = seconds,
                next_sweep = self.schedule.next_sweep(),
                "Cleanup interval updated"
            );
        }
        accepted
    }

    /// The sweep throttle.
    pub fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }

    /// True when a write has made a sweep due and it has not run yet.
    pub fn has_pending_sweep(&self) -> bool {
        self.sweep_pending
    }

    /// Runs the sweep a previous write made due, if any.
    ///
    /// Returns the number of rows removed, or `None` when nothing was pending.
    pub fn run_pending_sweep(&mut self) -> Result<Option<u64>> {
        if !self.sweep_pending {
            return Ok(None);
        }
        self.sweep().map(Some)
    }

    /// Deletes every row whose expiry has passed, regardless of the schedule.
    pub fn sweep(&mut self) -> Result<u64> {
        self.sweep_pending = false;

        let now = self.now();
        let removed = self.conn.prepare_cached(SWEEP_SQL)?.execute(params![now])? as u64;

        Counters::bump(&self.counters.sweeps);
        self.counters
            .swept_rows
            .fetch_add(removed, Ordering::Relaxed);

        if removed > 0 {
            debug!(removed, now, "Expired entries swept");
        } else {
            trace!(now, "Sweep found nothing to remove");
        }
        Ok(removed)
    }

    /// Number of rows on disk, including expired rows not yet swept.
    pub fn len_physical(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    fn write_applied(&mut self, now: i64) -> WriteOutcome {
        if self.schedule.take_due(now) {
            self.sweep_pending = true;
        }
        WriteOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use bytes::Bytes;

    const T0: i64 = 1_700_000_000;

    fn store_at(clock: &ManualClock) -> SqliteStore {
        let config = StoreConfig::memory().with_clock(Arc::new(clock.clone()));
        SqliteStore::open(&config).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        assert_eq!(
            store.put("name", Value::from("Ariz"), None).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(store.get("name").unwrap(), Some(Value::from("Ariz")));
    }

    #[test]
    fn test_get_nonexistent() {
        let clock = ManualClock::new(T0);
        let store = store_at(&clock);
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing_row() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("a", Value::from("1"), None).unwrap();
        store.put("a", Value::from("2"), Some(T0 + 60)).unwrap();

        assert_eq!(store.get("a").unwrap(), Some(Value::from("2")));
        assert_eq!(store.len_physical().unwrap(), 1);
        assert_eq!(
            store.list(&ListOptions::new()).unwrap().get("a"),
            Some(&(T0 + 60))
        );
    }

    #[test]
    fn test_put_replaces_kind() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("k", Value::from(vec![0x00, 0xFF, 0x10]), None).unwrap();
        assert_eq!(
            store.get("k").unwrap().unwrap().as_bytes(),
            &[0x00, 0xFF, 0x10]
        );

        store.put("k", Value::from("text"), None).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Value::from("text")));
    }

    #[test]
    fn test_binary_round_trip() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store
            .put("x", Value::from(Bytes::from_static(&[0x00, 0xFF, 0x10])), None)
            .unwrap();
        store.put("empty", Value::from(Vec::new()), None).unwrap();

        let x = store.get("x").unwrap().unwrap();
        assert_eq!(x.into_bytes(), Bytes::from_static(&[0x00, 0xFF, 0x10]));

        let empty = store.get("empty").unwrap().unwrap();
        assert_eq!(empty, Value::Binary(Bytes::new()));
    }

    #[test]
    fn test_expired_write_is_dropped() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        assert_eq!(
            store.put("k", Value::from("v"), Some(T0 - 1)).unwrap(),
            WriteOutcome::Rejected
        );
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.len_physical().unwrap(), 0);
        assert_eq!(store.stats().rejected_puts, 1);
        assert!(!store.has_pending_sweep());
    }

    #[test]
    fn test_expired_write_leaves_existing_value() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("k", Value::from("old"), None).unwrap();
        store.put("k", Value::from("new"), Some(T0 - 10)).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(Value::from("old")));
    }

    #[test]
    fn test_expiry_boundary() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        // Expiring exactly now is still a valid write and still live
        assert!(store.put("k", Value::from("v"), Some(T0)).unwrap().is_applied());
        assert!(store.get("k").unwrap().is_some());

        clock.advance(1);
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_never_expires() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("forever", Value::from("v"), Some(0)).unwrap();
        clock.advance(10 * 365 * 86_400);

        assert_eq!(store.get("forever").unwrap(), Some(Value::from("v")));
        store.sweep().unwrap();
        assert_eq!(store.get("forever").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn test_put_with_ttl() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store
            .put_with_ttl("session", Value::from("token"), Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            store.list(&ListOptions::new()).unwrap().get("session"),
            Some(&(T0 + 60))
        );

        clock.advance(61);
        assert_eq!(store.get("session").unwrap(), None);
    }

    #[test]
    fn test_put_with_huge_ttl_never_wraps() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        let outcome = store
            .put_with_ttl("forever", Value::from("v"), Duration::from_secs(u64::MAX))
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(
            store.list(&ListOptions::new()).unwrap().get("forever"),
            Some(&i64::MAX)
        );
        assert_eq!(store.get("forever").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn test_delete() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("key", Value::from("value"), None).unwrap();
        assert!(store.delete("key").unwrap().is_applied());
        assert_eq!(store.get("key").unwrap(), None);

        // Missing key is a silent no-op
        assert!(store.delete("key").unwrap().is_applied());
    }

    #[test]
    fn test_clear() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("key1", Value::from("value1"), None).unwrap();
        store.put("key2", Value::from("value2"), Some(T0 + 5)).unwrap();
        assert_eq!(store.len_physical().unwrap(), 2);

        store.clear().unwrap();
        assert_eq!(store.len_physical().unwrap(), 0);
        assert!(store.list(&ListOptions::new()).unwrap().is_empty());
    }

    #[test]
    fn test_list_prefix_and_limit() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        for i in 0..20 {
            store
                .put(&format!("user:{i:02}"), Value::from("u"), None)
                .unwrap();
        }
        store.put("other", Value::from("o"), None).unwrap();

        let users = store.list(&ListOptions::new().prefix("user:")).unwrap();
        assert_eq!(users.len(), 20);
        assert!(users.keys().all(|k| k.starts_with("user:")));

        let limited = store
            .list(&ListOptions::new().prefix("user:").limit(5))
            .unwrap();
        assert_eq!(limited.len(), 5);
        assert!(limited.keys().all(|k| k.starts_with("user:")));

        assert_eq!(store.list(&ListOptions::new()).unwrap().len(), 21);
    }

    #[test]
    fn test_list_limit_clamped() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        for i in 0..1005 {
            store.put(&format!("k{i}"), Value::from("v"), None).unwrap();
        }

        assert_eq!(store.list(&ListOptions::new()).unwrap().len(), 1000);
        assert_eq!(
            store.list(&ListOptions::new().limit(5000)).unwrap().len(),
            1000
        );
        assert_eq!(store.list(&ListOptions::new().limit(0)).unwrap().len(), 1);
        assert_eq!(store.list(&ListOptions::new().limit(-3)).unwrap().len(), 1);
    }

    #[test]
    fn test_list_wildcard_and_empty_prefix() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("alpha", Value::from("1"), None).unwrap();
        store.put("%literal", Value::from("2"), None).unwrap();

        let wildcard = store.list(&ListOptions::new().prefix(MATCH_ALL)).unwrap();
        assert_eq!(wildcard.len(), 2);

        let empty = store.list(&ListOptions::new().prefix("")).unwrap();
        assert_eq!(empty.len(), 2);

        // Longer prefixes containing the wildcard match it literally
        let literal = store.list(&ListOptions::new().prefix("%l")).unwrap();
        assert_eq!(literal.len(), 1);
        assert!(literal.contains_key("%literal"));
    }

    #[test]
    fn test_list_prefix_is_literal_and_case_sensitive() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("a_b", Value::from("1"), None).unwrap();
        store.put("axb", Value::from("2"), None).unwrap();
        store.put("A_B", Value::from("3"), None).unwrap();
        store.put("a\\c", Value::from("4"), None).unwrap();

        let underscore = store.list(&ListOptions::new().prefix("a_")).unwrap();
        assert_eq!(underscore.keys().collect::<Vec<_>>(), vec!["a_b"]);

        let backslash = store.list(&ListOptions::new().prefix("a\\")).unwrap();
        assert_eq!(backslash.keys().collect::<Vec<_>>(), vec!["a\\c"]);
    }

    #[test]
    fn test_list_ignore_expiry() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("live", Value::from("v"), None).unwrap();
        store.put("stale", Value::from("v"), Some(T0 + 1)).unwrap();
        clock.advance(2);

        let visible = store.list(&ListOptions::new()).unwrap();
        assert!(!visible.contains_key("stale"));
        assert!(visible.contains_key("live"));

        let all = store.list(&ListOptions::new().ignore_expiry(true)).unwrap();
        assert_eq!(all.get("stale"), Some(&(T0 + 1)));
        assert_eq!(all.get("live"), Some(&0));
    }

    #[test]
    fn test_first_write_schedules_sweep() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        assert!(!store.has_pending_sweep());
        store.put("a", Value::from("1"), None).unwrap();
        assert!(store.has_pending_sweep());
        assert_eq!(store.run_pending_sweep().unwrap(), Some(0));
        assert!(!store.has_pending_sweep());

        // Within the interval nothing is scheduled
        store.put("b", Value::from("2"), None).unwrap();
        assert!(!store.has_pending_sweep());
        assert_eq!(store.run_pending_sweep().unwrap(), None);
    }

    #[test]
    fn test_reads_never_schedule_sweep() {
        let clock = ManualClock::new(T0);
        let store = store_at(&clock);

        store.get("a").unwrap();
        store.list(&ListOptions::new()).unwrap();
        assert!(!store.has_pending_sweep());
    }

    #[test]
    fn test_sweep_after_interval_reset() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("k", Value::from("v"), Some(T0 + 1)).unwrap();
        store.put("keep", Value::from("v"), None).unwrap();
        store.run_pending_sweep().unwrap();

        assert!(store.set_cleanup_interval(1, true));
        clock.advance(2);
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.len_physical().unwrap(), 2);

        store.put("trigger", Value::from("v"), None).unwrap();
        assert_eq!(store.run_pending_sweep().unwrap(), Some(1));

        let all = store.list(&ListOptions::new().ignore_expiry(true)).unwrap();
        assert!(!all.contains_key("k"));
        assert!(all.contains_key("keep"));
        assert_eq!(store.stats().swept_rows, 1);
    }

    #[test]
    fn test_set_cleanup_interval_rejects_non_positive() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        assert!(!store.set_cleanup_interval(0, true));
        assert!(!store.set_cleanup_interval(-1, false));
        assert_eq!(store.schedule().interval(), 86_400);
    }

    #[test]
    fn test_corrupt_kind_is_reported() {
        let clock = ManualClock::new(T0);
        let store = store_at(&clock);

        store
            .conn
            .execute("INSERT INTO kv VALUES ('bad', 'x', 0, 9)", [])
            .unwrap();
        assert!(matches!(
            store.get("bad"),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_stats() {
        let clock = ManualClock::new(T0);
        let mut store = store_at(&clock);

        store.put("a", Value::from("1"), None).unwrap();
        store.get("a").unwrap();
        store.get("b").unwrap();
        store.delete("a").unwrap();
        store.list(&ListOptions::new()).unwrap();

        let stats = store.stats();
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.lists, 1);
    }

    #[test]
    fn test_file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.db");
        let clock = ManualClock::new(T0);
        let config = StoreConfig::file(&path).with_clock(Arc::new(clock.clone()));

        {
            let mut store = SqliteStore::open(&config).unwrap();
            store.put("persisted", Value::from("yes"), None).unwrap();
        }

        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.get("persisted").unwrap(), Some(Value::from("yes")));
    }

    #[test]
    fn test_concurrent_opens_of_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::file(dir.path().join("kv.db"));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let config = config.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let mut store = SqliteStore::open(&config)?;
                    store.put(&format!("k{i}"), Value::from("v"), None)?;
                    Ok::<_, StoreError>(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.list(&ListOptions::new()).unwrap().len(), 8);
        let version: i64 = store
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }
}
