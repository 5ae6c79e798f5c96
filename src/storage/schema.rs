//! Schema Bootstrap
//!
//! The backing table and its expiry index are created exactly once per
//! database. Readiness is recorded in SQLite's `user_version` header field,
//! which lives outside the table and is cheap to read. The flag is checked
//! first; only when it is unset does bootstrap take an `IMMEDIATE`
//! transaction (exclusive write lock), check again, create the schema and set
//! the flag in the same transaction. Nothing can observe a half-built schema.

use crate::error::{Result, StoreError};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

/// Name of the backing table.
pub const TABLE: &str = "kv";

/// Value written to `user_version` once the schema exists.
pub const SCHEMA_VERSION: i64 = 1;

/// DDL for the table and its expiry index.
///
/// `IF NOT EXISTS` lets a database whose table predates the readiness flag
/// bootstrap cleanly; the flag remains the authoritative check.
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    val   TEXT NOT NULL,
    ttl   INTEGER NOT NULL,
    vtype INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS kv_ttl_idx ON kv (ttl);
"#;

/// What bootstrap found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// This call created the schema.
    Created,
    /// The schema was already in place.
    AlreadyReady,
}

fn read_flag(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn check_flag(found: i64) -> Result<Option<SchemaState>> {
    match found {
        0 => Ok(None),
        SCHEMA_VERSION => Ok(Some(SchemaState::AlreadyReady)),
        found => Err(StoreError::UnsupportedSchema {
            found,
            expected: SCHEMA_VERSION,
        }),
    }
}

fn bootstrap_failed(source: rusqlite::Error) -> StoreError {
    StoreError::Bootstrap { source }
}

/// Ensures the table and index exist.
///
/// # Errors
///
/// Returns [`StoreError::Bootstrap`] if the schema cannot be created and
/// [`StoreError::UnsupportedSchema`] if the file carries a newer schema.
/// Either is fatal for the store being opened.
pub fn bootstrap(conn: &mut Connection) -> Result<SchemaState> {
    if let Some(state) = check_flag(read_flag(conn).map_err(bootstrap_failed)?)? {
        debug!("Schema already initialized");
        return Ok(state);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(bootstrap_failed)?;

    // Another connection may have finished bootstrap while we waited for the lock.
    if let Some(state) = check_flag(read_flag(&tx).map_err(bootstrap_failed)?)? {
        tx.commit().map_err(bootstrap_failed)?;
        return Ok(state);
    }

    tx.execute_batch(SCHEMA_DDL).map_err(bootstrap_failed)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(bootstrap_failed)?;
    tx.commit().map_err(bootstrap_failed)?;

    info!(table = TABLE, version = SCHEMA_VERSION, "Schema initialized");
    Ok(SchemaState::Created)
}
