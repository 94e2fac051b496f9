//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration is a SQL batch that
//! moves the schema from version N to N+1.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Connection pragmas applied on every open.
///
/// `synchronous = FULL` so an accepted counter is on disk before the accept
/// decision is returned.
pub const CONNECTION_PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = FULL;
PRAGMA busy_timeout = 5000;
";

/// Initialize or migrate the database schema.
///
/// Idempotent: it can be called any number of times.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = schema_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Highest applied migration version (0 for a fresh database).
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: allowlist, firmware set and replay counters.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Hardware allowlist
        CREATE TABLE authorized_nodes (
            hardware_identity BLOB PRIMARY KEY,   -- 32 bytes
            label TEXT NOT NULL,
            authorized_at INTEGER NOT NULL
        );

        -- Governance-approved firmware builds
        CREATE TABLE approved_firmware (
            firmware_hash BLOB PRIMARY KEY,       -- 32 bytes
            approved_at INTEGER NOT NULL
        );

        -- Replay protection. last_counter is an 8-byte big-endian BLOB so
        -- SQLite's memcmp ordering matches unsigned 64-bit ordering.
        CREATE TABLE counters (
            hardware_identity BLOB PRIMARY KEY,   -- 32 bytes
            last_counter BLOB NOT NULL CHECK (length(last_counter) = 8),
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
