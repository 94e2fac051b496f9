//! SQLite implementation of the PolicyStore trait.
//!
//! The durable backend for the verifier. Uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use nexus_verifier_core::{FirmwareHash, HardwareId};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis, CONNECTION_PRAGMAS};
use crate::traits::{
    AuthorizedNode, CounterEntry, CounterUpdate, NodeStatus, PolicySnapshot, PolicyStore,
};

/// SQLite-based policy store.
///
/// Thread-safe via an internal Mutex. Every operation runs on the blocking
/// pool so the async runtime is never stalled by disk I/O.
pub struct SqlitePolicyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePolicyStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened policy store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

fn encode_counter(counter: u64) -> [u8; 8] {
    counter.to_be_bytes()
}

fn decode_counter(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("counter blob has {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn decode_id(bytes: &[u8], column: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{column} has {} bytes", bytes.len())))
}

fn read_counter(conn: &Connection, hw: &HardwareId) -> Result<u64> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT last_counter FROM counters WHERE hardware_identity = ?1",
            params![hw.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    blob.map_or(Ok(0), |b| decode_counter(&b))
}

fn read_label(conn: &Connection, hw: &HardwareId) -> Result<Option<String>> {
    let label = conn
        .query_row(
            "SELECT label FROM authorized_nodes WHERE hardware_identity = ?1",
            params![hw.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(label)
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn is_authorized(&self, hw: &HardwareId) -> Result<bool> {
        let hw = *hw;
        self.run(move |conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM authorized_nodes WHERE hardware_identity = ?1)",
                params![hw.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn node_label(&self, hw: &HardwareId) -> Result<Option<String>> {
        let hw = *hw;
        self.run(move |conn| read_label(conn, &hw)).await
    }

    async fn is_firmware_approved(&self, fw: &FirmwareHash) -> Result<bool> {
        let fw = *fw;
        self.run(move |conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM approved_firmware WHERE firmware_hash = ?1)",
                params![fw.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn last_counter(&self, hw: &HardwareId) -> Result<u64> {
        let hw = *hw;
        self.run(move |conn| read_counter(conn, &hw)).await
    }

    async fn record_counter(&self, hw: &HardwareId, counter: u64) -> Result<CounterUpdate> {
        let hw = *hw;
        self.run(move |conn| {
            // IMMEDIATE takes the write lock up front, so no other connection
            // can commit between the read and the write.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = read_counter(&tx, &hw)?;

            if counter <= current {
                tx.rollback()?;
                return Ok(CounterUpdate::Stale { current });
            }

            let changed = tx.execute(
                "INSERT INTO counters (hardware_identity, last_counter, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(hardware_identity) DO UPDATE
                 SET last_counter = excluded.last_counter, updated_at = excluded.updated_at
                 WHERE excluded.last_counter > counters.last_counter",
                params![
                    hw.as_bytes().as_slice(),
                    encode_counter(counter).as_slice(),
                    now_millis()
                ],
            )?;
            if changed != 1 {
                return Err(StoreError::InvalidData(format!(
                    "counter upsert changed {changed} rows"
                )));
            }

            tx.commit()?;
            Ok(CounterUpdate::Advanced { previous: current })
        })
        .await
    }

    async fn authorize_node(&self, hw: &HardwareId, label: &str) -> Result<()> {
        let hw = *hw;
        let label = label.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO authorized_nodes (hardware_identity, label, authorized_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(hardware_identity) DO UPDATE SET label = excluded.label",
                params![hw.as_bytes().as_slice(), label, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn revoke_node(&self, hw: &HardwareId) -> Result<bool> {
        let hw = *hw;
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM authorized_nodes WHERE hardware_identity = ?1",
                params![hw.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn approve_firmware(&self, fw: &FirmwareHash) -> Result<()> {
        let fw = *fw;
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO approved_firmware (firmware_hash, approved_at)
                 VALUES (?1, ?2)",
                params![fw.as_bytes().as_slice(), now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn revoke_firmware(&self, fw: &FirmwareHash) -> Result<bool> {
        let fw = *fw;
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM approved_firmware WHERE firmware_hash = ?1",
                params![fw.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn node_status(&self, hw: &HardwareId) -> Result<NodeStatus> {
        let hw = *hw;
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let label = read_label(&tx, &hw)?;
            let last_counter = read_counter(&tx, &hw)?;
            tx.commit()?;
            Ok(NodeStatus {
                hardware_identity: hw,
                authorized: label.is_some(),
                label,
                last_counter,
            })
        })
        .await
    }

    async fn snapshot(&self) -> Result<PolicySnapshot> {
        self.run(|conn| {
            let tx = conn.transaction()?;

            let nodes = {
                let mut stmt = tx.prepare(
                    "SELECT hardware_identity, label FROM authorized_nodes
                     ORDER BY hardware_identity",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.into_iter()
                    .map(|(id, label)| {
                        Ok(AuthorizedNode {
                            hardware_identity: HardwareId(decode_id(&id, "hardware_identity")?),
                            label,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            let firmware = {
                let mut stmt = tx
                    .prepare("SELECT firmware_hash FROM approved_firmware ORDER BY firmware_hash")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.iter()
                    .map(|fw| Ok(FirmwareHash(decode_id(fw, "firmware_hash")?)))
                    .collect::<Result<Vec<_>>>()?
            };

            let counters = {
                let mut stmt = tx.prepare(
                    "SELECT hardware_identity, last_counter FROM counters
                     ORDER BY hardware_identity",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.into_iter()
                    .map(|(id, counter)| {
                        Ok(CounterEntry {
                            hardware_identity: HardwareId(decode_id(&id, "hardware_identity")?),
                            last_counter: decode_counter(&counter)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            tx.commit()?;

            let mut snapshot = PolicySnapshot {
                authorized_nodes: nodes,
                approved_firmware: firmware,
                counters,
            };
            snapshot.normalize();
            Ok(snapshot)
        })
        .await
    }
}
