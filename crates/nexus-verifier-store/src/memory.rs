//! In-memory implementation of the PolicyStore trait.
//!
//! Same semantics as SQLite but nothing survives a restart. Used by tests and
//! by deployments that load their policy from a snapshot at startup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use nexus_verifier_core::{FirmwareHash, HardwareId};

use crate::error::{Result, StoreError};
use crate::traits::{
    AuthorizedNode, CounterEntry, CounterUpdate, NodeStatus, PolicySnapshot, PolicyStore,
};

/// In-memory policy store.
///
/// All state sits behind one RwLock, so the compare-and-set in
/// `record_counter` is a single critical section.
pub struct MemoryPolicyStore {
    inner: RwLock<MemoryPolicyInner>,
}

#[derive(Default)]
struct MemoryPolicyInner {
    /// Allowlist: hardware identity -> label.
    nodes: BTreeMap<HardwareId, String>,

    /// Approved firmware set.
    firmware: BTreeSet<FirmwareHash>,

    /// Highest accepted counter per hardware identity.
    counters: HashMap<HardwareId, u64>,
}

impl MemoryPolicyStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryPolicyInner::default()),
        }
    }

    /// Create a store holding the state captured in `snapshot`.
    pub fn from_snapshot(snapshot: &PolicySnapshot) -> Self {
        let inner = MemoryPolicyInner {
            nodes: snapshot
                .authorized_nodes
                .iter()
                .map(|n| (n.hardware_identity, n.label.clone()))
                .collect(),
            firmware: snapshot.approved_firmware.iter().copied().collect(),
            counters: snapshot
                .counters
                .iter()
                .map(|c| (c.hardware_identity, c.last_counter))
                .collect(),
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryPolicyInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryPolicyInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn is_authorized(&self, hw: &HardwareId) -> Result<bool> {
        Ok(self.read()?.nodes.contains_key(hw))
    }

    async fn node_label(&self, hw: &HardwareId) -> Result<Option<String>> {
        Ok(self.read()?.nodes.get(hw).cloned())
    }

    async fn is_firmware_approved(&self, fw: &FirmwareHash) -> Result<bool> {
        Ok(self.read()?.firmware.contains(fw))
    }

    async fn last_counter(&self, hw: &HardwareId) -> Result<u64> {
        Ok(self.read()?.counters.get(hw).copied().unwrap_or(0))
    }

    async fn record_counter(&self, hw: &HardwareId, counter: u64) -> Result<CounterUpdate> {
        let mut inner = self.write()?;
        let current = inner.counters.get(hw).copied().unwrap_or(0);

        if counter > current {
            inner.counters.insert(*hw, counter);
            Ok(CounterUpdate::Advanced { previous: current })
        } else {
            Ok(CounterUpdate::Stale { current })
        }
    }

    async fn authorize_node(&self, hw: &HardwareId, label: &str) -> Result<()> {
        self.write()?.nodes.insert(*hw, label.to_string());
        Ok(())
    }

    async fn revoke_node(&self, hw: &HardwareId) -> Result<bool> {
        Ok(self.write()?.nodes.remove(hw).is_some())
    }

    async fn approve_firmware(&self, fw: &FirmwareHash) -> Result<()> {
        self.write()?.firmware.insert(*fw);
        Ok(())
    }

    async fn revoke_firmware(&self, fw: &FirmwareHash) -> Result<bool> {
        Ok(self.write()?.firmware.remove(fw))
    }

    async fn node_status(&self, hw: &HardwareId) -> Result<NodeStatus> {
        let inner = self.read()?;
        let label = inner.nodes.get(hw).cloned();
        Ok(NodeStatus {
            hardware_identity: *hw,
            authorized: label.is_some(),
            label,
            last_counter: inner.counters.get(hw).copied().unwrap_or(0),
        })
    }

    async fn snapshot(&self) -> Result<PolicySnapshot> {
        let inner = self.read()?;
        let mut snapshot = PolicySnapshot {
            authorized_nodes: inner
                .nodes
                .iter()
                .map(|(hw, label)| AuthorizedNode {
                    hardware_identity: *hw,
                    label: label.clone(),
                })
                .collect(),
            approved_firmware: inner.firmware.iter().copied().collect(),
            counters: inner
                .counters
                .iter()
                .map(|(hw, c)| CounterEntry {
                    hardware_identity: *hw,
                    last_counter: *c,
                })
                .collect(),
        };
        snapshot.normalize();
        Ok(snapshot)
    }
}
