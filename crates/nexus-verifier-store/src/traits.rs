//! PolicyStore trait: the persistence contract for verification policy.
//!
//! The store holds three pieces of state: the hardware allowlist, the
//! approved-firmware set, and the per-hardware replay counter. Only the
//! counter is written on the verification path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nexus_verifier_core::{FirmwareHash, HardwareId};

use crate::error::Result;

/// Outcome of a compare-and-set counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// The counter was stored. `previous` is the value it replaced (0 if none).
    Advanced { previous: u64 },
    /// The stored counter was already `>=` the proposed one. Nothing was written.
    Stale { current: u64 },
}

impl CounterUpdate {
    /// Check if the update was applied.
    pub fn is_advanced(&self) -> bool {
        matches!(self, CounterUpdate::Advanced { .. })
    }
}

/// Status of a single hardware node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub hardware_identity: HardwareId,
    pub authorized: bool,
    /// Label given at authorization. `None` if not currently authorized.
    pub label: Option<String>,
    /// Highest accepted counter (0 if none).
    pub last_counter: u64,
}

/// An authorized node and its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedNode {
    pub hardware_identity: HardwareId,
    pub label: String,
}

/// A recorded replay counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub hardware_identity: HardwareId,
    pub last_counter: u64,
}

/// Complete, consistent copy of the policy state.
///
/// Entries are sorted by identifier so two snapshots of the same state
/// compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub authorized_nodes: Vec<AuthorizedNode>,
    pub approved_firmware: Vec<FirmwareHash>,
    pub counters: Vec<CounterEntry>,
}

impl PolicySnapshot {
    /// Sort all entries into canonical order.
    pub fn normalize(&mut self) {
        self.authorized_nodes
            .sort_by(|a, b| a.hardware_identity.cmp(&b.hardware_identity));
        self.approved_firmware.sort();
        self.counters
            .sort_by(|a, b| a.hardware_identity.cmp(&b.hardware_identity));
    }
}

/// The PolicyStore trait: async interface for verification policy.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
///
/// # Concurrency
///
/// - Reads may run fully in parallel and observe some consistent state.
/// - [`PolicyStore::record_counter`] is atomic per hardware identity: the
///   comparison against the stored value and the write happen in one step.
/// - Administrative writes may race with reads.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Verification Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Check if a hardware identity is on the allowlist.
    async fn is_authorized(&self, hw: &HardwareId) -> Result<bool>;

    /// Get the label of an authorized node.
    async fn node_label(&self, hw: &HardwareId) -> Result<Option<String>>;

    /// Check if a firmware hash is approved.
    async fn is_firmware_approved(&self, fw: &FirmwareHash) -> Result<bool>;

    /// Highest accepted counter for a hardware identity (0 if none).
    async fn last_counter(&self, hw: &HardwareId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Verification Write
    // ─────────────────────────────────────────────────────────────────────────

    /// Store `counter` for `hw` if and only if it is strictly greater than the
    /// stored value at commit time.
    ///
    /// Must only be called after a full accept decision.
    async fn record_counter(&self, hw: &HardwareId, counter: u64) -> Result<CounterUpdate>;

    // ─────────────────────────────────────────────────────────────────────────
    // Governance Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a node to the allowlist, or relabel it if already present.
    async fn authorize_node(&self, hw: &HardwareId, label: &str) -> Result<()>;

    /// Remove a node from the allowlist.
    ///
    /// Returns `true` if the node was present. Its counter is kept.
    async fn revoke_node(&self, hw: &HardwareId) -> Result<bool>;

    /// Add a firmware hash to the approved set.
    async fn approve_firmware(&self, fw: &FirmwareHash) -> Result<()>;

    /// Remove a firmware hash from the approved set.
    ///
    /// Returns `true` if the hash was present.
    async fn revoke_firmware(&self, fw: &FirmwareHash) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Combined status of one node.
    async fn node_status(&self, hw: &HardwareId) -> Result<NodeStatus>;

    /// A consistent copy of the full policy state.
    async fn snapshot(&self) -> Result<PolicySnapshot>;
}
