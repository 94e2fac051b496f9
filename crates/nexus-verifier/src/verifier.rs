//! The Verifier: the four ordered checks and the counter commit.
//!
//! ```text
//! identity ──► firmware ──► monotonic ──► digest ──► record_counter (CAS)
//!    │            │            │            │              │
//!    ▼            ▼            ▼            ▼              ▼
//! Unauthorized Unapproved    Replay     Mismatch     Replay (lost race)
//! ```
//!
//! Checks are fail-fast in that order. Nothing is written unless all four
//! pass, and the monotonicity check is repeated atomically by the store at
//! commit time.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use nexus_verifier_core::{
    parse_json_receipt, DigestEngine, DigestLayout, FirmwareHash, HardwareId, KeccakDigestEngine,
    Receipt,
};
use nexus_verifier_store::{CounterUpdate, NodeStatus, PolicySnapshot, PolicyStore, StoreError};

use crate::config::VerifierConfig;
use crate::error::{Result, VerifierError};

/// Why a receipt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The receipt could not be parsed.
    MalformedReceipt,
    /// Hardware identity is not on the allowlist.
    UnauthorizedHardware,
    /// Firmware hash is absent or not approved.
    UnapprovedFirmware,
    /// Counter is not strictly greater than the last accepted one.
    ReplayDetected,
    /// Recomputed digest differs from the claimed one.
    DigestMismatch,
    /// Receipt declares a digest layout other than the deployment's.
    LayoutMismatch,
}

impl RejectReason {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedReceipt => "malformed_receipt",
            RejectReason::UnauthorizedHardware => "unauthorized_hardware",
            RejectReason::UnapprovedFirmware => "unapproved_firmware",
            RejectReason::ReplayDetected => "replay_detected",
            RejectReason::DigestMismatch => "digest_mismatch",
            RejectReason::LayoutMismatch => "layout_mismatch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Known unless the receipt was too malformed to read it.
    pub hardware_identity: Option<HardwareId>,
    /// Known unless the receipt was too malformed to read it.
    pub counter: Option<u64>,
    /// Human-readable detail for audit logs.
    pub detail: String,
}

/// An accepted receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acceptance {
    pub hardware_identity: HardwareId,
    pub counter: u64,
    /// The counter this acceptance replaced (0 for a node's first receipt).
    pub previous_counter: u64,
}

/// Outcome of verifying one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted(Acceptance),
    Rejected(Rejection),
}

impl Verdict {
    /// Check if the receipt was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    /// The rejection reason, if rejected.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Rejected(r) => Some(r.reason),
        }
    }

    fn reject(receipt: &Receipt, reason: RejectReason, detail: impl Into<String>) -> Self {
        Verdict::Rejected(Rejection {
            reason,
            hardware_identity: Some(receipt.hardware_identity),
            counter: Some(receipt.counter),
            detail: detail.into(),
        })
    }
}

/// The canonical receipt verifier.
///
/// Cheap to share: wrap in an `Arc` and call [`Verifier::verify`] from as many
/// tasks as needed.
pub struct Verifier<S: PolicyStore, E: DigestEngine = KeccakDigestEngine> {
    store: Arc<S>,
    engine: E,
    config: VerifierConfig,
}

impl<S: PolicyStore> Verifier<S> {
    /// Create a verifier hashing with Keccak-256 under the configured layout.
    pub fn new(store: S, config: VerifierConfig) -> Result<Self> {
        let engine = KeccakDigestEngine::new(config.layout.clone());
        Self::with_engine(store, engine, config)
    }
}

impl<S: PolicyStore, E: DigestEngine> Verifier<S, E> {
    /// Create a verifier with a custom digest engine.
    ///
    /// The engine's layout must match the configured one.
    pub fn with_engine(store: S, engine: E, config: VerifierConfig) -> Result<Self> {
        config.validate()?;
        if engine.layout() != &config.layout {
            return Err(VerifierError::Config(format!(
                "digest engine layout {} does not match configured layout {}",
                engine.layout().layout_id(),
                config.layout.layout_id()
            )));
        }
        Ok(Self {
            store: Arc::new(store),
            engine,
            config,
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the digest engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Get the configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// The layout this deployment accepts.
    pub fn layout(&self) -> &DigestLayout {
        &self.config.layout
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify one receipt and, on success, commit its counter.
    ///
    /// Returns `Err` only when the store fails; in that case nothing was
    /// accepted.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(hardware_identity = %receipt.hardware_identity, counter = receipt.counter)
    )]
    pub async fn verify(&self, receipt: &Receipt) -> Result<Verdict> {
        let verdict = self.check_and_commit(receipt).await?;
        match &verdict {
            Verdict::Accepted(a) => info!(
                previous_counter = a.previous_counter,
                "receipt accepted"
            ),
            Verdict::Rejected(r) => warn!(reason = %r.reason, detail = %r.detail, "receipt rejected"),
        }
        Ok(verdict)
    }

    async fn check_and_commit(&self, receipt: &Receipt) -> Result<Verdict> {
        let hw = &receipt.hardware_identity;

        // 1. Identity
        let authorized = self
            .store
            .is_authorized(hw)
            .await
            .map_err(|e| storage_failure(receipt, e))?;
        if !authorized {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::UnauthorizedHardware,
                "hardware identity is not authorized",
            ));
        }
        debug!("identity check passed");

        // 2. Firmware
        let Some(fw) = receipt.firmware_hash else {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::UnapprovedFirmware,
                "firmware hash is absent",
            ));
        };
        let approved = self
            .store
            .is_firmware_approved(&fw)
            .await
            .map_err(|e| storage_failure(receipt, e))?;
        if !approved {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::UnapprovedFirmware,
                format!("firmware {fw:?} is not approved"),
            ));
        }
        debug!("firmware check passed");

        // 3. Monotonicity (advisory; the commit re-checks atomically)
        let last = self
            .store
            .last_counter(hw)
            .await
            .map_err(|e| storage_failure(receipt, e))?;
        if receipt.counter <= last {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::ReplayDetected,
                format!("counter {} is not above last accepted {last}", receipt.counter),
            ));
        }
        debug!(last_counter = last, "monotonic check passed");

        // 4. Digest
        if let Some(declared) = &receipt.declared_layout {
            if !self.declared_layout_matches(declared) {
                return Ok(Verdict::reject(
                    receipt,
                    RejectReason::LayoutMismatch,
                    format!(
                        "receipt declares layout {declared:?}, deployment uses {}",
                        self.config.layout.layout_id()
                    ),
                ));
            }
        }
        let Some(fields) = receipt.digest_fields() else {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::UnapprovedFirmware,
                "firmware hash is absent",
            ));
        };
        if !self.engine.verify_digest(&fields, &receipt.receipt_digest) {
            return Ok(Verdict::reject(
                receipt,
                RejectReason::DigestMismatch,
                "recomputed digest does not match claimed digest",
            ));
        }
        debug!("digest check passed");

        // Commit
        match self
            .store
            .record_counter(hw, receipt.counter)
            .await
            .map_err(|e| storage_failure(receipt, e))?
        {
            CounterUpdate::Advanced { previous } => Ok(Verdict::Accepted(Acceptance {
                hardware_identity: *hw,
                counter: receipt.counter,
                previous_counter: previous,
            })),
            CounterUpdate::Stale { current } => Ok(Verdict::reject(
                receipt,
                RejectReason::ReplayDetected,
                format!(
                    "counter {} lost to a concurrent acceptance; last accepted is now {current}",
                    receipt.counter
                ),
            )),
        }
    }

    fn declared_layout_matches(&self, declared: &str) -> bool {
        DigestLayout::parse_layout_id(declared)
            .map(|layout| layout == self.config.layout)
            .unwrap_or(false)
    }

    /// Parse and verify a single JSON receipt.
    ///
    /// Parse failures become `Rejected(MalformedReceipt)`.
    pub async fn verify_json(&self, json: &str) -> Result<Verdict> {
        match parse_json_receipt(json) {
            Ok(receipt) => self.verify(&receipt).await,
            Err(err) => {
                let rejection = Rejection {
                    reason: RejectReason::MalformedReceipt,
                    hardware_identity: err.hardware_identity(),
                    counter: err.counter(),
                    detail: err.to_string(),
                };
                warn!(
                    hardware_identity = ?rejection.hardware_identity,
                    counter = ?rejection.counter,
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "receipt rejected"
                );
                Ok(Verdict::Rejected(rejection))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Governance Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a node to the allowlist.
    pub async fn authorize_node(&self, hw: &HardwareId, label: &str) -> Result<()> {
        self.store.authorize_node(hw, label).await?;
        info!(hardware_identity = %hw, label, "node authorized");
        Ok(())
    }

    /// Remove a node from the allowlist. Its counter is kept.
    pub async fn revoke_node(&self, hw: &HardwareId) -> Result<bool> {
        let removed = self.store.revoke_node(hw).await?;
        info!(hardware_identity = %hw, removed, "node revoked");
        Ok(removed)
    }

    /// Approve a firmware build.
    pub async fn approve_firmware(&self, fw: &FirmwareHash) -> Result<()> {
        self.store.approve_firmware(fw).await?;
        info!(firmware_hash = %fw, "firmware approved");
        Ok(())
    }

    /// Withdraw approval of a firmware build.
    pub async fn revoke_firmware(&self, fw: &FirmwareHash) -> Result<bool> {
        let removed = self.store.revoke_firmware(fw).await?;
        info!(firmware_hash = %fw, removed, "firmware revoked");
        Ok(removed)
    }

    /// Status of one node.
    pub async fn node_status(&self, hw: &HardwareId) -> Result<NodeStatus> {
        Ok(self.store.node_status(hw).await?)
    }

    /// A consistent copy of the policy state.
    pub async fn snapshot(&self) -> Result<PolicySnapshot> {
        Ok(self.store.snapshot().await?)
    }
}

fn storage_failure(receipt: &Receipt, source: StoreError) -> VerifierError {
    warn!(
        hardware_identity = %receipt.hardware_identity,
        counter = receipt.counter,
        error = %source,
        "policy store unavailable; failing closed"
    );
    VerifierError::StorageUnavailable {
        hardware_identity: Some(receipt.hardware_identity),
        counter: Some(receipt.counter),
        source,
    }
}
