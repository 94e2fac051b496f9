//! Receipt: a hardware node's claim about one execution.
//!
//! A receipt is immutable once parsed. It binds a hardware identity, a
//! firmware build, an opaque execution result and a replay counter under a
//! claimed digest.

use crate::digest::DigestEngine;
use crate::types::{ExecutionHash, FirmwareHash, HardwareId, ReceiptDigest};

/// The four fields bound into the canonical digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestFields {
    pub hardware_identity: HardwareId,
    pub firmware_hash: FirmwareHash,
    pub execution_hash: ExecutionHash,
    pub counter: u64,
}

/// A parsed attestation receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// The submitting device.
    pub hardware_identity: HardwareId,

    /// The firmware build, or `None` when the submitter omitted it.
    ///
    /// Absence is kept distinct from any concrete hash so the verifier can
    /// reject it explicitly.
    pub firmware_hash: Option<FirmwareHash>,

    /// Opaque application data.
    pub execution_hash: ExecutionHash,

    /// Per-device replay counter.
    pub counter: u64,

    /// Digest claimed by the submitter.
    pub receipt_digest: ReceiptDigest,

    /// Layout identifier the submitter says the digest was computed under.
    pub declared_layout: Option<String>,
}

impl Receipt {
    /// The digest inputs, or `None` if the firmware hash is absent.
    pub fn digest_fields(&self) -> Option<DigestFields> {
        self.firmware_hash.map(|firmware_hash| DigestFields {
            hardware_identity: self.hardware_identity,
            firmware_hash,
            execution_hash: self.execution_hash,
            counter: self.counter,
        })
    }

    /// Check if the firmware hash was supplied.
    pub fn has_firmware(&self) -> bool {
        self.firmware_hash.is_some()
    }
}

/// Builder for creating receipts.
pub struct ReceiptBuilder {
    hardware_identity: HardwareId,
    firmware_hash: Option<FirmwareHash>,
    execution_hash: ExecutionHash,
    counter: u64,
    declared_layout: Option<String>,
}

impl ReceiptBuilder {
    /// Start building a receipt for a device and counter.
    pub fn new(hardware_identity: HardwareId, counter: u64) -> Self {
        Self {
            hardware_identity,
            firmware_hash: None,
            execution_hash: ExecutionHash::ZERO,
            counter,
            declared_layout: None,
        }
    }

    /// Set the firmware hash.
    pub fn firmware(mut self, fw: FirmwareHash) -> Self {
        self.firmware_hash = Some(fw);
        self
    }

    /// Set the execution hash.
    pub fn execution(mut self, exec: ExecutionHash) -> Self {
        self.execution_hash = exec;
        self
    }

    /// Declare the layout identifier in the receipt.
    pub fn declare_layout(mut self, layout_id: impl Into<String>) -> Self {
        self.declared_layout = Some(layout_id.into());
        self
    }

    /// Finish with an explicitly supplied digest (which may be wrong).
    pub fn claimed_digest(self, digest: ReceiptDigest) -> Receipt {
        Receipt {
            hardware_identity: self.hardware_identity,
            firmware_hash: self.firmware_hash,
            execution_hash: self.execution_hash,
            counter: self.counter,
            receipt_digest: digest,
            declared_layout: self.declared_layout,
        }
    }

    /// Finish by computing the canonical digest with `engine`.
    ///
    /// Without a firmware hash there is nothing canonical to hash, so the
    /// digest is left zeroed.
    pub fn seal<E: DigestEngine + ?Sized>(self, engine: &E) -> Receipt {
        let digest = match self.firmware_hash {
            Some(firmware_hash) => engine.compute_digest(&DigestFields {
                hardware_identity: self.hardware_identity,
                firmware_hash,
                execution_hash: self.execution_hash,
                counter: self.counter,
            }),
            None => ReceiptDigest::ZERO,
        };
        self.claimed_digest(digest)
    }
}
