//! Error types for the Verifier.
//!
//! Rejections are not errors: they are [`Verdict`](crate::Verdict) values.
//! An error here means the verifier could not reach a decision.

use nexus_verifier_core::{CoreError, HardwareId};
use nexus_verifier_store::StoreError;
use thiserror::Error;

use crate::batch::BatchReport;

/// Errors that can occur during Verifier operations.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// The policy store failed during verification. Nothing was accepted.
    #[error("policy store unavailable while verifying {}: {source}", describe(.hardware_identity, .counter))]
    StorageUnavailable {
        hardware_identity: Option<HardwareId>,
        counter: Option<u64>,
        #[source]
        source: StoreError,
    },

    /// Storage error outside the verification path.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Core primitive error (layout, codec).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl VerifierError {
    /// Check if this is a fail-closed storage failure.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, VerifierError::StorageUnavailable { .. })
    }
}

fn describe(hw: &Option<HardwareId>, counter: &Option<u64>) -> String {
    match (hw, counter) {
        (Some(hw), Some(c)) => format!("{hw:?} counter {c}"),
        (Some(hw), None) => format!("{hw:?}"),
        _ => "receipt".to_string(),
    }
}

/// Errors that stop a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The packed buffer is structurally invalid. No record was processed.
    #[error("malformed batch: {0}")]
    Malformed(#[source] CoreError),

    /// The batch holds more records than the configured limit. No record was
    /// processed.
    #[error("batch of {records} records exceeds limit of {max}")]
    TooLarge { records: usize, max: usize },

    /// The policy store failed partway through.
    ///
    /// `partial` holds the outcomes of every record before `index`. Record
    /// `index` and later were not decided.
    #[error("batch stopped at record {index}: {source}")]
    StorageUnavailable {
        index: usize,
        partial: BatchReport,
        #[source]
        source: VerifierError,
    },
}

/// Result type for Verifier operations.
pub type Result<T> = std::result::Result<T, VerifierError>;
