//! Error types for the Nexus verifier core.

use thiserror::Error;

use crate::types::HardwareId;

/// Errors produced by the receipt codec and layout configuration.
///
/// Every variant here is recoverable: the offending input is discarded and
/// the caller carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A single receipt failed to parse or validate.
    ///
    /// The hardware identity and counter are filled in when those fields were
    /// themselves readable, so the rejection can still be audited.
    #[error("malformed receipt: {reason}")]
    MalformedReceipt {
        reason: String,
        hardware_identity: Option<HardwareId>,
        counter: Option<u64>,
    },

    /// Packed buffer length is not an exact multiple of the record size.
    #[error("packed batch length {len} is not a multiple of {record_len}")]
    TruncatedBatch { len: usize, record_len: usize },

    /// A packed record carried a version byte we do not recognize.
    #[error("unsupported packed record version {version:#04x} at record {index}")]
    UnsupportedVersion { index: usize, version: u8 },

    /// A digest layout could not be constructed.
    #[error("invalid digest layout: {0}")]
    InvalidLayout(String),
}

impl CoreError {
    /// Shorthand for a malformed receipt with no recoverable audit fields.
    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedReceipt {
            reason: reason.into(),
            hardware_identity: None,
            counter: None,
        }
    }

    /// Hardware identity associated with the failure, if known.
    pub fn hardware_identity(&self) -> Option<HardwareId> {
        match self {
            CoreError::MalformedReceipt {
                hardware_identity, ..
            } => *hardware_identity,
            _ => None,
        }
    }

    /// Counter associated with the failure, if known.
    pub fn counter(&self) -> Option<u64> {
        match self {
            CoreError::MalformedReceipt { counter, .. } => *counter,
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
