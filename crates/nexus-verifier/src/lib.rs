//! # Nexus Verifier
//!
//! The canonical receipt verifier for Nexus hardware attestation: it decides
//! whether a receipt came from an authorized device, running approved
//! firmware, has not been replayed, and has not been tampered with.
//!
//! ## Overview
//!
//! - **Identity**: the hardware identity must be on the allowlist
//! - **Firmware**: the firmware hash must be present and approved
//! - **Monotonicity**: the counter must exceed the last accepted one
//! - **Digest**: the claimed Keccak-256 digest must match the recomputed one
//!
//! Checks run in that order and stop at the first failure. Only a receipt
//! that passes all four advances its node's counter.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nexus_verifier::{Verifier, VerifierConfig};
//! use nexus_verifier::store::SqlitePolicyStore;
//!
//! async fn example(json: &str) {
//!     let store = SqlitePolicyStore::open("policy.db").unwrap();
//!     let verifier = Verifier::new(store, VerifierConfig::default()).unwrap();
//!
//!     let verdict = verifier.verify_json(json).await.unwrap();
//!     println!("accepted: {}", verdict.is_accepted());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `nexus_verifier::core` - Receipts, digest engine, codecs
//! - `nexus_verifier::store` - Policy store abstraction and SQLite

pub mod batch;
pub mod config;
pub mod error;
pub mod verifier;

// Re-export component crates
pub use nexus_verifier_core as core;
pub use nexus_verifier_store as store;

// Re-export main types for convenience
pub use batch::{BatchProcessor, BatchReport};
pub use config::{VerifierConfig, DEFAULT_MAX_BATCH_RECORDS};
pub use error::{BatchError, Result, VerifierError};
pub use verifier::{Acceptance, RejectReason, Rejection, Verdict, Verifier};

// Re-export commonly used core types
pub use nexus_verifier_core::{
    DigestEngine, DigestLayout, ExecutionHash, FirmwareHash, HardwareId, KeccakDigestEngine,
    Receipt, ReceiptBuilder, ReceiptDigest,
};
