//! # Nexus Verifier Core
//!
//! Pure primitives for the Nexus receipt verifier: identifiers, receipts, the
//! canonical digest and the receipt codec.
//!
//! This crate contains no I/O, no storage, no async. It is pure computation
//! over fixed-width byte fields.
//!
//! ## Key Types
//!
//! - [`Receipt`] - A hardware node's claim about one execution
//! - [`HardwareId`], [`FirmwareHash`], [`ExecutionHash`], [`ReceiptDigest`] - 32-byte fields
//! - [`DigestLayout`] - The byte layout a deployment hashes under
//! - [`DigestEngine`] - Computes and checks canonical digests
//!
//! ## Wire Forms
//!
//! Single receipts travel as JSON (see [`json`]). Batches travel as
//! concatenated 137-byte v1 records (see [`packed`]).

pub mod digest;
pub mod error;
pub mod json;
pub mod packed;
pub mod receipt;
pub mod types;

pub use digest::{
    keccak256, DigestEngine, DigestLayout, KeccakDigestEngine, ANCHOR_RCT_DOMAIN,
    DEFAULT_CHAIN_ID, NEXUS_RCT_DOMAIN,
};
pub use error::{CoreError, Result};
pub use json::{encode_json_receipt, parse_json_receipt, receipt_from_value, receipt_to_value};
pub use packed::{decode_packed, encode_packed, PACKED_V1_RECORD_LEN, PACKED_V1_VERSION};
pub use receipt::{DigestFields, Receipt, ReceiptBuilder};
pub use types::{ExecutionHash, FirmwareHash, HardwareId, ReceiptDigest, FIELD_LEN};
