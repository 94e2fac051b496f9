//! # Nexus Verifier Testkit
//!
//! Testing utilities for the Nexus verifier.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known digests every implementation must reproduce
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: An authorized device with a ready-made policy store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use nexus_verifier_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, digest) in verify_all_vectors() {
//!     assert!(matches, "{name}: {digest}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use nexus_verifier_testkit::generators::{ReceiptParams, receipt_from_params};
//!
//! proptest! {
//!     #[test]
//!     fn digest_is_deterministic(params: ReceiptParams) {
//!         let r1 = receipt_from_params(&params);
//!         let r2 = receipt_from_params(&params);
//!         prop_assert_eq!(r1.receipt_digest, r2.receipt_digest);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use nexus_verifier_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let store = fixture.store();
//! let receipt = fixture.receipt(1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{combined_snapshot, multi_node_fixtures, TestFixture};
pub use generators::{exec_hash_for, receipt_from_params, sequential_batch, ReceiptParams};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
