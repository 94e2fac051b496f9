//! # Nexus Verifier Store
//!
//! Persistence for verification policy: the hardware allowlist, the
//! approved-firmware set, and the per-hardware replay counter.
//!
//! ## Key Types
//!
//! - [`PolicyStore`] - The async trait for all policy operations
//! - [`SqlitePolicyStore`] - SQLite-based durable storage
//! - [`MemoryPolicyStore`] - In-memory storage for tests and snapshot loading
//! - [`CounterUpdate`] - Outcome of the compare-and-set counter write
//! - [`PolicySnapshot`] - A consistent copy of the whole policy state
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nexus_verifier_store::{PolicyStore, SqlitePolicyStore};
//! use nexus_verifier_core::HardwareId;
//!
//! async fn example() {
//!     let store = SqlitePolicyStore::open("policy.db").unwrap();
//!     let hw = HardwareId::from_bytes([1; 32]);
//!     store.authorize_node(&hw, "lab-node-1").await.unwrap();
//!     assert_eq!(store.last_counter(&hw).await.unwrap(), 0);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Compare-and-set counters**: `record_counter` only writes a strictly
//!   greater value, checked atomically at commit time
//! - **Revocation keeps counters**: a re-authorized node resumes from its
//!   recorded counter
//! - **Fail closed**: every storage fault surfaces as an error, never as a
//!   default answer

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryPolicyStore;
pub use sqlite::SqlitePolicyStore;
pub use traits::{
    AuthorizedNode, CounterEntry, CounterUpdate, NodeStatus, PolicySnapshot, PolicyStore,
};
