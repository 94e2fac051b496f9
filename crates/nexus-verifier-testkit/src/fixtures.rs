//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use nexus_verifier_core::{
    encode_json_receipt, DigestLayout, FirmwareHash, HardwareId, KeccakDigestEngine, Receipt,
    ReceiptBuilder,
};
use nexus_verifier_store::{AuthorizedNode, MemoryPolicyStore, PolicySnapshot};

use crate::generators::exec_hash_for;

/// A test fixture: one authorized device running one approved firmware.
pub struct TestFixture {
    pub hardware_identity: HardwareId,
    pub firmware_hash: FirmwareHash,
    pub label: String,
    pub engine: KeccakDigestEngine,
}

impl TestFixture {
    /// Create a fixture with random identifiers under the default layout.
    pub fn new() -> Self {
        Self::from_rng(&mut rand::thread_rng(), DigestLayout::default())
    }

    /// Create with deterministic identifiers derived from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed), DigestLayout::default())
    }

    /// Create with random identifiers under `layout`.
    pub fn with_layout(layout: DigestLayout) -> Self {
        Self::from_rng(&mut rand::thread_rng(), layout)
    }

    fn from_rng<R: RngCore>(rng: &mut R, layout: DigestLayout) -> Self {
        let mut hw = [0u8; 32];
        let mut fw = [0u8; 32];
        rng.fill_bytes(&mut hw);
        rng.fill_bytes(&mut fw);
        let hardware_identity = HardwareId(hw);
        Self {
            label: format!("node-{}", &hardware_identity.to_hex()[..8]),
            hardware_identity,
            firmware_hash: FirmwareHash(fw),
            engine: KeccakDigestEngine::new(layout),
        }
    }

    /// Policy state with this device authorized and its firmware approved.
    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            authorized_nodes: vec![AuthorizedNode {
                hardware_identity: self.hardware_identity,
                label: self.label.clone(),
            }],
            approved_firmware: vec![self.firmware_hash],
            counters: Vec::new(),
        }
    }

    /// A memory store holding [`TestFixture::snapshot`].
    pub fn store(&self) -> MemoryPolicyStore {
        MemoryPolicyStore::from_snapshot(&self.snapshot())
    }

    /// Builder pre-filled with this device, its firmware, and the
    /// conventional execution hash for `counter`.
    pub fn builder(&self, counter: u64) -> ReceiptBuilder {
        ReceiptBuilder::new(self.hardware_identity, counter)
            .firmware(self.firmware_hash)
            .execution(exec_hash_for(counter))
    }

    /// A correctly digested receipt.
    pub fn receipt(&self, counter: u64) -> Receipt {
        self.builder(counter).seal(&self.engine)
    }

    /// A correctly digested receipt in JSON form.
    pub fn json_receipt(&self, counter: u64) -> String {
        encode_json_receipt(&self.receipt(counter))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for several distinct devices.
pub fn multi_node_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count).map(|i| TestFixture::with_seed(i as u64)).collect()
}

/// Combined policy state for several fixtures.
pub fn combined_snapshot(fixtures: &[TestFixture]) -> PolicySnapshot {
    let mut snapshot = PolicySnapshot::default();
    for f in fixtures {
        let s = f.snapshot();
        snapshot.authorized_nodes.extend(s.authorized_nodes);
        snapshot.approved_firmware.extend(s.approved_firmware);
    }
    snapshot.normalize();
    snapshot
}
