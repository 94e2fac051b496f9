//! Golden digest vectors.
//!
//! Every implementation of the receipt digest (device firmware, on-chain
//! anchor, this verifier) must produce these exact bytes.

use nexus_verifier_core::{
    receipt_to_value, DigestEngine, DigestFields, DigestLayout, ExecutionHash, FirmwareHash,
    HardwareId, KeccakDigestEngine, Receipt, ReceiptBuilder, ReceiptDigest, DEFAULT_CHAIN_ID,
};

/// A golden digest vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Layout identifier (`DOMAIN` or `DOMAIN@CHAIN_ID`).
    pub layout_id: &'static str,
    /// 32-byte fields, hex.
    pub hardware_identity: &'static str,
    pub firmware_hash: &'static str,
    pub execution_hash: &'static str,
    pub counter: u64,
    /// Expected Keccak-256 digest, hex.
    pub expected_digest: &'static str,
}

const DEFAULT_HW: &str = "0x52fdfc072182654f163f5f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";
const DEFAULT_FW: &str = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
const DEFAULT_EXEC: &str = "0xdeadbeefcafebabe000000000000000000000000000000000000000000000001";

/// Get all golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "custom domain, counter 1",
            layout_id: "DOMAIN_V1",
            hardware_identity: "0x0000000000000000000000000000000000000000000000000000000000000000",
            firmware_hash: "0x1111111111111111111111111111111111111111111111111111111111111111",
            execution_hash: "0x2222222222222222222222222222222222222222222222222222222222222222",
            counter: 1,
            expected_digest: "352e10897f4249a24064769b4fa64b88cd8c9ccdcbc844580a8b0789f6548cf7",
        },
        GoldenVector {
            name: "custom domain, counter 2",
            layout_id: "DOMAIN_V1",
            hardware_identity: "0x0000000000000000000000000000000000000000000000000000000000000000",
            firmware_hash: "0x1111111111111111111111111111111111111111111111111111111111111111",
            execution_hash: "0x2222222222222222222222222222222222222222222222222222222222222222",
            counter: 2,
            expected_digest: "dfc24cc7c7291154765c2f53beb23af76d8881c88d527376497c7486540ef54b",
        },
        GoldenVector {
            name: "unscoped v1, reference device",
            layout_id: "NEXUS_RCT_V1",
            hardware_identity: DEFAULT_HW,
            firmware_hash: DEFAULT_FW,
            execution_hash: DEFAULT_EXEC,
            counter: 1,
            expected_digest: "31e303e601e627d532b412bf01c25d44d5a01a087964210de5d718f9a0cdc70c",
        },
        GoldenVector {
            name: "chain-scoped v1, reference device",
            layout_id: "anchor_RCT_V1@421614",
            hardware_identity: DEFAULT_HW,
            firmware_hash: DEFAULT_FW,
            execution_hash: DEFAULT_EXEC,
            counter: 1,
            expected_digest: "502dc20fff17ac4a47ce7e17fc0c26ca5c4b4f33ba60301a8d70e3fccc704d35",
        },
        GoldenVector {
            name: "unscoped v1, counter 42",
            layout_id: "NEXUS_RCT_V1",
            hardware_identity: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            firmware_hash: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            execution_hash: "0xcccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc",
            counter: 42,
            expected_digest: "a4fa9260f84ca2ddc55b2a6daf06041871e3c607e0e6775e0f36e1c8f332ba3f",
        },
        GoldenVector {
            name: "unscoped v1, counter u64::MAX",
            layout_id: "NEXUS_RCT_V1",
            hardware_identity: "0x0000000000000000000000000000000000000000000000000000000000000000",
            firmware_hash: "0x1111111111111111111111111111111111111111111111111111111111111111",
            execution_hash: "0x2222222222222222222222222222222222222222222222222222222222222222",
            counter: u64::MAX,
            expected_digest: "a8e87da5f0565195addc09a01e1ebcd565a092586f461ef3268c74cbbdc6592c",
        },
    ]
}

impl GoldenVector {
    /// The vector's layout.
    pub fn layout(&self) -> DigestLayout {
        DigestLayout::parse_layout_id(self.layout_id).expect("golden layout id is valid")
    }

    /// The vector's digest inputs.
    pub fn fields(&self) -> DigestFields {
        DigestFields {
            hardware_identity: HardwareId::from_hex(self.hardware_identity)
                .expect("golden hardware identity is valid hex"),
            firmware_hash: FirmwareHash::from_hex(self.firmware_hash)
                .expect("golden firmware hash is valid hex"),
            execution_hash: ExecutionHash::from_hex(self.execution_hash)
                .expect("golden execution hash is valid hex"),
            counter: self.counter,
        }
    }

    /// The expected digest.
    pub fn digest(&self) -> ReceiptDigest {
        ReceiptDigest::from_hex(self.expected_digest).expect("golden digest is valid hex")
    }

    /// A receipt carrying the expected digest.
    pub fn receipt(&self) -> Receipt {
        let f = self.fields();
        ReceiptBuilder::new(f.hardware_identity, f.counter)
            .firmware(f.firmware_hash)
            .execution(f.execution_hash)
            .claimed_digest(self.digest())
    }

    /// The vector as a single-receipt JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        receipt_to_value(&self.receipt())
    }
}

/// Look up a vector by name.
pub fn vector(name: &str) -> Option<GoldenVector> {
    all_vectors().into_iter().find(|v| v.name == name)
}

/// Check every vector against the Keccak engine.
///
/// Returns `(name, matches, computed_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let engine = KeccakDigestEngine::new(v.layout());
            let hex = engine.compute_digest(&v.fields()).to_hex();
            let matches = hex == v.expected_digest;
            (v.name.to_string(), matches, hex)
        })
        .collect()
}

/// Chain id used by the chain-scoped vectors.
pub const VECTOR_CHAIN_ID: u64 = DEFAULT_CHAIN_ID;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, computed) in verify_all_vectors() {
            assert!(matches, "vector '{name}' computed {computed}");
        }
    }

    #[test]
    fn test_vector_layouts_parse() {
        for v in all_vectors() {
            assert_eq!(v.layout().layout_id(), v.layout_id);
        }
        assert_eq!(
            vector("chain-scoped v1, reference device").unwrap().layout(),
            DigestLayout::anchor_v1(VECTOR_CHAIN_ID)
        );
    }

    #[test]
    fn test_vector_json_carries_digest() {
        let v = vector("unscoped v1, counter 42").unwrap();
        let json = v.to_json();
        assert_eq!(json["counter"], 42);
        assert_eq!(json["receipt_digest"], format!("0x{}", v.expected_digest));
    }
}
