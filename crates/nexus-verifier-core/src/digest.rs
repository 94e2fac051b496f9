//! Canonical receipt digest.
//!
//! The digest is Keccak-256 (the Ethereum variant, not NIST SHA3-256) over a
//! fixed concatenation:
//!
//! ```text
//! unscoped:     domain ||             hardware_identity || firmware_hash || execution_hash || counter_be
//! chain-scoped: domain || chain_be || hardware_identity || firmware_hash || execution_hash || counter_be
//! ```
//!
//! Domain tags are protocol constants. Changing one is a breaking protocol
//! change: every device's firmware computes the same bytes.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{CoreError, Result};
use crate::receipt::DigestFields;
use crate::types::ReceiptDigest;

/// Domain tag of the unscoped v1 layout.
pub const NEXUS_RCT_DOMAIN: &str = "NEXUS_RCT_V1";

/// Domain tag of the chain-scoped v1 layout.
pub const ANCHOR_RCT_DOMAIN: &str = "anchor_RCT_V1";

/// Chain identifier used by the reference deployment (Arbitrum Sepolia).
pub const DEFAULT_CHAIN_ID: u64 = 421_614;

/// Separator between domain and chain id in a layout identifier.
const CHAIN_SEPARATOR: char = '@';

/// The byte layout a deployment commits to.
///
/// A deployment picks exactly one layout. Receipts computed under any other
/// layout fail digest reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DigestLayout {
    /// `domain || fields`. For deployments bound to a single chain.
    Unscoped { domain: String },
    /// `domain || chain_id_be || fields`. Required for multi-chain deployments.
    ChainScoped { domain: String, chain_id: u64 },
}

impl DigestLayout {
    /// Unscoped layout with a custom domain tag.
    pub fn unscoped(domain: impl Into<String>) -> Result<Self> {
        let layout = DigestLayout::Unscoped {
            domain: domain.into(),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Chain-scoped layout with a custom domain tag.
    pub fn chain_scoped(domain: impl Into<String>, chain_id: u64) -> Result<Self> {
        let layout = DigestLayout::ChainScoped {
            domain: domain.into(),
            chain_id,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// The `NEXUS_RCT_V1` unscoped layout.
    pub fn nexus_v1() -> Self {
        DigestLayout::Unscoped {
            domain: NEXUS_RCT_DOMAIN.to_string(),
        }
    }

    /// The `anchor_RCT_V1` chain-scoped layout.
    pub fn anchor_v1(chain_id: u64) -> Self {
        DigestLayout::ChainScoped {
            domain: ANCHOR_RCT_DOMAIN.to_string(),
            chain_id,
        }
    }

    /// Check the domain tag is usable.
    ///
    /// Tags must be non-empty printable ASCII and must not contain the
    /// layout-identifier separator.
    pub fn validate(&self) -> Result<()> {
        let domain = self.domain();
        if domain.is_empty() {
            return Err(CoreError::InvalidLayout("empty domain tag".into()));
        }
        if !domain.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(CoreError::InvalidLayout(format!(
                "domain tag {domain:?} must be printable ASCII"
            )));
        }
        if domain.contains(CHAIN_SEPARATOR) {
            return Err(CoreError::InvalidLayout(format!(
                "domain tag {domain:?} must not contain '{CHAIN_SEPARATOR}'"
            )));
        }
        Ok(())
    }

    /// The domain tag.
    pub fn domain(&self) -> &str {
        match self {
            DigestLayout::Unscoped { domain } | DigestLayout::ChainScoped { domain, .. } => domain,
        }
    }

    /// The chain identifier, if this layout is chain-scoped.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            DigestLayout::Unscoped { .. } => None,
            DigestLayout::ChainScoped { chain_id, .. } => Some(*chain_id),
        }
    }

    /// Stable textual identifier: `DOMAIN` or `DOMAIN@CHAIN_ID`.
    pub fn layout_id(&self) -> String {
        match self {
            DigestLayout::Unscoped { domain } => domain.clone(),
            DigestLayout::ChainScoped { domain, chain_id } => {
                format!("{domain}{CHAIN_SEPARATOR}{chain_id}")
            }
        }
    }

    /// Parse a layout identifier produced by [`DigestLayout::layout_id`].
    pub fn parse_layout_id(id: &str) -> Result<Self> {
        match id.split_once(CHAIN_SEPARATOR) {
            None => DigestLayout::unscoped(id),
            Some((domain, chain)) => {
                let chain_id = chain.parse::<u64>().map_err(|e| {
                    CoreError::InvalidLayout(format!("bad chain id in {id:?}: {e}"))
                })?;
                DigestLayout::chain_scoped(domain, chain_id)
            }
        }
    }

    /// Length of the hashed material under this layout.
    pub fn material_len(&self) -> usize {
        let chain = if self.chain_id().is_some() { 8 } else { 0 };
        self.domain().len() + chain + 32 * 3 + 8
    }

    /// Build the exact byte string that is hashed.
    pub fn material(&self, fields: &DigestFields) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.material_len());
        buf.extend_from_slice(self.domain().as_bytes());
        if let Some(chain_id) = self.chain_id() {
            buf.extend_from_slice(&chain_id.to_be_bytes());
        }
        buf.extend_from_slice(fields.hardware_identity.as_bytes());
        buf.extend_from_slice(fields.firmware_hash.as_bytes());
        buf.extend_from_slice(fields.execution_hash.as_bytes());
        buf.extend_from_slice(&fields.counter.to_be_bytes());
        buf
    }
}

impl Default for DigestLayout {
    fn default() -> Self {
        DigestLayout::nexus_v1()
    }
}

/// Computes and checks canonical digests.
///
/// Implementations must be pure: the same fields always give the same digest.
pub trait DigestEngine: Send + Sync {
    /// The layout this engine hashes under.
    fn layout(&self) -> &DigestLayout;

    /// Compute the canonical digest of `fields`.
    fn compute_digest(&self, fields: &DigestFields) -> ReceiptDigest;

    /// Recompute and compare against `claimed` in constant time.
    fn verify_digest(&self, fields: &DigestFields, claimed: &ReceiptDigest) -> bool {
        self.compute_digest(fields).ct_eq(claimed)
    }
}

/// Keccak-256 digest engine.
#[derive(Debug, Clone, Default)]
pub struct KeccakDigestEngine {
    layout: DigestLayout,
}

impl KeccakDigestEngine {
    /// Create an engine for `layout`.
    pub fn new(layout: DigestLayout) -> Self {
        Self { layout }
    }
}

impl DigestEngine for KeccakDigestEngine {
    fn layout(&self) -> &DigestLayout {
        &self.layout
    }

    fn compute_digest(&self, fields: &DigestFields) -> ReceiptDigest {
        let mut hasher = Keccak256::new();
        hasher.update(self.layout.domain().as_bytes());
        if let Some(chain_id) = self.layout.chain_id() {
            hasher.update(chain_id.to_be_bytes());
        }
        hasher.update(fields.hardware_identity.as_bytes());
        hasher.update(fields.firmware_hash.as_bytes());
        hasher.update(fields.execution_hash.as_bytes());
        hasher.update(fields.counter.to_be_bytes());
        ReceiptDigest(hasher.finalize().into())
    }
}

/// Plain Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionHash, FirmwareHash, HardwareId};

    fn fields(counter: u64) -> DigestFields {
        DigestFields {
            hardware_identity: HardwareId::ZERO,
            firmware_hash: FirmwareHash::from_bytes([0x11; 32]),
            execution_hash: ExecutionHash::from_bytes([0x22; 32]),
            counter,
        }
    }

    #[test]
    fn test_keccak_is_not_nist_sha3() {
        // Keccak-256 of the empty string. NIST SHA3-256 gives a7ffc6f8...
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_known_digest() {
        let engine = KeccakDigestEngine::new(DigestLayout::unscoped("DOMAIN_V1").unwrap());
        assert_eq!(
            engine.compute_digest(&fields(1)).to_hex(),
            "352e10897f4249a24064769b4fa64b88cd8c9ccdcbc844580a8b0789f6548cf7"
        );
    }

    #[test]
    fn test_engine_matches_material() {
        for layout in [DigestLayout::nexus_v1(), DigestLayout::anchor_v1(DEFAULT_CHAIN_ID)] {
            let engine = KeccakDigestEngine::new(layout.clone());
            let f = fields(99);
            let material = layout.material(&f);
            assert_eq!(material.len(), layout.material_len());
            assert_eq!(engine.compute_digest(&f).0, keccak256(&material));
        }
    }

    #[test]
    fn test_material_lengths() {
        assert_eq!(DigestLayout::nexus_v1().material_len(), 12 + 104);
        assert_eq!(DigestLayout::anchor_v1(1).material_len(), 13 + 8 + 104);
    }

    #[test]
    fn test_layouts_do_not_collide() {
        let f = fields(5);
        let unscoped = KeccakDigestEngine::new(DigestLayout::nexus_v1());
        let chain_a = KeccakDigestEngine::new(DigestLayout::anchor_v1(1));
        let chain_b = KeccakDigestEngine::new(DigestLayout::anchor_v1(2));

        let d0 = unscoped.compute_digest(&f);
        let d1 = chain_a.compute_digest(&f);
        let d2 = chain_b.compute_digest(&f);
        assert_ne!(d0, d1);
        assert_ne!(d1, d2);
        assert!(!chain_b.verify_digest(&f, &d1));
    }

    #[test]
    fn test_verify_digest_rejects_single_bit_flip() {
        let engine = KeccakDigestEngine::default();
        let f = fields(3);
        let digest = engine.compute_digest(&f);
        assert!(engine.verify_digest(&f, &digest));

        for byte in 0..32 {
            for bit in 0..8 {
                let mut tampered = digest;
                tampered.0[byte] ^= 1 << bit;
                assert!(!engine.verify_digest(&f, &tampered));
            }
        }
    }

    #[test]
    fn test_layout_id_roundtrip() {
        for layout in [
            DigestLayout::nexus_v1(),
            DigestLayout::anchor_v1(DEFAULT_CHAIN_ID),
            DigestLayout::unscoped("DOMAIN_V1").unwrap(),
        ] {
            assert_eq!(DigestLayout::parse_layout_id(&layout.layout_id()).unwrap(), layout);
        }
        assert_eq!(DigestLayout::anchor_v1(421614).layout_id(), "anchor_RCT_V1@421614");
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(DigestLayout::unscoped("").is_err());
        assert!(DigestLayout::unscoped("has space").is_err());
        assert!(DigestLayout::unscoped("a@b").is_err());
        assert!(DigestLayout::parse_layout_id("anchor_RCT_V1@notanumber").is_err());
    }
}
