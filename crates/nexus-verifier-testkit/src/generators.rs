//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use nexus_verifier_core::{
    encode_packed, keccak256, DigestLayout, ExecutionHash, FirmwareHash, HardwareId,
    KeccakDigestEngine, Receipt, ReceiptBuilder, ReceiptDigest,
};

/// Execution hash convention used by fixtures and benchmarks:
/// `keccak256("exec:" || counter_be)`.
pub fn exec_hash_for(counter: u64) -> ExecutionHash {
    let mut input = Vec::with_capacity(13);
    input.extend_from_slice(b"exec:");
    input.extend_from_slice(&counter.to_be_bytes());
    ExecutionHash(keccak256(&input))
}

/// Generate a random HardwareId.
pub fn hardware_id() -> impl Strategy<Value = HardwareId> {
    any::<[u8; 32]>().prop_map(HardwareId)
}

/// Generate a random FirmwareHash.
pub fn firmware_hash() -> impl Strategy<Value = FirmwareHash> {
    any::<[u8; 32]>().prop_map(FirmwareHash)
}

/// Generate a random ExecutionHash.
pub fn execution_hash() -> impl Strategy<Value = ExecutionHash> {
    any::<[u8; 32]>().prop_map(ExecutionHash)
}

/// Generate a random ReceiptDigest.
pub fn receipt_digest() -> impl Strategy<Value = ReceiptDigest> {
    any::<[u8; 32]>().prop_map(ReceiptDigest)
}

/// Generate a counter that could be accepted (1-indexed).
pub fn counter() -> impl Strategy<Value = u64> {
    1u64..=u64::MAX
}

/// Generate a valid domain tag.
pub fn domain_tag() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,23}".prop_map(String::from)
}

/// Generate a layout, unscoped or chain-scoped.
pub fn digest_layout() -> impl Strategy<Value = DigestLayout> {
    prop_oneof![
        domain_tag().prop_map(|domain| DigestLayout::Unscoped { domain }),
        (domain_tag(), any::<u64>())
            .prop_map(|(domain, chain_id)| DigestLayout::ChainScoped { domain, chain_id }),
    ]
}

/// Parameters for generating a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptParams {
    pub hardware_identity: HardwareId,
    pub firmware_hash: FirmwareHash,
    pub execution_hash: ExecutionHash,
    pub counter: u64,
    pub layout: DigestLayout,
}

impl Arbitrary for ReceiptParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            hardware_id(),
            firmware_hash(),
            execution_hash(),
            counter(),
            digest_layout(),
        )
            .prop_map(|(hw, fw, exec, counter, layout)| ReceiptParams {
                hardware_identity: hw,
                firmware_hash: fw,
                execution_hash: exec,
                counter,
                layout,
            })
            .boxed()
    }
}

/// Generate a correctly digested receipt from parameters.
pub fn receipt_from_params(params: &ReceiptParams) -> Receipt {
    ReceiptBuilder::new(params.hardware_identity, params.counter)
        .firmware(params.firmware_hash)
        .execution(params.execution_hash)
        .seal(&KeccakDigestEngine::new(params.layout.clone()))
}

/// Generate a receipt with arbitrary (usually wrong) digest.
pub fn arbitrary_receipt() -> impl Strategy<Value = Receipt> {
    (
        hardware_id(),
        proptest::option::of(firmware_hash()),
        execution_hash(),
        any::<u64>(),
        receipt_digest(),
    )
        .prop_map(|(hw, fw, exec, counter, digest)| Receipt {
            hardware_identity: hw,
            firmware_hash: fw,
            execution_hash: exec,
            counter,
            receipt_digest: digest,
            declared_layout: None,
        })
}

/// Packed batch of `n` sequential receipts for one device.
pub fn sequential_batch(
    hw: HardwareId,
    fw: FirmwareHash,
    layout: &DigestLayout,
    first_counter: u64,
    n: usize,
) -> Bytes {
    let engine = KeccakDigestEngine::new(layout.clone());
    let receipts: Vec<Receipt> = (0..n as u64)
        .map(|i| {
            let counter = first_counter + i;
            ReceiptBuilder::new(hw, counter)
                .firmware(fw)
                .execution(exec_hash_for(counter))
                .seal(&engine)
        })
        .collect();
    // Every receipt above carries a firmware hash, so encoding cannot fail.
    encode_packed(&receipts).unwrap_or_default()
}
