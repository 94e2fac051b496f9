//! Verifier behavior against real stores, under concurrency and failure.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use nexus_verifier::store::{
    CounterUpdate, MemoryPolicyStore, NodeStatus, PolicySnapshot, PolicyStore, SqlitePolicyStore,
    StoreError,
};
use nexus_verifier::{
    BatchError, FirmwareHash, HardwareId, RejectReason, Verdict, Verifier, VerifierConfig,
    VerifierError,
};
use nexus_verifier_testkit::{multi_node_fixtures, sequential_batch, TestFixture};

/// Wraps a store and fails `record_counter` once `fail_after` commits have
/// gone through, or every read once `fail_reads` is set.
struct FlakyStore<S> {
    inner: S,
    commits: AtomicUsize,
    fail_after: usize,
    fail_reads: AtomicBool,
}

impl<S> FlakyStore<S> {
    fn new(inner: S, fail_after: usize) -> Self {
        Self {
            inner,
            commits: AtomicUsize::new(0),
            fail_after,
            fail_reads: AtomicBool::new(false),
        }
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk gone")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: PolicyStore> PolicyStore for FlakyStore<S> {
    async fn is_authorized(&self, hw: &HardwareId) -> Result<bool, StoreError> {
        self.check_reads()?;
        self.inner.is_authorized(hw).await
    }

    async fn node_label(&self, hw: &HardwareId) -> Result<Option<String>, StoreError> {
        self.inner.node_label(hw).await
    }

    async fn is_firmware_approved(&self, fw: &FirmwareHash) -> Result<bool, StoreError> {
        self.check_reads()?;
        self.inner.is_firmware_approved(fw).await
    }

    async fn last_counter(&self, hw: &HardwareId) -> Result<u64, StoreError> {
        self.check_reads()?;
        self.inner.last_counter(hw).await
    }

    async fn record_counter(&self, hw: &HardwareId, counter: u64) -> Result<CounterUpdate, StoreError> {
        if self.commits.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            return Err(StoreError::Io(std::io::Error::other("fsync failed")));
        }
        self.inner.record_counter(hw, counter).await
    }

    async fn authorize_node(&self, hw: &HardwareId, label: &str) -> Result<(), StoreError> {
        self.inner.authorize_node(hw, label).await
    }

    async fn revoke_node(&self, hw: &HardwareId) -> Result<bool, StoreError> {
        self.inner.revoke_node(hw).await
    }

    async fn approve_firmware(&self, fw: &FirmwareHash) -> Result<(), StoreError> {
        self.inner.approve_firmware(fw).await
    }

    async fn revoke_firmware(&self, fw: &FirmwareHash) -> Result<bool, StoreError> {
        self.inner.revoke_firmware(fw).await
    }

    async fn node_status(&self, hw: &HardwareId) -> Result<NodeStatus, StoreError> {
        self.inner.node_status(hw).await
    }

    async fn snapshot(&self) -> Result<PolicySnapshot, StoreError> {
        self.inner.snapshot().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_counter_accepted_once() {
    let fixture = TestFixture::new();
    let verifier = Arc::new(Verifier::new(fixture.store(), VerifierConfig::default()).unwrap());
    let receipt = fixture.receipt(1);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let verifier = verifier.clone();
        let receipt = receipt.clone();
        handles.push(tokio::spawn(async move { verifier.verify(&receipt).await.unwrap() }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Verdict::Accepted(_) => accepted += 1,
            Verdict::Rejected(r) => assert_eq!(r.reason, RejectReason::ReplayDetected),
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_counters_commit_in_increasing_order() {
    let fixture = TestFixture::new();
    let verifier = Arc::new(Verifier::new(fixture.store(), VerifierConfig::default()).unwrap());

    let mut handles = Vec::new();
    for counter in (1..=64u64).rev() {
        let verifier = verifier.clone();
        let receipt = fixture.receipt(counter);
        handles.push(tokio::spawn(async move { verifier.verify(&receipt).await.unwrap() }));
    }

    let mut accepted = Vec::new();
    for handle in handles {
        if let Verdict::Accepted(a) = handle.await.unwrap() {
            accepted.push(a);
        }
    }
    assert!(!accepted.is_empty());

    // No counter accepted twice.
    let unique: HashSet<u64> = accepted.iter().map(|a| a.counter).collect();
    assert_eq!(unique.len(), accepted.len());

    // Each commit replaced exactly the previous commit: the accepted
    // counters form one strictly increasing chain starting from 0.
    accepted.sort_by_key(|a| a.counter);
    let mut expected_previous = 0;
    for a in &accepted {
        assert_eq!(a.previous_counter, expected_previous);
        expected_previous = a.counter;
    }

    let last = verifier
        .store()
        .last_counter(&fixture.hardware_identity)
        .await
        .unwrap();
    assert_eq!(last, accepted.last().unwrap().counter);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_nodes_are_independent() {
    let nodes = multi_node_fixtures(8);
    let snapshot = nexus_verifier_testkit::combined_snapshot(&nodes);
    let verifier = Arc::new(
        Verifier::new(MemoryPolicyStore::from_snapshot(&snapshot), VerifierConfig::default())
            .unwrap(),
    );

    let mut handles = Vec::new();
    for node in &nodes {
        for counter in 1..=10u64 {
            let verifier = verifier.clone();
            let receipt = node.receipt(counter);
            handles.push(tokio::spawn(async move { verifier.verify(&receipt).await.unwrap() }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for node in &nodes {
        let status = verifier.node_status(&node.hardware_identity).await.unwrap();
        assert!(status.authorized);
        assert!(status.last_counter >= 1 && status.last_counter <= 10);
    }
}

#[tokio::test]
async fn test_sequential_arrival_accepts_every_counter() {
    let fixture = TestFixture::new();
    let verifier = Verifier::new(fixture.store(), VerifierConfig::default()).unwrap();

    for counter in 1..=20u64 {
        let verdict = verifier.verify(&fixture.receipt(counter)).await.unwrap();
        assert!(verdict.is_accepted(), "counter {counter}: {verdict:?}");
    }
}

#[tokio::test]
async fn test_storage_failure_fails_closed() {
    let fixture = TestFixture::new();
    let store = FlakyStore::new(fixture.store(), 0);
    let verifier = Verifier::new(store, VerifierConfig::default()).unwrap();

    let err = verifier.verify(&fixture.receipt(1)).await.unwrap_err();
    assert!(err.is_storage_unavailable());
    match err {
        VerifierError::StorageUnavailable {
            hardware_identity,
            counter,
            ..
        } => {
            assert_eq!(hardware_identity, Some(fixture.hardware_identity));
            assert_eq!(counter, Some(1));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        verifier.store().inner.last_counter(&fixture.hardware_identity).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_read_failure_fails_closed() {
    let fixture = TestFixture::new();
    let store = FlakyStore::new(fixture.store(), usize::MAX);
    store.fail_reads.store(true, Ordering::SeqCst);
    let verifier = Verifier::new(store, VerifierConfig::default()).unwrap();

    let err = verifier.verify(&fixture.receipt(1)).await.unwrap_err();
    assert!(err.is_storage_unavailable());
}

#[tokio::test]
async fn test_batch_storage_failure_returns_partial_report() {
    let fixture = TestFixture::new();
    let store = FlakyStore::new(fixture.store(), 2);
    let verifier = Verifier::new(store, VerifierConfig::default()).unwrap();

    let batch = sequential_batch(
        fixture.hardware_identity,
        fixture.firmware_hash,
        verifier.layout(),
        1,
        5,
    );

    match verifier.verify_batch(&batch).await.unwrap_err() {
        BatchError::StorageUnavailable { index, partial, source } => {
            assert_eq!(index, 2);
            assert_eq!(partial.len(), 2);
            assert_eq!(partial.accepted_count(), 2);
            assert!(source.is_storage_unavailable());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        verifier.store().inner.last_counter(&fixture.hardware_identity).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_sqlite_counter_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.db");
    let fixture = TestFixture::new();

    {
        let verifier =
            Verifier::new(SqlitePolicyStore::open(&path).unwrap(), VerifierConfig::default())
                .unwrap();
        verifier
            .authorize_node(&fixture.hardware_identity, &fixture.label)
            .await
            .unwrap();
        verifier.approve_firmware(&fixture.firmware_hash).await.unwrap();
        assert!(verifier.verify(&fixture.receipt(7)).await.unwrap().is_accepted());
    }

    let verifier =
        Verifier::new(SqlitePolicyStore::open(&path).unwrap(), VerifierConfig::default()).unwrap();
    let verdict = verifier.verify(&fixture.receipt(7)).await.unwrap();
    assert_eq!(verdict.reject_reason(), Some(RejectReason::ReplayDetected));
    assert!(verifier.verify(&fixture.receipt(8)).await.unwrap().is_accepted());

    let status = verifier.node_status(&fixture.hardware_identity).await.unwrap();
    assert_eq!(status.label.as_deref(), Some(fixture.label.as_str()));
    assert_eq!(status.last_counter, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_same_counter_accepted_once() {
    let fixture = TestFixture::new();
    let store = SqlitePolicyStore::open_memory().unwrap();
    store
        .authorize_node(&fixture.hardware_identity, "n")
        .await
        .unwrap();
    store.approve_firmware(&fixture.firmware_hash).await.unwrap();
    let verifier = Arc::new(Verifier::new(store, VerifierConfig::default()).unwrap());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let verifier = verifier.clone();
        let receipt = fixture.receipt(5);
        handles.push(tokio::spawn(async move { verifier.verify(&receipt).await.unwrap() }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_accepted() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_digest_bit_flip_always_rejected(byte in 0usize..32, bit in 0u8..8, counter in 1u64..1_000_000) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let fixture = TestFixture::with_seed(1);
            let verifier = Verifier::new(fixture.store(), VerifierConfig::default()).unwrap();

            let mut receipt = fixture.receipt(counter);
            receipt.receipt_digest.0[byte] ^= 1 << bit;

            let verdict = verifier.verify(&receipt).await.unwrap();
            assert_eq!(verdict.reject_reason(), Some(RejectReason::DigestMismatch));
            assert_eq!(
                verifier.store().last_counter(&fixture.hardware_identity).await.unwrap(),
                0
            );
        });
    }

    #[test]
    fn prop_replayed_counter_always_rejected(last in 1u64..u64::MAX, delta in 0u64..1000) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let fixture = TestFixture::with_seed(2);
            let verifier = Verifier::new(fixture.store(), VerifierConfig::default()).unwrap();
            assert!(verifier.verify(&fixture.receipt(last)).await.unwrap().is_accepted());

            let replay = last.saturating_sub(delta);
            let verdict = verifier.verify(&fixture.receipt(replay)).await.unwrap();
            assert_eq!(verdict.reject_reason(), Some(RejectReason::ReplayDetected));
        });
    }
}
