//! Batch processing of packed receipts.
//!
//! A batch is validated structurally as a whole, then each record runs
//! through the same [`Verifier`] in order. A rejected record never stops
//! the batch; a storage failure does.

use serde::Serialize;
use tracing::{debug, info};

use nexus_verifier_core::{decode_packed, packed::packed_record_count, DigestEngine, Receipt};
use nexus_verifier_store::PolicyStore;

use crate::error::BatchError;
use crate::verifier::{Verdict, Verifier};

/// Per-record outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<Verdict>,
}

impl BatchReport {
    /// Number of records decided.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check if no record was decided.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of accepted records.
    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().filter(|v| v.is_accepted()).count()
    }

    /// Number of rejected records.
    pub fn rejected_count(&self) -> usize {
        self.len() - self.accepted_count()
    }

    /// Acceptance bitset: bit `i % 8` of byte `i / 8` is set iff record `i`
    /// was accepted.
    pub fn accepted_bitset(&self) -> Vec<u8> {
        let mut bits = vec![0u8; self.len().div_ceil(8)];
        for (i, verdict) in self.outcomes.iter().enumerate() {
            if verdict.is_accepted() {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        bits
    }
}

/// Runs packed batches through a verifier.
pub struct BatchProcessor<'v, S: PolicyStore, E: DigestEngine> {
    verifier: &'v Verifier<S, E>,
}

impl<'v, S: PolicyStore, E: DigestEngine> BatchProcessor<'v, S, E> {
    /// Create a processor over `verifier`.
    pub fn new(verifier: &'v Verifier<S, E>) -> Self {
        Self { verifier }
    }

    /// Decode and verify a packed v1 batch.
    pub async fn process(&self, data: &[u8]) -> Result<BatchReport, BatchError> {
        let max = self.verifier.config().max_batch_records;
        let records = packed_record_count(data.len()).map_err(BatchError::Malformed)?;
        if records > max {
            return Err(BatchError::TooLarge { records, max });
        }

        let receipts = decode_packed(data).map_err(BatchError::Malformed)?;
        debug!(records, "decoded packed batch");
        self.process_receipts(&receipts).await
    }

    /// Verify already-decoded receipts in order.
    pub async fn process_receipts(&self, receipts: &[Receipt]) -> Result<BatchReport, BatchError> {
        let max = self.verifier.config().max_batch_records;
        if receipts.len() > max {
            return Err(BatchError::TooLarge {
                records: receipts.len(),
                max,
            });
        }

        let mut report = BatchReport {
            outcomes: Vec::with_capacity(receipts.len()),
        };

        for (index, receipt) in receipts.iter().enumerate() {
            match self.verifier.verify(receipt).await {
                Ok(verdict) => report.outcomes.push(verdict),
                Err(source) => {
                    return Err(BatchError::StorageUnavailable {
                        index,
                        partial: report,
                        source,
                    })
                }
            }
        }

        info!(
            records = report.len(),
            accepted = report.accepted_count(),
            rejected = report.rejected_count(),
            "batch processed"
        );
        Ok(report)
    }
}

impl<S: PolicyStore, E: DigestEngine> Verifier<S, E> {
    /// Decode and verify a packed v1 batch.
    pub async fn verify_batch(&self, data: &[u8]) -> Result<BatchReport, BatchError> {
        BatchProcessor::new(self).process(data).await
    }
}
