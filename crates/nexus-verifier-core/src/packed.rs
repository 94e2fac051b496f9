//! Packed binary batch form.
//!
//! A batch is a plain concatenation of fixed-size v1 records with no header:
//!
//! ```text
//! offset  len  field
//!      0    1  version (0x01)
//!      1   32  hardware_identity
//!     33   32  firmware_hash
//!     65   32  execution_hash
//!     97    8  counter (big-endian)
//!    105   32  receipt_digest
//! ```
//!
//! Record order is preserved. The packed form has no way to express an absent
//! firmware hash.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::receipt::Receipt;
use crate::types::{ExecutionHash, FirmwareHash, HardwareId, ReceiptDigest, FIELD_LEN};

/// Version byte of a v1 record.
pub const PACKED_V1_VERSION: u8 = 0x01;

/// Size of a v1 record in bytes.
pub const PACKED_V1_RECORD_LEN: usize = 1 + FIELD_LEN * 3 + 8 + FIELD_LEN;

/// Number of records in a buffer, checking the length is exact.
pub fn packed_record_count(len: usize) -> Result<usize> {
    if len % PACKED_V1_RECORD_LEN != 0 {
        return Err(CoreError::TruncatedBatch {
            len,
            record_len: PACKED_V1_RECORD_LEN,
        });
    }
    Ok(len / PACKED_V1_RECORD_LEN)
}

/// Decode a packed batch.
///
/// The whole buffer is validated before any record is returned: a bad length
/// or an unknown version byte anywhere fails the entire batch.
pub fn decode_packed(data: &[u8]) -> Result<Vec<Receipt>> {
    let count = packed_record_count(data.len())?;
    let mut buf = data;
    let mut receipts = Vec::with_capacity(count);

    for index in 0..count {
        let version = buf.get_u8();
        if version != PACKED_V1_VERSION {
            return Err(CoreError::UnsupportedVersion { index, version });
        }

        let hardware_identity = HardwareId(take_field(&mut buf));
        let firmware_hash = FirmwareHash(take_field(&mut buf));
        let execution_hash = ExecutionHash(take_field(&mut buf));
        let counter = buf.get_u64();
        let receipt_digest = ReceiptDigest(take_field(&mut buf));

        receipts.push(Receipt {
            hardware_identity,
            firmware_hash: Some(firmware_hash),
            execution_hash,
            counter,
            receipt_digest,
            declared_layout: None,
        });
    }

    debug_assert!(!buf.has_remaining());
    Ok(receipts)
}

fn take_field(buf: &mut &[u8]) -> [u8; FIELD_LEN] {
    let mut field = [0u8; FIELD_LEN];
    buf.copy_to_slice(&mut field);
    field
}

/// Encode receipts into a packed v1 batch.
///
/// Fails with `MalformedReceipt` if any receipt lacks a firmware hash.
pub fn encode_packed(receipts: &[Receipt]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(receipts.len() * PACKED_V1_RECORD_LEN);

    for receipt in receipts {
        let firmware_hash = receipt.firmware_hash.ok_or_else(|| CoreError::MalformedReceipt {
            reason: "firmware hash is absent; packed form cannot represent it".into(),
            hardware_identity: Some(receipt.hardware_identity),
            counter: Some(receipt.counter),
        })?;

        buf.put_u8(PACKED_V1_VERSION);
        buf.put_slice(receipt.hardware_identity.as_bytes());
        buf.put_slice(firmware_hash.as_bytes());
        buf.put_slice(receipt.execution_hash.as_bytes());
        buf.put_u64(receipt.counter);
        buf.put_slice(receipt.receipt_digest.as_bytes());
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::KeccakDigestEngine;
    use crate::receipt::ReceiptBuilder;
    use proptest::prelude::*;

    fn receipt(seed: u8, counter: u64) -> Receipt {
        ReceiptBuilder::new(HardwareId::from_bytes([seed; 32]), counter)
            .firmware(FirmwareHash::from_bytes([seed.wrapping_add(1); 32]))
            .execution(ExecutionHash::from_bytes([seed.wrapping_add(2); 32]))
            .seal(&KeccakDigestEngine::default())
    }

    #[test]
    fn test_record_len() {
        assert_eq!(PACKED_V1_RECORD_LEN, 137);
    }

    #[test]
    fn test_empty_buffer_is_empty_batch() {
        assert!(decode_packed(&[]).unwrap().is_empty());
        assert!(encode_packed(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_field_offsets() {
        let r = receipt(0xa0, 0x0102_0304_0506_0708);
        let bytes = encode_packed(std::slice::from_ref(&r)).unwrap();

        assert_eq!(bytes[0], PACKED_V1_VERSION);
        assert_eq!(&bytes[1..33], r.hardware_identity.as_bytes());
        assert_eq!(&bytes[33..65], r.firmware_hash.unwrap().as_bytes());
        assert_eq!(&bytes[65..97], r.execution_hash.as_bytes());
        assert_eq!(&bytes[97..105], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[105..137], r.receipt_digest.as_bytes());
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let bytes = encode_packed(&[receipt(1, 1), receipt(2, 2)]).unwrap();
        let err = decode_packed(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            CoreError::TruncatedBatch {
                len: 2 * PACKED_V1_RECORD_LEN - 1,
                record_len: PACKED_V1_RECORD_LEN
            }
        );
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = encode_packed(&[receipt(1, 1), receipt(2, 2)])
            .unwrap()
            .to_vec();
        bytes[PACKED_V1_RECORD_LEN] = 0x02;
        assert_eq!(
            decode_packed(&bytes).unwrap_err(),
            CoreError::UnsupportedVersion {
                index: 1,
                version: 0x02
            }
        );
    }

    #[test]
    fn test_absent_firmware_cannot_be_packed() {
        let r = ReceiptBuilder::new(HardwareId::from_bytes([9; 32]), 4)
            .claimed_digest(ReceiptDigest::ZERO);
        let err = encode_packed(&[receipt(1, 1), r]).unwrap_err();
        assert_eq!(err.hardware_identity(), Some(HardwareId::from_bytes([9; 32])));
        assert_eq!(err.counter(), Some(4));
    }

    #[test]
    fn test_declared_layout_is_not_packed() {
        let mut r = receipt(3, 3);
        r.declared_layout = Some("NEXUS_RCT_V1".into());
        let decoded = decode_packed(&encode_packed(&[r.clone()]).unwrap()).unwrap();
        assert_eq!(decoded[0].declared_layout, None);
        assert_eq!(decoded[0].receipt_digest, r.receipt_digest);
    }

    #[test]
    fn test_sizes_0_1_50_preserve_order() {
        for n in [0usize, 1, 50] {
            let receipts: Vec<Receipt> = (0..n).map(|i| receipt(i as u8, i as u64 + 1)).collect();
            let bytes = encode_packed(&receipts).unwrap();
            assert_eq!(bytes.len(), n * PACKED_V1_RECORD_LEN);
            assert_eq!(decode_packed(&bytes).unwrap(), receipts);
        }
    }

    fn arb_receipt() -> impl Strategy<Value = Receipt> {
        (
            any::<[u8; 32]>(),
            any::<[u8; 32]>(),
            any::<[u8; 32]>(),
            any::<u64>(),
            any::<[u8; 32]>(),
        )
            .prop_map(|(hw, fw, exec, counter, digest)| Receipt {
                hardware_identity: HardwareId(hw),
                firmware_hash: Some(FirmwareHash(fw)),
                execution_hash: ExecutionHash(exec),
                counter,
                receipt_digest: ReceiptDigest(digest),
                declared_layout: None,
            })
    }

    proptest! {
        #[test]
        fn prop_packed_preserves_records(receipts in prop::collection::vec(arb_receipt(), 0..50)) {
            let bytes = encode_packed(&receipts).unwrap();
            prop_assert_eq!(decode_packed(&bytes).unwrap(), receipts);
        }

        #[test]
        fn prop_non_multiple_lengths_rejected(len in 1usize..(PACKED_V1_RECORD_LEN * 3)) {
            prop_assume!(len % PACKED_V1_RECORD_LEN != 0);
            let data = vec![PACKED_V1_VERSION; len];
            let is_truncated = matches!(decode_packed(&data), Err(CoreError::TruncatedBatch { .. }));
            prop_assert!(is_truncated);
        }
    }
}
