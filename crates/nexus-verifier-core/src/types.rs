//! Strong type definitions for the Nexus verifier.
//!
//! Every 32-byte receipt field is its own newtype so a firmware hash can never
//! be passed where a hardware identity is expected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

/// Width in bytes of every fixed-size receipt field.
pub const FIELD_LEN: usize = 32;

/// Strip an optional two-character `0x`/`0X` marker from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Decode a hex string (optionally `0x`-prefixed) into exactly 32 bytes.
pub fn decode_hex32(s: &str) -> Result<[u8; FIELD_LEN], hex::FromHexError> {
    let bytes = hex::decode(strip_hex_prefix(s))?;
    if bytes.len() != FIELD_LEN {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; FIELD_LEN];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! fixed_bytes_newtype {
    ($(#[$meta:meta])* $name:ident, $debug:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; FIELD_LEN]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; FIELD_LEN]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; FIELD_LEN] {
                &self.0
            }

            /// Convert to lowercase hex (no prefix).
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Convert to lowercase hex with a `0x` prefix.
            pub fn to_prefixed_hex(&self) -> String {
                format!("0x{}", self.to_hex())
            }

            /// Parse from hex, accepting an optional `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                decode_hex32(s).map(Self)
            }

            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; FIELD_LEN]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($debug, "({})"), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; FIELD_LEN]> for $name {
            fn from(bytes: [u8; FIELD_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; FIELD_LEN] = slice.try_into()?;
                Ok(Self(arr))
            }
        }

        // Human-readable formats (JSON snapshots, CLI output) carry prefixed hex.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_prefixed_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    <[u8; FIELD_LEN]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

fixed_bytes_newtype!(
    /// Identity of a submitting hardware node.
    HardwareId,
    "HardwareId"
);

fixed_bytes_newtype!(
    /// Identifier of the firmware build that produced a receipt.
    FirmwareHash,
    "FirmwareHash"
);

fixed_bytes_newtype!(
    /// Opaque execution result bound into the digest. Never interpreted here.
    ExecutionHash,
    "ExecutionHash"
);

fixed_bytes_newtype!(
    /// A Keccak-256 receipt digest, either claimed or recomputed.
    ReceiptDigest,
    "ReceiptDigest"
);

impl ReceiptDigest {
    /// Constant-time equality. Examines every byte regardless of where the
    /// first difference is.
    pub fn ct_eq(&self, other: &ReceiptDigest) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}
