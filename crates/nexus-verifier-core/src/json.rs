//! Single-receipt JSON form.
//!
//! ```json
//! {
//!   "hardware_identity": "0x…",   // 32 bytes hex
//!   "firmware_hash": "0x…",       // 32 bytes hex, may be omitted or null
//!   "execution_hash": "0x…",      // 32 bytes hex
//!   "receipt_digest": "0x…",      // 32 bytes hex
//!   "counter": 123,               // u64, integer or decimal string
//!   "digest_layout": "NEXUS_RCT_V1" // optional
//! }
//! ```
//!
//! Hex values may carry a `0x` marker. An omitted firmware hash is reported
//! as absent, never replaced by a placeholder.

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::receipt::Receipt;
use crate::types::{decode_hex32, ExecutionHash, FirmwareHash, HardwareId, ReceiptDigest};

mod fields {
    pub const HARDWARE_IDENTITY: &str = "hardware_identity";
    pub const FIRMWARE_HASH: &str = "firmware_hash";
    pub const EXECUTION_HASH: &str = "execution_hash";
    pub const RECEIPT_DIGEST: &str = "receipt_digest";
    pub const COUNTER: &str = "counter";
    pub const DIGEST_LAYOUT: &str = "digest_layout";
}

/// Audit context accumulated while parsing, attached to any error.
#[derive(Default)]
struct ParseContext {
    hardware_identity: Option<HardwareId>,
    counter: Option<u64>,
}

impl ParseContext {
    fn fail(&self, reason: impl Into<String>) -> CoreError {
        CoreError::MalformedReceipt {
            reason: reason.into(),
            hardware_identity: self.hardware_identity,
            counter: self.counter,
        }
    }
}

/// Parse a JSON receipt.
pub fn parse_json_receipt(json: &str) -> Result<Receipt> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| CoreError::malformed(format!("invalid JSON: {e}")))?;
    receipt_from_value(&value)
}

/// Convert an already-parsed JSON value into a receipt.
pub fn receipt_from_value(value: &Value) -> Result<Receipt> {
    let mut ctx = ParseContext::default();
    let obj = value
        .as_object()
        .ok_or_else(|| ctx.fail("expected a JSON object"))?;

    // Identity and counter first so later failures can still be audited.
    let hardware_identity =
        HardwareId(required_hex32(obj, fields::HARDWARE_IDENTITY, &ctx)?);
    ctx.hardware_identity = Some(hardware_identity);

    let counter = parse_counter(obj, &ctx)?;
    ctx.counter = Some(counter);

    let firmware_hash = match obj.get(fields::FIRMWARE_HASH) {
        None | Some(Value::Null) => None,
        Some(v) => Some(FirmwareHash(hex32_value(v, fields::FIRMWARE_HASH, &ctx)?)),
    };

    let execution_hash = ExecutionHash(required_hex32(obj, fields::EXECUTION_HASH, &ctx)?);
    let receipt_digest = ReceiptDigest(required_hex32(obj, fields::RECEIPT_DIGEST, &ctx)?);

    let declared_layout = match obj.get(fields::DIGEST_LAYOUT) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ctx.fail("digest_layout must be a string")),
    };

    Ok(Receipt {
        hardware_identity,
        firmware_hash,
        execution_hash,
        counter,
        receipt_digest,
        declared_layout,
    })
}

fn required_hex32(obj: &Map<String, Value>, name: &str, ctx: &ParseContext) -> Result<[u8; 32]> {
    let value = obj
        .get(name)
        .ok_or_else(|| ctx.fail(format!("missing field {name}")))?;
    hex32_value(value, name, ctx)
}

fn hex32_value(value: &Value, name: &str, ctx: &ParseContext) -> Result<[u8; 32]> {
    let s = value
        .as_str()
        .ok_or_else(|| ctx.fail(format!("{name} must be a hex string")))?;
    decode_hex32(s).map_err(|e| match e {
        hex::FromHexError::InvalidStringLength | hex::FromHexError::OddLength => {
            ctx.fail(format!("{name} must be exactly 32 bytes"))
        }
        other => ctx.fail(format!("{name} is not valid hex: {other}")),
    })
}

fn parse_counter(obj: &Map<String, Value>, ctx: &ParseContext) -> Result<u64> {
    let value = obj
        .get(fields::COUNTER)
        .ok_or_else(|| ctx.fail("missing field counter"))?;

    match value {
        Value::Number(n) => {
            if let Some(c) = n.as_u64() {
                Ok(c)
            } else if n.as_i64().is_some() {
                Err(ctx.fail(format!("counter must be non-negative, got {n}")))
            } else {
                // Floats, including integers beyond u64 that serde_json
                // degrades to f64.
                Err(ctx.fail(format!("counter must be an integer within u64, got {n}")))
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('-') {
                return Err(ctx.fail(format!("counter must be non-negative, got {trimmed}")));
            }
            trimmed
                .parse::<u64>()
                .map_err(|e| ctx.fail(format!("counter {trimmed:?} is not a u64: {e}")))
        }
        Value::Null => Err(ctx.fail("missing field counter")),
        _ => Err(ctx.fail("counter must be an integer")),
    }
}

/// Serialize a receipt to its JSON value.
///
/// Absent optional fields are omitted.
pub fn receipt_to_value(receipt: &Receipt) -> Value {
    let mut obj = Map::new();
    obj.insert(
        fields::HARDWARE_IDENTITY.into(),
        Value::String(receipt.hardware_identity.to_prefixed_hex()),
    );
    if let Some(fw) = &receipt.firmware_hash {
        obj.insert(fields::FIRMWARE_HASH.into(), Value::String(fw.to_prefixed_hex()));
    }
    obj.insert(
        fields::EXECUTION_HASH.into(),
        Value::String(receipt.execution_hash.to_prefixed_hex()),
    );
    obj.insert(
        fields::RECEIPT_DIGEST.into(),
        Value::String(receipt.receipt_digest.to_prefixed_hex()),
    );
    obj.insert(fields::COUNTER.into(), Value::from(receipt.counter));
    if let Some(layout) = &receipt.declared_layout {
        obj.insert(fields::DIGEST_LAYOUT.into(), Value::String(layout.clone()));
    }
    Value::Object(obj)
}

/// Serialize a receipt to a compact JSON string.
pub fn encode_json_receipt(receipt: &Receipt) -> String {
    receipt_to_value(receipt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_json() -> Value {
        json!({
            "hardware_identity": format!("0x{}", "00".repeat(32)),
            "firmware_hash": format!("0x{}", "11".repeat(32)),
            "execution_hash": "22".repeat(32),
            "receipt_digest": format!("0x{}", "33".repeat(32)),
            "counter": 1
        })
    }

    fn expect_malformed(value: Value) -> CoreError {
        let err = parse_json_receipt(&value.to_string()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedReceipt { .. }), "{err:?}");
        err
    }

    #[test]
    fn test_parse_valid() {
        let receipt = parse_json_receipt(&valid_json().to_string()).unwrap();
        assert_eq!(receipt.hardware_identity, HardwareId::ZERO);
        assert_eq!(receipt.firmware_hash, Some(FirmwareHash::from_bytes([0x11; 32])));
        assert_eq!(receipt.execution_hash, ExecutionHash::from_bytes([0x22; 32]));
        assert_eq!(receipt.receipt_digest, ReceiptDigest::from_bytes([0x33; 32]));
        assert_eq!(receipt.counter, 1);
        assert_eq!(receipt.declared_layout, None);
    }

    #[test]
    fn test_firmware_absent_is_not_defaulted() {
        let mut v = valid_json();
        v.as_object_mut().unwrap().remove("firmware_hash");
        assert_eq!(parse_json_receipt(&v.to_string()).unwrap().firmware_hash, None);

        v["firmware_hash"] = Value::Null;
        assert_eq!(parse_json_receipt(&v.to_string()).unwrap().firmware_hash, None);
    }

    #[test]
    fn test_short_field_rejected_with_audit_context() {
        let mut v = valid_json();
        v["execution_hash"] = json!("0x1234");
        let err = expect_malformed(v);
        assert_eq!(err.hardware_identity(), Some(HardwareId::ZERO));
        assert_eq!(err.counter(), Some(1));
    }

    #[test]
    fn test_long_field_rejected() {
        let mut v = valid_json();
        v["receipt_digest"] = json!("ab".repeat(33));
        expect_malformed(v);
    }

    #[test]
    fn test_bad_hex_rejected() {
        let mut v = valid_json();
        v["firmware_hash"] = json!("zz".repeat(32));
        expect_malformed(v);
    }

    #[test]
    fn test_counter_edge_cases() {
        let mut v = valid_json();
        v.as_object_mut().unwrap().remove("counter");
        expect_malformed(v.clone());

        v["counter"] = json!(-1);
        expect_malformed(v.clone());

        v["counter"] = json!(1.5);
        expect_malformed(v.clone());

        v["counter"] = json!("not a number");
        expect_malformed(v.clone());

        v["counter"] = json!("18446744073709551616");
        expect_malformed(v.clone());

        v["counter"] = json!(u64::MAX);
        assert_eq!(parse_json_receipt(&v.to_string()).unwrap().counter, u64::MAX);

        v["counter"] = json!("42");
        assert_eq!(parse_json_receipt(&v.to_string()).unwrap().counter, 42);
    }

    #[test]
    fn test_counter_beyond_u64_as_number_rejected() {
        let raw = valid_json()
            .to_string()
            .replace("\"counter\":1", "\"counter\":18446744073709551616");
        let err = parse_json_receipt(&raw).unwrap_err();
        assert!(matches!(err, CoreError::MalformedReceipt { .. }));
    }

    #[test]
    fn test_not_json_or_not_object() {
        assert!(matches!(
            parse_json_receipt("{not json"),
            Err(CoreError::MalformedReceipt { .. })
        ));
        assert!(matches!(
            parse_json_receipt("[1,2,3]"),
            Err(CoreError::MalformedReceipt { .. })
        ));
    }

    #[test]
    fn test_encode_then_parse() {
        let mut v = valid_json();
        v["digest_layout"] = json!("NEXUS_RCT_V1");
        let receipt = parse_json_receipt(&v.to_string()).unwrap();
        let encoded = encode_json_receipt(&receipt);
        assert_eq!(parse_json_receipt(&encoded).unwrap(), receipt);
        assert!(encoded.contains("\"counter\":1"));
    }
}
