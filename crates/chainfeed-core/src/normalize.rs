//! Normalization of heterogeneous upstream transaction payloads.
//!
//! Upstream providers disagree on which fields are present and how they are
//! encoded; this module is the single funnel that turns any of those shapes
//! into a [`PendingTx`]. Quantity decoding goes through `U256` so 256-bit
//! values survive the hex-to-decimal conversion exactly.

use alloy_primitives::U256;
use chrono::Utc;
use serde_json::Value;

use crate::error::NormalizeError;
use crate::tx::{PendingTx, TxStatus};

/// Normalize one raw transaction object into the canonical record.
///
/// `status` is chosen by the caller: dialects streaming unconfirmed
/// transactions pass `Pending`, dialects streaming just-mined ones pass
/// `Confirmed`. The timestamp is the wall clock at decode time.
pub fn normalize(raw: &Value, chain_id: u64, status: TxStatus) -> Result<PendingTx, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

    let hash = require_hex_str(obj.get("hash"), "hash")?;
    let from = require_hex_str(obj.get("from"), "from")?;
    let to = match obj.get("to") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.to_ascii_lowercase()),
        Some(_) => {
            return Err(NormalizeError::MissingField { field: "to" });
        }
    };

    let value = decode_quantity(obj.get("value"), "value")?;
    let gas_limit = decode_quantity(obj.get("gas"), "gas")?;
    let max_fee_per_gas = decode_optional_quantity(obj.get("maxFeePerGas"), "maxFeePerGas")?;
    let max_priority_fee_per_gas =
        decode_optional_quantity(obj.get("maxPriorityFeePerGas"), "maxPriorityFeePerGas")?;

    // Effective gas price: the first defined of gasPrice, maxFeePerGas, 0.
    let gas_price = match decode_optional_quantity(obj.get("gasPrice"), "gasPrice")? {
        Some(p) => p,
        None => max_fee_per_gas.clone().unwrap_or_else(|| "0".to_string()),
    };

    let nonce = decode_small(obj.get("nonce"), "nonce")?;
    let tx_type = match decode_small(obj.get("type"), "type")? {
        t @ (0 | 2) => t as u8,
        _ => 0,
    };

    let input = match obj.get("input") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => "0x".to_string(),
    };

    Ok(PendingTx {
        hash,
        chain_id,
        from,
        to,
        value,
        gas_price,
        gas_limit,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        input,
        nonce,
        tx_type,
        timestamp: Utc::now(),
        status,
    })
}

fn require_hex_str(v: Option<&Value>, field: &'static str) -> Result<String, NormalizeError> {
    match v {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.to_ascii_lowercase()),
        _ => Err(NormalizeError::MissingField { field }),
    }
}

/// Decode a `0x`-prefixed hex quantity to a base-10 string. Absent and null
/// map to `"0"`.
fn decode_quantity(v: Option<&Value>, field: &'static str) -> Result<String, NormalizeError> {
    Ok(decode_optional_quantity(v, field)?.unwrap_or_else(|| "0".to_string()))
}

fn decode_optional_quantity(
    v: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, NormalizeError> {
    let s = match v {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(NormalizeError::InvalidQuantity {
                field,
                value: other.to_string(),
            })
        }
    };
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        // Some providers encode zero as a bare "0x".
        return Ok(Some("0".to_string()));
    }
    let n = U256::from_str_radix(digits, 16).map_err(|_| NormalizeError::InvalidQuantity {
        field,
        value: s.clone(),
    })?;
    Ok(Some(n.to_string()))
}

/// Decode a hex quantity expected to fit in 64 bits (nonce, type). Absent
/// maps to 0.
fn decode_small(v: Option<&Value>, field: &'static str) -> Result<u64, NormalizeError> {
    let s = match v {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(NormalizeError::InvalidQuantity {
                field,
                value: other.to_string(),
            })
        }
    };
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|_| NormalizeError::InvalidQuantity {
        field,
        value: s.clone(),
    })
}
