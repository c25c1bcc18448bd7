//! Per-dialect subscribe parameters and notification decoding.
//!
//! The dialect decides what goes into the `eth_subscribe` params and what
//! shape the session should expect back in `eth_subscription` notifications.
//! Payloads that need a follow-up HTTP fetch (bare hashes, block headers)
//! are turned into fetch instructions for the session to execute.

use serde_json::{json, Value};

use chainfeed_core::{Dialect, TxStatus};

/// What to do with one decoded notification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Normalize `raw` directly with the given status.
    Tx { raw: Value, status: TxStatus },
    /// Look up the full transaction by hash, then normalize as pending.
    FetchTx { hash: String },
    /// Fetch the block with transaction bodies; every transaction in it is
    /// emitted as confirmed.
    FetchBlock { number: String },
    /// Nothing to emit (removed mined tx, unrecognized shape).
    Skip,
}

/// Wire behavior of a [`Dialect`].
pub trait DialectWire {
    /// Params for the session's single `eth_subscribe` request.
    fn subscribe_params(&self) -> Vec<Value>;

    /// Interpret the `result` payload of one notification.
    fn decode_notification(&self, result: &Value) -> Decoded;
}

impl DialectWire for Dialect {
    fn subscribe_params(&self) -> Vec<Value> {
        match self {
            Dialect::FullPending => vec![
                json!("alchemy_pendingTransactions"),
                json!({"hashesOnly": false}),
            ],
            Dialect::FullMined => vec![
                json!("alchemy_minedTransactions"),
                json!({"hashesOnly": false}),
            ],
            Dialect::HashOnlyPending => vec![json!("newPendingTransactions")],
            Dialect::HeadersThenFetch => vec![json!("newHeads")],
        }
    }

    fn decode_notification(&self, result: &Value) -> Decoded {
        match self {
            Dialect::FullPending => {
                if result.is_object() {
                    Decoded::Tx { raw: result.clone(), status: TxStatus::Pending }
                } else {
                    Decoded::Skip
                }
            }
            Dialect::FullMined => {
                if result.get("removed").and_then(Value::as_bool).unwrap_or(false) {
                    return Decoded::Skip;
                }
                match result.get("transaction") {
                    Some(tx) if tx.is_object() => {
                        Decoded::Tx { raw: tx.clone(), status: TxStatus::Confirmed }
                    }
                    _ => Decoded::Skip,
                }
            }
            Dialect::HashOnlyPending => match result.as_str() {
                Some(hash) => Decoded::FetchTx { hash: hash.to_string() },
                None => Decoded::Skip,
            },
            Dialect::HeadersThenFetch => {
                match result.get("number").and_then(Value::as_str) {
                    Some(number) => Decoded::FetchBlock { number: number.to_string() },
                    None => Decoded::Skip,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_params_match_upstream_methods() {
        assert_eq!(
            Dialect::FullPending.subscribe_params()[0],
            json!("alchemy_pendingTransactions")
        );
        assert_eq!(
            Dialect::FullPending.subscribe_params()[1],
            json!({"hashesOnly": false})
        );
        assert_eq!(
            Dialect::FullMined.subscribe_params()[0],
            json!("alchemy_minedTransactions")
        );
        assert_eq!(
            Dialect::HashOnlyPending.subscribe_params(),
            vec![json!("newPendingTransactions")]
        );
        assert_eq!(Dialect::HeadersThenFetch.subscribe_params(), vec![json!("newHeads")]);
    }

    #[test]
    fn full_pending_decodes_inline_tx() {
        let result = json!({"hash": "0x01", "from": "0x02"});
        match Dialect::FullPending.decode_notification(&result) {
            Decoded::Tx { status, .. } => assert_eq!(status, TxStatus::Pending),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mined_removed_is_skipped() {
        let result = json!({"removed": true, "transaction": {"hash": "0x01", "from": "0x02"}});
        assert_eq!(Dialect::FullMined.decode_notification(&result), Decoded::Skip);
    }

    #[test]
    fn mined_kept_is_confirmed() {
        let result = json!({"removed": false, "transaction": {"hash": "0x01", "from": "0x02"}});
        match Dialect::FullMined.decode_notification(&result) {
            Decoded::Tx { status, raw } => {
                assert_eq!(status, TxStatus::Confirmed);
                assert_eq!(raw["hash"], "0x01");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn hash_only_requests_a_fetch() {
        let result = json!("0xabcdef");
        assert_eq!(
            Dialect::HashOnlyPending.decode_notification(&result),
            Decoded::FetchTx { hash: "0xabcdef".into() }
        );
    }

    #[test]
    fn header_requests_a_block_fetch() {
        let result = json!({"number": "0x10", "hash": "0xblock"});
        assert_eq!(
            Dialect::HeadersThenFetch.decode_notification(&result),
            Decoded::FetchBlock { number: "0x10".into() }
        );
    }

    #[test]
    fn malformed_payloads_are_skipped() {
        assert_eq!(
            Dialect::FullPending.decode_notification(&json!("0xhash")),
            Decoded::Skip
        );
        assert_eq!(
            Dialect::HashOnlyPending.decode_notification(&json!({"no": "hash"})),
            Decoded::Skip
        );
        assert_eq!(
            Dialect::HeadersThenFetch.decode_notification(&json!({})),
            Decoded::Skip
        );
    }
}
