//! HTTP JSON-RPC lookups for the fetch-based dialects.
//!
//! The hash-only and headers dialects receive partial notifications and
//! complete them with `eth_getTransactionByHash` / `eth_getBlockByNumber`
//! over the chain's HTTP endpoint (derived from the ws url unless an
//! explicit rpc url is configured).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};

use chainfeed_core::error::TransportError;

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON-RPC client over one HTTP endpoint.
pub struct RpcFetcher {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            url: url.into(),
            http,
            // The subscribe request owns id 1 on the ws side; offset keeps
            // log lines unambiguous.
            next_id: AtomicU64::new(2),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let resp: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        resp.into_result()
    }

    /// `eth_getTransactionByHash`. `None` when the node no longer knows the
    /// hash (mined or evicted between notification and lookup).
    pub async fn transaction_by_hash(&self, hash: &str) -> Result<Option<Value>, TransportError> {
        let result = self.call("eth_getTransactionByHash", vec![json!(hash)]).await?;
        Ok(non_null(result))
    }

    /// `eth_getBlockByNumber(number, true)` — header plus full transaction
    /// objects.
    pub async fn block_by_number(&self, number: &str) -> Result<Option<Value>, TransportError> {
        let result = self
            .call("eth_getBlockByNumber", vec![json!(number), json!(true)])
            .await?;
        Ok(non_null(result))
    }
}

fn non_null(v: Value) -> Option<Value> {
    if v.is_null() {
        None
    } else {
        Some(v)
    }
}
