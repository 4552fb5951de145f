//! JSON-RPC client for spawned node binaries
//!
//! Speaks the node's Ethereum-compatible RPC plus the manual-seal
//! `engine_createBlock` extension of dev nodes.

use super::transaction::SignedTransaction;
use super::{Address, BlockInfo, ChainClient, Receipt, TxHash};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Client for one node's HTTP RPC endpoint.
pub struct RpcClient {
    client: Client,
    endpoint: String,
    next_id: AtomicU32,
}

impl RpcClient {
    /// Create a client for `endpoint` (`http://host:port`, scheme optional).
    ///
    /// No request is made; use [`RpcClient::is_reachable`] to probe.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU32::new(1),
        })
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the node answers `eth_chainId`
    pub async fn is_reachable(&self) -> bool {
        self.request("eth_chainId", json!([])).await.is_ok()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!("RPC {} -> {}", self.endpoint, method);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request {} timed out after {:?}", method, REQUEST_TIMEOUT)
                } else if e.is_connect() {
                    anyhow!("Connection to {} failed: {}", self.endpoint, e)
                } else {
                    anyhow!("Network error: {}", e)
                }
            })?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown error")
            ));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON response: {}", e))?;

        if let Some(error) = rpc_response.error {
            return Err(anyhow!("RPC error {}: {}", error.code, error.message));
        }
        Ok(rpc_response.result.unwrap_or(Value::Null))
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(value: &Value) -> Result<u128> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow!("Expected hex quantity, got {}", value))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Quantity '{}' lacks 0x prefix", s))?;
    if digits.is_empty() {
        return Err(anyhow!("Empty quantity"));
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid quantity '{}'", s))
}

fn parse_u64(value: &Value) -> Result<u64> {
    let n = parse_quantity(value)?;
    u64::try_from(n).map_err(|_| anyhow!("Quantity {} overflows u64", n))
}

fn field<'a>(object: &'a Value, name: &str) -> Result<&'a Value> {
    object
        .get(name)
        .ok_or_else(|| anyhow!("Missing field '{}' in {}", name, object))
}

fn parse_hash(value: &Value) -> Result<TxHash> {
    value
        .as_str()
        .ok_or_else(|| anyhow!("Expected hash string, got {}", value))?
        .parse()
}

fn parse_receipt(value: &Value) -> Result<Receipt> {
    Ok(Receipt {
        transaction_hash: parse_hash(field(value, "transactionHash")?)?,
        block_number: parse_u64(field(value, "blockNumber")?)?,
        success: parse_quantity(field(value, "status")?)? == 1,
        gas_used: parse_u64(field(value, "gasUsed")?)?,
    })
}

fn parse_block(value: &Value) -> Result<BlockInfo> {
    let transactions = field(value, "transactions")?
        .as_array()
        .ok_or_else(|| anyhow!("Block transactions is not an array"))?
        .iter()
        .map(parse_hash)
        .collect::<Result<Vec<_>>>()?;
    Ok(BlockInfo {
        number: parse_u64(field(value, "number")?)?,
        hash: parse_hash(field(value, "hash")?)?,
        transactions,
    })
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> Result<u64> {
        parse_u64(&self.request("eth_chainId", json!([])).await?)
    }

    async fn block_number(&self) -> Result<u64> {
        parse_u64(&self.request("eth_blockNumber", json!([])).await?)
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        let result = self
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        parse_quantity(&result)
    }

    async fn nonce(&self, address: &Address) -> Result<u64> {
        let result = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        parse_u64(&result)
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxHash> {
        let result = self
            .request("eth_sendRawTransaction", json!([tx.raw_hex()]))
            .await?;
        let hash = parse_hash(&result)?;
        debug!("Submitted {} to {}", hash, self.endpoint);
        Ok(hash)
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    async fn create_block(&self) -> Result<BlockInfo> {
        // createEmpty = true, finalize = true
        self.request("engine_createBlock", json!([true, true]))
            .await
            .context("Manual sealing failed")?;
        let block = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        parse_block(&block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x501")).unwrap(), 1281);
        assert_eq!(
            parse_quantity(&json!("0x100000000000000000000")).unwrap(),
            1u128 << 80
        );
        assert!(parse_quantity(&json!("501")).is_err());
        assert!(parse_quantity(&json!("0x")).is_err());
        assert!(parse_quantity(&json!(12)).is_err());
        assert!(parse_u64(&json!("0x100000000000000000000")).is_err());
    }

    #[test]
    fn test_parse_receipt() {
        let value = json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "blockNumber": "0x2",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": []
        });
        let receipt = parse_receipt(&value).unwrap();
        assert_eq!(receipt.block_number, 2);
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);

        assert!(parse_receipt(&json!({ "blockNumber": "0x2" })).is_err());
    }

    #[test]
    fn test_parse_block() {
        let value = json!({
            "number": "0x3",
            "hash": format!("0x{}", "22".repeat(32)),
            "transactions": [format!("0x{}", "33".repeat(32))]
        });
        let block = parse_block(&value).unwrap();
        assert_eq!(block.number, 3);
        assert_eq!(block.transactions, vec![TxHash([0x33; 32])]);
    }

    #[test]
    fn test_connect_normalizes_scheme() {
        let client = RpcClient::connect("127.0.0.1:9944").unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9944");
        let client = RpcClient::connect("http://localhost:1").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = RpcClient::connect(&format!("127.0.0.1:{}", port)).unwrap();
        assert!(!client.is_reachable().await);
        assert!(client.block_number().await.is_err());
    }
}
