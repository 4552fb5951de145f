// File: testing-framework/src/chain/mod.rs
//
// Chain Client Collaborator
//
// The harness never encodes or executes chain logic itself beyond what the
// in-process dev chain needs. Test code reaches a node through the
// `ChainClient` trait, whether the node is an in-process `DevChain` or a
// spawned node binary reached over JSON-RPC.

/// Well-known development accounts and random account generation
pub mod accounts;
/// Assertion helpers over any `ChainClient`
pub mod assertions;
/// In-process ephemeral chain backing dev and simulated zombie foundations
pub mod dev_chain;
/// JSON-RPC client for spawned node binaries
pub mod rpc_client;
/// Transfer transaction building, signing and encoding
pub mod transaction;

pub use accounts::{DevAccount, PrivateKey};
pub use dev_chain::{DevChain, DevChainClient};
pub use rpc_client::RpcClient;
pub use transaction::{build_transfer, FeeParams, SignedTransaction, TransferTransaction};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Parse a `0x`-prefixed (or bare) hex string into a fixed-size array.
fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N]> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).with_context(|| format!("Invalid hex '{}'", s))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("Expected {} bytes, got {}", N, b.len()))
}

macro_rules! fixed_bytes_type {
    ($name:ident, $len:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes
            pub const LEN: usize = $len;

            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                parse_fixed_hex::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes_type!(Address, 20, "20-byte EVM account address");
fixed_bytes_type!(TxHash, 32, "32-byte keccak hash (transactions and blocks)");

/// Outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the included transaction
    pub transaction_hash: TxHash,
    /// Block the transaction was included in
    pub block_number: u64,
    /// Whether execution succeeded
    pub success: bool,
    /// Gas charged
    pub gas_used: u64,
}

/// Summary of a sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub number: u64,
    /// Block hash
    pub hash: TxHash,
    /// Hashes of the transactions included, in execution order
    pub transactions: Vec<TxHash>,
}

/// Consumed interface of a connected chain node.
///
/// Implemented by [`DevChainClient`] for in-process nodes and by
/// [`RpcClient`] for spawned node binaries.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// EVM chain id reported by the node
    async fn chain_id(&self) -> Result<u64>;

    /// Height of the best block
    async fn block_number(&self) -> Result<u64>;

    /// Free balance of `address` at the best block
    async fn balance(&self, address: &Address) -> Result<u128>;

    /// Next usable nonce for `address`, counting transactions already pooled
    async fn nonce(&self, address: &Address) -> Result<u64>;

    /// Submit a signed transaction to the pool
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxHash>;

    /// Receipt of an included transaction, `None` while still pending
    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>>;

    /// Seal a block with the pooled transactions (manual sealing)
    async fn create_block(&self) -> Result<BlockInfo>;
}
