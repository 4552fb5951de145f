// File: testing-framework/src/foundation/mod.rs
//
// Foundations
//
// A foundation is the live chain environment a suite runs against: a single
// dev node with manual sealing, or a multi-node zombie network. It is
// provisioned right before the suite runs, owned by that run alone, and torn
// down right after it whatever the outcome.

/// Node launching seam and the in-process launcher
pub mod launcher;
/// Port range leasing
pub mod ports;
/// Node binary launcher
pub mod process;
/// Provisioning and teardown
pub mod provisioner;
/// Temporary node data and log directories
pub mod workspace;

pub use launcher::{InProcessLauncher, LaunchRequest, NodeInstance, NodeLauncher};
pub use ports::{NodePorts, PortAllocator, PortLease};
pub use process::ProcessLauncher;
pub use provisioner::{ProvisionOptions, ProvisionStats, Provisioner, TeardownSummary};
pub use workspace::NodeWorkspace;

use crate::chain::{Address, BlockInfo, ChainClient, Receipt, SignedTransaction, TxHash};
use crate::config::{ChainConfig, NodeRole, NodeSpec};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum::{Display, EnumString};

/// Kind of environment a suite runs against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FoundationKind {
    /// Single ephemeral node with manual block sealing
    Dev,
    /// Multi-node simulated network
    Zombie,
}

/// Public description of one node of a foundation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    /// Node name
    pub name: String,
    /// Node role
    pub role: NodeRole,
    /// RPC endpoint
    pub endpoint: String,
    /// Leased ports
    pub ports: NodePorts,
}

pub(crate) struct NodeHandle {
    pub(crate) spec: NodeSpec,
    pub(crate) ports: NodePorts,
    pub(crate) instance: Box<dyn NodeInstance>,
}

/// A provisioned environment.
///
/// Only the [`Provisioner`] creates and tears down foundations. Clients handed
/// out by [`Foundation::clients`] stop working once the foundation is torn
/// down.
pub struct Foundation {
    id: String,
    suite_id: String,
    kind: FoundationKind,
    chain: ChainConfig,
    pub(crate) nodes: Vec<NodeHandle>,
    pub(crate) lease: Option<PortLease>,
    pub(crate) workspace: Option<NodeWorkspace>,
    pub(crate) live: Arc<AtomicBool>,
    pub(crate) torn_down: bool,
    pub(crate) retained_logs: Option<PathBuf>,
}

impl Foundation {
    pub(crate) fn new(
        id: String,
        suite_id: &str,
        kind: FoundationKind,
        chain: ChainConfig,
        lease: PortLease,
        workspace: NodeWorkspace,
    ) -> Self {
        Self {
            id,
            suite_id: suite_id.to_string(),
            kind,
            chain,
            nodes: Vec::new(),
            lease: Some(lease),
            workspace: Some(workspace),
            live: Arc::new(AtomicBool::new(true)),
            torn_down: false,
            retained_logs: None,
        }
    }

    /// Unique foundation id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Suite owning this foundation
    pub fn suite_id(&self) -> &str {
        &self.suite_id
    }

    /// Foundation kind
    pub fn kind(&self) -> FoundationKind {
        self.kind
    }

    /// Chain parameters the nodes were started with
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain
    }

    /// Whether the foundation is still usable
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Whether teardown already ran
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Number of started nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Topology metadata, in start order
    pub fn topology(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .map(|node| NodeInfo {
                name: node.spec.name.clone(),
                role: node.spec.role,
                endpoint: node.instance.endpoint().to_string(),
                ports: node.ports,
            })
            .collect()
    }

    /// Workspace directory, while it exists
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace.as_ref().map(NodeWorkspace::path)
    }

    /// Directory kept on disk by teardown, if any
    pub fn retained_logs(&self) -> Option<&Path> {
        self.retained_logs.as_deref()
    }

    /// One client per node, in start order, guarded by the foundation's liveness.
    pub fn clients(&self) -> Vec<Arc<dyn ChainClient>> {
        self.nodes
            .iter()
            .map(|node| {
                Arc::new(FoundationClient {
                    node: node.spec.name.clone(),
                    inner: node.instance.client(),
                    live: self.live.clone(),
                }) as Arc<dyn ChainClient>
            })
            .collect()
    }
}

impl Drop for Foundation {
    fn drop(&mut self) {
        if !self.torn_down && !self.nodes.is_empty() {
            log::warn!("Foundation {} dropped without teardown", self.id);
        }
    }
}

/// Client that refuses every call once its foundation is torn down.
struct FoundationClient {
    node: String,
    inner: Arc<dyn ChainClient>,
    live: Arc<AtomicBool>,
}

impl FoundationClient {
    fn ensure_live(&self) -> Result<()> {
        if !self.live.load(Ordering::SeqCst) {
            bail!("Foundation of node {} has been torn down", self.node);
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FoundationClient {
    async fn chain_id(&self) -> Result<u64> {
        self.ensure_live()?;
        self.inner.chain_id().await
    }

    async fn block_number(&self) -> Result<u64> {
        self.ensure_live()?;
        self.inner.block_number().await
    }

    async fn balance(&self, address: &Address) -> Result<u128> {
        self.ensure_live()?;
        self.inner.balance(address).await
    }

    async fn nonce(&self, address: &Address) -> Result<u64> {
        self.ensure_live()?;
        self.inner.nonce(address).await
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxHash> {
        self.ensure_live()?;
        self.inner.submit_transaction(tx).await
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>> {
        self.ensure_live()?;
        self.inner.receipt(hash).await
    }

    async fn create_block(&self) -> Result<BlockInfo> {
        self.ensure_live()?;
        self.inner.create_block().await
    }
}
