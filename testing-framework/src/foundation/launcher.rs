// File: testing-framework/src/foundation/launcher.rs
//
// Node Launchers
//
// A launcher turns a node description plus leased ports into a running node.
// The provisioner only talks to the `NodeLauncher` / `NodeInstance` seam, so
// foundations can be backed by in-process dev chains or by spawned node
// binaries (see `process.rs`) without the runner noticing.

use super::ports::NodePorts;
use crate::chain::{ChainClient, DevChain, DevChainClient};
use crate::config::{ChainConfig, NodeSpec};
use crate::error::HarnessError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Everything a launcher needs to start one node.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    /// Node name and role
    pub node: &'a NodeSpec,
    /// Position in start order (0 is the bootnode)
    pub index: usize,
    /// Leased ports
    pub ports: NodePorts,
    /// Node base path
    pub data_dir: PathBuf,
    /// File receiving the node's stdout and stderr
    pub log_path: PathBuf,
    /// Chain parameters
    pub chain: &'a ChainConfig,
    /// Addresses of nodes to join, empty for the first node
    pub bootnodes: &'a [String],
}

/// Starts nodes.
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    /// Start a node. Returning does not mean the node is ready.
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<Box<dyn NodeInstance>, HarnessError>;
}

/// A started node.
#[async_trait]
pub trait NodeInstance: Send + Sync {
    /// Node name
    fn name(&self) -> &str;

    /// RPC endpoint
    fn endpoint(&self) -> &str;

    /// Address other nodes use to join this one
    fn bootnode_address(&self) -> String;

    /// `Ok(true)` once the node accepts connections.
    ///
    /// Errors when the node can never become ready (it exited, or hit a port
    /// conflict).
    async fn is_ready(&self) -> Result<bool, HarnessError>;

    /// Client connected to this node
    fn client(&self) -> Arc<dyn ChainClient>;

    /// Stop the node. Must tolerate being called on a node that already stopped.
    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Launches nodes as in-process [`DevChain`] views.
///
/// The first node of a foundation creates a chain; nodes started with
/// bootnodes join the chain of the node they point at, the way zombie nodes
/// peer with their bootnode and converge on one chain.
#[derive(Default)]
pub struct InProcessLauncher {
    peers: Arc<Mutex<HashMap<String, Weak<DevChain>>>>,
    startup_delay: Option<Duration>,
}

impl InProcessLauncher {
    /// Launcher whose nodes are ready immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes report ready only after `delay` has elapsed on the tokio clock.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = Some(delay);
        self
    }
}

#[async_trait]
impl NodeLauncher for InProcessLauncher {
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<Box<dyn NodeInstance>, HarnessError> {
        let p2p_address = format!("127.0.0.1:{}", request.ports.p2p);

        let chain = match request.bootnodes.first() {
            Some(bootnode) => self
                .peers
                .lock()
                .get(bootnode)
                .and_then(Weak::upgrade)
                .ok_or_else(|| HarnessError::NodeStartup {
                    node: request.node.name.clone(),
                    reason: format!("bootnode {} is not reachable", bootnode),
                })?,
            None => Arc::new(DevChain::new(request.chain.clone())),
        };
        self.peers
            .lock()
            .insert(p2p_address.clone(), Arc::downgrade(&chain));

        log::debug!(
            "Started in-process node {} ({}) rpc={} p2p={}",
            request.node.name,
            request.node.role,
            request.ports.rpc,
            request.ports.p2p
        );

        Ok(Box::new(InProcessNode {
            name: request.node.name.clone(),
            endpoint: format!("inproc://127.0.0.1:{}", request.ports.rpc),
            p2p_address,
            client: DevChainClient::new(chain),
            ready_at: self.startup_delay.map(|delay| Instant::now() + delay),
            peers: self.peers.clone(),
        }))
    }
}

struct InProcessNode {
    name: String,
    endpoint: String,
    p2p_address: String,
    client: DevChainClient,
    ready_at: Option<Instant>,
    peers: Arc<Mutex<HashMap<String, Weak<DevChain>>>>,
}

#[async_trait]
impl NodeInstance for InProcessNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bootnode_address(&self) -> String {
        self.p2p_address.clone()
    }

    async fn is_ready(&self) -> Result<bool, HarnessError> {
        if !self.client.is_running() {
            return Err(HarnessError::NodeStartup {
                node: self.name.clone(),
                reason: "node stopped".to_string(),
            });
        }
        Ok(self.ready_at.map_or(true, |at| Instant::now() >= at))
    }

    fn client(&self) -> Arc<dyn ChainClient> {
        Arc::new(self.client.clone())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        if self.client.is_running() {
            self.client.stop();
            self.peers.lock().remove(&self.p2p_address);
            log::debug!("Stopped in-process node {}", self.name);
        }
        Ok(())
    }
}
