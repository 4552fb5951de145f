//! Run configuration
//!
//! Options are read from an optional YAML file and can be overridden from the
//! command line (`RunConfig` is a flattened `clap::Args`).

use crate::error::HarnessError;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};

/// Default provisioning bound in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// First port handed out to foundations.
pub const DEFAULT_BASE_PORT: u16 = 30_000;

/// EVM chain id of the node's development chain spec.
pub const DEFAULT_CHAIN_ID: u64 = 1281;

/// Balance given to every pre-funded account at genesis.
pub const DEFAULT_GENESIS_BALANCE: u128 = 1 << 80;

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

const fn default_max_parallel_suites() -> usize {
    1
}

const fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

const fn default_genesis_balance() -> u128 {
    DEFAULT_GENESIS_BALANCE
}

const fn default_min_gas_price() -> u128 {
    crate::chain::transaction::MIN_GAS_PRICE
}

/// Role a node plays in a zombie topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeRole {
    /// Relay chain validator
    RelayValidator,
    /// Parachain collator running the spectre runtime
    Collator,
    /// Non-authoring full node
    FullNode,
    /// Single dev node with manual sealing
    Dev,
}

/// One node of a foundation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node name within the foundation
    pub name: String,
    /// Role flags passed to the node
    pub role: NodeRole,
}

impl NodeSpec {
    /// Create a node spec.
    pub fn new(name: impl Into<String>, role: NodeRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// The single node of a dev foundation.
    pub fn dev() -> Self {
        Self::new("dev", NodeRole::Dev)
    }
}

/// Node layout of a zombie foundation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Nodes in start order; the first one is the bootnode
    pub nodes: Vec<NodeSpec>,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            nodes: vec![
                NodeSpec::new("alice", NodeRole::RelayValidator),
                NodeSpec::new("bob", NodeRole::RelayValidator),
                NodeSpec::new("spectre-collator", NodeRole::Collator),
            ],
        }
    }
}

impl Topology {
    /// Reject empty topologies and duplicate node names.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.nodes.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "zombie topology has no nodes".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(HarnessError::InvalidConfig(
                    "topology node with empty name".to_string(),
                ));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(HarnessError::InvalidConfig(format!(
                    "duplicate node name '{}' in topology",
                    node.name
                )));
            }
        }
        Ok(())
    }
}

/// Chain parameters of the development chain spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// EVM chain id
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Minimum balance an account must keep; 0 disables reaping
    #[serde(default)]
    pub existential_deposit: u128,
    /// Lowest accepted gas price
    #[serde(default = "default_min_gas_price")]
    pub min_gas_price: u128,
    /// Balance of each pre-funded account
    #[serde(default = "default_genesis_balance")]
    pub genesis_balance: u128,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            existential_deposit: 0,
            min_gas_price: default_min_gas_price(),
            genesis_balance: DEFAULT_GENESIS_BALANCE,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct RunConfig {
    /// Bound on bringing a foundation up, in milliseconds.
    #[clap(name = "timeout-ms", long, default_value_t = default_timeout_ms())]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Keep node data and log directories of suites that did not pass.
    #[clap(name = "retain-logs-on-failure", long)]
    #[serde(default)]
    pub retain_logs_on_failure: bool,

    /// First port of the range leased to foundations.
    #[clap(name = "base-port", long, default_value_t = default_base_port())]
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Number of suites allowed to hold a foundation at the same time.
    #[clap(name = "max-parallel-suites", long, default_value_t = default_max_parallel_suites())]
    #[serde(default = "default_max_parallel_suites")]
    pub max_parallel_suites: usize,

    /// Optional bound on a single hook or case body, in milliseconds.
    #[clap(name = "case-timeout-ms", long)]
    #[serde(default)]
    pub case_timeout_ms: Option<u64>,

    /// Zombie foundation layout (file only).
    #[clap(skip)]
    #[serde(default)]
    pub topology: Topology,

    /// Chain spec parameters (file only).
    #[clap(skip)]
    #[serde(default)]
    pub chain: ChainConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retain_logs_on_failure: false,
            base_port: DEFAULT_BASE_PORT,
            max_parallel_suites: 1,
            case_timeout_ms: None,
            topology: Topology::default(),
            chain: ChainConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse run configuration")
    }

    /// Load a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Write the default configuration as YAML to `path`.
    pub fn generate_template(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(&Self::default())
            .context("Failed to serialize default configuration")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config template {}", path.display()))
    }

    /// Provisioning bound
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Per-body bound, if any
    pub fn case_timeout(&self) -> Option<Duration> {
        self.case_timeout_ms.map(Duration::from_millis)
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.timeout_ms == 0 {
            return Err(HarnessError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_parallel_suites == 0 {
            return Err(HarnessError::InvalidConfig(
                "max_parallel_suites must be at least 1".to_string(),
            ));
        }
        if self.base_port == 0 {
            return Err(HarnessError::InvalidConfig(
                "base_port must be non-zero".to_string(),
            ));
        }
        self.topology.validate()
    }
}
