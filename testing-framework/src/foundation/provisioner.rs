// File: testing-framework/src/foundation/provisioner.rs
//
// Foundation Provisioner
//
// Brings foundations up and down. Start-up of every node, including the wait
// for readiness, is bounded by the configured timeout, and so is the shutdown
// of each node. Whatever was started before a failure is torn down before the
// error is returned.

use super::launcher::{LaunchRequest, NodeInstance, NodeLauncher};
use super::ports::{PortAllocator, PORTS_PER_NODE};
use super::workspace::NodeWorkspace;
use super::{Foundation, FoundationKind, NodeHandle};
use crate::config::{ChainConfig, NodeSpec, RunConfig, Topology};
use crate::error::HarnessError;
use crate::orchestrator::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interval between readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Provisioning parameters.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Bound on starting every node of a foundation and waiting for it, and
    /// on stopping each node
    pub timeout: Duration,
    /// Node layout of zombie foundations
    pub topology: Topology,
    /// Chain parameters passed to every node
    pub chain: ChainConfig,
    /// First port leased to foundations
    pub base_port: u16,
    /// Interval between readiness probes
    pub poll_interval: Duration,
    /// Keep the workspace of foundations that fail to come up
    pub retain_logs_on_failure: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for ProvisionOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            timeout: config.timeout(),
            topology: config.topology.clone(),
            chain: config.chain.clone(),
            base_port: config.base_port,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retain_logs_on_failure: config.retain_logs_on_failure,
        }
    }
}

/// What teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    /// Nodes shut down by this call
    pub nodes_stopped: usize,
    /// Workspace kept on disk
    pub retained_logs: Option<PathBuf>,
}

/// Counters of provisioning activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionStats {
    /// Provision attempts that started launching nodes
    pub attempts: usize,
    /// Foundations handed out ready
    pub provisioned: usize,
    /// Teardowns executed (repeated calls on one foundation count once)
    pub torn_down: usize,
}

/// Provisions and tears down foundations.
pub struct Provisioner {
    launcher: Arc<dyn NodeLauncher>,
    ports: PortAllocator,
    clock: Arc<dyn Clock>,
    options: ProvisionOptions,
    next_id: AtomicU64,
    attempts: AtomicUsize,
    provisioned: AtomicUsize,
    torn_down: AtomicUsize,
    failed_workspaces: Mutex<HashMap<String, PathBuf>>,
}

impl Provisioner {
    /// Provisioner starting nodes through `launcher`.
    pub fn new(launcher: Arc<dyn NodeLauncher>, options: ProvisionOptions) -> Self {
        Self {
            launcher,
            ports: PortAllocator::new(options.base_port),
            clock: Arc::new(SystemClock),
            options,
            next_id: AtomicU64::new(0),
            attempts: AtomicUsize::new(0),
            provisioned: AtomicUsize::new(0),
            torn_down: AtomicUsize::new(0),
            failed_workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Use `clock` for readiness polling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Provisioning parameters
    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    /// Port allocator shared by every foundation of this provisioner
    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> ProvisionStats {
        ProvisionStats {
            attempts: self.attempts.load(Ordering::SeqCst),
            provisioned: self.provisioned.load(Ordering::SeqCst),
            torn_down: self.torn_down.load(Ordering::SeqCst),
        }
    }

    /// Workspace kept after the last failed provisioning for `suite_id`.
    ///
    /// Only set when `retain_logs_on_failure` is on. Taking it clears it.
    pub fn take_retained_logs(&self, suite_id: &str) -> Option<PathBuf> {
        self.failed_workspaces.lock().remove(suite_id)
    }

    fn node_specs(&self, kind: FoundationKind) -> Result<Vec<NodeSpec>, HarnessError> {
        match kind {
            FoundationKind::Dev => Ok(vec![NodeSpec::dev()]),
            FoundationKind::Zombie => {
                self.options.topology.validate()?;
                Ok(self.options.topology.nodes.clone())
            }
        }
    }

    /// Bring up a foundation of `kind` for `suite_id`.
    ///
    /// Fails with [`HarnessError::ProvisionTimeout`] when the nodes are not
    /// all ready within the timeout and with
    /// [`HarnessError::ProvisionConflict`] when resources are unavailable.
    /// Nothing started by a failed attempt is left running.
    pub async fn provision(
        &self,
        suite_id: &str,
        kind: FoundationKind,
    ) -> Result<Foundation, HarnessError> {
        self.provision_until(suite_id, kind, std::future::pending()).await
    }

    /// [`Provisioner::provision`], abandoned with [`HarnessError::Cancelled`]
    /// as soon as `abort` resolves. Nodes already started are torn down.
    pub async fn provision_until<F>(
        &self,
        suite_id: &str,
        kind: FoundationKind,
        abort: F,
    ) -> Result<Foundation, HarnessError>
    where
        F: Future<Output = ()>,
    {
        let nodes = self.node_specs(kind)?;
        let port_count = u16::try_from(nodes.len())
            .ok()
            .and_then(|n| n.checked_mul(PORTS_PER_NODE))
            .ok_or_else(|| HarnessError::InvalidConfig("topology is too large".to_string()))?;

        let lease = self.ports.lease(port_count)?;
        let workspace = NodeWorkspace::new(suite_id)
            .map_err(|e| HarnessError::ProvisionConflict(format!("{:#}", e)))?;

        let id = format!(
            "{}-{}",
            kind,
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        log::info!(
            "Provisioning {} foundation {} for suite '{}' ({} node(s), ports {:?})",
            kind,
            id,
            suite_id,
            nodes.len(),
            lease.range()
        );

        let mut foundation = Foundation::new(
            id,
            suite_id,
            kind,
            self.options.chain.clone(),
            lease,
            workspace,
        );
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let started = self.clock.now();
        let outcome = tokio::select! {
            biased;
            _ = abort => Err(HarnessError::Cancelled),
            launched = tokio::time::timeout(
                self.options.timeout,
                self.start_nodes(&mut foundation, &nodes),
            ) => match launched {
                Ok(result) => result,
                Err(_) => Err(HarnessError::ProvisionTimeout {
                    foundation: kind.to_string(),
                    timeout_ms: self.options.timeout.as_millis() as u64,
                }),
            },
        };

        let error = match outcome {
            Ok(()) => {
                self.provisioned.fetch_add(1, Ordering::SeqCst);
                log::info!(
                    "Foundation {} ready in {:?}",
                    foundation.id(),
                    self.clock.now().saturating_duration_since(started)
                );
                return Ok(foundation);
            }
            Err(e) => e,
        };

        log::warn!("Provisioning {} failed: {}", foundation.id(), error);
        let retain = self.options.retain_logs_on_failure;
        if let Err(teardown_error) = self.teardown(&mut foundation, retain).await {
            log::error!(
                "Teardown of partially started {} failed: {}",
                foundation.id(),
                teardown_error
            );
        }
        if let Some(path) = foundation.retained_logs() {
            self.failed_workspaces
                .lock()
                .insert(suite_id.to_string(), PathBuf::from(path));
        }
        Err(error)
    }

    async fn start_nodes(
        &self,
        foundation: &mut Foundation,
        nodes: &[NodeSpec],
    ) -> Result<(), HarnessError> {
        for (index, spec) in nodes.iter().enumerate() {
            let ports = foundation
                .lease
                .as_ref()
                .and_then(|lease| lease.node_ports(index))
                .ok_or_else(|| {
                    HarnessError::ProvisionConflict(format!("no ports leased for node {}", index))
                })?;
            let (data_dir, log_path) = match foundation.workspace.as_ref() {
                Some(workspace) => (
                    workspace.node_dir(&spec.name).map_err(|e| HarnessError::NodeStartup {
                        node: spec.name.clone(),
                        reason: format!("{:#}", e),
                    })?,
                    workspace.log_path(&spec.name),
                ),
                None => {
                    return Err(HarnessError::ProvisionConflict(
                        "foundation workspace is gone".to_string(),
                    ))
                }
            };
            let bootnodes: Vec<String> = foundation
                .nodes
                .first()
                .map(|boot| vec![boot.instance.bootnode_address()])
                .unwrap_or_default();

            let instance = self
                .launcher
                .launch(LaunchRequest {
                    node: spec,
                    index,
                    ports,
                    data_dir,
                    log_path,
                    chain: &self.options.chain,
                    bootnodes: &bootnodes,
                })
                .await?;

            foundation.nodes.push(NodeHandle {
                spec: spec.clone(),
                ports,
                instance,
            });
            if let Some(node) = foundation.nodes.last() {
                self.wait_ready(node.instance.as_ref()).await?;
                log::debug!("Node {} is ready at {}", spec.name, node.instance.endpoint());
            }
        }
        Ok(())
    }

    async fn wait_ready(&self, node: &dyn NodeInstance) -> Result<(), HarnessError> {
        while !node.is_ready().await? {
            self.clock.sleep(self.options.poll_interval).await;
        }
        Ok(())
    }

    /// Tear `foundation` down: stop its nodes in reverse start order, release
    /// its ports, then delete its workspace or keep it when `retain_logs`.
    ///
    /// Idempotent: only the first call does anything. Every node is asked to
    /// stop even if an earlier one fails or does not stop within the timeout;
    /// the failures are aggregated into [`HarnessError::TeardownFailure`].
    pub async fn teardown(
        &self,
        foundation: &mut Foundation,
        retain_logs: bool,
    ) -> Result<TeardownSummary, HarnessError> {
        if foundation.torn_down {
            return Ok(TeardownSummary {
                nodes_stopped: 0,
                retained_logs: foundation.retained_logs.clone(),
            });
        }
        foundation.torn_down = true;
        foundation.live.store(false, Ordering::SeqCst);
        self.torn_down.fetch_add(1, Ordering::SeqCst);
        log::info!("Tearing down foundation {}", foundation.id());

        let mut failures = Vec::new();
        let mut nodes_stopped = 0;
        for node in foundation.nodes.iter_mut().rev() {
            match tokio::time::timeout(self.options.timeout, node.instance.shutdown()).await {
                Ok(Ok(())) => nodes_stopped += 1,
                Ok(Err(e)) => {
                    log::error!("Failed to stop node {}: {:#}", node.spec.name, e);
                    failures.push(format!("{}: {:#}", node.spec.name, e));
                }
                Err(_) => {
                    log::error!(
                        "Node {} did not stop within {:?}",
                        node.spec.name,
                        self.options.timeout
                    );
                    failures.push(format!(
                        "{}: shutdown timed out after {} ms",
                        node.spec.name,
                        self.options.timeout.as_millis()
                    ));
                }
            }
        }

        if let Some(mut lease) = foundation.lease.take() {
            lease.release();
        }
        if let Some(workspace) = foundation.workspace.take() {
            if retain_logs {
                foundation.retained_logs = Some(workspace.retain());
            }
        }

        if !failures.is_empty() {
            return Err(HarnessError::TeardownFailure(failures.join("; ")));
        }
        Ok(TeardownSummary {
            nodes_stopped,
            retained_logs: foundation.retained_logs.clone(),
        })
    }
}
