// File: testing-framework/src/foundation/process.rs
//
// Process Launcher
//
// Spawns the node binary for each node of a foundation. Output goes to the
// node's log file in the foundation workspace; readiness is the rpc port
// accepting TCP connections.

use super::launcher::{LaunchRequest, NodeInstance, NodeLauncher};
use crate::chain::{ChainClient, RpcClient};
use crate::config::NodeRole;
use crate::error::HarnessError;
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Lines of the node log quoted in startup errors.
const LOG_TAIL_LINES: usize = 5;

/// Launches nodes by spawning a node binary.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessLauncher {
    /// Launcher spawning `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the generated flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line (without the binary) for `request`.
    pub fn arguments(&self, request: &LaunchRequest<'_>) -> Vec<String> {
        let mut args = self.extra_args.clone();
        match request.node.role {
            NodeRole::Dev => {
                args.push("--dev".to_string());
                args.push("--sealing=manual".to_string());
            }
            NodeRole::RelayValidator | NodeRole::Collator => {
                args.push("--validator".to_string());
            }
            NodeRole::FullNode => {}
        }
        args.extend([
            format!("--name={}", request.node.name),
            format!("--base-path={}", request.data_dir.display()),
            format!("--rpc-port={}", request.ports.rpc),
            format!("--port={}", request.ports.p2p),
            format!("--prometheus-port={}", request.ports.prometheus),
            "--rpc-cors=all".to_string(),
            "--no-telemetry".to_string(),
        ]);
        if !request.bootnodes.is_empty() {
            args.push("--bootnodes".to_string());
            args.extend(request.bootnodes.iter().cloned());
        }
        args
    }
}

#[async_trait]
impl NodeLauncher for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<Box<dyn NodeInstance>, HarnessError> {
        let name = request.node.name.clone();
        let startup_error = |reason: String| HarnessError::NodeStartup {
            node: name.clone(),
            reason,
        };

        let stdout = File::create(&request.log_path)
            .map_err(|e| startup_error(format!("cannot create log file: {}", e)))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| startup_error(format!("cannot share log file: {}", e)))?;

        let args = self.arguments(&request);
        log::debug!("Spawning {} {}", self.binary.display(), args.join(" "));

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| startup_error(format!("cannot spawn {}: {}", self.binary.display(), e)))?;

        let endpoint = format!("http://127.0.0.1:{}", request.ports.rpc);
        let client = RpcClient::connect(&endpoint)
            .map_err(|e| startup_error(format!("{:#}", e)))?;

        log::info!(
            "Spawned node {} (pid {:?}) rpc={}",
            name,
            child.id(),
            request.ports.rpc
        );

        Ok(Box::new(ProcessNode {
            name,
            endpoint,
            rpc_port: request.ports.rpc,
            p2p_port: request.ports.p2p,
            log_path: request.log_path,
            client: Arc::new(client),
            child: Mutex::new(child),
        }))
    }
}

struct ProcessNode {
    name: String,
    endpoint: String,
    rpc_port: u16,
    p2p_port: u16,
    log_path: PathBuf,
    client: Arc<RpcClient>,
    child: Mutex<Child>,
}

/// Last lines of a node log, for error messages.
fn log_tail(path: &Path) -> String {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join(" | ")
}

#[async_trait]
impl NodeInstance for ProcessNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bootnode_address(&self) -> String {
        format!("/ip4/127.0.0.1/tcp/{}", self.p2p_port)
    }

    async fn is_ready(&self) -> Result<bool, HarnessError> {
        let exited = self
            .child
            .lock()
            .await
            .try_wait()
            .map_err(|e| HarnessError::NodeStartup {
                node: self.name.clone(),
                reason: format!("cannot poll process: {}", e),
            })?;

        if let Some(status) = exited {
            let tail = log_tail(&self.log_path);
            if tail.to_lowercase().contains("address already in use") {
                return Err(HarnessError::ProvisionConflict(format!(
                    "node {} could not bind its ports: {}",
                    self.name, tail
                )));
            }
            return Err(HarnessError::NodeStartup {
                node: self.name.clone(),
                reason: format!("exited with {} before becoming ready: {}", status, tail),
            });
        }

        Ok(TcpStream::connect(("127.0.0.1", self.rpc_port)).await.is_ok())
    }

    fn client(&self) -> Arc<dyn ChainClient> {
        self.client.clone()
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        let child = self.child.get_mut();
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill().await?;
        log::debug!("Stopped node {}", self.name);
        Ok(())
    }
}
