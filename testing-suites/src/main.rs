//! suite-runner - run the Spectre node test suites
//!
//! # Usage
//!
//! ```bash
//! # Run every suite on in-process foundations
//! suite-runner
//!
//! # Run T1 against a real node binary, keep logs of failing suites
//! suite-runner --suite T1 --node-binary ./target/release/spectre-node --retain-logs-on-failure
//!
//! # Write a JSON report
//! suite-runner --report reports/run.json
//! ```

use anyhow::{Context as _, Result};
use clap::Parser;
use log::{error, info, warn};
use spectre_testing_framework::foundation::{
    InProcessLauncher, NodeLauncher, ProcessLauncher, ProvisionOptions, Provisioner,
};
use spectre_testing_framework::runner::{Cancellation, LifecycleRunner, RunnerOptions};
use spectre_testing_framework::{RunConfig, SuiteRegistry};
use std::path::PathBuf;
use std::sync::Arc;

/// Spectre suite runner
#[derive(Parser)]
#[command(name = "suite-runner")]
#[command(about = "Run the Spectre node test suites against dev and zombie foundations")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    run: RunConfig,

    /// YAML configuration file; replaces the run flags above
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Write a default configuration to `config_file` and exit
    #[arg(long)]
    generate_config_template: bool,

    /// Only run the suite with this id (repeatable)
    #[arg(long = "suite")]
    suites: Vec<String>,

    /// List registered suites and exit
    #[arg(long)]
    list: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Spawn this node binary instead of running in-process chains
    #[arg(long)]
    node_binary: Option<PathBuf>,

    /// Extra argument passed to every spawned node (repeatable)
    #[arg(long = "node-arg", allow_hyphen_values = true)]
    node_args: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.generate_config_template {
        let path = cli
            .config_file
            .as_ref()
            .context("--generate-config-template needs --config-file")?;
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        RunConfig::generate_template(path)?;
        println!("Configuration template generated at {}", path.display());
        return Ok(0);
    }

    let config = match &cli.config_file {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            RunConfig::load(path)?
        }
        None => cli.run.clone(),
    };
    config.validate()?;

    let mut registry = SuiteRegistry::new();
    spectre_testing_suites::register_all(&mut registry)?;

    if cli.list {
        for suite in registry.all() {
            println!("{:<16} {:<7} {}", suite.id(), suite.foundation(), suite.title());
        }
        return Ok(0);
    }

    let launcher: Arc<dyn NodeLauncher> = match &cli.node_binary {
        Some(binary) => {
            info!("Spawning nodes from {}", binary.display());
            Arc::new(ProcessLauncher::new(binary).with_args(cli.node_args.iter().cloned()))
        }
        None => {
            if !cli.node_args.is_empty() {
                warn!("--node-arg is ignored without --node-binary");
            }
            Arc::new(InProcessLauncher::new())
        }
    };

    let provisioner = Provisioner::new(launcher, ProvisionOptions::from(&config));
    let (cancel, cancellation) = Cancellation::new();
    let runner = LifecycleRunner::new(Arc::new(provisioner), RunnerOptions::from(&config))
        .with_cancellation(cancellation);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run (foundations are still torn down)");
            cancel.cancel();
        }
    });

    let report = runner.run_all(&registry, &cli.suites).await?;
    report.print_summary();
    if let Some(path) = &cli.report {
        report.save_json(path).await?;
    }
    Ok(report.exit_code())
}
