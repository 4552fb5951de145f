//! # Spectre Testing Framework
//!
//! Suite orchestration core for the Spectre node: declare suites against a
//! network "foundation", provision it, run lifecycle hooks and cases in a
//! fixed order, tear it down, and report.
//!
//! ## Architecture Overview
//!
//! - **Foundation Provisioner** (`foundation`): brings up a single dev node or
//!   a multi-node zombie network, bounded by a timeout, and tears it down.
//! - **Suite Registry** (`suite`): ordered suite declarations with unique ids.
//! - **Lifecycle Runner** (`runner`): `before_all` → (`before_each` → case)*
//!   → teardown, with every hook and case in its own failure boundary.
//! - **Context** (`context`): the only handle test code gets; chain clients,
//!   well-known accounts and transfer builders.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spectre_testing_framework::prelude::*;
//!
//! let mut registry = SuiteRegistry::new();
//! registry.register(
//!     SuiteDeclaration::builder("A", "transfer works", FoundationKind::Dev)
//!         .case("alith pays baltathar", |ctx| async move {
//!             let receipt = ctx
//!                 .transfer_and_seal(ctx.alith(), &ctx.baltathar().address, 1_000)
//!                 .await?;
//!             anyhow::ensure!(receipt.success);
//!             Ok(())
//!         })
//!         .build(),
//! )?;
//!
//! let config = RunConfig::default();
//! let provisioner = Provisioner::new(Arc::new(InProcessLauncher::new()), (&config).into());
//! let runner = LifecycleRunner::new(Arc::new(provisioner), (&config).into());
//! let report = runner.run_all(&registry, &[]).await?;
//! std::process::exit(report.exit_code());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Chain client seam, dev chain, accounts and transactions
pub mod chain;

/// Run configuration
pub mod config;

/// Suite context handed to hooks and cases
pub mod context;

/// Error taxonomy
pub mod error;

/// Foundations: launching, provisioning, teardown
pub mod foundation;

/// Time abstraction for provisioning
pub mod orchestrator;

/// Lifecycle runner and report
pub mod runner;

/// Suite declarations and registry
pub mod suite;

// Convenient re-exports for common usage
pub mod prelude;

pub use config::RunConfig;
pub use context::Context;
pub use error::HarnessError;
pub use foundation::{Foundation, FoundationKind, Provisioner};
pub use runner::{LifecycleRunner, RunReport, SuiteResult, SuiteState};
pub use suite::{SuiteDeclaration, SuiteRegistry, TestCase};

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
