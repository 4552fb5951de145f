//! Common imports for suite authors.
//!
//! ```rust,ignore
//! use spectre_testing_framework::prelude::*;
//! ```

pub use crate::chain::accounts::{generate_account, ALITH, BALTATHAR, CHARLETH, DOROTHY};
pub use crate::chain::assertions::{
    assert_balance, assert_balance_within, assert_block_number, assert_included, assert_nonce,
};
pub use crate::chain::{
    build_transfer, Address, BlockInfo, ChainClient, DevAccount, FeeParams, Receipt,
    SignedTransaction, TxHash,
};
pub use crate::config::{ChainConfig, NodeRole, NodeSpec, RunConfig, Topology};
pub use crate::context::Context;
pub use crate::error::HarnessError;
pub use crate::foundation::{
    FoundationKind, InProcessLauncher, NodeLauncher, ProcessLauncher, ProvisionOptions,
    Provisioner,
};
pub use crate::orchestrator::{Clock, PausedClock, SystemClock};
pub use crate::runner::{
    CancelHandle, CaseOutcome, Cancellation, LifecycleRunner, RunReport, RunnerOptions,
    SuiteResult, SuiteState,
};
pub use crate::suite::{SuiteDeclaration, SuiteRegistry, TestCase};

pub use anyhow::{bail, ensure, Result};
pub use std::sync::Arc;
