// File: testing-framework/src/runner/mod.rs
//
// Lifecycle Runner
//
// Drives one suite through its lifecycle:
//
//   Pending -> Provisioning -> RunningHooks -> RunningCases -> TearingDown
//           -> Passed | Failed | Errored
//
// `before_all` runs once, then for each case in declared order `before_each`
// and the body, each inside its own failure boundary (errors, panics and the
// optional per-case timeout are all captured). Teardown runs whenever
// provisioning succeeded, including after hook failures and cancellation.
// Cancellation also cuts provisioning short; the provisioner then releases
// whatever it had started.

/// Run-level cancellation
pub mod cancel;
/// Aggregated run report
pub mod report;

pub use cancel::{CancelHandle, Cancellation};
pub use report::RunReport;

use crate::config::RunConfig;
use crate::context::Context;
use crate::error::{describe, HarnessError};
use crate::foundation::{FoundationKind, NodeInfo, Provisioner};
use crate::suite::{SuiteDeclaration, SuiteFn, SuiteRegistry};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::Display;

/// Lifecycle state of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum SuiteState {
    /// Registered, not started
    Pending,
    /// Foundation being brought up
    Provisioning,
    /// Case factory and `before_all`
    RunningHooks,
    /// Cases executing
    RunningCases,
    /// Foundation being torn down
    TearingDown,
    /// Every case passed and no hook failed
    Passed,
    /// At least one case (or its `before_each`) failed
    Failed,
    /// Provisioning or `before_all` failed, or the run was cancelled
    Errored,
}

impl SuiteState {
    /// Whether the suite has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Errored)
    }
}

/// Outcome of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum CaseOutcome {
    /// Hook and body succeeded
    Passed,
    /// `before_each` or the body failed
    Failed,
    /// Never executed
    Skipped,
}

/// Result of one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    /// Case name
    pub name: String,
    /// Outcome
    pub outcome: CaseOutcome,
    /// Failure detail
    pub error: Option<HarnessError>,
    /// Time spent in `before_each` and the body
    pub duration_ms: u64,
}

/// Result of one suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    /// Suite id
    pub id: String,
    /// Suite title
    pub title: String,
    /// Foundation kind
    pub foundation: FoundationKind,
    /// Terminal state
    pub state: SuiteState,
    /// Every state the suite went through, in order
    pub history: Vec<SuiteState>,
    /// Case results in execution order
    pub cases: Vec<CaseResult>,
    /// Why the suite errored
    pub error: Option<HarnessError>,
    /// Teardown problems; they never change `state`
    pub teardown_error: Option<HarnessError>,
    /// Workspace kept for inspection
    pub retained_logs: Option<PathBuf>,
    /// Nodes of the foundation
    pub topology: Vec<NodeInfo>,
    /// Wall time of the whole lifecycle
    pub duration_ms: u64,
}

impl SuiteResult {
    fn pending(suite: &SuiteDeclaration) -> Self {
        Self {
            id: suite.id().to_string(),
            title: suite.title().to_string(),
            foundation: suite.foundation(),
            state: SuiteState::Pending,
            history: vec![SuiteState::Pending],
            cases: Vec::new(),
            error: None,
            teardown_error: None,
            retained_logs: None,
            topology: Vec::new(),
            duration_ms: 0,
        }
    }

    fn transition(&mut self, state: SuiteState) {
        log::debug!("Suite '{}': {} -> {}", self.id, self.state, state);
        self.state = state;
        self.history.push(state);
    }

    /// Whether the suite passed
    pub fn passed(&self) -> bool {
        self.state == SuiteState::Passed
    }

    /// Cases that actually ran
    pub fn cases_executed(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.outcome != CaseOutcome::Skipped)
            .count()
    }

    /// Cases that failed
    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| c.outcome == CaseOutcome::Failed)
    }
}

/// Runner behaviour.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Keep the workspace of suites that did not pass
    pub retain_logs_on_failure: bool,
    /// Bound on every hook and case body
    pub case_timeout: Option<Duration>,
    /// Suites allowed to hold a foundation at once
    pub max_parallel_suites: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunnerOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            retain_logs_on_failure: config.retain_logs_on_failure,
            case_timeout: config.case_timeout(),
            max_parallel_suites: config.max_parallel_suites,
        }
    }
}

/// Runs suites against freshly provisioned foundations.
pub struct LifecycleRunner {
    provisioner: Arc<Provisioner>,
    options: RunnerOptions,
    cancellation: Cancellation,
}

/// How driving hooks and cases ended.
enum Drive {
    Completed,
    Aborted(HarnessError),
}

impl LifecycleRunner {
    /// Runner using `provisioner` for every suite.
    pub fn new(provisioner: Arc<Provisioner>, options: RunnerOptions) -> Self {
        Self {
            provisioner,
            options,
            cancellation: Cancellation::never(),
        }
    }

    /// Observe `cancellation` between and during suites.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Provisioner in use
    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    /// Run every registered suite (or those whose id is in `filter`) in
    /// registration order.
    ///
    /// A filter naming a suite that is not registered is rejected with
    /// [`HarnessError::InvalidSuite`] before anything is provisioned.
    pub async fn run_all(
        &self,
        registry: &SuiteRegistry,
        filter: &[String],
    ) -> Result<RunReport, HarnessError> {
        let unknown: Vec<&str> = filter
            .iter()
            .map(String::as_str)
            .filter(|id| registry.get(id).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(HarnessError::InvalidSuite(format!(
                "no suite registered with id {}",
                unknown
                    .iter()
                    .map(|id| format!("'{}'", id))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        let selected: Vec<&SuiteDeclaration> = registry
            .all()
            .iter()
            .filter(|suite| filter.is_empty() || filter.iter().any(|id| id == suite.id()))
            .collect();

        log::info!(
            "Running {} suite(s), at most {} at a time",
            selected.len(),
            self.options.max_parallel_suites.max(1)
        );
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let results: Vec<SuiteResult> = futures::stream::iter(selected)
            .map(|suite| self.run(suite))
            .buffered(self.options.max_parallel_suites.max(1))
            .collect()
            .await;

        Ok(RunReport::new(results, started_at, start.elapsed()))
    }

    /// Run one suite through its whole lifecycle.
    pub async fn run(&self, suite: &SuiteDeclaration) -> SuiteResult {
        let start = Instant::now();
        let mut result = SuiteResult::pending(suite);

        if self.cancellation.is_cancelled() {
            result.error = Some(HarnessError::Cancelled);
            result.transition(SuiteState::Errored);
            return result;
        }

        log::info!("Suite '{}' ({}) starting", suite.id(), suite.title());
        result.transition(SuiteState::Provisioning);
        let mut foundation = match self
            .provisioner
            .provision_until(suite.id(), suite.foundation(), self.cancellation.cancelled())
            .await
        {
            Ok(foundation) => foundation,
            Err(e) => {
                log::error!("Suite '{}' could not provision: {}", suite.id(), e);
                result.retained_logs = self.provisioner.take_retained_logs(suite.id());
                result.error = Some(e);
                result.transition(SuiteState::Errored);
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };
        result.topology = foundation.topology();

        let ctx = Context::new(suite.id(), &foundation);
        let drive = if self.cancellation.is_cancelled() {
            Drive::Aborted(HarnessError::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Drive::Aborted(HarnessError::Cancelled),
                drive = self.drive(suite, &ctx, &mut result) => drive,
            }
        };
        drop(ctx);

        let terminal = match drive {
            Drive::Aborted(e) => {
                result.error = Some(e);
                SuiteState::Errored
            }
            Drive::Completed if result.failed_cases().next().is_some() => SuiteState::Failed,
            Drive::Completed => SuiteState::Passed,
        };

        result.transition(SuiteState::TearingDown);
        let retain = self.options.retain_logs_on_failure && terminal != SuiteState::Passed;
        match self.provisioner.teardown(&mut foundation, retain).await {
            Ok(summary) => result.retained_logs = summary.retained_logs,
            Err(e) => {
                log::error!("Suite '{}' teardown: {}", suite.id(), e);
                result.retained_logs = foundation.retained_logs().map(PathBuf::from);
                result.teardown_error = Some(e);
            }
        }

        result.transition(terminal);
        result.duration_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Suite '{}' {} ({} of {} case(s) executed) in {} ms",
            suite.id(),
            result.state,
            result.cases_executed(),
            result.cases.len(),
            result.duration_ms
        );
        result
    }

    async fn drive(
        &self,
        suite: &SuiteDeclaration,
        ctx: &Context,
        result: &mut SuiteResult,
    ) -> Drive {
        result.transition(SuiteState::RunningHooks);

        let cases = match std::panic::catch_unwind(AssertUnwindSafe(|| suite.cases(ctx))) {
            Ok(cases) => cases,
            Err(panic) => {
                return Drive::Aborted(HarnessError::HookFailure {
                    hook: "testCases".to_string(),
                    message: panic_message(panic.as_ref()),
                })
            }
        };
        // Recorded up front so an abort leaves them visible as skipped
        result.cases = cases
            .iter()
            .map(|case| CaseResult {
                name: case.name().to_string(),
                outcome: CaseOutcome::Skipped,
                error: None,
                duration_ms: 0,
            })
            .collect();

        if let Some(hook) = suite.before_all() {
            if let Err(message) = self.guarded(invoke(hook, ctx)).await {
                log::error!("Suite '{}' beforeAll failed: {}", suite.id(), message);
                return Drive::Aborted(HarnessError::HookFailure {
                    hook: "beforeAll".to_string(),
                    message,
                });
            }
        }

        result.transition(SuiteState::RunningCases);
        for (index, case) in cases.iter().enumerate() {
            let start = Instant::now();

            let mut outcome = match suite.before_each() {
                Some(hook) => self.guarded(invoke(hook, ctx)).await.map_err(|message| {
                    HarnessError::HookFailure {
                        hook: "beforeEach".to_string(),
                        message,
                    }
                }),
                None => Ok(()),
            };
            if outcome.is_ok() {
                outcome = self
                    .guarded(case.run(ctx.clone()))
                    .await
                    .map_err(|message| HarnessError::CaseFailure {
                        case: case.name().to_string(),
                        message,
                    });
            }

            let record = &mut result.cases[index];
            record.duration_ms = start.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => {
                    record.outcome = CaseOutcome::Passed;
                    log::info!("  ✓ {} ({} ms)", case.name(), record.duration_ms);
                }
                Err(e) => {
                    log::error!("  ✗ {}: {}", case.name(), e);
                    record.outcome = CaseOutcome::Failed;
                    record.error = Some(e);
                }
            }
        }
        Drive::Completed
    }

    /// Await a hook or body, turning errors, panics and timeouts into a message.
    async fn guarded(&self, body: BoxFuture<'static, anyhow::Result<()>>) -> Result<(), String> {
        let body = AssertUnwindSafe(body).catch_unwind();
        let outcome = match self.options.case_timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(format!("timed out after {} ms", limit.as_millis())),
            },
            None => body.await,
        };
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(describe(&e)),
            Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
        }
    }
}

fn invoke(hook: &SuiteFn, ctx: &Context) -> BoxFuture<'static, anyhow::Result<()>> {
    hook(ctx.clone())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
