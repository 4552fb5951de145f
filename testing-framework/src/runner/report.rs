//! Run report
//!
//! Aggregates suite results into the pass/fail summary printed at the end of
//! a run and, optionally, a JSON file for CI.

use super::{CaseOutcome, SuiteResult, SuiteState};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const BOX_WIDTH: usize = 64;

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall time of the run
    pub duration_ms: u64,
    /// One entry per suite, in registration order
    pub suites: Vec<SuiteResult>,
}

impl RunReport {
    /// Report over `suites`.
    pub fn new(suites: Vec<SuiteResult>, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            started_at,
            duration_ms: duration.as_millis() as u64,
            suites,
        }
    }

    fn count(&self, state: SuiteState) -> usize {
        self.suites.iter().filter(|s| s.state == state).count()
    }

    /// Suites that passed
    pub fn passed(&self) -> usize {
        self.count(SuiteState::Passed)
    }

    /// Suites that failed
    pub fn failed(&self) -> usize {
        self.count(SuiteState::Failed)
    }

    /// Suites that errored
    pub fn errored(&self) -> usize {
        self.count(SuiteState::Errored)
    }

    /// Whether every suite passed
    pub fn all_passed(&self) -> bool {
        self.suites.iter().all(SuiteResult::passed)
    }

    /// Process exit code: 0 iff every suite passed.
    ///
    /// Teardown failures are reported but do not affect it.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    /// Result of suite `id`
    pub fn suite(&self, id: &str) -> Option<&SuiteResult> {
        self.suites.iter().find(|s| s.id == id)
    }

    /// Human-readable summary box.
    pub fn summary(&self) -> String {
        let inner = BOX_WIDTH - 2;
        let rule = "═".repeat(BOX_WIDTH);
        let mut out = String::new();
        let mut line = |text: &str| {
            for wrapped in textwrap::wrap(text, inner) {
                out.push_str(&format!("║ {:inner$} ║\n", wrapped, inner = inner));
            }
        };

        let mut lines = vec![
            format!(
                "SUITE RUN {} ({} ms)",
                self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                self.duration_ms
            ),
            format!(
                "{} suite(s): {} passed, {} failed, {} errored",
                self.suites.len(),
                self.passed(),
                self.failed(),
                self.errored()
            ),
            String::new(),
        ];
        for suite in &self.suites {
            lines.push(format!(
                "[{}] {} - {} ({}, {} ms)",
                suite.state, suite.id, suite.title, suite.foundation, suite.duration_ms
            ));
            if let Some(error) = &suite.error {
                lines.push(format!("    error: {}", error));
            }
            for case in &suite.cases {
                let mark = match case.outcome {
                    CaseOutcome::Passed => "✓",
                    CaseOutcome::Failed => "✗",
                    CaseOutcome::Skipped => "-",
                };
                lines.push(format!("    {} {}", mark, case.name));
                if let Some(error) = &case.error {
                    lines.push(format!("        {}", error));
                }
            }
            if let Some(error) = &suite.teardown_error {
                lines.push(format!("    teardown: {}", error));
            }
            if let Some(path) = &suite.retained_logs {
                lines.push(format!("    logs kept at {}", path.display()));
            }
        }
        for text in &lines {
            line(text);
        }

        format!("╔{}╗\n{}╚{}╝", rule, out, rule)
    }

    /// Print [`Self::summary`] to stdout.
    pub fn print_summary(&self) {
        println!("{}", self.summary());
    }

    /// Write the report as pretty JSON to `path`, creating parent directories.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create report directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        let mut file = fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write report")?;
        file.flush().await.context("Failed to flush report file")?;

        log::info!("Run report written to {}", path.display());
        Ok(())
    }
}
