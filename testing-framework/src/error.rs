//! Harness error taxonomy
//!
//! Every failure the orchestration core can report. Errors are cloneable and
//! serializable so they can be stored in suite results and written into the
//! JSON run report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the provisioner, registry and lifecycle runner.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum HarnessError {
    /// The foundation did not become ready within the configured bound.
    #[error("provisioning of {foundation} foundation timed out after {timeout_ms} ms")]
    ProvisionTimeout {
        /// Foundation kind being provisioned
        foundation: String,
        /// Configured bound
        timeout_ms: u64,
    },
    /// A port or other resource needed by the foundation is already taken.
    #[error("resource conflict while provisioning: {0}")]
    ProvisionConflict(String),
    /// A node process or instance failed to start.
    #[error("node '{node}' failed to start: {reason}")]
    NodeStartup {
        /// Node name from the topology
        node: String,
        /// Failure detail
        reason: String,
    },
    /// A lifecycle hook returned an error or panicked.
    #[error("{hook} hook failed: {message}")]
    HookFailure {
        /// Hook name (`beforeAll` or `beforeEach`)
        hook: String,
        /// Failure detail
        message: String,
    },
    /// A test case body returned an error or panicked.
    #[error("case '{case}' failed: {message}")]
    CaseFailure {
        /// Case name
        case: String,
        /// Captured assertion or error detail
        message: String,
    },
    /// Releasing the foundation failed for one or more nodes.
    #[error("teardown failed: {0}")]
    TeardownFailure(String),
    /// A suite with the same id is already registered.
    #[error("duplicate suite id '{0}'")]
    DuplicateSuiteId(String),
    /// A declaration is malformed (empty id, ...).
    #[error("invalid suite declaration: {0}")]
    InvalidSuite(String),
    /// The run configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The run was cancelled before the suite could complete.
    #[error("run cancelled")]
    Cancelled,
}

impl HarnessError {
    /// Whether this error comes from standing up a foundation.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::ProvisionTimeout { .. }
                | Self::ProvisionConflict(_)
                | Self::NodeStartup { .. }
                | Self::InvalidConfig(_)
        )
    }
}

/// Render an `anyhow` error with its whole cause chain on one line.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = HarnessError::ProvisionTimeout {
            foundation: "zombie".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(
            err.to_string(),
            "provisioning of zombie foundation timed out after 500 ms"
        );
        assert_eq!(
            HarnessError::DuplicateSuiteId("T1".to_string()).to_string(),
            "duplicate suite id 'T1'"
        );
    }

    #[test]
    fn test_provisioning_classification() {
        assert!(HarnessError::ProvisionConflict("port 30000".into()).is_provisioning());
        assert!(!HarnessError::Cancelled.is_provisioning());
        assert!(!HarnessError::TeardownFailure("x".into()).is_provisioning());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let err = HarnessError::HookFailure {
            hook: "beforeAll".into(),
            message: "boom".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "HookFailure");
        assert_eq!(json["detail"]["hook"], "beforeAll");
    }

    #[test]
    fn test_describe_keeps_context_chain() {
        let err = anyhow::anyhow!("root cause").context("outer");
        assert_eq!(describe(&err), "outer: root cause");
    }
}
