// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tidewater-core.
//!
//! [`ServiceError`] is what the external collaborators (replication service,
//! compute job service, split planner) report. [`OrchestratorError`] is the
//! crate-wide error surfaced to callers, with stable error codes that are also
//! used as the `error` field of failure signals.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::TaskType;

/// Result type using [`OrchestratorError`].
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Classification of an external service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    /// The service throttled the request.
    Throttled,
    /// The request timed out.
    Timeout,
    /// The service is temporarily unavailable.
    Unavailable,
    /// The addressed resource does not exist.
    NotFound,
    /// A resource with the same identifier already exists.
    AlreadyExists,
    /// The resource is not in a state that permits the operation.
    InvalidState,
    /// A request parameter was rejected.
    InvalidParameter,
    /// The caller is not allowed to perform the operation.
    AccessDenied,
    /// Anything else.
    Other,
}

impl ServiceErrorKind {
    /// Transient failures are retried by the polling loops on their next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled | Self::Timeout | Self::Unavailable)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidState => "invalid_state",
            Self::InvalidParameter => "invalid_parameter",
            Self::AccessDenied => "access_denied",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ServiceError {
    /// Failure classification.
    pub kind: ServiceErrorKind,
    /// The external operation that failed (e.g. `describeReplicationTasks`).
    pub operation: String,
    /// Service-provided message.
    pub message: String,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(
        kind: ServiceErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a throttling error.
    pub fn throttled(operation: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Throttled, operation, "rate exceeded")
    }

    /// Whether the polling loops may retry this error on the next interval.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Errors surfaced by the orchestrator and its components.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// A logical endpoint/instance/task identifier resolved to nothing.
    #[error("no {resource} found for '{logical_id}'")]
    NotFound {
        /// Kind of resource being resolved.
        resource: &'static str,
        /// The logical identifier.
        logical_id: String,
    },

    /// A logical identifier resolved to more than one concrete handle.
    #[error("{matches} {resource} handles match '{logical_id}', expected exactly one")]
    Ambiguous {
        /// Kind of resource being resolved.
        resource: &'static str,
        /// The logical identifier.
        logical_id: String,
        /// Number of handles found.
        matches: usize,
    },

    /// A replication task with this identifier already exists.
    #[error("replication task '{identifier}' already exists")]
    Conflict {
        /// The reused task identifier.
        identifier: String,
    },

    /// The task is not in a state that permits the operation.
    #[error("replication task '{identifier}' is in invalid state: expected '{expected}', got '{actual}'")]
    InvalidState {
        /// The task identifier.
        identifier: String,
        /// The required status.
        expected: String,
        /// The observed status.
        actual: String,
    },

    /// Deletion was requested for a task type the controller never deletes.
    #[error("replication task '{identifier}' of type {task_type} is never deleted")]
    DeletionNotPermitted {
        /// The task identifier.
        identifier: String,
        /// The task type.
        task_type: TaskType,
    },

    /// The compute job submission was malformed.
    #[error("compute job submission rejected: {reason}")]
    Submission {
        /// Why the submission was rejected.
        reason: String,
    },

    /// An external collaborator failed.
    #[error("external service error: {0}")]
    Service(#[from] ServiceError),

    /// The status store failed.
    #[error("status store error during '{operation}': {details}")]
    Store {
        /// The store operation.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A callback signal could not be delivered.
    #[error("failed to deliver signal for token '{token}': {reason}")]
    SignalDelivery {
        /// The callback token.
        token: String,
        /// Why delivery failed.
        reason: String,
    },

    /// The per-table workflow exceeded its time budget.
    #[error("workflow did not reach a terminal state within {}s", .elapsed.as_secs())]
    Timeout {
        /// The configured budget.
        elapsed: Duration,
    },

    /// Input validation failed.
    #[error("validation error for '{field}': {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The task driving a workflow panicked or was cancelled.
    #[error("workflow task aborted: {0}")]
    Aborted(String),
}

impl OrchestratorError {
    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::Ambiguous { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::DeletionNotPermitted { .. } => "DELETION_NOT_PERMITTED",
            Self::Submission { .. } => "SUBMISSION_ERROR",
            Self::Service(_) => "SERVICE_ERROR",
            Self::Store { .. } => "STORE_ERROR",
            Self::SignalDelivery { .. } => "SIGNAL_DELIVERY_FAILED",
            Self::Timeout { .. } => "WORKFLOW_TIMEOUT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Aborted(_) => "WORKFLOW_ABORTED",
        }
    }

    /// Configuration errors are fatal and never retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Ambiguous { .. }
                | Self::Conflict { .. }
                | Self::Submission { .. }
                | Self::Config(_)
        )
    }

    /// Whether a polling loop may retry on its next interval.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_transient())
    }

    pub(crate) fn store(operation: &str, details: impl fmt::Display) -> Self {
        Self::Store {
            operation: operation.to_string(),
            details: details.to_string(),
        }
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        Self::store("query", err)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::store("json", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let cases = vec![
            (
                OrchestratorError::NotFound {
                    resource: "endpoint",
                    logical_id: "src".to_string(),
                },
                "NOT_FOUND",
            ),
            (
                OrchestratorError::Ambiguous {
                    resource: "endpoint",
                    logical_id: "src".to_string(),
                    matches: 2,
                },
                "NOT_FOUND",
            ),
            (
                OrchestratorError::Conflict {
                    identifier: "t-1".to_string(),
                },
                "CONFLICT",
            ),
            (
                OrchestratorError::Submission {
                    reason: "bad role".to_string(),
                },
                "SUBMISSION_ERROR",
            ),
            (
                OrchestratorError::Timeout {
                    elapsed: Duration::from_secs(10800),
                },
                "WORKFLOW_TIMEOUT",
            ),
            (
                ServiceError::throttled("describeReplicationTasks").into(),
                "SERVICE_ERROR",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_code(), expected, "{:?}", error);
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_display() {
        let err = OrchestratorError::Ambiguous {
            resource: "endpoint",
            logical_id: "dms-s3-endpoint".to_string(),
            matches: 3,
        };
        assert_eq!(
            err.to_string(),
            "3 endpoint handles match 'dms-s3-endpoint', expected exactly one"
        );

        let err = OrchestratorError::InvalidState {
            identifier: "orders".to_string(),
            expected: "ready".to_string(),
            actual: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "replication task 'orders' is in invalid state: expected 'ready', got 'running'"
        );

        let err = OrchestratorError::Timeout {
            elapsed: Duration::from_secs(10800),
        };
        assert_eq!(
            err.to_string(),
            "workflow did not reach a terminal state within 10800s"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(OrchestratorError::from(ServiceError::throttled("getJobRun")).is_transient());
        assert!(
            !OrchestratorError::from(ServiceError::new(
                ServiceErrorKind::AccessDenied,
                "startJobRun",
                "denied"
            ))
            .is_transient()
        );
        assert!(
            OrchestratorError::Conflict {
                identifier: "x".to_string()
            }
            .is_configuration_error()
        );
        assert!(
            !OrchestratorError::Timeout {
                elapsed: Duration::from_secs(1)
            }
            .is_configuration_error()
        );
    }
}
