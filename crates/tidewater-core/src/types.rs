// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Data model shared by the controller, monitor, dispatcher and orchestrator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::mapping::TableMapping;

/// Migration type of a replication task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// One-time bulk copy of the table.
    FullLoad,
    /// Continuous change data capture.
    Cdc,
}

impl TaskType {
    /// Wire name (`full-load` / `cdc`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullLoad => "full-load",
            Self::Cdc => "cdc",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full-load" => Ok(Self::FullLoad),
            "cdc" => Ok(Self::Cdc),
            other => Err(OrchestratorError::Validation {
                field: "task_type".to_string(),
                message: format!("unknown task type '{}'", other),
            }),
        }
    }
}

/// Status of a replication task as reported by the replication service.
///
/// `Starting`, `Stopping` and `Deleting` are transitional statuses the
/// service reports between the ones the orchestrator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The task is being created.
    Created,
    /// The task exists and can be started.
    Ready,
    /// A start was accepted but the task is not running yet.
    Starting,
    /// The task is replicating.
    Running,
    /// A stop is in progress.
    Stopping,
    /// The task stopped; for full-load tasks the load completed.
    Stopped,
    /// The task failed.
    Failed,
    /// The task is being deleted.
    Deleting,
}

impl TaskStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "creating" => Ok(Self::Created),
            "ready" => Ok(Self::Ready),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            other => Err(OrchestratorError::Validation {
                field: "task_status".to_string(),
                message: format!("unknown task status '{}'", other),
            }),
        }
    }
}

/// Concrete handle of a replication endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointHandle {
    /// Logical identifier the handle was resolved from.
    pub endpoint_id: String,
    /// Service resource name.
    pub arn: String,
}

/// Concrete handle of a replication instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    /// Logical identifier the handle was resolved from.
    pub instance_id: String,
    /// Service resource name.
    pub arn: String,
}

/// Handle of a created replication task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Caller-assigned task identifier.
    pub identifier: String,
    /// Service resource name.
    pub arn: String,
}

/// Task-level replication statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskStatistics {
    pub full_load_progress_percent: i32,
    pub elapsed_time_millis: i64,
    pub tables_loaded: i32,
    pub tables_loading: i32,
    pub tables_queued: i32,
    pub tables_errored: i32,
    pub fresh_start_date: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
    pub full_load_start_date: Option<DateTime<Utc>>,
    pub full_load_finish_date: Option<DateTime<Utc>>,
}

/// Per-table replication statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TableStatistics {
    pub schema_name: String,
    pub table_name: String,
    pub inserts: i64,
    pub deletes: i64,
    pub updates: i64,
    pub ddls: i64,
    pub full_load_rows: i64,
    pub full_load_condtnl_chk_failed_rows: i64,
    pub full_load_error_rows: i64,
    pub table_state: String,
    pub last_update_time: Option<DateTime<Utc>>,
}

/// One migration unit for a single (schema, table) pair, as described by the
/// replication service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationTask {
    /// Caller-assigned task identifier.
    pub identifier: String,
    /// Service resource name.
    pub arn: String,
    /// Migration type.
    pub task_type: TaskType,
    /// Source endpoint resource name.
    pub source_endpoint_arn: String,
    /// Target endpoint resource name.
    pub target_endpoint_arn: String,
    /// Replication instance resource name.
    pub replication_instance_arn: String,
    /// Selection and parallel-load rules.
    pub table_mapping: TableMapping,
    /// Current status.
    pub status: TaskStatus,
    /// Service-reported reason for the last failure.
    pub last_failure_message: Option<String>,
    /// Replication statistics, once the task has started.
    pub statistics: Option<TaskStatistics>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last started.
    pub started_at: Option<DateTime<Utc>>,
}

impl ReplicationTask {
    /// Handle for follow-up operations.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            identifier: self.identifier.clone(),
            arn: self.arn.clone(),
        }
    }

    /// Schema selected by the task's mapping.
    pub fn schema_name(&self) -> Option<&str> {
        self.table_mapping
            .object_locator()
            .map(|l| l.schema_name.as_str())
    }

    /// Table selected by the task's mapping.
    pub fn table_name(&self) -> Option<&str> {
        self.table_mapping
            .object_locator()
            .map(|l| l.table_name.as_str())
    }
}

/// State of a compute job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted by the service.
    Submitted,
    /// Waiting for capacity.
    Pending,
    /// Capacity allocated.
    Scheduled,
    /// Executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
    /// A cancellation is in progress.
    Cancelling,
    /// Cancelled.
    Cancelled,
}

impl JobState {
    /// `SUCCESS`, `FAILED` and `CANCELLED` end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelling => "CANCELLING",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "PENDING" => Ok(Self::Pending),
            "SCHEDULED" => Ok(Self::Scheduled),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "CANCELLING" => Ok(Self::Cancelling),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(OrchestratorError::Validation {
                field: "job_state".to_string(),
                message: format!("unknown job state '{}'", other),
            }),
        }
    }
}

/// One invocation of the compute job for one table and task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// Service-assigned run identifier.
    pub job_run_id: String,
    /// Compute application the run belongs to.
    pub application_id: String,
    /// Run name (`fl-step` / `cdc-step`).
    pub name: String,
    /// Script the run executes.
    pub entry_point: String,
    /// Script arguments.
    pub arguments: Vec<String>,
    /// Last observed state.
    pub state: JobState,
    /// When the run was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// Opaque continuation handle used exactly once to signal a table's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackToken(String);

impl CallbackToken {
    /// Wrap an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-table workflow trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Task identifier correlating the replication task with its status record.
    pub replication_task_id: String,
    /// `full-load` or `cdc`.
    pub task_type: TaskType,
    /// Source schema.
    pub schema_name: String,
    /// Source table.
    pub table_name: String,
    /// Target schema in the analytical store.
    pub tgt_schema_name: String,
    /// Target table in the analytical store.
    #[serde(default)]
    pub tgt_table_name: String,
    /// Column used to split the full load into ranges.
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Number of range segments.
    #[serde(default)]
    pub num_segments: Option<u32>,
    /// Owner (schema) the split query runs against.
    #[serde(default)]
    pub edp_owner: Option<String>,
}

impl MigrationRequest {
    /// Unpartitioned request.
    pub fn new(
        replication_task_id: impl Into<String>,
        task_type: TaskType,
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        tgt_schema_name: impl Into<String>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            replication_task_id: replication_task_id.into(),
            task_type,
            schema_name: schema_name.into(),
            tgt_table_name: table_name.clone(),
            table_name,
            tgt_schema_name: tgt_schema_name.into(),
            partition_key: None,
            num_segments: None,
            edp_owner: None,
        }
    }

    /// Request a range-partitioned full load.
    pub fn with_splits(
        mut self,
        partition_key: impl Into<String>,
        num_segments: u32,
        edp_owner: impl Into<String>,
    ) -> Self {
        self.partition_key = Some(partition_key.into());
        self.num_segments = Some(num_segments);
        self.edp_owner = Some(edp_owner.into());
        self
    }

    /// Check required fields and the task identifier format.
    ///
    /// Identifiers must start with a letter, contain only ASCII letters,
    /// digits and single hyphens, not end with a hyphen, and be at most
    /// 255 characters long.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("schema_name", &self.schema_name),
            ("table_name", &self.table_name),
            ("tgt_schema_name", &self.tgt_schema_name),
        ] {
            if value.trim().is_empty() {
                return Err(OrchestratorError::Validation {
                    field: field.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        let id = &self.replication_task_id;
        let invalid = |message: &str| OrchestratorError::Validation {
            field: "replication_task_id".to_string(),
            message: message.to_string(),
        };
        if id.is_empty() || id.len() > 255 {
            return Err(invalid("must be 1 to 255 characters"));
        }
        if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(invalid("must start with a letter"));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("may only contain letters, digits and hyphens"));
        }
        if id.ends_with('-') || id.contains("--") {
            return Err(invalid("must not end with a hyphen or contain two in a row"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskType::FullLoad).unwrap(),
            "\"full-load\""
        );
        assert_eq!(serde_json::to_string(&TaskType::Cdc).unwrap(), "\"cdc\"");
        assert_eq!("FULL-LOAD".parse::<TaskType>().unwrap(), TaskType::FullLoad);
        assert!("bulk".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_task_status_parse() {
        assert_eq!("creating".parse::<TaskStatus>().unwrap(), TaskStatus::Created);
        assert_eq!("Running".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert!("paused".parse::<TaskStatus>().is_err());
        for status in [
            TaskStatus::Created,
            TaskStatus::Ready,
            TaskStatus::Running,
            TaskStatus::Stopped,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Cancelling.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert_eq!(
            serde_json::to_string(&JobState::Success).unwrap(),
            "\"SUCCESS\""
        );
    }

    #[test]
    fn test_request_deserialize_trigger_payload() {
        let request: MigrationRequest = serde_json::from_value(serde_json::json!({
            "replication_task_id": "sales-orders",
            "task_type": "full-load",
            "schema_name": "SALES",
            "table_name": "ORDERS",
            "tgt_schema_name": "lake_sales",
            "tgt_table_name": "orders"
        }))
        .unwrap();

        assert_eq!(request.task_type, TaskType::FullLoad);
        assert!(request.partition_key.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let ok = MigrationRequest::new("orders-fl", TaskType::FullLoad, "SALES", "ORDERS", "lake");
        assert!(ok.validate().is_ok());

        for bad in ["1orders", "orders-", "orders--fl", "orders_fl", ""] {
            let mut request = ok.clone();
            request.replication_task_id = bad.to_string();
            assert!(request.validate().is_err(), "'{}' should be rejected", bad);
        }

        let mut request = ok.clone();
        request.schema_name = " ".to_string();
        let err = request.validate().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_callback_token_is_transparent() {
        let token = CallbackToken::new("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc\"");
        assert_ne!(CallbackToken::generate(), CallbackToken::generate());
    }
}
