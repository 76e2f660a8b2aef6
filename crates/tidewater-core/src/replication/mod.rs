// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replication service boundary and the task controller built on it.
//!
//! [`ReplicationService`] models the external database-replication service as
//! opaque operations. [`ReplicationTaskController`] layers the resolution,
//! conflict, start and deletion policies on top of it.

pub mod controller;
pub mod mock;

pub use controller::ReplicationTaskController;
pub use mock::MockReplicationService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::mapping::TableMapping;
use crate::types::{EndpointHandle, InstanceHandle, ReplicationTask, TableStatistics, TaskHandle, TaskType};

/// Tag attached to created replication tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceTag {
    pub key: String,
    pub value: String,
}

/// Parameters of `createReplicationTask`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTaskRequest {
    /// Task identifier.
    pub identifier: String,
    pub source_endpoint_arn: String,
    pub target_endpoint_arn: String,
    pub replication_instance_arn: String,
    /// Migration type.
    pub task_type: TaskType,
    /// Selection and parallel-load rules.
    pub table_mapping: TableMapping,
    /// Task settings document.
    pub settings: Value,
    /// Stable resource identifier, equal to the task identifier.
    pub resource_identifier: String,
    pub tags: Vec<ResourceTag>,
}

/// How a task is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartType {
    /// First start of a task.
    StartReplication,
    /// Resume a stopped task where it left off.
    ResumeProcessing,
    /// Reload the target from scratch.
    ReloadTarget,
}

/// Filter of `describeReplicationTasks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFilter {
    /// Match on the caller-assigned identifier.
    Identifier(String),
    /// Match on the resource name.
    Arn(String),
}

/// External database-replication service.
///
/// Every call may fail with a transient [`ServiceError`] (throttling,
/// timeouts); the polling loops retry those on their next interval.
#[async_trait]
pub trait ReplicationService: Send + Sync {
    /// Endpoints whose logical identifier matches.
    async fn describe_endpoints(&self, logical_id: &str) -> Result<Vec<EndpointHandle>, ServiceError>;

    /// Replication instances whose logical identifier matches.
    async fn describe_replication_instances(
        &self,
        logical_id: &str,
    ) -> Result<Vec<InstanceHandle>, ServiceError>;

    /// Create a task. Fails with `AlreadyExists` if the identifier is taken.
    async fn create_replication_task(&self, request: &CreateTaskRequest) -> Result<ReplicationTask, ServiceError>;

    /// Start a task.
    async fn start_replication_task(&self, arn: &str, start_type: StartType) -> Result<(), ServiceError>;

    /// Tasks matching the filter.
    async fn describe_replication_tasks(&self, filter: &TaskFilter) -> Result<Vec<ReplicationTask>, ServiceError>;

    /// Per-table statistics of a task.
    async fn describe_table_statistics(&self, arn: &str) -> Result<Vec<TableStatistics>, ServiceError>;

    /// Delete a task.
    async fn delete_replication_task(&self, arn: &str) -> Result<(), ServiceError>;
}

/// Tags every created task carries.
pub fn default_tags() -> Vec<ResourceTag> {
    vec![ResourceTag {
        key: "Name".to_string(),
        value: "DMS replication task".to_string(),
    }]
}

impl TaskHandle {
    /// Filter matching exactly this task.
    pub fn filter(&self) -> TaskFilter {
        TaskFilter::Arn(self.arn.clone())
    }
}
