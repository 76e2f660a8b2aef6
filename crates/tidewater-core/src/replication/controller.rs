// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replication task controller.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result, ServiceErrorKind};
use crate::mapping::TableMapping;
use crate::types::{
    EndpointHandle, InstanceHandle, ReplicationTask, TableStatistics, TaskHandle, TaskStatus, TaskType,
};

use super::{CreateTaskRequest, ReplicationService, StartType, TaskFilter, default_tags};

/// Issues create/start/delete operations and resolves logical identifiers.
#[derive(Clone)]
pub struct ReplicationTaskController {
    service: Arc<dyn ReplicationService>,
}

impl ReplicationTaskController {
    pub fn new(service: Arc<dyn ReplicationService>) -> Self {
        Self { service }
    }

    /// Resolve a logical endpoint identifier to exactly one handle.
    pub async fn resolve_endpoint(&self, logical_id: &str) -> Result<EndpointHandle> {
        let handles = self.service.describe_endpoints(logical_id).await?;
        exactly_one("endpoint", logical_id, handles)
    }

    /// Resolve a logical replication instance identifier to exactly one handle.
    pub async fn resolve_instance(&self, logical_id: &str) -> Result<InstanceHandle> {
        let handles = self.service.describe_replication_instances(logical_id).await?;
        exactly_one("replication instance", logical_id, handles)
    }

    /// Create a replication task.
    ///
    /// A reused identifier is a caller bug and surfaces as
    /// [`OrchestratorError::Conflict`] without retry.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        identifier: &str,
        source: &EndpointHandle,
        target: &EndpointHandle,
        instance: &InstanceHandle,
        task_type: TaskType,
        table_mapping: &TableMapping,
        settings: &Value,
    ) -> Result<TaskHandle> {
        let request = CreateTaskRequest {
            identifier: identifier.to_string(),
            source_endpoint_arn: source.arn.clone(),
            target_endpoint_arn: target.arn.clone(),
            replication_instance_arn: instance.arn.clone(),
            task_type,
            table_mapping: table_mapping.clone(),
            settings: settings.clone(),
            resource_identifier: identifier.to_string(),
            tags: default_tags(),
        };

        let task = self
            .service
            .create_replication_task(&request)
            .await
            .map_err(|e| match e.kind {
                ServiceErrorKind::AlreadyExists => OrchestratorError::Conflict {
                    identifier: identifier.to_string(),
                },
                _ => e.into(),
            })?;

        info!(
            task_id = %identifier,
            task_type = %task_type,
            arn = %task.arn,
            "Replication task created"
        );
        Ok(task.handle())
    }

    /// Start a task that is in `ready` state.
    pub async fn start_task(&self, handle: &TaskHandle) -> Result<()> {
        let task = self.describe_task(handle).await?;
        if task.status != TaskStatus::Ready {
            return Err(invalid_state(handle, task.status.as_str()));
        }

        self.service
            .start_replication_task(&handle.arn, StartType::StartReplication)
            .await
            .map_err(|e| match e.kind {
                ServiceErrorKind::InvalidState => invalid_state(handle, &e.message),
                _ => e.into(),
            })?;

        info!(task_id = %handle.identifier, "Replication task started");
        Ok(())
    }

    /// Delete a full-load task. CDC tasks keep running and are never deleted.
    pub async fn delete_task(&self, handle: &TaskHandle, task_type: TaskType) -> Result<()> {
        if task_type == TaskType::Cdc {
            warn!(task_id = %handle.identifier, "Refusing to delete CDC replication task");
            return Err(OrchestratorError::DeletionNotPermitted {
                identifier: handle.identifier.clone(),
                task_type,
            });
        }

        self.service.delete_replication_task(&handle.arn).await?;
        info!(task_id = %handle.identifier, "Replication task deleted");
        Ok(())
    }

    /// Current description of a task.
    pub async fn describe_task(&self, handle: &TaskHandle) -> Result<ReplicationTask> {
        let tasks = self.service.describe_replication_tasks(&handle.filter()).await?;
        tasks.into_iter().next().ok_or_else(|| OrchestratorError::NotFound {
            resource: "replication task",
            logical_id: handle.identifier.clone(),
        })
    }

    /// Look a task up by identifier; `None` when it does not exist.
    pub async fn find_task(&self, identifier: &str) -> Result<Option<ReplicationTask>> {
        let filter = TaskFilter::Identifier(identifier.to_string());
        match self.service.describe_replication_tasks(&filter).await {
            Ok(tasks) => {
                debug!(task_id = %identifier, matches = tasks.len(), "Looked up replication task");
                Ok(tasks.into_iter().next())
            }
            Err(e) if e.kind == ServiceErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Final per-table statistics of a task.
    pub async fn table_statistics(&self, handle: &TaskHandle) -> Result<Vec<TableStatistics>> {
        Ok(self.service.describe_table_statistics(&handle.arn).await?)
    }
}

fn exactly_one<T>(resource: &'static str, logical_id: &str, mut handles: Vec<T>) -> Result<T> {
    match handles.len() {
        0 => Err(OrchestratorError::NotFound {
            resource,
            logical_id: logical_id.to_string(),
        }),
        1 => Ok(handles.remove(0)),
        matches => Err(OrchestratorError::Ambiguous {
            resource,
            logical_id: logical_id.to_string(),
            matches,
        }),
    }
}

fn invalid_state(handle: &TaskHandle, actual: &str) -> OrchestratorError {
    OrchestratorError::InvalidState {
        identifier: handle.identifier.clone(),
        expected: TaskStatus::Ready.as_str().to_string(),
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::replication::MockReplicationService;

    fn controller(service: &Arc<MockReplicationService>) -> ReplicationTaskController {
        ReplicationTaskController::new(service.clone())
    }

    async fn handles(
        controller: &ReplicationTaskController,
    ) -> (EndpointHandle, EndpointHandle, InstanceHandle) {
        (
            controller.resolve_endpoint("dms-postgres-endpoint").await.unwrap(),
            controller.resolve_endpoint("dms-s3-endpoint").await.unwrap(),
            controller.resolve_instance("dms").await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_resolve_endpoint_zero_one_many() {
        let service = Arc::new(
            MockReplicationService::new()
                .with_endpoint("src", "arn:endpoint:src")
                .with_endpoint("dup", "arn:endpoint:dup-1")
                .with_endpoint("dup", "arn:endpoint:dup-2"),
        );
        let controller = controller(&service);

        let handle = controller.resolve_endpoint("src").await.unwrap();
        assert_eq!(handle.arn, "arn:endpoint:src");

        let err = controller.resolve_endpoint("missing").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));

        let err = controller.resolve_endpoint("dup").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Ambiguous { matches: 2, .. }));
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_create_task_conflict() {
        let service = Arc::new(MockReplicationService::standard());
        let controller = controller(&service);
        let (src, tgt, instance) = handles(&controller).await;
        let mapping = TableMapping::single_table("SALES", "ORDERS");
        let settings = crate::config::default_task_settings();

        let handle = controller
            .create_task("orders", &src, &tgt, &instance, TaskType::FullLoad, &mapping, &settings)
            .await
            .unwrap();
        assert_eq!(handle.identifier, "orders");

        let err = controller
            .create_task("orders", &src, &tgt, &instance, TaskType::FullLoad, &mapping, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict { .. }));
        assert_eq!(service.call_count("create_replication_task").await, 2);

        let request = service.created_requests().await.remove(0);
        assert_eq!(request.resource_identifier, "orders");
        assert_eq!(request.tags, default_tags());
        assert_eq!(request.settings["FullLoadSettings"]["MaxFullLoadSubTasks"], 49);
    }

    #[tokio::test]
    async fn test_start_task_requires_ready() {
        let service = Arc::new(MockReplicationService::standard());
        service
            .script_creation("orders", vec![TaskStatus::Created, TaskStatus::Ready])
            .await;
        let controller = controller(&service);
        let (src, tgt, instance) = handles(&controller).await;
        let mapping = TableMapping::single_table("SALES", "ORDERS");

        let handle = controller
            .create_task("orders", &src, &tgt, &instance, TaskType::FullLoad, &mapping, &Value::Null)
            .await
            .unwrap();

        // first describe still reports created
        let err = controller.start_task(&handle).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidState { ref actual, .. } if actual == "created"
        ));

        controller.start_task(&handle).await.unwrap();
        assert_eq!(service.call_count("start_replication_task").await, 1);
    }

    #[tokio::test]
    async fn test_delete_task_only_full_load() {
        let service = Arc::new(MockReplicationService::standard());
        let controller = controller(&service);
        let handle = TaskHandle {
            identifier: "orders".to_string(),
            arn: "arn:task:orders".to_string(),
        };

        let err = controller.delete_task(&handle, TaskType::Cdc).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeletionNotPermitted { .. }));
        assert_eq!(service.call_count("delete_replication_task").await, 0);

        let err = controller.delete_task(&handle, TaskType::FullLoad).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Service(ServiceError { kind: ServiceErrorKind::NotFound, .. })));
        assert_eq!(service.call_count("delete_replication_task").await, 1);
    }

    #[tokio::test]
    async fn test_find_task_missing() {
        let service = Arc::new(MockReplicationService::standard());
        assert!(controller(&service).find_task("nope").await.unwrap().is_none());
    }
}
