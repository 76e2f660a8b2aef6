// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock replication service for testing.
//!
//! Keeps tasks in memory and replays a scripted sequence of statuses: each
//! `describe_replication_tasks` call observes the next scripted status and the
//! last one sticks once the script is exhausted. Tasks get one script for the
//! time between creation and start, and another once started.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceErrorKind};
use crate::mapping::TableMapping;
use crate::types::{
    EndpointHandle, InstanceHandle, ReplicationTask, TableStatistics, TaskStatistics, TaskStatus, TaskType,
};

use super::{CreateTaskRequest, ReplicationService, StartType, TaskFilter};

#[derive(Debug)]
struct MockTask {
    task: ReplicationTask,
    pending: VecDeque<TaskStatus>,
}

#[derive(Debug, Default)]
struct State {
    endpoints: Vec<EndpointHandle>,
    instances: Vec<InstanceHandle>,
    tasks: HashMap<String, MockTask>,
    creation_scripts: HashMap<String, Vec<TaskStatus>>,
    start_scripts: HashMap<String, Vec<TaskStatus>>,
    failures: HashMap<&'static str, VecDeque<ServiceError>>,
    calls: Vec<&'static str>,
    created: Vec<CreateTaskRequest>,
    starts: Vec<(String, StartType)>,
    deleted: Vec<String>,
}

impl State {
    fn enter(&mut self, operation: &'static str) -> Result<(), ServiceError> {
        self.calls.push(operation);
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn task_by_arn(&mut self, operation: &str, arn: &str) -> Result<&mut MockTask, ServiceError> {
        self.tasks
            .values_mut()
            .find(|t| t.task.arn == arn)
            .ok_or_else(|| ServiceError::new(ServiceErrorKind::NotFound, operation, format!("no task {}", arn)))
    }
}

/// In-memory replication service with scripted task statuses.
#[derive(Debug, Default)]
pub struct MockReplicationService {
    state: Mutex<State>,
}

impl MockReplicationService {
    /// Empty service: no endpoints, no instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Service with the default source/target endpoints and the `dms` instance.
    pub fn standard() -> Self {
        Self::new()
            .with_endpoint("dms-postgres-endpoint", "arn:mock:endpoint:postgres")
            .with_endpoint("dms-oracle-endpoint", "arn:mock:endpoint:oracle")
            .with_endpoint("dms-mysql-endpoint", "arn:mock:endpoint:mysql")
            .with_endpoint("dms-s3-endpoint", "arn:mock:endpoint:s3")
            .with_instance("dms", "arn:mock:rep:dms")
    }

    /// Register an endpoint. Registering one logical id twice makes it ambiguous.
    pub fn with_endpoint(mut self, endpoint_id: &str, arn: &str) -> Self {
        self.state.get_mut().endpoints.push(EndpointHandle {
            endpoint_id: endpoint_id.to_string(),
            arn: arn.to_string(),
        });
        self
    }

    /// Register a replication instance.
    pub fn with_instance(mut self, instance_id: &str, arn: &str) -> Self {
        self.state.get_mut().instances.push(InstanceHandle {
            instance_id: instance_id.to_string(),
            arn: arn.to_string(),
        });
        self
    }

    /// Statuses observed between creation and start (default: `ready`).
    pub async fn script_creation(&self, identifier: &str, statuses: Vec<TaskStatus>) {
        let mut state = self.state.lock().await;
        state.creation_scripts.insert(identifier.to_string(), statuses);
    }

    /// Statuses observed after start (default: `running, stopped` for
    /// full-load, `running` for CDC).
    pub async fn script_task(&self, identifier: &str, statuses: Vec<TaskStatus>) {
        let mut state = self.state.lock().await;
        state.start_scripts.insert(identifier.to_string(), statuses);
    }

    /// Insert a task that already exists, as left behind by an earlier run.
    pub async fn seed_task(
        &self,
        identifier: &str,
        task_type: TaskType,
        schema_name: &str,
        table_name: &str,
        statuses: Vec<TaskStatus>,
    ) -> ReplicationTask {
        let mut state = self.state.lock().await;
        let status = statuses.first().copied().unwrap_or(TaskStatus::Ready);
        let task = ReplicationTask {
            identifier: identifier.to_string(),
            arn: task_arn(identifier),
            task_type,
            source_endpoint_arn: "arn:mock:endpoint:postgres".to_string(),
            target_endpoint_arn: "arn:mock:endpoint:s3".to_string(),
            replication_instance_arn: "arn:mock:rep:dms".to_string(),
            table_mapping: TableMapping::single_table(schema_name, table_name),
            status,
            last_failure_message: None,
            statistics: None,
            created_at: Utc::now(),
            started_at: match status {
                TaskStatus::Created | TaskStatus::Ready => None,
                _ => Some(Utc::now()),
            },
        };
        state.tasks.insert(
            identifier.to_string(),
            MockTask {
                task: task.clone(),
                pending: statuses.into(),
            },
        );
        task
    }

    /// Make the next call of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: &'static str, error: ServiceError) {
        let mut state = self.state.lock().await;
        state.failures.entry(operation).or_default().push_back(error);
    }

    /// How many times `operation` was called, failed calls included.
    pub async fn call_count(&self, operation: &str) -> usize {
        let state = self.state.lock().await;
        state.calls.iter().filter(|c| **c == operation).count()
    }

    /// Every create request received, in order.
    pub async fn created_requests(&self) -> Vec<CreateTaskRequest> {
        self.state.lock().await.created.clone()
    }

    /// Every start received, in order.
    pub async fn starts(&self) -> Vec<(String, StartType)> {
        self.state.lock().await.starts.clone()
    }

    /// Resource names of deleted tasks.
    pub async fn deleted_tasks(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    /// Whether a task with this identifier currently exists.
    pub async fn task_exists(&self, identifier: &str) -> bool {
        self.state.lock().await.tasks.contains_key(identifier)
    }
}

fn task_arn(identifier: &str) -> String {
    format!("arn:mock:task:{}", identifier)
}

fn default_start_script(task_type: TaskType) -> Vec<TaskStatus> {
    match task_type {
        TaskType::FullLoad => vec![TaskStatus::Running, TaskStatus::Stopped],
        TaskType::Cdc => vec![TaskStatus::Running],
    }
}

#[async_trait]
impl ReplicationService for MockReplicationService {
    async fn describe_endpoints(&self, logical_id: &str) -> Result<Vec<EndpointHandle>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("describe_endpoints")?;
        Ok(state
            .endpoints
            .iter()
            .filter(|e| e.endpoint_id == logical_id)
            .cloned()
            .collect())
    }

    async fn describe_replication_instances(
        &self,
        logical_id: &str,
    ) -> Result<Vec<InstanceHandle>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("describe_replication_instances")?;
        Ok(state
            .instances
            .iter()
            .filter(|i| i.instance_id == logical_id)
            .cloned()
            .collect())
    }

    async fn create_replication_task(&self, request: &CreateTaskRequest) -> Result<ReplicationTask, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("create_replication_task")?;
        state.created.push(request.clone());

        if state.tasks.contains_key(&request.identifier) {
            return Err(ServiceError::new(
                ServiceErrorKind::AlreadyExists,
                "create_replication_task",
                format!("task {} already exists", request.identifier),
            ));
        }

        let task = ReplicationTask {
            identifier: request.identifier.clone(),
            arn: task_arn(&request.identifier),
            task_type: request.task_type,
            source_endpoint_arn: request.source_endpoint_arn.clone(),
            target_endpoint_arn: request.target_endpoint_arn.clone(),
            replication_instance_arn: request.replication_instance_arn.clone(),
            table_mapping: request.table_mapping.clone(),
            status: TaskStatus::Created,
            last_failure_message: None,
            statistics: None,
            created_at: Utc::now(),
            started_at: None,
        };
        let pending = state
            .creation_scripts
            .get(&request.identifier)
            .cloned()
            .unwrap_or_else(|| vec![TaskStatus::Ready]);

        state.tasks.insert(
            request.identifier.clone(),
            MockTask {
                task: task.clone(),
                pending: pending.into(),
            },
        );
        Ok(task)
    }

    async fn start_replication_task(&self, arn: &str, start_type: StartType) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("start_replication_task")?;

        let task = state.task_by_arn("start_replication_task", arn)?;
        if task.task.status != TaskStatus::Ready {
            return Err(ServiceError::new(
                ServiceErrorKind::InvalidState,
                "start_replication_task",
                task.task.status.as_str(),
            ));
        }
        let identifier = task.task.identifier.clone();
        let task_type = task.task.task_type;

        let script = state
            .start_scripts
            .get(&identifier)
            .cloned()
            .unwrap_or_else(|| default_start_script(task_type));
        state.starts.push((identifier.clone(), start_type));

        if let Some(task) = state.tasks.get_mut(&identifier) {
            task.task.status = TaskStatus::Starting;
            task.task.started_at = Some(Utc::now());
            task.pending = script.into();
        }
        Ok(())
    }

    async fn describe_replication_tasks(&self, filter: &TaskFilter) -> Result<Vec<ReplicationTask>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("describe_replication_tasks")?;

        let mut found = Vec::new();
        for task in state.tasks.values_mut() {
            let matches = match filter {
                TaskFilter::Identifier(id) => &task.task.identifier == id,
                TaskFilter::Arn(arn) => &task.task.arn == arn,
            };
            if !matches {
                continue;
            }
            if let Some(status) = task.pending.pop_front() {
                task.task.status = status;
            }
            if task.task.status == TaskStatus::Failed {
                task.task.last_failure_message = Some("Last Error Task error notification received".to_string());
            }
            if matches!(task.task.status, TaskStatus::Running | TaskStatus::Stopped) {
                task.task.statistics = Some(TaskStatistics {
                    full_load_progress_percent: if task.task.status == TaskStatus::Stopped { 100 } else { 50 },
                    tables_loaded: i32::from(task.task.status == TaskStatus::Stopped),
                    tables_loading: i32::from(task.task.status == TaskStatus::Running),
                    start_date: task.task.started_at,
                    ..Default::default()
                });
            }
            found.push(task.task.clone());
        }
        Ok(found)
    }

    async fn describe_table_statistics(&self, arn: &str) -> Result<Vec<TableStatistics>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("describe_table_statistics")?;

        let task = state.task_by_arn("describe_table_statistics", arn)?;
        let Some(locator) = task.task.table_mapping.object_locator() else {
            return Ok(Vec::new());
        };
        Ok(vec![TableStatistics {
            schema_name: locator.schema_name.clone(),
            table_name: locator.table_name.clone(),
            full_load_rows: 1000,
            table_state: "Table completed".to_string(),
            last_update_time: Some(Utc::now()),
            ..Default::default()
        }])
    }

    async fn delete_replication_task(&self, arn: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("delete_replication_task")?;

        let identifier = state.task_by_arn("delete_replication_task", arn)?.task.identifier.clone();
        state.tasks.remove(&identifier);
        state.deleted.push(arn.to_string());
        Ok(())
    }
}
