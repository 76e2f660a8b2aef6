// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task monitor: fixed-cadence status polling and the status-transition policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::persistence::{StatusStore, TableStatusRecord, TableStatusUpdate};
use crate::replication::ReplicationTaskController;
use crate::types::{ReplicationTask, TableStatistics, TaskHandle, TaskStatus, TaskType};

/// What the orchestrator does after observing a task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDecision {
    /// The task is `ready` and has not been started yet.
    Start,
    /// Nothing actionable yet; poll again after the interval.
    KeepPolling,
    /// A CDC task is replicating; treat it as successful.
    CdcRunning,
    /// A full-load task stopped: the load is complete.
    Completed,
    /// The task failed, or a CDC task stopped. Terminal, never retried.
    Failed,
}

/// Status-transition policy evaluated on each poll.
///
/// Task type is the only discriminator between the CDC and full-load branches;
/// a `running` status alone never picks one.
pub fn evaluate_task_status(task_type: TaskType, status: TaskStatus, already_started: bool) -> TaskDecision {
    match (status, task_type) {
        (TaskStatus::Failed, _) => TaskDecision::Failed,
        (TaskStatus::Stopped, TaskType::FullLoad) => TaskDecision::Completed,
        // cdc never stops on its own
        (TaskStatus::Stopped, TaskType::Cdc) => TaskDecision::Failed,
        (TaskStatus::Running, TaskType::Cdc) => TaskDecision::CdcRunning,
        (TaskStatus::Running, TaskType::FullLoad) => TaskDecision::KeepPolling,
        (TaskStatus::Ready, _) if !already_started => TaskDecision::Start,
        (TaskStatus::Ready, _)
        | (TaskStatus::Created, _)
        | (TaskStatus::Starting, _)
        | (TaskStatus::Stopping, _)
        | (TaskStatus::Deleting, _) => TaskDecision::KeepPolling,
    }
}

/// Polls replication task status and records observations.
#[derive(Clone)]
pub struct TaskMonitor {
    controller: ReplicationTaskController,
    store: Arc<dyn StatusStore>,
    interval: Duration,
}

impl TaskMonitor {
    pub fn new(controller: ReplicationTaskController, store: Arc<dyn StatusStore>, interval: Duration) -> Self {
        Self {
            controller,
            store,
            interval,
        }
    }

    /// Poll every interval until the policy yields something other than
    /// [`TaskDecision::KeepPolling`].
    ///
    /// Transient service errors are logged and retried on the next tick.
    /// Anything else aborts the wait.
    pub async fn await_task(
        &self,
        handle: &TaskHandle,
        task_type: TaskType,
        already_started: bool,
    ) -> Result<(ReplicationTask, TaskDecision)> {
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(self.interval).await;
            polls += 1;

            let task = match self.controller.describe_task(handle).await {
                Ok(task) => task,
                Err(e) if e.is_transient() => {
                    warn!(
                        task_id = %handle.identifier,
                        poll = polls,
                        error = %e,
                        "Transient error polling replication task, retrying next interval"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let decision = evaluate_task_status(task_type, task.status, already_started);
            debug!(
                task_id = %handle.identifier,
                poll = polls,
                status = %task.status,
                decision = ?decision,
                "Polled replication task"
            );
            if decision != TaskDecision::KeepPolling {
                return Ok((task, decision));
            }
        }
    }

    /// Write the start-of-run record: endpoints, instance, status, start time.
    ///
    /// Fields of an earlier cycle that the start does not touch (last
    /// full-load time, last job run) are carried over.
    pub async fn record_start(
        &self,
        table_name: &str,
        task: &ReplicationTask,
        landing_path: &str,
    ) -> Result<()> {
        let existing = self.store.get_item(&task.identifier, table_name).await?;
        let mut record = existing.unwrap_or_else(|| {
            TableStatusRecord::new(&task.identifier, table_name, task.task_type, task.status)
        });

        record.schema_name = task.schema_name().map(str::to_string);
        record.task_type = task.task_type;
        record.task_status = task.status;
        record.source_endpoint_arn = Some(task.source_endpoint_arn.clone());
        record.target_endpoint_arn = Some(task.target_endpoint_arn.clone());
        record.replication_instance_arn = Some(task.replication_instance_arn.clone());
        record.task_started_at = Some(task.started_at.unwrap_or_else(Utc::now));
        record.landing_path = Some(landing_path.to_string());
        record.updated_at = Utc::now();

        self.store.put_item(&record).await?;
        info!(
            task_id = %task.identifier,
            table = %table_name,
            status = %task.status,
            "Recorded replication task start"
        );
        Ok(())
    }

    /// Record a terminal or actionable observation.
    ///
    /// A stopped full-load task also stamps the last full-load time.
    pub async fn record_observation(
        &self,
        table_name: &str,
        task: &ReplicationTask,
        table_stats: Option<Vec<TableStatistics>>,
    ) -> Result<()> {
        let mut update = TableStatusUpdate::observed(task.task_type, task.status);
        update.schema_name = task.schema_name().map(str::to_string);
        update.replication_stats = task.statistics.clone();
        update.table_stats = table_stats;
        if task.task_type == TaskType::FullLoad && task.status == TaskStatus::Stopped {
            update.last_full_load_at = Some(Utc::now());
        }

        self.store.update_item(&task.identifier, table_name, update).await?;
        debug!(
            task_id = %task.identifier,
            table = %table_name,
            status = %task.status,
            "Recorded replication task observation"
        );
        Ok(())
    }
}
