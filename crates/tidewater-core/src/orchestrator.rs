// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-table workflow state machine.
//!
//! One [`Orchestrator::run`] call drives one table from split planning to a
//! terminal state and consumes the caller's callback token exactly once.
//! Re-running a table whose replication task still exists resumes at
//! `EvaluatingTaskStatus` instead of creating a new task.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::compute::{
    ComputeJobDispatcher, ComputeJobService, JobArguments, JobDecision, evaluate_job_state,
};
use crate::config::{CdcComputePolicy, Config, TimeoutPolicy};
use crate::error::{OrchestratorError, Result};
use crate::mapping::TableMapping;
use crate::monitor::{TaskDecision, TaskMonitor, evaluate_task_status};
use crate::persistence::{StatusStore, TableStatusUpdate};
use crate::replication::{ReplicationService, ReplicationTaskController};
use crate::signals::{SignalGateway, SignalOutcome};
use crate::splits::{SplitPlan, SplitPlanner, SplitRequest};
use crate::types::{
    CallbackToken, JobRun, JobState, MigrationRequest, ReplicationTask, TaskHandle, TaskStatus, TaskType,
};

/// States of one table's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    PlanningSplits,
    CreatingTask,
    StartingTask,
    AwaitingTaskCompletion,
    EvaluatingTaskStatus,
    TaskCompletedBranch,
    CdcRunningBranch,
    TaskFailedBranch,
    DispatchingComputeJob,
    AwaitingJobCompletion,
    EvaluatingJobStatus,
    SignalSuccess,
    SignalFailure,
    Terminal,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanningSplits => "PlanningSplits",
            Self::CreatingTask => "CreatingTask",
            Self::StartingTask => "StartingTask",
            Self::AwaitingTaskCompletion => "AwaitingTaskCompletion",
            Self::EvaluatingTaskStatus => "EvaluatingTaskStatus",
            Self::TaskCompletedBranch => "TaskCompletedBranch",
            Self::CdcRunningBranch => "CdcRunningBranch",
            Self::TaskFailedBranch => "TaskFailedBranch",
            Self::DispatchingComputeJob => "DispatchingComputeJob",
            Self::AwaitingJobCompletion => "AwaitingJobCompletion",
            Self::EvaluatingJobStatus => "EvaluatingJobStatus",
            Self::SignalSuccess => "SignalSuccess",
            Self::SignalFailure => "SignalFailure",
            Self::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External collaborators of the orchestrator.
#[derive(Clone)]
pub struct Services {
    pub replication: Arc<dyn ReplicationService>,
    pub compute: Arc<dyn ComputeJobService>,
    pub store: Arc<dyn StatusStore>,
    pub gateway: Arc<dyn SignalGateway>,
    pub planner: Arc<dyn SplitPlanner>,
}

/// Result of a workflow that reached `Terminal`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub task_id: String,
    pub table_name: String,
    pub task_type: TaskType,
    /// States visited, in order.
    pub trace: Vec<WorkflowState>,
    /// The signal sent on the callback token, if any.
    pub signal: Option<SignalOutcome>,
    /// Compute job run dispatched by this workflow.
    pub job_run: Option<JobRun>,
    /// Terminal state of that run.
    pub job_state: Option<JobState>,
    /// Whether the workflow picked up an existing task or record.
    pub resumed: bool,
}

impl WorkflowOutcome {
    /// Whether the caller was told the table succeeded.
    pub fn succeeded(&self) -> bool {
        self.signal.as_ref().is_some_and(SignalOutcome::is_success)
    }

    /// Whether the workflow passed through `state`.
    pub fn visited(&self, state: WorkflowState) -> bool {
        self.trace.contains(&state)
    }
}

/// Mutable bookkeeping of one workflow execution.
struct WorkflowRun {
    request: MigrationRequest,
    token: Option<CallbackToken>,
    trace: Vec<WorkflowState>,
    signal: Option<SignalOutcome>,
    job_run: Option<JobRun>,
    job_state: Option<JobState>,
    resumed: bool,
}

impl WorkflowRun {
    fn new(request: MigrationRequest, token: CallbackToken) -> Self {
        Self {
            request,
            token: Some(token),
            trace: Vec::new(),
            signal: None,
            job_run: None,
            job_state: None,
            resumed: false,
        }
    }

    fn into_outcome(self) -> WorkflowOutcome {
        WorkflowOutcome {
            task_id: self.request.replication_task_id,
            table_name: self.request.table_name,
            task_type: self.request.task_type,
            trace: self.trace,
            signal: self.signal,
            job_run: self.job_run,
            job_state: self.job_state,
            resumed: self.resumed,
        }
    }
}

/// Composes controller, monitor and dispatcher into the per-table workflow.
#[derive(Clone)]
pub struct Orchestrator {
    config: Config,
    controller: ReplicationTaskController,
    monitor: TaskMonitor,
    dispatcher: ComputeJobDispatcher,
    store: Arc<dyn StatusStore>,
    gateway: Arc<dyn SignalGateway>,
    planner: Arc<dyn SplitPlanner>,
}

impl Orchestrator {
    pub fn new(config: &Config, services: Services) -> Self {
        let controller = ReplicationTaskController::new(services.replication);
        let monitor = TaskMonitor::new(controller.clone(), services.store.clone(), config.task_poll_interval);
        let dispatcher =
            ComputeJobDispatcher::new(services.compute, config.compute.clone(), config.job_poll_interval);

        Self {
            config: config.clone(),
            controller,
            monitor,
            dispatcher,
            store: services.store,
            gateway: services.gateway,
            planner: services.planner,
        }
    }

    /// Drive one table's workflow to a terminal state within the configured
    /// time budget.
    ///
    /// Terminal task and job failures are signaled on `token` and returned as
    /// an `Ok` outcome carrying the failure signal. Collaborator errors abort
    /// the workflow: a failure signal is sent if the token is still held and
    /// the error is returned. When the budget runs out the workflow is
    /// abandoned and the [`TimeoutPolicy`] decides whether the caller hears
    /// about it.
    pub async fn run(&self, request: MigrationRequest, token: CallbackToken) -> Result<WorkflowOutcome> {
        let mut run = WorkflowRun::new(request, token);
        let budget = self.config.workflow_timeout;

        let result = tokio::time::timeout(budget, self.drive(&mut run)).await;
        let err = match result {
            Ok(Ok(())) => return Ok(run.into_outcome()),
            Ok(Err(e)) => {
                error!(
                    task_id = %run.request.replication_task_id,
                    table = %run.request.table_name,
                    error_code = e.error_code(),
                    error = %e,
                    "Table workflow aborted"
                );
                e
            }
            Err(_) => {
                error!(
                    task_id = %run.request.replication_task_id,
                    table = %run.request.table_name,
                    budget_secs = budget.as_secs(),
                    "Table workflow timed out"
                );
                let e = OrchestratorError::Timeout { elapsed: budget };
                if self.config.timeout_policy == TimeoutPolicy::Silent {
                    warn!(
                        task_id = %run.request.replication_task_id,
                        "Abandoning workflow without a terminal signal"
                    );
                    return Err(e);
                }
                e
            }
        };

        if let Err(signal_err) = self
            .signal_failure(&mut run, err.error_code(), &err.to_string())
            .await
        {
            warn!(
                task_id = %run.request.replication_task_id,
                error = %signal_err,
                "Could not deliver failure signal"
            );
        }
        Err(err)
    }

    async fn drive(&self, run: &mut WorkflowRun) -> Result<()> {
        run.request.validate()?;
        let request = run.request.clone();
        let task_id = request.replication_task_id.as_str();
        let table = request.table_name.as_str();
        let task_type = request.task_type;

        let mut plan: Option<SplitPlan> = None;
        let mut handle: Option<TaskHandle> = None;
        let mut current: Option<ReplicationTask> = None;
        let mut decision = TaskDecision::KeepPolling;
        let mut started = false;
        let mut last_status = TaskStatus::Created;
        let mut pending_success: Value = Value::Null;
        let mut pending_failure: (String, String) = (String::new(), String::new());

        let mut state = match self.controller.find_task(task_id).await? {
            Some(task) => {
                if task.task_type != task_type {
                    return Err(OrchestratorError::Conflict {
                        identifier: task_id.to_string(),
                    });
                }
                started = task.started_at.is_some() || !matches!(task.status, TaskStatus::Created | TaskStatus::Ready);
                decision = evaluate_task_status(task_type, task.status, started);
                last_status = task.status;
                handle = Some(task.handle());
                info!(task_id, table, status = %task.status, "Resuming existing replication task");
                current = Some(task);
                run.resumed = true;
                WorkflowState::EvaluatingTaskStatus
            }
            None => match self.store.get_item(task_id, table).await? {
                Some(record)
                    if task_type == TaskType::FullLoad
                        && record.task_type == TaskType::FullLoad
                        && record.task_status == TaskStatus::Stopped
                        && record.last_job_state != Some(JobState::Success) =>
                {
                    info!(task_id, table, "Full load already recorded, resuming at compute job");
                    last_status = TaskStatus::Stopped;
                    run.resumed = true;
                    WorkflowState::DispatchingComputeJob
                }
                _ => WorkflowState::PlanningSplits,
            },
        };

        loop {
            run.trace.push(state);
            info!(task_id, table, state = %state, "Workflow transition");

            state = match state {
                WorkflowState::PlanningSplits => {
                    plan = self.plan_splits(&request).await?;
                    WorkflowState::CreatingTask
                }

                WorkflowState::CreatingTask => {
                    let source = self.controller.resolve_endpoint(self.config.source.endpoint_id()).await?;
                    let target = self.controller.resolve_endpoint(&self.config.target_endpoint_id).await?;
                    let instance = self
                        .controller
                        .resolve_instance(&self.config.replication_instance_id)
                        .await?;
                    let mapping = TableMapping::for_table(&request.schema_name, table, plan.as_ref());

                    handle = Some(
                        self.controller
                            .create_task(
                                task_id,
                                &source,
                                &target,
                                &instance,
                                task_type,
                                &mapping,
                                &self.config.task_settings,
                            )
                            .await?,
                    );
                    WorkflowState::AwaitingTaskCompletion
                }

                WorkflowState::StartingTask => {
                    let handle = require(&handle)?;
                    self.controller.start_task(handle).await?;
                    started = true;

                    if let Some(task) = current.as_mut() {
                        task.status = TaskStatus::Starting;
                        task.started_at = Some(chrono::Utc::now());
                        last_status = task.status;
                        let landing = self.config.landing_path(&request.schema_name, table);
                        self.monitor.record_start(table, task, &landing).await?;
                    }
                    WorkflowState::AwaitingTaskCompletion
                }

                WorkflowState::AwaitingTaskCompletion => {
                    let (task, next) = self.monitor.await_task(require(&handle)?, task_type, started).await?;
                    decision = next;
                    last_status = task.status;
                    current = Some(task);
                    WorkflowState::EvaluatingTaskStatus
                }

                WorkflowState::EvaluatingTaskStatus => match decision {
                    TaskDecision::Start => WorkflowState::StartingTask,
                    TaskDecision::KeepPolling => WorkflowState::AwaitingTaskCompletion,
                    TaskDecision::Completed => WorkflowState::TaskCompletedBranch,
                    TaskDecision::CdcRunning => WorkflowState::CdcRunningBranch,
                    TaskDecision::Failed => WorkflowState::TaskFailedBranch,
                },

                WorkflowState::TaskCompletedBranch => {
                    let handle = require(&handle)?;
                    let task = require(&current)?;
                    let stats = self.controller.table_statistics(handle).await?;
                    self.monitor.record_observation(table, task, Some(stats)).await?;
                    self.controller.delete_task(handle, task_type).await?;
                    WorkflowState::DispatchingComputeJob
                }

                WorkflowState::CdcRunningBranch => {
                    let task = require(&current)?;
                    self.monitor.record_observation(table, task, None).await?;
                    self.signal_success(
                        run,
                        json!({"status": "CDC Task Running", "task_id": task_id, "table": table}),
                    )
                    .await?;

                    match self.config.cdc_compute_policy {
                        CdcComputePolicy::FollowOn => WorkflowState::DispatchingComputeJob,
                        CdcComputePolicy::Skip => WorkflowState::Terminal,
                    }
                }

                WorkflowState::TaskFailedBranch => {
                    let task = require(&current)?;
                    self.monitor.record_observation(table, task, None).await?;
                    let (code, default_cause) = match task.status {
                        TaskStatus::Stopped => ("REPLICATION_TASK_STOPPED", "CDC replication task stopped"),
                        _ => ("REPLICATION_TASK_FAILED", "replication task failed"),
                    };
                    pending_failure = (
                        code.to_string(),
                        task.last_failure_message
                            .clone()
                            .unwrap_or_else(|| default_cause.to_string()),
                    );
                    WorkflowState::SignalFailure
                }

                WorkflowState::DispatchingComputeJob => {
                    let args = JobArguments::new(&request.schema_name, table, &request.tgt_schema_name);
                    let job = self.dispatcher.submit_for(task_type, &args).await?;

                    let mut update = TableStatusUpdate::observed(task_type, last_status);
                    update.last_job_run_id = Some(job.job_run_id.clone());
                    update.last_job_state = Some(job.state);
                    self.store.update_item(task_id, table, update).await?;

                    run.job_run = Some(job);
                    WorkflowState::AwaitingJobCompletion
                }

                WorkflowState::AwaitingJobCompletion => {
                    let job = require(&run.job_run)?;
                    let job_state = self.dispatcher.poll(job).await?;

                    let mut update = TableStatusUpdate::observed(task_type, last_status);
                    update.last_job_state = Some(job_state);
                    self.store.update_item(task_id, table, update).await?;

                    if let Some(job) = run.job_run.as_mut() {
                        job.state = job_state;
                    }
                    run.job_state = Some(job_state);
                    WorkflowState::EvaluatingJobStatus
                }

                WorkflowState::EvaluatingJobStatus => {
                    let job_state = run.job_state.unwrap_or(JobState::Submitted);
                    match evaluate_job_state(task_type, job_state) {
                        Some(JobDecision::SignalSuccess) => {
                            pending_success = json!({"status": "EMR Step Success"});
                            WorkflowState::SignalSuccess
                        }
                        Some(JobDecision::EndWithoutSignal) => WorkflowState::Terminal,
                        Some(JobDecision::SignalFailure) if run.token.is_some() => {
                            let code = match job_state {
                                JobState::Cancelled => "COMPUTE_JOB_CANCELLED",
                                _ => "COMPUTE_JOB_FAILED",
                            };
                            pending_failure = (code.to_string(), format!("compute job ended {}", job_state));
                            WorkflowState::SignalFailure
                        }
                        Some(JobDecision::SignalFailure) => {
                            // success was already signaled at the monitor stage
                            error!(
                                task_id,
                                table,
                                job_state = %job_state,
                                "CDC follow-on compute job failed after success was signaled"
                            );
                            WorkflowState::Terminal
                        }
                        None => WorkflowState::AwaitingJobCompletion,
                    }
                }

                WorkflowState::SignalSuccess => {
                    self.signal_success(run, std::mem::take(&mut pending_success)).await?;
                    WorkflowState::Terminal
                }

                WorkflowState::SignalFailure => {
                    let (code, cause) = std::mem::take(&mut pending_failure);
                    self.signal_failure(run, &code, &cause).await?;
                    WorkflowState::Terminal
                }

                WorkflowState::Terminal => {
                    info!(task_id, table, signaled = run.signal.is_some(), "Table workflow finished");
                    return Ok(());
                }
            };
        }
    }

    async fn plan_splits(&self, request: &MigrationRequest) -> Result<Option<SplitPlan>> {
        let Some(split_request) = SplitRequest::from_request(request) else {
            info!(table = %request.table_name, "Splits not requested, loading unpartitioned");
            return Ok(None);
        };

        let plan = self.planner.compute_splits(&split_request).await?;
        match &plan {
            Some(plan) => info!(
                table = %request.table_name,
                column = %plan.partition_column,
                ranges = plan.boundaries.len(),
                "Split plan computed"
            ),
            None => info!(table = %request.table_name, "Planner returned no split plan"),
        }
        Ok(plan)
    }

    /// Consume the token with a success signal. A second call is a no-op.
    ///
    /// The token stays held until the gateway accepts the signal, so a failed
    /// or interrupted send still leaves it for the failure path in [`run`](Self::run).
    async fn signal_success(&self, run: &mut WorkflowRun, output: Value) -> Result<()> {
        let Some(token) = run.token.clone() else {
            warn!(task_id = %run.request.replication_task_id, "Token already consumed, success not re-sent");
            return Ok(());
        };

        self.gateway.send_task_success(&token, output.clone()).await?;
        run.token = None;
        info!(task_id = %run.request.replication_task_id, table = %run.request.table_name, "Success signaled");
        run.signal = Some(SignalOutcome::Success { output });
        Ok(())
    }

    /// Consume the token with a failure signal. A second call is a no-op.
    async fn signal_failure(&self, run: &mut WorkflowRun, error: &str, cause: &str) -> Result<()> {
        let Some(token) = run.token.clone() else {
            return Ok(());
        };

        self.gateway.send_task_failure(&token, error, cause).await?;
        run.token = None;
        info!(
            task_id = %run.request.replication_task_id,
            table = %run.request.table_name,
            error,
            "Failure signaled"
        );
        run.signal = Some(SignalOutcome::Failure {
            error: error.to_string(),
            cause: cause.to_string(),
        });
        Ok(())
    }
}

fn require<T>(value: &Option<T>) -> Result<&T> {
    value.as_ref().ok_or_else(|| OrchestratorError::Validation {
        field: "workflow".to_string(),
        message: "state reached without its prerequisite".to_string(),
    })
}
