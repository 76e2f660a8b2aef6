// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute job service boundary, dispatcher and job branch policy.

pub mod dispatcher;
pub mod mock;

pub use dispatcher::ComputeJobDispatcher;
pub use mock::MockComputeJobService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::{JobState, TaskType};

/// Parameters of `startJobRun`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartJobRunRequest {
    pub application_id: String,
    pub execution_role_arn: String,
    /// Run name (`fl-step` / `cdc-step`).
    pub name: String,
    /// Script location.
    pub entry_point: String,
    pub entry_point_arguments: Vec<String>,
    pub spark_submit_parameters: String,
    /// Idempotency token, fresh per submission.
    pub client_token: String,
}

/// External job-execution service.
#[async_trait]
pub trait ComputeJobService: Send + Sync {
    /// Submit a run; returns the run identifier.
    async fn start_job_run(&self, request: &StartJobRunRequest) -> Result<String, ServiceError>;

    /// Current state of a run.
    async fn get_job_run(&self, application_id: &str, job_run_id: &str) -> Result<JobState, ServiceError>;
}

/// Argument vector shared by the full-load and CDC scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArguments {
    pub source_schema: String,
    pub source_table: String,
    pub target_schema: String,
}

impl JobArguments {
    pub fn new(
        source_schema: impl Into<String>,
        source_table: impl Into<String>,
        target_schema: impl Into<String>,
    ) -> Self {
        Self {
            source_schema: source_schema.into(),
            source_table: source_table.into(),
            target_schema: target_schema.into(),
        }
    }

    /// `-src <schema> -t <table> -tgt <target schema>`
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            "-src".to_string(),
            self.source_schema.clone(),
            "-t".to_string(),
            self.source_table.clone(),
            "-tgt".to_string(),
            self.target_schema.clone(),
        ]
    }
}

/// What to do once a job run reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDecision {
    /// Full-load job succeeded: send the success signal.
    SignalSuccess,
    /// CDC job succeeded: success was already signaled at the monitor stage.
    EndWithoutSignal,
    /// The job failed or was cancelled.
    SignalFailure,
}

/// Job branch policy. `None` while the run is not terminal.
pub fn evaluate_job_state(task_type: TaskType, state: JobState) -> Option<JobDecision> {
    match state {
        JobState::Success => Some(match task_type {
            TaskType::FullLoad => JobDecision::SignalSuccess,
            TaskType::Cdc => JobDecision::EndWithoutSignal,
        }),
        JobState::Failed | JobState::Cancelled => Some(JobDecision::SignalFailure),
        _ => None,
    }
}
