// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock compute job service for testing.
//!
//! Each submitted run replays a state script, one state per `get_job_run`
//! call, and stays in the last state once the script is exhausted.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{ServiceError, ServiceErrorKind};
use crate::types::JobState;

use super::{ComputeJobService, StartJobRunRequest};

#[derive(Debug, Default)]
struct State {
    queued_scripts: VecDeque<Vec<JobState>>,
    runs: HashMap<String, VecDeque<JobState>>,
    submitted: Vec<StartJobRunRequest>,
    submission_failures: VecDeque<ServiceError>,
    poll_failures: VecDeque<ServiceError>,
    polls: usize,
}

/// In-memory compute job service.
#[derive(Debug)]
pub struct MockComputeJobService {
    state: Mutex<State>,
    default_script: Vec<JobState>,
}

impl Default for MockComputeJobService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockComputeJobService {
    /// Runs go `RUNNING` then `SUCCESS`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            default_script: vec![JobState::Running, JobState::Success],
        }
    }

    /// Runs go `RUNNING` then `FAILED`.
    pub fn failing() -> Self {
        Self {
            default_script: vec![JobState::Running, JobState::Failed],
            ..Self::new()
        }
    }

    /// Runs stay `RUNNING` forever.
    pub fn never_completing() -> Self {
        Self {
            default_script: vec![JobState::Running],
            ..Self::new()
        }
    }

    /// Script for the next submitted run that has no script yet.
    pub async fn queue_script(&self, states: Vec<JobState>) {
        self.state.lock().await.queued_scripts.push_back(states);
    }

    /// Make the next submission fail.
    pub async fn fail_next_submission(&self, error: ServiceError) {
        self.state.lock().await.submission_failures.push_back(error);
    }

    /// Make the next `get_job_run` call fail.
    pub async fn fail_next_poll(&self, error: ServiceError) {
        self.state.lock().await.poll_failures.push_back(error);
    }

    /// Every accepted submission, in order.
    pub async fn submitted(&self) -> Vec<StartJobRunRequest> {
        self.state.lock().await.submitted.clone()
    }

    /// Number of `get_job_run` calls.
    pub async fn poll_count(&self) -> usize {
        self.state.lock().await.polls
    }
}

#[async_trait]
impl ComputeJobService for MockComputeJobService {
    async fn start_job_run(&self, request: &StartJobRunRequest) -> Result<String, ServiceError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.submission_failures.pop_front() {
            return Err(err);
        }

        state.submitted.push(request.clone());
        let job_run_id = format!("jr-{:06}", state.submitted.len());
        let script = state
            .queued_scripts
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        state.runs.insert(job_run_id.clone(), script.into());
        Ok(job_run_id)
    }

    async fn get_job_run(&self, _application_id: &str, job_run_id: &str) -> Result<JobState, ServiceError> {
        let mut state = self.state.lock().await;
        state.polls += 1;
        if let Some(err) = state.poll_failures.pop_front() {
            return Err(err);
        }

        let script = state.runs.get_mut(job_run_id).ok_or_else(|| {
            ServiceError::new(ServiceErrorKind::NotFound, "get_job_run", format!("no run {}", job_run_id))
        })?;
        let current = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(current.unwrap_or(JobState::Submitted))
    }
}
