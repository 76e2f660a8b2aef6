// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute job dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ComputeConfig;
use crate::error::{OrchestratorError, Result, ServiceErrorKind};
use crate::types::{JobRun, JobState, TaskType};

use super::{ComputeJobService, JobArguments, StartJobRunRequest};

/// Submits compute job runs and polls them to a terminal state.
#[derive(Clone)]
pub struct ComputeJobDispatcher {
    service: Arc<dyn ComputeJobService>,
    config: ComputeConfig,
    interval: Duration,
}

impl ComputeJobDispatcher {
    pub fn new(service: Arc<dyn ComputeJobService>, config: ComputeConfig, interval: Duration) -> Self {
        Self {
            service,
            config,
            interval,
        }
    }

    /// Submit a run.
    ///
    /// Malformed application or role references and incomplete arguments are
    /// configuration bugs: they fail with [`OrchestratorError::Submission`]
    /// and are never retried. So are parameter and permission rejections
    /// reported by the service.
    pub async fn submit(
        &self,
        application_id: &str,
        execution_role_arn: &str,
        job_name: &str,
        entry_point: &str,
        args: &JobArguments,
    ) -> Result<JobRun> {
        validate_submission(application_id, execution_role_arn, entry_point, args)?;

        let request = StartJobRunRequest {
            application_id: application_id.to_string(),
            execution_role_arn: execution_role_arn.to_string(),
            name: job_name.to_string(),
            entry_point: entry_point.to_string(),
            entry_point_arguments: args.to_vec(),
            spark_submit_parameters: self.config.spark_submit_parameters.clone(),
            client_token: Uuid::new_v4().to_string(),
        };

        let job_run_id = self
            .service
            .start_job_run(&request)
            .await
            .map_err(|e| match e.kind {
                ServiceErrorKind::InvalidParameter | ServiceErrorKind::AccessDenied => {
                    OrchestratorError::Submission { reason: e.to_string() }
                }
                _ => e.into(),
            })?;

        info!(
            job_run_id = %job_run_id,
            job_name = %job_name,
            entry_point = %entry_point,
            table = %args.source_table,
            "Compute job submitted"
        );

        Ok(JobRun {
            job_run_id,
            application_id: request.application_id,
            name: request.name,
            entry_point: request.entry_point,
            arguments: request.entry_point_arguments,
            state: JobState::Submitted,
            submitted_at: Utc::now(),
        })
    }

    /// Submit the job variant for a task type using the configured
    /// application, role and scripts.
    pub async fn submit_for(&self, task_type: TaskType, args: &JobArguments) -> Result<JobRun> {
        self.submit(
            &self.config.application_id,
            &self.config.execution_role_arn,
            self.config.job_name(task_type),
            &self.config.entry_point(task_type),
            args,
        )
        .await
    }

    /// Poll every interval until the run reaches `SUCCESS`, `FAILED` or
    /// `CANCELLED`. Transient errors are retried on the next tick.
    pub async fn poll(&self, run: &JobRun) -> Result<JobState> {
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(self.interval).await;
            polls += 1;

            match self.service.get_job_run(&run.application_id, &run.job_run_id).await {
                Ok(state) if state.is_terminal() => {
                    info!(job_run_id = %run.job_run_id, state = %state, polls, "Compute job finished");
                    return Ok(state);
                }
                Ok(state) => {
                    debug!(job_run_id = %run.job_run_id, state = %state, poll = polls, "Polled compute job");
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        job_run_id = %run.job_run_id,
                        poll = polls,
                        error = %e,
                        "Transient error polling compute job, retrying next interval"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn validate_submission(
    application_id: &str,
    execution_role_arn: &str,
    entry_point: &str,
    args: &JobArguments,
) -> Result<()> {
    let reject = |reason: String| Err(OrchestratorError::Submission { reason });

    if application_id.is_empty() || application_id.chars().any(char::is_whitespace) {
        return reject(format!("malformed application reference '{}'", application_id));
    }
    if !execution_role_arn.starts_with("arn:") || !execution_role_arn.contains(":role/") {
        return reject(format!("malformed execution role reference '{}'", execution_role_arn));
    }
    if !entry_point.starts_with("s3://") {
        return reject(format!("entry point '{}' is not an s3:// location", entry_point));
    }
    for (name, value) in [
        ("source schema", &args.source_schema),
        ("source table", &args.source_table),
        ("target schema", &args.target_schema),
    ] {
        if value.trim().is_empty() {
            return reject(format!("missing {} argument", name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::MockComputeJobService;
    use crate::error::ServiceError;

    const ROLE: &str = "arn:aws:iam::123456789012:role/emr-job";

    fn dispatcher(service: &Arc<MockComputeJobService>) -> ComputeJobDispatcher {
        ComputeJobDispatcher::new(
            service.clone(),
            ComputeConfig::new("app-1", ROLE, "bucket"),
            Duration::from_secs(100),
        )
    }

    #[tokio::test]
    async fn test_submit_for_full_load() {
        let service = Arc::new(MockComputeJobService::new());
        let run = dispatcher(&service)
            .submit_for(TaskType::FullLoad, &JobArguments::new("SALES", "ORDERS", "lake"))
            .await
            .unwrap();

        assert_eq!(run.name, "fl-step");
        assert_eq!(run.entry_point, "s3://bucket/scripts/fl_processing.py");
        assert_eq!(run.arguments, vec!["-src", "SALES", "-t", "ORDERS", "-tgt", "lake"]);

        let submitted = service.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].execution_role_arn, ROLE);
        assert!(Uuid::parse_str(&submitted[0].client_token).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_submission_is_not_sent() {
        let service = Arc::new(MockComputeJobService::new());
        let dispatcher = dispatcher(&service);
        let args = JobArguments::new("SALES", "ORDERS", "lake");

        let bad_role = dispatcher
            .submit("app-1", "emr-job", "fl-step", "s3://b/scripts/fl_processing.py", &args)
            .await
            .unwrap_err();
        assert_eq!(bad_role.error_code(), "SUBMISSION_ERROR");

        let bad_app = dispatcher
            .submit("app 1", ROLE, "fl-step", "s3://b/scripts/fl_processing.py", &args)
            .await
            .unwrap_err();
        assert_eq!(bad_app.error_code(), "SUBMISSION_ERROR");

        let missing_arg = dispatcher
            .submit(
                "app-1",
                ROLE,
                "fl-step",
                "s3://b/scripts/fl_processing.py",
                &JobArguments::new("SALES", "", "lake"),
            )
            .await
            .unwrap_err();
        assert!(missing_arg.is_configuration_error());

        assert!(service.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_service_rejection_maps_to_submission_error() {
        let service = Arc::new(MockComputeJobService::new());
        service
            .fail_next_submission(ServiceError::new(
                ServiceErrorKind::AccessDenied,
                "start_job_run",
                "not authorized",
            ))
            .await;

        let err = dispatcher(&service)
            .submit_for(TaskType::Cdc, &JobArguments::new("SALES", "ORDERS", "lake"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Submission { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_terminal() {
        let service = Arc::new(MockComputeJobService::new());
        service
            .queue_script(vec![JobState::Pending, JobState::Running, JobState::Failed])
            .await;
        service.fail_next_poll(ServiceError::throttled("get_job_run")).await;
        let dispatcher = dispatcher(&service);

        let run = dispatcher
            .submit_for(TaskType::FullLoad, &JobArguments::new("SALES", "ORDERS", "lake"))
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        let state = dispatcher.poll(&run).await.unwrap();

        assert_eq!(state, JobState::Failed);
        // one throttled tick plus three scripted states
        assert_eq!(started.elapsed(), Duration::from_secs(400));
    }
}
