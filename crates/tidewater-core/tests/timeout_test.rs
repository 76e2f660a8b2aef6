// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow time budget tests.

mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{Harness, full_load_request};
use tidewater_core::compute::MockComputeJobService;
use tidewater_core::config::TimeoutPolicy;
use tidewater_core::error::OrchestratorError;
use tidewater_core::persistence::StatusStore;
use tidewater_core::signals::SignalOutcome;
use tidewater_core::types::{JobState, TaskStatus};

#[tokio::test(start_paused = true)]
async fn test_budget_exhausted_signals_timeout_failure() {
    let mut harness = Harness::with_compute(MockComputeJobService::never_completing());
    harness.config.workflow_timeout = Duration::from_secs(1000);
    let started = Instant::now();

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;
    let err = result.unwrap_err();

    assert!(matches!(err, OrchestratorError::Timeout { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(1000));
    assert_eq!(harness.gateway.failures(), 1);
    match pending.wait().await.unwrap() {
        SignalOutcome::Failure { error, .. } => assert_eq!(error, "WORKFLOW_TIMEOUT"),
        other => panic!("expected failure signal, got {:?}", other),
    }

    // the dispatch is recorded even though the run never finished
    let record = harness.store.get_item("orders-fl", "ORDERS").await.unwrap().unwrap();
    assert_eq!(record.last_job_run_id.as_deref(), Some("jr-000001"));
    assert_eq!(record.last_job_state, Some(JobState::Submitted));
}

#[tokio::test(start_paused = true)]
async fn test_silent_policy_leaves_caller_without_signal() {
    let mut harness = Harness::new();
    harness.config.workflow_timeout = Duration::from_secs(250);
    harness.config.timeout_policy = TimeoutPolicy::Silent;
    harness
        .replication
        .script_task("orders-fl", vec![TaskStatus::Running])
        .await;

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;
    assert_eq!(result.unwrap_err().error_code(), "WORKFLOW_TIMEOUT");

    assert_eq!(harness.gateway.total(), 0);
    assert_eq!(harness.gateway.inner.pending_count().await, 1);

    let err = pending.wait_timeout(Duration::from_secs(60)).await.unwrap_err();
    assert_eq!(err.error_code(), "WORKFLOW_TIMEOUT");
}

#[tokio::test(start_paused = true)]
async fn test_workflow_within_budget_is_unaffected() {
    let mut harness = Harness::new();
    harness.config.workflow_timeout = Duration::from_secs(501);

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;

    assert!(result.unwrap().succeeded());
    assert!(pending.wait().await.unwrap().is_success());
}
