// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! CDC workflow tests.

mod common;

use serde_json::json;

use common::{Harness, cdc_request};
use tidewater_core::compute::MockComputeJobService;
use tidewater_core::config::CdcComputePolicy;
use tidewater_core::orchestrator::WorkflowState;
use tidewater_core::persistence::StatusStore;
use tidewater_core::signals::SignalOutcome;
use tidewater_core::types::{JobState, TaskStatus, TaskType};

#[tokio::test(start_paused = true)]
async fn test_running_cdc_task_signals_success_and_is_kept() {
    let harness = Harness::new();

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    assert!(outcome.visited(WorkflowState::CdcRunningBranch));
    assert!(!outcome.visited(WorkflowState::TaskCompletedBranch));
    assert_eq!(
        pending.wait().await.unwrap(),
        SignalOutcome::Success {
            output: json!({"status": "CDC Task Running", "task_id": "orders-cdc", "table": "ORDERS"})
        }
    );

    // cdc tasks are never deleted
    assert_eq!(harness.replication.call_count("delete_replication_task").await, 0);
    assert!(harness.replication.task_exists("orders-cdc").await);

    let created = harness.replication.created_requests().await;
    assert_eq!(created[0].task_type, TaskType::Cdc);

    let record = harness.store.get_item("orders-cdc", "ORDERS").await.unwrap().unwrap();
    assert_eq!(record.task_type, TaskType::Cdc);
    assert_eq!(record.task_status, TaskStatus::Running);
    assert!(record.last_full_load_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_follow_on_job_does_not_signal_twice() {
    let harness = Harness::new();

    let (result, _pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    let submitted = harness.compute.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].name, "cdc-step");
    assert_eq!(
        submitted[0].entry_point,
        "s3://test-dms-replication-blog/scripts/cdc_processing.py"
    );

    assert_eq!(outcome.job_state, Some(JobState::Success));
    assert!(!outcome.visited(WorkflowState::SignalSuccess));
    assert_eq!(outcome.trace.last(), Some(&WorkflowState::Terminal));
    assert_eq!(harness.gateway.total(), 1);
    assert!(outcome.succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_follow_on_job_failure_after_success_is_only_recorded() {
    let harness = Harness::with_compute(MockComputeJobService::failing());

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.job_state, Some(JobState::Failed));
    assert!(!outcome.visited(WorkflowState::SignalFailure));
    assert_eq!(harness.gateway.successes(), 1);
    assert_eq!(harness.gateway.failures(), 0);
    assert!(pending.wait().await.unwrap().is_success());

    let record = harness.store.get_item("orders-cdc", "ORDERS").await.unwrap().unwrap();
    assert_eq!(record.last_job_state, Some(JobState::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_dispatches_nothing() {
    let mut harness = Harness::new();
    harness.config.cdc_compute_policy = CdcComputePolicy::Skip;

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    assert!(harness.compute.submitted().await.is_empty());
    assert!(!outcome.visited(WorkflowState::DispatchingComputeJob));
    assert!(outcome.job_run.is_none());
    assert!(pending.wait().await.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_stopped_cdc_task_is_a_failure() {
    let harness = Harness::new();
    harness
        .replication
        .script_task("orders-cdc", vec![TaskStatus::Starting, TaskStatus::Stopped])
        .await;

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    assert!(outcome.visited(WorkflowState::TaskFailedBranch));
    assert!(harness.compute.submitted().await.is_empty());
    match pending.wait().await.unwrap() {
        SignalOutcome::Failure { error, cause } => {
            assert_eq!(error, "REPLICATION_TASK_STOPPED");
            assert_eq!(cause, "CDC replication task stopped");
        }
        other => panic!("expected failure signal, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_running_status_alone_does_not_pick_the_cdc_branch() {
    let harness = Harness::new();
    let request = common::full_load_request("orders-fl");
    harness
        .replication
        .script_task("orders-fl", vec![TaskStatus::Running, TaskStatus::Running, TaskStatus::Stopped])
        .await;

    let (result, _pending) = harness.run(request).await;
    let outcome = result.unwrap();

    assert!(!outcome.visited(WorkflowState::CdcRunningBranch));
    assert!(outcome.visited(WorkflowState::TaskCompletedBranch));
}
