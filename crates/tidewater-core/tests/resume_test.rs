// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Re-running a table whose task or status record already exists.

mod common;

use common::{Harness, cdc_request, full_load_request};
use tidewater_core::orchestrator::WorkflowState;
use tidewater_core::persistence::{StatusStore, TableStatusRecord};
use tidewater_core::signals::SignalOutcome;
use tidewater_core::types::{JobState, TaskStatus, TaskType};

#[tokio::test(start_paused = true)]
async fn test_running_full_load_task_is_resumed_without_create_or_start() {
    let harness = Harness::new();
    harness
        .replication
        .seed_task(
            "orders-fl",
            TaskType::FullLoad,
            "SALES",
            "ORDERS",
            vec![TaskStatus::Running, TaskStatus::Running, TaskStatus::Stopped],
        )
        .await;

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;
    let outcome = result.unwrap();

    assert!(outcome.resumed);
    assert_eq!(outcome.trace[0], WorkflowState::EvaluatingTaskStatus);
    assert!(!outcome.visited(WorkflowState::PlanningSplits));
    assert!(!outcome.visited(WorkflowState::CreatingTask));
    assert!(!outcome.visited(WorkflowState::StartingTask));
    assert_eq!(harness.replication.call_count("create_replication_task").await, 0);
    assert!(harness.replication.starts().await.is_empty());

    assert_eq!(harness.compute.submitted().await.len(), 1);
    assert!(pending.wait().await.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_ready_task_left_behind_is_started() {
    let harness = Harness::new();
    harness
        .replication
        .seed_task("orders-fl", TaskType::FullLoad, "SALES", "ORDERS", vec![TaskStatus::Ready])
        .await;

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;
    let outcome = result.unwrap();

    assert!(outcome.resumed);
    assert_eq!(
        &outcome.trace[..3],
        &[
            WorkflowState::EvaluatingTaskStatus,
            WorkflowState::StartingTask,
            WorkflowState::AwaitingTaskCompletion,
        ]
    );
    assert_eq!(harness.replication.starts().await.len(), 1);
    assert!(pending.wait().await.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_running_cdc_task_resumed_signals_immediately() {
    let harness = Harness::new();
    harness
        .replication
        .seed_task("orders-cdc", TaskType::Cdc, "SALES", "ORDERS", vec![TaskStatus::Running])
        .await;

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;
    let outcome = result.unwrap();

    assert_eq!(
        &outcome.trace[..2],
        &[WorkflowState::EvaluatingTaskStatus, WorkflowState::CdcRunningBranch]
    );
    assert!(pending.wait().await.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_task_type_mismatch_is_a_conflict() {
    let harness = Harness::new();
    harness
        .replication
        .seed_task("orders", TaskType::Cdc, "SALES", "ORDERS", vec![TaskStatus::Running])
        .await;

    let (result, pending) = harness.run(full_load_request("orders")).await;
    let err = result.unwrap_err();

    assert_eq!(err.error_code(), "CONFLICT");
    match pending.wait().await.unwrap() {
        SignalOutcome::Failure { error, .. } => assert_eq!(error, "CONFLICT"),
        other => panic!("expected failure signal, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_deleted_full_load_task_resumes_at_compute_job() {
    let harness = Harness::new();
    let mut record = TableStatusRecord::new("orders-fl", "ORDERS", TaskType::FullLoad, TaskStatus::Stopped);
    record.last_job_state = Some(JobState::Failed);
    harness.store.put_item(&record).await.unwrap();

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;
    let outcome = result.unwrap();

    assert!(outcome.resumed);
    assert_eq!(outcome.trace[0], WorkflowState::DispatchingComputeJob);
    assert_eq!(harness.replication.call_count("create_replication_task").await, 0);
    assert_eq!(harness.compute.submitted().await.len(), 1);
    assert!(pending.wait().await.unwrap().is_success());

    let record = harness.store.get_item("orders-fl", "ORDERS").await.unwrap().unwrap();
    assert_eq!(record.last_job_state, Some(JobState::Success));
    assert_eq!(record.task_status, TaskStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_completed_table_starts_a_new_cycle() {
    let harness = Harness::new();
    let mut record = TableStatusRecord::new("orders-fl", "ORDERS", TaskType::FullLoad, TaskStatus::Stopped);
    record.last_job_state = Some(JobState::Success);
    harness.store.put_item(&record).await.unwrap();

    let (result, _pending) = harness.run(full_load_request("orders-fl")).await;
    let outcome = result.unwrap();

    assert!(!outcome.resumed);
    assert_eq!(outcome.trace[0], WorkflowState::PlanningSplits);
    assert_eq!(harness.replication.created_requests().await.len(), 1);
}
