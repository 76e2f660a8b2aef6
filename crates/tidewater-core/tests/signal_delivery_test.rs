// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terminal signal delivery when the gateway rejects or stalls a send.

mod common;

use std::time::Duration;

use common::{Harness, cdc_request, full_load_request};
use tidewater_core::signals::SignalOutcome;

#[tokio::test(start_paused = true)]
async fn test_rejected_success_falls_back_to_one_failure_signal() {
    let harness = Harness::new();
    harness.gateway.reject_next_success();

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;

    assert_eq!(result.unwrap_err().error_code(), "SIGNAL_DELIVERY_FAILED");
    assert_eq!(harness.gateway.successes(), 1);
    assert_eq!(harness.gateway.failures(), 1);
    assert_eq!(harness.gateway.inner.pending_count().await, 0);
    match pending.wait().await.unwrap() {
        SignalOutcome::Failure { error, .. } => assert_eq!(error, "SIGNAL_DELIVERY_FAILED"),
        other => panic!("expected failure signal, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_cdc_success_skips_follow_on_job() {
    let harness = Harness::new();
    harness.gateway.reject_next_success();

    let (result, pending) = harness.run(cdc_request("orders-cdc")).await;

    assert_eq!(result.unwrap_err().error_code(), "SIGNAL_DELIVERY_FAILED");
    assert!(harness.compute.submitted().await.is_empty());
    assert_eq!(harness.gateway.failures(), 1);
    assert!(!pending.wait().await.unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_success_send_interrupted_by_timeout_signals_failure() {
    let mut harness = Harness::new();
    harness.config.workflow_timeout = Duration::from_secs(1000);
    harness.gateway.stall_successes();

    let (result, pending) = harness.run(full_load_request("orders-fl")).await;

    assert_eq!(result.unwrap_err().error_code(), "WORKFLOW_TIMEOUT");
    assert_eq!(harness.gateway.successes(), 1);
    assert_eq!(harness.gateway.failures(), 1);
    match pending.wait().await.unwrap() {
        SignalOutcome::Failure { error, .. } => assert_eq!(error, "WORKFLOW_TIMEOUT"),
        other => panic!("expected failure signal, got {:?}", other),
    }
}
