// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tidewater-core workflow tests.
//!
//! Provides a [`Harness`] wiring the orchestrator to mock services, an
//! in-memory status store and a signal gateway that counts deliveries.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use tidewater_core::compute::MockComputeJobService;
use tidewater_core::config::Config;
use tidewater_core::error::{OrchestratorError, Result};
use tidewater_core::orchestrator::{Orchestrator, Services, WorkflowOutcome};
use tidewater_core::persistence::MemoryStatusStore;
use tidewater_core::replication::MockReplicationService;
use tidewater_core::signals::{CorrelationTable, PendingSignal, SignalGateway};
use tidewater_core::splits::{NoSplits, SplitPlanner};
use tidewater_core::types::{CallbackToken, MigrationRequest, TaskType};

pub const APPLICATION_ID: &str = "00fabc123example";
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/emr-serverless-job";

/// Gateway that forwards to a [`CorrelationTable`] and counts every call,
/// rejected ones included.
///
/// Success sends can be made to fail once or to never complete.
#[derive(Debug, Default)]
pub struct CountingGateway {
    pub inner: CorrelationTable,
    successes: AtomicUsize,
    failures: AtomicUsize,
    reject_next_success: AtomicBool,
    stall_successes: AtomicBool,
}

impl CountingGateway {
    /// Fail the next success send without touching the token.
    pub fn reject_next_success(&self) {
        self.reject_next_success.store(true, Ordering::SeqCst);
    }

    /// Leave every success send pending forever.
    pub fn stall_successes(&self) {
        self.stall_successes.store(true, Ordering::SeqCst);
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.successes() + self.failures()
    }
}

#[async_trait]
impl SignalGateway for CountingGateway {
    async fn send_task_success(&self, token: &CallbackToken, output: Value) -> Result<()> {
        self.successes.fetch_add(1, Ordering::SeqCst);
        if self.reject_next_success.swap(false, Ordering::SeqCst) {
            return Err(OrchestratorError::SignalDelivery {
                token: token.to_string(),
                reason: "gateway unavailable".to_string(),
            });
        }
        if self.stall_successes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.send_task_success(token, output).await
    }

    async fn send_task_failure(&self, token: &CallbackToken, error: &str, cause: &str) -> Result<()> {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.inner.send_task_failure(token, error, cause).await
    }
}

/// Orchestrator wired to mocks. Adjust `config` before calling
/// [`run`](Self::run); the orchestrator is built per run.
pub struct Harness {
    pub config: Config,
    pub replication: Arc<MockReplicationService>,
    pub compute: Arc<MockComputeJobService>,
    pub store: Arc<MemoryStatusStore>,
    pub gateway: Arc<CountingGateway>,
    pub planner: Arc<dyn SplitPlanner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_compute(MockComputeJobService::new())
    }

    pub fn with_compute(compute: MockComputeJobService) -> Self {
        Self {
            config: test_config(),
            replication: Arc::new(MockReplicationService::standard()),
            compute: Arc::new(compute),
            store: Arc::new(MemoryStatusStore::new()),
            gateway: Arc::new(CountingGateway::default()),
            planner: Arc::new(NoSplits),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            replication: self.replication.clone(),
            compute: self.compute.clone(),
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            planner: self.planner.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(&self.config, self.services())
    }

    /// Register a token and drive one workflow to completion.
    pub async fn run(&self, request: MigrationRequest) -> (Result<WorkflowOutcome>, PendingSignal) {
        let pending = self.gateway.inner.register().await;
        let result = self.orchestrator().run(request, pending.token().clone()).await;
        (result, pending)
    }
}

pub fn test_config() -> Config {
    Config::with_defaults("sqlite::memory:", APPLICATION_ID, ROLE_ARN)
}

pub fn full_load_request(task_id: &str) -> MigrationRequest {
    MigrationRequest::new(task_id, TaskType::FullLoad, "SALES", "ORDERS", "lake")
}

pub fn cdc_request(task_id: &str) -> MigrationRequest {
    MigrationRequest::new(task_id, TaskType::Cdc, "SALES", "ORDERS", "lake")
}
