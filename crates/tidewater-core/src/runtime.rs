// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable many-table runtime.
//!
//! [`MigrationRuntime`] owns the in-process correlation table and the
//! orchestrator. Each submitted table runs as its own tokio task; the caller
//! gets back the task handle and a [`PendingSignal`] to suspend on.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidewater_core::config::Config;
//! use tidewater_core::persistence::SqliteStatusStore;
//! use tidewater_core::runtime::MigrationRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStatusStore::connect(&config.status_database_url).await?);
//!
//!     let runtime = MigrationRuntime::builder()
//!         .config(config)
//!         .replication(replication_service)
//!         .compute(compute_service)
//!         .store(store)
//!         .build()?;
//!
//!     let results = runtime.run_all(requests).await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::compute::ComputeJobService;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::orchestrator::{Orchestrator, Services, WorkflowOutcome};
use crate::persistence::StatusStore;
use crate::replication::ReplicationService;
use crate::signals::{CorrelationTable, PendingSignal, SignalOutcome};
use crate::splits::{NoSplits, SplitPlanner};
use crate::types::MigrationRequest;

/// Builder for creating a [`MigrationRuntime`].
#[derive(Default)]
pub struct MigrationRuntimeBuilder {
    config: Option<Config>,
    replication: Option<Arc<dyn ReplicationService>>,
    compute: Option<Arc<dyn ComputeJobService>>,
    store: Option<Arc<dyn StatusStore>>,
    planner: Option<Arc<dyn SplitPlanner>>,
}

impl std::fmt::Debug for MigrationRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRuntimeBuilder")
            .field("config", &self.config)
            .field("replication", &self.replication.as_ref().map(|_| "..."))
            .field("compute", &self.compute.as_ref().map(|_| "..."))
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("planner", &self.planner.as_ref().map(|_| "..."))
            .finish()
    }
}

impl MigrationRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the replication service (required).
    pub fn replication(mut self, replication: Arc<dyn ReplicationService>) -> Self {
        self.replication = Some(replication);
        self
    }

    /// Set the compute job service (required).
    pub fn compute(mut self, compute: Arc<dyn ComputeJobService>) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Set the status store (required).
    pub fn store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the split planner.
    ///
    /// Default: [`NoSplits`], every table loads unpartitioned.
    pub fn planner(mut self, planner: Arc<dyn SplitPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Build the runtime.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<MigrationRuntime> {
        let config = self.config.ok_or_else(|| anyhow::anyhow!("config is required"))?;
        let replication = self
            .replication
            .ok_or_else(|| anyhow::anyhow!("replication service is required"))?;
        let compute = self
            .compute
            .ok_or_else(|| anyhow::anyhow!("compute service is required"))?;
        let store = self.store.ok_or_else(|| anyhow::anyhow!("status store is required"))?;
        let planner = self.planner.unwrap_or_else(|| Arc::new(NoSplits));

        let correlation = CorrelationTable::new();
        let orchestrator = Orchestrator::new(
            &config,
            Services {
                replication,
                compute,
                store,
                gateway: Arc::new(correlation.clone()),
                planner,
            },
        );

        info!(
            source_engine = config.source.engine(),
            workflow_timeout_secs = config.workflow_timeout.as_secs(),
            "MigrationRuntime built"
        );

        Ok(MigrationRuntime {
            orchestrator,
            correlation,
        })
    }
}

/// One submitted table: the workflow task and the caller's side of its token.
#[derive(Debug)]
pub struct TableExecution {
    /// Spawned workflow.
    pub handle: JoinHandle<crate::error::Result<WorkflowOutcome>>,
    /// Resolves when the workflow signals the table's terminal outcome.
    pub signal: PendingSignal,
}

/// Result of one table of a [`MigrationRuntime::run_all`] batch.
#[derive(Debug)]
pub struct TableResult {
    pub task_id: String,
    pub table_name: String,
    /// What the workflow returned.
    pub outcome: crate::error::Result<WorkflowOutcome>,
    /// What the caller heard on the callback token. `None` when the workflow
    /// ended without a signal.
    pub signal: Option<SignalOutcome>,
}

/// Runs table workflows as independent parallel executions.
pub struct MigrationRuntime {
    orchestrator: Orchestrator,
    correlation: CorrelationTable,
}

impl std::fmt::Debug for MigrationRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRuntime")
            .field("orchestrator", &"...")
            .field("correlation", &self.correlation)
            .finish()
    }
}

impl MigrationRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> MigrationRuntimeBuilder {
        MigrationRuntimeBuilder::new()
    }

    /// The correlation table the orchestrator signals through.
    pub fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    /// Number of tables whose callback token is still outstanding.
    pub async fn pending_count(&self) -> usize {
        self.correlation.pending_count().await
    }

    /// Register a token for `request` and spawn its workflow.
    pub async fn submit(&self, request: MigrationRequest) -> TableExecution {
        let signal = self.correlation.register().await;
        let token = signal.token().clone();
        let orchestrator = self.orchestrator.clone();

        info!(
            task_id = %request.replication_task_id,
            table = %request.table_name,
            task_type = %request.task_type,
            "Submitting table workflow"
        );
        let handle = tokio::spawn(async move { orchestrator.run(request, token).await });

        TableExecution { handle, signal }
    }

    /// Run a batch of tables in parallel and wait for all of them.
    ///
    /// Results come back in request order. A workflow that ends without a
    /// signal has its token discarded so nothing is left outstanding.
    pub async fn run_all(&self, requests: Vec<MigrationRequest>) -> Vec<TableResult> {
        let mut submitted = Vec::with_capacity(requests.len());
        for request in requests {
            let task_id = request.replication_task_id.clone();
            let table_name = request.table_name.clone();
            submitted.push((task_id, table_name, self.submit(request).await));
        }

        let waits = submitted.into_iter().map(|(task_id, table_name, execution)| {
            let correlation = self.correlation.clone();
            async move {
                let outcome = match execution.handle.await {
                    Ok(result) => result,
                    Err(e) => Err(OrchestratorError::Aborted(e.to_string())),
                };

                let token = execution.signal.token().clone();
                if correlation.discard(&token).await {
                    warn!(task_id = %task_id, table = %table_name, "Workflow ended without a terminal signal");
                }
                let signal = execution.signal.wait().await.ok();

                TableResult {
                    task_id,
                    table_name,
                    outcome,
                    signal,
                }
            }
        });

        join_all(waits).await
    }
}
