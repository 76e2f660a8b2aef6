// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tidewater Core - Table Replication Orchestrator
//!
//! Drives a relational table from an operational database into a data lake in
//! two phases: a one-time full load, then continuous change-data-capture. For
//! each table it creates and monitors a managed replication task, dispatches a
//! compute job over the landed files, records progress in a status store and
//! reports the terminal outcome exactly once on the caller's callback token.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                MigrationRuntime (many tables)                │
//! │        submit / run_all ── CorrelationTable (tokens)         │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ one tokio task per table
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │                   (per-table state machine)                  │
//! └──────────────────────────────────────────────────────────────┘
//!     │              │                 │                │
//!     ▼              ▼                 ▼                ▼
//! ┌──────────┐ ┌────────────┐ ┌────────────────┐ ┌─────────────┐
//! │ Split    │ │ Replication│ │ Compute Job    │ │ Status      │
//! │ Planner  │ │ Controller │ │ Dispatcher     │ │ Store       │
//! │          │ │ + Monitor  │ │                │ │ (SQLite)    │
//! └──────────┘ └────────────┘ └────────────────┘ └─────────────┘
//!                    │                 │
//!                    ▼                 ▼
//!           ReplicationService  ComputeJobService
//! ```
//!
//! # Workflow State Machine
//!
//! ```text
//!   PlanningSplits ──► CreatingTask ──► AwaitingTaskCompletion ◄──┐
//!                                              │                  │
//!                                              ▼                  │
//!             StartingTask ◄── ready ── EvaluatingTaskStatus ── other
//!                  │                     │      │        │
//!                  └──► Awaiting...   stopped  running   failed
//!                                   (full-load) (cdc)      │
//!                                        │      │          ▼
//!                     TaskCompletedBranch  CdcRunningBranch  TaskFailedBranch
//!                                        │      │ (signal)   │
//!                                        ▼      ▼            │
//!                          DispatchingComputeJob             │
//!                                   │                        │
//!                                   ▼                        │
//!                     AwaitingJobCompletion ◄── non-terminal │
//!                                   │                │       │
//!                                   ▼                │       │
//!                        EvaluatingJobStatus ────────┘       │
//!                           │            │                   │
//!                        success      failed/cancelled       │
//!                           ▼            ▼                   ▼
//!                     SignalSuccess   SignalFailure ◄────────┘
//!                           │            │
//!                           └──► Terminal ◄┘
//! ```
//!
//! A re-run for a table whose replication task still exists enters at
//! `EvaluatingTaskStatus`. A full-load table whose task was already deleted
//! but whose compute job never succeeded enters at `DispatchingComputeJob`.
//!
//! # Status Cadence
//!
//! | Poll | Default interval |
//! |------|------------------|
//! | Replication task status | 100 s |
//! | Compute job state | 100 s |
//! | Whole workflow budget | 180 min |
//!
//! # Configuration
//!
//! [`config::Config::from_env`] reads `TIDEWATER_*` variables:
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `TIDEWATER_STATUS_DATABASE_URL` | Yes | - |
//! | `TIDEWATER_COMPUTE_APPLICATION_ID` | Yes | - |
//! | `TIDEWATER_COMPUTE_ROLE_ARN` | Yes | - |
//! | `TIDEWATER_SOURCE_ENGINE` | No | `postgres` |
//! | `TIDEWATER_TASK_POLL_SECS` | No | `100` |
//! | `TIDEWATER_JOB_POLL_SECS` | No | `100` |
//! | `TIDEWATER_WORKFLOW_TIMEOUT_SECS` | No | `10800` |
//! | `TIDEWATER_TIMEOUT_POLICY` | No | `signal-failure` |
//! | `TIDEWATER_CDC_COMPUTE_POLICY` | No | `follow-on` |

/// Compute job service abstraction, dispatcher and job branch policy.
pub mod compute;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types with stable error codes.
pub mod error;

/// Replication task table-mapping document.
pub mod mapping;

/// Embedded SQLite migrations.
pub mod migrations;

/// Replication task status polling and transition policy.
pub mod monitor;

/// Per-table workflow state machine.
pub mod orchestrator;

/// Per-table status store.
pub mod persistence;

/// Replication service abstraction and task controller.
pub mod replication;

/// Many-table runtime.
pub mod runtime;

/// Callback token signaling.
pub mod signals;

/// Split plans for partitioned full loads.
pub mod splits;

/// Core domain types.
pub mod types;

pub use config::Config;
pub use error::{OrchestratorError, Result, ServiceError, ServiceErrorKind};
pub use orchestrator::{Orchestrator, Services, WorkflowOutcome, WorkflowState};
pub use runtime::{MigrationRuntime, MigrationRuntimeBuilder, TableExecution, TableResult};
pub use signals::{CorrelationTable, PendingSignal, SignalGateway, SignalOutcome};
pub use types::{CallbackToken, MigrationRequest, TaskStatus, TaskType};
