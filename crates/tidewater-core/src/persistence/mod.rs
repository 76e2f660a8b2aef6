// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status store interface and backends.
//!
//! The status store holds one [`TableStatusRecord`] per (task identifier,
//! table name) plus the append-only CDC cursor of consumed incremental files.
//! Writers never hold a lock across a suspension point; contention is scoped
//! to a single record and resolved last-writer-wins per field.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStatusStore;
pub use self::sqlite::SqliteStatusStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{JobState, TableStatistics, TaskStatistics, TaskStatus, TaskType};

/// Durable state of one table's migration progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatusRecord {
    /// Task identifier (first key part).
    pub task_id: String,
    /// Table name (second key part).
    pub table_name: String,
    /// Source schema.
    pub schema_name: Option<String>,
    /// Task type of the latest observation.
    pub task_type: TaskType,
    /// Latest observed task status.
    pub task_status: TaskStatus,
    /// Source endpoint the task replicates from.
    pub source_endpoint_arn: Option<String>,
    /// Target endpoint the task replicates to.
    pub target_endpoint_arn: Option<String>,
    /// Replication instance running the task.
    pub replication_instance_arn: Option<String>,
    /// When the task was started.
    pub task_started_at: Option<DateTime<Utc>>,
    /// Task-level statistics snapshot.
    pub replication_stats: Option<TaskStatistics>,
    /// Per-table statistics snapshot.
    pub table_stats: Option<Vec<TableStatistics>>,
    /// Last successful full-load completion.
    pub last_full_load_at: Option<DateTime<Utc>>,
    /// Where the replicated files land.
    pub landing_path: Option<String>,
    /// Last compute job run.
    pub last_job_run_id: Option<String>,
    /// State of the last compute job run.
    pub last_job_state: Option<JobState>,
    /// Incremental files already consumed, in consumption order.
    pub consumed_cdc_files: Vec<String>,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl TableStatusRecord {
    /// Fresh record with only the key, type and status set.
    pub fn new(
        task_id: impl Into<String>,
        table_name: impl Into<String>,
        task_type: TaskType,
        task_status: TaskStatus,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            table_name: table_name.into(),
            schema_name: None,
            task_type,
            task_status,
            source_endpoint_arn: None,
            target_endpoint_arn: None,
            replication_instance_arn: None,
            task_started_at: None,
            replication_stats: None,
            table_stats: None,
            last_full_load_at: None,
            landing_path: None,
            last_job_run_id: None,
            last_job_state: None,
            consumed_cdc_files: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial update of a [`TableStatusRecord`]. `None` fields are left as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStatusUpdate {
    pub schema_name: Option<String>,
    pub task_type: Option<TaskType>,
    pub task_status: Option<TaskStatus>,
    pub source_endpoint_arn: Option<String>,
    pub target_endpoint_arn: Option<String>,
    pub replication_instance_arn: Option<String>,
    pub task_started_at: Option<DateTime<Utc>>,
    pub replication_stats: Option<TaskStatistics>,
    pub table_stats: Option<Vec<TableStatistics>>,
    pub last_full_load_at: Option<DateTime<Utc>>,
    pub landing_path: Option<String>,
    pub last_job_run_id: Option<String>,
    pub last_job_state: Option<JobState>,
}

impl TableStatusUpdate {
    /// Update carrying the status and type of an observation.
    pub fn observed(task_type: TaskType, task_status: TaskStatus) -> Self {
        Self {
            task_type: Some(task_type),
            task_status: Some(task_status),
            ..Default::default()
        }
    }

    /// Overwrite the fields this update carries.
    pub fn apply(self, record: &mut TableStatusRecord) {
        if let Some(v) = self.schema_name {
            record.schema_name = Some(v);
        }
        if let Some(v) = self.task_type {
            record.task_type = v;
        }
        if let Some(v) = self.task_status {
            record.task_status = v;
        }
        if let Some(v) = self.source_endpoint_arn {
            record.source_endpoint_arn = Some(v);
        }
        if let Some(v) = self.target_endpoint_arn {
            record.target_endpoint_arn = Some(v);
        }
        if let Some(v) = self.replication_instance_arn {
            record.replication_instance_arn = Some(v);
        }
        if let Some(v) = self.task_started_at {
            record.task_started_at = Some(v);
        }
        if let Some(v) = self.replication_stats {
            record.replication_stats = Some(v);
        }
        if let Some(v) = self.table_stats {
            record.table_stats = Some(v);
        }
        if let Some(v) = self.last_full_load_at {
            record.last_full_load_at = Some(v);
        }
        if let Some(v) = self.landing_path {
            record.landing_path = Some(v);
        }
        if let Some(v) = self.last_job_run_id {
            record.last_job_run_id = Some(v);
        }
        if let Some(v) = self.last_job_state {
            record.last_job_state = Some(v);
        }
        record.updated_at = Utc::now();
    }

    /// Build a record from an update against a missing key. Requires the
    /// update to carry both task type and status.
    pub fn into_record(self, task_id: &str, table_name: &str) -> Option<TableStatusRecord> {
        let mut record = TableStatusRecord::new(task_id, table_name, self.task_type?, self.task_status?);
        self.apply(&mut record);
        Some(record)
    }
}

/// Durable key-value store of table status records.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Fetch the record for a key, including its CDC cursor.
    async fn get_item(&self, task_id: &str, table_name: &str) -> Result<Option<TableStatusRecord>>;

    /// Write a whole record, replacing any existing one. The CDC cursor is
    /// kept; use [`append_consumed_files`](Self::append_consumed_files) to advance it.
    async fn put_item(&self, record: &TableStatusRecord) -> Result<()>;

    /// Apply a partial update. A missing record is created when the update
    /// carries task type and status, otherwise a store error is returned.
    async fn update_item(&self, task_id: &str, table_name: &str, update: TableStatusUpdate) -> Result<()>;

    /// Append consumed incremental files to a table's cursor. Files already
    /// present are skipped. Returns how many were added.
    async fn append_consumed_files(&self, task_id: &str, table_name: &str, files: &[String]) -> Result<usize>;

    /// List records ordered by key.
    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<TableStatusRecord>>;
}
