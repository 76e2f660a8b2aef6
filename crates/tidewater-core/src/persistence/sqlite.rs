// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed status store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};

use crate::error::{OrchestratorError, Result};
use crate::migrations;

use super::{StatusStore, TableStatusRecord, TableStatusUpdate};

/// SQLite-backed status store.
#[derive(Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    /// Create a store from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a store from a file path.
    ///
    /// Creates parent directories and the database file if missing, then runs
    /// all migrations.
    ///
    /// ```ignore
    /// let store = SqliteStatusStore::from_path(".data/status.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                OrchestratorError::store(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    /// Connect to a SQLite URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        // every pooled connection to :memory: would open its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| {
                OrchestratorError::store("connect", format!("Failed to connect to {}: {}", url, e))
            })?;

        migrations::run_sqlite(&pool).await.map_err(|e| {
            OrchestratorError::store("migrate", format!("Failed to run migrations: {}", e))
        })?;

        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn consumed_files(&self, task_id: &str, table_name: &str) -> Result<Vec<String>> {
        let files = sqlx::query_scalar::<_, String>(
            r#"
            SELECT file_name FROM cdc_cursor
            WHERE task_id = ? AND table_name = ?
            ORDER BY rowid
            "#,
        )
        .bind(task_id)
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    task_id: String,
    table_name: String,
    schema_name: Option<String>,
    task_type: Option<String>,
    task_status: Option<String>,
    source_endpoint_arn: Option<String>,
    target_endpoint_arn: Option<String>,
    replication_instance_arn: Option<String>,
    task_started_at: Option<DateTime<Utc>>,
    replication_stats: Option<String>,
    table_stats: Option<String>,
    last_full_load_at: Option<DateTime<Utc>>,
    landing_path: Option<String>,
    last_job_run_id: Option<String>,
    last_job_state: Option<String>,
    updated_at: DateTime<Utc>,
}

impl StatusRow {
    fn into_record(self, consumed_cdc_files: Vec<String>) -> Result<TableStatusRecord> {
        let incomplete = || {
            OrchestratorError::store(
                "decode",
                format!("record ({}, {}) has no task type or status", self.task_id, self.table_name),
            )
        };
        let task_type = self.task_type.as_deref().ok_or_else(incomplete)?.parse()?;
        let task_status = self.task_status.as_deref().ok_or_else(incomplete)?.parse()?;

        Ok(TableStatusRecord {
            task_type,
            task_status,
            replication_stats: self
                .replication_stats
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            table_stats: self.table_stats.as_deref().map(serde_json::from_str).transpose()?,
            last_job_state: self.last_job_state.as_deref().map(str::parse).transpose()?,
            task_id: self.task_id,
            table_name: self.table_name,
            schema_name: self.schema_name,
            source_endpoint_arn: self.source_endpoint_arn,
            target_endpoint_arn: self.target_endpoint_arn,
            replication_instance_arn: self.replication_instance_arn,
            task_started_at: self.task_started_at,
            last_full_load_at: self.last_full_load_at,
            landing_path: self.landing_path,
            last_job_run_id: self.last_job_run_id,
            consumed_cdc_files,
            updated_at: self.updated_at,
        })
    }
}

/// Column values in table order, JSON columns already encoded.
struct Columns {
    schema_name: Option<String>,
    task_type: Option<&'static str>,
    task_status: Option<&'static str>,
    source_endpoint_arn: Option<String>,
    target_endpoint_arn: Option<String>,
    replication_instance_arn: Option<String>,
    task_started_at: Option<DateTime<Utc>>,
    replication_stats: Option<String>,
    table_stats: Option<String>,
    last_full_load_at: Option<DateTime<Utc>>,
    landing_path: Option<String>,
    last_job_run_id: Option<String>,
    last_job_state: Option<&'static str>,
}

impl Columns {
    fn from_update(update: &TableStatusUpdate) -> Result<Self> {
        Ok(Self {
            schema_name: update.schema_name.clone(),
            task_type: update.task_type.map(|t| t.as_str()),
            task_status: update.task_status.map(|s| s.as_str()),
            source_endpoint_arn: update.source_endpoint_arn.clone(),
            target_endpoint_arn: update.target_endpoint_arn.clone(),
            replication_instance_arn: update.replication_instance_arn.clone(),
            task_started_at: update.task_started_at,
            replication_stats: update.replication_stats.as_ref().map(serde_json::to_string).transpose()?,
            table_stats: update.table_stats.as_ref().map(serde_json::to_string).transpose()?,
            last_full_load_at: update.last_full_load_at,
            landing_path: update.landing_path.clone(),
            last_job_run_id: update.last_job_run_id.clone(),
            last_job_state: update.last_job_state.map(|s| s.as_str()),
        })
    }

    fn from_record(record: &TableStatusRecord) -> Result<Self> {
        Ok(Self {
            schema_name: record.schema_name.clone(),
            task_type: Some(record.task_type.as_str()),
            task_status: Some(record.task_status.as_str()),
            source_endpoint_arn: record.source_endpoint_arn.clone(),
            target_endpoint_arn: record.target_endpoint_arn.clone(),
            replication_instance_arn: record.replication_instance_arn.clone(),
            task_started_at: record.task_started_at,
            replication_stats: record.replication_stats.as_ref().map(serde_json::to_string).transpose()?,
            table_stats: record.table_stats.as_ref().map(serde_json::to_string).transpose()?,
            last_full_load_at: record.last_full_load_at,
            landing_path: record.landing_path.clone(),
            last_job_run_id: record.last_job_run_id.clone(),
            last_job_state: record.last_job_state.map(|s| s.as_str()),
        })
    }

    fn bind<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        query
            .bind(self.schema_name.as_deref())
            .bind(self.task_type)
            .bind(self.task_status)
            .bind(self.source_endpoint_arn.as_deref())
            .bind(self.target_endpoint_arn.as_deref())
            .bind(self.replication_instance_arn.as_deref())
            .bind(self.task_started_at)
            .bind(self.replication_stats.as_deref())
            .bind(self.table_stats.as_deref())
            .bind(self.last_full_load_at)
            .bind(self.landing_path.as_deref())
            .bind(self.last_job_run_id.as_deref())
            .bind(self.last_job_state)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT task_id, table_name, schema_name, task_type, task_status,
           source_endpoint_arn, target_endpoint_arn, replication_instance_arn,
           task_started_at, replication_stats, table_stats, last_full_load_at,
           landing_path, last_job_run_id, last_job_state, updated_at
    FROM table_status
"#;

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn get_item(&self, task_id: &str, table_name: &str) -> Result<Option<TableStatusRecord>> {
        let row = sqlx::query_as::<_, StatusRow>(&format!(
            "{} WHERE task_id = ? AND table_name = ?",
            SELECT_COLUMNS
        ))
        .bind(task_id)
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let files = self.consumed_files(task_id, table_name).await?;
                Ok(Some(row.into_record(files)?))
            }
            None => Ok(None),
        }
    }

    async fn put_item(&self, record: &TableStatusRecord) -> Result<()> {
        let columns = Columns::from_record(record)?;
        let query = sqlx::query(
            r#"
            INSERT OR REPLACE INTO table_status (
                task_id, table_name, schema_name, task_type, task_status,
                source_endpoint_arn, target_endpoint_arn, replication_instance_arn,
                task_started_at, replication_stats, table_stats, last_full_load_at,
                landing_path, last_job_run_id, last_job_state, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.task_id)
        .bind(&record.table_name);

        columns
            .bind(query)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_item(&self, task_id: &str, table_name: &str, update: TableStatusUpdate) -> Result<()> {
        let columns = Columns::from_update(&update)?;

        if columns.task_type.is_some() && columns.task_status.is_some() {
            let query = sqlx::query(
                r#"
                INSERT INTO table_status (
                    task_id, table_name, schema_name, task_type, task_status,
                    source_endpoint_arn, target_endpoint_arn, replication_instance_arn,
                    task_started_at, replication_stats, table_stats, last_full_load_at,
                    landing_path, last_job_run_id, last_job_state, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(task_id, table_name) DO UPDATE SET
                    schema_name = COALESCE(excluded.schema_name, table_status.schema_name),
                    task_type = excluded.task_type,
                    task_status = excluded.task_status,
                    source_endpoint_arn = COALESCE(excluded.source_endpoint_arn, table_status.source_endpoint_arn),
                    target_endpoint_arn = COALESCE(excluded.target_endpoint_arn, table_status.target_endpoint_arn),
                    replication_instance_arn = COALESCE(excluded.replication_instance_arn, table_status.replication_instance_arn),
                    task_started_at = COALESCE(excluded.task_started_at, table_status.task_started_at),
                    replication_stats = COALESCE(excluded.replication_stats, table_status.replication_stats),
                    table_stats = COALESCE(excluded.table_stats, table_status.table_stats),
                    last_full_load_at = COALESCE(excluded.last_full_load_at, table_status.last_full_load_at),
                    landing_path = COALESCE(excluded.landing_path, table_status.landing_path),
                    last_job_run_id = COALESCE(excluded.last_job_run_id, table_status.last_job_run_id),
                    last_job_state = COALESCE(excluded.last_job_state, table_status.last_job_state),
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(task_id)
            .bind(table_name);

            columns
                .bind(query)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

            return Ok(());
        }

        let query = sqlx::query(
            r#"
            UPDATE table_status SET
                schema_name = COALESCE(?, schema_name),
                task_type = COALESCE(?, task_type),
                task_status = COALESCE(?, task_status),
                source_endpoint_arn = COALESCE(?, source_endpoint_arn),
                target_endpoint_arn = COALESCE(?, target_endpoint_arn),
                replication_instance_arn = COALESCE(?, replication_instance_arn),
                task_started_at = COALESCE(?, task_started_at),
                replication_stats = COALESCE(?, replication_stats),
                table_stats = COALESCE(?, table_stats),
                last_full_load_at = COALESCE(?, last_full_load_at),
                landing_path = COALESCE(?, landing_path),
                last_job_run_id = COALESCE(?, last_job_run_id),
                last_job_state = COALESCE(?, last_job_state),
                updated_at = ?
            WHERE task_id = ? AND table_name = ?
            "#,
        );

        let result = columns
            .bind(query)
            .bind(Utc::now())
            .bind(task_id)
            .bind(table_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::store(
                "update_item",
                format!("no record for ({}, {}) and update lacks type or status", task_id, table_name),
            ));
        }

        Ok(())
    }

    async fn append_consumed_files(&self, task_id: &str, table_name: &str, files: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;

        for file in files {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO cdc_cursor (task_id, table_name, file_name, consumed_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(task_id)
            .bind(table_name)
            .bind(file)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(added)
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<TableStatusRecord>> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            "{} ORDER BY task_id, table_name LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let files = self.consumed_files(&row.task_id, &row.table_name).await?;
            records.push(row.into_record(files)?);
        }
        Ok(records)
    }
}
