// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory status store for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::types::TaskStatus;

use super::{StatusStore, TableStatusRecord, TableStatusUpdate};

type Key = (String, String);

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Key, TableStatusRecord>,
    cursors: HashMap<Key, Vec<String>>,
    status_history: HashMap<Key, Vec<TaskStatus>>,
}

impl Inner {
    fn record_status(&mut self, key: &Key, status: TaskStatus) {
        let history = self.status_history.entry(key.clone()).or_default();
        if history.last() != Some(&status) {
            history.push(status);
        }
    }

    fn with_cursor(&self, key: &Key, record: &TableStatusRecord) -> TableStatusRecord {
        let mut record = record.clone();
        record.consumed_cdc_files = self.cursors.get(key).cloned().unwrap_or_default();
        record
    }
}

/// Status store backed by a `HashMap` behind a tokio mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct task statuses written for a key, oldest first.
    pub async fn status_history(&self, task_id: &str, table_name: &str) -> Vec<TaskStatus> {
        let inner = self.inner.lock().await;
        inner
            .status_history
            .get(&key(task_id, table_name))
            .cloned()
            .unwrap_or_default()
    }
}

fn key(task_id: &str, table_name: &str) -> Key {
    (task_id.to_string(), table_name.to_string())
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get_item(&self, task_id: &str, table_name: &str) -> Result<Option<TableStatusRecord>> {
        let inner = self.inner.lock().await;
        let key = key(task_id, table_name);

        Ok(inner.records.get(&key).map(|r| inner.with_cursor(&key, r)))
    }

    async fn put_item(&self, record: &TableStatusRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = key(&record.task_id, &record.table_name);

        let mut stored = record.clone();
        stored.consumed_cdc_files.clear();
        inner.record_status(&key, stored.task_status);
        inner.records.insert(key, stored);
        Ok(())
    }

    async fn update_item(&self, task_id: &str, table_name: &str, update: TableStatusUpdate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = key(task_id, table_name);

        let status = match inner.records.get_mut(&key) {
            Some(record) => {
                update.apply(record);
                record.task_status
            }
            None => {
                let record = update.into_record(task_id, table_name).ok_or_else(|| {
                    OrchestratorError::store(
                        "update_item",
                        format!("no record for ({}, {}) and update lacks type or status", task_id, table_name),
                    )
                })?;
                let status = record.task_status;
                inner.records.insert(key.clone(), record);
                status
            }
        };
        inner.record_status(&key, status);
        Ok(())
    }

    async fn append_consumed_files(&self, task_id: &str, table_name: &str, files: &[String]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let cursor = inner.cursors.entry(key(task_id, table_name)).or_default();

        let mut added = 0;
        for file in files {
            if !cursor.contains(file) {
                cursor.push(file.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<TableStatusRecord>> {
        let inner = self.inner.lock().await;

        let mut keys: Vec<&Key> = inner.records.keys().collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|k| inner.records.get(k).map(|r| inner.with_cursor(k, r)))
            .collect())
    }
}
