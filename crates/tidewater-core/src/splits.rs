// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Range split planning for partitioned full loads.
//!
//! The planner itself (usually an NTILE query against the live source
//! database) is an external collaborator behind [`SplitPlanner`]. This module
//! owns the request gating and the conversion of segment maxima into the
//! boundary list that ends up in the task's `parallel-load` rule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::MigrationRequest;

/// Granularity the final open-ended boundary is rounded up to.
pub const BOUNDARY_ROUNDING: i64 = 100_000;

/// Column-range boundaries partitioning one table's full load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Column the ranges are computed over.
    pub partition_column: String,
    /// Ordered upper bounds.
    pub boundaries: Vec<String>,
}

impl SplitPlan {
    /// Build a plan from explicit boundaries.
    pub fn new<I, S>(partition_column: impl Into<String>, boundaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            partition_column: partition_column.into(),
            boundaries: boundaries.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a plan from the per-segment maxima of an NTILE grouping.
    ///
    /// Every maximum becomes an upper bound, followed by the last maximum
    /// rounded up to a multiple of [`BOUNDARY_ROUNDING`]. The rounded bound is
    /// dropped when it equals the last maximum. Returns `None` for an empty
    /// segment list.
    pub fn from_segment_maxima(partition_column: impl Into<String>, maxima: &[i64]) -> Option<Self> {
        let last = *maxima.last()?;
        let mut boundaries: Vec<String> = maxima.iter().map(i64::to_string).collect();
        let rounded = round_up_to_multiple(last, BOUNDARY_ROUNDING);
        if rounded != last {
            boundaries.push(rounded.to_string());
        }
        Some(Self {
            partition_column: partition_column.into(),
            boundaries,
        })
    }
}

fn round_up_to_multiple(number: i64, multiple: i64) -> i64 {
    let n = number.saturating_add(multiple - 1);
    n - n.rem_euclid(multiple)
}

/// Parameters handed to the planner, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    /// Schema owning the table.
    pub owner: String,
    /// Table to split.
    pub table_name: String,
    /// Partition column.
    pub partition_column: String,
    /// Number of segments.
    pub num_segments: u32,
}

impl SplitRequest {
    /// Planning is requested only when the partition key, segment count and
    /// owner are all present and the segment count is non-zero.
    pub fn from_request(request: &MigrationRequest) -> Option<Self> {
        let partition_column = request.partition_key.as_deref()?.trim();
        let owner = request.edp_owner.as_deref()?.trim();
        let num_segments = request.num_segments.filter(|n| *n > 0)?;
        if partition_column.is_empty() || owner.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_uppercase(),
            table_name: request.table_name.to_uppercase(),
            partition_column: partition_column.to_uppercase(),
            num_segments,
        })
    }
}

/// External range-computation step.
#[async_trait]
pub trait SplitPlanner: Send + Sync {
    /// Compute a split plan. `Ok(None)` means load the table unpartitioned.
    async fn compute_splits(&self, request: &SplitRequest) -> Result<Option<SplitPlan>, ServiceError>;
}

/// Planner that never partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSplits;

#[async_trait]
impl SplitPlanner for NoSplits {
    async fn compute_splits(&self, _request: &SplitRequest) -> Result<Option<SplitPlan>, ServiceError> {
        Ok(None)
    }
}

/// Planner that returns canned per-segment maxima, used by tests and by
/// embedders that computed the ranges ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticSplitPlanner {
    maxima: Vec<i64>,
}

impl StaticSplitPlanner {
    /// Planner answering every request with these maxima.
    pub fn new(maxima: Vec<i64>) -> Self {
        Self { maxima }
    }
}

#[async_trait]
impl SplitPlanner for StaticSplitPlanner {
    async fn compute_splits(&self, request: &SplitRequest) -> Result<Option<SplitPlan>, ServiceError> {
        Ok(SplitPlan::from_segment_maxima(
            request.partition_column.clone(),
            &self.maxima,
        ))
    }
}
