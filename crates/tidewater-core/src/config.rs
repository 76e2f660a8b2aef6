// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.
//!
//! A [`Config`] is built once and passed to every component at construction
//! time. Nothing in the crate reads the environment after that.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::TaskType;

/// Tidewater orchestration configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL of the status store
    pub status_database_url: String,
    /// Source database endpoint
    pub source: SourceEndpointConfig,
    /// Logical identifier of the landing-zone target endpoint
    pub target_endpoint_id: String,
    /// Logical identifier of the replication instance
    pub replication_instance_id: String,
    /// Bucket the replication tasks land data in
    pub landing_bucket: String,
    /// Compute job submission settings
    pub compute: ComputeConfig,
    /// Settings document passed to every created replication task
    pub task_settings: Value,
    /// Interval between replication task status polls
    pub task_poll_interval: Duration,
    /// Interval between compute job state polls
    pub job_poll_interval: Duration,
    /// Time budget of one table's workflow
    pub workflow_timeout: Duration,
    /// What happens to the callback token when the budget runs out
    pub timeout_policy: TimeoutPolicy,
    /// Whether CDC workflows dispatch a compute job after signaling success
    pub cdc_compute_policy: CdcComputePolicy,
}

impl Config {
    /// Configuration with every optional setting at its default.
    pub fn with_defaults(
        status_database_url: impl Into<String>,
        application_id: impl Into<String>,
        execution_role_arn: impl Into<String>,
    ) -> Self {
        let landing_bucket = DEFAULT_LANDING_BUCKET.to_string();
        Self {
            status_database_url: status_database_url.into(),
            source: SourceEndpointConfig::Postgres(PostgresSettings::default()),
            target_endpoint_id: DEFAULT_TARGET_ENDPOINT.to_string(),
            replication_instance_id: DEFAULT_REPLICATION_INSTANCE.to_string(),
            compute: ComputeConfig::new(application_id, execution_role_arn, landing_bucket.clone()),
            landing_bucket,
            task_settings: default_task_settings(),
            task_poll_interval: Duration::from_secs(100),
            job_poll_interval: Duration::from_secs(100),
            workflow_timeout: Duration::from_secs(180 * 60),
            timeout_policy: TimeoutPolicy::default(),
            cdc_compute_policy: CdcComputePolicy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TIDEWATER_STATUS_DATABASE_URL`: SQLite connection string
    /// - `TIDEWATER_COMPUTE_APPLICATION_ID`: compute application identifier
    /// - `TIDEWATER_COMPUTE_ROLE_ARN`: execution role of compute job runs
    ///
    /// Optional (with defaults):
    /// - `TIDEWATER_SOURCE_ENGINE`: `oracle`, `mysql` or `postgres` (default: postgres)
    /// - `TIDEWATER_SOURCE_ENDPOINT_ID`: (default: `dms-<engine>-endpoint`)
    /// - `TIDEWATER_SOURCE_SECRET_ARN`, `TIDEWATER_SOURCE_DB_NAME`: (default: empty)
    /// - `TIDEWATER_TARGET_ENDPOINT_ID`: (default: dms-s3-endpoint)
    /// - `TIDEWATER_REPLICATION_INSTANCE_ID`: (default: dms)
    /// - `TIDEWATER_LANDING_BUCKET`: (default: test-dms-replication-blog)
    /// - `TIDEWATER_SCRIPTS_BUCKET`: (default: the landing bucket)
    /// - `TIDEWATER_TASK_POLL_SECS`, `TIDEWATER_JOB_POLL_SECS`: (default: 100)
    /// - `TIDEWATER_WORKFLOW_TIMEOUT_SECS`: (default: 10800)
    /// - `TIDEWATER_TIMEOUT_POLICY`: `signal-failure` or `silent` (default: signal-failure)
    /// - `TIDEWATER_CDC_COMPUTE_POLICY`: `follow-on` or `skip` (default: follow-on)
    pub fn from_env() -> Result<Self, ConfigError> {
        let status_database_url = required("TIDEWATER_STATUS_DATABASE_URL")?;
        let application_id = required("TIDEWATER_COMPUTE_APPLICATION_ID")?;
        let execution_role_arn = required("TIDEWATER_COMPUTE_ROLE_ARN")?;

        let engine = optional("TIDEWATER_SOURCE_ENGINE").unwrap_or_else(|| "postgres".to_string());
        let endpoint_id = optional("TIDEWATER_SOURCE_ENDPOINT_ID")
            .unwrap_or_else(|| format!("dms-{}-endpoint", engine.to_lowercase()));
        let secret_arn = optional("TIDEWATER_SOURCE_SECRET_ARN").unwrap_or_default();
        let database_name = optional("TIDEWATER_SOURCE_DB_NAME").unwrap_or_default();
        let source = SourceEndpointConfig::from_engine(&engine, endpoint_id, secret_arn, database_name)
            .ok_or(ConfigError::Invalid(
                "TIDEWATER_SOURCE_ENGINE",
                "must be one of oracle, mysql, postgres",
            ))?;

        let landing_bucket = optional("TIDEWATER_LANDING_BUCKET")
            .unwrap_or_else(|| DEFAULT_LANDING_BUCKET.to_string());
        let scripts_bucket =
            optional("TIDEWATER_SCRIPTS_BUCKET").unwrap_or_else(|| landing_bucket.clone());

        let timeout_policy = match optional("TIDEWATER_TIMEOUT_POLICY").as_deref() {
            None | Some("signal-failure") => TimeoutPolicy::SignalFailure,
            Some("silent") => TimeoutPolicy::Silent,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "TIDEWATER_TIMEOUT_POLICY",
                    "must be signal-failure or silent",
                ));
            }
        };

        let cdc_compute_policy = match optional("TIDEWATER_CDC_COMPUTE_POLICY").as_deref() {
            None | Some("follow-on") => CdcComputePolicy::FollowOn,
            Some("skip") => CdcComputePolicy::Skip,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "TIDEWATER_CDC_COMPUTE_POLICY",
                    "must be follow-on or skip",
                ));
            }
        };

        let mut compute = ComputeConfig::new(application_id, execution_role_arn, scripts_bucket);
        compute.scripts_bucket = compute.scripts_bucket.trim_start_matches("s3://").to_string();

        Ok(Self {
            status_database_url,
            source,
            target_endpoint_id: optional("TIDEWATER_TARGET_ENDPOINT_ID")
                .unwrap_or_else(|| DEFAULT_TARGET_ENDPOINT.to_string()),
            replication_instance_id: optional("TIDEWATER_REPLICATION_INSTANCE_ID")
                .unwrap_or_else(|| DEFAULT_REPLICATION_INSTANCE.to_string()),
            landing_bucket,
            compute,
            task_settings: default_task_settings(),
            task_poll_interval: secs("TIDEWATER_TASK_POLL_SECS", 100)?,
            job_poll_interval: secs("TIDEWATER_JOB_POLL_SECS", 100)?,
            workflow_timeout: secs("TIDEWATER_WORKFLOW_TIMEOUT_SECS", 180 * 60)?,
            timeout_policy,
            cdc_compute_policy,
        })
    }

    /// Landing path of a table's replicated files.
    pub fn landing_path(&self, schema_name: &str, table_name: &str) -> String {
        format!("s3://{}/{}/{}", self.landing_bucket, schema_name, table_name)
    }
}

const DEFAULT_LANDING_BUCKET: &str = "test-dms-replication-blog";
const DEFAULT_TARGET_ENDPOINT: &str = "dms-s3-endpoint";
const DEFAULT_REPLICATION_INSTANCE: &str = "dms";

/// Task settings applied when the caller does not override them.
pub fn default_task_settings() -> Value {
    json!({
        "FullLoadSettings": {"MaxFullLoadSubTasks": 49},
        "Logging": {"EnableLogging": true}
    })
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let value: u64 = match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a positive integer"))?,
        None => default,
    };
    if value == 0 {
        return Err(ConfigError::Invalid(key, "must be a positive integer"));
    }
    Ok(Duration::from_secs(value))
}

/// Source database endpoint, one variant per engine.
///
/// The orchestrator only ever asks for [`endpoint_id`](Self::endpoint_id);
/// engine-specific settings are carried for operators and tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", content = "settings", rename_all = "lowercase")]
pub enum SourceEndpointConfig {
    /// Oracle source.
    Oracle(OracleSettings),
    /// MySQL source.
    Mysql(MysqlSettings),
    /// PostgreSQL source.
    Postgres(PostgresSettings),
}

/// Oracle endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    pub endpoint_id: String,
    pub secret_arn: String,
    pub database_name: String,
    /// Read redo logs through binary reader instead of LogMiner.
    #[serde(default)]
    pub use_binary_reader: bool,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint_id: "dms-oracle-endpoint".to_string(),
            secret_arn: String::new(),
            database_name: String::new(),
            use_binary_reader: false,
        }
    }
}

/// MySQL endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysqlSettings {
    pub endpoint_id: String,
    pub secret_arn: String,
}

impl Default for MysqlSettings {
    fn default() -> Self {
        Self {
            endpoint_id: "dms-mysql-endpoint".to_string(),
            secret_arn: String::new(),
        }
    }
}

/// PostgreSQL endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresSettings {
    pub endpoint_id: String,
    pub secret_arn: String,
    pub database_name: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            endpoint_id: "dms-postgres-endpoint".to_string(),
            secret_arn: String::new(),
            database_name: String::new(),
        }
    }
}

impl SourceEndpointConfig {
    /// Build the variant for an engine name; `None` for unknown engines.
    pub fn from_engine(
        engine: &str,
        endpoint_id: String,
        secret_arn: String,
        database_name: String,
    ) -> Option<Self> {
        match engine.to_ascii_lowercase().as_str() {
            "oracle" => Some(Self::Oracle(OracleSettings {
                endpoint_id,
                secret_arn,
                database_name,
                use_binary_reader: false,
            })),
            "mysql" => Some(Self::Mysql(MysqlSettings {
                endpoint_id,
                secret_arn,
            })),
            "postgres" | "postgresql" => Some(Self::Postgres(PostgresSettings {
                endpoint_id,
                secret_arn,
                database_name,
            })),
            _ => None,
        }
    }

    /// Logical identifier the controller resolves to an endpoint handle.
    pub fn endpoint_id(&self) -> &str {
        match self {
            Self::Oracle(s) => &s.endpoint_id,
            Self::Mysql(s) => &s.endpoint_id,
            Self::Postgres(s) => &s.endpoint_id,
        }
    }

    /// Engine name.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Oracle(_) => "oracle",
            Self::Mysql(_) => "mysql",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Compute job submission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeConfig {
    /// Compute application the job runs are submitted to
    pub application_id: String,
    /// Execution role of the job runs
    pub execution_role_arn: String,
    /// Bucket holding the job scripts under `scripts/`
    pub scripts_bucket: String,
    /// Full-load script name
    pub full_load_script: String,
    /// CDC script name
    pub cdc_script: String,
    /// Spark submit parameters passed with every run
    pub spark_submit_parameters: String,
}

impl ComputeConfig {
    /// Settings with default script names and spark parameters.
    pub fn new(
        application_id: impl Into<String>,
        execution_role_arn: impl Into<String>,
        scripts_bucket: impl Into<String>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            execution_role_arn: execution_role_arn.into(),
            scripts_bucket: scripts_bucket.into(),
            full_load_script: "fl_processing.py".to_string(),
            cdc_script: "cdc_processing.py".to_string(),
            spark_submit_parameters: [
                "--conf spark.executor.cores=2",
                "--conf spark.executor.memory=4g",
                "--conf spark.driver.cores=2",
                "--conf spark.driver.memory=8g",
                "--conf spark.executor.instances=1",
                "--conf spark.dynamicAllocation.maxExecutors=12",
            ]
            .join(" "),
        }
    }

    /// Script the given task type runs.
    pub fn entry_point(&self, task_type: TaskType) -> String {
        let script = match task_type {
            TaskType::FullLoad => &self.full_load_script,
            TaskType::Cdc => &self.cdc_script,
        };
        format!("s3://{}/scripts/{}", self.scripts_bucket, script)
    }

    /// Run name for the given task type.
    pub fn job_name(&self, task_type: TaskType) -> &'static str {
        match task_type {
            TaskType::FullLoad => "fl-step",
            TaskType::Cdc => "cdc-step",
        }
    }
}

/// Behaviour when a table's workflow exceeds its time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Send a `WORKFLOW_TIMEOUT` failure signal so the caller is never left waiting.
    #[default]
    SignalFailure,
    /// Abandon the workflow without signaling.
    Silent,
}

/// Whether a CDC workflow dispatches the CDC compute job after the monitor
/// stage already signaled success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CdcComputePolicy {
    /// Dispatch the job as a fire-and-forget follow-on; its success sends no
    /// second signal.
    #[default]
    FollowOn,
    /// End the workflow right after the success signal.
    Skip,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
