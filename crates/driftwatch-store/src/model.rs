use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Lifecycle state of a recorded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStatus {
    Active,
    Removed,
}

impl ColumnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnStatus::Active => "active",
            ColumnStatus::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(ColumnStatus::Active),
            "removed" => Ok(ColumnStatus::Removed),
            other => Err(StoreError::Invalid(format!("unknown column status: {other}"))),
        }
    }
}

/// One row of schema metadata, unique on `(table_name, column_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumnRecord {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub discovered_at: DateTime<Utc>,
    pub status: ColumnStatus,
}

/// Cleaned building permit, keyed on `permit_number`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingPermit {
    pub permit_number: String,
    pub application_date: Option<NaiveDate>,
    pub issued_date: Option<NaiveDate>,
    pub permit_type: Option<String>,
    pub work_description: Option<String>,
    pub street_number: Option<String>,
    pub street_name: Option<String>,
    pub postal_code: Option<String>,
    pub ward: Option<String>,
    pub estimated_cost: Option<f64>,
}

/// Outcome of an ETL job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    PartialSuccess,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::PartialSuccess => "partial_success",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "partial_success" => Ok(JobStatus::PartialSuccess),
            other => Err(StoreError::Invalid(format!("unknown job status: {other}"))),
        }
    }
}

/// Persisted summary of one job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_name: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_processed: u64,
    pub records_failed: u64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}
