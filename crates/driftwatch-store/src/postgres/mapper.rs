use crate::error::Result;
use crate::model::{BuildingPermit, ColumnStatus, JobExecution, JobStatus, SchemaColumnRecord};

use super::queries::{ExecutionParams, RawExecution, RawPermit, RawSchemaColumn};

pub fn map_schema_column(raw: RawSchemaColumn) -> Result<SchemaColumnRecord> {
    Ok(SchemaColumnRecord {
        table_name: raw.table_name,
        column_name: raw.column_name,
        data_type: raw.data_type,
        discovered_at: raw.discovered_at,
        status: ColumnStatus::parse(&raw.is_active)?,
    })
}

pub fn map_permit(raw: RawPermit) -> BuildingPermit {
    BuildingPermit {
        permit_number: raw.permit_number,
        application_date: raw.application_date,
        issued_date: raw.issued_date,
        permit_type: raw.permit_type,
        work_description: raw.work_description,
        street_number: raw.street_number,
        street_name: raw.street_name,
        postal_code: raw.postal_code,
        ward: raw.ward,
        estimated_cost: raw.estimated_cost,
    }
}

pub fn map_execution(raw: RawExecution) -> Result<JobExecution> {
    Ok(JobExecution {
        job_name: raw.job_name,
        status: JobStatus::parse(&raw.status)?,
        start_time: raw.start_time,
        end_time: raw.end_time,
        duration_seconds: raw.duration_seconds,
        records_processed: to_u64(raw.records_processed),
        records_failed: to_u64(raw.records_failed),
        error_message: raw.error_message,
        metadata: raw.metadata.unwrap_or(serde_json::Value::Null),
    })
}

pub fn execution_params(execution: &JobExecution) -> ExecutionParams<'_> {
    ExecutionParams {
        job_name: &execution.job_name,
        status: execution.status.as_str(),
        start_time: execution.start_time,
        end_time: execution.end_time,
        duration_seconds: execution.duration_seconds,
        records_processed: to_i64(execution.records_processed),
        records_failed: to_i64(execution.records_failed),
        error_message: execution.error_message.as_deref(),
        metadata: &execution.metadata,
    }
}

/// Saturating conversion for bigint columns.
pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Negative counts never occur; clamp them to zero.
pub fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
