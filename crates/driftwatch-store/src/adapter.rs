use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BuildingPermit, JobExecution, SchemaColumnRecord};

/// Durable record of the columns seen for each table.
///
/// Removal is a soft delete: history is kept, and a removed column that
/// shows up again is recorded as a new discovery.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Active columns of `table_name` as `column -> type label`.
    async fn get_active_schema(&self, table_name: &str) -> Result<BTreeMap<String, String>>;

    /// Append newly discovered columns as active.
    async fn record_new_columns(
        &self,
        table_name: &str,
        columns: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Flip active columns to removed.
    async fn mark_columns_as_removed(&self, table_name: &str, columns: &[String]) -> Result<()>;

    /// Every column ever recorded for `table_name`, active or not.
    async fn column_history(&self, table_name: &str) -> Result<Vec<SchemaColumnRecord>>;
}

/// Upsert-by-key storage for cleaned permit records.
#[async_trait]
pub trait PermitStore: Send + Sync {
    /// Insert or update permits keyed on `permit_number`. Returns the number
    /// of distinct permits written.
    async fn upsert_batch(&self, permits: &[BuildingPermit]) -> Result<u64>;

    async fn find_by_permit_number(&self, permit_number: &str) -> Result<Option<BuildingPermit>>;

    /// Permits ordered by permit number.
    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<BuildingPermit>>;

    async fn count(&self) -> Result<u64>;
}

/// Audit trail of job runs.
#[async_trait]
pub trait JobHistory: Send + Sync {
    async fn record(&self, execution: &JobExecution) -> Result<()>;

    /// Most recent execution of `job_name` by start time.
    async fn latest(&self, job_name: &str) -> Result<Option<JobExecution>>;
}

/// Keep the last occurrence of each permit number, in first-seen order.
pub(crate) fn dedupe_permits(permits: &[BuildingPermit]) -> Vec<BuildingPermit> {
    let mut order: Vec<&str> = Vec::new();
    let mut latest: BTreeMap<&str, &BuildingPermit> = BTreeMap::new();
    for permit in permits {
        if latest.insert(permit.permit_number.as_str(), permit).is_none() {
            order.push(permit.permit_number.as_str());
        }
    }
    order
        .into_iter()
        .filter_map(|key| latest.get(key).map(|permit| (*permit).clone()))
        .collect()
}
