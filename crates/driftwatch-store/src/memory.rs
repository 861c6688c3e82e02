use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::adapter::{JobHistory, PermitStore, SchemaStore, dedupe_permits};
use crate::error::{Result, StoreError};
use crate::model::{BuildingPermit, ColumnStatus, JobExecution, SchemaColumnRecord};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

/// Schema metadata held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    records: Mutex<BTreeMap<(String, String), SchemaColumnRecord>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with an active schema for `table_name`.
    pub fn with_schema(table_name: &str, columns: &[(&str, &str)]) -> Self {
        let now = Utc::now();
        let records = columns
            .iter()
            .map(|(column, data_type)| {
                (
                    (table_name.to_string(), column.to_string()),
                    SchemaColumnRecord {
                        table_name: table_name.to_string(),
                        column_name: column.to_string(),
                        data_type: data_type.to_string(),
                        discovered_at: now,
                        status: ColumnStatus::Active,
                    },
                )
            })
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn get_active_schema(&self, table_name: &str) -> Result<BTreeMap<String, String>> {
        let records = lock(&self.records)?;
        Ok(records
            .values()
            .filter(|record| record.table_name == table_name)
            .filter(|record| record.status == ColumnStatus::Active)
            .map(|record| (record.column_name.clone(), record.data_type.clone()))
            .collect())
    }

    async fn record_new_columns(
        &self,
        table_name: &str,
        columns: &BTreeMap<String, String>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut records = lock(&self.records)?;
        for (column, data_type) in columns {
            let key = (table_name.to_string(), column.clone());
            match records.get_mut(&key) {
                Some(existing) => {
                    if existing.status == ColumnStatus::Removed {
                        existing.discovered_at = now;
                    }
                    existing.data_type = data_type.clone();
                    existing.status = ColumnStatus::Active;
                }
                None => {
                    records.insert(
                        key,
                        SchemaColumnRecord {
                            table_name: table_name.to_string(),
                            column_name: column.clone(),
                            data_type: data_type.clone(),
                            discovered_at: now,
                            status: ColumnStatus::Active,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn mark_columns_as_removed(&self, table_name: &str, columns: &[String]) -> Result<()> {
        let mut records = lock(&self.records)?;
        for column in columns {
            if let Some(record) = records.get_mut(&(table_name.to_string(), column.clone())) {
                record.status = ColumnStatus::Removed;
            }
        }
        Ok(())
    }

    async fn column_history(&self, table_name: &str) -> Result<Vec<SchemaColumnRecord>> {
        let records = lock(&self.records)?;
        Ok(records
            .values()
            .filter(|record| record.table_name == table_name)
            .cloned()
            .collect())
    }
}

/// Permits held in process memory, ordered by permit number.
#[derive(Debug, Default)]
pub struct InMemoryPermitStore {
    permits: Mutex<BTreeMap<String, BuildingPermit>>,
}

impl InMemoryPermitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermitStore for InMemoryPermitStore {
    async fn upsert_batch(&self, permits: &[BuildingPermit]) -> Result<u64> {
        let unique = dedupe_permits(permits);
        let mut stored = lock(&self.permits)?;
        let written = unique.len() as u64;
        for permit in unique {
            stored.insert(permit.permit_number.clone(), permit);
        }
        Ok(written)
    }

    async fn find_by_permit_number(&self, permit_number: &str) -> Result<Option<BuildingPermit>> {
        Ok(lock(&self.permits)?.get(permit_number).cloned())
    }

    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<BuildingPermit>> {
        let stored = lock(&self.permits)?;
        Ok(stored
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(lock(&self.permits)?.len() as u64)
    }
}

/// Job executions held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryJobHistory {
    executions: Mutex<Vec<JobExecution>>,
}

impl InMemoryJobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution recorded so far, oldest first.
    pub fn all(&self) -> Result<Vec<JobExecution>> {
        Ok(lock(&self.executions)?.clone())
    }
}

#[async_trait]
impl JobHistory for InMemoryJobHistory {
    async fn record(&self, execution: &JobExecution) -> Result<()> {
        lock(&self.executions)?.push(execution.clone());
        Ok(())
    }

    async fn latest(&self, job_name: &str) -> Result<Option<JobExecution>> {
        let executions = lock(&self.executions)?;
        Ok(executions
            .iter()
            .filter(|execution| execution.job_name == job_name)
            .max_by_key(|execution| execution.start_time)
            .cloned())
    }
}
