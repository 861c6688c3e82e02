use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::adapter::{JobHistory, PermitStore, SchemaStore, dedupe_permits};
use crate::error::Result;
use crate::model::{BuildingPermit, JobExecution, SchemaColumnRecord};

mod mapper;
mod queries;

const MIGRATION: &str = include_str!("../../migrations/0001_initial_schema.sql");

/// Open a Postgres pool from a connection URL.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let options: PgConnectOptions = database_url.parse()?;
    connect_with(options, max_connections).await
}

/// Open a Postgres pool from discrete connection options.
pub async fn connect_with(options: PgConnectOptions, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Store backed by PostgreSQL. Implements every persistence trait.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in MIGRATION.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql).execute(&self.pool).await?;
        }
        tracing::debug!("database schema ensured");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("select 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SchemaStore for PostgresStore {
    async fn get_active_schema(&self, table_name: &str) -> Result<BTreeMap<String, String>> {
        let rows = queries::active_columns(&self.pool, table_name).await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.column_name, row.data_type))
            .collect())
    }

    async fn record_new_columns(
        &self,
        table_name: &str,
        columns: &BTreeMap<String, String>,
    ) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        queries::upsert_columns(&self.pool, table_name, columns).await?;
        tracing::info!(
            table = table_name,
            columns = columns.len(),
            "recorded schema columns"
        );
        Ok(())
    }

    async fn mark_columns_as_removed(&self, table_name: &str, columns: &[String]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let updated = queries::mark_removed(&self.pool, table_name, columns).await?;
        tracing::info!(table = table_name, updated, "marked columns as removed");
        Ok(())
    }

    async fn column_history(&self, table_name: &str) -> Result<Vec<SchemaColumnRecord>> {
        let rows = queries::all_columns(&self.pool, table_name).await?;
        rows.into_iter().map(mapper::map_schema_column).collect()
    }
}

#[async_trait]
impl PermitStore for PostgresStore {
    async fn upsert_batch(&self, permits: &[BuildingPermit]) -> Result<u64> {
        let unique = dedupe_permits(permits);
        if unique.is_empty() {
            return Ok(0);
        }
        for chunk in unique.chunks(queries::UPSERT_CHUNK) {
            queries::upsert_permits(&self.pool, chunk).await?;
        }
        Ok(unique.len() as u64)
    }

    async fn find_by_permit_number(&self, permit_number: &str) -> Result<Option<BuildingPermit>> {
        let row = queries::find_permit(&self.pool, permit_number).await?;
        Ok(row.map(mapper::map_permit))
    }

    async fn list(&self, limit: u64, offset: u64) -> Result<Vec<BuildingPermit>> {
        let rows =
            queries::list_permits(&self.pool, mapper::to_i64(limit), mapper::to_i64(offset))
                .await?;
        Ok(rows.into_iter().map(mapper::map_permit).collect())
    }

    async fn count(&self) -> Result<u64> {
        let total = queries::count_permits(&self.pool).await?;
        Ok(mapper::to_u64(total))
    }
}

#[async_trait]
impl JobHistory for PostgresStore {
    async fn record(&self, execution: &JobExecution) -> Result<()> {
        queries::insert_execution(&self.pool, &mapper::execution_params(execution)).await
    }

    async fn latest(&self, job_name: &str) -> Result<Option<JobExecution>> {
        let row = queries::latest_execution(&self.pool, job_name).await?;
        row.map(mapper::map_execution).transpose()
    }
}
