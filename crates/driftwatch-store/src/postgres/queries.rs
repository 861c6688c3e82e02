use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::Result;
use crate::model::BuildingPermit;

/// Rows per multi-value insert statement.
pub const UPSERT_CHUNK: usize = 1000;

#[derive(Debug, sqlx::FromRow)]
pub struct RawActiveColumn {
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawSchemaColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub discovered_at: DateTime<Utc>,
    pub is_active: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawPermit {
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

#[derive(Debug, sqlx::FromRow)]
pub struct RawExecution {
    pub job_name: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_processed: i64,
    pub records_failed: i64,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct ExecutionParams<'a> {
    pub job_name: &'a str,
    pub status: &'static str,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub records_processed: i64,
    pub records_failed: i64,
    pub error_message: Option<&'a str>,
    pub metadata: &'a serde_json::Value,
}

pub async fn active_columns(pool: &PgPool, table_name: &str) -> Result<Vec<RawActiveColumn>> {
    let rows = sqlx::query_as::<_, RawActiveColumn>(
        r#"
        select column_name, data_type
        from schema_metadata
        where table_name = $1
          and is_active = 'active'
        order by column_name
        "#,
    )
    .bind(table_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn all_columns(pool: &PgPool, table_name: &str) -> Result<Vec<RawSchemaColumn>> {
    let rows = sqlx::query_as::<_, RawSchemaColumn>(
        r#"
        select table_name, column_name, data_type, discovered_at, is_active
        from schema_metadata
        where table_name = $1
        order by column_name
        "#,
    )
    .bind(table_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert columns as active. A previously removed column comes back active
/// with a fresh discovery time.
pub async fn upsert_columns(
    pool: &PgPool,
    table_name: &str,
    columns: &BTreeMap<String, String>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (column, data_type) in columns {
        sqlx::query(
            r#"
            insert into schema_metadata (table_name, column_name, data_type, discovered_at, is_active)
            values ($1, $2, $3, now(), 'active')
            on conflict (table_name, column_name) do update
            set data_type = excluded.data_type,
                discovered_at = case
                  when schema_metadata.is_active = 'removed' then excluded.discovered_at
                  else schema_metadata.discovered_at
                end,
                is_active = 'active'
            "#,
        )
        .bind(table_name)
        .bind(column)
        .bind(data_type)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn mark_removed(pool: &PgPool, table_name: &str, columns: &[String]) -> Result<u64> {
    let result = sqlx::query(
        r#"
        update schema_metadata
        set is_active = 'removed'
        where table_name = $1
          and column_name = any($2)
          and is_active = 'active'
        "#,
    )
    .bind(table_name)
    .bind(columns)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn upsert_permits(pool: &PgPool, permits: &[BuildingPermit]) -> Result<()> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "insert into building_permits (permit_number, application_date, issued_date, \
         permit_type, work_description, street_number, street_name, postal_code, ward, \
         estimated_cost) ",
    );
    builder.push_values(permits, |mut row, permit| {
        row.push_bind(&permit.permit_number)
            .push_bind(permit.application_date)
            .push_bind(permit.issued_date)
            .push_bind(&permit.permit_type)
            .push_bind(&permit.work_description)
            .push_bind(&permit.street_number)
            .push_bind(&permit.street_name)
            .push_bind(&permit.postal_code)
            .push_bind(&permit.ward)
            .push_bind(permit.estimated_cost);
    });
    builder.push(
        " on conflict (permit_number) do update set \
         application_date = excluded.application_date, \
         issued_date = excluded.issued_date, \
         permit_type = excluded.permit_type, \
         work_description = excluded.work_description, \
         street_number = excluded.street_number, \
         street_name = excluded.street_name, \
         postal_code = excluded.postal_code, \
         ward = excluded.ward, \
         estimated_cost = excluded.estimated_cost, \
         updated_at = now()",
    );
    builder.build().execute(pool).await?;
    Ok(())
}

const PERMIT_COLUMNS: &str = "permit_number, application_date, issued_date, permit_type, \
     work_description, street_number, street_name, postal_code, ward, \
     estimated_cost::float8 as estimated_cost";

pub async fn find_permit(pool: &PgPool, permit_number: &str) -> Result<Option<RawPermit>> {
    let sql = format!("select {PERMIT_COLUMNS} from building_permits where permit_number = $1");
    let row = sqlx::query_as::<_, RawPermit>(&sql)
        .bind(permit_number)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_permits(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<RawPermit>> {
    let sql = format!(
        "select {PERMIT_COLUMNS} from building_permits order by permit_number limit $1 offset $2"
    );
    let rows = sqlx::query_as::<_, RawPermit>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn count_permits(pool: &PgPool) -> Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("select count(*) from building_permits")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

pub async fn insert_execution(pool: &PgPool, params: &ExecutionParams<'_>) -> Result<()> {
    sqlx::query(
        r#"
        insert into job_executions (
          job_name, status, start_time, end_time, duration_seconds,
          records_processed, records_failed, error_message, metadata
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(params.job_name)
    .bind(params.status)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.duration_seconds)
    .bind(params.records_processed)
    .bind(params.records_failed)
    .bind(params.error_message)
    .bind(params.metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn latest_execution(pool: &PgPool, job_name: &str) -> Result<Option<RawExecution>> {
    let row = sqlx::query_as::<_, RawExecution>(
        r#"
        select job_name, status, start_time, end_time, duration_seconds,
               records_processed, records_failed, error_message, metadata
        from job_executions
        where job_name = $1
        order by start_time desc, id desc
        limit 1
        "#,
    )
    .bind(job_name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
