use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use driftwatch_store::{
    BuildingPermit, ColumnStatus, InMemoryJobHistory, InMemoryPermitStore, InMemorySchemaStore,
    JobExecution, JobHistory, JobStatus, PermitStore, SchemaStore,
};

fn columns(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, ty)| (name.to_string(), ty.to_string()))
        .collect()
}

fn permit(number: &str, cost: Option<f64>) -> BuildingPermit {
    BuildingPermit {
        permit_number: number.to_string(),
        issued_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        permit_type: Some("Addition".to_string()),
        estimated_cost: cost,
        ..BuildingPermit::default()
    }
}

#[tokio::test]
async fn active_schema_excludes_removed_columns() -> Result<()> {
    let store = InMemorySchemaStore::new();
    store
        .record_new_columns("permits", &columns(&[("a", "integer"), ("b", "text")]))
        .await?;
    store
        .mark_columns_as_removed("permits", &["b".to_string()])
        .await?;

    let active = store.get_active_schema("permits").await?;
    assert_eq!(active, columns(&[("a", "integer")]));

    let history = store.column_history("permits").await?;
    assert_eq!(history.len(), 2);
    assert!(
        history
            .iter()
            .any(|record| record.column_name == "b" && record.status == ColumnStatus::Removed)
    );
    Ok(())
}

#[tokio::test]
async fn tables_are_isolated() -> Result<()> {
    let store = InMemorySchemaStore::with_schema("permits", &[("a", "integer")]);
    store
        .record_new_columns("inspections", &columns(&[("z", "date")]))
        .await?;

    assert_eq!(
        store.get_active_schema("permits").await?,
        columns(&[("a", "integer")])
    );
    assert_eq!(
        store.get_active_schema("inspections").await?,
        columns(&[("z", "date")])
    );
    assert!(store.get_active_schema("unknown").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reappearing_column_is_reactivated() -> Result<()> {
    let store = InMemorySchemaStore::with_schema("permits", &[("a", "integer")]);
    let before = store.column_history("permits").await?[0].discovered_at;

    store
        .mark_columns_as_removed("permits", &["a".to_string()])
        .await?;
    assert!(store.get_active_schema("permits").await?.is_empty());

    store
        .record_new_columns("permits", &columns(&[("a", "numeric")]))
        .await?;
    let history = store.column_history("permits").await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ColumnStatus::Active);
    assert_eq!(history[0].data_type, "numeric");
    assert!(history[0].discovered_at >= before);
    Ok(())
}

#[tokio::test]
async fn removing_unknown_column_is_a_no_op() -> Result<()> {
    let store = InMemorySchemaStore::with_schema("permits", &[("a", "integer")]);
    store
        .mark_columns_as_removed("permits", &["missing".to_string()])
        .await?;
    assert_eq!(store.column_history("permits").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn permit_upsert_is_keyed_on_permit_number() -> Result<()> {
    let store = InMemoryPermitStore::new();
    let written = store
        .upsert_batch(&[
            permit("P-1", Some(100.0)),
            permit("P-2", None),
            permit("P-1", Some(250.5)),
        ])
        .await?;
    assert_eq!(written, 2);
    assert_eq!(store.count().await?, 2);

    let stored = store
        .find_by_permit_number("P-1")
        .await?
        .expect("P-1 stored");
    assert_eq!(stored.estimated_cost, Some(250.5));

    store.upsert_batch(&[permit("P-2", Some(10.0))]).await?;
    assert_eq!(store.count().await?, 2);
    assert_eq!(
        store
            .find_by_permit_number("P-2")
            .await?
            .and_then(|p| p.estimated_cost),
        Some(10.0)
    );
    Ok(())
}

#[tokio::test]
async fn permits_list_pages_in_key_order() -> Result<()> {
    let store = InMemoryPermitStore::new();
    store
        .upsert_batch(&[permit("C", None), permit("A", None), permit("B", None)])
        .await?;

    let page: Vec<String> = store
        .list(2, 1)
        .await?
        .into_iter()
        .map(|p| p.permit_number)
        .collect();
    assert_eq!(page, ["B", "C"]);
    assert!(store.list(10, 5).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn job_history_returns_latest_run() -> Result<()> {
    let history = InMemoryJobHistory::new();
    let start = Utc::now();
    for (offset, status) in [(0, JobStatus::Success), (5, JobStatus::Failed)] {
        history
            .record(&JobExecution {
                job_name: "permits".to_string(),
                status,
                start_time: start + Duration::seconds(offset),
                end_time: None,
                duration_seconds: None,
                records_processed: 10,
                records_failed: 0,
                error_message: None,
                metadata: serde_json::Value::Null,
            })
            .await?;
    }

    let latest = history.latest("permits").await?.expect("latest run");
    assert_eq!(latest.status, JobStatus::Failed);
    assert!(history.latest("other").await?.is_none());
    assert_eq!(history.all()?.len(), 2);
    Ok(())
}
