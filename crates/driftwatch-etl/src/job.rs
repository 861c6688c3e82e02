use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use driftwatch_core::{
    Batch, ColumnDriftDetector, DriftReport, SchemaMap, SchemaValidator, Value, extract_schema,
};
use driftwatch_store::{
    BuildingPermit, JobExecution, JobHistory, JobStatus, PermitStore, SchemaStore,
};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::alert::{Alert, AlertNotifier, AlertSeverity, drift_alert};
use crate::error::JobError;
use crate::metrics::PerformanceMetrics;
use crate::source::BatchSource;
use crate::transform::{DateTransformer, NumericTransformer, TransformerPipeline};

/// Destination table for permit records and their schema metadata.
pub const PERMITS_TABLE: &str = "building_permits";
pub const PERMITS_JOB_NAME: &str = "BuildingPermitsETL";

const PERMIT_NUMBER: &str = "permit_number";
const FALLBACK_ID: &str = "_id";

/// Names and error policy for a permits job.
#[derive(Debug, Clone)]
pub struct PermitsJobConfig {
    pub job_name: String,
    pub table_name: String,
    /// Skip transformers that cannot run instead of failing the job.
    pub skip_transform_errors: bool,
}

impl Default for PermitsJobConfig {
    fn default() -> Self {
        Self {
            job_name: PERMITS_JOB_NAME.to_string(),
            table_name: PERMITS_TABLE.to_string(),
            skip_transform_errors: false,
        }
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_name: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub error_message: Option<String>,
    pub metadata: Map<String, JsonValue>,
    pub drift_report: Option<DriftReport>,
}

impl JobResult {
    /// Success and partial success both count as a completed run.
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Success | JobStatus::PartialSuccess)
    }

    pub fn to_execution(&self) -> JobExecution {
        JobExecution {
            job_name: self.job_name.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: Some(self.end_time),
            duration_seconds: Some(self.duration_seconds),
            records_processed: self.records_processed,
            records_failed: self.records_failed,
            error_message: self.error_message.clone(),
            metadata: JsonValue::Object(self.metadata.clone()),
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Job: {}", self.job_name)?;
        writeln!(f, "Status: {}", self.status.as_str().to_uppercase())?;
        writeln!(f, "Duration: {:.2}s", self.duration_seconds)?;
        write!(f, "Records Processed: {}", self.records_processed)?;
        if self.records_failed > 0 {
            write!(f, "\nRecords Failed: {}", self.records_failed)?;
        }
        if let Some(error) = &self.error_message {
            write!(f, "\nError: {error}")?;
        }
        if !self.metadata.is_empty() {
            write!(f, "\nMetadata:")?;
            for (key, value) in &self.metadata {
                write!(f, "\n  {key}: {value}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LoadOutcome {
    processed: u64,
    failed: u64,
}

/// Mutable state threaded through the phases of one run.
#[derive(Debug, Default)]
struct RunState {
    metadata: Map<String, JsonValue>,
    report: Option<DriftReport>,
}

/// Pipeline from the permits source to Postgres, with drift detection
/// between transform and load.
pub struct PermitsJob {
    config: PermitsJobConfig,
    source: Box<dyn BatchSource>,
    pipeline: TransformerPipeline,
    validator: Box<dyn SchemaValidator + Send + Sync>,
    schema_store: Arc<dyn SchemaStore>,
    permit_store: Arc<dyn PermitStore>,
    history: Option<Arc<dyn JobHistory>>,
    notifier: Arc<dyn AlertNotifier>,
    metrics: Arc<PerformanceMetrics>,
}

/// Date and cost cleaning for the permits feed.
pub fn default_pipeline() -> TransformerPipeline {
    TransformerPipeline::new()
        .with(DateTransformer::new(["application_date", "issued_date"]))
        .with(NumericTransformer::new(["estimated_cost"]))
}

impl PermitsJob {
    pub fn new(
        source: Box<dyn BatchSource>,
        schema_store: Arc<dyn SchemaStore>,
        permit_store: Arc<dyn PermitStore>,
        notifier: Arc<dyn AlertNotifier>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            config: PermitsJobConfig::default(),
            source,
            pipeline: default_pipeline(),
            validator: Box::new(ColumnDriftDetector::new()),
            schema_store,
            permit_store,
            history: None,
            notifier,
            metrics,
        }
    }

    pub fn with_config(mut self, config: PermitsJobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pipeline(mut self, pipeline: TransformerPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_validator(mut self, validator: impl SchemaValidator + Send + Sync + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn JobHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &PermitsJobConfig {
        &self.config
    }

    /// Run setup, extract, transform, load and cleanup.
    ///
    /// Never fails: phase errors are folded into a `Failed` result, and the
    /// result is recorded in the job history when one is configured.
    pub async fn execute(&self) -> JobResult {
        let job = self.config.job_name.as_str();
        let start_time = Utc::now();
        let mut state = RunState::default();
        tracing::info!(job, "starting ETL job");

        let outcome = self.run(&mut state).await;

        if let Err(err) = self.cleanup() {
            tracing::error!(job, error = %err, "cleanup failed");
        }

        let (status, processed, failed, error_message) = match outcome {
            Ok(load) => {
                let status = if load.failed > 0 && load.processed > 0 {
                    JobStatus::PartialSuccess
                } else if load.failed > 0 {
                    JobStatus::Failed
                } else {
                    JobStatus::Success
                };
                (status, load.processed, load.failed, None)
            }
            Err(err) => {
                tracing::error!(job, error = %err, "job failed");
                self.notify(Alert::new(
                    format!("ETL Job Failed: {job}"),
                    err.to_string(),
                    AlertSeverity::Error,
                ));
                (JobStatus::Failed, 0, 0, Some(err.to_string()))
            }
        };

        let end_time = Utc::now();
        let duration_seconds = (end_time - start_time)
            .to_std()
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        let result = JobResult {
            job_name: job.to_string(),
            status,
            start_time,
            end_time,
            duration_seconds,
            records_processed: processed,
            records_failed: failed,
            error_message,
            metadata: state.metadata,
            drift_report: state.report,
        };
        tracing::info!(job, status = status.as_str(), "job result:\n{result}");

        if let Some(history) = &self.history {
            if let Err(err) = history.record(&result.to_execution()).await {
                tracing::error!(job, error = %err, "failed to record job execution");
            }
        }
        result
    }

    async fn run(&self, state: &mut RunState) -> Result<LoadOutcome, JobError> {
        self.setup(state).await?;
        let raw = self.extract(state).await?;
        let transformed = self.transform(raw, state)?;
        self.load(transformed, state).await
    }

    async fn setup(&self, state: &mut RunState) -> Result<(), JobError> {
        let watch = self.metrics.start("setup");
        let healthy = self.source.health_check().await;
        record_phase(state, "setup", watch.stop());
        if !healthy {
            return Err(JobError::Setup(format!(
                "data source {} is not accessible",
                self.source.resource_id()
            )));
        }
        tracing::info!(resource = self.source.resource_id(), "data source reachable");
        Ok(())
    }

    async fn extract(&self, state: &mut RunState) -> Result<Batch, JobError> {
        let watch = self.metrics.start("extract");
        let batch = self.source.fetch().await;
        record_phase(state, "extract", watch.stop());
        let batch = batch?;
        if batch.is_empty() {
            tracing::warn!(resource = self.source.resource_id(), "no data fetched");
        }
        state
            .metadata
            .insert("extract_count".to_string(), batch.row_count().into());
        Ok(batch)
    }

    fn transform(&self, batch: Batch, state: &mut RunState) -> Result<Batch, JobError> {
        if batch.is_empty() {
            tracing::warn!("no data to transform");
            state.metadata.insert("transform_count".to_string(), 0.into());
            return Ok(batch);
        }
        let watch = self.metrics.start("transform");
        let transformed = self
            .pipeline
            .transform(&batch, self.config.skip_transform_errors);
        record_phase(state, "transform", watch.stop());
        let transformed = transformed?;
        state
            .metadata
            .insert("transform_count".to_string(), transformed.row_count().into());
        Ok(transformed)
    }

    async fn load(&self, batch: Batch, state: &mut RunState) -> Result<LoadOutcome, JobError> {
        if batch.is_empty() {
            tracing::warn!("no data to load");
            return Ok(LoadOutcome::default());
        }
        let watch = self.metrics.start("load");
        let outcome = self.load_batch(&batch, state).await;
        record_phase(state, "load", watch.stop());
        outcome
    }

    async fn load_batch(&self, batch: &Batch, state: &mut RunState) -> Result<LoadOutcome, JobError> {
        let table = self.config.table_name.as_str();

        let stored = self.schema_store.get_active_schema(table).await?;
        let expected = SchemaMap::from_labels(&stored);
        let baseline = (!expected.is_empty()).then_some(&expected);

        let report = match self.validator.validate(batch, table, baseline) {
            Ok(report) => report,
            Err(err) => {
                record_drift(state, err.report());
                self.notify(drift_alert(err.report()));
                state.report = Some(err.report().clone());
                return Err(err.into());
            }
        };
        record_drift(state, &report);

        if report.has_drift() {
            tracing::warn!(table, severity = report.severity().as_str(), "schema drift detected:\n{report}");
            self.notify(drift_alert(&report));
        }
        let report = &*state.report.insert(report);

        let (permits, failed) = permits_from_batch(batch);
        if failed > 0 {
            tracing::warn!(table, failed, "rows without a permit number skipped");
        }
        let processed = self.permit_store.upsert_batch(&permits).await?;
        tracing::info!(table, processed, "loaded permits");

        // Schema metadata follows the permits: a failed upsert leaves the
        // baseline where it was.
        let current = extract_schema(batch);
        if report.has_drift() {
            if !report.new_columns().is_empty() {
                self.schema_store
                    .record_new_columns(table, &current.labels_for(report.new_columns()))
                    .await?;
            }
            if !report.removed_columns().is_empty() {
                self.schema_store
                    .mark_columns_as_removed(table, report.removed_columns())
                    .await?;
            }
        }
        if stored.is_empty() {
            tracing::info!(table, columns = current.len(), "no stored schema, recording current schema");
            self.schema_store
                .record_new_columns(table, &current.to_labels())
                .await?;
        }

        self.notify(
            Alert::new(
                format!("ETL Job Completed: {}", self.config.job_name),
                format!("Successfully processed {processed} building permits"),
                AlertSeverity::Info,
            )
            .with_metadata(state.metadata.clone()),
        );

        Ok(LoadOutcome { processed, failed })
    }

    fn cleanup(&self) -> Result<(), JobError> {
        let _watch = self.metrics.start("cleanup");
        tracing::debug!(job = %self.config.job_name, "cleanup complete");
        Ok(())
    }

    fn notify(&self, alert: Alert) {
        if !self.notifier.is_available() {
            tracing::warn!(title = %alert.title, "alert channel unavailable");
            return;
        }
        if let Err(err) = self.notifier.send(&alert) {
            tracing::warn!(error = %err, "failed to send alert");
        }
    }
}

fn record_phase(state: &mut RunState, phase: &str, elapsed: std::time::Duration) {
    state.metadata.insert(
        format!("{phase}_seconds"),
        JsonValue::from((elapsed.as_secs_f64() * 1000.0).round() / 1000.0),
    );
}

fn record_drift(state: &mut RunState, report: &DriftReport) {
    let metadata = &mut state.metadata;
    metadata.insert("schema_drift_detected".to_string(), report.has_drift().into());
    metadata.insert("new_columns".to_string(), report.new_columns().len().into());
    metadata.insert("removed_columns".to_string(), report.removed_columns().len().into());
    metadata.insert("type_changes".to_string(), report.type_changes().len().into());
    metadata.insert("drift_severity".to_string(), report.severity().as_str().into());
}

/// Convert rows to permits. Rows with neither a permit number nor an `_id`
/// are counted as failed.
pub fn permits_from_batch(batch: &Batch) -> (Vec<BuildingPermit>, u64) {
    let mut permits = Vec::with_capacity(batch.row_count());
    let mut failed = 0;

    for row in 0..batch.row_count() {
        let text = |column: &str| batch.get(row, column).and_then(non_empty_text);
        let Some(permit_number) = text(PERMIT_NUMBER).or_else(|| text(FALLBACK_ID)) else {
            failed += 1;
            continue;
        };
        permits.push(BuildingPermit {
            permit_number,
            application_date: batch.get(row, "application_date").and_then(Value::as_date),
            issued_date: batch.get(row, "issued_date").and_then(Value::as_date),
            permit_type: text("permit_type"),
            work_description: text("work_description"),
            street_number: text("street_number"),
            street_name: text("street_name"),
            postal_code: text("postal_code"),
            ward: text("ward"),
            estimated_cost: batch.get(row, "estimated_cost").and_then(Value::as_f64),
        });
    }

    (permits, failed)
}

fn non_empty_text(value: &Value) -> Option<String> {
    value
        .to_text()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
