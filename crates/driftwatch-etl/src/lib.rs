//! ETL orchestration for driftwatch: data sources, cleaning transformers,
//! alerting, metrics and the permits job that ties them to drift detection.

pub mod alert;
pub mod error;
pub mod job;
pub mod metrics;
pub mod source;
pub mod transform;

pub use alert::{Alert, AlertNotifier, AlertSeverity, ConsoleNotifier, drift_alert};
pub use error::{AlertError, FetchError, JobError, TransformError};
pub use job::{
    JobResult, PERMITS_JOB_NAME, PERMITS_TABLE, PermitsJob, PermitsJobConfig, default_pipeline,
    permits_from_batch,
};
pub use metrics::{MetricSummary, PerformanceMetrics, Stopwatch};
pub use source::{BatchSource, CkanClient, CkanConfig, load_file};
pub use transform::{DateTransformer, NumericTransformer, Transformer, TransformerPipeline};
