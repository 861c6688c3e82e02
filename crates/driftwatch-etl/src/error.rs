use thiserror::Error;

/// Failures talking to a batch source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("CKAN API error: {0}")]
    Api(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Batch(#[from] driftwatch_core::Error),
}

impl FetchError {
    /// Transport failures and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Failures raised by transformers and the pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{transformer} requires columns {missing:?} which are missing from the batch")]
    MissingColumns {
        transformer: String,
        missing: Vec<String>,
    },
    #[error("{transformer} failed on column '{column}': {message}")]
    Column {
        transformer: String,
        column: String,
        message: String,
    },
    #[error(transparent)]
    Batch(#[from] driftwatch_core::Error),
}

/// Failure delivering an alert.
#[derive(Debug, Error)]
#[error("failed to send alert '{title}': {message}")]
pub struct AlertError {
    pub title: String,
    pub message: String,
}

/// Phase failure inside a job run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("failed to extract data: {0}")]
    Extract(#[from] FetchError),
    #[error("transformation failed: {0}")]
    Transform(#[from] TransformError),
    #[error("load phase failed: {0}")]
    Load(String),
    #[error(transparent)]
    Validation(#[from] driftwatch_core::ValidationError),
    #[error("store error: {0}")]
    Store(#[from] driftwatch_store::StoreError),
}
