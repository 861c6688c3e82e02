use async_trait::async_trait;
use driftwatch_core::Batch;

use crate::error::FetchError;

mod ckan;
mod file;

pub use ckan::{CkanClient, CkanConfig, build_sql, parse_sql_response};
pub use file::{load_csv, load_file, load_json};

/// Producer of record batches for a job.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Identifier of the upstream resource, for logs and alerts.
    fn resource_id(&self) -> &str;

    /// True when the upstream endpoint answers.
    async fn health_check(&self) -> bool;

    /// Fetch every available record as one batch.
    async fn fetch(&self) -> Result<Batch, FetchError>;
}
