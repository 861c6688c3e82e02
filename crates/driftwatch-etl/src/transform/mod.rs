use driftwatch_core::Batch;

use crate::error::TransformError;

mod date;
mod numeric;
mod pipeline;

pub use date::{DEFAULT_DATE_FORMATS, DateTransformer};
pub use numeric::NumericTransformer;
pub use pipeline::TransformerPipeline;

/// A cleaning step applied to a batch.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Columns that must be present for `transform` to run.
    fn required_columns(&self) -> &[String];

    fn transform(&self, batch: &Batch) -> Result<Batch, TransformError>;

    fn missing_columns(&self, batch: &Batch) -> Vec<String> {
        self.required_columns()
            .iter()
            .filter(|column| !batch.has_column(column))
            .cloned()
            .collect()
    }

    fn validate_columns(&self, batch: &Batch) -> Result<(), TransformError> {
        let missing = self.missing_columns(batch);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TransformError::MissingColumns {
                transformer: self.name().to_string(),
                missing,
            })
        }
    }

    fn can_transform(&self, batch: &Batch) -> bool {
        self.missing_columns(batch).is_empty()
    }
}
