use driftwatch_core::Batch;

use super::Transformer;
use crate::error::TransformError;

/// Ordered chain of transformers.
#[derive(Default)]
pub struct TransformerPipeline {
    transformers: Vec<Box<dyn Transformer>>,
}

impl TransformerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transformer: impl Transformer + 'static) -> Self {
        self.add(Box::new(transformer));
        self
    }

    pub fn add(&mut self, transformer: Box<dyn Transformer>) -> &mut Self {
        self.transformers.push(transformer);
        self
    }

    /// Remove every transformer with the given name.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.transformers.retain(|transformer| transformer.name() != name);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.transformers.clear();
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Apply every transformer in order.
    ///
    /// With `skip_on_error`, a transformer whose columns are missing or
    /// that fails is skipped and the batch passes through unchanged;
    /// otherwise the first such failure aborts the pipeline.
    pub fn transform(&self, batch: &Batch, skip_on_error: bool) -> Result<Batch, TransformError> {
        let total = self.transformers.len();
        tracing::info!(transformers = total, "starting transform pipeline");

        let mut current = batch.clone();
        for (index, transformer) in self.transformers.iter().enumerate() {
            let name = transformer.name();
            let outcome = transformer
                .validate_columns(&current)
                .and_then(|_| transformer.transform(&current));
            match outcome {
                Ok(next) => {
                    tracing::debug!(step = index + 1, total, transformer = name, "applied transformer");
                    current = next;
                }
                Err(err) if skip_on_error => {
                    tracing::warn!(transformer = name, error = %err, "skipping transformer");
                }
                Err(err) => {
                    tracing::error!(transformer = name, error = %err, "transformer failed");
                    return Err(err);
                }
            }
        }

        tracing::info!(rows = current.row_count(), "transform pipeline completed");
        Ok(current)
    }

    /// One message per transformer that cannot run on `batch`.
    pub fn validate_pipeline(&self, batch: &Batch) -> Vec<String> {
        self.transformers
            .iter()
            .filter_map(|transformer| {
                let missing = transformer.missing_columns(batch);
                (!missing.is_empty())
                    .then(|| format!("{}: missing columns {missing:?}", transformer.name()))
            })
            .collect()
    }
}
