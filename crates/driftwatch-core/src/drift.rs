use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::batch::Batch;
use crate::error::ValidationError;
use crate::report::{DriftReport, TypeChange};
use crate::schema::{SchemaMap, extract_schema};

/// Capability implemented by schema validators.
pub trait SchemaValidator {
    /// Compare the batch against the expected schema of `table_name`.
    ///
    /// `expected = None` means no baseline has been recorded yet.
    fn validate(
        &self,
        batch: &Batch,
        table_name: &str,
        expected: Option<&SchemaMap>,
    ) -> Result<DriftReport, ValidationError>;

    /// Canonical schema of the batch.
    fn extract_schema(&self, batch: &Batch) -> SchemaMap {
        extract_schema(batch)
    }
}

/// Detects added, removed and retyped columns.
///
/// In strict mode any drift turns into a [`ValidationError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnDriftDetector {
    strict: bool,
}

impl ColumnDriftDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn with_strict_mode(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Compare two schema maps without the strict gate.
    ///
    /// An absent or empty baseline yields the initial snapshot report.
    pub fn classify(
        &self,
        table_name: &str,
        current: &SchemaMap,
        expected: Option<&SchemaMap>,
    ) -> DriftReport {
        let Some(expected) = expected.filter(|schema| !schema.is_empty()) else {
            return DriftReport::initial_snapshot(
                table_name,
                current.column_names().map(str::to_string).collect(),
            );
        };

        let new_columns = current
            .column_names()
            .filter(|name| !expected.contains(name))
            .map(str::to_string)
            .collect();
        let removed_columns = expected
            .column_names()
            .filter(|name| !current.contains(name))
            .map(str::to_string)
            .collect();

        let mut type_changes = BTreeMap::new();
        for (name, new_type) in current.iter() {
            if let Some(old_type) = expected.get(name) {
                if old_type != new_type {
                    type_changes.insert(
                        name.to_string(),
                        TypeChange {
                            old: old_type.clone(),
                            new: new_type.clone(),
                        },
                    );
                }
            }
        }

        DriftReport::from_diff(table_name, new_columns, removed_columns, type_changes)
    }
}

impl SchemaValidator for ColumnDriftDetector {
    fn validate(
        &self,
        batch: &Batch,
        table_name: &str,
        expected: Option<&SchemaMap>,
    ) -> Result<DriftReport, ValidationError> {
        let current = self.extract_schema(batch);
        let report = self.classify(table_name, &current, expected);

        if report.has_drift() {
            warn!(
                event = "schema_drift_detected",
                table = %table_name,
                severity = %report.severity(),
                new_columns = report.new_columns().len(),
                removed_columns = report.removed_columns().len(),
                type_changes = report.type_changes().len(),
                "{}",
                report.message()
            );
        } else if expected.is_some_and(|schema| !schema.is_empty()) {
            info!(event = "schema_validated", table = %table_name, "no schema drift detected");
        } else {
            info!(
                event = "schema_snapshot",
                table = %table_name,
                columns = current.len(),
                "no expected schema, recorded current columns"
            );
        }

        if self.strict && report.has_drift() {
            return Err(ValidationError::strict_drift(report));
        }

        Ok(report)
    }
}
