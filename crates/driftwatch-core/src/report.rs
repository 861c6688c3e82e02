use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::CanonicalType;

/// Summary used when a baseline exists and nothing differs.
pub const MATCHES_EXPECTED_MESSAGE: &str = "Schema matches expected structure";
/// Summary used for the first snapshot of a table.
pub const NO_BASELINE_MESSAGE: &str = "No expected schema provided - recorded current schema";

/// Drift severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Derive severity from the diff lists.
    ///
    /// Removals and type changes are critical, additions alone are a warning.
    pub(crate) fn classify(new_columns: usize, removed_columns: usize, type_changes: usize) -> Self {
        if removed_columns > 0 || type_changes > 0 {
            Severity::Critical
        } else if new_columns > 0 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new canonical type of a column present in both schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeChange {
    pub old: CanonicalType,
    pub new: CanonicalType,
}

impl TypeChange {
    /// True for changes that cannot lose information when old values are
    /// read under the new type. Informational only; severity ignores it.
    pub fn is_widening(&self) -> bool {
        matches!(
            (&self.old, &self.new),
            (CanonicalType::Integer, CanonicalType::Numeric)
                | (CanonicalType::Date, CanonicalType::Timestamp)
        )
    }
}

/// Outcome of one schema comparison.
///
/// Built only by the drift classifier and immutable afterwards; callers
/// read it through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    table_name: String,
    has_drift: bool,
    new_columns: Vec<String>,
    removed_columns: Vec<String>,
    type_changes: BTreeMap<String, TypeChange>,
    severity: Severity,
    message: String,
}

impl DriftReport {
    /// Report for a table without a recorded baseline.
    pub(crate) fn initial_snapshot(table_name: &str, mut columns: Vec<String>) -> Self {
        columns.sort();
        Self {
            table_name: table_name.to_string(),
            has_drift: false,
            new_columns: columns,
            removed_columns: Vec::new(),
            type_changes: BTreeMap::new(),
            severity: Severity::Info,
            message: NO_BASELINE_MESSAGE.to_string(),
        }
    }

    /// Report for a comparison against a baseline. Derives the drift flag,
    /// severity and summary from the diff lists.
    pub(crate) fn from_diff(
        table_name: &str,
        mut new_columns: Vec<String>,
        mut removed_columns: Vec<String>,
        type_changes: BTreeMap<String, TypeChange>,
    ) -> Self {
        new_columns.sort();
        removed_columns.sort();

        let has_drift =
            !new_columns.is_empty() || !removed_columns.is_empty() || !type_changes.is_empty();
        let severity = Severity::classify(
            new_columns.len(),
            removed_columns.len(),
            type_changes.len(),
        );
        let message = summarize(new_columns.len(), removed_columns.len(), type_changes.len());

        Self {
            table_name: table_name.to_string(),
            has_drift,
            new_columns,
            removed_columns,
            type_changes,
            severity,
            message,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn has_drift(&self) -> bool {
        self.has_drift
    }

    pub fn new_columns(&self) -> &[String] {
        &self.new_columns
    }

    pub fn removed_columns(&self) -> &[String] {
        &self.removed_columns
    }

    pub fn type_changes(&self) -> &BTreeMap<String, TypeChange> {
        &self.type_changes
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the report should reach the alert collaborator.
    pub fn needs_alert(&self) -> bool {
        self.has_drift && self.severity >= Severity::Warning
    }
}

fn summarize(new_columns: usize, removed_columns: usize, type_changes: usize) -> String {
    let mut clauses = Vec::new();
    if new_columns > 0 {
        clauses.push(format!("{new_columns} new column(s) added"));
    }
    if removed_columns > 0 {
        clauses.push(format!("{removed_columns} column(s) removed"));
    }
    if type_changes > 0 {
        clauses.push(format!("{type_changes} type change(s) detected"));
    }

    if clauses.is_empty() {
        MATCHES_EXPECTED_MESSAGE.to_string()
    } else {
        clauses.join("; ")
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema Drift Report for '{}':", self.table_name)?;
        let status = if self.has_drift { "DRIFT DETECTED" } else { "NO DRIFT" };
        writeln!(f, "  Status: {status}")?;
        write!(f, "  Severity: {}", self.severity.as_str().to_uppercase())?;

        if !self.new_columns.is_empty() {
            write!(
                f,
                "\n  New Columns ({}): {}",
                self.new_columns.len(),
                self.new_columns.join(", ")
            )?;
        }
        if !self.removed_columns.is_empty() {
            write!(
                f,
                "\n  Removed Columns ({}): {}",
                self.removed_columns.len(),
                self.removed_columns.join(", ")
            )?;
        }
        if !self.type_changes.is_empty() {
            write!(f, "\n  Type Changes:")?;
            for (column, change) in &self.type_changes {
                write!(f, "\n    - {column}: {} -> {}", change.old, change.new)?;
                if change.is_widening() {
                    write!(f, " (widening)")?;
                }
            }
        }
        write!(f, "\n  Message: {}", self.message)
    }
}
