use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use driftwatch_core::{DriftReport, Severity};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

use crate::error::AlertError;

/// Urgency of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl From<Severity> for AlertSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => AlertSeverity::Info,
            Severity::Warning => AlertSeverity::Warning,
            Severity::Critical => AlertSeverity::Critical,
        }
    }
}

/// A notification destined for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, JsonValue>,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] {}",
            self.severity.as_str().to_uppercase(),
            self.title
        )?;
        writeln!(f, "Time: {}", self.timestamp.to_rfc3339())?;
        write!(f, "Message: {}", self.message)?;
        if !self.metadata.is_empty() {
            write!(f, "\nMetadata:")?;
            for (key, value) in &self.metadata {
                write!(f, "\n  {key}: {value}")?;
            }
        }
        Ok(())
    }
}

/// Delivery channel for alerts.
pub trait AlertNotifier: Send + Sync {
    fn send(&self, alert: &Alert) -> Result<(), AlertError>;

    fn is_available(&self) -> bool;
}

/// Emits alerts as log events and optionally appends them to a file.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier {
    log_file: Option<PathBuf>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_file(path: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(path.into()),
        }
    }

    fn append(&self, alert: &Alert) -> Result<(), AlertError> {
        let Some(path) = &self.log_file else {
            return Ok(());
        };
        let fail = |err: std::io::Error| AlertError {
            title: alert.title.clone(),
            message: err.to_string(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(fail)?;
        writeln!(
            file,
            "{} - {} - {}",
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            alert.severity.as_str().to_uppercase(),
            alert
        )
        .map_err(fail)
    }
}

impl AlertNotifier for ConsoleNotifier {
    fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        let title = alert.title.as_str();
        match alert.severity {
            AlertSeverity::Info => tracing::info!(event = "alert", title, "{alert}"),
            AlertSeverity::Warning => tracing::warn!(event = "alert", title, "{alert}"),
            AlertSeverity::Error | AlertSeverity::Critical => {
                tracing::error!(event = "alert", title, severity = alert.severity.as_str(), "{alert}")
            }
        }
        self.append(alert)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Build the schema drift alert for a report.
pub fn drift_alert(report: &DriftReport) -> Alert {
    let mut parts = Vec::new();
    if !report.new_columns().is_empty() {
        parts.push(format!("New columns: {}", report.new_columns().join(", ")));
    }
    if !report.removed_columns().is_empty() {
        parts.push(format!(
            "Removed columns: {}",
            report.removed_columns().join(", ")
        ));
    }
    if !report.type_changes().is_empty() {
        let changes: Vec<String> = report
            .type_changes()
            .iter()
            .map(|(column, change)| format!("{column}: {} -> {}", change.old, change.new))
            .collect();
        parts.push(format!("Type changes: {}", changes.join("; ")));
    }
    let message = if parts.is_empty() {
        "Schema validation complete".to_string()
    } else {
        parts.join("\n")
    };

    let metadata = json!({
        "table_name": report.table_name(),
        "new_columns_count": report.new_columns().len(),
        "removed_columns_count": report.removed_columns().len(),
        "type_changes_count": report.type_changes().len(),
    });

    Alert::new(
        format!("Schema Drift Detected: {}", report.table_name()),
        message,
        report.severity().into(),
    )
    .with_metadata(match metadata {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::{CanonicalType, ColumnDriftDetector, SchemaMap};

    fn report() -> DriftReport {
        let expected: SchemaMap = [
            ("a".to_string(), CanonicalType::Integer),
            ("b".to_string(), CanonicalType::Text),
        ]
        .into_iter()
        .collect();
        let current: SchemaMap = [
            ("a".to_string(), CanonicalType::Numeric),
            ("c".to_string(), CanonicalType::Date),
        ]
        .into_iter()
        .collect();
        ColumnDriftDetector::new().classify("permits", &current, Some(&expected))
    }

    #[test]
    fn drift_alert_lists_every_change() {
        let alert = drift_alert(&report());
        assert_eq!(alert.title, "Schema Drift Detected: permits");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(
            alert.message,
            "New columns: c\nRemoved columns: b\nType changes: a: integer -> numeric"
        );
        assert_eq!(alert.metadata["removed_columns_count"], json!(1));
        assert_eq!(alert.metadata["table_name"], json!("permits"));
    }

    #[test]
    fn display_includes_metadata() {
        let mut metadata = Map::new();
        metadata.insert("rows".to_string(), json!(3));
        let alert = Alert::new("Done", "ok", AlertSeverity::Info).with_metadata(metadata);
        let rendered = alert.to_string();
        assert!(rendered.starts_with("[INFO] Done\nTime: "));
        assert!(rendered.contains("Message: ok"));
        assert!(rendered.ends_with("Metadata:\n  rows: 3"));
    }

    #[test]
    fn console_notifier_appends_to_log_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("logs").join("alerts.log");
        let notifier = ConsoleNotifier::with_log_file(&path);
        assert!(notifier.is_available());

        notifier
            .send(&Alert::new("First", "one", AlertSeverity::Warning))
            .expect("send first");
        notifier
            .send(&Alert::new("Second", "two", AlertSeverity::Error))
            .expect("send second");

        let contents = fs::read_to_string(&path).expect("read log");
        assert!(contents.contains("WARNING - [WARNING] First"));
        assert!(contents.contains("ERROR - [ERROR] Second"));
    }
}
