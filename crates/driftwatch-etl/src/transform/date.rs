use chrono::{DateTime, NaiveDate, NaiveDateTime};
use driftwatch_core::{Batch, Value, ValueKind};

use super::Transformer;
use crate::error::TransformError;

/// Formats tried in order for text cells.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses date columns into timestamps. Unparseable cells become null.
#[derive(Debug, Clone)]
pub struct DateTransformer {
    columns: Vec<String>,
    formats: Vec<String>,
}

impl DateTransformer {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    fn parse_cell(&self, value: &Value) -> Value {
        match value {
            Value::Timestamp(_) => value.clone(),
            Value::Date(date) => date
                .and_hms_opt(0, 0, 0)
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
            Value::Text(text) => self
                .parse_text(text.trim())
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    fn parse_text(&self, text: &str) -> Option<NaiveDateTime> {
        if text.is_empty() {
            return None;
        }
        for format in &self.formats {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
                return Some(ts);
            }
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return date.and_hms_opt(0, 0, 0);
            }
        }
        // Fractional seconds and offsets as emitted by most APIs.
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|ts| ts.naive_utc())
            })
    }
}

impl Transformer for DateTransformer {
    fn name(&self) -> &str {
        "DateTransformer"
    }

    fn required_columns(&self) -> &[String] {
        &self.columns
    }

    fn transform(&self, batch: &Batch) -> Result<Batch, TransformError> {
        self.validate_columns(batch)?;

        let mut out = batch.clone();
        for name in &self.columns {
            let Some(column) = batch.column(name) else {
                continue;
            };
            let parsed: Vec<Value> = column.values.iter().map(|v| self.parse_cell(v)).collect();
            let failed = parsed
                .iter()
                .zip(&column.values)
                .filter(|(new, old)| new.is_null() && !old.is_null())
                .count();
            if failed > 0 {
                tracing::warn!(column = %name, failed, "unparseable dates set to null");
            }
            out.replace_column_as(name, parsed, ValueKind::Timestamp)?;
            tracing::debug!(column = %name, "transformed date column");
        }
        Ok(out)
    }
}
