use std::sync::OnceLock;

use driftwatch_core::{Batch, Value, ValueKind};
use regex::Regex;

use super::Transformer;
use crate::error::TransformError;

const NULL_TOKENS: &[&str] = &["", "null", "NULL", "None", "N/A", "n/a", "nan"];

fn currency_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[$€£¥₹]").ok()).as_ref()
}

fn non_numeric_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\d.\-]").ok()).as_ref()
}

/// Cleans free-form numeric columns (currency, separators, junk) into floats.
#[derive(Debug, Clone)]
pub struct NumericTransformer {
    columns: Vec<String>,
    remove_currency_symbols: bool,
    remove_commas: bool,
    fill_null_with: Option<f64>,
}

impl NumericTransformer {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            remove_currency_symbols: true,
            remove_commas: true,
            fill_null_with: None,
        }
    }

    pub fn remove_currency_symbols(mut self, enabled: bool) -> Self {
        self.remove_currency_symbols = enabled;
        self
    }

    pub fn remove_commas(mut self, enabled: bool) -> Self {
        self.remove_commas = enabled;
        self
    }

    /// Replace nulls (including cells that fail to parse) with `value`.
    pub fn fill_null_with(mut self, value: f64) -> Self {
        self.fill_null_with = Some(value);
        self
    }

    fn clean_cell(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Null => None,
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) if float.is_finite() => Some(*float),
            Value::Float(_) => None,
            other => other.to_text().and_then(|text| self.clean_text(&text)),
        }
    }

    fn clean_text(&self, raw: &str) -> Option<f64> {
        let trimmed = raw.trim();
        if NULL_TOKENS.contains(&trimmed) {
            return None;
        }

        let mut cleaned = trimmed.to_string();
        if self.remove_currency_symbols {
            if let Some(pattern) = currency_pattern() {
                cleaned = pattern.replace_all(&cleaned, "").into_owned();
            }
        }
        if self.remove_commas {
            cleaned = cleaned.replace(',', "");
        }
        if let Some(pattern) = non_numeric_pattern() {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        let cleaned = keep_last_decimal_point(&cleaned);

        cleaned
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite())
    }
}

/// `1.234.56` -> `1234.56`: only the last point is treated as decimal.
fn keep_last_decimal_point(value: &str) -> String {
    match value.rfind('.') {
        Some(last) if value.matches('.').count() > 1 => {
            let (integer, fraction) = value.split_at(last);
            format!("{}{}", integer.replace('.', ""), fraction)
        }
        _ => value.to_string(),
    }
}

impl Transformer for NumericTransformer {
    fn name(&self) -> &str {
        "NumericTransformer"
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
            let cleaned: Vec<Value> = column
                .values
                .iter()
                .map(|value| {
                    self.clean_cell(value)
                        .or(self.fill_null_with)
                        .map(Value::Float)
                        .unwrap_or(Value::Null)
                })
                .collect();
            out.replace_column_as(name, cleaned, ValueKind::Float)?;
            tracing::debug!(column = %name, "transformed numeric column");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::Column;

    fn clean(raw: &str) -> Option<f64> {
        NumericTransformer::new(["c"]).clean_text(raw)
    }

    #[test]
    fn strips_currency_and_separators() {
        assert_eq!(clean("$1,234.50"), Some(1234.5));
        assert_eq!(clean(" €99 "), Some(99.0));
        assert_eq!(clean("£-12.5"), Some(-12.5));
        assert_eq!(clean("approx 300 CAD"), Some(300.0));
    }

    #[test]
    fn null_tokens_become_null() {
        for token in ["", "null", "NULL", "None", "N/A", "n/a", "nan", "   "] {
            assert_eq!(clean(token), None, "{token:?}");
        }
        assert_eq!(clean("abc"), None);
    }

    #[test]
    fn multiple_points_keep_the_last() {
        assert_eq!(keep_last_decimal_point("1.234.56"), "1234.56");
        assert_eq!(keep_last_decimal_point("12.5"), "12.5");
        assert_eq!(clean("1.234.567,89"), Some(1234.56789));
    }

    #[test]
    fn transform_fills_nulls_when_configured() {
        let batch = Batch::new(vec![Column::new(
            "estimated_cost",
            vec![
                Value::Text("$2,000".to_string()),
                Value::Int(5),
                Value::Text("N/A".to_string()),
                Value::Null,
            ],
        )])
        .expect("batch");

        let plain = NumericTransformer::new(["estimated_cost"])
            .transform(&batch)
            .expect("transform");
        let column = plain.column("estimated_cost").expect("column");
        assert_eq!(
            column.values,
            vec![Value::Float(2000.0), Value::Float(5.0), Value::Null, Value::Null]
        );
        assert_eq!(column.runtime_type(), "float64");

        let filled = NumericTransformer::new(["estimated_cost"])
            .fill_null_with(0.0)
            .transform(&batch)
            .expect("transform");
        assert_eq!(filled.column("estimated_cost").expect("column").null_count(), 0);
    }

    #[test]
    fn all_null_tokens_keep_numeric_type() {
        let batch = Batch::new(vec![Column::new(
            "estimated_cost",
            vec![Value::Text("N/A".to_string()), Value::Null],
        )])
        .expect("batch");

        let out = NumericTransformer::new(["estimated_cost"])
            .transform(&batch)
            .expect("transform");
        let column = out.column("estimated_cost").expect("column");
        assert_eq!(column.null_count(), 2);
        assert_eq!(column.runtime_type(), "float64");
    }
}
