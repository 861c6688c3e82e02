use std::fs;
use std::path::Path;

use driftwatch_core::{Batch, Value};
use serde_json::{Map, Value as JsonValue};

use crate::error::FetchError;

/// Load a local CSV or JSON file, picked by extension.
pub fn load_file(path: &Path) -> Result<Batch, FetchError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        other => Err(FetchError::UnsupportedFormat(other.to_string())),
    }
}

/// Read a CSV file with a header row. Cells are typed by content.
pub fn load_csv(path: &Path) -> Result<Batch, FetchError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(infer_cell).collect());
    }

    Ok(Batch::from_rows(header, rows)?)
}

/// Read a JSON array of objects, or a CKAN-style `{"records": [...]}` body.
pub fn load_json(path: &Path) -> Result<Batch, FetchError> {
    let raw = fs::read_to_string(path)?;
    let document: JsonValue =
        serde_json::from_str(&raw).map_err(|err| FetchError::Decode(err.to_string()))?;

    let items = match document {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut object) => match object.remove("records") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(FetchError::Decode(
                    "expected an array of records".to_string(),
                ));
            }
        },
        _ => {
            return Err(FetchError::Decode(
                "expected an array of records".to_string(),
            ));
        }
    };

    let records = items
        .into_iter()
        .map(|item| match item {
            JsonValue::Object(record) => Ok(record),
            other => Err(FetchError::Decode(format!("record is not an object: {other}"))),
        })
        .collect::<Result<Vec<Map<String, JsonValue>>, _>>()?;

    Ok(Batch::from_json_records(&[], &records)?)
}

fn infer_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Int(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::Float(float);
        }
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::Text(raw.to_string()),
    }
}
