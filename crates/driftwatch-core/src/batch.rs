use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};

/// Runtime descriptor reported for columns without a single non-null cell.
pub const NULL_DESCRIPTOR: &str = "null";

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Storage kind of a non-null cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
}

impl ValueKind {
    /// Runtime type descriptor fed to the type normalizer.
    pub fn descriptor(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int64",
            ValueKind::Float => "float64",
            ValueKind::Text => "object",
            ValueKind::Date => "date",
            ValueKind::Timestamp => "datetime64[ns]",
        }
    }
}

impl Value {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Date(_) => Some(ValueKind::Date),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a decoded JSON value. Nested arrays and objects are kept as
    /// their JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(flag) => Value::Bool(*flag),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => number.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(text) => Value::Text(text.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(date) => Some(*date),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    /// Render the cell as text; `None` for nulls.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(flag) => Some(flag.to_string()),
            Value::Int(int) => Some(int.to_string()),
            Value::Float(float) => Some(float.to_string()),
            Value::Text(text) => Some(text.clone()),
            Value::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
    /// Kind the column was converted to, kept when every cell is null.
    #[serde(skip)]
    pub declared: Option<ValueKind>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            declared: None,
        }
    }

    pub fn with_declared(mut self, kind: ValueKind) -> Self {
        self.declared = Some(kind);
        self
    }

    /// Dominant runtime type descriptor of the column.
    ///
    /// Integers mixed with floats widen to `float64`; any other mix of kinds
    /// is reported as `object`. Columns with only nulls report their declared
    /// kind, or `null` when none was declared.
    pub fn runtime_type(&self) -> &'static str {
        let mut kinds = self.values.iter().filter_map(Value::kind);
        let Some(mut dominant) = kinds.next() else {
            return self
                .declared
                .map(ValueKind::descriptor)
                .unwrap_or(NULL_DESCRIPTOR);
        };

        for kind in kinds {
            dominant = match (dominant, kind) {
                (left, right) if left == right => left,
                (ValueKind::Int, ValueKind::Float) | (ValueKind::Float, ValueKind::Int) => {
                    ValueKind::Float
                }
                _ => return ValueKind::Text.descriptor(),
            };
        }

        dominant.descriptor()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_null()).count()
    }
}

/// Column-oriented batch of records.
///
/// Column names are unique and every column holds the same number of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    columns: Vec<Column>,
    rows: usize,
}

impl Batch {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidBatch(format!(
                    "duplicate column name: {}",
                    column.name
                )));
            }
        }

        let rows = columns.first().map(|col| col.values.len()).unwrap_or(0);
        if let Some(ragged) = columns.iter().find(|col| col.values.len() != rows) {
            return Err(Error::InvalidBatch(format!(
                "column {} has {} rows, expected {}",
                ragged.name,
                ragged.values.len(),
                rows
            )));
        }

        Ok(Self { columns, rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a batch from row-major cells under the given header.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Column> = header
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::InvalidBatch(format!(
                    "row {index} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Self::new(columns)
    }

    /// Build a batch from JSON records.
    ///
    /// Columns follow `fields` first, then any extra keys in order of first
    /// appearance. Keys missing from a record become nulls.
    pub fn from_json_records(fields: &[String], records: &[Map<String, JsonValue>]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        let extra_keys = records.iter().flat_map(|record| record.keys());
        for name in fields.iter().chain(extra_keys) {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|record| record.get(&name).map(Value::from_json).unwrap_or(Value::Null))
                    .collect();
                Column::new(name, values)
            })
            .collect();

        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|col| col.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|col| col.name.as_str())
    }

    /// Replace the cells of an existing column, keeping its position.
    pub fn replace_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows {
            return Err(Error::InvalidBatch(format!(
                "replacement for {name} has {} rows, expected {}",
                values.len(),
                self.rows
            )));
        }
        let column = self
            .column_mut(name)
            .ok_or_else(|| Error::InvalidBatch(format!("unknown column: {name}")))?;
        column.values = values;
        column.declared = None;
        Ok(())
    }

    /// Replace the cells of a column that was converted to `kind`.
    pub fn replace_column_as(&mut self, name: &str, values: Vec<Value>, kind: ValueKind) -> Result<()> {
        self.replace_column(name, values)?;
        if let Some(column) = self.column_mut(name) {
            column.declared = Some(kind);
        }
        Ok(())
    }

    /// Drop a column if present.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|col| col.name == name)?;
        let removed = self.columns.remove(index);
        if self.columns.is_empty() {
            self.rows = 0;
        }
        Some(removed)
    }

    /// Cell at `row` in `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|col| col.values.get(row))
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Append the rows of another batch with the same column set.
    pub fn append(&mut self, other: Batch) -> Result<()> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }

        if other.column_count() != self.columns.len() {
            return Err(Error::InvalidBatch(
                "appended batch has a different column set".to_string(),
            ));
        }
        if let Some(missing) = self.columns.iter().find(|col| !other.has_column(&col.name)) {
            return Err(Error::InvalidBatch(format!(
                "appended batch is missing column {}",
                missing.name
            )));
        }

        let mut other = other;
        for column in &mut self.columns {
            if let Some(incoming) = other.column_mut(&column.name) {
                column.values.append(&mut incoming.values);
            }
        }
        self.rows += other.rows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn runtime_type_tracks_dominant_kind() {
        let ints = Column::new("a", vec![Value::Int(1), Value::Null, Value::Int(3)]);
        assert_eq!(ints.runtime_type(), "int64");

        let widened = Column::new("b", vec![Value::Int(1), Value::Float(2.5)]);
        assert_eq!(widened.runtime_type(), "float64");

        let mixed = Column::new("c", vec![Value::Int(1), Value::Text("x".into())]);
        assert_eq!(mixed.runtime_type(), "object");

        let empty = Column::new("d", vec![Value::Null, Value::Null]);
        assert_eq!(empty.runtime_type(), NULL_DESCRIPTOR);
    }

    #[test]
    fn declared_kind_covers_all_null_columns() {
        let cost = Column::new("cost", vec![Value::Null, Value::Null]).with_declared(ValueKind::Float);
        assert_eq!(cost.runtime_type(), "float64");

        let ints = Column::new("n", vec![Value::Int(1)]).with_declared(ValueKind::Float);
        assert_eq!(ints.runtime_type(), "int64");

        let mut batch = Batch::new(vec![Column::new("d", vec![Value::Text("bad".into())])])
            .expect("batch");
        batch
            .replace_column_as("d", vec![Value::Null], ValueKind::Timestamp)
            .expect("replace");
        assert_eq!(batch.column("d").map(Column::runtime_type), Some("datetime64[ns]"));

        batch.replace_column("d", vec![Value::Null]).expect("replace");
        assert_eq!(batch.column("d").map(Column::runtime_type), Some(NULL_DESCRIPTOR));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = Batch::new(vec![Column::new("a", vec![]), Column::new("a", vec![])])
            .expect_err("duplicate should fail");
        assert!(err.to_string().contains("duplicate column name: a"));
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Batch::new(vec![
            Column::new("a", vec![Value::Int(1)]),
            Column::new("b", vec![]),
        ])
        .expect_err("ragged should fail");
        assert!(err.to_string().contains("column b has 0 rows"));
    }

    #[test]
    fn json_records_keep_field_order_and_fill_nulls() {
        let fields = vec!["b".to_string(), "a".to_string()];
        let records = vec![
            record(json!({"a": 1, "b": "x"})),
            record(json!({"a": 2, "c": true})),
        ];

        let batch = Batch::from_json_records(&fields, &records).expect("batch");
        let names: Vec<&str> = batch.column_names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(batch.row_count(), 2);
        assert_eq!(batch.get(1, "b"), Some(&Value::Null));
        assert_eq!(batch.get(0, "c"), Some(&Value::Null));
        assert_eq!(batch.get(1, "a"), Some(&Value::Int(2)));
    }

    #[test]
    fn append_requires_matching_columns() {
        let mut left = Batch::from_rows(vec!["a".into()], vec![vec![Value::Int(1)]]).expect("left");
        let right = Batch::from_rows(vec!["a".into()], vec![vec![Value::Int(2)]]).expect("right");
        left.append(right).expect("append");
        assert_eq!(left.row_count(), 2);

        let other = Batch::from_rows(vec!["b".into()], vec![vec![Value::Int(3)]]).expect("other");
        assert!(left.append(other).is_err());
    }

    #[test]
    fn failed_append_leaves_batch_untouched() {
        let mut left = Batch::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Int(1), Value::Int(2)]],
        )
        .expect("left");
        let wider = Batch::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![Value::Int(3), Value::Int(4), Value::Int(5)]],
        )
        .expect("wider");
        let swapped = Batch::from_rows(
            vec!["a".into(), "c".into()],
            vec![vec![Value::Int(3), Value::Int(5)]],
        )
        .expect("swapped");

        assert!(matches!(left.append(wider), Err(Error::InvalidBatch(_))));
        assert!(matches!(left.append(swapped), Err(Error::InvalidBatch(_))));
        assert_eq!(left.row_count(), 1);
        for column in left.columns() {
            assert_eq!(column.values.len(), 1, "column {} changed", column.name);
        }
    }
}
