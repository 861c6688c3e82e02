use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::types::{CanonicalType, normalize};

/// Column name to canonical type.
///
/// Built fresh for every batch and treated as a value: there is no way to
/// mutate a map after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap(BTreeMap<String, CanonicalType>);

impl SchemaMap {
    /// Build an expected schema from persisted `column -> label` pairs.
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        labels
            .into_iter()
            .map(|(column, label)| (column.clone(), CanonicalType::from_label(label)))
            .collect()
    }

    pub fn get(&self, column: &str) -> Option<&CanonicalType> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column names in lexicographic order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CanonicalType)> {
        self.0.iter().map(|(name, canonical)| (name.as_str(), canonical))
    }

    /// Persistable `column -> label` view of the whole map.
    pub fn to_labels(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(name, canonical)| (name.clone(), canonical.label().to_string()))
            .collect()
    }

    /// Persistable labels restricted to `columns`; unknown names are skipped.
    pub fn labels_for<S: AsRef<str>>(&self, columns: &[S]) -> BTreeMap<String, String> {
        columns
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.0
                    .get(name)
                    .map(|canonical| (name.to_string(), canonical.label().to_string()))
            })
            .collect()
    }
}

impl FromIterator<(String, CanonicalType)> for SchemaMap {
    fn from_iter<T: IntoIterator<Item = (String, CanonicalType)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Compute the canonical schema of a batch, one entry per column.
///
/// Columns without any non-null cell are included and infer
/// `Unknown("null")`.
pub fn extract_schema(batch: &Batch) -> SchemaMap {
    batch
        .columns()
        .iter()
        .map(|column| (column.name.clone(), normalize(column.runtime_type())))
        .collect()
}
