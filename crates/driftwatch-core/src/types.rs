use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical column type used to compare schemas independent of how the
/// source names its storage types.
///
/// Descriptors that match no rule are kept verbatim in `Unknown` so exotic
/// types stay visible in drift reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CanonicalType {
    Integer,
    Numeric,
    Text,
    Boolean,
    Timestamp,
    Date,
    Unknown(String),
}

/// Substring rules checked in order; the first match wins.
///
/// `datetime` must stay ahead of `date`.
const NORMALIZATION_RULES: [(&[&str], CanonicalType); 6] = [
    (&["int"], CanonicalType::Integer),
    (&["float"], CanonicalType::Numeric),
    (&["object", "string"], CanonicalType::Text),
    (&["bool"], CanonicalType::Boolean),
    (&["datetime"], CanonicalType::Timestamp),
    (&["date"], CanonicalType::Date),
];

/// Map a runtime type descriptor to its canonical type.
pub fn normalize(descriptor: &str) -> CanonicalType {
    NORMALIZATION_RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|pattern| descriptor.contains(pattern)))
        .map(|(_, canonical)| canonical.clone())
        .unwrap_or_else(|| CanonicalType::Unknown(descriptor.to_string()))
}

impl CanonicalType {
    /// Label persisted by schema stores and shown in reports.
    pub fn label(&self) -> &str {
        match self {
            CanonicalType::Integer => "integer",
            CanonicalType::Numeric => "numeric",
            CanonicalType::Text => "text",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Timestamp => "timestamp",
            CanonicalType::Date => "date",
            CanonicalType::Unknown(raw) => raw,
        }
    }

    /// Parse a persisted label back into a canonical type.
    ///
    /// This is the inverse of [`CanonicalType::label`], not a second pass of
    /// [`normalize`]: `"numeric"` is a label, not a runtime descriptor.
    pub fn from_label(label: &str) -> Self {
        match label {
            "integer" => CanonicalType::Integer,
            "numeric" => CanonicalType::Numeric,
            "text" => CanonicalType::Text,
            "boolean" => CanonicalType::Boolean,
            "timestamp" => CanonicalType::Timestamp,
            "date" => CanonicalType::Date,
            other => CanonicalType::Unknown(other.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CanonicalType::Unknown(_))
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for CanonicalType {
    fn from(value: String) -> Self {
        CanonicalType::from_label(&value)
    }
}

impl From<CanonicalType> for String {
    fn from(value: CanonicalType) -> Self {
        match value {
            CanonicalType::Unknown(raw) => raw,
            other => other.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_pandas_style_descriptors() {
        assert_eq!(normalize("int64"), CanonicalType::Integer);
        assert_eq!(normalize("float32"), CanonicalType::Numeric);
        assert_eq!(normalize("object"), CanonicalType::Text);
        assert_eq!(normalize("string"), CanonicalType::Text);
        assert_eq!(normalize("bool"), CanonicalType::Boolean);
        assert_eq!(normalize("datetime64[ns]"), CanonicalType::Timestamp);
        assert_eq!(normalize("date"), CanonicalType::Date);
    }

    #[test]
    fn datetime_wins_over_date() {
        assert_eq!(normalize("datetime64[ns, UTC]"), CanonicalType::Timestamp);
        assert_eq!(normalize("date_with_datetime"), CanonicalType::Timestamp);
    }

    #[test]
    fn earlier_rules_take_priority() {
        // "interval" contains "int" and the integer rule is checked first.
        assert_eq!(normalize("interval"), CanonicalType::Integer);
        assert_eq!(normalize("boolean_string"), CanonicalType::Text);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(normalize("Int32"), CanonicalType::Unknown("Int32".into()));
        assert_eq!(
            normalize("FLOAT"),
            CanonicalType::Unknown("FLOAT".to_string())
        );
    }

    #[test]
    fn unmapped_descriptors_are_preserved() {
        let canonical = normalize("category");
        assert_eq!(canonical, CanonicalType::Unknown("category".to_string()));
        assert_eq!(canonical.label(), "category");
        assert!(canonical.is_unknown());
    }

    #[test]
    fn labels_round_trip() {
        for canonical in [
            CanonicalType::Integer,
            CanonicalType::Numeric,
            CanonicalType::Text,
            CanonicalType::Boolean,
            CanonicalType::Timestamp,
            CanonicalType::Date,
            CanonicalType::Unknown("complex128".to_string()),
        ] {
            assert_eq!(CanonicalType::from_label(canonical.label()), canonical);
        }
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&CanonicalType::Numeric).expect("serialize");
        assert_eq!(json, "\"numeric\"");
        let parsed: CanonicalType = serde_json::from_str("\"timedelta64\"").expect("parse");
        assert_eq!(parsed, CanonicalType::Unknown("timedelta64".to_string()));
    }
}
