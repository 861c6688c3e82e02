use chrono::NaiveDate;
use driftwatch_core::{
    Batch, CanonicalType, Column, ColumnDriftDetector, SchemaMap, SchemaValidator, Severity,
    Value, extract_schema,
};

fn sample(canonical: &CanonicalType) -> Value {
    match canonical {
        CanonicalType::Integer => Value::Int(7),
        CanonicalType::Numeric => Value::Float(7.5),
        CanonicalType::Text => Value::Text("seven".to_string()),
        CanonicalType::Boolean => Value::Bool(true),
        CanonicalType::Date => Value::Date(
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
        ),
        CanonicalType::Timestamp => Value::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .and_then(|date| date.and_hms_opt(14, 30, 0))
                .expect("valid timestamp"),
        ),
        CanonicalType::Unknown(_) => Value::Null,
    }
}

fn batch(columns: &[(&str, CanonicalType)]) -> Batch {
    Batch::new(
        columns
            .iter()
            .map(|(name, canonical)| Column::new(*name, vec![sample(canonical), Value::Null]))
            .collect(),
    )
    .expect("build batch")
}

fn schema(columns: &[(&str, CanonicalType)]) -> SchemaMap {
    columns
        .iter()
        .map(|(name, canonical)| (name.to_string(), canonical.clone()))
        .collect()
}

#[test]
fn scenario_removed_and_new_columns_are_critical() {
    let expected = schema(&[("a", CanonicalType::Integer), ("b", CanonicalType::Text)]);
    let current = batch(&[("a", CanonicalType::Integer), ("c", CanonicalType::Numeric)]);

    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&expected))
        .expect("non-strict validation succeeds");

    assert!(report.has_drift());
    assert_eq!(report.new_columns(), ["c"]);
    assert_eq!(report.removed_columns(), ["b"]);
    assert!(report.type_changes().is_empty());
    assert_eq!(report.severity(), Severity::Critical);
    assert_eq!(
        report.message(),
        "1 new column(s) added; 1 column(s) removed"
    );
}

#[test]
fn scenario_type_change_is_critical() {
    let expected = schema(&[("a", CanonicalType::Integer)]);
    let current = batch(&[("a", CanonicalType::Numeric)]);

    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&expected))
        .expect("validation");

    let change = report.type_changes().get("a").expect("type change for a");
    assert_eq!(change.old, CanonicalType::Integer);
    assert_eq!(change.new, CanonicalType::Numeric);
    assert!(report.new_columns().is_empty());
    assert!(report.removed_columns().is_empty());
    assert_eq!(report.severity(), Severity::Critical);
}

#[test]
fn scenario_added_column_is_warning() {
    let expected = schema(&[("a", CanonicalType::Integer)]);
    let current = batch(&[("a", CanonicalType::Integer), ("b", CanonicalType::Text)]);

    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&expected))
        .expect("validation");

    assert_eq!(report.new_columns(), ["b"]);
    assert!(report.removed_columns().is_empty());
    assert!(report.type_changes().is_empty());
    assert_eq!(report.severity(), Severity::Warning);
}

#[test]
fn scenario_matching_schema_is_info() {
    let expected = schema(&[("a", CanonicalType::Integer)]);
    let current = batch(&[("a", CanonicalType::Integer)]);

    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&expected))
        .expect("validation");

    assert!(!report.has_drift());
    assert_eq!(report.severity(), Severity::Info);
    assert_eq!(report.message(), "Schema matches expected structure");
}

#[test]
fn scenario_no_baseline_lists_sorted_columns() {
    let current = batch(&[("y", CanonicalType::Date), ("x", CanonicalType::Text)]);

    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", None)
        .expect("validation");

    assert!(!report.has_drift());
    assert_eq!(report.new_columns(), ["x", "y"]);
    assert!(report.removed_columns().is_empty());
    assert!(report.type_changes().is_empty());
    assert_eq!(report.severity(), Severity::Info);
}

#[test]
fn scenario_strict_mode_fails_with_report() {
    let expected = schema(&[("a", CanonicalType::Integer), ("b", CanonicalType::Text)]);
    let current = batch(&[("a", CanonicalType::Integer), ("c", CanonicalType::Numeric)]);

    let lenient = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&expected))
        .expect("lenient validation");
    let err = ColumnDriftDetector::strict()
        .validate(&current, "permits", Some(&expected))
        .expect_err("strict validation should fail");

    assert_eq!(err.report(), &lenient);
    assert_eq!(
        err.to_string(),
        "Schema drift detected for permits in strict mode"
    );
}

#[test]
fn strict_mode_passes_without_drift() {
    let expected = schema(&[("a", CanonicalType::Integer)]);
    let current = batch(&[("a", CanonicalType::Integer)]);

    let detector = ColumnDriftDetector::with_strict_mode(true);
    assert!(detector.is_strict());
    assert!(detector.validate(&current, "permits", Some(&expected)).is_ok());
    assert!(detector.validate(&current, "permits", None).is_ok());
}

#[test]
fn empty_batch_removes_every_baseline_column() {
    let expected = schema(&[
        ("a", CanonicalType::Integer),
        ("b", CanonicalType::Text),
        ("c", CanonicalType::Date),
    ]);

    let report = ColumnDriftDetector::new()
        .validate(&Batch::empty(), "permits", Some(&expected))
        .expect("validation");

    assert_eq!(report.removed_columns(), ["a", "b", "c"]);
    assert!(report.new_columns().is_empty());
    assert!(report.type_changes().is_empty());
    assert_eq!(report.severity(), Severity::Critical);
}

#[test]
fn empty_baseline_is_treated_as_absent() {
    let current = batch(&[("a", CanonicalType::Integer)]);
    let report = ColumnDriftDetector::new()
        .validate(&current, "permits", Some(&SchemaMap::default()))
        .expect("validation");

    assert!(!report.has_drift());
    assert_eq!(report.new_columns(), ["a"]);
    assert_eq!(report.severity(), Severity::Info);
}

#[test]
fn unknown_types_diff_by_raw_descriptor() {
    let detector = ColumnDriftDetector::new();
    let expected = schema(&[("a", CanonicalType::Unknown("category".to_string()))]);
    let same = schema(&[("a", CanonicalType::Unknown("category".to_string()))]);
    let different = schema(&[("a", CanonicalType::Unknown("complex128".to_string()))]);

    assert!(!detector.classify("t", &same, Some(&expected)).has_drift());

    let report = detector.classify("t", &different, Some(&expected));
    let change = report.type_changes().get("a").expect("type change");
    assert_eq!(change.old.label(), "category");
    assert_eq!(change.new.label(), "complex128");
    assert_eq!(report.severity(), Severity::Critical);
}

#[test]
fn validation_is_idempotent() {
    let expected = schema(&[("a", CanonicalType::Integer), ("b", CanonicalType::Text)]);
    let current = batch(&[
        ("a", CanonicalType::Numeric),
        ("c", CanonicalType::Boolean),
        ("d", CanonicalType::Timestamp),
    ]);

    let detector = ColumnDriftDetector::new();
    let first = detector
        .validate(&current, "permits", Some(&expected))
        .expect("first");
    let second = detector
        .validate(&current, "permits", Some(&expected))
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize first"),
        serde_json::to_string(&second).expect("serialize second")
    );
}

#[test]
fn new_and_removed_are_inverse_under_exchange() {
    let detector = ColumnDriftDetector::new();
    let baseline = schema(&[("a", CanonicalType::Integer)]);
    let with_x = batch(&[("a", CanonicalType::Integer), ("x", CanonicalType::Text)]);

    let forward = detector
        .validate(&with_x, "t", Some(&baseline))
        .expect("forward");
    assert_eq!(forward.new_columns(), ["x"]);

    let current_schema = extract_schema(&with_x);
    let without_x = batch(&[("a", CanonicalType::Integer)]);
    let backward = detector
        .validate(&without_x, "t", Some(&current_schema))
        .expect("backward");
    assert_eq!(backward.removed_columns(), ["x"]);
}

#[test]
fn severity_follows_diff_contents_and_lists_are_disjoint() {
    let detector = ColumnDriftDetector::new();
    let types = [
        CanonicalType::Integer,
        CanonicalType::Numeric,
        CanonicalType::Text,
    ];
    let names = ["a", "b", "c", "d"];

    // Every combination of presence/type for four columns on both sides.
    for expected_mask in 0..(4u32.pow(4)) {
        for current_mask in (0..(4u32.pow(4))).step_by(7) {
            let expected = mask_schema(expected_mask, &names, &types);
            let current = mask_schema(current_mask, &names, &types);
            let report = detector.classify("t", &current, Some(&expected));

            for name in report.new_columns() {
                assert!(!report.removed_columns().contains(name));
            }

            if expected.is_empty() {
                assert!(!report.has_drift());
                assert_eq!(report.severity(), Severity::Info);
                continue;
            }

            let expected_severity =
                if !report.removed_columns().is_empty() || !report.type_changes().is_empty() {
                    Severity::Critical
                } else if !report.new_columns().is_empty() {
                    Severity::Warning
                } else {
                    Severity::Info
                };
            assert_eq!(report.severity(), expected_severity);
            assert_eq!(
                report.has_drift(),
                !report.new_columns().is_empty()
                    || !report.removed_columns().is_empty()
                    || !report.type_changes().is_empty()
            );
        }
    }
}

fn mask_schema(mask: u32, names: &[&str], types: &[CanonicalType]) -> SchemaMap {
    names
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let slot = (mask / 4u32.pow(index as u32)) % 4;
            // Slot 0 means the column is absent.
            types
                .get(slot.checked_sub(1)? as usize)
                .map(|canonical| (name.to_string(), canonical.clone()))
        })
        .collect()
}
