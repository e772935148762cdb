use chrono::DateTime;
use opc_data_logger::output::{format_value, format_values, Row, NOT_AVAILABLE};
use opc_data_logger::{PointSet, ReadResult};

fn ten_points() -> PointSet {
    PointSet::from_ids((1..=10).map(|i| format!("ns=1;s=Tag{i}")))
}

fn ten_values() -> Vec<ReadResult> {
    (1..=10).map(|i| ReadResult::Value(i as f64 * 10.0)).collect()
}

#[test]
fn row_for_ten_deterministic_values() {
    let ts = DateTime::parse_from_rfc3339("2025-09-01T22:47:15+00:00").unwrap();
    let row = Row::from_results(ts, &ten_points(), &ten_values());

    assert_eq!(
        row.fields().join(","),
        "2025-09-01 22:47:15,1756766835,10.0000,20.0000,30.0000,40.0000,50.0000,\
         60.0000,70.0000,80.0000,90.0000,100.0000"
    );
}

#[test]
fn failed_point_renders_sentinel_in_its_column_only() {
    let mut results = ten_values();
    results[2] = ReadResult::failed("BadNodeIdUnknown");

    let fields = format_values(&ten_points(), &results);
    assert_eq!(fields.len(), 10);
    assert_eq!(fields[2], NOT_AVAILABLE);
    for (i, field) in fields.iter().enumerate().filter(|(i, _)| *i != 2) {
        assert_eq!(field, &format!("{:.4}", (i + 1) as f64 * 10.0));
    }
}

#[test]
fn output_length_always_matches_point_count() {
    let points = ten_points();

    let short = format_values(&points, &ten_values()[..4]);
    assert_eq!(short.len(), 10);
    assert!(short[4..].iter().all(|f| f == NOT_AVAILABLE));
    assert_eq!(short[3], "40.0000");

    let mut long = ten_values();
    long.push(ReadResult::Value(999.0));
    let long = format_values(&points, &long);
    assert_eq!(long.len(), 10);
    assert_eq!(long[9], "100.0000");

    assert!(format_values(&points, &[]).iter().all(|f| f == NOT_AVAILABLE));
}

#[test]
fn successful_values_have_exactly_four_decimals() {
    for value in [0.0, -3.5, 1e-9, 123456.789_01, 2.00005] {
        let rendered = format_value(&ReadResult::Value(value));
        let (_, decimals) = rendered.split_once('.').unwrap();
        assert_eq!(decimals.len(), 4, "{rendered}");
    }
}

#[test]
fn non_finite_reading_is_not_available() {
    let results = vec![ReadResult::from(f64::NAN), ReadResult::from(2.0)];
    let points = PointSet::from_ids(["ns=1;s=A", "ns=1;s=B"]);
    assert_eq!(format_values(&points, &results), vec!["N/A", "2.0000"]);
}

#[test]
fn non_finite_value_variant_is_not_available() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert_eq!(format_value(&ReadResult::Value(value)), NOT_AVAILABLE);
    }

    let points = PointSet::from_ids(["ns=1;s=A", "ns=1;s=B", "ns=1;s=C"]);
    let results = vec![
        ReadResult::Value(1.0),
        ReadResult::Value(f64::NAN),
        ReadResult::Value(f64::INFINITY),
    ];
    assert_eq!(format_values(&points, &results), vec!["1.0000", "N/A", "N/A"]);
}
