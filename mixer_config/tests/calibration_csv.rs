use mixer_config::{CalibrationRow, PumpSide, load_calibration_csv, read_calibration_csv};
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_rows_with_strict_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    fs::write(&path, "ingredient,pump,ms_per_gram\n1,large,18\n1, small ,42\n7,large,20\n").unwrap();

    let rows = load_calibration_csv(&path).expect("load");
    assert_eq!(
        rows,
        vec![
            CalibrationRow { ingredient: 1, pump: PumpSide::Large, ms_per_gram: 18 },
            CalibrationRow { ingredient: 1, pump: PumpSide::Small, ms_per_gram: 42 },
            CalibrationRow { ingredient: 7, pump: PumpSide::Large, ms_per_gram: 20 },
        ]
    );
}

#[test]
fn rejects_wrong_headers() {
    let err = read_calibration_csv("id,pump,rate\n1,large,18\n".as_bytes()).unwrap_err();
    assert!(err.to_string().contains("must have headers"));
}

#[test]
fn rejects_duplicate_pump_rows() {
    let csv = "ingredient,pump,ms_per_gram\n3,small,10\n3,small,12\n";
    let err = read_calibration_csv(csv.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("duplicate calibration for ingredient 3"));
}

#[test]
fn rejects_unknown_pump_side() {
    let csv = "ingredient,pump,ms_per_gram\n3,medium,10\n";
    let err = read_calibration_csv(csv.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("invalid CSV row 2"));
}

#[test]
fn missing_file_is_reported_with_path() {
    let dir = tempdir().unwrap();
    let err = load_calibration_csv(&dir.path().join("nope.csv")).unwrap_err();
    assert!(err.to_string().contains("nope.csv"));
}
