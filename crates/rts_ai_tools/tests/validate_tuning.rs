//! Tuning file validation against real files.

use std::io::Write;

use rts_ai_tools::validate::{validate_tuning_file, ValidateError};

fn write_tuning(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_tuning("(guard_enemy_scan_rate: 10, guard_chase_unit_frames: 450)");
    let tuning = validate_tuning_file(file.path()).unwrap();
    assert_eq!(tuning.guard_enemy_scan_rate, 10);
    assert_eq!(tuning.guard_chase_unit_frames, 450);
    assert_eq!(tuning.max_transitions_per_tick, 20);
}

#[test]
fn test_zero_cap_is_rejected() {
    let file = write_tuning("(max_transitions_per_tick: 0)");
    assert!(matches!(
        validate_tuning_file(file.path()),
        Err(ValidateError::Tuning(_))
    ));
}

#[test]
fn test_garbage_is_rejected() {
    let file = write_tuning("this is not ron");
    assert!(matches!(
        validate_tuning_file(file.path()),
        Err(ValidateError::Tuning(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.ron");
    assert!(matches!(
        validate_tuning_file(&missing),
        Err(ValidateError::Io { .. })
    ));
}
