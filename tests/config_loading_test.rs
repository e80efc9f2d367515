//! Layered configuration: defaults, TOML file, environment.

use std::fs;

use confocal_daq::config::{LogFormat, Settings};
use confocal_daq::hardware::MockMadlib;
use confocal_daq::nanodrive::{AxisId, NanoDrive, ReadRate};
use confocal_daq::DaqError;
use serial_test::serial;
use tempfile::TempDir;

const LAB_CONFIG: &str = r#"
[application]
log_level = "debug"
log_format = "json"

[nanodrive]
serial = 2849
axis = "z"
read_rate_ms = 0.5
num_datapoints = 100

[scan]
point_a = { x = 5.0, y = 5.0 }
point_b = { x = 15.0, y = 25.0 }
resolution_um = 0.5
"#;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("confocal.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let (_dir, path) = write_config(LAB_CONFIG);
    let settings = Settings::load(Some(&path)).unwrap();

    assert_eq!(settings.application.log_level, "debug");
    assert_eq!(settings.application.log_format, LogFormat::Json);
    assert_eq!(settings.nanodrive.serial, 2849);
    assert_eq!(settings.nanodrive.axis, "z");
    assert_eq!(settings.nanodrive.num_datapoints, 100);
    // untouched keys keep their defaults
    assert_eq!(settings.nanodrive.load_rate_ms, 2.0);
    assert_eq!(settings.scan.time_per_point_ms, 0.5);
    assert_eq!(settings.scan.point_b.y, 25.0);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let (_dir, path) = write_config(LAB_CONFIG);
    std::env::set_var("CONFOCAL_NANODRIVE__SERIAL", "2850");
    std::env::set_var("CONFOCAL_SCAN__RESOLUTION_UM", "0.25");
    let result = Settings::load(Some(&path));
    std::env::remove_var("CONFOCAL_NANODRIVE__SERIAL");
    std::env::remove_var("CONFOCAL_SCAN__RESOLUTION_UM");

    let settings = result.unwrap();
    assert_eq!(settings.nanodrive.serial, 2850);
    assert_eq!(settings.scan.resolution_um, 0.25);
    assert_eq!(settings.nanodrive.axis, "z");
}

#[test]
#[serial]
fn test_illegal_rate_in_file_is_rejected() {
    let (_dir, path) = write_config("[nanodrive]\nread_rate_ms = 3.0\n");
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, DaqError::Configuration(msg) if msg.contains("read_rate_ms")));
}

#[test]
#[serial]
fn test_wrong_type_is_a_parse_error() {
    let (_dir, path) = write_config("[nanodrive]\nserial = \"lab\"\n");
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, DaqError::Config(_)));
}

#[test]
#[serial]
fn test_loaded_settings_drive_the_stage() {
    let (_dir, path) = write_config(LAB_CONFIG);
    let settings = Settings::load(Some(&path)).unwrap();

    let stage = NanoDrive::from_config(
        MockMadlib::with_serial(settings.nanodrive.serial),
        &settings.nanodrive,
    )
    .unwrap();

    assert_eq!(stage.serial(), 2849);
    assert_eq!(stage.settings().axis, AxisId::Z);
    assert_eq!(stage.settings().read_rate, ReadRate::Ms0_5);
    assert_eq!(stage.settings().num_datapoints, 100);
}

#[test]
#[serial]
fn test_scan_grid_too_fine_is_rejected_at_load() {
    let (_dir, path) = write_config("[scan]\nresolution_um = 1e-12\n");
    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, DaqError::Configuration(msg) if msg.contains("lines")));
}
