use cvl_optimizer::config::{BusKind, Config};
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("cvl_optimizer.yaml");

    let mut cfg = Config::default();
    cfg.battery_service = Some("com.victronenergy.battery.ttyUSB0".to_string());
    cfg.policy.max_cell_voltage = 3.50;
    cfg.dbus.bus = BusKind::Session;
    cfg.logging.file = Some(path.with_extension("log").to_string_lossy().to_string());
    cfg.extra_paths
        .insert("/Custom/Offset".to_string(), serde_json::json!(0.05));

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.battery_service, cfg.battery_service);
    assert_eq!(loaded.policy.max_cell_voltage, 3.50);
    assert_eq!(loaded.dbus.bus, BusKind::Session);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert_eq!(
        loaded.extra_paths.get("/Custom/Offset"),
        Some(&serde_json::json!(0.05))
    );
}

#[test]
fn partial_yaml_keeps_defaults() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("partial.yaml");
    fs::write(
        &path,
        "poll_interval_ms: 2000\npolicy:\n  max_cell_voltage: 3.40\ndbus:\n  bus: system\n",
    )
    .unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.poll_interval_ms, 2000);
    assert_eq!(cfg.policy.max_cell_voltage, 3.40);
    assert_eq!(cfg.policy.max_voltage_diff, 0.01);
    assert_eq!(cfg.dbus.bus, BusKind::System);
    assert_eq!(cfg.dbus.timeout_ms, 600);
    assert_eq!(cfg.service_name, "com.victronenergy.optimized-cvl");
    assert!(cfg.validate().is_ok());
}

#[test]
fn malformed_yaml_is_an_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("broken.yaml");
    fs::write(&path, "policy: [not, a, map\n").unwrap();
    assert!(Config::from_file(&path).is_err());
    assert!(Config::from_file(tmp_dir.path().join("absent.yaml")).is_err());
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    assert!(cfg.validate().is_ok());

    cfg.service_name.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.dbus.timeout_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.policy.max_voltage_diff = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.policy.max_cell_voltage = f64::NAN;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.policy.min_cell_voltage = 3.45;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.battery_service = Some("  ".to_string());
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.extra_paths
        .insert("Custom/NoSlash".to_string(), serde_json::json!(1));
    assert!(cfg.validate().is_err());
}
