//! Paths exported on the optimizer's own service

use crate::config::Config;
use crate::dbus::format_text_value;
use crate::error::Result;
use crate::gateway::{PathOptions, TelemetryGateway, TextFormatter};
use crate::telemetry::paths;

/// Display unit appended by `GetText`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    Percent,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Percent => "%",
        }
    }

    pub fn formatter(self) -> TextFormatter {
        match self {
            Unit::Volt => format_volts,
            Unit::Percent => format_percent,
        }
    }
}

fn with_unit(value: &serde_json::Value, unit: Unit) -> String {
    if value.is_null() {
        return String::new();
    }
    format!("{}{}", format_text_value(value), unit.suffix())
}

fn format_volts(_path: &str, value: &serde_json::Value) -> String {
    with_unit(value, Unit::Volt)
}

fn format_percent(_path: &str, value: &serde_json::Value) -> String {
    with_unit(value, Unit::Percent)
}

/// Battery values mirrored every tick
pub const MIRROR_PATHS: [(&str, Option<Unit>); 9] = [
    (paths::SOC, Some(Unit::Percent)),
    (paths::DC_VOLTAGE, Some(Unit::Volt)),
    (paths::ALLOW_TO_CHARGE, None),
    (paths::ALLOW_TO_DISCHARGE, None),
    (paths::INFO_MAX_CHARGE_VOLTAGE, Some(Unit::Volt)),
    (paths::MAX_CELL_VOLTAGE, Some(Unit::Volt)),
    (paths::MIN_CELL_VOLTAGE, Some(Unit::Volt)),
    (paths::VOLTAGE_DIFF, Some(Unit::Volt)),
    (paths::CELLS_PER_BATTERY, None),
];

/// Management and identity values, fixed for the life of the process
pub fn identity_paths(config: &Config) -> Vec<(&'static str, serde_json::Value)> {
    vec![
        ("/Mgmt/ProcessName", serde_json::json!(env!("CARGO_PKG_NAME"))),
        ("/Mgmt/ProcessVersion", serde_json::json!(env!("APP_VERSION"))),
        ("/Mgmt/Connection", serde_json::json!(config.connection)),
        ("/DeviceInstance", serde_json::json!(config.device_instance)),
        ("/ProductName", serde_json::json!(config.product_name)),
        ("/FirmwareVersion", serde_json::json!(0)),
        ("/HardwareVersion", serde_json::json!(0)),
        ("/Connected", serde_json::json!(1)),
        ("/ErrorCode", serde_json::json!(0)),
    ]
}

/// Register identity, mirror and configured extra paths on `gateway`
pub async fn register_service_paths<G>(gateway: &mut G, config: &Config) -> Result<()>
where
    G: TelemetryGateway + ?Sized,
{
    for (path, value) in identity_paths(config) {
        gateway
            .register_path(path, value, PathOptions::read_only())
            .await?;
    }
    for (path, unit) in MIRROR_PATHS {
        gateway
            .register_path(
                path,
                serde_json::Value::Null,
                PathOptions::read_only().with_formatter(unit.map(Unit::formatter)),
            )
            .await?;
    }
    for (path, initial) in &config.extra_paths {
        gateway
            .register_path(path, initial.clone(), PathOptions::writable_logged())
            .await?;
    }
    Ok(())
}
