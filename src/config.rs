//! Configuration management for the CVL optimizer
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every field has a default so the daemon runs
//! without any file present.

use crate::error::{CvlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Well-known D-Bus name requested for our own service
    pub service_name: String,

    /// Device instance published at `/DeviceInstance`
    pub device_instance: u32,

    /// Product name published at `/ProductName`
    pub product_name: String,

    /// Value published at `/Mgmt/Connection`
    pub connection: String,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Battery service to read telemetry from. When unset it is discovered
    /// from the system service's `/Dc/Battery/BatteryService`.
    pub battery_service: Option<String>,

    /// Charge voltage policy constants
    pub policy: PolicyConfig,

    /// D-Bus endpoints and timeouts
    pub dbus: DbusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Additional writable paths (path -> initial value)
    pub extra_paths: BTreeMap<String, serde_json::Value>,
}

/// Cell voltage envelope used by the CVL policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Target (full) cell voltage in volts
    pub max_cell_voltage: f64,

    /// Lower end of the cell envelope in volts; informational
    pub min_cell_voltage: f64,

    /// Charger regulation precision in volts (MPPTs resolve 10 mV)
    pub max_voltage_diff: f64,
}

/// Which bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Session bus when `DBUS_SESSION_BUS_ADDRESS` is set, otherwise system bus
    Auto,
    System,
    Session,
}

impl BusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BusKind::Auto => "auto",
            BusKind::System => "system",
            BusKind::Session => "session",
        }
    }
}

/// D-Bus endpoints used by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbusConfig {
    /// Bus selection
    pub bus: BusKind,

    /// Timeout for each remote GetValue/SetValue call in milliseconds
    pub timeout_ms: u64,

    /// Service exposing `/Dc/Battery/BatteryService`
    pub system_service: String,

    /// Service holding the charge voltage setting
    pub settings_service: String,

    /// Path of the charge voltage setting on `settings_service`
    pub max_charge_voltage_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level; falls back to `level`
    pub console_level: Option<String>,

    /// Optional file-specific level; falls back to `level`
    pub file_level: Option<String>,

    /// Directory or file path for rotated logs; console only when unset
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "cvl_optimizer.yaml",
            "/data/cvl_optimizer.yaml",
            "/etc/cvl-optimizer/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(CvlError::validation(
                "service_name",
                "Service name cannot be empty",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(CvlError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.dbus.timeout_ms == 0 {
            return Err(CvlError::validation(
                "dbus.timeout_ms",
                "Must be greater than 0",
            ));
        }

        for (field, value) in [
            ("dbus.system_service", &self.dbus.system_service),
            ("dbus.settings_service", &self.dbus.settings_service),
        ] {
            if value.trim().is_empty() {
                return Err(CvlError::validation(field, "Cannot be empty"));
            }
        }

        if !self.dbus.max_charge_voltage_path.starts_with('/') {
            return Err(CvlError::validation(
                "dbus.max_charge_voltage_path",
                "Must be an absolute object path",
            ));
        }

        if let Some(svc) = &self.battery_service {
            if svc.trim().is_empty() {
                return Err(CvlError::validation(
                    "battery_service",
                    "Cannot be empty when set",
                ));
            }
        }

        self.policy.validate()?;

        for path in self.extra_paths.keys() {
            if !path.starts_with('/') {
                return Err(CvlError::validation(
                    "extra_paths",
                    "Paths must start with '/'",
                ));
            }
        }

        Ok(())
    }
}

impl PolicyConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("policy.max_cell_voltage", self.max_cell_voltage),
            ("policy.min_cell_voltage", self.min_cell_voltage),
            ("policy.max_voltage_diff", self.max_voltage_diff),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CvlError::validation(field, "Must be a positive number"));
            }
        }

        if self.min_cell_voltage >= self.max_cell_voltage {
            return Err(CvlError::validation(
                "policy.min_cell_voltage",
                "Must be below policy.max_cell_voltage",
            ));
        }

        Ok(())
    }
}
