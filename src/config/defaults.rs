use super::*;

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_cell_voltage: 3.45,
            min_cell_voltage: 2.9,
            max_voltage_diff: 0.01,
        }
    }
}

impl Default for DbusConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::Auto,
            timeout_ms: 600,
            system_service: "com.victronenergy.system".to_string(),
            settings_service: "com.victronenergy.settings".to_string(),
            max_charge_voltage_path: "/Settings/SystemSetup/MaxChargeVoltage".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "com.victronenergy.optimized-cvl".to_string(),
            device_instance: 21,
            product_name: "CVL Optimizer".to_string(),
            connection: "Rust".to_string(),
            poll_interval_ms: 1000,
            battery_service: None,
            policy: PolicyConfig::default(),
            dbus: DbusConfig::default(),
            logging: LoggingConfig::default(),
            extra_paths: BTreeMap::new(),
        }
    }
}
