//! Battery telemetry captured once per tick
//!
//! A [`TelemetrySnapshot`] is built from nine sequential reads on the battery
//! service. Values feeding the policy must be valid finite numbers; the
//! remaining ones are only mirrored and may be invalid (`null`) on the bus.

use crate::error::{CvlError, Result};
use crate::gateway::TelemetryGateway;

/// Battery service paths read every tick
pub mod paths {
    pub const INFO_MAX_CHARGE_VOLTAGE: &str = "/Info/MaxChargeVoltage";
    pub const MAX_CELL_VOLTAGE: &str = "/System/MaxCellVoltage";
    pub const MIN_CELL_VOLTAGE: &str = "/System/MinCellVoltage";
    pub const VOLTAGE_DIFF: &str = "/Voltages/Diff";
    pub const SOC: &str = "/Soc";
    pub const ALLOW_TO_CHARGE: &str = "/Io/AllowToCharge";
    pub const ALLOW_TO_DISCHARGE: &str = "/Io/AllowToDischarge";
    pub const DC_VOLTAGE: &str = "/Dc/0/Voltage";
    pub const CELLS_PER_BATTERY: &str = "/System/NrOfCellsPerBattery";

    /// Path on the system service naming the active battery service
    pub const BATTERY_SERVICE: &str = "/Dc/Battery/BatteryService";
}

/// Immutable view of the battery at the start of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Highest cell voltage in volts
    pub max_cell_voltage: f64,
    /// Lowest cell voltage in volts
    pub min_cell_voltage: f64,
    /// Measured pack voltage in volts
    pub bus_voltage: f64,
    /// State of charge in percent
    pub soc: Option<f64>,
    pub allow_to_charge: Option<bool>,
    pub allow_to_discharge: Option<bool>,
    /// Series cell count, always positive
    pub cells_per_battery: u32,
    /// Charge voltage limit requested by the BMS itself
    pub info_max_charge_voltage: Option<f64>,
    /// Spread between highest and lowest cell
    pub voltage_diff: Option<f64>,
}

impl TelemetrySnapshot {
    /// Read all telemetry values from `service`.
    ///
    /// The first failing read aborts the snapshot.
    pub async fn read<G>(gateway: &G, service: &str) -> Result<Self>
    where
        G: TelemetryGateway + ?Sized,
    {
        let info_max_charge_voltage = optional_f64(
            paths::INFO_MAX_CHARGE_VOLTAGE,
            &gateway
                .read_value(service, paths::INFO_MAX_CHARGE_VOLTAGE)
                .await?,
        )?;
        let max_cell_voltage = required_f64(
            paths::MAX_CELL_VOLTAGE,
            &gateway.read_value(service, paths::MAX_CELL_VOLTAGE).await?,
        )?;
        let min_cell_voltage = required_f64(
            paths::MIN_CELL_VOLTAGE,
            &gateway.read_value(service, paths::MIN_CELL_VOLTAGE).await?,
        )?;
        let voltage_diff = optional_f64(
            paths::VOLTAGE_DIFF,
            &gateway.read_value(service, paths::VOLTAGE_DIFF).await?,
        )?;
        let soc = optional_f64(paths::SOC, &gateway.read_value(service, paths::SOC).await?)?;
        let allow_to_charge = optional_bool(
            paths::ALLOW_TO_CHARGE,
            &gateway.read_value(service, paths::ALLOW_TO_CHARGE).await?,
        )?;
        let allow_to_discharge = optional_bool(
            paths::ALLOW_TO_DISCHARGE,
            &gateway.read_value(service, paths::ALLOW_TO_DISCHARGE).await?,
        )?;
        let bus_voltage = required_f64(
            paths::DC_VOLTAGE,
            &gateway.read_value(service, paths::DC_VOLTAGE).await?,
        )?;
        let cells_per_battery = cell_count(
            paths::CELLS_PER_BATTERY,
            &gateway.read_value(service, paths::CELLS_PER_BATTERY).await?,
        )?;

        Ok(Self {
            max_cell_voltage,
            min_cell_voltage,
            bus_voltage,
            soc,
            allow_to_charge,
            allow_to_discharge,
            cells_per_battery,
            info_max_charge_voltage,
            voltage_diff,
        })
    }

    /// Values to mirror onto our own service, keyed by local path
    pub fn mirror_updates(&self) -> Vec<(&'static str, serde_json::Value)> {
        vec![
            (
                paths::INFO_MAX_CHARGE_VOLTAGE,
                serde_json::json!(self.info_max_charge_voltage),
            ),
            (
                paths::MAX_CELL_VOLTAGE,
                serde_json::json!(self.max_cell_voltage),
            ),
            (
                paths::MIN_CELL_VOLTAGE,
                serde_json::json!(self.min_cell_voltage),
            ),
            (paths::VOLTAGE_DIFF, serde_json::json!(self.voltage_diff)),
            (paths::SOC, serde_json::json!(self.soc)),
            (
                paths::ALLOW_TO_CHARGE,
                serde_json::json!(self.allow_to_charge.map(u8::from)),
            ),
            (
                paths::ALLOW_TO_DISCHARGE,
                serde_json::json!(self.allow_to_discharge.map(u8::from)),
            ),
            (paths::DC_VOLTAGE, serde_json::json!(self.bus_voltage)),
            (
                paths::CELLS_PER_BATTERY,
                serde_json::json!(self.cells_per_battery),
            ),
        ]
    }
}

/// Numeric value that must be present and finite
pub fn required_f64(path: &str, value: &serde_json::Value) -> Result<f64> {
    optional_f64(path, value)?.ok_or_else(|| CvlError::missing(path))
}

/// Numeric value where an invalid bus value maps to `None`
pub fn optional_f64(path: &str, value: &serde_json::Value) -> Result<Option<f64>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => Ok(Some(f)),
            _ => Err(CvlError::invalid(path, "number is not finite")),
        },
        other => Err(CvlError::invalid(
            path.to_string(),
            format!("expected a number, got {}", other),
        )),
    }
}

/// Flag published either as a bool or as 0/1
pub fn optional_bool(path: &str, value: &serde_json::Value) -> Result<Option<bool>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Bool(b) => Ok(Some(*b)),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(Some(false)),
            Some(f) if f == 1.0 => Ok(Some(true)),
            _ => Err(CvlError::invalid(
                path.to_string(),
                format!("expected 0 or 1, got {}", n),
            )),
        },
        other => Err(CvlError::invalid(
            path.to_string(),
            format!("expected a flag, got {}", other),
        )),
    }
}

/// Series cell count; must be a positive whole number
pub fn cell_count(path: &str, value: &serde_json::Value) -> Result<u32> {
    let raw = required_f64(path, value)?;
    if raw.fract() != 0.0 {
        return Err(CvlError::invalid(
            path.to_string(),
            format!("cell count {} is not a whole number", raw),
        ));
    }
    if raw < 1.0 || raw > f64::from(u32::MAX) {
        return Err(CvlError::invalid(
            path.to_string(),
            format!("cell count {} is out of range", raw),
        ));
    }
    Ok(raw as u32)
}
