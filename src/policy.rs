//! Charge voltage limit policy
//!
//! The limit is produced by an ordered list of rules. Every rule whose
//! condition holds overwrites the tentative value, so a later rule always wins
//! over an earlier one. [`CvlRule::SafetyClamp`] is last and therefore
//! overrides everything when the highest cell is more than `max_voltage_diff`
//! above target.

use crate::config::PolicyConfig;
use crate::error::{CvlError, Result};
use crate::telemetry::TelemetrySnapshot;

/// Cell voltage envelope, fixed for the lifetime of a controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConstants {
    /// Target cell voltage (C)
    pub max_cell_voltage: f64,
    /// Lower end of the envelope; not used by the rules
    pub min_cell_voltage: f64,
    /// Regulation precision (d)
    pub max_voltage_diff: f64,
}

impl Default for PolicyConstants {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for PolicyConstants {
    fn from(cfg: &PolicyConfig) -> Self {
        Self {
            max_cell_voltage: cfg.max_cell_voltage,
            min_cell_voltage: cfg.min_cell_voltage,
            max_voltage_diff: cfg.max_voltage_diff,
        }
    }
}

/// The snapshot fields the rules look at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyInputs {
    pub max_cell_voltage: f64,
    pub min_cell_voltage: f64,
    pub bus_voltage: f64,
    pub cells_per_battery: u32,
}

impl From<&TelemetrySnapshot> for PolicyInputs {
    fn from(s: &TelemetrySnapshot) -> Self {
        Self {
            max_cell_voltage: s.max_cell_voltage,
            min_cell_voltage: s.min_cell_voltage,
            bus_voltage: s.bus_voltage,
            cells_per_battery: s.cells_per_battery,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvlRule {
    /// Highest cell at or below target: nominal pack voltage plus d
    BelowTarget,
    /// Highest cell above target, lowest still below: bus voltage plus d
    Balancing,
    /// Every cell at or above target: hold nominal pack voltage
    HoldNominal,
    /// Highest cell beyond target plus d: freeze at bus voltage
    SafetyClamp,
}

/// Evaluation order; later entries override earlier ones
pub const RULES: [CvlRule; 4] = [
    CvlRule::BelowTarget,
    CvlRule::Balancing,
    CvlRule::HoldNominal,
    CvlRule::SafetyClamp,
];

impl CvlRule {
    pub fn as_str(self) -> &'static str {
        match self {
            CvlRule::BelowTarget => "below_target",
            CvlRule::Balancing => "balancing",
            CvlRule::HoldNominal => "hold_nominal",
            CvlRule::SafetyClamp => "safety_clamp",
        }
    }

    /// Limit proposed by this rule, or `None` when its condition does not hold
    fn apply(self, k: &PolicyConstants, x: &PolicyInputs, max_battery_voltage: f64) -> Option<f64> {
        let c = k.max_cell_voltage;
        let d = k.max_voltage_diff;
        let mcv = x.max_cell_voltage;
        match self {
            CvlRule::BelowTarget => (mcv <= c).then_some(max_battery_voltage + d),
            CvlRule::Balancing => {
                (mcv > c && x.min_cell_voltage < c).then_some(x.bus_voltage + d)
            }
            CvlRule::HoldNominal => {
                (mcv > c && x.min_cell_voltage >= c).then_some(max_battery_voltage)
            }
            CvlRule::SafetyClamp => (mcv > c + d).then_some(x.bus_voltage),
        }
    }
}

impl std::fmt::Display for CvlRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CvlDecision {
    /// Limit rounded to two decimals; this is what gets published
    pub cvl: f64,
    /// Limit before rounding
    pub raw_cvl: f64,
    /// Rule that produced the final value
    pub rule: CvlRule,
    /// Nominal full pack voltage (C × cells)
    pub max_battery_voltage: f64,
}

impl PolicyConstants {
    /// Nominal full pack voltage for the given series cell count
    pub fn max_battery_voltage(&self, cells_per_battery: u32) -> Result<f64> {
        if cells_per_battery == 0 {
            return Err(CvlError::computation("cell count is zero"));
        }
        Ok(self.max_cell_voltage * f64::from(cells_per_battery))
    }

    /// Run the ordered rule list over `inputs`
    pub fn evaluate(&self, inputs: &PolicyInputs) -> Result<CvlDecision> {
        let max_battery_voltage = self.max_battery_voltage(inputs.cells_per_battery)?;

        let mut tentative: Option<(f64, CvlRule)> = None;
        for rule in RULES {
            if let Some(v) = rule.apply(self, inputs, max_battery_voltage) {
                tentative = Some((v, rule));
            }
        }

        let (raw_cvl, rule) = tentative.ok_or_else(|| {
            CvlError::computation(format!(
                "no rule matched max_cell_voltage={} min_cell_voltage={}",
                inputs.max_cell_voltage, inputs.min_cell_voltage
            ))
        })?;

        let cvl = round_to_centivolts(raw_cvl);
        if !cvl.is_finite() {
            return Err(CvlError::computation(format!(
                "rule {} produced a non-finite limit",
                rule
            )));
        }

        Ok(CvlDecision {
            cvl,
            raw_cvl,
            rule,
            max_battery_voltage,
        })
    }
}

/// Round to two decimal places.
///
/// Rounds the exact binary value, ties to even, so a limit never ends up
/// above a reading like 54.125 that is stored exactly.
pub fn round_to_centivolts(v: f64) -> f64 {
    format!("{:.2}", v).parse::<f64>().unwrap_or(v)
}
