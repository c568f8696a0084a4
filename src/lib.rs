//! # CVL Optimizer - Charge Voltage Limit control for Victron Venus OS
//!
//! Reads cell-level telemetry from the active battery service once per
//! interval, decides a charge voltage limit (CVL) that keeps the highest cell
//! near its target while the balancer catches up, and writes it to the
//! system settings.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `error`: Error type and failure classification
//! - `gateway`: Read/write interface to the telemetry bus
//! - `dbus`: zbus implementation of the gateway and exported path tree
//! - `telemetry`: Per-tick battery snapshot
//! - `policy`: Ordered CVL rule list
//! - `exports`: Identity and mirrored paths on our own service
//! - `controller`: The periodic read, decide, write loop

pub mod config;
pub mod controller;
pub mod dbus;
pub mod error;
pub mod exports;
pub mod gateway;
pub mod logging;
pub mod policy;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use controller::{CvlController, TickOutcome, TickStats};
pub use error::{CvlError, FailureKind, Result};
pub use gateway::{MemoryGateway, PathOptions, TelemetryGateway};
pub use policy::{CvlDecision, CvlRule, PolicyConstants, PolicyInputs};
pub use telemetry::TelemetrySnapshot;
