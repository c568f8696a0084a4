//! Narrow read/write interface to the telemetry bus
//!
//! The controller only ever talks to the bus through [`TelemetryGateway`].
//! [`crate::dbus::DbusService`] implements it over a long-lived zbus
//! connection; [`MemoryGateway`] keeps everything in process.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::logging::get_logger;

mod memory;

pub use memory::MemoryGateway;

/// Renders a path value for `GetText`; never used for computation
pub type TextFormatter = fn(&str, &serde_json::Value) -> String;

/// Invoked when an external actor sets a writable path. Returning `false`
/// rejects the write.
pub type ChangeCallback = Arc<dyn Fn(&str, &serde_json::Value) -> bool + Send + Sync>;

/// Registration options for a local path
#[derive(Clone, Default)]
pub struct PathOptions {
    pub writable: bool,
    pub on_change: Option<ChangeCallback>,
    pub formatter: Option<TextFormatter>,
}

impl PathOptions {
    /// Read-only path without a formatter
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Writable path accepting every external change and logging it
    pub fn writable_logged() -> Self {
        Self {
            writable: true,
            on_change: Some(log_and_accept()),
            formatter: None,
        }
    }

    pub fn with_formatter(mut self, formatter: Option<TextFormatter>) -> Self {
        self.formatter = formatter;
        self
    }
}

impl std::fmt::Debug for PathOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathOptions")
            .field("writable", &self.writable)
            .field("on_change", &self.on_change.is_some())
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Change callback that logs the new value and always accepts it
pub fn log_and_accept() -> ChangeCallback {
    let logger = get_logger("gateway");
    Arc::new(move |path: &str, value: &serde_json::Value| {
        logger.info(&format!("someone else updated {} to {}", path, value));
        true
    })
}

/// Access to remote values plus our own exported paths
#[async_trait]
pub trait TelemetryGateway: Send + Sync {
    /// Point-in-time read of `path` on `service`
    async fn read_value(&self, service: &str, path: &str) -> Result<serde_json::Value>;

    /// Point-in-time write of `path` on `service`
    async fn write_value(&self, service: &str, path: &str, value: serde_json::Value)
    -> Result<()>;

    /// Export a local path with an initial value
    async fn register_path(
        &mut self,
        path: &str,
        initial: serde_json::Value,
        options: PathOptions,
    ) -> Result<()>;

    /// Update a local path, notifying observers when the value changed
    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()>;
}
