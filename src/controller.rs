//! Periodic read, decide, write loop
//!
//! One tick reads a [`TelemetrySnapshot`] from the battery service, runs the
//! policy, writes the resulting limit to the settings service and mirrors the
//! snapshot onto our own paths. A failing tick writes nothing and never stops
//! the loop.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::config::Config;
use crate::error::{CvlError, FailureKind, Result};
use crate::gateway::TelemetryGateway;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::policy::{CvlDecision, CvlRule, PolicyConstants, PolicyInputs};
use crate::telemetry::{TelemetrySnapshot, paths};

/// Counters kept for logging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub total_ticks: u64,
    pub failed_ticks: u64,
    pub consecutive_failures: u64,
    pub last_cvl: Option<f64>,
    pub last_rule: Option<CvlRule>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureKind>,
}

/// What a successful tick read and decided
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub snapshot: TelemetrySnapshot,
    pub decision: CvlDecision,
}

pub struct CvlController<G: TelemetryGateway> {
    config: Config,
    gateway: G,
    policy: PolicyConstants,
    battery_service: Option<String>,
    stats: TickStats,
    logger: StructuredLogger,
}

impl<G: TelemetryGateway> CvlController<G> {
    pub fn new(config: Config, gateway: G) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("controller").with_device_instance(config.device_instance),
        );
        let policy = PolicyConstants::from(&config.policy);
        let battery_service = config.battery_service.clone();
        Self {
            config,
            gateway,
            policy,
            battery_service,
            stats: TickStats::default(),
            logger,
        }
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Battery service in use, asking the system service the first time
    pub async fn resolve_battery_service(&mut self) -> Result<String> {
        if let Some(service) = &self.battery_service {
            return Ok(service.clone());
        }
        let value = self
            .gateway
            .read_value(&self.config.dbus.system_service, paths::BATTERY_SERVICE)
            .await?;
        let service = match value {
            serde_json::Value::String(s) if !s.is_empty() => s,
            serde_json::Value::Null => return Err(CvlError::missing(paths::BATTERY_SERVICE)),
            other => {
                return Err(CvlError::invalid(
                    paths::BATTERY_SERVICE.to_string(),
                    format!("expected a service name, got {}", other),
                ));
            }
        };
        self.logger
            .info(&format!("Using battery service {}", service));
        self.battery_service = Some(service.clone());
        Ok(service)
    }

    /// One read, decide, write cycle
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let service = self.resolve_battery_service().await?;
        let snapshot = TelemetrySnapshot::read(&self.gateway, &service).await?;
        let decision = self.policy.evaluate(&PolicyInputs::from(&snapshot))?;

        self.gateway
            .write_value(
                &self.config.dbus.settings_service,
                &self.config.dbus.max_charge_voltage_path,
                serde_json::json!(decision.cvl),
            )
            .await?;

        for (path, value) in snapshot.mirror_updates() {
            self.gateway.publish(path, value).await?;
        }

        Ok(TickOutcome { snapshot, decision })
    }

    /// Run one tick, containing and logging any failure
    pub async fn run_tick(&mut self) -> Option<TickOutcome> {
        self.stats.total_ticks = self.stats.total_ticks.saturating_add(1);
        match self.tick().await {
            Ok(outcome) => {
                let d = &outcome.decision;
                let s = &outcome.snapshot;
                self.logger.info(&format!(
                    "CVL {:.2} V ({}) max_cell={:.3} min_cell={:.3} bus={:.2}",
                    d.cvl, d.rule, s.max_cell_voltage, s.min_cell_voltage, s.bus_voltage
                ));
                if self.stats.consecutive_failures > 0 {
                    self.logger.info(&format!(
                        "Recovered after {} failed ticks",
                        self.stats.consecutive_failures
                    ));
                }
                self.stats.consecutive_failures = 0;
                self.stats.last_cvl = Some(d.cvl);
                self.stats.last_rule = Some(d.rule);
                self.stats.last_success = Some(Utc::now());
                Some(outcome)
            }
            Err(e) => {
                let kind = e.kind();
                self.stats.failed_ticks = self.stats.failed_ticks.saturating_add(1);
                self.stats.consecutive_failures = self.stats.consecutive_failures.saturating_add(1);
                self.stats.last_failure = Some(kind);
                if kind == FailureKind::ConnectionUnavailable && self.config.battery_service.is_none() {
                    // Service may have moved; rediscover next tick
                    self.battery_service = None;
                }
                self.logger.warn(&format!(
                    "Tick skipped [{}] ({} in a row): {}",
                    kind, self.stats.consecutive_failures, e
                ));
                None
            }
        }
    }

    /// Tick every `poll_interval_ms` until `shutdown` turns true or its
    /// sender goes away
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.logger.info(&format!(
            "Controller started, interval {} ms",
            self.config.poll_interval_ms
        ));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.logger.info("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.logger.info(&format!(
            "Controller stopped after {} ticks ({} failed)",
            self.stats.total_ticks, self.stats.failed_ticks
        ));
        Ok(())
    }
}
