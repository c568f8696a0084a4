use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{PathOptions, TelemetryGateway};
use crate::error::{CvlError, Result};

#[derive(Default)]
struct MemoryState {
    remote: HashMap<(String, String), serde_json::Value>,
    failing: HashSet<String>,
    rejected_writes: HashSet<String>,
    writes: Vec<(String, String, serde_json::Value)>,
    reads: usize,
    local: HashMap<String, serde_json::Value>,
    options: HashMap<String, PathOptions>,
    publish_count: usize,
}

/// In-process gateway backed by hash maps.
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a remote value
    pub fn set_remote(&self, service: &str, path: &str, value: serde_json::Value) {
        self.state()
            .remote
            .insert((service.to_string(), path.to_string()), value);
    }

    /// Drop a remote value so reads of it fail as a missing value
    pub fn remove_remote(&self, service: &str, path: &str) {
        self.state()
            .remote
            .remove(&(service.to_string(), path.to_string()));
    }

    /// Make every read of `path` fail as if the bus call errored
    pub fn fail_reads_of(&self, path: &str) {
        self.state().failing.insert(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Make writes to `path` return a non-zero code
    pub fn reject_writes_to(&self, path: &str) {
        self.state().rejected_writes.insert(path.to_string());
    }

    /// Remote value as last written or seeded
    pub fn remote(&self, service: &str, path: &str) -> Option<serde_json::Value> {
        self.state()
            .remote
            .get(&(service.to_string(), path.to_string()))
            .cloned()
    }

    /// Every successful remote write, in order
    pub fn writes(&self) -> Vec<(String, String, serde_json::Value)> {
        self.state().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    pub fn publish_count(&self) -> usize {
        self.state().publish_count
    }

    /// Current value of a local path
    pub fn local(&self, path: &str) -> Option<serde_json::Value> {
        self.state().local.get(path).cloned()
    }

    pub fn local_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state().local.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Registration options of a local path
    pub fn options(&self, path: &str) -> Option<PathOptions> {
        self.state().options.get(path).cloned()
    }

    /// Simulate an external actor setting a local path; returns the BusItem
    /// style code (0 accepted, 1 not writable, 2 rejected by callback)
    pub fn external_set(&self, path: &str, value: serde_json::Value) -> i32 {
        let callback = {
            let state = self.state();
            match state.options.get(path) {
                Some(opts) if opts.writable => opts.on_change.clone(),
                _ => return 1,
            }
        };
        if let Some(cb) = callback {
            if !cb(path, &value) {
                return 2;
            }
        }
        self.state().local.insert(path.to_string(), value);
        0
    }
}

#[async_trait]
impl TelemetryGateway for MemoryGateway {
    async fn read_value(&self, service: &str, path: &str) -> Result<serde_json::Value> {
        let mut state = self.state();
        state.reads += 1;
        if state.failing.contains(path) {
            return Err(CvlError::dbus(format!("GetValue call failed: {}{}", service, path)));
        }
        state
            .remote
            .get(&(service.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| CvlError::missing(path))
    }

    async fn write_value(
        &self,
        service: &str,
        path: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state();
        if state.rejected_writes.contains(path) {
            return Err(CvlError::rejected(path, 1));
        }
        state
            .writes
            .push((service.to_string(), path.to_string(), value.clone()));
        state
            .remote
            .insert((service.to_string(), path.to_string()), value);
        Ok(())
    }

    async fn register_path(
        &mut self,
        path: &str,
        initial: serde_json::Value,
        options: PathOptions,
    ) -> Result<()> {
        let mut state = self.state();
        state.local.entry(path.to_string()).or_insert(initial);
        state.options.insert(path.to_string(), options);
        Ok(())
    }

    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.state();
        state.publish_count += 1;
        state.local.insert(path.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[tokio::test]
    async fn reads_fail_for_unknown_and_failing_paths() {
        let gw = MemoryGateway::new();
        gw.set_remote("svc", "/Soc", serde_json::json!(80.0));
        assert_eq!(
            gw.read_value("svc", "/Soc").await.unwrap(),
            serde_json::json!(80.0)
        );
        let err = gw.read_value("svc", "/Missing").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::MissingField);

        gw.fail_reads_of("/Soc");
        let err = gw.read_value("svc", "/Soc").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ConnectionUnavailable);
        gw.clear_failures();
        assert!(gw.read_value("svc", "/Soc").await.is_ok());
        assert_eq!(gw.read_count(), 4);
    }

    #[tokio::test]
    async fn external_set_honours_writable_flag() {
        let mut gw = MemoryGateway::new();
        gw.register_path("/ReadOnly", serde_json::json!(1), PathOptions::read_only())
            .await
            .unwrap();
        gw.register_path(
            "/Writable",
            serde_json::json!(0),
            PathOptions::writable_logged(),
        )
        .await
        .unwrap();

        assert_eq!(gw.external_set("/ReadOnly", serde_json::json!(5)), 1);
        assert_eq!(gw.local("/ReadOnly"), Some(serde_json::json!(1)));

        assert_eq!(gw.external_set("/Writable", serde_json::json!(5)), 0);
        assert_eq!(gw.local("/Writable"), Some(serde_json::json!(5)));

        assert_eq!(gw.external_set("/Unknown", serde_json::json!(5)), 1);
    }
}
