use std::collections::{HashMap, HashSet};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::util::format_text_value;
use crate::gateway::{ChangeCallback, TextFormatter};

/// Path values and registration metadata shared by all exported objects
pub struct DbusSharedState {
    pub(crate) paths: HashMap<String, serde_json::Value>,
    pub(crate) writable: HashSet<String>,
    pub(crate) formatters: HashMap<String, TextFormatter>,
    pub(crate) callbacks: HashMap<String, ChangeCallback>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl DbusSharedState {
    pub fn new(root_path: OwnedObjectPath) -> Self {
        Self {
            paths: HashMap::new(),
            writable: HashSet::new(),
            formatters: HashMap::new(),
            callbacks: HashMap::new(),
            connection: None,
            root_path,
        }
    }

    /// Display text for `path`, using its registered formatter if any
    pub(crate) fn text_for(&self, path: &str, value: &serde_json::Value) -> String {
        match self.formatters.get(path) {
            Some(fmt) => fmt(path, value),
            None => format_text_value(value),
        }
    }
}
