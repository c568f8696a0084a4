use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::items::BusItem;
use super::shared::DbusSharedState;

/// Root object of the service; answers for the whole path tree
pub struct RootBus {
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl RootBus {
    pub fn new(shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> HashMap<String, OwnedValue> {
        subtree_map(&self.shared, "/", false)
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> HashMap<String, OwnedValue> {
        subtree_map(&self.shared, "/", true)
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        for (path, val) in shared.paths.iter() {
            let mut entry: HashMap<String, OwnedValue> = HashMap::new();
            entry.insert("Value".to_string(), BusItem::serde_to_owned_value(val));
            entry.insert(
                "Text".to_string(),
                BusItem::text_value(&shared.text_for(path, val)),
            );
            out.insert(path.clone(), entry);
        }
        out
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// Intermediate node such as `/Mgmt` or `/System`
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> HashMap<String, OwnedValue> {
        subtree_map(&self.shared, &self.path, false)
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> HashMap<String, OwnedValue> {
        subtree_map(&self.shared, &self.path, true)
    }
}

/// Values (or texts) below `prefix`, keyed by path relative to it
pub(crate) fn subtree_map(
    shared: &Mutex<DbusSharedState>,
    prefix: &str,
    as_text: bool,
) -> HashMap<String, OwnedValue> {
    let shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    let mut px = prefix.to_string();
    if !px.ends_with('/') {
        px.push('/');
    }
    let mut result: HashMap<String, OwnedValue> = HashMap::new();
    for (path, val) in shared.paths.iter() {
        if let Some(suffix) = path.strip_prefix(&px) {
            let ov = if as_text {
                BusItem::text_value(&shared.text_for(path, val))
            } else {
                BusItem::serde_to_owned_value(val)
            };
            result.insert(suffix.to_string(), ov);
        }
    }
    result
}
