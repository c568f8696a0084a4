use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use zbus::Connection;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::shared::DbusSharedState;

/// VeDbus-style BusItem implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    fn current_value(&self) -> (serde_json::Value, String) {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let val = shared
            .paths
            .get(&self.path)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let text = shared.text_for(&self.path, &val);
        (val, text)
    }

    /// Convert a JSON value for the wire. `null` becomes the empty array
    /// Victron uses for an invalid value.
    pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
        match v {
            serde_json::Value::Bool(b) => OwnedValue::from(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    OwnedValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    OwnedValue::from(u)
                } else {
                    OwnedValue::from(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            _ => invalid_value(),
        }
    }

    pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
        value_to_serde(v)
    }

    pub(crate) fn text_value(text: &str) -> OwnedValue {
        OwnedValue::try_from(Value::from(text)).unwrap_or_else(|_| OwnedValue::from(0i64))
    }
}

/// Emit `PropertiesChanged` on the item and `ItemsChanged` on the root
pub(crate) async fn emit_item_changed(
    conn: &Connection,
    root_path: &OwnedObjectPath,
    path: &str,
    value: &serde_json::Value,
    text: &str,
) -> zbus::Result<()> {
    let obj_path = OwnedObjectPath::try_from(path)?;
    let item_ctx = SignalEmitter::new(conn, obj_path)?;
    let mut changes: HashMap<&str, OwnedValue> = HashMap::new();
    changes.insert("Value", BusItem::serde_to_owned_value(value));
    changes.insert("Text", BusItem::text_value(text));
    BusItem::properties_changed(&item_ctx, changes).await?;

    let root_ctx = SignalEmitter::new(conn, root_path.clone())?;
    let mut inner: HashMap<&str, OwnedValue> = HashMap::new();
    inner.insert("Value", BusItem::serde_to_owned_value(value));
    inner.insert("Text", BusItem::text_value(text));
    let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
    outer.insert(path, inner);
    super::RootBus::items_changed(&root_ctx, outer).await
}

fn invalid_value() -> OwnedValue {
    OwnedValue::try_from(Value::from(Vec::<i32>::new())).unwrap_or_else(|_| OwnedValue::from(0i64))
}

fn value_to_serde(v: &Value<'_>) -> serde_json::Value {
    match v {
        Value::Bool(b) => serde_json::json!(b),
        Value::U8(n) => serde_json::json!(n),
        Value::I16(n) => serde_json::json!(n),
        Value::U16(n) => serde_json::json!(n),
        Value::I32(n) => serde_json::json!(n),
        Value::U32(n) => serde_json::json!(n),
        Value::I64(n) => serde_json::json!(n),
        Value::U64(n) => serde_json::json!(n),
        Value::F64(f) => serde_json::json!(f),
        Value::Str(s) => serde_json::json!(s.as_str()),
        Value::Value(inner) => value_to_serde(inner),
        Value::Array(a) if a.is_empty() => serde_json::Value::Null,
        other => serde_json::json!(other.to_string()),
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        let (val, _) = self.current_value();
        Self::serde_to_owned_value(&val)
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        let (_, text) = self.current_value();
        text
    }

    /// Returns 0 when accepted, 1 for read-only paths, 2 when the change
    /// callback rejected the value
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let sv = Self::owned_value_to_serde(&value);

        let callback = {
            let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            shared.callbacks.get(&self.path).cloned()
        };
        if let Some(cb) = callback {
            if !cb(self.path.as_str(), &sv) {
                return 2;
            }
        }

        let (conn_opt, root_path, text) = {
            let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            shared.paths.insert(self.path.clone(), sv.clone());
            (
                shared.connection.clone(),
                shared.root_path.clone(),
                shared.text_for(&self.path, &sv),
            )
        };

        if let Some(conn) = conn_opt {
            let _ = emit_item_changed(&conn, &root_path, &self.path, &sv, &text).await;
        }

        0
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared_state() -> Arc<Mutex<DbusSharedState>> {
        let root = OwnedObjectPath::try_from("/").unwrap();
        Arc::new(Mutex::new(DbusSharedState::new(root)))
    }

    #[test]
    fn owned_value_conversions() {
        let ov_b = BusItem::serde_to_owned_value(&serde_json::json!(true));
        assert_eq!(
            BusItem::owned_value_to_serde(&ov_b),
            serde_json::json!(true)
        );

        let ov_i = BusItem::serde_to_owned_value(&serde_json::json!(-5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_i), serde_json::json!(-5));

        let ov_f = BusItem::serde_to_owned_value(&serde_json::json!(54.81));
        assert_eq!(
            BusItem::owned_value_to_serde(&ov_f),
            serde_json::json!(54.81)
        );

        // Invalid values travel as an empty array and come back as null
        let ov_null = BusItem::serde_to_owned_value(&serde_json::Value::Null);
        assert_eq!(
            BusItem::owned_value_to_serde(&ov_null),
            serde_json::Value::Null
        );
    }

    #[test]
    fn narrow_integer_variants_are_numbers() {
        assert_eq!(
            BusItem::owned_value_to_serde(&OwnedValue::from(16i32)),
            serde_json::json!(16)
        );
        assert_eq!(
            BusItem::owned_value_to_serde(&OwnedValue::from(1u8)),
            serde_json::json!(1)
        );
        let s = OwnedValue::try_from(Value::from("com.victronenergy.battery.ttyUSB0")).unwrap();
        assert_eq!(
            BusItem::owned_value_to_serde(&s),
            serde_json::json!("com.victronenergy.battery.ttyUSB0")
        );
    }

    #[tokio::test]
    async fn set_value_rejects_read_only_paths() {
        let shared = shared_state();
        {
            let mut s = shared.lock().unwrap();
            s.paths
                .insert("/System/MaxCellVoltage".to_string(), serde_json::json!(3.4));
        }
        let item = BusItem::new("/System/MaxCellVoltage".to_string(), shared.clone());
        let rc = item.set_value(OwnedValue::from(4.0f64)).await;
        assert_eq!(rc, 1);
        let s = shared.lock().unwrap();
        assert_eq!(
            s.paths.get("/System/MaxCellVoltage"),
            Some(&serde_json::json!(3.4))
        );
    }

    #[tokio::test]
    async fn set_value_on_writable_path_invokes_callback_and_stores() {
        let shared = shared_state();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let mut s = shared.lock().unwrap();
            s.paths
                .insert("/InstalledCapacity".to_string(), serde_json::json!(460));
            s.writable.insert("/InstalledCapacity".to_string());
            let calls = calls.clone();
            s.callbacks.insert(
                "/InstalledCapacity".to_string(),
                Arc::new(move |_p: &str, _v: &serde_json::Value| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    true
                }),
            );
        }
        let item = BusItem::new("/InstalledCapacity".to_string(), shared.clone());
        let rc = item.set_value(OwnedValue::from(280i64)).await;
        assert_eq!(rc, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(item.get_text().await, "280");
        let s = shared.lock().unwrap();
        assert_eq!(
            s.paths.get("/InstalledCapacity"),
            Some(&serde_json::json!(280))
        );
    }

    #[tokio::test]
    async fn set_value_rejected_by_callback_keeps_old_value() {
        let shared = shared_state();
        {
            let mut s = shared.lock().unwrap();
            s.paths.insert("/Guarded".to_string(), serde_json::json!(1));
            s.writable.insert("/Guarded".to_string());
            s.callbacks.insert(
                "/Guarded".to_string(),
                Arc::new(|_p: &str, _v: &serde_json::Value| false),
            );
        }
        let item = BusItem::new("/Guarded".to_string(), shared.clone());
        assert_eq!(item.set_value(OwnedValue::from(2i64)).await, 2);
        let s = shared.lock().unwrap();
        assert_eq!(s.paths.get("/Guarded"), Some(&serde_json::json!(1)));
    }
}
