use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use zbus::fdo::{DBusProxy, RequestNameFlags, RequestNameReply};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::config::{BusKind, Config};
use crate::error::{CvlError, Result};
use crate::gateway::{PathOptions, TelemetryGateway};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};

use super::items::{BusItem, emit_item_changed};
use super::root::{RootBus, TreeNode};
use super::shared::DbusSharedState;

const BUS_ITEM_INTERFACE: &str = "com.victronenergy.BusItem";

/// Our own service on the bus plus client access to other services.
///
/// Paths can be registered before [`DbusService::start`]; they are exported
/// as soon as the connection exists.
pub struct DbusService {
    logger: StructuredLogger,
    service_name: String,
    bus: BusKind,
    timeout: Duration,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub fn new(config: &Config) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("dbus")
                .with_device_instance(config.device_instance)
                .with_field("service", config.service_name.clone()),
        );
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| CvlError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name: config.service_name.clone(),
            bus: config.dbus.bus,
            timeout: Duration::from_millis(config.dbus.timeout_ms),
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(root_path.clone()))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn shared(&self) -> MutexGuard<'_, DbusSharedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect, claim the well-known name and export the path tree
    pub async fn start(&mut self) -> Result<()> {
        let bus = resolve_bus(
            self.bus,
            std::env::var("DBUS_SESSION_BUS_ADDRESS").ok().as_deref(),
        );
        let connection = match bus {
            BusKind::Session => Connection::session().await,
            _ => Connection::system().await,
        }
        .map_err(|e| {
            CvlError::dbus(format!("DBus connect failed ({} bus): {}", bus.as_str(), e))
        })?;
        self.logger
            .info(&format!("Connected to D-Bus: {} bus", bus.as_str()));

        let reply = self
            .request_name(&connection)
            .await
            .map_err(|e| CvlError::dbus(format!("RequestName failed: {}", e)))?;
        check_name_reply(&self.service_name, reply)?;
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));

        connection
            .object_server()
            .at(&self.root_path, RootBus::new(Arc::clone(&self.shared)))
            .await
            .map_err(|e| CvlError::dbus(format!("Register root BusItem failed: {}", e)))?;

        self.shared().connection = Some(connection.clone());
        self.connection = Some(connection);

        let known: Vec<String> = self.shared().paths.keys().cloned().collect();
        for path in known {
            self.export_path(&path).await?;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        self.shared().connection = None;
        self.connection = None;
        self.registered_paths.clear();
        Ok(())
    }

    /// Register the leaf item and every intermediate node of `path`
    async fn export_path(&mut self, path: &str) -> Result<()> {
        let Some(conn) = self.connection.clone() else {
            return Ok(());
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                CvlError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            let registered = if i == segments.len() {
                let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, item).await
            } else {
                let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, node).await
            };
            registered.map_err(|e| {
                CvlError::dbus(format!("Register BusItem failed for {}: {}", subpath, e))
            })?;
            self.logger.debug(&format!("Exported {}", subpath));
            self.registered_paths.insert(subpath);
        }
        Ok(())
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<RequestNameReply> {
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await
            .map_err(zbus::Error::from)
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| CvlError::dbus("No D-Bus connection available"))
    }

    /// Run one bus call on `path` under the configured timeout
    async fn bounded<T, F>(&self, what: &str, path: &str, fut: F) -> Result<T>
    where
        F: Future<Output = ZbusResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(call_error(what, path, &e)),
            Err(_) => Err(CvlError::timeout(format!(
                "{} timed out after {} ms",
                what,
                self.timeout.as_millis()
            ))),
        }
    }

    async fn bus_item_proxy<'a>(&'a self, service: &'a str, path: &'a str) -> Result<zbus::Proxy<'a>> {
        let conn = self.connection()?;
        self.bounded(
            "DBus proxy creation",
            path,
            zbus::Proxy::new(conn, service, path, BUS_ITEM_INTERFACE),
        )
        .await
    }
}

const MISSING_OBJECT_ERRORS: [&str; 3] = [
    "org.freedesktop.DBus.Error.UnknownObject",
    "org.freedesktop.DBus.Error.UnknownMethod",
    "org.freedesktop.DBus.Error.UnknownInterface",
];

/// The remote service answered, but does not publish the object
fn is_missing_object(e: &zbus::Error) -> bool {
    match e {
        zbus::Error::MethodError(name, _, _) => MISSING_OBJECT_ERRORS.contains(&name.as_str()),
        zbus::Error::FDO(fdo) => matches!(
            **fdo,
            zbus::fdo::Error::UnknownObject(_)
                | zbus::fdo::Error::UnknownMethod(_)
                | zbus::fdo::Error::UnknownInterface(_)
        ),
        _ => false,
    }
}

/// Map a failed call: absent objects are missing values, the rest are bus
/// failures
fn call_error(what: &str, path: &str, e: &zbus::Error) -> CvlError {
    if is_missing_object(e) {
        CvlError::missing(path)
    } else {
        CvlError::dbus(format!("{} failed: {}", what, e))
    }
}

/// Succeeds only when we own `name` after the request
fn check_name_reply(name: &str, reply: RequestNameReply) -> Result<()> {
    match reply {
        RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => Ok(()),
        other => Err(CvlError::dbus(format!(
            "Could not own {}: RequestName replied {:?}",
            name, other
        ))),
    }
}

/// Bus to connect to; `auto` picks the session bus only when one is advertised
pub(crate) fn resolve_bus(kind: BusKind, session_address: Option<&str>) -> BusKind {
    match kind {
        BusKind::Auto => match session_address {
            Some(addr) if !addr.is_empty() => BusKind::Session,
            _ => BusKind::System,
        },
        other => other,
    }
}

#[async_trait]
impl TelemetryGateway for DbusService {
    async fn read_value(&self, service: &str, path: &str) -> Result<serde_json::Value> {
        let proxy = self.bus_item_proxy(service, path).await?;
        let val: OwnedValue = self
            .bounded(
                &format!("GetValue {}{}", service, path),
                path,
                proxy.call("GetValue", &()),
            )
            .await?;
        Ok(BusItem::owned_value_to_serde(&val))
    }

    async fn write_value(
        &self,
        service: &str,
        path: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let proxy = self.bus_item_proxy(service, path).await?;
        let body = (BusItem::serde_to_owned_value(&value),);
        let code: i32 = self
            .bounded(
                &format!("SetValue {}{}", service, path),
                path,
                proxy.call("SetValue", &body),
            )
            .await?;
        if code != 0 {
            return Err(CvlError::rejected(path, code));
        }
        Ok(())
    }

    async fn register_path(
        &mut self,
        path: &str,
        initial: serde_json::Value,
        options: PathOptions,
    ) -> Result<()> {
        {
            let mut shared = self.shared();
            shared
                .paths
                .entry(path.to_string())
                .or_insert(initial);
            if options.writable {
                shared.writable.insert(path.to_string());
            } else {
                shared.writable.remove(path);
            }
            match options.formatter {
                Some(fmt) => {
                    shared.formatters.insert(path.to_string(), fmt);
                }
                None => {
                    shared.formatters.remove(path);
                }
            }
            match options.on_change {
                Some(cb) => {
                    shared.callbacks.insert(path.to_string(), cb);
                }
                None => {
                    shared.callbacks.remove(path);
                }
            }
        }
        self.export_path(path).await
    }

    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        let known = {
            let shared = self.shared();
            match shared.paths.get(path) {
                Some(old) if old == &value => return Ok(()),
                Some(_) => true,
                None => false,
            }
        };
        if !known {
            self.export_path(path).await?;
        }
        let text = {
            let mut shared = self.shared();
            shared.paths.insert(path.to_string(), value.clone());
            shared.text_for(path, &value)
        };
        if let Some(conn) = &self.connection {
            emit_item_changed(conn, &self.root_path, path, &value, &text)
                .await
                .map_err(|e| CvlError::dbus(format!("Signal emission failed for {}: {}", path, e)))?;
        }
        Ok(())
    }
}
