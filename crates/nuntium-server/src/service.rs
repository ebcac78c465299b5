//! Service objects exposed on the bus.
//!
//! [`MessagingService`] is everything a mediator publishes: one service per
//! SIM identity, its messages, and the push agent the radio daemon delivers
//! to. [`Bus`] is the in-process implementation behind the Unix socket; it
//! keeps the object tree and fans signals out to subscribers.

use std::collections::{BTreeMap, HashMap};

use nuntium_bearer::BoxFuture;
use nuntium_protocol::{
    DownloadFailure, MessageInfo, MessageStatus, ObjectPath, Properties, PropertyValue,
    ServiceInfo, Signal, property,
};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::mediator::MediatorHandle;

const SIGNAL_CAPACITY: usize = 256;

/// Everything needed to publish the service of one SIM identity.
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub identity: String,
    pub modem_id: String,
    pub use_delivery_reports: bool,
    pub preferred_context: Option<String>,
    pub mediator: MediatorHandle,
}

/// Where a mediator publishes services, messages and its push agent.
pub trait MessagingService: Send + Sync {
    fn register_service(&self, registration: ServiceRegistration) -> BoxFuture<'_, ServerResult<()>>;

    fn unregister_service<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, ServerResult<()>>;

    /// Makes the modem's push agent reachable; returns its object path.
    fn register_push_agent<'a>(
        &'a self,
        modem_id: &'a str,
        mediator: MediatorHandle,
    ) -> BoxFuture<'a, ServerResult<String>>;

    fn unregister_push_agent<'a>(&'a self, modem_id: &'a str) -> BoxFuture<'a, ServerResult<()>>;

    /// A retrieved message, or an outgoing draft.
    fn message_added<'a>(
        &'a self,
        identity: &'a str,
        message: MessageInfo,
    ) -> BoxFuture<'a, ServerResult<()>>;

    fn incoming_message_fail_added<'a>(
        &'a self,
        identity: &'a str,
        uuid: Uuid,
        failure: DownloadFailure,
    ) -> BoxFuture<'a, ServerResult<()>>;

    fn message_removed<'a>(&'a self, identity: &'a str, uuid: Uuid) -> BoxFuture<'a, ServerResult<()>>;

    fn message_status_changed<'a>(
        &'a self,
        identity: &'a str,
        uuid: Uuid,
        status: MessageStatus,
    ) -> BoxFuture<'a, ServerResult<()>>;
}

pub fn message_path(identity: &str, uuid: Uuid) -> String {
    ObjectPath::message(identity, uuid.to_string()).to_string()
}

#[derive(Debug, Clone)]
struct ServiceEntry {
    modem_id: String,
    use_delivery_reports: bool,
    preferred_context: Option<String>,
    mediator: MediatorHandle,
}

impl ServiceEntry {
    fn properties(&self, identity: &str) -> Properties {
        let mut properties = BTreeMap::new();
        properties.insert(property::IDENTITY.to_string(), identity.into());
        properties.insert(
            property::USE_DELIVERY_REPORTS.to_string(),
            self.use_delivery_reports.into(),
        );
        properties.insert(
            property::MODEM_OBJECT_PATH.to_string(),
            self.modem_id.as_str().into(),
        );
        properties.insert(
            property::PREFERRED_CONTEXT.to_string(),
            self.preferred_context.clone().unwrap_or_default().into(),
        );
        properties
    }
}

pub struct Bus {
    services: RwLock<BTreeMap<String, ServiceEntry>>,
    agents: RwLock<HashMap<String, MediatorHandle>>,
    messages: RwLock<BTreeMap<String, MessageInfo>>,
    signals: broadcast::Sender<Signal>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            services: RwLock::new(BTreeMap::new()),
            agents: RwLock::new(HashMap::new()),
            messages: RwLock::new(BTreeMap::new()),
            signals,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    fn emit(&self, signal: Signal) {
        debug!(path = signal.path(), ?signal, "Signal");
        // No subscribers is fine.
        let _ = self.signals.send(signal);
    }

    pub async fn services(&self) -> Vec<ServiceInfo> {
        self.services
            .read()
            .await
            .iter()
            .map(|(identity, entry)| ServiceInfo {
                path: ObjectPath::service(identity).to_string(),
                properties: entry.properties(identity),
            })
            .collect()
    }

    pub async fn properties(&self, identity: &str) -> Option<Properties> {
        self.services
            .read()
            .await
            .get(identity)
            .map(|entry| entry.properties(identity))
    }

    pub async fn mediator(&self, identity: &str) -> Option<MediatorHandle> {
        self.services
            .read()
            .await
            .get(identity)
            .map(|entry| entry.mediator.clone())
    }

    pub async fn messages(&self, identity: &str) -> Vec<MessageInfo> {
        let prefix = format!("{}/", ObjectPath::service(identity));
        self.messages
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub async fn agent(&self, path: &str) -> Option<MediatorHandle> {
        self.agents.read().await.get(path).cloned()
    }

    /// The radio daemon dropped the agent at `path`.
    pub async fn release_agent(&self, path: &str) -> bool {
        let released = self.agents.write().await.remove(path).is_some();
        if released {
            info!(agent = path, "Push agent released");
        }
        released
    }

    /// Stores a writable property and emits `PropertyChanged`.
    pub async fn update_property(
        &self,
        identity: &str,
        name: &str,
        value: PropertyValue,
    ) -> ServerResult<()> {
        {
            let mut services = self.services.write().await;
            let entry = services
                .get_mut(identity)
                .ok_or_else(|| ServerError::invalid_arguments(format!("no service {identity}")))?;
            match (name, &value) {
                (property::USE_DELIVERY_REPORTS, PropertyValue::Bool(enabled)) => {
                    entry.use_delivery_reports = *enabled;
                }
                (property::PREFERRED_CONTEXT, PropertyValue::Text(context)) => {
                    entry.preferred_context = (!context.is_empty()).then(|| context.clone());
                }
                _ => {
                    return Err(ServerError::invalid_arguments(format!(
                        "property {name} is not writable with {value:?}"
                    )));
                }
            }
        }
        self.emit(Signal::PropertyChanged {
            path: ObjectPath::service(identity).to_string(),
            name: name.to_string(),
            value,
        });
        Ok(())
    }
}

impl MessagingService for Bus {
    fn register_service(&self, registration: ServiceRegistration) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(async move {
            let ServiceRegistration {
                identity,
                modem_id,
                use_delivery_reports,
                preferred_context,
                mediator,
            } = registration;
            let entry = ServiceEntry {
                modem_id,
                use_delivery_reports,
                preferred_context,
                mediator,
            };
            let properties = entry.properties(&identity);
            self.services.write().await.insert(identity.clone(), entry);
            info!(identity = %identity, "Service added");
            self.emit(Signal::ServiceAdded {
                path: ObjectPath::service(&identity).to_string(),
                properties,
            });
            Ok(())
        })
    }

    fn unregister_service<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            if self.services.write().await.remove(identity).is_none() {
                return Ok(());
            }
            let prefix = format!("{}/", ObjectPath::service(identity));
            self.messages
                .write()
                .await
                .retain(|path, _| !path.starts_with(&prefix));
            info!(identity, "Service removed");
            self.emit(Signal::ServiceRemoved {
                path: ObjectPath::service(identity).to_string(),
            });
            Ok(())
        })
    }

    fn register_push_agent<'a>(
        &'a self,
        modem_id: &'a str,
        mediator: MediatorHandle,
    ) -> BoxFuture<'a, ServerResult<String>> {
        Box::pin(async move {
            let path = ObjectPath::agent(modem_id).to_string();
            self.agents.write().await.insert(path.clone(), mediator);
            info!(modem = modem_id, agent = %path, "Push agent registered");
            Ok(path)
        })
    }

    fn unregister_push_agent<'a>(&'a self, modem_id: &'a str) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            let path = ObjectPath::agent(modem_id).to_string();
            if self.agents.write().await.remove(&path).is_some() {
                info!(modem = modem_id, agent = %path, "Push agent unregistered");
            }
            Ok(())
        })
    }

    fn message_added<'a>(
        &'a self,
        identity: &'a str,
        message: MessageInfo,
    ) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            if !self.services.read().await.contains_key(identity) {
                return Err(ServerError::Unavailable(identity.to_string()));
            }
            self.messages
                .write()
                .await
                .insert(message.path.clone(), message.clone());
            self.emit(Signal::MessageAdded { message });
            Ok(())
        })
    }

    fn incoming_message_fail_added<'a>(
        &'a self,
        identity: &'a str,
        uuid: Uuid,
        failure: DownloadFailure,
    ) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            if !self.services.read().await.contains_key(identity) {
                return Err(ServerError::Unavailable(identity.to_string()));
            }
            self.emit(Signal::IncomingMessageFailAdded {
                path: message_path(identity, uuid),
                failure,
            });
            Ok(())
        })
    }

    fn message_removed<'a>(&'a self, identity: &'a str, uuid: Uuid) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            let path = message_path(identity, uuid);
            self.messages.write().await.remove(&path);
            self.emit(Signal::MessageRemoved { path });
            Ok(())
        })
    }

    fn message_status_changed<'a>(
        &'a self,
        identity: &'a str,
        uuid: Uuid,
        status: MessageStatus,
    ) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            let path = message_path(identity, uuid);
            if let Some(message) = self.messages.write().await.get_mut(&path) {
                message.status = status;
            }
            self.emit(Signal::MessageStatusChanged { path, status });
            Ok(())
        })
    }
}
