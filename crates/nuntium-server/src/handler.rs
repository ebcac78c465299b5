//! Request/response dispatch for bus clients.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use nuntium_protocol::{
    ErrorCode, ErrorResponse, ObjectPath, PropertyValue, Request, Response, property,
};

use crate::error::{ServerError, ServerResult, StoreError};
use crate::mediator::MediatorHandle;
use crate::preferred::PreferredContexts;
use crate::service::{Bus, message_path};
use crate::socket::Connection;

/// Routes requests to the bus object tree and the owning mediators.
#[derive(Clone)]
pub struct RequestHandler {
    bus: Arc<Bus>,
    preferred: Arc<PreferredContexts>,
}

impl RequestHandler {
    pub fn new(bus: Arc<Bus>, preferred: Arc<PreferredContexts>) -> Self {
        Self { bus, preferred }
    }

    #[tracing::instrument(skip(self, request), fields(request_type = request_type(request), duration_ms))]
    pub async fn handle(&self, request: &Request) -> Response {
        let start = std::time::Instant::now();
        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Request failed");
                Response::from_error(error_response(&e))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", duration_ms);
        debug!(duration_ms, "Request handled");
        response
    }

    async fn dispatch(&self, request: &Request) -> ServerResult<Response> {
        match request {
            Request::Ping => Ok(Response::Pong),

            Request::GetServices => Ok(Response::Services {
                services: self.bus.services().await,
            }),

            Request::GetProperties { service } => {
                let identity = service_identity(service)?;
                let properties = self
                    .bus
                    .properties(&identity)
                    .await
                    .ok_or_else(|| ServerError::NotFound(service.clone()))?;
                Ok(Response::Properties { properties })
            }

            Request::SetProperty {
                service,
                name,
                value,
            } => {
                let identity = service_identity(service)?;
                let mediator = self.service_mediator(&identity, service).await?;
                self.set_property(&identity, &mediator, name, value).await?;
                Ok(Response::Ok)
            }

            Request::GetMessages { service } => {
                let identity = service_identity(service)?;
                self.service_mediator(&identity, service).await?;
                Ok(Response::Messages {
                    messages: self.bus.messages(&identity).await,
                })
            }

            Request::SendMessage {
                service,
                recipients,
                smil,
                attachments,
            } => {
                let identity = service_identity(service)?;
                let mediator = self.service_mediator(&identity, service).await?;
                let uuid = mediator
                    .send_message(recipients.clone(), smil.clone(), attachments.clone())
                    .await?;
                Ok(Response::MessageQueued {
                    path: message_path(&identity, uuid),
                })
            }

            Request::DeleteMessage { path } => {
                let (mediator, uuid) = self.message_mediator(path).await?;
                mediator.delete_message(uuid).await?;
                Ok(Response::Ok)
            }

            Request::RedownloadMessage { path } => {
                let (mediator, uuid) = self.message_mediator(path).await?;
                mediator.redownload_message(uuid).await?;
                Ok(Response::Ok)
            }

            Request::ReceiveNotification { agent, data, info } => {
                let mediator = self
                    .bus
                    .agent(agent)
                    .await
                    .ok_or_else(|| ServerError::NotFound(agent.clone()))?;
                mediator.push(data.clone(), info.clone()).await?;
                Ok(Response::Ok)
            }

            Request::ReleaseAgent { agent } => {
                if self.bus.release_agent(agent).await {
                    Ok(Response::Ok)
                } else {
                    Err(ServerError::NotFound(agent.clone()))
                }
            }

            // Streaming is set up by the connection loop.
            Request::Subscribe => Ok(Response::Subscribed),
        }
    }

    async fn set_property(
        &self,
        identity: &str,
        mediator: &MediatorHandle,
        name: &str,
        value: &PropertyValue,
    ) -> ServerResult<()> {
        match name {
            property::USE_DELIVERY_REPORTS => {
                let enabled = value.as_bool().ok_or_else(|| {
                    ServerError::invalid_arguments(format!("{name} takes a boolean"))
                })?;
                mediator.set_use_delivery_reports(enabled).await?;
            }
            property::PREFERRED_CONTEXT => {
                let context = value.as_str().ok_or_else(|| {
                    ServerError::invalid_arguments(format!("{name} takes an object path"))
                })?;
                self.preferred.set(identity, context)?;
            }
            _ => {
                return Err(ServerError::invalid_arguments(format!(
                    "property {name} is not writable"
                )));
            }
        }
        self.bus.update_property(identity, name, value.clone()).await
    }

    async fn service_mediator(&self, identity: &str, service: &str) -> ServerResult<MediatorHandle> {
        self.bus
            .mediator(identity)
            .await
            .ok_or_else(|| ServerError::NotFound(service.to_string()))
    }

    async fn message_mediator(&self, path: &str) -> ServerResult<(MediatorHandle, Uuid)> {
        let ObjectPath::Message { identity, uuid } = ObjectPath::parse(path)? else {
            return Err(ServerError::invalid_arguments(format!("{path} is not a message")));
        };
        let uuid = Uuid::parse_str(&uuid).map_err(|_| ServerError::NotFound(path.to_string()))?;
        let mediator = self.service_mediator(&identity, path).await?;
        Ok((mediator, uuid))
    }

    /// Serves one client until it disconnects. A `Subscribe` request turns
    /// the connection into a signal stream for the rest of its life.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        loop {
            match conn.read_request().await {
                Ok(Some(envelope)) => {
                    if envelope.payload == Request::Subscribe {
                        let signals = self.bus.subscribe();
                        conn.respond(&envelope.request_id, Response::Subscribed)
                            .await?;
                        debug!("Client subscribed to signals");
                        return conn.stream_signals(&envelope.request_id, signals).await;
                    }
                    let response = self.handle(&envelope.payload).await;
                    conn.respond(&envelope.request_id, response).await?;
                }
                Ok(None) => {
                    debug!("Client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Error reading request");
                    return Err(e);
                }
            }
        }
    }
}

fn request_type(request: &Request) -> &'static str {
    match request {
        Request::Ping => "ping",
        Request::GetServices => "get_services",
        Request::GetProperties { .. } => "get_properties",
        Request::SetProperty { .. } => "set_property",
        Request::GetMessages { .. } => "get_messages",
        Request::SendMessage { .. } => "send_message",
        Request::DeleteMessage { .. } => "delete_message",
        Request::RedownloadMessage { .. } => "redownload_message",
        Request::ReceiveNotification { .. } => "receive_notification",
        Request::ReleaseAgent { .. } => "release_agent",
        Request::Subscribe => "subscribe",
    }
}

fn service_identity(service: &str) -> ServerResult<String> {
    match ObjectPath::parse(service)? {
        ObjectPath::Service { identity } => Ok(identity),
        _ => Err(ServerError::invalid_arguments(format!(
            "{service} is not a service"
        ))),
    }
}

fn error_response(error: &ServerError) -> ErrorResponse {
    let code = match error {
        ServerError::NotFound(_) | ServerError::Store(StoreError::NotFound(_)) => {
            ErrorCode::NotFound
        }
        ServerError::InvalidArguments(_) => ErrorCode::InvalidArguments,
        ServerError::Protocol(_) => ErrorCode::InvalidRequest,
        ServerError::Unavailable(_) => ErrorCode::Unavailable,
        ServerError::Shutdown => ErrorCode::ShuttingDown,
        _ => ErrorCode::InternalError,
    };
    ErrorResponse::new(code, error.to_string())
}

/// Connection callback for [`crate::SocketServer::run`].
pub fn make_connection_handler(
    bus: Arc<Bus>,
    preferred: Arc<PreferredContexts>,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    let handler = RequestHandler::new(bus, preferred);
    move |conn| {
        let handler = handler.clone();
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await
                && !matches!(e, ServerError::Shutdown)
            {
                warn!(error = %e, "Connection handler error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use nuntium_protocol::{MessageInfo, MessageStatus};
    use tempfile::{TempDir, tempdir};
    use tokio::sync::mpsc;

    use crate::mediator::MediatorEvent;
    use crate::service::{MessagingService, ServiceRegistration};
    use crate::testing::{IDENTITY, MODEM};

    const SERVICE: &str = "/nuntium/310150123456789";

    struct Fixture {
        handler: RequestHandler,
        bus: Arc<Bus>,
        preferred: Arc<PreferredContexts>,
        events: mpsc::Receiver<MediatorEvent>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let bus = Arc::new(Bus::new());
        let preferred = Arc::new(PreferredContexts::new(dir.path()));
        let (mediator, events) = MediatorHandle::channel(MODEM);
        bus.register_service(ServiceRegistration {
            identity: IDENTITY.into(),
            modem_id: MODEM.into(),
            use_delivery_reports: false,
            preferred_context: None,
            mediator: mediator.clone(),
        })
        .await
        .unwrap();
        bus.register_push_agent(MODEM, mediator).await.unwrap();
        Fixture {
            handler: RequestHandler::new(bus.clone(), preferred.clone()),
            bus,
            preferred,
            events,
            _dir: dir,
        }
    }

    fn error_code(response: &Response) -> ErrorCode {
        response.as_error().map(|e| e.code).expect("error response")
    }

    #[tokio::test]
    async fn ping_and_services() {
        let f = fixture().await;
        assert_eq!(f.handler.handle(&Request::Ping).await, Response::Pong);

        match f.handler.handle(&Request::GetServices).await {
            Response::Services { services } => {
                assert_eq!(services.len(), 1);
                assert_eq!(services[0].path, SERVICE);
            }
            other => panic!("unexpected {other:?}"),
        }

        match f.handler.handle(&Request::get_properties(SERVICE)).await {
            Response::Properties { properties } => {
                assert_eq!(properties[property::IDENTITY], PropertyValue::from(IDENTITY));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_objects() {
        let f = fixture().await;
        let response = f.handler.handle(&Request::get_properties("/nuntium/404")).await;
        assert_eq!(error_code(&response), ErrorCode::NotFound);

        let response = f.handler.handle(&Request::get_messages("/elsewhere")).await;
        assert_eq!(error_code(&response), ErrorCode::InvalidRequest);

        let response = f
            .handler
            .handle(&Request::DeleteMessage {
                path: SERVICE.into(),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::InvalidArguments);

        let response = f
            .handler
            .handle(&Request::DeleteMessage {
                path: format!("{SERVICE}/not-a-uuid"),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::NotFound);

        let response = f
            .handler
            .handle(&Request::receive_notification("/nuntium/agent/x", vec![1], BTreeMap::new()))
            .await;
        assert_eq!(error_code(&response), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn set_delivery_reports_reaches_mediator() {
        let mut f = fixture().await;
        let response = f
            .handler
            .handle(&Request::set_property(SERVICE, property::USE_DELIVERY_REPORTS, true))
            .await;
        assert_eq!(response, Response::Ok);
        assert!(matches!(
            f.events.recv().await,
            Some(MediatorEvent::SetUseDeliveryReports(true))
        ));
        let properties = f.bus.properties(IDENTITY).await.unwrap();
        assert_eq!(properties[property::USE_DELIVERY_REPORTS], PropertyValue::Bool(true));

        let response = f
            .handler
            .handle(&Request::set_property(SERVICE, property::USE_DELIVERY_REPORTS, "on"))
            .await;
        assert_eq!(error_code(&response), ErrorCode::InvalidArguments);

        let response = f
            .handler
            .handle(&Request::set_property(SERVICE, property::IDENTITY, "x"))
            .await;
        assert_eq!(error_code(&response), ErrorCode::InvalidArguments);
    }

    #[tokio::test]
    async fn set_preferred_context_persists() {
        let f = fixture().await;
        let response = f
            .handler
            .handle(&Request::set_property(
                SERVICE,
                property::PREFERRED_CONTEXT,
                "/ril_0/context2",
            ))
            .await;
        assert_eq!(response, Response::Ok);
        assert_eq!(f.preferred.get(IDENTITY).as_deref(), Some("/ril_0/context2"));
    }

    #[tokio::test]
    async fn send_message_returns_path() {
        let f = fixture().await;
        let mut events = f.events;
        let uuid = Uuid::new_v4();
        let mediator = tokio::spawn(async move {
            if let Some(MediatorEvent::Outgoing {
                recipients, reply, ..
            }) = events.recv().await
            {
                assert_eq!(recipients, vec!["+15550199".to_string()]);
                reply.send(Ok(uuid)).unwrap();
            }
        });

        let response = f
            .handler
            .handle(&Request::send_message(
                SERVICE,
                vec!["+15550199".into()],
                None,
                Vec::new(),
            ))
            .await;
        assert_eq!(
            response,
            Response::MessageQueued {
                path: format!("{SERVICE}/{uuid}")
            }
        );
        mediator.await.unwrap();
    }

    #[tokio::test]
    async fn delete_and_redownload_route_by_path() {
        let f = fixture().await;
        let mut events = f.events;
        let uuid = Uuid::new_v4();
        let mediator = tokio::spawn(async move {
            match events.recv().await {
                Some(MediatorEvent::Delete { uuid: got, reply }) => {
                    assert_eq!(got, uuid);
                    reply.send(Ok(())).unwrap();
                }
                other => panic!("unexpected {other:?}"),
            }
            match events.recv().await {
                Some(MediatorEvent::Redownload { reply, .. }) => {
                    reply
                        .send(Err(ServerError::invalid_arguments("not a notification")))
                        .unwrap();
                }
                other => panic!("unexpected {other:?}"),
            }
        });

        let path = format!("{SERVICE}/{uuid}");
        let response = f
            .handler
            .handle(&Request::DeleteMessage { path: path.clone() })
            .await;
        assert_eq!(response, Response::Ok);

        let response = f.handler.handle(&Request::RedownloadMessage { path }).await;
        assert_eq!(error_code(&response), ErrorCode::InvalidArguments);
        mediator.await.unwrap();
    }

    #[tokio::test]
    async fn push_reaches_agent_owner() {
        let mut f = fixture().await;
        let response = f
            .handler
            .handle(&Request::receive_notification(
                "/nuntium/agent/ril_0",
                vec![0x01, 0x06],
                BTreeMap::new(),
            ))
            .await;
        assert_eq!(response, Response::Ok);
        match f.events.recv().await {
            Some(MediatorEvent::PushReceived { data, .. }) => assert_eq!(data, vec![0x01, 0x06]),
            other => panic!("unexpected {other:?}"),
        }

        let release = Request::ReleaseAgent {
            agent: "/nuntium/agent/ril_0".into(),
        };
        assert_eq!(f.handler.handle(&release).await, Response::Ok);
        assert_eq!(error_code(&f.handler.handle(&release).await), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn stopped_mediator_is_unavailable() {
        let f = fixture().await;
        drop(f.events);
        let response = f
            .handler
            .handle(&Request::set_property(SERVICE, property::USE_DELIVERY_REPORTS, true))
            .await;
        assert_eq!(error_code(&response), ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn messages_listed_per_service() {
        let f = fixture().await;
        let path = format!("{SERVICE}/{}", Uuid::new_v4());
        f.bus
            .message_added(IDENTITY, MessageInfo::new(&path, MessageStatus::Received))
            .await
            .unwrap();
        match f.handler.handle(&Request::get_messages(SERVICE)).await {
            Response::Messages { messages } => assert_eq!(messages[0].path, path),
            other => panic!("unexpected {other:?}"),
        }
    }
}
