//! Request, response and signal types for the nuntium bus.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Message envelope wrapping all protocol messages.
///
/// Signals pushed to subscribed connections carry an empty `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub protocol_version: String,
    /// Correlates a response with its request.
    pub request_id: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn request(request_id: impl Into<String>, request: T) -> Self {
        Self::new(request_id, request)
    }

    pub fn response(request_id: impl Into<String>, response: T) -> Self {
        Self::new(request_id, response)
    }

    pub fn version(&self) -> &str {
        &self.protocol_version
    }

    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Service and message property value.
///
/// Properties are either flags (`UseDeliveryReports`) or strings
/// (`Identity`, `ModemObjectPath`, `PreferredContext`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(_) => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Property map as exposed on a service object.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A file part handed to `SendMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingAttachment {
    pub content_id: String,
    pub content_type: String,
    pub path: PathBuf,
}

impl OutgoingAttachment {
    pub fn new(
        content_id: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            path: path.into(),
        }
    }
}

/// Requests a client can send to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,

    /// Manager: list registered services.
    GetServices,

    GetProperties {
        service: String,
    },

    SetProperty {
        service: String,
        name: String,
        value: PropertyValue,
    },

    GetMessages {
        service: String,
    },

    /// Queue an outgoing message. Replies with the new message path.
    SendMessage {
        service: String,
        recipients: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        smil: Option<String>,
        #[serde(default)]
        attachments: Vec<OutgoingAttachment>,
    },

    DeleteMessage {
        path: String,
    },

    RedownloadMessage {
        path: String,
    },

    /// Push agent: a WSP push delivered by the radio daemon.
    ReceiveNotification {
        agent: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        #[serde(default)]
        info: BTreeMap<String, String>,
    },

    /// Push agent: the radio daemon dropped the agent.
    ReleaseAgent {
        agent: String,
    },

    /// Turn this connection into a signal stream.
    Subscribe,
}

impl Request {
    pub fn get_properties(service: impl Into<String>) -> Self {
        Self::GetProperties {
            service: service.into(),
        }
    }

    pub fn set_property(
        service: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self::SetProperty {
            service: service.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn get_messages(service: impl Into<String>) -> Self {
        Self::GetMessages {
            service: service.into(),
        }
    }

    pub fn send_message(
        service: impl Into<String>,
        recipients: Vec<String>,
        smil: Option<String>,
        attachments: Vec<OutgoingAttachment>,
    ) -> Self {
        Self::SendMessage {
            service: service.into(),
            recipients,
            smil,
            attachments,
        }
    }

    pub fn receive_notification(
        agent: impl Into<String>,
        data: Vec<u8>,
        info: BTreeMap<String, String>,
    ) -> Self {
        Self::ReceiveNotification {
            agent: agent.into(),
            data,
            info,
        }
    }
}

/// Status of a message as presented to the messaging service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Draft,
    Sent,
    TransientError,
    PermanentError,
}

/// One part of a received message, located inside the stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub content_id: String,
    pub content_type: String,
    /// File holding the raw M-Retrieve.Conf.
    pub path: PathBuf,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub path: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smil: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

impl MessageInfo {
    pub fn new(path: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            path: path.into(),
            status,
            date: None,
            sender: None,
            recipients: Vec::new(),
            subject: None,
            smil: None,
            attachments: Vec::new(),
        }
    }
}

/// A notification that could not (or was not allowed to) be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    pub error: String,
    pub allow_redownload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Signals broadcast to subscribed connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    ServiceAdded {
        path: String,
        properties: Properties,
    },
    ServiceRemoved {
        path: String,
    },
    MessageAdded {
        message: MessageInfo,
    },
    IncomingMessageFailAdded {
        path: String,
        failure: DownloadFailure,
    },
    MessageRemoved {
        path: String,
    },
    MessageStatusChanged {
        path: String,
        status: MessageStatus,
    },
    PropertyChanged {
        path: String,
        name: String,
        value: PropertyValue,
    },
}

impl Signal {
    /// Object path the signal is emitted on.
    pub fn path(&self) -> &str {
        match self {
            Self::ServiceAdded { path, .. }
            | Self::ServiceRemoved { path }
            | Self::IncomingMessageFailAdded { path, .. }
            | Self::MessageRemoved { path }
            | Self::MessageStatusChanged { path, .. }
            | Self::PropertyChanged { path, .. } => path,
            Self::MessageAdded { message } => &message.path,
        }
    }
}

/// Responses the daemon sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    Ok,

    Services {
        services: Vec<ServiceInfo>,
    },

    Properties {
        properties: Properties,
    },

    Messages {
        messages: Vec<MessageInfo>,
    },

    MessageQueued {
        path: String,
    },

    /// Acknowledges `Subscribe`; signals follow on the same connection.
    Subscribed,

    Signal {
        signal: Signal,
    },

    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },
}

impl Response {
    pub fn signal(signal: Signal) -> Self {
        Self::Signal { signal }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    pub fn from_error(error: ErrorResponse) -> Self {
        Self::Error { error }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub path: String,
    pub properties: Properties,
}

/// Error codes for failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    /// Arguments were well formed but not acceptable (bad property, bad file).
    InvalidArguments,
    NotFound,
    /// The owning mediator is gone or not yet running.
    Unavailable,
    Timeout,
    ShuttingDown,
}

impl ErrorCode {
    pub fn description(&self) -> &'static str {
        match self {
            Self::InternalError => "An internal error occurred",
            Self::InvalidRequest => "The request was invalid",
            Self::InvalidArguments => "Invalid arguments",
            Self::NotFound => "Requested object not found",
            Self::Unavailable => "Service unavailable",
            Self::Timeout => "The request timed out",
            Self::ShuttingDown => "Daemon is shutting down",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl std::error::Error for ErrorResponse {}

/// Raw push payloads travel as base64 inside the JSON frame.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_creation() {
        let env = Envelope::request("req-1", Request::Ping);
        assert_eq!(env.version(), "1");
        assert_eq!(env.request_id, "req-1");
        assert!(env.is_compatible());
    }

    #[test]
    fn envelope_incompatible_version() {
        let mut env = Envelope::request("req-1", Request::Ping);
        env.protocol_version = "0".into();
        assert!(!env.is_compatible());
    }

    #[test]
    fn request_serde_ping() {
        let json = serde_json::to_string(&Request::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn request_serde_set_property() {
        let req = Request::set_property("/nuntium/310150123456789", "UseDeliveryReports", true);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"set_property","service":"/nuntium/310150123456789","name":"UseDeliveryReports","value":true}"#
        );
        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);

        let text = Request::set_property("/nuntium/1", "PreferredContext", "/ril_0/context2");
        let json = serde_json::to_string(&text).unwrap();
        assert!(json.contains(r#""value":"/ril_0/context2""#));
    }

    #[test]
    fn receive_notification_data_is_base64() {
        let req = Request::receive_notification("/nuntium/agent/ril_0", vec![0x01, 0x06, 0xFF], BTreeMap::new());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""data":"AQb/""#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);

        let bad = r#"{"type":"receive_notification","agent":"a","data":"!!"}"#;
        assert!(serde_json::from_str::<Request>(bad).is_err());
    }

    #[test]
    fn send_message_defaults() {
        let json = r#"{"type":"send_message","service":"/nuntium/1","recipients":["+1555"]}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::send_message("/nuntium/1", vec!["+1555".into()], None, Vec::new())
        );
    }

    #[test]
    fn response_serde_error() {
        let resp = Response::error(ErrorCode::NotFound, "no such message");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"type":"error","code":"not_found","message":"no such message"}"#
        );
        assert!(!resp.is_success());
        assert_eq!(resp.as_error().map(|e| e.code), Some(ErrorCode::NotFound));
    }

    #[test]
    fn signal_path() {
        let signal = Signal::MessageAdded {
            message: MessageInfo::new("/nuntium/1/abc", MessageStatus::Received),
        };
        assert_eq!(signal.path(), "/nuntium/1/abc");
    }

    #[test]
    fn fail_signal_snapshot() {
        let resp = Response::signal(Signal::IncomingMessageFailAdded {
            path: "/nuntium/310150123456789/6a1f".into(),
            failure: DownloadFailure {
                error: "deferred".into(),
                allow_redownload: true,
                sender: Some("+15551234567".into()),
                subject: None,
                size: Some(2048),
                expiry: None,
            },
        });
        insta::assert_json_snapshot!(resp, @r###"
        {
          "type": "signal",
          "signal": {
            "kind": "incoming_message_fail_added",
            "path": "/nuntium/310150123456789/6a1f",
            "failure": {
              "error": "deferred",
              "allow_redownload": true,
              "sender": "+15551234567",
              "size": 2048
            }
          }
        }
        "###);
    }

    #[test]
    fn property_value_untagged() {
        let map: Properties = serde_json::from_str(r#"{"a":true,"b":"x"}"#).unwrap();
        assert_eq!(map["a"].as_bool(), Some(true));
        assert_eq!(map["b"].as_str(), Some("x"));
        assert_eq!(map["b"].as_bool(), None);
    }

    #[test]
    fn error_response_display() {
        let err = ErrorResponse::internal("store failed");
        assert_eq!(err.to_string(), "An internal error occurred: store failed");
    }
}
