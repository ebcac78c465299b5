//! MMS PDU records (OMA-MMS-ENC).
//!
//! Each record implements [`Pdu`], whose `set_field` is the table of
//! header fields it accepts. The decoder walks the headers and offers
//! every decoded field to the record; fields a record does not take are
//! logged and dropped, or rejected for strict records.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::content_type::ContentType;
use crate::decode::{FieldValue, MmsDecoder};
use crate::error::DecodeError;
use crate::tables::{MessageType, MmsField};

/// MMS version 1.0 (major 1, minor 0) as carried in `X-Mms-MMS-Version`.
pub const MMS_VERSION_1_0: u8 = 0x10;
/// MMS version 1.1.
pub const MMS_VERSION_1_1: u8 = 0x11;
/// MMS version 1.3.
pub const MMS_VERSION_1_3: u8 = 0x13;

/// Address suffix marking a phone number.
pub const PLMN_SUFFIX: &str = "/TYPE=PLMN";

/// Content-ID given to the SMIL part of outgoing messages.
pub const SMIL_CONTENT_ID: &str = "<smil>";
pub const SMIL_MEDIA_TYPE: &str = "application/smil";

pub const MULTIPART_RELATED: &str = "application/vnd.wap.multipart.related";
pub const MULTIPART_MIXED: &str = "application/vnd.wap.multipart.mixed";

static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 ().\-]*$").expect("Invalid phone number regex")
});

/// Common behaviour of the typed PDU records.
pub trait Pdu: Default + Sized {
    const MESSAGE_TYPE: MessageType;
    /// Strict records fail on fields they do not define.
    const STRICT: bool = false;
    /// Records whose Content-Type field is followed by a message body.
    const HAS_BODY: bool = false;

    /// Takes a decoded header field. Returns `false` if the field is not
    /// part of this PDU.
    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool;

    fn set_body(&mut self, _content_type: ContentType, _attachments: Vec<Attachment>) {}

    fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        MmsDecoder::new(data).decode()
    }
}

/// `X-Mms-Message-Class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    Personal,
    Advertisement,
    Informational,
    Auto,
    Other(String),
}

impl MessageClass {
    pub fn from_token(token: u8) -> Option<Self> {
        Some(match token {
            0x80 => Self::Personal,
            0x81 => Self::Advertisement,
            0x82 => Self::Informational,
            0x83 => Self::Auto,
            _ => return None,
        })
    }

    pub fn token(&self) -> Option<u8> {
        match self {
            Self::Personal => Some(0x80),
            Self::Advertisement => Some(0x81),
            Self::Informational => Some(0x82),
            Self::Auto => Some(0x83),
            Self::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Personal => "Personal",
            Self::Advertisement => "Advertisement",
            Self::Informational => "Informational",
            Self::Auto => "Auto",
            Self::Other(text) => text,
        }
    }
}

/// `X-Mms-Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0x80,
    Normal = 0x81,
    High = 0x82,
}

impl Priority {
    pub fn from_octet(b: u8) -> Option<Self> {
        Some(match b {
            0x80 => Self::Low,
            0x81 => Self::Normal,
            0x82 => Self::High,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
        }
    }
}

/// `X-Mms-Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Expired = 0x80,
    Retrieved = 0x81,
    Rejected = 0x82,
    Deferred = 0x83,
    Unrecognised = 0x84,
    Indeterminate = 0x85,
    Forwarded = 0x86,
    Unreachable = 0x87,
}

impl Status {
    pub fn from_octet(b: u8) -> Option<Self> {
        Some(match b {
            0x80 => Self::Expired,
            0x81 => Self::Retrieved,
            0x82 => Self::Rejected,
            0x83 => Self::Deferred,
            0x84 => Self::Unrecognised,
            0x85 => Self::Indeterminate,
            0x86 => Self::Forwarded,
            0x87 => Self::Unreachable,
            _ => return None,
        })
    }

    pub fn octet(self) -> u8 {
        self as u8
    }
}

/// `X-Mms-Expiry` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expiry {
    /// Seconds since the epoch.
    Absolute(u64),
    /// Seconds from reception.
    Relative(u64),
}

/// Outcome class of an `X-Mms-Response-Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Ok,
    TransientError,
    PermanentError,
}

impl SendStatus {
    pub fn classify(response_status: u8) -> Self {
        match response_status {
            0x80 => Self::Ok,
            0x00..=0x7F | 0xC0..=0xDF => Self::PermanentError,
            0xE0..=0xFF => Self::TransientError,
            _ => Self::TransientError,
        }
    }
}

/// One body part of a multipart message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Media type with the charset re-attached, e.g. `text/plain;charset=utf-8`.
    pub media_type: String,
    pub content_id: Option<String>,
    pub content_location: Option<String>,
    pub name: Option<String>,
    pub filename: Option<String>,
    pub start: Option<String>,
    /// Offset of `data` within the PDU it was decoded from.
    pub offset: usize,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    #[must_use]
    pub fn with_content_location(mut self, location: impl Into<String>) -> Self {
        self.content_location = Some(location.into());
        self
    }

    pub(crate) fn from_part(ct: &ContentType) -> Self {
        Self {
            media_type: ct.media_type_with_charset(),
            name: ct.name().map(str::to_string),
            filename: ct.filename().map(str::to_string),
            start: ct.start().map(str::to_string),
            ..Self::default()
        }
    }

    /// Content type to put on the wire for this part.
    pub(crate) fn wire_content_type(&self) -> ContentType {
        let mut ct = ContentType::parse(&self.media_type);
        if let Some(name) = &self.name {
            ct.parameters.insert("name".into(), name.clone());
        }
        if let Some(filename) = &self.filename {
            ct.parameters.insert("filename".into(), filename.clone());
        }
        if let Some(start) = &self.start {
            ct.parameters.insert("start".into(), start.clone());
        }
        ct
    }
}

fn octet_bool(b: u8) -> bool {
    b == 0x80
}

/// `m-notification-ind`: the MMSC announcing a message ready for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MNotificationInd {
    pub uuid: Uuid,
    pub version: u8,
    pub transaction_id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub class: Option<MessageClass>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub expiry: Option<Expiry>,
    pub content_location: String,
    #[serde(default)]
    pub delivery_report: Option<bool>,
    /// Set when this notification replays a message the user asked to
    /// download again.
    #[serde(default)]
    pub redownload_of_uuid: Option<Uuid>,
    /// Persisted fields this version does not know, written back unchanged.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Default for MNotificationInd {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            version: MMS_VERSION_1_0,
            transaction_id: String::new(),
            from: None,
            subject: None,
            class: None,
            size: 0,
            expiry: None,
            content_location: String::new(),
            delivery_report: None,
            redownload_of_uuid: None,
            extra: Map::new(),
        }
    }
}

impl MNotificationInd {
    /// True when the content location points at this host.
    pub fn is_local(&self) -> bool {
        Url::parse(&self.content_location)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.eq_ignore_ascii_case("localhost")))
            .unwrap_or(false)
    }
}

impl Pdu for MNotificationInd {
    const MESSAGE_TYPE: MessageType = MessageType::NotificationInd;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = v,
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::From, FieldValue::Address(v)) => self.from = v,
            (MmsField::Subject, FieldValue::Text(v)) => self.subject = Some(v),
            (MmsField::MessageClass, FieldValue::Class(v)) => self.class = Some(v),
            (MmsField::MessageSize, FieldValue::Integer(v)) => self.size = v,
            (MmsField::Expiry, FieldValue::Expiry(v)) => self.expiry = Some(v),
            (MmsField::ContentLocation, FieldValue::Text(v)) => self.content_location = v,
            (MmsField::DeliveryReport, FieldValue::Octet(v)) => {
                self.delivery_report = Some(octet_bool(v))
            }
            _ => return false,
        }
        true
    }
}

/// `m-notifyresp-ind`: our answer to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MNotifyRespInd {
    pub uuid: Uuid,
    pub transaction_id: String,
    pub version: u8,
    pub status: Status,
    pub report_allowed: bool,
}

impl Default for MNotifyRespInd {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            transaction_id: String::new(),
            version: MMS_VERSION_1_0,
            status: Status::Retrieved,
            report_allowed: false,
        }
    }
}

impl MNotifyRespInd {
    /// Response for a retrieved notification.
    pub fn retrieved(notification: &MNotificationInd, report_allowed: bool) -> Self {
        Self {
            uuid: notification.uuid,
            transaction_id: notification.transaction_id.clone(),
            version: notification.version,
            status: Status::Retrieved,
            report_allowed,
        }
    }
}

impl Pdu for MNotifyRespInd {
    const MESSAGE_TYPE: MessageType = MessageType::NotifyRespInd;
    const STRICT: bool = true;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = v,
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::Status, FieldValue::Octet(v)) => match Status::from_octet(v) {
                Some(status) => self.status = status,
                None => return false,
            },
            (MmsField::ReportAllowed, FieldValue::Octet(v)) => self.report_allowed = octet_bool(v),
            _ => return false,
        }
        true
    }
}

/// `m-retrieve-conf`: the downloaded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MRetrieveConf {
    pub uuid: Uuid,
    pub version: u8,
    pub transaction_id: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<u64>,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub class: Option<MessageClass>,
    pub priority: Option<Priority>,
    pub delivery_report: Option<bool>,
    pub read_report: Option<bool>,
    pub retrieve_status: Option<u8>,
    pub retrieve_text: Option<String>,
    pub content_type: ContentType,
    pub attachments: Vec<Attachment>,
}

impl Default for MRetrieveConf {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            version: MMS_VERSION_1_0,
            transaction_id: None,
            message_id: None,
            date: None,
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            subject: None,
            class: None,
            priority: None,
            delivery_report: None,
            read_report: None,
            retrieve_status: None,
            retrieve_text: None,
            content_type: ContentType::default(),
            attachments: Vec::new(),
        }
    }
}

impl MRetrieveConf {
    /// The SMIL part, if the message carries one.
    pub fn smil(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.media_type.starts_with(SMIL_MEDIA_TYPE))
    }
}

impl Pdu for MRetrieveConf {
    const MESSAGE_TYPE: MessageType = MessageType::RetrieveConf;
    const HAS_BODY: bool = true;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = Some(v),
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::MessageId, FieldValue::Text(v)) => self.message_id = Some(v),
            (MmsField::Date, FieldValue::Integer(v)) => self.date = Some(v),
            (MmsField::From, FieldValue::Address(v)) => self.from = v,
            (MmsField::To, FieldValue::Text(v)) => self.to.push(v),
            (MmsField::Cc, FieldValue::Text(v)) => self.cc.push(v),
            (MmsField::Subject, FieldValue::Text(v)) => self.subject = Some(v),
            (MmsField::MessageClass, FieldValue::Class(v)) => self.class = Some(v),
            (MmsField::Priority, FieldValue::Octet(v)) => self.priority = Priority::from_octet(v),
            (MmsField::DeliveryReport, FieldValue::Octet(v)) => {
                self.delivery_report = Some(octet_bool(v))
            }
            (MmsField::ReadReport, FieldValue::Octet(v)) => self.read_report = Some(octet_bool(v)),
            (MmsField::RetrieveStatus, FieldValue::Octet(v)) => self.retrieve_status = Some(v),
            (MmsField::RetrieveText, FieldValue::Text(v)) => self.retrieve_text = Some(v),
            _ => return false,
        }
        true
    }

    fn set_body(&mut self, content_type: ContentType, attachments: Vec<Attachment>) {
        self.content_type = content_type;
        self.attachments = attachments;
    }
}

/// `m-send-req`: an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MSendReq {
    pub uuid: Uuid,
    pub transaction_id: String,
    pub version: u8,
    pub date: Option<u64>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub class: Option<MessageClass>,
    pub expiry: Option<Expiry>,
    pub priority: Option<Priority>,
    pub delivery_report: bool,
    pub read_report: Option<bool>,
    pub content_type: ContentType,
    pub attachments: Vec<Attachment>,
}

impl Default for MSendReq {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            transaction_id: String::new(),
            version: MMS_VERSION_1_1,
            date: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            class: None,
            expiry: None,
            priority: None,
            delivery_report: false,
            read_report: None,
            content_type: ContentType::new(MULTIPART_MIXED),
            attachments: Vec::new(),
        }
    }
}

impl MSendReq {
    /// Builds a send request. Phone-number recipients get the PLMN type
    /// suffix. A non-empty `smil` becomes the start part of a
    /// multipart.related body; otherwise the body is multipart.mixed.
    pub fn new(
        recipients: &[String],
        smil: Option<&str>,
        attachments: Vec<Attachment>,
        delivery_report: bool,
    ) -> Self {
        let uuid = Uuid::new_v4();
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        let content_type = match smil.filter(|s| !s.trim().is_empty()) {
            Some(smil) => {
                parts.push(
                    Attachment::new(SMIL_MEDIA_TYPE, smil.as_bytes().to_vec())
                        .with_content_id(SMIL_CONTENT_ID)
                        .with_content_location("smil.xml"),
                );
                ContentType::new(MULTIPART_RELATED)
                    .with_param("start", SMIL_CONTENT_ID)
                    .with_param("type", SMIL_MEDIA_TYPE)
            }
            None => ContentType::new(MULTIPART_MIXED),
        };
        parts.extend(attachments);

        Self {
            uuid,
            transaction_id: uuid.simple().to_string(),
            to: recipients.iter().map(|r| address_with_type(r)).collect(),
            delivery_report,
            content_type,
            attachments: parts,
            ..Self::default()
        }
    }
}

/// Appends `/TYPE=PLMN` to phone numbers. E-mail addresses and already
/// typed addresses are left alone.
pub fn address_with_type(address: &str) -> String {
    let address = address.trim();
    if address.contains("/TYPE=") || !PHONE_NUMBER.is_match(address) {
        return address.to_string();
    }
    let digits: String = address
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    format!("{digits}{PLMN_SUFFIX}")
}

/// Strips the `/TYPE=...` suffix from an address.
pub fn address_without_type(address: &str) -> &str {
    address
        .split_once("/TYPE=")
        .map_or(address, |(number, _)| number)
}

impl Pdu for MSendReq {
    const MESSAGE_TYPE: MessageType = MessageType::SendReq;
    const HAS_BODY: bool = true;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = v,
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::Date, FieldValue::Integer(v)) => self.date = Some(v),
            // always insert-address
            (MmsField::From, FieldValue::Address(_)) => {}
            (MmsField::To, FieldValue::Text(v)) => self.to.push(v),
            (MmsField::Cc, FieldValue::Text(v)) => self.cc.push(v),
            (MmsField::Bcc, FieldValue::Text(v)) => self.bcc.push(v),
            (MmsField::Subject, FieldValue::Text(v)) => self.subject = Some(v),
            (MmsField::MessageClass, FieldValue::Class(v)) => self.class = Some(v),
            (MmsField::Expiry, FieldValue::Expiry(v)) => self.expiry = Some(v),
            (MmsField::Priority, FieldValue::Octet(v)) => self.priority = Priority::from_octet(v),
            (MmsField::DeliveryReport, FieldValue::Octet(v)) => self.delivery_report = octet_bool(v),
            (MmsField::ReadReport, FieldValue::Octet(v)) => self.read_report = Some(octet_bool(v)),
            _ => return false,
        }
        true
    }

    fn set_body(&mut self, content_type: ContentType, attachments: Vec<Attachment>) {
        self.content_type = content_type;
        self.attachments = attachments;
    }
}

/// `m-send-conf`: the MMSC's answer to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MSendConf {
    pub version: u8,
    pub transaction_id: String,
    pub response_status: u8,
    pub response_text: Option<String>,
    pub message_id: Option<String>,
}

impl Default for MSendConf {
    fn default() -> Self {
        Self {
            version: MMS_VERSION_1_0,
            transaction_id: String::new(),
            // absent status is treated as a permanent failure
            response_status: 0x00,
            response_text: None,
            message_id: None,
        }
    }
}

impl MSendConf {
    pub fn status(&self) -> SendStatus {
        SendStatus::classify(self.response_status)
    }
}

impl Pdu for MSendConf {
    const MESSAGE_TYPE: MessageType = MessageType::SendConf;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = v,
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::ResponseStatus, FieldValue::Octet(v)) => self.response_status = v,
            (MmsField::ResponseText, FieldValue::Text(v)) => self.response_text = Some(v),
            (MmsField::MessageId, FieldValue::Text(v)) => self.message_id = Some(v),
            _ => return false,
        }
        true
    }
}

/// `m-acknowledge-ind`: sent after a successful deferred retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MAcknowledgeInd {
    pub transaction_id: String,
    pub version: u8,
    pub report_allowed: Option<bool>,
}

impl Default for MAcknowledgeInd {
    fn default() -> Self {
        Self {
            transaction_id: String::new(),
            version: MMS_VERSION_1_0,
            report_allowed: None,
        }
    }
}

impl Pdu for MAcknowledgeInd {
    const MESSAGE_TYPE: MessageType = MessageType::AcknowledgeInd;
    const STRICT: bool = true;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::TransactionId, FieldValue::Text(v)) => self.transaction_id = v,
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::ReportAllowed, FieldValue::Octet(v)) => {
                self.report_allowed = Some(octet_bool(v))
            }
            _ => return false,
        }
        true
    }
}

/// `m-delivery-ind`: delivery report for a message we sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MDeliveryInd {
    pub version: u8,
    pub message_id: String,
    pub to: Vec<String>,
    pub date: Option<u64>,
    pub status: Option<Status>,
}

impl Default for MDeliveryInd {
    fn default() -> Self {
        Self {
            version: MMS_VERSION_1_0,
            message_id: String::new(),
            to: Vec::new(),
            date: None,
            status: None,
        }
    }
}

impl Pdu for MDeliveryInd {
    const MESSAGE_TYPE: MessageType = MessageType::DeliveryInd;

    fn set_field(&mut self, field: MmsField, value: FieldValue) -> bool {
        match (field, value) {
            (MmsField::MmsVersion, FieldValue::Integer(v)) => self.version = v as u8,
            (MmsField::MessageId, FieldValue::Text(v)) => self.message_id = v,
            (MmsField::To, FieldValue::Text(v)) => self.to.push(v),
            (MmsField::Date, FieldValue::Integer(v)) => self.date = Some(v),
            (MmsField::Status, FieldValue::Octet(v)) => self.status = Status::from_octet(v),
            _ => return false,
        }
        true
    }
}

/// Any decoded MMS PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmsPdu {
    SendReq(MSendReq),
    SendConf(MSendConf),
    NotificationInd(MNotificationInd),
    NotifyRespInd(MNotifyRespInd),
    RetrieveConf(MRetrieveConf),
    AcknowledgeInd(MAcknowledgeInd),
    DeliveryInd(MDeliveryInd),
}

impl MmsPdu {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::SendReq(_) => MessageType::SendReq,
            Self::SendConf(_) => MessageType::SendConf,
            Self::NotificationInd(_) => MessageType::NotificationInd,
            Self::NotifyRespInd(_) => MessageType::NotifyRespInd,
            Self::RetrieveConf(_) => MessageType::RetrieveConf,
            Self::AcknowledgeInd(_) => MessageType::AcknowledgeInd,
            Self::DeliveryInd(_) => MessageType::DeliveryInd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_status_classification() {
        assert_eq!(SendStatus::classify(0x80), SendStatus::Ok);
        assert_eq!(SendStatus::classify(0x00), SendStatus::PermanentError);
        assert_eq!(SendStatus::classify(0x7F), SendStatus::PermanentError);
        assert_eq!(SendStatus::classify(0xC3), SendStatus::PermanentError);
        assert_eq!(SendStatus::classify(0xE1), SendStatus::TransientError);
        assert_eq!(SendStatus::classify(0x81), SendStatus::TransientError);
        assert_eq!(SendStatus::classify(0xA0), SendStatus::TransientError);
        assert_eq!(MSendConf::default().status(), SendStatus::PermanentError);
    }

    #[test]
    fn phone_numbers_get_plmn_suffix() {
        assert_eq!(address_with_type("+1 555-0100"), "+15550100/TYPE=PLMN");
        assert_eq!(address_with_type("12345"), "12345/TYPE=PLMN");
        assert_eq!(address_with_type("bob@example.com"), "bob@example.com");
        assert_eq!(address_with_type("123/TYPE=PLMN"), "123/TYPE=PLMN");
        assert_eq!(address_without_type("123/TYPE=PLMN"), "123");
        assert_eq!(address_without_type("bob@example.com"), "bob@example.com");
    }

    #[test]
    fn send_req_with_smil_is_related() {
        let req = MSendReq::new(
            &["5550100".to_string()],
            Some("<smil/>"),
            vec![Attachment::new("text/plain;charset=utf-8", b"hi".to_vec())],
            true,
        );
        assert_eq!(req.content_type.media_type, MULTIPART_RELATED);
        assert_eq!(req.content_type.start(), Some(SMIL_CONTENT_ID));
        assert_eq!(req.attachments.len(), 2);
        assert_eq!(req.attachments[0].content_id.as_deref(), Some(SMIL_CONTENT_ID));
        assert_eq!(req.to, vec!["5550100/TYPE=PLMN".to_string()]);
        assert!(req.delivery_report);
        assert_eq!(req.transaction_id.len(), 32);
    }

    #[test]
    fn send_req_without_smil_is_mixed() {
        let req = MSendReq::new(&["a@b.c".to_string()], Some("  "), Vec::new(), false);
        assert_eq!(req.content_type.media_type, MULTIPART_MIXED);
        assert!(req.attachments.is_empty());
    }

    #[test]
    fn local_notification() {
        let mut notification = MNotificationInd {
            content_location: "http://localhost:9191/mms".into(),
            ..MNotificationInd::default()
        };
        assert!(notification.is_local());
        notification.content_location = "http://mmsc.example.com/abc".into();
        assert!(!notification.is_local());
        notification.content_location = "not a url".into();
        assert!(!notification.is_local());
    }

    #[test]
    fn notification_json_shape() {
        let notification = MNotificationInd {
            transaction_id: "tid".into(),
            content_location: "http://mmsc/x".into(),
            class: Some(MessageClass::Personal),
            expiry: Some(Expiry::Relative(3600)),
            ..MNotificationInd::default()
        };
        let json = serde_json::to_value(&notification).unwrap();
        insta::assert_json_snapshot!(json, @r#"
        {
          "class": "personal",
          "content_location": "http://mmsc/x",
          "delivery_report": null,
          "expiry": {
            "kind": "relative",
            "value": 3600
          },
          "from": null,
          "redownload_of_uuid": null,
          "size": 0,
          "subject": null,
          "transaction_id": "tid",
          "uuid": "00000000-0000-0000-0000-000000000000",
          "version": 16
        }
        "#);
    }
}
