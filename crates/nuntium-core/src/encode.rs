//! MMS PDU encoder.
//!
//! Field order follows OMA-MMS-ENC: message type, transaction id and
//! version first, Content-Type last before the body.

use crate::content_type::ContentType;
use crate::error::CodecResult;
use crate::pdu::{
    Attachment, Expiry, MAcknowledgeInd, MNotificationInd, MNotifyRespInd, MRetrieveConf,
    MSendReq, MessageClass, Priority,
};
use crate::tables::{self, MessageType, MmsField};
use crate::wire::Writer;

const YES: u8 = 0x80;
const NO: u8 = 0x81;
const ADDRESS_PRESENT: u8 = 0x80;
const INSERT_ADDRESS: u8 = 0x81;

fn flag(value: bool) -> u8 {
    if value { YES } else { NO }
}

/// Field-level writer shared by all encoders.
struct MmsEncoder {
    w: Writer,
}

impl MmsEncoder {
    fn new(message_type: MessageType) -> Self {
        let mut enc = Self { w: Writer::new() };
        enc.octet(MmsField::MessageType, message_type.octet());
        enc
    }

    fn field(&mut self, field: MmsField) -> &mut Writer {
        self.w.write_octet(field.octet());
        &mut self.w
    }

    fn octet(&mut self, field: MmsField, value: u8) {
        self.field(field).write_octet(value);
    }

    fn version(&mut self, version: u8) {
        self.field(MmsField::MmsVersion).write_short_integer(version & 0x7F);
    }

    fn text(&mut self, field: MmsField, value: &str) {
        self.field(field).write_text_string(value);
    }

    fn encoded(&mut self, field: MmsField, value: &str) {
        self.field(field).write_encoded_string(value);
    }

    fn long(&mut self, field: MmsField, value: u64) {
        self.field(field).write_long_integer(value);
    }

    fn from(&mut self, address: Option<&str>) {
        let w = self.field(MmsField::From);
        match address {
            Some(address) => {
                let mut text = Writer::new();
                text.write_text_string(address);
                w.write_value_length(text.len() + 1);
                w.write_octet(ADDRESS_PRESENT);
                w.write_bytes(&text.into_bytes());
            }
            None => {
                w.write_value_length(1);
                w.write_octet(INSERT_ADDRESS);
            }
        }
    }

    fn expiry(&mut self, field: MmsField, expiry: Expiry) {
        let (token, value) = match expiry {
            Expiry::Absolute(v) => (0x80, v),
            Expiry::Relative(v) => (0x81, v),
        };
        let mut inner = Writer::new();
        inner.write_octet(token);
        inner.write_long_integer(value);
        let w = self.field(field);
        w.write_value_length(inner.len());
        w.write_bytes(&inner.into_bytes());
    }

    fn class(&mut self, class: &MessageClass) {
        match class.token() {
            Some(token) => self.octet(MmsField::MessageClass, token),
            None => self.text(MmsField::MessageClass, class.as_str()),
        }
    }

    fn priority(&mut self, priority: Priority) {
        self.octet(MmsField::Priority, priority as u8);
    }

    fn body(&mut self, content_type: &ContentType, attachments: &[Attachment]) -> CodecResult<()> {
        content_type.encode(self.field(MmsField::ContentType))?;
        if !content_type.is_multipart() {
            if let Some(part) = attachments.first() {
                self.w.write_bytes(&part.data);
            }
            return Ok(());
        }
        self.w.write_uintvar(attachments.len() as u64);
        for part in attachments {
            let mut headers = Writer::new();
            part.wire_content_type().encode(&mut headers)?;
            if let Some(location) = &part.content_location {
                headers.write_short_integer(tables::HEADER_CONTENT_LOCATION);
                headers.write_text_string(location);
            }
            if let Some(id) = &part.content_id {
                headers.write_short_integer(tables::HEADER_CONTENT_ID);
                headers.write_quoted_string(id);
            }
            self.w.write_uintvar(headers.len() as u64);
            self.w.write_uintvar(part.data.len() as u64);
            self.w.write_bytes(&headers.into_bytes());
            self.w.write_bytes(&part.data);
        }
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.w.into_bytes()
    }
}

/// `m-notifyresp-ind`: type, transaction id, version, status, report-allowed.
pub fn encode_notify_resp_ind(pdu: &MNotifyRespInd) -> CodecResult<Vec<u8>> {
    let mut enc = MmsEncoder::new(MessageType::NotifyRespInd);
    enc.text(MmsField::TransactionId, &pdu.transaction_id);
    enc.version(pdu.version);
    enc.octet(MmsField::Status, pdu.status.octet());
    enc.octet(MmsField::ReportAllowed, flag(pdu.report_allowed));
    Ok(enc.finish())
}

pub fn encode_acknowledge_ind(pdu: &MAcknowledgeInd) -> CodecResult<Vec<u8>> {
    let mut enc = MmsEncoder::new(MessageType::AcknowledgeInd);
    enc.text(MmsField::TransactionId, &pdu.transaction_id);
    enc.version(pdu.version);
    if let Some(allowed) = pdu.report_allowed {
        enc.octet(MmsField::ReportAllowed, flag(allowed));
    }
    Ok(enc.finish())
}

/// `m-send-req` with an insert-address From and a multipart body.
pub fn encode_send_req(pdu: &MSendReq) -> CodecResult<Vec<u8>> {
    let mut enc = MmsEncoder::new(MessageType::SendReq);
    enc.text(MmsField::TransactionId, &pdu.transaction_id);
    enc.version(pdu.version);
    if let Some(date) = pdu.date {
        enc.long(MmsField::Date, date);
    }
    enc.from(None);
    for to in &pdu.to {
        enc.encoded(MmsField::To, to);
    }
    for cc in &pdu.cc {
        enc.encoded(MmsField::Cc, cc);
    }
    for bcc in &pdu.bcc {
        enc.encoded(MmsField::Bcc, bcc);
    }
    if let Some(subject) = &pdu.subject {
        enc.encoded(MmsField::Subject, subject);
    }
    if let Some(class) = &pdu.class {
        enc.class(class);
    }
    if let Some(expiry) = pdu.expiry {
        enc.expiry(MmsField::Expiry, expiry);
    }
    if let Some(priority) = pdu.priority {
        enc.priority(priority);
    }
    enc.octet(MmsField::DeliveryReport, flag(pdu.delivery_report));
    if let Some(read_report) = pdu.read_report {
        enc.octet(MmsField::ReadReport, flag(read_report));
    }
    enc.body(&pdu.content_type, &pdu.attachments)?;
    Ok(enc.finish())
}

/// Used to build synthetic notifications for local injection.
pub fn encode_notification_ind(pdu: &MNotificationInd) -> CodecResult<Vec<u8>> {
    let mut enc = MmsEncoder::new(MessageType::NotificationInd);
    enc.text(MmsField::TransactionId, &pdu.transaction_id);
    enc.version(pdu.version);
    if let Some(from) = &pdu.from {
        enc.from(Some(from));
    }
    if let Some(subject) = &pdu.subject {
        enc.encoded(MmsField::Subject, subject);
    }
    enc.class(pdu.class.as_ref().unwrap_or(&MessageClass::Personal));
    enc.long(MmsField::MessageSize, pdu.size);
    if let Some(expiry) = pdu.expiry {
        enc.expiry(MmsField::Expiry, expiry);
    }
    if let Some(report) = pdu.delivery_report {
        enc.octet(MmsField::DeliveryReport, flag(report));
    }
    enc.text(MmsField::ContentLocation, &pdu.content_location);
    Ok(enc.finish())
}

pub fn encode_retrieve_conf(pdu: &MRetrieveConf) -> CodecResult<Vec<u8>> {
    let mut enc = MmsEncoder::new(MessageType::RetrieveConf);
    if let Some(tid) = &pdu.transaction_id {
        enc.text(MmsField::TransactionId, tid);
    }
    enc.version(pdu.version);
    if let Some(id) = &pdu.message_id {
        enc.text(MmsField::MessageId, id);
    }
    if let Some(date) = pdu.date {
        enc.long(MmsField::Date, date);
    }
    if let Some(from) = &pdu.from {
        enc.from(Some(from));
    }
    for to in &pdu.to {
        enc.encoded(MmsField::To, to);
    }
    for cc in &pdu.cc {
        enc.encoded(MmsField::Cc, cc);
    }
    if let Some(subject) = &pdu.subject {
        enc.encoded(MmsField::Subject, subject);
    }
    if let Some(class) = &pdu.class {
        enc.class(class);
    }
    if let Some(priority) = pdu.priority {
        enc.priority(priority);
    }
    if let Some(report) = pdu.delivery_report {
        enc.octet(MmsField::DeliveryReport, flag(report));
    }
    if let Some(report) = pdu.read_report {
        enc.octet(MmsField::ReadReport, flag(report));
    }
    if let Some(status) = pdu.retrieve_status {
        enc.octet(MmsField::RetrieveStatus, status);
    }
    if let Some(text) = &pdu.retrieve_text {
        enc.encoded(MmsField::RetrieveText, text);
    }
    enc.body(&pdu.content_type, &pdu.attachments)?;
    Ok(enc.finish())
}
