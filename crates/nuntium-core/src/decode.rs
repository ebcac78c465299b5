//! MMS PDU decoder.

use std::fmt::Write as _;

use tracing::{debug, trace};

use crate::content_type::ContentType;
use crate::error::{CodecError, CodecResult, DecodeError};
use crate::pdu::{
    Attachment, Expiry, MAcknowledgeInd, MDeliveryInd, MNotificationInd, MNotifyRespInd,
    MRetrieveConf, MSendConf, MSendReq, MessageClass, MmsPdu, Pdu,
};
use crate::tables::{self, FieldKind, MessageType, MmsField};
use crate::wire::Reader;

/// A decoded header value, before it is assigned to a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Octet(u8),
    Integer(u64),
    Text(String),
    /// `None` for an insert-address token.
    Address(Option<String>),
    Expiry(Expiry),
    Class(MessageClass),
    /// A value that was skipped without interpretation.
    Skipped,
}

/// Decodes one MMS PDU, keeping a trace of every field it reads.
pub struct MmsDecoder<'a> {
    reader: Reader<'a>,
    log: String,
}

impl<'a> MmsDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            log: String::new(),
        }
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    /// Decodes the buffer into `T`. The message-type header must match
    /// `T::MESSAGE_TYPE`.
    pub fn decode<T: Pdu>(mut self) -> Result<T, DecodeError> {
        let pdu_type = T::MESSAGE_TYPE;
        let mut pdu = T::default();
        match self.decode_into(&mut pdu) {
            Ok(()) => {
                trace!(pdu = %pdu_type, log = %self.log, "decoded");
                Ok(pdu)
            }
            Err(error) => {
                let _ = writeln!(self.log, "error: {error}");
                debug!(pdu = %pdu_type, %error, "decode failed");
                Err(DecodeError::new(error, self.log))
            }
        }
    }

    fn note(&mut self, line: std::fmt::Arguments<'_>) {
        let _ = self.log.write_fmt(line);
        self.log.push('\n');
    }

    fn decode_into<T: Pdu>(&mut self, pdu: &mut T) -> CodecResult<()> {
        let mut seen_type = false;
        while !self.reader.is_empty() {
            let offset = self.reader.position();
            let b = self.reader.peek()?;
            if b & 0x80 == 0 {
                let name = self.reader.read_text_string()?;
                let value = self.reader.read_text_string()?;
                self.note(format_args!("{offset}: {name}: {value} (application header)"));
                continue;
            }
            let code = self.reader.read_octet()? & 0x7F;
            let Some(field) = MmsField::from_code(code) else {
                self.reader.skip_value()?;
                self.note(format_args!("{offset}: skipped unknown field {code:#04x}"));
                continue;
            };

            match field {
                MmsField::MessageType => {
                    let found = self.reader.read_octet()?;
                    let expected = T::MESSAGE_TYPE.octet();
                    if found != expected {
                        return Err(CodecError::UnexpectedType { expected, found });
                    }
                    seen_type = true;
                    self.note(format_args!("{offset}: {}: {}", field.name(), T::MESSAGE_TYPE));
                }
                MmsField::ContentType => {
                    let mut log = String::new();
                    let ct = ContentType::decode(&mut self.reader, &mut log)?;
                    self.log.push_str(&log);
                    self.note(format_args!("{offset}: {}: {ct}", field.name()));
                    if T::HAS_BODY {
                        let attachments = self.decode_body(&ct)?;
                        pdu.set_body(ct, attachments);
                    } else {
                        let remaining = self.reader.remaining();
                        self.note(format_args!("ignoring {remaining} body bytes"));
                    }
                    break;
                }
                _ => {
                    let value = self.read_field(field)?;
                    self.note(format_args!("{offset}: {}: {value:?}", field.name()));
                    if !pdu.set_field(field, value) {
                        if T::STRICT {
                            return Err(CodecError::UnexpectedField {
                                field: code,
                                pdu: T::MESSAGE_TYPE.name(),
                            });
                        }
                        self.note(format_args!("{} not used by {}", field.name(), T::MESSAGE_TYPE));
                    }
                }
            }
        }
        if !seen_type {
            return Err(CodecError::bad_encoding(0, "missing X-Mms-Message-Type"));
        }
        Ok(())
    }

    fn read_field(&mut self, field: MmsField) -> CodecResult<FieldValue> {
        let r = &mut self.reader;
        Ok(match field.kind() {
            FieldKind::Octet => FieldValue::Octet(r.read_octet()?),
            FieldKind::ShortInteger => FieldValue::Integer(u64::from(r.read_short_integer()?)),
            FieldKind::LongInteger => FieldValue::Integer(r.read_long_integer()?),
            FieldKind::Integer => FieldValue::Integer(r.read_integer()?),
            FieldKind::Text => FieldValue::Text(r.read_text_string()?),
            FieldKind::EncodedString => FieldValue::Text(r.read_encoded_string()?),
            FieldKind::From => FieldValue::Address(read_from(r)?),
            FieldKind::Expiry => FieldValue::Expiry(read_expiry(r)?),
            FieldKind::Token => FieldValue::Class(read_class(r)?),
            FieldKind::Opaque | FieldKind::ContentType => {
                r.skip_value()?;
                FieldValue::Skipped
            }
        })
    }

    fn decode_body(&mut self, ct: &ContentType) -> CodecResult<Vec<Attachment>> {
        if !ct.is_multipart() {
            let mut part = Attachment::from_part(ct);
            part.offset = self.reader.position();
            part.data = self.reader.rest().to_vec();
            self.reader.seek(part.offset + part.data.len())?;
            return Ok(vec![part]);
        }

        let count = self.reader.read_uintvar()?;
        self.note(format_args!("{count} part(s)"));
        let mut parts = Vec::new();
        for index in 0..count {
            let header_len = length(self.reader.read_uintvar()?, self.reader.position())?;
            let data_len = length(self.reader.read_uintvar()?, self.reader.position())?;
            let headers_end = self.reader.end_of(header_len)?;

            let mut log = String::new();
            let part_ct = ContentType::decode(&mut self.reader, &mut log)?;
            self.log.push_str(&log);
            let mut part = Attachment::from_part(&part_ct);

            while self.reader.position() < headers_end {
                let b = self.reader.peek()?;
                if b & 0x80 == 0 {
                    self.note(format_args!("part {index}: skipping application headers"));
                    break;
                }
                match b & 0x7F {
                    tables::HEADER_CONTENT_LOCATION => {
                        self.reader.read_octet()?;
                        part.content_location = Some(self.reader.read_text_string()?);
                    }
                    tables::HEADER_CONTENT_ID => {
                        self.reader.read_octet()?;
                        part.content_id = Some(self.reader.read_text_string()?);
                    }
                    other => {
                        let name = tables::header_name(other).unwrap_or("unknown");
                        self.note(format_args!("part {index}: skipping from {name}"));
                        break;
                    }
                }
            }
            self.reader.seek(headers_end)?;

            part.offset = self.reader.position();
            part.data = self.reader.read_bytes(data_len)?.to_vec();
            self.note(format_args!(
                "part {index}: {} ({} bytes)",
                part.media_type,
                part.data.len()
            ));
            parts.push(part);
        }
        Ok(parts)
    }
}

fn length(value: u64, offset: usize) -> CodecResult<usize> {
    usize::try_from(value)
        .map_err(|_| CodecError::bad_encoding(offset, format!("length {value} is too large")))
}

/// `From`: length, then an address-present token with the address or an
/// insert-address token. The length may be a value-length or a bare uintvar.
fn read_from(r: &mut Reader<'_>) -> CodecResult<Option<String>> {
    let offset = r.position();
    let result = read_from_inner(r);
    if result.is_err() {
        r.seek(offset)?;
    }
    result
}

fn read_from_inner(r: &mut Reader<'_>) -> CodecResult<Option<String>> {
    let offset = r.position();
    let len = match r.read_value_length()? {
        Some(len) => len,
        None => length(r.read_uintvar()?, offset)?,
    };
    let end = r.end_of(len)?;
    let start = r.position();
    match r.read_octet()? {
        0x80 => {
            let address = r.read_text_string()?;
            let consumed = r.position() - start;
            if consumed != len {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("From length {len} does not match address of {consumed} octets"),
                ));
            }
            Ok(Some(address))
        }
        0x81 => {
            r.seek(end)?;
            Ok(None)
        }
        token => Err(CodecError::bad_encoding(
            start,
            format!("bad From address token {token:#04x}"),
        )),
    }
}

fn read_expiry(r: &mut Reader<'_>) -> CodecResult<Expiry> {
    let offset = r.position();
    let end = r.read_required_length("expiry")?;
    let result = (|| {
        let token = r.read_octet()?;
        let value = r.read_integer()?;
        let expiry = match token {
            0x80 => Expiry::Absolute(value),
            0x81 => Expiry::Relative(value),
            _ => {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("bad expiry token {token:#04x}"),
                ));
            }
        };
        r.seek(end)?;
        Ok(expiry)
    })();
    if result.is_err() {
        r.seek(offset)?;
    }
    result
}

fn read_class(r: &mut Reader<'_>) -> CodecResult<MessageClass> {
    if r.peek()? & 0x80 == 0 {
        return r.read_text_string().map(MessageClass::Other);
    }
    let offset = r.position();
    let token = r.read_octet()?;
    MessageClass::from_token(token).ok_or_else(|| {
        CodecError::bad_encoding(offset, format!("bad message class {token:#04x}"))
    })
}

/// Decodes any MMS PDU by dispatching on its message type.
pub fn decode_pdu(data: &[u8]) -> Result<MmsPdu, DecodeError> {
    let found = match data {
        [b, t, ..] if *b == MmsField::MessageType.octet() => *t,
        _ => {
            return Err(CodecError::bad_encoding(0, "PDU does not start with X-Mms-Message-Type").into());
        }
    };
    let Some(message_type) = MessageType::from_octet(found) else {
        return Err(CodecError::UnexpectedType {
            expected: MessageType::SendReq.octet(),
            found,
        }
        .into());
    };
    Ok(match message_type {
        MessageType::SendReq => MmsPdu::SendReq(MSendReq::decode(data)?),
        MessageType::SendConf => MmsPdu::SendConf(MSendConf::decode(data)?),
        MessageType::NotificationInd => MmsPdu::NotificationInd(MNotificationInd::decode(data)?),
        MessageType::NotifyRespInd => MmsPdu::NotifyRespInd(MNotifyRespInd::decode(data)?),
        MessageType::RetrieveConf => MmsPdu::RetrieveConf(MRetrieveConf::decode(data)?),
        MessageType::AcknowledgeInd => MmsPdu::AcknowledgeInd(MAcknowledgeInd::decode(data)?),
        MessageType::DeliveryInd => MmsPdu::DeliveryInd(MDeliveryInd::decode(data)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{SendStatus, Status};

    fn notification_bytes() -> Vec<u8> {
        let mut b = vec![0x8C, 0x82, 0x98];
        b.extend_from_slice(b"tid-1\0");
        b.extend_from_slice(&[0x8D, 0x92]);
        // From: address-present
        let address = b"+1555/TYPE=PLMN";
        b.push(0x89);
        b.push((address.len() + 2) as u8);
        b.push(0x80);
        b.extend_from_slice(address);
        b.push(0);
        b.extend_from_slice(&[0x8A, 0x80, 0x8E, 0x02, 0x2A, 0x10]);
        b.extend_from_slice(&[0x88, 0x05, 0x81, 0x03, 0x01, 0x51, 0x80]);
        b.push(0x83);
        b.extend_from_slice(b"http://mmsc.example.com/get?id=1\0");
        b
    }

    #[test]
    fn decodes_notification() {
        let n = MNotificationInd::decode(&notification_bytes()).unwrap();
        assert_eq!(n.transaction_id, "tid-1");
        assert_eq!(n.version, 0x12);
        assert_eq!(n.from.as_deref(), Some("+1555/TYPE=PLMN"));
        assert_eq!(n.class, Some(MessageClass::Personal));
        assert_eq!(n.size, 0x2A10);
        assert_eq!(n.expiry, Some(Expiry::Relative(0x015180)));
        assert_eq!(n.content_location, "http://mmsc.example.com/get?id=1");
    }

    #[test]
    fn wrong_type_is_rejected_with_log() {
        let mut bytes = notification_bytes();
        bytes[1] = 0x84;
        let err = MNotificationInd::decode(&bytes).unwrap_err();
        assert_eq!(
            err.error,
            CodecError::UnexpectedType {
                expected: 0x82,
                found: 0x84
            }
        );
        assert!(err.log.contains("error"));
    }

    #[test]
    fn from_uintvar_length() {
        // 0x20 is read as a plain uintvar length
        let address = "01189998819991197253/TYPE=PLMN";
        let mut bytes = vec![0x8C, 0x82, 0x89, 0x20, 0x80];
        bytes.extend_from_slice(address.as_bytes());
        bytes.push(0);
        let n = MNotificationInd::decode(&bytes).unwrap();
        assert_eq!(n.from.as_deref(), Some(address));
    }

    #[test]
    fn from_length_mismatch() {
        let bytes = [0x8C, 0x82, 0x89, 0x05, 0x80, b'a', 0x00, 0x98, b't', 0x00];
        let err = MNotificationInd::decode(&bytes).unwrap_err();
        assert!(matches!(err.error, CodecError::BadEncoding { .. }));
    }

    #[test]
    fn from_insert_address() {
        let bytes = [0x8C, 0x82, 0x89, 0x01, 0x81, 0x98, b'x', 0x00];
        let n = MNotificationInd::decode(&bytes).unwrap();
        assert_eq!(n.from, None);
        assert_eq!(n.transaction_id, "x");
    }

    #[test]
    fn unknown_fields_are_skipped() {
        // 0x3F (unassigned) with a value-length block, then an application header
        let mut bytes = vec![0x8C, 0x82, 0xBF, 0x02, 0xAA, 0xBB];
        bytes.extend_from_slice(b"X-Vendor\0yes\0");
        bytes.extend_from_slice(b"\x98t\0");
        let n = MNotificationInd::decode(&bytes).unwrap();
        assert_eq!(n.transaction_id, "t");
    }

    #[test]
    fn lenient_pdu_ignores_foreign_field() {
        // Response-Status is not part of a notification
        let bytes = [0x8C, 0x82, 0x92, 0x80, 0x98, b't', 0x00];
        let n = MNotificationInd::decode(&bytes).unwrap();
        assert_eq!(n.transaction_id, "t");
    }

    #[test]
    fn strict_pdu_rejects_foreign_field() {
        let bytes = [0x8C, 0x83, 0x98, b't', 0x00, 0x83, b'x', 0x00];
        let err = MNotifyRespInd::decode(&bytes).unwrap_err();
        assert_eq!(
            err.error,
            CodecError::UnexpectedField {
                field: 0x03,
                pdu: "m-notifyresp-ind"
            }
        );
    }

    #[test]
    fn version_is_short_integer() {
        let conf = MSendConf::decode(&[0x8C, 0x81, 0x8D, 0x93]).unwrap();
        assert_eq!(conf.version, 0x13);
    }

    #[test]
    fn send_conf_status() {
        let mut bytes = vec![0x8C, 0x81, 0x98];
        bytes.extend_from_slice(b"abc\0");
        bytes.extend_from_slice(&[0x8D, 0x90, 0x92, 0xE3, 0x8B]);
        bytes.extend_from_slice(b"mid\0");
        let conf = MSendConf::decode(&bytes).unwrap();
        assert_eq!(conf.status(), SendStatus::TransientError);
        assert_eq!(conf.message_id.as_deref(), Some("mid"));
    }

    #[test]
    fn missing_message_type() {
        let err = MNotificationInd::decode(&[0x98, b't', 0x00]).unwrap_err();
        assert!(matches!(err.error, CodecError::BadEncoding { .. }));
    }

    #[test]
    fn truncated_pdu() {
        let bytes = notification_bytes();
        let err = MNotificationInd::decode(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err.error, CodecError::ShortRead { .. }));
    }

    #[test]
    fn retrieve_conf_multipart() {
        let mut b = vec![0x8C, 0x84, 0x98];
        b.extend_from_slice(b"r1\0");
        b.extend_from_slice(&[0x8D, 0x90, 0x97]);
        b.extend_from_slice(b"me\0");
        b.extend_from_slice(&[0x84, 0xA3, 0x02]);
        // part 1: text/plain;charset=utf-8 with Content-Location
        let mut h1 = vec![0x03, 0x83, 0x81, 0xEA, 0x8E];
        h1.extend_from_slice(b"a.txt\0");
        b.push(h1.len() as u8);
        b.push(5);
        b.extend_from_slice(&h1);
        b.extend_from_slice(b"hello");
        // part 2: image/jpeg with Content-ID and an unknown trailing header
        let mut h2 = vec![0x9E, 0xC0, 0x22];
        h2.extend_from_slice(b"<img>\0");
        h2.extend_from_slice(&[0xA9, 0x80]);
        b.push(h2.len() as u8);
        b.push(3);
        b.extend_from_slice(&h2);
        b.extend_from_slice(&[1, 2, 3]);

        let conf = MRetrieveConf::decode(&b).unwrap();
        assert_eq!(conf.to, vec!["me".to_string()]);
        assert_eq!(conf.content_type.media_type, "application/vnd.wap.multipart.mixed");
        assert_eq!(conf.attachments.len(), 2);
        let text = &conf.attachments[0];
        assert_eq!(text.media_type, "text/plain;charset=utf-8");
        assert_eq!(text.content_location.as_deref(), Some("a.txt"));
        assert_eq!(text.data, b"hello");
        assert_eq!(&b[text.offset..text.offset + 5], b"hello");
        let image = &conf.attachments[1];
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.content_id.as_deref(), Some("<img>"));
        assert_eq!(image.data, vec![1, 2, 3]);
    }

    #[test]
    fn decode_pdu_dispatches() {
        let bytes = [0x8C, 0x83, 0x98, b'7', 0x00, 0x8D, 0x90, 0x95, 0x81];
        match decode_pdu(&bytes).unwrap() {
            MmsPdu::NotifyRespInd(resp) => {
                assert_eq!(resp.transaction_id, "7");
                assert_eq!(resp.status, Status::Retrieved);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(decode_pdu(&[0x98, 0x00]).is_err());
    }
}
