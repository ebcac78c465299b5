//! WSP push PDUs as delivered by the modem's push agent.

use std::fmt::Write as _;

use tracing::debug;

use crate::content_type::ContentType;
use crate::error::{CodecError, CodecResult};
use crate::tables;
use crate::wire::{Reader, Writer};

/// WSP PDU type of a push.
pub const PDU_TYPE_PUSH: u8 = 0x06;
/// `X-Wap-Application-Id` of the MMS user agent.
pub const MMS_APPLICATION_ID: u64 = 0x04;
/// Content type carried by MMS pushes.
pub const MMS_CONTENT_TYPE: &str = "application/vnd.wap.mms-message";

const MMS_APPLICATION_URN: &str = "x-wap-application:mms.ua";

/// A decoded WSP push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPdu {
    pub transaction_id: u8,
    pub content_type: ContentType,
    pub application_id: Option<u64>,
    pub push_flag: Option<u64>,
    pub encoding_version: Option<String>,
    pub content_length: Option<u64>,
    /// Payload after the headers.
    pub data: Vec<u8>,
}

impl PushPdu {
    /// Wraps an MMS PDU in a push addressed to the MMS user agent.
    pub fn mms(transaction_id: u8, data: Vec<u8>) -> Self {
        Self {
            transaction_id,
            content_type: ContentType::new(MMS_CONTENT_TYPE),
            application_id: Some(MMS_APPLICATION_ID),
            data,
            ..Self::default()
        }
    }

    /// True for pushes aimed at the MMS user agent.
    pub fn is_mms(&self) -> bool {
        self.application_id == Some(MMS_APPLICATION_ID)
            && self.content_type.media_type.eq_ignore_ascii_case(MMS_CONTENT_TYPE)
    }

    /// Decodes `[tid, 0x06, uintvar header-length, content-type, headers, body]`.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut log = String::new();
        Self::decode_with_log(bytes, &mut log)
    }

    pub fn decode_with_log(bytes: &[u8], log: &mut String) -> CodecResult<Self> {
        let mut r = Reader::new(bytes);
        let transaction_id = r.read_octet()?;
        let pdu_type = r.read_octet()?;
        if pdu_type != PDU_TYPE_PUSH {
            return Err(CodecError::NotAPush(pdu_type));
        }
        let header_len = r.read_uintvar()?;
        let headers_end = r.end_of(usize::try_from(header_len).map_err(|_| {
            CodecError::bad_encoding(r.position(), "push header length too large")
        })?)?;

        let mut push = Self {
            transaction_id,
            content_type: ContentType::decode(&mut r, log)?,
            ..Self::default()
        };
        let _ = writeln!(log, "Content-Type: {}", push.content_type);

        while r.position() < headers_end {
            let b = r.peek()?;
            if b & 0x80 == 0 {
                let name = r.read_text_string()?;
                let value = r.read_text_string()?;
                let _ = writeln!(log, "{name}: {value}");
                continue;
            }
            let code = r.read_octet()? & 0x7F;
            match code {
                tables::HEADER_APPLICATION_ID => {
                    push.application_id = read_application_id(&mut r)?;
                    let _ = writeln!(log, "X-Wap-Application-Id: {:?}", push.application_id);
                }
                tables::HEADER_PUSH_FLAG => {
                    push.push_flag = Some(r.read_integer()?);
                }
                tables::HEADER_ENCODING_VERSION => {
                    push.encoding_version = Some(read_encoding_version(&mut r)?);
                }
                tables::HEADER_CONTENT_LENGTH => {
                    push.content_length = Some(r.read_integer()?);
                }
                other => {
                    let name = tables::header_name(other).unwrap_or("unknown");
                    debug!(header = name, code = other, "skipping push header");
                    let _ = writeln!(log, "skipped {name} ({other:#04x})");
                    r.skip_value()?;
                }
            }
        }
        r.seek(headers_end)?;
        push.data = r.rest().to_vec();
        Ok(push)
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut headers = Writer::new();
        self.content_type.encode(&mut headers)?;
        if let Some(app_id) = self.application_id {
            headers.write_short_integer(tables::HEADER_APPLICATION_ID);
            headers.write_integer(app_id);
        }
        if let Some(flag) = self.push_flag {
            headers.write_short_integer(tables::HEADER_PUSH_FLAG);
            headers.write_integer(flag);
        }
        if let Some(length) = self.content_length {
            headers.write_short_integer(tables::HEADER_CONTENT_LENGTH);
            headers.write_integer(length);
        }

        let mut w = Writer::new();
        w.write_octet(self.transaction_id);
        w.write_octet(PDU_TYPE_PUSH);
        w.write_uintvar(headers.len() as u64);
        w.write_bytes(&headers.into_bytes());
        w.write_bytes(&self.data);
        Ok(w.into_bytes())
    }
}

fn read_application_id(r: &mut Reader<'_>) -> CodecResult<Option<u64>> {
    let b = r.peek()?;
    if b & 0x80 != 0 || b <= 0x1E {
        return r.read_integer().map(Some);
    }
    let urn = r.read_text_string()?;
    Ok(urn
        .eq_ignore_ascii_case(MMS_APPLICATION_URN)
        .then_some(MMS_APPLICATION_ID))
}

fn read_encoding_version(r: &mut Reader<'_>) -> CodecResult<String> {
    if r.peek()? & 0x80 == 0 {
        if let Some(len) = r.read_value_length()? {
            let end = r.end_of(len)?;
            let v = r.read_short_integer()?;
            r.seek(end)?;
            return Ok(format!("{}.{}", (v >> 4) & 0x07, v & 0x0F));
        }
        return r.read_text_string();
    }
    let v = r.read_short_integer()?;
    Ok(format!("{}.{}", (v >> 4) & 0x07, v & 0x0F))
}
