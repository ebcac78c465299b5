//! WSP `Content-Type` values with their parameters.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, CodecResult};
use crate::tables::{self, ParamKind};
use crate::wire::{Reader, Writer};

/// A media type plus parameters keyed by their canonical lowercase names
/// (`charset`, `type`, `start`, `start-info`, `name`, `filename`, `size`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub media_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    pub fn start(&self) -> Option<&str> {
        self.param("start")
    }

    pub fn name(&self) -> Option<&str> {
        self.param("name")
    }

    pub fn filename(&self) -> Option<&str> {
        self.param("filename")
    }

    pub fn is_multipart(&self) -> bool {
        let media = self.media_type.to_ascii_lowercase();
        media.starts_with("multipart/") || media.starts_with("application/vnd.wap.multipart.")
    }

    /// Parses `type/subtype; key=value; ...` as found in attachment metadata.
    pub fn parse(text: &str) -> Self {
        let mut pieces = text.split(';');
        let mut ct = Self::new(pieces.next().unwrap_or_default().trim());
        for piece in pieces {
            if let Some((key, value)) = piece.split_once('=') {
                let value = value.trim().trim_matches('"');
                ct.parameters
                    .insert(key.trim().to_ascii_lowercase(), value.to_string());
            }
        }
        ct
    }

    /// Media type with the charset re-attached, e.g. `text/plain;charset=utf-8`.
    pub fn media_type_with_charset(&self) -> String {
        match self.charset() {
            Some(charset) => format!("{};charset={charset}", self.media_type),
            None => self.media_type.clone(),
        }
    }

    /// Reads a content-type value: a well-known short-integer, a bare
    /// media type string, or the general form with parameters.
    ///
    /// Unknown parameter codes are noted in `log` and the rest of the
    /// value is skipped.
    pub fn decode(r: &mut Reader<'_>, log: &mut String) -> CodecResult<Self> {
        let start = r.position();
        let result = Self::decode_inner(r, log);
        if result.is_err() {
            r.seek(start)?;
        }
        result
    }

    fn decode_inner(r: &mut Reader<'_>, log: &mut String) -> CodecResult<Self> {
        let Some(len) = r.read_value_length()? else {
            return Ok(Self::new(read_media(r)?));
        };
        let end = r.end_of(len)?;
        let mut ct = Self::new(read_media(r)?);
        while r.position() < end {
            match read_parameter(r)? {
                Some((key, value)) => {
                    ct.parameters.insert(key, value);
                }
                None => {
                    let _ = writeln!(
                        log,
                        "unknown content-type parameter at offset {}, skipping to {end}",
                        r.position()
                    );
                    warn!(offset = r.position(), "unknown content-type parameter");
                    break;
                }
            }
        }
        r.seek(end)?;
        Ok(ct)
    }

    /// Writes the compact form when there are no parameters and the general
    /// form otherwise.
    pub fn encode(&self, w: &mut Writer) -> CodecResult<()> {
        if self.parameters.is_empty() {
            write_media(w, &self.media_type);
            return Ok(());
        }
        let mut inner = Writer::new();
        write_media(&mut inner, &self.media_type);
        for (key, value) in &self.parameters {
            write_parameter(&mut inner, key, value)?;
        }
        w.write_value_length(inner.len());
        w.write_bytes(&inner.into_bytes());
        Ok(())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        for (key, value) in &self.parameters {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

fn read_media(r: &mut Reader<'_>) -> CodecResult<String> {
    let offset = r.position();
    let b = r.peek()?;
    if b & 0x80 == 0 && b > 0x1E {
        return r.read_text_string();
    }
    let code = r.read_integer()?;
    tables::content_type_name(code)
        .map(str::to_string)
        .ok_or_else(|| CodecError::bad_encoding(offset, format!("unknown content type {code:#04x}")))
}

fn write_media(w: &mut Writer, media: &str) {
    match tables::content_type_code(media) {
        Some(code) => w.write_short_integer(code),
        None => w.write_text_string(media),
    }
}

/// Returns `None` when the parameter code is not a known one.
fn read_parameter(r: &mut Reader<'_>) -> CodecResult<Option<(String, String)>> {
    let b = r.peek()?;
    if b & 0x80 == 0 && b > 0x1E {
        let key = r.read_text_string()?.to_ascii_lowercase();
        let value = read_untyped_value(r)?;
        return Ok(Some((key, value)));
    }
    let start = r.position();
    let code = r.read_integer()?;
    let Some(param) = tables::well_known_param(code) else {
        r.seek(start)?;
        return Ok(None);
    };
    let value = match param.kind {
        ParamKind::QValue => format!("{:.3}", r.read_q_value()?)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        ParamKind::Charset => {
            let code = r.read_charset()?;
            tables::charset_name(code)
                .map(str::to_string)
                .ok_or_else(|| CodecError::UnknownCharset(code.to_string()))?
        }
        ParamKind::Version => read_version(r)?,
        ParamKind::Integer | ParamKind::Date => r.read_integer()?.to_string(),
        ParamKind::ShortInteger => r.read_short_integer()?.to_string(),
        ParamKind::ConstrainedEncoding => read_media(r)?,
        ParamKind::Text => r.read_text_string()?,
        ParamKind::NoValue => {
            if r.peek()? == 0 {
                r.read_octet()?;
            }
            String::new()
        }
    };
    Ok(Some((param.key.to_string(), value)))
}

fn read_untyped_value(r: &mut Reader<'_>) -> CodecResult<String> {
    let b = r.peek()?;
    if b & 0x80 != 0 || b <= 0x1E {
        return r.read_integer().map(|v| v.to_string());
    }
    r.read_text_string()
}

fn read_version(r: &mut Reader<'_>) -> CodecResult<String> {
    if r.peek()? & 0x80 == 0 {
        return r.read_text_string();
    }
    let v = r.read_short_integer()?;
    let major = (v >> 4) & 0x07;
    let minor = v & 0x0F;
    Ok(if minor == 0x0F {
        major.to_string()
    } else {
        format!("{major}.{minor}")
    })
}

fn write_parameter(w: &mut Writer, key: &str, value: &str) -> CodecResult<()> {
    let Some(param) = tables::encoding_param(key) else {
        w.write_text_string(key);
        w.write_text_string(value);
        return Ok(());
    };
    let numeric = |value: &str| {
        value
            .parse::<u64>()
            .map_err(|_| CodecError::bad_encoding(0, format!("parameter {key}={value} is not numeric")))
    };
    w.write_short_integer(param.code);
    match param.kind {
        ParamKind::Charset => {
            let code = tables::charset_code(value)
                .ok_or_else(|| CodecError::UnknownCharset(value.to_string()))?;
            w.write_integer(code);
        }
        ParamKind::ConstrainedEncoding => write_media(w, value),
        ParamKind::Integer | ParamKind::Date => w.write_integer(numeric(value)?),
        ParamKind::QValue => {
            let q: f64 = value
                .parse()
                .map_err(|_| CodecError::bad_encoding(0, format!("bad q-value {value}")))?;
            let scaled = (q * 100.0).round();
            if (scaled / 100.0 - q).abs() < f64::EPSILON {
                w.write_uintvar(scaled as u64 + 1);
            } else {
                w.write_uintvar((q * 1000.0).round() as u64 + 100);
            }
        }
        ParamKind::Version => match value.split_once('.') {
            Some((major, minor)) => {
                let major = numeric(major)? as u8 & 0x07;
                let minor = numeric(minor)? as u8 & 0x0F;
                w.write_short_integer((major << 4) | minor);
            }
            None => w.write_text_string(value),
        },
        ParamKind::ShortInteger => w.write_short_integer(numeric(value)? as u8 & 0x7F),
        ParamKind::Text | ParamKind::NoValue => w.write_text_string(value),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> (ContentType, usize, String) {
        let mut r = Reader::new(bytes);
        let mut log = String::new();
        let ct = ContentType::decode(&mut r, &mut log).unwrap();
        (ct, r.position(), log)
    }

    #[test]
    fn short_form_well_known() {
        let (ct, pos, _) = decode(&[0xBE]);
        assert_eq!(ct.media_type, "application/vnd.wap.mms-message");
        assert!(ct.parameters.is_empty());
        assert_eq!(pos, 1);
    }

    #[test]
    fn text_form() {
        let (ct, _, _) = decode(b"application/smil\0");
        assert_eq!(ct.media_type, "application/smil");
    }

    #[test]
    fn general_form_with_parameters() {
        // multipart.related; type=application/smil; start=<smil>
        let mut bytes = vec![0x1B, 0xB3, 0x89];
        bytes.extend_from_slice(b"application/smil\0");
        bytes.push(0x8A);
        bytes.extend_from_slice(b"<smil>\0");
        assert_eq!(bytes.len() - 1, 0x1B);
        let (ct, pos, _) = decode(&bytes);
        assert_eq!(ct.media_type, "application/vnd.wap.multipart.related");
        assert_eq!(ct.param("type"), Some("application/smil"));
        assert_eq!(ct.start(), Some("<smil>"));
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn charset_parameter_is_named() {
        let (ct, _, _) = decode(&[0x03, 0x83, 0x81, 0xEA]);
        assert_eq!(ct.media_type, "text/plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.media_type_with_charset(), "text/plain;charset=utf-8");
    }

    #[test]
    fn unknown_parameter_skips_to_end() {
        // code 0x04 is unassigned
        let (ct, pos, log) = decode(&[0x05, 0x83, 0x85, b'a', 0x00, 0x84, 0xAA]);
        assert_eq!(ct.name(), Some("a"));
        assert_eq!(pos, 6);
        assert!(log.contains("unknown content-type parameter"));
    }

    #[test]
    fn untyped_parameter() {
        let mut bytes = vec![0x0F, 0x83];
        bytes.extend_from_slice(b"format\0flowed\0");
        let (ct, _, _) = decode(&bytes);
        assert_eq!(ct.param("format"), Some("flowed"));
    }

    #[test]
    fn encode_uses_compat_codes() {
        let ct = ContentType::new("application/vnd.wap.multipart.related")
            .with_param("start", "<smil>")
            .with_param("type", "application/smil");
        let mut w = Writer::new();
        ct.encode(&mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes[1], 0xB3);
        assert!(bytes.contains(&0x8A));
        assert!(bytes.contains(&0x89));

        let (back, _, _) = decode(&bytes);
        assert_eq!(back, ct);
    }

    #[test]
    fn parse_attachment_media_type() {
        let ct = ContentType::parse("text/plain; charset=\"UTF-8\"; name=hello.txt");
        assert_eq!(ct.media_type, "text/plain");
        assert_eq!(ct.charset(), Some("UTF-8"));
        assert_eq!(ct.name(), Some("hello.txt"));
        assert_eq!(ct.to_string(), "text/plain;charset=UTF-8;name=hello.txt");
    }

    #[test]
    fn failed_decode_restores_cursor() {
        let mut r = Reader::new(&[0x05, 0x83]);
        let mut log = String::new();
        assert!(ContentType::decode(&mut r, &mut log).is_err());
        assert_eq!(r.position(), 0);
    }
}
