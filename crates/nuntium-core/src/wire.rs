//! WSP wire primitives.
//!
//! [`Reader`] is a cursor over a byte slice. Every `read_*` method either
//! returns the decoded value and advances the cursor past it, or returns an
//! error and leaves the cursor where it was. [`Writer`] is the encoding
//! counterpart and produces the canonical form of each primitive.

use crate::error::{CodecError, CodecResult};
use crate::tables;

/// Longest `value-length` that fits in a single octet.
pub const SHORT_LENGTH_MAX: u8 = 30;
/// Octet introducing a uintvar-encoded `value-length`.
pub const LENGTH_QUOTE: u8 = 0x1F;
/// Octet introducing a quoted string.
pub const QUOTE: u8 = 0x22;
/// Octet introducing a text string whose first character has the high bit set.
pub const TEXT_QUOTE: u8 = 0x7F;

const MAX_UINTVAR_OCTETS: usize = 5;
const MAX_LONG_INTEGER_OCTETS: usize = 30;

/// Cursor over an encoded PDU.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything from the cursor to the end of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> CodecResult<()> {
        if pos > self.data.len() {
            return Err(self.short_read_at(self.data.len(), pos - self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Checks that `len` bytes starting at the cursor exist and returns the
    /// offset just past them.
    pub fn end_of(&self, len: usize) -> CodecResult<usize> {
        if len > self.remaining() {
            return Err(self.short_read(len));
        }
        Ok(self.pos + len)
    }

    pub fn peek(&self) -> CodecResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.short_read(1))
    }

    pub fn read_octet(&mut self) -> CodecResult<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.end_of(len)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> CodecResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Runs `f` and rewinds the cursor if it fails.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<T>) -> CodecResult<T> {
        let start = self.pos;
        let result = f(self);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// `short-integer`: one octet with the high bit set, value in the low 7 bits.
    pub fn read_short_integer(&mut self) -> CodecResult<u8> {
        self.attempt(|r| {
            let offset = r.pos;
            let b = r.read_octet()?;
            if b & 0x80 == 0 {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("{b:#04x} is not a short-integer"),
                ));
            }
            Ok(b & 0x7F)
        })
    }

    /// `long-integer`: a length octet (at most 30) followed by that many
    /// big-endian value octets.
    pub fn read_long_integer(&mut self) -> CodecResult<u64> {
        self.attempt(|r| {
            let offset = r.pos;
            let len = r.read_octet()? as usize;
            if len > MAX_LONG_INTEGER_OCTETS {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("long-integer length {len} exceeds {MAX_LONG_INTEGER_OCTETS}"),
                ));
            }
            if len > 8 {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("long-integer of {len} octets overflows 64 bits"),
                ));
            }
            let bytes = r.read_bytes(len)?;
            Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
        })
    }

    /// `uintvar`: 7 bits per octet, continuation in the high bit, at most 5 octets.
    pub fn read_uintvar(&mut self) -> CodecResult<u64> {
        self.attempt(|r| {
            let offset = r.pos;
            let mut value = 0u64;
            for _ in 0..MAX_UINTVAR_OCTETS {
                let b = r.read_octet()?;
                value = (value << 7) | u64::from(b & 0x7F);
                if b & 0x80 == 0 {
                    return Ok(value);
                }
            }
            Err(CodecError::bad_encoding(
                offset,
                "uintvar longer than 5 octets",
            ))
        })
    }

    /// `integer-value`: short-integer or long-integer.
    pub fn read_integer(&mut self) -> CodecResult<u64> {
        if self.peek()? & 0x80 != 0 {
            self.read_short_integer().map(u64::from)
        } else {
            self.read_long_integer()
        }
    }

    /// `text-string`: NUL-terminated. A leading 0x22 or 0x7F quote is dropped.
    ///
    /// Bytes that are not valid UTF-8 are read as Latin-1.
    pub fn read_text_string(&mut self) -> CodecResult<String> {
        self.attempt(|r| {
            if matches!(r.peek()?, QUOTE | TEXT_QUOTE) {
                r.pos += 1;
            }
            let rest = r.rest();
            let Some(nul) = rest.iter().position(|b| *b == 0) else {
                return Err(r.short_read(rest.len() + 1));
            };
            let text = decode_text(&rest[..nul]);
            r.pos += nul + 1;
            Ok(text)
        })
    }

    /// `value-length`. Returns `None`, without consuming anything, when the
    /// next octet starts an inline value rather than a length.
    pub fn read_value_length(&mut self) -> CodecResult<Option<usize>> {
        self.attempt(|r| match r.peek()? {
            b if b <= SHORT_LENGTH_MAX => {
                r.pos += 1;
                Ok(Some(b as usize))
            }
            LENGTH_QUOTE => {
                r.pos += 1;
                let len = r.read_uintvar()?;
                Ok(Some(r.checked_len(len)?))
            }
            _ => Ok(None),
        })
    }

    /// Reads a `value-length` that must be present and checks that the
    /// value fits in the buffer. Returns the offset just past the value.
    pub fn read_required_length(&mut self, what: &str) -> CodecResult<usize> {
        self.attempt(|r| {
            let offset = r.pos;
            let Some(len) = r.read_value_length()? else {
                return Err(CodecError::bad_encoding(
                    offset,
                    format!("{what} requires a value-length"),
                ));
            };
            r.end_of(len)
        })
    }

    /// `encoded-string-value`: a bare text-string, or value-length, charset
    /// and text-string. Only charsets the text decoder understands are
    /// accepted in the long form.
    ///
    /// A lone NUL is the empty text-string, not a zero value-length.
    pub fn read_encoded_string(&mut self) -> CodecResult<String> {
        self.attempt(|r| {
            if r.peek()? == 0 {
                r.pos += 1;
                return Ok(String::new());
            }
            let Some(len) = r.read_value_length()? else {
                return r.read_text_string();
            };
            let end = r.end_of(len)?;
            let charset = r.read_charset()?;
            if r.pos > end {
                return Err(CodecError::bad_encoding(
                    r.pos,
                    "encoded-string charset overruns its length",
                ));
            }
            let mut body = &r.data[r.pos..end];
            if matches!(body.first(), Some(&QUOTE) | Some(&TEXT_QUOTE)) {
                body = &body[1..];
            }
            let body = body.strip_suffix(&[0]).unwrap_or(body);
            let text = decode_charset(charset, body).ok_or_else(|| {
                CodecError::UnknownCharset(
                    tables::charset_name(charset)
                        .map_or_else(|| charset.to_string(), str::to_string),
                )
            })?;
            r.pos = end;
            Ok(text)
        })
    }

    /// Charset as a MIBenum: short-integer, long-integer or a registered
    /// name. `*` and the "any charset" octet map to 0.
    pub fn read_charset(&mut self) -> CodecResult<u64> {
        self.attempt(|r| {
            let b = r.peek()?;
            if b & 0x80 != 0 || b <= SHORT_LENGTH_MAX {
                return r.read_integer();
            }
            let name = r.read_text_string()?;
            tables::charset_code(&name).ok_or(CodecError::UnknownCharset(name))
        })
    }

    /// `q-value`: uintvar `v`, 1..=100 maps to `(v-1)/100`, above that to
    /// `(v-100)/1000`.
    pub fn read_q_value(&mut self) -> CodecResult<f64> {
        self.attempt(|r| {
            let offset = r.pos;
            let v = r.read_uintvar()?;
            match v {
                0 => Err(CodecError::bad_encoding(offset, "q-value of zero")),
                1..=100 => Ok((v - 1) as f64 / 100.0),
                _ => Ok((v - 100) as f64 / 1000.0),
            }
        })
    }

    /// Skips one header value using the generic WSP rule: a single octet
    /// for short values, a value-length prefixed block, or a text string.
    pub fn skip_value(&mut self) -> CodecResult<()> {
        self.attempt(|r| {
            let b = r.peek()?;
            if b & 0x80 != 0 {
                r.pos += 1;
                return Ok(());
            }
            if let Some(len) = r.read_value_length()? {
                return r.skip(len);
            }
            r.read_text_string().map(|_| ())
        })
    }

    fn checked_len(&self, len: u64) -> CodecResult<usize> {
        usize::try_from(len)
            .map_err(|_| CodecError::bad_encoding(self.pos, format!("length {len} is too large")))
    }

    fn short_read(&self, needed: usize) -> CodecError {
        self.short_read_at(self.pos, needed)
    }

    fn short_read_at(&self, offset: usize, needed: usize) -> CodecError {
        CodecError::ShortRead {
            offset,
            needed,
            available: self.data.len().saturating_sub(offset),
        }
    }
}

/// UTF-8 with a Latin-1 fallback.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|b| char::from(*b)).collect(),
    }
}

/// Converts `bytes` in the charset identified by `mib` to a string, or
/// `None` for charsets without a converter.
pub(crate) fn decode_charset(mib: u64, bytes: &[u8]) -> Option<String> {
    match mib {
        // any, utf-8
        0 | 106 => Some(decode_text(bytes)),
        3 => Some(bytes.iter().map(|b| char::from(*b & 0x7F)).collect()),
        4 => Some(bytes.iter().map(|b| char::from(*b)).collect()),
        1000 | 1013 | 1015 => decode_utf16(bytes, u16::from_be_bytes),
        1014 => decode_utf16(bytes, u16::from_le_bytes),
        _ => None,
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    String::from_utf16(&units).ok()
}

/// Output buffer for encoded PDUs.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_octet(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `value` (0..=127) as a short-integer.
    pub fn write_short_integer(&mut self, value: u8) {
        self.buf.push(value | 0x80);
    }

    /// Writes the minimal big-endian long-integer for `value`.
    pub fn write_long_integer(&mut self, value: u64) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
        self.buf.push((8 - skip) as u8);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    /// Short-integer when it fits, long-integer otherwise.
    pub fn write_integer(&mut self, value: u64) {
        match u8::try_from(value) {
            Ok(v) if v < 0x80 => self.write_short_integer(v),
            _ => self.write_long_integer(value),
        }
    }

    pub fn write_uintvar(&mut self, mut value: u64) {
        let mut groups = vec![(value & 0x7F) as u8];
        value >>= 7;
        while value > 0 {
            groups.push(((value & 0x7F) as u8) | 0x80);
            value >>= 7;
        }
        groups.reverse();
        self.buf.extend_from_slice(&groups);
    }

    pub fn write_value_length(&mut self, len: usize) {
        if len <= SHORT_LENGTH_MAX as usize {
            self.buf.push(len as u8);
        } else {
            self.buf.push(LENGTH_QUOTE);
            self.write_uintvar(len as u64);
        }
    }

    /// NUL-terminated text, quoted with 0x7F when the first octet has the
    /// high bit set or would itself be taken for a quote.
    pub fn write_text_string(&mut self, text: &str) {
        if text
            .as_bytes()
            .first()
            .is_some_and(|b| b & 0x80 != 0 || matches!(*b, QUOTE | TEXT_QUOTE))
        {
            self.buf.push(TEXT_QUOTE);
        }
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
    }

    pub fn write_quoted_string(&mut self, text: &str) {
        self.buf.push(QUOTE);
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
    }

    /// Plain text for ASCII, value-length + utf-8 charset + text otherwise.
    pub fn write_encoded_string(&mut self, text: &str) {
        if text.is_ascii() {
            self.write_text_string(text);
            return;
        }
        let mut inner = Writer::new();
        inner.write_integer(tables::CHARSET_UTF8);
        inner.write_text_string(text);
        self.write_value_length(inner.len());
        self.write_bytes(&inner.buf);
    }
}
