//! Well-known assignment tables from WAP-230 and OMA-MMS-ENC.

use std::fmt;

/// MIBenum of UTF-8.
pub const CHARSET_UTF8: u64 = 106;

/// `X-Mms-Message-Type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    SendReq = 0x80,
    SendConf = 0x81,
    NotificationInd = 0x82,
    NotifyRespInd = 0x83,
    RetrieveConf = 0x84,
    AcknowledgeInd = 0x85,
    DeliveryInd = 0x86,
}

impl MessageType {
    pub fn from_octet(b: u8) -> Option<Self> {
        Some(match b {
            0x80 => Self::SendReq,
            0x81 => Self::SendConf,
            0x82 => Self::NotificationInd,
            0x83 => Self::NotifyRespInd,
            0x84 => Self::RetrieveConf,
            0x85 => Self::AcknowledgeInd,
            0x86 => Self::DeliveryInd,
            _ => return None,
        })
    }

    pub fn octet(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SendReq => "m-send-req",
            Self::SendConf => "m-send-conf",
            Self::NotificationInd => "m-notification-ind",
            Self::NotifyRespInd => "m-notifyresp-ind",
            Self::RetrieveConf => "m-retrieve-conf",
            Self::AcknowledgeInd => "m-acknowledge-ind",
            Self::DeliveryInd => "m-delivery-ind",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the value of an MMS header field is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Octet,
    ShortInteger,
    LongInteger,
    Integer,
    Text,
    EncodedString,
    From,
    /// value-length, absolute/relative token, integer.
    Expiry,
    /// A token octet or a text string.
    Token,
    ContentType,
    /// A value-length prefixed structure the decoder does not interpret.
    Opaque,
}

macro_rules! mms_fields {
    ($($variant:ident = $code:literal, $name:literal, $kind:ident;)*) => {
        /// Well-known MMS header fields (codes 0x01..=0x21, sent with the high bit set).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum MmsField {
            $($variant = $code,)*
        }

        impl MmsField {
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            pub fn kind(self) -> FieldKind {
                match self {
                    $(Self::$variant => FieldKind::$kind,)*
                }
            }
        }
    };
}

mms_fields! {
    Bcc = 0x01, "Bcc", EncodedString;
    Cc = 0x02, "Cc", EncodedString;
    ContentLocation = 0x03, "X-Mms-Content-Location", Text;
    ContentType = 0x04, "Content-Type", ContentType;
    Date = 0x05, "Date", LongInteger;
    DeliveryReport = 0x06, "X-Mms-Delivery-Report", Octet;
    DeliveryTime = 0x07, "X-Mms-Delivery-Time", Expiry;
    Expiry = 0x08, "X-Mms-Expiry", Expiry;
    From = 0x09, "From", From;
    MessageClass = 0x0A, "X-Mms-Message-Class", Token;
    MessageId = 0x0B, "Message-ID", Text;
    MessageType = 0x0C, "X-Mms-Message-Type", Octet;
    MmsVersion = 0x0D, "X-Mms-MMS-Version", ShortInteger;
    MessageSize = 0x0E, "X-Mms-Message-Size", LongInteger;
    Priority = 0x0F, "X-Mms-Priority", Octet;
    ReadReport = 0x10, "X-Mms-Read-Report", Octet;
    ReportAllowed = 0x11, "X-Mms-Report-Allowed", Octet;
    ResponseStatus = 0x12, "X-Mms-Response-Status", Octet;
    ResponseText = 0x13, "X-Mms-Response-Text", EncodedString;
    SenderVisibility = 0x14, "X-Mms-Sender-Visibility", Octet;
    Status = 0x15, "X-Mms-Status", Octet;
    Subject = 0x16, "Subject", EncodedString;
    To = 0x17, "To", EncodedString;
    TransactionId = 0x18, "X-Mms-Transaction-Id", Text;
    RetrieveStatus = 0x19, "X-Mms-Retrieve-Status", Octet;
    RetrieveText = 0x1A, "X-Mms-Retrieve-Text", EncodedString;
    ReadStatus = 0x1B, "X-Mms-Read-Status", Octet;
    ReplyCharging = 0x1C, "X-Mms-Reply-Charging", Octet;
    ReplyChargingDeadline = 0x1D, "X-Mms-Reply-Charging-Deadline", Expiry;
    ReplyChargingId = 0x1E, "X-Mms-Reply-Charging-ID", Text;
    ReplyChargingSize = 0x1F, "X-Mms-Reply-Charging-Size", LongInteger;
    PreviouslySentBy = 0x20, "X-Mms-Previously-Sent-By", Opaque;
    PreviouslySentDate = 0x21, "X-Mms-Previously-Sent-Date", Opaque;
}

impl MmsField {
    /// The header octet as written on the wire.
    pub fn octet(self) -> u8 {
        self as u8 | 0x80
    }
}

/// Value layout of a well-known WSP parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    QValue,
    Charset,
    Version,
    Integer,
    ShortInteger,
    ConstrainedEncoding,
    Text,
    Date,
    NoValue,
}

/// Well-known WSP parameter (WAP-230 Table 38): code, canonical key, kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnownParam {
    pub code: u8,
    pub key: &'static str,
    pub kind: ParamKind,
}

const PARAMS: &[WellKnownParam] = &[
    param(0x00, "q", ParamKind::QValue),
    param(0x01, "charset", ParamKind::Charset),
    param(0x02, "level", ParamKind::Version),
    param(0x03, "type", ParamKind::Integer),
    param(0x05, "name", ParamKind::Text),
    param(0x06, "filename", ParamKind::Text),
    param(0x07, "differences", ParamKind::Text),
    param(0x08, "padding", ParamKind::ShortInteger),
    param(0x09, "type", ParamKind::ConstrainedEncoding),
    param(0x0A, "start", ParamKind::Text),
    param(0x0B, "start-info", ParamKind::Text),
    param(0x0C, "comment", ParamKind::Text),
    param(0x0D, "domain", ParamKind::Text),
    param(0x0E, "max-age", ParamKind::Integer),
    param(0x0F, "path", ParamKind::Text),
    param(0x10, "secure", ParamKind::NoValue),
    param(0x11, "sec", ParamKind::ShortInteger),
    param(0x12, "mac", ParamKind::Text),
    param(0x13, "creation-date", ParamKind::Date),
    param(0x14, "modification-date", ParamKind::Date),
    param(0x15, "read-date", ParamKind::Date),
    param(0x16, "size", ParamKind::Integer),
    param(0x17, "name", ParamKind::Text),
    param(0x18, "filename", ParamKind::Text),
    param(0x19, "start", ParamKind::Text),
    param(0x1A, "start-info", ParamKind::Text),
    param(0x1B, "comment", ParamKind::Text),
    param(0x1C, "domain", ParamKind::Text),
    param(0x1D, "path", ParamKind::Text),
];

const fn param(code: u8, key: &'static str, kind: ParamKind) -> WellKnownParam {
    WellKnownParam { code, key, kind }
}

pub fn well_known_param(code: u64) -> Option<&'static WellKnownParam> {
    PARAMS.iter().find(|p| u64::from(p.code) == code)
}

/// Parameter codes used when encoding. The deprecated 1.1 codes are
/// preferred because older MMSCs do not understand the 1.4 ones.
pub fn encoding_param(key: &str) -> Option<&'static WellKnownParam> {
    let code = match key {
        "q" => 0x00,
        "charset" => 0x01,
        "level" => 0x02,
        "name" => 0x05,
        "filename" => 0x06,
        "type" => 0x09,
        "start" => 0x0A,
        "start-info" => 0x0B,
        "size" => 0x16,
        _ => return None,
    };
    well_known_param(code)
}

/// WSP header field names (WAP-230 Table 39).
const HEADER_NAMES: &[&str] = &[
    "Accept",
    "Accept-Charset",
    "Accept-Encoding",
    "Accept-Language",
    "Accept-Ranges",
    "Age",
    "Allow",
    "Authorization",
    "Cache-Control",
    "Connection",
    "Content-Base",
    "Content-Encoding",
    "Content-Language",
    "Content-Length",
    "Content-Location",
    "Content-MD5",
    "Content-Range",
    "Content-Type",
    "Date",
    "Etag",
    "Expires",
    "From",
    "Host",
    "If-Modified-Since",
    "If-Match",
    "If-None-Match",
    "If-Range",
    "If-Unmodified-Since",
    "Location",
    "Last-Modified",
    "Max-Forwards",
    "Pragma",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "Public",
    "Range",
    "Referer",
    "Retry-After",
    "Server",
    "Transfer-Encoding",
    "Upgrade",
    "User-Agent",
    "Vary",
    "Via",
    "Warning",
    "WWW-Authenticate",
    "Content-Disposition",
    "X-Wap-Application-Id",
    "X-Wap-Content-URI",
    "X-Wap-Initiator-URI",
    "Accept-Application",
    "Bearer-Indication",
    "Push-Flag",
    "Profile",
    "Profile-Diff",
    "Profile-Warning",
    "Expect",
    "TE",
    "Trailer",
    "Accept-Charset",
    "Accept-Encoding",
    "Cache-Control",
    "Content-Range",
    "X-Wap-Tod",
    "Content-ID",
    "Set-Cookie",
    "Cookie",
    "Encoding-Version",
    "Profile-Warning",
    "Content-Disposition",
    "X-WAP-Security",
    "Cache-Control",
];

pub const HEADER_CONTENT_LENGTH: u8 = 0x0D;
pub const HEADER_CONTENT_LOCATION: u8 = 0x0E;
pub const HEADER_APPLICATION_ID: u8 = 0x2F;
pub const HEADER_PUSH_FLAG: u8 = 0x34;
pub const HEADER_CONTENT_ID: u8 = 0x40;
pub const HEADER_ENCODING_VERSION: u8 = 0x43;

pub fn header_name(code: u8) -> Option<&'static str> {
    HEADER_NAMES.get(code as usize).copied()
}

/// Well-known content types (WAP-230 Table 40), indexed by code.
const CONTENT_TYPES: &[&str] = &[
    "*/*",
    "text/*",
    "text/html",
    "text/plain",
    "text/x-hdml",
    "text/x-ttml",
    "text/x-vCalendar",
    "text/x-vCard",
    "text/vnd.wap.wml",
    "text/vnd.wap.wmlscript",
    "text/vnd.wap.wta-event",
    "multipart/*",
    "multipart/mixed",
    "multipart/form-data",
    "multipart/byteranges",
    "multipart/alternative",
    "application/*",
    "application/java-vm",
    "application/x-www-form-urlencoded",
    "application/x-hdmlc",
    "application/vnd.wap.wmlc",
    "application/vnd.wap.wmlscriptc",
    "application/vnd.wap.wta-eventc",
    "application/vnd.wap.uaprof",
    "application/vnd.wap.wtls-ca-certificate",
    "application/vnd.wap.wtls-user-certificate",
    "application/x-x509-ca-cert",
    "application/x-x509-user-cert",
    "image/*",
    "image/gif",
    "image/jpeg",
    "image/tiff",
    "image/png",
    "image/vnd.wap.wbmp",
    "application/vnd.wap.multipart.*",
    "application/vnd.wap.multipart.mixed",
    "application/vnd.wap.multipart.form-data",
    "application/vnd.wap.multipart.byteranges",
    "application/vnd.wap.multipart.alternative",
    "application/xml",
    "text/xml",
    "application/vnd.wap.wbxml",
    "application/x-x968-cross-cert",
    "application/x-x968-ca-cert",
    "application/x-x968-user-cert",
    "text/vnd.wap.si",
    "application/vnd.wap.sic",
    "text/vnd.wap.sl",
    "application/vnd.wap.slc",
    "text/vnd.wap.co",
    "application/vnd.wap.coc",
    "application/vnd.wap.multipart.related",
    "application/vnd.wap.sia",
    "text/vnd.wap.connectivity-xml",
    "application/vnd.wap.connectivity-wbxml",
    "application/pkcs7-mime",
    "application/vnd.wap.hashed-certificate",
    "application/vnd.wap.signed-certificate",
    "application/vnd.wap.cert-response",
    "application/xhtml+xml",
    "application/wml+xml",
    "text/css",
    "application/vnd.wap.mms-message",
    "application/vnd.wap.rollover-certificate",
    "application/vnd.wap.locc+wbxml",
    "application/vnd.wap.loc+xml",
    "application/vnd.syncml.dm+wbxml",
    "application/vnd.syncml.dm+xml",
    "application/vnd.syncml.notification",
    "application/vnd.wap.xhtml+xml",
    "application/vnd.wv.csp.cir",
    "application/vnd.oma.dd+xml",
    "application/vnd.oma.drm.message",
    "application/vnd.oma.drm.content",
    "application/vnd.oma.drm.rights+xml",
    "application/vnd.oma.drm.rights+wbxml",
    "application/vnd.wv.csp+xml",
    "application/vnd.wv.csp+wbxml",
    "application/vnd.syncml.ds.notification",
    "audio/*",
    "video/*",
    "application/vnd.oma.dd2+xml",
    "application/mikey",
];

pub fn content_type_name(code: u64) -> Option<&'static str> {
    usize::try_from(code)
        .ok()
        .and_then(|i| CONTENT_TYPES.get(i))
        .copied()
}

pub fn content_type_code(name: &str) -> Option<u8> {
    CONTENT_TYPES
        .iter()
        .position(|t| t.eq_ignore_ascii_case(name))
        .and_then(|i| u8::try_from(i).ok())
}

/// IANA MIBenum values of the charsets the codec knows by name.
const CHARSETS: &[(u64, &str)] = &[
    (0, "*"),
    (3, "us-ascii"),
    (4, "iso-8859-1"),
    (5, "iso-8859-2"),
    (6, "iso-8859-3"),
    (7, "iso-8859-4"),
    (8, "iso-8859-5"),
    (9, "iso-8859-6"),
    (10, "iso-8859-7"),
    (11, "iso-8859-8"),
    (12, "iso-8859-9"),
    (13, "iso-8859-10"),
    (17, "shift_JIS"),
    (18, "euc-jp"),
    (38, "euc-kr"),
    (39, "iso-2022-jp"),
    (40, "iso-2022-jp-2"),
    (106, "utf-8"),
    (109, "iso-8859-13"),
    (110, "iso-8859-14"),
    (111, "iso-8859-15"),
    (112, "iso-8859-16"),
    (113, "gbk"),
    (114, "gb18030"),
    (1000, "iso-10646-ucs-2"),
    (1013, "utf-16be"),
    (1014, "utf-16le"),
    (1015, "utf-16"),
    (2025, "gb2312"),
    (2026, "big5"),
    (2084, "koi8-r"),
    (2250, "windows-1250"),
    (2251, "windows-1251"),
    (2252, "windows-1252"),
    (2253, "windows-1253"),
    (2254, "windows-1254"),
    (2255, "windows-1255"),
    (2256, "windows-1256"),
    (2257, "windows-1257"),
    (2258, "windows-1258"),
];

pub fn charset_name(code: u64) -> Option<&'static str> {
    CHARSETS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn charset_code(name: &str) -> Option<u64> {
    let name = name.trim();
    CHARSETS
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(code, _)| *code)
        .or_else(|| match name.to_ascii_lowercase().as_str() {
            "utf8" => Some(CHARSET_UTF8),
            "ascii" => Some(3),
            "latin1" => Some(4),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_table_anchors() {
        assert_eq!(content_type_name(0x03), Some("text/plain"));
        assert_eq!(content_type_name(0x1E), Some("image/jpeg"));
        assert_eq!(content_type_name(0x23), Some("application/vnd.wap.multipart.mixed"));
        assert_eq!(content_type_name(0x33), Some("application/vnd.wap.multipart.related"));
        assert_eq!(content_type_name(0x3E), Some("application/vnd.wap.mms-message"));
        assert_eq!(content_type_name(0x52), Some("application/mikey"));
        assert_eq!(content_type_name(0x53), None);
        assert_eq!(content_type_code("Application/Vnd.Wap.MMS-Message"), Some(0x3E));
    }

    #[test]
    fn header_table_anchors() {
        assert_eq!(header_name(HEADER_CONTENT_LOCATION), Some("Content-Location"));
        assert_eq!(header_name(HEADER_APPLICATION_ID), Some("X-Wap-Application-Id"));
        assert_eq!(header_name(HEADER_PUSH_FLAG), Some("Push-Flag"));
        assert_eq!(header_name(HEADER_CONTENT_ID), Some("Content-ID"));
        assert_eq!(header_name(HEADER_ENCODING_VERSION), Some("Encoding-Version"));
        assert_eq!(header_name(0x47), Some("Cache-Control"));
        assert_eq!(header_name(0x48), None);
    }

    #[test]
    fn charsets_resolve_both_ways() {
        assert_eq!(charset_name(106), Some("utf-8"));
        assert_eq!(charset_code("UTF-8"), Some(106));
        assert_eq!(charset_code("utf8"), Some(106));
        assert_eq!(charset_code("*"), Some(0));
        assert_eq!(charset_name(2026), Some("big5"));
        assert_eq!(charset_code("klingon"), None);
    }

    #[test]
    fn fields_and_params() {
        assert_eq!(MmsField::from_code(0x18), Some(MmsField::TransactionId));
        assert_eq!(MmsField::TransactionId.octet(), 0x98);
        assert_eq!(MmsField::from_code(0x22), None);
        assert_eq!(MmsField::Expiry.kind(), FieldKind::Expiry);
        assert_eq!(well_known_param(0x19).map(|p| p.key), Some("start"));
        assert_eq!(well_known_param(0x04), None);
        assert_eq!(encoding_param("charset").map(|p| p.code), Some(0x01));
        assert_eq!(encoding_param("type").map(|p| p.code), Some(0x09));
        assert_eq!(encoding_param("start").map(|p| p.code), Some(0x0A));
        assert_eq!(encoding_param("name").map(|p| p.code), Some(0x05));
    }
}
