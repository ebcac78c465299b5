//! Bearer contexts and the order in which they are tried.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BearerError, BearerResult};

pub const DEFAULT_PROXY_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Internet,
    Mms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    /// Parses `host`, `host:port` or `http://host:port/`. An empty string
    /// means no proxy.
    pub fn parse(text: &str) -> BearerResult<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let bare = text
            .strip_prefix("http://")
            .unwrap_or(text)
            .trim_end_matches('/');
        let (host, port) = match bare.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| BearerError::ProxyParse(text.to_string()))?;
                (host, port)
            }
            None => (bare, DEFAULT_PROXY_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(BearerError::ProxyParse(text.to_string()));
        }
        Ok(Some(Self {
            host: host.to_string(),
            port,
        }))
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A packet-data context as reported by the radio daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerContext {
    pub id: String,
    pub kind: ContextKind,
    #[serde(default)]
    pub active: bool,
    /// MMSC URL; empty when the context has none.
    #[serde(default)]
    pub message_center: String,
    /// Raw proxy setting, parsed when the context is used.
    #[serde(default)]
    pub proxy: String,
    #[serde(default)]
    pub name: String,
}

impl BearerContext {
    pub fn new(id: impl Into<String>, kind: ContextKind) -> Self {
        Self {
            id: id.into(),
            kind,
            active: false,
            message_center: String::new(),
            proxy: String::new(),
            name: String::new(),
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_message_center(mut self, url: impl Into<String>) -> Self {
        self.message_center = url.into();
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn has_message_center(&self) -> bool {
        !self.message_center.is_empty()
    }

    /// Whether the context can carry MMS at all.
    pub fn is_mms_capable(&self) -> bool {
        self.has_message_center() || self.kind == ContextKind::Mms
    }

    /// An internet context is only borrowed while already up; MMS
    /// contexts are brought up on demand.
    pub fn is_candidate(&self) -> bool {
        match self.kind {
            ContextKind::Internet => self.active && self.has_message_center(),
            ContextKind::Mms => true,
        }
    }

    pub fn parsed_proxy(&self) -> BearerResult<Option<Proxy>> {
        Proxy::parse(&self.proxy)
    }
}

/// Orders the MMS candidates among `contexts`.
///
/// The preferred context leads, then active contexts, then internet before
/// mms. Ties keep the radio daemon's order.
pub fn select_contexts(contexts: &[BearerContext], preferred: Option<&str>) -> Vec<BearerContext> {
    let mut candidates: Vec<BearerContext> =
        contexts.iter().filter(|c| c.is_candidate()).cloned().collect();
    candidates.sort_by_key(|c| {
        (
            Reverse(preferred == Some(c.id.as_str())),
            Reverse(c.active),
            c.kind != ContextKind::Internet,
        )
    });
    candidates
}
