//! Object paths on the bus.
//!
//! ```text
//! /nuntium                         manager
//! /nuntium/<identity>              service (one per SIM)
//! /nuntium/<identity>/<uuid>       message
//! /nuntium/agent/<modem>           push agent
//! ```

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

pub const MANAGER_PATH: &str = "/nuntium";
const AGENT_SEGMENT: &str = "agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectPath {
    Manager,
    Service { identity: String },
    Message { identity: String, uuid: String },
    Agent { modem: String },
}

impl ObjectPath {
    pub fn service(identity: impl Into<String>) -> Self {
        Self::Service {
            identity: identity.into(),
        }
    }

    pub fn message(identity: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::Message {
            identity: identity.into(),
            uuid: uuid.into(),
        }
    }

    /// Push-agent path for a modem. Modem ids like `/ril_0` are flattened
    /// to a single segment.
    pub fn agent(modem_id: &str) -> Self {
        let modem = modem_id
            .trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self::Agent { modem }
    }

    pub fn parse(path: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidPath(path.to_string());
        let rest = path.strip_prefix(MANAGER_PATH).ok_or_else(invalid)?;
        if rest.is_empty() {
            return Ok(Self::Manager);
        }
        let rest = rest.strip_prefix('/').ok_or_else(invalid)?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        match segments.as_slice() {
            [AGENT_SEGMENT, modem] => Ok(Self::Agent {
                modem: (*modem).to_string(),
            }),
            [identity] => Ok(Self::service(*identity)),
            [identity, uuid] => Ok(Self::message(*identity, *uuid)),
            _ => Err(invalid()),
        }
    }

    /// Identity owning a service or message path.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Service { identity } | Self::Message { identity, .. } => Some(identity),
            Self::Manager | Self::Agent { .. } => None,
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manager => f.write_str(MANAGER_PATH),
            Self::Service { identity } => write!(f, "{MANAGER_PATH}/{identity}"),
            Self::Message { identity, uuid } => write!(f, "{MANAGER_PATH}/{identity}/{uuid}"),
            Self::Agent { modem } => write!(f, "{MANAGER_PATH}/{AGENT_SEGMENT}/{modem}"),
        }
    }
}
