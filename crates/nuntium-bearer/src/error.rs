//! Bearer and transport errors.

use thiserror::Error;

pub type BearerResult<T> = Result<T, BearerError>;

/// Error names the radio daemon uses while the packet service is settling.
const BUSY_ERRORS: &[&str] = &["AttachInProgress", "InProgress", "NotAttached"];

#[derive(Debug, Error)]
pub enum BearerError {
    #[error("failed to activate context {context}: {reason}")]
    ActivationFailed { context: String, reason: String },

    #[error("no context usable for MMS")]
    NoMmsContext,

    #[error("invalid proxy {0:?}")]
    ProxyParse(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// A failure reported by the radio daemon, `name` being its error name
    /// (for example `org.ofono.Error.InProgress`).
    #[error("radio error {name}: {message}")]
    Radio { name: String, message: String },
}

impl BearerError {
    pub fn radio(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Radio {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True for radio errors worth retrying after a short wait.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Radio { name, .. } => {
                let short = name.rsplit('.').next().unwrap_or(name);
                BUSY_ERRORS.contains(&short)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_classification() {
        assert!(BearerError::radio("org.ofono.Error.AttachInProgress", "").is_busy());
        assert!(BearerError::radio("org.ofono.Error.InProgress", "").is_busy());
        assert!(BearerError::radio("NotAttached", "").is_busy());
        assert!(!BearerError::radio("org.ofono.Error.Failed", "").is_busy());
        assert!(!BearerError::NoMmsContext.is_busy());
    }
}
