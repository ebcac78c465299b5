//! Tracing setup shared by the daemon and the injection tool.
//!
//! ```ignore
//! use nuntium_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::daemon().with_debug(true))?;
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, for journald and log shippers.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to the `nuntium` targets when `RUST_LOG` is unset.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    pub include_location: bool,
    pub include_timestamp: bool,
    pub include_span_events: bool,
    /// Overrides both `RUST_LOG` and `default_level`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Long-running service: JSON lines with span open/close events.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_span_events: true,
            ..Self::default()
        }
    }

    /// Short-lived tools: no timestamps, compact lines.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            include_timestamp: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn cli_debug() -> Self {
        Self::cli().with_debug(true)
    }

    /// `--debug` raises the level to DEBUG and adds file/line locations.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.default_level = Level::DEBUG;
            self.include_location = true;
        }
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("nuntium={}", self.default_level))))
    }
}

/// Installs the global subscriber. Call once at startup.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = config.filter()?;
    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.output_format {
        TracingOutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
        TracingOutputFormat::Compact if config.include_timestamp => fmt::layer()
            .compact()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
        TracingOutputFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
