use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::errors::{Error, Result};

/// Configuration for the logging bootstrap.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level; `RUST_LOG` directives take precedence
    pub level: Level,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
    /// Include file and line information in each event
    pub file_info: bool,
    /// Log span enter/exit events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a configuration at the given default level.
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Emit JSON lines.
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Include file and line information.
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Log span enter/exit events.
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global `tracing` subscriber built from the configuration.
///
/// Fails with [`Error::Internal`] when a global subscriber is already
/// installed, so embedding applications (and test harnesses) can call it
/// unconditionally and inspect the result.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Internal {
        message: format!("failed to install tracing subscriber: {e}"),
    })
}

/// Parse a log level from a string such as `"debug"`.
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::InvalidConfiguration {
        field: "log_level",
        reason: format!("invalid log level: {level}"),
    })
}
