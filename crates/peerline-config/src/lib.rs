//! Shared configuration for the peerline event channel.
//!
//! [`Config`] carries the tracing filter and output format, the reader's
//! dispatch mode and the default reply timeout for correlated requests.
//! Values are layered by `ortho_config`: built-in defaults, then a
//! configuration file, then `PEERLINE_*` environment variables, then
//! command-line flags (`--log-filter`, `--reply-timeout-ms`, ...). Every
//! field has a default, so an empty document yields a usable value.

mod modes;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use modes::{DispatchMode, LogFormat, ModeParseError};
pub use ortho_config::OrthoError;

/// Filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Runtime configuration shared by the peerline crates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PEERLINE")]
#[serde(default)]
pub struct Config {
    /// Tracing filter expression, in `EnvFilter` syntax.
    pub log_filter: String,
    /// Output format of the tracing subscriber.
    pub log_format: LogFormat,
    /// How the line reader dispatches decoded events.
    pub dispatch_mode: DispatchMode,
    /// Upper bound on a correlated request, in milliseconds. `None` waits
    /// until the governing context is cancelled.
    pub reply_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
            dispatch_mode: DispatchMode::default(),
            reply_timeout_ms: None,
        }
    }
}

impl Config {
    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the reader dispatch mode.
    #[must_use]
    pub const fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch_mode
    }

    /// Returns the reply timeout, if one is configured.
    #[must_use]
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}
