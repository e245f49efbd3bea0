//! Startup sequence: configuration, logging, then the session.

use std::io::{Read, Write};
use std::sync::Arc;

use ortho_config::OrthoConfig;
use peerline_config::{Config, OrthoError};
use thiserror::Error;

use crate::errors::ReaderError;
use crate::session::Session;
use crate::telemetry::{self, TelemetryError};

/// Source of the runtime configuration.
pub trait ConfigLoader: Send + Sync {
    /// Resolves the configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a layer is malformed.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loads defaults, config file, `PEERLINE_*` variables and process
/// arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Failures while bringing a session up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Logging could not be set up.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The reader thread could not start.
    #[error("failed to start the session: {source}")]
    Session {
        /// Underlying reader error.
        #[source]
        source: ReaderError,
    },
}

/// Loads configuration through `loader`, installs logging and starts a
/// session over `inbound` and `outbound`.
///
/// # Errors
///
/// Returns [`StartupError`] naming the step that failed.
pub fn start_with<R, W>(
    loader: &dyn ConfigLoader,
    inbound: R,
    outbound: W,
) -> Result<Session, StartupError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let config = loader
        .load()
        .map_err(|source| StartupError::Configuration { source })?;
    telemetry::initialise(&config).map_err(|source| StartupError::Telemetry { source })?;
    Session::start(&config, inbound, outbound).map_err(|source| StartupError::Session { source })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::{self, Cursor};

    use rstest::rstest;

    use super::*;

    struct RejectingLoader;

    impl ConfigLoader for RejectingLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter([
                OsString::from("peerline"),
                OsString::from("--reply-timeout-ms"),
                OsString::from("soon"),
            ])
        }
    }

    struct FixedLoader(Config);

    impl ConfigLoader for FixedLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Ok(self.0.clone())
        }
    }

    #[rstest]
    fn configuration_failures_stop_startup() {
        let result = start_with(&RejectingLoader, Cursor::new(Vec::new()), io::sink());

        assert!(matches!(result, Err(StartupError::Configuration { .. })));
    }

    #[rstest]
    fn loaded_configuration_reaches_the_session() {
        let config = Config {
            reply_timeout_ms: Some(40),
            ..Config::default()
        };

        let session = start_with(&FixedLoader(config), Cursor::new(Vec::new()), io::sink())
            .expect("start session");

        assert_eq!(
            session.services().reply_timeout(),
            Some(std::time::Duration::from_millis(40))
        );
    }
}
