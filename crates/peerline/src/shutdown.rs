//! Cancels the session when the process is asked to terminate.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{info, warn};

use crate::cancel::Canceller;

const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");

/// Signals that trigger cancellation.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors raised while installing the signal listener.
#[derive(Debug, Clone, Error)]
pub enum ShutdownError {
    /// Registering the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The listener thread could not be started.
    #[error("failed to spawn signal listener: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Keeps the signal listener alive; dropping it stops listening.
#[derive(Debug)]
pub struct ShutdownGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: SHUTDOWN_TARGET, "signal listener panicked");
        }
    }
}

/// Cancels `canceller` on the first termination signal.
///
/// # Errors
///
/// Returns [`ShutdownError`] when the handlers cannot be registered or the
/// listener thread cannot be started.
pub fn install_shutdown_handler(canceller: &Canceller) -> Result<ShutdownGuard, ShutdownError> {
    let mut signals = Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install {
        source: Arc::new(source),
    })?;
    let handle = signals.handle();
    let canceller = canceller.clone();
    let thread = thread::Builder::new()
        .name(String::from("peerline-signals"))
        .spawn(move || {
            for signal in signals.forever() {
                info!(target: SHUTDOWN_TARGET, signal, "shutdown signal received");
                canceller.cancel();
            }
        })
        .map_err(|source| ShutdownError::Spawn {
            source: Arc::new(source),
        })?;
    Ok(ShutdownGuard {
        handle,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    /// Signals reach every registered listener in the process, so tests that
    /// install one run one at a time.
    static SIGNALS: Mutex<()> = Mutex::new(());

    fn exclusive() -> MutexGuard<'static, ()> {
        SIGNALS.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    #[rstest]
    fn hangup_cancels_the_canceller() {
        let _serial = exclusive();
        let canceller = Canceller::new();
        let guard = install_shutdown_handler(&canceller).expect("install handler");

        signal_hook::low_level::raise(SIGHUP).expect("raise SIGHUP");

        assert!(canceller.context().wait_timeout(Duration::from_secs(2)));
        drop(guard);
    }

    #[rstest]
    fn dropping_the_guard_leaves_the_canceller_alone() {
        let _serial = exclusive();
        let canceller = Canceller::new();
        let guard = install_shutdown_handler(&canceller).expect("install handler");

        drop(guard);

        assert!(!canceller.is_cancelled());
    }
}
