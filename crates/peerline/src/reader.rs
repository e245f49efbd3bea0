//! Inbound half of the line protocol.
//!
//! The reader is the only source of inbound events. It runs until its
//! governing context is cancelled or the peer closes the stream, and never
//! lets a bad frame or a transient read error end the loop.

use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use peerline_config::DispatchMode;
use tracing::{debug, warn};

use crate::cancel::CancelContext;
use crate::codec::{FRAME_DELIMITER, decode_frame};
use crate::dispatcher::Dispatcher;
use crate::errors::ReaderError;

const READER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reader");
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Decodes newline-delimited events from a stream and dispatches them.
pub struct LineReader<R> {
    context: CancelContext,
    dispatcher: Arc<Dispatcher>,
    mode: DispatchMode,
    reader: BufReader<R>,
}

impl<R: Read> LineReader<R> {
    /// Creates a reader governed by `context` that dispatches detached.
    pub fn new(context: CancelContext, dispatcher: Arc<Dispatcher>, inner: R) -> Self {
        Self {
            context,
            dispatcher,
            mode: DispatchMode::Detached,
            reader: BufReader::new(inner),
        }
    }

    /// Selects how decoded events reach the dispatcher.
    #[must_use]
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs the read loop on the calling thread.
    ///
    /// The loop ends when the context is cancelled (checked before each read)
    /// or at end-of-stream. A peer reset counts as end-of-stream, and bytes
    /// left after the last newline are dropped as a partial frame. A blocked
    /// read is not interrupted by cancellation; closing the peer's end of the
    /// stream releases it.
    pub fn read(&mut self) {
        let mut line = Vec::new();
        let mut last_error = None::<io::ErrorKind>;
        loop {
            if self.context.is_cancelled() {
                debug!(target: READER_TARGET, "reader context cancelled");
                return;
            }

            match self.reader.read_until(FRAME_DELIMITER, &mut line) {
                Ok(0) if line.is_empty() => {
                    debug!(target: READER_TARGET, "peer closed the stream");
                    return;
                }
                Ok(_) if line.last() != Some(&FRAME_DELIMITER) => {
                    debug!(
                        target: READER_TARGET,
                        bytes = line.len(),
                        "dropping partial frame at end of stream"
                    );
                    return;
                }
                Ok(_) => {
                    last_error = None;
                    self.handle_line(&line);
                    line.clear();
                }
                Err(error) if is_end_of_stream(&error) => {
                    debug!(
                        target: READER_TARGET,
                        error = %error,
                        "peer reset the stream"
                    );
                    return;
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: READER_TARGET,
                            error = %error,
                            "error while reading"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }

    /// Releases the underlying stream.
    pub fn close(self) {
        drop(self.reader.into_inner());
    }

    fn handle_line(&self, line: &[u8]) {
        match decode_frame(line) {
            Ok(Some(event)) => {
                debug!(
                    target: READER_TARGET,
                    event = %event.name,
                    target_id = %event.target_id,
                    "received event"
                );
                match self.mode {
                    DispatchMode::Inline => self.dispatcher.dispatch(&event),
                    DispatchMode::Detached => self.dispatcher.dispatch_detached(event),
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    target: READER_TARGET,
                    error = %error,
                    frame = %String::from_utf8_lossy(line).trim(),
                    "dropping malformed frame"
                );
            }
        }
    }
}

impl<R: Read + Send + 'static> LineReader<R> {
    /// Runs the read loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Spawn`] when the thread cannot be started.
    pub fn spawn(mut self) -> Result<ReaderHandle, ReaderError> {
        let handle = thread::Builder::new()
            .name(String::from("peerline-reader"))
            .spawn(move || {
                self.read();
                self.close();
            })
            .map_err(|source| ReaderError::Spawn {
                source: Arc::new(source),
            })?;
        Ok(ReaderHandle {
            handle: Some(handle),
        })
    }
}

/// Handle to a reader running on its own thread.
#[derive(Debug)]
pub struct ReaderHandle {
    handle: Option<thread::JoinHandle<()>>,
}

impl ReaderHandle {
    /// True once the read loop has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(thread::JoinHandle::is_finished)
    }

    /// Waits for the read loop to end.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::ThreadPanic`] when the reader thread panicked.
    pub fn join(mut self) -> Result<(), ReaderError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ReaderError::ThreadPanic),
            None => Ok(()),
        }
    }
}

/// True for errors that mean the peer is gone rather than a transient fault.
///
/// Windows reports a closed socket through a `wsarecv:` message rather than
/// a dedicated error kind.
fn is_end_of_stream(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    ) || error.to_string().to_lowercase().contains("wsarecv:")
}
