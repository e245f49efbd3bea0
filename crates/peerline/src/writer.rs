//! Outbound half of the line protocol.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::codec::encode_frame;
use crate::errors::WriteError;
use crate::event::Event;

const WRITER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::writer");

type Sink = Box<dyn Write + Send>;

/// Writes events to the peer, one JSON frame per line.
///
/// The stream sits behind a mutex, so concurrent callers never interleave
/// frames. Every failure is returned to the caller.
pub struct LineWriter {
    sink: Mutex<Option<Sink>>,
}

impl fmt::Debug for LineWriter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LineWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LineWriter {
    /// Wraps an outbound stream.
    #[must_use]
    pub fn new<W>(sink: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            sink: Mutex::new(Some(Box::new(sink))),
        }
    }

    /// Encodes `event` and writes it, newline-terminated, in a single call.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Serialize`] when the event cannot be encoded,
    /// [`WriteError::Io`] when the stream fails and [`WriteError::Closed`]
    /// after [`LineWriter::close`].
    pub fn write(&self, event: &Event) -> Result<(), WriteError> {
        let frame = encode_frame(event).map_err(|source| WriteError::Serialize {
            name: event.name.clone(),
            source: Arc::new(source),
        })?;

        let mut sink = self.lock();
        let stream = sink.as_mut().ok_or(WriteError::Closed)?;

        debug!(
            target: WRITER_TARGET,
            event = %event.name,
            target_id = %event.target_id,
            bytes = frame.len(),
            "sending event"
        );

        stream
            .write_all(&frame)
            .and_then(|()| stream.flush())
            .map_err(|source| WriteError::Io {
                name: event.name.clone(),
                source: Arc::new(source),
            })
    }

    /// Releases the underlying stream. Later writes fail with
    /// [`WriteError::Closed`]; closing twice is harmless.
    pub fn close(&self) {
        if let Some(mut stream) = self.lock().take() {
            // Best effort: the stream is dropped regardless.
            if let Err(error) = stream.flush() {
                debug!(
                    target: WRITER_TARGET,
                    error = %error,
                    "flush on close failed"
                );
            }
        }
    }

    /// True once [`LineWriter::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sink>> {
        self.sink
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
