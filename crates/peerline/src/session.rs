//! One connection to the peer: both streams plus the shared services.

use std::io::{Read, Write};
use std::sync::Arc;

use peerline_config::Config;
use tracing::{debug, info};

use crate::cancel::Canceller;
use crate::dispatcher::Dispatcher;
use crate::entity::{Entity, Services};
use crate::errors::ReaderError;
use crate::event::PROCESS_TARGET_ID;
use crate::identifier::Identifier;
use crate::reader::{LineReader, ReaderHandle};
use crate::writer::LineWriter;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// A running event channel.
///
/// Dropping the session cancels every context derived from it and closes
/// the outbound stream. The reader thread stops once the peer closes the
/// inbound stream, or at its next read after cancellation.
#[derive(Debug)]
pub struct Session {
    services: Services,
    reader: Option<ReaderHandle>,
}

impl Session {
    /// Wires `inbound` and `outbound` to a fresh set of services and starts
    /// the reader thread.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Spawn`] when the reader thread cannot start.
    pub fn start<R, W>(config: &Config, inbound: R, outbound: W) -> Result<Self, ReaderError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let canceller = Canceller::new();
        let dispatcher = Arc::new(Dispatcher::new());
        let services = Services::new(
            canceller,
            Arc::clone(&dispatcher),
            Arc::new(Identifier::new()),
            Arc::new(LineWriter::new(outbound)),
        )
        .with_reply_timeout(config.reply_timeout());

        let reader = LineReader::new(services.canceller().new_context(), dispatcher, inbound)
            .with_dispatch_mode(config.dispatch_mode())
            .spawn()?;

        info!(
            target: SESSION_TARGET,
            dispatch_mode = %config.dispatch_mode(),
            reply_timeout_ms = config.reply_timeout_ms,
            "session started"
        );
        Ok(Self {
            services,
            reader: Some(reader),
        })
    }

    /// Shared collaborators for building entities.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Root of the session's cancellation tree.
    #[must_use]
    pub const fn canceller(&self) -> &Canceller {
        self.services.canceller()
    }

    /// The session's listener registry.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.services.dispatcher()
    }

    /// A top-level entity with a freshly generated id.
    #[must_use]
    pub fn entity(&self) -> Entity {
        Entity::with_generated_id(None, self.services.clone())
    }

    /// A top-level entity with a fixed id, typically one the peer chose.
    #[must_use]
    pub fn entity_with_id(&self, target_id: impl Into<String>) -> Entity {
        Entity::new(None, self.services.clone(), target_id)
    }

    /// The process-wide entity, addressed by the empty target id.
    #[must_use]
    pub fn app(&self) -> Entity {
        self.entity_with_id(PROCESS_TARGET_ID)
    }

    /// Cancels the session and closes the outbound stream.
    pub fn close(&self) {
        if !self.services.canceller().is_cancelled() {
            debug!(target: SESSION_TARGET, "closing session");
        }
        self.services.canceller().cancel();
        self.services.writer().close();
    }

    /// True once the reader thread has stopped.
    #[must_use]
    pub fn is_reader_finished(&self) -> bool {
        self.reader.as_ref().is_none_or(ReaderHandle::is_finished)
    }

    /// Waits for the reader thread to stop.
    ///
    /// Blocks until the peer closes the inbound stream when the reader is
    /// parked in a read.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::ThreadPanic`] when the reader thread panicked.
    pub fn join_reader(&mut self) -> Result<(), ReaderError> {
        self.reader.take().map_or(Ok(()), ReaderHandle::join)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
