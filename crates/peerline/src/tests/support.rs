//! Shared state and fakes for the behavioural tests.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::Canceller;
use crate::codec::{FRAME_DELIMITER, decode_frame};
use crate::dispatcher::Dispatcher;
use crate::entity::Services;
use crate::errors::RequestError;
use crate::event::Event;
use crate::identifier::Identifier;
use crate::listen::Target;
use crate::writer::LineWriter;

/// Command the answering peer reacts to.
pub const SHOW_COMMAND: &str = "window.cmd.show";
/// Reply the answering peer sends back to the command's target.
pub const SHOWN_EVENT: &str = "window.event.shown";

/// In-memory peer: decodes each outbound frame and answers show commands on
/// the same target, the way a real peer would after showing a window.
pub struct AnsweringPeer {
    dispatcher: Arc<Dispatcher>,
    pending: Vec<u8>,
}

impl AnsweringPeer {
    /// A peer whose answers arrive through `dispatcher`.
    pub const fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            pending: Vec::new(),
        }
    }

    fn answer(&self, line: &[u8]) {
        if let Ok(Some(event)) = decode_frame(line)
            && event.name == SHOW_COMMAND
        {
            self.dispatcher
                .dispatch_detached(Event::new(SHOWN_EVENT, event.target_id));
        }
    }
}

impl Write for AnsweringPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|byte| *byte == FRAME_DELIMITER) {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.answer(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// State threaded through the steps of one scenario.
pub struct TestWorld {
    /// Root of the scenario's cancellation tree.
    pub canceller: Canceller,
    /// Shared listener registry.
    pub dispatcher: Arc<Dispatcher>,
    /// Target listened on by bare correlation calls.
    pub target: Option<Target>,
    /// Services wired to an answering peer.
    pub services: Option<Services>,
    /// Outcome of a bare correlation call.
    pub reply: Option<Option<Event>>,
    /// Time the last blocking call took.
    pub elapsed: Option<Duration>,
    /// Outcome of an entity request.
    pub request: Option<Result<Event, RequestError>>,
    /// Events seen by recording listeners.
    pub delivered: Arc<Mutex<Vec<Event>>>,
    /// Whether the reader loop returned.
    pub reader_finished: bool,
}

impl TestWorld {
    /// A world with a live canceller and an empty dispatcher.
    pub fn new() -> Self {
        Self {
            canceller: Canceller::new(),
            dispatcher: Arc::new(Dispatcher::new()),
            target: None,
            services: None,
            reply: None,
            elapsed: None,
            request: None,
            delivered: Arc::new(Mutex::new(Vec::new())),
            reader_finished: false,
        }
    }

    /// Services whose writer feeds an [`AnsweringPeer`].
    pub fn answering_services(&self) -> Services {
        Services::new(
            self.canceller.clone(),
            Arc::clone(&self.dispatcher),
            Arc::new(Identifier::new()),
            Arc::new(LineWriter::new(AnsweringPeer::new(Arc::clone(
                &self.dispatcher,
            )))),
        )
        .with_reply_timeout(Some(Duration::from_secs(5)))
    }

    /// Snapshot of the events recorded so far.
    pub fn delivered(&self) -> Vec<Event> {
        self.delivered
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}
