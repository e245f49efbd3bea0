//! Blocking request/reply over the broadcast event bus.
//!
//! The wire protocol carries no correlation ids. A reply is recognised purely
//! by `(target id, reply event name)`: the waiting call registers a one-shot
//! listener for that pair, performs its action, and blocks on a context
//! derived from the caller's. Either the listener or the cancellation of an
//! ancestor (or the optional timeout) ends the wait, whichever comes first.
//! The one-shot listener is always removed before returning, so a later
//! event with the same name never satisfies a finished wait.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelContext;
use crate::dispatcher::ListenerId;
use crate::errors::{CorrelationError, WriteError};
use crate::event::Event;
use crate::listen::Listenable;
use crate::writer::LineWriter;

const CORRELATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::correlation");

type ReplySlot = Arc<Mutex<Option<Event>>>;

/// A single pending wait for one reply event.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use peerline::{Canceller, Correlation, Dispatcher, Event, LineWriter, Target};
///
/// let canceller = Canceller::new();
/// let dispatcher = Arc::new(Dispatcher::new());
/// let writer = LineWriter::new(std::io::sink());
/// let window = Target::new(Arc::clone(&dispatcher), "1");
///
/// let reply = Correlation::new(canceller.context(), &window, "window.event.shown")
///     .timeout(Duration::from_secs(5))
///     .send(&writer, &Event::new("window.cmd.show", "1"));
/// ```
pub struct Correlation<'a, L> {
    parent: &'a CancelContext,
    listen: &'a L,
    done_event_name: &'a str,
    timeout: Option<Duration>,
}

impl<'a, L: Listenable> Correlation<'a, L> {
    /// Prepares a wait for `done_event_name` on `listen`, bounded by `parent`.
    #[must_use]
    pub const fn new(parent: &'a CancelContext, listen: &'a L, done_event_name: &'a str) -> Self {
        Self {
            parent,
            listen,
            done_event_name,
            timeout: None,
        }
    }

    /// Gives up after `timeout` in addition to parent cancellation.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Optional form of [`Correlation::timeout`].
    #[must_use]
    pub const fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `action` and blocks until the reply arrives or the wait is
    /// cancelled. Returns `None` when no reply arrived.
    pub fn run<F>(self, action: F) -> Option<Event>
    where
        F: FnOnce(),
    {
        self.wait_for(|_| action())
    }

    /// Writes `outgoing` and blocks until the reply arrives or the wait is
    /// cancelled. A failed write ends the wait immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Write`] when `outgoing` could not be
    /// written, together with any reply that arrived regardless.
    pub fn send(
        self,
        writer: &LineWriter,
        outgoing: &Event,
    ) -> Result<Option<Event>, CorrelationError> {
        let mut failure: Option<WriteError> = None;
        let reply = self.wait_for(|waiter| {
            if let Err(error) = writer.write(outgoing) {
                failure = Some(error);
                waiter.cancel();
            }
        });
        match failure {
            None => Ok(reply),
            Some(source) => Err(CorrelationError::Write {
                source,
                reply: reply.map(Box::new),
            }),
        }
    }

    fn wait_for<F>(self, action: F) -> Option<Event>
    where
        F: FnOnce(&CancelContext),
    {
        let waiter = self.parent.child();
        if let Some(timeout) = self.timeout {
            waiter.cancel_after(timeout);
        }

        let slot: ReplySlot = Arc::new(Mutex::new(None));
        let listener_slot = Arc::clone(&slot);
        let listener_waiter = waiter.clone();
        let id = self.listen.once(self.done_event_name, move |event| {
            *lock_slot(&listener_slot) = Some(event.clone());
            listener_waiter.cancel();
        });
        let pending = PendingReply {
            listen: self.listen,
            done_event_name: self.done_event_name,
            id,
            waiter,
        };

        action(&pending.waiter);
        pending.waiter.wait();
        drop(pending);

        let reply = lock_slot(&slot).take();
        if reply.is_none() {
            debug!(
                target: CORRELATION_TARGET,
                target_id = %self.listen.target_id(),
                event = %self.done_event_name,
                "wait ended without a reply"
            );
        }
        reply
    }
}

/// Removes the one-shot listener and releases the derived context, even when
/// the action panics.
struct PendingReply<'a, L: Listenable> {
    listen: &'a L,
    done_event_name: &'a str,
    id: ListenerId,
    waiter: CancelContext,
}

impl<L: Listenable> Drop for PendingReply<'_, L> {
    fn drop(&mut self) {
        self.listen.off(self.done_event_name, self.id);
        self.waiter.cancel();
    }
}

fn lock_slot(slot: &ReplySlot) -> MutexGuard<'_, Option<Event>> {
    slot.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Runs `action`, then blocks until `done_event_name` arrives on `listen` or
/// `parent` is cancelled.
///
/// Returns the reply, or `None` when cancellation came first.
pub fn run_synchronously<L, F>(
    parent: &CancelContext,
    listen: &L,
    action: F,
    done_event_name: &str,
) -> Option<Event>
where
    L: Listenable,
    F: FnOnce(),
{
    Correlation::new(parent, listen, done_event_name).run(action)
}

/// Writes `outgoing`, then blocks until `done_event_name` arrives on `listen`
/// or `parent` is cancelled.
///
/// # Errors
///
/// Returns [`CorrelationError::Write`] when `outgoing` could not be written.
pub fn send_and_wait_for_reply<L>(
    parent: &CancelContext,
    listen: &L,
    writer: &LineWriter,
    outgoing: &Event,
    done_event_name: &str,
) -> Result<Option<Event>, CorrelationError>
where
    L: Listenable,
{
    Correlation::new(parent, listen, done_event_name).send(writer, outgoing)
}
