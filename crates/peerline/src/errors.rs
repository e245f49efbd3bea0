//! Error types surfaced by the event channel.
//!
//! I/O errors are wrapped in `Arc` so the enums stay small and cloneable.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::event::Event;

/// Reasons an entity refuses to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The process-wide canceller has fired.
    #[error("canceller cancelled")]
    Cancelled,
    /// The entity's own context has been cancelled.
    #[error("entity destroyed")]
    Destroyed,
}

/// Failures while sending an event to the peer.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// The event could not be encoded as JSON.
    #[error("failed to serialise event '{name}': {source}")]
    Serialize {
        /// Name of the event that failed to encode.
        name: String,
        /// Underlying encoder error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The outbound stream rejected the frame.
    #[error("failed to write event '{name}': {source}")]
    Io {
        /// Name of the event being written.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The writer has been closed.
    #[error("writer closed")]
    Closed,
}

/// A line that could not be decoded into an event.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The line is not a JSON event object.
    #[error("malformed frame: {source}")]
    Malformed {
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of a correlated send-and-wait.
#[derive(Debug, Clone, Error)]
pub enum CorrelationError {
    /// The outgoing event never reached the peer. The wait still ran; any
    /// reply it produced is kept.
    #[error("request was not sent: {source}")]
    Write {
        /// Underlying writer error.
        #[source]
        source: WriteError,
        /// Reply captured by the wait, if one arrived regardless.
        reply: Option<Box<Event>>,
    },
}

/// Failures of an entity-level request.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The entity is no longer actionable.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The request could not be sent.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The wait ended without the expected reply: the entity or canceller
    /// was cancelled, or the reply timeout elapsed.
    #[error("no '{event_name}' reply received for target '{target_id}'")]
    NoReply {
        /// Target the reply was expected on.
        target_id: String,
        /// Expected reply event name.
        event_name: String,
    },
}

/// Send failures of an entity.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The entity is no longer actionable.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The writer failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Failures managing the background reader thread.
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    /// The reader thread could not be started.
    #[error("failed to spawn reader thread: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The reader thread panicked.
    #[error("reader thread panicked")]
    ThreadPanic,
}
