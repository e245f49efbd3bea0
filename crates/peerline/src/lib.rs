//! Event channel between a native process and a peer runtime.
//!
//! Both sides exchange [`Event`]s, one JSON object per line, over a pair of
//! byte streams. Inbound events are routed by `(target id, event name)` to
//! listeners held by a shared [`Dispatcher`]. Every addressable entity on the
//! peer side is mirrored by an [`Entity`] whose cancellable context is derived
//! from its parent's, so destroying a window releases everything nested under
//! it, and cancelling the root [`Canceller`] releases everything.
//!
//! The protocol has no correlation ids. [`Correlation`] turns the broadcast
//! bus into blocking request/reply calls by waiting for a named reply on the
//! request's target.

mod bootstrap;
mod cancel;
mod codec;
mod correlation;
mod dispatcher;
mod entity;
mod errors;
mod event;
mod identifier;
mod listen;
mod reader;
mod session;
#[cfg(unix)]
pub mod shutdown;
pub mod telemetry;
mod writer;

#[cfg(test)]
mod tests;

pub use bootstrap::{ConfigLoader, StartupError, SystemConfigLoader, start_with};
pub use cancel::{CancelContext, Canceller};
pub use codec::{FRAME_DELIMITER, decode_frame, encode_frame};
pub use correlation::{Correlation, run_synchronously, send_and_wait_for_reply};
pub use dispatcher::{Dispatcher, ListenerFn, ListenerId, Verdict};
pub use entity::{Entity, Services};
pub use errors::{
    CorrelationError, FrameError, LifecycleError, ReaderError, RequestError, SendError,
    WriteError,
};
pub use event::{Event, PROCESS_TARGET_ID};
pub use identifier::Identifier;
pub use listen::{Listenable, Target};
pub use peerline_config::{Config, DispatchMode, LogFormat};
pub use reader::{LineReader, ReaderHandle};
pub use session::Session;
pub use writer::LineWriter;
