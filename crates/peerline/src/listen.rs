//! Anything that can have listeners attached under its own target id.

use std::sync::Arc;

use crate::dispatcher::{Dispatcher, ListenerId, Verdict};
use crate::event::{Event, PROCESS_TARGET_ID};

/// A target that listeners can be attached to.
///
/// Implementors name their target id and the dispatcher they register on;
/// the provided methods do the rest.
pub trait Listenable {
    /// Target id the listeners are registered under.
    fn target_id(&self) -> &str;

    /// Dispatcher holding the listeners.
    fn dispatcher(&self) -> &Dispatcher;

    /// Registers `listener` for `event_name` events addressed to this target.
    fn on<F>(&self, event_name: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> Verdict + Send + Sync + 'static,
    {
        self.dispatcher()
            .add_listener(self.target_id(), event_name, listener)
    }

    /// Registers a listener that runs for at most one event.
    fn once<F>(&self, event_name: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher()
            .add_once_listener(self.target_id(), event_name, listener)
    }

    /// Removes a listener previously registered on this target.
    fn off(&self, event_name: &str, id: ListenerId) -> bool {
        self.dispatcher()
            .remove_listener(self.target_id(), event_name, id)
    }
}

/// A bare target id bound to a dispatcher, for listening without an entity.
#[derive(Debug, Clone)]
pub struct Target {
    dispatcher: Arc<Dispatcher>,
    target_id: String,
}

impl Target {
    /// Binds `target_id` to `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, target_id: impl Into<String>) -> Self {
        Self {
            dispatcher,
            target_id: target_id.into(),
        }
    }

    /// The process-wide target.
    #[must_use]
    pub fn process_wide(dispatcher: Arc<Dispatcher>) -> Self {
        Self::new(dispatcher, PROCESS_TARGET_ID)
    }
}

impl Listenable for Target {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
