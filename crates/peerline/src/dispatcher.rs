//! Listener registry and event delivery.
//!
//! Listeners are stored under `target id → event name → listener id`. A
//! dispatch copies the matching bucket while holding the registry lock, then
//! releases the lock before running any listener. Listener code is therefore
//! free to register or remove listeners (itself included) without
//! deadlocking, at the cost of two visible races:
//!
//! - a listener added while a dispatch is in flight does not see that event;
//! - a listener removed from another thread while a dispatch is in flight may
//!   still receive that one event, unless the removal completes before the
//!   dispatch reaches it.
//!
//! Each registration runs one invocation at a time. Concurrent dispatches of
//! the same event take turns on a listener, and a listener that returns
//! [`Verdict::Remove`] (or was registered through
//! [`Dispatcher::add_once_listener`]) is retired before the next turn starts,
//! so it runs at most once no matter how many threads dispatch. A listener
//! must not synchronously dispatch an event that is routed back to itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::{trace, warn};

use crate::event::Event;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatcher");

/// What a listener asks the dispatcher to do with it after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stay registered for subsequent events.
    Keep,
    /// Remove this listener from the registry.
    Remove,
}

/// Identifier assigned to a listener at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Boxed listener callback stored in the registry.
pub type ListenerFn = dyn Fn(&Event) -> Verdict + Send + Sync;

struct Registration {
    listener: Box<ListenerFn>,
    once: bool,
    retired: AtomicBool,
    turn: Mutex<()>,
}

impl Registration {
    /// Runs the listener unless the registration has been retired.
    ///
    /// Returns `true` when this invocation retired the registration.
    fn invoke(&self, event: &Event) -> bool {
        // Listener panics poison the turn but leave nothing half-updated.
        let _turn = self.turn.lock().unwrap_or_else(|poison| poison.into_inner());
        if self.retired.load(Ordering::Acquire) {
            return false;
        }
        let verdict = (self.listener)(event);
        let retire = self.once || verdict == Verdict::Remove;
        if retire {
            self.retired.store(true, Ordering::Release);
        }
        retire
    }
}

type Bucket = HashMap<ListenerId, Arc<Registration>>;
type Registry = HashMap<String, HashMap<String, Bucket>>;

/// Thread-safe registry that routes events to their listeners.
pub struct Dispatcher {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = self.lock().len();
        formatter
            .debug_struct("Dispatcher")
            .field("targets", &targets)
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `listener` for `event_name` events addressed to `target_id`.
    pub fn add_listener<F>(&self, target_id: &str, event_name: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> Verdict + Send + Sync + 'static,
    {
        self.insert(target_id, event_name, Box::new(listener), false)
    }

    /// Registers a listener that runs for at most one event and is then
    /// removed.
    pub fn add_once_listener<F>(
        &self,
        target_id: &str,
        event_name: &str,
        listener: F,
    ) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let wrapped = move |event: &Event| {
            listener(event);
            Verdict::Remove
        };
        self.insert(target_id, event_name, Box::new(wrapped), true)
    }

    /// Removes a listener. Unknown targets, names and ids are ignored.
    ///
    /// Returns `true` when a listener was removed.
    pub fn remove_listener(&self, target_id: &str, event_name: &str, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let Some(names) = registry.get_mut(target_id) else {
            return false;
        };
        let Some(bucket) = names.get_mut(event_name) else {
            return false;
        };
        let removed = bucket.remove(&id);
        if bucket.is_empty() {
            names.remove(event_name);
        }
        if names.is_empty() {
            registry.remove(target_id);
        }
        drop(registry);

        match removed {
            Some(registration) => {
                registration.retired.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Delivers `event` to the listeners registered for its target and name.
    ///
    /// Listeners run on the calling thread, one after another in registration
    /// order, with no registry lock held. A listener already running for
    /// another dispatch is waited for.
    pub fn dispatch(&self, event: &Event) {
        let snapshot = self.snapshot(&event.target_id, &event.name);
        if snapshot.is_empty() {
            trace!(
                target: DISPATCH_TARGET,
                event = %event.name,
                target_id = %event.target_id,
                "no listeners for event"
            );
            return;
        }

        for (id, registration) in snapshot {
            if registration.invoke(event) {
                self.remove_listener(&event.target_id, &event.name, id);
            }
        }
    }

    /// Delivers `event` on a freshly spawned thread so that listener code can
    /// never stall the caller.
    pub fn dispatch_detached(self: &Arc<Self>, event: Event) {
        let dispatcher = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(String::from("peerline-dispatch"))
            .spawn(move || dispatcher.dispatch(&event));
        if let Err(error) = spawned {
            warn!(
                target: DISPATCH_TARGET,
                error = %error,
                "failed to spawn dispatch thread"
            );
        }
    }

    /// Number of listeners currently registered for `(target_id, event_name)`.
    #[must_use]
    pub fn listener_count(&self, target_id: &str, event_name: &str) -> usize {
        self.lock()
            .get(target_id)
            .and_then(|names| names.get(event_name))
            .map_or(0, HashMap::len)
    }

    fn insert(
        &self,
        target_id: &str,
        event_name: &str,
        listener: Box<ListenerFn>,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let registration = Arc::new(Registration {
            listener,
            once,
            retired: AtomicBool::new(false),
            turn: Mutex::new(()),
        });
        self.lock()
            .entry(target_id.to_owned())
            .or_default()
            .entry(event_name.to_owned())
            .or_default()
            .insert(id, registration);
        id
    }

    fn snapshot(&self, target_id: &str, event_name: &str) -> Vec<(ListenerId, Arc<Registration>)> {
        let registry = self.lock();
        let mut listeners: Vec<_> = registry
            .get(target_id)
            .and_then(|names| names.get(event_name))
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(id, registration)| (*id, Arc::clone(registration)))
                    .collect()
            })
            .unwrap_or_default();
        drop(registry);
        listeners.sort_unstable_by_key(|(id, _)| *id);
        listeners
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking listener never runs under this lock, so a poisoned
        // registry is still consistent.
        self.registry
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
