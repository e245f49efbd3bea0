//! Per-entity lifecycle contexts.
//!
//! Every addressable entity on the peer side (an application, a window, a
//! menu item, ...) is mirrored by an [`Entity`]: a target id plus a
//! cancellable context. The context is derived from a parent entity's
//! context, so an entity can never outlive its parent, or from the root
//! canceller, so it lives at most as long as the whole session. Destroying an
//! entity is exactly cancelling its context; nothing else needs freeing.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::{CancelContext, Canceller};
use crate::correlation::Correlation;
use crate::dispatcher::Dispatcher;
use crate::errors::{LifecycleError, RequestError, SendError};
use crate::event::Event;
use crate::identifier::Identifier;
use crate::listen::Listenable;
use crate::writer::LineWriter;

/// Shared collaborators every entity of one session uses.
#[derive(Debug, Clone)]
pub struct Services {
    canceller: Canceller,
    dispatcher: Arc<Dispatcher>,
    identifier: Arc<Identifier>,
    writer: Arc<LineWriter>,
    reply_timeout: Option<Duration>,
}

impl Services {
    /// Bundles the session-wide collaborators.
    #[must_use]
    pub const fn new(
        canceller: Canceller,
        dispatcher: Arc<Dispatcher>,
        identifier: Arc<Identifier>,
        writer: Arc<LineWriter>,
    ) -> Self {
        Self {
            canceller,
            dispatcher,
            identifier,
            writer,
            reply_timeout: None,
        }
    }

    /// Bounds every [`Entity::request`] by `timeout`.
    #[must_use]
    pub const fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Root of the cancellation tree.
    #[must_use]
    pub const fn canceller(&self) -> &Canceller {
        &self.canceller
    }

    /// Shared listener registry.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Shared id generator.
    #[must_use]
    pub const fn identifier(&self) -> &Arc<Identifier> {
        &self.identifier
    }

    /// Shared outbound writer.
    #[must_use]
    pub const fn writer(&self) -> &Arc<LineWriter> {
        &self.writer
    }

    /// Reply timeout applied to entity requests.
    #[must_use]
    pub const fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout
    }
}

/// Lifecycle context of one addressable entity.
///
/// Clones share the same id and context.
#[derive(Debug, Clone)]
pub struct Entity {
    id: String,
    context: CancelContext,
    services: Services,
}

impl Entity {
    /// Creates an entity addressed by `target_id`.
    ///
    /// The context derives from `parent` when given, otherwise from the root
    /// canceller.
    #[must_use]
    pub fn new(
        parent: Option<&CancelContext>,
        services: Services,
        target_id: impl Into<String>,
    ) -> Self {
        let context = parent.map_or_else(|| services.canceller.new_context(), CancelContext::child);
        Self {
            id: target_id.into(),
            context,
            services,
        }
    }

    /// Creates an entity with a fresh id from the shared identifier.
    #[must_use]
    pub fn with_generated_id(parent: Option<&CancelContext>, services: Services) -> Self {
        let id = services.identifier.next();
        Self::new(parent, services, id)
    }

    /// Creates a nested entity with a fresh id whose lifetime is bounded by
    /// this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_generated_id(Some(&self.context), self.services.clone())
    }

    /// Creates a nested entity with a fixed id.
    #[must_use]
    pub fn child_with_id(&self, target_id: impl Into<String>) -> Self {
        Self::new(Some(&self.context), self.services.clone(), target_id)
    }

    /// The entity's target id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The entity's cancellation scope.
    #[must_use]
    pub const fn context(&self) -> &CancelContext {
        &self.context
    }

    /// The shared collaborators.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Checks whether the entity may still act.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Cancelled`] once the root canceller has
    /// fired, or [`LifecycleError::Destroyed`] once this entity's own context
    /// has been cancelled.
    pub fn is_actionable(&self) -> Result<(), LifecycleError> {
        if self.services.canceller.is_cancelled() {
            return Err(LifecycleError::Cancelled);
        }
        if self.is_destroyed() {
            return Err(LifecycleError::Destroyed);
        }
        Ok(())
    }

    /// True once the entity's context, or an ancestor's, has been cancelled.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.context.is_cancelled()
    }

    /// Cancels the entity's context and, with it, every nested entity and
    /// pending request.
    pub fn destroy(&self) {
        self.context.cancel();
    }

    /// Builds an event addressed to this entity.
    #[must_use]
    pub fn event(&self, name: impl Into<String>) -> Event {
        Event::new(name, self.id.as_str())
    }

    /// Writes `event` to the peer if the entity is still actionable.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Lifecycle`] without writing when the entity is no
    /// longer actionable, or [`SendError::Write`] when the write fails.
    pub fn send(&self, event: &Event) -> Result<(), SendError> {
        self.is_actionable()?;
        self.services.writer.write(event)?;
        Ok(())
    }

    /// Writes `event` and blocks until `done_event_name` arrives for this
    /// entity.
    ///
    /// The wait is bounded by the entity's context and by the configured
    /// reply timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Lifecycle`] when the entity is not actionable
    /// (before sending, or because it was destroyed while waiting),
    /// [`RequestError::Correlation`] when the write failed, and
    /// [`RequestError::NoReply`] when the timeout elapsed first.
    pub fn request(&self, event: &Event, done_event_name: &str) -> Result<Event, RequestError> {
        self.is_actionable()?;
        let reply = Correlation::new(&self.context, self, done_event_name)
            .timeout_opt(self.services.reply_timeout)
            .send(&self.services.writer, event)?;
        match reply {
            Some(reply) => Ok(reply),
            None => {
                self.is_actionable()?;
                Err(RequestError::NoReply {
                    target_id: self.id.clone(),
                    event_name: done_event_name.to_owned(),
                })
            }
        }
    }
}

impl Listenable for Entity {
    fn target_id(&self) -> &str {
        &self.id
    }

    fn dispatcher(&self) -> &Dispatcher {
        &self.services.dispatcher
    }
}
