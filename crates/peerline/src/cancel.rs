//! Hierarchical cancellation.
//!
//! A [`Canceller`] owns the root of a tree of [`CancelContext`]s. Each context
//! may derive children; cancelling a context cancels every descendant, and a
//! cancelled context stays cancelled. Each child keeps its parent alive, so
//! dropping every handle to an intermediate context never detaches its
//! descendants from the tree. Parents only hold weak links to their
//! children: a derived context dropped without being cancelled costs a stale
//! slot that the next derivation prunes.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use tracing::warn;

const CANCEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cancel");

#[derive(Default)]
struct NodeState {
    cancelled: bool,
    children: Vec<Weak<Node>>,
}

#[derive(Default)]
struct Node {
    state: Mutex<NodeState>,
    signal: Condvar,
    /// Keeps the chain up to the root alive for as long as this node is.
    _parent: Option<Arc<Node>>,
}

impl Node {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Marks the node cancelled and wakes its waiters. Returns the children
    /// that still need cancelling, or nothing if the node was already
    /// cancelled.
    fn mark_cancelled(&self) -> Vec<Weak<Self>> {
        let mut state = self.lock();
        if state.cancelled {
            return Vec::new();
        }
        state.cancelled = true;
        self.signal.notify_all();
        std::mem::take(&mut state.children)
    }
}

/// A cancellable scope derived from a [`Canceller`] or another context.
///
/// Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct CancelContext {
    node: Arc<Node>,
}

impl fmt::Debug for CancelContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancelContext")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelContext {
    fn root() -> Self {
        Self {
            node: Arc::new(Node::default()),
        }
    }

    /// Derives a child scope. The child is cancelled whenever this context
    /// is, and starts out cancelled if this context already is.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Arc::new(Node {
            _parent: Some(Arc::clone(&self.node)),
            ..Node::default()
        });
        let mut state = self.node.lock();
        if state.cancelled {
            drop(state);
            child.lock().cancelled = true;
        } else {
            state.children.retain(|weak| weak.strong_count() > 0);
            state.children.push(Arc::downgrade(&child));
        }
        Self { node: child }
    }

    /// Cancels this context and all of its descendants. Cancelling twice is
    /// a no-op.
    pub fn cancel(&self) {
        let mut pending = self.node.mark_cancelled();
        while let Some(weak) = pending.pop() {
            if let Some(node) = weak.upgrade() {
                pending.extend(node.mark_cancelled());
            }
        }
    }

    /// True once this context, or any ancestor, has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.node.lock().cancelled
    }

    /// Blocks the calling thread until the context is cancelled.
    pub fn wait(&self) {
        let state = self.node.lock();
        let _cancelled = self
            .node
            .signal
            .wait_while(state, |state| !state.cancelled)
            .unwrap_or_else(|poison| poison.into_inner());
    }

    /// Blocks until the context is cancelled or `timeout` elapses.
    ///
    /// Returns `true` when the context was cancelled.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.node.lock();
        let (state, _) = self
            .node
            .signal
            .wait_timeout_while(state, timeout, |state| !state.cancelled)
            .unwrap_or_else(|poison| poison.into_inner());
        state.cancelled
    }

    /// Cancels this context once `delay` has elapsed, unless it is cancelled
    /// sooner. The timer thread exits as soon as the context is cancelled.
    pub fn cancel_after(&self, delay: Duration) {
        let context = self.clone();
        let spawned = thread::Builder::new()
            .name(String::from("peerline-timer"))
            .spawn(move || {
                if !context.wait_timeout(delay) {
                    context.cancel();
                }
            });
        if let Err(error) = spawned {
            warn!(
                target: CANCEL_TARGET,
                error = %error,
                "failed to spawn cancellation timer; cancelling immediately"
            );
            self.cancel();
        }
    }
}

/// Root of the process-wide cancellation tree.
///
/// Cancelling the canceller cancels every context derived from it, which
/// releases every wait bounded by one of those contexts.
#[derive(Debug, Clone)]
pub struct Canceller {
    root: CancelContext,
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl Canceller {
    /// Creates a live canceller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: CancelContext::root(),
        }
    }

    /// Returns the root context.
    #[must_use]
    pub const fn context(&self) -> &CancelContext {
        &self.root
    }

    /// Derives a fresh context directly under the root.
    #[must_use]
    pub fn new_context(&self) -> CancelContext {
        self.root.child()
    }

    /// Cancels the whole tree.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    /// True once the canceller has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn canceller() -> Canceller {
        Canceller::new()
    }

    #[rstest]
    fn cancelling_the_root_reaches_every_descendant(canceller: Canceller) {
        let child = canceller.new_context();
        let grandchild = child.child();
        let sibling = canceller.new_context();

        canceller.cancel();

        assert!(canceller.is_cancelled());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(sibling.is_cancelled());
    }

    #[rstest]
    fn cancelling_a_child_leaves_ancestors_live(canceller: Canceller) {
        let child = canceller.new_context();
        let grandchild = child.child();

        child.cancel();

        assert!(!canceller.is_cancelled());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[rstest]
    fn children_of_cancelled_contexts_start_cancelled(canceller: Canceller) {
        let parent = canceller.new_context();
        parent.cancel();

        assert!(parent.child().is_cancelled());
    }

    #[rstest]
    fn cancellation_is_idempotent(canceller: Canceller) {
        let context = canceller.new_context();

        context.cancel();
        context.cancel();

        assert!(context.is_cancelled());
        assert!(!canceller.is_cancelled());
    }

    #[rstest]
    fn clones_share_one_scope(canceller: Canceller) {
        let context = canceller.new_context();
        let clone = context.clone();

        clone.cancel();

        assert!(context.is_cancelled());
    }

    #[rstest]
    fn root_cancellation_releases_blocked_waiters(canceller: Canceller) {
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let context = canceller.new_context().child();
                thread::spawn(move || context.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        canceller.cancel();

        for waiter in waiters {
            waiter.join().expect("waiter panicked");
        }
    }

    #[rstest]
    fn dropped_intermediate_contexts_still_forward_cancellation(canceller: Canceller) {
        let grandchild = canceller.new_context().child();
        let parent = canceller.new_context();
        let deep = parent.child().child().child();
        drop(parent);

        canceller.cancel();

        assert!(grandchild.is_cancelled());
        assert!(deep.is_cancelled());
    }

    #[rstest]
    fn wait_timeout_reports_expiry(canceller: Canceller) {
        let context = canceller.new_context();

        assert!(!context.wait_timeout(Duration::from_millis(10)));
        context.cancel();
        assert!(context.wait_timeout(Duration::from_millis(10)));
    }

    #[rstest]
    fn cancel_after_fires_once_the_delay_elapses(canceller: Canceller) {
        let context = canceller.new_context();
        let started = Instant::now();

        context.cancel_after(Duration::from_millis(30));

        assert!(context.wait_timeout(Duration::from_secs(2)));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!canceller.is_cancelled());
    }

    #[rstest]
    fn dropped_children_are_pruned(canceller: Canceller) {
        for _ in 0..64 {
            drop(canceller.new_context());
        }
        let survivor = canceller.new_context();

        assert!(canceller.context().node.lock().children.len() <= 2);
        canceller.cancel();
        assert!(survivor.is_cancelled());
    }
}
