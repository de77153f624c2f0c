//! State listeners: callbacks notified once per quiescent state.
//!
//! A state listener is `Fn(Arc<S>) -> Option<BoxFuture>`, held in a
//! [`ReferenceBox`]. Per-listener event filtering is handled separately by
//! the event-handler registry in `handler.rs`, so this module stays
//! state-only.

use std::sync::Arc;

use crate::reference::ReferenceBox;
use crate::task::BoxFuture;

/// A state listener: `Fn(Arc<S>) -> Option<BoxFuture>`, invoked once per
/// quiescent state (the action buffer just emptied and a state exists). A
/// `Some` return is handed to the store's task creator; `None` means the
/// listener's work is already done.
pub type StateListener<S> = ReferenceBox<dyn Fn(Arc<S>) -> Option<BoxFuture> + Send + Sync>;

/// Build a strongly-held state listener from a plain closure.
pub fn strong_listener<S, F>(callback: F) -> StateListener<S>
where
    F: Fn(Arc<S>) -> Option<BoxFuture> + Send + Sync + 'static,
    S: 'static,
{
    ReferenceBox::strong(Arc::new(callback))
}

/// Build a weakly-held state listener from a closure kept alive elsewhere
/// via `keep_alive`.
pub fn weak_listener<S>(
    keep_alive: &Arc<dyn Fn(Arc<S>) -> Option<BoxFuture> + Send + Sync>,
) -> StateListener<S>
where
    S: 'static,
{
    ReferenceBox::weak(keep_alive)
}
