//! Event handlers and their subscription options.
//!
//! Arity (`handler(event)` vs `handler()`) can't be inspected from a
//! closure's parameter list at call time, so it is a tagged union the
//! caller picks at registration time instead.
//!
//! A handler's return is typed as `Option<BoxFuture>` rather than `any |
//! async-any`: `None` for a plain synchronous handler, `Some(future)` when
//! the handler has async work to hand off. This makes sync-vs-async known at
//! registration instead of inspected from the return value at call time.

use std::sync::Arc;

use crate::reference::ReferenceBox;
use crate::task::BoxFuture;

/// An event handler, tagged by the arity the caller registered it with.
pub enum EventHandlerKind<E> {
    WithEvent(ReferenceBox<dyn Fn(&E) -> Option<BoxFuture> + Send + Sync>),
    NoArgs(ReferenceBox<dyn Fn() -> Option<BoxFuture> + Send + Sync>),
}

impl<E> Clone for EventHandlerKind<E> {
    fn clone(&self) -> Self {
        match self {
            EventHandlerKind::WithEvent(h) => EventHandlerKind::WithEvent(h.clone()),
            EventHandlerKind::NoArgs(h) => EventHandlerKind::NoArgs(h.clone()),
        }
    }
}

impl<E> EventHandlerKind<E> {
    pub fn with_event<F>(callback: F) -> Self
    where
        F: Fn(&E) -> Option<BoxFuture> + Send + Sync + 'static,
    {
        EventHandlerKind::WithEvent(ReferenceBox::strong(Arc::new(callback)))
    }

    pub fn no_args<F>(callback: F) -> Self
    where
        F: Fn() -> Option<BoxFuture> + Send + Sync + 'static,
    {
        EventHandlerKind::NoArgs(ReferenceBox::strong(Arc::new(callback)))
    }

    /// Resolve to a live, type-erased invocation closure, or `None` if the
    /// underlying callable is a dead weak reference.
    pub(crate) fn resolve(&self, event: &E) -> Option<Box<dyn FnOnce() -> Option<BoxFuture> + '_>> {
        match self {
            EventHandlerKind::WithEvent(boxed) => {
                let callable = boxed.deref()?;
                Some(Box::new(move || callable(event)))
            }
            EventHandlerKind::NoArgs(boxed) => {
                let callable = boxed.deref()?;
                Some(Box::new(move || callable()))
            }
        }
    }

    /// Cheap liveness probe, for pruning without invoking anything.
    pub(crate) fn is_alive(&self) -> bool {
        match self {
            EventHandlerKind::WithEvent(boxed) => boxed.deref().is_some(),
            EventHandlerKind::NoArgs(boxed) => boxed.deref().is_some(),
        }
    }
}

/// Options controlling how a registered event handler is invoked.
#[derive(Debug, Clone, Copy)]
pub struct EventSubscriptionOptions {
    /// Keep a strong reference to the handler (default). When `false`,
    /// callers are expected to build the handler via a weak
    /// [`ReferenceBox`] and keep the strong side alive themselves.
    pub keep_ref: bool,
    /// Run the handler synchronously on the run-loop thread instead of
    /// enqueueing it onto the worker pool.
    pub immediate_run: bool,
}

impl Default for EventSubscriptionOptions {
    fn default() -> Self {
        EventSubscriptionOptions { keep_ref: true, immediate_run: false }
    }
}
