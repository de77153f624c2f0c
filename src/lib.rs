#![cfg_attr(docsrs, feature(doc_cfg))]

//! A predictable state container with integrated side-effect orchestration
//! and memoized reactive derivations.
//!
//! The moving pieces: a [`Store`] owns state plus action/event buffers and
//! drains them through a user-supplied [`Reducer`]; [`Autorun`]s are
//! memoized derivations subscribed to the store's state; a fixed pool of
//! worker threads runs event handlers off the store's run loop.

mod action;
mod autorun;
mod error;
mod event;
mod handler;
mod listener;
pub mod middleware;
mod options;
mod reference;
#[cfg(feature = "snapshot")]
#[cfg_attr(docsrs, doc(cfg(feature = "snapshot")))]
mod snapshot;
mod store;
mod task;
mod worker;

pub use action::{ActionItem, Reducer, ReducerFn, ReducerOutcome};
pub use autorun::{Autorun, AutorunFn};
pub use error::StoreError;
pub use event::{event_key, EventItem, EventKey};
pub use handler::{EventHandlerKind, EventSubscriptionOptions};
pub use listener::{strong_listener, weak_listener, StateListener};
pub use options::{ActionMiddleware, AutorunOptions, EventMiddleware, StoreOptions};
pub use reference::{weak_method, ReferenceBox, WeakMethodBox};
#[cfg(feature = "snapshot")]
#[cfg_attr(docsrs, doc(cfg(feature = "snapshot")))]
pub use snapshot::Snapshot;
pub use store::{DispatchItem, Store, Unsubscribe};
pub use task::{default_task_creator, BoxFuture, Scheduler, SchedulerThunk, TaskCreator, TaskCreatorCallback, TaskHandle};
