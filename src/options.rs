//! Construction-time options for [`crate::Store`] and
//! [`crate::Autorun`].

use crate::task::{Scheduler, TaskCreator};

/// Observes an action just before it is appended to the action buffer.
/// Not a transformer: it cannot drop or rewrite the item.
pub type ActionMiddleware<A> = std::sync::Arc<dyn Fn(&A) + Send + Sync>;

/// Observes an event just before it is appended to the event buffer.
pub type EventMiddleware<E> = std::sync::Arc<dyn Fn(&E) + Send + Sync>;

/// Options passed to [`crate::Store::new`].
pub struct StoreOptions<A, E> {
    /// Dispatch `ActionItem::Init` on construction.
    pub auto_init: bool,
    /// Number of side-effect worker threads to start.
    pub threads: usize,
    /// External driver for `run()` and the initial init dispatch. When set,
    /// the store never calls `run()` synchronously from `dispatch()`.
    pub scheduler: Option<Scheduler>,
    pub action_middleware: Option<ActionMiddleware<A>>,
    pub event_middleware: Option<EventMiddleware<E>>,
    /// Awaitable executor; defaults to spawning onto the ambient `tokio`
    /// runtime (see [`crate::task::default_task_creator`]).
    pub task_creator: Option<TaskCreator>,
}

impl<A, E> Default for StoreOptions<A, E> {
    fn default() -> Self {
        StoreOptions {
            auto_init: false,
            threads: 1,
            scheduler: None,
            action_middleware: None,
            event_middleware: None,
            task_creator: None,
        }
    }
}

impl<A, E> StoreOptions<A, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_init(mut self, auto_init: bool) -> Self {
        self.auto_init = auto_init;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn action_middleware(mut self, middleware: ActionMiddleware<A>) -> Self {
        self.action_middleware = Some(middleware);
        self
    }

    pub fn event_middleware(mut self, middleware: EventMiddleware<E>) -> Self {
        self.event_middleware = Some(middleware);
        self
    }

    pub fn task_creator(mut self, task_creator: TaskCreator) -> Self {
        self.task_creator = Some(task_creator);
        self
    }
}

/// Options passed to [`crate::Store::autorun`]/[`crate::Store::autorun_try`].
pub struct AutorunOptions<V> {
    /// Perform one evaluation immediately at construction time, if the
    /// store already has a state.
    pub initial_run: bool,
    /// Value returned by `.value()`/`autorun()` before the first
    /// evaluation happens.
    pub default_value: V,
    /// `Some(true)`/`Some(false)` forces immediate- or deferred-mode
    /// subscriber fan-out; `None` defaults to immediate.
    pub subscribers_immediate_run: Option<bool>,
    /// Whether subscribers registered without an explicit `keep_ref`
    /// default to being kept strongly alive.
    pub subscribers_keep_ref: bool,
}

impl<V: Default> Default for AutorunOptions<V> {
    fn default() -> Self {
        AutorunOptions {
            initial_run: true,
            default_value: V::default(),
            subscribers_immediate_run: None,
            subscribers_keep_ref: true,
        }
    }
}

impl<V> AutorunOptions<V> {
    pub fn new(default_value: V) -> Self {
        AutorunOptions {
            initial_run: true,
            default_value,
            subscribers_immediate_run: None,
            subscribers_keep_ref: true,
        }
    }

    pub fn initial_run(mut self, initial_run: bool) -> Self {
        self.initial_run = initial_run;
        self
    }

    pub fn subscribers_immediate_run(mut self, immediate_run: bool) -> Self {
        self.subscribers_immediate_run = Some(immediate_run);
        self
    }

    pub fn subscribers_keep_ref(mut self, keep_ref: bool) -> Self {
        self.subscribers_keep_ref = keep_ref;
        self
    }
}
