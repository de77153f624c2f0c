//! The store engine (component C): owns state, the action/event buffers,
//! the listener and event-handler registries, the worker pool, and the
//! reentrancy lock around the run loop.
//!
//! Built around `Arc`/`parking_lot::Mutex` rather than `Rc`/`RefCell`, since
//! this store must be dispatched into from worker threads and task-creator
//! callbacks, not just from the thread that constructed it.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::action::{ActionItem, Reducer};
use crate::error::StoreError;
use crate::event::{event_key, EventItem, EventKey};
use crate::handler::{EventHandlerKind, EventSubscriptionOptions};
use crate::listener::StateListener;
use crate::options::{ActionMiddleware, EventMiddleware, StoreOptions};
use crate::task::{default_task_creator, BoxFuture, TaskCreator};
use crate::worker::WorkerPool;

/// An unregistration thunk, returned from `subscribe`/`subscribe_event`.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// One item of a `dispatch` batch: an action for the reducer, or an event
/// routed straight to handlers without passing through it.
pub enum DispatchItem<A, E> {
    Action(A),
    Event(E),
}

struct HandlerRegistration<E> {
    id: u64,
    handler: EventHandlerKind<E>,
    options: EventSubscriptionOptions,
}

impl<E> Clone for HandlerRegistration<E> {
    fn clone(&self) -> Self {
        HandlerRegistration { id: self.id, handler: self.handler.clone(), options: self.options }
    }
}

/// A predictable state container with an attached side-effect pipeline.
///
/// `S` is the state, `A` the caller's action type, `E` the caller's event
/// type. See `crate::action`/`crate::event` for the sentinel-bearing
/// wrappers (`ActionItem`/`EventItem`) actually stored on the buffers.
pub struct Store<S, A, E> {
    run_lock: Mutex<()>,
    actions: Mutex<VecDeque<ActionItem<A>>>,
    events: Mutex<VecDeque<EventItem<E>>>,
    state: Mutex<Option<Arc<S>>>,
    reducer: Box<dyn Reducer<S, A, E>>,
    listeners: Mutex<Vec<(u64, StateListener<S>)>>,
    next_listener_id: AtomicU64,
    handlers: Mutex<HashMap<EventKey<E>, Vec<HandlerRegistration<E>>>>,
    next_handler_id: AtomicU64,
    action_middleware: Option<ActionMiddleware<A>>,
    event_middleware: Option<EventMiddleware<E>>,
    task_creator: TaskCreator,
    scheduler: Option<crate::task::Scheduler>,
    workers: Mutex<Option<WorkerPool<E>>>,
    weak_self: OnceLock<Weak<Store<S, A, E>>>,
}

impl<S, A, E> Store<S, A, E>
where
    S: Send + Sync + 'static,
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds a store around `reducer`, starts its worker pool, and
    /// (per `options`) wires a scheduler or dispatches the bootstrap
    /// action synchronously.
    pub fn new<R>(reducer: R, options: StoreOptions<A, E>) -> Arc<Self>
    where
        R: Reducer<S, A, E> + 'static,
    {
        let threads = options.threads.max(1);
        let task_creator = options.task_creator.unwrap_or_else(default_task_creator);

        let store = Arc::new(Store {
            run_lock: Mutex::new(()),
            actions: Mutex::new(VecDeque::new()),
            events: Mutex::new(VecDeque::new()),
            state: Mutex::new(None),
            reducer: Box::new(reducer),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            handlers: Mutex::new(HashMap::new()),
            next_handler_id: AtomicU64::new(0),
            action_middleware: options.action_middleware,
            event_middleware: options.event_middleware,
            task_creator: task_creator.clone(),
            scheduler: options.scheduler.clone(),
            workers: Mutex::new(Some(WorkerPool::spawn(threads, task_creator))),
            weak_self: OnceLock::new(),
        });
        let _ = store.weak_self.set(Arc::downgrade(&store));

        match &store.scheduler {
            Some(scheduler) => {
                let run_store = store.clone();
                scheduler(Arc::new(move || { let _ = run_store.run(); }), true);
                if options.auto_init {
                    let init_store = store.clone();
                    scheduler(Arc::new(move || { let _ = init_store.dispatch_init(); }), false);
                }
            }
            None => {
                if options.auto_init {
                    let _ = store.dispatch_init();
                }
            }
        }

        store
    }

    /// The current state, or `None` before the first action has been
    /// reduced.
    pub fn state(&self) -> Option<Arc<S>> {
        self.state.lock().clone()
    }

    fn dispatch_init(&self) -> Result<(), StoreError> {
        self.actions.lock().push_back(ActionItem::Init);
        self.run_unless_scheduled()
    }

    /// Dispatches the shutdown action: once reduced, a `FinishEvent` is
    /// queued, the worker pool is torn down, and the listener/handler
    /// registries are cleared.
    pub fn finish(&self) -> Result<(), StoreError> {
        self.actions.lock().push_back(ActionItem::Finish);
        self.run_unless_scheduled()
    }

    /// Appends a single action, passing it through `actionMiddleware` first.
    pub fn dispatch<T: Into<A>>(&self, action: T) -> Result<(), StoreError> {
        self.dispatch_batch(vec![DispatchItem::Action(action.into())])
    }

    /// Appends a single event directly, bypassing the reducer.
    pub fn dispatch_event<T: Into<E>>(&self, event: T) -> Result<(), StoreError> {
        self.dispatch_batch(vec![DispatchItem::Event(event.into())])
    }

    /// Appends a batch of actions/events in order, then (absent an external
    /// scheduler) drains them via `run()`.
    pub fn dispatch_batch(&self, items: Vec<DispatchItem<A, E>>) -> Result<(), StoreError> {
        for item in items {
            match item {
                DispatchItem::Action(action) => {
                    if let Some(middleware) = &self.action_middleware {
                        middleware(&action);
                    }
                    self.actions.lock().push_back(ActionItem::Custom(action));
                }
                DispatchItem::Event(event) => {
                    if let Some(middleware) = &self.event_middleware {
                        middleware(&event);
                    }
                    self.events.lock().push_back(EventItem::Custom(event));
                }
            }
        }
        self.run_unless_scheduled()
    }

    /// `withState`-flavoured dispatch: `with_state` is invoked first with
    /// the current state, and whatever it produces is dispatched ahead of
    /// `items`.
    pub fn dispatch_with_state<F>(&self, with_state: F, items: Vec<DispatchItem<A, E>>) -> Result<(), StoreError>
    where
        F: FnOnce(Option<Arc<S>>) -> Vec<DispatchItem<A, E>>,
    {
        let mut batch = with_state(self.state());
        batch.extend(items);
        self.dispatch_batch(batch)
    }

    fn run_unless_scheduled(&self) -> Result<(), StoreError> {
        if self.scheduler.is_none() {
            self.run()
        } else {
            Ok(())
        }
    }

    /// Drains the action/event buffers until both are empty. A concurrent
    /// call (from another thread, or reentrantly from a listener/reducer/
    /// handler) that finds the run lock already held simply returns: only
    /// the outermost call drains anything.
    pub fn run(&self) -> Result<(), StoreError> {
        let Some(_guard) = self.run_lock.try_lock() else {
            return Ok(());
        };

        loop {
            let acted = self.run_one_action()?;
            let notified = self.run_one_event();
            if !acted && !notified {
                break;
            }
        }
        Ok(())
    }

    /// Pops the head action (if any) and reduces it. The reducer runs with
    /// no store lock held, so a reducer that reentrantly dispatches (this is
    /// explicitly permitted — it merely appends to the buffers since `run()`
    /// is single-flight) cannot deadlock against `self.actions`. If the
    /// reducer panics, the action is pushed back onto the head of the queue
    /// rather than silently discarded.
    fn run_one_action(&self) -> Result<bool, StoreError> {
        let action = match self.actions.lock().pop_front() {
            Some(action) => action,
            None => return Ok(false),
        };
        let prev_state = self.state.lock().clone();

        let outcome = match catch_unwind(AssertUnwindSafe(|| self.reducer.reduce(prev_state.as_ref(), &action))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.actions.lock().push_front(action);
                return Err(StoreError::ReducerFailure { message: panic_message(&payload) });
            }
        };

        let finished = action.is_finish();

        let (state, follow_up_actions, follow_up_events) = outcome.into_parts();
        *self.state.lock() = Some(state);

        for action in follow_up_actions {
            self.actions.lock().push_back(ActionItem::Custom(action));
        }
        for event in follow_up_events {
            self.events.lock().push_back(EventItem::Custom(event));
        }
        if finished {
            self.events.lock().push_back(EventItem::Finish);
        }

        if self.actions.lock().is_empty() {
            if let Some(state) = self.state() {
                self.notify_listeners(&state);
            }
        }

        Ok(true)
    }

    fn notify_listeners(&self, state: &Arc<S>) {
        let snapshot: Vec<(u64, StateListener<S>)> = self.listeners.lock().clone();
        let mut gone = Vec::new();
        for (id, listener) in &snapshot {
            match listener.deref() {
                Some(callable) => {
                    let state = state.clone();
                    match catch_unwind(AssertUnwindSafe(|| callable(state))) {
                        Ok(Some(future)) => (self.task_creator)(future, None),
                        Ok(None) => {}
                        Err(payload) => log::error!(
                            "state listener panicked, isolated to this invocation: {}",
                            panic_message(&payload)
                        ),
                    }
                }
                None => gone.push(*id),
            }
        }
        if !gone.is_empty() {
            self.listeners.lock().retain(|(id, _)| !gone.contains(id));
        }
    }

    /// Pops one event (if any) and routes it: `FinishEvent` tears down the
    /// worker pool and clears registries; a caller event is dispatched to
    /// every handler registered under its exact discriminant.
    fn run_one_event(&self) -> bool {
        let event = self.events.lock().pop_front();
        match event {
            Some(EventItem::Finish) => {
                self.handle_finish();
                true
            }
            Some(EventItem::Custom(event)) => {
                self.dispatch_to_handlers(event);
                true
            }
            None => false,
        }
    }

    fn dispatch_to_handlers(&self, event: E) {
        let key = event_key(&event);
        let registered: Vec<HandlerRegistration<E>> =
            self.handlers.lock().get(&key).cloned().unwrap_or_default();

        let mut gone = Vec::new();
        for registration in &registered {
            if !registration.handler.is_alive() {
                gone.push(registration.id);
                continue;
            }

            if registration.options.immediate_run {
                if let Some(invoke) = registration.handler.resolve(&event) {
                    match catch_unwind(AssertUnwindSafe(invoke)) {
                        Ok(Some(future)) => (self.task_creator)(future, None),
                        Ok(None) => {}
                        Err(payload) => log::error!(
                            "event handler panicked, isolated to this invocation: {}",
                            panic_message(&payload)
                        ),
                    }
                }
            } else {
                let workers = self.workers.lock();
                match workers.as_ref() {
                    Some(pool) => pool.submit(registration.handler.clone(), event.clone()),
                    None => log::trace!("dropping event, worker pool already torn down"),
                }
            }
        }

        if !gone.is_empty() {
            if let Some(list) = self.handlers.lock().get_mut(&key) {
                list.retain(|registration| !gone.contains(&registration.id));
            }
        }
    }

    fn handle_finish(&self) {
        if let Some(pool) = self.workers.lock().take() {
            pool.shutdown();
        }
        self.listeners.lock().clear();
        self.handlers.lock().clear();
    }

    /// Registers a state listener, invoked once per quiescent state (the
    /// action buffer just emptied and a state exists). Returns a thunk that
    /// unregisters it.
    pub fn subscribe<F>(&self, listener: F, keep_ref: bool) -> Unsubscribe
    where
        F: Fn(Arc<S>) -> Option<BoxFuture> + Send + Sync + 'static,
    {
        let arc_listener: Arc<dyn Fn(Arc<S>) -> Option<BoxFuture> + Send + Sync> = Arc::new(listener);
        let boxed = if keep_ref {
            StateListener::strong(arc_listener)
        } else {
            StateListener::weak(&arc_listener)
        };
        self.subscribe_listener(boxed)
    }

    /// Registers a pre-built [`StateListener`], e.g. one produced by
    /// [`crate::weak_listener`]/[`crate::strong_listener`] or by
    /// [`crate::weak_method`] for a bound method whose receiver the store
    /// should not keep alive. Returns a thunk that unregisters it.
    pub fn subscribe_listener(&self, listener: StateListener<S>) -> Unsubscribe {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));

        let weak_store = self.weak_self.get().expect("weak_self set in new").clone();
        Box::new(move || {
            if let Some(store) = weak_store.upgrade() {
                store.listeners.lock().retain(|(i, _)| *i != id);
            }
        })
    }

    /// Registers `handler` under the exact variant of `sample` (its payload
    /// is never inspected, only its discriminant). Returns a thunk that
    /// unregisters it.
    pub fn subscribe_event(
        &self,
        sample: &E,
        handler: EventHandlerKind<E>,
        options: EventSubscriptionOptions,
    ) -> Unsubscribe {
        let key = event_key(sample);
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(key)
            .or_default()
            .push(HandlerRegistration { id, handler, options });

        let weak_store = self.weak_self.get().expect("weak_self set in new").clone();
        Box::new(move || {
            if let Some(store) = weak_store.upgrade() {
                if let Some(list) = store.handlers.lock().get_mut(&key) {
                    list.retain(|registration| registration.id != id);
                }
            }
        })
    }

    /// Builds an [`crate::autorun::Autorun`] bound to this store from a
    /// selector that may decline to project (returns `None`), e.g. one
    /// reading a field that only exists in some state variants.
    pub fn autorun_try<P, V>(
        &self,
        selector: impl Fn(&S) -> Option<P> + Send + Sync + 'static,
        comparator: Option<Box<dyn Fn(&S) -> Option<P> + Send + Sync>>,
        options: crate::options::AutorunOptions<V>,
        func: crate::autorun::AutorunFn<P, V>,
    ) -> Arc<crate::autorun::Autorun<S, A, E, P, V>>
    where
        P: Clone + PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let store = self.weak_self.get().and_then(Weak::upgrade).expect("store alive while calling autorun_try()");
        crate::autorun::Autorun::new(store, Box::new(selector), comparator, options, func)
    }

    /// Builds an [`crate::autorun::Autorun`] bound to this store from an
    /// infallible selector. Shorthand for [`Store::autorun_try`] with the
    /// selector wrapped in `Some`.
    pub fn autorun<P, V>(
        &self,
        selector: impl Fn(&S) -> P + Send + Sync + 'static,
        comparator: Option<Box<dyn Fn(&S) -> Option<P> + Send + Sync>>,
        options: crate::options::AutorunOptions<V>,
        func: crate::autorun::AutorunFn<P, V>,
    ) -> Arc<crate::autorun::Autorun<S, A, E, P, V>>
    where
        P: Clone + PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        self.autorun_try(move |state| Some(selector(state)), comparator, options, func)
    }
}

#[cfg(feature = "snapshot")]
impl<S, A, E> Store<S, A, E>
where
    S: Send + Sync + 'static + crate::snapshot::Snapshot,
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Renders the current state through [`crate::snapshot::Snapshot`].
    pub fn snapshot(&self) -> Option<serde_json::Value> {
        self.state().map(|state| state.to_snapshot())
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
