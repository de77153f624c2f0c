//! Memoized reactive derivations bound to a store (component D).
//!
//! An `Autorun` subscribes itself to its store as an ordinary state
//! listener, re-running its selector/comparator on every quiescent state and
//! invoking `func` only when the comparator value changes. Subscribers are
//! held in a [`ReferenceBox`] registry, fanned out to by snapshotting the
//! registry and pruning dead entries afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::options::AutorunOptions;
use crate::reference::ReferenceBox;
use crate::store::{Store, Unsubscribe};

/// `func`'s arity, fixed at registration since Rust cannot inspect a
/// closure's parameter count at call time.
pub enum AutorunFn<P, V> {
    /// `f(projection)`.
    OneArg(ReferenceBox<dyn Fn(&P) -> V + Send + Sync>),
    /// `f(projection, previous_projection)`.
    TwoArg(ReferenceBox<dyn Fn(&P, Option<&P>) -> V + Send + Sync>),
}

enum ResolvedFn<P, V> {
    OneArg(Arc<dyn Fn(&P) -> V + Send + Sync>),
    TwoArg(Arc<dyn Fn(&P, Option<&P>) -> V + Send + Sync>),
}

struct AutorunMemo<P, V> {
    /// Last projection passed to `func`, handed back as the `prev` argument
    /// of a two-arg `func`. Distinct from `last_comparator` only when a
    /// separate comparator closure is supplied.
    last_projection: Option<P>,
    /// The memoization key. `None` is the sentinel meaning "never
    /// evaluated" — distinct from any real comparator value, which is
    /// always `Some`.
    last_comparator: Option<P>,
    latest_value: Arc<V>,
}

/// A subscriber to an autorun's computed value.
type AutorunSubscriber<V> = ReferenceBox<dyn Fn(Arc<V>) + Send + Sync>;

/// A reactive derivation over a store's state.
///
/// `P` is the projection type produced by the selector and (by default)
/// used as the comparator too: a selector whose projection isn't an
/// adequate comparison key can compute a distinct `P`-shaped value inside
/// an explicit comparator closure instead.
pub struct Autorun<S, A, E, P, V> {
    store: Arc<Store<S, A, E>>,
    selector: Box<dyn Fn(&S) -> Option<P> + Send + Sync>,
    comparator: Option<Box<dyn Fn(&S) -> Option<P> + Send + Sync>>,
    func: AutorunFn<P, V>,
    memo: Mutex<AutorunMemo<P, V>>,
    subscribers: Mutex<Vec<(u64, AutorunSubscriber<V>)>>,
    next_subscriber_id: AtomicU64,
    weak_self: OnceLock<Weak<Autorun<S, A, E, P, V>>>,
    /// Whether a changed value is fanned out to subscribers synchronously
    /// (`true`) or held until [`Autorun::inform_subscribers`] is called
    /// (`false`). Defaults to `true`; callers opt into deferred mode
    /// explicitly via [`AutorunOptions::subscribers_immediate_run`].
    immediate_run: bool,
    subscribers_keep_ref: bool,
}

impl<S, A, E, P, V> Autorun<S, A, E, P, V>
where
    S: Send + Sync + 'static,
    A: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    P: Clone + PartialEq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        store: Arc<Store<S, A, E>>,
        selector: Box<dyn Fn(&S) -> Option<P> + Send + Sync>,
        comparator: Option<Box<dyn Fn(&S) -> Option<P> + Send + Sync>>,
        options: AutorunOptions<V>,
        func: AutorunFn<P, V>,
    ) -> Arc<Self> {
        let immediate_run = options.subscribers_immediate_run.unwrap_or(true);

        let autorun = Arc::new(Autorun {
            store: store.clone(),
            selector,
            comparator,
            func,
            memo: Mutex::new(AutorunMemo {
                last_projection: None,
                last_comparator: None,
                latest_value: Arc::new(options.default_value),
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
            weak_self: OnceLock::new(),
            immediate_run,
            subscribers_keep_ref: options.subscribers_keep_ref,
        });
        let _ = autorun.weak_self.set(Arc::downgrade(&autorun));

        if options.initial_run {
            if let Some(state) = store.state() {
                autorun.notify(&state);
            }
        }

        // The store holds a strong reference to this autorun for as long as
        // the store itself lives; the cycle (autorun -> store -> autorun)
        // is broken when the store clears its listener registry on finish.
        let listener_target = autorun.clone();
        let _kept_alive_by_store: Unsubscribe =
            store.subscribe(move |state| { listener_target.notify(&state); None }, true);

        autorun
    }

    /// Re-runs the selector/comparator check against `state`, invoking
    /// `func` iff the comparator value changed.
    fn notify(&self, state: &Arc<S>) {
        let proj = match (self.selector)(state) {
            Some(proj) => proj,
            None => return,
        };

        let callable = match &self.func {
            AutorunFn::OneArg(f) => f.deref().map(ResolvedFn::OneArg),
            AutorunFn::TwoArg(f) => f.deref().map(ResolvedFn::TwoArg),
        };
        let callable = match callable {
            Some(callable) => callable,
            None => return,
        };

        let cmp = match &self.comparator {
            Some(comparator) => match comparator(state) {
                Some(cmp) => cmp,
                None => return,
            },
            None => proj.clone(),
        };

        // Peek the memoized fields without holding the lock across `func`:
        // `func` is user code that may reentrantly call back into this same
        // autorun (`.value()`/`.call()`), which would deadlock against a
        // non-reentrant `parking_lot::Mutex` held across the call.
        let prev = {
            let memo = self.memo.lock();
            if memo.last_comparator.as_ref() == Some(&cmp) {
                return;
            }
            memo.last_projection.clone()
        };

        let result = match callable {
            ResolvedFn::OneArg(f) => f(&proj),
            ResolvedFn::TwoArg(f) => f(&proj, prev.as_ref()),
        };
        let value = Arc::new(result);

        {
            let mut memo = self.memo.lock();
            memo.last_projection = Some(proj);
            memo.last_comparator = Some(cmp);
            memo.latest_value = value.clone();
        }

        if self.immediate_run {
            self.fan_out(value);
        }
    }

    /// If the store has a state, re-runs the evaluation check; always
    /// returns the latest value.
    pub fn call(&self) -> Arc<V> {
        if let Some(state) = self.store.state() {
            self.notify(&state);
        }
        self.value()
    }

    /// The last computed value, without triggering re-evaluation.
    pub fn value(&self) -> Arc<V> {
        self.memo.lock().latest_value.clone()
    }

    /// Manually fans the current value out to subscribers. Used to drive
    /// notification for autoruns constructed with
    /// `subscribers_immediate_run(false)`.
    pub fn inform_subscribers(&self) {
        let value = self.value();
        self.fan_out(value);
    }

    fn fan_out(&self, value: Arc<V>) {
        let snapshot: Vec<(u64, AutorunSubscriber<V>)> = self.subscribers.lock().clone();
        let mut gone = Vec::new();
        for (id, subscriber) in &snapshot {
            match subscriber.deref() {
                Some(callable) => callable(value.clone()),
                None => gone.push(*id),
            }
        }
        if !gone.is_empty() {
            self.subscribers.lock().retain(|(id, _)| !gone.contains(id));
        }
    }

    /// Subscribes `callback` to this autorun's value. `keep_ref` defaults to
    /// [`AutorunOptions::subscribers_keep_ref`] when not overridden by the
    /// caller; `immediate_run` fires `callback` once, synchronously, with
    /// the current value.
    pub fn subscribe<F>(&self, callback: F, immediate_run: bool, keep_ref: Option<bool>) -> Unsubscribe
    where
        F: Fn(Arc<V>) + Send + Sync + 'static,
    {
        let keep_ref = keep_ref.unwrap_or(self.subscribers_keep_ref);
        let arc_callback: Arc<dyn Fn(Arc<V>) + Send + Sync> = Arc::new(callback);
        let boxed = if keep_ref {
            ReferenceBox::strong(arc_callback.clone())
        } else {
            ReferenceBox::weak(&arc_callback)
        };

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, boxed.clone()));

        if immediate_run {
            if let Some(callable) = boxed.deref() {
                callable(self.value());
            }
        }

        let weak_self = self.weak_self.get().expect("weak_self set in new").clone();
        Box::new(move || {
            if let Some(autorun) = weak_self.upgrade() {
                autorun.subscribers.lock().retain(|(i, _)| *i != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionItem, Reducer, ReducerOutcome};
    use crate::options::StoreOptions;
    use std::sync::atomic::AtomicI32;

    #[derive(Debug, Clone)]
    struct CounterState {
        count: i32,
        other: i32,
    }

    #[derive(Clone, Copy)]
    enum CounterAction {
        Inc,
        TouchOther,
    }

    struct CounterReducer;

    impl Reducer<CounterState, CounterAction, ()> for CounterReducer {
        fn reduce(
            &self,
            prev_state: Option<&Arc<CounterState>>,
            action: &ActionItem<CounterAction>,
        ) -> ReducerOutcome<CounterState, CounterAction, ()> {
            let (count, other) = prev_state.map(|s| (s.count, s.other)).unwrap_or((0, 0));
            match action {
                ActionItem::Init | ActionItem::Finish => {
                    ReducerOutcome::State(Arc::new(CounterState { count, other }))
                }
                ActionItem::Custom(CounterAction::Inc) => {
                    ReducerOutcome::State(Arc::new(CounterState { count: count + 1, other }))
                }
                ActionItem::Custom(CounterAction::TouchOther) => {
                    ReducerOutcome::State(Arc::new(CounterState { count, other: other + 1 }))
                }
            }
        }
    }

    fn test_store() -> Arc<Store<CounterState, CounterAction, ()>> {
        Store::new(CounterReducer, StoreOptions::new().auto_init(true))
    }

    #[test]
    fn s1_autorun_fires_on_every_distinct_projection() {
        let store = test_store();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(move |proj: &i32| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                *proj
            }))),
        );

        // Init dispatch already ran one evaluation (count == 0).
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        store.dispatch(CounterAction::Inc).unwrap();
        store.dispatch(CounterAction::Inc).unwrap();
        store.dispatch(CounterAction::Inc).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn s2_memoized_projection_skips_unrelated_state_changes() {
        let store = test_store();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(move |proj: &i32| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                *proj
            }))),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.dispatch(CounterAction::TouchOther).unwrap();
        store.dispatch(CounterAction::TouchOther).unwrap();
        // `other` changed but `count` (the projection) did not.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memoization_law_func_called_iff_comparator_changes() {
        let store = test_store();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0).initial_run(false),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(move |proj: &i32| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                *proj
            }))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        store.dispatch(CounterAction::Inc).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*autorun.value(), 1);

        // Calling again with an unchanged comparator does not re-invoke func.
        autorun.call();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn s6_two_arg_func_sees_previous_projection_only_on_change() {
        let store = test_store();
        let seen_prev: Arc<Mutex<Vec<Option<i32>>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_prev_clone = seen_prev.clone();
        let _autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0).initial_run(false),
            AutorunFn::TwoArg(ReferenceBox::strong(Arc::new(move |proj: &i32, prev: Option<&i32>| {
                seen_prev_clone.lock().push(prev.copied());
                *proj
            }))),
        );

        // State sequence driven through count: 1, 2, 2 (no-op via TouchOther
        // leaves count unchanged), 3 — the repeated value must not re-invoke
        // func, so only three calls happen, not four.
        store.dispatch(CounterAction::Inc).unwrap(); // count = 1
        store.dispatch(CounterAction::Inc).unwrap(); // count = 2
        store.dispatch(CounterAction::TouchOther).unwrap(); // count stays 2
        store.dispatch(CounterAction::Inc).unwrap(); // count = 3

        let calls = seen_prev.lock().clone();
        assert_eq!(calls, vec![None, Some(1), Some(2)]);
    }

    #[test]
    fn selector_returning_none_is_silently_skipped() {
        let store = test_store();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _autorun = store.autorun_try(
            |s: &CounterState| if s.count < 2 { None } else { Some(s.count) },
            None,
            AutorunOptions::new(0),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(move |proj: &i32| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                *proj
            }))),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.dispatch(CounterAction::Inc).unwrap(); // count = 1, still skipped
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        store.dispatch(CounterAction::Inc).unwrap(); // count = 2, now evaluated
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_mode_withholds_fan_out_until_informed() {
        let store = test_store();
        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0).subscribers_immediate_run(false),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(|proj: &i32| *proj))),
        );
        let _unsub = autorun.subscribe(
            move |value| {
                notified_clone.store(*value, Ordering::SeqCst);
            },
            false,
            None,
        );

        store.dispatch(CounterAction::Inc).unwrap();
        // Value recomputed but fan-out withheld.
        assert_eq!(*autorun.value(), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        autorun.inform_subscribers();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weak_subscriber_with_no_external_owner_is_pruned_on_next_fan_out() {
        let store = test_store();
        let autorun = store.autorun_try(
            |s: &CounterState| Some(s.count),
            None,
            AutorunOptions::new(0),
            AutorunFn::OneArg(ReferenceBox::strong(Arc::new(|proj: &i32| *proj))),
        );

        // `subscribe` builds its own internal `Arc` around the closure and
        // drops it once registration returns, so a `keep_ref: false`
        // subscription with no other owner is already gone by the next
        // notification.
        let _unsub = autorun.subscribe(|_| {}, false, Some(false));
        assert_eq!(autorun.subscribers.lock().len(), 1);

        store.dispatch(CounterAction::Inc).unwrap();
        assert_eq!(autorun.subscribers.lock().len(), 0);
    }
}
