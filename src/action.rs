//! Actions dispatched to the reducer, and the reducer contract itself.
//!
//! The `ReducerFn` concrete-pointer alias and the blanket `Reducer` impl for
//! it avoid generating multiple monomorphized versions of the run loop per
//! action type. The result is typed as bare state vs. composite with
//! follow-up actions/events, and the `Init`/`Finish` sentinel variants are
//! dispatched by the store on its own rather than by the caller.

use std::sync::Arc;

/// A dispatched item: either one of the store's own lifecycle actions, or a
/// caller-supplied action of type `A`.
///
/// Rust has no runtime reflection over a caller's action type, so the
/// lifecycle sentinels are variants of this wrapper instead of values a
/// caller would need to fold into their own action enum.
#[derive(Debug, Clone)]
pub enum ActionItem<A> {
    /// Dispatched automatically on store construction when
    /// [`crate::options::StoreOptions::auto_init`] is set.
    Init,
    /// Dispatched by a caller (or a composite reducer result) to trigger
    /// shutdown; causes `FinishEvent` to be queued once the reducer has
    /// processed it.
    Finish,
    /// A caller-supplied action.
    Custom(A),
}

impl<A> ActionItem<A> {
    pub fn is_finish(&self) -> bool {
        matches!(self, ActionItem::Finish)
    }
}

impl<A> From<A> for ActionItem<A> {
    fn from(action: A) -> Self {
        ActionItem::Custom(action)
    }
}

/// The result of reducing one [`ActionItem`].
///
/// `State` is a bare new state; `Composite` additionally carries follow-up
/// actions/events to be appended to the store's buffers atomically with the
/// state change (see `Store::run_one_action`).
pub enum ReducerOutcome<S, A, E> {
    State(Arc<S>),
    Composite { state: Arc<S>, actions: Vec<A>, events: Vec<E> },
}

impl<S, A, E> ReducerOutcome<S, A, E> {
    pub(crate) fn into_parts(self) -> (Arc<S>, Vec<A>, Vec<E>) {
        match self {
            ReducerOutcome::State(state) => (state, Vec::new(), Vec::new()),
            ReducerOutcome::Composite { state, actions, events } => (state, actions, events),
        }
    }
}

/// Takes an `ActionItem` submitted to a store via
/// [`Store::dispatch`](crate::Store::dispatch), and modifies `prev_state`
/// (absent before the first action is reduced), producing a new state and
/// any follow-up actions/events.
///
/// This method must be pure with respect to observable side effects; any
/// required side effects should be emitted as events for a handler to act
/// on, or as follow-up actions.
pub trait Reducer<S, A, E>: Send + Sync {
    fn reduce(&self, prev_state: Option<&Arc<S>>, action: &ActionItem<A>) -> ReducerOutcome<S, A, E>;
}

/// A reducer expressed as a plain function pointer, for the common case of
/// a single free-standing reducer function with no captured state.
pub type ReducerFn<S, A, E> =
    fn(Option<&Arc<S>>, &ActionItem<A>) -> ReducerOutcome<S, A, E>;

impl<S, A, E> Reducer<S, A, E> for ReducerFn<S, A, E> {
    fn reduce(&self, prev_state: Option<&Arc<S>>, action: &ActionItem<A>) -> ReducerOutcome<S, A, E> {
        (self)(prev_state, action)
    }
}
