//! Error taxonomy surfaced to callers.
//!
//! Most of the failure modes a caller might imagine (dead weak reference,
//! worker panic, autorun comparator panic, reentrant `run()`) are isolated
//! and logged, or silently ignored, rather than propagated — a dead
//! listener is pruned silently, a panicking handler only poisons its own
//! worker iteration, and a reentrant `dispatch`/`run` call is a no-op
//! against the run-lock guard. Only the reducer failure that leaves the
//! store unable to make progress surfaces as a `Result::Err`.

use thiserror::Error;

/// Failures returned from [`crate::Store::dispatch`] and
/// [`crate::Store::run`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The reducer panicked while processing the action at the head of the
    /// buffer. Per the deferred-pop policy, that action is still at the
    /// head of the buffer afterwards; a caller inspecting the store's state
    /// sees it unchanged from before the failed reduce.
    #[error("reducer panicked while processing an action: {message}")]
    ReducerFailure { message: String },
}
