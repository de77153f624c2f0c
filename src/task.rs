//! The task-creator and scheduler seams: external collaborators the store
//! hands asynchronous work and its run loop to, rather than owning an event
//! loop itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, type-erased future with no output the caller needs back —
/// results of autorun/handler/listener async work are observed through the
/// store's own notification machinery, not through the future's output.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A handle to a spawned task, forwarded to an optional callback given to
/// the task creator.
pub type TaskHandle = tokio::task::JoinHandle<()>;

pub type TaskCreatorCallback = Arc<dyn Fn(TaskHandle) + Send + Sync>;

/// Submits an awaitable for execution, invoking `callback` (if given) with
/// a handle to the spawned task. Callers may supply their own (e.g. for
/// test determinism) via
/// [`crate::options::StoreOptions::task_creator`].
pub type TaskCreator = Arc<dyn Fn(BoxFuture, Option<TaskCreatorCallback>) + Send + Sync>;

/// Default task creator: spawns onto the ambient `tokio` runtime. Panics if
/// called outside of a running `tokio` runtime context.
pub fn default_task_creator() -> TaskCreator {
    Arc::new(|future: BoxFuture, callback: Option<TaskCreatorCallback>| {
        let handle = tokio::task::spawn(future);
        if let Some(callback) = callback {
            callback(handle);
        }
    })
}

/// A thunk the scheduler is asked to run: either the one-shot initial
/// `ActionItem::Init` dispatch, or the repeating `run()` tick.
pub type SchedulerThunk = Arc<dyn Fn() + Send + Sync>;

/// `(thunk, interval) -> ()`. When supplied via
/// [`crate::options::StoreOptions::scheduler`], the store never calls
/// `run()` synchronously from `dispatch()`; instead both the initial init
/// dispatch and the periodic run are delegated here. `interval` is `true`
/// for the repeating `run()` tick, `false` for the one-shot init dispatch.
pub type Scheduler = Arc<dyn Fn(SchedulerThunk, bool) + Send + Sync>;
