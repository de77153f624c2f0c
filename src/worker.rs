//! The side-effect worker pool (component B): a fixed set of OS threads
//! pulling `(handler, event)` pairs off a shared FIFO queue and invoking
//! them, decoupled from the run loop.
//!
//! Workers never touch state, listeners, or autoruns directly.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::handler::EventHandlerKind;
use crate::task::TaskCreator;

/// A unit of work pulled off the queue: a handler/event pair to invoke, or
/// `None`, the shutdown sentinel.
type WorkerTask<E> = Option<(EventHandlerKind<E>, E)>;

/// A fixed pool of worker threads draining a shared FIFO queue.
pub struct WorkerPool<E> {
    sender: Sender<WorkerTask<E>>,
    handles: Vec<JoinHandle<()>>,
}

impl<E> WorkerPool<E>
where
    E: Send + 'static,
{
    /// Spawns `threads` workers, each invoking handlers with `task_creator`
    /// available for any awaitable a handler hands back.
    pub fn spawn(threads: usize, task_creator: TaskCreator) -> Self {
        debug_assert!(threads > 0, "worker pool must have at least one thread");
        let (sender, receiver): (Sender<WorkerTask<E>>, Receiver<WorkerTask<E>>) = unbounded();

        let handles = (0..threads)
            .map(|index| {
                let receiver = receiver.clone();
                let task_creator = task_creator.clone();
                std::thread::Builder::new()
                    .name(format!("store-flux-worker-{index}"))
                    .spawn(move || worker_loop(receiver, task_creator))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        WorkerPool { sender, handles }
    }

    /// Enqueues a handler invocation. Never blocks the run loop on worker
    /// availability; the queue is unbounded.
    pub fn submit(&self, handler: EventHandlerKind<E>, event: E) {
        // A closed receiver (all workers already torn down) means
        // `shutdown` already ran; dropping the task silently matches a
        // worker that would have found the handler gone anyway.
        let _ = self.sender.send(Some((handler, event)));
    }

    /// Sends one shutdown sentinel per worker and joins every thread.
    pub fn shutdown(self) {
        for _ in &self.handles {
            let _ = self.sender.send(None);
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop<E>(receiver: Receiver<WorkerTask<E>>, task_creator: TaskCreator) {
    while let Ok(task) = receiver.recv() {
        let (handler, event) = match task {
            Some(task) => task,
            None => break,
        };

        let Some(invoke) = handler.resolve(&event) else {
            log::trace!("worker skipping invocation: handler reference is gone");
            continue;
        };

        match catch_unwind(AssertUnwindSafe(invoke)) {
            Ok(Some(future)) => task_creator(future, None),
            Ok(None) => {}
            Err(payload) => {
                let message = panic_message(&payload);
                log::error!("event handler panicked, isolated to this worker iteration: {message}");
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    struct Bumped(i32);

    #[test]
    fn worker_invokes_handler_and_shuts_down() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pool: WorkerPool<Bumped> = WorkerPool::spawn(2, crate::task::default_task_creator());

        let seen_clone = seen.clone();
        let handler = EventHandlerKind::with_event(move |event: &Bumped| {
            seen_clone.fetch_add(event.0 as usize, Ordering::SeqCst);
            None
        });

        pool.submit(handler.clone(), Bumped(2));
        pool.submit(handler, Bumped(3));

        // No synchronization primitive exposed for "queue drained"; poll
        // briefly since this is inherently async across threads.
        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 5 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 5);

        pool.shutdown();
    }

    #[test]
    fn panicking_handler_does_not_kill_the_worker() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pool: WorkerPool<Bumped> = WorkerPool::spawn(1, crate::task::default_task_creator());

        let panics = EventHandlerKind::with_event(|_: &Bumped| panic!("boom"));
        pool.submit(panics, Bumped(0));

        let seen_clone = seen.clone();
        let survives = EventHandlerKind::with_event(move |event: &Bumped| {
            seen_clone.fetch_add(event.0 as usize, Ordering::SeqCst);
            None
        });
        pool.submit(survives, Bumped(7));

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 7 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        pool.shutdown();
    }
}
