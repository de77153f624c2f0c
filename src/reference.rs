//! Uniform strong/weak handles to user-supplied callables.
//!
//! A single box reused by state listeners, event handlers, and autorun
//! functions/subscribers, instead of a bespoke `Weak`/`Arc` pair per site.

use std::sync::{Arc, Weak};

/// A handle to a callable of trait-object type `F`, either keeping it alive
/// (`Strong`), observing it without keeping it alive (`Weak`), or observing
/// a bound method without keeping its receiver alive (`WeakMethod`).
pub enum ReferenceBox<F: ?Sized> {
    Strong(Arc<F>),
    Weak(Weak<F>),
    WeakMethod(WeakMethodBox<F>),
}

impl<F: ?Sized> Clone for ReferenceBox<F> {
    fn clone(&self) -> Self {
        match self {
            ReferenceBox::Strong(a) => ReferenceBox::Strong(a.clone()),
            ReferenceBox::Weak(w) => ReferenceBox::Weak(w.clone()),
            ReferenceBox::WeakMethod(wm) => ReferenceBox::WeakMethod(wm.clone()),
        }
    }
}

impl<F: ?Sized> ReferenceBox<F> {
    pub fn strong(callable: Arc<F>) -> Self {
        ReferenceBox::Strong(callable)
    }

    pub fn weak(callable: &Arc<F>) -> Self {
        ReferenceBox::Weak(Arc::downgrade(callable))
    }

    /// Attempt to resolve this box to its live callable.
    ///
    /// Returns `None` ("gone") if a weak handle's target has been dropped.
    pub fn deref(&self) -> Option<Arc<F>> {
        match self {
            ReferenceBox::Strong(a) => Some(a.clone()),
            ReferenceBox::Weak(w) => w.upgrade(),
            ReferenceBox::WeakMethod(wm) => {
                if (wm.probe)() {
                    Some(wm.call.clone())
                } else {
                    None
                }
            }
        }
    }
}

/// A bound-method handle: weak on the receiver, strong on the function
/// descriptor, so the method does not die spuriously while the receiver is
/// still alive, but also does not keep the receiver alive on its own.
pub struct WeakMethodBox<F: ?Sized> {
    probe: Arc<dyn Fn() -> bool + Send + Sync>,
    call: Arc<F>,
}

impl<F: ?Sized> Clone for WeakMethodBox<F> {
    fn clone(&self) -> Self {
        WeakMethodBox { probe: self.probe.clone(), call: self.call.clone() }
    }
}

/// Build a [`ReferenceBox`] for a method bound to `receiver`, without
/// keeping `receiver` alive.
///
/// `descriptor` is the method body, already closing over a cloned
/// `Weak<R>`; `probe` is a second, independent liveness check over the
/// same receiver. Keeping them separate means liveness can be checked
/// (for pruning during traversal) without invoking the method itself.
pub fn weak_method<R, F: ?Sized + 'static>(
    receiver: &Arc<R>,
    descriptor: impl FnOnce(Weak<R>) -> Arc<F>,
) -> ReferenceBox<F>
where
    R: Send + Sync + 'static,
{
    let weak_receiver = Arc::downgrade(receiver);
    let probe_receiver = weak_receiver.clone();
    ReferenceBox::WeakMethod(WeakMethodBox {
        probe: Arc::new(move || probe_receiver.upgrade().is_some()),
        call: descriptor(weak_receiver),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: std::sync::atomic::AtomicI32,
    }

    #[test]
    fn strong_box_always_resolves() {
        let f: Arc<dyn Fn(i32) -> i32 + Send + Sync> = Arc::new(|x| x + 1);
        let boxed = ReferenceBox::strong(f);
        assert!(boxed.deref().is_some());
        assert!(boxed.deref().is_some());
    }

    #[test]
    fn weak_box_becomes_gone_after_drop() {
        let f: Arc<dyn Fn(i32) -> i32 + Send + Sync> = Arc::new(|x| x + 1);
        let boxed = ReferenceBox::weak(&f);
        assert!(boxed.deref().is_some());
        drop(f);
        assert!(boxed.deref().is_none());
    }

    #[test]
    fn weak_method_tracks_receiver_liveness() {
        let receiver = Arc::new(Counter { value: std::sync::atomic::AtomicI32::new(41) });
        let boxed: ReferenceBox<dyn Fn() -> i32 + Send + Sync> =
            weak_method(&receiver, |weak_receiver: Weak<Counter>| {
                Arc::new(move || {
                    let r = weak_receiver.upgrade().expect("receiver dropped between probe and call");
                    r.value.load(std::sync::atomic::Ordering::SeqCst) + 1
                })
            });

        let callable = boxed.deref().expect("receiver still alive");
        assert_eq!(callable(), 42);

        drop(receiver);
        assert!(boxed.deref().is_none());
    }
}
