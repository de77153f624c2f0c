//! Events produced by the reducer and routed to event handlers.
//!
//! Mirrors [`crate::action::ActionItem`]: `FinishEvent` is a variant of this
//! wrapper rather than a value the caller's own `Event` type must special-case.

use std::mem::Discriminant;

/// An item on the store's event buffer: either the store's own shutdown
/// signal, or a caller-supplied event of type `E`.
#[derive(Debug, Clone)]
pub enum EventItem<E> {
    /// Queued once the action that triggered shutdown (`ActionItem::Finish`)
    /// has been reduced. Triggers worker-pool teardown; never delivered to
    /// caller-registered handlers.
    Finish,
    /// A caller-supplied event.
    Custom(E),
}

impl<E> From<E> for EventItem<E> {
    fn from(event: E) -> Self {
        EventItem::Custom(event)
    }
}

/// The key event handlers are registered and matched under.
///
/// Rust has no runtime reflection over "the type of this enum variant", so
/// matching is done on [`std::mem::discriminant`] of a caller-supplied
/// *sample* value of `E` — any value of the variant being subscribed to;
/// its payload is never inspected, only its discriminant — an exact variant
/// match, not a value-equality match.
pub type EventKey<E> = Discriminant<E>;

pub fn event_key<E>(sample: &E) -> EventKey<E> {
    std::mem::discriminant(sample)
}
