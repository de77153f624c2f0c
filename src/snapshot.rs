//! Recursive structural-to-plain conversion of state for external
//! inspection (component E), gated behind the `snapshot` feature.
//!
//! The conversion target is a `serde_json::Value` tree rather than raw
//! bytes: a plain, inspectable value with no live references back into the
//! store.

use serde::Serialize;
use serde_json::Value;

/// Converts `Self` into a plain value tree with no live references to the
/// store it came from. Deterministic for equal inputs, by construction:
/// it is built directly on `serde_json`'s own deterministic encoding.
pub trait Snapshot {
    fn to_snapshot(&self) -> Value;
}

impl<T: Serialize> Snapshot for T {
    fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
