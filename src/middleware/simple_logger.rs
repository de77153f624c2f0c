//! A small `log`-backed middleware for tracing dispatched actions/events.

use std::fmt::Debug;
use std::sync::Arc;

use crate::options::{ActionMiddleware, EventMiddleware};

pub enum LogLevel {
    Trace,
    Debug,
    Warn,
    Info,
}

impl LogLevel {
    fn log<S: AsRef<str>>(&self, message: S) {
        match self {
            LogLevel::Trace => log::trace!("{}", message.as_ref()),
            LogLevel::Debug => log::debug!("{}", message.as_ref()),
            LogLevel::Warn => log::warn!("{}", message.as_ref()),
            LogLevel::Info => log::info!("{}", message.as_ref()),
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

/// Builds an [`ActionMiddleware`] that logs every dispatched action with
/// `{:?}` at `log_level`.
pub fn action_logger<A>(log_level: LogLevel) -> ActionMiddleware<A>
where
    A: Debug + Send + Sync + 'static,
{
    Arc::new(move |action: &A| {
        log_level.log(format!("action: {action:?}"));
    })
}

/// Builds an [`EventMiddleware`] that logs every dispatched event with
/// `{:?}` at `log_level`.
pub fn event_logger<E>(log_level: LogLevel) -> EventMiddleware<E>
where
    E: Debug + Send + Sync + 'static,
{
    Arc::new(move |event: &E| {
        log_level.log(format!("event: {event:?}"));
    })
}
