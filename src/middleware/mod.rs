//! Ready-made [`crate::options::ActionMiddleware`]/
//! [`crate::options::EventMiddleware`] implementations, usable as utilities
//! in an application.
//!
//! These are plain observer functions, typed in `crate::options`: middleware
//! here cannot transform or cancel a dispatched item, only look at it.

pub mod simple_logger;
