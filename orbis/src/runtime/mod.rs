//! Scheduling side of the runtime.
//!
//! This module contains:
//! - the [`Scheduler`] capability futures and tasks are bound to,
//! - the per-scheduler [`TaskRegistry`],
//! - [`LocalLoop`], a single-threaded FIFO loop implementing it,
//! - cooperative yielding via [`yield_now`].
//!
//! Applications with their own event loop implement [`Scheduler`];
//! everyone else uses [`LocalLoop`].

mod builder;
mod local;
mod registry;
mod scheduler;
mod yield_now;

pub(crate) mod context;

pub use builder::LoopBuilder;
pub use local::{ExceptionHandler, LocalLoop};
pub use registry::TaskRegistry;
pub use scheduler::{Callback, ErrorContext, LoopRef, Scheduler, same_loop};
pub use yield_now::yield_now;

use crate::error::Error;

/// Returns the loop running on the current thread.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] when called outside of a running loop.
pub fn get_running_loop() -> Result<LoopRef, Error> {
    context::running_loop().ok_or_else(|| Error::InvalidState("no running event loop".to_string()))
}
