//! Futures: placeholders for results that become available later.
//!
//! This module contains:
//! - the [`Future`] state machine and its completion callbacks,
//! - the [`Awaitable`] interface tasks suspend on,
//! - the single-use [`Awaiter`] bridging a future into `async` code.
//!
//! A future is bound to one scheduler for its whole life. Every
//! completion callback is dispatched through that scheduler, never
//! invoked inline.

mod awaitable;
mod awaiter;
mod callback;
mod core;

pub use awaitable::{Awaitable, Wakeup};
pub use awaiter::Awaiter;
pub use callback::DoneCallback;
pub use self::core::{Future, FutureId, FutureState};
