//! # Orbis
//!
//! **Orbis** is the cooperative future/task core of the **Nebula** ecosystem.
//!
//! It provides the two primitives every single-threaded event loop is built
//! on: a [`Future`] holding a result that becomes available later, and a
//! [`Task`] driving a resumable computation to completion by suspending it
//! on the futures it depends on.
//!
//! Orbis deliberately stays out of the IO business. Futures and tasks are
//! bound to a [`Scheduler`](runtime::Scheduler), a small capability any loop
//! can implement. [`LocalLoop`] is the bundled implementation: a FIFO queue
//! of callbacks, with no timers and no IO.
//!
//! - **Futures** complete once, with a value, an error, or by cancellation,
//!   and dispatch their completion callbacks through their scheduler
//! - **Tasks** run `async` blocks (or any [`Coroutine`](task::Coroutine))
//!   one step at a time, with advisory cancellation
//! - **Diagnostics** for errors nobody retrieved and tasks destroyed while
//!   pending, optionally with the backtrace of their creation
//! - **Ergonomic macros** like `#[orbis::main]` and `#[orbis::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orbis::{get_running_loop, spawn};
//!
//! #[orbis::main]
//! async fn main() {
//!     let event_loop = get_running_loop()?;
//!     let future = orbis::Future::new(event_loop);
//!
//!     // Complete the future from another task
//!     let producer = future.clone();
//!     spawn(async move {
//!         producer.set_result(41)?;
//!         Ok(())
//!     })?;
//!
//!     let consumer = spawn(async move { Ok(future.await? + 1) })?;
//!     println!("{}", consumer.await?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`future`] — Futures, completion callbacks and the awaitable interface
//! - [`task`] — Tasks, resumable computations and the task registry views
//! - [`runtime`] — The scheduler capability and the bundled loop
//!
//! ## Getting Started
//!
//! Add Orbis to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! orbis = { git = "https://github.com/Nebula-ecosystem/Orbis", package = "orbis" }
//! ```

mod error;

pub mod future;
pub mod runtime;
pub mod task;

pub use error::{Error, ProtocolViolation};
pub use future::Future;
pub use runtime::{LocalLoop, LoopBuilder, get_running_loop, yield_now};
pub use task::{Task, spawn};

pub use orbis_macros::*;
