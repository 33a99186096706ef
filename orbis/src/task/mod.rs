//! Tasks: futures driven by resumable computations.
//!
//! A [`Task`] repeatedly resumes a [`Coroutine`] on its scheduler until
//! the computation completes. `async` blocks are adapted through
//! [`AsyncCoroutine`]; any other resumable computation can implement
//! [`Coroutine`] directly.
//!
//! Every scheduler keeps a registry of its live tasks, exposed through
//! [`all_tasks`] and [`current_task`].

mod core;
mod coroutine;

pub use self::core::{AnyTask, Task, TaskRef, TaskState};
pub use coroutine::{AsyncCoroutine, Coroutine, Resumption, Suspension};

use crate::error::Error;
use crate::runtime::context;
use crate::runtime::LoopRef;

/// Returns every unfinished task bound to `scheduler`, in creation order.
pub fn all_tasks(scheduler: &LoopRef) -> Vec<TaskRef> {
    scheduler.registry().all_tasks()
}

/// Returns the task `scheduler` is currently stepping, if any.
///
/// Only set while a task's computation is running.
pub fn current_task(scheduler: &LoopRef) -> Option<TaskRef> {
    scheduler.registry().current_task()
}

/// Spawns `future` as a task on the running loop.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] when no loop is running on this thread.
///
/// # Examples
///
/// ```rust,ignore
/// let task = orbis::spawn(async { Ok(21 * 2) })?;
/// assert_eq!(task.await?, 42);
/// ```
pub fn spawn<F, T>(future: F) -> Result<Task<T>, Error>
where
    F: std::future::Future<Output = Result<T, Error>> + 'static,
    T: 'static,
{
    let scheduler = context::running_loop()
        .ok_or_else(|| Error::InvalidState("no running event loop".to_string()))?;

    Ok(Task::spawn(scheduler, future))
}
