use super::coroutine::{AsyncCoroutine, Coroutine, Resumption, Suspension};
use crate::error::{Error, ProtocolViolation};
use crate::future::{Awaitable, Awaiter, Future, FutureId, Wakeup};
use crate::runtime::{ErrorContext, LoopRef, same_loop};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::ops::Deref;
use std::rc::{Rc, Weak};

/// Lifecycle state of a task, as seen from outside.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Not done and not waiting on anything: a step is scheduled or running.
    Idle,

    /// Waiting for an awaitable to complete.
    Suspended,

    Cancelled,

    /// Completed with a value or an error.
    Finished,
}

/// Type-erased view of a task, as stored by a scheduler's registry.
pub trait AnyTask: fmt::Display {
    fn id(&self) -> FutureId;

    fn state(&self) -> TaskState;

    fn done(&self) -> bool;

    /// Requests cancellation. See [`Task::cancel`].
    fn cancel(&self) -> bool;

    /// Drops the computation of a pending task that will never be stepped
    /// again, e.g. because its scheduler shut down.
    ///
    /// The task stays pending. Dropping its last handle then reports it as
    /// destroyed while pending.
    fn abandon(&self);
}

/// Shared, type-erased handle to a task.
pub type TaskRef = Rc<dyn AnyTask>;

/// A future driven by a resumable computation.
///
/// A task resumes its computation one step at a time on its scheduler.
/// Every time the computation suspends on an awaitable, the task registers
/// itself to be woken up once that awaitable is done, and the next step
/// delivers its outcome back into the computation.
///
/// A task is also a [`Future`] (through `Deref`) whose result is the value
/// the computation returns. Only the task completes that future:
/// [`Future::set_result`] and [`Future::set_exception`] fail with
/// [`Error::InvalidState`], and [`Future::cancel`] behaves as
/// [`Task::cancel`].
///
/// A suspended task is kept alive by the awaitable it waits on. When that
/// awaitable is only reachable from the task's own computation, the two
/// form a reference cycle nothing else will wake up. Such a task is
/// reported as destroyed while pending once its loop is closed (see
/// [`LocalLoop::close`](crate::LocalLoop::close)).
pub struct Task<T> {
    inner: Rc<TaskInner<T>>,
}

pub(crate) struct TaskInner<T> {
    future: Future<T>,

    /// Released once the task is terminal.
    coroutine: RefCell<Option<Box<dyn Coroutine<Output = T>>>>,

    /// The awaitable the task is suspended on. Never keeps it alive.
    waiter: RefCell<Option<Weak<dyn Awaitable>>>,

    /// Cancellation requested while nothing could be cancelled on the
    /// task's behalf: delivered on the next step.
    must_cancel: Cell<bool>,

    /// Whether dropping the task while pending is reported.
    log_destroy_pending: Cell<bool>,
}

impl<T: 'static> Task<T> {
    /// Creates a task driving `coroutine` on `scheduler`.
    ///
    /// The first step is scheduled right away, and the task is registered
    /// in the scheduler's registry until it finishes or is dropped.
    pub fn new<C>(scheduler: LoopRef, coroutine: C) -> Self
    where
        C: Coroutine<Output = T> + 'static,
    {
        let inner = Rc::new(TaskInner {
            future: Future::with_kind(Rc::clone(&scheduler), "Task"),
            coroutine: RefCell::new(Some(Box::new(coroutine))),
            waiter: RefCell::new(None),
            must_cancel: Cell::new(false),
            log_destroy_pending: Cell::new(true),
        });

        let weak: Weak<TaskInner<T>> = Rc::downgrade(&inner);
        inner.future.set_owner(weak.clone());
        scheduler.registry().register(inner.future.id(), weak);

        log::debug!("task {} created", inner.future.id());
        inner.call_step_soon(None);

        Self { inner }
    }

    /// Creates a task driving an `async` block on `scheduler`.
    pub fn spawn<F>(scheduler: LoopRef, future: F) -> Self
    where
        F: std::future::Future<Output = Result<T, Error>> + 'static,
    {
        Self::new(scheduler, AsyncCoroutine::new(future))
    }

    /// Requests cancellation of the task.
    ///
    /// If the task is suspended on an awaitable that accepts cancellation,
    /// that awaitable is cancelled and the task observes it on wakeup.
    /// Otherwise a cancellation error is injected on the next step. The
    /// computation may still handle it and carry on.
    ///
    /// Returns `false` if the task is already done.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Whether a cancellation is waiting to be delivered on the next step.
    pub fn must_cancel(&self) -> bool {
        self.inner.must_cancel.get()
    }

    /// Whether dropping this task while it is pending is reported to its
    /// scheduler. Enabled by default.
    pub fn set_log_destroy_pending(&self, enabled: bool) {
        self.inner.log_destroy_pending.set(enabled);
    }

    /// Type-erased handle to this task.
    pub fn as_any(&self) -> TaskRef {
        self.inner.clone()
    }

    /// Handle another task can suspend on. Cancelling it cancels the task.
    pub fn as_awaitable(&self) -> Rc<dyn Awaitable> {
        self.inner.clone()
    }
}

impl<T> Task<T> {
    pub fn task_state(&self) -> TaskState {
        self.inner.task_state()
    }

    /// The awaitable the task is currently suspended on, if it is still
    /// alive.
    pub fn waiter(&self) -> Option<Rc<dyn Awaitable>> {
        self.inner.waiter.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn as_future(&self) -> &Future<T> {
        &self.inner.future
    }
}

impl<T: 'static> TaskInner<T> {
    fn call_step_soon(self: &Rc<Self>, error: Option<Error>) {
        let task = Rc::clone(self);

        self.future
            .get_loop()
            .call_soon(Box::new(move || task.step(error)));
    }

    /// Runs one step with this task installed as the current task.
    fn step(self: &Rc<Self>, error: Option<Error>) -> Result<(), Error> {
        let scheduler = Rc::clone(self.future.get_loop());
        let current: Rc<dyn AnyTask> = self.clone();

        let out = scheduler.registry().enter(current, || self.step_impl(error));

        if self.future.done() {
            scheduler.registry().unregister(self.future.id());
        }

        out
    }

    fn step_impl(self: &Rc<Self>, mut error: Option<Error>) -> Result<(), Error> {
        if self.future.done() {
            let injected = error.map_or_else(|| "None".to_string(), |e| e.to_string());
            return Err(Error::fatal_msg(format!(
                "step(): already done: {} {injected}",
                self.describe()
            )));
        }

        if self.must_cancel.replace(false) {
            error = match error {
                Some(error) if error.is_cancelled() => Some(error),
                _ => Some(Error::cancelled()),
            };
        }

        *self.waiter.borrow_mut() = None;

        let resumption = {
            let mut coroutine = self.coroutine.borrow_mut();
            let Some(coroutine) = coroutine.as_mut() else {
                return Err(Error::fatal_msg("step(): coroutine already released"));
            };

            match error {
                Some(error) => coroutine.resume_with_error(error),
                None => coroutine.resume(),
            }
        };

        match resumption {
            Resumption::Completed(value) => {
                self.release();
                self.future.complete(value)
            }
            Resumption::Failed(error) if error.is_cancelled() => {
                self.release();
                self.future.cancel_now();
                Ok(())
            }
            Resumption::Failed(error) => {
                self.release();
                self.future.fail(error.clone())?;

                if error.is_fatal() {
                    return Err(error);
                }
                Ok(())
            }
            Resumption::Suspended(Suspension::Await(awaitable)) => {
                self.suspend_on(awaitable);
                Ok(())
            }
            Resumption::Suspended(Suspension::Tick) => {
                self.call_step_soon(None);
                Ok(())
            }
            Resumption::Suspended(Suspension::Other(what)) => {
                log::debug!("task {} got bad yield: {what}", self.future.id());
                self.call_step_soon(Some(ProtocolViolation::BadYield(what).into()));
                Ok(())
            }
        }
    }

    /// Registers the wakeup of this task on `awaitable`.
    ///
    /// Anything the task cannot wait on is reported back to the computation
    /// on the next step.
    fn suspend_on(self: &Rc<Self>, awaitable: Rc<dyn Awaitable>) {
        if awaitable.id() == self.future.id() {
            let violation = ProtocolViolation::SelfAwait {
                task: self.describe(),
            };
            self.call_step_soon(Some(violation.into()));
            return;
        }

        if !same_loop(&awaitable.get_loop(), self.future.get_loop()) {
            let violation = ProtocolViolation::DifferentLoop {
                task: self.describe(),
                future: awaitable.describe(),
            };
            self.call_step_soon(Some(violation.into()));
            return;
        }

        if !awaitable.is_blocking() {
            let violation = ProtocolViolation::NotBlocking {
                task: self.describe(),
                future: awaitable.describe(),
            };
            self.call_step_soon(Some(violation.into()));
            return;
        }

        awaitable.clear_blocking();

        let task = Rc::clone(self);
        let wakeup: Wakeup = Box::new(move |done: &dyn Awaitable| task.wakeup(done));
        awaitable.add_done_callback(wakeup);

        *self.waiter.borrow_mut() = Some(Rc::downgrade(&awaitable));
        log::debug!(
            "task {} suspended on {}",
            self.future.id(),
            awaitable.id()
        );

        if self.must_cancel.get() && awaitable.cancel() {
            self.must_cancel.set(false);
        }
    }

    /// Resumes the task with the outcome of the awaitable it waited on.
    fn wakeup(self: &Rc<Self>, awaitable: &dyn Awaitable) -> Result<(), Error> {
        match awaitable.outcome() {
            Ok(()) => self.step(None),
            Err(error) => self.step(Some(error)),
        }
    }

    fn cancel(&self) -> bool {
        if self.future.done() {
            return false;
        }

        let waiter = self.waiter.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(waiter) = waiter {
            // The task observes the cancellation when it wakes up.
            if waiter.cancel() {
                return true;
            }
        }

        self.must_cancel.set(true);
        true
    }

    /// Drops the computation once the task is terminal.
    fn release(&self) {
        let coroutine = self.coroutine.borrow_mut().take();
        drop(coroutine);
    }
}

impl<T> TaskInner<T> {
    fn task_state(&self) -> TaskState {
        if self.future.cancelled() {
            TaskState::Cancelled
        } else if self.future.done() {
            TaskState::Finished
        } else if self.waiter.borrow().is_some() {
            TaskState::Suspended
        } else {
            TaskState::Idle
        }
    }

    fn describe(&self) -> String {
        let mut extra = format!("id={}", self.future.id());

        // By id only: two tasks may wait on each other.
        let waiter = self.waiter.borrow().as_ref().and_then(Weak::upgrade);
        if let Some(waiter) = waiter {
            extra.push_str(&format!(" wait_for=#{}", waiter.id()));
        }

        self.future.inner.describe(Some(extra))
    }
}

impl<T: 'static> Awaitable for TaskInner<T> {
    fn id(&self) -> FutureId {
        self.future.id()
    }

    fn get_loop(&self) -> LoopRef {
        Rc::clone(self.future.get_loop())
    }

    fn is_blocking(&self) -> bool {
        self.future.is_blocking()
    }

    fn clear_blocking(&self) {
        self.future.set_blocking(false);
    }

    fn add_done_callback(&self, wakeup: Wakeup) {
        Awaitable::add_done_callback(&*self.future.inner, wakeup);
    }

    fn cancel(&self) -> bool {
        TaskInner::cancel(self)
    }

    fn outcome(&self) -> Result<(), Error> {
        self.future.inner.outcome()
    }

    fn describe(&self) -> String {
        TaskInner::describe(self)
    }
}

impl<T: 'static> AnyTask for TaskInner<T> {
    fn id(&self) -> FutureId {
        self.future.id()
    }

    fn state(&self) -> TaskState {
        self.task_state()
    }

    fn done(&self) -> bool {
        self.future.done()
    }

    fn cancel(&self) -> bool {
        TaskInner::cancel(self)
    }

    fn abandon(&self) {
        if self.future.done() {
            return;
        }

        // A running step holds the computation.
        let coroutine = match self.coroutine.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if coroutine.is_some() {
            log::debug!("task {} abandoned while pending", self.future.id());
        }
        drop(coroutine);
    }
}

impl<T> fmt::Display for TaskInner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<T> Drop for TaskInner<T> {
    fn drop(&mut self) {
        let scheduler = Rc::clone(self.future.get_loop());
        scheduler.registry().unregister(self.future.id());

        if self.future.done() || !self.log_destroy_pending.get() {
            return;
        }

        let context = ErrorContext::new("Task was destroyed but it is pending!")
            .with_task(self.describe())
            .with_source_traceback(self.future.source_traceback());

        scheduler.call_exception_handler(context);
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Task<T> {
    type Target = Future<T>;

    fn deref(&self) -> &Future<T> {
        &self.inner.future
    }
}

impl<T> fmt::Display for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.describe())
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.future.id())
            .field("state", &self.inner.task_state())
            .field("must_cancel", &self.inner.must_cancel.get())
            .finish()
    }
}

impl<T: Clone + 'static> IntoFuture for Task<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Awaiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        let awaitable: Rc<dyn Awaitable> = self.inner.clone();
        Awaiter::new(self.inner.future.clone(), awaitable)
    }
}

impl<T: Clone + 'static> IntoFuture for &Task<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Awaiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.clone().into_future()
    }
}
