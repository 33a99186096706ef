use super::awaitable::{Awaitable, Wakeup};
use super::callback::DoneCallback;
use crate::error::Error;
use crate::runtime::{ErrorContext, LoopRef};

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a future or task.
///
/// Ids are allocated from a process-wide counter, so they also order
/// futures by creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FutureId(u64);

static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(1);

impl FutureId {
    fn next() -> Self {
        FutureId(NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a future.
///
/// Transitions only ever go from `Pending` to one of the two terminal
/// states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Cancelled,
    Finished,
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FutureState::Pending => "PENDING",
            FutureState::Cancelled => "CANCELLED",
            FutureState::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// A result that becomes available later.
///
/// `Future` is a cheap, clonable handle: every clone observes and drives
/// the same underlying state. It completes at most once, either with a
/// value, with an error, or by being cancelled.
///
/// Awaiting a future (`future.await`) from inside a task suspends the task
/// until the future completes.
pub struct Future<T> {
    pub(crate) inner: Rc<FutureInner<T>>,
}

/// Shared state behind a [`Future`] handle.
pub(crate) struct FutureInner<T> {
    /// Back-reference used to hand out handles from `&self`.
    this: Weak<FutureInner<T>>,

    id: FutureId,

    /// Type name used in diagnostics (`Future` or `Task`).
    kind: &'static str,

    state: Cell<FutureState>,
    result: RefCell<Option<T>>,
    error: RefCell<Option<Error>>,

    /// Callbacks registered while pending, drained exactly once.
    callbacks: RefCell<Vec<DoneCallback<T>>>,

    /// Set by an awaiter between yielding this future and the task
    /// registering its wakeup.
    blocking: Cell<bool>,

    /// Whether the stored error still has to be retrieved.
    log_traceback: Cell<bool>,

    scheduler: LoopRef,

    source_traceback: Option<Rc<Backtrace>>,

    /// The task computing this future, if any. Only the task completes it.
    owner: RefCell<Option<Weak<dyn Awaitable>>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Future<T> {
    /// Creates a pending future bound to `scheduler`.
    ///
    /// When the scheduler runs in debug mode, the creation site is captured
    /// and attached to later diagnostics.
    pub fn new(scheduler: LoopRef) -> Self {
        Self::with_kind(scheduler, "Future")
    }

    pub(crate) fn with_kind(scheduler: LoopRef, kind: &'static str) -> Self {
        let source_traceback = scheduler
            .get_debug()
            .then(|| Rc::new(Backtrace::force_capture()));

        let inner = Rc::new_cyclic(|this| FutureInner {
            this: this.clone(),
            id: FutureId::next(),
            kind,
            state: Cell::new(FutureState::Pending),
            result: RefCell::new(None),
            error: RefCell::new(None),
            callbacks: RefCell::new(Vec::new()),
            blocking: Cell::new(false),
            log_traceback: Cell::new(false),
            scheduler,
            source_traceback,
            owner: RefCell::new(None),
        });

        Self { inner }
    }

    /// Marks the future done and stores its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the future is already done, or if
    /// it is the future of a task.
    pub fn set_result(&self, value: T) -> Result<(), Error> {
        self.ensure_unowned("set_result")?;
        self.complete(value)
    }

    /// Marks the future done and stores an error.
    ///
    /// The error is reported to the scheduler if the future is dropped
    /// before anyone retrieves it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the future is already done, or if
    /// it is the future of a task.
    pub fn set_exception(&self, error: Error) -> Result<(), Error> {
        self.ensure_unowned("set_exception")?;
        self.fail(error)
    }

    /// Cancels the future and schedules its callbacks.
    ///
    /// The future of a task is cancelled through the task, as
    /// [`Task::cancel`](crate::Task::cancel) does.
    ///
    /// Returns `false` if the future was already done.
    pub fn cancel(&self) -> bool {
        let owner = self.inner.owner.borrow().as_ref().and_then(Weak::upgrade);

        match owner {
            Some(task) => task.cancel(),
            None => self.cancel_now(),
        }
    }

    pub(crate) fn complete(&self, value: T) -> Result<(), Error> {
        self.ensure_pending()?;

        *self.inner.result.borrow_mut() = Some(value);
        self.inner.state.set(FutureState::Finished);
        self.schedule_callbacks();

        Ok(())
    }

    pub(crate) fn fail(&self, error: Error) -> Result<(), Error> {
        self.ensure_pending()?;

        *self.inner.error.borrow_mut() = Some(error);
        self.inner.state.set(FutureState::Finished);
        self.schedule_callbacks();
        self.inner.log_traceback.set(true);

        Ok(())
    }

    pub(crate) fn cancel_now(&self) -> bool {
        if self.inner.state.get() != FutureState::Pending {
            return false;
        }

        self.inner.state.set(FutureState::Cancelled);
        self.schedule_callbacks();

        true
    }

    /// Hands the completion of this future over to `task`.
    pub(crate) fn set_owner(&self, task: Weak<dyn Awaitable>) {
        *self.inner.owner.borrow_mut() = Some(task);
    }

    /// Registers `callback` to run once the future is done.
    ///
    /// If the future is already done, the callback is scheduled right away.
    /// Either way it runs on a later turn of the scheduler, with this future
    /// as its argument.
    pub fn add_done_callback(&self, callback: DoneCallback<T>) {
        if self.done() {
            self.dispatch(callback);
        } else {
            self.inner.callbacks.borrow_mut().push(callback);
        }
    }

    /// Removes every registered occurrence of `callback`.
    ///
    /// Returns how many were removed.
    pub fn remove_done_callback(&self, callback: &DoneCallback<T>) -> usize {
        let mut callbacks = self.inner.callbacks.borrow_mut();
        let before = callbacks.len();

        callbacks.retain(|registered| registered != callback);

        before - callbacks.len()
    }

    /// Returns the error the future finished with.
    ///
    /// `Ok(None)` means it finished with a value.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the future was cancelled.
    /// - [`Error::InvalidState`] if it is still pending.
    pub fn exception(&self) -> Result<Option<Error>, Error> {
        match self.inner.state.get() {
            FutureState::Cancelled => Err(Error::cancelled()),
            FutureState::Pending => Err(not_ready()),
            FutureState::Finished => {
                self.inner.log_traceback.set(false);
                Ok(self.inner.error.borrow().clone())
            }
        }
    }

    /// Marks the future as yielded by an awaiter.
    ///
    /// `.await` does this on its own. Hand-written [`Coroutine`]s set it
    /// before suspending on [`as_awaitable`](Self::as_awaitable), otherwise
    /// the task refuses to wait on the future.
    ///
    /// [`Coroutine`]: crate::task::Coroutine
    pub fn set_blocking(&self, blocking: bool) {
        self.inner.blocking.set(blocking);
    }

    /// Type-erased handle a task can suspend on.
    pub fn as_awaitable(&self) -> Rc<dyn Awaitable> {
        self.inner.clone()
    }

    fn ensure_unowned(&self, operation: &str) -> Result<(), Error> {
        if self.inner.owner.borrow().is_some() {
            return Err(Error::InvalidState(format!(
                "Task does not support {operation}() operation"
            )));
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), Error> {
        if self.inner.state.get() != FutureState::Pending {
            return Err(Error::InvalidState("invalid state".to_string()));
        }
        Ok(())
    }

    /// Moves every registered callback onto the scheduler.
    ///
    /// The list is taken before dispatching so callbacks registering or
    /// removing other callbacks cannot disturb the iteration.
    fn schedule_callbacks(&self) {
        let callbacks = mem::take(&mut *self.inner.callbacks.borrow_mut());

        for callback in callbacks {
            self.dispatch(callback);
        }
    }

    fn dispatch(&self, callback: DoneCallback<T>) {
        let future = self.clone();

        self.inner
            .scheduler
            .call_soon(Box::new(move || callback.call(&future)));
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Returns the value the future finished with.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the future was cancelled.
    /// - [`Error::InvalidState`] if it is still pending.
    /// - the stored error, if the future finished with one.
    pub fn result(&self) -> Result<T, Error> {
        self.inner.outcome()?;

        self.inner
            .result
            .borrow()
            .clone()
            .ok_or_else(|| Error::InvalidState("result already consumed".to_string()))
    }
}

impl<T> Future<T> {
    pub fn id(&self) -> FutureId {
        self.inner.id
    }

    pub fn state(&self) -> FutureState {
        self.inner.state.get()
    }

    /// Returns `true` once the future has a result, an error, or was
    /// cancelled.
    pub fn done(&self) -> bool {
        self.inner.state.get() != FutureState::Pending
    }

    pub fn cancelled(&self) -> bool {
        self.inner.state.get() == FutureState::Cancelled
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.blocking.get()
    }

    /// Returns the scheduler this future is bound to.
    pub fn get_loop(&self) -> &LoopRef {
        &self.inner.scheduler
    }

    /// Where the future was created, if its scheduler runs in debug mode.
    pub fn source_traceback(&self) -> Option<Rc<Backtrace>> {
        self.inner.source_traceback.clone()
    }

    /// Number of callbacks waiting for the future to complete.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }
}

impl<T> FutureInner<T> {
    /// Success or failure of the future, without its value.
    ///
    /// Retrieving a stored error clears the pending diagnostic.
    pub(crate) fn outcome(&self) -> Result<(), Error> {
        match self.state.get() {
            FutureState::Cancelled => Err(Error::cancelled()),
            FutureState::Pending => Err(not_ready()),
            FutureState::Finished => {
                self.log_traceback.set(false);

                match self.error.borrow().as_ref() {
                    Some(error) => Err(error.clone()),
                    None => Ok(()),
                }
            }
        }
    }

    /// Renders the future as `<Kind state ...>`, with `extra` appended.
    pub(crate) fn describe(&self, extra: Option<String>) -> String {
        let mut info = vec![self.state.get().to_string().to_lowercase()];

        match self.state.get() {
            FutureState::Pending => {
                let callbacks = self.callbacks.borrow().len();
                if callbacks > 0 {
                    info.push(format!("cb=[{callbacks}]"));
                }
            }
            FutureState::Finished => {
                if let Some(error) = self.error.borrow().as_ref() {
                    info.push(format!("exception={error}"));
                }
            }
            FutureState::Cancelled => {}
        }

        if let Some(extra) = extra {
            info.push(extra);
        }

        format!("<{} {}>", self.kind, info.join(" "))
    }
}

impl<T: 'static> Awaitable for FutureInner<T> {
    fn id(&self) -> FutureId {
        self.id
    }

    fn get_loop(&self) -> LoopRef {
        Rc::clone(&self.scheduler)
    }

    fn is_blocking(&self) -> bool {
        self.blocking.get()
    }

    fn clear_blocking(&self) {
        self.blocking.set(false);
    }

    fn add_done_callback(&self, wakeup: Wakeup) {
        if let Some(inner) = self.this.upgrade() {
            let future = Future { inner };
            future.add_done_callback(DoneCallback::once(move |done: &Future<T>| {
                wakeup(&*done.inner)
            }));
        }
    }

    fn cancel(&self) -> bool {
        match self.this.upgrade() {
            Some(inner) => Future { inner }.cancel(),
            None => false,
        }
    }

    fn outcome(&self) -> Result<(), Error> {
        FutureInner::outcome(self)
    }

    fn describe(&self) -> String {
        FutureInner::describe(self, None)
    }
}

impl<T> Drop for FutureInner<T> {
    /// Reports a stored error nobody retrieved.
    fn drop(&mut self) {
        if !self.log_traceback.get() {
            return;
        }
        self.log_traceback.set(false);

        let description = self.describe(None);
        let Some(error) = self.error.borrow_mut().take() else {
            return;
        };

        let context = ErrorContext::new(format!("{} exception was never retrieved", self.kind))
            .with_exception(error)
            .with_future(description)
            .with_source_traceback(self.source_traceback.clone());

        self.scheduler.call_exception_handler(context);
    }
}

impl<T> fmt::Display for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.describe(None))
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("blocking", &self.inner.blocking.get())
            .finish()
    }
}

fn not_ready() -> Error {
    Error::InvalidState("Result is not ready.".to_string())
}
