use super::builder::LoopBuilder;
use super::context;
use super::registry::TaskRegistry;
use super::scheduler::{Callback, ErrorContext, LoopRef, Scheduler};
use crate::error::Error;
use crate::future::Future;
use crate::task::{Coroutine, Task};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

/// Handler receiving the errors nobody else observes.
pub type ExceptionHandler = Box<dyn Fn(&ErrorContext)>;

/// A single-threaded event loop dispatching callbacks in FIFO order.
///
/// `LocalLoop` is responsible for:
/// - running scheduled callbacks, each on its own turn of the queue,
/// - reporting callback errors through its exception handler,
/// - stopping on fatal errors and handing them back to the caller,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// The loop has no timers and no IO: it only runs until its queue is empty
/// or the awaited future is done.
///
/// Pending callbacks keep their tasks alive, and tasks keep their loop
/// alive. Call [`close`](Self::close) to release work that will never run.
pub struct LocalLoop {
    /// Callbacks waiting for their turn.
    ready: RefCell<VecDeque<Callback>>,

    running: Cell<bool>,
    closed: Cell<bool>,
    debug: Cell<bool>,

    exception_handler: Option<ExceptionHandler>,

    registry: TaskRegistry,
}

impl LocalLoop {
    /// Creates a loop with the default configuration.
    ///
    /// See [`LoopBuilder`] for the available options.
    pub fn new() -> Rc<Self> {
        LoopBuilder::new().build()
    }

    pub(crate) fn with_config(debug: bool, exception_handler: Option<ExceptionHandler>) -> Self {
        Self {
            ready: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
            closed: Cell::new(false),
            debug: Cell::new(debug),
            exception_handler,
            registry: TaskRegistry::new(),
        }
    }

    /// Returns this loop as a type-erased scheduler handle.
    pub fn handle(self: &Rc<Self>) -> LoopRef {
        self.clone()
    }

    /// Creates a pending future bound to this loop.
    pub fn create_future<T: 'static>(self: &Rc<Self>) -> Future<T> {
        Future::new(self.handle())
    }

    /// Spawns `future` as a task on this loop.
    ///
    /// The task's first step runs on the next turn of the loop.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let task = event_loop.spawn(async { Ok(42) });
    /// assert_eq!(event_loop.run_until_complete(&task)?, 42);
    /// ```
    pub fn spawn<F, T>(self: &Rc<Self>, future: F) -> Task<T>
    where
        F: std::future::Future<Output = Result<T, Error>> + 'static,
        T: 'static,
    {
        Task::spawn(self.handle(), future)
    }

    /// Spawns a task driving an arbitrary resumable computation.
    pub fn spawn_coroutine<C>(self: &Rc<Self>, coroutine: C) -> Task<C::Output>
    where
        C: Coroutine + 'static,
        C::Output: 'static,
    {
        Task::new(self.handle(), coroutine)
    }

    /// Runs one turn of the loop: every callback queued when the turn
    /// starts. Callbacks scheduled meanwhile wait for the next turn.
    ///
    /// Returns the number of callbacks run.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the loop is closed or already running.
    /// - the first fatal error returned by a callback.
    pub fn run_once(self: &Rc<Self>) -> Result<usize, Error> {
        self.run(|| self.turn())
    }

    /// Runs turns until no callback is left.
    ///
    /// Returns the number of callbacks run.
    ///
    /// # Errors
    ///
    /// Same as [`run_once`](Self::run_once).
    pub fn run_until_idle(self: &Rc<Self>) -> Result<usize, Error> {
        self.run(|| {
            let mut total = 0;
            while !self.ready.borrow().is_empty() {
                total += self.turn()?;
            }
            Ok(total)
        })
    }

    /// Runs the loop until `future` is done and returns its result.
    ///
    /// Tasks are accepted too, through `Deref`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the loop is closed or already running,
    ///   or if it runs out of callbacks before `future` is done.
    /// - the first fatal error returned by a callback.
    /// - the error `future` finished with.
    pub fn run_until_complete<T>(self: &Rc<Self>, future: &Future<T>) -> Result<T, Error>
    where
        T: Clone + 'static,
    {
        self.run(|| {
            while !future.done() {
                if self.ready.borrow().is_empty() {
                    return Err(Error::InvalidState(
                        "Event loop stopped before Future completed.".to_string(),
                    ));
                }
                self.turn()?;
            }
            Ok(())
        })?;

        future.result()
    }

    /// Runs `future` as a task to completion, blocking the current thread.
    ///
    /// This is the synchronous entry point of the loop (e.g. in `main` or
    /// tests).
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = LocalLoop::new().block_on(async {
    ///     Ok(42)
    /// });
    /// assert_eq!(result?, 42);
    /// ```
    pub fn block_on<F, T>(self: &Rc<Self>, future: F) -> Result<T, Error>
    where
        F: std::future::Future<Output = Result<T, Error>> + 'static,
        T: Clone + 'static,
    {
        let task = self.spawn(future);
        self.run_until_complete(&task)
    }

    /// Closes the loop, dropping every callback still queued.
    ///
    /// Tasks left pending are abandoned: their computations are dropped,
    /// which releases tasks waiting on futures only they could reach. Each
    /// of them is reported as destroyed while pending once its last handle
    /// goes away. Callbacks scheduled on a closed loop are dropped as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the loop is running.
    pub fn close(&self) -> Result<(), Error> {
        if self.running.get() {
            return Err(Error::InvalidState(
                "Cannot close a running event loop".to_string(),
            ));
        }
        if self.closed.replace(true) {
            return Ok(());
        }

        let pending = mem::take(&mut *self.ready.borrow_mut());
        log::debug!("closing loop, dropping {} pending callbacks", pending.len());

        // Dropping tasks may report to the exception handler.
        drop(pending);

        let tasks = self.registry.all_tasks();
        if !tasks.is_empty() {
            log::debug!("closing loop, abandoning {} pending tasks", tasks.len());
        }
        for task in &tasks {
            task.abandon();
        }
        drop(tasks);

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.set(enabled);
    }

    /// Number of callbacks waiting for their turn.
    pub fn pending(&self) -> usize {
        self.ready.borrow().len()
    }

    /// Marks the loop running and installs it as the running loop of this
    /// thread for the duration of `f`.
    fn run<R>(self: &Rc<Self>, f: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
        if self.closed.get() {
            return Err(Error::InvalidState("Event loop is closed".to_string()));
        }
        if self.running.replace(true) {
            return Err(Error::InvalidState(
                "This event loop is already running".to_string(),
            ));
        }

        log::debug!("loop running");
        let out = context::enter_loop(self.handle(), f);
        self.running.set(false);

        if let Err(error) = &out {
            log::debug!("loop stopped: {error}");
        }
        out
    }

    fn turn(&self) -> Result<usize, Error> {
        let ntodo = self.ready.borrow().len();

        for n in 0..ntodo {
            let Some(callback) = self.ready.borrow_mut().pop_front() else {
                return Ok(n);
            };

            match callback() {
                Ok(()) => {}
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => self.call_exception_handler(
                    ErrorContext::new("Exception in callback").with_exception(error),
                ),
            }
        }

        Ok(ntodo)
    }
}

impl Scheduler for LocalLoop {
    fn call_soon(&self, callback: Callback) {
        if self.closed.get() {
            log::debug!("callback scheduled on a closed loop was dropped");
            return;
        }
        self.ready.borrow_mut().push_back(callback);
    }

    fn get_debug(&self) -> bool {
        self.debug.get()
    }

    fn call_exception_handler(&self, context: ErrorContext) {
        match &self.exception_handler {
            Some(handler) => handler(&context),
            None => log::error!("{context}"),
        }
    }

    fn registry(&self) -> &TaskRegistry {
        &self.registry
    }
}
