use crate::error::Error;
use crate::runtime::registry::TaskRegistry;

use std::backtrace::Backtrace;
use std::fmt;
use std::rc::Rc;

/// A unit of deferred work handed to a scheduler.
///
/// A callback returning an ordinary error is reported through the
/// scheduler's exception handler; a fatal error stops the scheduler.
pub type Callback = Box<dyn FnOnce() -> Result<(), Error>>;

/// Shared handle to the scheduler a future is bound to.
pub type LoopRef = Rc<dyn Scheduler>;

/// The single-threaded dispatch capability consumed by futures and tasks.
///
/// Implementations own one [`TaskRegistry`] per instance. All futures and
/// tasks bound to a scheduler are driven from the thread that owns it.
pub trait Scheduler {
    /// Queues `callback` to run on a later turn of the loop.
    ///
    /// Callbacks must never be invoked inline: completion callbacks rely on
    /// running outside the caller's stack.
    fn call_soon(&self, callback: Callback);

    /// Whether futures should capture a creation backtrace.
    fn get_debug(&self) -> bool;

    /// Reports an error nobody else will observe.
    fn call_exception_handler(&self, context: ErrorContext);

    /// Bookkeeping of the tasks bound to this scheduler.
    fn registry(&self) -> &TaskRegistry;
}

/// Returns `true` if both handles designate the same scheduler instance.
pub fn same_loop(a: &LoopRef, b: &LoopRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Diagnostic payload passed to [`Scheduler::call_exception_handler`].
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub exception: Option<Error>,
    /// Rendering of the future the report is about.
    pub future: Option<String>,
    /// Rendering of the task the report is about.
    pub task: Option<String>,
    /// Where the future was created, when the scheduler runs in debug mode.
    pub source_traceback: Option<Rc<Backtrace>>,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception: None,
            future: None,
            task: None,
            source_traceback: None,
        }
    }

    pub fn with_exception(mut self, error: Error) -> Self {
        self.exception = Some(error);
        self
    }

    pub fn with_future(mut self, future: impl Into<String>) -> Self {
        self.future = Some(future.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_source_traceback(mut self, traceback: Option<Rc<Backtrace>>) -> Self {
        self.source_traceback = traceback;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(future) = &self.future {
            write!(f, "\nfuture: {future}")?;
        }
        if let Some(task) = &self.task {
            write!(f, "\ntask: {task}")?;
        }
        if let Some(error) = &self.exception {
            write!(f, "\nexception: {error}")?;
        }
        if let Some(traceback) = &self.source_traceback {
            write!(f, "\nObject created at:\n{traceback}")?;
        }

        Ok(())
    }
}
