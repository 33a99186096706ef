//! Error taxonomy shared by futures, tasks and schedulers.
//!
//! Errors are cheap to clone: a finished future re-raises the same stored
//! error every time its result is requested, so user-provided errors are
//! kept behind an `Rc`.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// The error type of every fallible operation in this crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The operation is not valid for the current state of the future.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Terminal outcome of a cancelled future, and the error injected into a
    /// task's computation to unwind it.
    #[error("{}", cancelled_message(.0))]
    Cancelled(Option<String>),

    /// A computation broke the suspension protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// An ordinary, recoverable error raised by user code.
    #[error("{0}")]
    Failed(Rc<dyn StdError + 'static>),

    /// An error outside the ordinary taxonomy. Tasks store it like any other
    /// error but also re-raise it to their scheduler.
    #[error("fatal: {0}")]
    Fatal(Rc<dyn StdError + 'static>),
}

/// Ways a resumable computation can misuse the suspension protocol.
///
/// These are the runtime-error kind: they end up stored on the offending
/// task rather than aborting the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("Task cannot await on itself: {task}")]
    SelfAwait { task: String },

    #[error("Task {task} got Future {future} attached to a different loop")]
    DifferentLoop { task: String, future: String },

    #[error("awaitable was yielded without being awaited in task {task} with {future}")]
    NotBlocking { task: String, future: String },

    #[error("Task got bad yield: {0}")]
    BadYield(String),

    #[error("await wasn't used with future")]
    DoubleAwait,

    #[error("more than one awaitable was yielded in a single step")]
    MultipleYields,

    #[error("future awaited outside of a task step")]
    NoTask,

    #[error("Cannot enter into task {task} while another task {current} is being executed")]
    ReentrantStep { task: String, current: String },
}

/// Plain message error used by [`Error::msg`] and [`Error::fatal_msg`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

fn cancelled_message(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!("cancelled: {msg}"),
        None => "cancelled".to_string(),
    }
}

impl Error {
    /// Wraps an ordinary user error.
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Error::Failed(Rc::new(error))
    }

    /// Builds an ordinary error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::failed(Message(message.to_string()))
    }

    /// Wraps an error that must never be swallowed by a task.
    pub fn fatal<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Error::Fatal(Rc::new(error))
    }

    pub fn fatal_msg(message: impl fmt::Display) -> Self {
        Error::fatal(Message(message.to_string()))
    }

    pub fn cancelled() -> Self {
        Error::Cancelled(None)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }

    /// Returns the protocol violation carried by this error, if any.
    pub fn protocol(&self) -> Option<&ProtocolViolation> {
        match self {
            Error::Protocol(violation) => Some(violation),
            _ => None,
        }
    }
}
