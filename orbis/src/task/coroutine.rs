use crate::error::Error;
use crate::future::Awaitable;
use crate::runtime::context;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// What a resumable computation hands back when it stops running.
pub enum Resumption<T> {
    /// The computation returned a value.
    Completed(T),

    /// The computation ended with an error.
    Failed(Error),

    /// The computation is waiting on something.
    Suspended(Suspension),
}

/// What a suspended computation is waiting on.
pub enum Suspension {
    /// Resume once the awaitable is done.
    Await(Rc<dyn Awaitable>),

    /// Resume on the next turn of the scheduler.
    Tick,

    /// Anything the task does not know how to wait on.
    Other(String),
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspension::Await(awaitable) => write!(f, "Await({})", awaitable.describe()),
            Suspension::Tick => f.write_str("Tick"),
            Suspension::Other(what) => write!(f, "Other({what})"),
        }
    }
}

/// A computation a task drives to completion.
///
/// Each call runs the computation until it completes, fails, or suspends.
/// After `Completed` or `Failed` the task never resumes it again.
pub trait Coroutine {
    type Output;

    /// Continues the computation from where it suspended.
    fn resume(&mut self) -> Resumption<Self::Output>;

    /// Continues the computation by raising `error` at its suspension
    /// point. The computation may handle it and carry on.
    fn resume_with_error(&mut self, error: Error) -> Resumption<Self::Output>;
}

/// Drives an `async` block as a [`Coroutine`].
///
/// The block is polled with a no-op waker: it only makes progress when its
/// task resumes it, and it may only suspend on this crate's awaitables
/// (futures, tasks and [`yield_now`](crate::yield_now)). Anything else
/// returning `Pending` is reported to the task as a bad yield.
pub struct AsyncCoroutine<F> {
    future: Option<Pin<Box<F>>>,
    started: bool,
}

impl<F, T> AsyncCoroutine<F>
where
    F: Future<Output = Result<T, Error>>,
{
    pub fn new(future: F) -> Self {
        Self {
            future: Some(Box::pin(future)),
            started: false,
        }
    }

    fn drive(&mut self, injected: Option<Error>) -> Resumption<T> {
        let Some(future) = self.future.as_mut() else {
            return Resumption::Failed(Error::InvalidState(
                "coroutine already finished".to_string(),
            ));
        };

        self.started = true;

        let mut cx = Context::from_waker(Waker::noop());
        let (poll, exit) = context::enter_step(injected, || future.as_mut().poll(&mut cx));

        // The computation resumed somewhere that does not observe injected
        // errors: the error unwinds it.
        if let Some(error) = exit.unconsumed {
            log::warn!("injected error was not observed by the computation: {error}");
            self.future = None;
            return Resumption::Failed(error);
        }

        match poll {
            Poll::Ready(Ok(value)) => {
                self.future = None;
                Resumption::Completed(value)
            }
            Poll::Ready(Err(error)) => {
                self.future = None;
                Resumption::Failed(error)
            }
            Poll::Pending => Resumption::Suspended(exit.yielded.unwrap_or_else(|| {
                Suspension::Other("Pending returned without yielding an awaitable".to_string())
            })),
        }
    }
}

impl<F, T> Coroutine for AsyncCoroutine<F>
where
    F: Future<Output = Result<T, Error>>,
{
    type Output = T;

    fn resume(&mut self) -> Resumption<T> {
        self.drive(None)
    }

    fn resume_with_error(&mut self, error: Error) -> Resumption<T> {
        // Not started yet: there is no suspension point to raise at.
        if !self.started {
            self.future = None;
            return Resumption::Failed(error);
        }

        self.drive(Some(error))
    }
}
