use super::{Awaitable, Future};
use crate::error::{Error, ProtocolViolation};
use crate::runtime::context;
use crate::task::Suspension;

use std::future::IntoFuture;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Single-use bridge suspending a computation on a [`Future`].
///
/// The first poll on a pending future marks it as blocking and hands it
/// back to the task driving the computation. Once the future is done, the
/// awaiter resolves with its result and releases it. An error injected by
/// the task takes precedence over everything else.
pub struct Awaiter<T> {
    /// Released as soon as the awaiter resolves.
    future: Option<Future<T>>,

    /// What the task suspends on: the future itself, or the task owning it.
    awaitable: Rc<dyn Awaitable>,
}

impl<T> Awaiter<T> {
    pub(crate) fn new(future: Future<T>, awaitable: Rc<dyn Awaitable>) -> Self {
        Self {
            future: Some(future),
            awaitable,
        }
    }
}

impl<T: Clone + 'static> std::future::Future for Awaiter<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(error) = context::take_injected() {
            self.future = None;
            return Poll::Ready(Err(error));
        }

        let Some(future) = self.future.clone() else {
            return Poll::Ready(Err(Error::InvalidState(
                "awaiter already resolved".to_string(),
            )));
        };

        if !future.done() {
            if future.is_blocking() {
                return Poll::Ready(Err(ProtocolViolation::DoubleAwait.into()));
            }

            future.set_blocking(true);

            if let Err(error) = context::suspend(Suspension::Await(Rc::clone(&self.awaitable))) {
                future.set_blocking(false);
                return Poll::Ready(Err(error));
            }

            return Poll::Pending;
        }

        self.future = None;
        Poll::Ready(future.result())
    }
}

impl<T: Clone + 'static> IntoFuture for Future<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Awaiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        let awaitable: Rc<dyn Awaitable> = self.inner.clone();
        Awaiter::new(self, awaitable)
    }
}

impl<T: Clone + 'static> IntoFuture for &Future<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Awaiter<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.clone().into_future()
    }
}
