use crate::error::Error;
use crate::runtime::context;
use crate::task::Suspension;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that hands control back to the scheduler exactly once.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = Result<(), Error>;

    /// Polls the yield future.
    ///
    /// On the first poll, the task is asked to schedule its next step on a
    /// later turn and `Poll::Pending` is returned.
    /// On the second poll, the future completes, unless the task resumed
    /// the computation with an error.
    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(error) = context::take_injected() {
            self.0 = true;
            return Poll::Ready(Err(error));
        }

        if !self.0 {
            self.0 = true;
            if let Err(error) = context::suspend(Suspension::Tick) {
                return Poll::Ready(Err(error));
            }
            return Poll::Pending;
        }

        Poll::Ready(Ok(()))
    }
}

/// Yields execution back to the scheduler.
///
/// This allows other tasks and callbacks to make progress before the
/// current task continues. The function yields exactly once. A task
/// cancelled meanwhile observes the cancellation here.
///
/// # Examples
///
/// ```rust,ignore
/// async fn task() -> Result<(), orbis::Error> {
///     // Allow other tasks to run
///     yield_now().await?;
///     Ok(())
/// }
/// ```
pub async fn yield_now() -> Result<(), Error> {
    YieldOnce(false).await
}
