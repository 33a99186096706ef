use super::FutureId;
use crate::error::Error;
use crate::runtime::LoopRef;

/// Continuation registered by a task on the awaitable it suspends on.
///
/// It receives the awaitable back once that one is done.
pub type Wakeup = Box<dyn FnOnce(&dyn Awaitable) -> Result<(), Error>>;

/// Anything a task can suspend on.
///
/// Conformance is explicit: a computation hands an `Rc<dyn Awaitable>`
/// back to its task, which checks the scheduler binding and the blocking
/// flag before registering its wakeup.
pub trait Awaitable {
    fn id(&self) -> FutureId;

    /// The scheduler this awaitable completes on.
    fn get_loop(&self) -> LoopRef;

    /// Whether an awaiter yielded this awaitable and is waiting for a task
    /// to pick it up.
    fn is_blocking(&self) -> bool;

    fn clear_blocking(&self);

    /// Arranges for `wakeup` to be scheduled once the awaitable is done.
    fn add_done_callback(&self, wakeup: Wakeup);

    /// Requests cancellation. Returns `false` if nothing was cancelled.
    fn cancel(&self) -> bool;

    /// `Ok(())` if the awaitable finished with a value, otherwise the
    /// error a waiting task must be resumed with.
    fn outcome(&self) -> Result<(), Error>;

    fn describe(&self) -> String;
}
