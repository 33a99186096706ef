use crate::error::{Error, ProtocolViolation};
use crate::runtime::scheduler::LoopRef;
use crate::task::Suspension;

use std::cell::RefCell;

/// State shared between a task step and the awaitables its computation
/// polls during that step.
struct StepContext {
    /// Error injected by the task, waiting to be observed by the
    /// suspension point the computation resumes at.
    injected: Option<Error>,

    /// What the computation handed back when it suspended.
    yielded: Option<Suspension>,
}

thread_local! {
    /// Thread-local handle to the loop currently running on this thread.
    ///
    /// Set while a loop dispatches callbacks so that code inside a task can
    /// reach its scheduler without explicit parameter passing.
    static RUNNING_LOOP: RefCell<Option<LoopRef>> = const { RefCell::new(None) };

    /// Thread-local state of the step currently resuming a computation.
    static CURRENT_STEP: RefCell<Option<StepContext>> = const { RefCell::new(None) };
}

/// Runs `f` with `scheduler` installed as the running loop of this thread.
///
/// The previous value is restored after `f` returns.
pub(crate) fn enter_loop<R>(scheduler: LoopRef, f: impl FnOnce() -> R) -> R {
    RUNNING_LOOP.with(|slot| {
        let previous = slot.replace(Some(scheduler));

        let out = f();

        slot.replace(previous);
        out
    })
}

/// Returns the loop running on the current thread, if any.
pub(crate) fn running_loop() -> Option<LoopRef> {
    RUNNING_LOOP.with(|slot| slot.borrow().clone())
}

/// Outcome of [`enter_step`] besides the closure's own return value.
pub(crate) struct StepExit {
    pub(crate) yielded: Option<Suspension>,
    pub(crate) unconsumed: Option<Error>,
}

/// Resumes a computation inside a fresh step context.
///
/// `injected` is made available to the suspension point the computation
/// resumes at. Whatever the computation yields, and any injected error it
/// never observed, are returned alongside the result of `f`.
pub(crate) fn enter_step<R>(injected: Option<Error>, f: impl FnOnce() -> R) -> (R, StepExit) {
    CURRENT_STEP.with(|slot| {
        let previous = slot.replace(Some(StepContext {
            injected,
            yielded: None,
        }));

        let out = f();

        let exit = match slot.replace(previous) {
            Some(ctx) => StepExit {
                yielded: ctx.yielded,
                unconsumed: ctx.injected,
            },
            None => StepExit {
                yielded: None,
                unconsumed: None,
            },
        };

        (out, exit)
    })
}

/// Takes the error injected into the current step, if any.
pub(crate) fn take_injected() -> Option<Error> {
    CURRENT_STEP.with(|slot| {
        slot.borrow_mut()
            .as_mut()
            .and_then(|ctx| ctx.injected.take())
    })
}

/// Hands `suspension` back to the task driving the current step.
///
/// Fails when no step is active, or when the computation already
/// suspended on something else during this step.
pub(crate) fn suspend(suspension: Suspension) -> Result<(), Error> {
    CURRENT_STEP.with(|slot| {
        let mut slot = slot.borrow_mut();

        let Some(ctx) = slot.as_mut() else {
            return Err(ProtocolViolation::NoTask.into());
        };

        if ctx.yielded.is_some() {
            return Err(ProtocolViolation::MultipleYields.into());
        }

        ctx.yielded = Some(suspension);
        Ok(())
    })
}
