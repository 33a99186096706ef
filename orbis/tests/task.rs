use orbis::runtime::ErrorContext;
use orbis::task::{Coroutine, Resumption, Suspension, TaskState};
use orbis::{Error, Future, LocalLoop, LoopBuilder, ProtocolViolation, Task, yield_now};

use std::cell::RefCell;
use std::future::{Future as _, IntoFuture};
use std::pin::pin;
use std::rc::Rc;

/// Hand-written computation adding one to the value of a future.
struct AddOne {
    future: Future<i32>,
    mark_blocking: bool,
}

impl Coroutine for AddOne {
    type Output = i32;

    fn resume(&mut self) -> Resumption<i32> {
        if self.future.done() {
            return match self.future.result() {
                Ok(value) => Resumption::Completed(value + 1),
                Err(error) => Resumption::Failed(error),
            };
        }

        if self.mark_blocking {
            self.future.set_blocking(true);
        }
        Resumption::Suspended(Suspension::Await(self.future.as_awaitable()))
    }

    fn resume_with_error(&mut self, error: Error) -> Resumption<i32> {
        Resumption::Failed(error)
    }
}

#[test]
fn task_resumes_with_value_of_awaited_future() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let awaited = future.clone();
    let task = event_loop.spawn(async move { Ok(awaited.await? + 1) });

    event_loop.run_once().unwrap();

    assert_eq!(task.task_state(), TaskState::Suspended);
    assert_eq!(future.pending_callbacks(), 1);
    assert!(!future.is_blocking(), "the task consumed the blocking flag");

    future.set_result(41).unwrap();

    assert_eq!(event_loop.run_until_complete(&task).unwrap(), 42);
    assert_eq!(task.task_state(), TaskState::Finished);
}

#[test]
fn task_failure_is_stored_as_its_exception() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let awaited = future.clone();
    let task = event_loop.spawn(async move { Ok(awaited.await? + 1) });

    event_loop.run_once().unwrap();
    future.set_exception(Error::msg("upstream failed")).unwrap();

    let error = event_loop.run_until_complete(&task).unwrap_err();
    assert_eq!(error.to_string(), "upstream failed");
    assert_eq!(task.task_state(), TaskState::Finished);
}

#[orbis::test]
async fn task_awaits_another_task() -> Result<(), Error> {
    let inner = orbis::spawn(async {
        yield_now().await?;
        Ok(20)
    })?;

    let value = inner.await?;
    assert_eq!(value * 2 + 2, 42);

    Ok(())
}

#[orbis::test]
async fn awaiting_a_finished_task_returns_immediately() {
    let task = orbis::spawn(async { Ok("done") })?;

    yield_now().await?;
    yield_now().await?;
    assert!(task.done());

    assert_eq!((&task).await?, "done");
    assert_eq!(task.await?, "done");
}

#[test]
fn task_awaiting_itself_fails() {
    let event_loop = LocalLoop::new();
    let slot: Rc<RefCell<Option<Task<i32>>>> = Rc::new(RefCell::new(None));

    let me = slot.clone();
    let task = event_loop.spawn(async move {
        let this = me.borrow().clone();
        match this {
            Some(this) => this.await,
            None => Ok(0),
        }
    });
    *slot.borrow_mut() = Some(task.clone());

    let error = event_loop.run_until_complete(&task).unwrap_err();

    assert!(matches!(
        error.protocol(),
        Some(ProtocolViolation::SelfAwait { .. })
    ));
    slot.borrow_mut().take();
}

#[test]
fn awaiting_a_future_of_another_loop_fails() {
    let home = LocalLoop::new();
    let elsewhere = LocalLoop::new();
    let foreign = elsewhere.create_future::<i32>();

    let awaited = foreign.clone();
    let task = home.spawn(async move { awaited.await });

    let error = home.run_until_complete(&task).unwrap_err();

    assert!(matches!(
        error.protocol(),
        Some(ProtocolViolation::DifferentLoop { .. })
    ));
    assert_eq!(foreign.pending_callbacks(), 0, "no wakeup was registered");
}

#[test]
fn foreign_pending_future_is_a_bad_yield() {
    let event_loop = LocalLoop::new();

    let task = event_loop.spawn(async {
        std::future::pending::<()>().await;
        Ok(1)
    });

    let error = event_loop.run_until_complete(&task).unwrap_err();

    assert!(matches!(
        error.protocol(),
        Some(ProtocolViolation::BadYield(_))
    ));
}

#[test]
fn custom_coroutine_is_driven_to_completion() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let task = event_loop.spawn_coroutine(AddOne {
        future: future.clone(),
        mark_blocking: true,
    });

    event_loop.run_once().unwrap();
    assert_eq!(task.task_state(), TaskState::Suspended);

    future.set_result(41).unwrap();
    assert_eq!(event_loop.run_until_complete(&task).unwrap(), 42);
}

#[test]
fn awaitable_yielded_without_awaiting_is_rejected() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let task = event_loop.spawn_coroutine(AddOne {
        future: future.clone(),
        mark_blocking: false,
    });

    let error = event_loop.run_until_complete(&task).unwrap_err();

    assert!(matches!(
        error.protocol(),
        Some(ProtocolViolation::NotBlocking { .. })
    ));
    assert_eq!(future.pending_callbacks(), 0);
}

#[test]
fn awaiting_a_blocking_future_is_a_double_await() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let awaited = future.clone();
    let task = event_loop.spawn(async move {
        awaited.set_blocking(true);
        awaited.await
    });

    let error = event_loop.run_until_complete(&task).unwrap_err();
    assert_eq!(error.protocol(), Some(&ProtocolViolation::DoubleAwait));
}

#[test]
fn yielding_twice_in_one_step_is_rejected() {
    let event_loop = LocalLoop::new();
    let first = event_loop.create_future::<i32>();
    let second = event_loop.create_future::<i32>();

    let (a, b) = (first.clone(), second.clone());
    let task = event_loop.spawn(async move {
        let mut a = pin!(a.into_future());
        let mut b = pin!(b.into_future());

        let outcome = std::future::poll_fn(|cx| {
            let _ = a.as_mut().poll(cx);
            b.as_mut().poll(cx)
        })
        .await;

        Ok(matches!(
            outcome.map_err(|e| e.protocol().cloned()),
            Err(Some(ProtocolViolation::MultipleYields))
        ))
    });

    assert!(event_loop.run_until_complete(&task).unwrap());
    assert!(!second.is_blocking());
}

#[test]
fn awaiting_outside_a_task_fails() {
    use std::task::{Context, Poll, Waker};

    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let mut awaiter = pin!(future.clone().into_future());
    let poll = awaiter.as_mut().poll(&mut Context::from_waker(Waker::noop()));

    assert!(matches!(
        poll,
        Poll::Ready(Err(Error::Protocol(ProtocolViolation::NoTask)))
    ));
    assert!(!future.is_blocking());
}

#[test]
fn fatal_error_is_stored_and_stops_the_loop() {
    let event_loop = LocalLoop::new();

    let task = event_loop.spawn(async { Err::<(), _>(Error::fatal_msg("disk on fire")) });

    let error = event_loop.run_until_complete(&task).unwrap_err();
    assert!(error.is_fatal());

    let stored = task.exception().unwrap().unwrap();
    assert!(stored.is_fatal());
}

#[test]
fn unretrieved_task_error_is_reported() {
    let reports: Rc<RefCell<Vec<ErrorContext>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = reports.clone();
    let event_loop = LoopBuilder::new()
        .exception_handler(move |context| sink.borrow_mut().push(context.clone()))
        .build();

    let task = event_loop.spawn(async { Err::<(), _>(Error::msg("lost")) });
    event_loop.run_until_idle().unwrap();
    drop(task);

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].message, "Task exception was never retrieved");
}

#[test]
fn pending_task_destroyed_is_reported() {
    let messages = Rc::new(RefCell::new(Vec::new()));
    let sink = messages.clone();
    let event_loop = LoopBuilder::new()
        .exception_handler(move |context| sink.borrow_mut().push(context.message.clone()))
        .build();

    let task = event_loop.spawn(async { Ok(()) });
    drop(task);

    let silent = event_loop.spawn(async { Ok(()) });
    silent.set_log_destroy_pending(false);
    drop(silent);

    // Dropping the queued first steps drops the tasks with them.
    event_loop.close().unwrap();

    assert_eq!(*messages.borrow(), vec!["Task was destroyed but it is pending!"]);
}

#[test]
fn display_names_the_awaited_future() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let awaited = future.clone();
    let task = event_loop.spawn(async move { awaited.await });
    let id = task.id();

    assert_eq!(task.to_string(), format!("<Task pending id={id}>"));

    event_loop.run_once().unwrap();
    assert_eq!(
        task.to_string(),
        format!("<Task pending id={id} wait_for=#{}>", future.id())
    );

    future.set_result(1).unwrap();
    event_loop.run_until_complete(&task).unwrap();
    assert_eq!(task.to_string(), format!("<Task finished id={id}>"));
}

#[test]
fn task_future_cannot_be_completed_from_outside() {
    let event_loop = LocalLoop::new();
    let task = event_loop.spawn(async { Ok(6 * 7) });

    let error = task.set_result(7).unwrap_err();
    assert!(error.is_invalid_state());
    assert_eq!(
        error.to_string(),
        "invalid state: Task does not support set_result() operation"
    );
    assert!(
        task.as_future()
            .set_exception(Error::msg("outside"))
            .unwrap_err()
            .is_invalid_state()
    );
    assert!(!task.done());

    // The queued first step still runs on a pending task.
    event_loop.run_until_idle().unwrap();
    assert_eq!(task.result().unwrap(), 42);
}

#[test]
fn step_after_rejected_completions_is_not_fatal() {
    let messages = Rc::new(RefCell::new(Vec::new()));
    let sink = messages.clone();
    let event_loop = LoopBuilder::new()
        .exception_handler(move |context| sink.borrow_mut().push(context.message.clone()))
        .build();

    let task = event_loop.spawn(async { Ok(1) });

    assert!(task.set_result(2).is_err());
    assert!(task.set_exception(Error::msg("outside")).is_err());
    assert!(task.as_future().cancel());
    assert!(task.must_cancel());
    assert!(!task.done());

    event_loop.run_until_idle().unwrap();

    assert!(task.cancelled());
    assert!(messages.borrow().is_empty());
}

#[test]
fn waiter_is_the_awaited_future_while_suspended() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let awaited = future.clone();
    let task = event_loop.spawn(async move { awaited.await });
    assert!(task.waiter().is_none());

    event_loop.run_once().unwrap();
    assert_eq!(task.waiter().map(|waiter| waiter.id()), Some(future.id()));

    future.set_result(1).unwrap();
    event_loop.run_until_complete(&task).unwrap();
    assert!(task.waiter().is_none());
}

#[test]
fn custom_coroutine_awaits_a_task_through_its_awaitable() {
    struct Outer {
        inner: Task<i32>,
    }

    impl Coroutine for Outer {
        type Output = i32;

        fn resume(&mut self) -> Resumption<i32> {
            if self.inner.done() {
                return match self.inner.result() {
                    Ok(value) => Resumption::Completed(value * 2),
                    Err(error) => Resumption::Failed(error),
                };
            }

            self.inner.set_blocking(true);
            Resumption::Suspended(Suspension::Await(self.inner.as_awaitable()))
        }

        fn resume_with_error(&mut self, error: Error) -> Resumption<i32> {
            Resumption::Failed(error)
        }
    }

    let event_loop = LocalLoop::new();
    let inner = event_loop.spawn(async {
        yield_now().await?;
        Ok(21)
    });
    assert_eq!(inner.as_awaitable().id(), inner.id());

    let outer = event_loop.spawn_coroutine(Outer {
        inner: inner.clone(),
    });

    assert_eq!(event_loop.run_until_complete(&outer).unwrap(), 42);
}
