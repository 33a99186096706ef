use orbis::runtime::{Scheduler, same_loop};
use orbis::{Error, LocalLoop, LoopBuilder, get_running_loop, yield_now};

use std::cell::RefCell;
use std::rc::Rc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn block_on_returns_the_value() {
    init_logger();

    let event_loop = LocalLoop::new();
    let value = event_loop
        .block_on(async {
            yield_now().await?;
            Ok(6 * 7)
        })
        .unwrap();

    assert_eq!(value, 42);
    assert!(!event_loop.is_running());
}

#[test]
fn block_on_returns_the_error() {
    let event_loop = LocalLoop::new();

    let error = event_loop
        .block_on(async { Err::<(), _>(Error::msg("nope")) })
        .unwrap_err();

    assert_eq!(error.to_string(), "nope");
}

#[test]
fn run_once_only_runs_what_was_queued() {
    let event_loop = LocalLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let scheduler = event_loop.handle();
    let sink = log.clone();
    event_loop.call_soon(Box::new(move || -> Result<(), Error> {
        sink.borrow_mut().push("first");

        let sink = sink.clone();
        scheduler.call_soon(Box::new(move || -> Result<(), Error> {
            sink.borrow_mut().push("second");
            Ok(())
        }));
        Ok(())
    }));

    assert_eq!(event_loop.run_once().unwrap(), 1);
    assert_eq!(*log.borrow(), vec!["first"]);
    assert_eq!(event_loop.pending(), 1);

    assert_eq!(event_loop.run_until_idle().unwrap(), 1);
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn nested_run_is_rejected() {
    let event_loop = LocalLoop::new();

    let inner = event_loop.clone();
    let message = event_loop
        .block_on(async move { Ok(inner.run_once().unwrap_err().to_string()) })
        .unwrap();

    assert_eq!(message, "invalid state: This event loop is already running");
}

#[test]
fn loop_stops_when_nothing_can_complete_the_future() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let error = event_loop.run_until_complete(&future).unwrap_err();

    assert_eq!(
        error.to_string(),
        "invalid state: Event loop stopped before Future completed."
    );
}

#[test]
fn run_until_complete_accepts_plain_futures() {
    let event_loop = LocalLoop::new();
    let future = event_loop.create_future::<i32>();

    let producer = future.clone();
    event_loop.spawn(async move {
        yield_now().await?;
        producer.set_result(41)?;
        Ok(())
    });

    assert_eq!(event_loop.run_until_complete(&future).unwrap(), 41);
}

#[test]
fn closed_loop_drops_callbacks_and_refuses_to_run() {
    let event_loop = LocalLoop::new();
    let ran = Rc::new(RefCell::new(false));

    let sink = ran.clone();
    event_loop.call_soon(Box::new(move || -> Result<(), Error> {
        *sink.borrow_mut() = true;
        Ok(())
    }));

    event_loop.close().unwrap();
    assert!(event_loop.is_closed());
    assert_eq!(event_loop.pending(), 0);

    event_loop.call_soon(Box::new(|| -> Result<(), Error> { Ok(()) }));
    assert_eq!(event_loop.pending(), 0);

    assert!(event_loop.run_until_idle().unwrap_err().is_invalid_state());
    assert!(!*ran.borrow());

    event_loop.close().unwrap();
}

#[test]
fn running_loop_is_visible_inside_tasks_only() {
    let event_loop = LocalLoop::new();
    assert!(get_running_loop().is_err());
    assert!(orbis::spawn(async { Ok(()) }).is_err());

    let expected = event_loop.handle();
    let seen = event_loop
        .block_on(async move {
            let running = get_running_loop()?;
            Ok(same_loop(&running, &expected))
        })
        .unwrap();

    assert!(seen);
    assert!(get_running_loop().is_err());
}

#[test]
fn spawn_uses_the_running_loop() {
    let event_loop = LocalLoop::new();

    let value = event_loop
        .block_on(async {
            let first = orbis::spawn(async { Ok(20) })?;
            let second = orbis::spawn(async { Ok(22) })?;
            Ok(first.await? + second.await?)
        })
        .unwrap();

    assert_eq!(value, 42);
}

#[test]
fn builder_configures_debug_and_handler() {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = reports.clone();

    let event_loop = LoopBuilder::new()
        .debug(true)
        .exception_handler(move |context| {
            sink.borrow_mut().push(context.source_traceback.is_some())
        })
        .build();

    assert!(event_loop.get_debug());

    let future = event_loop.create_future::<()>();
    future.set_exception(Error::msg("unseen")).unwrap();
    drop(future);

    assert_eq!(*reports.borrow(), vec![true]);

    event_loop.set_debug(false);
    assert!(!event_loop.get_debug());
}

#[orbis::test]
async fn test_macro_runs_on_a_fresh_loop() {
    let running = get_running_loop()?;
    assert!(orbis::task::current_task(&running).is_some());

    let task = orbis::spawn(async { Ok("macro") })?;
    assert_eq!(task.await?, "macro");
}

#[orbis::test(debug)]
async fn test_macro_accepts_debug_option() -> Result<(), Error> {
    assert!(get_running_loop()?.get_debug());
    Ok(())
}
