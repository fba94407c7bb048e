use super::manager::Worker;
use crate::server::{
    lock::WaitingSignal,
    request::{Request, ResultHandle},
    test_utils::{Events, ScriptedRenderer},
};
use core::num::NonZeroUsize;
use std::sync::Arc;
use tokio::runtime::Handle;
use webshot_core::{Error, Printer, RenderError, RequestState};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn submit(worker: &Worker, id: u64, link: &str) -> (ResultHandle, WaitingSignal) {
    let (request, handle, waiting) = Request::new(id, Printer::new(link), None, None);
    worker.new_task(request).unwrap();
    (handle, waiting)
}

async fn wait_until_closed(worker: &Worker) {
    while !worker.is_closed() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn requests_are_rendered_in_fifo_order() {
    let events = Events::default();
    let renderer = ScriptedRenderer::new().with_events(events.clone());
    let worker = Worker::new(nz(8), nz(1));

    let handles: Vec<_> = ["a.example", "b.example", "c.example"]
        .iter()
        .enumerate()
        .map(|(i, link)| submit(&worker, i as u64, link).0)
        .collect();
    assert_eq!(worker.queued(), 3);

    worker.start(Arc::new(renderer), &Handle::current()).unwrap();
    for handle in &handles {
        assert!(handle.wait().await.is_ok());
        assert_eq!(handle.state(), RequestState::Completed);
    }

    assert_eq!(
        events.started(),
        vec![
            "https://a.example",
            "https://b.example",
            "https://c.example"
        ]
    );
    worker.close().await;
}

#[tokio::test]
async fn failures_and_panics_do_not_stop_the_loop() {
    let worker = Worker::new(nz(8), nz(1));
    let (failed, _) = submit(&worker, 1, "fail.example");
    let (panicked, _) = submit(&worker, 2, "panic.example");
    let (ok, _) = submit(&worker, 3, "ok.example");

    worker
        .start(Arc::new(ScriptedRenderer::new()), &Handle::current())
        .unwrap();

    assert!(matches!(
        failed.await,
        Err(Error::Render(RenderError::Failed { .. }))
    ));
    assert_eq!(panicked.await, Err(Error::Render(RenderError::Panicked)));
    let artifact = ok.await.unwrap();
    assert_eq!(&artifact.data[..], b"https://ok.example");

    worker.close().await;
}

#[tokio::test]
async fn waiting_signal_is_set_on_dequeue_only() {
    let (renderer, gate) = ScriptedRenderer::new().gated();
    let worker = Worker::new(nz(8), nz(1));
    let (first, first_waiting) = submit(&worker, 1, "one.example");
    let (second, second_waiting) = submit(&worker, 2, "two.example");
    assert!(!first_waiting.is_set());

    worker.start(Arc::new(renderer), &Handle::current()).unwrap();
    first_waiting.wait().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!second_waiting.is_set());
    assert_eq!(second.state(), RequestState::Queued);

    gate.cancel();
    assert!(first.await.is_ok());
    second_waiting.wait().await;
    assert!(second.await.is_ok());

    worker.close().await;
}

#[tokio::test]
async fn renders_fan_out_up_to_the_limit() {
    let (renderer, gate) = ScriptedRenderer::new().gated();
    let worker = Worker::new(nz(8), nz(2));
    let (a, a_waiting) = submit(&worker, 1, "a.example");
    let (b, b_waiting) = submit(&worker, 2, "b.example");
    let (c, c_waiting) = submit(&worker, 3, "c.example");

    worker.start(Arc::new(renderer), &Handle::current()).unwrap();
    a_waiting.wait().await;
    b_waiting.wait().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!c_waiting.is_set());

    gate.cancel();
    for handle in [a, b, c] {
        assert!(handle.await.is_ok());
    }
    worker.close().await;
}

#[tokio::test]
async fn close_finishes_in_flight_and_fails_the_queue() {
    let (renderer, gate) = ScriptedRenderer::new().gated();
    let worker = Arc::new(Worker::new(nz(8), nz(1)));
    let (running, running_waiting) = submit(&worker, 1, "running.example");
    let (queued_a, queued_a_waiting) = submit(&worker, 2, "a.example");
    let (queued_b, _) = submit(&worker, 3, "b.example");

    worker.start(Arc::new(renderer), &Handle::current()).unwrap();
    running_waiting.wait().await;

    let closing = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.close().await })
    };
    wait_until_closed(&worker).await;
    assert!(!running.is_ready());

    gate.cancel();
    closing.await.unwrap();

    assert!(running.try_result().unwrap().is_ok());
    assert_eq!(queued_a.try_result(), Some(Err(Error::ServiceShutdown)));
    assert_eq!(queued_b.try_result(), Some(Err(Error::ServiceShutdown)));
    assert_eq!(queued_a.state(), RequestState::Completed);
    assert!(!queued_a_waiting.is_set());
}

#[tokio::test]
async fn close_without_start_drains_the_queue() {
    let worker = Worker::new(nz(4), nz(1));
    let (handle, waiting) = submit(&worker, 1, "never.example");

    worker.close().await;
    worker.close().await;

    assert_eq!(handle.wait().await, Err(Error::ServiceShutdown));
    assert!(!waiting.is_set());
    assert_eq!(worker.queued(), 0);
}

#[tokio::test]
async fn lifecycle_errors() {
    let worker = Worker::new(nz(4), nz(1));
    let renderer = Arc::new(ScriptedRenderer::new());
    worker.start(Arc::clone(&renderer), &Handle::current()).unwrap();
    assert_eq!(
        worker.start(Arc::clone(&renderer), &Handle::current()),
        Err(Error::AlreadyStarted)
    );

    worker.close().await;
    assert_eq!(
        worker.start(renderer, &Handle::current()),
        Err(Error::ServiceShutdown)
    );
    let (request, handle, _) = Request::new(9, Printer::new("late.example"), None, None);
    assert_eq!(worker.new_task(request), Err(Error::ServiceShutdown));
    assert_eq!(handle.wait().await, Err(Error::ServiceShutdown));
}

#[tokio::test]
async fn full_queue_rejects_and_completes_the_request() {
    let worker = Worker::new(nz(1), nz(1));
    let _first = submit(&worker, 1, "first.example");

    let (request, handle, _) = Request::new(2, Printer::new("second.example"), None, None);
    let err = Error::QueueFull { capacity: 1 };
    assert_eq!(worker.new_task(request), Err(err.clone()));
    assert_eq!(handle.wait().await, Err(err));
    assert!(matches!(worker.reserve(), Err(Error::QueueFull { .. })));

    worker.close().await;
}
