use crate::server::{
    engine::Renderer,
    request::{RenderOutcome, Request},
    telemetry::{
        decrement_renders_inflight, increment_render_errors, increment_renders_inflight,
        record_render_duration,
    },
};
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use webshot_core::{Error, RenderError};

/// Consumption loop of the [`Worker`](super::manager::Worker).
///
/// Waits for a free render permit, then for the next queued [`Request`], and
/// spawns its render on `tracker`. Holding the permit before dequeuing means a
/// request leaves the queue only when it can start immediately, which is when
/// its waiting signal is set.
///
/// Runs until `shutdown` is cancelled, then drains the queue.
pub async fn dispatch_loop<R: Renderer>(
    mut rx: mpsc::Receiver<Request>,
    renderer: Arc<R>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    tracing::trace!("Dispatch loop started");

    loop {
        let permit = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let request = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let renderer = Arc::clone(&renderer);
        tracker.spawn(async move {
            execute(request, renderer.as_ref()).await;
            drop(permit);
        });
    }

    drain_queue(rx).await;
    tracing::trace!("Dispatch loop stopped");
}

/// Closes the queue and fails every request still in it.
pub async fn drain_queue(mut rx: mpsc::Receiver<Request>) {
    rx.close();
    let mut drained = 0_usize;
    while let Some(request) = rx.recv().await {
        request.complete(Err(Error::ServiceShutdown));
        drained += 1;
    }
    if drained > 0 {
        tracing::warn!(drained, "Failed queued requests during shutdown");
    }
}

/// Runs a single request through `renderer` and writes its outcome.
///
/// Render failures and panics are captured into the result slot; they never
/// escape into the dispatch loop.
#[tracing::instrument(skip_all, fields(request = request.id(), link = request.printer().link()))]
pub async fn execute<R: Renderer>(request: Request, renderer: &R) {
    if let Err(e) = request.dispatch() {
        tracing::warn!("Dispatching request: {e}");
    }
    tracing::debug!("Rendering");

    increment_renders_inflight();
    let start = Instant::now();

    let result = AssertUnwindSafe(renderer.render(request.printer()))
        .catch_unwind()
        .await;

    let outcome: RenderOutcome = match result {
        Ok(Ok(artifact)) => {
            tracing::debug!(bytes = artifact.len(), "Render complete");
            Ok(artifact)
        }
        Ok(Err(e)) => {
            tracing::warn!("Render failed: {e}");
            increment_render_errors();
            Err(Error::Render(e))
        }
        Err(_) => {
            tracing::error!("Renderer panicked");
            increment_render_errors();
            Err(Error::Render(RenderError::Panicked))
        }
    };

    decrement_renders_inflight();
    record_render_duration(start.elapsed().as_millis() as f64);

    request.complete(outcome);
}
