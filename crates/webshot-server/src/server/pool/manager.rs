//! Queue and lifecycle of the render worker.
//!
//! This module defines [`Worker`], the single consumer that takes admitted
//! [`Request`]s off a bounded queue and runs them through a [`Renderer`]. Up
//! to `max_concurrent` renders run at once; the rest wait in FIFO order.
//!
//! Shutdown is coordinated through a [`CancellationToken`]: once cancelled the
//! worker refuses new requests, lets in-flight renders finish and fails any
//! request still sitting in the queue with [`Error::ServiceShutdown`], so
//! every admitted request is completed exactly once.

use super::worker::{dispatch_loop, drain_queue};
use crate::server::{engine::Renderer, request::Request};
use core::num::NonZeroUsize;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::{
        Semaphore,
        mpsc::{self, error::TrySendError},
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use webshot_core::{Error, Result};

pub struct Worker {
    tx: mpsc::Sender<Request>,
    rx: Mutex<Option<mpsc::Receiver<Request>>>,
    capacity: usize,
    max_concurrent: usize,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
}

/// A reserved slot in the worker queue.
///
/// Reserving first lets the supervisor refuse a request before it has written
/// any per-requester state, and then enqueue without a suspension point.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Request>,
}

impl QueueSlot<'_> {
    /// Moves `request` into the queue. Never blocks.
    pub fn send(self, request: Request) {
        if let Err(e) = request.mark_queued() {
            tracing::warn!(request = request.id(), "Enqueueing request: {e}");
        }
        self.permit.send(request);
    }
}

impl Worker {
    /// Creates a worker with a queue of `capacity` requests that runs at most
    /// `max_concurrent` renders at a time. Nothing is consumed until
    /// [`Worker::start`].
    pub fn new(capacity: NonZeroUsize, max_concurrent: NonZeroUsize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.get());
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            capacity: capacity.get(),
            max_concurrent: max_concurrent.get(),
            shutdown_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Starts consuming the queue on `runtime`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if the worker was started before.
    /// - [`Error::ServiceShutdown`] if the worker was already closed.
    pub fn start<R: Renderer>(&self, renderer: Arc<R>, runtime: &Handle) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        let rx = self.rx.lock().take().ok_or(Error::AlreadyStarted)?;

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        self.tracker.spawn_on(
            dispatch_loop(
                rx,
                renderer,
                permits,
                self.shutdown_token.clone(),
                self.tracker.clone(),
            ),
            runtime,
        );

        tracing::debug!(
            capacity = self.capacity,
            max_concurrent = self.max_concurrent,
            "Worker started"
        );
        Ok(())
    }

    /// Reserves a queue slot without blocking.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`Worker::close`] has been called.
    /// - [`Error::QueueFull`] when every slot is taken.
    pub fn reserve(&self) -> Result<QueueSlot<'_>> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        match self.tx.try_reserve() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(TrySendError::Full(())) => Err(Error::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(())) => Err(Error::ServiceShutdown),
        }
    }

    /// Enqueues `request`. Never blocks.
    ///
    /// # Errors
    ///
    /// See [`Worker::reserve`]. On error the request is completed with that
    /// error before it is dropped, so its handles still resolve.
    pub fn new_task(&self, request: Request) -> Result<()> {
        match self.reserve() {
            Ok(slot) => {
                slot.send(request);
                Ok(())
            }
            Err(e) => {
                request.complete(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Requests currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stops accepting work and waits for in-flight renders.
    ///
    /// Requests still queued are completed with [`Error::ServiceShutdown`].
    /// Safe to call when nothing is in flight, when the worker never started,
    /// and more than once.
    pub async fn close(&self) {
        tracing::info!(
            queued = self.queued(),
            "Closing worker, refusing new requests"
        );
        self.shutdown_token.cancel();

        // Never started: nobody else will drain the queue.
        let idle = self.rx.lock().take();
        if let Some(rx) = idle {
            drain_queue(rx).await;
        }

        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Worker shutdown complete");
    }
}
