//! The admission core.
//!
//! [`Supervisor`] owns every piece of per-requester state and the render
//! [`Worker`]:
//!
//! - the [`LockRegistry`] of cool-down locks, released by timers only;
//! - the [`SettingsCache`] of each requester's last rendering parameters;
//! - the worker queue, filled by [`Supervisor::new_request`].
//!
//! Registry and cache share one [`parking_lot::Mutex`] so admission is a
//! single critical section that never suspends: a queue slot is reserved
//! first, then the lock and settings are written and the request enqueued.
//! A rejected request therefore leaves nothing behind.
//!
//! - [`cleanup`] - Log archival and work directory removal at shutdown.
//! - [`shutdown`] - OS signal handling.

pub mod cleanup;
pub mod shutdown;


use crate::server::{
    cache::SettingsCache,
    config::{AdmissionPolicy, SupervisorConfig},
    engine::Renderer,
    lock::{LockRegistry, RequestLock, WaitingSignal},
    pool::manager::Worker,
    request::{Request, ResultHandle},
    telemetry::{increment_duplicate_requests, increment_queue_rejections, increment_requests},
    transport::Transport,
};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use webshot_core::{Error, Printer, PrinterSnapshot, RequesterId, Result};

/// State guarded together during admission.
#[derive(Debug)]
struct AdmissionState {
    locks: LockRegistry,
    settings: SettingsCache,
}

/// Requests a graceful shutdown of a running [`Supervisor`].
#[derive(Clone, Debug)]
pub struct ShutdownHandle(CancellationToken);

impl ShutdownHandle {
    /// Makes [`Supervisor::start`] run the shutdown sequence and return.
    pub fn trigger(&self) {
        self.0.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_cancelled()
    }
}

pub struct Supervisor<R: Renderer, T: Transport> {
    config: SupervisorConfig,
    state: Mutex<AdmissionState>,
    worker: Worker,
    renderer: Arc<R>,
    transport: Arc<T>,
    next_request_id: AtomicU64,
    /// Lock release timers.
    timers: TaskTracker,
    timer_token: CancellationToken,
    /// Triggered from outside to make `start` return.
    shutdown: CancellationToken,
    /// Cancelled once `stop` has finished every step.
    stopped: CancellationToken,
    stopping: AtomicBool,
}

impl<R: Renderer, T: Transport> Supervisor<R, T> {
    pub fn new(config: SupervisorConfig, renderer: Arc<R>, transport: Arc<T>) -> Self {
        let state = AdmissionState {
            locks: LockRegistry::new(),
            settings: SettingsCache::new(config.settings_capacity),
        };
        let worker = Worker::new(config.queue_capacity, config.max_concurrent_renders);
        Self {
            config,
            state: Mutex::new(state),
            worker,
            renderer,
            transport,
            next_request_id: AtomicU64::new(1),
            timers: TaskTracker::new(),
            timer_token: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Admits a render request and returns immediately.
    ///
    /// With a `requester`, a fresh unset [`RequestLock`] replaces the
    /// requester's previous one, its settings are cached, and a timer is
    /// scheduled to release the lock after
    /// [`SupervisorConfig::release_after`]. Anonymous requests are only
    /// queued.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`Supervisor::stop`] has begun.
    /// - [`Error::DuplicateRequest`] under [`AdmissionPolicy::Reject`] when the
    ///   requester's lock is still unset.
    /// - [`Error::QueueFull`] when the worker queue has no free slot.
    pub fn new_request(
        &self,
        printer: Printer,
        requester: Option<RequesterId>,
    ) -> Result<(ResultHandle, WaitingSignal)> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }

        let mut state = self.state.lock();

        if let Some(id) = requester {
            if self.config.admission_policy == AdmissionPolicy::Reject && state.locks.is_locked(id)
            {
                tracing::debug!(requester = %id, "Rejecting duplicate request");
                increment_duplicate_requests();
                return Err(Error::DuplicateRequest { requester: id });
            }
        }

        let slot = self.worker.reserve().inspect_err(|e| {
            tracing::warn!(requester = ?requester, "Refusing request: {e}");
            increment_queue_rejections();
        })?;

        let lock = requester.map(|id| {
            let lock = RequestLock::new(self.config.release_after(&printer));
            let pruned = state.locks.prune_released();
            if pruned > 0 {
                tracing::trace!(pruned, "Pruned released locks");
            }
            if let Some(previous) = state.locks.insert(id, lock.clone()) {
                if !previous.is_released() {
                    tracing::debug!(requester = %id, "Overwriting live lock");
                    increment_duplicate_requests();
                }
            }
            if let Some((evicted, _)) = state.settings.put(id, printer.snapshot()) {
                tracing::trace!(requester = %evicted, "Evicted cached settings");
            }
            self.schedule_release(lock.clone());
            lock
        });

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let release_after = lock.as_ref().map(RequestLock::release_after);
        let (request, handle, waiting) = Request::new(id, printer, requester, lock);
        tracing::info!(
            request = id,
            requester = ?requester,
            link = request.printer().link(),
            ?release_after,
            "Admitted request"
        );
        slot.send(request);
        drop(state);

        increment_requests();
        Ok((handle, waiting))
    }

    /// Spawns the timer that releases `lock` at its deadline.
    fn schedule_release(&self, lock: RequestLock) {
        let token = self.timer_token.clone();
        self.timers.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(lock.deadline()) => lock.release(),
            }
        });
    }

    /// The requester's current lock, for duplicate detection.
    ///
    /// `None` means the requester was never seen, or its released lock has
    /// since been pruned; both mean "not busy".
    pub fn get_request(&self, requester: RequesterId) -> Option<RequestLock> {
        self.state.lock().locks.get(requester)
    }

    /// The requester's last rendering parameters. Counts as an access for
    /// eviction order.
    pub fn get_settings_cache(&self, requester: RequesterId) -> Option<PrinterSnapshot> {
        self.state.lock().settings.get(requester)
    }

    /// Starts the worker on the current runtime and serves until SIGINT,
    /// SIGTERM or [`ShutdownHandle::trigger`], then runs [`Supervisor::stop`].
    ///
    /// Also returns once a concurrent `stop` has finished.
    ///
    /// # Errors
    ///
    /// Whatever [`Worker::start`] returns: [`Error::AlreadyStarted`] on a
    /// second call while serving, [`Error::ServiceShutdown`] once stopped.
    pub async fn start(&self) -> Result<()> {
        self.worker
            .start(Arc::clone(&self.renderer), &Handle::current())?;
        tracing::info!(policy = ?self.config.admission_policy, "Supervisor started");

        tokio::select! {
            () = shutdown::signal() => self.stop().await,
            () = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested");
                self.stop().await;
            }
            () = self.stopped.cancelled() => {}
        }
        Ok(())
    }

    /// Graceful shutdown.
    ///
    /// 1. Closes the worker, letting in-flight renders finish.
    /// 2. Concurrently with 1, archives and removes the log file and removes
    ///    the work directory.
    /// 3. Disconnects the transport.
    /// 4. Cancels the remaining lock release timers.
    /// 5. Lets [`Supervisor::start`] return.
    ///
    /// Failures along the way are logged and never abort the sequence. A
    /// second call waits for the first to finish.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            self.stopped.cancelled().await;
            return;
        }
        tracing::info!("Stopping supervisor");

        tokio::join!(
            self.worker.close(),
            cleanup::run(&self.config, self.transport.as_ref()),
        );

        if let Err(e) = self.transport.disconnect().await {
            tracing::error!("Disconnecting transport: {e}");
        }
        tracing::info!("Transport disconnected");

        self.timer_token.cancel();
        self.timers.close();
        self.timers.wait().await;
        tracing::info!("Cancelled background tasks");

        self.stopped.cancel();
        tracing::info!("Supervisor stopped");
    }

    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Whether [`Supervisor::stop`] has begun.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Lock release timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Requests waiting in the worker queue.
    pub fn queued(&self) -> usize {
        self.worker.queued()
    }
}
