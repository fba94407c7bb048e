//! The unit of work handed to the worker.
//!
//! A [`Request`] bundles the rendering parameters with three pieces of shared
//! state, each observable by the caller through handles returned at admission:
//!
//! - a result slot, written exactly once ([`ResultHandle`] reads it);
//! - a [`WaitingSignal`], set when the worker starts processing;
//! - its lifecycle [`RequestState`].
//!
//! Writing the result consumes the `Request`, so a second write cannot be
//! expressed. Dropping a `Request` without completing it resolves every
//! handle with [`Error::Abandoned`].

use crate::server::lock::{RequestLock, WaitingSignal};
use futures::future::BoxFuture;
use portable_atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use webshot_core::{Artifact, Error, Printer, RequestState, RequesterId, Result};

/// Outcome stored in a request's result slot.
pub type RenderOutcome = Result<Artifact>;

#[derive(Clone, Debug)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RequestState::Created as u8)))
    }

    fn get(&self) -> RequestState {
        // Only ever stores valid discriminants.
        RequestState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(RequestState::Completed)
    }

    /// Moves to `to` if the current state is its direct predecessor.
    fn advance(&self, to: RequestState) -> Result<()> {
        let Some(from) = to.predecessor() else {
            return Err(Error::InvalidTransition {
                from: self.get(),
                to,
            });
        };
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| Error::InvalidTransition {
                from: RequestState::from_u8(actual).unwrap_or(RequestState::Completed),
                to,
            })
    }
}

/// A queued render, owned by the worker once enqueued.
#[derive(Debug)]
pub struct Request {
    id: u64,
    printer: Printer,
    requester: Option<RequesterId>,
    lock: Option<RequestLock>,
    waiting: WaitingSignal,
    state: StateCell,
    slot: watch::Sender<Option<RenderOutcome>>,
}

impl Request {
    /// Creates a request in the `Created` state together with the handles
    /// returned to the caller.
    pub fn new(
        id: u64,
        printer: Printer,
        requester: Option<RequesterId>,
        lock: Option<RequestLock>,
    ) -> (Self, ResultHandle, WaitingSignal) {
        let (slot, rx) = watch::channel(None);
        let waiting = WaitingSignal::new();
        let state = StateCell::new();
        let handle = ResultHandle {
            id,
            rx,
            state: state.clone(),
        };
        let request = Self {
            id,
            printer,
            requester,
            lock,
            waiting: waiting.clone(),
            state,
            slot,
        };
        (request, handle, waiting)
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn printer(&self) -> &Printer {
        &self.printer
    }

    pub const fn requester(&self) -> Option<RequesterId> {
        self.requester
    }

    /// The requester's lock at admission time, if the request is
    /// identity-scoped.
    pub const fn lock(&self) -> Option<&RequestLock> {
        self.lock.as_ref()
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    pub(crate) fn mark_queued(&self) -> Result<()> {
        self.state.advance(RequestState::Queued)
    }

    /// Marks the request as picked up by the worker and sets its waiting
    /// signal.
    pub(crate) fn dispatch(&self) -> Result<()> {
        self.state.advance(RequestState::Dispatched)?;
        self.waiting.set();
        Ok(())
    }

    /// Writes the final outcome and consumes the request.
    ///
    /// Requests that never reached `Dispatched` (for example ones drained from
    /// the queue during shutdown) are completed all the same.
    pub(crate) fn complete(self, outcome: RenderOutcome) {
        if self.state.get() != RequestState::Dispatched {
            // Queued requests are failed straight to completion during drain.
            self.state
                .0
                .store(RequestState::Completed as u8, Ordering::Release);
        } else if let Err(e) = self.state.advance(RequestState::Completed) {
            tracing::warn!(request = self.id, "Unexpected completion: {e}");
        }
        // `send_replace` stores the value even with no receiver left.
        self.slot.send_replace(Some(outcome));
    }
}

/// Caller-side view of a request's result slot.
///
/// Cheap to clone; every clone observes the same single result. Awaiting a
/// handle (or calling [`ResultHandle::wait`]) resolves once the worker has
/// written the outcome.
#[derive(Clone, Debug)]
pub struct ResultHandle {
    id: u64,
    rx: watch::Receiver<Option<RenderOutcome>>,
    state: StateCell,
}

impl ResultHandle {
    pub const fn request_id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.state.get()
    }

    /// Whether the result slot has been written.
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Returns the outcome if it has been written, without waiting.
    pub fn try_result(&self) -> Option<RenderOutcome> {
        self.rx.borrow().clone()
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the render failure written by the worker, or
    /// [`Error::Abandoned`] if the request was dropped without a result.
    pub async fn wait(&self) -> RenderOutcome {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(Error::Abandoned)),
            Err(_) => Err(Error::Abandoned),
        }
    }
}

impl IntoFuture for ResultHandle {
    type Output = RenderOutcome;
    type IntoFuture = BoxFuture<'static, RenderOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}
