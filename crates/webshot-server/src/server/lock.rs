//! One-way signals used by the admission core.
//!
//! Both the per-requester [`RequestLock`] and the per-request
//! [`WaitingSignal`] are latches: they start unset, can be set exactly once
//! (setting again is a no-op) and never reset. Any number of clones observe
//! the same state and can await the transition.
//!
//! Neither type blocks anyone. A `RequestLock` only records whether a
//! requester is inside its cool-down window; the transport looks it up
//! through the [`LockRegistry`] to detect duplicate requests.

use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use webshot_core::RequesterId;

/// A set-once flag that can be awaited.
#[derive(Clone, Debug, Default)]
struct Latch(CancellationToken);

impl Latch {
    fn set(&self) {
        self.0.cancel();
    }

    fn is_set(&self) -> bool {
        self.0.is_cancelled()
    }

    async fn wait(&self) {
        self.0.cancelled().await;
    }
}

/// Per-requester cool-down flag.
///
/// Unset while the requester may not submit another request, set once the
/// release timer fires. Completion of the render does not release it.
#[derive(Clone, Debug)]
pub struct RequestLock {
    latch: Latch,
    created_at: Instant,
    release_after: Duration,
}

impl RequestLock {
    /// Creates an unset lock that is due for release `release_after` from now.
    pub fn new(release_after: Duration) -> Self {
        Self {
            latch: Latch::default(),
            created_at: Instant::now(),
            release_after,
        }
    }

    /// Releases the lock. Idempotent.
    pub fn release(&self) {
        self.latch.set();
    }

    pub fn is_released(&self) -> bool {
        self.latch.is_set()
    }

    /// Resolves once the lock has been released.
    pub async fn released(&self) {
        self.latch.wait().await;
    }

    /// When the release timer is due to fire.
    pub fn deadline(&self) -> Instant {
        self.created_at + self.release_after
    }

    pub const fn release_after(&self) -> Duration {
        self.release_after
    }

    /// Time left until the scheduled release, zero once it is due or done.
    pub fn remaining(&self) -> Duration {
        if self.is_released() {
            Duration::ZERO
        } else {
            self.deadline().saturating_duration_since(Instant::now())
        }
    }
}

/// Set by the worker when it dequeues a request and starts rendering it.
#[derive(Clone, Debug, Default)]
pub struct WaitingSignal(Latch);

impl WaitingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        self.0.set();
    }

    /// Whether the worker has started processing the request.
    pub fn is_set(&self) -> bool {
        self.0.is_set()
    }

    /// Resolves once the worker has started processing the request.
    pub async fn wait(&self) {
        self.0.wait().await;
    }
}

/// Registry of the most recent [`RequestLock`] per requester.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: HashMap<RequesterId, RequestLock>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `lock` for `id`, returning whatever entry it replaced.
    pub fn insert(&mut self, id: RequesterId, lock: RequestLock) -> Option<RequestLock> {
        self.locks.insert(id, lock)
    }

    pub fn get(&self, id: RequesterId) -> Option<RequestLock> {
        self.locks.get(&id).cloned()
    }

    pub fn remove(&mut self, id: RequesterId) -> Option<RequestLock> {
        self.locks.remove(&id)
    }

    /// Whether `id` has a lock that has not been released yet.
    pub fn is_locked(&self, id: RequesterId) -> bool {
        self.locks.get(&id).is_some_and(|lock| !lock.is_released())
    }

    /// Drops every released entry and returns how many were removed.
    ///
    /// A released entry and a missing entry mean the same thing to duplicate
    /// detection, so this only bounds memory.
    pub fn prune_released(&mut self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| !lock.is_released());
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
