//! Error types for the webshot render service.
//!
//! This module defines the central [`Error`] enum shared by the admission
//! core, the worker and the transports, plus [`RenderError`] for failures
//! reported by the rendering engine itself.
//!
//! ## Error Cases
//! - `QueueFull`: The worker queue is at capacity; the request was rejected
//!   without taking a lock.
//! - `ServiceShutdown`: A request arrived, or was still queued, while the
//!   service was shutting down.
//! - `DuplicateRequest`: The requester still holds a live lock and the
//!   admission policy rejects duplicates.
//! - `AlreadyStarted`: The worker was started more than once.
//! - `InvalidTransition`: A request tried to move backwards or skip a state.
//! - `Render`: The rendering engine failed; the request is still complete.
//! - `Abandoned`: The request was dropped before a result was written.
//! - `ChannelError`: An internal communication failure between tasks.
//! - `Io`: A filesystem or stream operation failed.

use crate::common::types::{RequestState, RequesterId};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the render service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The bounded worker queue has no free slot.
    #[error("Request queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The requester already has a request inside its cool-down window.
    #[error("Requester {requester} already has a request in flight")]
    DuplicateRequest { requester: RequesterId },

    /// The worker consumption loop is already running.
    #[error("Worker already started")]
    AlreadyStarted,

    /// A request lifecycle transition that is not a single forward step.
    #[error("Invalid request transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestState,
        to: RequestState,
    },

    /// The rendering engine reported a failure.
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    /// The request was dropped before its result slot was written.
    #[error("Request was abandoned before completion")]
    Abandoned,

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Filesystem or stream failure.
    #[error("I/O error: {context}")]
    Io { context: String },
}

impl Error {
    /// Wraps an [`std::io::Error`] with a short description of what failed.
    pub fn io(what: impl core::fmt::Display, err: &std::io::Error) -> Self {
        Self::Io {
            context: format!("{what}: {err}"),
        }
    }
}

/// Failure reported by a rendering engine.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// The engine ran but could not produce an artifact.
    #[error("{reason}")]
    Failed { reason: String },

    /// The engine did not finish within its deadline.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The engine panicked while rendering.
    #[error("renderer panicked")]
    Panicked,

    /// The link cannot be rendered at all.
    #[error("invalid target `{link}`")]
    InvalidTarget { link: String },
}

impl RenderError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}
