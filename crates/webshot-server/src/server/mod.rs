//! Request admission and render dispatch.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and the validated [`SupervisorConfig`].
//! - [`telemetry`] - Logging subscriber and optional OpenTelemetry export.
//! - [`cache`] - Per-requester settings cache (LRU).
//! - [`lock`] - One-way latches: request locks, waiting signals and the lock
//!   registry.
//! - [`request`] - The unit of work and its result slot.
//! - [`pool`] - The worker queue and its dispatch loop.
//! - [`engine`] - The [`Renderer`](engine::Renderer) seam and a command-line
//!   renderer.
//! - [`transport`] - The [`Transport`](transport::Transport) seam and a
//!   JSON-lines stdio transport.
//! - [`supervisor`] - Top-level controller and graceful shutdown.
//!
//! [`SupervisorConfig`]: config::SupervisorConfig

pub mod cache;
pub mod config;
pub mod engine;
pub mod lock;
pub mod pool;
pub mod request;
pub mod supervisor;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;
