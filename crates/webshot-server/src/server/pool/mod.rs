//! The render worker.
//!
//! - [`manager`] - [`Worker`](manager::Worker): bounded queue, start/close
//!   lifecycle.
//! - [`worker`] - The dispatch loop and per-request execution.

pub mod manager;
pub mod worker;

#[cfg(test)]
mod tests;
