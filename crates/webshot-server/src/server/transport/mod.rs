//! The transport seam.
//!
//! A transport receives commands from end users, checks
//! [`Supervisor::get_request`](crate::Supervisor::get_request) for duplicates,
//! prefills from
//! [`Supervisor::get_settings_cache`](crate::Supervisor::get_settings_cache),
//! submits through
//! [`Supervisor::new_request`](crate::Supervisor::new_request) and reports
//! progress back. The supervisor only calls into it during shutdown.
//!
//! - [`stdio`] - JSON-lines transport over stdin/stdout.

pub mod stdio;

use std::path::Path;
use webshot_core::Result;

pub trait Transport: Send + Sync + 'static {
    /// Ships the log file at `path` to `destination` before it is removed.
    fn archive_log(
        &self,
        destination: &str,
        path: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stops receiving commands and releases the connection.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}
