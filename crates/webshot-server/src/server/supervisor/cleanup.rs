use crate::server::{config::SupervisorConfig, transport::Transport};
use std::{io::ErrorKind, path::Path};

/// Shutdown housekeeping. Every failure is logged and swallowed.
pub async fn run<T: Transport>(config: &SupervisorConfig, transport: &T) {
    tokio::join!(
        archive_log(config, transport),
        remove_work_dir(&config.work_dir),
    );
}

/// Ships the log file through the transport and removes it.
///
/// Does nothing without a destination or without a log file. The file is kept
/// when archival fails.
async fn archive_log<T: Transport>(config: &SupervisorConfig, transport: &T) {
    let Some(destination) = config.log_group.as_deref() else {
        return;
    };
    let path = config.log_file.as_path();
    match tokio::fs::try_exists(path).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(path = %path.display(), "No log file to archive");
            return;
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "Checking log file: {e}");
            return;
        }
    }

    if let Err(e) = transport.archive_log(destination, path).await {
        tracing::error!(destination, "Archiving log file: {e}");
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(destination, "Archived log file"),
        Err(e) => tracing::error!(path = %path.display(), "Removing archived log file: {e}"),
    }
}

async fn remove_work_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::info!(dir = %dir.display(), "Removed work directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::error!(dir = %dir.display(), "Removing work directory: {e}"),
    }
}
