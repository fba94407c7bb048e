use tokio::signal;

/// Resolves on SIGINT or, on unix, SIGTERM.
///
/// # Panics
///
/// If a signal handler cannot be installed.
pub async fn signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
