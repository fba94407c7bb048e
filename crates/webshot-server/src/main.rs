use clap::Parser;
use std::{sync::Arc, time::Duration};
use webshot_server::{
    CliArgs, CommandRenderer, ServerConfig, Supervisor,
    server::{
        telemetry::init_telemetry,
        transport::stdio::{StdioTransport, serve},
    },
};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Grace period for the blocking stdin reader once the supervisor stopped.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(&config.supervisor.log_file)?;
    log_startup_info(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let res = runtime.block_on(run(config));
    // stdin is read on a blocking thread that only returns on the next line.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    providers.shutdown();
    res
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let renderer = Arc::new(CommandRenderer::new(config.renderer));
    let transport = Arc::new(StdioTransport::new());
    let supervisor = Arc::new(Supervisor::new(config.supervisor, renderer, transport));

    let shutdown = supervisor.shutdown_handle();
    let serving = tokio::spawn(serve(Arc::clone(&supervisor)));
    // End of input stops the service like a signal would.
    let input_closed = tokio::spawn(async move {
        match serving.await {
            Ok(Ok(())) => tracing::info!("Input closed"),
            Ok(Err(e)) => tracing::error!("Transport failed: {e}"),
            Err(e) => tracing::error!("Transport task failed: {e}"),
        }
        shutdown.trigger();
    });

    supervisor.start().await?;
    if let Err(e) = input_closed.await {
        tracing::error!("Joining transport: {e}");
    }

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting webshot with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting webshot with queue capacity {} and {} concurrent renders",
            config.supervisor.queue_capacity,
            config.supervisor.max_concurrent_renders
        );
    }
}
