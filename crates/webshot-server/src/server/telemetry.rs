//! # Logging and Telemetry
//!
//! Logs are always collected through `tracing-subscriber`: a human-readable
//! layer on stderr plus a plain-text layer appended to the log file that the
//! supervisor archives on shutdown. OpenTelemetry export is optional.
//!
//! Nothing is logged to stdout, which carries the stdio transport's replies.
//!
//! ## Feature matrix
//!
//! - `otel`: Exports spans through OpenTelemetry.
//! - `metrics`: Records OpenTelemetry metrics (request counts, render
//!   durations, etc.).
//! - `stdout`: Enables the OpenTelemetry stdout exporter for either of the
//!   above.
//!
//! ## Metrics behavior
//!
//! The `increment_*`/`record_*` helpers at the bottom of this module compile
//! to no-ops when `metrics` is disabled, so call sites never need `cfg`
//! guards.
//!
//! ## Example usage
//!
//! ```bash
//! RUST_LOG=webshot_server=debug cargo run --features metrics,stdout
//! ```

// Disallow using `stdout` without `otel` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "otel", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'otel' or 'metrics' to be enabled.");

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_semantic_conventions as semvcns;

// Span export imports
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Errors are printed, not
    /// returned: logging may already be gone at this point.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber.
///
/// `log_file` is opened in append mode and receives every event that passes
/// the `RUST_LOG` filter (default `info`).
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is already
/// installed.
pub fn init_telemetry(log_file: &Path) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder("webshot")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file `{}`", log_file.display()))?;

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .with_writer(std::io::stderr)
                .pretty(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_writer(Mutex::new(file)),
        );

    #[cfg(feature = "otel")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init().context("a global subscriber is already installed")?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("webshot")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "otel")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let batch = sdktrace::BatchSpanProcessor::builder(SpanExporter::default())
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DUPLICATE_REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static QUEUE_REJECTIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDERS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDER_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RENDER_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Admitted render requests")
            .build(),
    );

    let _ = DUPLICATE_REQUESTS.set(
        meter
            .u64_counter("duplicate_requests")
            .with_description("Requests from a requester whose lock was still live")
            .build(),
    );

    let _ = QUEUE_REJECTIONS.set(
        meter
            .u64_counter("queue_rejections")
            .with_description("Requests refused because the worker queue was full")
            .build(),
    );

    let _ = RENDERS_INFLIGHT.set(
        meter
            .i64_up_down_counter("renders_inflight")
            .with_description("Concurrent renders")
            .build(),
    );

    let _ = RENDER_ERRORS.set(
        meter
            .u64_counter("render_errors")
            .with_description("Failed or panicked renders")
            .build(),
    );

    let _ = RENDER_DURATION_MS.set(
        meter
            .f64_histogram("render_duration")
            .with_unit("ms")
            .with_description("Time spent inside the renderer")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests() {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_duplicate_requests() {
    if let Some(counter) = DUPLICATE_REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_duplicate_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_queue_rejections() {
    if let Some(counter) = QUEUE_REJECTIONS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_queue_rejections() {}

#[cfg(feature = "metrics")]
pub fn increment_renders_inflight() {
    if let Some(counter) = RENDERS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_renders_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_renders_inflight() {
    if let Some(counter) = RENDERS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_renders_inflight() {}

#[cfg(feature = "metrics")]
pub fn increment_render_errors() {
    if let Some(counter) = RENDER_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_render_errors() {}

#[cfg(feature = "metrics")]
pub fn record_render_duration(duration_ms: f64) {
    if let Some(histogram) = RENDER_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_render_duration(_duration_ms: f64) {}
