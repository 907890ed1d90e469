//! # Telemetry
//!
//! Console logging through `tracing-subscriber` is always on and filtered by
//! `RUST_LOG` (default `info`). OpenTelemetry export is opt-in per feature:
//!
//! - `tracing` (default): request spans from `TraceLayer`, with the store's
//!   `record_if_absent` span nested inside.
//! - `metrics`: the counters and histogram below.
//! - `stdout`: print exported spans and metrics every few seconds.
//! - `honeycomb`: OTLP/gRPC export, configured from `HONEYCOMB_API_KEY`,
//!   `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT` and `HONEYCOMB_COMPRESSION`.
//!
//! | name               | kind      | meaning                         |
//! | ------------------ | --------- | ------------------------------- |
//! | `requests`         | counter   | `/shard` requests received      |
//! | `allocations`      | counter   | assignments returned with 200   |
//! | `rejected`         | counter   | requests refused with 4xx       |
//! | `errors`           | counter   | requests failed with 5xx        |
//! | `request_duration` | histogram | end-to-end `/shard` latency, ms |

#[cfg(all(
    any(feature = "honeycomb", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("Exporters require at least one of the 'tracing' or 'metrics' features.");

use axum::http::StatusCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(feature = "honeycomb")]
use honeycomb::Honeycomb;

const SERVICE_NAME: &str = "shardalloc";

#[cfg(any(feature = "stdout", all(feature = "tracing", feature = "honeycomb")))]
const EXPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// How a `/shard` request ended, as far as metrics are concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Allocated,
    Rejected,
    Failed,
}

impl RequestOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Allocated
        } else if status.is_client_error() {
            Self::Rejected
        } else {
            Self::Failed
        }
    }
}

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending exports and stops the providers. Failures go to
    /// stderr since the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
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

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "tracing")]
    let (registry, tracer_provider) = {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        let provider = build_tracer_provider()?;
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (registry.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let provider = build_meter_provider()?;
        opentelemetry::global::set_meter_provider(provider.clone());
        let _ = METRICS.set(RequestMetrics::new(&opentelemetry::global::meter_with_scope(
            scope,
        )));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (registry.with(layer), provider)
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "tracing")]
fn build_tracer_provider() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder =
        builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let exporter = Honeycomb::from_env()?
            .configure(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build span exporter")?;
        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(all(feature = "tracing", any(feature = "stdout", feature = "honeycomb")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
fn build_meter_provider() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let otlp = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_temporality(sdkmetrics::Temporality::Delta);
        let exporter = Honeycomb::from_env()?
            .configure(otlp)
            .build()
            .context("failed to build metric exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "honeycomb")]
mod honeycomb {
    use anyhow::Context;
    use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
    use std::{str::FromStr, time::Duration};
    use tonic::{metadata::MetadataMap, transport::ClientTlsConfig};

    /// Connection settings shared by the span and metric exporters.
    pub(super) struct Honeycomb {
        endpoint: String,
        compression: Compression,
        metadata: MetadataMap,
    }

    impl Honeycomb {
        pub(super) fn from_env() -> anyhow::Result<Self> {
            let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

            let mut metadata = MetadataMap::new();
            metadata.insert(
                "x-honeycomb-team",
                var("HONEYCOMB_API_KEY")?
                    .parse()
                    .context("invalid API key")?,
            );
            metadata.insert(
                "x-honeycomb-dataset",
                var("HONEYCOMB_DATASET")?
                    .parse()
                    .context("invalid dataset")?,
            );

            Ok(Self {
                endpoint: var("HONEYCOMB_ENDPOINT")?,
                compression: Compression::from_str(
                    &var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase(),
                )?,
                metadata,
            })
        }

        pub(super) fn configure<B>(self, builder: B) -> B
        where
            B: WithExportConfig + WithTonicConfig,
        {
            builder
                .with_tls_config(ClientTlsConfig::new().with_native_roots())
                .with_metadata(self.metadata)
                .with_compression(self.compression)
                .with_endpoint(self.endpoint)
                .with_protocol(Protocol::Grpc)
                .with_timeout(Duration::from_secs(10))
        }
    }
}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<RequestMetrics> = OnceLock::new();

#[cfg(feature = "metrics")]
struct RequestMetrics {
    requests: Counter<u64>,
    allocations: Counter<u64>,
    rejected: Counter<u64>,
    errors: Counter<u64>,
    duration_ms: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl RequestMetrics {
    fn new(meter: &Meter) -> Self {
        let counter = |name: &'static str, description: &'static str| {
            meter.u64_counter(name).with_description(description).build()
        };
        Self {
            requests: counter("requests", "Total /shard requests"),
            allocations: counter("allocations", "Assignments returned to clients"),
            rejected: counter("rejected", "Requests refused for a missing or empty seed"),
            errors: counter("errors", "Requests failed by a store error"),
            duration_ms: meter
                .f64_histogram("request_duration")
                .with_unit("ms")
                .with_description("End-to-end /shard request duration")
                .build(),
        }
    }
}

/// Records one finished `/shard` request. A no-op without `metrics`.
pub fn record_request(outcome: RequestOutcome, duration_ms: f64) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = METRICS.get() {
            metrics.requests.add(1, &[]);
            match outcome {
                RequestOutcome::Allocated => metrics.allocations.add(1, &[]),
                RequestOutcome::Rejected => metrics.rejected.add(1, &[]),
                RequestOutcome::Failed => metrics.errors.add(1, &[]),
            }
            metrics.duration_ms.record(duration_ms, &[]);
        }
    }

    #[cfg(not(feature = "metrics"))]
    let _ = (outcome, duration_ms);
}
