//! Prometheus metrics for the chunkyard server.
//!
//! The `/metrics` endpoint is unauthenticated. Metrics carry no filenames,
//! only aggregate counts, but should still not be exposed publicly.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload session metrics
pub static UPLOAD_SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_upload_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_RESET: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_upload_sessions_reset_total",
        "Total number of upload sessions discarded because the file changed",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_upload_sessions_completed_total",
        "Total number of upload sessions assembled into a file",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_SESSIONS_REAPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_upload_sessions_reaped_total",
        "Total number of idle upload sessions evicted by the reaper",
    )
    .expect("metric creation failed")
});

// Current state gauges
pub static ACTIVE_UPLOAD_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "chunkyard_active_upload_sessions",
        "Current number of active upload sessions",
    )
    .expect("metric creation failed")
});

// Chunk metrics
pub static CHUNKS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_chunks_uploaded_total",
        "Total number of chunks written and acknowledged",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_bytes_uploaded_total",
        "Total chunk payload bytes written",
    )
    .expect("metric creation failed")
});

pub static ORPHANED_CHUNKS_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_orphaned_chunks_removed_total",
        "Total number of orphaned chunk artifacts removed by the reaper",
    )
    .expect("metric creation failed")
});

// Assembly metrics
pub static ASSEMBLY_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_assembly_failures_total",
        "Total number of failed assemblies",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static CHUNK_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chunkyard_chunk_upload_duration_seconds",
            "Time taken to receive and persist a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static ASSEMBLY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chunkyard_assembly_duration_seconds",
            "Time taken to assemble a file from its chunks",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chunkyard_upload_errors_total",
            "Total upload errors by error type",
        ),
        &["error_type"],
    )
    .expect("metric creation failed")
});

// Download metrics
pub static DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chunkyard_downloads_total",
            "Total downloads by kind (full or partial)",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "chunkyard_bytes_served_total",
        "Total bytes scheduled for download responses",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests may build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(UPLOAD_SESSIONS_CREATED.clone()),
            Box::new(UPLOAD_SESSIONS_RESET.clone()),
            Box::new(UPLOAD_SESSIONS_COMPLETED.clone()),
            Box::new(UPLOAD_SESSIONS_REAPED.clone()),
            Box::new(ACTIVE_UPLOAD_SESSIONS.clone()),
            Box::new(CHUNKS_UPLOADED.clone()),
            Box::new(BYTES_UPLOADED.clone()),
            Box::new(ORPHANED_CHUNKS_REMOVED.clone()),
            Box::new(ASSEMBLY_FAILURES.clone()),
            Box::new(CHUNK_UPLOAD_DURATION.clone()),
            Box::new(ASSEMBLY_DURATION.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
            Box::new(DOWNLOADS.clone()),
            Box::new(BYTES_SERVED.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload errors by type.
pub fn record_upload_error(error_type: &str) {
    UPLOAD_ERRORS.with_label_values(&[error_type]).inc();
}

/// Helper to record a served download.
pub fn record_download(partial: bool, bytes: u64) {
    let kind = if partial { "partial" } else { "full" };
    DOWNLOADS.with_label_values(&[kind]).inc();
    BYTES_SERVED.inc_by(bytes);
}
