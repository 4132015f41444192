/// Metrics for the content storage service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Upload and download outcomes
/// - Sections and bytes ingested
/// - Blob store operation latency

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== Ingestion Metrics ==========

    /// File sections stored (blob written and row inserted)
    pub static ref SECTIONS_INGESTED_TOTAL: IntCounter = register_int_counter!(
        "content_sections_ingested_total",
        "Total number of file sections stored"
    )
    .unwrap();

    /// Bytes of file content stored
    pub static ref BYTES_INGESTED_TOTAL: IntCounter = register_int_counter!(
        "content_bytes_ingested_total",
        "Total number of content bytes stored"
    )
    .unwrap();

    /// Upload requests by outcome
    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "content_uploads_total",
        "Total number of upload requests",
        &["outcome"]
    )
    .unwrap();

    // ========== Retrieval Metrics ==========

    /// Download requests by outcome
    pub static ref DOWNLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "content_downloads_total",
        "Total number of download requests",
        &["outcome"]
    )
    .unwrap();

    // ========== Blob Store Metrics ==========

    /// Blob store operation duration in seconds
    pub static ref BLOB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "blob_operation_duration_seconds",
        "Blob store operation latencies in seconds",
        &["backend", "operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record one stored section
pub fn record_section_ingested(bytes: usize) {
    SECTIONS_INGESTED_TOTAL.inc();
    BYTES_INGESTED_TOTAL.inc_by(bytes as u64);
}

/// Record an upload request outcome ("success" or an error kind)
pub fn record_upload(outcome: &str) {
    UPLOADS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a download request outcome ("success" or an error kind)
pub fn record_download(outcome: &str) {
    DOWNLOADS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a blob store operation
pub fn record_blob_operation(backend: &str, operation: &str, duration: f64) {
    BLOB_OPERATION_DURATION_SECONDS
        .with_label_values(&[backend, operation])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_section() {
        let before = SECTIONS_INGESTED_TOTAL.get();
        record_section_ingested(5);
        assert!(SECTIONS_INGESTED_TOTAL.get() > before);
    }

    #[test]
    fn test_render_metrics() {
        record_upload("success");
        record_blob_operation("memory", "put", 0.002);

        let output = render_metrics();
        assert!(output.contains("content_uploads_total"));
        assert!(output.contains("blob_operation_duration_seconds"));
    }
}
