//! Process-wide purge metrics in a dedicated prometheus registry.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;


lazy_static! {
    pub static ref SCANNED_KEYS: IntCounter =
        IntCounter::new("purge_scanned_keys_total", "Keys returned by segment scans")
            .expect("metric can not be created");

    pub static ref DELETED_KEYS: IntCounter =
        IntCounter::new("purge_deleted_keys_total", "Keys confirmed deleted")
            .expect("metric can not be created");

    pub static ref DELETE_RETRIES: IntCounter =
        IntCounter::new("purge_delete_retries_total", "Batch delete resubmissions")
            .expect("metric can not be created");

    pub static ref UNRESOLVED_KEYS: IntCounterVec = IntCounterVec::new(
        Opts::new("purge_unresolved_keys_total", "Scanned keys left undeleted"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref ABORTED_SEGMENTS: IntCounter =
        IntCounter::new("purge_aborted_segments_total", "Segments stopped by a non-retryable error")
            .expect("metric can not be created");

    pub static ref BATCH_DELETE_LATENCY_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("purge_batch_delete_latency_ms", "Latency of single batch delete calls in ms")
            .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers every purge collector into [`REGISTRY`]; safe to call repeatedly
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SCANNED_KEYS.clone()),
            Box::new(DELETED_KEYS.clone()),
            Box::new(DELETE_RETRIES.clone()),
            Box::new(UNRESOLVED_KEYS.clone()),
            Box::new(ABORTED_SEGMENTS.clone()),
            Box::new(BATCH_DELETE_LATENCY_MS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!("collector can not be registered: {:?}", e);
            }
        }
    });
}

/// Text exposition of [`REGISTRY`]
pub fn render() -> String {
    register_custom_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
