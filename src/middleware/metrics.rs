//! Prometheus metrics for the notification pipeline.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Counters are bumped by `EventPipeline` at each stage.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashSet;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_counter_vec, register_int_counter, CounterVec, Encoder, IntCounter,
    TextEncoder,
};

/// Maximum distinct category labels before bucketing to "other".
/// Categories are an open set supplied by callers.
const MAX_CATEGORIES: usize = 64;

/// Pipeline counters, registered once in the global default registry.
pub struct PipelineMetrics {
    notifications_created_total: CounterVec,
    persist_failures_total: IntCounter,
    push_total: CounterVec,
    realtime_total: CounterVec,
    categories: CategoryLabels,
}

/// Bounded set of category label values. At most `cap` distinct values are
/// ever admitted; everything after that is reported as "other".
struct CategoryLabels {
    seen: DashSet<String>,
    admitted: AtomicUsize,
    cap: usize,
}

impl CategoryLabels {
    fn new(cap: usize) -> Self {
        Self {
            seen: DashSet::new(),
            admitted: AtomicUsize::new(0),
            cap,
        }
    }

    fn label<'a>(&self, category: &'a str) -> &'a str {
        if category.is_empty() {
            return "none";
        }
        if self.seen.contains(category) {
            return category;
        }
        // Reserve a slot before inserting so racing first-seen categories
        // cannot overshoot the cap.
        let reserved = self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return if self.seen.contains(category) { category } else { "other" };
        }
        if !self.seen.insert(category.to_string()) {
            // Another thread admitted the same value first
            self.admitted.fetch_sub(1, Ordering::AcqRel);
        }
        category
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

pub static METRICS: Lazy<PipelineMetrics> = Lazy::new(PipelineMetrics::new);

impl PipelineMetrics {
    fn new() -> Self {
        let notifications_created_total = register_counter_vec!(
            opts!(
                "ideahub_notifications_created_total",
                "Notification records persisted"
            ),
            &["category"]
        )
        .expect("failed to register ideahub_notifications_created_total");

        let persist_failures_total = register_int_counter!(opts!(
            "ideahub_persist_failures_total",
            "Events aborted because the notification store rejected the write"
        ))
        .expect("failed to register ideahub_persist_failures_total");

        let push_total = register_counter_vec!(
            opts!("ideahub_push_total", "Push dispatch attempts by outcome"),
            &["outcome"]
        )
        .expect("failed to register ideahub_push_total");

        let realtime_total = register_counter_vec!(
            opts!("ideahub_realtime_total", "Realtime fan-out attempts by outcome"),
            &["outcome"]
        )
        .expect("failed to register ideahub_realtime_total");

        Self {
            notifications_created_total,
            persist_failures_total,
            push_total,
            realtime_total,
            categories: CategoryLabels::new(MAX_CATEGORIES),
        }
    }

    pub fn record_created(&self, category: &str) {
        let label = self.categories.label(category);
        self.notifications_created_total
            .with_label_values(&[label])
            .inc();
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.inc();
    }

    pub fn record_push(&self, outcome: &str) {
        self.push_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_realtime(&self, outcome: &str) {
        self.realtime_total.with_label_values(&[outcome]).inc();
    }
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────
