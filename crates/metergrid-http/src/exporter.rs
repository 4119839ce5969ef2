//! The exporter — ingestion facade over the metric store.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tracing::debug;

use metergrid_core::atomic::time_to_millis;
use metergrid_core::{
    sort_samples, write_exposition, MetricKind, MetricStore, Observation, Recorder, Sample,
    Update,
};

use crate::config::ExporterConfig;
use crate::pool::with_scratch;

/// Every N-th ingestion triggers an eviction pass over the store.
const CLEANUP_INTERVAL: u64 = 10_000;

/// Aggregates observation events and renders the aggregate state.
///
/// One exporter is created per process, shared by every producer
/// thread and by the scrape handler.
pub struct Exporter {
    config: ExporterConfig,
    opcount: AtomicU64,
    store: MetricStore,
}

impl Exporter {
    pub fn new(config: ExporterConfig) -> Self {
        Exporter {
            config,
            opcount: AtomicU64::new(0),
            store: MetricStore::new(),
        }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Collects, sorts, and writes the current exposition document.
    pub fn render_into<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let mut samples: Vec<Sample> = Vec::with_capacity(1024);
        self.store.collect(&mut samples);
        sort_samples(&mut samples);
        write_exposition(w, &samples, &self.config.trim_prefix)
    }

    /// Evicts every series idle past the retention window.
    pub fn cleanup(&self) {
        let threshold = time_to_millis(SystemTime::now()) - self.config.metric_timeout.as_millis() as i64;
        self.store.cleanup(threshold);
        debug!(threshold_millis = threshold, "evicted idle series");
    }
}

impl Recorder for Exporter {
    /// Ingests one observation.
    ///
    /// Malformed events are dropped silently: an empty name, a
    /// non-finite value, or a histogram without bucket bounds. A
    /// missing timestamp is replaced with the current time. Labels are
    /// canonicalized into a pooled scratch buffer unless the
    /// configuration promises pre-sorted tags.
    fn record(&self, observation: Observation) {
        if observation.name.is_empty() || !observation.value.is_finite() {
            return;
        }
        if observation.kind == MetricKind::Histogram && observation.buckets.is_empty() {
            return;
        }

        let time_millis = time_to_millis(observation.time.unwrap_or_else(SystemTime::now));

        with_scratch(|labels| {
            for tag in &observation.tags {
                labels.push(tag.clone());
            }
            if !self.config.unsorted_labels && !labels.is_sorted() {
                labels.sort();
            }

            self.store.update(
                Update {
                    kind: observation.kind,
                    namespace: &observation.namespace,
                    name: &observation.name,
                    labels,
                    value: observation.value,
                    time_millis,
                },
                &observation.buckets,
            );
        });

        // Periodic eviction keeps memory bounded when label sets churn
        // and never come back.
        if (self.opcount.fetch_add(1, Ordering::Relaxed) + 1) % CLEANUP_INTERVAL == 0 {
            self.cleanup();
        }
    }
}
