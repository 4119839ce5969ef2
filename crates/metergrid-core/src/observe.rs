//! Observation events — the inbound contract of the engine.
//!
//! Instrumented code (or a feed adapter wrapping a stream or client)
//! produces one `Observation` per emitted sample and hands it to a
//! `Recorder`. The event owns its tag buffer only for the duration of
//! the call; anything stored long-term is copied.

use std::time::SystemTime;

use crate::label::Label;

/// The aggregation behavior of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Untyped,
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Untyped => "untyped",
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A single observation event.
#[derive(Debug, Clone)]
pub struct Observation {
    pub kind: MetricKind,
    /// Optional namespace, concatenated in front of the name at
    /// emission (typically carries its own trailing separator).
    pub namespace: String,
    /// Metric name; an event with an empty name is rejected silently.
    pub name: String,
    /// Label pairs in whatever order the caller emits them.
    pub tags: Vec<Label>,
    pub value: f64,
    /// Wall-clock instant of the observation; `None` is replaced with
    /// the current time at ingestion.
    pub time: Option<SystemTime>,
    /// Histogram upper bounds, strictly increasing, optionally ending
    /// with +Inf. A histogram observation without bounds is dropped.
    pub buckets: Vec<f64>,
}

impl Observation {
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Observation::new(MetricKind::Counter, name, value)
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Observation::new(MetricKind::Gauge, name, value)
    }

    pub fn histogram(name: impl Into<String>, value: f64, buckets: Vec<f64>) -> Self {
        let mut obs = Observation::new(MetricKind::Histogram, name, value);
        obs.buckets = buckets;
        obs
    }

    fn new(kind: MetricKind, name: impl Into<String>, value: f64) -> Self {
        Observation {
            kind,
            namespace: String::new(),
            name: name.into(),
            tags: Vec::new(),
            value,
            time: None,
            buckets: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Label::new(name, value));
        self
    }

    pub fn at(mut self, time: SystemTime) -> Self {
        self.time = Some(time);
        self
    }
}

/// The seam between event producers and the aggregation engine.
///
/// Feed adapters are generic over this trait so they can be pointed
/// at the real exporter in production and at a capturing stub in
/// tests.
pub trait Recorder: Send + Sync {
    /// Ingest one observation. Never blocks beyond the brief internal
    /// locks of the store and never fails; malformed events are
    /// dropped.
    fn record(&self, observation: Observation);
}

impl<R: Recorder + ?Sized> Recorder for std::sync::Arc<R> {
    fn record(&self, observation: Observation) {
        (**self).record(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_fields() {
        let obs = Observation::histogram("conn.read.bytes", 512.0, vec![100.0, 1000.0])
            .with_namespace("app_")
            .with_tag("protocol", "tcp");
        assert_eq!(obs.kind, MetricKind::Histogram);
        assert_eq!(obs.namespace, "app_");
        assert_eq!(obs.tags.len(), 1);
        assert_eq!(obs.buckets, vec![100.0, 1000.0]);
        assert!(obs.time.is_none());
    }

    #[test]
    fn kind_strings() {
        assert_eq!(MetricKind::Counter.as_str(), "counter");
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
        assert_eq!(MetricKind::Histogram.as_str(), "histogram");
        assert_eq!(MetricKind::Untyped.as_str(), "untyped");
    }
}
