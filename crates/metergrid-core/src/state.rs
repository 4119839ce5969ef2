//! Per-series aggregate state and the histogram bucket vector.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::atomic::{AtomicF64, AtomicTime};
use crate::label::{Label, LabelSet};
use crate::observe::MetricKind;
use crate::render::fmt_float;

/// One histogram cell: the number of samples at or under `limit`.
///
/// The label set is the series' base labels with the `le` label
/// appended, rendered once at creation so the scrape path never
/// re-formats bounds.
#[derive(Debug)]
pub struct Bucket {
    pub limit: f64,
    pub count: AtomicU64,
    pub labels: LabelSet,
}

/// Builds the bucket vector for `bounds`, mirroring the input
/// sequence verbatim (no +Inf is appended on the caller's behalf).
pub(crate) fn make_buckets(bounds: &[f64], base: &LabelSet) -> Vec<Bucket> {
    bounds
        .iter()
        .map(|&limit| Bucket {
            limit,
            count: AtomicU64::new(0),
            labels: base.copy_append(Label::new("le", fmt_float(limit))),
        })
        .collect()
}

/// Increments the first bucket whose limit is >= `value`, then stops.
/// A sample above every bound increments nothing.
fn bucket_update(buckets: &[Bucket], value: f64) {
    for bucket in buckets {
        if value <= bucket.limit {
            bucket.count.fetch_add(1, Ordering::Relaxed);
            break;
        }
    }
}

/// Histogram extension: bucket vector plus sum/count accumulators.
#[derive(Debug)]
pub struct HistogramCell {
    pub buckets: RwLock<Vec<Bucket>>,
    pub sum: AtomicF64,
    pub count: AtomicU64,
}

/// The mutable cell of a series, dispatched on metric kind.
#[derive(Debug)]
pub enum StateCell {
    Scalar(AtomicF64),
    Histogram(HistogramCell),
}

/// Aggregate state for one (metric identity, label set) pair.
#[derive(Debug)]
pub struct MetricState {
    /// Canonical label set, owned independently of any caller buffer.
    labels: LabelSet,
    pub(crate) cell: StateCell,
    /// Last-update clock; stored (not maxed) on every update.
    pub(crate) time: AtomicTime,
}

impl MetricState {
    pub fn new(kind: MetricKind, labels: &LabelSet) -> Self {
        let cell = match kind {
            MetricKind::Histogram => StateCell::Histogram(HistogramCell {
                buckets: RwLock::new(Vec::new()),
                sum: AtomicF64::default(),
                count: AtomicU64::new(0),
            }),
            _ => StateCell::Scalar(AtomicF64::default()),
        };
        MetricState {
            labels: labels.clone(),
            cell,
            time: AtomicTime::default(),
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn time_millis(&self) -> i64 {
        self.time.load_millis()
    }

    /// Applies one observation to the cell.
    ///
    /// Counters add, gauges store, histograms pick a bucket and bump
    /// sum/count. The bucket vector is (re)built under its write lock
    /// when the incoming bound count differs from the current one.
    /// The update clock is stored unconditionally afterwards, so a
    /// retroactive timestamp can regress it.
    pub fn update(&self, kind: MetricKind, value: f64, time_millis: i64, bounds: &[f64]) {
        match (kind, &self.cell) {
            (MetricKind::Counter, StateCell::Scalar(cell)) => cell.add(value),
            (MetricKind::Gauge, StateCell::Scalar(cell)) => cell.store(value),
            (MetricKind::Histogram, StateCell::Histogram(hist)) => {
                let buckets = hist.buckets.read();
                if buckets.len() == bounds.len() {
                    bucket_update(&buckets, value);
                } else {
                    drop(buckets);
                    let mut buckets = hist.buckets.write();
                    if buckets.len() != bounds.len() {
                        *buckets = make_buckets(bounds, &self.labels);
                    }
                    bucket_update(&buckets, value);
                }
                hist.sum.add(value);
                hist.count.fetch_add(1, Ordering::Relaxed);
            }
            // Untyped events and kind/cell mismatches only move the clock.
            _ => {}
        }
        self.time.store_millis(time_millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    fn bucket_counts(state: &MetricState) -> Vec<u64> {
        match &state.cell {
            StateCell::Histogram(h) => h
                .buckets
                .read()
                .iter()
                .map(|b| b.count.load(Ordering::Relaxed))
                .collect(),
            _ => panic!("not a histogram"),
        }
    }

    #[test]
    fn counter_adds() {
        let state = MetricState::new(MetricKind::Counter, &LabelSet::new());
        state.update(MetricKind::Counter, 1.0, 10, &[]);
        state.update(MetricKind::Counter, 2.0, 20, &[]);
        match &state.cell {
            StateCell::Scalar(v) => assert_eq!(v.load(), 3.0),
            _ => unreachable!(),
        }
        assert_eq!(state.time_millis(), 20);
    }

    #[test]
    fn gauge_last_write_wins() {
        let state = MetricState::new(MetricKind::Gauge, &LabelSet::new());
        state.update(MetricKind::Gauge, 42.0, 10, &[]);
        state.update(MetricKind::Gauge, 21.0, 20, &[]);
        match &state.cell {
            StateCell::Scalar(v) => assert_eq!(v.load(), 21.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn histogram_increments_first_matching_bucket_only() {
        let bounds = [0.25, 0.5, 0.75, 1.0];
        let state = MetricState::new(MetricKind::Histogram, &LabelSet::new());
        for value in [0.1, 0.1, 0.5, 10.0] {
            state.update(MetricKind::Histogram, value, 10, &bounds);
        }
        // 10 lands above every bound: no bucket, still counted in
        // count/sum.
        assert_eq!(bucket_counts(&state), vec![2, 1, 0, 0]);
        match &state.cell {
            StateCell::Histogram(h) => {
                assert_eq!(h.count.load(Ordering::Relaxed), 4);
                assert_eq!(h.sum.load(), 10.7);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn histogram_reshapes_on_bound_count_change() {
        let state = MetricState::new(MetricKind::Histogram, &labels(&[("a", "1")]));
        state.update(MetricKind::Histogram, 0.1, 10, &[0.5, 1.0]);
        assert_eq!(bucket_counts(&state), vec![1, 0]);

        state.update(MetricKind::Histogram, 0.1, 20, &[0.25, 0.5, 1.0]);
        // Reshape discards prior bucket counts.
        assert_eq!(bucket_counts(&state), vec![1, 0, 0]);
    }

    #[test]
    fn bucket_labels_pre_rendered_with_le() {
        let state = MetricState::new(MetricKind::Histogram, &labels(&[("id", "7")]));
        state.update(MetricKind::Histogram, 50.0, 10, &[100.0, f64::INFINITY]);
        match &state.cell {
            StateCell::Histogram(h) => {
                let buckets = h.buckets.read();
                assert_eq!(buckets[0].labels, labels(&[("id", "7"), ("le", "100")]));
                assert_eq!(buckets[1].labels, labels(&[("id", "7"), ("le", "+Inf")]));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn update_clock_stores_not_maxes() {
        let state = MetricState::new(MetricKind::Counter, &LabelSet::new());
        state.update(MetricKind::Counter, 1.0, 100, &[]);
        state.update(MetricKind::Counter, 1.0, 50, &[]);
        assert_eq!(state.time_millis(), 50);
    }
}
