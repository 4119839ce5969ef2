//! Metric entries — all series sharing one (namespace, name, kind).

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::label::LabelSet;
use crate::observe::MetricKind;
use crate::state::{MetricState, StateCell};
use crate::store::Sample;

/// Indexes the states of one metric identity by label-set hash,
/// chained to resolve collisions. The entry lock guards structural
/// changes only; value mutation goes through the states' atomics.
#[derive(Debug)]
pub struct MetricEntry {
    kind: MetricKind,
    namespace: String,
    name: String,
    // Histogram sub-series names, rendered once at creation so the
    // scrape path never re-concatenates.
    bucket_name: String,
    sum_name: String,
    count_name: String,
    states: RwLock<HashMap<u64, Vec<Arc<MetricState>>>>,
}

impl MetricEntry {
    pub fn new(kind: MetricKind, namespace: &str, name: &str) -> Self {
        let (bucket_name, sum_name, count_name) = if kind == MetricKind::Histogram {
            (
                format!("{name}_bucket"),
                format!("{name}_sum"),
                format!("{name}_count"),
            )
        } else {
            (String::new(), String::new(), String::new())
        };

        MetricEntry {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            bucket_name,
            sum_name,
            count_name,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the state for `labels`, creating it on first sight.
    ///
    /// Double-checked: read-lock probe first so the fast path is
    /// contention-free across distinct series, then write-lock and
    /// re-probe before inserting.
    pub fn lookup(&self, labels: &LabelSet) -> Arc<MetricState> {
        let key = labels.hash64();

        {
            let states = self.states.read();
            if let Some(state) = probe(&states, key, labels) {
                return state;
            }
        }

        let mut states = self.states.write();
        if let Some(state) = probe(&states, key, labels) {
            return state;
        }
        let state = Arc::new(MetricState::new(self.kind, labels));
        states.entry(key).or_default().push(state.clone());
        state
    }

    /// Appends one sample per counter/gauge state, or the
    /// `_bucket`/`_sum`/`_count` projection per histogram state. All
    /// samples of one histogram state share a single time snapshot.
    pub fn collect(&self, out: &mut Vec<Sample>) {
        let states = self.states.read();
        for chain in states.values() {
            for state in chain {
                self.collect_state(state, out);
            }
        }
    }

    fn collect_state(&self, state: &MetricState, out: &mut Vec<Sample>) {
        match &state.cell {
            StateCell::Scalar(value) => {
                if matches!(self.kind, MetricKind::Counter | MetricKind::Gauge) {
                    out.push(Sample {
                        kind: self.kind,
                        namespace: self.namespace.clone(),
                        name: self.name.clone(),
                        labels: state.labels().clone(),
                        value: value.load(),
                        time_millis: state.time_millis(),
                    });
                }
            }
            StateCell::Histogram(hist) => {
                let time_millis = state.time_millis();
                let buckets = hist.buckets.read();

                for bucket in buckets.iter() {
                    out.push(Sample {
                        kind: self.kind,
                        namespace: self.namespace.clone(),
                        name: self.bucket_name.clone(),
                        labels: bucket.labels.clone(),
                        value: bucket.count.load(Ordering::Relaxed) as f64,
                        time_millis,
                    });
                }
                out.push(Sample {
                    kind: self.kind,
                    namespace: self.namespace.clone(),
                    name: self.sum_name.clone(),
                    labels: state.labels().clone(),
                    value: hist.sum.load(),
                    time_millis,
                });
                out.push(Sample {
                    kind: self.kind,
                    namespace: self.namespace.clone(),
                    name: self.count_name.clone(),
                    labels: state.labels().clone(),
                    value: hist.count.load(Ordering::Relaxed) as f64,
                    time_millis,
                });
            }
        }
    }

    /// Evicts every state whose clock is at or before the threshold
    /// (strictly newer survives). Returns true when the entry is left
    /// empty and should be removed from the store.
    pub fn cleanup(&self, threshold_millis: i64) -> bool {
        let mut states = self.states.write();
        for chain in states.values_mut() {
            chain.retain(|state| state.time_millis() > threshold_millis);
        }
        states.retain(|_, chain| !chain.is_empty());
        states.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

fn probe(
    states: &HashMap<u64, Vec<Arc<MetricState>>>,
    key: u64,
    labels: &LabelSet,
) -> Option<Arc<MetricState>> {
    states
        .get(&key)?
        .iter()
        .find(|state| state.labels() == labels)
        .cloned()
}
