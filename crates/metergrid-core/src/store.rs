//! The global metric store.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3;

use crate::entry::MetricEntry;
use crate::label::LabelSet;
use crate::observe::MetricKind;

/// One projected record of the store, the unit handed to the
/// serializer. Histogram states project into several samples
/// (`_bucket` per bound, `_sum`, `_count`).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: MetricKind,
    pub namespace: String,
    pub name: String,
    pub labels: LabelSet,
    pub value: f64,
    pub time_millis: i64,
}

/// A canonicalized update, borrowed from the caller for the duration
/// of the call. Labels must already be in canonical order; the store
/// copies whatever it keeps.
#[derive(Debug, Clone, Copy)]
pub struct Update<'a> {
    pub kind: MetricKind,
    pub namespace: &'a str,
    pub name: &'a str,
    pub labels: &'a LabelSet,
    pub value: f64,
    pub time_millis: i64,
}

/// Maps (namespace, name) to its entry, keyed by identity hash and
/// chained on collision so the probe never allocates. Guarded by a
/// reader/writer lock; ingestion takes the read side unless it has to
/// create or replace an entry.
#[derive(Debug, Default)]
pub struct MetricStore {
    entries: RwLock<HashMap<u64, Vec<Arc<MetricEntry>>>>,
}

impl MetricStore {
    pub fn new() -> Self {
        MetricStore::default()
    }

    /// Applies one update, creating the entry and series as needed.
    /// `bounds` carries the histogram bucket layout and is ignored for
    /// other kinds.
    pub fn update(&self, update: Update<'_>, bounds: &[f64]) {
        let entry = self.lookup_entry(update.kind, update.namespace, update.name);
        let state = entry.lookup(update.labels);
        state.update(update.kind, update.value, update.time_millis, bounds);
    }

    /// Resolves the entry for an identity, creating it when absent.
    /// A kind change for a live (namespace, name) replaces the entry
    /// wholesale, dropping its previous states.
    fn lookup_entry(&self, kind: MetricKind, namespace: &str, name: &str) -> Arc<MetricEntry> {
        let key = identity_hash(namespace, name);

        {
            let entries = self.entries.read();
            if let Some(entry) = probe(&entries, key, namespace, name) {
                if entry.kind() == kind {
                    return entry;
                }
            }
        }

        let mut entries = self.entries.write();
        let chain = entries.entry(key).or_default();
        if let Some(pos) = chain
            .iter()
            .position(|e| e.namespace() == namespace && e.name() == name)
        {
            if chain[pos].kind() == kind {
                return chain[pos].clone();
            }
            let entry = Arc::new(MetricEntry::new(kind, namespace, name));
            chain[pos] = entry.clone();
            return entry;
        }
        let entry = Arc::new(MetricEntry::new(kind, namespace, name));
        chain.push(entry.clone());
        entry
    }

    /// Appends the current projection of every entry to `out`, under
    /// the store read lock. The result is unsorted; callers sort
    /// before rendering.
    pub fn collect(&self, out: &mut Vec<Sample>) {
        let entries = self.entries.read();
        for chain in entries.values() {
            for entry in chain {
                entry.collect(out);
            }
        }
    }

    /// Evicts every state not updated strictly after
    /// `threshold_millis`, removing entries left empty.
    ///
    /// The store lock is released between entries so ingestion is
    /// never blocked globally; each entry's write lock is its own
    /// linearization point. An insert racing an eviction keeps the
    /// entry alive only if it lands before the emptiness re-check.
    pub fn cleanup(&self, threshold_millis: i64) {
        let snapshot: Vec<Arc<MetricEntry>> = {
            let entries = self.entries.read();
            entries.values().flatten().cloned().collect()
        };

        for entry in snapshot {
            if !entry.cleanup(threshold_millis) {
                continue;
            }
            let mut entries = self.entries.write();
            let key = identity_hash(entry.namespace(), entry.name());
            if let Some(chain) = entries.get_mut(&key) {
                if let Some(pos) = chain.iter().position(|e| Arc::ptr_eq(e, &entry)) {
                    if entry.is_empty() {
                        chain.remove(pos);
                    }
                }
                if chain.is_empty() {
                    entries.remove(&key);
                }
            }
        }
    }

    /// Number of live entries, mainly for tests and introspection.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn identity_hash(namespace: &str, name: &str) -> u64 {
    let mut h = Xxh3::new();
    h.write(namespace.as_bytes());
    h.write(name.as_bytes());
    h.finish()
}

fn probe(
    entries: &HashMap<u64, Vec<Arc<MetricEntry>>>,
    key: u64,
    namespace: &str,
    name: &str,
) -> Option<Arc<MetricEntry>> {
    entries
        .get(&key)?
        .iter()
        .find(|e| e.namespace() == namespace && e.name() == name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(n, v)| Label::new(*n, *v))
            .collect::<Vec<_>>()
            .into()
    }

    fn update_counter(store: &MetricStore, name: &str, value: f64, time_millis: i64) {
        store.update(
            Update {
                kind: MetricKind::Counter,
                namespace: "",
                name,
                labels: &LabelSet::new(),
                value,
                time_millis,
            },
            &[],
        );
    }

    #[test]
    fn counter_updates_aggregate() {
        let store = MetricStore::new();
        update_counter(&store, "A", 1.0, 10);
        update_counter(&store, "A", 2.0, 20);

        let mut out = Vec::new();
        store.collect(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value, 3.0);
        assert_eq!(out[0].time_millis, 20);
    }

    #[test]
    fn kind_change_replaces_entry() {
        let store = MetricStore::new();
        update_counter(&store, "A", 5.0, 10);
        store.update(
            Update {
                kind: MetricKind::Gauge,
                namespace: "",
                name: "A",
                labels: &LabelSet::new(),
                value: 7.0,
                time_millis: 20,
            },
            &[],
        );

        let mut out = Vec::new();
        store.collect(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, MetricKind::Gauge);
        assert_eq!(out[0].value, 7.0);
    }

    #[test]
    fn distinct_namespaces_are_distinct_entries() {
        let store = MetricStore::new();
        store.update(
            Update {
                kind: MetricKind::Counter,
                namespace: "x_",
                name: "A",
                labels: &LabelSet::new(),
                value: 1.0,
                time_millis: 10,
            },
            &[],
        );
        update_counter(&store, "A", 1.0, 10);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn cleanup_removes_emptied_entries() {
        let store = MetricStore::new();
        update_counter(&store, "old", 1.0, 100);
        update_counter(&store, "new", 1.0, 2_000);

        store.cleanup(1_000);
        assert_eq!(store.len(), 1);

        let mut out = Vec::new();
        store.collect(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "new");
    }

    #[test]
    fn labels_are_copied_not_aliased() {
        let store = MetricStore::new();
        let mut caller = labels(&[("id", "123")]);
        store.update(
            Update {
                kind: MetricKind::Counter,
                namespace: "",
                name: "A",
                labels: &caller,
                value: 1.0,
                time_millis: 10,
            },
            &[],
        );

        // The caller may reuse its buffer after the call returns.
        caller.clear();
        caller.push(Label::new("poisoned", "x"));

        let mut out = Vec::new();
        store.collect(&mut out);
        assert_eq!(out[0].labels, labels(&[("id", "123")]));
    }
}
