//! metergrid-core — concurrent metric store and exposition engine.
//!
//! Aggregates a live stream of observation events (counters, gauges,
//! histogram samples) in memory under a (namespace, name, labels)
//! identity and projects the aggregate state into the Prometheus
//! text exposition format v0.0.4.
//!
//! # Architecture
//!
//! ```text
//! MetricStore
//!   ├── update() ← one call per observation, any thread
//!   │     └── MetricEntry (per namespace+name, RwLock'd state index)
//!   │           └── MetricState (per label set, atomic cells)
//!   ├── collect() → Vec<Sample> snapshot
//!   └── cleanup() → evicts series idle past a threshold
//!
//! render
//!   └── write_exposition() → text/plain; version=0.0.4
//! ```
//!
//! The ingestion path takes brief read locks only; writer locks are
//! held for structural changes (new entry, new series, histogram
//! reshape). Per-series aggregation is done with atomics, so distinct
//! series never contend and same-series updates are lock-free.

pub mod atomic;
pub mod entry;
pub mod label;
pub mod observe;
pub mod render;
pub mod state;
pub mod store;

pub use atomic::{AtomicF64, AtomicTime};
pub use label::{Label, LabelSet};
pub use observe::{MetricKind, Observation, Recorder};
pub use render::{fmt_float, sort_samples, write_exposition};
pub use store::{MetricStore, Sample, Update};
