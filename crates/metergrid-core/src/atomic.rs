//! Atomic numeric cells.
//!
//! Each cell occupies a single machine word and is mutated only
//! through atomic primitives, so the ingestion hot path never takes a
//! lock to bump a value. Plain counters use `AtomicU64` directly; the
//! two cells below cover the f64 accumulator and the last-update
//! timestamp.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A 64-bit float cell backed by the IEEE-754 bit pattern in an
/// `AtomicU64`.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        AtomicF64(AtomicU64::new(v.to_bits()))
    }

    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Adds `v` with a compare-exchange loop: read bits, add as float,
    /// write bits back, retry on loss.
    pub fn add(&self, v: f64) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + v).to_bits();
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// A wall-clock instant stored as signed milliseconds since the Unix
/// epoch, UTC. The millisecond encoding keeps loads and stores single
/// 64-bit atomic operations.
#[derive(Debug, Default)]
pub struct AtomicTime(AtomicI64);

impl AtomicTime {
    pub fn new(millis: i64) -> Self {
        AtomicTime(AtomicI64::new(millis))
    }

    pub fn store_millis(&self, millis: i64) {
        self.0.store(millis, Ordering::Relaxed);
    }

    pub fn load_millis(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn load(&self) -> SystemTime {
        millis_to_time(self.load_millis())
    }
}

/// Converts a `SystemTime` to whole milliseconds since the epoch.
pub fn time_to_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Converts milliseconds since the epoch back to a UTC instant.
pub fn millis_to_time(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}
