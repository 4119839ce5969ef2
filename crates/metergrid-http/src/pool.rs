//! Thread-local scratch pool for ingestion label buffers.
//!
//! Every record call needs a short-lived label vector to sort and
//! hash the event's tags before the store copies what it keeps. At
//! high event rates a fresh allocation per call dominates, so each
//! thread keeps a small free list of cleared buffers.

use std::cell::RefCell;

use metergrid_core::LabelSet;

const MAX_POOLED: usize = 16;

thread_local! {
    static SCRATCH: RefCell<Vec<LabelSet>> = RefCell::new(Vec::new());
}

/// Runs `f` with a cleared scratch label set, returning the buffer to
/// this thread's free list afterwards.
pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut LabelSet) -> R) -> R {
    let mut buf = SCRATCH
        .with(|pool| pool.borrow_mut().pop())
        .unwrap_or_default();

    let out = f(&mut buf);

    buf.clear();
    SCRATCH.with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < MAX_POOLED {
            pool.push(buf);
        }
    });
    out
}
