//! The per-thread context: warnings, locks and the shared store.

use crate::store::Store;
use crate::sync::LockSet;
use std::sync::{Arc, Mutex};

/// Deduplicating warning sink.
///
/// Identical consecutive messages are counted and flushed as a single line
/// with a repeat count, either on demand or when the context is dropped.
#[derive(Debug, Default)]
pub struct Warnings {
    state: Mutex<WarnState>,
}

#[derive(Debug, Default)]
struct WarnState {
    last: String,
    count: u32,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a warning. Repeats of the previous message only bump a count.
    pub fn warn(&self, message: &str) {
        let mut state = self.state.lock().unwrap();

        if state.count > 0 && state.last == message {
            state.count += 1;
            return;
        }

        flush_state(&mut state);
        state.last = message.to_string();
        state.count = 1;
    }

    /// Flush any pending message through the `log` facade.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        flush_state(&mut state);
    }
}

fn flush_state(state: &mut WarnState) {
    match state.count {
        0 => {}
        1 => log::warn!("{}", state.last),
        n => log::warn!("{} (x{n})", state.last),
    }

    state.count = 0;
    state.last.clear();
}

impl Drop for Warnings {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            flush_state(&mut state);
        }
    }
}

/// The engine context.
///
/// A context bundles the warning sink, the named lock set and the interned
/// store. Plain [`Clone`] shares everything; [`Context::clone_for_thread`]
/// produces a context for another thread that shares the store and locks
/// but collects warnings separately.
#[derive(Clone)]
pub struct Context {
    warnings: Arc<Warnings>,
    locks: Arc<LockSet>,
    store: Arc<Store>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            warnings: Arc::new(Warnings::new()),
            locks: Arc::new(LockSet::new()),
            store: Arc::new(Store::new(Store::DEFAULT_BUDGET)),
        }
    }

    /// A context for another worker thread: shared store and locks, its own
    /// warning aggregation.
    pub fn clone_for_thread(&self) -> Self {
        Self {
            warnings: Arc::new(Warnings::new()),
            locks: self.locks.clone(),
            store: self.store.clone(),
        }
    }

    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    pub fn locks(&self) -> &LockSet {
        &self.locks
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Shorthand for reporting a deduplicated warning.
    pub fn warn(&self, message: &str) {
        self.warnings.warn(message);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
