//! Observing and cancelling long-running work.

use std::sync::atomic::{AtomicI32, Ordering};

/// A small record through which a caller can watch and abort a page run.
///
/// `abort` may be written from any thread without locking; the interpreter
/// polls it after each top-level content operator, after each glyph, and
/// after each batch of shading triangles. Cancellation is best-effort with
/// no upper bound on delay, and unwinds scopes cleanly.
#[derive(Debug)]
pub struct Cookie {
    abort: AtomicI32,
    progress: AtomicI32,
    progress_max: AtomicI32,
}

impl Cookie {
    pub fn new() -> Self {
        Self {
            abort: AtomicI32::new(0),
            progress: AtomicI32::new(0),
            // -1 means the bound is unknown.
            progress_max: AtomicI32::new(-1),
        }
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.abort.store(1, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed) != 0
    }

    pub fn progress(&self) -> i32 {
        self.progress.load(Ordering::Relaxed)
    }

    /// The progress bound, `-1` when unknown.
    pub fn progress_max(&self) -> i32 {
        self.progress_max.load(Ordering::Relaxed)
    }

    pub(crate) fn tick(&self) {
        self.progress.fetch_add(1, Ordering::Relaxed);
    }

    /// Declare the progress bound; `-1` means unknown.
    pub fn set_progress_max(&self, max: i32) {
        self.progress_max.store(max, Ordering::Relaxed);
    }
}

impl Default for Cookie {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_flag_roundtrip() {
        let cookie = Cookie::new();
        assert!(!cookie.is_aborted());
        cookie.abort();
        assert!(cookie.is_aborted());
    }

    #[test]
    fn unknown_bound_is_minus_one() {
        assert_eq!(Cookie::new().progress_max(), -1);
    }
}
