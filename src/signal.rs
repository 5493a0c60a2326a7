//! Cross-thread request signals.
//!
//! Command handlers run on the console collaborator's thread while the main
//! sweep runs elsewhere. Requests cross that boundary as single-writer,
//! atomically readable signals - never as plain shared booleans, so updates
//! are neither lost nor torn.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One-shot request flag: raised by a producer, consumed by the sweep thread.
#[derive(Debug, Default)]
pub struct RequestFlag(AtomicBool);

impl RequestFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raises the request. Idempotent until taken.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consumes the request; returns `true` at most once per raise.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Peeks without consuming.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Atomically readable parameter accompanying a request (for example a
/// requested subtree count supplied by a command handler).
#[derive(Debug, Default)]
pub struct SharedValue(AtomicU32);

impl SharedValue {
    pub const fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}
