//! Tri-state completion outcome and its cross-thread latch.
//!
//! # Model
//!
//! Every node reports exactly one of three outcomes:
//!
//! - `Pending` - the node has more work to do
//! - `Success` - the node finished and its result is usable
//! - `Error`   - the node finished and failed
//!
//! # Correctness Invariants
//!
//! - **Monotonic**: once an outcome leaves `Pending` it never returns to
//!   `Pending` and never changes between `Success` and `Error`. The latch
//!   enforces this with a single compare-exchange.
//! - **Promptly visible**: the outcome is written by whichever thread drives
//!   the node and read by the owner's thread. Acquire/release ordering makes
//!   a terminal outcome visible to the owner before it acts on it.
//!
//! The terminal latch is what makes detach-and-destroy safe: a driver only
//! advances a node whose outcome is still `Pending`, so once the owner
//! observes a terminal value the node's advance step will never run again.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Tri-state completion outcome of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Outcome {
    /// Not finished; the node expects further advance calls.
    Pending = 0,
    /// Finished successfully. Terminal.
    Success = 1,
    /// Finished with a failure. Terminal.
    Error = 2,
}

impl Outcome {
    /// Returns true while the node still has work to do.
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, Outcome::Pending)
    }

    /// Returns true once the outcome is `Success` or `Error`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Pending => "pending",
            Outcome::Success => "success",
            Outcome::Error => "error",
        };
        f.write_str(s)
    }
}

/// Atomic, monotonic outcome latch.
///
/// Written by the single driver currently advancing the node, read by the
/// owner's thread. `settle` only succeeds from `Pending`; any later attempt
/// is ignored and reported via the return value, so the first terminal value
/// always wins.
#[derive(Debug)]
pub struct OutcomeCell {
    state: AtomicU8,
}

impl OutcomeCell {
    /// New latch in the `Pending` state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(Outcome::Pending as u8),
        }
    }

    /// Reads the current outcome without advancing the node.
    #[inline]
    pub fn get(&self) -> Outcome {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Latches a terminal outcome.
    ///
    /// Returns `true` if this call performed the `Pending` -> terminal
    /// transition. Returns `false` if the cell was already terminal (the
    /// stored value is unchanged) or if `outcome` is `Pending`, which is a
    /// caller bug: a latch can never move back to `Pending`.
    pub fn settle(&self, outcome: Outcome) -> bool {
        if outcome.is_pending() {
            debug_assert!(false, "settle called with Pending");
            return false;
        }
        self.state
            .compare_exchange(
                Outcome::Pending as u8,
                outcome as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for OutcomeCell {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn decode(raw: u8) -> Outcome {
    match raw {
        0 => Outcome::Pending,
        1 => Outcome::Success,
        2 => Outcome::Error,
        _ => unreachable!("invalid outcome encoding"),
    }
}
