//! Illustrative bounded-compute leaf.
//!
//! Example client of the core, not part of it: a CPU-bound job that performs
//! one bounded arithmetic slice per advance call, succeeds once its
//! iteration budget is reached, and fails if its time limit elapses first.
//! Docs and tests use it as the canonical pool-driven workload; real
//! applications supply their own [`Process`] implementations.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::diag::DiagBuf;
use crate::node::{Node, Process, StepCtx};
use crate::outcome::Outcome;

crate::state_table! {
    enum ComputeState {
        Calc => "Calc",
        Done => "Done",
    }
}

/// Bounded compute job: `iters_max` work slices within `time_limit`.
pub struct BoundedCompute {
    state: ComputeState,
    time_limit: Duration,
    iters_max: u32,
    iters_done: u32,
    started: Option<Instant>,
    acc: u64,
}

impl BoundedCompute {
    /// Fallible factory.
    ///
    /// Returns `None` for a zero iteration budget - no partially constructed
    /// node ever reaches a tree.
    pub fn create(time_limit: Duration, iters_max: u32) -> Option<Arc<Node>> {
        if iters_max == 0 {
            return None;
        }
        Some(Node::new(Self {
            state: ComputeState::Calc,
            time_limit,
            iters_max,
            iters_done: 0,
            started: None,
            acc: 0x9e37_79b9_7f4a_7c15,
        }))
    }
}

impl Process for BoundedCompute {
    fn name(&self) -> &'static str {
        "BoundedCompute"
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome {
        let started = *self.started.get_or_insert_with(Instant::now);

        // One bounded slice per call.
        self.acc = self.acc.rotate_left(7) ^ self.acc.wrapping_mul(0x0100_0000_01b3);
        self.iters_done += 1;

        // Iteration budget reached wins over the deadline; the deadline only
        // fails a job that still has slices left.
        if self.iters_done >= self.iters_max {
            self.state = ComputeState::Done;
            return Outcome::Success;
        }
        if started.elapsed() >= self.time_limit {
            self.state = ComputeState::Done;
            return Outcome::Error;
        }
        Outcome::Pending
    }

    fn render_diagnostics(&self, out: &mut DiagBuf) {
        let _ = writeln!(out, "iterations\t{}/{}", self.iters_done, self.iters_max);
    }
}
