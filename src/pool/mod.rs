//! Fixed-size worker pool that drives opted-out subtrees on dedicated
//! threads.
//!
//! # Architecture
//!
//! ```text
//!   owner thread                          worker threads
//!   ────────────                          ──────────────
//!   start(node, ByExternalDriver)   ┌──► worker 0: inbox ── assigned set
//!   handle.add(node) ── round robin ┤        sweep / park(interval) loop
//!                                   └──► worker 1: inbox ── assigned set
//!   poll outcome(), then repel()             sweep / park(interval) loop
//! ```
//!
//! The pool itself is an ordinary tree node: its owner attaches it with
//! `start` and sweeps it like anything else. Its state machine is
//! `Start -> Main`: `Start` spawns every worker exactly once via the
//! injected driver-creation strategy, `Main` is a cheap no-op that keeps the
//! pool in the ownership tree.
//!
//! # Handoff protocol
//!
//! 1. Owner attaches the node with `ByExternalDriver` - attached, but in
//!    nobody's sweep set.
//! 2. Owner calls [`PoolHandle::add`] - the node joins exactly one worker's
//!    assignment set (round-robin) and is swept at the fixed interval from
//!    that worker's next iteration.
//! 3. Owner polls `outcome()` inside its own cooperative sweep and calls
//!    `repel` once it is terminal.
//!
//! Between steps 1 and 2 nobody advances the node. After step 2 exactly the
//! assigned worker does; the worker set never changes. The owner never calls
//! the node's advance step directly.

pub mod affinity;
mod driver;

pub use driver::{default_driver_create, pinned_driver_create, DriverCreate, WorkerDriver};

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use crossbeam_utils::sync::{Parker, Unparker};
use tracing::{debug, warn};

use crate::diag::DiagBuf;
use crate::node::{DriverMode, Node, Process, StepCtx};
use crate::outcome::Outcome;

// ============================================================================
// Configuration
// ============================================================================

/// Pool configuration, fixed before the pool node is started.
///
/// Worker count and strategy cannot change while the pool runs; taking them
/// at construction makes that unrepresentable.
pub struct PoolConfig {
    /// Number of workers, each bound to one OS thread.
    pub workers: u16,
    /// Fixed pacing interval between a worker's successive sweeps.
    pub sweep_interval: Duration,
    /// Driver-creation strategy; `None` uses [`default_driver_create`].
    pub strategy: Option<DriverCreate>,
}

impl PoolConfig {
    /// Reference configuration: a few milliseconds between sweeps, portable
    /// thread placement.
    pub fn new(workers: u16) -> Self {
        Self {
            workers,
            sweep_interval: Duration::from_millis(2),
            strategy: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Handoff contract violations reported by [`PoolHandle::add`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The node was attached with `ByParent`; its owner already drives it.
    NotExternallyDriven(&'static str),
    /// The node has no owner yet; `start` must precede `add`.
    NotAttached(&'static str),
    /// The node is already in a worker's assignment set.
    AlreadyAssigned(&'static str),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotExternallyDriven(name) => {
                write!(f, "node `{name}` is not marked ByExternalDriver")
            }
            PoolError::NotAttached(name) => {
                write!(f, "node `{name}` must be attached to an owner before add")
            }
            PoolError::AlreadyAssigned(name) => {
                write!(f, "node `{name}` is already assigned to a worker")
            }
        }
    }
}

impl std::error::Error for PoolError {}

// ============================================================================
// Shared pool state
// ============================================================================

struct WorkerShared {
    inbox: Arc<SegQueue<Weak<Node>>>,
    unparker: Unparker,
}

struct PoolShared {
    workers: Vec<WorkerShared>,
    /// Round-robin cursor for `add`.
    next: AtomicUsize,
}

/// Cloneable handle for handing nodes to the pool.
///
/// Valid from pool creation on; nodes added before the pool node's first
/// sweep wait in the worker inbox until the worker thread starts.
pub struct PoolHandle {
    shared: Arc<PoolShared>,
}

impl Clone for PoolHandle {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PoolHandle {
    /// Assigns an attached, externally driven node to one worker.
    ///
    /// The worker is chosen round-robin and never changes for this node; the
    /// worker receives only a `Weak` sweep right, ownership stays with the
    /// attaching owner. Returns the chosen worker index.
    ///
    /// # Errors
    ///
    /// See [`PoolError`]; on any error the node joins no worker.
    pub fn add(&self, node: &Arc<Node>) -> Result<u16, PoolError> {
        if !node.is_attached() {
            return Err(PoolError::NotAttached(node.name()));
        }
        if node.mode() != DriverMode::ByExternalDriver {
            return Err(PoolError::NotExternallyDriven(node.name()));
        }
        if !node.mark_pool_assigned() {
            return Err(PoolError::AlreadyAssigned(node.name()));
        }

        let count = self.shared.workers.len();
        let index = self.shared.next.fetch_add(1, Ordering::Relaxed) % count;
        let worker = &self.shared.workers[index];
        worker.inbox.push(Arc::downgrade(node));
        worker.unparker.unpark();

        debug!(node = node.name(), worker = index, "node assigned to pool worker");
        Ok(index as u16)
    }

    /// Number of workers this pool was configured with.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }
}

// ============================================================================
// Pool node
// ============================================================================

crate::state_table! {
    enum PoolState {
        Start => "Start",
        Main => "Main",
    }
}

/// The pool node body.
///
/// Participates in the ownership tree like any other node; its first advance
/// performs the one-shot worker creation, after which it idles in `Main`
/// with a `Pending` outcome for the life of the process.
pub struct WorkerPool {
    state: PoolState,
    strategy: Option<DriverCreate>,
    shared: Arc<PoolShared>,
    /// One slot per worker, consumed by the `Start` step.
    drivers: Vec<Option<WorkerDriver>>,
}

impl WorkerPool {
    /// Builds the pool node and its handoff handle.
    ///
    /// Returns `None` for an unusable configuration (zero workers or a zero
    /// sweep interval) instead of a partially constructed pool.
    pub fn create(cfg: PoolConfig) -> Option<(Arc<Node>, PoolHandle)> {
        if cfg.workers == 0 || cfg.sweep_interval.is_zero() {
            return None;
        }

        let worker_count = usize::from(cfg.workers);
        let mut workers = Vec::with_capacity(worker_count);
        let mut drivers = Vec::with_capacity(worker_count);
        for index in 0..cfg.workers {
            let parker = Parker::new();
            let unparker = parker.unparker().clone();
            let inbox = Arc::new(SegQueue::new());
            workers.push(WorkerShared {
                inbox: Arc::clone(&inbox),
                unparker,
            });
            drivers.push(Some(WorkerDriver::new(
                index,
                cfg.sweep_interval,
                inbox,
                parker,
            )));
        }

        let shared = Arc::new(PoolShared {
            workers,
            next: AtomicUsize::new(0),
        });
        let pool = WorkerPool {
            state: PoolState::Start,
            strategy: cfg.strategy,
            shared: Arc::clone(&shared),
            drivers,
        };
        Some((Node::new(pool), PoolHandle { shared }))
    }

    fn spawn_workers(&mut self) -> Result<(), std::io::Error> {
        for (index, slot) in self.drivers.iter_mut().enumerate() {
            let Some(driver) = slot.take() else { continue };
            let index = index as u16;
            match &self.strategy {
                Some(create) => create(driver, index)?,
                None => default_driver_create(driver, index)?,
            }
        }
        Ok(())
    }
}

impl Process for WorkerPool {
    fn name(&self) -> &'static str {
        "WorkerPool"
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome {
        match self.state {
            PoolState::Start => {
                if let Err(err) = self.spawn_workers() {
                    warn!(%err, "could not create pool worker");
                    return Outcome::Error;
                }
                debug!(workers = self.shared.workers.len(), "pool workers created");
                self.state = PoolState::Main;
                Outcome::Pending
            }
            // Steady state: nothing to do, stays cheap to poll.
            PoolState::Main => Outcome::Pending,
        }
    }

    fn render_diagnostics(&self, out: &mut DiagBuf) {
        let _ = writeln!(out, "workers\t{}", self.shared.workers.len());
    }
}
