//! Driver-creation strategies and the per-worker sweep loop.
//!
//! The pool never spawns threads itself; it hands each [`WorkerDriver`] to a
//! pluggable strategy that chooses platform parameters (thread name, stack
//! size, core affinity) and arranges for a running thread to call
//! [`WorkerDriver::run`]. The portable default is an ordinary named
//! background thread with no placement.

use std::io;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use crossbeam_utils::sync::Parker;
use tracing::debug;

use super::affinity;
use crate::node::Node;

/// Strategy invoked once per worker at pool start, with the worker's
/// zero-based index. Must result in a running thread that calls
/// [`WorkerDriver::run`] (or drives `sweep_once` by hand in tests).
pub type DriverCreate = Box<dyn Fn(WorkerDriver, u16) -> io::Result<()> + Send + Sync>;

/// One pool execution unit: the assignment set and pacing state that a
/// worker thread drives.
///
/// Holds only `Weak` references to its nodes - the sweep right, never
/// ownership. A node whose owner has repelled it simply stops upgrading and
/// is dropped from the set.
pub struct WorkerDriver {
    index: u16,
    interval: Duration,
    inbox: Arc<SegQueue<Weak<Node>>>,
    parker: Parker,
    assigned: Vec<Weak<Node>>,
}

impl WorkerDriver {
    pub(crate) fn new(
        index: u16,
        interval: Duration,
        inbox: Arc<SegQueue<Weak<Node>>>,
        parker: Parker,
    ) -> Self {
        Self {
            index,
            interval,
            inbox,
            parker,
            assigned: Vec::new(),
        }
    }

    /// Zero-based worker index within the pool.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Fixed pacing interval between successive sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.interval
    }

    /// Nodes currently in the assignment set (after the last sweep).
    pub fn assigned_len(&self) -> usize {
        self.assigned.len()
    }

    /// One sweep pass over the assignment set.
    ///
    /// Drains newly assigned nodes from the inbox, then advances every node
    /// whose owner still holds it - cooperatively, within the calling
    /// thread. Entries whose owner has repelled the node are dropped.
    ///
    /// While a sweep holds an upgraded `Arc`, the node cannot be destroyed;
    /// combined with the terminal-outcome rule this is what keeps `repel`
    /// race-free.
    pub fn sweep_once(&mut self) {
        while let Some(handle) = self.inbox.pop() {
            self.assigned.push(handle);
        }
        self.assigned.retain(|handle| match handle.upgrade() {
            Some(node) => {
                node.sweep();
                true
            }
            None => false,
        });
    }

    /// The worker sweep loop: sweep, then park for the fixed interval
    /// (woken early when a new node is assigned). Runs for the life of the
    /// process; no pool shutdown is modeled.
    pub fn run(mut self) -> ! {
        debug!(worker = self.index, "pool worker entering sweep loop");
        loop {
            self.sweep_once();
            self.parker.park_timeout(self.interval);
        }
    }
}

/// Portable default strategy: a named background thread, no placement.
pub fn default_driver_create(driver: WorkerDriver, index: u16) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("pool-worker-{index}"))
        .spawn(move || driver.run())?;
    Ok(())
}

/// Strategy for CPU-bound subtrees: named thread with an explicit stack
/// size, pinned to processing core `index` where the platform allows.
pub fn pinned_driver_create(stack_size: usize) -> DriverCreate {
    Box::new(move |driver, index| {
        thread::Builder::new()
            .name(format!("pool-worker-{index}"))
            .stack_size(stack_size)
            .spawn(move || {
                affinity::try_pin_to_core(usize::from(index));
                driver.run()
            })?;
        Ok(())
    })
}
