//! Cooperative process-tree scheduler with optional thread-pool offload.
//!
//! ## Scope
//! Applications compose small state-machine processes (sensor drivers,
//! indicators, watchdogs, bounded compute jobs) into a single ownership
//! tree. One cooperative loop sweeps the tree; CPU-bound subtrees can be
//! handed to dedicated, optionally core-pinned worker threads without
//! changing their own logic.
//!
//! ## Key invariants
//! - A node's advance step is one bounded, non-blocking slice of work; a
//!   violation starves every sibling sharing the same driver.
//! - Each node is advanced by exactly one driver at a time: its owning
//!   parent's sweep, or the single pool worker it was assigned to.
//! - Outcomes are tri-state and monotonic: `Pending` until done, then
//!   `Success` or `Error`, terminal forever.
//! - Failures stay contained: a body that returns `Error` or panics settles
//!   its own node and nothing else; sibling sweeps and driver threads keep
//!   running.
//! - Ownership never moves: a pool worker receives only a weak sweep right;
//!   detach-and-destroy (`repel`) stays with the owner and is legal only
//!   after a terminal outcome, so destruction cannot race an in-flight step.
//!
//! ## Control flow
//! ```
//! use std::time::Duration;
//! use proctree::{demo::BoundedCompute, DriverMode, Node, Outcome, PoolConfig,
//!                Process, StepCtx, WorkerPool};
//!
//! struct Root;
//! impl Process for Root {
//!     fn name(&self) -> &'static str { "Root" }
//!     fn advance(&mut self, _ctx: &mut StepCtx<'_>) -> Outcome { Outcome::Pending }
//! }
//!
//! let root = Node::new(Root);
//! let (pool_node, pool) = WorkerPool::create(PoolConfig::new(2)).unwrap();
//! root.start(pool_node, DriverMode::ByParent).unwrap();
//!
//! let job = BoundedCompute::create(Duration::from_millis(100), 40).unwrap();
//! root.start(job.clone(), DriverMode::ByExternalDriver).unwrap();
//!
//! root.sweep();            // first sweep spins up the pool workers
//! pool.add(&job).unwrap(); // job is now driven by exactly one worker
//!
//! // outer loop: sweep the tree, observe the job, repel it when terminal
//! root.sweep();
//! if job.outcome().is_terminal() {
//!     root.repel(&job).unwrap();
//! }
//! ```
//!
//! ## Module map
//! - [`node`]: the `Process` trait, tree cells, attach/sweep/repel
//! - [`outcome`]: tri-state outcome and its atomic latch
//! - [`pool`]: worker pool node, handoff handle, driver strategies, affinity
//! - [`diag`]: bounded diagnostics buffers and tree dumps
//! - [`command`]: named-command boundary for an external console
//! - [`signal`]: cross-thread request flags
//! - [`demo`]: illustrative bounded-compute leaf

pub mod command;
pub mod demo;
pub mod diag;
pub mod node;
pub mod outcome;
pub mod pool;
pub mod signal;

mod states;

pub use command::{Command, CommandError, CommandHandler, CommandRegistry};
pub use diag::{render_tree, DiagBuf};
pub use node::{DriverMode, Node, Process, StepCtx, TreeError};
pub use outcome::{Outcome, OutcomeCell};
pub use pool::{
    default_driver_create, pinned_driver_create, DriverCreate, PoolConfig, PoolError, PoolHandle,
    WorkerDriver, WorkerPool,
};
pub use signal::{RequestFlag, SharedValue};
