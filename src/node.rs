//! Process-tree node: ownership, driver mode, and the cooperative sweep.
//!
//! # Architecture
//!
//! ```text
//!                 root (swept by the application's outer loop)
//!                  │
//!         ┌────────┼─────────────────┐
//!         ▼        ▼                 ▼
//!      indicator  watchdog        WorkerPool
//!      ByParent   ByParent         ByParent
//!                                    │ owns, but does NOT sweep
//!                                    ▼
//!                               compute job
//!                            ByExternalDriver ◄── swept by one pool worker
//! ```
//!
//! A [`Node`] owns one boxed [`Process`] body plus an insertion-ordered list
//! of child nodes. `sweep()` advances the body once, then recursively sweeps
//! every `ByParent` child, depth-first in insertion order. Children attached
//! with `ByExternalDriver` are owned resources only: the parent never
//! advances them, a pool worker does.
//!
//! # Correctness Invariants
//!
//! - **Single driver**: at any instant at most one driver (the owning
//!   parent's sweep or one pool worker) advances a node. The body mutex is
//!   uncontended under this contract; `sweep` treats contention as a defect.
//! - **Terminal means done**: once the latched outcome is terminal, `sweep`
//!   returns without touching the body. This is the only signal that makes
//!   `repel` safe - the body cannot be mid-advance when the owner destroys it.
//! - **Owner-only structure changes**: a node's child list is mutated only
//!   from the thread driving that node (attach and detach happen inside or
//!   between that driver's sweeps).
//! - **Failure containment**: a body panic is caught by `sweep` and settles
//!   the node's outcome to `Error`. The driver thread survives, so sibling
//!   nodes sharing that driver keep advancing and the owner can still
//!   observe the failure and `repel` the node.
//!
//! # Lifecycle
//!
//! create (fallible factory) -> `start` (attach) -> swept repeatedly ->
//! terminal outcome -> `repel` (detach and destroy). Detaching a node whose
//! outcome is still `Pending` is rejected.

use std::fmt::{self, Write as _};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use tracing::warn;

use crate::diag::DiagBuf;
use crate::outcome::{Outcome, OutcomeCell};

// ============================================================================
// Process trait
// ============================================================================

/// Behavior of one node variant.
///
/// One level of implementation over the capability set
/// `{advance, state_name, render_diagnostics}`; no deeper hierarchy exists
/// or is needed.
///
/// # Contract for `advance`
///
/// - Must return within a small, bounded time budget: one slice of work.
/// - Must never block on I/O or sleep. A violation starves every sibling
///   sharing the same driver.
/// - Must be safe to call repeatedly; a node that has to stop after a bound
///   (time or iteration count) checks that bound itself and returns a
///   terminal outcome. The scheduler never interrupts a step.
///
/// The returned outcome is latched by the owning [`Node`]; after the first
/// terminal return the body is never advanced again.
pub trait Process: Send {
    /// Diagnostic name of this node variant.
    fn name(&self) -> &'static str;

    /// One bounded unit of work.
    fn advance(&mut self, ctx: &mut StepCtx<'_>) -> Outcome;

    /// Display name of the variant's current internal state, for tracing.
    ///
    /// Variants with a named-state table (see [`state_table!`]) return the
    /// table entry; stateless leaves keep the default.
    ///
    /// [`state_table!`]: crate::state_table
    fn state_name(&self) -> &'static str {
        ""
    }

    /// Appends a bounded line (or few) of status text for tree dumps.
    ///
    /// Must not mutate the node. Output beyond the buffer capacity is
    /// truncated, never overrun.
    fn render_diagnostics(&self, out: &mut DiagBuf) {
        let _ = out;
    }
}

// ============================================================================
// Driver mode
// ============================================================================

/// Who advances a node. Fixed at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverMode {
    /// Advanced by the owning parent's recursive sweep.
    ByParent = 0,
    /// Skipped by the parent's sweep; advanced by exactly one pool worker
    /// once handed over via [`PoolHandle::add`].
    ///
    /// [`PoolHandle::add`]: crate::pool::PoolHandle::add
    ByExternalDriver = 1,
}

// ============================================================================
// Errors
// ============================================================================

/// Tree structure contract violations.
///
/// These are caller defects, not runtime conditions; the tree refuses the
/// operation and leaves its structure unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// `start` was called with a child that already has an owner.
    AlreadyAttached(&'static str),
    /// `repel` was called while the child's outcome is still `Pending`.
    RepelPending(&'static str),
    /// `repel` was called with a node that is not a child of this owner.
    NotAChild(&'static str),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::AlreadyAttached(name) => {
                write!(f, "node `{name}` is already attached to an owner")
            }
            TreeError::RepelPending(name) => {
                write!(f, "node `{name}` is still pending and cannot be repelled")
            }
            TreeError::NotAChild(name) => {
                write!(f, "node `{name}` is not a child of this owner")
            }
        }
    }
}

impl std::error::Error for TreeError {}

// ============================================================================
// Node
// ============================================================================

/// One cell of the process tree.
///
/// The owner holds the only strong reference to each child (`Arc<Node>` in
/// its child list plus whatever handle the owner keeps for itself). A pool
/// worker driving the node holds only a `Weak<Node>`: a usage right to
/// sweep, never ownership. Dropping the last strong reference after `repel`
/// destroys the subtree.
pub struct Node {
    name: &'static str,
    body: Mutex<Box<dyn Process>>,
    outcome: OutcomeCell,
    /// `DriverMode` as u8; written once at attach, read by sweeps.
    mode: AtomicU8,
    attached: AtomicBool,
    /// Set by the pool on `add`; a node joins at most one worker, ever.
    pool_assigned: AtomicBool,
    in_dump: AtomicBool,
    children: Mutex<Vec<Arc<Node>>>,
}

impl Node {
    /// Wraps a process body into a tree cell.
    ///
    /// Leaf factories stay fallible (`create(..) -> Option<Arc<Node>>`) and
    /// return `None` instead of a partially constructed instance; this
    /// constructor is the infallible tail of such a factory.
    pub fn new<P: Process + 'static>(body: P) -> Arc<Self> {
        Arc::new(Self {
            name: body.name(),
            body: Mutex::new(Box::new(body)),
            outcome: OutcomeCell::new(),
            mode: AtomicU8::new(DriverMode::ByParent as u8),
            attached: AtomicBool::new(false),
            pool_assigned: AtomicBool::new(false),
            in_dump: AtomicBool::new(true),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Diagnostic name, fixed at creation.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current tri-state outcome, without advancing the node.
    #[inline]
    pub fn outcome(&self) -> Outcome {
        self.outcome.get()
    }

    /// Driver mode as set at attach time (`ByParent` before any attach).
    pub fn mode(&self) -> DriverMode {
        if self.mode.load(Ordering::Acquire) == DriverMode::ByExternalDriver as u8 {
            DriverMode::ByExternalDriver
        } else {
            DriverMode::ByParent
        }
    }

    /// Whether the node currently has an owner.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Controls inclusion in tree dumps (default: included). Hiding a node
    /// hides its subtree.
    pub fn set_dump_visible(&self, visible: bool) {
        self.in_dump.store(visible, Ordering::Release);
    }

    pub(crate) fn dump_visible(&self) -> bool {
        self.in_dump.load(Ordering::Acquire)
    }

    /// Claims the node for a pool worker. Returns `true` exactly once.
    pub(crate) fn mark_pool_assigned(&self) -> bool {
        !self.pool_assigned.swap(true, Ordering::AcqRel)
    }

    /// Number of currently attached children.
    pub fn child_count(&self) -> usize {
        self.children.lock().expect("child list mutex poisoned").len()
    }

    fn child_at(&self, index: usize) -> Option<Arc<Node>> {
        self.children
            .lock()
            .expect("child list mutex poisoned")
            .get(index)
            .cloned()
    }

    pub(crate) fn for_each_child(&self, mut f: impl FnMut(&Arc<Node>)) {
        let mut index = 0;
        while let Some(child) = self.child_at(index) {
            f(&child);
            index += 1;
        }
    }

    // ------------------------------------------------------------------
    // Attach / detach
    // ------------------------------------------------------------------

    /// Attaches `child` to this owner's child sequence and fixes its driver
    /// mode.
    ///
    /// With `ByExternalDriver` the child is excluded from this owner's sweep
    /// from this point on; it is driven by nobody until handed to a pool
    /// worker.
    ///
    /// # Errors
    ///
    /// [`TreeError::AlreadyAttached`] if the child already has an owner. A
    /// child has exactly one owner for its lifetime.
    pub fn start(&self, child: Arc<Node>, mode: DriverMode) -> Result<(), TreeError> {
        debug_assert!(
            !std::ptr::eq(self, Arc::as_ptr(&child)),
            "a node cannot own itself"
        );
        if child.attached.swap(true, Ordering::AcqRel) {
            return Err(TreeError::AlreadyAttached(child.name));
        }
        child.mode.store(mode as u8, Ordering::Release);
        self.children
            .lock()
            .expect("child list mutex poisoned")
            .push(child);
        Ok(())
    }

    /// Detaches a finished child; dropping the owner's reference destroys it.
    ///
    /// # Errors
    ///
    /// - [`TreeError::RepelPending`] if the child's outcome is still
    ///   `Pending`. Owners must observe a terminal outcome first - that is
    ///   the only signal that the child's advance step will never run again,
    ///   so destruction cannot race an in-flight step.
    /// - [`TreeError::NotAChild`] if the node is not in this owner's list.
    pub fn repel(&self, child: &Arc<Node>) -> Result<(), TreeError> {
        if child.outcome().is_pending() {
            return Err(TreeError::RepelPending(child.name));
        }
        let mut children = self.children.lock().expect("child list mutex poisoned");
        let position = children
            .iter()
            .position(|c| Arc::ptr_eq(c, child))
            .ok_or(TreeError::NotAChild(child.name))?;
        children.remove(position);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sweep
    // ------------------------------------------------------------------

    /// One depth-first pass: advance this node's body, then sweep every
    /// `ByParent` child in insertion order.
    ///
    /// Returns immediately once the outcome is terminal; the body is never
    /// advanced again after that. Children attached by the body during its
    /// own advance are swept in the same pass; children repelled during the
    /// advance are not.
    ///
    /// A panic inside the body is caught and settles the outcome to `Error`:
    /// the failure stays contained in this node, and the driver thread keeps
    /// sweeping its other nodes.
    pub fn sweep(&self) {
        if self.outcome.get().is_terminal() {
            return;
        }

        match self.body.try_lock() {
            Ok(mut body) => {
                let mut ctx = StepCtx { node: self };
                match catch_unwind(AssertUnwindSafe(|| body.advance(&mut ctx))) {
                    Ok(step) => {
                        if step.is_terminal() {
                            self.outcome.settle(step);
                        }
                    }
                    Err(_) => {
                        warn!(node = self.name, "body panicked during advance");
                        self.outcome.settle(Outcome::Error);
                        return;
                    }
                }
            }
            Err(TryLockError::WouldBlock) => {
                // Two drivers on one node is a contract violation.
                debug_assert!(false, "node `{}` swept by two drivers at once", self.name);
                return;
            }
            Err(TryLockError::Poisoned(_)) => {
                // A holder panicked with the guard live (a diagnostics
                // callback; advance panics are caught above); the body
                // state is unusable. Surface as a node failure.
                self.outcome.settle(Outcome::Error);
                return;
            }
        }

        // Index-based walk so the list may shrink or grow between steps.
        let mut index = 0;
        while let Some(child) = self.child_at(index) {
            if child.mode() == DriverMode::ByParent {
                child.sweep();
            }
            index += 1;
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Renders one status line for this node (plus the body's own lines,
    /// indented one level deeper). Never blocks: a body mid-advance on its
    /// driver thread shows as busy.
    pub(crate) fn render_diag(&self, depth: usize, out: &mut DiagBuf) {
        indent(out, depth);
        match self.body.try_lock() {
            Ok(body) => {
                let state = body.state_name();
                if state.is_empty() {
                    let _ = writeln!(out, "{} ({})", self.name, self.outcome.get());
                } else {
                    let _ = writeln!(out, "{} [{}] ({})", self.name, state, self.outcome.get());
                }

                let mut info = DiagBuf::with_capacity(out.remaining());
                body.render_diagnostics(&mut info);
                for line in info.as_str().lines() {
                    indent(out, depth + 1);
                    let _ = writeln!(out, "{line}");
                }
            }
            Err(_) => {
                let _ = writeln!(out, "{} (busy)", self.name);
            }
        }
    }
}

fn indent(out: &mut DiagBuf, depth: usize) {
    for _ in 0..depth {
        let _ = out.write_str("  ");
    }
}

// ============================================================================
// StepCtx
// ============================================================================

/// Handed to every [`Process::advance`] call; the body's window onto its own
/// tree cell.
///
/// Lets a body attach and detach children on itself - the owner-side half of
/// every lifecycle - without holding a reference cycle to its own node.
pub struct StepCtx<'a> {
    node: &'a Node,
}

impl StepCtx<'_> {
    /// Attaches a child to the node currently being advanced.
    pub fn start(&mut self, child: Arc<Node>, mode: DriverMode) -> Result<(), TreeError> {
        self.node.start(child, mode)
    }

    /// Detaches a finished child of the node currently being advanced.
    pub fn repel(&mut self, child: &Arc<Node>) -> Result<(), TreeError> {
        self.node.repel(child)
    }

    /// Number of children currently attached to this node.
    pub fn child_count(&self) -> usize {
        self.node.child_count()
    }
}
