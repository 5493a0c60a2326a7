//! Bounded diagnostics buffer and tree-wide status dumps.
//!
//! # Bounded writes
//!
//! Every diagnostics callback writes into a [`DiagBuf`] with a fixed byte
//! capacity and may never overrun it. Overflow truncates at a UTF-8 boundary
//! and is recorded, not reported as a write error: a status dump must always
//! produce whatever fits rather than fail halfway.
//!
//! # Tree dumps
//!
//! [`render_tree`] walks the tree depth-first in child insertion order -
//! the same order sweeps use - so a dump is a faithful snapshot of dispatch
//! order. Nodes whose dump flag is cleared are skipped together with their
//! subtree. Rendering never blocks on a node that is mid-advance on another
//! thread; such a node shows as busy.

use std::fmt;
use std::sync::Arc;

use crate::node::Node;

/// Fixed-capacity text sink for diagnostics callbacks.
pub struct DiagBuf {
    data: String,
    cap: usize,
    truncated: bool,
}

impl DiagBuf {
    /// New empty buffer holding at most `cap` bytes.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: String::new(),
            cap,
            truncated: false,
        }
    }

    /// Text written so far.
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.cap - self.data.len()
    }

    /// Whether any write was cut short by the capacity limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Discards content, keeping the capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.truncated = false;
    }
}

impl fmt::Write for DiagBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Truncation is sticky: once the dump was cut short, later writes
        // are dropped instead of splicing into the gap a char-boundary cut
        // may have left.
        if self.truncated {
            return Ok(());
        }
        let room = self.cap - self.data.len();
        if s.len() <= room {
            self.data.push_str(s);
            return Ok(());
        }

        // Keep the longest prefix that fits on a char boundary.
        let mut cut = room;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.data.push_str(&s[..cut]);
        self.truncated = true;
        Ok(())
    }
}

impl fmt::Display for DiagBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Renders a status dump of `root` and its subtree into `out`.
///
/// One line per node (name, named state if any, outcome), indented by depth,
/// followed by the node's own `render_diagnostics` lines one level deeper.
pub fn render_tree(root: &Arc<Node>, out: &mut DiagBuf) {
    walk(root, 0, out);
}

fn walk(node: &Arc<Node>, depth: usize, out: &mut DiagBuf) {
    if !node.dump_visible() {
        return;
    }
    node.render_diag(depth, out);
    node.for_each_child(|child| walk(child, depth + 1, out));
}
