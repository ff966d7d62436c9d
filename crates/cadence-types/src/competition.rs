//! Competition between candidate branches.
//!
//! Fork choice is not the kernel's business. Once per maintenance slice the
//! consensus implementation is asked to evaluate the chain and returns a
//! [`Competition`]; during the next processing slice the kernel asks it
//! which branch to build on. The kernel only acts on the answer.

use std::sync::Arc;

use crate::block::Block;

/// The branch a [`Competition`] selected for block generation.
pub struct BranchSelection {
    /// The branch to build on, head first. Never empty.
    pub branch: Vec<Arc<dyn Block>>,
    /// Identifier of the branch's root.
    pub root_id: u64,
    /// True when the selection moved to a different head than the last
    /// generation round built on.
    pub switch_heads: bool,
}

/// Result of one consensus evaluation round.
///
/// Implementations own the candidate set; `branch` may consult the current
/// generation number to decide which candidate the node should extend.
pub trait Competition: Send + Sync {
    /// The branch to build block `gen_num` on, or `None` when no candidate
    /// is worth extending this round.
    fn branch(&self, gen_num: u64) -> Option<BranchSelection>;
}
