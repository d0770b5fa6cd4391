//! Loop-context bookkeeping for `break`/`continue`.
//!
//! One `LoopContext` per enclosing loop; [`crate::codegen::stmt`] passes
//! `Option<&LoopContext>` down instead of maintaining an explicit stack,
//! since only the innermost loop is ever the target.

use crate::backend::builder::BasicBlock;

/// Targets a `break`/`continue` inside the loop currently being lowered, plus
/// the scope depth the loop body started at — so `break`/`continue` can
/// drain every scope pushed since loop entry before jumping out.
pub struct LoopContext {
    pub break_block: BasicBlock,
    pub continue_block: BasicBlock,
    pub scope_floor: usize,
}
