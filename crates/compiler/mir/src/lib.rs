//! # Keel Intermediate Representation (MIR)
//!
//! This crate defines the data structures for the Mid-level Intermediate
//! Representation of the Keel compiler together with its redundancy
//! elimination stage. The MIR arrives from upstream lowering already in SSA
//! form with a valid control flow graph; the passes in this crate mutate it
//! in place and hand it downstream with the same block structure but fewer
//! instructions and smaller catch-entry placeholder lists.
//!
//! ## Design Principles
//!
//! 1. **Control Flow Graph (CFG)**: Functions are represented as directed graphs of basic blocks
//! 2. **Static Single Assignment (SSA)**: Each virtual register is assigned exactly once
//! 3. **Explicit Control Flow**: All control flow is explicit through terminators
//! 4. **Derived use information**: use lists are computed on demand from the
//!    instruction stream rather than stored as intrusive back-pointers, so
//!    removing a definition can never leave a dangling reference behind
//!
//! ## Architecture
//!
//! ```text
//! FlowGraph
//! basic_blocks: IndexVec<BasicBlockId, BasicBlock>
//! entry_block: BasicBlockId
//! catch_entries: Vec<BasicBlockId>
//!
//! BasicBlock
//! instructions: Vec<Instruction>
//! terminator: Terminator
//! catch: Option<CatchHandler>
//! ```
//!
//! ## Optimization entry points
//!
//! - [`eliminate_redundancies`]: dominator-scoped common subexpression
//!   elimination, load forwarding and dead store removal, driven by an
//!   escape analysis over heap allocations.
//! - [`optimize_catch_entry_states`]: prunes which environment slots must be
//!   synchronized on entry to each exception handler.

pub use basic_block::{BasicBlock, CatchHandler};
pub use flow_graph::FlowGraph;
pub use instruction::{BinaryOp, ElementWidth, Instruction, InstructionKind, UnaryOp};
pub use passes::catch_entry::optimize_catch_entry_states;
pub use passes::redundancy_elimination::eliminate_redundancies;
pub use passes::{CatchEntryOptimizer, MirPass, PassManager, RedundancyElimination, Validation};
pub use terminator::Terminator;
pub use value::{Literal, Value};

pub mod analysis;
pub mod basic_block;
pub mod cfg;
pub mod flow_graph;
pub mod instruction;
pub mod passes;
pub mod terminator;
pub mod value;

#[cfg(test)]
pub mod testing;

// --- Core Identifiers ---

index_vec::define_index_type! {
    /// Unique identifier for a basic block within a flow graph
    pub struct BasicBlockId = usize;
    DEBUG_FORMAT = "block{}";
}

index_vec::define_index_type! {
    /// Unique identifier for a value (virtual register) within a flow graph
    pub struct ValueId = usize;
    DEBUG_FORMAT = "v{}";
}

index_vec::define_index_type! {
    /// Identifier of a callee known to the surrounding pipeline
    pub struct FunctionId = usize;
}

index_vec::define_index_type! {
    /// Identifier of an object shape (class) supplied by upstream type propagation
    pub struct ClassId = usize;
}

index_vec::define_index_type! {
    /// Identifier of a concrete field slot within an object shape
    pub struct FieldId = usize;
}

// --- Pretty Printing Support ---

/// Trait for pretty-printing MIR constructs
pub trait PrettyPrint {
    fn pretty_print(&self, indent: usize) -> String;
}

/// Helper function to create indentation
pub(crate) fn indent_str(level: usize) -> String {
    "  ".repeat(level)
}
