//! # MIR Basic Block
//!
//! This module defines basic blocks, the fundamental building blocks of the CFG,
//! and the catch-handler metadata attached to exceptional entry blocks.

use crate::{indent_str, Instruction, PrettyPrint, Terminator, ValueId};

/// Metadata attached to a basic block that is entered exceptionally.
///
/// A catch entry is created once per try region by upstream graph
/// construction. Its placeholder list starts out as a full, densely
/// populated snapshot of the environment: one definition per slot,
/// representing the value of each source variable flowing into the handler.
/// The catch-entry state optimizer clears the slots the handler never reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchHandler {
    /// Index of the try region this handler belongs to
    pub try_index: usize,

    /// Ordered, sparsely-indexed placeholder definitions, one per
    /// environment slot. `None` means the slot is not synchronized on entry.
    pub params: Vec<Option<ValueId>>,
}

impl CatchHandler {
    pub const fn new(try_index: usize, params: Vec<Option<ValueId>>) -> Self {
        Self { try_index, params }
    }

    /// Returns the placeholder definitions that are still synchronized
    pub fn live_params(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.params.iter().filter_map(|p| *p)
    }
}

/// A basic block in the Control Flow Graph
///
/// A basic block represents a straight-line sequence of instructions that:
/// - Has exactly one entry point (the first instruction)
/// - Has exactly one exit point (the terminator)
/// - Contains no jumps or branches except at the end
///
/// # Invariants
///
/// - Every basic block must have exactly one terminator
/// - Phi instructions appear only at the start of a block
/// - A block with `catch` metadata has no ordinary predecessors; it is
///   reached via exceptional control transfer only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Optional name for debugging
    pub name: Option<String>,

    /// The sequence of instructions in this block
    pub instructions: Vec<Instruction>,

    /// The terminator that ends this block and transfers control
    pub terminator: Terminator,

    /// Predecessor blocks, maintained through `FlowGraph::connect`
    pub preds: Vec<crate::BasicBlockId>,

    /// Catch-handler metadata when this block is an exceptional entry
    pub catch: Option<CatchHandler>,
}

impl BasicBlock {
    /// Creates a new empty basic block with an unreachable terminator
    pub const fn new() -> Self {
        Self {
            name: None,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
            preds: Vec::new(),
            catch: None,
        }
    }

    /// Creates a new basic block with a name
    pub const fn with_name(name: String) -> Self {
        Self {
            name: Some(name),
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
            preds: Vec::new(),
            catch: None,
        }
    }

    /// Adds an instruction to the end of this block
    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Inserts a phi at the start of this block, before any non-phi instruction
    pub fn push_phi_front(&mut self, phi: Instruction) {
        self.instructions.insert(0, phi);
    }

    /// Sets the terminator for this block
    pub fn set_terminator(&mut self, terminator: Terminator) {
        self.terminator = terminator;
    }

    /// Returns true if this block is entered exceptionally
    pub const fn is_catch_entry(&self) -> bool {
        self.catch.is_some()
    }

    /// Adds a predecessor edge
    pub fn add_pred(&mut self, pred: crate::BasicBlockId) {
        if !self.preds.contains(&pred) {
            self.preds.push(pred);
        }
    }

    /// Removes a predecessor edge
    pub fn remove_pred(&mut self, pred: crate::BasicBlockId) {
        self.preds.retain(|p| *p != pred);
    }

    /// Returns the number of instructions in this block
    pub const fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Returns all values used by this basic block, including the terminator
    pub fn used_values(&self) -> std::collections::HashSet<ValueId> {
        let mut used = std::collections::HashSet::new();

        for instruction in &self.instructions {
            used.extend(instruction.used_values());
        }
        used.extend(self.terminator.used_values());

        used
    }

    /// Returns all values defined by this basic block, including catch-entry
    /// placeholders
    pub fn defined_values(&self) -> std::collections::HashSet<ValueId> {
        let mut defined = std::collections::HashSet::new();

        if let Some(catch) = &self.catch {
            defined.extend(catch.live_params());
        }
        for instruction in &self.instructions {
            if let Some(dest) = instruction.destination() {
                defined.insert(dest);
            }
        }

        defined
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl PrettyPrint for BasicBlock {
    fn pretty_print(&self, indent: usize) -> String {
        let mut result = String::new();
        let base_indent = indent_str(indent);

        if let Some(catch) = &self.catch {
            let params = catch
                .params
                .iter()
                .enumerate()
                .filter_map(|(slot, p)| p.map(|v| format!("{slot}: {}", v.pretty_print(0))))
                .collect::<Vec<_>>()
                .join(", ");
            result.push_str(&format!(
                "{}catch_entry try{} [{}]\n",
                base_indent, catch.try_index, params
            ));
        }

        for instruction in &self.instructions {
            result.push_str(&format!("{}{}\n", base_indent, instruction.pretty_print(0)));
        }

        result.push_str(&format!(
            "{}{}\n",
            base_indent,
            self.terminator.pretty_print(0)
        ));

        result
    }
}
