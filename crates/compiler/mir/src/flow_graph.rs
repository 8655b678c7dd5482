//! # MIR Flow Graph
//!
//! This module defines the function-level MIR representation: the Control
//! Flow Graph of basic blocks, the catch-entry registry, and the rewiring
//! primitives the optimization passes are built on.

use index_vec::IndexVec;
use rustc_hash::FxHashMap;
use std::collections::HashSet;

use crate::{
    indent_str, BasicBlock, BasicBlockId, CatchHandler, InstructionKind, PrettyPrint, Value,
    ValueId,
};

/// The MIR for a single function, laid out as a Control Flow Graph (CFG)
///
/// A `FlowGraph` represents the complete control flow and data flow for a
/// single function. It is built by upstream lowering and owned externally;
/// the passes in this crate mutate it in place.
///
/// # Design Notes
///
/// - Basic blocks are stored in an `IndexVec` for efficient access
/// - Each graph has exactly one ordinary entry block; catch entries are
///   additional roots reached via exceptional control transfer
/// - Use information is derived by scanning the instruction stream, so a
///   definition is removed by first rewriting its uses and then unlinking
///   the instruction; no intermediate dangling state is representable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowGraph {
    /// The name of the function (for debugging and linking)
    pub name: String,

    /// All basic blocks in this function, forming the CFG
    pub basic_blocks: IndexVec<BasicBlockId, BasicBlock>,

    /// The entry point of the function
    pub entry_block: BasicBlockId,

    /// Function parameters. Parameters participate in the same environment
    /// slot-indexing scheme as locals.
    pub parameters: Vec<ValueId>,

    /// Catch-entry blocks, one per try region
    pub catch_entries: Vec<BasicBlockId>,

    /// Next available value ID for generating new temporaries
    pub(crate) next_value_id: u32,
}

impl FlowGraph {
    /// Creates a new graph with a single empty entry block
    pub fn new(name: String) -> Self {
        let mut basic_blocks = IndexVec::new();
        let entry_block = basic_blocks.push(BasicBlock::new());

        Self {
            name,
            basic_blocks,
            entry_block,
            parameters: Vec::new(),
            catch_entries: Vec::new(),
            next_value_id: 0,
        }
    }

    /// Adds a new basic block and returns its ID
    pub fn add_basic_block(&mut self) -> BasicBlockId {
        self.basic_blocks.push(BasicBlock::new())
    }

    /// Adds a new basic block with a name and returns its ID
    pub fn add_basic_block_with_name(&mut self, name: String) -> BasicBlockId {
        self.basic_blocks.push(BasicBlock::with_name(name))
    }

    /// Adds a catch-entry block for the given try region. The placeholder
    /// list must be the full environment snapshot supplied by upstream
    /// graph construction.
    pub fn add_catch_entry(
        &mut self,
        try_index: usize,
        params: Vec<Option<ValueId>>,
    ) -> BasicBlockId {
        let mut block = BasicBlock::with_name(format!("catch{try_index}"));
        block.catch = Some(CatchHandler::new(try_index, params));
        let id = self.basic_blocks.push(block);
        self.catch_entries.push(id);
        id
    }

    /// Gets a basic block by ID
    pub fn get_basic_block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.basic_blocks.get(id)
    }

    /// Gets a mutable reference to a basic block by ID
    pub fn get_basic_block_mut(&mut self, id: BasicBlockId) -> Option<&mut BasicBlock> {
        self.basic_blocks.get_mut(id)
    }

    /// Generates a new unique value ID within this graph
    pub fn new_value_id(&mut self) -> ValueId {
        let id = ValueId::new(self.next_value_id as usize);
        self.next_value_id += 1;
        id
    }

    /// Returns an iterator over all basic blocks
    pub fn blocks(&self) -> impl Iterator<Item = (BasicBlockId, &BasicBlock)> {
        self.basic_blocks.iter_enumerated()
    }

    /// Returns the number of basic blocks in this graph
    pub fn block_count(&self) -> usize {
        self.basic_blocks.len()
    }

    /// Connect two blocks by recording the pred edge.
    /// The terminator of the predecessor establishes the actual control flow.
    pub fn connect(&mut self, pred: BasicBlockId, succ: BasicBlockId) {
        let succ_block = self
            .basic_blocks
            .get_mut(succ)
            .unwrap_or_else(|| panic!("Successor block {succ:?} does not exist"));
        succ_block.add_pred(pred);
    }

    /// Disconnect two blocks by removing the pred edge
    pub fn disconnect(&mut self, pred: BasicBlockId, succ: BasicBlockId) {
        let succ_block = self
            .basic_blocks
            .get_mut(succ)
            .unwrap_or_else(|| panic!("Successor block {succ:?} does not exist"));
        succ_block.remove_pred(pred);
    }

    /// Returns a map from each ValueId to its usage count in the graph.
    /// Useful for optimization passes deciding whether a definition may be
    /// unlinked.
    pub fn value_use_counts(&self) -> FxHashMap<ValueId, usize> {
        let mut counts = FxHashMap::default();
        for (_id, block) in self.blocks() {
            for instruction in &block.instructions {
                for value in instruction.operands() {
                    if let Value::Operand(used) = value {
                        *counts.entry(used).or_default() += 1;
                    }
                }
            }
            for used in block.terminator.used_values() {
                *counts.entry(used).or_default() += 1;
            }
        }
        counts
    }

    /// Replace every use of `from` throughout the graph with `to`.
    ///
    /// This is the first half of removing a definition: once no uses remain,
    /// the defining instruction can be unlinked without ever exposing a
    /// dangling reference.
    pub fn replace_all_uses(&mut self, from: ValueId, to: Value) {
        if to == Value::Operand(from) {
            return;
        }

        for block in &mut self.basic_blocks {
            for instruction in &mut block.instructions {
                instruction.replace_value_uses(from, to);
            }
            block.terminator.replace_value_uses(from, to);
        }
    }

    /// Counts instructions of the given predicate across the whole graph
    pub fn count_instructions(&self, pred: impl Fn(&InstructionKind) -> bool) -> usize {
        self.blocks()
            .map(|(_, block)| block.instructions.iter().filter(|i| pred(&i.kind)).count())
            .sum()
    }

    /// Total number of instructions in the graph
    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|(_, b)| b.instructions.len()).sum()
    }

    /// Checks if a basic block is reachable from the entry block or any
    /// catch entry
    pub fn is_block_reachable(&self, target: BasicBlockId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![self.entry_block];
        stack.extend(self.catch_entries.iter().copied());

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                if let Some(block) = self.get_basic_block(current) {
                    stack.extend(block.terminator.target_blocks());
                }
            }
        }

        false
    }

    /// Validates the graph structure
    ///
    /// Checks:
    /// - Entry block exists
    /// - All terminator targets exist and predecessor lists match the edges
    /// - SSA: each value is defined exactly once
    /// - Every used value is defined somewhere (no dangling uses)
    /// - Phi instructions appear only at the start of a block, with one
    ///   source per predecessor
    /// - Catch-entry registry and block metadata agree
    pub fn validate(&self) -> Result<(), String> {
        if self.basic_blocks.get(self.entry_block).is_none() {
            return Err(format!("Entry block {:?} does not exist", self.entry_block));
        }

        // Terminator targets and pred edges
        for (block_id, block) in self.blocks() {
            for target in block.terminator.target_blocks() {
                match self.basic_blocks.get(target) {
                    None => {
                        return Err(format!(
                            "Block {block_id:?} targets non-existent block {target:?}"
                        ));
                    }
                    Some(succ) => {
                        if !succ.preds.contains(&block_id) {
                            return Err(format!(
                                "Edge {block_id:?} -> {target:?} missing from predecessor list"
                            ));
                        }
                    }
                }
            }
        }

        // SSA single definition
        let mut defined = HashSet::new();
        for &param in &self.parameters {
            if !defined.insert(param) {
                return Err(format!("Value {param:?} defined twice as a parameter"));
            }
        }
        for (block_id, block) in self.blocks() {
            if let Some(catch) = &block.catch {
                for param in catch.live_params() {
                    if !defined.insert(param) {
                        return Err(format!(
                            "Catch-entry placeholder {param:?} in {block_id:?} defined twice"
                        ));
                    }
                }
            }
            for instruction in &block.instructions {
                if let Some(dest) = instruction.destination() {
                    if !defined.insert(dest) {
                        return Err(format!(
                            "Value {dest:?} defined multiple times (block {block_id:?})"
                        ));
                    }
                }
            }
        }

        // No dangling uses
        for (block_id, block) in self.blocks() {
            for used in block.used_values() {
                if !defined.contains(&used) {
                    return Err(format!(
                        "Block {block_id:?} uses value {used:?} that is not defined anywhere"
                    ));
                }
            }
        }

        // Phi placement and arity
        for (block_id, block) in self.blocks() {
            let mut seen_non_phi = false;
            for (i, instruction) in block.instructions.iter().enumerate() {
                match &instruction.kind {
                    InstructionKind::Phi { sources, .. } => {
                        if seen_non_phi {
                            return Err(format!(
                                "Block {block_id:?}: phi at position {i} found after non-phi instruction"
                            ));
                        }
                        for (source_block, _) in sources {
                            if !block.preds.contains(source_block) {
                                return Err(format!(
                                    "Block {block_id:?}: phi has operand from {source_block:?} which is not a predecessor"
                                ));
                            }
                        }
                    }
                    _ => seen_non_phi = true,
                }
            }
        }

        // Catch-entry registry consistency
        for &entry in &self.catch_entries {
            match self.basic_blocks.get(entry) {
                None => return Err(format!("Catch entry {entry:?} does not exist")),
                Some(block) => {
                    if block.catch.is_none() {
                        return Err(format!(
                            "Catch entry {entry:?} has no handler metadata"
                        ));
                    }
                    if !block.preds.is_empty() {
                        return Err(format!(
                            "Catch entry {entry:?} has ordinary predecessors {:?}",
                            block.preds
                        ));
                    }
                }
            }
        }
        for (block_id, block) in self.blocks() {
            if block.catch.is_some() && !self.catch_entries.contains(&block_id) {
                return Err(format!(
                    "Block {block_id:?} carries handler metadata but is not registered as a catch entry"
                ));
            }
        }

        Ok(())
    }
}

impl PrettyPrint for FlowGraph {
    fn pretty_print(&self, indent: usize) -> String {
        let mut result = String::new();
        let base_indent = indent_str(indent);

        result.push_str(&format!("{}fn {} {{\n", base_indent, self.name));

        if !self.parameters.is_empty() {
            result.push_str(&format!(
                "{}  parameters: {:?}\n",
                base_indent, self.parameters
            ));
        }

        result.push_str(&format!(
            "{}  entry: {:?}\n",
            base_indent, self.entry_block
        ));
        result.push('\n');

        for (block_id, block) in self.blocks() {
            let block_display = if let Some(name) = &block.name {
                format!("{block_id:?} ({name})")
            } else {
                format!("{block_id:?}")
            };
            result.push_str(&format!("{base_indent}  {block_display}:\n"));
            result.push_str(&block.pretty_print(indent + 2));
            result.push('\n');
        }

        result.push_str(&format!("{base_indent}}}\n"));
        result
    }
}
