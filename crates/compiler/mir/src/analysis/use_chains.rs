//! # Derived Use Chains
//!
//! Definition-to-use adjacency derived from the instruction stream. Uses
//! are stored as (block, position) index pairs rather than back-pointers
//! into instructions, so the information stays valid as long as no
//! instruction is inserted or removed; passes recompute it after mutating
//! the graph.

use rustc_hash::FxHashMap;

use crate::{BasicBlockId, FlowGraph, Value, ValueId};

/// Where inside a block a use occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsePosition {
    /// Use by the instruction at this index
    Instruction(usize),
    /// Use by the block's terminator
    Terminator,
}

/// A single use of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseSite {
    pub block: BasicBlockId,
    pub position: UsePosition,
}

/// Where a definition is introduced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefSite {
    /// Defined by the instruction at this index
    Instruction { block: BasicBlockId, index: usize },
    /// A function parameter
    Parameter,
    /// A catch-entry placeholder for the given environment slot
    CatchParam { block: BasicBlockId, slot: usize },
}

/// Def→use adjacency for a flow graph at a point in time
#[derive(Debug, Default)]
pub struct UseChains {
    uses: FxHashMap<ValueId, Vec<UseSite>>,
    defs: FxHashMap<ValueId, DefSite>,
}

impl UseChains {
    /// Scans the graph and records every definition and use site
    pub fn compute(graph: &FlowGraph) -> Self {
        let mut chains = Self::default();

        for &param in &graph.parameters {
            chains.defs.insert(param, DefSite::Parameter);
        }

        for (block_id, block) in graph.blocks() {
            if let Some(catch) = &block.catch {
                for (slot, param) in catch.params.iter().enumerate() {
                    if let Some(param) = param {
                        chains.defs.insert(
                            *param,
                            DefSite::CatchParam {
                                block: block_id,
                                slot,
                            },
                        );
                    }
                }
            }

            for (index, instruction) in block.instructions.iter().enumerate() {
                if let Some(dest) = instruction.destination() {
                    chains
                        .defs
                        .insert(dest, DefSite::Instruction { block: block_id, index });
                }
                for value in instruction.operands() {
                    if let Value::Operand(used) = value {
                        chains.uses.entry(used).or_default().push(UseSite {
                            block: block_id,
                            position: UsePosition::Instruction(index),
                        });
                    }
                }
            }

            for used in block.terminator.used_values() {
                chains.uses.entry(used).or_default().push(UseSite {
                    block: block_id,
                    position: UsePosition::Terminator,
                });
            }
        }

        chains
    }

    /// All use sites of a definition
    pub fn uses_of(&self, value: ValueId) -> &[UseSite] {
        self.uses.get(&value).map_or(&[], |uses| uses.as_slice())
    }

    /// Where the definition is introduced, if it is known
    pub fn def_site(&self, value: ValueId) -> Option<DefSite> {
        self.defs.get(&value).copied()
    }

    /// The instruction defining `value`, when it is instruction-defined
    pub fn defining_instruction<'g>(
        &self,
        graph: &'g FlowGraph,
        value: ValueId,
    ) -> Option<&'g crate::Instruction> {
        match self.def_site(value)? {
            DefSite::Instruction { block, index } => {
                graph.basic_blocks.get(block)?.instructions.get(index)
            }
            _ => None,
        }
    }

    /// Resolves a value to the definition it is semantically the same
    /// object as, chasing transparent wrappers. Returns `None` for
    /// literals.
    pub fn origin_of(&self, graph: &FlowGraph, value: Value) -> Option<ValueId> {
        let mut current = value.as_operand()?;
        loop {
            match self
                .defining_instruction(graph, current)
                .and_then(|instr| instr.alias_transparent_source())
            {
                Some(source) => match source.as_operand() {
                    Some(next) => current = next,
                    None => return None,
                },
                None => return Some(current),
            }
        }
    }
}
