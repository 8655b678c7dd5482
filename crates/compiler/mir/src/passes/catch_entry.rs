//! # Catch-Entry State Optimization
//!
//! Computes, for each catch entry, the minimal set of environment slots
//! that must be synchronized on entry to the handler, and clears the
//! placeholder definitions of the rest. A slot whose placeholder the
//! handler (and everything reachable from it) never reads costs
//! synchronization work on every throwing instruction in the try region;
//! clearing it erases that cost.
//!
//! The scan covers every block reachable from the handler, across loop back
//! edges: a read inside a loop nested in the handler counts even when the
//! read precedes the handler's own re-entry on a later iteration. Reads
//! through phis count transitively — a placeholder feeding a phi whose
//! value is eventually observed is required.
//!
//! Ahead-of-time compilation must be more conservative about what is
//! assumed dead: there is no later deoptimization into interpreted
//! execution to refine the handler's reachable set. In AOT mode any use at
//! all keeps a slot. In JIT mode a slot read only by transitively-dead phi
//! cycles is pruned, and those phis are unlinked first so that no use of a
//! cleared placeholder remains.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::passes::MirPass;
use crate::{cfg, BasicBlockId, FlowGraph, InstructionKind, ValueId};

/// In-place pruning of catch-entry placeholder lists.
pub fn optimize_catch_entry_states(graph: &mut FlowGraph, is_ahead_of_time: bool) {
    run_optimizer(graph, is_ahead_of_time);
}

/// Catch-entry state optimization packaged as a pass
#[derive(Debug)]
pub struct CatchEntryOptimizer {
    is_ahead_of_time: bool,
}

impl CatchEntryOptimizer {
    pub const fn new(is_ahead_of_time: bool) -> Self {
        Self { is_ahead_of_time }
    }
}

impl MirPass for CatchEntryOptimizer {
    fn run(&mut self, graph: &mut FlowGraph) -> bool {
        run_optimizer(graph, self.is_ahead_of_time)
    }

    fn name(&self) -> &'static str {
        "CatchEntryOptimizer"
    }
}

fn run_optimizer(graph: &mut FlowGraph, is_ahead_of_time: bool) -> bool {
    if graph.catch_entries.is_empty() {
        return false;
    }

    let mut modified = false;
    for entry in graph.catch_entries.clone() {
        modified |= optimize_entry(graph, entry, is_ahead_of_time);
    }
    modified
}

fn optimize_entry(graph: &mut FlowGraph, entry: BasicBlockId, is_ahead_of_time: bool) -> bool {
    let params = match &graph.basic_blocks[entry].catch {
        Some(handler) => handler.params.clone(),
        None => return false,
    };

    let region = cfg::reachable_from(graph, entry);

    // Every value observed by a real instruction or terminator in the
    // handler region, and the phi graph for transitive propagation.
    let mut observed: FxHashSet<ValueId> = FxHashSet::default();
    let mut phi_operands: FxHashMap<ValueId, Vec<ValueId>> = FxHashMap::default();

    for &block_id in &region {
        let block = &graph.basic_blocks[block_id];
        for instruction in &block.instructions {
            match &instruction.kind {
                InstructionKind::Phi { dest, sources } => {
                    let operands = sources
                        .iter()
                        .filter_map(|(_, value)| value.as_operand())
                        .collect();
                    phi_operands.insert(*dest, operands);
                }
                _ => observed.extend(instruction.used_values()),
            }
        }
        observed.extend(block.terminator.used_values());
    }

    // Requiredness closure: a required phi result requires its operands.
    // The worklist revisits values across cycles, so a read anywhere in a
    // loop nested in the handler is found regardless of iteration order.
    let mut required = observed;
    let mut worklist: Vec<ValueId> = required.iter().copied().collect();
    while let Some(value) = worklist.pop() {
        if let Some(operands) = phi_operands.get(&value) {
            for &operand in operands {
                if required.insert(operand) {
                    worklist.push(operand);
                }
            }
        }
    }

    let use_counts = graph.value_use_counts();
    let keep = |param: ValueId| {
        if is_ahead_of_time {
            // No deopt fallback: any use at all keeps the slot.
            use_counts.get(&param).copied().unwrap_or(0) > 0
        } else {
            required.contains(&param)
        }
    };

    let to_clear: Vec<usize> = params
        .iter()
        .enumerate()
        .filter_map(|(slot, param)| match param {
            Some(param) if !keep(*param) => Some(slot),
            _ => None,
        })
        .collect();

    if to_clear.is_empty() {
        return false;
    }

    // JIT mode may prune slots still read by phi cycles that are themselves
    // dead; unlink those phis so no use of a cleared placeholder remains.
    if !is_ahead_of_time {
        let dead_phis: FxHashSet<ValueId> = phi_operands
            .keys()
            .filter(|dest| !required.contains(dest))
            .copied()
            .collect();
        if !dead_phis.is_empty() {
            for &block_id in &region {
                graph.basic_blocks[block_id].instructions.retain(|instruction| {
                    !matches!(
                        &instruction.kind,
                        InstructionKind::Phi { dest, .. } if dead_phis.contains(dest)
                    )
                });
            }
            log::trace!(
                "catch entry {entry:?}: unlinked {} dead phis",
                dead_phis.len()
            );
        }
    }

    // Clearing a slot whose placeholder is still referenced would leave a
    // dangling use; that is a defect in this pass, not a recoverable state.
    let counts_after = graph.value_use_counts();
    let handler = graph.basic_blocks[entry]
        .catch
        .as_mut()
        .expect("catch metadata checked above");
    for &slot in &to_clear {
        let param = handler.params[slot]
            .take()
            .expect("slot selected for clearing holds a placeholder");
        assert!(
            counts_after.get(&param).copied().unwrap_or(0) == 0,
            "catch-entry slot {slot} cleared while {param:?} still has uses"
        );
    }

    log::debug!(
        "catch entry {entry:?}: cleared {} of {} synchronized slots",
        to_clear.len(),
        params.iter().filter(|p| p.is_some()).count()
    );

    true
}

#[cfg(test)]
#[path = "catch_entry_tests.rs"]
mod tests;
