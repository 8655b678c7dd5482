//! # Control Flow Graph Utilities
//!
//! This module provides common utilities for working with control flow
//! graphs: predecessor/successor queries, traversal orders, and
//! reachability. Catch entries are additional roots of the graph: they have
//! no ordinary predecessors and are reached via exceptional control
//! transfer, so every whole-graph traversal starts from the entry block and
//! then from each catch entry.

use rustc_hash::FxHashSet;

use crate::{BasicBlockId, FlowGraph};

/// Get all successor blocks of a given block
pub(crate) fn get_successors(graph: &FlowGraph, block_id: BasicBlockId) -> Vec<BasicBlockId> {
    match graph.basic_blocks.get(block_id) {
        Some(block) => block.terminator.target_blocks(),
        None => vec![],
    }
}

/// Get all predecessor blocks of a given block
pub(crate) fn get_predecessors(graph: &FlowGraph, target_id: BasicBlockId) -> Vec<BasicBlockId> {
    let block = graph
        .basic_blocks
        .get(target_id)
        .unwrap_or_else(|| panic!("Block {target_id:?} not found"));
    block.preds.clone()
}

/// Computes blocks in reverse postorder over all roots (entry first, then
/// catch entries). Blocks unreachable from any root are omitted.
pub(crate) fn compute_reverse_postorder(graph: &FlowGraph) -> Vec<BasicBlockId> {
    let mut visited = FxHashSet::default();
    let mut postorder = Vec::new();

    fn dfs(
        block: BasicBlockId,
        graph: &FlowGraph,
        visited: &mut FxHashSet<BasicBlockId>,
        postorder: &mut Vec<BasicBlockId>,
    ) {
        if !visited.insert(block) {
            return;
        }

        for successor in graph.basic_blocks[block].terminator.target_blocks() {
            dfs(successor, graph, visited, postorder);
        }

        postorder.push(block);
    }

    // Catch entries first so that the entry block ends up at the front of
    // the reversed order.
    for &catch_entry in &graph.catch_entries {
        dfs(catch_entry, graph, &mut visited, &mut postorder);
    }
    dfs(graph.entry_block, graph, &mut visited, &mut postorder);

    postorder.reverse();
    postorder
}

/// Computes the set of blocks reachable from `start` along ordinary control
/// flow edges, including `start` itself. Handles cycles.
pub(crate) fn reachable_from(graph: &FlowGraph, start: BasicBlockId) -> FxHashSet<BasicBlockId> {
    let mut visited = FxHashSet::default();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if visited.insert(current) {
            stack.extend(get_successors(graph, current));
        }
    }

    visited
}
