//! # Dominance Analysis
//!
//! This module computes the dominator tree for a flow graph.
//!
//! A node X dominates a node Y if every path from a graph root to Y must
//! pass through X. The immediate dominator of a node is its closest strict
//! dominator. Catch entries are roots of their own region; they take the
//! entry block as pseudo-predecessor, so the entry block dominates every
//! catch entry and the tree stays connected.

use rustc_hash::FxHashMap;

use crate::{cfg, BasicBlockId, FlowGraph};

/// A dominator tree represented as a mapping from each block to its
/// immediate dominator. The entry block has no entry in the map.
pub type DominatorTree = FxHashMap<BasicBlockId, BasicBlockId>;

/// Computes the dominator tree using the Cooper-Harvey-Kennedy algorithm
///
/// This is an efficient iterative algorithm that computes immediate
/// dominators directly, O(n²) worst case but close to linear in practice.
///
/// ## Algorithm
/// 1. Compute blocks in reverse postorder (RPO)
/// 2. Initialize the entry block's idom to itself
/// 3. Iterate until convergence, updating idoms using the intersect function
pub fn compute_dominator_tree(graph: &FlowGraph) -> DominatorTree {
    let entry = graph.entry_block;

    let rpo = cfg::compute_reverse_postorder(graph);
    let mut rpo_number = FxHashMap::default();
    for (i, &block) in rpo.iter().enumerate() {
        rpo_number.insert(block, i);
    }

    let mut idom = FxHashMap::default();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;

        for &block in &rpo {
            if block == entry {
                continue;
            }

            let preds = analysis_predecessors(graph, block);
            if preds.is_empty() {
                continue;
            }

            let mut new_idom = None;
            for &pred in &preds {
                if idom.contains_key(&pred) {
                    new_idom = Some(pred);
                    break;
                }
            }

            if let Some(mut current_idom) = new_idom {
                for &pred in &preds {
                    if idom.contains_key(&pred) && pred != current_idom {
                        current_idom = intersect(pred, current_idom, &idom, &rpo_number);
                    }
                }

                if idom.get(&block) != Some(&current_idom) {
                    idom.insert(block, current_idom);
                    changed = true;
                }
            }
        }
    }

    if idom.get(&entry) == Some(&entry) {
        idom.remove(&entry);
    }

    idom
}

/// Returns true if `a` dominates `b` (reflexively)
pub fn dominates(dom_tree: &DominatorTree, a: BasicBlockId, b: BasicBlockId) -> bool {
    if a == b {
        return true;
    }
    let mut runner = b;
    while let Some(&idom) = dom_tree.get(&runner) {
        if idom == a {
            return true;
        }
        if idom == runner {
            break;
        }
        runner = idom;
    }
    false
}

/// Predecessors as seen by the dominance computation: ordinary CFG
/// predecessors, plus the entry block as pseudo-predecessor of every catch
/// entry.
fn analysis_predecessors(graph: &FlowGraph, block: BasicBlockId) -> Vec<BasicBlockId> {
    let mut preds = cfg::get_predecessors(graph, block);
    if graph.catch_entries.contains(&block) {
        preds.push(graph.entry_block);
    }
    preds
}

/// Cooper's intersect function for finding the common dominator
fn intersect(
    mut b1: BasicBlockId,
    mut b2: BasicBlockId,
    idom: &DominatorTree,
    rpo_number: &FxHashMap<BasicBlockId, usize>,
) -> BasicBlockId {
    while b1 != b2 {
        while rpo_number[&b1] > rpo_number[&b2] {
            b1 = idom[&b1];
        }
        while rpo_number[&b2] > rpo_number[&b1] {
            b2 = idom[&b2];
        }
    }
    b1
}
