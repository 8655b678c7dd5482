//! # MIR Optimization Passes
//!
//! This module hosts the pass framework and the redundancy-elimination
//! stage: dominator-scoped common subexpression elimination with load/store
//! forwarding, and the catch-entry state optimizer.

pub mod catch_entry;
pub mod redundancy_elimination;

pub use catch_entry::CatchEntryOptimizer;
pub use redundancy_elimination::RedundancyElimination;

use crate::FlowGraph;

/// A trait for MIR optimization passes
pub trait MirPass {
    /// Apply this pass to a flow graph.
    /// Returns true if the graph was modified.
    fn run(&mut self, graph: &mut FlowGraph) -> bool;

    /// Get the name of this pass for debugging
    fn name(&self) -> &'static str;
}

/// A wrapper for conditional pass execution
///
/// This allows passes to be skipped based on graph characteristics,
/// improving compilation performance for functions that don't need certain
/// optimizations.
pub struct ConditionalPass {
    pass: Box<dyn MirPass>,
    condition: fn(&FlowGraph) -> bool,
}

impl ConditionalPass {
    /// Create a new conditional pass
    pub fn new(pass: Box<dyn MirPass>, condition: fn(&FlowGraph) -> bool) -> Self {
        Self { pass, condition }
    }
}

impl MirPass for ConditionalPass {
    fn run(&mut self, graph: &mut FlowGraph) -> bool {
        if (self.condition)(graph) {
            self.pass.run(graph)
        } else {
            false
        }
    }

    fn name(&self) -> &'static str {
        self.pass.name()
    }
}

/// Returns true if the graph has any catch entries worth optimizing
pub fn graph_has_catch_entries(graph: &FlowGraph) -> bool {
    !graph.catch_entries.is_empty()
}

/// MIR Validation Pass
///
/// Validates the flow graph against its core invariants. Useful to run
/// after other passes: a violation here is a defect in the pass that
/// produced it, not a recoverable condition.
#[derive(Debug, Default)]
pub struct Validation;

impl Validation {
    /// Create a new validation pass
    pub const fn new() -> Self {
        Self
    }
}

impl MirPass for Validation {
    fn run(&mut self, graph: &mut FlowGraph) -> bool {
        if let Err(err) = graph.validate() {
            log::error!("MIR validation failed for '{}': {}", graph.name, err);
            panic!("MIR validation failed for '{}': {err}", graph.name);
        }
        false
    }

    fn name(&self) -> &'static str {
        "Validation"
    }
}

/// A pass manager that can run multiple passes in sequence
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn MirPass>>,
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: MirPass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Add a conditional pass to the manager.
    /// The pass will only run if the condition function returns true.
    pub fn add_conditional_pass<P: MirPass + 'static>(
        mut self,
        pass: P,
        condition: fn(&FlowGraph) -> bool,
    ) -> Self {
        self.passes
            .push(Box::new(ConditionalPass::new(Box::new(pass), condition)));
        self
    }

    /// Run all passes on the graph.
    /// Returns true if any pass modified the graph.
    pub fn run(&mut self, graph: &mut FlowGraph) -> bool {
        let mut modified = false;

        for pass in &mut self.passes {
            if pass.run(graph) {
                modified = true;
                log::debug!("pass '{}' modified '{}'", pass.name(), graph.name);
            }
        }

        modified
    }

    /// Create the standard redundancy-elimination pipeline
    pub fn standard_pipeline(is_ahead_of_time: bool) -> Self {
        Self::new()
            .add_pass(RedundancyElimination::new())
            .add_conditional_pass(
                CatchEntryOptimizer::new(is_ahead_of_time),
                graph_has_catch_entries,
            )
            .add_pass(Validation::new())
    }
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
