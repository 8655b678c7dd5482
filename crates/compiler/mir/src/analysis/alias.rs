//! # Allocation Escape Classification
//!
//! Computes, for every heap allocation in the graph, whether its address
//! can be observed outside the directly-analyzed operations. The result
//! drives load forwarding: loads and stores through a non-escaping
//! allocation cannot be affected by calls or by accesses through unrelated
//! references.
//!
//! Identities live in a side table keyed by allocation id, so the
//! fixed-point iteration is independent of instruction object identity and
//! the one-directional transition invariant (Unknown → NotAliased frozen,
//! or → Aliased frozen) is easy to audit: the table is written once per
//! allocation, after the fixed point has stabilized.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::use_chains::{UsePosition, UseChains};
use crate::{FieldId, FlowGraph, InstructionKind, Value, ValueId};

/// Escape identity of a heap allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasIdentity {
    /// Not yet decided; only observable while classification is running
    Unknown,
    /// The address never leaves the analyzed operations; no other reference
    /// can reach this object
    NotAliased,
    /// The address may be observed elsewhere (call argument, return,
    /// stored into an escaping container, merged through a phi, ...)
    Aliased,
}

impl AliasIdentity {
    pub const fn is_not_aliased(&self) -> bool {
        matches!(self, Self::NotAliased)
    }
}

/// Side table mapping each allocation-site definition to its final identity
pub type AliasMap = FxHashMap<ValueId, AliasIdentity>;

/// The location family an allocation was stored into, for alias-load chasing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredSlot {
    Field(FieldId),
    Indexed,
}

/// Classifies every heap allocation in the graph.
///
/// The scan walks each allocation's full transitive use chain, treating any
/// use of a transparent wrapper's output as a use of the wrapped allocation.
/// Escalating uses (call argument, return, phi merge, store into a
/// possibly-escaping container) mark the allocation `Aliased`; a store into
/// a tracked container defers the decision until the container's own
/// identity stabilizes, and loads that can retrieve the stored value are
/// chased as additional names. Allocations with no escalating use resolve
/// to `NotAliased`.
pub fn classify_allocations(graph: &FlowGraph, chains: &UseChains) -> AliasMap {
    let mut allocations = FxHashSet::default();
    for (_block_id, block) in graph.blocks() {
        for instruction in &block.instructions {
            if matches!(
                instruction.kind,
                InstructionKind::AllocateObject { .. } | InstructionKind::AllocateBuffer { .. }
            ) {
                allocations.insert(instruction.destination().unwrap());
            }
        }
    }

    // container -> allocations stored into it, resolved once the
    // container's identity is known
    let mut deps: FxHashMap<ValueId, Vec<ValueId>> = FxHashMap::default();
    let mut directly_escaping = Vec::new();

    for &alloc in &allocations {
        if scan_escapes(graph, chains, &allocations, alloc, &mut deps) {
            directly_escaping.push(alloc);
        }
    }

    // Propagate container aliasing to the values stored into them.
    let mut identities: AliasMap = allocations
        .iter()
        .map(|&a| (a, AliasIdentity::Unknown))
        .collect();
    let mut worklist = directly_escaping;
    while let Some(alloc) = worklist.pop() {
        let identity = identities.get_mut(&alloc).unwrap();
        if *identity == AliasIdentity::Aliased {
            continue;
        }
        *identity = AliasIdentity::Aliased;
        if let Some(stored) = deps.get(&alloc) {
            worklist.extend(stored.iter().copied());
        }
    }

    let mut not_aliased = 0usize;
    for identity in identities.values_mut() {
        if *identity == AliasIdentity::Unknown {
            *identity = AliasIdentity::NotAliased;
            not_aliased += 1;
        }
    }

    log::debug!(
        "alias classification for '{}': {} allocations, {} not aliased",
        graph.name,
        identities.len(),
        not_aliased
    );

    identities
}

/// Scans the transitive use chain of `alloc`. Returns true on the first
/// escalating use. Deferred container edges are recorded in `deps`.
fn scan_escapes(
    graph: &FlowGraph,
    chains: &UseChains,
    allocations: &FxHashSet<ValueId>,
    alloc: ValueId,
    deps: &mut FxHashMap<ValueId, Vec<ValueId>>,
) -> bool {
    // Names the object is known under: the allocation itself, its
    // transparent wrappers, and loads that retrieve it from a tracked
    // container. The visited set makes self-referential stores terminate.
    let mut visited = FxHashSet::default();
    let mut names = vec![alloc];

    while let Some(name) = names.pop() {
        if !visited.insert(name) {
            continue;
        }

        for site in chains.uses_of(name) {
            let index = match site.position {
                // Returning the value or branching on it escapes it.
                UsePosition::Terminator => return true,
                UsePosition::Instruction(index) => index,
            };
            let instruction = &graph.basic_blocks[site.block].instructions[index];
            let name_value = Value::Operand(name);

            match &instruction.kind {
                InstructionKind::LoadField { .. } => {}

                InstructionKind::LoadIndexed { index, .. } => {
                    if *index == name_value {
                        return true;
                    }
                }

                InstructionKind::StoreField {
                    object,
                    field,
                    value,
                } => {
                    if *value == name_value
                        && !record_container_store(
                            graph,
                            chains,
                            allocations,
                            alloc,
                            *object,
                            StoredSlot::Field(*field),
                            deps,
                            &mut names,
                        )
                    {
                        return true;
                    }
                }

                InstructionKind::StoreIndexed {
                    buffer,
                    index,
                    value,
                    ..
                } => {
                    if *index == name_value {
                        return true;
                    }
                    if *value == name_value
                        && !record_container_store(
                            graph,
                            chains,
                            allocations,
                            alloc,
                            *buffer,
                            StoredSlot::Indexed,
                            deps,
                            &mut names,
                        )
                    {
                        return true;
                    }
                }

                InstructionKind::Redefine { dest, .. }
                | InstructionKind::CheckNonNull { dest, .. }
                | InstructionKind::AssertType { dest, .. } => {
                    names.push(*dest);
                }

                // Call arguments escape; a phi merge materializes a second
                // name the classifier does not track; any other use
                // observes the address.
                _ => return true,
            }
        }
    }

    false
}

/// Handles `container.<slot> = alloc`. Returns false if the store escapes
/// the value outright; otherwise records the deferred dependency and chases
/// loads that can retrieve the value back out of the container.
#[allow(clippy::too_many_arguments)]
fn record_container_store(
    graph: &FlowGraph,
    chains: &UseChains,
    allocations: &FxHashSet<ValueId>,
    alloc: ValueId,
    container: Value,
    slot: StoredSlot,
    deps: &mut FxHashMap<ValueId, Vec<ValueId>>,
    names: &mut Vec<ValueId>,
) -> bool {
    let container = match chains.origin_of(graph, container) {
        Some(origin) if allocations.contains(&origin) => origin,
        // Stored into an object we cannot account for.
        _ => return false,
    };

    deps.entry(container).or_default().push(alloc);

    // A load of the same location family is another way to reach the
    // stored value; its result must be scanned as a further name.
    for name in wrapper_closure(graph, chains, container) {
        for site in chains.uses_of(name) {
            let UsePosition::Instruction(index) = site.position else {
                continue;
            };
            let instruction = &graph.basic_blocks[site.block].instructions[index];
            match (&instruction.kind, slot) {
                (
                    InstructionKind::LoadField { dest, object, field },
                    StoredSlot::Field(stored_field),
                ) if *object == Value::Operand(name) && *field == stored_field => {
                    names.push(*dest);
                }
                (InstructionKind::LoadIndexed { dest, buffer, .. }, StoredSlot::Indexed)
                    if *buffer == Value::Operand(name) =>
                {
                    names.push(*dest);
                }
                _ => {}
            }
        }
    }

    true
}

/// The definition plus every transparent wrapper built on top of it
fn wrapper_closure(graph: &FlowGraph, chains: &UseChains, base: ValueId) -> Vec<ValueId> {
    let mut out = vec![base];
    let mut seen: FxHashSet<ValueId> = out.iter().copied().collect();
    let mut stack = vec![base];

    while let Some(name) = stack.pop() {
        for site in chains.uses_of(name) {
            let UsePosition::Instruction(index) = site.position else {
                continue;
            };
            let instruction = &graph.basic_blocks[site.block].instructions[index];
            if instruction.alias_transparent_source() == Some(Value::Operand(name)) {
                let dest = instruction.destination().unwrap();
                if seen.insert(dest) {
                    out.push(dest);
                    stack.push(dest);
                }
            }
        }
    }

    out
}
