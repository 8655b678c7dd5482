//! # Dominator-Based Redundancy Elimination
//!
//! This pass removes provably redundant memory operations and
//! recomputations from a flow graph:
//!
//! - no two dominator-comparable pure computations with identical operands
//!   remain both materialized; the later one is replaced by the earlier
//! - a load from a location whose value is already known (dominating store,
//!   allocation with known initial value, or prior load of the same alias
//!   class with no interfering write in between) is replaced by that value
//! - a store that writes the value the location already holds is deleted
//!
//! Blocks are visited in reverse postorder carrying a table of available
//! expression records. At a merge the table is the intersection of the
//! predecessors' exit tables, keyed by matching class/signature *and*
//! matching provider; a record that survives the intersection is available
//! on every incoming path, so its provider necessarily dominates the merge.
//! A block with a not-yet-visited predecessor (a loop back edge) and every
//! catch entry starts from the empty table.
//!
//! Aliasing questions are answered by the escape classification computed up
//! front: accesses rooted in a `NotAliased` allocation can never be
//! disturbed through an unrelated reference or by a call. Whenever a class
//! cannot be computed or interference cannot be ruled out, the pass skips
//! the transformation; the worst case is that it does nothing.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::use_chains::DefSite;
use crate::analysis::{
    classify_allocations, compute_dominator_tree, dominates, AliasMap, DominatorTree, UseChains,
};
use crate::passes::MirPass;
use crate::{
    cfg, BasicBlockId, BinaryOp, ElementWidth, FieldId, FlowGraph, InstructionKind, UnaryOp,
    Value, ValueId,
};

/// In-place redundancy elimination. Idempotent: a second run on an already
/// optimized graph performs no further changes.
pub fn eliminate_redundancies(graph: &mut FlowGraph) {
    run_elimination(graph);
}

/// Redundancy elimination packaged as a pass
#[derive(Debug, Default)]
pub struct RedundancyElimination;

impl RedundancyElimination {
    pub const fn new() -> Self {
        Self
    }
}

impl MirPass for RedundancyElimination {
    fn run(&mut self, graph: &mut FlowGraph) -> bool {
        run_elimination(graph)
    }

    fn name(&self) -> &'static str {
        "RedundancyElimination"
    }
}

fn run_elimination(graph: &mut FlowGraph) -> bool {
    let rewrites = {
        let mut eliminator = Eliminator::new(graph);
        eliminator.run();
        eliminator.rewrites
    };

    let forwarded = rewrites.subst.len();
    let deleted: usize = rewrites.deletions.values().map(|d| d.len()).sum();

    let mut modified = !rewrites.is_empty();

    // Rewrite every use before unlinking anything: no use ever observes a
    // removed definition.
    for &from in rewrites.subst.keys() {
        let to = rewrites.resolve(Value::Operand(from));
        graph.replace_all_uses(from, to);
    }
    for (&block_id, indices) in &rewrites.deletions {
        let block = &mut graph.basic_blocks[block_id];
        let mut index = 0;
        block.instructions.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }

    modified |= unlink_unused_definitions(graph);

    log::debug!(
        "redundancy elimination for '{}': {} values forwarded, {} instructions deleted",
        graph.name,
        forwarded,
        deleted
    );

    modified
}

/// Unlinks side-effect-free definitions whose results have no remaining
/// uses. Iterates because each removal can strand the operands of the
/// removed instruction.
fn unlink_unused_definitions(graph: &mut FlowGraph) -> bool {
    let mut removed_any = false;

    loop {
        let counts = graph.value_use_counts();
        let mut to_remove: FxHashMap<BasicBlockId, FxHashSet<usize>> = FxHashMap::default();

        for (block_id, block) in graph.blocks() {
            for (index, instruction) in block.instructions.iter().enumerate() {
                if let Some(dest) = instruction.destination() {
                    if counts.get(&dest).copied().unwrap_or(0) == 0
                        && instruction.is_removable_when_unused()
                    {
                        to_remove.entry(block_id).or_default().insert(index);
                    }
                }
            }
        }

        if to_remove.is_empty() {
            return removed_any;
        }
        removed_any = true;

        for (block_id, indices) in to_remove {
            let block = &mut graph.basic_blocks[block_id];
            let mut index = 0;
            block.instructions.retain(|_| {
                let keep = !indices.contains(&index);
                index += 1;
                keep
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Alias-class registry
// ---------------------------------------------------------------------------

/// Byte extent of an indexed access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IndexKey {
    /// `[start, end)` byte range computed from a constant index
    Const { start: i64, end: i64 },
    /// Non-constant index; equal only to an access with the same index
    /// definition and width, and assumed to intersect everything else
    Dynamic { index: Value, width: i64 },
}

impl IndexKey {
    fn from_access(index: Value, width: ElementWidth) -> Self {
        match index.as_const_integer() {
            Some(i) => {
                let start = i * width.bytes();
                Self::Const {
                    start,
                    end: start + width.bytes(),
                }
            }
            None => Self::Dynamic {
                index,
                width: width.bytes(),
            },
        }
    }

    /// Half-open byte-range intersection, independent of the apparent
    /// element representation of either access
    fn may_intersect(self, other: Self) -> bool {
        match (self, other) {
            (Self::Const { start, end }, Self::Const { start: s2, end: e2 }) => {
                start < e2 && s2 < end
            }
            _ => true,
        }
    }
}

/// Abstract key for a memory location family. The base is always the
/// wrapper-resolved origin definition of the accessed object or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AliasClass {
    /// A field slot of an object; nominal, exact-match on the slot
    Field { object: ValueId, slot: FieldId },
    /// A byte range of a buffer
    Indexed { buffer: ValueId, key: IndexKey },
}

impl AliasClass {
    const fn base(&self) -> ValueId {
        match self {
            Self::Field { object, .. } => *object,
            Self::Indexed { buffer, .. } => *buffer,
        }
    }

    /// Could the two classes denote overlapping physical memory?
    fn interferes(&self, other: &Self, alias: &AliasMap) -> bool {
        match (self, other) {
            (
                Self::Field { object: o1, slot: s1 },
                Self::Field { object: o2, slot: s2 },
            ) => s1 == s2 && may_be_same_object(*o1, *o2, alias),
            (
                Self::Indexed { buffer: b1, key: k1 },
                Self::Indexed { buffer: b2, key: k2 },
            ) => may_be_same_object(*b1, *b2, alias) && k1.may_intersect(*k2),
            // A field slot and a buffer element never overlap.
            _ => false,
        }
    }
}

/// Could two base definitions refer to the same object?
fn may_be_same_object(a: ValueId, b: ValueId, alias: &AliasMap) -> bool {
    if a == b {
        return true;
    }
    let a_identity = alias.get(&a);
    let b_identity = alias.get(&b);
    // Two distinct allocation sites are distinct objects.
    if a_identity.is_some() && b_identity.is_some() {
        return false;
    }
    // A non-escaping allocation cannot be reached via an unrelated reference.
    if a_identity.is_some_and(|i| i.is_not_aliased()) {
        return false;
    }
    if b_identity.is_some_and(|i| i.is_not_aliased()) {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Available-expression tables
// ---------------------------------------------------------------------------

/// Structural signature of a pure, side-effect-free computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PureSignature {
    Binary {
        op: BinaryOp,
        left: Value,
        right: Value,
    },
    Unary {
        op: UnaryOp,
        operand: Value,
    },
    NonNullCheck {
        source: Value,
    },
    TypeAssertion {
        source: Value,
    },
}

/// A previously computed value proven still valid at the current point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AvailRecord {
    value: Value,
    block: BasicBlockId,
}

/// Path-sensitive table of available expressions, valid on one walk path
#[derive(Debug, Clone, Default)]
struct AvailTable {
    memory: FxHashMap<AliasClass, AvailRecord>,
    pure: FxHashMap<PureSignature, AvailRecord>,
    /// Allocations whose untouched field slots still hold their initial null
    fresh: FxHashSet<ValueId>,
}

impl AvailTable {
    /// Intersection of predecessor exit tables: a record survives only if
    /// every predecessor proves the same key with the same provider.
    fn meet(tables: &[&Self], at: BasicBlockId) -> Self {
        let (first, rest) = tables
            .split_first()
            .expect("meet requires at least one table");
        let mut out = (*first).clone();

        out.memory.retain(|class, record| {
            rest.iter()
                .all(|t| t.memory.get(class).is_some_and(|r| r.value == record.value))
        });
        out.pure.retain(|signature, record| {
            rest.iter()
                .all(|t| t.pure.get(signature).is_some_and(|r| r.value == record.value))
        });
        out.fresh.retain(|a| rest.iter().all(|t| t.fresh.contains(a)));

        for record in out.memory.values_mut() {
            record.block = at;
        }
        for record in out.pure.values_mut() {
            record.block = at;
        }

        out
    }

    /// Drops every record an interfering store may have clobbered. A store
    /// that may hit an allocation also retires its fresh marker: the slot
    /// record inserted for the store would shadow the overwritten slot on
    /// this path, but the marker alone cannot tell overwritten slots apart
    /// once tables meet at a join.
    fn invalidate_interfering(&mut self, class: &AliasClass, alias: &AliasMap) {
        self.memory.retain(|existing, _| !existing.interferes(class, alias));
        let base = class.base();
        self.fresh.retain(|&a| !may_be_same_object(a, base, alias));
    }

    /// Drops every record a write through an unaccountable reference, or
    /// arbitrary reentrant execution, may have clobbered. Records rooted in
    /// non-escaping allocations survive.
    fn invalidate_escaping_memory(&mut self, alias: &AliasMap) {
        self.memory.retain(|class, _| {
            alias
                .get(&class.base())
                .is_some_and(|identity| identity.is_not_aliased())
        });
        self.fresh
            .retain(|a| alias.get(a).is_some_and(|identity| identity.is_not_aliased()));
    }
}

// ---------------------------------------------------------------------------
// The walk
// ---------------------------------------------------------------------------

/// Pending rewrites, applied to the graph only after the walk finishes
#[derive(Debug, Default)]
struct Rewrites {
    subst: FxHashMap<ValueId, Value>,
    deletions: FxHashMap<BasicBlockId, FxHashSet<usize>>,
}

impl Rewrites {
    /// Resolves a value through the pending substitutions
    fn resolve(&self, value: Value) -> Value {
        let mut current = value;
        while let Value::Operand(id) = current {
            match self.subst.get(&id) {
                Some(&next) => current = next,
                None => break,
            }
        }
        current
    }

    fn delete(&mut self, block: BasicBlockId, index: usize) {
        self.deletions.entry(block).or_default().insert(index);
    }

    fn is_empty(&self) -> bool {
        self.subst.is_empty() && self.deletions.is_empty()
    }
}

struct Eliminator<'g> {
    graph: &'g FlowGraph,
    chains: UseChains,
    alias: AliasMap,
    dom_tree: DominatorTree,
    exit_tables: FxHashMap<BasicBlockId, AvailTable>,
    rewrites: Rewrites,
}

impl<'g> Eliminator<'g> {
    fn new(graph: &'g FlowGraph) -> Self {
        let chains = UseChains::compute(graph);
        let alias = classify_allocations(graph, &chains);
        let dom_tree = compute_dominator_tree(graph);

        Self {
            graph,
            chains,
            alias,
            dom_tree,
            exit_tables: FxHashMap::default(),
            rewrites: Rewrites::default(),
        }
    }

    fn run(&mut self) {
        for block_id in cfg::compute_reverse_postorder(self.graph) {
            let mut table = self.entry_table(block_id);
            self.process_block(block_id, &mut table);
            self.exit_tables.insert(block_id, table);
        }
    }

    /// Table valid on entry to a block
    fn entry_table(&self, block_id: BasicBlockId) -> AvailTable {
        let block = &self.graph.basic_blocks[block_id];

        // Exceptional entries arrive with unknown memory state.
        if block.is_catch_entry() || block.preds.is_empty() {
            return AvailTable::default();
        }

        let mut tables = Vec::with_capacity(block.preds.len());
        for pred in &block.preds {
            match self.exit_tables.get(pred) {
                Some(table) => tables.push(table),
                // Back edge: the predecessor has not been walked yet. Start
                // from nothing rather than guessing what survives the loop.
                None => return AvailTable::default(),
            }
        }

        if tables.len() == 1 {
            tables[0].clone()
        } else {
            AvailTable::meet(&tables, block_id)
        }
    }

    fn process_block(&mut self, block_id: BasicBlockId, table: &mut AvailTable) {
        let graph = self.graph;
        let count = graph.basic_blocks[block_id].instructions.len();

        for index in 0..count {
            let instruction = &graph.basic_blocks[block_id].instructions[index];

            match &instruction.kind {
                InstructionKind::BinaryOp { dest, .. }
                | InstructionKind::UnaryOp { dest, .. }
                | InstructionKind::CheckNonNull { dest, .. }
                | InstructionKind::AssertType { dest, .. } => {
                    let dest = *dest;
                    if let Some(signature) = self.pure_signature(&instruction.kind) {
                        if let Some(record) = table.pure.get(&signature) {
                            let value = record.value;
                            self.forward(block_id, index, dest, value);
                        } else {
                            table.pure.insert(
                                signature,
                                AvailRecord {
                                    value: Value::Operand(dest),
                                    block: block_id,
                                },
                            );
                        }
                    }
                }

                InstructionKind::Phi { .. } => {}

                InstructionKind::AllocateObject { dest, .. } => {
                    table.fresh.insert(*dest);
                }

                InstructionKind::AllocateBuffer { .. } => {}

                InstructionKind::LoadField {
                    dest,
                    object,
                    field,
                } => {
                    let dest = *dest;
                    let field = *field;
                    match self.field_class(*object, field) {
                        Some(class) => {
                            if let Some(record) = table.memory.get(&class) {
                                let value = record.value;
                                self.forward(block_id, index, dest, value);
                            } else if table.fresh.contains(&class.base()) {
                                // Untouched slot of a fresh allocation.
                                self.forward(block_id, index, dest, Value::null());
                            } else {
                                table.memory.insert(
                                    class,
                                    AvailRecord {
                                        value: Value::Operand(dest),
                                        block: block_id,
                                    },
                                );
                            }
                        }
                        None => {}
                    }
                }

                InstructionKind::LoadIndexed {
                    dest,
                    buffer,
                    index: element,
                    width,
                } => {
                    let dest = *dest;
                    match self.indexed_class(*buffer, *element, *width) {
                        Some(class) => {
                            if let Some(record) = table.memory.get(&class) {
                                let value = record.value;
                                self.forward(block_id, index, dest, value);
                            } else {
                                table.memory.insert(
                                    class,
                                    AvailRecord {
                                        value: Value::Operand(dest),
                                        block: block_id,
                                    },
                                );
                            }
                        }
                        None => {}
                    }
                }

                InstructionKind::StoreField {
                    object,
                    field,
                    value,
                } => {
                    let stored = self.rewrites.resolve(*value);
                    let class = self.field_class(*object, *field);
                    self.process_store(block_id, index, class, stored, table, true);
                }

                InstructionKind::StoreIndexed {
                    buffer,
                    index: element,
                    width,
                    value,
                } => {
                    let stored = self.rewrites.resolve(*value);
                    let class = self.indexed_class(*buffer, *element, *width);
                    self.process_store(block_id, index, class, stored, table, false);
                }

                InstructionKind::Redefine { .. } => {}

                InstructionKind::Call { .. } => {
                    // Arbitrary reentrant execution: anything that escaped
                    // may be read or written by the callee.
                    table.invalidate_escaping_memory(&self.alias);
                }
            }
        }
    }

    fn process_store(
        &mut self,
        block_id: BasicBlockId,
        index: usize,
        class: Option<AliasClass>,
        stored: Value,
        table: &mut AvailTable,
        null_initialized: bool,
    ) {
        let Some(class) = class else {
            // The accessed object cannot be accounted for; assume the store
            // hits anything that escaped.
            table.invalidate_escaping_memory(&self.alias);
            return;
        };

        let current = table.memory.get(&class).map(|record| record.value).or({
            if null_initialized && table.fresh.contains(&class.base()) {
                Some(Value::null())
            } else {
                None
            }
        });

        if current == Some(stored) {
            // The location already holds this exact value.
            self.rewrites.delete(block_id, index);
            log::trace!("dead store to {class:?} removed in {block_id:?}");
            return;
        }

        table.invalidate_interfering(&class, &self.alias);
        table.memory.insert(
            class,
            AvailRecord {
                value: stored,
                block: block_id,
            },
        );
    }

    /// Records the replacement of `dest` and schedules its defining
    /// instruction for deletion.
    fn forward(&mut self, block_id: BasicBlockId, index: usize, dest: ValueId, value: Value) {
        if let Value::Operand(provider) = value {
            if let Some(DefSite::Instruction { block, .. }) = self.chains.def_site(provider) {
                debug_assert!(
                    dominates(&self.dom_tree, block, block_id),
                    "forwarded value {provider:?} must dominate its uses in {block_id:?}"
                );
            }
        }
        self.rewrites.subst.insert(dest, value);
        self.rewrites.delete(block_id, index);
    }

    fn field_class(&self, object: Value, field: FieldId) -> Option<AliasClass> {
        let object = self.resolved_origin(object)?;
        Some(AliasClass::Field {
            object,
            slot: field,
        })
    }

    fn indexed_class(
        &self,
        buffer: Value,
        index: Value,
        width: ElementWidth,
    ) -> Option<AliasClass> {
        let buffer = self.resolved_origin(buffer)?;
        let index = self.rewrites.resolve(index);
        Some(AliasClass::Indexed {
            buffer,
            key: IndexKey::from_access(index, width),
        })
    }

    /// Resolves a base operand to its origin definition, interleaving the
    /// pending substitutions with transparent-wrapper chasing. Forwarding a
    /// load can reveal that two accesses go through the same object; the
    /// interleaving makes the registry see that before the graph is
    /// rewritten.
    fn resolved_origin(&self, value: Value) -> Option<ValueId> {
        let mut current = self.rewrites.resolve(value).as_operand()?;
        loop {
            if let Some(&next) = self.rewrites.subst.get(&current) {
                current = next.as_operand()?;
                continue;
            }
            match self
                .chains
                .defining_instruction(self.graph, current)
                .and_then(|instruction| instruction.alias_transparent_source())
            {
                Some(source) => {
                    current = self.rewrites.resolve(source).as_operand()?;
                }
                None => return Some(current),
            }
        }
    }

    /// Structural signature of a pure computation, with commutative
    /// operands canonicalized, or None if the instruction is not a CSE
    /// candidate.
    fn pure_signature(&self, kind: &InstructionKind) -> Option<PureSignature> {
        match kind {
            InstructionKind::BinaryOp {
                op, left, right, ..
            } => {
                let mut left = self.rewrites.resolve(*left);
                let mut right = self.rewrites.resolve(*right);
                if op.is_commutative() && value_order_key(&right) < value_order_key(&left) {
                    std::mem::swap(&mut left, &mut right);
                }
                Some(PureSignature::Binary {
                    op: *op,
                    left,
                    right,
                })
            }
            InstructionKind::UnaryOp { op, source, .. } => Some(PureSignature::Unary {
                op: *op,
                operand: self.rewrites.resolve(*source),
            }),
            // A dominating identical check already performed the exact same
            // observation; the later one cannot fail differently.
            InstructionKind::CheckNonNull { source, .. } => Some(PureSignature::NonNullCheck {
                source: self.rewrites.resolve(*source),
            }),
            InstructionKind::AssertType { source, .. } => Some(PureSignature::TypeAssertion {
                source: self.rewrites.resolve(*source),
            }),
            _ => None,
        }
    }
}

/// Total order on values used to canonicalize commutative operand pairs
fn value_order_key(value: &Value) -> (u8, i64) {
    match value {
        Value::Literal(crate::Literal::Null) => (0, 0),
        Value::Literal(crate::Literal::Boolean(b)) => (1, *b as i64),
        Value::Literal(crate::Literal::Integer(i)) => (2, *i),
        Value::Operand(id) => (3, id.index() as i64),
    }
}

#[cfg(test)]
#[path = "redundancy_elimination_tests.rs"]
mod tests;
