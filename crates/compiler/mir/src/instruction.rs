//! # MIR Instructions
//!
//! This module defines the instruction types for MIR.
//! Instructions perform computations but do not transfer control flow.

use std::collections::HashSet;

use crate::{BasicBlockId, ClassId, FieldId, FunctionId, PrettyPrint, Value, ValueId};

/// Binary operators for pure computations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Le,
}

impl BinaryOp {
    /// Returns true if the operands of this operator can be swapped freely.
    /// Used to canonicalize expression signatures before lookup.
    pub const fn is_commutative(&self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Eq | Self::Neq)
    }

    /// Returns true if evaluating this operator can fail observably
    /// (division by zero). Such instructions may still be deduplicated
    /// against a dominating twin, but never deleted while unused.
    pub const fn can_trap(&self) -> bool {
        matches!(self, Self::Div)
    }
}

/// Unary operators for pure computations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Element width of an indexed (typed buffer) access, in bytes.
///
/// A single physical buffer may be viewed at several widths; interference
/// between indexed accesses is therefore decided on byte ranges, never on
/// the apparent width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWidth {
    W1,
    W2,
    W4,
    W8,
}

impl ElementWidth {
    /// Size of one element in bytes
    pub const fn bytes(&self) -> i64 {
        match self {
            Self::W1 => 1,
            Self::W2 => 2,
            Self::W4 => 4,
            Self::W8 => 8,
        }
    }
}

/// An instruction performs an operation but does NOT transfer control
///
/// Instructions always fall through to the next instruction in the block.
/// Control flow changes are handled exclusively by terminators.
///
/// # Design Notes
///
/// - Each instruction has at most one operation
/// - Instructions can define at most one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The kind of instruction and its operands
    pub kind: InstructionKind,

    /// Optional comment for debugging
    pub comment: Option<String>,
}

/// The different kinds of instructions available in MIR
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Binary operation: `dest = left op right`
    BinaryOp {
        op: BinaryOp,
        dest: ValueId,
        left: Value,
        right: Value,
    },

    /// Unary operation: `dest = op source`
    UnaryOp {
        op: UnaryOp,
        dest: ValueId,
        source: Value,
    },

    /// SSA merge: `dest = phi [(block, value), ...]`
    /// Must appear at the start of a block, one source per predecessor.
    Phi {
        dest: ValueId,
        sources: Vec<(BasicBlockId, Value)>,
    },

    /// Heap allocation of an object with the given shape.
    /// Every field slot of the fresh object holds null.
    AllocateObject { dest: ValueId, class: ClassId },

    /// Heap allocation of a raw buffer of `length` bytes, zero initialized
    AllocateBuffer { dest: ValueId, length: i64 },

    /// Field load: `dest = object.field`
    LoadField {
        dest: ValueId,
        object: Value,
        field: FieldId,
    },

    /// Field store: `object.field = value`
    StoreField {
        object: Value,
        field: FieldId,
        value: Value,
    },

    /// Indexed load: `dest = buffer[index]` at the given element width
    LoadIndexed {
        dest: ValueId,
        buffer: Value,
        index: Value,
        width: ElementWidth,
    },

    /// Indexed store: `buffer[index] = value` at the given element width
    StoreIndexed {
        buffer: Value,
        index: Value,
        width: ElementWidth,
        value: Value,
    },

    /// Plain redefinition: `dest = source`, same object under a new name.
    /// Inserted by upstream passes to pin type information at a program point.
    Redefine { dest: ValueId, source: Value },

    /// Identity-preserving null check: `dest = source`, throws if null
    CheckNonNull { dest: ValueId, source: Value },

    /// Runtime type assertion: `dest = source`, throws on mismatch
    AssertType { dest: ValueId, source: Value },

    /// Call into another function: `dest = call callee(args)`.
    /// The callee may run arbitrary reentrant code; every argument escapes.
    Call {
        dest: Option<ValueId>,
        callee: FunctionId,
        args: Vec<Value>,
    },
}

impl Instruction {
    pub const fn new(kind: InstructionKind) -> Self {
        Self { kind, comment: None }
    }

    /// Creates a new binary operation instruction
    pub const fn binary_op(op: BinaryOp, dest: ValueId, left: Value, right: Value) -> Self {
        Self::new(InstructionKind::BinaryOp {
            op,
            dest,
            left,
            right,
        })
    }

    /// Creates a new unary operation instruction
    pub const fn unary_op(op: UnaryOp, dest: ValueId, source: Value) -> Self {
        Self::new(InstructionKind::UnaryOp { op, dest, source })
    }

    /// Creates a new phi instruction
    pub const fn phi(dest: ValueId, sources: Vec<(BasicBlockId, Value)>) -> Self {
        Self::new(InstructionKind::Phi { dest, sources })
    }

    /// Creates a new object allocation instruction
    pub const fn allocate_object(dest: ValueId, class: ClassId) -> Self {
        Self::new(InstructionKind::AllocateObject { dest, class })
    }

    /// Creates a new buffer allocation instruction
    pub const fn allocate_buffer(dest: ValueId, length: i64) -> Self {
        Self::new(InstructionKind::AllocateBuffer { dest, length })
    }

    /// Creates a new field load instruction
    pub const fn load_field(dest: ValueId, object: Value, field: FieldId) -> Self {
        Self::new(InstructionKind::LoadField {
            dest,
            object,
            field,
        })
    }

    /// Creates a new field store instruction
    pub const fn store_field(object: Value, field: FieldId, value: Value) -> Self {
        Self::new(InstructionKind::StoreField {
            object,
            field,
            value,
        })
    }

    /// Creates a new indexed load instruction
    pub const fn load_indexed(
        dest: ValueId,
        buffer: Value,
        index: Value,
        width: ElementWidth,
    ) -> Self {
        Self::new(InstructionKind::LoadIndexed {
            dest,
            buffer,
            index,
            width,
        })
    }

    /// Creates a new indexed store instruction
    pub const fn store_indexed(
        buffer: Value,
        index: Value,
        width: ElementWidth,
        value: Value,
    ) -> Self {
        Self::new(InstructionKind::StoreIndexed {
            buffer,
            index,
            width,
            value,
        })
    }

    /// Creates a new redefinition instruction
    pub const fn redefine(dest: ValueId, source: Value) -> Self {
        Self::new(InstructionKind::Redefine { dest, source })
    }

    /// Creates a new null check instruction
    pub const fn check_non_null(dest: ValueId, source: Value) -> Self {
        Self::new(InstructionKind::CheckNonNull { dest, source })
    }

    /// Creates a new type assertion instruction
    pub const fn assert_type(dest: ValueId, source: Value) -> Self {
        Self::new(InstructionKind::AssertType { dest, source })
    }

    /// Creates a new call instruction
    pub const fn call(dest: Option<ValueId>, callee: FunctionId, args: Vec<Value>) -> Self {
        Self::new(InstructionKind::Call { dest, callee, args })
    }

    /// Sets a comment for this instruction
    pub fn with_comment(mut self, comment: String) -> Self {
        self.comment = Some(comment);
        self
    }

    /// Returns the destination value if this instruction defines one
    pub fn destination(&self) -> Option<ValueId> {
        match &self.kind {
            InstructionKind::BinaryOp { dest, .. }
            | InstructionKind::UnaryOp { dest, .. }
            | InstructionKind::Phi { dest, .. }
            | InstructionKind::AllocateObject { dest, .. }
            | InstructionKind::AllocateBuffer { dest, .. }
            | InstructionKind::LoadField { dest, .. }
            | InstructionKind::LoadIndexed { dest, .. }
            | InstructionKind::Redefine { dest, .. }
            | InstructionKind::CheckNonNull { dest, .. }
            | InstructionKind::AssertType { dest, .. } => Some(*dest),

            InstructionKind::Call { dest, .. } => *dest,

            InstructionKind::StoreField { .. } | InstructionKind::StoreIndexed { .. } => None,
        }
    }

    /// Returns all operand values of this instruction, in operand order
    pub fn operands(&self) -> Vec<Value> {
        match &self.kind {
            InstructionKind::BinaryOp { left, right, .. } => vec![*left, *right],
            InstructionKind::UnaryOp { source, .. }
            | InstructionKind::Redefine { source, .. }
            | InstructionKind::CheckNonNull { source, .. }
            | InstructionKind::AssertType { source, .. } => vec![*source],
            InstructionKind::Phi { sources, .. } => sources.iter().map(|(_, v)| *v).collect(),
            InstructionKind::AllocateObject { .. } | InstructionKind::AllocateBuffer { .. } => {
                vec![]
            }
            InstructionKind::LoadField { object, .. } => vec![*object],
            InstructionKind::StoreField { object, value, .. } => vec![*object, *value],
            InstructionKind::LoadIndexed { buffer, index, .. } => vec![*buffer, *index],
            InstructionKind::StoreIndexed {
                buffer,
                index,
                value,
                ..
            } => vec![*buffer, *index, *value],
            InstructionKind::Call { args, .. } => args.clone(),
        }
    }

    /// Returns all values used by this instruction
    pub fn used_values(&self) -> HashSet<ValueId> {
        self.operands()
            .into_iter()
            .filter_map(|v| v.as_operand())
            .collect()
    }

    /// Replaces every use of `from` with `to`. Returns true if anything changed.
    pub fn replace_value_uses(&mut self, from: ValueId, to: Value) -> bool {
        let mut changed = false;
        let mut patch = |v: &mut Value| {
            if *v == Value::Operand(from) {
                *v = to;
                changed = true;
            }
        };

        match &mut self.kind {
            InstructionKind::BinaryOp { left, right, .. } => {
                patch(left);
                patch(right);
            }
            InstructionKind::UnaryOp { source, .. }
            | InstructionKind::Redefine { source, .. }
            | InstructionKind::CheckNonNull { source, .. }
            | InstructionKind::AssertType { source, .. } => patch(source),
            InstructionKind::Phi { sources, .. } => {
                for (_, v) in sources {
                    patch(v);
                }
            }
            InstructionKind::AllocateObject { .. } | InstructionKind::AllocateBuffer { .. } => {}
            InstructionKind::LoadField { object, .. } => patch(object),
            InstructionKind::StoreField { object, value, .. } => {
                patch(object);
                patch(value);
            }
            InstructionKind::LoadIndexed { buffer, index, .. } => {
                patch(buffer);
                patch(index);
            }
            InstructionKind::StoreIndexed {
                buffer,
                index,
                value,
                ..
            } => {
                patch(buffer);
                patch(index);
                patch(value);
            }
            InstructionKind::Call { args, .. } => {
                for arg in args {
                    patch(arg);
                }
            }
        }

        changed
    }

    /// Returns true if this instruction writes memory or has other effects
    /// observable outside the flow graph
    pub const fn has_side_effects(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::StoreField { .. }
                | InstructionKind::StoreIndexed { .. }
                | InstructionKind::Call { .. }
        )
    }

    /// Returns true if this instruction can fail observably (throw)
    pub fn can_trap(&self) -> bool {
        match &self.kind {
            InstructionKind::BinaryOp { op, .. } => op.can_trap(),
            InstructionKind::CheckNonNull { .. }
            | InstructionKind::AssertType { .. }
            | InstructionKind::Call { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this instruction is pure (no side effects, result only
    /// depends on inputs). Pure instructions are candidates for common
    /// subexpression elimination.
    pub const fn is_pure(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::BinaryOp { .. } | InstructionKind::UnaryOp { .. }
        )
    }

    /// Returns true if this instruction may be unlinked once its result has
    /// no remaining uses. Allocations qualify: an unobserved allocation is
    /// not an observable effect.
    pub fn is_removable_when_unused(&self) -> bool {
        match &self.kind {
            InstructionKind::BinaryOp { op, .. } => !op.can_trap(),
            InstructionKind::UnaryOp { .. }
            | InstructionKind::Phi { .. }
            | InstructionKind::Redefine { .. }
            | InstructionKind::LoadField { .. }
            | InstructionKind::LoadIndexed { .. } => true,
            _ => false,
        }
    }

    /// If this instruction is a transparent wrapper, returns the operand its
    /// output is semantically the same object as. The escape analysis treats
    /// every use of the wrapper's output as a use of this operand.
    pub const fn alias_transparent_source(&self) -> Option<Value> {
        match &self.kind {
            InstructionKind::Redefine { source, .. }
            | InstructionKind::CheckNonNull { source, .. }
            | InstructionKind::AssertType { source, .. } => Some(*source),
            _ => None,
        }
    }
}

impl PrettyPrint for Instruction {
    fn pretty_print(&self, _indent: usize) -> String {
        let mut result = String::new();

        if let Some(comment) = &self.comment {
            result.push_str(&format!("// {comment}\n"));
        }

        match &self.kind {
            InstructionKind::BinaryOp {
                op,
                dest,
                left,
                right,
            } => {
                result.push_str(&format!(
                    "{} = {} {:?} {}",
                    dest.pretty_print(0),
                    left.pretty_print(0),
                    op,
                    right.pretty_print(0)
                ));
            }

            InstructionKind::UnaryOp { op, dest, source } => {
                result.push_str(&format!(
                    "{} = {:?} {}",
                    dest.pretty_print(0),
                    op,
                    source.pretty_print(0)
                ));
            }

            InstructionKind::Phi { dest, sources } => {
                let sources_str = sources
                    .iter()
                    .map(|(block, v)| format!("[{:?}: {}]", block, v.pretty_print(0)))
                    .collect::<Vec<_>>()
                    .join(", ");
                result.push_str(&format!("{} = phi {}", dest.pretty_print(0), sources_str));
            }

            InstructionKind::AllocateObject { dest, class } => {
                result.push_str(&format!(
                    "{} = alloc_object class{}",
                    dest.pretty_print(0),
                    class.index()
                ));
            }

            InstructionKind::AllocateBuffer { dest, length } => {
                result.push_str(&format!(
                    "{} = alloc_buffer {length}",
                    dest.pretty_print(0)
                ));
            }

            InstructionKind::LoadField {
                dest,
                object,
                field,
            } => {
                result.push_str(&format!(
                    "{} = load_field {}.f{}",
                    dest.pretty_print(0),
                    object.pretty_print(0),
                    field.index()
                ));
            }

            InstructionKind::StoreField {
                object,
                field,
                value,
            } => {
                result.push_str(&format!(
                    "store_field {}.f{} = {}",
                    object.pretty_print(0),
                    field.index(),
                    value.pretty_print(0)
                ));
            }

            InstructionKind::LoadIndexed {
                dest,
                buffer,
                index,
                width,
            } => {
                result.push_str(&format!(
                    "{} = load_indexed {}[{} x{}]",
                    dest.pretty_print(0),
                    buffer.pretty_print(0),
                    index.pretty_print(0),
                    width.bytes()
                ));
            }

            InstructionKind::StoreIndexed {
                buffer,
                index,
                width,
                value,
            } => {
                result.push_str(&format!(
                    "store_indexed {}[{} x{}] = {}",
                    buffer.pretty_print(0),
                    index.pretty_print(0),
                    width.bytes(),
                    value.pretty_print(0)
                ));
            }

            InstructionKind::Redefine { dest, source } => {
                result.push_str(&format!(
                    "{} = redefine {}",
                    dest.pretty_print(0),
                    source.pretty_print(0)
                ));
            }

            InstructionKind::CheckNonNull { dest, source } => {
                result.push_str(&format!(
                    "{} = check_non_null {}",
                    dest.pretty_print(0),
                    source.pretty_print(0)
                ));
            }

            InstructionKind::AssertType { dest, source } => {
                result.push_str(&format!(
                    "{} = assert_type {}",
                    dest.pretty_print(0),
                    source.pretty_print(0)
                ));
            }

            InstructionKind::Call { dest, callee, args } => {
                let args_str = args
                    .iter()
                    .map(|arg| arg.pretty_print(0))
                    .collect::<Vec<_>>()
                    .join(", ");
                match dest {
                    Some(dest) => result.push_str(&format!(
                        "{} = call fn{}({})",
                        dest.pretty_print(0),
                        callee.index(),
                        args_str
                    )),
                    None => result.push_str(&format!("call fn{}({})", callee.index(), args_str)),
                }
            }
        }

        result
    }
}

impl PrettyPrint for ValueId {
    fn pretty_print(&self, _indent: usize) -> String {
        format!("%{}", self.index())
    }
}
