//! # MIR Values
//!
//! This module defines values and operands in the MIR system.
//! Values represent data that flows through the program.

use crate::PrettyPrint;

/// Represents any value in the program: literals and computed values.
///
/// # Design Notes
///
/// - Literals are embedded directly for efficiency
/// - Operands reference values computed by instructions
/// - The type is Copy for efficient passing around
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum Value {
    /// A constant literal value
    Literal(Literal),

    /// An operand that references a computed value (parameter, temporary, etc.)
    /// The `ValueId` points to the instruction that produces this value
    Operand(crate::ValueId),
}

/// Literal constant values
///
/// These represent compile-time known constants that can be embedded
/// directly in the MIR without requiring computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum Literal {
    /// The null sentinel. Field slots of a fresh allocation hold this value,
    /// and forwarded loads of such slots are rewritten to it.
    Null,

    /// Integer literal
    Integer(i64),

    /// Boolean literal
    Boolean(bool),
}

impl Value {
    /// Creates the null sentinel value
    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Creates a new integer literal value
    pub const fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    /// Creates a new boolean literal value
    pub const fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Boolean(value))
    }

    /// Creates a new operand value
    pub const fn operand(id: crate::ValueId) -> Self {
        Self::Operand(id)
    }

    /// Returns true if this is a literal value
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Returns true if this is an operand reference
    pub const fn is_operand(&self) -> bool {
        matches!(self, Self::Operand(_))
    }

    /// Returns the literal value if this is a literal
    pub const fn as_literal(&self) -> Option<Literal> {
        match self {
            Self::Literal(lit) => Some(*lit),
            Self::Operand(_) => None,
        }
    }

    /// Returns the operand ID if this is an operand
    pub const fn as_operand(&self) -> Option<crate::ValueId> {
        match self {
            Self::Operand(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }

    /// Attempts to evaluate this value as a constant integer
    pub const fn as_const_integer(&self) -> Option<i64> {
        match self {
            Self::Literal(Literal::Integer(value)) => Some(*value),
            _ => None,
        }
    }
}

impl Literal {
    /// Returns true if this is the null sentinel
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer value if this is an integer literal
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl PrettyPrint for Value {
    fn pretty_print(&self, _indent: usize) -> String {
        match self {
            Self::Literal(lit) => lit.pretty_print(0),
            Self::Operand(id) => format!("%{}", id.index()),
        }
    }
}

impl PrettyPrint for Literal {
    fn pretty_print(&self, _indent: usize) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pretty_print(0))
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pretty_print(0))
    }
}

// Convenience conversion methods
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::boolean(value)
    }
}

impl From<crate::ValueId> for Value {
    fn from(id: crate::ValueId) -> Self {
        Self::operand(id)
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}
