//! # Testing Utilities for MIR
//!
//! This module provides a small builder for assembling flow graphs by hand
//! in unit tests, mirroring the shape the upstream lowering would produce.

use crate::{
    BasicBlockId, BinaryOp, ClassId, ElementWidth, FieldId, FlowGraph, FunctionId, Instruction,
    Terminator, UnaryOp, Value, ValueId,
};

/// Builder for creating test flow graphs
pub struct GraphBuilder {
    graph: FlowGraph,
}

impl GraphBuilder {
    /// Creates a new test graph with an empty entry block
    pub fn new(name: &str) -> Self {
        Self {
            graph: FlowGraph::new(name.to_string()),
        }
    }

    /// Adds a function parameter and returns its ValueId
    pub fn parameter(&mut self) -> ValueId {
        let value_id = self.graph.new_value_id();
        self.graph.parameters.push(value_id);
        value_id
    }

    /// Reserves a value ID before its defining instruction exists, for
    /// phis that reference themselves across a loop back edge
    pub fn fresh_value(&mut self) -> ValueId {
        self.graph.new_value_id()
    }

    /// Adds a new basic block and returns its ID
    pub fn add_block(&mut self) -> BasicBlockId {
        self.graph.add_basic_block()
    }

    /// Adds a catch-entry block with one fresh placeholder per environment
    /// slot. Returns the block ID and the placeholder list.
    pub fn add_catch_entry(&mut self, try_index: usize, slots: usize) -> (BasicBlockId, Vec<ValueId>) {
        let params: Vec<ValueId> = (0..slots).map(|_| self.graph.new_value_id()).collect();
        let id = self
            .graph
            .add_catch_entry(try_index, params.iter().map(|p| Some(*p)).collect());
        (id, params)
    }

    /// Gets a block builder for the entry block
    pub fn entry(&mut self) -> BlockBuilder<'_> {
        let block_id = self.graph.entry_block;
        self.block(block_id)
    }

    /// Gets a block builder for the given block
    pub fn block(&mut self, block_id: BasicBlockId) -> BlockBuilder<'_> {
        BlockBuilder {
            graph: &mut self.graph,
            current: block_id,
        }
    }

    /// Finishes building and returns the graph
    pub fn build(self) -> FlowGraph {
        debug_assert_eq!(self.graph.validate(), Ok(()));
        self.graph
    }
}

/// Builder for filling a single basic block
pub struct BlockBuilder<'a> {
    graph: &'a mut FlowGraph,
    current: BasicBlockId,
}

impl<'a> BlockBuilder<'a> {
    pub fn id(&self) -> BasicBlockId {
        self.current
    }

    fn push(&mut self, instruction: Instruction) {
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .push_instruction(instruction);
    }

    fn define(&mut self, make: impl FnOnce(ValueId) -> Instruction) -> ValueId {
        let dest = self.graph.new_value_id();
        let instruction = make(dest);
        self.push(instruction);
        dest
    }

    pub fn allocate_object(&mut self, class: usize) -> ValueId {
        self.define(|dest| Instruction::allocate_object(dest, ClassId::from_raw(class)))
    }

    pub fn allocate_buffer(&mut self, length: i64) -> ValueId {
        self.define(|dest| Instruction::allocate_buffer(dest, length))
    }

    pub fn load_field(&mut self, object: Value, field: usize) -> ValueId {
        self.define(|dest| Instruction::load_field(dest, object, FieldId::from_raw(field)))
    }

    pub fn store_field(&mut self, object: Value, field: usize, value: Value) {
        self.push(Instruction::store_field(
            object,
            FieldId::from_raw(field),
            value,
        ));
    }

    pub fn load_indexed(&mut self, buffer: Value, index: Value, width: ElementWidth) -> ValueId {
        self.define(|dest| Instruction::load_indexed(dest, buffer, index, width))
    }

    pub fn store_indexed(
        &mut self,
        buffer: Value,
        index: Value,
        width: ElementWidth,
        value: Value,
    ) {
        self.push(Instruction::store_indexed(buffer, index, width, value));
    }

    pub fn redefine(&mut self, source: Value) -> ValueId {
        self.define(|dest| Instruction::redefine(dest, source))
    }

    pub fn check_non_null(&mut self, source: Value) -> ValueId {
        self.define(|dest| Instruction::check_non_null(dest, source))
    }

    pub fn assert_type(&mut self, source: Value) -> ValueId {
        self.define(|dest| Instruction::assert_type(dest, source))
    }

    pub fn binary_op(&mut self, op: BinaryOp, left: Value, right: Value) -> ValueId {
        self.define(|dest| Instruction::binary_op(op, dest, left, right))
    }

    pub fn unary_op(&mut self, op: UnaryOp, source: Value) -> ValueId {
        self.define(|dest| Instruction::unary_op(op, dest, source))
    }

    /// A call to an opaque external function, returning a value
    pub fn call(&mut self, args: Vec<Value>) -> ValueId {
        self.define(|dest| Instruction::call(Some(dest), FunctionId::from_raw(0), args))
    }

    /// A call to an opaque external function, ignoring the result
    pub fn call_void(&mut self, args: Vec<Value>) {
        self.push(Instruction::call(None, FunctionId::from_raw(0), args));
    }

    pub fn phi(&mut self, sources: Vec<(BasicBlockId, Value)>) -> ValueId {
        let dest = self.graph.new_value_id();
        self.phi_into(dest, sources);
        dest
    }

    /// Phi with a pre-reserved destination (see `GraphBuilder::fresh_value`)
    pub fn phi_into(&mut self, dest: ValueId, sources: Vec<(BasicBlockId, Value)>) {
        let instruction = Instruction::phi(dest, sources);
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .push_phi_front(instruction);
    }

    pub fn jump(&mut self, target: BasicBlockId) {
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .set_terminator(Terminator::jump(target));
        self.graph.connect(self.current, target);
    }

    pub fn branch(&mut self, condition: Value, then_target: BasicBlockId, else_target: BasicBlockId) {
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .set_terminator(Terminator::branch(condition, then_target, else_target));
        self.graph.connect(self.current, then_target);
        self.graph.connect(self.current, else_target);
    }

    pub fn ret(&mut self, value: Value) {
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .set_terminator(Terminator::return_value(value));
    }

    pub fn ret_void(&mut self) {
        self.graph
            .get_basic_block_mut(self.current)
            .unwrap()
            .set_terminator(Terminator::return_void());
    }
}
