// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Insertion cursor used while lowering a function.

use crate::ast::Span;
use crate::sema::ScopeId;

use super::{BlockId, Function, InstKind, Operand, Terminator, ValueId};

/// Appends instructions at the end of a current block.
///
/// New blocks inherit the active exception handler. Emitting after the
/// current block was terminated opens a fresh, unreachable block so callers
/// never need to special-case dead code after `return` or `throw`; those
/// blocks are removed by the optimizer or the pre-allocation cleanup.
#[derive(Debug)]
pub struct Builder {
    func: Function,
    block: BlockId,
    open: bool,
    span: Span,
    scope: Option<ScopeId>,
    handler: Option<BlockId>,
}

impl Builder {
    /// Starts building `func` at its entry block.
    pub fn new(func: Function) -> Self {
        let block = func.entry;
        Self {
            func,
            block,
            open: true,
            span: Span::default(),
            scope: None,
            handler: None,
        }
    }

    /// The function under construction.
    pub fn func(&self) -> &Function {
        &self.func
    }

    /// Mutable access to the function under construction.
    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    /// Finishes building and recomputes predecessor lists.
    pub fn finish(mut self) -> Function {
        if self.open {
            self.func.blocks[self.block].term = Terminator::Unreachable;
        }
        self.func.recompute_preds();
        self.func
    }

    /// Current block.
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// True if the current block already has a terminator.
    pub fn is_terminated(&self) -> bool {
        !self.open
    }

    /// Sets the location attached to new instructions, returning the old one.
    pub fn set_span(&mut self, span: Span) -> Span {
        std::mem::replace(&mut self.span, span)
    }

    /// Sets the source scope attached to new instructions.
    pub fn set_scope(&mut self, scope: Option<ScopeId>) -> Option<ScopeId> {
        std::mem::replace(&mut self.scope, scope)
    }

    /// Current source scope.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// Exception handler for blocks created from now on.
    pub fn handler(&self) -> Option<BlockId> {
        self.handler
    }

    /// Sets the handler for new blocks, returning the previous one.
    pub fn set_handler(&mut self, handler: Option<BlockId>) -> Option<BlockId> {
        std::mem::replace(&mut self.handler, handler)
    }

    /// Creates a block covered by the current handler.
    pub fn create_block(&mut self) -> BlockId {
        self.func.add_block(self.handler)
    }

    /// Creates a block with an explicit handler.
    pub fn create_block_with_handler(&mut self, handler: Option<BlockId>) -> BlockId {
        self.func.add_block(handler)
    }

    /// Moves the cursor to the end of `block`.
    pub fn switch_to(&mut self, block: BlockId) {
        self.block = block;
        self.open = true;
    }

    fn ensure_open(&mut self) {
        if !self.open {
            let dead = self.create_block();
            self.switch_to(dead);
        }
    }

    /// Appends an instruction.
    pub fn emit(&mut self, kind: InstKind) -> ValueId {
        self.ensure_open();
        let v = self.func.append(self.block, kind, self.span);
        self.func.insts[v].scope = self.scope;
        v
    }

    /// Appends an instruction and returns it as an operand.
    pub fn emit_op(&mut self, kind: InstKind) -> Operand {
        Operand::Value(self.emit(kind))
    }

    /// Ends the current block.
    pub fn terminate(&mut self, term: Terminator) {
        self.ensure_open();
        let block = &mut self.func.blocks[self.block];
        block.term = term;
        block.term_span = self.span;
        self.open = false;
    }

    /// Jumps to `target` unless already terminated.
    pub fn branch(&mut self, target: BlockId) {
        if self.open {
            self.terminate(Terminator::Branch(target));
        }
    }

    /// Two-way branch.
    pub fn cond_branch(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Returns `value`.
    pub fn ret(&mut self, value: Operand) {
        self.terminate(Terminator::Return(value));
    }

    /// Throws `value`.
    pub fn throw(&mut self, value: Operand) {
        self.terminate(Terminator::Throw(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Literal;
    use crate::sema::FunctionKind;

    #[test]
    fn test_emit_after_terminator_opens_dead_block() {
        let mut b = Builder::new(Function::new("f", FunctionKind::Normal));
        let entry = b.block();
        b.ret(Operand::UNDEFINED);
        b.emit(InstKind::LoadConst(Literal::Null));
        assert_ne!(b.block(), entry);
        let f = b.finish();
        assert_eq!(f.blocks[entry].insts.len(), 0);
        assert!(f.blocks.iter().any(|blk| blk.preds.is_empty() && blk.insts.len() == 1));
    }

    #[test]
    fn test_new_blocks_inherit_handler() {
        let mut b = Builder::new(Function::new("f", FunctionKind::Normal));
        let handler = b.create_block();
        b.set_handler(Some(handler));
        let body = b.create_block();
        assert_eq!(b.func().blocks[body].handler, Some(handler));
    }
}
