// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode emission.
//!
//! Each function is emitted independently against its register allocation
//! into a private literal pool, with branch targets left as block fixups.
//! The [`link`] step merges the pools, assigns function indices and byte
//! offsets, and relaxes branches to their short encoding where they fit.

pub mod link;
pub mod literals;

use rustc_hash::FxHashMap;
use tracing::{debug, debug_span};

use crate::ast::Span;
use crate::bytecode::{BytecodeModule, EnvDescriptor, ExceptionEntry, Instruction, OpCode, Operand};
use crate::config::CompileOptions;
use crate::error::InternalError;
use crate::index::IndexVec;
use crate::ir::literal::is_int32;
use crate::ir::{
    BinaryOp, BlockId, Builtin, Function, FunctionId, InstKind, Literal, Module, NumericForm, Operand as IrOperand,
    Terminator, UnaryOp, ValueId, VarId,
};
use crate::regalloc::lower::dense_table;
use crate::regalloc::{Allocation, stack_slots};
use crate::sema::ScopeId;

pub use link::{LexicalScope, link};
pub use literals::{LiteralPool, PoolRemap};

/// Runtime helpers in `CallBuiltin` index order.
pub const BUILTINS: [Builtin; 10] = [
    Builtin::SpawnAsync,
    Builtin::CopyDataProperties,
    Builtin::ForInKeys,
    Builtin::SetPrototypeOf,
    Builtin::IteratorToArray,
    Builtin::ArrayPush,
    Builtin::ThrowTypeError,
    Builtin::EnsureObject,
    Builtin::RestArguments,
    Builtin::ThrowReferenceError,
];

fn builtin_index(builtin: Builtin) -> u32 {
    BUILTINS.iter().position(|&b| b == builtin).unwrap_or_default() as u32
}

/// Module-wide facts every function emitter reads.
#[derive(Debug)]
pub struct EmitContext<'a> {
    /// The optimized module
    pub module: &'a Module,
    /// Compilation options
    pub options: &'a CompileOptions,
    env_index: FxHashMap<ScopeId, u32>,
}

impl<'a> EmitContext<'a> {
    /// Numbers the module's environments in scope order.
    pub fn new(module: &'a Module, options: &'a CompileOptions) -> Self {
        let env_index = module.scopes.keys().enumerate().map(|(i, &s)| (s, i as u32)).collect();
        Self {
            module,
            options,
            env_index,
        }
    }

    /// The environment table, parallel to `CreateEnvironment` indices.
    pub fn environments(&self) -> Vec<EnvDescriptor> {
        self.module
            .scopes
            .values()
            .map(|desc| EnvDescriptor {
                slots: desc.slots.len() as u32,
                has_parent: desc.parent.is_some(),
                primitive_slots: desc
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, var)| self.module.vars[**var].primitive)
                    .map(|(i, _)| i as u32)
                    .collect(),
            })
            .collect()
    }

    fn slot_of(&self, var: VarId) -> Option<u32> {
        let home = self.module.vars.get(var)?.scope;
        if let Some(slot) = self.module.scopes.get(&home).and_then(|d| d.slot_of(var)) {
            return Some(slot);
        }
        self.module.scopes.values().find_map(|d| d.slot_of(var))
    }
}

/// Source attribution of an emitted instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Origin {
    /// Source range
    pub span: Span,
    /// Innermost lexical scope
    pub scope: Option<ScopeId>,
    /// The instruction may throw
    pub throws: bool,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    inst: usize,
    operand: usize,
    target: BlockId,
}

/// Byte layout of a relaxed function.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Offset of every instruction, plus the total length last
    pub offsets: Vec<u32>,
    /// Protected ranges in byte offsets
    pub exceptions: Vec<ExceptionEntry>,
}

/// A function's instructions before linking.
#[derive(Debug, Clone)]
pub struct EmittedFunction {
    /// IR function
    pub id: FunctionId,
    /// Name for the function table
    pub name: String,
    /// Declared parameter count
    pub param_count: u32,
    /// Registers the frame needs
    pub frame_size: u32,
    /// Strict mode code
    pub strict: bool,
    /// Body of a generator or async function
    pub resumable: bool,
    /// Environment slots created by the function
    pub captured: u32,
    /// Reads its creation environment
    pub has_parent_env: bool,
    /// Source range of the function
    pub span: Span,
    /// Instructions; jump operands are resolved by [`EmittedFunction::relax`]
    pub instructions: Vec<Instruction>,
    /// Attribution, parallel to `instructions`
    pub origins: Vec<Origin>,
    /// Function-local literals
    pub pool: LiteralPool,
    fixups: Vec<Fixup>,
    block_starts: FxHashMap<BlockId, usize>,
    protected: Vec<(usize, usize, BlockId)>,
}

impl EmittedFunction {
    fn offsets(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.instructions.len() + 1);
        let mut at = 0;
        for inst in &self.instructions {
            out.push(at);
            at += inst.size();
        }
        out.push(at);
        out
    }

    /// Resolves jumps and shrinks them to the short encoding until no
    /// jump changes size. Jumps start wide; distances only shrink.
    pub fn relax(&mut self) -> Result<Layout, InternalError> {
        for fx in &self.fixups {
            self.instructions[fx.inst].wide = true;
        }
        let offsets = loop {
            let offsets = self.offsets();
            for fx in &self.fixups {
                let target = *self
                    .block_starts
                    .get(&fx.target)
                    .ok_or_else(|| InternalError::new(&self.name, format!("jump to unplaced block bb{}", fx.target.0)))?;
                let rel = i64::from(offsets[target]) - i64::from(offsets[fx.inst]);
                let rel = i32::try_from(rel)
                    .map_err(|_| InternalError::new(&self.name, "jump distance exceeds 32 bits"))?;
                self.instructions[fx.inst].operands[fx.operand] = Operand::Jump(rel);
            }
            let mut shrunk = false;
            for fx in &self.fixups {
                let inst = &mut self.instructions[fx.inst];
                if inst.wide && !inst.needs_wide() {
                    inst.wide = false;
                    shrunk = true;
                }
            }
            if !shrunk {
                break offsets;
            }
        };

        let mut exceptions = Vec::with_capacity(self.protected.len());
        for &(start, end, handler) in &self.protected {
            let h = *self
                .block_starts
                .get(&handler)
                .ok_or_else(|| InternalError::new(&self.name, format!("handler bb{} was not emitted", handler.0)))?;
            exceptions.push(ExceptionEntry {
                start: offsets[start],
                end: offsets[end],
                handler: offsets[h],
            });
        }
        Ok(Layout { offsets, exceptions })
    }
}

// ============================================================================
// Function emission
// ============================================================================

struct FunctionEmitter<'a> {
    cx: &'a EmitContext<'a>,
    f: &'a Function,
    alloc: &'a Allocation,
    out: EmittedFunction,
    origin: Origin,
}

/// Emits one allocated function.
pub fn emit_function(
    cx: &EmitContext<'_>,
    id: FunctionId,
    f: &Function,
    alloc: &Allocation,
) -> Result<EmittedFunction, InternalError> {
    let captured = cx
        .module
        .scopes
        .values()
        .filter(|d| d.function == id)
        .map(|d| d.slots.len() as u32)
        .sum();
    let mut e = FunctionEmitter {
        cx,
        f,
        alloc,
        out: EmittedFunction {
            id,
            name: f.name.clone(),
            param_count: f.param_count,
            frame_size: alloc.frame_size(),
            strict: f.strict,
            resumable: f.flags.resumable,
            captured,
            has_parent_env: f.env_scope.is_some(),
            span: f.span,
            instructions: Vec::new(),
            origins: Vec::new(),
            pool: LiteralPool::default(),
            fixups: Vec::new(),
            block_starts: FxHashMap::default(),
            protected: Vec::new(),
        },
        origin: Origin::default(),
    };

    for (i, &b) in alloc.order.iter().enumerate() {
        let next = alloc.order.get(i + 1).copied();
        let start = e.out.instructions.len();
        e.out.block_starts.insert(b, start);
        for &v in &f.blocks[b].insts {
            e.instruction(v)?;
        }
        e.origin = Origin {
            span: f.blocks[b].term_span,
            scope: f.blocks[b].insts.last().and_then(|&v| f.insts[v].scope),
            throws: matches!(f.blocks[b].term, Terminator::Throw(_)),
        };
        if let Some(moves) = alloc.copies.get(&b) {
            for m in moves {
                e.mov(m.dst, m.src);
            }
        }
        e.terminator(b, next)?;

        let end = e.out.instructions.len();
        if let (Some(h), true) = (f.blocks[b].handler, end > start) {
            match e.out.protected.last_mut() {
                Some((_, prev_end, prev_h)) if *prev_end == start && *prev_h == h => *prev_end = end,
                _ => e.out.protected.push((start, end, h)),
            }
        }
    }
    Ok(e.out)
}

impl FunctionEmitter<'_> {
    fn fail(&self, message: impl Into<String>) -> InternalError {
        InternalError::new(&self.f.name, message)
    }

    fn push(&mut self, opcode: OpCode, operands: Vec<Operand>) -> usize {
        self.out.instructions.push(Instruction::new(opcode, operands));
        self.out.origins.push(self.origin);
        self.out.instructions.len() - 1
    }

    /// Pushes an instruction whose `Jump` operands go to `targets`, in order.
    fn push_jump(&mut self, opcode: OpCode, operands: Vec<Operand>, targets: &[BlockId]) {
        let mut targets = targets.iter();
        let slots: Vec<usize> = operands
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, Operand::Jump(_)))
            .map(|(i, _)| i)
            .collect();
        let inst = self.push(opcode, operands);
        for operand in slots {
            if let Some(&target) = targets.next() {
                self.out.fixups.push(Fixup { inst, operand, target });
            }
        }
    }

    fn mov(&mut self, dst: u32, src: u32) {
        if dst != src {
            let throws = std::mem::replace(&mut self.origin.throws, false);
            self.push(OpCode::Mov, vec![Operand::Reg(dst), Operand::Reg(src)]);
            self.origin.throws = throws;
        }
    }

    fn r(&self, op: &IrOperand) -> Result<u32, InternalError> {
        match op {
            IrOperand::Value(v) => self
                .alloc
                .register_of(*v)
                .ok_or_else(|| self.fail(format!("%{} has no register", v.0))),
            IrOperand::Literal(lit) => Err(self.fail(format!("literal {lit} reached the emitter"))),
        }
    }

    fn reg(&self, op: &IrOperand) -> Result<Operand, InternalError> {
        self.r(op).map(Operand::Reg)
    }

    fn dst(&self, v: ValueId) -> Result<Operand, InternalError> {
        self.alloc
            .register_of(v)
            .map(Operand::Reg)
            .ok_or_else(|| self.fail(format!("result %{} has no register", v.0)))
    }

    fn var_reg(&self, var: VarId) -> Result<u32, InternalError> {
        self.alloc
            .var_registers
            .get(&var)
            .copied()
            .ok_or_else(|| self.fail(format!("frame slot v{} has no register", var.0)))
    }

    fn slot(&self, var: VarId) -> Result<u32, InternalError> {
        self.cx
            .slot_of(var)
            .ok_or_else(|| self.fail(format!("variable v{} has no environment slot", var.0)))
    }

    fn load_const(&mut self, dst: Operand, lit: &Literal) {
        match lit {
            Literal::Undefined => self.push(OpCode::LoadConstUndefined, vec![dst]),
            Literal::Null => self.push(OpCode::LoadConstNull, vec![dst]),
            Literal::Empty => self.push(OpCode::LoadConstEmpty, vec![dst]),
            Literal::Bool(true) => self.push(OpCode::LoadConstTrue, vec![dst]),
            Literal::Bool(false) => self.push(OpCode::LoadConstFalse, vec![dst]),
            Literal::Number(n) if *n == 0.0 && n.is_sign_positive() => self.push(OpCode::LoadConstZero, vec![dst]),
            Literal::Number(n) if is_int32(*n) => self.push(OpCode::LoadConstInt, vec![dst, Operand::Int(*n as i32)]),
            Literal::Number(n) => self.push(OpCode::LoadConstDouble, vec![dst, Operand::Double(*n)]),
            Literal::String(s) => {
                let id = self.out.pool.string(s);
                self.push(OpCode::LoadConstString, vec![dst, Operand::Str(id)])
            }
            Literal::BigInt(b) => {
                let id = self.out.pool.bigint(&b.to_string());
                self.push(OpCode::LoadConstBigInt, vec![dst, Operand::BigInt(id)])
            }
        };
    }

    fn instruction(&mut self, v: ValueId) -> Result<(), InternalError> {
        let f = self.f;
        let inst = &f.insts[v];
        self.origin = Origin {
            span: inst.span,
            scope: inst.scope,
            throws: !inst.kind.never_throws(),
        };

        use InstKind::*;
        match &inst.kind {
            Phi { .. } => {}
            LoadConst(lit) => {
                let d = self.dst(v)?;
                self.load_const(d, lit);
            }
            LoadParam(i) => {
                let d = self.dst(v)?;
                self.push(OpCode::LoadParam, vec![d, Operand::UInt(*i)]);
            }
            CreateArguments => self.nullary(OpCode::CreateArguments, v)?,
            GetNewTarget => self.nullary(OpCode::GetNewTarget, v)?,
            GetGlobalObject => self.nullary(OpCode::GetGlobalObject, v)?,
            GetParentScope => self.nullary(OpCode::GetParentEnvironment, v)?,
            Catch => self.nullary(OpCode::Catch, v)?,
            Debugger => {
                self.push(OpCode::Debugger, Vec::new());
            }

            LoadLocal(var) => {
                let (d, s) = (self.r(&IrOperand::Value(v))?, self.var_reg(*var)?);
                self.mov(d, s);
            }
            StoreLocal { var, value } => {
                let (d, s) = (self.var_reg(*var)?, self.r(value)?);
                self.mov(d, s);
            }

            CreateScope { scope, parent } => {
                let env = *self
                    .cx
                    .env_index
                    .get(scope)
                    .ok_or_else(|| self.fail(format!("scope s{} has no layout", scope.0)))?;
                let d = self.dst(v)?;
                match parent {
                    Some(p) => {
                        let p = self.reg(p)?;
                        self.push(OpCode::CreateInnerEnvironment, vec![d, p, Operand::Env(env)]);
                    }
                    None => {
                        self.push(OpCode::CreateEnvironment, vec![d, Operand::Env(env)]);
                    }
                }
            }
            ResolveScope { start, hops } => {
                let ops = vec![self.dst(v)?, self.reg(start)?, Operand::UInt(*hops)];
                self.push(OpCode::ResolveEnvironment, ops);
            }
            GetClosureScope { closure } => {
                let ops = vec![self.dst(v)?, self.reg(closure)?];
                self.push(OpCode::GetClosureEnvironment, ops);
            }
            LoadEnv { env, var } => {
                let ops = vec![self.dst(v)?, self.reg(env)?, Operand::UInt(self.slot(*var)?)];
                self.push(OpCode::LoadFromEnvironment, ops);
            }
            StoreEnv { env, var, value } => {
                let opcode = if self.cx.module.vars[*var].primitive {
                    OpCode::StoreNPToEnvironment
                } else {
                    OpCode::StoreToEnvironment
                };
                let ops = vec![self.reg(env)?, Operand::UInt(self.slot(*var)?), self.reg(value)?];
                self.push(opcode, ops);
            }
            ThrowIfEmpty { value, .. } => {
                let ops = vec![self.dst(v)?, self.reg(value)?];
                self.push(OpCode::ThrowIfEmpty, ops);
            }

            LoadGlobal { name, throw_if_missing } => {
                let opcode = if *throw_if_missing { OpCode::GetGlobal } else { OpCode::TryGetGlobal };
                let d = self.dst(v)?;
                let name = self.out.pool.string(name);
                self.push(opcode, vec![d, Operand::Str(name)]);
            }
            StoreGlobal { name, value } => {
                let value = self.reg(value)?;
                let name = self.out.pool.string(name);
                self.push(OpCode::PutGlobal, vec![Operand::Str(name), value]);
            }
            DeclareGlobalVar { name } => {
                let name = self.out.pool.string(name);
                self.push(OpCode::DeclareGlobalVar, vec![Operand::Str(name)]);
            }

            Binary { op, lhs, rhs, form } => {
                let ops = vec![self.dst(v)?, self.reg(lhs)?, self.reg(rhs)?];
                self.push(binary_opcode(*op, *form), ops);
            }
            Unary { op, operand, form } => {
                let numeric = *form != NumericForm::Generic;
                match (op, numeric) {
                    // Already a number: conversion is a copy.
                    (UnaryOp::ToNumber | UnaryOp::ToNumeric, true) => {
                        let (d, s) = (self.r(&IrOperand::Value(v))?, self.r(operand)?);
                        self.mov(d, s);
                    }
                    _ => {
                        let ops = vec![self.dst(v)?, self.reg(operand)?];
                        self.push(unary_opcode(*op, *form), ops);
                    }
                }
            }

            CreateClosure { function, env } | CreateGenerator { inner: function, env } => {
                let generator = matches!(inst.kind, CreateGenerator { .. });
                let d = self.dst(v)?;
                let func = Operand::Function(function.0);
                match env {
                    Some(env) => {
                        let env = self.reg(env)?;
                        let opcode = if generator { OpCode::CreateGenerator } else { OpCode::CreateClosure };
                        self.push(opcode, vec![d, env, func]);
                    }
                    None => {
                        let opcode = if generator {
                            OpCode::CreateGeneratorNoEnv
                        } else {
                            OpCode::CreateClosureNoEnv
                        };
                        self.push(opcode, vec![d, func]);
                    }
                }
            }

            Call { callee, this, args } => {
                let (d, c) = (self.dst(v)?, self.reg(callee)?);
                if stack_slots(&inst.kind, self.cx.options.fixed_arity_calls) == 0 {
                    let opcode = match args.len() {
                        0 => OpCode::Call1,
                        1 => OpCode::Call2,
                        2 => OpCode::Call3,
                        _ => OpCode::Call4,
                    };
                    let mut ops = vec![d, c, self.reg(this)?];
                    for a in args {
                        ops.push(self.reg(a)?);
                    }
                    self.push(opcode, ops);
                } else {
                    let base = self.alloc.stack_base();
                    let t = self.r(this)?;
                    self.mov(base, t);
                    self.stack_args(base + 1, args)?;
                    self.push(OpCode::Call, vec![d, c, Operand::UInt(args.len() as u32 + 1)]);
                }
            }
            Construct { callee, new_target, args } => {
                let ops = vec![self.dst(v)?, self.reg(callee)?, self.reg(new_target)?];
                let base = self.alloc.stack_base();
                self.stack_args(base + 1, args)?;
                let mut ops = ops;
                ops.push(Operand::UInt(args.len() as u32 + 1));
                self.push(OpCode::Construct, ops);
            }
            CallWithArgsArray { callee, this, args } => {
                let ops = vec![self.dst(v)?, self.reg(callee)?, self.reg(this)?, self.reg(args)?];
                self.push(OpCode::CallWithArgsArray, ops);
            }
            ConstructWithArgsArray { callee, new_target, args } => {
                let ops = vec![self.dst(v)?, self.reg(callee)?, self.reg(new_target)?, self.reg(args)?];
                self.push(OpCode::ConstructWithArgsArray, ops);
            }
            CallBuiltin { builtin, args } => {
                let d = self.dst(v)?;
                self.stack_args(self.alloc.stack_base(), args)?;
                self.push(
                    OpCode::CallBuiltin,
                    vec![d, Operand::UInt(builtin_index(*builtin)), Operand::UInt(args.len() as u32)],
                );
            }

            LoadNamed { object, name } => {
                let ops = vec![self.dst(v)?, self.reg(object)?];
                self.with_name(OpCode::GetById, ops, name, Vec::new());
            }
            LoadComputed { object, key } => {
                let ops = vec![self.dst(v)?, self.reg(object)?, self.reg(key)?];
                self.push(OpCode::GetByVal, ops);
            }
            StoreNamed { object, name, value } => {
                let (o, val) = (self.reg(object)?, self.reg(value)?);
                self.with_name(OpCode::PutById, vec![o], name, vec![val]);
            }
            StoreComputed { object, key, value } => {
                let ops = vec![self.reg(object)?, self.reg(key)?, self.reg(value)?];
                self.push(OpCode::PutByVal, ops);
            }
            DeleteNamed { object, name } => {
                let ops = vec![self.dst(v)?, self.reg(object)?];
                self.with_name(OpCode::DelById, ops, name, Vec::new());
            }
            DeleteComputed { object, key } => {
                let ops = vec![self.dst(v)?, self.reg(object)?, self.reg(key)?];
                self.push(OpCode::DelByVal, ops);
            }
            DefineOwn { object, key, value, enumerable } => {
                let (o, val) = (self.reg(object)?, self.reg(value)?);
                let flag = Operand::UInt(u32::from(*enumerable));
                match key {
                    IrOperand::Literal(Literal::String(name)) => {
                        self.with_name(OpCode::PutOwnById, vec![o], name, vec![val, flag]);
                    }
                    key => {
                        let k = self.reg(key)?;
                        self.push(OpCode::PutOwnByVal, vec![o, k, val, flag]);
                    }
                }
            }
            DefineAccessor { object, key, getter, setter, enumerable } => {
                let getter = getter.as_ref().map(|g| self.r(g)).transpose()?;
                let setter = setter.as_ref().map(|s| self.r(s)).transpose()?;
                let flags = u32::from(*enumerable) | u32::from(getter.is_some()) << 1 | u32::from(setter.is_some()) << 2;
                let ops = vec![
                    self.reg(object)?,
                    self.reg(key)?,
                    Operand::Reg(getter.unwrap_or_default()),
                    Operand::Reg(setter.unwrap_or_default()),
                    Operand::UInt(flags),
                ];
                self.push(OpCode::DefineAccessor, ops);
            }

            AllocObject { proto } => {
                let d = self.dst(v)?;
                match proto {
                    Some(p) => {
                        let p = self.reg(p)?;
                        self.push(OpCode::NewObjectWithParent, vec![d, p]);
                    }
                    None => {
                        self.push(OpCode::NewObject, vec![d]);
                    }
                }
            }
            AllocObjectLiteral { props } => self.object_literal(v, props)?,
            AllocArray { elements } => self.array_literal(v, elements)?,
            SpreadIntoArray { array, iterable } => {
                let ops = vec![self.reg(array)?, self.reg(iterable)?];
                self.push(OpCode::SpreadIntoArray, ops);
            }
            CreateRegExp { pattern, flags } => {
                let d = self.dst(v)?;
                let id = self.out.pool.regexp(pattern, flags);
                self.push(OpCode::CreateRegExp, vec![d, Operand::RegExp(id)]);
            }

            GetIterator { iterable } => {
                let ops = vec![self.dst(v)?, self.reg(iterable)?];
                self.push(OpCode::GetIterator, ops);
            }
            IteratorClose { iterator, on_throw } => {
                let ops = vec![self.reg(iterator)?, Operand::UInt(u32::from(*on_throw))];
                self.push(OpCode::IteratorClose, ops);
            }
        }
        Ok(())
    }

    fn nullary(&mut self, opcode: OpCode, v: ValueId) -> Result<(), InternalError> {
        let d = self.dst(v)?;
        self.push(opcode, vec![d]);
        Ok(())
    }

    /// `head, name, tail`
    fn with_name(&mut self, opcode: OpCode, mut head: Vec<Operand>, name: &str, tail: Vec<Operand>) {
        head.push(Operand::Str(self.out.pool.string(name)));
        head.extend(tail);
        self.push(opcode, head);
    }

    fn stack_args(&mut self, first: u32, args: &[IrOperand]) -> Result<(), InternalError> {
        for (i, a) in args.iter().enumerate() {
            let src = self.r(a)?;
            self.mov(first + i as u32, src);
        }
        Ok(())
    }

    fn object_literal(&mut self, v: ValueId, props: &[(String, IrOperand)]) -> Result<(), InternalError> {
        let d = self.dst(v)?;
        let literals: Option<Vec<&Literal>> = props.iter().map(|(_, op)| op.literal()).collect();
        match literals {
            Some(values) if !values.is_empty() => {
                let keys = props.iter().map(|(k, _)| self.out.pool.string(k)).collect();
                let keys = self.out.pool.object_keys(keys);
                let values = values.into_iter().map(|lit| self.out.pool.buffer_value(lit)).collect();
                let values = self.out.pool.object_values(values);
                self.push(
                    OpCode::NewObjectWithBuffer,
                    vec![d, Operand::ObjKeys(keys), Operand::ObjValues(values)],
                );
            }
            _ => {
                self.push(OpCode::NewObject, vec![d]);
                for (key, value) in props {
                    let value = self.reg(value)?;
                    self.with_name(OpCode::PutOwnById, vec![d], key, vec![value, Operand::UInt(1)]);
                }
            }
        }
        Ok(())
    }

    fn array_literal(&mut self, v: ValueId, elements: &[IrOperand]) -> Result<(), InternalError> {
        let d = self.dst(v)?;
        let len = Operand::UInt(elements.len() as u32);
        let literals: Option<Vec<&Literal>> = elements.iter().map(IrOperand::literal).collect();
        match literals {
            Some(values) if !values.is_empty() => {
                let values = values.into_iter().map(|lit| self.out.pool.buffer_value(lit)).collect();
                let id = self.out.pool.array(values);
                self.push(OpCode::NewArrayWithBuffer, vec![d, Operand::Array(id), len]);
            }
            _ => {
                self.push(OpCode::NewArray, vec![d, len]);
                for (i, e) in elements.iter().enumerate() {
                    if matches!(e, IrOperand::Literal(Literal::Empty)) {
                        continue;
                    }
                    let e = self.reg(e)?;
                    self.push(OpCode::PutOwnByIndex, vec![d, Operand::UInt(i as u32), e]);
                }
            }
        }
        Ok(())
    }

    fn terminator(&mut self, b: BlockId, next: Option<BlockId>) -> Result<(), InternalError> {
        let f = self.f;
        match &f.blocks[b].term {
            Terminator::Branch(t) => self.goto(*t, next),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => {
                if then_block == else_block {
                    self.goto(*then_block, next);
                    return Ok(());
                }
                let c = self.reg(cond)?;
                if next == Some(*else_block) {
                    self.push_jump(OpCode::JmpTrue, vec![c, Operand::Jump(0)], &[*then_block]);
                } else if next == Some(*then_block) {
                    self.push_jump(OpCode::JmpFalse, vec![c, Operand::Jump(0)], &[*else_block]);
                } else {
                    self.push_jump(OpCode::JmpTrue, vec![c, Operand::Jump(0)], &[*then_block]);
                    self.goto(*else_block, None);
                }
            }
            Terminator::Switch { value, cases, default } => {
                let (min, max) = dense_table(cases).ok_or_else(|| self.fail(format!("bb{} has a sparse switch", b.0)))?;
                let span = (max - min + 1) as usize;
                let mut table = vec![*default; span];
                for (lit, target) in cases.iter().rev() {
                    if let Some(k) = lit.as_int32() {
                        table[(k - min) as usize] = *target;
                    }
                }
                let mut ops = vec![
                    self.reg(value)?,
                    Operand::Int(min),
                    Operand::UInt(span as u32),
                    Operand::Jump(0),
                ];
                ops.extend(std::iter::repeat_n(Operand::Jump(0), span));
                let mut targets = vec![*default];
                targets.extend(table);
                self.push_jump(OpCode::SwitchImm, ops, &targets);
            }
            Terminator::Return(op) => {
                let r = self.reg(op)?;
                self.push(OpCode::Ret, vec![r]);
            }
            Terminator::Throw(op) => {
                let r = self.reg(op)?;
                self.push(OpCode::Throw, vec![r]);
            }
            Terminator::Unreachable => {
                self.push(OpCode::Unreachable, Vec::new());
            }
        }
        Ok(())
    }

    fn goto(&mut self, target: BlockId, next: Option<BlockId>) {
        if next != Some(target) {
            self.push_jump(OpCode::Jmp, vec![Operand::Jump(0)], &[target]);
        }
    }
}

fn binary_opcode(op: BinaryOp, form: NumericForm) -> OpCode {
    let n = form != NumericForm::Generic;
    let pick = |generic: OpCode, number: OpCode| if n { number } else { generic };
    match op {
        BinaryOp::Add => pick(OpCode::Add, OpCode::AddN),
        BinaryOp::Sub => pick(OpCode::Sub, OpCode::SubN),
        BinaryOp::Mul => pick(OpCode::Mul, OpCode::MulN),
        BinaryOp::Div => pick(OpCode::Div, OpCode::DivN),
        BinaryOp::Mod => pick(OpCode::Mod, OpCode::ModN),
        BinaryOp::Exp => OpCode::Exp,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::Ne => OpCode::Ne,
        BinaryOp::StrictEq => OpCode::StrictEq,
        BinaryOp::StrictNe => OpCode::StrictNe,
        BinaryOp::Lt => pick(OpCode::Less, OpCode::LessN),
        BinaryOp::Le => pick(OpCode::LessEq, OpCode::LessEqN),
        BinaryOp::Gt => pick(OpCode::Greater, OpCode::GreaterN),
        BinaryOp::Ge => pick(OpCode::GreaterEq, OpCode::GreaterEqN),
        BinaryOp::BitAnd => pick(OpCode::BitAnd, OpCode::BitAndI),
        BinaryOp::BitOr => pick(OpCode::BitOr, OpCode::BitOrI),
        BinaryOp::BitXor => pick(OpCode::BitXor, OpCode::BitXorI),
        BinaryOp::Shl => pick(OpCode::Shl, OpCode::ShlI),
        BinaryOp::Shr => pick(OpCode::Shr, OpCode::ShrI),
        BinaryOp::UShr => OpCode::UShr,
        BinaryOp::In => OpCode::IsIn,
        BinaryOp::InstanceOf => OpCode::InstanceOf,
    }
}

fn unary_opcode(op: UnaryOp, form: NumericForm) -> OpCode {
    let n = form != NumericForm::Generic;
    match op {
        UnaryOp::Neg if n => OpCode::NegN,
        UnaryOp::Neg => OpCode::Neg,
        UnaryOp::ToNumber => OpCode::ToNumber,
        UnaryOp::ToNumeric => OpCode::ToNumeric,
        UnaryOp::ToString => OpCode::ToString,
        UnaryOp::Not => OpCode::Not,
        UnaryOp::BitNot if n => OpCode::BitNotI,
        UnaryOp::BitNot => OpCode::BitNot,
        UnaryOp::TypeOf => OpCode::TypeOf,
        UnaryOp::Inc if n => OpCode::IncN,
        UnaryOp::Inc => OpCode::Inc,
        UnaryOp::Dec if n => OpCode::DecN,
        UnaryOp::Dec => OpCode::Dec,
    }
}

// ============================================================================
// Module emission
// ============================================================================

/// Emits every function of an allocated module and links the result.
pub fn emit_module(
    module: &Module,
    allocations: &IndexVec<FunctionId, Allocation>,
    options: &CompileOptions,
    scopes: &[LexicalScope],
) -> Result<BytecodeModule, InternalError> {
    let cx = EmitContext::new(module, options);
    let emit_one = |(id, f): (FunctionId, &Function)| {
        let _span = debug_span!("emit", function = %f.name).entered();
        emit_function(&cx, id, f, &allocations[id])
    };

    #[cfg(feature = "parallel")]
    let emitted: Result<Vec<EmittedFunction>, InternalError> = if options.parallel {
        use rayon::prelude::*;
        let functions: Vec<(FunctionId, &Function)> = module.functions.iter_enumerated().collect();
        functions.into_par_iter().map(emit_one).collect()
    } else {
        module.functions.iter_enumerated().map(emit_one).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let emitted: Result<Vec<EmittedFunction>, InternalError> = module.functions.iter_enumerated().map(emit_one).collect();

    let emitted = emitted?;
    debug!(functions = emitted.len(), "emitted functions");
    link(&cx, emitted, scopes)
}

#[cfg(test)]
mod tests;
