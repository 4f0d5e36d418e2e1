// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The intermediate representation.
//!
//! A [`Module`] owns one [`Function`] per source function (plus synthetic
//! ones such as generator bodies). Each function is a control-flow graph:
//! blocks and instructions live in per-function arenas and refer to each
//! other by [`BlockId`] and [`ValueId`], so back-edges and forward
//! references need no shared ownership. An instruction's `ValueId` is its
//! result; every block ends in exactly one [`Terminator`].
//!
//! Bindings that are not captured live in frame slots (`LoadLocal` /
//! `StoreLocal`) until promoted to SSA values. Captured bindings always live
//! in environment slots described by a [`ScopeDesc`].

pub mod builder;
pub mod cfg;
mod display;
pub mod literal;
pub mod types;
pub mod verify;

use std::collections::BTreeMap;

use crate::ast::Span;
use crate::index::IndexVec;
use crate::sema::{DeclId, FuncIndex, FunctionKind, ScopeId, ScopeKind};

pub use crate::ast::BinaryOperator as BinaryOp;
pub use builder::Builder;
pub use literal::Literal;
pub use types::Type;

crate::index_type! {
    /// Identifies a function in a [`Module`].
    pub struct FunctionId;
}

crate::index_type! {
    /// Identifies a basic block within a function.
    pub struct BlockId;
}

crate::index_type! {
    /// Identifies an instruction, and the value it produces.
    pub struct ValueId;
}

crate::index_type! {
    /// Identifies a variable in a [`Module`].
    pub struct VarId;
}

// ============================================================================
// Operands and operators
// ============================================================================

/// An instruction input: another instruction's result or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Result of an instruction
    Value(ValueId),
    /// Constant
    Literal(Literal),
}

impl Operand {
    /// `undefined`.
    pub const UNDEFINED: Operand = Operand::Literal(Literal::Undefined);

    /// Number constant.
    pub fn number(n: f64) -> Self {
        Operand::Literal(Literal::Number(n))
    }

    /// String constant.
    pub fn string(s: impl Into<String>) -> Self {
        Operand::Literal(Literal::String(s.into()))
    }

    /// Boolean constant.
    pub fn boolean(b: bool) -> Self {
        Operand::Literal(Literal::Bool(b))
    }

    /// The referenced instruction, if any.
    pub fn value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Literal(_) => None,
        }
    }

    /// The constant, if any.
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Operand::Literal(lit) => Some(lit),
            Operand::Value(_) => None,
        }
    }
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Operand::Value(v)
    }
}

impl From<Literal> for Operand {
    fn from(lit: Literal) -> Self {
        Operand::Literal(lit)
    }
}

/// Unary operators after lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`; throws on BigInt
    ToNumber,
    /// ToNumeric, the old value of `x++`
    ToNumeric,
    /// ToString, for template substitutions
    ToString,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `typeof x`
    TypeOf,
    /// `x + 1` on a numeric
    Inc,
    /// `x - 1` on a numeric
    Dec,
}

/// Operand representation an arithmetic instruction was specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumericForm {
    /// Any operand types, with full conversion semantics
    #[default]
    Generic,
    /// Both operands are numbers
    Number,
    /// Both operands are numbers and the result is a 32-bit integer
    Int32,
}

/// Runtime helpers without a dedicated instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Runs an async function's generator to completion, returning a promise
    SpawnAsync,
    /// `CopyDataProperties(target, source, ...excludedKeys)`
    CopyDataProperties,
    /// Enumerable string keys of an object, for `for-in`
    ForInKeys,
    /// `Object.setPrototypeOf(object, proto)`
    SetPrototypeOf,
    /// Drains an iterator into a new array
    IteratorToArray,
    /// Appends a value to an array
    ArrayPush,
    /// Throws a `TypeError` with the given message
    ThrowTypeError,
    /// Throws unless the value is an object
    EnsureObject,
    /// Array of the incoming arguments from the given index on
    RestArguments,
    /// Throws a `ReferenceError` with the given message
    ThrowReferenceError,
}

impl Builtin {
    /// Name used in dumps and the module's builtin table.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::SpawnAsync => "spawnAsync",
            Builtin::CopyDataProperties => "copyDataProperties",
            Builtin::ForInKeys => "forInKeys",
            Builtin::SetPrototypeOf => "setPrototypeOf",
            Builtin::IteratorToArray => "iteratorToArray",
            Builtin::ArrayPush => "arrayPush",
            Builtin::ThrowTypeError => "throwTypeError",
            Builtin::EnsureObject => "ensureObject",
            Builtin::RestArguments => "restArguments",
            Builtin::ThrowReferenceError => "throwReferenceError",
        }
    }
}

// ============================================================================
// Instructions
// ============================================================================

/// The closed set of instruction kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Materializes a constant into a register
    LoadConst(Literal),
    /// Incoming argument; index 0 is `this`
    LoadParam(u32),
    /// The `arguments` object
    CreateArguments,
    /// `new.target` of the current frame
    GetNewTarget,
    /// The global object
    GetGlobalObject,

    /// Reads a frame slot
    LoadLocal(VarId),
    /// Writes a frame slot
    StoreLocal { var: VarId, value: Operand },

    /// Allocates a runtime environment for a scope
    CreateScope { scope: ScopeId, parent: Option<Operand> },
    /// The environment the running closure was created in
    GetParentScope,
    /// Walks `hops` parent links up from `start`
    ResolveScope { start: Operand, hops: u32 },
    /// The environment captured by a closure object
    GetClosureScope { closure: Operand },
    /// Reads an environment slot
    LoadEnv { env: Operand, var: VarId },
    /// Writes an environment slot
    StoreEnv { env: Operand, var: VarId, value: Operand },
    /// Throws a `ReferenceError` if `value` is the uninitialized marker,
    /// otherwise produces `value`
    ThrowIfEmpty { value: Operand, var: Option<VarId> },

    /// Global lookup; `throw_if_missing` is false under `typeof`
    LoadGlobal { name: String, throw_if_missing: bool },
    /// Global assignment
    StoreGlobal { name: String, value: Operand },
    /// Creates a global `var` binding if absent
    DeclareGlobalVar { name: String },

    /// Binary operator
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand, form: NumericForm },
    /// Unary operator
    Unary { op: UnaryOp, operand: Operand, form: NumericForm },

    /// Creates a function object over `env`
    CreateClosure { function: FunctionId, env: Option<Operand> },
    /// Creates a generator object whose body is `inner`
    CreateGenerator { inner: FunctionId, env: Option<Operand> },

    /// `callee.call(this, ...args)`
    Call { callee: Operand, this: Operand, args: Vec<Operand> },
    /// `new callee(...args)`
    Construct { callee: Operand, new_target: Operand, args: Vec<Operand> },
    /// Call with an argument array built from spreads
    CallWithArgsArray { callee: Operand, this: Operand, args: Operand },
    /// Construct with an argument array built from spreads
    ConstructWithArgsArray { callee: Operand, new_target: Operand, args: Operand },
    /// Runtime helper call
    CallBuiltin { builtin: Builtin, args: Vec<Operand> },

    /// `object.name`
    LoadNamed { object: Operand, name: String },
    /// `object[key]`
    LoadComputed { object: Operand, key: Operand },
    /// `object.name = value`
    StoreNamed { object: Operand, name: String, value: Operand },
    /// `object[key] = value`
    StoreComputed { object: Operand, key: Operand, value: Operand },
    /// `delete object.name`
    DeleteNamed { object: Operand, name: String },
    /// `delete object[key]`
    DeleteComputed { object: Operand, key: Operand },
    /// Defines an own data property without invoking setters
    DefineOwn { object: Operand, key: Operand, value: Operand, enumerable: bool },
    /// Defines an accessor property
    DefineAccessor {
        object: Operand,
        key: Operand,
        getter: Option<Operand>,
        setter: Option<Operand>,
        enumerable: bool,
    },

    /// Empty object, optionally with an explicit prototype
    AllocObject { proto: Option<Operand> },
    /// Object literal with static keys, in definition order
    AllocObjectLiteral { props: Vec<(String, Operand)> },
    /// Array literal; `Empty` elements are holes
    AllocArray { elements: Vec<Operand> },
    /// Appends every value of `iterable` to `array`
    SpreadIntoArray { array: Operand, iterable: Operand },
    /// Regular expression object
    CreateRegExp { pattern: String, flags: String },

    /// `iterable[Symbol.iterator]()`
    GetIterator { iterable: Operand },
    /// Calls the iterator's `return` method; `on_throw` suppresses its errors
    IteratorClose { iterator: Operand, on_throw: bool },

    /// The thrown value, first instruction of a handler block
    Catch,
    /// Join of values flowing in from predecessors
    Phi { incoming: Vec<(BlockId, Operand)> },
    /// `debugger`
    Debugger,
}

impl InstKind {
    /// Calls `f` on every operand in evaluation order.
    pub fn visit_operands(&self, mut f: impl FnMut(&Operand)) {
        use InstKind::*;
        match self {
            LoadConst(_) | LoadParam(_) | CreateArguments | GetNewTarget | GetGlobalObject | LoadLocal(_)
            | GetParentScope | LoadGlobal { .. } | DeclareGlobalVar { .. } | CreateRegExp { .. } | Catch
            | Debugger => {}
            StoreLocal { value, .. } | StoreGlobal { value, .. } => f(value),
            CreateScope { parent, .. } => parent.iter().for_each(f),
            ResolveScope { start, .. } => f(start),
            GetClosureScope { closure } => f(closure),
            LoadEnv { env, .. } => f(env),
            StoreEnv { env, value, .. } => {
                f(env);
                f(value);
            }
            ThrowIfEmpty { value, .. } => f(value),
            Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Unary { operand, .. } => f(operand),
            CreateClosure { env, .. } | CreateGenerator { env, .. } => env.iter().for_each(f),
            Call { callee, this, args } => {
                f(callee);
                f(this);
                args.iter().for_each(f);
            }
            Construct { callee, new_target, args } => {
                f(callee);
                f(new_target);
                args.iter().for_each(f);
            }
            CallWithArgsArray { callee, this, args } => {
                f(callee);
                f(this);
                f(args);
            }
            ConstructWithArgsArray { callee, new_target, args } => {
                f(callee);
                f(new_target);
                f(args);
            }
            CallBuiltin { args, .. } => args.iter().for_each(f),
            LoadNamed { object, .. } | DeleteNamed { object, .. } => f(object),
            LoadComputed { object, key } | DeleteComputed { object, key } => {
                f(object);
                f(key);
            }
            StoreNamed { object, value, .. } => {
                f(object);
                f(value);
            }
            StoreComputed { object, key, value } | DefineOwn { object, key, value, .. } => {
                f(object);
                f(key);
                f(value);
            }
            DefineAccessor { object, key, getter, setter, .. } => {
                f(object);
                f(key);
                getter.iter().for_each(&mut f);
                setter.iter().for_each(f);
            }
            AllocObject { proto } => proto.iter().for_each(f),
            AllocObjectLiteral { props } => props.iter().for_each(|(_, v)| f(v)),
            AllocArray { elements } => elements.iter().for_each(f),
            SpreadIntoArray { array, iterable } => {
                f(array);
                f(iterable);
            }
            GetIterator { iterable } => f(iterable),
            IteratorClose { iterator, .. } => f(iterator),
            Phi { incoming } => incoming.iter().for_each(|(_, v)| f(v)),
        }
    }

    /// Calls `f` on every operand, mutably.
    pub fn visit_operands_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        use InstKind::*;
        match self {
            LoadConst(_) | LoadParam(_) | CreateArguments | GetNewTarget | GetGlobalObject | LoadLocal(_)
            | GetParentScope | LoadGlobal { .. } | DeclareGlobalVar { .. } | CreateRegExp { .. } | Catch
            | Debugger => {}
            StoreLocal { value, .. } | StoreGlobal { value, .. } => f(value),
            CreateScope { parent, .. } => parent.iter_mut().for_each(f),
            ResolveScope { start, .. } => f(start),
            GetClosureScope { closure } => f(closure),
            LoadEnv { env, .. } => f(env),
            StoreEnv { env, value, .. } => {
                f(env);
                f(value);
            }
            ThrowIfEmpty { value, .. } => f(value),
            Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Unary { operand, .. } => f(operand),
            CreateClosure { env, .. } | CreateGenerator { env, .. } => env.iter_mut().for_each(f),
            Call { callee, this, args } => {
                f(callee);
                f(this);
                args.iter_mut().for_each(f);
            }
            Construct { callee, new_target, args } => {
                f(callee);
                f(new_target);
                args.iter_mut().for_each(f);
            }
            CallWithArgsArray { callee, this, args } => {
                f(callee);
                f(this);
                f(args);
            }
            ConstructWithArgsArray { callee, new_target, args } => {
                f(callee);
                f(new_target);
                f(args);
            }
            CallBuiltin { args, .. } => args.iter_mut().for_each(f),
            LoadNamed { object, .. } | DeleteNamed { object, .. } => f(object),
            LoadComputed { object, key } | DeleteComputed { object, key } => {
                f(object);
                f(key);
            }
            StoreNamed { object, value, .. } => {
                f(object);
                f(value);
            }
            StoreComputed { object, key, value } | DefineOwn { object, key, value, .. } => {
                f(object);
                f(key);
                f(value);
            }
            DefineAccessor { object, key, getter, setter, .. } => {
                f(object);
                f(key);
                getter.iter_mut().for_each(&mut f);
                setter.iter_mut().for_each(f);
            }
            AllocObject { proto } => proto.iter_mut().for_each(f),
            AllocObjectLiteral { props } => props.iter_mut().for_each(|(_, v)| f(v)),
            AllocArray { elements } => elements.iter_mut().for_each(f),
            SpreadIntoArray { array, iterable } => {
                f(array);
                f(iterable);
            }
            GetIterator { iterable } => f(iterable),
            IteratorClose { iterator, .. } => f(iterator),
            Phi { incoming } => incoming.iter_mut().for_each(|(_, v)| f(v)),
        }
    }

    /// Removable when unused, regardless of operand types.
    pub fn is_always_pure(&self) -> bool {
        use InstKind::*;
        matches!(
            self,
            LoadConst(_)
                | LoadParam(_)
                | CreateArguments
                | GetNewTarget
                | GetGlobalObject
                | LoadLocal(_)
                | CreateScope { .. }
                | GetParentScope
                | ResolveScope { .. }
                | GetClosureScope { .. }
                | LoadEnv { .. }
                | CreateClosure { .. }
                | CreateGenerator { .. }
                | AllocObject { .. }
                | AllocObjectLiteral { .. }
                | AllocArray { .. }
                | CreateRegExp { .. }
                | Phi { .. }
        ) || matches!(self, Unary { op: UnaryOp::TypeOf | UnaryOp::Not, .. })
    }

    /// True if the instruction can never throw.
    pub fn never_throws(&self) -> bool {
        self.is_always_pure()
            || matches!(
                self,
                InstKind::StoreLocal { .. } | InstKind::StoreEnv { .. } | InstKind::Catch | InstKind::DeclareGlobalVar { .. }
            )
    }

    /// Short mnemonic used in dumps.
    pub fn mnemonic(&self) -> &'static str {
        use InstKind::*;
        match self {
            LoadConst(_) => "LoadConst",
            LoadParam(_) => "LoadParam",
            CreateArguments => "CreateArguments",
            GetNewTarget => "GetNewTarget",
            GetGlobalObject => "GetGlobalObject",
            LoadLocal(_) => "LoadLocal",
            StoreLocal { .. } => "StoreLocal",
            CreateScope { .. } => "CreateScope",
            GetParentScope => "GetParentScope",
            ResolveScope { .. } => "ResolveScope",
            GetClosureScope { .. } => "GetClosureScope",
            LoadEnv { .. } => "LoadEnv",
            StoreEnv { .. } => "StoreEnv",
            ThrowIfEmpty { .. } => "ThrowIfEmpty",
            LoadGlobal { .. } => "LoadGlobal",
            StoreGlobal { .. } => "StoreGlobal",
            DeclareGlobalVar { .. } => "DeclareGlobalVar",
            Binary { .. } => "Binary",
            Unary { .. } => "Unary",
            CreateClosure { .. } => "CreateClosure",
            CreateGenerator { .. } => "CreateGenerator",
            Call { .. } => "Call",
            Construct { .. } => "Construct",
            CallWithArgsArray { .. } => "CallWithArgsArray",
            ConstructWithArgsArray { .. } => "ConstructWithArgsArray",
            CallBuiltin { .. } => "CallBuiltin",
            LoadNamed { .. } => "LoadNamed",
            LoadComputed { .. } => "LoadComputed",
            StoreNamed { .. } => "StoreNamed",
            StoreComputed { .. } => "StoreComputed",
            DeleteNamed { .. } => "DeleteNamed",
            DeleteComputed { .. } => "DeleteComputed",
            DefineOwn { .. } => "DefineOwn",
            DefineAccessor { .. } => "DefineAccessor",
            AllocObject { .. } => "AllocObject",
            AllocObjectLiteral { .. } => "AllocObjectLiteral",
            AllocArray { .. } => "AllocArray",
            SpreadIntoArray { .. } => "SpreadIntoArray",
            CreateRegExp { .. } => "CreateRegExp",
            GetIterator { .. } => "GetIterator",
            IteratorClose { .. } => "IteratorClose",
            Catch => "Catch",
            Phi { .. } => "Phi",
            Debugger => "Debugger",
        }
    }
}

/// An instruction and its bookkeeping.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// What it does
    pub kind: InstKind,
    /// Owning block
    pub block: BlockId,
    /// Inferred result type
    pub ty: Type,
    /// Source location
    pub span: Span,
    /// Innermost source scope, for debug scope tables
    pub scope: Option<ScopeId>,
    /// Number of inlined bodies this instruction was copied through
    pub inline_depth: u32,
}

// ============================================================================
// Blocks
// ============================================================================

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Unconditional jump
    Branch(BlockId),
    /// Two-way branch on truthiness
    CondBranch { cond: Operand, then_block: BlockId, else_block: BlockId },
    /// Multi-way branch by strict equality against constant cases
    Switch { value: Operand, cases: Vec<(Literal, BlockId)>, default: BlockId },
    /// Return from the function
    Return(Operand),
    /// Throw an exception
    Throw(Operand),
    /// Control never reaches the end of the block
    Unreachable,
}

impl Terminator {
    /// Normal-flow successors, in order, possibly with duplicates.
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(b) => vec![*b],
            Terminator::CondBranch { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            Terminator::Return(_) | Terminator::Throw(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Redirects every edge to `from` towards `to`.
    pub fn replace_target(&mut self, from: BlockId, to: BlockId) {
        let fix = |b: &mut BlockId| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            Terminator::Branch(b) => fix(b),
            Terminator::CondBranch { then_block, else_block, .. } => {
                fix(then_block);
                fix(else_block);
            }
            Terminator::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, b)| fix(b));
                fix(default);
            }
            Terminator::Return(_) | Terminator::Throw(_) | Terminator::Unreachable => {}
        }
    }

    /// The terminator's operand, if any.
    pub fn operand(&self) -> Option<&Operand> {
        match self {
            Terminator::CondBranch { cond: v, .. }
            | Terminator::Switch { value: v, .. }
            | Terminator::Return(v)
            | Terminator::Throw(v) => Some(v),
            Terminator::Branch(_) | Terminator::Unreachable => None,
        }
    }

    /// Mutable access to the operand.
    pub fn operand_mut(&mut self) -> Option<&mut Operand> {
        match self {
            Terminator::CondBranch { cond: v, .. }
            | Terminator::Switch { value: v, .. }
            | Terminator::Return(v)
            | Terminator::Throw(v) => Some(v),
            Terminator::Branch(_) | Terminator::Unreachable => None,
        }
    }
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    /// Instructions in execution order
    pub insts: Vec<ValueId>,
    /// Exit
    pub term: Terminator,
    /// Source location of the exit
    pub term_span: Span,
    /// Predecessors, including blocks whose handler this is
    pub preds: Vec<BlockId>,
    /// Exception handler covering the block's instructions
    pub handler: Option<BlockId>,
    /// Tombstone; deleted blocks keep their id
    pub deleted: bool,
}

impl Block {
    fn new(handler: Option<BlockId>) -> Self {
        Self {
            insts: Vec::new(),
            term: Terminator::Unreachable,
            term_span: Span::default(),
            preds: Vec::new(),
            handler,
            deleted: false,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Compiled-function flags that restrict optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Source function is `function*`
    pub generator: bool,
    /// Source function is `async`
    pub is_async: bool,
    /// Resumable state-machine body of a generator or async function
    pub resumable: bool,
    /// Reads `arguments`
    pub uses_arguments: bool,
    /// Reads `new.target`
    pub uses_new_target: bool,
}

/// One compiled function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Name for the function table and diagnostics
    pub name: String,
    /// Resolved source function, if not synthetic
    pub source: Option<FuncIndex>,
    /// Kind of source function
    pub kind: FunctionKind,
    /// Declared parameter count, excluding `this`
    pub param_count: u32,
    /// Strict mode code
    pub strict: bool,
    /// Flags
    pub flags: FunctionFlags,
    /// Source range
    pub span: Span,
    /// Lexically enclosing function
    pub parent: Option<FunctionId>,
    /// Scope whose environment closures of this function are created over
    pub env_scope: Option<ScopeId>,
    /// Instruction arena
    pub insts: IndexVec<ValueId, Instruction>,
    /// Block arena
    pub blocks: IndexVec<BlockId, Block>,
    /// Entry block
    pub entry: BlockId,
    /// Call sites inlined into this function so far
    pub inline_count: u32,
}

impl Function {
    /// Creates a function with an empty entry block.
    pub fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        let mut blocks = IndexVec::new();
        let entry = blocks.push(Block::new(None));
        Self {
            name: name.into(),
            source: None,
            kind,
            param_count: 0,
            strict: true,
            flags: FunctionFlags::default(),
            span: Span::default(),
            parent: None,
            env_scope: None,
            insts: IndexVec::new(),
            blocks,
            entry,
            inline_count: 0,
        }
    }

    /// Appends an empty block.
    pub fn add_block(&mut self, handler: Option<BlockId>) -> BlockId {
        self.blocks.push(Block::new(handler))
    }

    /// Creates an instruction without placing it in a block.
    pub fn create_inst(&mut self, block: BlockId, kind: InstKind, span: Span) -> ValueId {
        self.insts.push(Instruction {
            kind,
            block,
            ty: Type::ANY,
            span,
            scope: None,
            inline_depth: 0,
        })
    }

    /// Appends an instruction to `block`.
    pub fn append(&mut self, block: BlockId, kind: InstKind, span: Span) -> ValueId {
        let v = self.create_inst(block, kind, span);
        self.blocks[block].insts.push(v);
        v
    }

    /// Inserts an instruction at position `pos` of `block`.
    pub fn insert(&mut self, block: BlockId, pos: usize, kind: InstKind, span: Span) -> ValueId {
        let v = self.create_inst(block, kind, span);
        self.blocks[block].insts.insert(pos, v);
        v
    }

    /// Instruction data.
    pub fn inst(&self, v: ValueId) -> &Instruction {
        &self.insts[v]
    }

    /// Live blocks in id order.
    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter_enumerated().filter(|(_, b)| !b.deleted).map(|(id, _)| id)
    }

    /// Successors including the exception edge.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let b = &self.blocks[block];
        let mut out = b.term.targets();
        if let Some(h) = b.handler {
            out.push(h);
        }
        out.dedup();
        out
    }

    /// Rebuilds every live block's predecessor list from terminators and handlers.
    pub fn recompute_preds(&mut self) {
        for b in self.blocks.iter_mut() {
            b.preds.clear();
        }
        let live: Vec<BlockId> = self.live_blocks().collect();
        for b in live {
            for s in self.successors(b) {
                let preds = &mut self.blocks[s].preds;
                if !preds.contains(&b) {
                    preds.push(b);
                }
            }
        }
    }

    /// Rewrites every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: &Operand) {
        let live: Vec<BlockId> = self.live_blocks().collect();
        for b in live {
            for i in 0..self.blocks[b].insts.len() {
                let v = self.blocks[b].insts[i];
                self.insts[v].kind.visit_operands_mut(|op| {
                    if *op == Operand::Value(old) {
                        *op = new.clone();
                    }
                });
            }
            if let Some(op) = self.blocks[b].term.operand_mut() {
                if *op == Operand::Value(old) {
                    *op = new.clone();
                }
            }
        }
    }

    /// Number of uses of each value by live instructions and terminators.
    pub fn use_counts(&self) -> IndexVec<ValueId, u32> {
        let mut counts = IndexVec::from_elem(0u32, self.insts.len());
        for b in self.live_blocks() {
            let block = &self.blocks[b];
            for &v in &block.insts {
                self.insts[v].kind.visit_operands(|op| {
                    if let Operand::Value(u) = op {
                        counts[*u] += 1;
                    }
                });
            }
            if let Some(Operand::Value(u)) = block.term.operand() {
                counts[*u] += 1;
            }
        }
        counts
    }

    /// Removes `v` from its block's instruction list.
    pub fn remove_inst(&mut self, v: ValueId) {
        let block = self.insts[v].block;
        self.blocks[block].insts.retain(|&x| x != v);
    }

    /// Number of instructions in live blocks.
    pub fn instruction_count(&self) -> usize {
        self.live_blocks().map(|b| self.blocks[b].insts.len()).sum()
    }

    /// Type of an operand.
    pub fn operand_type(&self, op: &Operand) -> Type {
        match op {
            Operand::Value(v) => self.insts[*v].ty,
            Operand::Literal(lit) => Type::of_literal(lit),
        }
    }

    /// Resolves a value to the constant it loads, if any.
    pub fn constant_of<'a>(&'a self, op: &'a Operand) -> Option<&'a Literal> {
        match op {
            Operand::Literal(lit) => Some(lit),
            Operand::Value(v) => match &self.insts[*v].kind {
                InstKind::LoadConst(lit) => Some(lit),
                _ => None,
            },
        }
    }

    /// Deletes a block and its instructions.
    pub fn delete_block(&mut self, block: BlockId) {
        let b = &mut self.blocks[block];
        b.deleted = true;
        b.insts.clear();
        b.preds.clear();
        b.term = Terminator::Unreachable;
        b.handler = None;
    }

    /// Drops phi entries for `pred` in `block`.
    pub fn remove_phi_incoming(&mut self, block: BlockId, pred: BlockId) {
        for i in 0..self.blocks[block].insts.len() {
            let v = self.blocks[block].insts[i];
            if let InstKind::Phi { incoming } = &mut self.insts[v].kind {
                incoming.retain(|(b, _)| *b != pred);
            }
        }
    }

    /// Renames the phi incoming edge `from` to `to` in `block`.
    pub fn rename_phi_incoming(&mut self, block: BlockId, from: BlockId, to: BlockId) {
        for i in 0..self.blocks[block].insts.len() {
            let v = self.blocks[block].insts[i];
            if let InstKind::Phi { incoming } = &mut self.insts[v].kind {
                for (b, _) in incoming.iter_mut() {
                    if *b == from {
                        *b = to;
                    }
                }
            }
        }
    }

    /// The phis at the head of a block.
    pub fn phis(&self, block: BlockId) -> impl Iterator<Item = ValueId> + '_ {
        self.blocks[block]
            .insts
            .iter()
            .copied()
            .take_while(|&v| matches!(self.insts[v].kind, InstKind::Phi { .. }))
    }
}

// ============================================================================
// Modules
// ============================================================================

/// A binding the IR reads or writes.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Source name, or a synthetic `%name`
    pub name: String,
    /// Source declaration, if any
    pub decl: Option<DeclId>,
    /// Declaring scope
    pub scope: ScopeId,
    /// Function whose frame or environment owns the binding
    pub function: FunctionId,
    /// Lives in an environment slot
    pub captured: bool,
    /// Writes throw
    pub immutable: bool,
    /// Every value stored is a primitive and the slot never escapes
    pub primitive: bool,
}

/// Layout of a runtime environment.
#[derive(Debug, Clone)]
pub struct ScopeDesc {
    /// What introduced the scope
    pub kind: ScopeKind,
    /// Nearest materialized enclosing scope
    pub parent: Option<ScopeId>,
    /// Function that creates the environment
    pub function: FunctionId,
    /// Slot order
    pub slots: Vec<VarId>,
}

impl ScopeDesc {
    /// Slot index of a variable.
    pub fn slot_of(&self, var: VarId) -> Option<u32> {
        self.slots.iter().position(|&v| v == var).map(|i| i as u32)
    }
}

/// The IR of a whole compilation unit.
#[derive(Debug, Clone)]
pub struct Module {
    /// Source file
    pub file: String,
    /// All functions; `entry` is the top-level code
    pub functions: IndexVec<FunctionId, Function>,
    /// Top-level function
    pub entry: FunctionId,
    /// All variables
    pub vars: IndexVec<VarId, Variable>,
    /// Materialized environments by scope
    pub scopes: BTreeMap<ScopeId, ScopeDesc>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            functions: IndexVec::new(),
            entry: FunctionId(0),
            vars: IndexVec::new(),
            scopes: BTreeMap::new(),
        }
    }

    /// Number of parent links from `from` up to `to`, if `to` is an ancestor.
    pub fn scope_distance(&self, from: ScopeId, to: ScopeId) -> Option<u32> {
        let mut cur = Some(from);
        let mut hops = 0;
        while let Some(s) = cur {
            if s == to {
                return Some(hops);
            }
            cur = self.scopes.get(&s).and_then(|d| d.parent);
            hops += 1;
        }
        None
    }

    /// Total instructions across functions.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(Function::instruction_count).sum()
    }
}
