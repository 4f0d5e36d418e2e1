// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lowering of the resolved syntax tree into IR.
//!
//! Every source function becomes one [`Function`] whose id equals its
//! [`FuncIndex`]; generator and async bodies add one synthetic resumable
//! function each. Nested functions are lowered when their closure is first
//! created, so a finalizer that is duplicated on several exits still refers
//! to a single compiled body.
//!
//! Bindings map to three kinds of storage: frame slots for uncaptured
//! locals, environment slots for captured ones, and dynamic global lookups
//! for unresolved names and script-level declarations.

mod class;
mod expr;
mod generator;
mod pattern;
mod stmt;

#[cfg(test)]
mod tests;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::ast::{self, BlockStatement, Class, FunctionBody, Pattern, Program, Span, Statement};
use crate::error::InternalError;
use crate::index::IndexVec;
use crate::ir::{
    BlockId, Builder, Builtin, Function, FunctionId, InstKind, Literal, Module, Operand, ScopeDesc, VarId, Variable,
};
use crate::sema::{DeclId, DeclKind, FuncIndex, FunctionKind, ScopeId, SemanticModel};

use generator::Resume;

/// Lowers a resolved program into an IR module.
pub fn build_module(program: &Program, model: &SemanticModel) -> Result<Module, InternalError> {
    let mut lowering = ModuleLowering::new(program, model);
    lowering.compile_function(FuncIndex::PROGRAM, Body::Program(program));
    if let Some(err) = lowering.error {
        return Err(err);
    }
    debug!(
        functions = lowering.module.functions.len(),
        vars = lowering.module.vars.len(),
        environments = lowering.module.scopes.len(),
        "built IR"
    );
    trace!("{}", lowering.module);
    Ok(lowering.module)
}

/// The code a function is built from.
#[derive(Clone, Copy)]
enum Body<'a> {
    Program(&'a Program),
    Function(&'a ast::Function),
    Fields { class: &'a Class, is_static: bool },
}

/// Where a binding lives at runtime.
#[derive(Debug, Clone, PartialEq)]
enum Storage {
    Frame(VarId),
    Env(ScopeId, VarId),
    Global(String),
}

struct ModuleLowering<'a> {
    model: &'a SemanticModel,
    module: Module,
    decl_vars: IndexVec<DeclId, Option<VarId>>,
    compiled: FxHashSet<FuncIndex>,
    /// Instance field initializer binding of each class constructor
    ctor_fields: FxHashMap<FuncIndex, DeclId>,
    /// `%state` and `%this` slots of resumable functions
    resume_slots: FxHashMap<FuncIndex, (VarId, VarId)>,
    error: Option<InternalError>,
}

impl<'a> ModuleLowering<'a> {
    fn new(program: &Program, model: &'a SemanticModel) -> Self {
        let mut module = Module::new(program.file.clone());
        for (idx, info) in model.functions.iter_enumerated() {
            let mut f = Function::new(info.name.clone(), info.kind);
            f.source = Some(idx);
            f.strict = info.strict;
            f.flags.generator = info.is_generator;
            f.flags.is_async = info.is_async;
            f.flags.uses_arguments = info.arguments_decl.is_some();
            f.parent = info.parent.map(|p| FunctionId(p.0));
            module.functions.push(f);
        }
        module.entry = FunctionId(FuncIndex::PROGRAM.0);

        // Scopes reified at runtime: any with a captured binding, plus the
        // function scope of every resumable function, which holds its state.
        let mut envs: FxHashSet<ScopeId> = FxHashSet::default();
        for (id, scope) in model.scopes.iter_enumerated() {
            if !scope.captured.is_empty() {
                envs.insert(id);
            }
        }
        for info in model.functions.iter() {
            if info.is_resumable() {
                envs.insert(info.scope);
            }
        }

        let mut decl_vars = IndexVec::from_elem(None, model.decls.len());
        for (id, decl) in model.decls.iter_enumerated() {
            if decl.global {
                continue;
            }
            let var = module.vars.push(Variable {
                name: decl.name.clone(),
                decl: Some(id),
                scope: decl.scope,
                function: FunctionId(model.decl_function(id).0),
                captured: decl.captured,
                immutable: decl.immutable,
                primitive: false,
            });
            decl_vars[id] = Some(var);
        }

        let mut sorted: Vec<ScopeId> = envs.iter().copied().collect();
        sorted.sort();
        for id in sorted {
            let data = model.scope(id);
            let mut parent = data.parent;
            while let Some(p) = parent {
                if envs.contains(&p) {
                    break;
                }
                parent = model.scope(p).parent;
            }
            let slots = data.captured.iter().filter_map(|&d| decl_vars[d]).collect();
            module.scopes.insert(
                id,
                ScopeDesc {
                    kind: data.kind,
                    parent,
                    function: FunctionId(data.function.0),
                    slots,
                },
            );
        }

        let mut resume_slots = FxHashMap::default();
        for (idx, info) in model.functions.iter_enumerated() {
            if !info.is_resumable() {
                continue;
            }
            let mut slot = |name: &str| {
                let var = module.vars.push(Variable {
                    name: name.to_string(),
                    decl: None,
                    scope: info.scope,
                    function: FunctionId(idx.0),
                    captured: true,
                    immutable: false,
                    primitive: false,
                });
                if let Some(desc) = module.scopes.get_mut(&info.scope) {
                    desc.slots.push(var);
                }
                var
            };
            let state = slot("%state");
            let this = slot("%this");
            resume_slots.insert(idx, (state, this));
        }

        Self {
            model,
            module,
            decl_vars,
            compiled: FxHashSet::default(),
            ctor_fields: FxHashMap::default(),
            resume_slots,
            error: None,
        }
    }

    fn fail(&mut self, function: &str, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(InternalError::new(function, message));
        }
    }

    /// Nearest reified scope at or above `scope`.
    fn env_ancestor(&self, scope: Option<ScopeId>) -> Option<ScopeId> {
        let mut cur = scope;
        while let Some(s) = cur {
            if self.module.scopes.contains_key(&s) {
                return Some(s);
            }
            cur = self.model.scope(s).parent;
        }
        None
    }

    /// Lowers a source function once.
    fn compile_function(&mut self, idx: FuncIndex, body: Body<'a>) {
        if !self.compiled.insert(idx) {
            return;
        }
        let model = self.model;
        let info = model.function(idx);
        let id = FunctionId(idx.0);
        {
            let env_scope = self.env_ancestor(model.scope(info.scope).parent);
            let f = &mut self.module.functions[id];
            f.env_scope = env_scope;
            if let Body::Function(node) = body {
                f.span = node.span;
                f.param_count = node.params.iter().filter(|p| !matches!(p, Pattern::RestElement(_))).count() as u32;
            }
        }
        if info.is_resumable() {
            generator::compile_resumable(self, idx, body);
            return;
        }

        let template = std::mem::replace(&mut self.module.functions[id], Function::new("", info.kind));
        let mut lowering = FnLowering::new(self, idx, template);
        lowering.prologue(body);
        lowering.compile_body(body);
        let function = lowering.finish();
        debug!(function = %function.name, blocks = function.blocks.len(), "lowered function");
        self.module.functions[id] = function;
    }
}

// ============================================================================
// Per-function state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Loop,
    Switch,
    Label,
}

enum ControlKind<'a> {
    /// A `break`/`continue` destination
    Target {
        labels: Vec<String>,
        kind: TargetKind,
        break_to: BlockId,
        continue_to: Option<BlockId>,
        /// Iterator closed when leaving the loop abruptly
        iterator: Option<Operand>,
    },
    /// A `finally` block run on every abrupt exit
    Finally(&'a BlockStatement),
}

struct Control<'a> {
    kind: ControlKind<'a>,
    /// Exception handler in effect outside the construct
    handler: Option<BlockId>,
    /// Environment depth outside the construct
    env_depth: usize,
}

/// Static scope state saved by [`FnLowering::enter_scope`].
struct ScopeMark {
    scope: ScopeId,
    env_depth: usize,
}

/// Lowers the body of one function.
struct FnLowering<'a, 'm> {
    m: &'m mut ModuleLowering<'a>,
    b: Builder,
    id: FunctionId,
    func: FuncIndex,
    /// Live runtime environments, innermost last
    envs: Vec<(ScopeId, Operand)>,
    control: Vec<Control<'a>>,
    /// Innermost static scope
    scope: ScopeId,
    /// Labels waiting for the statement they label
    pending_labels: Vec<String>,
    /// Short-circuit target of the innermost optional chain
    chain_short: Option<BlockId>,
    /// Present while building a resumable body
    resume: Option<Resume>,
}

impl<'a, 'm> FnLowering<'a, 'm> {
    fn new(m: &'m mut ModuleLowering<'a>, func: FuncIndex, function: Function) -> Self {
        let scope = m.model.function(func).scope;
        let id = FunctionId(func.0);
        let mut b = Builder::new(function);
        b.set_scope(Some(scope));
        Self {
            m,
            b,
            id,
            func,
            envs: Vec::new(),
            control: Vec::new(),
            scope,
            pending_labels: Vec::new(),
            chain_short: None,
            resume: None,
        }
    }

    fn model(&self) -> &'a SemanticModel {
        self.m.model
    }

    fn fail(&mut self, message: impl Into<String>) {
        let name = self.b.func().name.clone();
        self.m.fail(&name, message);
    }

    fn finish(mut self) -> Function {
        if !self.b.is_terminated() {
            self.fail("function body fell off the end");
        }
        self.b.finish()
    }

    fn emit(&mut self, kind: InstKind) -> Operand {
        self.b.emit_op(kind)
    }

    fn set_span(&mut self, span: Span) -> Span {
        self.b.set_span(span)
    }

    /// Jumps to `target` and continues building there.
    fn goto(&mut self, target: BlockId) {
        self.b.branch(target);
        self.b.switch_to(target);
    }

    /// Makes `handler` cover the code emitted from now on.
    fn set_handler(&mut self, handler: Option<BlockId>) {
        self.b.set_handler(handler);
        if !self.b.is_terminated() && self.b.func().blocks[self.b.block()].handler != handler {
            let next = self.b.create_block();
            self.goto(next);
        }
    }

    fn is_derived_ctor(&self) -> bool {
        matches!(self.model().function(self.func).kind, FunctionKind::Constructor { derived: true })
    }

    /// Iterator result object `{ value, done }`.
    fn iter_result(&mut self, value: Operand, done: bool) -> Operand {
        self.emit(InstKind::AllocObjectLiteral {
            props: vec![("value".to_string(), value), ("done".to_string(), Operand::boolean(done))],
        })
    }

    fn throw_type_error(&mut self, message: &str) {
        self.emit(InstKind::CallBuiltin {
            builtin: Builtin::ThrowTypeError,
            args: vec![Operand::string(message)],
        });
    }

    // ========================================================================
    // Environments and storage
    // ========================================================================

    fn current_env(&self) -> Option<Operand> {
        self.envs.last().map(|(_, env)| env.clone())
    }

    /// The runtime environment of reified scope `scope`.
    fn env_for(&mut self, scope: ScopeId) -> Operand {
        let Some((top, env)) = self.envs.last().cloned() else {
            self.fail(format!("no environment for scope s{}", scope.0));
            return Operand::UNDEFINED;
        };
        match self.m.module.scope_distance(top, scope) {
            Some(0) => env,
            Some(hops) => self.emit(InstKind::ResolveScope { start: env, hops }),
            None => {
                self.fail(format!("scope s{} is not an ancestor of s{}", scope.0, top.0));
                Operand::UNDEFINED
            }
        }
    }

    fn storage(&mut self, decl: DeclId) -> Storage {
        let data = self.model().decl(decl);
        match self.m.decl_vars[decl] {
            None => Storage::Global(data.name.clone()),
            Some(var) if self.m.module.vars[var].captured => Storage::Env(data.scope, var),
            Some(var) => Storage::Frame(var),
        }
    }

    fn load_storage(&mut self, storage: &Storage) -> Operand {
        match storage {
            Storage::Frame(var) => self.emit(InstKind::LoadLocal(*var)),
            Storage::Env(scope, var) => {
                let env = self.env_for(*scope);
                self.emit(InstKind::LoadEnv { env, var: *var })
            }
            Storage::Global(name) => self.emit(InstKind::LoadGlobal {
                name: name.clone(),
                throw_if_missing: true,
            }),
        }
    }

    fn store_storage(&mut self, storage: &Storage, value: Operand) {
        match storage {
            Storage::Frame(var) => {
                self.emit(InstKind::StoreLocal { var: *var, value });
            }
            Storage::Env(scope, var) => {
                let env = self.env_for(*scope);
                self.emit(InstKind::StoreEnv { env, var: *var, value });
            }
            Storage::Global(name) => {
                self.emit(InstKind::StoreGlobal { name: name.clone(), value });
            }
        }
    }

    /// Reads a binding, guarding against its dead zone when `check` is set.
    fn load_decl(&mut self, decl: DeclId, check: bool) -> Operand {
        let storage = self.storage(decl);
        let value = self.load_storage(&storage);
        if !check {
            return value;
        }
        let var = match storage {
            Storage::Frame(var) | Storage::Env(_, var) => Some(var),
            Storage::Global(_) => None,
        };
        self.emit(InstKind::ThrowIfEmpty { value, var })
    }

    /// Writes a binding without mutability checks.
    fn init_decl(&mut self, decl: DeclId, value: Operand) {
        let storage = self.storage(decl);
        self.store_storage(&storage, value);
    }

    /// A fresh compiler temporary. Resumable bodies keep temporaries in the
    /// environment so they survive suspension.
    fn new_temp(&mut self, name: &str) -> Storage {
        let resumable = self.resume.as_ref().map(|r| r.scope);
        let scope = resumable.unwrap_or(self.scope);
        // Spilled state belongs to the function that creates the environment.
        let function = if resumable.is_some() { FunctionId(self.func.0) } else { self.id };
        let var = self.m.module.vars.push(Variable {
            name: format!("%{name}"),
            decl: None,
            scope,
            function,
            captured: resumable.is_some(),
            immutable: false,
            primitive: false,
        });
        match resumable {
            Some(scope) => {
                if let Some(desc) = self.m.module.scopes.get_mut(&scope) {
                    desc.slots.push(var);
                }
                Storage::Env(scope, var)
            }
            None => Storage::Frame(var),
        }
    }

    /// Enters a static scope, creating its environment if it is reified and
    /// putting its guarded lexical bindings into their dead zone.
    fn enter_scope(&mut self, scope: Option<ScopeId>) -> Option<ScopeMark> {
        let scope = scope?;
        let mark = ScopeMark {
            scope: self.scope,
            env_depth: self.envs.len(),
        };
        self.scope = scope;
        self.b.set_scope(Some(scope));
        if let Some(desc) = self.m.module.scopes.get(&scope) {
            let parent = desc.parent;
            let parent_env = parent.map(|p| self.env_for(p));
            let env = self.emit(InstKind::CreateScope { scope, parent: parent_env });
            self.envs.push((scope, env));
        }
        let model = self.model();
        for &decl in &model.scope(scope).decls {
            let data = model.decl(decl);
            if data.kind.is_lexical() && data.needs_tdz {
                self.init_decl(decl, Operand::Literal(Literal::Empty));
            }
        }
        Some(mark)
    }

    fn leave_scope(&mut self, mark: Option<ScopeMark>) {
        if let Some(mark) = mark {
            self.scope = mark.scope;
            self.b.set_scope(Some(mark.scope));
            self.envs.truncate(mark.env_depth);
        }
    }

    /// Replaces the environment of the innermost reified scope `scope` with a
    /// copy, so closures created in earlier iterations keep their snapshot.
    fn copy_env(&mut self, scope: ScopeId) -> Option<Operand> {
        let desc = self.m.module.scopes.get(&scope)?;
        let (slots, has_parent) = (desc.slots.clone(), desc.parent.is_some());
        let old = self.env_for(scope);
        let parent = has_parent.then(|| self.emit(InstKind::ResolveScope { start: old.clone(), hops: 1 }));
        let new = self.emit(InstKind::CreateScope { scope, parent });
        for var in slots {
            let value = self.emit(InstKind::LoadEnv { env: old.clone(), var });
            self.emit(InstKind::StoreEnv { env: new.clone(), var, value });
        }
        if let Some(entry) = self.envs.iter_mut().rev().find(|(s, _)| *s == scope) {
            entry.1 = new.clone();
        }
        Some(new)
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Lowers `f` if needed and creates a closure over the current environment.
    fn create_closure(&mut self, f: &'a ast::Function) -> Operand {
        let Some(idx) = f.info else {
            self.fail("function was not resolved");
            return Operand::UNDEFINED;
        };
        self.m.compile_function(idx, Body::Function(f));
        self.closure_of(idx)
    }

    fn closure_of(&mut self, idx: FuncIndex) -> Operand {
        let function = FunctionId(idx.0);
        let env_scope = self.m.module.functions[function].env_scope;
        let env = env_scope.map(|s| self.env_for(s));
        self.emit(InstKind::CreateClosure { function, env })
    }

    /// Creates closures for the function declarations directly in `body`.
    fn hoist_functions(&mut self, body: &'a [Statement]) {
        for stmt in body {
            if let Statement::FunctionDeclaration(f) = stmt {
                let saved = self.set_span(f.span);
                let closure = self.create_closure(f);
                match f.id.as_ref().and_then(|id| id.binding) {
                    Some(decl) => self.init_decl(decl, closure),
                    None => {
                        self.emit(InstKind::StoreGlobal {
                            name: f.name().to_string(),
                            value: closure,
                        });
                    }
                }
                self.set_span(saved);
            }
        }
    }

    // ========================================================================
    // Prologue and body
    // ========================================================================

    /// Binds the implicit values, parameters and hoisted declarations of a
    /// function, leaving its function scope entered.
    fn prologue(&mut self, body: Body<'a>) {
        let model = self.model();
        let info = model.function(self.func);
        if let Some(env_scope) = self.b.func().env_scope {
            let env = self.emit(InstKind::GetParentScope);
            self.envs.push((env_scope, env));
        }
        // The function scope is never left; its mark is dropped.
        let scope = info.scope;
        self.scope = scope;
        if let Some(desc) = self.m.module.scopes.get(&scope) {
            let parent = desc.parent;
            let parent_env = parent.map(|p| self.env_for(p));
            let env = self.emit(InstKind::CreateScope { scope, parent: parent_env });
            self.envs.push((scope, env));
        }

        if let Some(&(_, this_slot)) = self.m.resume_slots.get(&self.func) {
            let this = self.emit(InstKind::LoadParam(0));
            self.store_storage(&Storage::Env(scope, this_slot), this);
        }
        if let Some(decl) = info.this_decl {
            let value = if self.is_derived_ctor() {
                Operand::Literal(Literal::Empty)
            } else {
                self.emit(InstKind::LoadParam(0))
            };
            self.init_decl(decl, value);
        }
        if let Some(decl) = info.arguments_decl {
            let args = self.emit(InstKind::CreateArguments);
            self.init_decl(decl, args);
        }
        if let Some(decl) = info.new_target_decl {
            self.b.func_mut().flags.uses_new_target = true;
            let target = self.emit(InstKind::GetNewTarget);
            self.init_decl(decl, target);
        }

        for &decl in &model.scope(scope).decls {
            let data = model.decl(decl);
            match data.kind {
                DeclKind::Var | DeclKind::Function if data.global => {
                    self.emit(InstKind::DeclareGlobalVar { name: data.name.clone() });
                }
                DeclKind::Var => self.init_decl(decl, Operand::UNDEFINED),
                DeclKind::Let | DeclKind::Const | DeclKind::Class if data.needs_tdz => {
                    self.init_decl(decl, Operand::Literal(Literal::Empty));
                }
                _ => {}
            }
        }

        // Base constructors initialize fields before running their body.
        if matches!(info.kind, FunctionKind::Constructor { derived: false }) {
            let this = self.emit(InstKind::LoadParam(0));
            self.run_field_initializer(this);
        }

        match body {
            Body::Function(f) => {
                for (i, param) in f.params.iter().enumerate() {
                    let saved = self.set_span(param.span());
                    match param {
                        Pattern::RestElement(rest) => {
                            let rest_args = self.emit(InstKind::CallBuiltin {
                                builtin: Builtin::RestArguments,
                                args: vec![Operand::number(i as f64)],
                            });
                            self.bind_pattern(&rest.argument, rest_args, true);
                        }
                        _ => {
                            let arg = self.emit(InstKind::LoadParam(i as u32 + 1));
                            self.bind_pattern(param, arg, true);
                        }
                    }
                    self.set_span(saved);
                }
                if let FunctionBody::Block(block) = &f.body {
                    self.hoist_functions(&block.body);
                }
            }
            Body::Program(program) => self.hoist_functions(&program.body),
            Body::Fields { .. } => {}
        }
    }

    /// Lowers the statements of a function and its implicit return.
    fn compile_body(&mut self, body: Body<'a>) {
        match body {
            Body::Program(program) => {
                self.compile_statements(&program.body);
                self.compile_return(Operand::UNDEFINED);
            }
            Body::Function(f) => match &f.body {
                FunctionBody::Block(block) => {
                    self.compile_statements(&block.body);
                    self.compile_return(Operand::UNDEFINED);
                }
                FunctionBody::Expression(expr) => {
                    let value = self.compile_expression(expr);
                    self.compile_return(value);
                }
            },
            Body::Fields { class, is_static } => {
                self.compile_field_definitions(class, is_static);
                self.compile_return(Operand::UNDEFINED);
            }
        }
    }

    /// Calls the instance field initializer of the enclosing class, if any.
    fn run_field_initializer(&mut self, this: Operand) {
        let mut owner = self.func;
        let model = self.model();
        while model.function(owner).is_arrow() {
            match model.function(owner).parent {
                Some(parent) => owner = parent,
                None => break,
            }
        }
        if let Some(&fields) = self.m.ctor_fields.get(&owner) {
            let init = self.load_decl(fields, false);
            self.emit(InstKind::Call {
                callee: init,
                this,
                args: Vec::new(),
            });
        }
    }

    // ========================================================================
    // Abrupt completions
    // ========================================================================

    fn push_control(&mut self, kind: ControlKind<'a>) {
        let handler = self.b.handler();
        let env_depth = self.envs.len();
        self.control.push(Control {
            kind,
            handler,
            env_depth,
        });
    }

    /// Runs the exit action of control entry `i` for a jump that leaves it.
    fn unwind(&mut self, i: usize) {
        let entry = &self.control[i];
        let (handler, env_depth) = (entry.handler, entry.env_depth);
        match &entry.kind {
            ControlKind::Target { iterator: Some(iterator), .. } => {
                let iterator = iterator.clone();
                self.set_handler(handler);
                self.envs.truncate(env_depth);
                self.emit(InstKind::IteratorClose { iterator, on_throw: false });
            }
            ControlKind::Finally(body) => {
                let body = *body;
                self.set_handler(handler);
                self.envs.truncate(env_depth);
                let inner = self.control.split_off(i);
                self.compile_block(body);
                self.control.extend(inner);
            }
            ControlKind::Target { .. } => {}
        }
    }

    /// Lowers `break` or `continue`.
    fn compile_jump(&mut self, label: Option<&str>, is_continue: bool) {
        let target = self.control.iter().rposition(|c| match &c.kind {
            ControlKind::Target { labels, kind, .. } => match label {
                Some(l) => labels.iter().any(|x| x == l),
                None if is_continue => *kind == TargetKind::Loop,
                None => *kind != TargetKind::Label,
            },
            ControlKind::Finally(_) => false,
        });
        let Some(target) = target else {
            self.fail("jump without a target");
            return;
        };
        let saved_envs = self.envs.clone();
        let saved_handler = self.b.handler();
        for i in (target + 1..self.control.len()).rev() {
            self.unwind(i);
        }
        let entry = &self.control[target];
        let (handler, env_depth) = (entry.handler, entry.env_depth);
        let (dest, iterator) = match &entry.kind {
            ControlKind::Target {
                break_to,
                continue_to,
                iterator,
                ..
            } => {
                if is_continue {
                    (*continue_to, None)
                } else {
                    (Some(*break_to), iterator.clone())
                }
            }
            ControlKind::Finally(_) => (None, None),
        };
        if let Some(iterator) = iterator {
            self.set_handler(handler);
            self.envs.truncate(env_depth);
            self.emit(InstKind::IteratorClose { iterator, on_throw: false });
        }
        match dest {
            Some(dest) => self.b.branch(dest),
            None => self.fail("continue target is not a loop"),
        }
        self.envs = saved_envs;
        self.b.set_handler(saved_handler);
    }

    /// Leaves the function with `value`, running every pending finalizer and
    /// closing every open iterator on the way out.
    fn compile_return(&mut self, value: Operand) {
        let saved_envs = self.envs.clone();
        let saved_handler = self.b.handler();
        for i in (0..self.control.len()).rev() {
            self.unwind(i);
        }
        if self.resume.is_some() {
            self.complete_resumable(value);
        } else if self.is_derived_ctor() {
            self.derived_ctor_return(value);
        } else {
            self.b.ret(value);
        }
        self.envs = saved_envs;
        self.b.set_handler(saved_handler);
    }

    /// A derived constructor returns `this` unless it returns an explicit value.
    fn derived_ctor_return(&mut self, value: Operand) {
        let this_decl = self.model().function(self.func).this_decl;
        let load_this = |lowering: &mut Self| match this_decl {
            Some(decl) => lowering.load_decl(decl, true),
            None => lowering.emit(InstKind::LoadParam(0)),
        };
        if value == Operand::UNDEFINED {
            let this = load_this(self);
            self.b.ret(this);
            return;
        }
        let is_undefined = self.emit(InstKind::Binary {
            op: crate::ir::BinaryOp::StrictEq,
            lhs: value.clone(),
            rhs: Operand::UNDEFINED,
            form: Default::default(),
        });
        let use_this = self.b.create_block();
        let use_value = self.b.create_block();
        self.b.cond_branch(is_undefined, use_this, use_value);
        self.b.switch_to(use_this);
        let this = load_this(self);
        self.b.ret(this);
        self.b.switch_to(use_value);
        self.b.ret(value);
    }
}
