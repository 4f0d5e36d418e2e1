// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The resolving tree walk.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::build;
use crate::ast::*;
use crate::error::{Diagnostic, Diagnostics};

use super::{
    DeclId, DeclKind, Declaration, FuncIndex, FunctionInfo, FunctionKind, HomeObject, ScopeData,
    ScopeId, ScopeKind, SemanticModel,
};

/// Resolves `program` in place.
///
/// On success every identifier reference carries its declaration and every
/// function its scope and captured-set summary. Any early error makes the
/// whole resolution fail with the sorted diagnostics.
pub fn resolve(program: &mut Program, error_limit: usize) -> Result<SemanticModel, Diagnostics> {
    let mut resolver = Resolver {
        model: SemanticModel::default(),
        diags: Diagnostics::with_limit(error_limit),
        file: program.file.clone(),
        scope: ScopeId(0),
        func: FuncIndex(0),
        jumps: Vec::new(),
        pending_labels: Vec::new(),
        script: program.kind == ProgramKind::Script,
    };
    resolver.visit_program(program);
    resolver.finish();

    if resolver.diags.has_errors() {
        return Err(resolver.diags);
    }
    debug!(
        scopes = resolver.model.scopes.len(),
        decls = resolver.model.decls.len(),
        functions = resolver.model.functions.len(),
        "resolved program"
    );
    Ok(resolver.model)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpKind {
    Loop,
    Switch,
    Labeled,
}

#[derive(Debug)]
struct JumpScope {
    labels: Vec<String>,
    kind: JumpKind,
}

struct Resolver {
    model: SemanticModel,
    diags: Diagnostics,
    file: String,
    scope: ScopeId,
    func: FuncIndex,
    jumps: Vec<JumpScope>,
    pending_labels: Vec<String>,
    script: bool,
}

impl Resolver {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic::error(self.file.clone(), span.start, message));
    }

    fn finish(&mut self) {
        for (id, decl) in self.model.decls.iter_enumerated() {
            if decl.captured && !decl.global {
                let scope = decl.scope;
                let func = self.model.scopes[scope].function;
                self.model.scopes[scope].captured.push(id);
                self.model.functions[func].captured.push(id);
            }
        }
    }

    // ---- scopes and declarations ----

    fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.model.scopes.push(ScopeData {
            kind,
            parent: Some(self.scope),
            function: self.func,
            decls: Vec::new(),
            captured: Vec::new(),
            names: FxHashMap::default(),
        });
        self.scope = id;
        id
    }

    fn new_function(
        &mut self,
        name: &str,
        kind: FunctionKind,
        is_generator: bool,
        is_async: bool,
        strict: bool,
        home: Option<HomeObject>,
    ) -> (FuncIndex, ScopeId) {
        let parent = if self.model.functions.is_empty() { None } else { Some(self.func) };
        let scope_parent = if self.model.scopes.is_empty() { None } else { Some(self.scope) };
        let func = self.model.functions.next_index();
        let scope = self.model.scopes.push(ScopeData {
            kind: ScopeKind::Function,
            parent: scope_parent,
            function: func,
            decls: Vec::new(),
            captured: Vec::new(),
            names: FxHashMap::default(),
        });
        self.model.functions.push(FunctionInfo {
            name: name.to_string(),
            scope,
            parent,
            kind,
            is_generator,
            is_async,
            strict,
            this_decl: None,
            arguments_decl: None,
            new_target_decl: None,
            home,
            captured: Vec::new(),
            free: Vec::new(),
        });
        (func, scope)
    }

    fn declare(&mut self, scope: ScopeId, name: &str, kind: DeclKind, span: Span) -> DeclId {
        if let Some(existing) = self.model.scopes[scope].lookup(name) {
            let prev = self.model.decls[existing].kind;
            if kind.is_lexical() || prev.is_lexical() {
                self.error(span, format!("redeclaration of `{name}`"));
            } else if kind == DeclKind::Function && prev == DeclKind::Var {
                self.model.decls[existing].kind = DeclKind::Function;
            }
            return existing;
        }

        let func = self.model.scopes[scope].function;
        let info = &self.model.functions[func];
        let global = self.script
            && info.kind == FunctionKind::Program
            && scope == info.scope
            && matches!(kind, DeclKind::Var | DeclKind::Function);
        let decl = self.model.decls.push(Declaration {
            name: name.to_string(),
            kind,
            scope,
            span,
            captured: info.is_resumable(),
            needs_tdz: false,
            reassigned: false,
            written_by_closure: false,
            global,
            immutable: kind == DeclKind::Const,
            initialized: !kind.is_lexical(),
        });
        let data = &mut self.model.scopes[scope];
        data.names.insert(name.to_string(), decl);
        data.decls.push(decl);
        decl
    }

    fn synthetic(&mut self, scope: ScopeId, name: &str, initialized: bool) -> DeclId {
        let decl = self.declare(scope, name, DeclKind::Synthetic, Span::default());
        self.model.decls[decl].initialized = initialized;
        decl
    }

    fn mark_initialized(&mut self, names: &[(String, Span)]) {
        for (name, _) in names {
            if let Some(decl) = self.model.lookup(self.scope, name) {
                self.model.decls[decl].initialized = true;
            }
        }
    }

    /// Records a use of `decl` from the current function and returns whether
    /// the use needs a deferred-init guard.
    fn note_use(&mut self, decl: DeclId, write: bool) -> bool {
        let decl_func = self.model.decl_function(decl);
        let cross = decl_func != self.func;
        let scope_kind = self.model.scopes[self.model.decls[decl].scope].kind;
        let d = &mut self.model.decls[decl];
        if write {
            d.reassigned = true;
        }
        if cross {
            d.captured = true;
            if write {
                d.written_by_closure = true;
            }
        }
        let tdz = !d.initialized || (d.kind.is_lexical() && (cross || scope_kind == ScopeKind::Switch));
        if tdz {
            d.needs_tdz = true;
        }
        if cross {
            let free = &mut self.model.functions[self.func].free;
            if !free.contains(&decl) {
                free.push(decl);
            }
        }
        tdz
    }

    fn lookup(&mut self, name: &str) -> Option<DeclId> {
        let mut cur = Some(self.scope);
        while let Some(s) = cur {
            if let Some(decl) = self.model.scopes[s].lookup(name) {
                return Some(decl);
            }
            let data = &self.model.scopes[s];
            if data.kind == ScopeKind::Function && name == "arguments" {
                let func = data.function;
                let kind = self.model.functions[func].kind;
                if !matches!(kind, FunctionKind::Arrow | FunctionKind::Program | FunctionKind::FieldInit) {
                    let decl = self.synthetic(s, "arguments", true);
                    self.model.functions[func].arguments_decl = Some(decl);
                    return Some(decl);
                }
            }
            cur = data.parent;
        }
        None
    }

    fn resolve_reference(&mut self, id: &mut Identifier, write: bool) {
        match self.lookup(&id.name) {
            Some(decl) if !self.model.decls[decl].global => {
                id.tdz_check = self.note_use(decl, write);
                id.binding = Some(decl);
            }
            _ => {
                id.binding = None;
                id.tdz_check = false;
            }
        }
    }

    /// The nearest enclosing non-arrow function, and whether an arrow was crossed.
    fn this_function(&self) -> (FuncIndex, bool) {
        let mut func = self.func;
        let mut crossed = false;
        while self.model.functions[func].kind == FunctionKind::Arrow {
            crossed = true;
            match self.model.functions[func].parent {
                Some(parent) => func = parent,
                None => break,
            }
        }
        (func, crossed)
    }

    fn resolve_this(&mut self, this: &mut ThisExpression) {
        let (func, crossed) = self.this_function();
        let info = &self.model.functions[func];
        let derived = matches!(info.kind, FunctionKind::Constructor { derived: true });
        if !crossed && !derived {
            this.binding = None;
            return;
        }
        let (existing, scope) = (info.this_decl, info.scope);
        let decl = match existing {
            Some(decl) => decl,
            None => {
                let decl = self.synthetic(scope, "this", true);
                self.model.functions[func].this_decl = Some(decl);
                decl
            }
        };
        this.tdz_check = self.note_use(decl, false);
        this.binding = Some(decl);
    }

    fn resolve_new_target(&mut self, meta: &mut MetaProperty) {
        let (func, _) = self.this_function();
        if self.model.functions[func].kind == FunctionKind::Program {
            self.error(meta.span, "`new.target` outside of a function");
            return;
        }
        meta.binding = self.captured_new_target();
    }

    /// The `new.target` binding an arrow reads from its enclosing function,
    /// or `None` outside arrows.
    fn captured_new_target(&mut self) -> Option<DeclId> {
        let (func, crossed) = self.this_function();
        if !crossed {
            return None;
        }
        let info = &self.model.functions[func];
        let (existing, scope) = (info.new_target_decl, info.scope);
        let decl = match existing {
            Some(decl) => decl,
            None => {
                let decl = self.synthetic(scope, "new.target", true);
                self.model.functions[func].new_target_decl = Some(decl);
                decl
            }
        };
        self.note_use(decl, false);
        Some(decl)
    }

    fn home(&self) -> Option<HomeObject> {
        let (func, _) = self.this_function();
        self.model.functions[func].home
    }

    // ---- hoisting ----

    fn hoist_vars(&mut self, body: &[Statement], scope: ScopeId) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for (name, span) in names {
            self.declare(scope, &name, DeclKind::Var, span);
        }
    }

    /// Declares the lexical bindings and function declarations directly in `body`.
    fn hoist_lexical(&mut self, body: &[Statement], scope: ScopeId) {
        for stmt in body {
            match stmt {
                Statement::VariableDeclaration(decl) => self.declare_lexical(decl, scope),
                Statement::ClassDeclaration(class) => {
                    if let Some(id) = &class.id {
                        self.declare(scope, &id.name, DeclKind::Class, id.span);
                    }
                }
                Statement::FunctionDeclaration(f) => {
                    if let Some(id) = &f.id {
                        self.declare(scope, &id.name, DeclKind::Function, id.span);
                    }
                }
                _ => {}
            }
        }
    }

    fn declare_lexical(&mut self, decl: &VariableDeclaration, scope: ScopeId) {
        let kind = match decl.kind {
            VariableKind::Var => return,
            VariableKind::Let => DeclKind::Let,
            VariableKind::Const => DeclKind::Const,
        };
        for declarator in &decl.declarations {
            for (name, span) in pattern_names(&declarator.id) {
                self.declare(scope, &name, kind, span);
            }
        }
    }

    fn check_var_conflict(&mut self, name: &str, span: Span) {
        let mut cur = Some(self.scope);
        while let Some(s) = cur {
            let data = &self.model.scopes[s];
            if let Some(decl) = data.lookup(name) {
                if self.model.decls[decl].kind.is_lexical() {
                    self.error(span, format!("redeclaration of `{name}`"));
                    return;
                }
            }
            if data.kind == ScopeKind::Function {
                return;
            }
            cur = data.parent;
        }
    }

    // ---- functions ----

    fn visit_program(&mut self, program: &mut Program) {
        let (func, scope) = self.new_function("", FunctionKind::Program, false, false, program.strict, None);
        self.func = func;
        self.scope = scope;
        program.info = Some(func);
        program.scope = Some(scope);

        self.hoist_vars(&program.body, scope);
        self.hoist_lexical(&program.body, scope);
        self.visit_statements(&mut program.body);
    }

    fn visit_function(&mut self, f: &mut Function, kind: FunctionKind, home: Option<HomeObject>, is_expression: bool) {
        let saved_scope = self.scope;
        let saved_func = self.func;
        let saved_jumps = std::mem::take(&mut self.jumps);
        let saved_labels = std::mem::take(&mut self.pending_labels);

        if f.is_async && f.is_generator {
            self.error(f.span, "async generator functions are not supported");
        }

        if is_expression && !f.is_arrow {
            if let Some(id) = &f.id {
                let name = id.name.clone();
                let span = id.span;
                let scope = self.push_scope(ScopeKind::FunctionName);
                let decl = self.declare(scope, &name, DeclKind::Synthetic, span);
                self.model.decls[decl].immutable = true;
                f.self_binding = Some(decl);
            }
        }

        let strict = f.strict || self.model.functions[saved_func].strict;
        let kind = if f.is_arrow { FunctionKind::Arrow } else { kind };
        let (func, scope) = self.new_function(f.name(), kind, f.is_generator, f.is_async, strict, home);
        f.info = Some(func);
        f.scope = Some(scope);
        self.func = func;
        self.scope = scope;

        if kind == (FunctionKind::Constructor { derived: true }) {
            let decl = self.synthetic(scope, "this", false);
            self.model.functions[func].this_decl = Some(decl);
        }

        // Parameters
        let simple = f.has_simple_params();
        let mut seen: Vec<String> = Vec::new();
        for param in &f.params {
            for (name, span) in pattern_names(param) {
                if seen.contains(&name) {
                    if strict || !simple || f.is_arrow {
                        self.error(span, format!("duplicate parameter `{name}`"));
                    }
                } else {
                    seen.push(name.clone());
                }
                self.declare(scope, &name, DeclKind::Parameter, span);
            }
        }
        for param in &mut f.params {
            self.visit_binding(param);
        }

        match &mut f.body {
            FunctionBody::Block(block) => {
                self.hoist_vars(&block.body, scope);
                self.hoist_lexical(&block.body, scope);
                block.scope = Some(scope);
                self.visit_statements(&mut block.body);
            }
            FunctionBody::Expression(expr) => self.visit_expression(expr),
        }

        self.scope = saved_scope;
        self.func = saved_func;
        self.jumps = saved_jumps;
        self.pending_labels = saved_labels;
    }

    fn visit_class(&mut self, class: &mut Class) {
        let saved_scope = self.scope;
        let scope = self.push_scope(ScopeKind::Class);
        class.scope = Some(scope);

        let inner = class.id.as_ref().map(|id| (id.name.clone(), id.span));
        if let Some((name, span)) = &inner {
            self.declare(scope, name, DeclKind::Const, *span);
        }

        let derived = class.super_class.is_some();
        if let Some(super_class) = &mut class.super_class {
            self.visit_expression(super_class);
            class.super_binding = Some(self.synthetic(scope, "%super", true));
            class.super_proto_binding = Some(self.synthetic(scope, "%super.prototype", true));
        }

        if class.constructor().is_none() {
            class.body.insert(0, default_constructor(derived));
        }

        let has_instance_fields = class
            .body
            .iter()
            .any(|m| matches!(m, ClassMember::PropertyDefinition(p) if !p.is_static));
        if has_instance_fields {
            // Read by the constructor.
            let decl = self.synthetic(scope, "%fields", true);
            self.model.decls[decl].captured = true;
            class.instance_init_binding = Some(decl);
        }

        let super_ctor = class.super_binding;
        let super_proto = class.super_proto_binding;
        let home = |is_static| HomeObject {
            super_ctor,
            super_proto,
            is_static,
        };

        // Computed method keys evaluate in the class scope at definition time;
        // computed field keys evaluate inside the field initializer.
        for member in &mut class.body {
            if let ClassMember::MethodDefinition(m) = member {
                if m.computed {
                    self.visit_expression(&mut m.key);
                }
            }
        }

        for member in &mut class.body {
            if let ClassMember::MethodDefinition(m) = member {
                let kind = if m.kind == MethodKind::Constructor {
                    FunctionKind::Constructor { derived }
                } else {
                    FunctionKind::Method
                };
                self.visit_function(&mut m.value, kind, Some(home(m.is_static)), false);
            }
        }

        for is_static in [false, true] {
            let has_fields = class
                .body
                .iter()
                .any(|m| matches!(m, ClassMember::PropertyDefinition(p) if p.is_static == is_static));
            if !has_fields {
                continue;
            }
            let saved_func = self.func;
            let saved_jumps = std::mem::take(&mut self.jumps);
            let strict = true;
            let name = if is_static { "<static_init>" } else { "<instance_init>" };
            let (func, fscope) = self.new_function(name, FunctionKind::FieldInit, false, false, strict, Some(home(is_static)));
            self.func = func;
            self.scope = fscope;
            for member in &mut class.body {
                if let ClassMember::PropertyDefinition(p) = member {
                    if p.is_static == is_static {
                        if p.computed {
                            self.visit_expression(&mut p.key);
                        }
                        if let Some(value) = &mut p.value {
                            self.visit_expression(value);
                        }
                    }
                }
            }
            self.func = saved_func;
            self.jumps = saved_jumps;
            self.scope = scope;
            if is_static {
                class.static_init = Some(func);
            } else {
                class.instance_init = Some(func);
            }
        }

        if let Some((name, _)) = inner {
            if let Some(decl) = self.model.scopes[scope].lookup(&name) {
                self.model.decls[decl].initialized = true;
            }
        }
        self.scope = saved_scope;
    }

    // ---- statements ----

    fn visit_statements(&mut self, body: &mut [Statement]) {
        for stmt in body {
            self.visit_statement(stmt);
        }
    }

    fn visit_block(&mut self, block: &mut BlockStatement, kind: ScopeKind) {
        let saved = self.scope;
        let scope = self.push_scope(kind);
        block.scope = Some(scope);
        self.hoist_lexical(&block.body, scope);
        self.visit_statements(&mut block.body);
        self.scope = saved;
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        let labels = std::mem::take(&mut self.pending_labels);
        match stmt {
            Statement::VariableDeclaration(decl) => self.visit_declaration(decl),
            Statement::FunctionDeclaration(f) => {
                if let Some(id) = &mut f.id {
                    self.resolve_reference(id, false);
                }
                self.visit_function(f, FunctionKind::Normal, None, false);
            }
            Statement::ClassDeclaration(class) => {
                self.visit_class(class);
                if let Some(id) = &mut class.id {
                    if let Some(decl) = self.model.scopes[self.scope].lookup(&id.name) {
                        self.model.decls[decl].initialized = true;
                        id.binding = Some(decl);
                    }
                }
            }
            Statement::ExpressionStatement(s) => self.visit_expression(&mut s.expression),
            Statement::BlockStatement(block) => {
                self.with_jump_scope(labels, JumpKind::Labeled, |r| r.visit_block(block, ScopeKind::Block));
            }
            Statement::IfStatement(s) => {
                self.visit_expression(&mut s.test);
                self.with_jump_scope(labels, JumpKind::Labeled, |r| {
                    r.visit_statement(&mut s.consequent);
                    if let Some(alt) = &mut s.alternate {
                        r.visit_statement(alt);
                    }
                });
            }
            Statement::SwitchStatement(s) => {
                self.visit_expression(&mut s.discriminant);
                let saved = self.scope;
                let scope = self.push_scope(ScopeKind::Switch);
                s.scope = Some(scope);
                for case in &s.cases {
                    self.hoist_lexical(&case.consequent, scope);
                }
                self.with_jump_scope(labels, JumpKind::Switch, |r| {
                    for case in &mut s.cases {
                        if let Some(test) = &mut case.test {
                            r.visit_expression(test);
                        }
                        r.visit_statements(&mut case.consequent);
                    }
                });
                self.scope = saved;
            }
            Statement::WhileStatement(s) => {
                self.visit_expression(&mut s.test);
                self.with_jump_scope(labels, JumpKind::Loop, |r| r.visit_statement(&mut s.body));
            }
            Statement::DoWhileStatement(s) => {
                self.with_jump_scope(labels, JumpKind::Loop, |r| r.visit_statement(&mut s.body));
                self.visit_expression(&mut s.test);
            }
            Statement::ForStatement(s) => {
                let saved = self.scope;
                let scope = self.push_scope(ScopeKind::Loop);
                s.scope = Some(scope);
                match &mut s.init {
                    Some(ForInit::VariableDeclaration(decl)) => {
                        self.declare_lexical(decl, scope);
                        self.visit_declaration(decl);
                    }
                    Some(ForInit::Expression(e)) => self.visit_expression(e),
                    None => {}
                }
                if let Some(test) = &mut s.test {
                    self.visit_expression(test);
                }
                if let Some(update) = &mut s.update {
                    self.visit_expression(update);
                }
                self.with_jump_scope(labels, JumpKind::Loop, |r| r.visit_statement(&mut s.body));
                self.scope = saved;
            }
            Statement::ForInStatement(s) => {
                let scope = self.visit_for_each_head(&mut s.left, &mut s.right);
                s.scope = scope;
                self.with_jump_scope(labels, JumpKind::Loop, |r| r.visit_statement(&mut s.body));
                self.leave_for_each(scope);
            }
            Statement::ForOfStatement(s) => {
                let scope = self.visit_for_each_head(&mut s.left, &mut s.right);
                s.scope = scope;
                self.with_jump_scope(labels, JumpKind::Loop, |r| r.visit_statement(&mut s.body));
                self.leave_for_each(scope);
            }
            Statement::ReturnStatement(s) => {
                if self.model.functions[self.func].kind == FunctionKind::Program {
                    self.error(s.span, "`return` outside of a function");
                }
                if let Some(arg) = &mut s.argument {
                    self.visit_expression(arg);
                }
            }
            Statement::BreakStatement(s) => self.check_jump(s, false),
            Statement::ContinueStatement(s) => self.check_jump(s, true),
            Statement::ThrowStatement(s) => self.visit_expression(&mut s.argument),
            Statement::TryStatement(s) => {
                self.visit_block(&mut s.block, ScopeKind::Block);
                if let Some(handler) = &mut s.handler {
                    let saved = self.scope;
                    let scope = self.push_scope(ScopeKind::Catch);
                    handler.scope = Some(scope);
                    if let Some(param) = &mut handler.param {
                        let names = pattern_names(param);
                        for (name, span) in &names {
                            self.declare(scope, name, DeclKind::Catch, *span);
                        }
                        self.visit_binding(param);
                        for stmt in &handler.body.body {
                            if let Statement::VariableDeclaration(d) = stmt {
                                if d.kind == VariableKind::Var {
                                    continue;
                                }
                                for declarator in &d.declarations {
                                    for (name, span) in pattern_names(&declarator.id) {
                                        if names.iter().any(|(n, _)| *n == name) {
                                            self.error(span, format!("redeclaration of `{name}`"));
                                        }
                                    }
                                }
                            }
                        }
                    }
                    self.visit_block(&mut handler.body, ScopeKind::Block);
                    self.scope = saved;
                }
                if let Some(finalizer) = &mut s.finalizer {
                    self.visit_block(finalizer, ScopeKind::Block);
                }
            }
            Statement::LabeledStatement(s) => {
                let name = s.label.name.clone();
                if labels.contains(&name) || self.jumps.iter().any(|j| j.labels.contains(&name)) {
                    self.error(s.label.span, format!("label `{name}` is already declared"));
                }
                let mut labels = labels;
                labels.push(name);
                self.pending_labels = labels;
                self.visit_statement(&mut s.body);
            }
            Statement::DebuggerStatement(_) | Statement::EmptyStatement(_) => {}
        }
    }

    fn with_jump_scope(&mut self, labels: Vec<String>, kind: JumpKind, f: impl FnOnce(&mut Self)) {
        if kind == JumpKind::Labeled && labels.is_empty() {
            f(self);
            return;
        }
        self.jumps.push(JumpScope { labels, kind });
        f(self);
        self.jumps.pop();
    }

    fn check_jump(&mut self, stmt: &JumpStatement, is_continue: bool) {
        match &stmt.label {
            None => {
                let ok = self.jumps.iter().any(|j| match j.kind {
                    JumpKind::Loop => true,
                    JumpKind::Switch => !is_continue,
                    JumpKind::Labeled => false,
                });
                if !ok {
                    let what = if is_continue { "continue" } else { "break" };
                    let target = if is_continue { "a loop" } else { "a loop or switch" };
                    self.error(stmt.span, format!("`{what}` outside of {target}"));
                }
            }
            Some(label) => match self.jumps.iter().rev().find(|j| j.labels.contains(&label.name)) {
                None => self.error(label.span, format!("undefined label `{}`", label.name)),
                Some(j) if is_continue && j.kind != JumpKind::Loop => {
                    self.error(label.span, format!("`continue` target `{}` is not a loop", label.name));
                }
                Some(_) => {}
            },
        }
    }

    fn visit_for_each_head(&mut self, left: &mut ForHead, right: &mut Expression) -> Option<ScopeId> {
        match left {
            ForHead::VariableDeclaration(decl) if decl.kind != VariableKind::Var => {
                // The iterable is evaluated with the head bindings in TDZ.
                let scope = self.push_scope(ScopeKind::Loop);
                self.declare_lexical(decl, scope);
                self.visit_expression(right);
                let mut names = Vec::new();
                for declarator in &mut decl.declarations {
                    names.extend(pattern_names(&declarator.id));
                    self.visit_binding(&mut declarator.id);
                }
                self.mark_initialized(&names);
                Some(scope)
            }
            ForHead::VariableDeclaration(decl) => {
                self.visit_expression(right);
                self.visit_declaration(decl);
                None
            }
            ForHead::Pattern(p) => {
                self.visit_expression(right);
                self.visit_assignment_target(p);
                None
            }
        }
    }

    fn leave_for_each(&mut self, scope: Option<ScopeId>) {
        if let Some(scope) = scope {
            if let Some(parent) = self.model.scopes[scope].parent {
                self.scope = parent;
            }
        }
    }

    fn visit_declaration(&mut self, decl: &mut VariableDeclaration) {
        for declarator in &mut decl.declarations {
            let names = pattern_names(&declarator.id);
            if decl.kind == VariableKind::Var {
                for (name, span) in &names {
                    self.check_var_conflict(name, *span);
                }
            }
            if let Some(init) = &mut declarator.init {
                self.visit_expression(init);
            }
            self.visit_binding(&mut declarator.id);
            if decl.kind != VariableKind::Var {
                self.mark_initialized(&names);
            }
        }
    }

    // ---- patterns ----

    /// Binds the identifiers of a declaration pattern and visits its defaults.
    fn visit_binding(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Identifier(id) => match self.lookup(&id.name) {
                Some(decl) if !self.model.decls[decl].global => id.binding = Some(decl),
                _ => id.binding = None,
            },
            Pattern::ObjectPattern(p) => {
                for prop in &mut p.properties {
                    match prop {
                        ObjectPatternProperty::Property(prop) => {
                            if prop.computed {
                                self.visit_expression(&mut prop.key);
                            }
                            self.visit_binding(&mut prop.value);
                        }
                        ObjectPatternProperty::RestElement(rest) => self.visit_binding(&mut rest.argument),
                    }
                }
            }
            Pattern::ArrayPattern(p) => {
                for element in p.elements.iter_mut().flatten() {
                    self.visit_binding(element);
                }
            }
            Pattern::AssignmentPattern(p) => {
                self.visit_binding(&mut p.left);
                self.visit_expression(&mut p.right);
            }
            Pattern::RestElement(rest) => self.visit_binding(&mut rest.argument),
            Pattern::MemberExpression(m) => self.visit_member(m),
        }
    }

    fn visit_assignment_target(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Identifier(id) => self.resolve_reference(id, true),
            Pattern::ObjectPattern(p) => {
                for prop in &mut p.properties {
                    match prop {
                        ObjectPatternProperty::Property(prop) => {
                            if prop.computed {
                                self.visit_expression(&mut prop.key);
                            }
                            self.visit_assignment_target(&mut prop.value);
                        }
                        ObjectPatternProperty::RestElement(rest) => self.visit_assignment_target(&mut rest.argument),
                    }
                }
            }
            Pattern::ArrayPattern(p) => {
                for element in p.elements.iter_mut().flatten() {
                    self.visit_assignment_target(element);
                }
            }
            Pattern::AssignmentPattern(p) => {
                self.visit_assignment_target(&mut p.left);
                self.visit_expression(&mut p.right);
            }
            Pattern::RestElement(rest) => self.visit_assignment_target(&mut rest.argument),
            Pattern::MemberExpression(m) => self.visit_member(m),
        }
    }

    // ---- expressions ----

    fn visit_member(&mut self, m: &mut MemberExpression) {
        match &mut *m.object {
            Expression::Super(sup) => match self.home() {
                Some(home) => {
                    let decl = if home.is_static { home.super_ctor } else { home.super_proto };
                    match decl {
                        Some(decl) => {
                            self.note_use(decl, false);
                            sup.binding = Some(decl);
                        }
                        None => self.error(sup.span, "`super` property access in a class without `extends`"),
                    }
                }
                None => self.error(sup.span, "`super` property access outside of a method"),
            },
            object => self.visit_expression(object),
        }
        if m.computed {
            self.visit_expression(&mut m.property);
        }
    }

    fn visit_expression(&mut self, expr: &mut Expression) {
        match expr {
            Expression::Literal(_) => {}
            Expression::Identifier(id) => self.resolve_reference(id, false),
            Expression::ThisExpression(this) => self.resolve_this(this),
            Expression::Super(sup) => self.error(sup.span, "unexpected `super`"),
            Expression::ArrayExpression(a) => {
                for element in a.elements.iter_mut().flatten() {
                    self.visit_expression(element);
                }
            }
            Expression::ObjectExpression(o) => {
                for member in &mut o.properties {
                    match member {
                        ObjectMember::Property(p) => {
                            if p.computed {
                                self.visit_expression(&mut p.key);
                            }
                            match &mut p.value {
                                Expression::FunctionExpression(f) if p.kind != PropertyKind::Init => {
                                    self.visit_function(f, FunctionKind::Method, None, false);
                                }
                                value => self.visit_expression(value),
                            }
                        }
                        ObjectMember::SpreadElement(s) => self.visit_expression(&mut s.argument),
                    }
                }
            }
            Expression::FunctionExpression(f) => self.visit_function(f, FunctionKind::Normal, None, true),
            Expression::ArrowFunctionExpression(f) => {
                let home = self.home();
                self.visit_function(f, FunctionKind::Arrow, home, true);
            }
            Expression::ClassExpression(class) => self.visit_class(class),
            Expression::UnaryExpression(u) => {
                if u.operator == UnaryOperator::Delete
                    && matches!(*u.argument, Expression::Identifier(_))
                    && self.model.functions[self.func].strict
                {
                    self.error(u.span, "`delete` of an unqualified identifier in strict mode");
                }
                self.visit_expression(&mut u.argument);
            }
            Expression::UpdateExpression(u) => match &mut *u.argument {
                Expression::Identifier(id) => self.resolve_reference(id, true),
                other => self.visit_expression(other),
            },
            Expression::BinaryExpression(b) => {
                self.visit_expression(&mut b.left);
                self.visit_expression(&mut b.right);
            }
            Expression::LogicalExpression(l) => {
                self.visit_expression(&mut l.left);
                self.visit_expression(&mut l.right);
            }
            Expression::AssignmentExpression(a) => {
                if let (AssignmentOperator::Compound(_), Pattern::Identifier(id)) = (a.operator, &mut *a.left) {
                    // Compound assignment reads before it writes.
                    self.resolve_reference(id, true);
                } else {
                    self.visit_assignment_target(&mut a.left);
                }
                self.visit_expression(&mut a.right);
            }
            Expression::ConditionalExpression(c) => {
                self.visit_expression(&mut c.test);
                self.visit_expression(&mut c.consequent);
                self.visit_expression(&mut c.alternate);
            }
            Expression::CallExpression(call) => {
                match &mut *call.callee {
                    Expression::Super(sup) => {
                        let (func, _) = self.this_function();
                        let info = &self.model.functions[func];
                        let target = (info.kind, info.home.and_then(|h| h.super_ctor), info.this_decl);
                        match target {
                            (FunctionKind::Constructor { derived: true }, Some(ctor), Some(this)) => {
                                self.note_use(ctor, false);
                                self.note_use(this, true);
                                self.captured_new_target();
                                sup.binding = Some(ctor);
                            }
                            _ => self.error(sup.span, "`super()` outside of a derived class constructor"),
                        }
                    }
                    callee => self.visit_expression(callee),
                }
                for arg in &mut call.arguments {
                    self.visit_expression(arg);
                }
            }
            Expression::NewExpression(n) => {
                self.visit_expression(&mut n.callee);
                for arg in &mut n.arguments {
                    self.visit_expression(arg);
                }
            }
            Expression::MemberExpression(m) => self.visit_member(m),
            Expression::ChainExpression(c) => self.visit_expression(&mut c.expression),
            Expression::SequenceExpression(s) => {
                for e in &mut s.expressions {
                    self.visit_expression(e);
                }
            }
            Expression::TemplateLiteral(t) => {
                for e in &mut t.expressions {
                    self.visit_expression(e);
                }
            }
            Expression::YieldExpression(y) => {
                if !self.model.functions[self.func].is_generator {
                    self.error(y.span, "`yield` outside of a generator");
                }
                if let Some(arg) = &mut y.argument {
                    self.visit_expression(arg);
                }
            }
            Expression::AwaitExpression(a) => {
                if !self.model.functions[self.func].is_async {
                    self.error(a.span, "`await` outside of an async function");
                }
                self.visit_expression(&mut a.argument);
            }
            Expression::MetaProperty(meta) => self.resolve_new_target(meta),
            Expression::SpreadElement(s) => self.visit_expression(&mut s.argument),
        }
    }
}

fn default_constructor(derived: bool) -> ClassMember {
    if derived {
        let mut ctor = build::constructor(&[], vec![build::expr(build::call(
            build::super_(),
            vec![build::spread(build::id("args"))],
        ))]);
        if let ClassMember::MethodDefinition(m) = &mut ctor {
            m.value.params = vec![Pattern::RestElement(RestElement {
                argument: Box::new(build::pat("args")),
                span: Span::default(),
            })];
        }
        ctor
    } else {
        build::constructor(&[], Vec::new())
    }
}

/// Names bound by a pattern, in source order.
pub(crate) fn pattern_names(pattern: &Pattern) -> Vec<(String, Span)> {
    let mut out = Vec::new();
    collect_pattern_names(pattern, &mut out);
    out
}

fn collect_pattern_names(pattern: &Pattern, out: &mut Vec<(String, Span)>) {
    match pattern {
        Pattern::Identifier(id) => out.push((id.name.clone(), id.span)),
        Pattern::ObjectPattern(p) => {
            for prop in &p.properties {
                match prop {
                    ObjectPatternProperty::Property(prop) => collect_pattern_names(&prop.value, out),
                    ObjectPatternProperty::RestElement(rest) => collect_pattern_names(&rest.argument, out),
                }
            }
        }
        Pattern::ArrayPattern(p) => {
            for element in p.elements.iter().flatten() {
                collect_pattern_names(element, out);
            }
        }
        Pattern::AssignmentPattern(p) => collect_pattern_names(&p.left, out),
        Pattern::RestElement(rest) => collect_pattern_names(&rest.argument, out),
        Pattern::MemberExpression(_) => {}
    }
}

fn collect_var_names(body: &[Statement], out: &mut Vec<(String, Span)>) {
    for stmt in body {
        collect_var_names_in(stmt, out);
    }
}

fn collect_var_names_in(stmt: &Statement, out: &mut Vec<(String, Span)>) {
    match stmt {
        Statement::VariableDeclaration(decl) if decl.kind == VariableKind::Var => {
            for declarator in &decl.declarations {
                collect_pattern_names(&declarator.id, out);
            }
        }
        Statement::BlockStatement(b) => collect_var_names(&b.body, out),
        Statement::IfStatement(s) => {
            collect_var_names_in(&s.consequent, out);
            if let Some(alt) = &s.alternate {
                collect_var_names_in(alt, out);
            }
        }
        Statement::SwitchStatement(s) => {
            for case in &s.cases {
                collect_var_names(&case.consequent, out);
            }
        }
        Statement::WhileStatement(s) => collect_var_names_in(&s.body, out),
        Statement::DoWhileStatement(s) => collect_var_names_in(&s.body, out),
        Statement::ForStatement(s) => {
            if let Some(ForInit::VariableDeclaration(decl)) = &s.init {
                if decl.kind == VariableKind::Var {
                    for declarator in &decl.declarations {
                        collect_pattern_names(&declarator.id, out);
                    }
                }
            }
            collect_var_names_in(&s.body, out);
        }
        Statement::ForInStatement(ForInStatement { left, body, .. })
        | Statement::ForOfStatement(ForOfStatement { left, body, .. }) => {
            if let ForHead::VariableDeclaration(decl) = left {
                if decl.kind == VariableKind::Var {
                    for declarator in &decl.declarations {
                        collect_pattern_names(&declarator.id, out);
                    }
                }
            }
            collect_var_names_in(body, out);
        }
        Statement::TryStatement(s) => {
            collect_var_names(&s.block.body, out);
            if let Some(handler) = &s.handler {
                collect_var_names(&handler.body.body, out);
            }
            if let Some(finalizer) = &s.finalizer {
                collect_var_names(&finalizer.body, out);
            }
        }
        Statement::LabeledStatement(s) => collect_var_names_in(&s.body, out),
        _ => {}
    }
}
