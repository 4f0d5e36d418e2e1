// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement lowering.

use crate::ast::*;
use crate::ir::{BinaryOp, Builtin, InstKind, Literal, Operand, Terminator};

use super::{ControlKind, FnLowering, Storage, TargetKind};

fn statement_span(stmt: &Statement) -> Span {
    match stmt {
        Statement::VariableDeclaration(s) => s.span,
        Statement::FunctionDeclaration(s) => s.span,
        Statement::ClassDeclaration(s) => s.span,
        Statement::ExpressionStatement(s) => s.span,
        Statement::BlockStatement(s) => s.span,
        Statement::IfStatement(s) => s.span,
        Statement::SwitchStatement(s) => s.span,
        Statement::WhileStatement(s) => s.span,
        Statement::DoWhileStatement(s) => s.span,
        Statement::ForStatement(s) => s.span,
        Statement::ForInStatement(s) => s.span,
        Statement::ForOfStatement(s) => s.span,
        Statement::ReturnStatement(s) => s.span,
        Statement::BreakStatement(s) | Statement::ContinueStatement(s) => s.span,
        Statement::ThrowStatement(s) => s.span,
        Statement::TryStatement(s) => s.span,
        Statement::LabeledStatement(s) => s.span,
        Statement::DebuggerStatement(s) | Statement::EmptyStatement(s) => s.span,
    }
}

impl<'a, 'm> FnLowering<'a, 'm> {
    pub(super) fn compile_statements(&mut self, body: &'a [Statement]) {
        for stmt in body {
            self.compile_statement(stmt);
        }
    }

    /// Lowers a block with its own scope.
    pub(super) fn compile_block(&mut self, block: &'a BlockStatement) {
        let mark = self.enter_scope(block.scope);
        self.hoist_functions(&block.body);
        self.compile_statements(&block.body);
        self.leave_scope(mark);
    }

    pub(super) fn compile_statement(&mut self, stmt: &'a Statement) {
        let labels = std::mem::take(&mut self.pending_labels);
        let saved = self.set_span(statement_span(stmt));
        match stmt {
            Statement::VariableDeclaration(decl) => self.compile_variable_declaration(decl),
            // Hoisted to the top of the enclosing scope.
            Statement::FunctionDeclaration(_) => {}
            Statement::ClassDeclaration(class) => {
                let ctor = self.compile_class(class);
                if let Some(decl) = class.id.as_ref().and_then(|id| id.binding) {
                    self.init_decl(decl, ctor);
                }
            }
            Statement::ExpressionStatement(s) => {
                self.compile_expression(&s.expression);
            }
            Statement::BlockStatement(block) => self.with_label_target(labels, |l| l.compile_block(block)),
            Statement::IfStatement(s) => self.with_label_target(labels, |l| l.compile_if(s)),
            Statement::SwitchStatement(s) => self.compile_switch(s, labels),
            Statement::WhileStatement(s) => self.compile_while(s, labels),
            Statement::DoWhileStatement(s) => self.compile_do_while(s, labels),
            Statement::ForStatement(s) => self.compile_for(s, labels),
            Statement::ForInStatement(s) => self.compile_for_in(s, labels),
            Statement::ForOfStatement(s) => self.compile_for_of(s, labels),
            Statement::ReturnStatement(s) => {
                let value = match &s.argument {
                    Some(arg) => self.compile_expression(arg),
                    None => Operand::UNDEFINED,
                };
                self.compile_return(value);
            }
            Statement::BreakStatement(s) => self.compile_jump(s.label.as_ref().map(|l| l.name.as_str()), false),
            Statement::ContinueStatement(s) => self.compile_jump(s.label.as_ref().map(|l| l.name.as_str()), true),
            Statement::ThrowStatement(s) => {
                let value = self.compile_expression(&s.argument);
                self.b.throw(value);
            }
            Statement::TryStatement(s) => self.with_label_target(labels, |l| l.compile_try(s)),
            Statement::LabeledStatement(s) => {
                let mut labels = labels;
                labels.push(s.label.name.clone());
                self.pending_labels = labels;
                self.compile_statement(&s.body);
            }
            Statement::DebuggerStatement(_) => {
                self.emit(InstKind::Debugger);
            }
            Statement::EmptyStatement(_) => {}
        }
        self.set_span(saved);
    }

    /// Makes a labeled non-loop statement a `break` target.
    fn with_label_target(&mut self, labels: Vec<String>, f: impl FnOnce(&mut Self)) {
        if labels.is_empty() {
            f(self);
            return;
        }
        let end = self.b.create_block();
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Label,
            break_to: end,
            continue_to: None,
            iterator: None,
        });
        f(self);
        self.control.pop();
        self.goto(end);
    }

    fn compile_variable_declaration(&mut self, decl: &'a VariableDeclaration) {
        for declarator in &decl.declarations {
            let saved = self.set_span(declarator.span);
            match &declarator.init {
                Some(init) => {
                    let value = self.compile_expression(init);
                    self.bind_pattern(&declarator.id, value, true);
                }
                None if decl.kind != VariableKind::Var => {
                    self.bind_pattern(&declarator.id, Operand::UNDEFINED, true);
                }
                None => {}
            }
            self.set_span(saved);
        }
    }

    fn compile_if(&mut self, s: &'a IfStatement) {
        let cond = self.compile_expression(&s.test);
        let then_block = self.b.create_block();
        let join = self.b.create_block();
        let else_block = if s.alternate.is_some() { self.b.create_block() } else { join };
        self.b.cond_branch(cond, then_block, else_block);

        self.b.switch_to(then_block);
        self.compile_statement(&s.consequent);
        self.b.branch(join);

        if let Some(alt) = &s.alternate {
            self.b.switch_to(else_block);
            self.compile_statement(alt);
            self.b.branch(join);
        }
        self.b.switch_to(join);
    }

    // ========================================================================
    // Loops
    // ========================================================================

    fn compile_while(&mut self, s: &'a WhileStatement, labels: Vec<String>) {
        let header = self.b.create_block();
        let body = self.b.create_block();
        let exit = self.b.create_block();
        self.goto(header);
        let cond = self.compile_expression(&s.test);
        self.b.cond_branch(cond, body, exit);

        self.b.switch_to(body);
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Loop,
            break_to: exit,
            continue_to: Some(header),
            iterator: None,
        });
        self.compile_statement(&s.body);
        self.control.pop();
        self.b.branch(header);
        self.b.switch_to(exit);
    }

    fn compile_do_while(&mut self, s: &'a DoWhileStatement, labels: Vec<String>) {
        let body = self.b.create_block();
        let cont = self.b.create_block();
        let exit = self.b.create_block();
        self.goto(body);
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Loop,
            break_to: exit,
            continue_to: Some(cont),
            iterator: None,
        });
        self.compile_statement(&s.body);
        self.control.pop();
        self.goto(cont);
        let cond = self.compile_expression(&s.test);
        self.b.cond_branch(cond, body, exit);
        self.b.switch_to(exit);
    }

    fn compile_for(&mut self, s: &'a ForStatement, labels: Vec<String>) {
        let mark = self.enter_scope(s.scope);
        let lexical = match &s.init {
            Some(ForInit::VariableDeclaration(decl)) => {
                self.compile_variable_declaration(decl);
                decl.kind != VariableKind::Var
            }
            Some(ForInit::Expression(e)) => {
                self.compile_expression(e);
                false
            }
            None => false,
        };

        // Captured `let` bindings get a fresh environment per iteration.
        let per_iteration = s
            .scope
            .filter(|scope| lexical && self.m.module.scopes.contains_key(scope))
            .map(|scope| {
                let holder = self.new_temp("loop.env");
                if let Some(env) = self.copy_env(scope) {
                    self.store_storage(&holder, env);
                }
                (scope, holder)
            });

        let header = self.b.create_block();
        let body = self.b.create_block();
        let cont = self.b.create_block();
        let exit = self.b.create_block();
        self.goto(header);
        if let Some((scope, holder)) = &per_iteration {
            self.reload_env(*scope, holder);
        }
        match &s.test {
            Some(test) => {
                let cond = self.compile_expression(test);
                self.b.cond_branch(cond, body, exit);
            }
            None => self.b.branch(body),
        }

        self.b.switch_to(body);
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Loop,
            break_to: exit,
            continue_to: Some(cont),
            iterator: None,
        });
        self.compile_statement(&s.body);
        self.control.pop();
        self.goto(cont);
        if let Some((scope, holder)) = &per_iteration {
            if let Some(env) = self.copy_env(*scope) {
                self.store_storage(holder, env);
            }
        }
        if let Some(update) = &s.update {
            self.compile_expression(update);
        }
        self.b.branch(header);
        self.b.switch_to(exit);
        self.leave_scope(mark);
    }

    /// Makes the environment held in `holder` the current one for `scope`.
    fn reload_env(&mut self, scope: crate::sema::ScopeId, holder: &Storage) {
        let env = self.load_storage(holder);
        if let Some(entry) = self.envs.iter_mut().rev().find(|(s, _)| *s == scope) {
            entry.1 = env;
        }
    }

    /// Binds the loop variable of a `for-in` or `for-of` head.
    fn bind_for_head(&mut self, left: &'a ForHead, value: Operand) {
        match left {
            ForHead::VariableDeclaration(decl) => match decl.declarations.first() {
                Some(declarator) => self.bind_pattern(&declarator.id, value, true),
                None => self.fail("loop head without a binding"),
            },
            ForHead::Pattern(pattern) => self.bind_pattern(pattern, value, false),
        }
    }

    /// Evaluates the iterated expression with the head bindings in their
    /// dead zone.
    fn compile_loop_subject(&mut self, scope: Option<crate::sema::ScopeId>, right: &'a Expression) -> Operand {
        let mark = self.enter_scope(scope);
        let value = self.compile_expression(right);
        self.leave_scope(mark);
        value
    }

    fn compile_for_of(&mut self, s: &'a ForOfStatement, labels: Vec<String>) {
        let iterable = self.compile_loop_subject(s.scope, &s.right);
        let iterator = self.emit(InstKind::GetIterator { iterable });
        let next = self.emit(InstKind::LoadNamed {
            object: iterator.clone(),
            name: "next".to_string(),
        });

        let outer = self.b.handler();
        let header = self.b.create_block();
        let step = self.b.create_block();
        let exit = self.b.create_block();
        let close = self.b.create_block_with_handler(outer);

        self.goto(header);
        let result = self.emit(InstKind::Call {
            callee: next,
            this: iterator.clone(),
            args: Vec::new(),
        });
        let result = self.emit(InstKind::CallBuiltin {
            builtin: Builtin::EnsureObject,
            args: vec![result],
        });
        let done = self.emit(InstKind::LoadNamed {
            object: result.clone(),
            name: "done".to_string(),
        });
        self.b.cond_branch(done, exit, step);

        self.b.switch_to(step);
        let value = self.emit(InstKind::LoadNamed {
            object: result,
            name: "value".to_string(),
        });
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Loop,
            break_to: exit,
            continue_to: Some(header),
            iterator: Some(iterator.clone()),
        });
        // Errors in the binding or the body close the iterator.
        self.set_handler(Some(close));
        let mark = self.enter_scope(s.scope);
        self.bind_for_head(&s.left, value);
        self.compile_statement(&s.body);
        self.leave_scope(mark);
        self.b.set_handler(outer);
        self.control.pop();
        self.b.branch(header);

        self.b.switch_to(close);
        let exception = self.emit(InstKind::Catch);
        self.emit(InstKind::IteratorClose { iterator, on_throw: true });
        self.b.throw(exception);

        self.b.switch_to(exit);
    }

    fn compile_for_in(&mut self, s: &'a ForInStatement, labels: Vec<String>) {
        let object = self.compile_loop_subject(s.scope, &s.right);
        let keys = self.emit(InstKind::CallBuiltin {
            builtin: Builtin::ForInKeys,
            args: vec![object],
        });
        let len = self.emit(InstKind::LoadNamed {
            object: keys.clone(),
            name: "length".to_string(),
        });
        let index = self.new_temp("index");
        self.store_storage(&index, Operand::number(0.0));

        let header = self.b.create_block();
        let body = self.b.create_block();
        let cont = self.b.create_block();
        let exit = self.b.create_block();
        self.goto(header);
        let i = self.load_storage(&index);
        let more = self.emit(InstKind::Binary {
            op: BinaryOp::Lt,
            lhs: i.clone(),
            rhs: len,
            form: Default::default(),
        });
        self.b.cond_branch(more, body, exit);

        self.b.switch_to(body);
        let key = self.emit(InstKind::LoadComputed { object: keys, key: i });
        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Loop,
            break_to: exit,
            continue_to: Some(cont),
            iterator: None,
        });
        let mark = self.enter_scope(s.scope);
        self.bind_for_head(&s.left, key);
        self.compile_statement(&s.body);
        self.leave_scope(mark);
        self.control.pop();
        self.goto(cont);
        let i = self.load_storage(&index);
        let next = self.emit(InstKind::Binary {
            op: BinaryOp::Add,
            lhs: i,
            rhs: Operand::number(1.0),
            form: Default::default(),
        });
        self.store_storage(&index, next);
        self.b.branch(header);
        self.b.switch_to(exit);
    }

    // ========================================================================
    // Switch
    // ========================================================================

    fn compile_switch(&mut self, s: &'a SwitchStatement, labels: Vec<String>) {
        let discriminant = self.compile_expression(&s.discriminant);
        let mark = self.enter_scope(s.scope);
        for case in &s.cases {
            self.hoist_functions(&case.consequent);
        }

        let exit = self.b.create_block();
        let blocks: Vec<_> = s.cases.iter().map(|_| self.b.create_block()).collect();
        let default = s
            .cases
            .iter()
            .position(|c| c.test.is_none())
            .map_or(exit, |i| blocks[i]);

        let constant_tests: Option<Vec<Literal>> = s
            .cases
            .iter()
            .filter_map(|c| c.test.as_ref())
            .map(|test| match test {
                Expression::Literal(lit) => super::expr::literal_of(&lit.value),
                _ => None,
            })
            .collect();

        match constant_tests {
            Some(tests) => {
                let mut cases: Vec<(Literal, crate::ir::BlockId)> = Vec::new();
                let tested = s.cases.iter().enumerate().filter(|(_, c)| c.test.is_some());
                for ((i, _), lit) in tested.zip(tests) {
                    // The first matching case wins.
                    if !cases.iter().any(|(seen, _)| crate::ir::literal::strict_equals(seen, &lit) == Some(true)) {
                        cases.push((lit, blocks[i]));
                    }
                }
                self.b.terminate(Terminator::Switch {
                    value: discriminant,
                    cases,
                    default,
                });
            }
            None => {
                for (i, case) in s.cases.iter().enumerate() {
                    let Some(test) = &case.test else { continue };
                    let value = self.compile_expression(test);
                    let matches = self.emit(InstKind::Binary {
                        op: BinaryOp::StrictEq,
                        lhs: discriminant.clone(),
                        rhs: value,
                        form: Default::default(),
                    });
                    let next = self.b.create_block();
                    self.b.cond_branch(matches, blocks[i], next);
                    self.b.switch_to(next);
                }
                self.b.branch(default);
            }
        }

        self.push_control(ControlKind::Target {
            labels,
            kind: TargetKind::Switch,
            break_to: exit,
            continue_to: None,
            iterator: None,
        });
        for (case, &block) in s.cases.iter().zip(&blocks) {
            // Fall through from the previous case.
            self.goto(block);
            self.compile_statements(&case.consequent);
        }
        self.control.pop();
        self.goto(exit);
        self.leave_scope(mark);
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn compile_try(&mut self, s: &'a TryStatement) {
        let Some(finalizer) = &s.finalizer else {
            self.compile_try_catch(&s.block, s.handler.as_ref());
            return;
        };
        let outer = self.b.handler();
        let envs = self.envs.clone();
        let on_throw = self.b.create_block_with_handler(outer);

        self.push_control(ControlKind::Finally(finalizer));
        self.set_handler(Some(on_throw));
        self.compile_try_catch(&s.block, s.handler.as_ref());
        self.control.pop();
        self.set_handler(outer);

        // Normal completion runs the finalizer inline.
        let after = self.b.create_block();
        if !self.b.is_terminated() {
            self.compile_block(finalizer);
            self.b.branch(after);
        }

        // Exceptional completion runs it and rethrows.
        self.b.switch_to(on_throw);
        let saved_envs = std::mem::replace(&mut self.envs, envs);
        let exception = self.emit(InstKind::Catch);
        self.compile_block(finalizer);
        self.b.throw(exception);
        self.envs = saved_envs;

        self.b.switch_to(after);
    }

    fn compile_try_catch(&mut self, block: &'a BlockStatement, handler: Option<&'a CatchClause>) {
        let Some(clause) = handler else {
            self.compile_block(block);
            return;
        };
        let outer = self.b.handler();
        let envs = self.envs.clone();
        let on_throw = self.b.create_block_with_handler(outer);

        self.set_handler(Some(on_throw));
        self.compile_block(block);
        self.set_handler(outer);
        let after = self.b.create_block();
        self.b.branch(after);

        self.b.switch_to(on_throw);
        let saved_envs = std::mem::replace(&mut self.envs, envs);
        let exception = self.emit(InstKind::Catch);
        let saved = self.set_span(clause.span);
        let mark = self.enter_scope(clause.scope);
        if let Some(param) = &clause.param {
            self.bind_pattern(param, exception, true);
        }
        self.compile_block(&clause.body);
        self.leave_scope(mark);
        self.set_span(saved);
        self.b.branch(after);
        self.envs = saved_envs;

        self.b.switch_to(after);
    }
}
