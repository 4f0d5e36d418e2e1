// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression lowering.

use num_bigint::BigInt;
use rustc_hash::FxHashSet;

use crate::ast::*;
use crate::ir::{self, BinaryOp, Builtin, InstKind, Operand, UnaryOp};
use crate::sema::{DeclKind, FunctionKind};

use super::{FnLowering, Storage};

/// Compile-time value of a source literal; regular expressions have none.
pub(super) fn literal_of(value: &LiteralValue) -> Option<ir::Literal> {
    Some(match value {
        LiteralValue::Null => ir::Literal::Null,
        LiteralValue::Boolean(b) => ir::Literal::Bool(*b),
        LiteralValue::Number(n) => ir::Literal::Number(*n),
        LiteralValue::String(s) => ir::Literal::String(s.clone()),
        LiteralValue::BigInt(digits) => ir::Literal::BigInt(digits.parse::<BigInt>().ok()?),
        LiteralValue::RegExp { .. } => return None,
    })
}

/// Argument list of a call after lowering.
enum CallArgs {
    List(Vec<Operand>),
    /// Spread arguments collected into an array
    Array(Operand),
}

impl<'a, 'm> FnLowering<'a, 'm> {
    pub(super) fn compile_expression(&mut self, expr: &'a Expression) -> Operand {
        let saved = self.set_span(expr.span());
        let value = match expr {
            Expression::Literal(lit) => self.compile_literal(lit),
            Expression::Identifier(id) => self.compile_identifier(id),
            Expression::ThisExpression(this) => self.compile_this(this),
            Expression::Super(_) => {
                self.fail("bare `super`");
                Operand::UNDEFINED
            }
            Expression::ArrayExpression(a) => self.compile_array_elements(a.elements.iter().map(Option::as_ref)),
            Expression::ObjectExpression(o) => self.compile_object(o),
            Expression::FunctionExpression(f) => self.compile_function_expression(f),
            Expression::ArrowFunctionExpression(f) => self.create_closure(f),
            Expression::ClassExpression(class) => self.compile_class(class),
            Expression::UnaryExpression(u) => self.compile_unary(u),
            Expression::UpdateExpression(u) => self.compile_update(u),
            Expression::BinaryExpression(b) => {
                let lhs = self.compile_expression(&b.left);
                let rhs = self.compile_expression(&b.right);
                self.binary(b.operator, lhs, rhs)
            }
            Expression::LogicalExpression(l) => {
                let lhs = self.compile_expression(&l.left);
                self.compile_logical(l.operator, lhs, &l.right)
            }
            Expression::AssignmentExpression(a) => self.compile_assignment(a),
            Expression::ConditionalExpression(c) => self.compile_conditional(c),
            Expression::CallExpression(call) => self.compile_call(call),
            Expression::NewExpression(n) => self.compile_new(n),
            Expression::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                self.load_property(object, m)
            }
            Expression::ChainExpression(c) => self.compile_chain(c),
            Expression::SequenceExpression(s) => {
                let mut last = Operand::UNDEFINED;
                for e in &s.expressions {
                    last = self.compile_expression(e);
                }
                last
            }
            Expression::TemplateLiteral(t) => self.compile_template(t),
            Expression::YieldExpression(y) => self.compile_yield(y),
            Expression::AwaitExpression(a) => {
                let value = self.compile_expression(&a.argument);
                self.compile_await(value)
            }
            Expression::MetaProperty(meta) => match meta.binding {
                Some(decl) => self.load_decl(decl, false),
                None => {
                    self.b.func_mut().flags.uses_new_target = true;
                    self.emit(InstKind::GetNewTarget)
                }
            },
            Expression::SpreadElement(_) => {
                self.fail("spread outside of a list");
                Operand::UNDEFINED
            }
        };
        self.set_span(saved);
        value
    }

    pub(super) fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
        self.emit(InstKind::Binary {
            op,
            lhs,
            rhs,
            form: Default::default(),
        })
    }

    fn unary(&mut self, op: UnaryOp, operand: Operand) -> Operand {
        self.emit(InstKind::Unary {
            op,
            operand,
            form: Default::default(),
        })
    }

    fn compile_literal(&mut self, lit: &Literal) -> Operand {
        if let LiteralValue::RegExp { pattern, flags } = &lit.value {
            return self.emit(InstKind::CreateRegExp {
                pattern: pattern.clone(),
                flags: flags.clone(),
            });
        }
        match literal_of(&lit.value) {
            Some(value) => Operand::Literal(value),
            None => {
                self.fail("malformed BigInt literal");
                Operand::UNDEFINED
            }
        }
    }

    pub(super) fn compile_identifier(&mut self, id: &Identifier) -> Operand {
        match id.binding {
            Some(decl) => self.load_decl(decl, id.tdz_check),
            None if id.name == "undefined" => Operand::UNDEFINED,
            None => self.emit(InstKind::LoadGlobal {
                name: id.name.clone(),
                throw_if_missing: true,
            }),
        }
    }

    fn compile_this(&mut self, this: &ThisExpression) -> Operand {
        match this.binding {
            Some(decl) => self.load_decl(decl, this.tdz_check),
            None => self.receiver(),
        }
    }

    /// The `this` value of the current function when no binding was resolved.
    pub(super) fn receiver(&mut self) -> Operand {
        if let Some(resume) = &self.resume {
            let slot = Storage::Env(resume.scope, resume.this_slot);
            return self.load_storage(&slot);
        }
        let model = self.model();
        let info = model.function(self.func);
        if let Some(decl) = info.this_decl {
            let derived = matches!(info.kind, FunctionKind::Constructor { derived: true });
            return self.load_decl(decl, derived);
        }
        self.emit(InstKind::LoadParam(0))
    }

    /// `this` for a `super.x` access or a `super()` result store.
    fn super_receiver(&mut self) -> Operand {
        let model = self.model();
        let mut owner = self.func;
        while model.function(owner).is_arrow() {
            match model.function(owner).parent {
                Some(parent) => owner = parent,
                None => break,
            }
        }
        let info = model.function(owner);
        match info.this_decl {
            Some(decl) if owner == self.func || model.decl(decl).captured => {
                let derived = matches!(info.kind, FunctionKind::Constructor { derived: true });
                self.load_decl(decl, derived)
            }
            _ => self.receiver(),
        }
    }

    fn compile_function_expression(&mut self, f: &'a Function) -> Operand {
        let Some(decl) = f.self_binding else {
            return self.create_closure(f);
        };
        let name_scope = self.model().decl(decl).scope;
        let mark = self.enter_scope(Some(name_scope));
        let closure = self.create_closure(f);
        if self.model().decl(decl).captured {
            self.init_decl(decl, closure.clone());
        }
        self.leave_scope(mark);
        closure
    }

    // ========================================================================
    // Joins
    // ========================================================================

    fn compile_conditional(&mut self, c: &'a ConditionalExpression) -> Operand {
        let result = self.new_temp("cond");
        let cond = self.compile_expression(&c.test);
        let then_block = self.b.create_block();
        let else_block = self.b.create_block();
        let join = self.b.create_block();
        self.b.cond_branch(cond, then_block, else_block);

        self.b.switch_to(then_block);
        let value = self.compile_expression(&c.consequent);
        self.store_storage(&result, value);
        self.b.branch(join);

        self.b.switch_to(else_block);
        let value = self.compile_expression(&c.alternate);
        self.store_storage(&result, value);
        self.b.branch(join);

        self.b.switch_to(join);
        self.load_storage(&result)
    }

    /// Branches to `rhs_block` when `op` must evaluate its right operand.
    fn logical_test(&mut self, op: LogicalOperator, lhs: Operand, rhs_block: ir::BlockId, join: ir::BlockId) {
        match op {
            LogicalOperator::And => self.b.cond_branch(lhs, rhs_block, join),
            LogicalOperator::Or => self.b.cond_branch(lhs, join, rhs_block),
            LogicalOperator::Nullish => {
                let nullish = self.binary(BinaryOp::Eq, lhs, Operand::Literal(ir::Literal::Null));
                self.b.cond_branch(nullish, rhs_block, join);
            }
        }
    }

    fn compile_logical(&mut self, op: LogicalOperator, lhs: Operand, right: &'a Expression) -> Operand {
        let result = self.new_temp("logical");
        self.store_storage(&result, lhs.clone());
        let rhs_block = self.b.create_block();
        let join = self.b.create_block();
        self.logical_test(op, lhs, rhs_block, join);

        self.b.switch_to(rhs_block);
        let rhs = self.compile_expression(right);
        self.store_storage(&result, rhs);
        self.b.branch(join);

        self.b.switch_to(join);
        self.load_storage(&result)
    }

    // ========================================================================
    // Optional chains
    // ========================================================================

    fn compile_chain(&mut self, c: &'a ChainExpression) -> Operand {
        let result = self.new_temp("chain");
        let short = self.b.create_block();
        let join = self.b.create_block();
        let saved = self.chain_short.replace(short);
        let value = self.compile_expression(&c.expression);
        self.chain_short = saved;
        self.store_storage(&result, value);
        self.b.branch(join);

        self.b.switch_to(short);
        self.store_storage(&result, Operand::UNDEFINED);
        self.b.branch(join);

        self.b.switch_to(join);
        self.load_storage(&result)
    }

    /// Leaves the innermost optional chain when `value` is nullish.
    fn short_circuit_if_nullish(&mut self, value: Operand) {
        let Some(short) = self.chain_short else {
            self.fail("optional access outside of a chain");
            return;
        };
        let nullish = self.binary(BinaryOp::Eq, value, Operand::Literal(ir::Literal::Null));
        let cont = self.b.create_block();
        self.b.cond_branch(nullish, short, cont);
        self.b.switch_to(cont);
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// Evaluates the object of a member expression, including `super`.
    pub(super) fn compile_member_object(&mut self, m: &'a MemberExpression) -> Operand {
        let object = match &*m.object {
            Expression::Super(sup) => match sup.binding {
                Some(decl) => self.load_decl(decl, false),
                None => {
                    self.fail("unresolved `super`");
                    Operand::UNDEFINED
                }
            },
            object => self.compile_expression(object),
        };
        if m.optional {
            self.short_circuit_if_nullish(object.clone());
        }
        object
    }

    /// The computed key of `m`, or `None` for a static name.
    pub(super) fn compile_member_key(&mut self, m: &'a MemberExpression) -> Option<Operand> {
        match m.static_name() {
            Some(_) => None,
            None => Some(self.compile_expression(&m.property)),
        }
    }

    pub(super) fn load_member(&mut self, object: Operand, m: &'a MemberExpression, key: Option<Operand>) -> Operand {
        match (key, m.static_name()) {
            (Some(key), _) => self.emit(InstKind::LoadComputed { object, key }),
            (None, Some(name)) => self.emit(InstKind::LoadNamed {
                object,
                name: name.to_string(),
            }),
            (None, None) => {
                self.fail("member without a key");
                Operand::UNDEFINED
            }
        }
    }

    pub(super) fn store_member(&mut self, object: Operand, m: &'a MemberExpression, key: Option<Operand>, value: Operand) {
        match (key, m.static_name()) {
            (Some(key), _) => {
                self.emit(InstKind::StoreComputed { object, key, value });
            }
            (None, Some(name)) => {
                self.emit(InstKind::StoreNamed {
                    object,
                    name: name.to_string(),
                    value,
                });
            }
            (None, None) => self.fail("member without a key"),
        }
    }

    fn load_property(&mut self, object: Operand, m: &'a MemberExpression) -> Operand {
        let key = self.compile_member_key(m);
        self.load_member(object, m, key)
    }

    // ========================================================================
    // Literals
    // ========================================================================

    /// Builds an array from list elements, spreading iterables in place.
    pub(super) fn compile_array_elements<I>(&mut self, elements: I) -> Operand
    where
        I: Iterator<Item = Option<&'a Expression>>,
    {
        let mut pending: Vec<Operand> = Vec::new();
        let mut array: Option<Operand> = None;
        for element in elements {
            match element {
                Some(Expression::SpreadElement(spread)) => {
                    let target = match array.clone() {
                        Some(array) => array,
                        None => {
                            let created = self.emit(InstKind::AllocArray {
                                elements: std::mem::take(&mut pending),
                            });
                            array = Some(created.clone());
                            created
                        }
                    };
                    let iterable = self.compile_expression(&spread.argument);
                    self.emit(InstKind::SpreadIntoArray { array: target, iterable });
                }
                element => {
                    let value = match element {
                        Some(e) => self.compile_expression(e),
                        None => Operand::Literal(ir::Literal::Empty),
                    };
                    match &array {
                        Some(array) => {
                            self.emit(InstKind::CallBuiltin {
                                builtin: Builtin::ArrayPush,
                                args: vec![array.clone(), value],
                            });
                        }
                        None => pending.push(value),
                    }
                }
            }
        }
        match array {
            Some(array) => array,
            None => self.emit(InstKind::AllocArray { elements: pending }),
        }
    }

    fn compile_object(&mut self, o: &'a ObjectExpression) -> Operand {
        let mut seen = FxHashSet::default();
        let static_keys: Option<Vec<String>> = o
            .properties
            .iter()
            .map(|member| match member {
                ObjectMember::Property(p) if p.kind == PropertyKind::Init && !p.computed => {
                    p.key.static_key().filter(|k| k != "__proto__" && seen.insert(k.clone()))
                }
                _ => None,
            })
            .collect();

        if let Some(keys) = static_keys {
            let mut props = Vec::with_capacity(keys.len());
            for (key, member) in keys.into_iter().zip(&o.properties) {
                if let ObjectMember::Property(p) = member {
                    let value = self.compile_expression(&p.value);
                    props.push((key, value));
                }
            }
            return self.emit(InstKind::AllocObjectLiteral { props });
        }

        let object = self.emit(InstKind::AllocObject { proto: None });
        for member in &o.properties {
            match member {
                ObjectMember::Property(p) => {
                    let saved = self.set_span(p.span);
                    let static_key = if p.computed { None } else { p.key.static_key() };
                    if p.kind == PropertyKind::Init && static_key.as_deref() == Some("__proto__") {
                        let proto = self.compile_expression(&p.value);
                        self.emit(InstKind::CallBuiltin {
                            builtin: Builtin::SetPrototypeOf,
                            args: vec![object.clone(), proto],
                        });
                        self.set_span(saved);
                        continue;
                    }
                    let key = match static_key {
                        Some(name) => Operand::string(name),
                        None => self.compile_expression(&p.key),
                    };
                    let value = self.compile_expression(&p.value);
                    let kind = match p.kind {
                        PropertyKind::Init => InstKind::DefineOwn {
                            object: object.clone(),
                            key,
                            value,
                            enumerable: true,
                        },
                        PropertyKind::Get => InstKind::DefineAccessor {
                            object: object.clone(),
                            key,
                            getter: Some(value),
                            setter: None,
                            enumerable: true,
                        },
                        PropertyKind::Set => InstKind::DefineAccessor {
                            object: object.clone(),
                            key,
                            getter: None,
                            setter: Some(value),
                            enumerable: true,
                        },
                    };
                    self.emit(kind);
                    self.set_span(saved);
                }
                ObjectMember::SpreadElement(spread) => {
                    let source = self.compile_expression(&spread.argument);
                    self.emit(InstKind::CallBuiltin {
                        builtin: Builtin::CopyDataProperties,
                        args: vec![object.clone(), source],
                    });
                }
            }
        }
        object
    }

    fn compile_template(&mut self, t: &'a TemplateLiteral) -> Operand {
        let mut quasis = t.quasis.iter();
        let head = quasis.next().map_or_else(String::new, |q| q.cooked.clone());
        let mut acc = Operand::string(head);
        for (e, quasi) in t.expressions.iter().zip(quasis) {
            let value = self.compile_expression(e);
            let text = self.unary(UnaryOp::ToString, value);
            acc = self.binary(BinaryOp::Add, acc, text);
            if !quasi.cooked.is_empty() {
                acc = self.binary(BinaryOp::Add, acc, Operand::string(quasi.cooked.clone()));
            }
        }
        acc
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn compile_unary(&mut self, u: &'a UnaryExpression) -> Operand {
        match u.operator {
            UnaryOperator::Minus => {
                let v = self.compile_expression(&u.argument);
                self.unary(UnaryOp::Neg, v)
            }
            UnaryOperator::Plus => {
                let v = self.compile_expression(&u.argument);
                self.unary(UnaryOp::ToNumber, v)
            }
            UnaryOperator::Not => {
                let v = self.compile_expression(&u.argument);
                self.unary(UnaryOp::Not, v)
            }
            UnaryOperator::BitNot => {
                let v = self.compile_expression(&u.argument);
                self.unary(UnaryOp::BitNot, v)
            }
            UnaryOperator::TypeOf => {
                let v = match &*u.argument {
                    // `typeof` of an undeclared global does not throw.
                    Expression::Identifier(id) if id.binding.is_none() && id.name != "undefined" => {
                        self.emit(InstKind::LoadGlobal {
                            name: id.name.clone(),
                            throw_if_missing: false,
                        })
                    }
                    e => self.compile_expression(e),
                };
                self.unary(UnaryOp::TypeOf, v)
            }
            UnaryOperator::Void => {
                self.compile_expression(&u.argument);
                Operand::UNDEFINED
            }
            UnaryOperator::Delete => self.compile_delete(&u.argument),
        }
    }

    fn compile_delete(&mut self, target: &'a Expression) -> Operand {
        match target {
            Expression::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                match m.static_name() {
                    Some(name) => self.emit(InstKind::DeleteNamed {
                        object,
                        name: name.to_string(),
                    }),
                    None => {
                        let key = self.compile_expression(&m.property);
                        self.emit(InstKind::DeleteComputed { object, key })
                    }
                }
            }
            // Sloppy-mode `delete x` only removes configurable globals.
            Expression::Identifier(id) if id.binding.is_none() => {
                let global = self.emit(InstKind::GetGlobalObject);
                self.emit(InstKind::DeleteNamed {
                    object: global,
                    name: id.name.clone(),
                })
            }
            Expression::Identifier(_) => Operand::boolean(false),
            e => {
                self.compile_expression(e);
                Operand::boolean(true)
            }
        }
    }

    fn compile_update(&mut self, u: &'a UpdateExpression) -> Operand {
        let op = match u.operator {
            UpdateOperator::Increment => UnaryOp::Inc,
            UpdateOperator::Decrement => UnaryOp::Dec,
        };
        match &*u.argument {
            Expression::Identifier(id) => {
                let old = self.compile_identifier(id);
                let old = self.unary(UnaryOp::ToNumeric, old);
                let new = self.unary(op, old.clone());
                self.assign_identifier(id, new.clone());
                if u.prefix { new } else { old }
            }
            Expression::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                let key = self.compile_member_key(m);
                let old = self.load_member(object.clone(), m, key.clone());
                let old = self.unary(UnaryOp::ToNumeric, old);
                let new = self.unary(op, old.clone());
                self.store_member(object, m, key, new.clone());
                if u.prefix { new } else { old }
            }
            _ => {
                self.fail("invalid update target");
                Operand::UNDEFINED
            }
        }
    }

    /// Writes a resolved or global name with assignment semantics.
    pub(super) fn assign_identifier(&mut self, id: &Identifier, value: Operand) {
        let Some(decl) = id.binding else {
            self.emit(InstKind::StoreGlobal {
                name: id.name.clone(),
                value,
            });
            return;
        };
        if id.tdz_check {
            self.load_decl(decl, true);
        }
        let data = self.model().decl(decl);
        if data.kind == DeclKind::Const {
            self.throw_type_error("Assignment to constant variable.");
        } else if data.immutable {
            // Writes to a function expression's own name are ignored in
            // sloppy code.
            if self.b.func().strict {
                self.throw_type_error("Assignment to constant variable.");
            }
        } else {
            self.init_decl(decl, value);
        }
    }

    fn compile_assignment(&mut self, a: &'a AssignmentExpression) -> Operand {
        match (a.operator, &*a.left) {
            (AssignmentOperator::Assign, Pattern::Identifier(id)) => {
                let value = self.compile_expression(&a.right);
                self.assign_identifier(id, value.clone());
                value
            }
            (AssignmentOperator::Assign, Pattern::MemberExpression(m)) => {
                let object = self.compile_member_object(m);
                let key = self.compile_member_key(m);
                let value = self.compile_expression(&a.right);
                self.store_member(object, m, key, value.clone());
                value
            }
            (AssignmentOperator::Assign, pattern) => {
                let value = self.compile_expression(&a.right);
                self.bind_pattern(pattern, value.clone(), false);
                value
            }
            (AssignmentOperator::Compound(op), target) => match (op.binary(), op.logical()) {
                (Some(bin), _) => self.compile_compound(bin, target, &a.right),
                (None, Some(logical)) => self.compile_logical_assignment(logical, target, &a.right),
                (None, None) => {
                    self.fail("unknown compound operator");
                    Operand::UNDEFINED
                }
            },
        }
    }

    fn compile_compound(&mut self, op: BinaryOp, target: &'a Pattern, right: &'a Expression) -> Operand {
        match target {
            Pattern::Identifier(id) => {
                let current = self.compile_identifier(id);
                let rhs = self.compile_expression(right);
                let value = self.binary(op, current, rhs);
                self.assign_identifier(id, value.clone());
                value
            }
            Pattern::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                let key = self.compile_member_key(m);
                let current = self.load_member(object.clone(), m, key.clone());
                let rhs = self.compile_expression(right);
                let value = self.binary(op, current, rhs);
                self.store_member(object, m, key, value.clone());
                value
            }
            _ => {
                self.fail("invalid compound assignment target");
                Operand::UNDEFINED
            }
        }
    }

    fn compile_logical_assignment(&mut self, op: LogicalOperator, target: &'a Pattern, right: &'a Expression) -> Operand {
        let result = self.new_temp("logical");
        let member = match target {
            Pattern::Identifier(id) => {
                let current = self.compile_identifier(id);
                self.store_storage(&result, current);
                None
            }
            Pattern::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                let key = self.compile_member_key(m);
                let current = self.load_member(object.clone(), m, key.clone());
                self.store_storage(&result, current);
                Some((m, object, key))
            }
            _ => {
                self.fail("invalid logical assignment target");
                return Operand::UNDEFINED;
            }
        };
        let current = self.load_storage(&result);
        let assign = self.b.create_block();
        let join = self.b.create_block();
        self.logical_test(op, current, assign, join);

        self.b.switch_to(assign);
        let value = self.compile_expression(right);
        match (member, target) {
            (Some((m, object, key)), _) => self.store_member(object, m, key, value.clone()),
            (None, Pattern::Identifier(id)) => self.assign_identifier(id, value.clone()),
            (None, _) => {}
        }
        self.store_storage(&result, value);
        self.b.branch(join);

        self.b.switch_to(join);
        self.load_storage(&result)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn compile_arguments(&mut self, args: &'a [Expression]) -> CallArgs {
        if args.iter().any(|a| matches!(a, Expression::SpreadElement(_))) {
            CallArgs::Array(self.compile_array_elements(args.iter().map(Some)))
        } else {
            CallArgs::List(args.iter().map(|a| self.compile_expression(a)).collect())
        }
    }

    fn compile_call(&mut self, call: &'a CallExpression) -> Operand {
        let (callee, this) = match &*call.callee {
            Expression::Super(sup) => return self.compile_super_call(sup, &call.arguments),
            Expression::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                let this = match &*m.object {
                    Expression::Super(_) => self.super_receiver(),
                    _ => object.clone(),
                };
                let callee = self.load_property(object, m);
                (callee, this)
            }
            callee => (self.compile_expression(callee), Operand::UNDEFINED),
        };
        if call.optional {
            self.short_circuit_if_nullish(callee.clone());
        }
        match self.compile_arguments(&call.arguments) {
            CallArgs::List(args) => self.emit(InstKind::Call { callee, this, args }),
            CallArgs::Array(args) => self.emit(InstKind::CallWithArgsArray { callee, this, args }),
        }
    }

    fn compile_new(&mut self, n: &'a NewExpression) -> Operand {
        let callee = self.compile_expression(&n.callee);
        let new_target = callee.clone();
        match self.compile_arguments(&n.arguments) {
            CallArgs::List(args) => self.emit(InstKind::Construct {
                callee,
                new_target,
                args,
            }),
            CallArgs::Array(args) => self.emit(InstKind::ConstructWithArgsArray {
                callee,
                new_target,
                args,
            }),
        }
    }

    /// `super(...)`: constructs through the parent class, binds `this` and
    /// runs the field initializer.
    fn compile_super_call(&mut self, sup: &SuperExpression, args: &'a [Expression]) -> Operand {
        let Some(parent) = sup.binding else {
            self.fail("unresolved `super()`");
            return Operand::UNDEFINED;
        };
        let callee = self.load_decl(parent, false);

        let model = self.model();
        let mut owner = self.func;
        while model.function(owner).is_arrow() {
            match model.function(owner).parent {
                Some(p) => owner = p,
                None => break,
            }
        }
        let new_target = match model.function(owner).new_target_decl {
            Some(decl) if owner != self.func => self.load_decl(decl, false),
            _ => {
                self.b.func_mut().flags.uses_new_target = true;
                self.emit(InstKind::GetNewTarget)
            }
        };
        let result = match self.compile_arguments(args) {
            CallArgs::List(args) => self.emit(InstKind::Construct {
                callee,
                new_target,
                args,
            }),
            CallArgs::Array(args) => self.emit(InstKind::ConstructWithArgsArray {
                callee,
                new_target,
                args,
            }),
        };
        match model.function(owner).this_decl {
            Some(this) => self.init_decl(this, result.clone()),
            None => self.fail("derived constructor without a `this` binding"),
        }
        self.run_field_initializer(result.clone());
        result
    }
}
