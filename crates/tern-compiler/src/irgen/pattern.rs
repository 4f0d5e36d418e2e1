// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Destructuring of declarations, parameters and assignment targets.

use crate::ast::*;
use crate::ir::{BinaryOp, Builtin, InstKind, Operand};

use super::FnLowering;

impl<'a, 'm> FnLowering<'a, 'm> {
    /// Binds `value` to `pattern`. Declarations (`init`) write bindings
    /// directly; assignments go through mutability and dead-zone checks.
    pub(super) fn bind_pattern(&mut self, pattern: &'a Pattern, value: Operand, init: bool) {
        let saved = self.set_span(pattern.span());
        match pattern {
            Pattern::Identifier(id) => {
                if init {
                    match id.binding {
                        Some(decl) => self.init_decl(decl, value),
                        None => {
                            self.emit(InstKind::StoreGlobal {
                                name: id.name.clone(),
                                value,
                            });
                        }
                    }
                } else {
                    self.assign_identifier(id, value);
                }
            }
            Pattern::MemberExpression(m) => {
                let object = self.compile_member_object(m);
                let key = self.compile_member_key(m);
                self.store_member(object, m, key, value);
            }
            Pattern::AssignmentPattern(p) => {
                let value = self.apply_default(value, &p.right);
                self.bind_pattern(&p.left, value, init);
            }
            Pattern::ObjectPattern(p) => self.bind_object_pattern(p, value, init),
            Pattern::ArrayPattern(p) => self.bind_array_pattern(p, value, init),
            Pattern::RestElement(rest) => self.bind_pattern(&rest.argument, value, init),
        }
        self.set_span(saved);
    }

    /// `value === undefined ? default : value`, evaluating the default lazily.
    fn apply_default(&mut self, value: Operand, default: &'a Expression) -> Operand {
        let result = self.new_temp("default");
        self.store_storage(&result, value.clone());
        let is_undefined = self.binary(BinaryOp::StrictEq, value, Operand::UNDEFINED);
        let fill = self.b.create_block();
        let join = self.b.create_block();
        self.b.cond_branch(is_undefined, fill, join);

        self.b.switch_to(fill);
        let value = self.compile_expression(default);
        self.store_storage(&result, value);
        self.b.branch(join);

        self.b.switch_to(join);
        self.load_storage(&result)
    }

    fn bind_object_pattern(&mut self, p: &'a ObjectPattern, value: Operand, init: bool) {
        let mut used_keys: Vec<Operand> = Vec::new();
        for prop in &p.properties {
            match prop {
                ObjectPatternProperty::Property(prop) => {
                    let static_key = if prop.computed { None } else { prop.key.static_key() };
                    let (key, element) = match static_key {
                        Some(name) => {
                            let element = self.emit(InstKind::LoadNamed {
                                object: value.clone(),
                                name: name.clone(),
                            });
                            (Operand::string(name), element)
                        }
                        None => {
                            let key = self.compile_expression(&prop.key);
                            let element = self.emit(InstKind::LoadComputed {
                                object: value.clone(),
                                key: key.clone(),
                            });
                            (key, element)
                        }
                    };
                    used_keys.push(key);
                    self.bind_pattern(&prop.value, element, init);
                }
                ObjectPatternProperty::RestElement(rest) => {
                    let target = self.emit(InstKind::AllocObject { proto: None });
                    let mut args = vec![target.clone(), value.clone()];
                    args.extend(used_keys.iter().cloned());
                    self.emit(InstKind::CallBuiltin {
                        builtin: Builtin::CopyDataProperties,
                        args,
                    });
                    self.bind_pattern(&rest.argument, target, init);
                }
            }
        }
    }

    /// Steps the iterator once per element; a rest element drains it. When
    /// no rest element consumed the iterator it is closed unless it reported
    /// completion on the last step.
    fn bind_array_pattern(&mut self, p: &'a ArrayPattern, value: Operand, init: bool) {
        let iterator = self.emit(InstKind::GetIterator { iterable: value });
        let next = self.emit(InstKind::LoadNamed {
            object: iterator.clone(),
            name: "next".to_string(),
        });
        let mut last_done: Option<Operand> = None;
        for element in &p.elements {
            if let Some(Pattern::RestElement(rest)) = element {
                let remaining = self.emit(InstKind::CallBuiltin {
                    builtin: Builtin::IteratorToArray,
                    args: vec![iterator.clone()],
                });
                self.bind_pattern(&rest.argument, remaining, init);
                return;
            }
            let result = self.emit(InstKind::Call {
                callee: next.clone(),
                this: iterator.clone(),
                args: Vec::new(),
            });
            let result = self.emit(InstKind::CallBuiltin {
                builtin: Builtin::EnsureObject,
                args: vec![result],
            });
            last_done = Some(self.emit(InstKind::LoadNamed {
                object: result.clone(),
                name: "done".to_string(),
            }));
            let Some(target) = element else { continue };
            let item = self.emit(InstKind::LoadNamed {
                object: result,
                name: "value".to_string(),
            });
            self.bind_pattern(target, item, init);
        }

        match last_done {
            Some(done) => {
                let close = self.b.create_block();
                let join = self.b.create_block();
                self.b.cond_branch(done, join, close);
                self.b.switch_to(close);
                self.emit(InstKind::IteratorClose {
                    iterator,
                    on_throw: false,
                });
                self.b.branch(join);
                self.b.switch_to(join);
            }
            None => {
                self.emit(InstKind::IteratorClose {
                    iterator,
                    on_throw: false,
                });
            }
        }
    }
}
