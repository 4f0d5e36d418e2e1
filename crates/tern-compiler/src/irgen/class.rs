// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Class lowering.
//!
//! A class evaluates to its constructor closure. Methods are installed as
//! non-enumerable properties of the prototype (or the constructor, for static
//! members); fields are defined by synthetic initializer functions that run
//! with the new instance (or the constructor) as `this`.

use crate::ast::*;
use crate::ir::{Builtin, InstKind, Operand};

use super::{Body, FnLowering};

impl<'a, 'm> FnLowering<'a, 'm> {
    pub(super) fn compile_class(&mut self, class: &'a Class) -> Operand {
        let saved = self.set_span(class.span);
        let mark = self.enter_scope(class.scope);

        let heritage = match &class.super_class {
            Some(parent) => {
                let parent = self.compile_expression(parent);
                let proto = self.emit(InstKind::LoadNamed {
                    object: parent.clone(),
                    name: "prototype".to_string(),
                });
                if let Some(decl) = class.super_binding {
                    self.init_decl(decl, parent.clone());
                }
                if let Some(decl) = class.super_proto_binding {
                    self.init_decl(decl, proto.clone());
                }
                Some((parent, proto))
            }
            None => None,
        };

        let Some(ctor_node) = class.constructor() else {
            self.fail("class without a constructor");
            self.leave_scope(mark);
            self.set_span(saved);
            return Operand::UNDEFINED;
        };
        if let (Some(idx), Some(fields)) = (ctor_node.info, class.instance_init_binding) {
            self.m.ctor_fields.insert(idx, fields);
        }
        let ctor = self.create_closure(ctor_node);
        let proto = self.emit(InstKind::LoadNamed {
            object: ctor.clone(),
            name: "prototype".to_string(),
        });
        if let Some((parent, parent_proto)) = heritage {
            self.emit(InstKind::CallBuiltin {
                builtin: Builtin::SetPrototypeOf,
                args: vec![ctor.clone(), parent],
            });
            self.emit(InstKind::CallBuiltin {
                builtin: Builtin::SetPrototypeOf,
                args: vec![proto.clone(), parent_proto],
            });
        }

        for member in &class.body {
            let ClassMember::MethodDefinition(method) = member else { continue };
            if method.kind == MethodKind::Constructor {
                continue;
            }
            let saved = self.set_span(method.span);
            let target = if method.is_static { ctor.clone() } else { proto.clone() };
            let key = self.compile_class_key(&method.key, method.computed);
            let function = self.create_closure(&method.value);
            let define = match method.kind {
                MethodKind::Get => InstKind::DefineAccessor {
                    object: target,
                    key,
                    getter: Some(function),
                    setter: None,
                    enumerable: false,
                },
                MethodKind::Set => InstKind::DefineAccessor {
                    object: target,
                    key,
                    getter: None,
                    setter: Some(function),
                    enumerable: false,
                },
                MethodKind::Method | MethodKind::Constructor => InstKind::DefineOwn {
                    object: target,
                    key,
                    value: function,
                    enumerable: false,
                },
            };
            self.emit(define);
            self.set_span(saved);
        }

        if let (Some(idx), Some(fields)) = (class.instance_init, class.instance_init_binding) {
            self.m.compile_function(idx, Body::Fields { class, is_static: false });
            let init = self.closure_of(idx);
            self.init_decl(fields, init);
        }

        // The inner name is visible to static initializers.
        if let (Some(id), Some(scope)) = (&class.id, class.scope) {
            if let Some(decl) = self.model().scope(scope).lookup(&id.name) {
                self.init_decl(decl, ctor.clone());
            }
        }

        if let Some(idx) = class.static_init {
            self.m.compile_function(idx, Body::Fields { class, is_static: true });
            let init = self.closure_of(idx);
            self.emit(InstKind::Call {
                callee: init,
                this: ctor.clone(),
                args: Vec::new(),
            });
        }

        self.leave_scope(mark);
        self.set_span(saved);
        ctor
    }

    fn compile_class_key(&mut self, key: &'a Expression, computed: bool) -> Operand {
        match (computed, key.static_key()) {
            (false, Some(name)) => Operand::string(name),
            _ => self.compile_expression(key),
        }
    }

    /// Body of a field initializer: defines each field on `this` in order.
    pub(super) fn compile_field_definitions(&mut self, class: &'a Class, is_static: bool) {
        let this = self.receiver();
        for member in &class.body {
            let ClassMember::PropertyDefinition(field) = member else { continue };
            if field.is_static != is_static {
                continue;
            }
            let saved = self.set_span(field.span);
            let key = self.compile_class_key(&field.key, field.computed);
            let value = match &field.value {
                Some(value) => self.compile_expression(value),
                None => Operand::UNDEFINED,
            };
            self.emit(InstKind::DefineOwn {
                object: this.clone(),
                key,
                value,
                enumerable: true,
            });
            self.set_span(saved);
        }
    }
}
