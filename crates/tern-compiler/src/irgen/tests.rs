// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::*;
use crate::ast::build::*;
use crate::ast::{UnaryOperator, UpdateOperator, VariableKind};
use crate::ir::verify::verify_module;
use crate::ir::{Builtin, Terminator};
use crate::sema::resolve;

fn lower(mut program: Program) -> Module {
    let model = resolve(&mut program, 20).expect("resolution should succeed");
    let module = build_module(&program, &model).expect("lowering should succeed");
    verify_module(&module).expect("lowered IR should verify");
    module
}

fn function_named<'a>(module: &'a Module, name: &str) -> &'a Function {
    module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function named {name}"))
}

fn count(f: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    f.live_blocks()
        .flat_map(|b| f.blocks[b].insts.iter())
        .filter(|&&v| pred(&f.insts[v].kind))
        .count()
}

#[test]
fn test_locals_use_frame_slots() {
    // function f(a) { let x = a + 1; return x; }
    let module = lower(program(vec![function(
        "f",
        &["a"],
        vec![let_("x", Some(add(id("a"), num(1.0)))), ret(id("x"))],
    )]));
    let f = function_named(&module, "f");
    assert_eq!(f.param_count, 1);
    assert_eq!(count(f, |k| matches!(k, InstKind::CreateScope { .. })), 0);
    assert!(count(f, |k| matches!(k, InstKind::StoreLocal { .. })) >= 1);
    assert!(module.scopes.is_empty());
}

#[test]
fn test_captured_binding_lives_in_environment() {
    // function f() { let x = 1; return () => x; }
    let module = lower(program(vec![function(
        "f",
        &[],
        vec![let_("x", Some(num(1.0))), ret(arrow_expr(&[], id("x")))],
    )]));
    let f = function_named(&module, "f");
    assert_eq!(count(f, |k| matches!(k, InstKind::CreateScope { .. })), 1);
    assert_eq!(count(f, |k| matches!(k, InstKind::CreateClosure { env: Some(_), .. })), 1);

    let arrow = module
        .functions
        .iter()
        .find(|g| g.kind == FunctionKind::Arrow)
        .expect("arrow function");
    assert!(arrow.env_scope.is_some());
    assert_eq!(count(arrow, |k| matches!(k, InstKind::GetParentScope)), 1);
    assert_eq!(count(arrow, |k| matches!(k, InstKind::LoadEnv { .. })), 1);

    let desc = module.scopes.values().next().expect("one environment");
    assert_eq!(desc.slots.len(), 1);
    assert_eq!(module.vars[desc.slots[0]].name, "x");
}

#[test]
fn test_loop_environment_is_copied_per_iteration() {
    // function f() { for (let i = 0; i < 3; i++) { g(() => i); } }
    let module = lower(program(vec![function(
        "f",
        &[],
        vec![for_let(
            "i",
            num(0.0),
            lt(id("i"), num(3.0)),
            update(UpdateOperator::Increment, false, id("i")),
            vec![expr(call(id("g"), vec![arrow_expr(&[], id("i"))]))],
        )],
    )]));
    let f = function_named(&module, "f");
    // Initial environment, the first copy, and the copy before each update.
    assert_eq!(count(f, |k| matches!(k, InstKind::CreateScope { .. })), 3);
}

#[test]
fn test_finally_runs_on_return_and_throw() {
    // function f() { try { return g(); } finally { h(); } }
    let module = lower(program(vec![function(
        "f",
        &[],
        vec![try_(
            vec![ret(call(id("g"), vec![]))],
            None,
            Some(vec![expr(call(id("h"), vec![]))]),
        )],
    )]));
    let f = function_named(&module, "f");
    let calls_h = count(f, |k| matches!(k, InstKind::LoadGlobal { name, .. } if name == "h"));
    assert_eq!(calls_h, 2);
    assert_eq!(count(f, |k| matches!(k, InstKind::Catch)), 1);
}

#[test]
fn test_for_of_closes_iterator_on_throw_and_break() {
    // function f(xs) { for (const x of xs) { if (x) break; g(x); } }
    let module = lower(program(vec![function(
        "f",
        &["xs"],
        vec![for_of(
            VariableKind::Const,
            "x",
            id("xs"),
            vec![
                if_(id("x"), vec![break_()], None),
                expr(call(id("g"), vec![id("x")])),
            ],
        )],
    )]));
    let f = function_named(&module, "f");
    assert_eq!(count(f, |k| matches!(k, InstKind::GetIterator { .. })), 1);
    assert_eq!(count(f, |k| matches!(k, InstKind::IteratorClose { on_throw: true, .. })), 1);
    assert_eq!(count(f, |k| matches!(k, InstKind::IteratorClose { on_throw: false, .. })), 1);
    let covered = f.live_blocks().filter(|&b| f.blocks[b].handler.is_some()).count();
    assert!(covered >= 1);
}

#[test]
fn test_constant_switch_uses_switch_terminator() {
    // function f(x) { switch (x) { case 1: return 10; case 2: return 20; default: return 0; } }
    let module = lower(program(vec![function(
        "f",
        &["x"],
        vec![switch(
            id("x"),
            vec![
                (Some(num(1.0)), vec![ret(num(10.0))]),
                (Some(num(2.0)), vec![ret(num(20.0))]),
                (None, vec![ret(num(0.0))]),
            ],
        )],
    )]));
    let f = function_named(&module, "f");
    let switches: Vec<_> = f
        .live_blocks()
        .filter_map(|b| match &f.blocks[b].term {
            Terminator::Switch { cases, .. } => Some(cases.len()),
            _ => None,
        })
        .collect();
    assert_eq!(switches, vec![2]);
}

#[test]
fn test_const_assignment_throws() {
    // function f() { const c = 1; c = 2; return c; }
    let module = lower(program(vec![function(
        "f",
        &[],
        vec![const_("c", num(1.0)), expr(assign("c", num(2.0))), ret(id("c"))],
    )]));
    let f = function_named(&module, "f");
    assert_eq!(
        count(f, |k| matches!(k, InstKind::CallBuiltin { builtin: Builtin::ThrowTypeError, .. })),
        1
    );
}

#[test]
fn test_typeof_undeclared_global_does_not_throw() {
    let module = lower(program(vec![expr(unary(UnaryOperator::TypeOf, id("missing")))]));
    let main = &module.functions[module.entry];
    assert_eq!(
        count(main, |k| matches!(k, InstKind::LoadGlobal { throw_if_missing: false, .. })),
        1
    );
}

#[test]
fn test_script_top_level_uses_globals() {
    // var x = 1; function f() { return x; }
    let module = lower(script(vec![var("x", Some(num(1.0))), function("f", &[], vec![ret(id("x"))])]));
    let main = &module.functions[module.entry];
    assert_eq!(count(main, |k| matches!(k, InstKind::DeclareGlobalVar { .. })), 2);
    assert!(count(main, |k| matches!(k, InstKind::StoreGlobal { name, .. } if name == "f")) == 1);
    let f = function_named(&module, "f");
    assert_eq!(count(f, |k| matches!(k, InstKind::LoadGlobal { .. })), 1);
}

#[test]
fn test_generator_becomes_state_machine() {
    // function* g(a) { let x = a; yield x; return x + 1; }
    let module = lower(program(vec![generator(
        "g",
        &["a"],
        vec![
            let_("x", Some(id("a"))),
            expr(yield_(id("x"))),
            ret(add(id("x"), num(1.0))),
        ],
    )]));
    let outer = function_named(&module, "g");
    assert_eq!(count(outer, |k| matches!(k, InstKind::CreateGenerator { .. })), 1);

    let inner = function_named(&module, "g$resume");
    assert!(inner.flags.resumable);
    assert_eq!(inner.param_count, 2);
    match &inner.blocks[inner.entry].term {
        Terminator::Switch { cases, .. } => assert_eq!(cases.len(), 2),
        other => panic!("expected a state dispatch, got {other}"),
    }
}

#[test]
fn test_async_function_is_spawned() {
    let module = lower(program(vec![async_function(
        "f",
        &["p"],
        vec![ret(await_(id("p")))],
    )]));
    let outer = function_named(&module, "f");
    assert_eq!(
        count(outer, |k| matches!(k, InstKind::CallBuiltin { builtin: Builtin::SpawnAsync, .. })),
        1
    );
    assert!(function_named(&module, "f$resume").flags.resumable);
}

#[test]
fn test_class_fields_run_from_base_constructor() {
    // class A { x = 1; m() { return this.x; } }
    let module = lower(program(vec![class(
        "A",
        None,
        vec![
            field("x", Some(num(1.0)), false),
            method("m", &[], vec![ret(member(this(), "x"))]),
        ],
    )]));
    let init = function_named(&module, "<instance_init>");
    assert_eq!(count(init, |k| matches!(k, InstKind::DefineOwn { enumerable: true, .. })), 1);

    let ctor = module
        .functions
        .iter()
        .find(|f| matches!(f.kind, FunctionKind::Constructor { .. }))
        .expect("constructor");
    assert_eq!(count(ctor, |k| matches!(k, InstKind::Call { .. })), 1);

    let main = &module.functions[module.entry];
    assert_eq!(count(main, |k| matches!(k, InstKind::DefineOwn { enumerable: false, .. })), 1);
}

#[test]
fn test_derived_constructor_binds_this_from_super() {
    // class B extends A { constructor() { super(); this.y; } }
    let module = lower(program(vec![
        class("A", None, vec![]),
        class(
            "B",
            Some(id("A")),
            vec![constructor(
                &[],
                vec![expr(call(super_(), vec![])), expr(member(this(), "y"))],
            )],
        ),
    ]));
    let ctor = module
        .functions
        .iter()
        .find(|f| f.kind == FunctionKind::Constructor { derived: true })
        .expect("derived constructor");
    assert_eq!(count(ctor, |k| matches!(k, InstKind::Construct { .. })), 1);
    assert!(count(ctor, |k| matches!(k, InstKind::ThrowIfEmpty { .. })) >= 1);
}
