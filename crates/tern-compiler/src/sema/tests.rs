// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::*;
use crate::ast::build::*;
use crate::ast::{Expression, Program, Statement, VariableKind};

fn resolve_ok(mut program: Program) -> (Program, SemanticModel) {
    let model = resolve(&mut program, 20).expect("resolution should succeed");
    (program, model)
}

fn resolve_err(mut program: Program) -> Vec<String> {
    match resolve(&mut program, 20) {
        Ok(_) => panic!("expected an early error"),
        Err(diags) => diags.into_sorted().into_iter().map(|d| d.message).collect(),
    }
}

fn decl_named<'a>(model: &'a SemanticModel, name: &str) -> &'a Declaration {
    model
        .decls
        .iter()
        .find(|d| d.name == name)
        .unwrap_or_else(|| panic!("no declaration named {name}"))
}

fn nested_function(program: &Program, index: usize) -> &crate::ast::Function {
    match &program.body[index] {
        Statement::FunctionDeclaration(f) => f,
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn test_local_not_captured() {
    let (_, model) = resolve_ok(program(vec![function(
        "f",
        &["a"],
        vec![let_("x", Some(add(id("a"), num(1.0)))), ret(id("x"))],
    )]));
    let x = decl_named(&model, "x");
    assert!(!x.captured);
    assert!(!x.needs_tdz);
    assert!(model.functions.iter().all(|f| f.captured.is_empty()));
}

#[test]
fn test_closure_captures_variable() {
    // function f() { let x = 1; return () => x; }
    let (program, model) = resolve_ok(program(vec![function(
        "f",
        &[],
        vec![let_("x", Some(num(1.0))), ret(arrow_expr(&[], id("x")))],
    )]));
    let x = decl_named(&model, "x");
    assert!(x.captured);
    assert!(!x.written_by_closure);
    // Referenced from another function, so the guard stays.
    assert!(x.needs_tdz);

    let f = nested_function(&program, 0);
    let info = model.function(f.info.unwrap());
    assert_eq!(info.captured.len(), 1);
    assert!(model.is_materialized(info.scope));
}

#[test]
fn test_write_from_closure() {
    let (_, model) = resolve_ok(program(vec![function(
        "counter",
        &[],
        vec![
            let_("n", Some(num(0.0))),
            ret(arrow(&[], vec![expr(assign("n", add(id("n"), num(1.0))))])),
        ],
    )]));
    let n = decl_named(&model, "n");
    assert!(n.captured);
    assert!(n.reassigned);
    assert!(n.written_by_closure);
}

#[test]
fn test_use_before_declaration_needs_check() {
    // { x; let x = 1; }
    let (_, model) = resolve_ok(program(vec![block(vec![expr(id("x")), let_("x", Some(num(1.0)))])]));
    assert!(decl_named(&model, "x").needs_tdz);
}

#[test]
fn test_use_after_declaration_is_unguarded() {
    let (program, model) = resolve_ok(program(vec![let_("x", Some(num(1.0))), expr(id("x"))]));
    assert!(!decl_named(&model, "x").needs_tdz);
    let Statement::ExpressionStatement(s) = &program.body[1] else {
        unreachable!()
    };
    let Expression::Identifier(id) = &s.expression else {
        unreachable!()
    };
    assert!(id.binding.is_some());
    assert!(!id.tdz_check);
}

#[test]
fn test_unresolved_name_is_global() {
    let (program, _) = resolve_ok(program(vec![expr(call(id("print"), vec![num(1.0)]))]));
    let Statement::ExpressionStatement(s) = &program.body[0] else {
        unreachable!()
    };
    let Expression::CallExpression(c) = &s.expression else {
        unreachable!()
    };
    let Expression::Identifier(callee) = &*c.callee else {
        unreachable!()
    };
    assert_eq!(callee.binding, None);
}

#[test]
fn test_script_top_level_var_is_global() {
    let (_, model) = resolve_ok(script(vec![var("g", Some(num(1.0))), function("h", &[], vec![])]));
    assert!(decl_named(&model, "g").global);
    assert!(decl_named(&model, "h").global);
}

#[test]
fn test_module_top_level_var_is_local() {
    let (_, model) = resolve_ok(program(vec![var("g", Some(num(1.0)))]));
    assert!(!decl_named(&model, "g").global);
}

#[test]
fn test_generator_locals_are_captured() {
    let (_, model) = resolve_ok(program(vec![generator(
        "g",
        &["a"],
        vec![let_("x", Some(id("a"))), expr(yield_(id("x")))],
    )]));
    assert!(decl_named(&model, "a").captured);
    assert!(decl_named(&model, "x").captured);
}

#[test]
fn test_arguments_is_synthesized() {
    let (_, model) = resolve_ok(program(vec![function("f", &[], vec![ret(id("arguments"))])]));
    let f = model.functions.iter().find(|f| f.name == "f").unwrap();
    let decl = f.arguments_decl.expect("arguments binding");
    assert_eq!(model.decl(decl).kind, DeclKind::Synthetic);
}

#[test]
fn test_arrow_captures_this() {
    let (_, model) = resolve_ok(program(vec![function("f", &[], vec![ret(arrow_expr(&[], this()))])]));
    let f = model.functions.iter().find(|f| f.name == "f").unwrap();
    let this = f.this_decl.expect("this binding");
    assert!(model.decl(this).captured);
}

#[test]
fn test_default_constructor_inserted() {
    let (program, _) = resolve_ok(program(vec![
        class("A", None, vec![]),
        class("B", Some(id("A")), vec![method("m", &[], vec![])]),
    ]));
    for stmt in &program.body {
        let Statement::ClassDeclaration(class) = stmt else {
            unreachable!()
        };
        assert!(class.constructor().is_some());
    }
}

#[test]
fn test_derived_constructor_this_needs_check() {
    let (_, model) = resolve_ok(program(vec![
        class("A", None, vec![]),
        class(
            "B",
            Some(id("A")),
            vec![constructor(&[], vec![expr(call(super_(), vec![])), expr(this())])],
        ),
    ]));
    let ctor = model
        .functions
        .iter()
        .find(|f| f.kind == FunctionKind::Constructor { derived: true })
        .unwrap();
    assert!(model.decl(ctor.this_decl.unwrap()).needs_tdz);
}

#[test]
fn test_redeclaration_is_an_error() {
    let messages = resolve_err(program(vec![let_("x", None), let_("x", None)]));
    assert_eq!(messages, vec!["redeclaration of `x`".to_string()]);
}

#[test]
fn test_var_over_let_is_an_error() {
    let messages = resolve_err(program(vec![let_("x", None), block(vec![var("x", None)])]));
    assert!(messages[0].contains("redeclaration"));
}

#[test]
fn test_var_redeclaration_is_allowed() {
    resolve_ok(program(vec![var("x", None), var("x", Some(num(2.0)))]));
}

#[test]
fn test_break_outside_loop() {
    let messages = resolve_err(program(vec![break_()]));
    assert!(messages[0].contains("break"));
}

#[test]
fn test_continue_in_switch_is_an_error() {
    let messages = resolve_err(program(vec![switch(id("x"), vec![(None, vec![continue_()])])]));
    assert!(messages[0].contains("continue"));
}

#[test]
fn test_labeled_break() {
    resolve_ok(program(vec![labeled(
        "outer",
        while_(boolean(true), vec![while_(boolean(true), vec![break_label("outer")])]),
    )]));
    let messages = resolve_err(program(vec![while_(boolean(true), vec![break_label("missing")])]));
    assert!(messages[0].contains("undefined label"));
}

#[test]
fn test_return_at_top_level() {
    let messages = resolve_err(program(vec![ret(num(1.0))]));
    assert!(messages[0].contains("return"));
}

#[test]
fn test_super_call_outside_derived_constructor() {
    let messages = resolve_err(program(vec![class(
        "A",
        None,
        vec![constructor(&[], vec![expr(call(super_(), vec![]))])],
    )]));
    assert!(messages[0].contains("super()"));
}

#[test]
fn test_yield_outside_generator() {
    let messages = resolve_err(program(vec![function("f", &[], vec![expr(yield_(num(1.0)))])]));
    assert!(messages[0].contains("yield"));
}

#[test]
fn test_errors_are_limited() {
    let body = (0..30).map(|_| break_()).collect();
    let mut p = program(body);
    let diags = resolve(&mut p, 5).unwrap_err();
    assert_eq!(diags.len(), 5);
    assert_eq!(diags.error_count(), 30);
    assert!(diags.limit_reached());
}

#[test]
fn test_for_of_head_is_per_iteration_scope() {
    let (program, model) = resolve_ok(program(vec![for_of(
        VariableKind::Const,
        "v",
        array(vec![num(1.0)]),
        vec![expr(arrow_expr(&[], id("v")))],
    )]));
    let Statement::ForOfStatement(s) = &program.body[0] else {
        unreachable!()
    };
    let scope = s.scope.expect("loop scope");
    assert_eq!(model.scope(scope).kind, ScopeKind::Loop);
    assert!(model.is_materialized(scope));
}

#[test]
fn test_named_function_expression_binding() {
    let (program, model) = resolve_ok(program(vec![const_(
        "f",
        function_expr(Some("fact"), &["n"], vec![ret(call(id("fact"), vec![id("n")]))]),
    )]));
    let Statement::VariableDeclaration(decl) = &program.body[0] else {
        unreachable!()
    };
    let Some(Expression::FunctionExpression(f)) = &decl.declarations[0].init else {
        unreachable!()
    };
    let binding = f.self_binding.expect("self binding");
    assert!(model.decl(binding).immutable);
    assert_eq!(model.scope(model.decl(binding).scope).kind, ScopeKind::FunctionName);
}
