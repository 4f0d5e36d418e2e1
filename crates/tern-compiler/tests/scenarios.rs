// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end compilation scenarios.

mod common;

use common::*;
use rustc_hash::FxHashSet;
use tern_compiler::ast::build::*;
use tern_compiler::ast::{Statement, UpdateOperator, VariableKind};
use tern_compiler::bytecode::{OpCode, Operand as Bc};
use tern_compiler::ir::{BlockId, Function, InstKind, Operand, Terminator};
use tern_compiler::{OptimizationLevel, compile};

fn f_declaration() -> Statement {
    // function f(a, b) { return a + b * 2; }
    function("f", &["a", "b"], vec![ret(add(id("a"), mul(id("b"), num(2.0))))])
}

fn use_arg(f: &Function) -> Operand {
    let calls = calls_to(f, "use");
    assert_eq!(calls.len(), 1, "one call to use");
    match &f.insts[calls[0]].kind {
        InstKind::Call { args, .. } => args[0].clone(),
        _ => unreachable!(),
    }
}

#[test]
fn test_known_call_site_folds_completely() {
    let module = optimized(
        program(vec![f_declaration(), expr(call(id("use"), vec![call(id("f"), vec![num(3.0), num(4.0)])]))]),
        &options(OptimizationLevel::O2),
    );
    let main = entry(&module);
    assert_eq!(use_arg(main), Operand::number(11.0));
    assert_eq!(count(main, |k| matches!(k, InstKind::Binary { .. })), 0);

    let mut program = program(vec![f_declaration(), expr(call(id("use"), vec![call(id("f"), vec![num(3.0), num(4.0)])]))]);
    let out = compile(&mut program, options(OptimizationLevel::O2)).expect("compiles");
    let loads_11 = out.bytecode.functions[0]
        .instructions
        .iter()
        .any(|inst| inst.opcode == OpCode::LoadConstInt && inst.operands[1] == Bc::Int(11));
    assert!(loads_11);
}

#[test]
fn test_unknown_argument_keeps_the_addition() {
    let module = optimized(
        program(vec![f_declaration(), expr(call(id("use"), vec![call(id("f"), vec![id("x"), num(4.0)])]))]),
        &options(OptimizationLevel::O2),
    );
    let main = entry(&module);
    assert!(matches!(use_arg(main), Operand::Value(_)));
    let adds: Vec<_> = instructions(main)
        .into_iter()
        .filter_map(|v| match &main.insts[v].kind {
            InstKind::Binary { op, rhs, .. } if *op == tern_compiler::ir::BinaryOp::Add => Some(rhs.clone()),
            _ => None,
        })
        .collect();
    // `b * 2` folded, the addition did not.
    assert_eq!(adds, vec![Operand::number(8.0)]);
}

#[test]
fn test_without_inlining_the_call_stays() {
    let mut opts = options(OptimizationLevel::O2);
    opts.passes.inline = false;
    let module = optimized(
        program(vec![f_declaration(), expr(call(id("use"), vec![call(id("f"), vec![num(3.0), num(4.0)])]))]),
        &opts,
    );
    let main = entry(&module);
    assert!(matches!(use_arg(main), Operand::Value(_)));
    assert_eq!(count(main, |k| matches!(k, InstKind::Call { .. })), 2);
}

// ============================================================================
// Iterator close
// ============================================================================

/// `function g(xs) { for (const i of xs) { if (i === 0) break; use(i); } }`
fn for_of_program() -> tern_compiler::ast::Program {
    program(vec![function(
        "g",
        &["xs"],
        vec![for_of(
            VariableKind::Const,
            "i",
            id("xs"),
            vec![
                if_(strict_eq(id("i"), num(0.0)), vec![break_()], None),
                expr(call(id("use"), vec![id("i")])),
            ],
        )],
    )])
}

fn has(f: &Function, b: BlockId, pred: impl Fn(&InstKind) -> bool) -> bool {
    f.blocks[b].insts.iter().any(|&v| pred(&f.insts[v].kind))
}

/// Walks forward from `start`, stopping at blocks that close the iterator or
/// step it again, and fails if a function exit is reachable otherwise.
fn assert_exits_close(f: &Function, start: Vec<BlockId>) {
    let mut seen = FxHashSet::default();
    let mut work = start;
    while let Some(b) = work.pop() {
        if !seen.insert(b) {
            continue;
        }
        if has(f, b, |k| matches!(k, InstKind::IteratorClose { .. })) {
            continue;
        }
        if has(f, b, |k| matches!(k, InstKind::CallBuiltin { builtin: tern_compiler::ir::Builtin::EnsureObject, .. })) {
            continue;
        }
        assert!(
            !matches!(f.blocks[b].term, Terminator::Return(_) | Terminator::Throw(_)),
            "bb{} leaves the loop without closing the iterator",
            b.0
        );
        work.extend(f.successors(b));
    }
}

fn loop_body_blocks(f: &Function) -> Vec<BlockId> {
    f.live_blocks()
        .filter(|&b| {
            has(f, b, |k| matches!(k, InstKind::Binary { op: tern_compiler::ir::BinaryOp::StrictEq, .. }))
                || calls_to(f, "use").iter().any(|&c| f.insts[c].block == b)
        })
        .collect()
}

#[test]
fn test_every_loop_exit_closes_the_iterator() {
    for level in [OptimizationLevel::O0, OptimizationLevel::O2] {
        let opts = options(level);
        let built = build(for_of_program(), &opts);
        let opt = optimized(for_of_program(), &opts);
        for module in [&built, &opt] {
            let g = function_named(module, "g");
            let body = loop_body_blocks(g);
            assert!(!body.is_empty());
            // The call to `use` may throw into a closing handler.
            for &c in &calls_to(g, "use") {
                let handler = g.blocks[g.insts[c].block].handler.expect("body is protected");
                assert!(has(g, handler, |k| matches!(k, InstKind::IteratorClose { on_throw: true, .. })));
            }
            assert_exits_close(g, body);
        }
    }
}

// ============================================================================
// Per-iteration capture
// ============================================================================

fn in_cycle(f: &Function, b: BlockId) -> bool {
    let mut seen = FxHashSet::default();
    let mut work = f.successors(b);
    while let Some(x) = work.pop() {
        if x == b {
            return true;
        }
        if seen.insert(x) {
            work.extend(f.successors(x));
        }
    }
    false
}

#[test]
fn test_loop_closures_capture_fresh_bindings() {
    // function f() { const fs = []; for (let i = 0; i < 3; i++) { fs.push(() => i); } return fs; }
    let source = || {
        program(vec![function(
            "f",
            &[],
            vec![
                const_("fs", array(vec![])),
                for_let(
                    "i",
                    num(0.0),
                    lt(id("i"), num(3.0)),
                    update(UpdateOperator::Increment, false, id("i")),
                    vec![expr(call(member(id("fs"), "push"), vec![arrow_expr(&[], id("i"))]))],
                ),
                ret(id("fs")),
            ],
        )])
    };
    for level in [OptimizationLevel::O0, OptimizationLevel::O1, OptimizationLevel::O2] {
        let module = optimized(source(), &options(level));
        let f = function_named(&module, "f");
        let scopes_in_loop = instructions(f)
            .into_iter()
            .filter(|&v| matches!(f.insts[v].kind, InstKind::CreateScope { .. }) && in_cycle(f, f.insts[v].block))
            .count();
        assert!(scopes_in_loop >= 1, "a fresh environment per iteration at {level:?}");
        assert_eq!(count(f, |k| matches!(k, InstKind::CreateClosure { env: Some(_), .. })), 1);

        let arrow = module
            .functions
            .iter()
            .find(|g| g.kind == tern_compiler::sema::FunctionKind::Arrow)
            .expect("arrow");
        assert_eq!(count(arrow, |k| matches!(k, InstKind::LoadEnv { .. })), 1);
        assert!(!matches!(
            arrow.blocks[arrow.entry].term,
            Terminator::Return(Operand::Literal(_))
        ));
    }
}

// ============================================================================
// Large frames
// ============================================================================

#[test]
fn test_many_live_values_get_a_large_frame() {
    const N: usize = 300;
    let mut body: Vec<Statement> = (0..N)
        .map(|i| const_(&format!("v{i}"), add(id("a"), num(i as f64))))
        .collect();
    body.push(ret(array((0..N).map(|i| id(&format!("v{i}"))).collect())));
    let mut program = program(vec![function("big", &["a"], body)]);

    let out = compile(&mut program, options(OptimizationLevel::O2)).expect("compiles");
    let big = out
        .bytecode
        .functions
        .iter()
        .find(|f| out.bytecode.string(f.name) == Some("big"))
        .expect("function big");
    assert!(big.frame_size as usize >= N);

    let mut stored = 0;
    for inst in &big.instructions {
        for op in &inst.operands {
            if let Bc::Reg(r) = op {
                assert!(*r < big.frame_size, "{inst} uses a register outside the frame");
            }
        }
        if inst.opcode == OpCode::PutOwnByIndex {
            stored += 1;
        }
    }
    assert_eq!(stored, N);
    assert!(big.instructions.iter().any(|inst| inst.wide));
    assert!(big.offset as usize + big.length as usize <= out.bytecode.code.len());
}
