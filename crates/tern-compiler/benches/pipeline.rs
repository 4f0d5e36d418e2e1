// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Whole-pipeline compile throughput.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tern_compiler::ast::build::*;
use tern_compiler::ast::{Program, Statement, UpdateOperator};
use tern_compiler::{CompileOptions, OptimizationLevel, compile};

/// `count` small functions, each with a loop, a closure and a helper call.
fn generated(count: usize) -> Program {
    let mut body: Vec<Statement> = vec![function("helper", &["a", "b"], vec![ret(add(id("a"), mul(id("b"), num(2.0))))])];
    for k in 0..count {
        let name = format!("f{k}");
        body.push(function(
            &name,
            &["n"],
            vec![
                let_("total", Some(num(k as f64))),
                const_("fs", array(vec![])),
                for_let(
                    "i",
                    num(0.0),
                    lt(id("i"), id("n")),
                    update(UpdateOperator::Increment, false, id("i")),
                    vec![
                        expr(assign("total", call(id("helper"), vec![id("total"), id("i")]))),
                        expr(call(member(id("fs"), "push"), vec![arrow_expr(&[], id("i"))])),
                    ],
                ),
                ret(array(vec![id("total"), id("fs")])),
            ],
        ));
        body.push(expr(call(id(&name), vec![num(10.0)])));
    }
    program(body)
}

fn bench_levels(c: &mut Criterion) {
    let program = generated(50);
    let mut group = c.benchmark_group("compile");
    for (label, level) in [
        ("O0", OptimizationLevel::O0),
        ("O1", OptimizationLevel::O1),
        ("O2", OptimizationLevel::O2),
    ] {
        let options = CompileOptions {
            optimization_level: level,
            ..CompileOptions::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(label), &options, |b, options| {
            b.iter(|| {
                let mut program = program.clone();
                black_box(compile(&mut program, options.clone()).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let program = generated(200);
    let mut group = c.benchmark_group("functions");
    for parallel in [false, true] {
        let options = CompileOptions {
            parallel,
            ..CompileOptions::default()
        };
        let label = if parallel { "parallel" } else { "serial" };
        group.bench_with_input(BenchmarkId::new(label, 200), &options, |b, options| {
            b.iter(|| {
                let mut program = program.clone();
                black_box(compile(&mut program, options.clone()).unwrap().bytecode.code.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_levels, bench_parallel);
criterion_main!(benches);
