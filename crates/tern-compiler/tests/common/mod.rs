// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared helpers for the pipeline tests.

#![allow(dead_code)]

use rustc_hash::FxHashMap;
use tern_compiler::ast::Program;
use tern_compiler::ir::cfg::reverse_postorder;
use tern_compiler::ir::verify::verify_module;
use tern_compiler::ir::{Function, InstKind, Module, Operand, ValueId};
use tern_compiler::{CompileOptions, OptimizationLevel, Pipeline};

/// Options for deterministic single-threaded runs at `level`.
pub fn options(level: OptimizationLevel) -> CompileOptions {
    CompileOptions {
        optimization_level: level,
        parallel: false,
        verify_ir: true,
        ..CompileOptions::default()
    }
}

/// Resolves and builds IR without optimizing.
pub fn build(mut program: Program, options: &CompileOptions) -> Module {
    let pipeline = Pipeline::new(options.clone());
    let model = pipeline.resolve(&mut program).expect("resolves");
    let module = pipeline.build_ir(&program, &model).expect("builds IR");
    verify_module(&module).expect("built IR verifies");
    module
}

/// Resolves, builds and optimizes.
pub fn optimized(program: Program, options: &CompileOptions) -> Module {
    let mut module = build(program, options);
    Pipeline::new(options.clone()).optimize(&mut module).expect("optimizes");
    verify_module(&module).expect("optimized IR verifies");
    module
}

pub fn function_named<'a>(module: &'a Module, name: &str) -> &'a Function {
    module
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function named {name}"))
}

pub fn entry(module: &Module) -> &Function {
    &module.functions[module.entry]
}

/// Live instructions in layout order.
pub fn instructions(f: &Function) -> Vec<ValueId> {
    reverse_postorder(f)
        .into_iter()
        .flat_map(|b| f.blocks[b].insts.clone())
        .collect()
}

pub fn count(f: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    instructions(f).into_iter().filter(|&v| pred(&f.insts[v].kind)).count()
}

/// Values produced by `LoadGlobal`, by global name.
pub fn globals(f: &Function) -> FxHashMap<ValueId, String> {
    instructions(f)
        .into_iter()
        .filter_map(|v| match &f.insts[v].kind {
            InstKind::LoadGlobal { name, .. } => Some((v, name.clone())),
            _ => None,
        })
        .collect()
}

/// Calls whose callee is the global `name`.
pub fn calls_to(f: &Function, name: &str) -> Vec<ValueId> {
    let globals = globals(f);
    instructions(f)
        .into_iter()
        .filter(|&v| match &f.insts[v].kind {
            InstKind::Call {
                callee: Operand::Value(c),
                ..
            } => globals.get(c).is_some_and(|n| n == name),
            _ => false,
        })
        .collect()
}
