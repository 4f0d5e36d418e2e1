// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Narrowing of captured bindings.
//!
//! Two facts are derived from the whole module:
//!
//! - A binding written only by its owning function cannot change under a
//!   reader between two reads with no write in between, so repeated loads in
//!   a block collapse into one.
//! - A binding whose stores are all primitives is marked `primitive`; its
//!   slot can be written without a GC barrier.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::CompileOptions;
use crate::index::IndexVec;
use crate::ir::{Function, FunctionId, InstKind, Module, Operand, ValueId, VarId};

use super::{ModulePass, apply_replacements};

/// Deduplicates environment loads and marks primitive-only slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureNarrowing;

impl ModulePass for CaptureNarrowing {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn run_on_module(&self, module: &mut Module, _options: &CompileOptions) -> bool {
        let writers = writers(module);
        let mut changed = dedup_loads(module, &writers);
        changed |= narrow_primitive_slots(module);
        changed
    }
}

/// Functions that store to each captured variable.
fn writers(module: &Module) -> FxHashMap<VarId, FxHashSet<FunctionId>> {
    let mut out: FxHashMap<VarId, FxHashSet<FunctionId>> = FxHashMap::default();
    for (id, f) in module.functions.iter_enumerated() {
        for b in f.live_blocks() {
            for &v in &f.blocks[b].insts {
                if let InstKind::StoreEnv { var, .. } = &f.insts[v].kind {
                    out.entry(*var).or_default().insert(id);
                }
            }
        }
    }
    out
}

fn dedup_loads(module: &mut Module, writers: &FxHashMap<VarId, FxHashSet<FunctionId>>) -> bool {
    let Module { functions, vars, .. } = module;
    let stable = |var: VarId| {
        let owner = vars[var].function;
        if functions[owner].flags.resumable {
            return false;
        }
        writers.get(&var).is_none_or(|w| w.iter().all(|&f| f == owner))
    };
    let stable: IndexVec<VarId, bool> = vars.indices().map(stable).collect();

    let mut changed = false;
    for f in functions.iter_mut() {
        let mut replacements: FxHashMap<ValueId, Operand> = FxHashMap::default();
        for b in f.live_blocks() {
            let mut available: FxHashMap<(ValueId, VarId), ValueId> = FxHashMap::default();
            for &v in &f.blocks[b].insts {
                match &f.insts[v].kind {
                    InstKind::LoadEnv {
                        env: Operand::Value(env),
                        var,
                    } if stable[*var] => match available.get(&(*env, *var)) {
                        Some(&first) => {
                            replacements.insert(v, Operand::Value(first));
                        }
                        None => {
                            available.insert((*env, *var), v);
                        }
                    },
                    InstKind::StoreEnv { var, .. } => available.retain(|(_, w), _| w != var),
                    _ => {}
                }
            }
        }
        if !replacements.is_empty() {
            apply_replacements(f, &replacements);
            changed = true;
        }
    }
    changed
}

/// Optimistic fixpoint: every captured slot starts out primitive and loses
/// the mark when some store may put an object in it.
fn narrow_primitive_slots(module: &mut Module) -> bool {
    let mut candidate: IndexVec<VarId, bool> = module.vars.iter().map(|v| v.captured).collect();
    loop {
        let mut demoted = false;
        for f in module.functions.iter() {
            for b in f.live_blocks() {
                for &v in &f.blocks[b].insts {
                    let InstKind::StoreEnv { var, value, .. } = &f.insts[v].kind else {
                        continue;
                    };
                    if !candidate[*var] {
                        continue;
                    }
                    if !primitive_source(f, value, &candidate) {
                        candidate[*var] = false;
                        demoted = true;
                    }
                }
            }
        }
        if !demoted {
            break;
        }
    }

    let mut changed = false;
    for id in module.vars.indices() {
        let var = &mut module.vars[id];
        if var.primitive != candidate[id] {
            var.primitive = candidate[id];
            changed = true;
        }
    }
    changed
}

/// True if a stored value is a primitive, the dead-zone marker, or a copy
/// of another slot that is still considered primitive.
fn primitive_source(f: &Function, value: &Operand, candidate: &IndexVec<VarId, bool>) -> bool {
    let Operand::Value(u) = value else {
        // Literals are primitives or `empty`.
        return true;
    };
    let inst = &f.insts[*u];
    match &inst.kind {
        InstKind::LoadConst(_) => true,
        InstKind::LoadEnv { var, .. } => candidate[*var],
        InstKind::ThrowIfEmpty { value, .. } => primitive_source(f, value, candidate),
        _ => inst.ty.is_primitive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::ast::build::*;
    use crate::sema::FunctionKind;

    fn lower(mut program: Program) -> Module {
        let model = crate::sema::resolve(&mut program, 0).expect("resolves");
        crate::irgen::build_module(&program, &model).expect("builds IR")
    }

    fn env_loads(f: &Function) -> usize {
        f.live_blocks()
            .flat_map(|b| f.blocks[b].insts.iter())
            .filter(|&&v| matches!(f.insts[v].kind, InstKind::LoadEnv { .. }))
            .count()
    }

    fn writes_env(f: &Function) -> bool {
        f.live_blocks()
            .flat_map(|b| f.blocks[b].insts.iter())
            .any(|&v| matches!(f.insts[v].kind, InstKind::StoreEnv { .. }))
    }

    /// The arrow that only reads `x`.
    fn reader(module: &Module) -> FunctionId {
        module
            .functions
            .iter_enumerated()
            .find(|(_, f)| f.kind == FunctionKind::Arrow && !writes_env(f))
            .map(|(id, _)| id)
            .expect("reading arrow")
    }

    fn var(module: &Module, name: &str) -> VarId {
        module.vars.iter_enumerated().find(|(_, v)| v.name == name).map(|(id, _)| id).expect("variable")
    }

    #[test]
    fn test_repeated_reads_of_owner_written_binding_collapse() {
        // function f() { let x = 1; const g = () => x + x; return g; }
        let mut module = lower(program(vec![function(
            "f",
            &[],
            vec![
                let_("x", Some(num(1.0))),
                const_("g", arrow_expr(&[], add(id("x"), id("x")))),
                ret(id("g")),
            ],
        )]));
        let g = reader(&module);
        assert_eq!(env_loads(&module.functions[g]), 2);

        assert!(CaptureNarrowing.run_on_module(&mut module, &CompileOptions::default()));
        assert_eq!(env_loads(&module.functions[g]), 1);
        assert!(!CaptureNarrowing.run_on_module(&mut module, &CompileOptions::default()));
    }

    #[test]
    fn test_binding_written_by_a_closure_is_reloaded() {
        // function f() { let x = 1; const g = () => x + x; const h = () => { x = 5; }; return [g, h]; }
        let mut module = lower(program(vec![function(
            "f",
            &[],
            vec![
                let_("x", Some(num(1.0))),
                const_("g", arrow_expr(&[], add(id("x"), id("x")))),
                const_("h", arrow(&[], vec![expr(assign("x", num(5.0)))])),
                ret(array(vec![id("g"), id("h")])),
            ],
        )]));
        CaptureNarrowing.run_on_module(&mut module, &CompileOptions::default());
        assert_eq!(env_loads(&module.functions[reader(&module)]), 2);
    }

    #[test]
    fn test_primitive_slots_are_marked() {
        // function f() { let x = 1; let o = {}; return () => [x, o]; }
        let mut module = lower(program(vec![function(
            "f",
            &[],
            vec![
                let_("x", Some(num(1.0))),
                let_("o", Some(object(vec![]))),
                ret(arrow_expr(&[], array(vec![id("x"), id("o")]))),
            ],
        )]));
        let (x, o) = (var(&module, "x"), var(&module, "o"));
        assert!(module.vars[x].captured && module.vars[o].captured);

        CaptureNarrowing.run_on_module(&mut module, &CompileOptions::default());
        assert!(module.vars[x].primitive);
        assert!(!module.vars[o].primitive);
    }
}
