// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The optimizer.
//!
//! Passes communicate only through the IR. Function passes see one
//! [`Function`] at a time and may run on the rayon pool; module passes see
//! the whole [`Module`] because they move code or facts between functions.
//! The pipeline order is fixed per optimization level:
//!
//! | level | passes |
//! |-------|--------|
//! | O0 | none |
//! | O1 | mem2reg, folding, CFG simplification, DCE, guard dedup |
//! | O2 | mem2reg, inlining, folding, CFG simplification, DCE, type inference, guard dedup, capture narrowing, folding, CFG simplification, DCE |
//!
//! Every pass runs to its own fixpoint, so running it twice in a row
//! changes nothing the second time.

mod capture;
mod const_fold;
mod dce;
mod guard_dedup;
mod inline;
mod mem2reg;
mod simplify_cfg;
mod type_infer;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, debug_span, trace};

use crate::config::{CompileOptions, OptimizationLevel};
use crate::error::InternalError;
use crate::index::IndexVec;
use crate::ir::cfg::reachable;
use crate::ir::verify::verify_module;
use crate::ir::{BlockId, Function, InstKind, Module, Operand, ValueId, VarId, Variable};

pub use capture::CaptureNarrowing;
pub use const_fold::{ConstantFolding, fold_binary, fold_unary};
pub use dce::DeadCodeElimination;
pub use guard_dedup::GuardDedup;
pub use inline::Inlining;
pub use mem2reg::Mem2Reg;
pub use simplify_cfg::SimplifyCfg;
pub use type_infer::TypeInference;

/// Module-wide facts a function pass may read.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    /// Every variable of the module
    pub vars: &'a IndexVec<VarId, Variable>,
    /// Active options
    pub options: &'a CompileOptions,
}

/// A pass that transforms one function at a time.
pub trait FunctionPass: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the pass to its fixpoint. Returns true if `f` changed.
    fn run_on_function(&self, f: &mut Function, cx: &PassContext<'_>) -> bool;
}

/// A pass that needs to see every function.
pub trait ModulePass: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the pass to its fixpoint. Returns true if the module changed.
    fn run_on_module(&self, module: &mut Module, options: &CompileOptions) -> bool;
}

/// A pipeline entry.
pub enum Pass {
    /// Runs per function
    Function(Box<dyn FunctionPass>),
    /// Runs on the whole module
    Module(Box<dyn ModulePass>),
}

impl Pass {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Function(p) => p.name(),
            Pass::Module(p) => p.name(),
        }
    }

    /// Runs the pass once over `module`.
    pub fn run(&self, module: &mut Module, options: &CompileOptions) -> bool {
        match self {
            Pass::Function(p) => run_function_pass(p.as_ref(), module, options),
            Pass::Module(p) => p.run_on_module(module, options),
        }
    }
}

/// Whether each pass of a pipeline run changed anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationReport {
    /// `(pass, changed)` in execution order
    pub passes: Vec<(&'static str, bool)>,
}

impl OptimizationReport {
    /// True if any pass changed the module.
    pub fn changed(&self) -> bool {
        self.passes.iter().any(|(_, changed)| *changed)
    }
}

/// An ordered list of passes.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Pass>,
}

impl PassManager {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed pipeline for `options`.
    pub fn for_options(options: &CompileOptions) -> Self {
        let mut pm = Self::new();
        match options.optimization_level {
            OptimizationLevel::O0 => {}
            OptimizationLevel::O1 => {
                pm.add_function_pass(Mem2Reg);
                pm.add_function_pass(ConstantFolding);
                pm.add_function_pass(SimplifyCfg);
                pm.add_function_pass(DeadCodeElimination);
                pm.add_function_pass(GuardDedup);
            }
            OptimizationLevel::O2 => {
                pm.add_function_pass(Mem2Reg);
                if options.inlining_enabled() {
                    pm.add_module_pass(Inlining);
                }
                pm.add_function_pass(ConstantFolding);
                pm.add_function_pass(SimplifyCfg);
                pm.add_function_pass(DeadCodeElimination);
                if options.type_inference_enabled() {
                    pm.add_function_pass(TypeInference);
                }
                pm.add_function_pass(GuardDedup);
                if options.capture_narrowing_enabled() {
                    pm.add_module_pass(CaptureNarrowing);
                }
                pm.add_function_pass(ConstantFolding);
                pm.add_function_pass(SimplifyCfg);
                pm.add_function_pass(DeadCodeElimination);
            }
        }
        pm
    }

    /// Appends a function pass.
    pub fn add_function_pass(&mut self, pass: impl FunctionPass + 'static) {
        self.passes.push(Pass::Function(Box::new(pass)));
    }

    /// Appends a module pass.
    pub fn add_module_pass(&mut self, pass: impl ModulePass + 'static) {
        self.passes.push(Pass::Module(Box::new(pass)));
    }

    /// The passes in order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Runs every pass in order, verifying the IR after each one when
    /// `options.verify_ir` is set.
    pub fn run(&self, module: &mut Module, options: &CompileOptions) -> Result<OptimizationReport, InternalError> {
        let mut report = OptimizationReport::default();
        for pass in &self.passes {
            let name = pass.name();
            let _span = debug_span!("pass", pass = name).entered();
            let changed = pass.run(module, options);
            debug!(changed, instructions = module.instruction_count(), "pass finished");
            if options.verify_ir {
                verify_module(module).map_err(|err| {
                    InternalError::new(err.function, format!("after {name}: {}", err.message))
                })?;
            }
            report.passes.push((name, changed));
        }
        trace!("optimized IR:\n{}", module);
        Ok(report)
    }
}

/// Runs the optimizer pipeline selected by `options`.
pub fn optimize(module: &mut Module, options: &CompileOptions) -> Result<OptimizationReport, InternalError> {
    PassManager::for_options(options).run(module, options)
}

fn run_function_pass(pass: &dyn FunctionPass, module: &mut Module, options: &CompileOptions) -> bool {
    let Module { functions, vars, .. } = module;
    let cx = PassContext { vars, options };
    let run = |f: &mut Function| {
        let changed = pass.run_on_function(f, &cx);
        if changed {
            trace!(function = %f.name, pass = pass.name(), "changed");
        }
        changed
    };

    #[cfg(feature = "parallel")]
    if options.parallel {
        use rayon::prelude::*;
        return functions.raw.par_iter_mut().map(run).reduce(|| false, |a, b| a | b);
    }

    functions.iter_mut().map(run).fold(false, |a, b| a | b)
}

// ============================================================================
// Shared rewriting helpers
// ============================================================================

/// Deletes blocks unreachable from the entry and drops phi entries that
/// flowed in from them. Leaves predecessor lists current.
pub(crate) fn remove_unreachable_blocks(f: &mut Function) -> bool {
    let live = reachable(f);
    let dead: Vec<BlockId> = f.live_blocks().filter(|&b| !live[b]).collect();
    if dead.is_empty() {
        return false;
    }
    for &b in &dead {
        f.delete_block(b);
    }
    f.recompute_preds();
    prune_phis(f);
    true
}

/// Drops phi entries whose block is no longer a predecessor.
pub(crate) fn prune_phis(f: &mut Function) {
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        let preds: FxHashSet<BlockId> = f.blocks[b].preds.iter().copied().collect();
        let phis: Vec<ValueId> = f.phis(b).collect();
        for v in phis {
            if let InstKind::Phi { incoming } = &mut f.insts[v].kind {
                let mut seen = FxHashSet::default();
                incoming.retain(|(p, _)| preds.contains(p) && seen.insert(*p));
            }
        }
    }
}

/// Resolves chains in a replacement map: `a -> b, b -> c` becomes `a -> c`.
fn resolve<'m>(map: &'m FxHashMap<ValueId, Operand>, mut op: &'m Operand) -> &'m Operand {
    // Bounded by the map size, in case of a malformed cycle.
    for _ in 0..=map.len() {
        match op {
            Operand::Value(v) => match map.get(v) {
                Some(next) => op = next,
                None => break,
            },
            Operand::Literal(_) => break,
        }
    }
    op
}

/// Rewrites every operand of live instructions and terminators according
/// to `map`, then removes the replaced instructions.
pub(crate) fn apply_replacements(f: &mut Function, map: &FxHashMap<ValueId, Operand>) {
    if map.is_empty() {
        return;
    }
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for &b in &blocks {
        for i in 0..f.blocks[b].insts.len() {
            let v = f.blocks[b].insts[i];
            f.insts[v].kind.visit_operands_mut(|op| {
                if let Operand::Value(u) = op {
                    if map.contains_key(u) {
                        *op = resolve(map, op).clone();
                    }
                }
            });
        }
        if let Some(op) = f.blocks[b].term.operand_mut() {
            if let Operand::Value(u) = op {
                if map.contains_key(u) {
                    *op = resolve(map, op).clone();
                }
            }
        }
    }
    for &b in &blocks {
        f.blocks[b].insts.retain(|v| !map.contains_key(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, Terminator};
    use crate::sema::FunctionKind;

    #[test]
    fn test_pipeline_per_level() {
        let names = |level| {
            let options = CompileOptions {
                optimization_level: level,
                ..CompileOptions::default()
            };
            PassManager::for_options(&options).passes().iter().map(Pass::name).collect::<Vec<_>>()
        };
        assert!(names(OptimizationLevel::O0).is_empty());
        assert!(!names(OptimizationLevel::O1).contains(&"inline"));
        let o2 = names(OptimizationLevel::O2);
        assert_eq!(o2.first(), Some(&"mem2reg"));
        assert_eq!(o2.get(1), Some(&"inline"));
        assert_eq!(o2.last(), Some(&"dce"));
    }

    #[test]
    fn test_no_inline_flag_drops_pass() {
        let mut options = CompileOptions::default();
        options.passes.inline = false;
        let pm = PassManager::for_options(&options);
        assert!(pm.passes().iter().all(|p| p.name() != "inline"));
    }

    #[test]
    fn test_remove_unreachable_prunes_phis() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let dead = f.add_block(None);
        let join = f.add_block(None);
        f.blocks[entry].term = Terminator::Branch(join);
        f.blocks[dead].term = Terminator::Branch(join);
        let phi = f.append(
            join,
            InstKind::Phi {
                incoming: vec![(entry, Operand::number(1.0)), (dead, Operand::number(2.0))],
            },
            Default::default(),
        );
        f.blocks[join].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();

        assert!(remove_unreachable_blocks(&mut f));
        assert!(f.blocks[dead].deleted);
        match &f.insts[phi].kind {
            InstKind::Phi { incoming } => assert_eq!(incoming, &vec![(entry, Operand::Literal(Literal::Number(1.0)))]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!remove_unreachable_blocks(&mut f));
    }
}
