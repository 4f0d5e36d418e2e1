// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The staged compilation driver.
//!
//! ```text
//! resolve -> irgen -> optimize -> regalloc -> emit
//! ```
//!
//! Stages run strictly in order. A fatal diagnostic from resolution stops
//! the compilation before any IR exists; every later stage either succeeds
//! or reports a compiler defect. Allocation and emission work on one
//! function at a time and use the rayon pool when `parallel` is set.

use tracing::{debug, debug_span, info_span, trace};

use crate::ast::Program;
use crate::bytecode::BytecodeModule;
use crate::config::CompileOptions;
use crate::context::{CompilationContext, CompileStats};
use crate::emit::{LexicalScope, emit_module};
use crate::error::{Error, InternalError, Result};
use crate::index::IndexVec;
use crate::ir::verify::verify_module;
use crate::ir::{Function, FunctionId, Module};
use crate::irgen;
use crate::opt::{self, OptimizationReport};
use crate::regalloc::{Allocation, allocate};
use crate::sema::{self, SemanticModel};

/// Everything a successful compilation produces.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The serialized form
    pub bytecode: BytecodeModule,
    /// Optimized and lowered IR, as the emitter saw it
    pub ir: Module,
    /// Which passes changed the module
    pub report: OptimizationReport,
    /// Counters
    pub stats: CompileStats,
}

/// Runs the stages over a compilation context.
#[derive(Debug)]
pub struct Pipeline {
    cx: CompilationContext,
}

impl Pipeline {
    /// Creates a pipeline with a fresh context.
    pub fn new(options: CompileOptions) -> Self {
        Self {
            cx: CompilationContext::new(options),
        }
    }

    /// The shared context.
    pub fn context(&self) -> &CompilationContext {
        &self.cx
    }

    /// Runs every stage.
    pub fn compile(&self, program: &mut Program) -> Result<Compilation> {
        let _span = info_span!("compile", file = %program.file).entered();
        let model = self.resolve(program)?;
        let mut module = self.build_ir(program, &model)?;
        let report = self.optimize(&mut module)?;
        let allocations = self.allocate(&mut module)?;
        let bytecode = self.emit(&module, &allocations, &LexicalScope::from_model(&model))?;
        Ok(Compilation {
            bytecode,
            ir: module,
            report,
            stats: self.cx.stats(),
        })
    }

    /// Resolves scopes. Fatal diagnostics end the compilation.
    pub fn resolve(&self, program: &mut Program) -> Result<SemanticModel> {
        let _span = debug_span!("resolve").entered();
        match sema::resolve(program, self.cx.options().error_limit) {
            Ok(model) => {
                debug!(
                    scopes = model.scopes.len(),
                    declarations = model.decls.len(),
                    functions = model.functions.len(),
                    "resolved"
                );
                Ok(model)
            }
            Err(mut diagnostics) => {
                diagnostics.sort();
                debug!(errors = diagnostics.error_count(), "resolution failed");
                self.cx.report(diagnostics.clone());
                Err(Error::Semantic(diagnostics))
            }
        }
    }

    /// Builds the IR module.
    pub fn build_ir(&self, program: &Program, model: &SemanticModel) -> Result<Module> {
        let _span = debug_span!("irgen").entered();
        let module = irgen::build_module(program, model)?;
        if self.cx.options().verify_ir {
            verify_module(&module)?;
        }
        let count = module.instruction_count();
        self.cx.record(|s| {
            s.functions = module.functions.len();
            s.instructions_built = count;
        });
        trace!("built IR:\n{}", module);
        Ok(module)
    }

    /// Runs the optimizer pipeline for the configured level.
    pub fn optimize(&self, module: &mut Module) -> Result<OptimizationReport> {
        let _span = debug_span!("optimize").entered();
        let report = opt::optimize(module, self.cx.options())?;
        let count = module.instruction_count();
        self.cx.record(|s| {
            s.functions = module.functions.len();
            s.instructions_optimized = count;
            s.changed_passes = report
                .passes
                .iter()
                .filter(|(_, changed)| *changed)
                .map(|(name, _)| name.to_string())
                .collect();
        });
        Ok(report)
    }

    /// Assigns registers in every function.
    pub fn allocate(&self, module: &mut Module) -> Result<IndexVec<FunctionId, Allocation>> {
        let _span = debug_span!("regalloc").entered();
        let options = self.cx.options();
        let run = |f: &mut Function| {
            let _span = debug_span!("function", function = %f.name).entered();
            let alloc = allocate(f, options)?;
            debug!(frame = alloc.frame_size(), "allocated");
            Ok::<_, InternalError>(alloc)
        };

        #[cfg(feature = "parallel")]
        let allocations: std::result::Result<Vec<Allocation>, InternalError> = if options.parallel {
            use rayon::prelude::*;
            module.functions.raw.par_iter_mut().map(run).collect()
        } else {
            module.functions.iter_mut().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let allocations: std::result::Result<Vec<Allocation>, InternalError> =
            module.functions.iter_mut().map(run).collect();

        let allocations = IndexVec::from_raw(allocations?);
        let max_frame = allocations.iter().map(Allocation::frame_size).max().unwrap_or_default();
        self.cx.record(|s| s.max_frame_size = max_frame);
        Ok(allocations)
    }

    /// Emits and links the bytecode module.
    pub fn emit(
        &self,
        module: &Module,
        allocations: &IndexVec<FunctionId, Allocation>,
        scopes: &[LexicalScope],
    ) -> Result<BytecodeModule> {
        let _span = debug_span!("emit").entered();
        let bytecode = emit_module(module, allocations, self.cx.options(), scopes)?;
        self.cx.record(|s| s.code_bytes = bytecode.code.len());
        Ok(bytecode)
    }
}

/// Compiles a program with `options`.
pub fn compile(program: &mut Program, options: CompileOptions) -> Result<Compilation> {
    Pipeline::new(options).compile(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::config::OptimizationLevel;

    #[test]
    fn test_semantic_errors_stop_before_irgen() {
        let mut program = program(vec![let_("x", None), let_("x", None)]);
        let pipeline = Pipeline::new(CompileOptions::default());
        let err = pipeline.compile(&mut program).expect_err("redeclaration is fatal");
        assert!(matches!(err, Error::Semantic(_)));
        assert!(pipeline.context().has_errors());
        assert_eq!(pipeline.context().stats().functions, 0);
    }

    #[test]
    fn test_stats_cover_every_stage() {
        let mut program = program(vec![
            function("f", &["a"], vec![ret(add(id("a"), num(1.0)))]),
            expr(call(id("f"), vec![num(2.0)])),
        ]);
        let out = compile(
            &mut program,
            CompileOptions {
                optimization_level: OptimizationLevel::O1,
                ..CompileOptions::default()
            },
        )
        .expect("compiles");
        assert_eq!(out.stats.functions, 2);
        assert!(out.stats.instructions_built > 0);
        assert_eq!(out.stats.code_bytes, out.bytecode.code.len());
        assert_eq!(out.bytecode.functions.len(), 2);
        assert!(out.stats.max_frame_size > 0);
    }
}
