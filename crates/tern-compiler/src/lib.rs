// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # tern-compiler
//!
//! The middle and back end of an optimizing compiler for a closure-based
//! scripting language. It turns an ESTree-shaped syntax tree into a compact
//! register-based bytecode module.
//!
//! ## Overview
//!
//! - [`sema`] builds the scope tree and marks captured bindings
//! - [`irgen`] lowers the tree into one control-flow graph per function
//! - [`opt`] rewrites the graphs with a fixed pipeline of passes
//! - [`regalloc`] computes live ranges and assigns registers
//! - [`emit`] selects opcodes, pools literals and links the module
//!
//! ## Quick Start
//!
//! ```rust
//! use tern_compiler::ast::build::*;
//! use tern_compiler::{CompileOptions, compile};
//!
//! let mut program = program(vec![
//!     function("f", &["a", "b"], vec![ret(add(id("a"), mul(id("b"), num(2.0))))]),
//!     expr(call(id("f"), vec![num(3.0), num(4.0)])),
//! ]);
//! let output = compile(&mut program, CompileOptions::default()).unwrap();
//! println!("{}", output.bytecode.disassemble());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod bytecode;
pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod index;
pub mod ir;
pub mod irgen;
pub mod opt;
pub mod pipeline;
pub mod regalloc;
pub mod sema;

// Re-exports for convenience
pub use bytecode::BytecodeModule;
pub use config::{CompileOptions, DebugInfoLevel, InlinePolicy, OptimizationLevel, PassFlags, SizeThresholdPolicy};
pub use context::{CompilationContext, CompileStats};
pub use error::{Diagnostic, Diagnostics, Error, InternalError, Result, Severity};
pub use pipeline::{Compilation, Pipeline, compile};
