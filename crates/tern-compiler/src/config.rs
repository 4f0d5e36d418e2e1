// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compilation options.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How aggressively to optimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum OptimizationLevel {
    /// Mandatory lowering only
    O0,
    /// Folding, dead code and CFG cleanup, guard dedup
    O1,
    /// Everything, including inlining and type inference
    #[default]
    O2,
}

/// How much debug information to retain (`-g0` to `-g3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DebugInfoLevel {
    /// No debug section
    #[default]
    None,
    /// Locations of instructions that can throw
    Throwing,
    /// Locations of every instruction
    Full,
    /// Locations plus lexical scope tables
    Scopes,
}

impl TryFrom<u8> for DebugInfoLevel {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::None),
            1 => Ok(Self::Throwing),
            2 => Ok(Self::Full),
            3 => Ok(Self::Scopes),
            other => Err(format!("debug info level must be 0-3, got {other}")),
        }
    }
}

impl From<DebugInfoLevel> for u8 {
    fn from(level: DebugInfoLevel) -> u8 {
        level as u8
    }
}

/// Per-pass feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassFlags {
    /// Inline small known callees
    pub inline: bool,
    /// Run type inference and numeric specialization
    pub type_inference: bool,
    /// Never elide deferred-init guards through type inference
    pub strict_tdz: bool,
    /// Deduplicate loads and narrow environment slots of captured variables
    pub capture_narrowing: bool,
}

impl Default for PassFlags {
    fn default() -> Self {
        Self {
            inline: true,
            type_inference: true,
            strict_tdz: false,
            capture_narrowing: true,
        }
    }
}

/// Options consumed by every stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Optimization level
    pub optimization_level: OptimizationLevel,
    /// Debug info level
    pub debug_info: DebugInfoLevel,
    /// Individual pass switches
    pub passes: PassFlags,
    /// Prefer `Call1`..`Call4` encodings for small calls
    pub fixed_arity_calls: bool,
    /// Relabel registers by use count after allocation
    pub renumber_registers: bool,
    /// Maximum number of errors stored; zero means unlimited
    pub error_limit: usize,
    /// Run the IR verifier after every stage and pass
    pub verify_ir: bool,
    /// Process functions on the rayon pool
    pub parallel: bool,
    /// Inlining heuristics
    #[serde(skip)]
    pub inline_policy: Arc<dyn InlinePolicy>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::default(),
            debug_info: DebugInfoLevel::default(),
            passes: PassFlags::default(),
            fixed_arity_calls: true,
            renumber_registers: true,
            error_limit: 20,
            verify_ir: cfg!(debug_assertions),
            parallel: true,
            inline_policy: Arc::new(SizeThresholdPolicy::default()),
        }
    }
}

impl CompileOptions {
    /// Options for an unoptimized build.
    pub fn unoptimized() -> Self {
        Self {
            optimization_level: OptimizationLevel::O0,
            ..Self::default()
        }
    }

    /// True if inlining runs at this level.
    pub fn inlining_enabled(&self) -> bool {
        self.optimization_level >= OptimizationLevel::O2 && self.passes.inline
    }

    /// True if type inference runs at this level.
    pub fn type_inference_enabled(&self) -> bool {
        self.optimization_level >= OptimizationLevel::O2 && self.passes.type_inference
    }

    /// True if capture narrowing runs at this level.
    pub fn capture_narrowing_enabled(&self) -> bool {
        self.optimization_level >= OptimizationLevel::O2 && self.passes.capture_narrowing
    }
}

/// What the inliner knows about a candidate call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCandidate {
    /// Name of the calling function
    pub caller: String,
    /// Name of the callee
    pub callee: String,
    /// Instructions in the callee body
    pub callee_instructions: usize,
    /// Inlines already performed into this caller
    pub inlined_into_caller: usize,
    /// Nesting depth of inlined bodies at this site
    pub depth: usize,
}

/// Decides whether a safe call site is worth inlining.
pub trait InlinePolicy: fmt::Debug + Send + Sync {
    /// Returns true to inline `candidate`.
    fn should_inline(&self, candidate: &InlineCandidate) -> bool;
}

/// Inlines callees below a size threshold, with per-caller and depth limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeThresholdPolicy {
    /// Largest callee body, in instructions
    pub max_callee_instructions: usize,
    /// Inlines allowed per caller
    pub max_inlines_per_caller: usize,
    /// Maximum nesting of inlined bodies
    pub max_depth: usize,
}

impl Default for SizeThresholdPolicy {
    fn default() -> Self {
        Self {
            max_callee_instructions: 24,
            max_inlines_per_caller: 8,
            max_depth: 2,
        }
    }
}

impl InlinePolicy for SizeThresholdPolicy {
    fn should_inline(&self, candidate: &InlineCandidate) -> bool {
        candidate.callee_instructions <= self.max_callee_instructions
            && candidate.inlined_into_caller < self.max_inlines_per_caller
            && candidate.depth < self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: CompileOptions =
            serde_json::from_str(r#"{ "optimization_level": "O1", "debug_info": 3 }"#).unwrap();
        assert_eq!(opts.optimization_level, OptimizationLevel::O1);
        assert_eq!(opts.debug_info, DebugInfoLevel::Scopes);
        assert!(opts.fixed_arity_calls);
        assert!(!opts.inlining_enabled());
    }

    #[test]
    fn test_debug_level_out_of_range() {
        let err = serde_json::from_str::<CompileOptions>(r#"{ "debug_info": 4 }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_size_policy() {
        let policy = SizeThresholdPolicy::default();
        let mut candidate = InlineCandidate {
            caller: "main".into(),
            callee: "f".into(),
            callee_instructions: 10,
            inlined_into_caller: 0,
            depth: 0,
        };
        assert!(policy.should_inline(&candidate));
        candidate.callee_instructions = 100;
        assert!(!policy.should_inline(&candidate));
    }
}
