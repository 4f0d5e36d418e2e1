// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command line interface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tern_compiler::{CompileOptions, DebugInfoLevel, OptimizationLevel};

/// tern - optimizing bytecode compiler for JavaScript syntax trees
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// ESTree JSON syntax tree to compile
    pub input: PathBuf,

    /// Write output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Optimization level (0-2)
    #[arg(short = 'O', value_parser = parse_opt_level)]
    pub opt_level: Option<OptimizationLevel>,

    /// Debug info level (0-3)
    #[arg(short = 'g', value_parser = parse_debug_level)]
    pub debug_info: Option<DebugInfoLevel>,

    /// Disable inlining
    #[arg(long)]
    pub no_inline: bool,

    /// Always use the generic call encoding
    #[arg(long)]
    pub no_fixed_arity: bool,

    /// Never elide deferred-init checks through type inference
    #[arg(long)]
    pub strict_tdz: bool,

    /// Maximum number of errors to report (0 = unlimited)
    #[arg(long)]
    pub error_limit: Option<usize>,

    /// JSON file with compile options; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print a bytecode listing instead of JSON
    #[arg(short, long)]
    pub disassemble: bool,

    /// Print the optimized IR to stderr
    #[arg(long)]
    pub dump_ir: bool,

    /// Compile functions on a single thread
    #[arg(long)]
    pub no_parallel: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Builds compile options from the config file and flags.
    pub fn compile_options(&self) -> Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => load_config(path)?,
            None => CompileOptions::default(),
        };
        if let Some(level) = self.opt_level {
            options.optimization_level = level;
        }
        if let Some(level) = self.debug_info {
            options.debug_info = level;
        }
        if self.no_inline {
            options.passes.inline = false;
        }
        if self.no_fixed_arity {
            options.fixed_arity_calls = false;
        }
        if self.strict_tdz {
            options.passes.strict_tdz = true;
        }
        if let Some(limit) = self.error_limit {
            options.error_limit = limit;
        }
        if self.no_parallel {
            options.parallel = false;
        }
        Ok(options)
    }
}

fn load_config(path: &Path) -> Result<CompileOptions> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_opt_level(s: &str) -> Result<OptimizationLevel, String> {
    match s {
        "0" => Ok(OptimizationLevel::O0),
        "1" => Ok(OptimizationLevel::O1),
        "2" => Ok(OptimizationLevel::O2),
        other => Err(format!("unknown optimization level `{other}`; expected 0, 1 or 2")),
    }
}

fn parse_debug_level(s: &str) -> Result<DebugInfoLevel, String> {
    let level: u8 = s.parse().map_err(|_| format!("invalid debug level `{s}`"))?;
    DebugInfoLevel::try_from(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_level_flags() {
        let cli = Cli::parse_from(["tern", "in.json", "-O1", "-g3", "--no-inline"]);
        let options = cli.compile_options().unwrap();
        assert_eq!(options.optimization_level, OptimizationLevel::O1);
        assert_eq!(options.debug_info, DebugInfoLevel::Scopes);
        assert!(!options.passes.inline);
        assert!(options.fixed_arity_calls);
    }

    #[test]
    fn test_rejects_bad_levels() {
        assert!(Cli::try_parse_from(["tern", "in.json", "-O7"]).is_err());
        assert!(Cli::try_parse_from(["tern", "in.json", "-g4"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tern.json");
        std::fs::write(&path, r#"{ "optimization_level": "O0", "error_limit": 5, "passes": { "inline": false } }"#)
            .unwrap();
        let cli = Cli::parse_from(["tern", "in.json", "--config", path.to_str().unwrap(), "-O2"]);
        let options = cli.compile_options().unwrap();
        assert_eq!(options.optimization_level, OptimizationLevel::O2);
        assert_eq!(options.error_limit, 5);
        assert!(!options.passes.inline);
        assert!(options.passes.type_inference);
    }
}
