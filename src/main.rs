// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! tern - compiles an ESTree JSON syntax tree into a bytecode module.
//!
//! The output is the serialized module as JSON, or a listing with
//! `--disassemble`. Diagnostics go to stderr as `file:line:column: error:
//! message`; any fatal diagnostic makes the process exit non-zero.

mod cli;

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tern_compiler::ast::Program;
use tern_compiler::{Compilation, Diagnostic, Error, Pipeline, Severity};
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default = if cli.verbose { "tern=debug,tern_compiler=debug" } else { "tern=warn,tern_compiler=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Compiles `cli.input` and writes the result. Returns false if the
/// program had fatal diagnostics.
fn run(cli: &Cli) -> Result<bool> {
    let options = cli.compile_options()?;
    let text = std::fs::read_to_string(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    let mut program: Program =
        serde_json::from_str(&text).with_context(|| format!("parsing syntax tree {}", cli.input.display()))?;
    if program.file.is_empty() {
        program.file = cli.input.display().to_string();
    }

    let pipeline = Pipeline::new(options);
    let compilation = match pipeline.compile(&mut program) {
        Ok(compilation) => compilation,
        Err(Error::Semantic(_)) => {
            let color = std::io::stderr().is_terminal();
            for d in pipeline.context().take_diagnostics().into_sorted() {
                eprintln!("{}", render(&d, color));
            }
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    if cli.dump_ir {
        eprintln!("{}", compilation.ir);
    }
    write_output(cli, &compilation)?;
    Ok(true)
}

fn write_output(cli: &Cli, compilation: &Compilation) -> Result<()> {
    let text = if cli.disassemble {
        compilation.bytecode.disassemble()
    } else {
        serde_json::to_string_pretty(&compilation.bytecode).context("serializing bytecode module")?
    };
    match &cli.output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}").context("writing to stdout")
        }
    }
}

/// One diagnostic line, colored by severity.
fn render(d: &Diagnostic, color: bool) -> String {
    if !color {
        return d.to_string();
    }
    let severity = match d.severity {
        Severity::Error => d.severity.red().bold().to_string(),
        Severity::Warning => d.severity.yellow().bold().to_string(),
        Severity::Note => d.severity.cyan().to_string(),
    };
    format!(
        "{}: {}: {}",
        format!("{}:{}:{}", d.file, d.loc.line, d.loc.column).bold(),
        severity,
        d.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_PROGRAM: &str = r#"{
        "sourceType": "module",
        "file": "add.js",
        "body": [
            { "type": "VariableDeclaration", "kind": "let", "declarations": [
                { "id": { "type": "Identifier", "name": "x" },
                  "init": { "type": "BinaryExpression", "operator": "+",
                            "left": { "type": "Literal", "value": { "kind": "Number", "value": 1 } },
                            "right": { "type": "Identifier", "name": "y" } } }
            ] }
        ]
    }"#;

    const REDECLARED: &str = r#"{
        "sourceType": "module",
        "file": "dup.js",
        "body": [
            { "type": "VariableDeclaration", "kind": "let", "declarations": [
                { "id": { "type": "Identifier", "name": "x" } } ] },
            { "type": "VariableDeclaration", "kind": "let", "declarations": [
                { "id": { "type": "Identifier", "name": "x" } } ] }
        ]
    }"#;

    #[test]
    fn test_writes_json_module() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("add.json");
        let output = dir.path().join("add.tbc.json");
        std::fs::write(&input, ADD_PROGRAM).unwrap();

        let cli = Cli::parse_from(["tern", input.to_str().unwrap(), "-o", output.to_str().unwrap(), "--no-parallel"]);
        assert!(run(&cli).unwrap());

        let module: tern_compiler::BytecodeModule =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(module.file, "add.js");
        assert!(!module.code.is_empty());
        assert!(module.strings.iter().any(|s| s == "y"));
    }

    #[test]
    fn test_semantic_errors_fail() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dup.json");
        std::fs::write(&input, REDECLARED).unwrap();
        let cli = Cli::parse_from(["tern", input.to_str().unwrap(), "--no-parallel"]);
        assert!(!run(&cli).unwrap());
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        std::fs::write(&input, "{ not json").unwrap();
        let cli = Cli::parse_from(["tern", input.to_str().unwrap()]);
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_plain_render() {
        let d = Diagnostic::error("a.js", tern_compiler::ast::SourceLoc { line: 2, column: 3 }, "boom");
        assert_eq!(render(&d, false), "a.js:2:3: error: boom");
    }
}
