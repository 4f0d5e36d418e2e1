// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Combines emitted functions into one module: a single literal pool, a
//! function table with the entry point first, and one code segment.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::bytecode::debug::{FunctionDebug, Location, ScopeDebug, encode_locations};
use crate::bytecode::{BytecodeModule, DebugInfo, FORMAT_VERSION, FunctionEntry, Operand};
use crate::config::DebugInfoLevel;
use crate::error::InternalError;
use crate::ir::FunctionId;
use crate::sema::SemanticModel;

use super::literals::LiteralPool;
use super::{BUILTINS, EmitContext, EmittedFunction, Layout, Origin};

/// A source scope as recorded in the debug scope table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalScope {
    /// Enclosing scope index
    pub parent: Option<u32>,
    /// Names declared directly in the scope
    pub names: Vec<String>,
}

impl LexicalScope {
    /// One entry per resolved scope, indexed like `ScopeId`.
    pub fn from_model(model: &SemanticModel) -> Vec<LexicalScope> {
        model
            .scopes
            .iter()
            .map(|scope| LexicalScope {
                parent: scope.parent.map(|p| p.0),
                names: scope.decls.iter().map(|&d| model.decls[d].name.clone()).collect(),
            })
            .collect()
    }
}

/// Links emitted functions into a module.
pub fn link(
    cx: &EmitContext<'_>,
    mut functions: Vec<EmittedFunction>,
    scopes: &[LexicalScope],
) -> Result<BytecodeModule, InternalError> {
    let entry = cx.module.entry;
    functions.sort_by_key(|f| (f.id != entry, f.id));
    let table: FxHashMap<FunctionId, u32> = functions.iter().enumerate().map(|(i, f)| (f.id, i as u32)).collect();

    let level = cx.options.debug_info;
    let mut pool = LiteralPool::default();
    let mut out = BytecodeModule {
        version: FORMAT_VERSION,
        file: cx.module.file.clone(),
        environments: cx.environments(),
        builtins: BUILTINS.iter().map(|b| b.name().to_string()).collect(),
        ..BytecodeModule::default()
    };
    let mut debug_functions = Vec::with_capacity(functions.len());

    for mut func in functions {
        let remap = pool.merge(&func.pool);
        for inst in &mut func.instructions {
            for op in &mut inst.operands {
                remap.apply(op);
                if let Operand::Function(id) = op {
                    *id = *table
                        .get(&FunctionId(*id))
                        .ok_or_else(|| InternalError::new(&func.name, format!("closure over missing function f{id}")))?;
                }
            }
            inst.wide = inst.needs_wide();
        }
        let layout = func.relax()?;

        let offset = u32::try_from(out.code.len())
            .map_err(|_| InternalError::new(&func.name, "code segment exceeds 4 GiB"))?;
        for inst in &func.instructions {
            inst.encode(&mut out.code);
        }
        let length = layout.offsets.last().copied().unwrap_or_default();

        if level != DebugInfoLevel::None {
            debug_functions.push(function_debug(&func, &layout, level));
        }
        out.functions.push(FunctionEntry {
            name: pool.string(&func.name),
            param_count: func.param_count,
            frame_size: func.frame_size,
            strict: func.strict,
            resumable: func.resumable,
            captured: func.captured,
            has_parent_env: func.has_parent_env,
            offset,
            length,
            exceptions: layout.exceptions,
            instructions: func.instructions,
        });
    }

    if level != DebugInfoLevel::None {
        let with_scopes = level == DebugInfoLevel::Scopes;
        let scopes = if with_scopes {
            scopes
                .iter()
                .map(|s| ScopeDebug {
                    parent: s.parent,
                    names: s.names.iter().map(|n| pool.string(n)).collect(),
                })
                .collect()
        } else {
            Vec::new()
        };
        out.debug = Some(DebugInfo {
            files: vec![cx.module.file.clone()],
            functions: debug_functions,
            scopes,
            has_scopes: with_scopes,
        });
    }

    out.strings = pool.strings().to_vec();
    out.bigints = pool.bigints().to_vec();
    out.regexps = pool.regexps().to_vec();
    out.object_keys = pool.key_buffers().to_vec();
    out.object_values = pool.value_buffers().to_vec();
    out.arrays = pool.array_buffers().to_vec();

    debug!(
        functions = out.functions.len(),
        code_bytes = out.code.len(),
        strings = out.strings.len(),
        "linked module"
    );
    Ok(out)
}

fn function_debug(func: &EmittedFunction, layout: &Layout, level: DebugInfoLevel) -> FunctionDebug {
    let with_scopes = level == DebugInfoLevel::Scopes;
    let start = (func.span.start.line, func.span.start.column);
    let keep = |o: &Origin| level != DebugInfoLevel::Throwing || o.throws;

    let mut locations: Vec<Location> = Vec::new();
    for (i, origin) in func.origins.iter().enumerate() {
        if !keep(origin) {
            continue;
        }
        let loc = Location {
            offset: layout.offsets[i],
            line: origin.span.start.line,
            column: origin.span.start.column,
            scope: if with_scopes { origin.scope.map_or(0, |s| s.0) } else { 0 },
        };
        // Only changes of position are recorded.
        if locations
            .last()
            .is_some_and(|prev| (prev.line, prev.column, prev.scope) == (loc.line, loc.column, loc.scope))
        {
            continue;
        }
        locations.push(loc);
    }

    FunctionDebug {
        file: 0,
        line: start.0,
        column: start.1,
        locations: encode_locations(&locations, start, with_scopes),
    }
}
