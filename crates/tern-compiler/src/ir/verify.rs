// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structural consistency checks for the IR.
//!
//! A failure here is a compiler defect, never a user error.

use rustc_hash::FxHashSet;

use crate::error::InternalError;

use super::cfg::{DomTree, inst_positions};
use super::{BlockId, Function, InstKind, Module, Operand, ValueId};

/// Verifies every function of a module.
pub fn verify_module(module: &Module) -> Result<(), InternalError> {
    for f in module.functions.iter() {
        verify_function(f)?;
        for b in f.live_blocks() {
            for &v in &f.blocks[b].insts {
                let var = match &f.insts[v].kind {
                    InstKind::LoadLocal(var) | InstKind::StoreLocal { var, .. } => Some(*var),
                    InstKind::LoadEnv { var, .. } | InstKind::StoreEnv { var, .. } => Some(*var),
                    _ => None,
                };
                if let Some(var) = var {
                    if module.vars.get(var).is_none() {
                        return Err(InternalError::new(&f.name, format!("%{} references unknown variable {}", v.0, var.0)));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Verifies a single function.
pub fn verify_function(f: &Function) -> Result<(), InternalError> {
    let fail = |msg: String| Err(InternalError::new(&f.name, msg));

    if f.blocks[f.entry].deleted {
        return fail("entry block is deleted".to_string());
    }

    // Edges point at live blocks and predecessor lists agree with them.
    let mut expected: Vec<FxHashSet<BlockId>> = vec![FxHashSet::default(); f.blocks.len()];
    for b in f.live_blocks() {
        for s in f.successors(b) {
            if f.blocks.get(s).is_none_or(|blk| blk.deleted) {
                return fail(format!("bb{} branches to missing block bb{}", b.0, s.0));
            }
            expected[s.0 as usize].insert(b);
        }
        if let Some(h) = f.blocks[b].handler {
            let first = f.blocks[h].insts.first().map(|&v| &f.insts[v].kind);
            if !matches!(first, Some(InstKind::Catch)) {
                return fail(format!("handler bb{} of bb{} does not begin with Catch", h.0, b.0));
            }
        }
    }
    for b in f.live_blocks() {
        let actual: FxHashSet<BlockId> = f.blocks[b].preds.iter().copied().collect();
        if actual != expected[b.0 as usize] {
            return fail(format!("bb{} has stale predecessor list", b.0));
        }
    }

    // Instruction membership.
    let mut placed: FxHashSet<ValueId> = FxHashSet::default();
    for b in f.live_blocks() {
        let mut in_phis = true;
        for &v in &f.blocks[b].insts {
            if f.insts[v].block != b {
                return fail(format!("%{} is listed in bb{} but owned by bb{}", v.0, b.0, f.insts[v].block.0));
            }
            if !placed.insert(v) {
                return fail(format!("%{} appears twice", v.0));
            }
            let is_phi = matches!(f.insts[v].kind, InstKind::Phi { .. });
            if is_phi && !in_phis {
                return fail(format!("phi %{} follows a non-phi in bb{}", v.0, b.0));
            }
            in_phis &= is_phi;
            if matches!(f.insts[v].kind, InstKind::Catch) && f.blocks[b].insts.first() != Some(&v) {
                return fail(format!("Catch %{} is not first in bb{}", v.0, b.0));
            }
        }
    }

    let dom = DomTree::compute(f);
    let pos = inst_positions(f);
    let check_def = |def: ValueId| -> Result<(), InternalError> {
        if !placed.contains(&def) {
            return Err(InternalError::new(&f.name, format!("use of deleted value %{}", def.0)));
        }
        Ok(())
    };

    for b in f.live_blocks() {
        let reachable = dom.is_reachable(b);
        for &v in &f.blocks[b].insts {
            if let InstKind::Phi { incoming } = &f.insts[v].kind {
                let from: FxHashSet<BlockId> = incoming.iter().map(|(p, _)| *p).collect();
                if from.len() != incoming.len() || from != expected[b.0 as usize] {
                    return fail(format!("phi %{} incoming blocks differ from predecessors of bb{}", v.0, b.0));
                }
                for (p, op) in incoming {
                    if let Operand::Value(def) = op {
                        check_def(*def)?;
                        if reachable && dom.is_reachable(*p) && !dom.dominates(f.insts[*def].block, *p) {
                            return fail(format!("phi %{} operand %{} does not dominate bb{}", v.0, def.0, p.0));
                        }
                    }
                }
                continue;
            }
            let mut result = Ok(());
            f.insts[v].kind.visit_operands(|op| {
                if result.is_err() {
                    return;
                }
                if let Operand::Value(def) = op {
                    result = check_def(*def);
                    if result.is_ok() && reachable && !super::cfg::value_dominates(f, &dom, &pos, *def, v) {
                        result = Err(InternalError::new(
                            &f.name,
                            format!("%{} does not dominate its use in %{}", def.0, v.0),
                        ));
                    }
                }
            });
            result?;
        }
        if let Some(Operand::Value(def)) = f.blocks[b].term.operand() {
            check_def(*def)?;
            if reachable && !dom.dominates(f.insts[*def].block, b) {
                return fail(format!("%{} does not dominate the terminator of bb{}", def.0, b.0));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Literal, Terminator};
    use crate::sema::FunctionKind;

    #[test]
    fn test_well_formed_function_passes() {
        let mut f = Function::new("ok", FunctionKind::Normal);
        let entry = f.entry;
        let a = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::Return(Operand::Value(a));
        assert!(verify_function(&f).is_ok());
    }

    #[test]
    fn test_use_before_def_fails() {
        let mut f = Function::new("bad", FunctionKind::Normal);
        let entry = f.entry;
        let later = f.create_inst(entry, InstKind::LoadConst(Literal::Null), Default::default());
        let user = f.append(
            entry,
            InstKind::Unary {
                op: crate::ir::UnaryOp::Not,
                operand: Operand::Value(later),
                form: Default::default(),
            },
            Default::default(),
        );
        f.blocks[entry].insts.push(later);
        f.blocks[entry].term = Terminator::Return(Operand::Value(user));
        let err = verify_function(&f).unwrap_err();
        assert!(err.message.contains("does not dominate"));
    }

    #[test]
    fn test_stale_preds_fail() {
        let mut f = Function::new("stale", FunctionKind::Normal);
        let entry = f.entry;
        let next = f.add_block(None);
        f.blocks[entry].term = Terminator::Branch(next);
        f.blocks[next].term = Terminator::Return(Operand::UNDEFINED);
        assert!(verify_function(&f).is_err());
        f.recompute_preds();
        assert!(verify_function(&f).is_ok());
    }
}
