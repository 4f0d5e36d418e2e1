// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dead code elimination.

use rustc_hash::FxHashSet;

use crate::index::IndexVec;
use crate::ir::{BinaryOp, BlockId, Function, InstKind, Operand, ValueId, VarId};

use super::{FunctionPass, PassContext, remove_unreachable_blocks};

/// Removes unreachable blocks and instructions whose results are unused and
/// whose execution has no observable effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadCodeElimination;

impl FunctionPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run_on_function(&self, f: &mut Function, _cx: &PassContext<'_>) -> bool {
        let mut changed = remove_unreachable_blocks(f);
        let loaded: FxHashSet<VarId> = f
            .live_blocks()
            .flat_map(|b| f.blocks[b].insts.iter())
            .filter_map(|&v| match f.insts[v].kind {
                InstKind::LoadLocal(var) => Some(var),
                _ => None,
            })
            .collect();

        let mut live: IndexVec<ValueId, bool> = IndexVec::from_elem(false, f.insts.len());
        let mut work: Vec<ValueId> = Vec::new();
        let mark = |op: &Operand, live: &mut IndexVec<ValueId, bool>, work: &mut Vec<ValueId>| {
            if let Operand::Value(u) = op {
                if !live[*u] {
                    live[*u] = true;
                    work.push(*u);
                }
            }
        };

        let blocks: Vec<BlockId> = f.live_blocks().collect();
        for &b in &blocks {
            for &v in &f.blocks[b].insts {
                if !is_removable(f, v, &loaded) && !live[v] {
                    live[v] = true;
                    work.push(v);
                }
            }
            if let Some(op) = f.blocks[b].term.operand() {
                mark(op, &mut live, &mut work);
            }
        }
        while let Some(v) = work.pop() {
            f.insts[v].kind.visit_operands(|op| mark(op, &mut live, &mut work));
        }

        for &b in &blocks {
            let before = f.blocks[b].insts.len();
            f.blocks[b].insts.retain(|&v| live[v]);
            changed |= f.blocks[b].insts.len() != before;
        }
        changed
    }
}

/// True if dropping `v` cannot change behavior, provided nothing uses it.
fn is_removable(f: &Function, v: ValueId, loaded: &FxHashSet<VarId>) -> bool {
    let kind = &f.insts[v].kind;
    if kind.is_always_pure() {
        return true;
    }
    let quiet = |op: &Operand| {
        let ty = f.operand_type(op);
        ty.is_primitive() && !ty.may_be_bigint()
    };
    match kind {
        InstKind::StoreLocal { var, .. } => !loaded.contains(var),
        InstKind::Binary {
            op: BinaryOp::StrictEq | BinaryOp::StrictNe,
            ..
        } => true,
        InstKind::Binary {
            op: BinaryOp::In | BinaryOp::InstanceOf,
            ..
        } => false,
        InstKind::Binary { lhs, rhs, .. } => quiet(lhs) && quiet(rhs),
        InstKind::Unary { operand, .. } => quiet(operand),
        _ => false,
    }
}
