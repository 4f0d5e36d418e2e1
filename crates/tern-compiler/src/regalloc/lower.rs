// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mandatory lowering before register allocation.
//!
//! After this runs every block is reachable, sparse `Switch`es are compare
//! chains, no edge into a phi block leaves a multi-way branch, and the only
//! literal operands left are the ones the emitter encodes inline.

use rustc_hash::FxHashMap;

use crate::ir::cfg::split_critical_edges;
use crate::ir::{BinaryOp, BlockId, Function, InstKind, Literal, NumericForm, Operand, Terminator, Type, ValueId};
use crate::opt::{apply_replacements, remove_unreachable_blocks};

/// Fewest cases worth a jump table.
pub const MIN_TABLE_CASES: usize = 4;

/// Widest case range a jump table may cover.
pub const MAX_TABLE_SPAN: i64 = 256;

/// Runs every lowering step on `f`.
pub fn lower_for_allocation(f: &mut Function) {
    remove_unreachable_blocks(f);
    lower_switches(f);
    f.recompute_preds();
    fold_single_input_phis(f);
    split_critical_edges(f);
    materialize_literals(f);
}

/// The `(min, max)` of a switch's cases when they are distinct int32 values
/// dense enough for a jump table.
pub fn dense_table(cases: &[(Literal, BlockId)]) -> Option<(i32, i32)> {
    if cases.len() < MIN_TABLE_CASES {
        return None;
    }
    let mut keys = Vec::with_capacity(cases.len());
    for (lit, _) in cases {
        keys.push(lit.as_int32()?);
    }
    keys.sort_unstable();
    if keys.windows(2).any(|w| w[0] == w[1]) {
        return None;
    }
    let (min, max) = (keys[0], keys[keys.len() - 1]);
    let span = i64::from(max) - i64::from(min) + 1;
    (span <= MAX_TABLE_SPAN && span <= 2 * cases.len() as i64).then_some((min, max))
}

// ============================================================================
// Switches
// ============================================================================

fn lower_switches(f: &mut Function) {
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        let Terminator::Switch { value, cases, default } = &f.blocks[b].term else {
            continue;
        };
        if dense_table(cases).is_some() {
            continue;
        }
        let (value, cases, default) = (value.clone(), cases.clone(), *default);
        let handler = f.blocks[b].handler;
        let span = f.blocks[b].term_span;

        // Phi inputs each target received from `b`; re-attached per new edge.
        let mut targets: Vec<BlockId> = cases.iter().map(|(_, t)| *t).chain([default]).collect();
        targets.sort();
        targets.dedup();
        let mut carried: FxHashMap<BlockId, Vec<(ValueId, Operand)>> = FxHashMap::default();
        for &t in &targets {
            carried.insert(t, phi_inputs(f, t, b));
            f.remove_phi_incoming(t, b);
        }

        let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
        if cases.is_empty() {
            f.blocks[b].term = Terminator::Branch(default);
            edges.push((b, default));
        }
        let mut cur = b;
        for (i, (lit, target)) in cases.iter().enumerate() {
            let cmp = f.append(
                cur,
                InstKind::Binary {
                    op: BinaryOp::StrictEq,
                    lhs: value.clone(),
                    rhs: Operand::Literal(lit.clone()),
                    form: NumericForm::Generic,
                },
                span,
            );
            f.insts[cmp].ty = Type::BOOLEAN;
            let next = if i + 1 == cases.len() { default } else { f.add_block(handler) };
            f.blocks[cur].term = Terminator::CondBranch {
                cond: Operand::Value(cmp),
                then_block: *target,
                else_block: next,
            };
            f.blocks[cur].term_span = span;
            edges.push((cur, *target));
            edges.push((cur, next));
            cur = next;
        }

        for (from, to) in edges {
            let Some(inputs) = carried.get(&to) else {
                continue;
            };
            for (phi, op) in inputs {
                if let InstKind::Phi { incoming } = &mut f.insts[*phi].kind {
                    if !incoming.iter().any(|(p, _)| *p == from) {
                        incoming.push((from, op.clone()));
                    }
                }
            }
        }
    }
}

fn phi_inputs(f: &Function, block: BlockId, pred: BlockId) -> Vec<(ValueId, Operand)> {
    f.phis(block)
        .filter_map(|phi| match &f.insts[phi].kind {
            InstKind::Phi { incoming } => incoming
                .iter()
                .find(|(p, _)| *p == pred)
                .map(|(_, op)| (phi, op.clone())),
            _ => None,
        })
        .collect()
}

/// A phi with one predecessor is a copy; dropping it keeps parallel copies
/// off edges that leave multi-way branches.
fn fold_single_input_phis(f: &mut Function) {
    let mut replacements: FxHashMap<ValueId, Operand> = FxHashMap::default();
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        for phi in f.phis(b) {
            if let InstKind::Phi { incoming } = &f.insts[phi].kind {
                if let [(_, op)] = incoming.as_slice() {
                    if *op != Operand::Value(phi) {
                        replacements.insert(phi, op.clone());
                    }
                }
            }
        }
    }
    if !replacements.is_empty() {
        apply_replacements(f, &replacements);
    }
}

// ============================================================================
// Literal materialization
// ============================================================================

/// True if the emitter encodes this literal operand without a register.
fn stays_inline(kind: &InstKind, index: usize, lit: &Literal) -> bool {
    match kind {
        InstKind::DefineOwn { .. } => index == 1 && matches!(lit, Literal::String(_)),
        InstKind::AllocObjectLiteral { props } => props.iter().all(|(_, v)| matches!(v, Operand::Literal(_))),
        InstKind::AllocArray { elements } => {
            matches!(lit, Literal::Empty) || elements.iter().all(|e| matches!(e, Operand::Literal(_)))
        }
        _ => false,
    }
}

fn materialize_literals(f: &mut Function) {
    let blocks: Vec<BlockId> = f.live_blocks().collect();

    for &b in &blocks {
        let mut i = 0;
        while i < f.blocks[b].insts.len() {
            let v = f.blocks[b].insts[i];
            let kind = &f.insts[v].kind;
            if matches!(kind, InstKind::Phi { .. }) {
                i += 1;
                continue;
            }
            let mut pending: Vec<(usize, Literal)> = Vec::new();
            let mut index = 0;
            kind.visit_operands(|op| {
                if let Operand::Literal(lit) = op {
                    if !stays_inline(kind, index, lit) {
                        pending.push((index, lit.clone()));
                    }
                }
                index += 1;
            });
            if pending.is_empty() {
                i += 1;
                continue;
            }

            let mut loaded: FxHashMap<usize, ValueId> = FxHashMap::default();
            for (index, lit) in pending {
                let c = insert_constant(f, b, i, v, lit);
                loaded.insert(index, c);
                i += 1;
            }
            let mut index = 0;
            f.insts[v].kind.visit_operands_mut(|op| {
                if let Some(&c) = loaded.get(&index) {
                    *op = Operand::Value(c);
                }
                index += 1;
            });
            i += 1;
        }
    }

    // Phi inputs are loaded at the end of the predecessor, next to the copy.
    for &b in &blocks {
        let phis: Vec<ValueId> = f.phis(b).collect();
        for phi in phis {
            let InstKind::Phi { incoming } = &f.insts[phi].kind else {
                continue;
            };
            let literal_inputs: Vec<(usize, BlockId, Literal)> = incoming
                .iter()
                .enumerate()
                .filter_map(|(k, (p, op))| op.literal().map(|lit| (k, *p, lit.clone())))
                .collect();
            for (k, pred, lit) in literal_inputs {
                let at = f.blocks[pred].insts.len();
                let c = insert_constant(f, pred, at, phi, lit);
                if let InstKind::Phi { incoming } = &mut f.insts[phi].kind {
                    incoming[k].1 = Operand::Value(c);
                }
            }
        }
    }

    for &b in &blocks {
        let Some(Operand::Literal(lit)) = f.blocks[b].term.operand() else {
            continue;
        };
        let lit = lit.clone();
        let span = f.blocks[b].term_span;
        let c = f.append(b, InstKind::LoadConst(lit.clone()), span);
        f.insts[c].ty = Type::of_literal(&lit);
        if let Some(op) = f.blocks[b].term.operand_mut() {
            *op = Operand::Value(c);
        }
    }
}

/// Inserts `LoadConst lit` at `pos` of `block`, attributed to `user`.
fn insert_constant(f: &mut Function, block: BlockId, pos: usize, user: ValueId, lit: Literal) -> ValueId {
    let (span, scope, depth) = {
        let u = &f.insts[user];
        (u.span, u.scope, u.inline_depth)
    };
    let ty = Type::of_literal(&lit);
    let c = f.insert(block, pos, InstKind::LoadConst(lit), span);
    let inst = &mut f.insts[c];
    inst.ty = ty;
    inst.scope = scope;
    inst.inline_depth = depth;
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::verify::verify_function;
    use crate::sema::FunctionKind;

    fn literal_operands(f: &Function) -> usize {
        let mut n = 0;
        for b in f.live_blocks() {
            for &v in &f.blocks[b].insts {
                f.insts[v].kind.visit_operands(|op| n += usize::from(op.literal().is_some()));
            }
            n += usize::from(f.blocks[b].term.operand().and_then(Operand::literal).is_some());
        }
        n
    }

    #[test]
    fn test_dense_table_detection() {
        let b = BlockId(1);
        let cases: Vec<(Literal, BlockId)> = (0..5).map(|i| (Literal::Number(f64::from(i)), b)).collect();
        assert_eq!(dense_table(&cases), Some((0, 4)));
        assert_eq!(dense_table(&cases[..3]), None);

        let sparse: Vec<(Literal, BlockId)> = [0, 100, 200, 300].iter().map(|&i| (Literal::Number(f64::from(i)), b)).collect();
        assert_eq!(dense_table(&sparse), None);

        let mut strings = cases.clone();
        strings[2].0 = Literal::String("2".into());
        assert_eq!(dense_table(&strings), None);

        let mut dup = cases.clone();
        dup[4].0 = Literal::Number(0.0);
        assert_eq!(dense_table(&dup), None);
    }

    #[test]
    fn test_sparse_switch_becomes_compare_chain() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let a = f.add_block(None);
        let join = f.add_block(None);
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::Switch {
            value: Operand::Value(p),
            cases: vec![(Literal::String("x".into()), a), (Literal::Number(3.0), join)],
            default: join,
        };
        f.blocks[a].term = Terminator::Branch(join);
        let phi = f.create_inst(
            join,
            InstKind::Phi {
                incoming: vec![(entry, Operand::number(1.0)), (a, Operand::number(2.0))],
            },
            Default::default(),
        );
        f.blocks[join].insts.push(phi);
        f.blocks[join].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();

        lower_for_allocation(&mut f);

        assert!(verify_function(&f).is_ok());
        assert!(f.live_blocks().all(|b| !matches!(f.blocks[b].term, Terminator::Switch { .. })));
        assert_eq!(literal_operands(&f), 0);
        // Every edge into the phi block comes from a single-successor block.
        for &pred in &f.blocks[join].preds {
            assert_eq!(f.blocks[pred].term.targets(), vec![join]);
        }
    }

    #[test]
    fn test_dense_switch_is_kept() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let exit = f.add_block(None);
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        let cases = (0..4).map(|i| (Literal::Number(f64::from(i)), exit)).collect();
        f.blocks[entry].term = Terminator::Switch {
            value: Operand::Value(p),
            cases,
            default: exit,
        };
        f.blocks[exit].term = Terminator::Return(Operand::UNDEFINED);
        f.recompute_preds();

        lower_for_allocation(&mut f);

        assert!(matches!(f.blocks[entry].term, Terminator::Switch { .. }));
        assert!(matches!(f.blocks[exit].term, Terminator::Return(Operand::Value(_))));
    }

    #[test]
    fn test_inline_literals_are_left_alone() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let arr = f.append(
            entry,
            InstKind::AllocArray {
                elements: vec![Operand::number(1.0), Operand::Literal(Literal::Empty)],
            },
            Default::default(),
        );
        f.append(
            entry,
            InstKind::DefineOwn {
                object: Operand::Value(arr),
                key: Operand::string("k"),
                value: Operand::boolean(true),
                enumerable: true,
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(arr));

        lower_for_allocation(&mut f);

        // Array stays a literal buffer, key stays inline, the value is loaded.
        assert_eq!(literal_operands(&f), 3);
        assert_eq!(f.blocks[entry].insts.len(), 3);
    }
}
