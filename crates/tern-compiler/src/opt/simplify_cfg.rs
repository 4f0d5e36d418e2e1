// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Control-flow cleanup: constant branches, unreachable blocks, straight-line
//! chains, empty forwarding blocks and handlers nothing can reach.

use rustc_hash::FxHashSet;

use crate::ir::literal::strict_equals;
use crate::ir::{BlockId, Function, InstKind, Terminator, ValueId};

use super::{FunctionPass, PassContext, remove_unreachable_blocks};

/// Simplifies the CFG to a fixpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplifyCfg;

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run_on_function(&self, f: &mut Function, _cx: &PassContext<'_>) -> bool {
        let mut changed = false;
        loop {
            let mut round = fold_branches(f);
            round |= remove_unreachable_blocks(f);
            round |= merge_chains(f);
            round |= thread_jumps(f);
            round |= drop_unused_handlers(f);
            if !round {
                return changed;
            }
            changed = true;
        }
    }
}

/// Rewrites conditional terminators whose outcome is known.
fn fold_branches(f: &mut Function) -> bool {
    let mut changed = false;
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        let Some(kept) = known_target(f, &f.blocks[b].term) else {
            continue;
        };
        let mut dropped = f.blocks[b].term.targets();
        dropped.retain(|&t| t != kept);
        dropped.sort();
        dropped.dedup();
        for t in dropped {
            f.remove_phi_incoming(t, b);
        }
        f.blocks[b].term = Terminator::Branch(kept);
        changed = true;
    }
    if changed {
        f.recompute_preds();
    }
    changed
}

fn known_target(f: &Function, term: &Terminator) -> Option<BlockId> {
    match term {
        Terminator::CondBranch { then_block, else_block, .. } if then_block == else_block => Some(*then_block),
        Terminator::CondBranch { cond, then_block, else_block } => {
            let taken = f.constant_of(cond)?.truthy()?;
            Some(if taken { *then_block } else { *else_block })
        }
        Terminator::Switch { cases, default, .. } if cases.iter().all(|(_, t)| t == default) => Some(*default),
        Terminator::Switch { value, cases, default } => {
            let value = f.constant_of(value)?;
            for (case, target) in cases {
                if strict_equals(value, case)? {
                    return Some(*target);
                }
            }
            Some(*default)
        }
        _ => None,
    }
}

fn handler_blocks(f: &Function) -> FxHashSet<BlockId> {
    f.live_blocks().filter_map(|b| f.blocks[b].handler).collect()
}

/// Appends a block's only successor when that successor has no other
/// predecessor and runs under the same handler.
fn merge_chains(f: &mut Function) -> bool {
    let mut changed = false;
    let mut handlers = handler_blocks(f);
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        if f.blocks[b].deleted {
            continue;
        }
        loop {
            let Terminator::Branch(s) = f.blocks[b].term else { break };
            if s == b
                || s == f.entry
                || handlers.contains(&s)
                || f.blocks[s].preds.as_slice() != [b]
                || f.blocks[s].handler != f.blocks[b].handler
            {
                break;
            }

            let phis: Vec<ValueId> = f.phis(s).collect();
            for phi in phis {
                let value = match &f.insts[phi].kind {
                    InstKind::Phi { incoming } => incoming.first().map(|(_, v)| v.clone()),
                    _ => None,
                };
                if let Some(value) = value {
                    f.replace_all_uses(phi, &value);
                }
                f.remove_inst(phi);
            }

            let moved = std::mem::take(&mut f.blocks[s].insts);
            for &v in &moved {
                f.insts[v].block = b;
            }
            f.blocks[b].insts.extend(moved);
            let term = std::mem::replace(&mut f.blocks[s].term, Terminator::Unreachable);
            let mut targets = term.targets();
            targets.sort();
            targets.dedup();
            for t in targets {
                f.rename_phi_incoming(t, s, b);
            }
            f.blocks[b].term = term;
            f.blocks[b].term_span = f.blocks[s].term_span;
            f.delete_block(s);
            f.recompute_preds();
            handlers = handler_blocks(f);
            changed = true;
        }
    }
    changed
}

/// Redirects jumps through empty blocks that only forward control.
fn thread_jumps(f: &mut Function) -> bool {
    let mut changed = false;
    let handlers = handler_blocks(f);
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for e in blocks {
        if e == f.entry || handlers.contains(&e) || !f.blocks[e].insts.is_empty() {
            continue;
        }
        let Terminator::Branch(target) = f.blocks[e].term else { continue };
        if target == e || f.phis(target).next().is_some() {
            continue;
        }
        let preds = f.blocks[e].preds.clone();
        if preds.is_empty() || preds.contains(&e) {
            continue;
        }
        for p in preds {
            f.blocks[p].term.replace_target(e, target);
        }
        f.recompute_preds();
        changed = true;
    }
    changed
}

/// Detaches handlers from blocks that cannot throw.
fn drop_unused_handlers(f: &mut Function) -> bool {
    let mut changed = false;
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    for b in blocks {
        let block = &f.blocks[b];
        if block.handler.is_none() || matches!(block.term, Terminator::Throw(_)) {
            continue;
        }
        if block.insts.iter().all(|&v| f.insts[v].kind.never_throws()) {
            f.blocks[b].handler = None;
            changed = true;
        }
    }
    if changed {
        f.recompute_preds();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::index::IndexVec;
    use crate::ir::verify::verify_function;
    use crate::ir::{Literal, Operand};
    use crate::sema::FunctionKind;

    fn run(f: &mut Function) -> bool {
        let vars = IndexVec::new();
        let options = CompileOptions::default();
        SimplifyCfg.run_on_function(f, &PassContext { vars: &vars, options: &options })
    }

    #[test]
    fn test_constant_branch_collapses_to_one_block() {
        // if (true) return 1; else return 2;
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let then = f.add_block(None);
        let other = f.add_block(None);
        f.blocks[entry].term = Terminator::CondBranch {
            cond: Operand::boolean(true),
            then_block: then,
            else_block: other,
        };
        f.blocks[then].term = Terminator::Return(Operand::number(1.0));
        f.blocks[other].term = Terminator::Return(Operand::number(2.0));
        f.recompute_preds();

        assert!(run(&mut f));
        verify_function(&f).expect("valid IR");
        assert_eq!(f.live_blocks().count(), 1);
        assert_eq!(f.blocks[entry].term, Terminator::Return(Operand::number(1.0)));
        assert!(!run(&mut f));
    }

    #[test]
    fn test_constant_switch_picks_case() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let one = f.add_block(None);
        let two = f.add_block(None);
        let default = f.add_block(None);
        f.blocks[entry].term = Terminator::Switch {
            value: Operand::number(2.0),
            cases: vec![(Literal::Number(1.0), one), (Literal::Number(2.0), two)],
            default,
        };
        for (b, n) in [(one, 10.0), (two, 20.0), (default, 0.0)] {
            f.blocks[b].term = Terminator::Return(Operand::number(n));
        }
        f.recompute_preds();

        run(&mut f);
        assert_eq!(f.blocks[entry].term, Terminator::Return(Operand::number(20.0)));
    }

    #[test]
    fn test_merge_replaces_single_input_phi() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let next = f.add_block(None);
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::Branch(next);
        let phi = f.append(
            next,
            InstKind::Phi {
                incoming: vec![(entry, Operand::Value(p))],
            },
            Default::default(),
        );
        f.blocks[next].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();

        assert!(run(&mut f));
        verify_function(&f).expect("valid IR");
        assert_eq!(f.blocks[entry].insts, vec![p]);
        assert_eq!(f.blocks[entry].term, Terminator::Return(Operand::Value(p)));
    }

    #[test]
    fn test_handler_dropped_when_nothing_throws() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let handler = f.add_block(None);
        let body = f.add_block(Some(handler));
        f.blocks[entry].term = Terminator::Branch(body);
        f.append(body, InstKind::LoadConst(Literal::Number(1.0)), Default::default());
        f.blocks[body].term = Terminator::Return(Operand::UNDEFINED);
        let e = f.append(handler, InstKind::Catch, Default::default());
        f.blocks[handler].term = Terminator::Throw(Operand::Value(e));
        f.recompute_preds();

        assert!(run(&mut f));
        verify_function(&f).expect("valid IR");
        assert!(f.blocks[handler].deleted);
        assert!(f.live_blocks().all(|b| f.blocks[b].handler.is_none()));
    }
}
