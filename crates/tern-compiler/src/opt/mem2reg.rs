// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Promotion of frame slots to SSA values.
//!
//! Phis go on the iterated dominance frontier of each slot's stores, then a
//! walk over the dominator tree renames every load to the reaching value.
//! Slots written inside a `try` region stay in memory: the handler would
//! need the value at the throwing instruction, not at the end of the block.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::index::IndexVec;
use crate::ir::cfg::DomTree;
use crate::ir::{BlockId, Function, InstKind, Operand, ValueId, VarId};

use super::{FunctionPass, PassContext, apply_replacements, remove_unreachable_blocks};

/// Promotes `LoadLocal`/`StoreLocal` pairs to SSA values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mem2Reg;

impl FunctionPass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run_on_function(&self, f: &mut Function, _cx: &PassContext<'_>) -> bool {
        let changed = remove_unreachable_blocks(f);
        let slots = collect_slots(f);
        if slots.is_empty() {
            return changed;
        }

        let dom = DomTree::compute(f);
        let frontiers = dom.frontiers(f);
        let handlers: FxHashSet<BlockId> = f.live_blocks().filter_map(|b| f.blocks[b].handler).collect();

        let mut promoted: FxHashSet<VarId> = FxHashSet::default();
        let mut phi_var: FxHashMap<ValueId, VarId> = FxHashMap::default();
        let mut vars: Vec<&VarId> = slots.keys().collect();
        vars.sort();
        for &var in vars {
            let info = &slots[&var];
            if info.stored_in_try {
                continue;
            }
            let Some(sites) = phi_sites(&frontiers, &info.def_blocks, &handlers) else {
                continue;
            };
            for b in sites {
                let phi = f.insert(b, 0, InstKind::Phi { incoming: Vec::new() }, Default::default());
                phi_var.insert(phi, var);
            }
            promoted.insert(var);
        }
        if promoted.is_empty() {
            return changed;
        }

        let replacements = rename(f, &dom, &promoted, &phi_var);
        apply_replacements(f, &replacements);
        true
    }
}

#[derive(Default)]
struct SlotInfo {
    def_blocks: Vec<BlockId>,
    stored_in_try: bool,
}

fn collect_slots(f: &Function) -> FxHashMap<VarId, SlotInfo> {
    let mut slots: FxHashMap<VarId, SlotInfo> = FxHashMap::default();
    for b in f.live_blocks() {
        let block = &f.blocks[b];
        for &v in &block.insts {
            match &f.insts[v].kind {
                InstKind::LoadLocal(var) => {
                    slots.entry(*var).or_default();
                }
                InstKind::StoreLocal { var, .. } => {
                    let info = slots.entry(*var).or_default();
                    if !info.def_blocks.contains(&b) {
                        info.def_blocks.push(b);
                    }
                    info.stored_in_try |= block.handler.is_some();
                }
                _ => {}
            }
        }
    }
    slots
}

/// Iterated dominance frontier of `defs`, or `None` if it reaches a handler.
fn phi_sites(
    frontiers: &IndexVec<BlockId, Vec<BlockId>>,
    defs: &[BlockId],
    handlers: &FxHashSet<BlockId>,
) -> Option<Vec<BlockId>> {
    let mut sites = Vec::new();
    let mut placed: FxHashSet<BlockId> = FxHashSet::default();
    let mut queued: FxHashSet<BlockId> = defs.iter().copied().collect();
    let mut work: Vec<BlockId> = defs.to_vec();
    while let Some(d) = work.pop() {
        for &y in &frontiers[d] {
            if !placed.insert(y) {
                continue;
            }
            if handlers.contains(&y) {
                return None;
            }
            sites.push(y);
            if queued.insert(y) {
                work.push(y);
            }
        }
    }
    sites.sort();
    Some(sites)
}

enum Walk {
    Enter(BlockId),
    Leave(Vec<VarId>),
}

/// Renames loads along the dominator tree and fills in phi inputs. Returns
/// the replacement for every load and store of a promoted slot.
fn rename(
    f: &mut Function,
    dom: &DomTree,
    promoted: &FxHashSet<VarId>,
    phi_var: &FxHashMap<ValueId, VarId>,
) -> FxHashMap<ValueId, Operand> {
    let children = dom.children();
    let mut stacks: FxHashMap<VarId, Vec<Operand>> = FxHashMap::default();
    let mut replacements: FxHashMap<ValueId, Operand> = FxHashMap::default();
    let current = |stacks: &FxHashMap<VarId, Vec<Operand>>, var: VarId| {
        stacks
            .get(&var)
            .and_then(|s| s.last())
            .cloned()
            .unwrap_or(Operand::UNDEFINED)
    };

    let mut walk = vec![Walk::Enter(f.entry)];
    while let Some(step) = walk.pop() {
        let b = match step {
            Walk::Leave(pushed) => {
                for var in pushed {
                    if let Some(stack) = stacks.get_mut(&var) {
                        stack.pop();
                    }
                }
                continue;
            }
            Walk::Enter(b) => b,
        };

        let mut pushed = Vec::new();
        for i in 0..f.blocks[b].insts.len() {
            let v = f.blocks[b].insts[i];
            match &f.insts[v].kind {
                InstKind::Phi { .. } => {
                    if let Some(&var) = phi_var.get(&v) {
                        stacks.entry(var).or_default().push(Operand::Value(v));
                        pushed.push(var);
                    }
                }
                InstKind::LoadLocal(var) if promoted.contains(var) => {
                    replacements.insert(v, current(&stacks, *var));
                }
                InstKind::StoreLocal { var, value } if promoted.contains(var) => {
                    let var = *var;
                    stacks.entry(var).or_default().push(value.clone());
                    pushed.push(var);
                    // Stores have no uses; the entry only marks them for removal.
                    replacements.insert(v, Operand::UNDEFINED);
                }
                _ => {}
            }
        }

        let mut succs = f.blocks[b].term.targets();
        succs.sort();
        succs.dedup();
        for s in succs {
            let phis: Vec<ValueId> = f.phis(s).collect();
            for phi in phis {
                let Some(&var) = phi_var.get(&phi) else { continue };
                let value = current(&stacks, var);
                if let InstKind::Phi { incoming } = &mut f.insts[phi].kind {
                    if !incoming.iter().any(|(p, _)| *p == b) {
                        incoming.push((b, value));
                    }
                }
            }
        }

        walk.push(Walk::Leave(pushed));
        for &child in children[b].iter().rev() {
            walk.push(Walk::Enter(child));
        }
    }
    replacements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::ir::verify::verify_function;
    use crate::ir::{Literal, Terminator};
    use crate::sema::FunctionKind;

    fn run(f: &mut Function) -> bool {
        let vars = IndexVec::new();
        let options = CompileOptions::default();
        Mem2Reg.run_on_function(f, &PassContext { vars: &vars, options: &options })
    }

    fn count(f: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
        f.live_blocks()
            .flat_map(|b| f.blocks[b].insts.iter())
            .filter(|&&v| pred(&f.insts[v].kind))
            .count()
    }

    /// `x = 1; if (p) x = 2; return x;`
    fn diamond(handler: bool) -> Function {
        let mut f = Function::new("f", FunctionKind::Normal);
        let x = VarId(0);
        let entry = f.entry;
        let catch = handler.then(|| f.add_block(None));
        let then = f.add_block(catch);
        let join = f.add_block(None);
        f.append(entry, InstKind::StoreLocal { var: x, value: Operand::number(1.0) }, Default::default());
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::CondBranch {
            cond: Operand::Value(p),
            then_block: then,
            else_block: join,
        };
        f.append(then, InstKind::StoreLocal { var: x, value: Operand::number(2.0) }, Default::default());
        f.blocks[then].term = Terminator::Branch(join);
        let load = f.append(join, InstKind::LoadLocal(x), Default::default());
        f.blocks[join].term = Terminator::Return(Operand::Value(load));
        if let Some(catch) = catch {
            let e = f.append(catch, InstKind::Catch, Default::default());
            f.blocks[catch].term = Terminator::Throw(Operand::Value(e));
        }
        f.recompute_preds();
        f
    }

    #[test]
    fn test_promotes_diamond_to_phi() {
        let mut f = diamond(false);
        assert!(run(&mut f));
        verify_function(&f).expect("valid SSA");
        assert_eq!(count(&f, |k| matches!(k, InstKind::LoadLocal(_) | InstKind::StoreLocal { .. })), 0);

        let phis: Vec<&InstKind> = f
            .live_blocks()
            .flat_map(|b| f.phis(b).collect::<Vec<_>>())
            .map(|v| &f.insts[v].kind)
            .collect();
        assert_eq!(phis.len(), 1);
        let InstKind::Phi { incoming } = phis[0] else { unreachable!() };
        let mut values: Vec<&Operand> = incoming.iter().map(|(_, v)| v).collect();
        values.sort_by_key(|v| v.to_string());
        assert_eq!(values, vec![&Operand::Literal(Literal::Number(1.0)), &Operand::Literal(Literal::Number(2.0))]);

        assert!(!run(&mut f));
    }

    #[test]
    fn test_load_before_store_reads_undefined() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let load = f.append(f.entry, InstKind::LoadLocal(VarId(3)), Default::default());
        f.blocks[f.entry].term = Terminator::Return(Operand::Value(load));
        assert!(run(&mut f));
        assert_eq!(f.blocks[f.entry].term, Terminator::Return(Operand::UNDEFINED));
    }

    #[test]
    fn test_slot_stored_in_try_stays_in_memory() {
        let mut f = diamond(true);
        run(&mut f);
        verify_function(&f).expect("valid IR");
        assert_eq!(count(&f, |k| matches!(k, InstKind::StoreLocal { .. })), 2);
        assert_eq!(count(&f, |k| matches!(k, InstKind::LoadLocal(_))), 1);
    }
}
