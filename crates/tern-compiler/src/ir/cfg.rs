// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Control-flow graph utilities: orderings, dominators, edge splitting.

use crate::index::{Idx, IndexVec};

use super::{BlockId, Function, Terminator, ValueId};

/// Blocks reachable from the entry in reverse postorder.
pub fn reverse_postorder(f: &Function) -> Vec<BlockId> {
    let mut visited = vec![false; f.blocks.len()];
    let mut post = Vec::with_capacity(f.blocks.len());
    // (block, next successor index)
    let mut stack: Vec<(BlockId, Vec<BlockId>, usize)> = Vec::new();
    visited[f.entry.index()] = true;
    stack.push((f.entry, f.successors(f.entry), 0));
    while let Some((block, succs, next)) = stack.last_mut() {
        if *next < succs.len() {
            let s = succs[*next];
            *next += 1;
            if !visited[s.index()] && !f.blocks[s].deleted {
                visited[s.index()] = true;
                let succs = f.successors(s);
                stack.push((s, succs, 0));
            }
        } else {
            post.push(*block);
            stack.pop();
        }
    }
    post.reverse();
    post
}

/// Reachability from the entry, indexed by block.
pub fn reachable(f: &Function) -> IndexVec<BlockId, bool> {
    let mut out = IndexVec::from_elem(false, f.blocks.len());
    for b in reverse_postorder(f) {
        out[b] = true;
    }
    out
}

/// Dominator tree over the reachable blocks.
#[derive(Debug, Clone)]
pub struct DomTree {
    idom: IndexVec<BlockId, Option<BlockId>>,
    order: IndexVec<BlockId, u32>,
    rpo: Vec<BlockId>,
}

const UNREACHED: u32 = u32::MAX;

impl DomTree {
    /// Computes immediate dominators with the Cooper-Harvey-Kennedy iteration.
    pub fn compute(f: &Function) -> Self {
        let rpo = reverse_postorder(f);
        let mut order = IndexVec::from_elem(UNREACHED, f.blocks.len());
        for (i, &b) in rpo.iter().enumerate() {
            order[b] = i as u32;
        }
        let mut idom: IndexVec<BlockId, Option<BlockId>> = IndexVec::from_elem(None, f.blocks.len());
        idom[f.entry] = Some(f.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in &f.blocks[b].preds {
                    if order[p] == UNREACHED || idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &order, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }
        Self { idom, order, rpo }
    }

    /// Immediate dominator; the entry dominates itself.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom[b]
    }

    /// Reverse postorder the tree was computed from.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Position of `b` in reverse postorder.
    pub fn rpo_index(&self, b: BlockId) -> Option<usize> {
        match self.order.get(b) {
            Some(&i) if i != UNREACHED => Some(i as usize),
            _ => None,
        }
    }

    /// True if `b` is reachable from the entry.
    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_index(b).is_some()
    }

    /// True if `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur] {
                Some(parent) if parent != cur => cur = parent,
                _ => return false,
            }
        }
    }

    /// Dominance frontier of every reachable block.
    pub fn frontiers(&self, f: &Function) -> IndexVec<BlockId, Vec<BlockId>> {
        let mut df: IndexVec<BlockId, Vec<BlockId>> = IndexVec::from_elem(Vec::new(), f.blocks.len());
        for &b in &self.rpo {
            let preds: Vec<BlockId> = f.blocks[b].preds.iter().copied().filter(|p| self.is_reachable(*p)).collect();
            if preds.len() < 2 {
                continue;
            }
            let Some(idom_b) = self.idom[b] else { continue };
            for p in preds {
                let mut runner = p;
                while runner != idom_b {
                    if !df[runner].contains(&b) {
                        df[runner].push(b);
                    }
                    match self.idom[runner] {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
        df
    }

    /// Children in the dominator tree, in reverse postorder.
    pub fn children(&self) -> IndexVec<BlockId, Vec<BlockId>> {
        let mut out: IndexVec<BlockId, Vec<BlockId>> = IndexVec::from_elem(Vec::new(), self.idom.len());
        for &b in &self.rpo {
            if let Some(p) = self.idom[b] {
                if p != b {
                    out[p].push(b);
                }
            }
        }
        out
    }
}

fn intersect(
    idom: &IndexVec<BlockId, Option<BlockId>>,
    order: &IndexVec<BlockId, u32>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while order[a] > order[b] {
            a = idom[a].unwrap_or(a);
        }
        while order[b] > order[a] {
            b = idom[b].unwrap_or(b);
        }
    }
    a
}

/// Positions of every instruction within its block, for same-block dominance.
pub fn inst_positions(f: &Function) -> IndexVec<ValueId, u32> {
    let mut pos = IndexVec::from_elem(u32::MAX, f.insts.len());
    for b in f.live_blocks() {
        for (i, &v) in f.blocks[b].insts.iter().enumerate() {
            pos[v] = i as u32;
        }
    }
    pos
}

/// True if the definition of `def` dominates a use by instruction `user`.
pub fn value_dominates(f: &Function, dom: &DomTree, pos: &IndexVec<ValueId, u32>, def: ValueId, user: ValueId) -> bool {
    let (db, ub) = (f.insts[def].block, f.insts[user].block);
    if db == ub {
        pos[def] < pos[user]
    } else {
        dom.dominates(db, ub)
    }
}

/// Splits every edge from a multi-successor block to a multi-predecessor
/// block. Exception edges are left alone. Returns the number of new blocks.
pub fn split_critical_edges(f: &mut Function) -> usize {
    f.recompute_preds();
    let mut split = 0;
    let blocks: Vec<BlockId> = f.live_blocks().collect();
    let mut normal_preds = IndexVec::from_elem(0usize, f.blocks.len());
    for &b in &blocks {
        let mut targets = f.blocks[b].term.targets();
        targets.sort();
        targets.dedup();
        for t in targets {
            normal_preds[t] += 1;
        }
    }
    for pred in blocks {
        let mut targets = f.blocks[pred].term.targets();
        if targets.len() < 2 {
            continue;
        }
        targets.sort();
        targets.dedup();
        for succ in targets {
            if normal_preds[succ] < 2 {
                continue;
            }
            let mid = f.add_block(None);
            f.blocks[mid].term = Terminator::Branch(succ);
            f.blocks[mid].term_span = f.blocks[pred].term_span;
            f.blocks[pred].term.replace_target(succ, mid);
            f.rename_phi_incoming(succ, pred, mid);
            split += 1;
        }
    }
    if split > 0 {
        f.recompute_preds();
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstKind, Literal, Operand};
    use crate::sema::FunctionKind;

    /// entry -> (a | b) -> join, with a self loop on `a`.
    fn diamond() -> (Function, [BlockId; 4]) {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let a = f.add_block(None);
        let b = f.add_block(None);
        let join = f.add_block(None);
        let c = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::CondBranch {
            cond: Operand::Value(c),
            then_block: a,
            else_block: b,
        };
        f.blocks[a].term = Terminator::CondBranch {
            cond: Operand::Value(c),
            then_block: a,
            else_block: join,
        };
        f.blocks[b].term = Terminator::Branch(join);
        f.blocks[join].term = Terminator::Return(Operand::Literal(Literal::Undefined));
        f.recompute_preds();
        (f, [entry, a, b, join])
    }

    #[test]
    fn test_rpo_starts_at_entry() {
        let (f, [entry, _, _, join]) = diamond();
        let rpo = reverse_postorder(&f);
        assert_eq!(rpo[0], entry);
        assert_eq!(*rpo.last().unwrap(), join);
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_dominators() {
        let (f, [entry, a, b, join]) = diamond();
        let dom = DomTree::compute(&f);
        assert!(dom.dominates(entry, join));
        assert!(!dom.dominates(a, join));
        assert!(!dom.dominates(b, join));
        assert_eq!(dom.idom(join), Some(entry));
        let df = dom.frontiers(&f);
        assert_eq!(df[b], vec![join]);
        assert!(df[a].contains(&a));
    }

    #[test]
    fn test_split_critical_edges() {
        let (mut f, [entry, a, _, join]) = diamond();
        let n = split_critical_edges(&mut f);
        // a->a (loop), a->join, and entry->a are critical.
        assert_eq!(n, 3);
        assert!(!f.blocks[a].term.targets().contains(&join));
        assert!(!f.blocks[entry].term.targets().contains(&a));
    }
}
