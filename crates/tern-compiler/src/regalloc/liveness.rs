// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Block layout, liveness and live ranges.
//!
//! Blocks are laid out in reverse postorder and numbered densely:
//!
//! ```text
//! start(b)   phis of b are defined here
//! p, p+1...  one position per non-phi instruction
//! end(b)     terminator and phi copies into the successor
//! ```
//!
//! Each value gets a single half-open interval covering every position it
//! must survive at. A range ending at `q` is free at `q`, so an instruction
//! may write its result into the register of an operand it reads last.

use rustc_hash::FxHashSet;

use crate::index::IndexVec;
use crate::ir::cfg::reverse_postorder;
use crate::ir::{BlockId, Function, InstKind, Operand, ValueId};

/// Half-open interval `[start, end)` of linear positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    /// First position the value occupies its register
    pub start: u32,
    /// First position the register is free again
    pub end: u32,
}

impl LiveRange {
    /// True if the two ranges share a position.
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    fn cover(&mut self, start: u32, end: u32) {
        self.start = self.start.min(start);
        self.end = self.end.max(end);
    }
}

/// Layout of a function's blocks on the linear position axis.
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Blocks in layout order
    pub order: Vec<BlockId>,
    /// Position of each block's phis
    pub block_start: IndexVec<BlockId, u32>,
    /// Position of each block's terminator and outgoing copies
    pub block_end: IndexVec<BlockId, u32>,
    /// Position of each placed instruction
    pub position: IndexVec<ValueId, u32>,
}

/// Numbers every block and instruction of `f` in reverse postorder.
pub fn linearize(f: &Function) -> Linearization {
    let order = reverse_postorder(f);
    let mut block_start = IndexVec::from_elem(0, f.blocks.len());
    let mut block_end = IndexVec::from_elem(0, f.blocks.len());
    let mut position = IndexVec::from_elem(u32::MAX, f.insts.len());
    let mut pos = 0u32;
    for &b in &order {
        block_start[b] = pos;
        pos += 1;
        for &v in &f.blocks[b].insts {
            if matches!(f.insts[v].kind, InstKind::Phi { .. }) {
                position[v] = block_start[b];
            } else {
                position[v] = pos;
                pos += 1;
            }
        }
        block_end[b] = pos;
        pos += 1;
    }
    Linearization {
        order,
        block_start,
        block_end,
        position,
    }
}

/// True if the instruction produces a value the program can read.
pub fn has_result(kind: &InstKind) -> bool {
    !matches!(
        kind,
        InstKind::StoreLocal { .. }
            | InstKind::StoreEnv { .. }
            | InstKind::StoreGlobal { .. }
            | InstKind::DeclareGlobalVar { .. }
            | InstKind::StoreNamed { .. }
            | InstKind::StoreComputed { .. }
            | InstKind::DefineOwn { .. }
            | InstKind::DefineAccessor { .. }
            | InstKind::SpreadIntoArray { .. }
            | InstKind::IteratorClose { .. }
            | InstKind::Debugger
    )
}

/// True if the emitted sequence writes the result before it has read every
/// operand, so no operand may share the result's register.
pub fn writes_result_early(kind: &InstKind) -> bool {
    match kind {
        InstKind::AllocArray { elements } => elements.iter().any(|e| matches!(e, Operand::Value(_))),
        InstKind::AllocObjectLiteral { props } => props.iter().any(|(_, v)| matches!(v, Operand::Value(_))),
        _ => false,
    }
}

// ============================================================================
// Liveness
// ============================================================================

/// Values live on entry to and exit from each block.
#[derive(Debug, Clone)]
pub struct Liveness {
    /// Live on entry, excluding the block's own phis
    pub live_in: IndexVec<BlockId, FxHashSet<ValueId>>,
    /// Live on exit, including values a handler may read
    pub live_out: IndexVec<BlockId, FxHashSet<ValueId>>,
}

/// Backward dataflow to a fixpoint over the layout order.
pub fn compute_liveness(f: &Function, lin: &Linearization) -> Liveness {
    let n = f.blocks.len();
    let mut gen_: IndexVec<BlockId, FxHashSet<ValueId>> = IndexVec::from_elem(FxHashSet::default(), n);
    let mut kill: IndexVec<BlockId, FxHashSet<ValueId>> = IndexVec::from_elem(FxHashSet::default(), n);
    // Values read by successor phis along the edge out of each block.
    let mut phi_uses: IndexVec<BlockId, FxHashSet<ValueId>> = IndexVec::from_elem(FxHashSet::default(), n);

    for &b in &lin.order {
        let block = &f.blocks[b];
        for &v in &block.insts {
            match &f.insts[v].kind {
                InstKind::Phi { incoming } => {
                    for (p, op) in incoming {
                        if let Operand::Value(u) = op {
                            phi_uses[*p].insert(*u);
                        }
                    }
                }
                kind => kind.visit_operands(|op| {
                    if let Operand::Value(u) = op {
                        if !kill[b].contains(u) {
                            gen_[b].insert(*u);
                        }
                    }
                }),
            }
            kill[b].insert(v);
        }
        if let Some(Operand::Value(u)) = block.term.operand() {
            if !kill[b].contains(u) {
                gen_[b].insert(*u);
            }
        }
    }

    let mut live_in: IndexVec<BlockId, FxHashSet<ValueId>> = IndexVec::from_elem(FxHashSet::default(), n);
    let mut live_out: IndexVec<BlockId, FxHashSet<ValueId>> = IndexVec::from_elem(FxHashSet::default(), n);
    loop {
        let mut changed = false;
        for &b in lin.order.iter().rev() {
            let mut out = phi_uses[b].clone();
            for s in f.successors(b) {
                out.extend(live_in[s].iter().copied());
            }
            let mut inn = gen_[b].clone();
            inn.extend(out.iter().filter(|v| !kill[b].contains(v)).copied());
            if out != live_out[b] || inn != live_in[b] {
                live_out[b] = out;
                live_in[b] = inn;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Liveness { live_in, live_out }
}

// ============================================================================
// Ranges
// ============================================================================

/// One hull interval per value that produces a result.
pub fn build_ranges(f: &Function, lin: &Linearization, liveness: &Liveness) -> IndexVec<ValueId, Option<LiveRange>> {
    let mut ranges: IndexVec<ValueId, Option<LiveRange>> = IndexVec::from_elem(None, f.insts.len());
    let cover = |ranges: &mut IndexVec<ValueId, Option<LiveRange>>, v: ValueId, start: u32, end: u32| match &mut ranges[v] {
        Some(r) => r.cover(start, end),
        slot => *slot = Some(LiveRange { start, end }),
    };

    for &b in &lin.order {
        let (start, end) = (lin.block_start[b], lin.block_end[b]);
        for &v in &f.blocks[b].insts {
            let kind = &f.insts[v].kind;
            let q = lin.position[v];
            if has_result(kind) {
                cover(&mut ranges, v, q, q + 1);
            }
            match kind {
                InstKind::Phi { incoming } => {
                    for (p, op) in incoming {
                        let copy_at = lin.block_end[*p];
                        // The copy writes the phi's register at the end of the predecessor.
                        cover(&mut ranges, v, copy_at, copy_at + 1);
                        if let Operand::Value(u) = op {
                            cover(&mut ranges, *u, copy_at, copy_at);
                        }
                    }
                }
                _ => {
                    let until = if writes_result_early(kind) { q + 1 } else { q };
                    kind.visit_operands(|op| {
                        if let Operand::Value(u) = op {
                            cover(&mut ranges, *u, until, until);
                        }
                    });
                }
            }
        }
        if let Some(Operand::Value(u)) = f.blocks[b].term.operand() {
            cover(&mut ranges, *u, end, end);
        }
        for &v in &liveness.live_in[b] {
            cover(&mut ranges, v, start, start + 1);
        }
        for &v in &liveness.live_out[b] {
            cover(&mut ranges, v, end, end + 1);
        }
    }

    // Uses alone never create a range for a value without a result.
    for v in ranges.indices() {
        if !has_result(&f.insts[v].kind) {
            ranges[v] = None;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, NumericForm, Terminator};
    use crate::sema::FunctionKind;

    /// entry: x = param; loop: i = phi(0, i'); i' = i + x; cond -> loop | exit
    fn counting_loop() -> (Function, ValueId, ValueId, ValueId, [BlockId; 3]) {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let body = f.add_block(None);
        let exit = f.add_block(None);
        let x = f.append(entry, InstKind::LoadParam(1), Default::default());
        let zero = f.append(entry, InstKind::LoadConst(crate::ir::Literal::Number(0.0)), Default::default());
        f.blocks[entry].term = Terminator::Branch(body);
        let phi = f.create_inst(body, InstKind::Phi { incoming: Vec::new() }, Default::default());
        f.blocks[body].insts.push(phi);
        let next = f.append(
            body,
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: Operand::Value(phi),
                rhs: Operand::Value(x),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        if let InstKind::Phi { incoming } = &mut f.insts[phi].kind {
            incoming.push((entry, Operand::Value(zero)));
            incoming.push((body, Operand::Value(next)));
        }
        f.blocks[body].term = Terminator::CondBranch {
            cond: Operand::Value(next),
            then_block: body,
            else_block: exit,
        };
        f.blocks[exit].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();
        (f, x, phi, next, [entry, body, exit])
    }

    #[test]
    fn test_positions_follow_layout() {
        let (f, x, phi, next, [entry, body, exit]) = counting_loop();
        let lin = linearize(&f);
        assert_eq!(lin.order, vec![entry, body, exit]);
        assert_eq!(lin.block_start[entry], 0);
        assert_eq!(lin.position[x], 1);
        assert_eq!(lin.block_end[entry], 3);
        assert_eq!(lin.position[phi], lin.block_start[body]);
        assert_eq!(lin.position[next], lin.block_start[body] + 1);
    }

    #[test]
    fn test_loop_invariant_value_lives_through_loop() {
        let (f, x, phi, _, [_, body, exit]) = counting_loop();
        let lin = linearize(&f);
        let liveness = compute_liveness(&f, &lin);
        assert!(liveness.live_in[body].contains(&x));
        assert!(liveness.live_out[body].contains(&x));
        assert!(liveness.live_in[exit].contains(&phi));
        assert!(!liveness.live_in[body].contains(&phi));

        let ranges = build_ranges(&f, &lin, &liveness);
        let rx = ranges[x].expect("x has a range");
        assert!(rx.end > lin.block_end[body]);
    }

    #[test]
    fn test_phi_covers_copy_positions() {
        let (f, _, phi, next, [entry, body, _]) = counting_loop();
        let lin = linearize(&f);
        let liveness = compute_liveness(&f, &lin);
        let ranges = build_ranges(&f, &lin, &liveness);
        let rp = ranges[phi].expect("phi has a range");
        assert!(rp.start <= lin.block_end[entry]);
        assert!(rp.end > lin.block_end[body]);
        // The loop-carried value overlaps the phi: it is defined while the
        // phi is still needed by the exit edge.
        let rn = ranges[next].expect("next has a range");
        assert!(rn.overlaps(&rp));
    }

    #[test]
    fn test_store_has_no_range() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        let s = f.append(
            entry,
            InstKind::StoreNamed {
                object: Operand::Value(p),
                name: "x".into(),
                value: Operand::Value(p),
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::UNDEFINED);
        let lin = linearize(&f);
        let liveness = compute_liveness(&f, &lin);
        let ranges = build_ranges(&f, &lin, &liveness);
        assert!(ranges[s].is_none());
        assert_eq!(ranges[p], Some(LiveRange { start: 1, end: 2 }));
    }
}
