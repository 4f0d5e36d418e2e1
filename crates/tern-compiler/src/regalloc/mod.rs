// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Register allocation.
//!
//! The VM has an unbounded virtual register file per frame, so nothing is
//! ever spilled; the goal is a small frame. Allocation is a linear scan over
//! one hull interval per value, always taking the lowest free register.
//!
//! Frame layout, low to high:
//!
//! | registers              | holds                                     |
//! |------------------------|-------------------------------------------|
//! | `0..vars`              | frame slots that were not promoted        |
//! | `vars..local_count`    | SSA values, plus the copy scratch register |
//! | `local_count..`        | outgoing call arguments                   |

pub mod liveness;
pub mod lower;
pub mod renumber;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::config::CompileOptions;
use crate::error::InternalError;
use crate::index::IndexVec;
use crate::ir::{BlockId, Function, InstKind, Operand, Terminator, ValueId, VarId};

pub use liveness::LiveRange;

/// Highest argument count, `this` included, passed without the stack range.
pub const MAX_FIXED_ARITY: usize = 4;

/// One register-to-register move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Destination register
    pub dst: u32,
    /// Source register
    pub src: u32,
}

/// Register assignment for one function.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Blocks in emission order
    pub order: Vec<BlockId>,
    /// Register of each value that has a result
    pub registers: IndexVec<ValueId, Option<u32>>,
    /// Live range each register assignment was made for
    pub ranges: IndexVec<ValueId, Option<LiveRange>>,
    /// Registers dedicated to frame slots
    pub var_registers: FxHashMap<VarId, u32>,
    /// Registers below the outgoing-argument range
    pub local_count: u32,
    /// Register reserved for breaking copy cycles
    pub scratch: Option<u32>,
    /// Size of the outgoing-argument range
    pub stack_count: u32,
    /// Sequenced phi copies at the end of each block
    pub copies: FxHashMap<BlockId, Vec<Move>>,
}

impl Allocation {
    /// First register of the outgoing-argument range.
    pub fn stack_base(&self) -> u32 {
        self.local_count
    }

    /// Total registers the frame needs.
    pub fn frame_size(&self) -> u32 {
        self.local_count + self.stack_count
    }

    /// Register holding a value.
    pub fn register_of(&self, v: ValueId) -> Option<u32> {
        self.registers.get(v).copied().flatten()
    }

    /// Register holding an operand; literals have none.
    pub fn operand_register(&self, op: &Operand) -> Option<u32> {
        op.value().and_then(|v| self.register_of(v))
    }
}

/// Outgoing-argument registers an instruction needs.
pub fn stack_slots(kind: &InstKind, fixed_arity_calls: bool) -> u32 {
    match kind {
        InstKind::Call { args, .. } if fixed_arity_calls && args.len() < MAX_FIXED_ARITY => 0,
        InstKind::Call { args, .. } | InstKind::Construct { args, .. } => args.len() as u32 + 1,
        InstKind::CallBuiltin { args, .. } => args.len() as u32,
        _ => 0,
    }
}

/// Lowers `f` and assigns a register to every value.
pub fn allocate(f: &mut Function, options: &CompileOptions) -> Result<Allocation, InternalError> {
    lower::lower_for_allocation(f);
    let lin = liveness::linearize(f);
    let live = liveness::compute_liveness(f, &lin);
    let ranges = liveness::build_ranges(f, &lin, &live);

    // Frame slots the optimizer left in memory.
    let mut vars: BTreeSet<VarId> = BTreeSet::new();
    let mut stack_count = 0;
    for &b in &lin.order {
        for &v in &f.blocks[b].insts {
            let kind = &f.insts[v].kind;
            match kind {
                InstKind::LoadLocal(var) | InstKind::StoreLocal { var, .. } => {
                    vars.insert(*var);
                }
                _ => {}
            }
            stack_count = stack_count.max(stack_slots(kind, options.fixed_arity_calls));
        }
    }
    let var_registers: FxHashMap<VarId, u32> = vars.iter().enumerate().map(|(i, &var)| (var, i as u32)).collect();
    let base = var_registers.len() as u32;

    let (registers, next) = linear_scan(&ranges, base);

    let scratch_reg = next;
    let mut used_scratch = false;
    let mut copies: FxHashMap<BlockId, Vec<Move>> = FxHashMap::default();
    for &p in &lin.order {
        let targets = f.blocks[p].term.targets();
        for s in targets.iter().copied() {
            let mut moves = Vec::new();
            for phi in f.phis(s) {
                let InstKind::Phi { incoming } = &f.insts[phi].kind else {
                    continue;
                };
                let Some((_, op)) = incoming.iter().find(|(q, _)| *q == p) else {
                    continue;
                };
                let (Some(dst), Some(src)) = (registers[phi], operand_register(&registers, op)) else {
                    return Err(InternalError::new(&f.name, format!("phi %{} input from bb{} has no register", phi.0, p.0)));
                };
                moves.push(Move { dst, src });
            }
            if moves.is_empty() {
                continue;
            }
            if !matches!(f.blocks[p].term, Terminator::Branch(_)) {
                return Err(InternalError::new(&f.name, format!("phi copies on a branching edge out of bb{}", p.0)));
            }
            copies.insert(p, sequence_moves(moves, scratch_reg, &mut used_scratch));
        }
    }

    let mut alloc = Allocation {
        order: lin.order,
        registers,
        ranges,
        var_registers,
        local_count: if used_scratch { next + 1 } else { next },
        scratch: used_scratch.then_some(scratch_reg),
        stack_count,
        copies,
    };
    if options.renumber_registers {
        renumber::renumber(f, &mut alloc);
    }
    trace!(
        function = %f.name,
        locals = alloc.local_count,
        stack = alloc.stack_count,
        "allocated registers"
    );
    Ok(alloc)
}

fn operand_register(registers: &IndexVec<ValueId, Option<u32>>, op: &Operand) -> Option<u32> {
    op.value().and_then(|v| registers[v])
}

/// Assigns registers from `base` up; returns the assignment and the first
/// register never used.
fn linear_scan(ranges: &IndexVec<ValueId, Option<LiveRange>>, base: u32) -> (IndexVec<ValueId, Option<u32>>, u32) {
    let mut by_start: Vec<(LiveRange, ValueId)> = ranges.iter_enumerated().filter_map(|(v, r)| r.map(|r| (r, v))).collect();
    by_start.sort_by_key(|(r, v)| (r.start, *v));

    let mut registers = IndexVec::from_elem(None, ranges.len());
    let mut free: BTreeSet<u32> = BTreeSet::new();
    let mut active: Vec<(u32, u32)> = Vec::new();
    let mut next = base;
    for (range, v) in by_start {
        active.retain(|&(end, reg)| {
            if end <= range.start {
                free.insert(reg);
                false
            } else {
                true
            }
        });
        let reg = free.pop_first().unwrap_or_else(|| {
            next += 1;
            next - 1
        });
        active.push((range.end, reg));
        registers[v] = Some(reg);
    }
    (registers, next)
}

/// Orders a parallel copy so no source is overwritten before it is read,
/// routing one value of each cycle through `scratch`.
fn sequence_moves(mut pending: Vec<Move>, scratch: u32, used_scratch: &mut bool) -> Vec<Move> {
    pending.retain(|m| m.dst != m.src);
    let mut out = Vec::with_capacity(pending.len() + 1);
    while !pending.is_empty() {
        let ready = pending.iter().position(|m| !pending.iter().any(|o| o.src == m.dst));
        if let Some(i) = ready {
            out.push(pending.remove(i));
            continue;
        }
        let saved = pending[0].dst;
        out.push(Move { dst: scratch, src: saved });
        *used_scratch = true;
        for m in &mut pending {
            if m.src == saved {
                m.src = scratch;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Literal, NumericForm};
    use crate::sema::FunctionKind;
    use std::collections::HashMap;

    fn run_moves(moves: &[Move], regs: &mut HashMap<u32, u32>) {
        for m in moves {
            if let Some(&value) = regs.get(&m.src) {
                regs.insert(m.dst, value);
            }
        }
    }

    fn check_no_overlap(alloc: &Allocation) {
        let assigned: Vec<(u32, LiveRange)> = alloc
            .registers
            .iter_enumerated()
            .filter_map(|(v, r)| Some((*r.as_ref()?, alloc.ranges[v]?)))
            .collect();
        for (i, (ra, a)) in assigned.iter().enumerate() {
            for (rb, b) in &assigned[i + 1..] {
                assert!(ra != rb || !a.overlaps(b), "r{ra} assigned to overlapping ranges {a:?} and {b:?}");
            }
        }
    }

    #[test]
    fn test_sequence_moves_breaks_swap() {
        let mut used = false;
        let moves = sequence_moves(vec![Move { dst: 0, src: 1 }, Move { dst: 1, src: 0 }], 9, &mut used);
        assert!(used);
        let mut regs: HashMap<u32, u32> = [(0, 100), (1, 200)].into_iter().collect();
        run_moves(&moves, &mut regs);
        assert_eq!(regs[&0], 200);
        assert_eq!(regs[&1], 100);
    }

    #[test]
    fn test_sequence_moves_orders_chain() {
        let mut used = false;
        let moves = sequence_moves(
            vec![Move { dst: 1, src: 0 }, Move { dst: 2, src: 1 }, Move { dst: 3, src: 3 }],
            9,
            &mut used,
        );
        assert!(!used);
        assert_eq!(moves, vec![Move { dst: 2, src: 1 }, Move { dst: 1, src: 0 }]);
    }

    #[test]
    fn test_straight_line_reuses_registers() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let a = f.append(entry, InstKind::LoadParam(1), Default::default());
        let b = f.append(entry, InstKind::LoadParam(2), Default::default());
        let sum = f.append(
            entry,
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: Operand::Value(a),
                rhs: Operand::Value(b),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        let twice = f.append(
            entry,
            InstKind::Binary {
                op: BinaryOp::Mul,
                lhs: Operand::Value(sum),
                rhs: Operand::number(2.0),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(twice));

        let options = CompileOptions {
            renumber_registers: false,
            ..CompileOptions::default()
        };
        let alloc = allocate(&mut f, &options).expect("allocates");
        check_no_overlap(&alloc);
        assert_eq!(alloc.register_of(a), Some(0));
        assert_eq!(alloc.register_of(b), Some(1));
        // `sum` reads a and b last, so it can take a's register.
        assert_eq!(alloc.register_of(sum), Some(0));
        assert!(alloc.local_count <= 3);
        assert_eq!(alloc.stack_count, 0);
        assert!(alloc.scratch.is_none());
    }

    #[test]
    fn test_frame_vars_get_dedicated_registers() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let x = VarId(3);
        f.append(
            entry,
            InstKind::StoreLocal {
                var: x,
                value: Operand::number(1.0),
            },
            Default::default(),
        );
        let l = f.append(entry, InstKind::LoadLocal(x), Default::default());
        f.blocks[entry].term = Terminator::Return(Operand::Value(l));

        let alloc = allocate(&mut f, &CompileOptions::default()).expect("allocates");
        let var_reg = alloc.var_registers[&x];
        assert_ne!(alloc.register_of(l), Some(var_reg));
        check_no_overlap(&alloc);
    }

    #[test]
    fn test_long_calls_use_stack_range() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let callee = f.append(entry, InstKind::LoadParam(1), Default::default());
        let args = (0..5).map(|i| Operand::number(f64::from(i))).collect();
        let call = f.append(
            entry,
            InstKind::Call {
                callee: Operand::Value(callee),
                this: Operand::UNDEFINED,
                args,
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(call));

        let alloc = allocate(&mut f, &CompileOptions::default()).expect("allocates");
        assert_eq!(alloc.stack_count, 6);
        assert_eq!(alloc.frame_size(), alloc.local_count + 6);
        check_no_overlap(&alloc);
    }

    #[test]
    fn test_swap_loop_gets_scratch() {
        // loop: a, b = phi(x, b'), phi(y, a'); swap every iteration.
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let header = f.add_block(None);
        let latch = f.add_block(None);
        let exit = f.add_block(None);
        let x = f.append(entry, InstKind::LoadParam(1), Default::default());
        let y = f.append(entry, InstKind::LoadParam(2), Default::default());
        f.blocks[entry].term = Terminator::Branch(header);
        let a = f.create_inst(header, InstKind::Phi { incoming: Vec::new() }, Default::default());
        let b = f.create_inst(header, InstKind::Phi { incoming: Vec::new() }, Default::default());
        f.blocks[header].insts.extend([a, b]);
        if let InstKind::Phi { incoming } = &mut f.insts[a].kind {
            *incoming = vec![(entry, Operand::Value(x)), (latch, Operand::Value(b))];
        }
        if let InstKind::Phi { incoming } = &mut f.insts[b].kind {
            *incoming = vec![(entry, Operand::Value(y)), (latch, Operand::Value(a))];
        }
        let cond = f.append(header, InstKind::LoadParam(3), Default::default());
        f.blocks[header].term = Terminator::CondBranch {
            cond: Operand::Value(cond),
            then_block: latch,
            else_block: exit,
        };
        f.blocks[latch].term = Terminator::Branch(header);
        let out = f.append(
            exit,
            InstKind::Binary {
                op: BinaryOp::Sub,
                lhs: Operand::Value(a),
                rhs: Operand::Value(b),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[exit].term = Terminator::Return(Operand::Value(out));
        f.recompute_preds();

        let alloc = allocate(&mut f, &CompileOptions::default()).expect("allocates");
        check_no_overlap(&alloc);
        let moves = &alloc.copies[&latch];
        let (ra, rb) = (alloc.register_of(a).expect("a"), alloc.register_of(b).expect("b"));
        let mut regs: HashMap<u32, u32> = [(ra, 1), (rb, 2)].into_iter().collect();
        run_moves(moves, &mut regs);
        assert_eq!((regs[&ra], regs[&rb]), (2, 1));
        assert!(alloc.scratch.is_some());
    }

    #[test]
    fn test_constant_phi_inputs_are_materialized() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let then = f.add_block(None);
        let join = f.add_block(None);
        let c = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::CondBranch {
            cond: Operand::Value(c),
            then_block: then,
            else_block: join,
        };
        f.blocks[then].term = Terminator::Branch(join);
        let phi = f.create_inst(
            join,
            InstKind::Phi {
                incoming: vec![(entry, Operand::Literal(Literal::Null)), (then, Operand::number(4.0))],
            },
            Default::default(),
        );
        f.blocks[join].insts.push(phi);
        f.blocks[join].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();

        let alloc = allocate(&mut f, &CompileOptions::default()).expect("allocates");
        check_no_overlap(&alloc);
        // The entry edge was split and both predecessors now carry a copy
        // (or share the phi's register).
        for &pred in &f.blocks[join].preds {
            assert!(matches!(f.blocks[pred].term, Terminator::Branch(_)));
            let last = *f.blocks[pred].insts.last().expect("constant load");
            assert!(matches!(f.insts[last].kind, InstKind::LoadConst(_)));
        }
    }
}
