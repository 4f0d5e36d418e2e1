// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Relabels local registers so the busiest ones get the smallest numbers and
//! fit the short instruction encodings.

use crate::ir::{Function, InstKind, Operand};

use super::Allocation;

/// Permutes the local registers of `alloc` by descending use count. Ties
/// keep their relative order. The outgoing-argument range is not touched.
pub fn renumber(f: &Function, alloc: &mut Allocation) {
    let n = alloc.local_count as usize;
    if n == 0 {
        return;
    }
    let mut uses = vec![0u32; n];
    let mut bump = |reg: Option<u32>| {
        if let Some(r) = reg {
            if let Some(c) = uses.get_mut(r as usize) {
                *c += 1;
            }
        }
    };

    for &b in &alloc.order {
        for &v in &f.blocks[b].insts {
            let kind = &f.insts[v].kind;
            if matches!(kind, InstKind::Phi { .. }) {
                continue;
            }
            bump(alloc.register_of(v));
            kind.visit_operands(|op| bump(alloc.operand_register(op)));
            if let InstKind::LoadLocal(var) | InstKind::StoreLocal { var, .. } = kind {
                bump(alloc.var_registers.get(var).copied());
            }
        }
        if let Some(op @ Operand::Value(_)) = f.blocks[b].term.operand() {
            bump(alloc.operand_register(op));
        }
        if let Some(moves) = alloc.copies.get(&b) {
            for m in moves {
                bump(Some(m.dst));
                bump(Some(m.src));
            }
        }
    }

    let mut by_use: Vec<u32> = (0..n as u32).collect();
    by_use.sort_by_key(|&r| std::cmp::Reverse(uses[r as usize]));
    let mut relabel = vec![0u32; n];
    for (new, &old) in by_use.iter().enumerate() {
        relabel[old as usize] = new as u32;
    }
    let map = |r: u32| relabel.get(r as usize).copied().unwrap_or(r);

    for reg in alloc.registers.iter_mut().flatten() {
        *reg = map(*reg);
    }
    for reg in alloc.var_registers.values_mut() {
        *reg = map(*reg);
    }
    for moves in alloc.copies.values_mut() {
        for m in moves {
            m.dst = map(m.dst);
            m.src = map(m.src);
        }
    }
    alloc.scratch = alloc.scratch.map(map);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::ir::{BinaryOp, NumericForm, Terminator, ValueId};
    use crate::regalloc::allocate;
    use crate::sema::FunctionKind;

    /// One value read many times next to values read once.
    fn hot_function() -> (Function, ValueId) {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let add = |lhs: ValueId, rhs: ValueId| InstKind::Binary {
            op: BinaryOp::Add,
            lhs: Operand::Value(lhs),
            rhs: Operand::Value(rhs),
            form: NumericForm::Generic,
        };
        let cold = f.append(entry, InstKind::LoadParam(1), Default::default());
        let hot = f.append(entry, InstKind::LoadParam(2), Default::default());
        for _ in 0..4 {
            f.append(entry, add(hot, hot), Default::default());
        }
        let result = f.append(entry, add(cold, hot), Default::default());
        f.blocks[entry].term = Terminator::Return(Operand::Value(result));
        (f, hot)
    }

    #[test]
    fn test_busiest_register_becomes_zero() {
        let (mut f, hot) = hot_function();
        let options = CompileOptions::default();
        let alloc = allocate(&mut f, &options).expect("allocates");
        assert_eq!(alloc.register_of(hot), Some(0));
    }

    #[test]
    fn test_renumbering_is_a_permutation() {
        let (mut plain_f, _) = hot_function();
        let plain = allocate(
            &mut plain_f,
            &CompileOptions {
                renumber_registers: false,
                ..CompileOptions::default()
            },
        )
        .expect("allocates");
        let (mut f, _) = hot_function();
        let renumbered = allocate(&mut f, &CompileOptions::default()).expect("allocates");

        assert_eq!(plain.local_count, renumbered.local_count);
        // Values sharing a register before still share one after.
        let values: Vec<ValueId> = plain.registers.indices().collect();
        for &a in &values {
            for &b in &values {
                let same_before = plain.register_of(a).is_some() && plain.register_of(a) == plain.register_of(b);
                let same_after = renumbered.register_of(a).is_some() && renumbered.register_of(a) == renumbered.register_of(b);
                assert_eq!(same_before, same_after);
            }
        }
    }
}
