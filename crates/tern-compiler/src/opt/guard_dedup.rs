// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Removal of dominated dead-zone guards.
//!
//! Once a binding has been observed initialized it stays initialized, so a
//! `ThrowIfEmpty` for the same binding in a dominated position is dead. A
//! handler does not inherit the guards of the block that throws into it:
//! the throw may happen before those guards ran.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::cfg::DomTree;
use crate::ir::{BlockId, Function, InstKind, Operand, ValueId, VarId};

use super::{FunctionPass, PassContext, apply_replacements};

/// Deduplicates `ThrowIfEmpty` guards along the dominator tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardDedup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Guarded {
    Var(VarId),
    Value(ValueId),
}

impl FunctionPass for GuardDedup {
    fn name(&self) -> &'static str {
        "guard-dedup"
    }

    fn run_on_function(&self, f: &mut Function, _cx: &PassContext<'_>) -> bool {
        let dom = DomTree::compute(f);
        let children = dom.children();
        let mut replacements: FxHashMap<ValueId, Operand> = FxHashMap::default();

        let mut walk: Vec<(BlockId, FxHashSet<Guarded>)> = vec![(f.entry, FxHashSet::default())];
        while let Some((b, on_entry)) = walk.pop() {
            let mut seen = on_entry.clone();
            for &v in &f.blocks[b].insts {
                let InstKind::ThrowIfEmpty { value, var } = &f.insts[v].kind else {
                    continue;
                };
                let key = match (var, value) {
                    (Some(var), _) => Guarded::Var(*var),
                    (None, Operand::Value(u)) => Guarded::Value(*u),
                    (None, Operand::Literal(_)) => continue,
                };
                if !seen.insert(key) {
                    replacements.insert(v, value.clone());
                }
            }
            let handler = f.blocks[b].handler;
            for &child in &children[b] {
                let inherited = if handler == Some(child) { on_entry.clone() } else { seen.clone() };
                walk.push((child, inherited));
            }
        }

        if replacements.is_empty() {
            return false;
        }
        apply_replacements(f, &replacements);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::index::IndexVec;
    use crate::ir::Terminator;
    use crate::sema::FunctionKind;

    fn run(f: &mut Function) -> bool {
        let vars = IndexVec::new();
        let options = CompileOptions::default();
        GuardDedup.run_on_function(f, &PassContext { vars: &vars, options: &options })
    }

    fn guards(f: &Function) -> usize {
        f.live_blocks()
            .flat_map(|b| f.blocks[b].insts.iter())
            .filter(|&&v| matches!(f.insts[v].kind, InstKind::ThrowIfEmpty { .. }))
            .count()
    }

    #[test]
    fn test_dominated_guard_removed() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let next = f.add_block(None);
        let x = VarId(0);
        let env = f.append(entry, InstKind::GetParentScope, Default::default());
        let load = f.append(entry, InstKind::LoadEnv { env: Operand::Value(env), var: x }, Default::default());
        f.append(
            entry,
            InstKind::ThrowIfEmpty {
                value: Operand::Value(load),
                var: Some(x),
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Branch(next);
        let again = f.append(next, InstKind::LoadEnv { env: Operand::Value(env), var: x }, Default::default());
        let second = f.append(
            next,
            InstKind::ThrowIfEmpty {
                value: Operand::Value(again),
                var: Some(x),
            },
            Default::default(),
        );
        f.blocks[next].term = Terminator::Return(Operand::Value(second));
        f.recompute_preds();

        assert!(run(&mut f));
        assert_eq!(guards(&f), 1);
        assert_eq!(f.blocks[next].term, Terminator::Return(Operand::Value(again)));
        assert!(!run(&mut f));
    }

    #[test]
    fn test_handler_does_not_inherit_guards_of_throwing_block() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let handler = f.add_block(None);
        let body = f.add_block(Some(handler));
        let x = VarId(0);
        f.blocks[entry].term = Terminator::Branch(body);
        let l = f.append(body, InstKind::LoadLocal(x), Default::default());
        f.append(body, InstKind::ThrowIfEmpty { value: Operand::Value(l), var: Some(x) }, Default::default());
        f.blocks[body].term = Terminator::Return(Operand::UNDEFINED);
        f.append(handler, InstKind::Catch, Default::default());
        let l2 = f.append(handler, InstKind::LoadLocal(x), Default::default());
        f.append(handler, InstKind::ThrowIfEmpty { value: Operand::Value(l2), var: Some(x) }, Default::default());
        f.blocks[handler].term = Terminator::Return(Operand::UNDEFINED);
        f.recompute_preds();

        assert!(!run(&mut f));
        assert_eq!(guards(&f), 2);
    }
}
