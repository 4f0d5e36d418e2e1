// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Inlining of calls to known closures.
//!
//! A call site is a candidate when its callee provably evaluates to a
//! closure of one function: either a `CreateClosure` directly or a phi whose
//! inputs all are. Safety is decided here; profitability is delegated to the
//! configured [`InlinePolicy`](crate::config::InlinePolicy).
//!
//! The callee body is copied between the two halves of the caller's block:
//! parameters become the call's arguments, the parent environment becomes
//! the closure's environment, and every return jumps to the continuation.
//! Copied blocks inherit the caller block's handler, so exceptions thrown by
//! the inlined body reach the same `catch` as before.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::{CompileOptions, InlineCandidate, InlinePolicy};
use crate::ir::cfg::reverse_postorder;
use crate::ir::{BlockId, Builtin, Function, FunctionId, InstKind, Module, Operand, Terminator, ValueId};
use crate::sema::FunctionKind;

use super::{ModulePass, remove_unreachable_blocks};

/// Inlines small non-recursive callees.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inlining;

impl ModulePass for Inlining {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run_on_module(&self, module: &mut Module, options: &CompileOptions) -> bool {
        let policy = options.inline_policy.clone();
        let mut changed = false;
        for caller in module.functions.indices() {
            while let Some(site) = find_site(module, caller, policy.as_ref()) {
                debug!(
                    caller = %module.functions[caller].name,
                    callee = %module.functions[site.callee].name,
                    "inlining call"
                );
                let callee = module.functions[site.callee].clone();
                splice(&mut module.functions[caller], &callee, site);
                changed = true;
            }
        }
        changed
    }
}

/// Where the callee's parent environment comes from.
#[derive(Debug, Clone)]
enum EnvSource {
    /// The env operand of the `CreateClosure` that produced the callee
    Direct(Option<Operand>),
    /// Read back from the closure value at the call site
    FromClosure(Operand),
}

#[derive(Debug)]
struct CallSite {
    call: ValueId,
    callee: FunctionId,
    env: EnvSource,
}

fn find_site(module: &Module, caller: FunctionId, policy: &dyn InlinePolicy) -> Option<CallSite> {
    let f = &module.functions[caller];
    let mut eligible: FxHashMap<FunctionId, bool> = FxHashMap::default();
    for b in f.live_blocks() {
        for &v in &f.blocks[b].insts {
            let InstKind::Call { callee, .. } = &f.insts[v].kind else { continue };
            let Some((g, env)) = resolve_callee(f, callee, &mut FxHashSet::default()) else {
                continue;
            };
            if g == caller {
                continue;
            }
            let callee_fn = &module.functions[g];
            if !*eligible.entry(g).or_insert_with(|| is_inlinable(callee_fn, g)) {
                continue;
            }
            if callee_fn.env_scope.is_some() && matches!(env, EnvSource::Direct(None)) {
                continue;
            }
            let candidate = InlineCandidate {
                caller: f.name.clone(),
                callee: callee_fn.name.clone(),
                callee_instructions: callee_fn.instruction_count(),
                inlined_into_caller: f.inline_count as usize,
                depth: f.insts[v].inline_depth as usize,
            };
            if policy.should_inline(&candidate) {
                return Some(CallSite { call: v, callee: g, env });
            }
        }
    }
    None
}

/// The function a callee operand always evaluates to a closure of.
fn resolve_callee(f: &Function, op: &Operand, seen: &mut FxHashSet<ValueId>) -> Option<(FunctionId, EnvSource)> {
    let Operand::Value(v) = op else { return None };
    if !seen.insert(*v) {
        return None;
    }
    match &f.insts[*v].kind {
        InstKind::CreateClosure { function, env } => Some((*function, EnvSource::Direct(env.clone()))),
        InstKind::Phi { incoming } => {
            let mut target = None;
            for (_, input) in incoming {
                if *input == *op {
                    continue;
                }
                let (g, _) = resolve_callee(f, input, seen)?;
                match target {
                    None => target = Some(g),
                    Some(prev) if prev == g => {}
                    Some(_) => return None,
                }
            }
            target.map(|g| (g, EnvSource::FromClosure(op.clone())))
        }
        _ => None,
    }
}

/// Whether a function's body can be copied into a caller unchanged.
fn is_inlinable(g: &Function, id: FunctionId) -> bool {
    let flags = g.flags;
    if flags.resumable || flags.generator || flags.is_async || flags.uses_arguments || flags.uses_new_target {
        return false;
    }
    if !matches!(g.kind, FunctionKind::Normal | FunctionKind::Arrow | FunctionKind::Method) {
        return false;
    }
    for b in g.live_blocks() {
        if g.blocks[b].handler.is_some() {
            return false;
        }
        for &v in &g.blocks[b].insts {
            let ok = match &g.insts[v].kind {
                InstKind::Catch
                | InstKind::LoadLocal(_)
                | InstKind::StoreLocal { .. }
                | InstKind::CreateArguments
                | InstKind::GetNewTarget => false,
                InstKind::CallBuiltin {
                    builtin: Builtin::RestArguments,
                    ..
                } => false,
                InstKind::CreateClosure { function, .. } => *function != id,
                // Sloppy functions coerce their receiver on entry.
                InstKind::LoadParam(0) => g.strict,
                _ => true,
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

fn splice(f: &mut Function, g: &Function, site: CallSite) {
    let call = site.call;
    let InstKind::Call { this, args, .. } = f.insts[call].kind.clone() else {
        return;
    };
    let depth = f.insts[call].inline_depth + 1;
    let span = f.insts[call].span;
    let block = f.insts[call].block;
    let handler = f.blocks[block].handler;

    // Split the block after the call.
    let Some(at) = f.blocks[block].insts.iter().position(|&v| v == call) else {
        return;
    };
    let cont = f.add_block(handler);
    let tail = f.blocks[block].insts.split_off(at + 1);
    f.blocks[block].insts.pop();
    for &v in &tail {
        f.insts[v].block = cont;
    }
    f.blocks[cont].insts = tail;
    let term = std::mem::replace(&mut f.blocks[block].term, Terminator::Unreachable);
    let mut targets = term.targets();
    targets.sort();
    targets.dedup();
    for t in targets {
        f.rename_phi_incoming(t, block, cont);
    }
    f.blocks[cont].term = term;
    f.blocks[cont].term_span = f.blocks[block].term_span;

    let env = match site.env {
        EnvSource::Direct(env) => env,
        EnvSource::FromClosure(closure) if g.env_scope.is_some() => {
            Some(Operand::Value(f.append(block, InstKind::GetClosureScope { closure }, span)))
        }
        EnvSource::FromClosure(_) => None,
    };

    // Copy blocks and instructions; operands are remapped once every value exists.
    let order = reverse_postorder(g);
    let block_map: FxHashMap<BlockId, BlockId> = order.iter().map(|&gb| (gb, f.add_block(handler))).collect();
    let mut values: FxHashMap<ValueId, Operand> = FxHashMap::default();
    let mut copied: Vec<ValueId> = Vec::new();
    for &gb in &order {
        let nb = block_map[&gb];
        for &gv in &g.blocks[gb].insts {
            let source = &g.insts[gv];
            let mapped = match &source.kind {
                InstKind::LoadParam(0) => Some(this.clone()),
                InstKind::LoadParam(i) => Some(args.get(*i as usize - 1).cloned().unwrap_or(Operand::UNDEFINED)),
                InstKind::GetParentScope => Some(env.clone().unwrap_or(Operand::UNDEFINED)),
                _ => None,
            };
            if let Some(op) = mapped {
                values.insert(gv, op);
                continue;
            }
            let nv = f.append(nb, source.kind.clone(), source.span);
            f.insts[nv].ty = source.ty;
            f.insts[nv].scope = source.scope;
            f.insts[nv].inline_depth = depth + source.inline_depth;
            values.insert(gv, Operand::Value(nv));
            copied.push(nv);
        }
    }
    let remap = |op: &mut Operand| {
        if let Operand::Value(u) = op {
            if let Some(new) = values.get(u) {
                *op = new.clone();
            }
        }
    };
    for &nv in &copied {
        let kind = &mut f.insts[nv].kind;
        kind.visit_operands_mut(remap);
        if let InstKind::Phi { incoming } = kind {
            for (pred, _) in incoming.iter_mut() {
                if let Some(&nb) = block_map.get(pred) {
                    *pred = nb;
                }
            }
        }
    }

    let mut returns: Vec<(BlockId, Operand)> = Vec::new();
    for &gb in &order {
        let nb = block_map[&gb];
        let map = |b: &BlockId| block_map.get(b).copied().unwrap_or(*b);
        let mut term = match &g.blocks[gb].term {
            Terminator::Branch(t) => Terminator::Branch(map(t)),
            Terminator::CondBranch { cond, then_block, else_block } => Terminator::CondBranch {
                cond: cond.clone(),
                then_block: map(then_block),
                else_block: map(else_block),
            },
            Terminator::Switch { value, cases, default } => Terminator::Switch {
                value: value.clone(),
                cases: cases.iter().map(|(lit, t)| (lit.clone(), map(t))).collect(),
                default: map(default),
            },
            Terminator::Return(value) => {
                let mut value = value.clone();
                remap(&mut value);
                returns.push((nb, value));
                Terminator::Branch(cont)
            }
            Terminator::Throw(value) => Terminator::Throw(value.clone()),
            Terminator::Unreachable => Terminator::Unreachable,
        };
        if let Some(op) = term.operand_mut() {
            remap(op);
        }
        f.blocks[nb].term = term;
        f.blocks[nb].term_span = g.blocks[gb].term_span;
    }

    f.blocks[block].term = Terminator::Branch(block_map[&g.entry]);
    let result = match returns.len() {
        0 => Operand::UNDEFINED,
        1 => returns[0].1.clone(),
        _ => {
            let phi = f.insert(cont, 0, InstKind::Phi { incoming: returns }, span);
            Operand::Value(phi)
        }
    };
    f.replace_all_uses(call, &result);
    f.inline_count += 1;
    f.recompute_preds();
    remove_unreachable_blocks(f);
}
