// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generator and async function lowering.
//!
//! A resumable source function compiles to two IR functions. The outer one
//! binds parameters into its function-scope environment and returns a
//! generator object (wrapped by `spawnAsync` for async functions). The
//! inner `$resume` function is the state machine the runtime calls with
//! `(action, value)`:
//!
//! | action | meaning                   |
//! |--------|---------------------------|
//! | 0      | `next(value)`             |
//! | 1      | `throw(value)`            |
//! | 2      | `return(value)`           |
//!
//! Every suspension returns an iterator result `{ value, done }` and records
//! the state to resume from in the `%state` slot; `-1` marks completion.
//! Values that live across a suspension are spilled to the environment
//! after the body is built.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ir::cfg::{DomTree, inst_positions, value_dominates};
use crate::ir::{
    BinaryOp, BlockId, Builtin, Function, FunctionId, InstKind, Literal, Operand, Terminator, ValueId, VarId, Variable,
};
use crate::sema::{FuncIndex, ScopeId};

use super::{Body, FnLowering, ModuleLowering, Storage};

const ACTION_THROW: f64 = 1.0;
const ACTION_RETURN: f64 = 2.0;
const STATE_DONE: f64 = -1.0;

/// State of a resumable body under construction.
pub(super) struct Resume {
    /// Function scope holding the state and spilled values
    pub(super) scope: ScopeId,
    pub(super) state_slot: VarId,
    pub(super) this_slot: VarId,
    next_state: u32,
    /// Resume points by state number
    points: Vec<(u32, BlockId)>,
}

pub(super) fn compile_resumable<'a>(m: &mut ModuleLowering<'a>, idx: FuncIndex, body: Body<'a>) {
    let model = m.model;
    let info = model.function(idx);
    let outer_id = FunctionId(idx.0);
    let Some(&(state_slot, this_slot)) = m.resume_slots.get(&idx) else {
        m.fail(&info.name, "resumable function without state slots");
        return;
    };

    let mut inner = Function::new(format!("{}$resume", info.name), info.kind);
    inner.strict = info.strict;
    inner.flags.resumable = true;
    inner.flags.generator = info.is_generator;
    inner.flags.is_async = info.is_async;
    inner.param_count = 2;
    inner.parent = Some(outer_id);
    inner.env_scope = Some(info.scope);
    inner.span = m.module.functions[outer_id].span;
    let inner_id = m.module.functions.push(inner.clone());

    // Outer: bind the arguments and hand out the generator.
    let template = std::mem::replace(&mut m.module.functions[outer_id], Function::new("", info.kind));
    let mut outer = FnLowering::new(m, idx, template);
    outer.prologue(body);
    outer.store_storage(&Storage::Env(info.scope, state_slot), Operand::number(0.0));
    let env = outer.env_for(info.scope);
    let generator = outer.emit(InstKind::CreateGenerator {
        inner: inner_id,
        env: Some(env),
    });
    let result = if info.is_async {
        outer.emit(InstKind::CallBuiltin {
            builtin: Builtin::SpawnAsync,
            args: vec![generator],
        })
    } else {
        generator
    };
    outer.b.ret(result);
    let outer_fn = outer.finish();
    m.module.functions[outer_id] = outer_fn;

    // Inner: the state machine.
    let mut lowering = FnLowering::new(m, idx, inner);
    lowering.id = inner_id;
    lowering.resume = Some(Resume {
        scope: info.scope,
        state_slot,
        this_slot,
        next_state: 1,
        points: Vec::new(),
    });
    let env = lowering.emit(InstKind::GetParentScope);
    lowering.envs.push((info.scope, env.clone()));
    let action = lowering.emit(InstKind::LoadParam(1));
    let sent = lowering.emit(InstKind::LoadParam(2));
    let state = lowering.load_storage(&Storage::Env(info.scope, state_slot));
    let dispatch = lowering.b.block();
    let finished = lowering.b.create_block();

    // Anything thrown out of the body completes the generator.
    let on_throw = lowering.b.create_block();
    lowering.b.set_handler(Some(on_throw));
    let start = lowering.b.create_block();
    lowering.b.terminate(Terminator::Switch {
        value: state,
        cases: Vec::new(),
        default: finished,
    });

    lowering.b.switch_to(start);
    lowering.compile_body(body);

    lowering.b.set_handler(None);
    lowering.b.switch_to(on_throw);
    let exception = lowering.emit(InstKind::Catch);
    lowering.store_storage(&Storage::Env(info.scope, state_slot), Operand::number(STATE_DONE));
    lowering.b.throw(exception);

    // A completed generator echoes `throw` and `return` requests.
    lowering.b.switch_to(finished);
    lowering.dispatch_action(action, sent.clone(), |l| {
        let result = l.iter_result(sent.clone(), true);
        l.b.ret(result);
    });
    let result = lowering.iter_result(Operand::UNDEFINED, true);
    lowering.b.ret(result);

    let points = lowering.resume.take().map(|r| r.points).unwrap_or_default();
    let mut cases = vec![(Literal::Number(0.0), start)];
    cases.extend(points.iter().map(|&(k, b)| (Literal::Number(f64::from(k)), b)));
    if let Terminator::Switch { cases: slot, .. } = &mut lowering.b.func_mut().blocks[dispatch].term {
        *slot = cases;
    }

    let mut inner_fn = lowering.finish();
    let Some(env_value) = env.value() else { return };
    let spilled = spill_suspended_values(m, &mut inner_fn, info.scope, env_value, outer_id);
    debug!(function = %inner_fn.name, states = points.len() + 1, spilled, "lowered resumable body");
    m.module.functions[inner_id] = inner_fn;
}

impl<'a, 'm> FnLowering<'a, 'm> {
    /// Ends a resumable body: marks it done and reports the final value.
    pub(super) fn complete_resumable(&mut self, value: Operand) {
        let Some(resume) = &self.resume else { return };
        let slot = Storage::Env(resume.scope, resume.state_slot);
        self.store_storage(&slot, Operand::number(STATE_DONE));
        let result = self.iter_result(value, true);
        self.b.ret(result);
    }

    /// Returns `value` to the caller and continues in a fresh resume block,
    /// yielding the `(action, value)` pair the body was resumed with.
    fn suspend(&mut self, value: Operand) -> (Operand, Operand) {
        let Some(resume) = self.resume.as_mut() else {
            self.fail("suspension outside of a resumable function");
            return (Operand::UNDEFINED, Operand::UNDEFINED);
        };
        let state = resume.next_state;
        resume.next_state += 1;
        let slot = Storage::Env(resume.scope, resume.state_slot);
        self.store_storage(&slot, Operand::number(f64::from(state)));
        self.b.ret(value);

        let block = self.b.create_block();
        if let Some(resume) = self.resume.as_mut() {
            resume.points.push((state, block));
        }
        self.b.switch_to(block);
        let action = self.emit(InstKind::LoadParam(1));
        let sent = self.emit(InstKind::LoadParam(2));
        (action, sent)
    }

    /// Throws `sent` on a throw action, runs `on_return` on a return action
    /// and otherwise continues in a new block.
    fn dispatch_action(&mut self, action: Operand, sent: Operand, on_return: impl FnOnce(&mut Self)) {
        let is_throw = self.binary(BinaryOp::StrictEq, action.clone(), Operand::number(ACTION_THROW));
        let throw_block = self.b.create_block();
        let not_throw = self.b.create_block();
        self.b.cond_branch(is_throw, throw_block, not_throw);
        self.b.switch_to(throw_block);
        self.b.throw(sent);

        self.b.switch_to(not_throw);
        let is_return = self.binary(BinaryOp::StrictEq, action, Operand::number(ACTION_RETURN));
        let return_block = self.b.create_block();
        let resume = self.b.create_block();
        self.b.cond_branch(is_return, return_block, resume);
        self.b.switch_to(return_block);
        on_return(self);

        self.b.switch_to(resume);
    }

    pub(super) fn compile_yield(&mut self, y: &'a crate::ast::YieldExpression) -> Operand {
        let value = match &y.argument {
            Some(arg) => self.compile_expression(arg),
            None => Operand::UNDEFINED,
        };
        if y.delegate {
            return self.compile_yield_star(value);
        }
        let result = self.iter_result(value, false);
        let (action, sent) = self.suspend(result);
        self.dispatch_action(action, sent.clone(), |l| l.compile_return(sent.clone()));
        sent
    }

    pub(super) fn compile_await(&mut self, value: Operand) -> Operand {
        let result = self.iter_result(value, false);
        let (action, sent) = self.suspend(result);
        let is_throw = self.binary(BinaryOp::StrictEq, action, Operand::number(ACTION_THROW));
        let throw_block = self.b.create_block();
        let resume = self.b.create_block();
        self.b.cond_branch(is_throw, throw_block, resume);
        self.b.switch_to(throw_block);
        self.b.throw(sent.clone());
        self.b.switch_to(resume);
        sent
    }

    /// `yield* iterable`: forwards every request to the inner iterator and
    /// passes its results through unchanged.
    fn compile_yield_star(&mut self, iterable: Operand) -> Operand {
        let iterator = self.emit(InstKind::GetIterator { iterable });
        let next = self.emit(InstKind::LoadNamed {
            object: iterator.clone(),
            name: "next".to_string(),
        });
        let action_slot = self.new_temp("delegate.action");
        let sent_slot = self.new_temp("delegate.sent");
        let result_slot = self.new_temp("delegate.result");
        self.store_storage(&action_slot, Operand::number(0.0));
        self.store_storage(&sent_slot, Operand::UNDEFINED);

        let header = self.b.create_block();
        let got = self.b.create_block();
        let exit = self.b.create_block();
        self.goto(header);
        let action = self.load_storage(&action_slot);
        let sent = self.load_storage(&sent_slot);

        // throw: forward, or close and fail when the iterator cannot take it.
        let is_throw = self.binary(BinaryOp::StrictEq, action.clone(), Operand::number(ACTION_THROW));
        let throw_block = self.b.create_block();
        let not_throw = self.b.create_block();
        self.b.cond_branch(is_throw, throw_block, not_throw);
        self.b.switch_to(throw_block);
        let method = self.emit(InstKind::LoadNamed {
            object: iterator.clone(),
            name: "throw".to_string(),
        });
        let missing = self.binary(BinaryOp::Eq, method.clone(), Operand::Literal(Literal::Null));
        let no_throw = self.b.create_block();
        let call_throw = self.b.create_block();
        self.b.cond_branch(missing, no_throw, call_throw);
        self.b.switch_to(no_throw);
        self.emit(InstKind::IteratorClose {
            iterator: iterator.clone(),
            on_throw: false,
        });
        self.throw_type_error("The iterator does not provide a 'throw' method");
        self.b.terminate(Terminator::Unreachable);
        self.b.switch_to(call_throw);
        let result = self.emit(InstKind::Call {
            callee: method,
            this: iterator.clone(),
            args: vec![sent.clone()],
        });
        self.store_storage(&result_slot, result);
        self.b.branch(got);

        // return: forward, finishing this generator once the inner one is done.
        self.b.switch_to(not_throw);
        let is_return = self.binary(BinaryOp::StrictEq, action, Operand::number(ACTION_RETURN));
        let return_block = self.b.create_block();
        let next_block = self.b.create_block();
        self.b.cond_branch(is_return, return_block, next_block);
        self.b.switch_to(return_block);
        let method = self.emit(InstKind::LoadNamed {
            object: iterator.clone(),
            name: "return".to_string(),
        });
        let missing = self.binary(BinaryOp::Eq, method.clone(), Operand::Literal(Literal::Null));
        let no_return = self.b.create_block();
        let call_return = self.b.create_block();
        self.b.cond_branch(missing, no_return, call_return);
        self.b.switch_to(no_return);
        self.compile_return(sent.clone());
        self.b.switch_to(call_return);
        let result = self.emit(InstKind::Call {
            callee: method,
            this: iterator.clone(),
            args: vec![sent.clone()],
        });
        let result = self.emit(InstKind::CallBuiltin {
            builtin: Builtin::EnsureObject,
            args: vec![result],
        });
        let done = self.emit(InstKind::LoadNamed {
            object: result.clone(),
            name: "done".to_string(),
        });
        let finish = self.b.create_block();
        let keep_going = self.b.create_block();
        self.b.cond_branch(done, finish, keep_going);
        self.b.switch_to(finish);
        let value = self.emit(InstKind::LoadNamed {
            object: result.clone(),
            name: "value".to_string(),
        });
        self.compile_return(value);
        self.b.switch_to(keep_going);
        self.store_storage(&result_slot, result);
        self.b.branch(got);

        // next
        self.b.switch_to(next_block);
        let result = self.emit(InstKind::Call {
            callee: next,
            this: iterator,
            args: vec![sent],
        });
        self.store_storage(&result_slot, result);
        self.b.branch(got);

        self.b.switch_to(got);
        let result = self.load_storage(&result_slot);
        let result = self.emit(InstKind::CallBuiltin {
            builtin: Builtin::EnsureObject,
            args: vec![result],
        });
        let done = self.emit(InstKind::LoadNamed {
            object: result.clone(),
            name: "done".to_string(),
        });
        let forward = self.b.create_block();
        self.b.cond_branch(done, exit, forward);

        self.b.switch_to(forward);
        let (action, sent) = self.suspend(result.clone());
        self.store_storage(&action_slot, action);
        self.store_storage(&sent_slot, sent);
        self.b.branch(header);

        self.b.switch_to(exit);
        self.emit(InstKind::LoadNamed {
            object: result,
            name: "value".to_string(),
        })
    }
}

/// Moves values used across a suspension into environment slots: each such
/// value is stored right after its definition and reloaded before every use
/// its definition no longer dominates. Returns the number of spilled values.
fn spill_suspended_values(
    m: &mut ModuleLowering<'_>,
    f: &mut Function,
    scope: ScopeId,
    env: ValueId,
    owner: FunctionId,
) -> usize {
    let dom = DomTree::compute(f);
    let pos = inst_positions(f);

    // (def, user inst or None for the terminator, user block)
    let mut broken: Vec<(ValueId, Option<ValueId>, BlockId)> = Vec::new();
    for b in dom.rpo().to_vec() {
        for &v in &f.blocks[b].insts {
            f.insts[v].kind.visit_operands(|op| {
                if let Operand::Value(def) = op {
                    let entry = (*def, Some(v), b);
                    if dom.is_reachable(f.insts[*def].block)
                        && !value_dominates(f, &dom, &pos, *def, v)
                        && !broken.contains(&entry)
                    {
                        broken.push(entry);
                    }
                }
            });
        }
        if let Some(Operand::Value(def)) = f.blocks[b].term.operand() {
            let db = f.insts[*def].block;
            if dom.is_reachable(db) && !dom.dominates(db, b) {
                broken.push((*def, None, b));
            }
        }
    }
    if broken.is_empty() {
        return 0;
    }

    let mut slots: FxHashMap<ValueId, VarId> = FxHashMap::default();
    let env_op = Operand::Value(env);
    for (def, user, block) in broken {
        let var = match slots.get(&def) {
            Some(&var) => var,
            None => {
                let var = m.module.vars.push(Variable {
                    name: format!("%spill{}", def.0),
                    decl: None,
                    scope,
                    function: owner,
                    captured: true,
                    immutable: false,
                    primitive: false,
                });
                if let Some(desc) = m.module.scopes.get_mut(&scope) {
                    desc.slots.push(var);
                }
                let def_block = f.insts[def].block;
                let at = f.blocks[def_block].insts.iter().position(|&x| x == def).map_or(0, |i| i + 1);
                let span = f.insts[def].span;
                let store = f.insert(
                    def_block,
                    at,
                    InstKind::StoreEnv {
                        env: env_op.clone(),
                        var,
                        value: Operand::Value(def),
                    },
                    span,
                );
                f.insts[store].scope = f.insts[def].scope;
                slots.insert(def, var);
                var
            }
        };
        let load_kind = InstKind::LoadEnv { env: env_op.clone(), var };
        let reload = match user {
            Some(user) => {
                let at = f.blocks[block].insts.iter().position(|&x| x == user).unwrap_or(0);
                let span = f.insts[user].span;
                let reload = f.insert(block, at, load_kind, span);
                f.insts[user].kind.visit_operands_mut(|op| {
                    if *op == Operand::Value(def) {
                        *op = Operand::Value(reload);
                    }
                });
                reload
            }
            None => {
                let span = f.blocks[block].term_span;
                let reload = f.append(block, load_kind, span);
                if let Some(op) = f.blocks[block].term.operand_mut() {
                    *op = Operand::Value(reload);
                }
                reload
            }
        };
        f.insts[reload].scope = f.insts[def].scope;
    }
    slots.len()
}
