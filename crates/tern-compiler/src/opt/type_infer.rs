// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Type inference and specialization.
//!
//! Types start at the bottom of the lattice and grow until nothing changes,
//! which lets loop-carried numbers stay numbers. With the fixpoint in hand:
//!
//! - arithmetic and comparisons on proven numbers switch to the Number or
//!   Int32 form;
//! - dead-zone guards on values that cannot be empty disappear;
//! - `typeof` of a value confined to one kind becomes a string constant.

use rustc_hash::FxHashMap;

use crate::index::IndexVec;
use crate::ir::cfg::reverse_postorder;
use crate::ir::{BinaryOp, Builtin, Function, InstKind, NumericForm, Operand, Type, UnaryOp, ValueId};

use super::{FunctionPass, PassContext, apply_replacements};

/// Infers value types and specializes operations on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeInference;

impl FunctionPass for TypeInference {
    fn name(&self) -> &'static str {
        "type-infer"
    }

    fn run_on_function(&self, f: &mut Function, cx: &PassContext<'_>) -> bool {
        let types = infer(f, cx);
        let mut changed = false;
        for b in f.live_blocks().collect::<Vec<_>>() {
            for i in 0..f.blocks[b].insts.len() {
                let v = f.blocks[b].insts[i];
                if f.insts[v].ty != types[v] {
                    f.insts[v].ty = types[v];
                    changed = true;
                }
            }
        }

        changed |= specialize(f);

        let mut replacements: FxHashMap<ValueId, Operand> = FxHashMap::default();
        let strict_tdz = cx.options.passes.strict_tdz;
        for b in f.live_blocks() {
            for &v in &f.blocks[b].insts {
                match &f.insts[v].kind {
                    InstKind::ThrowIfEmpty { value, .. } if !strict_tdz => {
                        let ty = f.operand_type(value);
                        if !ty.is_none() && !ty.may_be_empty() {
                            replacements.insert(v, value.clone());
                        }
                    }
                    InstKind::Unary {
                        op: UnaryOp::TypeOf,
                        operand,
                        ..
                    } => {
                        if let Some(name) = type_of_name(f.operand_type(operand)) {
                            replacements.insert(v, Operand::string(name));
                        }
                    }
                    _ => {}
                }
            }
        }
        if !replacements.is_empty() {
            apply_replacements(f, &replacements);
            changed = true;
        }
        changed
    }
}

/// Runs the fixpoint and returns the type of every instruction.
fn infer(f: &Function, cx: &PassContext<'_>) -> IndexVec<ValueId, Type> {
    let rpo = reverse_postorder(f);
    let mut types = IndexVec::from_elem(Type::NONE, f.insts.len());
    loop {
        let mut changed = false;
        for &b in &rpo {
            for &v in &f.blocks[b].insts {
                let ty = types[v].union(transfer(cx, &types, &f.insts[v].kind));
                if ty != types[v] {
                    types[v] = ty;
                    changed = true;
                }
            }
        }
        if !changed {
            return types;
        }
    }
}

fn primitive_or_empty() -> Type {
    Type::ANY.without(Type::OBJECT.union(Type::CLOSURE)).union(Type::EMPTY)
}

fn transfer(cx: &PassContext<'_>, types: &IndexVec<ValueId, Type>, kind: &InstKind) -> Type {
    let ty = |op: &Operand| match op {
        Operand::Value(v) => types[*v],
        Operand::Literal(lit) => Type::of_literal(lit),
    };
    use InstKind::*;
    match kind {
        LoadConst(lit) => Type::of_literal(lit),
        LoadParam(_) | LoadGlobal { .. } | Call { .. } | CallWithArgsArray { .. } => Type::ANY,
        LoadNamed { .. } | LoadComputed { .. } | Catch => Type::ANY,
        CreateArguments | GetGlobalObject | AllocObject { .. } | AllocObjectLiteral { .. } | AllocArray { .. } => {
            Type::OBJECT
        }
        CreateRegExp { .. } | CreateGenerator { .. } | GetIterator { .. } => Type::OBJECT,
        GetNewTarget => Type::CLOSURE.union(Type::UNDEFINED),
        CreateClosure { .. } => Type::CLOSURE,
        Construct { .. } | ConstructWithArgsArray { .. } => Type::OBJECT.union(Type::CLOSURE),
        LoadLocal(_) => Type::ANY_OR_EMPTY,
        CreateScope { .. } | GetParentScope | ResolveScope { .. } | GetClosureScope { .. } => Type::ENVIRONMENT,
        LoadEnv { var, .. } => match cx.vars.get(*var) {
            Some(v) if v.primitive => primitive_or_empty(),
            _ => Type::ANY_OR_EMPTY,
        },
        ThrowIfEmpty { value, .. } => ty(value).without(Type::EMPTY),
        Binary { op, lhs, rhs, .. } => binary_type(*op, ty(lhs), ty(rhs)),
        Unary { op, operand, .. } => unary_type(*op, ty(operand)),
        DeleteNamed { .. } | DeleteComputed { .. } => Type::BOOLEAN,
        CallBuiltin { builtin, .. } => match builtin {
            Builtin::SpawnAsync | Builtin::ForInKeys | Builtin::IteratorToArray | Builtin::RestArguments => {
                Type::OBJECT
            }
            Builtin::EnsureObject => Type::OBJECT.union(Type::CLOSURE),
            Builtin::ThrowTypeError | Builtin::ThrowReferenceError => Type::NONE,
            Builtin::CopyDataProperties | Builtin::SetPrototypeOf | Builtin::ArrayPush => Type::ANY,
        },
        Phi { incoming } => incoming.iter().fold(Type::NONE, |acc, (_, op)| acc.union(ty(op))),
        StoreLocal { .. }
        | StoreEnv { .. }
        | StoreGlobal { .. }
        | DeclareGlobalVar { .. }
        | StoreNamed { .. }
        | StoreComputed { .. }
        | DefineOwn { .. }
        | DefineAccessor { .. }
        | SpreadIntoArray { .. }
        | IteratorClose { .. }
        | Debugger => Type::UNDEFINED,
    }
}

/// Whether a numeric operation on these operands may produce a Number, a
/// BigInt, or both.
fn numeric_result(lhs: Type, rhs: Type, number: Type) -> Type {
    let numeric_side = |t: Type| t.without(Type::BIGINT.union(Type::EMPTY).union(Type::ENVIRONMENT));
    let bigint_side = |t: Type| t.may_be_bigint() || t.may_be_object();
    let mut out = Type::NONE;
    if !numeric_side(lhs).is_none() && !numeric_side(rhs).is_none() {
        out = out.union(number);
    }
    if bigint_side(lhs) && bigint_side(rhs) {
        out = out.union(Type::BIGINT);
    }
    out
}

fn binary_type(op: BinaryOp, lhs: Type, rhs: Type) -> Type {
    if lhs.is_none() || rhs.is_none() {
        return Type::NONE;
    }
    use BinaryOp::*;
    match op {
        Add => {
            let stringy = |t: Type| t.overlaps(Type::STRING) || t.may_be_object();
            let mut out = Type::NONE;
            if stringy(lhs) || stringy(rhs) {
                out = out.union(Type::STRING);
            }
            let non_string = |t: Type| t.without(Type::STRING);
            if !non_string(lhs).is_none() && !non_string(rhs).is_none() {
                out = out.union(numeric_result(non_string(lhs), non_string(rhs), Type::NUMERIC));
            }
            out
        }
        Sub | Mul | Div | Mod | Exp => numeric_result(lhs, rhs, Type::NUMERIC),
        BitAnd | BitOr | BitXor | Shl | Shr => numeric_result(lhs, rhs, Type::INT32),
        UShr => Type::NUMERIC,
        Eq | Ne | StrictEq | StrictNe | Lt | Le | Gt | Ge | In | InstanceOf => Type::BOOLEAN,
    }
}

fn unary_type(op: UnaryOp, operand: Type) -> Type {
    if operand.is_none() {
        return Type::NONE;
    }
    match op {
        UnaryOp::Neg | UnaryOp::Inc | UnaryOp::Dec | UnaryOp::ToNumeric => {
            numeric_result(operand, operand, Type::NUMERIC)
        }
        UnaryOp::BitNot => numeric_result(operand, operand, Type::INT32),
        UnaryOp::ToNumber => Type::NUMERIC,
        UnaryOp::ToString | UnaryOp::TypeOf => Type::STRING,
        UnaryOp::Not => Type::BOOLEAN,
    }
}

/// The `typeof` string shared by every value of `ty`, if there is one.
fn type_of_name(ty: Type) -> Option<&'static str> {
    if ty.is_none() {
        return None;
    }
    const CLASSES: [(Type, &str); 6] = [
        (Type::UNDEFINED, "undefined"),
        (Type::BOOLEAN, "boolean"),
        (Type::STRING, "string"),
        (Type::NUMERIC, "number"),
        (Type::BIGINT, "bigint"),
        (Type::CLOSURE, "function"),
    ];
    if ty.is_subset_of(Type::NULL.union(Type::OBJECT)) {
        return Some("object");
    }
    CLASSES.iter().find(|(class, _)| ty.is_subset_of(*class)).map(|(_, name)| *name)
}

/// Picks the specialized form for operations on proven numbers.
fn specialize(f: &mut Function) -> bool {
    let mut changed = false;
    for b in f.live_blocks().collect::<Vec<_>>() {
        for i in 0..f.blocks[b].insts.len() {
            let v = f.blocks[b].insts[i];
            let wanted = match &f.insts[v].kind {
                InstKind::Binary { op, lhs, rhs, .. } => {
                    let numbers = f.operand_type(lhs).is_number() && f.operand_type(rhs).is_number();
                    match op {
                        _ if !numbers => None,
                        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                            Some(NumericForm::Int32)
                        }
                        BinaryOp::In | BinaryOp::InstanceOf => None,
                        _ => Some(NumericForm::Number),
                    }
                }
                InstKind::Unary { op, operand, .. } => match op {
                    _ if !f.operand_type(operand).is_number() => None,
                    UnaryOp::BitNot => Some(NumericForm::Int32),
                    UnaryOp::Neg | UnaryOp::Inc | UnaryOp::Dec | UnaryOp::ToNumeric | UnaryOp::ToNumber => {
                        Some(NumericForm::Number)
                    }
                    UnaryOp::ToString | UnaryOp::Not | UnaryOp::TypeOf => None,
                },
                _ => None,
            };
            let Some(wanted) = wanted else { continue };
            if let InstKind::Binary { form, .. } | InstKind::Unary { form, .. } = &mut f.insts[v].kind {
                if *form != wanted {
                    *form = wanted;
                    changed = true;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::ir::{Terminator, VarId};
    use crate::sema::FunctionKind;

    fn run(f: &mut Function, options: &CompileOptions) -> bool {
        let vars = IndexVec::new();
        TypeInference.run_on_function(f, &PassContext { vars: &vars, options })
    }

    /// `for (i = 0; i < n; i = i + 1) {} return i;` in SSA form.
    fn counting_loop() -> (Function, [ValueId; 4]) {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let header = f.add_block(None);
        let body = f.add_block(None);
        let exit = f.add_block(None);
        let n = f.append(entry, InstKind::LoadParam(1), Default::default());
        f.blocks[entry].term = Terminator::Branch(header);

        let phi = f.create_inst(header, InstKind::Phi { incoming: Vec::new() }, Default::default());
        f.blocks[header].insts.push(phi);
        let cmp = f.append(
            header,
            InstKind::Binary {
                op: BinaryOp::Lt,
                lhs: Operand::Value(phi),
                rhs: Operand::Value(n),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[header].term = Terminator::CondBranch {
            cond: Operand::Value(cmp),
            then_block: body,
            else_block: exit,
        };
        let next = f.append(
            body,
            InstKind::Binary {
                op: BinaryOp::Add,
                lhs: Operand::Value(phi),
                rhs: Operand::number(1.0),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[body].term = Terminator::Branch(header);
        if let InstKind::Phi { incoming } = &mut f.insts[phi].kind {
            *incoming = vec![(entry, Operand::number(0.0)), (body, Operand::Value(next))];
        }
        f.blocks[exit].term = Terminator::Return(Operand::Value(phi));
        f.recompute_preds();
        (f, [n, phi, cmp, next])
    }

    fn form_of(f: &Function, v: ValueId) -> NumericForm {
        match &f.insts[v].kind {
            InstKind::Binary { form, .. } | InstKind::Unary { form, .. } => *form,
            other => panic!("not an arithmetic instruction: {other:?}"),
        }
    }

    #[test]
    fn test_loop_counter_is_numeric() {
        let (mut f, [_, phi, cmp, next]) = counting_loop();
        assert!(run(&mut f, &CompileOptions::default()));
        assert_eq!(f.insts[phi].ty, Type::NUMERIC);
        assert_eq!(f.insts[next].ty, Type::NUMERIC);
        assert_eq!(form_of(&f, next), NumericForm::Number);
        // `n` is unknown, so the comparison stays generic.
        assert_eq!(form_of(&f, cmp), NumericForm::Generic);
        assert!(!run(&mut f, &CompileOptions::default()));
    }

    #[test]
    fn test_unknown_operand_is_not_specialized() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let p = f.append(entry, InstKind::LoadParam(1), Default::default());
        let neg = f.append(
            entry,
            InstKind::Unary {
                op: UnaryOp::Neg,
                operand: Operand::Value(p),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(neg));
        run(&mut f, &CompileOptions::default());
        assert_eq!(form_of(&f, neg), NumericForm::Generic);
        assert_eq!(f.insts[neg].ty, Type::NUMERIC.union(Type::BIGINT));
    }

    #[test]
    fn test_guard_and_typeof_elided() {
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let guard = f.append(
            entry,
            InstKind::ThrowIfEmpty {
                value: Operand::number(1.5),
                var: Some(VarId(0)),
            },
            Default::default(),
        );
        let ty = f.append(
            entry,
            InstKind::Unary {
                op: UnaryOp::TypeOf,
                operand: Operand::Value(guard),
                form: NumericForm::Generic,
            },
            Default::default(),
        );
        f.blocks[entry].term = Terminator::Return(Operand::Value(ty));

        let mut strict = CompileOptions::default();
        strict.passes.strict_tdz = true;
        let mut kept = f.clone();
        run(&mut kept, &strict);
        assert!(kept.blocks[entry].insts.contains(&guard));

        assert!(run(&mut f, &CompileOptions::default()));
        assert!(f.blocks[entry].insts.is_empty());
        assert_eq!(f.blocks[entry].term, Terminator::Return(Operand::string("number")));
    }

    #[test]
    fn test_type_of_name() {
        assert_eq!(type_of_name(Type::INT32), Some("number"));
        assert_eq!(type_of_name(Type::NULL.union(Type::OBJECT)), Some("object"));
        assert_eq!(type_of_name(Type::OBJECT.union(Type::CLOSURE)), None);
        assert_eq!(type_of_name(Type::NONE), None);
    }
}
