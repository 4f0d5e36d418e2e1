// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Constant folding and propagation.
//!
//! Evaluation goes through [`crate::ir::literal`], which implements the
//! language's conversions. Anything that could throw at runtime (BigInt
//! mixed with Number, division by a zero BigInt) is left for the runtime.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rustc_hash::FxHashMap;

use crate::ir::cfg::reverse_postorder;
use crate::ir::literal::{compare, loose_equals, number_pow, strict_equals, to_int32, to_uint32};
use crate::ir::{BinaryOp, Function, InstKind, Literal, Operand, UnaryOp, ValueId};

use super::{FunctionPass, PassContext, apply_replacements};

/// BigInt exponents above this are left to the runtime.
const MAX_BIGINT_EXPONENT: u32 = 1 << 12;

/// Folds operations on constants and propagates the results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFolding;

impl FunctionPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn run_on_function(&self, f: &mut Function, _cx: &PassContext<'_>) -> bool {
        let mut changed = false;
        loop {
            let replacements = fold_round(f);
            if replacements.is_empty() {
                return changed;
            }
            apply_replacements(f, &replacements);
            changed = true;
        }
    }
}

fn fold_round(f: &Function) -> FxHashMap<ValueId, Operand> {
    let mut map: FxHashMap<ValueId, Operand> = FxHashMap::default();
    for b in reverse_postorder(f) {
        for &v in &f.blocks[b].insts {
            if let Some(op) = fold_inst(f, &map, v) {
                map.insert(v, op);
            }
        }
    }
    map
}

/// Constant value of an operand, looking through earlier folds.
fn constant<'a>(f: &'a Function, map: &'a FxHashMap<ValueId, Operand>, op: &'a Operand) -> Option<&'a Literal> {
    match op {
        Operand::Value(v) => match map.get(v) {
            Some(Operand::Literal(lit)) => Some(lit),
            Some(Operand::Value(_)) => None,
            None => f.constant_of(op),
        },
        Operand::Literal(lit) => Some(lit),
    }
}

fn fold_inst(f: &Function, map: &FxHashMap<ValueId, Operand>, v: ValueId) -> Option<Operand> {
    match &f.insts[v].kind {
        InstKind::LoadConst(lit) => Some(Operand::Literal(lit.clone())),
        InstKind::Binary { op, lhs, rhs, .. } => {
            let lhs = constant(f, map, lhs)?;
            let rhs = constant(f, map, rhs)?;
            fold_binary(*op, lhs, rhs).map(Operand::Literal)
        }
        InstKind::Unary { op, operand, .. } => {
            let operand = constant(f, map, operand)?;
            fold_unary(*op, operand).map(Operand::Literal)
        }
        InstKind::ThrowIfEmpty { value, .. } => match constant(f, map, value) {
            Some(Literal::Empty) | None => None,
            Some(lit) => Some(Operand::Literal(lit.clone())),
        },
        InstKind::Phi { incoming } => {
            let mut same: Option<&Operand> = None;
            for (_, op) in incoming {
                if *op == Operand::Value(v) {
                    continue;
                }
                match same {
                    None => same = Some(op),
                    Some(prev) if prev == op => {}
                    Some(_) => return None,
                }
            }
            same.cloned()
        }
        _ => None,
    }
}

/// Evaluates a binary operator on two constants.
///
/// Returns `None` when the result depends on runtime state or the operation
/// would throw.
pub fn fold_binary(op: BinaryOp, lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    if matches!(lhs, Literal::Empty) || matches!(rhs, Literal::Empty) {
        return None;
    }
    use BinaryOp::*;
    Some(match op {
        Add => return fold_add(lhs, rhs),
        Sub | Mul | Div | Mod | Exp => return fold_arithmetic(op, lhs, rhs),
        Eq => Literal::Bool(loose_equals(lhs, rhs)?),
        Ne => Literal::Bool(!loose_equals(lhs, rhs)?),
        StrictEq => Literal::Bool(strict_equals(lhs, rhs)?),
        StrictNe => Literal::Bool(!strict_equals(lhs, rhs)?),
        Lt => Literal::Bool(compare(lhs, rhs)? == Some(std::cmp::Ordering::Less)),
        Gt => Literal::Bool(compare(lhs, rhs)? == Some(std::cmp::Ordering::Greater)),
        Le => Literal::Bool(matches!(compare(lhs, rhs)?, Some(o) if o != std::cmp::Ordering::Greater)),
        Ge => Literal::Bool(matches!(compare(lhs, rhs)?, Some(o) if o != std::cmp::Ordering::Less)),
        BitAnd | BitOr | BitXor | Shl | Shr | UShr => return fold_bitwise(op, lhs, rhs),
        In | InstanceOf => return None,
    })
}

fn fold_add(lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    if matches!(lhs, Literal::String(_)) || matches!(rhs, Literal::String(_)) {
        let mut s = lhs.to_js_string()?;
        s.push_str(&rhs.to_js_string()?);
        return Some(Literal::String(s));
    }
    match (lhs, rhs) {
        (Literal::BigInt(a), Literal::BigInt(b)) => Some(Literal::BigInt(a + b)),
        (Literal::BigInt(_), _) | (_, Literal::BigInt(_)) => None,
        _ => Some(Literal::Number(lhs.to_number()? + rhs.to_number()?)),
    }
}

fn fold_arithmetic(op: BinaryOp, lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    match (lhs, rhs) {
        (Literal::BigInt(a), Literal::BigInt(b)) => fold_bigint(op, a, b).map(Literal::BigInt),
        (Literal::BigInt(_), _) | (_, Literal::BigInt(_)) => None,
        _ => {
            let (a, b) = (lhs.to_number()?, rhs.to_number()?);
            Some(Literal::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                BinaryOp::Exp => number_pow(a, b),
                _ => return None,
            }))
        }
    }
}

fn fold_bigint(op: BinaryOp, a: &BigInt, b: &BigInt) -> Option<BigInt> {
    match op {
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div if !b.is_zero() => Some(a / b),
        BinaryOp::Mod if !b.is_zero() => Some(a % b),
        BinaryOp::Exp if !b.is_negative() => {
            let exp = b.to_u32().filter(|&e| e <= MAX_BIGINT_EXPONENT)?;
            Some(num_traits::pow(a.clone(), exp as usize))
        }
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        _ => None,
    }
}

fn fold_bitwise(op: BinaryOp, lhs: &Literal, rhs: &Literal) -> Option<Literal> {
    match (lhs, rhs) {
        (Literal::BigInt(a), Literal::BigInt(b)) => fold_bigint(op, a, b).map(Literal::BigInt),
        (Literal::BigInt(_), _) | (_, Literal::BigInt(_)) => None,
        _ => {
            let (a, b) = (lhs.to_number()?, rhs.to_number()?);
            let (x, y) = (to_int32(a), to_int32(b));
            let count = to_uint32(b) & 31;
            Some(Literal::Number(match op {
                BinaryOp::BitAnd => f64::from(x & y),
                BinaryOp::BitOr => f64::from(x | y),
                BinaryOp::BitXor => f64::from(x ^ y),
                BinaryOp::Shl => f64::from(x.wrapping_shl(count)),
                BinaryOp::Shr => f64::from(x >> count),
                BinaryOp::UShr => f64::from(to_uint32(a) >> count),
                _ => return None,
            }))
        }
    }
}

/// Evaluates a unary operator on a constant.
pub fn fold_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    if matches!(operand, Literal::Empty) {
        return None;
    }
    Some(match (op, operand) {
        (UnaryOp::Neg, Literal::BigInt(b)) => Literal::BigInt(-b),
        (UnaryOp::Neg, lit) => Literal::Number(-lit.to_number()?),
        (UnaryOp::ToNumber, lit) => Literal::Number(lit.to_number()?),
        (UnaryOp::ToNumeric, Literal::BigInt(b)) => Literal::BigInt(b.clone()),
        (UnaryOp::ToNumeric, lit) => Literal::Number(lit.to_number()?),
        (UnaryOp::ToString, lit) => Literal::String(lit.to_js_string()?),
        (UnaryOp::Not, lit) => Literal::Bool(!lit.truthy()?),
        (UnaryOp::BitNot, Literal::BigInt(b)) => Literal::BigInt(!b),
        (UnaryOp::BitNot, lit) => Literal::Number(f64::from(!to_int32(lit.to_number()?))),
        (UnaryOp::TypeOf, lit) => Literal::string(lit.type_of()?),
        (UnaryOp::Inc, Literal::Number(n)) => Literal::Number(n + 1.0),
        (UnaryOp::Inc, Literal::BigInt(b)) => Literal::BigInt(b + 1),
        (UnaryOp::Dec, Literal::Number(n)) => Literal::Number(n - 1.0),
        (UnaryOp::Dec, Literal::BigInt(b)) => Literal::BigInt(b - 1),
        (UnaryOp::Inc | UnaryOp::Dec, _) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::index::IndexVec;
    use crate::ir::{NumericForm, Terminator};
    use crate::sema::FunctionKind;

    fn num(n: f64) -> Literal {
        Literal::Number(n)
    }

    fn big(n: i64) -> Literal {
        Literal::BigInt(BigInt::from(n))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(fold_binary(BinaryOp::Add, &num(1.0), &num(2.0)), Some(num(3.0)));
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::string("a"), &num(1.0)),
            Some(Literal::string("a1"))
        );
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::Bool(true), &Literal::Null),
            Some(num(1.0))
        );
        assert_eq!(fold_binary(BinaryOp::Mod, &num(-7.0), &num(2.0)), Some(num(-1.0)));
        let Some(Literal::Number(nan)) = fold_binary(BinaryOp::Exp, &num(1.0), &num(f64::INFINITY)) else {
            panic!("expected a number");
        };
        assert!(nan.is_nan());
    }

    #[test]
    fn test_bigint_rules() {
        assert_eq!(fold_binary(BinaryOp::Add, &big(2), &big(3)), Some(big(5)));
        assert_eq!(fold_binary(BinaryOp::Div, &big(-7), &big(2)), Some(big(-3)));
        assert_eq!(fold_binary(BinaryOp::Div, &big(1), &big(0)), None);
        assert_eq!(fold_binary(BinaryOp::Add, &big(1), &num(1.0)), None);
        assert_eq!(fold_binary(BinaryOp::Exp, &big(2), &big(-1)), None);
        assert_eq!(fold_binary(BinaryOp::Shl, &big(1), &big(2)), None);
        assert_eq!(
            fold_binary(BinaryOp::Add, &Literal::string("n="), &big(7)),
            Some(Literal::string("n=7"))
        );
        assert_eq!(fold_unary(UnaryOp::BitNot, &big(5)), Some(big(-6)));
        assert_eq!(fold_unary(UnaryOp::ToNumber, &big(5)), None);
    }

    #[test]
    fn test_comparisons() {
        let nan = num(f64::NAN);
        assert_eq!(fold_binary(BinaryOp::Lt, &nan, &num(1.0)), Some(Literal::Bool(false)));
        assert_eq!(fold_binary(BinaryOp::Ge, &nan, &num(1.0)), Some(Literal::Bool(false)));
        assert_eq!(fold_binary(BinaryOp::Le, &num(1.0), &num(1.0)), Some(Literal::Bool(true)));
        assert_eq!(
            fold_binary(BinaryOp::Eq, &Literal::Null, &Literal::Undefined),
            Some(Literal::Bool(true))
        );
        assert_eq!(
            fold_binary(BinaryOp::StrictEq, &num(0.0), &num(-0.0)),
            Some(Literal::Bool(true))
        );
        assert_eq!(
            fold_binary(BinaryOp::Lt, &Literal::string("a"), &Literal::string("b")),
            Some(Literal::Bool(true))
        );
        assert_eq!(fold_binary(BinaryOp::Lt, &big(1), &num(2.0)), None);
        assert_eq!(fold_binary(BinaryOp::In, &Literal::string("x"), &Literal::Null), None);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(fold_binary(BinaryOp::Shl, &num(1.0), &num(33.0)), Some(num(2.0)));
        assert_eq!(fold_binary(BinaryOp::UShr, &num(-1.0), &num(0.0)), Some(num(4294967295.0)));
        assert_eq!(fold_binary(BinaryOp::Shr, &num(-8.0), &num(1.0)), Some(num(-4.0)));
        assert_eq!(fold_binary(BinaryOp::BitOr, &num(2147483648.0), &num(0.0)), Some(num(-2147483648.0)));
    }

    #[test]
    fn test_unary() {
        assert_eq!(fold_unary(UnaryOp::TypeOf, &Literal::Null), Some(Literal::string("object")));
        assert_eq!(fold_unary(UnaryOp::Not, &Literal::string("")), Some(Literal::Bool(true)));
        assert_eq!(fold_unary(UnaryOp::ToNumber, &Literal::string(" 12 ")), Some(num(12.0)));
        assert_eq!(fold_unary(UnaryOp::Inc, &Literal::string("1")), None);
        assert_eq!(fold_unary(UnaryOp::TypeOf, &Literal::Empty), None);
    }

    #[test]
    fn test_pass_propagates_through_chain() {
        // return ((2 * 3) + 1) | 0
        let mut f = Function::new("f", FunctionKind::Normal);
        let entry = f.entry;
        let binary = |op, lhs, rhs| InstKind::Binary {
            op,
            lhs,
            rhs,
            form: NumericForm::Generic,
        };
        let a = f.append(entry, binary(BinaryOp::Mul, Operand::number(2.0), Operand::number(3.0)), Default::default());
        let b = f.append(entry, binary(BinaryOp::Add, Operand::Value(a), Operand::number(1.0)), Default::default());
        let c = f.append(entry, binary(BinaryOp::BitOr, Operand::Value(b), Operand::number(0.0)), Default::default());
        f.blocks[entry].term = Terminator::Return(Operand::Value(c));

        let vars = IndexVec::new();
        let options = CompileOptions::default();
        let cx = PassContext { vars: &vars, options: &options };
        assert!(ConstantFolding.run_on_function(&mut f, &cx));
        assert!(f.blocks[entry].insts.is_empty());
        assert_eq!(f.blocks[entry].term, Terminator::Return(Operand::number(7.0)));
        assert!(!ConstantFolding.run_on_function(&mut f, &cx));
    }
}
