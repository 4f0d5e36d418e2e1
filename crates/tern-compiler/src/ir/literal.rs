// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile-time constants and the language's primitive value semantics.
//!
//! Constant folding and branch folding must agree exactly with the runtime,
//! so conversions here follow the language rules rather than Rust's: `-0`
//! equals `0`, `NaN` is never equal to itself, `1 ** Infinity` is `NaN`, and
//! strings compare by UTF-16 code unit.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};
use serde::Serialize;

/// A constant operand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Uninitialized-binding marker, never user visible
    Empty,
    /// `true`/`false`
    Bool(bool),
    /// IEEE-754 double
    Number(f64),
    /// String
    String(String),
    /// Arbitrary-precision integer
    BigInt(BigInt),
}

impl Literal {
    /// Shorthand for a string literal.
    pub fn string(s: impl Into<String>) -> Self {
        Literal::String(s.into())
    }

    /// The `typeof` result for the value.
    pub fn type_of(&self) -> Option<&'static str> {
        Some(match self {
            Literal::Undefined => "undefined",
            Literal::Null => "object",
            Literal::Bool(_) => "boolean",
            Literal::Number(_) => "number",
            Literal::String(_) => "string",
            Literal::BigInt(_) => "bigint",
            Literal::Empty => return None,
        })
    }

    /// ToBoolean.
    pub fn truthy(&self) -> Option<bool> {
        Some(match self {
            Literal::Undefined | Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Number(n) => !(*n == 0.0 || n.is_nan()),
            Literal::String(s) => !s.is_empty(),
            Literal::BigInt(b) => !b.is_zero(),
            Literal::Empty => return None,
        })
    }

    /// ToNumber, or `None` for BigInt (which throws).
    pub fn to_number(&self) -> Option<f64> {
        Some(match self {
            Literal::Undefined => f64::NAN,
            Literal::Null => 0.0,
            Literal::Bool(b) => f64::from(u8::from(*b)),
            Literal::Number(n) => *n,
            Literal::String(s) => string_to_number(s),
            Literal::BigInt(_) | Literal::Empty => return None,
        })
    }

    /// ToString.
    pub fn to_js_string(&self) -> Option<String> {
        Some(match self {
            Literal::Undefined => "undefined".to_string(),
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => number_to_string(*n),
            Literal::String(s) => s.clone(),
            Literal::BigInt(b) => b.to_string(),
            Literal::Empty => return None,
        })
    }

    /// True for `undefined` and `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Literal::Undefined | Literal::Null)
    }

    /// The literal as an exact 32-bit integer, if it is one.
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Literal::Number(n) if is_int32(*n) => Some(*n as i32),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Undefined => write!(f, "undefined"),
            Literal::Null => write!(f, "null"),
            Literal::Empty => write!(f, "empty"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Number(n) => write!(f, "{}", number_to_string(*n)),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::BigInt(b) => write!(f, "{b}n"),
        }
    }
}

/// True if `n` is exactly representable as an `i32`, excluding `-0`.
pub fn is_int32(n: f64) -> bool {
    n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) && !(n == 0.0 && n.is_sign_negative())
}

/// ToInt32.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ToUint32.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

/// Number::toString(10).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }

    // `{:e}` yields the shortest round-tripping digits as `d.ddde±x`.
    let sci = format!("{n:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exp: i32 = exp.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exp + 1;

    if k <= point && point <= 21 {
        let mut s = digits;
        s.extend(std::iter::repeat_n('0', (point - k) as usize));
        s
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let e = point - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", e.abs())
        } else {
            format!("{first}.{rest}e{sign}{}", e.abs())
        }
    }
}

/// WhiteSpace and LineTerminator code points trimmed by string conversions.
fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t' | '\u{B}' | '\u{C}' | '\u{FEFF}' | '\n' | '\r' | '\u{2028}' | '\u{2029}'
            // Zs
            | ' ' | '\u{A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

/// StringToNumber.
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return 0.0;
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let body = &s[2..];
        if body.is_empty() {
            return f64::NAN;
        }
        let mut value = 0.0f64;
        for c in body.chars() {
            match c.to_digit(radix) {
                Some(d) => value = value * f64::from(radix) + f64::from(d),
                None => return f64::NAN,
            }
        }
        return value;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// StringToBigInt, for loose equality against strings.
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return Some(BigInt::zero());
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => {
            let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            return s.parse::<BigInt>().ok();
        }
    };
    // No sign is allowed with a radix prefix.
    let body = &s[2..];
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigInt::parse_bytes(body.as_bytes(), radix)
}

/// Strict equality (`===`) of two literals.
pub fn strict_equals(a: &Literal, b: &Literal) -> Option<bool> {
    Some(match (a, b) {
        (Literal::Empty, _) | (_, Literal::Empty) => return None,
        (Literal::Number(x), Literal::Number(y)) => x == y,
        (Literal::String(x), Literal::String(y)) => x == y,
        (Literal::BigInt(x), Literal::BigInt(y)) => x == y,
        (Literal::Bool(x), Literal::Bool(y)) => x == y,
        (Literal::Undefined, Literal::Undefined) | (Literal::Null, Literal::Null) => true,
        _ => false,
    })
}

/// Loose equality (`==`) of two primitive literals.
pub fn loose_equals(a: &Literal, b: &Literal) -> Option<bool> {
    match (a, b) {
        (Literal::Empty, _) | (_, Literal::Empty) => None,
        (x, y) if x.is_nullish() || y.is_nullish() => Some(x.is_nullish() && y.is_nullish()),
        (Literal::Number(_), Literal::Number(_))
        | (Literal::String(_), Literal::String(_))
        | (Literal::BigInt(_), Literal::BigInt(_))
        | (Literal::Bool(_), Literal::Bool(_)) => strict_equals(a, b),
        (Literal::BigInt(x), Literal::Number(y)) | (Literal::Number(y), Literal::BigInt(x)) => {
            Some(bigint_equals_number(x, *y))
        }
        (Literal::BigInt(x), Literal::String(s)) | (Literal::String(s), Literal::BigInt(x)) => {
            Some(string_to_bigint(s).is_some_and(|y| *x == y))
        }
        (Literal::BigInt(x), Literal::Bool(y)) | (Literal::Bool(y), Literal::BigInt(x)) => {
            Some(*x == BigInt::from(u8::from(*y)))
        }
        (x, y) => Some(x.to_number()? == y.to_number()?),
    }
}

fn bigint_equals_number(x: &BigInt, y: f64) -> bool {
    if !y.is_finite() || y.fract() != 0.0 {
        return false;
    }
    BigInt::from_f64(y).is_some_and(|y| y == *x)
}

/// Abstract relational comparison of two primitive literals.
///
/// Returns `Some(None)` when the answer is "undefined" (a NaN was involved),
/// which every relational operator treats as false.
pub fn compare(a: &Literal, b: &Literal) -> Option<Option<Ordering>> {
    match (a, b) {
        (Literal::String(x), Literal::String(y)) => Some(Some(x.encode_utf16().cmp(y.encode_utf16()))),
        (Literal::BigInt(x), Literal::BigInt(y)) => Some(Some(x.cmp(y))),
        (Literal::BigInt(_), _) | (_, Literal::BigInt(_)) => None,
        _ => {
            let x = a.to_number()?;
            let y = b.to_number()?;
            Some(x.partial_cmp(&y))
        }
    }
}

/// Exponentiation with the language's edge cases.
pub fn number_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(11.0), "11");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(2.5), "2.5");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn test_int32_conversions() {
        assert_eq!(to_int32(4_294_967_295.0), -1);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_int32(f64::NAN), 0);
        assert!(is_int32(7.0));
        assert!(!is_int32(-0.0));
        assert!(!is_int32(0.5));
    }

    #[test]
    fn test_equality_edge_cases() {
        let zero = Literal::Number(0.0);
        let neg_zero = Literal::Number(-0.0);
        let nan = Literal::Number(f64::NAN);
        assert_eq!(strict_equals(&zero, &neg_zero), Some(true));
        assert_eq!(strict_equals(&nan, &nan), Some(false));
        assert_eq!(loose_equals(&Literal::Null, &Literal::Undefined), Some(true));
        assert_eq!(loose_equals(&Literal::Null, &zero), Some(false));
        assert_eq!(loose_equals(&Literal::string("1"), &Literal::Number(1.0)), Some(true));
        assert_eq!(loose_equals(&Literal::BigInt(BigInt::from(2)), &Literal::Number(2.0)), Some(true));
    }

    #[test]
    fn test_bigint_equals_prefixed_string() {
        let big = |n: i64| Literal::BigInt(BigInt::from(n));
        assert_eq!(loose_equals(&big(16), &Literal::string("0x10")), Some(true));
        assert_eq!(loose_equals(&Literal::string("0b101"), &big(5)), Some(true));
        assert_eq!(loose_equals(&big(8), &Literal::string(" 0o10 ")), Some(true));
        assert_eq!(loose_equals(&big(-3), &Literal::string("-3")), Some(true));
        assert_eq!(loose_equals(&big(16), &Literal::string("-0x10")), Some(false));
        assert_eq!(loose_equals(&big(1000), &Literal::string("1_000")), Some(false));
        assert_eq!(string_to_bigint("0x"), None);
        assert_eq!(string_to_bigint("0b12"), None);
        assert_eq!(string_to_bigint("+"), None);
    }

    #[test]
    fn test_conversions_trim_only_js_whitespace() {
        assert_eq!(string_to_number("\u{A0}\u{2028}7\u{FEFF}\u{3000}"), 7.0);
        assert!(string_to_number("\u{85}1").is_nan());
        assert!(string_to_number("\u{180E}1").is_nan());
        assert_eq!(loose_equals(&Literal::Number(1.0), &Literal::string("\u{85}1")), Some(false));
        assert_eq!(string_to_bigint("\u{85}1"), None);
        assert_eq!(string_to_bigint("\t12\n"), Some(BigInt::from(12)));
    }

    #[test]
    fn test_compare_strings_by_code_unit() {
        let a = Literal::string("\u{FF61}");
        let b = Literal::string("\u{1F600}");
        // U+1F600 encodes as a surrogate pair starting 0xD83D < 0xFF61.
        assert_eq!(compare(&a, &b), Some(Some(Ordering::Greater)));
    }

    #[test]
    fn test_pow_edge_cases() {
        assert!(number_pow(1.0, f64::INFINITY).is_nan());
        assert!(number_pow(1.0, f64::NAN).is_nan());
        assert_eq!(number_pow(2.0, 10.0), 1024.0);
    }
}
