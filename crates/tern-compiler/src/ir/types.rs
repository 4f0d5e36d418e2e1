// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The coarse value type lattice.
//!
//! A [`Type`] is a set of primitive kinds; the lattice join is set union and
//! the top element is [`Type::ANY`]. `EMPTY` marks a possibly uninitialized
//! binding, so a deferred-init guard can be dropped once it is excluded.

use std::fmt;

use super::literal::{Literal, is_int32};

/// A set of possible runtime kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Type(u16);

impl Type {
    /// No value; the lattice bottom.
    pub const NONE: Type = Type(0);
    /// Uninitialized binding marker
    pub const EMPTY: Type = Type(1 << 0);
    /// `undefined`
    pub const UNDEFINED: Type = Type(1 << 1);
    /// `null`
    pub const NULL: Type = Type(1 << 2);
    /// Booleans
    pub const BOOLEAN: Type = Type(1 << 3);
    /// Strings
    pub const STRING: Type = Type(1 << 4);
    /// Numbers that are exact 32-bit integers
    pub const INT32: Type = Type(1 << 5);
    /// Any other number, including `NaN` and `-0`
    pub const NUMBER: Type = Type(1 << 6);
    /// Arbitrary-precision integers
    pub const BIGINT: Type = Type(1 << 7);
    /// Non-callable objects
    pub const OBJECT: Type = Type(1 << 8);
    /// Function objects
    pub const CLOSURE: Type = Type(1 << 9);
    /// Runtime scope records
    pub const ENVIRONMENT: Type = Type(1 << 10);

    /// Any number.
    pub const NUMERIC: Type = Type(Self::INT32.0 | Self::NUMBER.0);
    /// Any user-visible value.
    pub const ANY: Type = Type(
        Self::UNDEFINED.0
            | Self::NULL.0
            | Self::BOOLEAN.0
            | Self::STRING.0
            | Self::NUMERIC.0
            | Self::BIGINT.0
            | Self::OBJECT.0
            | Self::CLOSURE.0,
    );
    /// A value read from a binding that may be in its dead zone.
    pub const ANY_OR_EMPTY: Type = Type(Self::ANY.0 | Self::EMPTY.0);

    /// Lattice join.
    pub fn union(self, other: Type) -> Type {
        Type(self.0 | other.0)
    }

    /// Intersection.
    pub fn intersect(self, other: Type) -> Type {
        Type(self.0 & other.0)
    }

    /// Removes the kinds in `other`.
    pub fn without(self, other: Type) -> Type {
        Type(self.0 & !other.0)
    }

    /// True if every kind in `self` is in `other`.
    pub fn is_subset_of(self, other: Type) -> bool {
        self.0 & !other.0 == 0
    }

    /// True if `self` and `other` share a kind.
    pub fn overlaps(self, other: Type) -> bool {
        self.0 & other.0 != 0
    }

    /// True for the bottom element.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Provably a number.
    pub fn is_number(self) -> bool {
        !self.is_none() && self.is_subset_of(Type::NUMERIC)
    }

    /// Provably a 32-bit integer.
    pub fn is_int32(self) -> bool {
        !self.is_none() && self.is_subset_of(Type::INT32)
    }

    /// Might be a BigInt.
    pub fn may_be_bigint(self) -> bool {
        self.overlaps(Type::BIGINT)
    }

    /// Might be an object, which can run user code on conversion.
    pub fn may_be_object(self) -> bool {
        self.overlaps(Type::OBJECT.union(Type::CLOSURE))
    }

    /// Provably a primitive, non-empty value.
    pub fn is_primitive(self) -> bool {
        !self.is_none() && !self.may_be_object() && !self.overlaps(Type::EMPTY.union(Type::ENVIRONMENT))
    }

    /// Might be the uninitialized marker.
    pub fn may_be_empty(self) -> bool {
        self.overlaps(Type::EMPTY)
    }

    /// The singleton type of a literal.
    pub fn of_literal(lit: &Literal) -> Type {
        match lit {
            Literal::Undefined => Type::UNDEFINED,
            Literal::Null => Type::NULL,
            Literal::Empty => Type::EMPTY,
            Literal::Bool(_) => Type::BOOLEAN,
            Literal::Number(n) if is_int32(*n) => Type::INT32,
            Literal::Number(_) => Type::NUMBER,
            Literal::String(_) => Type::STRING,
            Literal::BigInt(_) => Type::BIGINT,
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Type::ANY {
            return write!(f, "any");
        }
        if self.is_none() {
            return write!(f, "none");
        }
        const NAMES: [(Type, &str); 11] = [
            (Type::EMPTY, "empty"),
            (Type::UNDEFINED, "undefined"),
            (Type::NULL, "null"),
            (Type::BOOLEAN, "boolean"),
            (Type::STRING, "string"),
            (Type::INT32, "int32"),
            (Type::NUMBER, "number"),
            (Type::BIGINT, "bigint"),
            (Type::OBJECT, "object"),
            (Type::CLOSURE, "closure"),
            (Type::ENVIRONMENT, "environment"),
        ];
        let mut first = true;
        for (ty, name) in NAMES {
            if self.overlaps(ty) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_queries() {
        let t = Type::INT32.union(Type::NUMBER);
        assert!(t.is_number());
        assert!(!t.is_int32());
        assert!(!t.may_be_bigint());
        assert!(Type::INT32.union(Type::BIGINT).may_be_bigint());
        assert!(!Type::NONE.is_number());
        assert!(Type::STRING.is_primitive());
        assert!(!Type::ANY_OR_EMPTY.is_primitive());
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(Type::of_literal(&Literal::Number(3.0)), Type::INT32);
        assert_eq!(Type::of_literal(&Literal::Number(-0.0)), Type::NUMBER);
        assert_eq!(Type::of_literal(&Literal::Number(0.5)), Type::NUMBER);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::INT32.union(Type::STRING).to_string(), "string|int32");
        assert_eq!(Type::ANY.to_string(), "any");
    }
}
