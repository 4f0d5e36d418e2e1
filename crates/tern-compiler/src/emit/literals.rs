// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Deduplicating literal pools.
//!
//! Each function fills a private pool while it is emitted; the linker folds
//! them into the module pool and rewrites operand indices with the returned
//! [`PoolRemap`].

use rustc_hash::FxHashMap;

use crate::bytecode::{BufferValue, Operand, RegExpEntry};
use crate::ir::Literal;

/// Hashable identity of a buffer value; numbers compare by bit pattern.
type BufferKey = Vec<(u8, u64)>;

fn buffer_key(values: &[BufferValue]) -> BufferKey {
    values
        .iter()
        .map(|v| match *v {
            BufferValue::Undefined => (0, 0),
            BufferValue::Null => (1, 0),
            BufferValue::Hole => (2, 0),
            BufferValue::True => (3, 0),
            BufferValue::False => (4, 0),
            BufferValue::Number(n) => (5, n.to_bits()),
            BufferValue::String(s) => (6, u64::from(s)),
            BufferValue::BigInt(b) => (7, u64::from(b)),
        })
        .collect()
}

/// Interning table for one kind of entry.
#[derive(Debug, Clone)]
struct Table<T, K> {
    entries: Vec<T>,
    ids: FxHashMap<K, u32>,
}

impl<T, K> Default for Table<T, K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            ids: FxHashMap::default(),
        }
    }
}

impl<T, K: std::hash::Hash + Eq> Table<T, K> {
    fn intern(&mut self, key: K, entry: impl FnOnce() -> T) -> u32 {
        let next = self.entries.len() as u32;
        *self.ids.entry(key).or_insert_with(|| {
            self.entries.push(entry());
            next
        })
    }
}

/// Strings, BigInts, regexps and literal buffers of a function or module.
#[derive(Debug, Clone, Default)]
pub struct LiteralPool {
    strings: Table<String, String>,
    bigints: Table<String, String>,
    regexps: Table<RegExpEntry, RegExpEntry>,
    object_keys: Table<Vec<u32>, Vec<u32>>,
    object_values: Table<Vec<BufferValue>, BufferKey>,
    arrays: Table<Vec<BufferValue>, BufferKey>,
}

impl LiteralPool {
    /// Interns a string.
    pub fn string(&mut self, s: &str) -> u32 {
        self.strings.intern(s.to_string(), || s.to_string())
    }

    /// Interns a BigInt given in decimal.
    pub fn bigint(&mut self, digits: &str) -> u32 {
        self.bigints.intern(digits.to_string(), || digits.to_string())
    }

    /// Interns a regular expression literal.
    pub fn regexp(&mut self, pattern: &str, flags: &str) -> u32 {
        let entry = RegExpEntry {
            pattern: self.string(pattern),
            flags: self.string(flags),
        };
        self.regexps.intern(entry, || entry)
    }

    /// Interns an object key buffer of string ids.
    pub fn object_keys(&mut self, keys: Vec<u32>) -> u32 {
        self.object_keys.intern(keys.clone(), || keys)
    }

    /// Interns an object value buffer.
    pub fn object_values(&mut self, values: Vec<BufferValue>) -> u32 {
        self.object_values.intern(buffer_key(&values), || values)
    }

    /// Interns an array element buffer.
    pub fn array(&mut self, elements: Vec<BufferValue>) -> u32 {
        self.arrays.intern(buffer_key(&elements), || elements)
    }

    /// Buffer encoding of a literal, interning any string or BigInt.
    pub fn buffer_value(&mut self, lit: &Literal) -> BufferValue {
        match lit {
            Literal::Undefined => BufferValue::Undefined,
            Literal::Null => BufferValue::Null,
            Literal::Empty => BufferValue::Hole,
            Literal::Bool(true) => BufferValue::True,
            Literal::Bool(false) => BufferValue::False,
            Literal::Number(n) => BufferValue::Number(*n),
            Literal::String(s) => BufferValue::String(self.string(s)),
            Literal::BigInt(b) => BufferValue::BigInt(self.bigint(&b.to_string())),
        }
    }

    /// Folds `other` into this pool.
    pub fn merge(&mut self, other: &LiteralPool) -> PoolRemap {
        let strings: Vec<u32> = other.strings.entries.iter().map(|s| self.string(s)).collect();
        let bigints: Vec<u32> = other.bigints.entries.iter().map(|b| self.bigint(b)).collect();
        let string_of = |id: u32| strings.get(id as usize).copied().unwrap_or(id);
        let regexps = other
            .regexps
            .entries
            .iter()
            .map(|r| {
                let entry = RegExpEntry {
                    pattern: string_of(r.pattern),
                    flags: string_of(r.flags),
                };
                self.regexps.intern(entry, || entry)
            })
            .collect();
        let object_keys = other
            .object_keys
            .entries
            .iter()
            .map(|keys| self.object_keys(keys.iter().map(|&k| string_of(k)).collect()))
            .collect();
        let rebuffer = |values: &[BufferValue]| -> Vec<BufferValue> {
            values
                .iter()
                .map(|v| match *v {
                    BufferValue::String(s) => BufferValue::String(string_of(s)),
                    BufferValue::BigInt(b) => BufferValue::BigInt(bigints.get(b as usize).copied().unwrap_or(b)),
                    other => other,
                })
                .collect()
        };
        let object_values = other
            .object_values
            .entries
            .iter()
            .map(|vals| self.object_values(rebuffer(vals)))
            .collect();
        let arrays = other.arrays.entries.iter().map(|elems| self.array(rebuffer(elems))).collect();
        PoolRemap {
            strings,
            bigints,
            regexps,
            object_keys,
            object_values,
            arrays,
        }
    }

    /// Interned strings in id order.
    pub fn strings(&self) -> &[String] {
        &self.strings.entries
    }

    /// Interned BigInts in id order.
    pub fn bigints(&self) -> &[String] {
        &self.bigints.entries
    }

    /// Interned regexps in id order.
    pub fn regexps(&self) -> &[RegExpEntry] {
        &self.regexps.entries
    }

    /// Interned key buffers in id order.
    pub fn key_buffers(&self) -> &[Vec<u32>] {
        &self.object_keys.entries
    }

    /// Interned value buffers in id order.
    pub fn value_buffers(&self) -> &[Vec<BufferValue>] {
        &self.object_values.entries
    }

    /// Interned array buffers in id order.
    pub fn array_buffers(&self) -> &[Vec<BufferValue>] {
        &self.arrays.entries
    }
}

/// Index translation from a function pool into the module pool.
#[derive(Debug, Clone, Default)]
pub struct PoolRemap {
    strings: Vec<u32>,
    bigints: Vec<u32>,
    regexps: Vec<u32>,
    object_keys: Vec<u32>,
    object_values: Vec<u32>,
    arrays: Vec<u32>,
}

impl PoolRemap {
    /// Rewrites a pool-indexed operand in place.
    pub fn apply(&self, op: &mut Operand) {
        let remap = |table: &[u32], id: &mut u32| {
            if let Some(&new) = table.get(*id as usize) {
                *id = new;
            }
        };
        match op {
            Operand::Str(id) => remap(&self.strings, id),
            Operand::BigInt(id) => remap(&self.bigints, id),
            Operand::RegExp(id) => remap(&self.regexps, id),
            Operand::ObjKeys(id) => remap(&self.object_keys, id),
            Operand::ObjValues(id) => remap(&self.object_values, id),
            Operand::Array(id) => remap(&self.arrays, id),
            _ => {}
        }
    }

    /// Module id of a function-local string id.
    pub fn string(&self, id: u32) -> u32 {
        self.strings.get(id as usize).copied().unwrap_or(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedups() {
        let mut pool = LiteralPool::default();
        assert_eq!(pool.string("a"), 0);
        assert_eq!(pool.string("b"), 1);
        assert_eq!(pool.string("a"), 0);
        let x = pool.array(vec![BufferValue::Number(1.0), BufferValue::Hole]);
        let y = pool.array(vec![BufferValue::Number(1.0), BufferValue::Hole]);
        assert_eq!(x, y);
        // +0 and -0 are different constants.
        let z = pool.array(vec![BufferValue::Number(-0.0)]);
        let w = pool.array(vec![BufferValue::Number(0.0)]);
        assert_ne!(z, w);
        assert_eq!(pool.array_buffers().len(), 3);
    }

    #[test]
    fn test_merge_rewrites_nested_ids() {
        let mut module = LiteralPool::default();
        module.string("shared");
        module.string("only-module");

        let mut local = LiteralPool::default();
        let k = local.string("key");
        let s = local.string("shared");
        let keys = local.object_keys(vec![k, s]);
        let lit = local.buffer_value(&Literal::String("shared".into()));
        let vals = local.object_values(vec![lit, BufferValue::Null]);
        let re = local.regexp("a+", "g");

        let remap = module.merge(&local);
        assert_eq!(remap.string(s), 0);
        assert_eq!(remap.string(k), 2);

        let mut op = Operand::ObjKeys(keys);
        remap.apply(&mut op);
        let Operand::ObjKeys(id) = op else { unreachable!() };
        assert_eq!(module.key_buffers()[id as usize], vec![2, 0]);

        let mut op = Operand::ObjValues(vals);
        remap.apply(&mut op);
        let Operand::ObjValues(id) = op else { unreachable!() };
        assert_eq!(module.value_buffers()[id as usize], vec![BufferValue::String(0), BufferValue::Null]);

        let mut op = Operand::RegExp(re);
        remap.apply(&mut op);
        let Operand::RegExp(id) = op else { unreachable!() };
        let entry = module.regexps()[id as usize];
        assert_eq!(module.strings()[entry.pattern as usize], "a+");
        assert_eq!(module.strings()[entry.flags as usize], "g");
    }
}
