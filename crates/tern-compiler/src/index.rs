// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Typed indices and index-addressed arenas.
//!
//! Scopes, declarations, blocks and instructions all live in arenas and
//! refer to each other by stable index, which lets the CFG carry back-edges
//! and forward references without ownership cycles.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Implemented by every "index-like" newtype.
pub trait Idx: Copy + 'static + Eq + Ord + Debug + Hash {
    /// Builds the index from a raw position.
    fn new(idx: usize) -> Self;

    /// Returns the raw position.
    fn index(self) -> usize;
}

/// Declares a `u32`-backed index newtype.
#[macro_export]
macro_rules! index_type {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $vis struct $name(pub u32);

        impl $crate::index::Idx for $name {
            #[inline]
            fn new(idx: usize) -> Self {
                Self(idx as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

/// A `Vec` addressed by a typed index.
#[derive(Clone, PartialEq)]
pub struct IndexVec<I: Idx, T> {
    /// Backing storage
    pub raw: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Creates an empty vector.
    #[inline]
    pub const fn new() -> Self {
        Self::from_raw(Vec::new())
    }

    /// Wraps an existing vector.
    #[inline]
    pub const fn from_raw(raw: Vec<T>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Creates a vector of `len` clones of `value`.
    pub fn from_elem(value: T, len: usize) -> Self
    where
        T: Clone,
    {
        Self::from_raw(vec![value; len])
    }

    /// Pushes an element, returning its index.
    #[inline]
    pub fn push(&mut self, value: T) -> I {
        let idx = self.next_index();
        self.raw.push(value);
        idx
    }

    /// The index the next `push` will return.
    #[inline]
    pub fn next_index(&self) -> I {
        I::new(self.raw.len())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.raw.get(index.index())
    }

    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.raw.get_mut(index.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.raw.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.raw.iter_mut()
    }

    /// Iterates over every valid index.
    pub fn indices(&self) -> impl DoubleEndedIterator<Item = I> + 'static {
        (0..self.raw.len()).map(I::new)
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw.iter().enumerate().map(|(i, v)| (I::new(i), v))
    }

    /// Grows the vector with `fill` until `index` is valid.
    pub fn ensure_contains(&mut self, index: I, fill: impl FnMut() -> T) {
        let min_len = index.index() + 1;
        if self.raw.len() < min_len {
            self.raw.resize_with(min_len, fill);
        }
    }
}

impl<I: Idx, T> Default for IndexVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idx, T: Debug> Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.raw.iter()).finish()
    }
}

impl<I: Idx, T> std::ops::Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: I) -> &T {
        &self.raw[index.index()]
    }
}

impl<I: Idx, T> std::ops::IndexMut<I> for IndexVec<I, T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.raw[index.index()]
    }
}

impl<I: Idx, T> FromIterator<T> for IndexVec<I, T> {
    fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
        Self::from_raw(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    index_type! {
        struct TestId;
    }

    #[test]
    fn test_push_returns_sequential_indices() {
        let mut v: IndexVec<TestId, &str> = IndexVec::new();
        let a = v.push("a");
        let b = v.push("b");
        assert_eq!(a, TestId(0));
        assert_eq!(b, TestId(1));
        assert_eq!(v[b], "b");
        assert_eq!(v.next_index(), TestId(2));
    }

    #[test]
    fn test_ensure_contains_fills() {
        let mut v: IndexVec<TestId, u32> = IndexVec::new();
        v.ensure_contains(TestId(3), || 7);
        assert_eq!(v.len(), 4);
        assert_eq!(v[TestId(2)], 7);
    }
}
