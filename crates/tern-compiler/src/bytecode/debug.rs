// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Debug section: source locations and lexical scope tables.
//!
//! Each function's locations are a stream of signed LEB128 deltas against
//! the previous entry, starting from `(0, line, column, 0)` of the function:
//!
//! ```text
//! offset delta, line delta, column delta [, scope delta]
//! ```
//!
//! The scope column is present only at the scope level.

use serde::{Deserialize, Serialize};

/// The whole debug section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Source files
    pub files: Vec<String>,
    /// Per function, parallel to the function table
    pub functions: Vec<FunctionDebug>,
    /// Lexical scopes, present at the scope level
    pub scopes: Vec<ScopeDebug>,
    /// Location streams carry a scope column
    pub has_scopes: bool,
}

/// Debug data for one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDebug {
    /// Index into the file list
    pub file: u32,
    /// Line of the function's start
    pub line: u32,
    /// Column of the function's start
    pub column: u32,
    /// Delta-encoded location stream
    pub locations: Vec<u8>,
}

/// One lexical scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDebug {
    /// Enclosing scope
    pub parent: Option<u32>,
    /// String ids of the bindings declared here
    pub names: Vec<u32>,
}

/// A decoded location entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Function-relative byte offset
    pub offset: u32,
    /// Line
    pub line: u32,
    /// Column
    pub column: u32,
    /// Scope table index
    pub scope: u32,
}

/// Delta-encodes a location list sorted by offset.
pub fn encode_locations(locations: &[Location], start: (u32, u32), with_scopes: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev = Location {
        offset: 0,
        line: start.0,
        column: start.1,
        scope: 0,
    };
    for loc in locations {
        write_sleb128(&mut out, i64::from(loc.offset) - i64::from(prev.offset));
        write_sleb128(&mut out, i64::from(loc.line) - i64::from(prev.line));
        write_sleb128(&mut out, i64::from(loc.column) - i64::from(prev.column));
        if with_scopes {
            write_sleb128(&mut out, i64::from(loc.scope) - i64::from(prev.scope));
        }
        prev = *loc;
    }
    out
}

/// Decodes a stream written by [`encode_locations`]; `None` if truncated.
pub fn decode_locations(bytes: &[u8], start: (u32, u32), with_scopes: bool) -> Option<Vec<Location>> {
    let mut out = Vec::new();
    let mut pos = 0;
    let (mut offset, mut line, mut column, mut scope) = (0i64, i64::from(start.0), i64::from(start.1), 0i64);
    while pos < bytes.len() {
        offset += read_sleb128(bytes, &mut pos)?;
        line += read_sleb128(bytes, &mut pos)?;
        column += read_sleb128(bytes, &mut pos)?;
        if with_scopes {
            scope += read_sleb128(bytes, &mut pos)?;
        }
        out.push(Location {
            offset: u32::try_from(offset).ok()?,
            line: u32::try_from(line).ok()?,
            column: u32::try_from(column).ok()?,
            scope: u32::try_from(scope).ok()?,
        });
    }
    Some(out)
}

/// Appends `value` as signed LEB128.
pub fn write_sleb128(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads one signed LEB128 value at `pos`, advancing it.
pub fn read_sleb128(bytes: &[u8], pos: &mut usize) -> Option<i64> {
    let mut result = 0i64;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        if shift < 64 {
            result |= i64::from(byte & 0x7f) << shift;
        }
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleb128_known_encodings() {
        let cases: [(i64, &[u8]); 6] = [
            (0, &[0x00]),
            (2, &[0x02]),
            (-2, &[0x7e]),
            (63, &[0x3f]),
            (64, &[0xc0, 0x00]),
            (-129, &[0xff, 0x7e]),
        ];
        for (value, bytes) in cases {
            let mut out = Vec::new();
            write_sleb128(&mut out, value);
            assert_eq!(out, bytes, "encoding {value}");
            let mut pos = 0;
            assert_eq!(read_sleb128(&out, &mut pos), Some(value));
            assert_eq!(pos, out.len());
        }
    }

    #[test]
    fn test_location_stream() {
        let locs = [
            Location { offset: 0, line: 3, column: 5, scope: 0 },
            Location { offset: 4, line: 3, column: 9, scope: 1 },
            Location { offset: 11, line: 2, column: 1, scope: 0 },
        ];
        let bytes = encode_locations(&locs, (3, 1), true);
        assert_eq!(decode_locations(&bytes, (3, 1), true), Some(locs.to_vec()));

        let plain = encode_locations(&locs, (3, 1), false);
        assert!(plain.len() < bytes.len());
        let decoded = decode_locations(&plain, (3, 1), false).expect("decodes");
        assert_eq!(decoded[2].line, 2);
        assert_eq!(decoded[2].scope, 0);
    }

    #[test]
    fn test_truncated_stream() {
        assert_eq!(decode_locations(&[0x80], (1, 1), false), None);
    }
}
