// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Diagnostics and error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::SourceLoc;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a compilation.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more fatal semantic diagnostics were recorded
    #[error("{0}")]
    Semantic(Diagnostics),

    /// The compiler broke one of its own invariants
    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),
}

/// A violated IR or allocation invariant. Always a compiler defect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("in function `{function}`: {message}")]
pub struct InternalError {
    /// Function being processed
    pub function: String,
    /// What was wrong
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error.
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational note attached to the output
    Note,
    /// Suspicious but compilable
    Warning,
    /// Fatal
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single located message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Message text
    pub message: String,
    /// Source file name
    pub file: String,
    /// Position of the offending construct
    pub loc: SourceLoc,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(file: impl Into<String>, loc: SourceLoc, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: file.into(),
            loc,
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(file: impl Into<String>, loc: SourceLoc, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(file, loc, message)
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.loc.line, self.loc.column, self.severity, self.message
        )
    }
}

/// Collected diagnostics, capped at an error limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    limit: usize,
    errors: usize,
    dropped: usize,
}

impl Diagnostics {
    /// Creates an empty list that stores at most `limit` errors; zero means unlimited.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Records a diagnostic. Errors past the limit are counted, not stored.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.errors += 1;
            if self.limit != 0 && self.errors > self.limit {
                self.dropped += 1;
                return;
            }
        }
        self.items.push(diagnostic);
    }

    /// Number of errors recorded, including dropped ones.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// True if any fatal diagnostic was recorded.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// True once the error limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.limit != 0 && self.errors >= self.limit
    }

    /// Appends every diagnostic from `other`.
    pub fn extend(&mut self, other: Diagnostics) {
        for diagnostic in other.items {
            self.push(diagnostic);
        }
        self.dropped += other.dropped;
        self.errors += other.dropped;
    }

    /// Sorts by file, line and column. Insertion order breaks ties.
    pub fn sort(&mut self) {
        self.items
            .sort_by(|a, b| (&a.file, a.loc.line, a.loc.column).cmp(&(&b.file, b.loc.line, b.loc.column)));
    }

    /// Returns the sorted diagnostics, with a trailing note if any were dropped.
    pub fn into_sorted(mut self) -> Vec<Diagnostic> {
        self.sort();
        if self.dropped > 0 {
            let file = self.items.last().map(|d| d.file.clone()).unwrap_or_default();
            self.items.push(Diagnostic {
                severity: Severity::Note,
                message: format!("too many errors; {} more not shown", self.dropped),
                file,
                loc: SourceLoc::default(),
            });
        }
        self.items
    }

    /// Stored diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of stored diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        if self.dropped > 0 {
            write!(f, "\n... and {} more errors", self.dropped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: u32, column: u32) -> SourceLoc {
        SourceLoc { line, column }
    }

    #[test]
    fn test_sorted_by_location() {
        let mut diags = Diagnostics::with_limit(0);
        diags.push(Diagnostic::error("a.js", at(3, 1), "third"));
        diags.push(Diagnostic::error("a.js", at(1, 5), "first"));
        diags.push(Diagnostic::error("a.js", at(1, 9), "second"));
        let sorted = diags.into_sorted();
        let messages: Vec<_> = sorted.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[test]
    fn test_limit_drops_excess_errors() {
        let mut diags = Diagnostics::with_limit(2);
        for i in 0..5 {
            diags.push(Diagnostic::error("a.js", at(i + 1, 1), format!("e{i}")));
        }
        assert_eq!(diags.error_count(), 5);
        assert_eq!(diags.len(), 2);
        assert!(diags.limit_reached());
        let sorted = diags.into_sorted();
        assert_eq!(sorted.len(), 3);
        assert_eq!(sorted[2].severity, Severity::Note);
    }

    #[test]
    fn test_display_format() {
        let d = Diagnostic::error("main.js", at(4, 7), "redeclaration of `x`");
        assert_eq!(d.to_string(), "main.js:4:7: error: redeclaration of `x`");
    }
}
