// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The compilation context.
//!
//! Holds the state shared by every stage of one compilation: the options,
//! the diagnostic list and the statistics. Per-function workers never write
//! to it directly; their results are merged here once a stage finishes.

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CompileOptions;
use crate::error::Diagnostics;

/// Counters gathered while compiling one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    /// Functions in the IR module
    pub functions: usize,
    /// IR instructions right after construction
    pub instructions_built: usize,
    /// IR instructions after optimization
    pub instructions_optimized: usize,
    /// Passes that changed the module, in order
    pub changed_passes: Vec<String>,
    /// Largest frame of any function
    pub max_frame_size: u32,
    /// Bytes in the code segment
    pub code_bytes: usize,
}

/// Shared state of one compilation.
#[derive(Debug)]
pub struct CompilationContext {
    options: CompileOptions,
    diagnostics: Mutex<Diagnostics>,
    stats: Mutex<CompileStats>,
}

impl CompilationContext {
    /// Creates a context with an empty diagnostic list.
    pub fn new(options: CompileOptions) -> Self {
        let diagnostics = Mutex::new(Diagnostics::with_limit(options.error_limit));
        Self {
            options,
            diagnostics,
            stats: Mutex::new(CompileStats::default()),
        }
    }

    /// The options this compilation runs with.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Merges diagnostics produced by a stage.
    pub fn report(&self, diagnostics: Diagnostics) {
        self.diagnostics.lock().extend(diagnostics);
    }

    /// True if a fatal diagnostic was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.lock().has_errors()
    }

    /// Takes the recorded diagnostics, sorted by location.
    pub fn take_diagnostics(&self) -> Diagnostics {
        let mut taken = std::mem::replace(
            &mut *self.diagnostics.lock(),
            Diagnostics::with_limit(self.options.error_limit),
        );
        taken.sort();
        taken
    }

    /// Updates the statistics.
    pub fn record(&self, update: impl FnOnce(&mut CompileStats)) {
        update(&mut self.stats.lock());
    }

    /// A snapshot of the statistics.
    pub fn stats(&self) -> CompileStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLoc;
    use crate::error::Diagnostic;

    #[test]
    fn test_reports_merge_and_sort() {
        let cx = CompilationContext::new(CompileOptions::default());
        assert!(!cx.has_errors());

        let mut late = Diagnostics::with_limit(0);
        late.push(Diagnostic::error("a.js", SourceLoc { line: 9, column: 1 }, "late"));
        let mut early = Diagnostics::with_limit(0);
        early.push(Diagnostic::error("a.js", SourceLoc { line: 2, column: 4 }, "early"));
        cx.report(late);
        cx.report(early);

        assert!(cx.has_errors());
        let taken = cx.take_diagnostics();
        let messages: Vec<&str> = taken.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["early", "late"]);
        assert!(!cx.has_errors());
    }

    #[test]
    fn test_stats_updates() {
        let cx = CompilationContext::new(CompileOptions::default());
        cx.record(|s| s.functions = 3);
        cx.record(|s| s.max_frame_size = s.max_frame_size.max(7));
        let stats = cx.stats();
        assert_eq!(stats.functions, 3);
        assert_eq!(stats.max_frame_size, 7);
    }
}
