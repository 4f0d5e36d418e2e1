// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope resolution.
//!
//! Builds the lexical scope tree, binds every identifier reference to its
//! [`Declaration`], marks captured declarations and the references that need
//! a deferred-initialization guard, and reports early errors.

mod resolver;

#[cfg(test)]
mod tests;

use rustc_hash::FxHashMap;

use crate::ast::Span;
use crate::index::IndexVec;

pub use resolver::resolve;

crate::index_type! {
    /// Identifies a lexical scope.
    pub struct ScopeId;
}

crate::index_type! {
    /// Identifies a declaration.
    pub struct DeclId;
}

crate::index_type! {
    /// Identifies a resolved source function.
    pub struct FuncIndex;
}

impl FuncIndex {
    /// The program's top-level function.
    pub const PROGRAM: FuncIndex = FuncIndex(0);
}

/// What introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Function body, including parameters and `var`s
    Function,
    /// `{ ... }`
    Block,
    /// Catch parameter
    Catch,
    /// Lexical loop head, fresh per iteration
    Loop,
    /// Shared scope of all `case` clauses
    Switch,
    /// Class body, holding the inner class name
    Class,
    /// Own-name binding of a named function expression
    FunctionName,
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct ScopeData {
    /// What introduced the scope
    pub kind: ScopeKind,
    /// Enclosing scope
    pub parent: Option<ScopeId>,
    /// Owning function
    pub function: FuncIndex,
    /// Declarations in declaration order
    pub decls: Vec<DeclId>,
    /// Captured declarations, in declaration order
    pub captured: Vec<DeclId>,
    names: FxHashMap<String, DeclId>,
}

impl ScopeData {
    /// Looks up a name declared directly in this scope.
    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.names.get(name).copied()
    }
}

/// Declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Formal parameter
    Parameter,
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// `class`
    Class,
    /// Function declaration
    Function,
    /// Catch parameter
    Catch,
    /// Compiler-introduced binding (`this`, `arguments`, class internals)
    Synthetic,
}

impl DeclKind {
    /// Block-scoped bindings subject to the temporal dead zone.
    pub fn is_lexical(self) -> bool {
        matches!(self, DeclKind::Let | DeclKind::Const | DeclKind::Class)
    }
}

/// A declared binding.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Name
    pub name: String,
    /// Kind
    pub kind: DeclKind,
    /// Owning scope
    pub scope: ScopeId,
    /// Declaration site
    pub span: Span,
    /// Read or written from a nested function, or owned by a generator
    pub captured: bool,
    /// Some reference may run before initialization
    pub needs_tdz: bool,
    /// Assigned after its declaration
    pub reassigned: bool,
    /// Assigned from a nested function
    pub written_by_closure: bool,
    /// Global object property rather than a binding
    pub global: bool,
    /// Immutable binding; writes throw
    pub immutable: bool,
    initialized: bool,
}

/// Kind of source function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Top-level code
    Program,
    /// Ordinary function
    Normal,
    /// Arrow function
    Arrow,
    /// Object or class method, getter or setter
    Method,
    /// Class constructor
    Constructor {
        /// Class has an `extends` clause
        derived: bool,
    },
    /// Synthetic class field initializer
    FieldInit,
}

/// Class context visible to `super` references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeObject {
    /// Binding holding the parent constructor
    pub super_ctor: Option<DeclId>,
    /// Binding holding the parent prototype
    pub super_proto: Option<DeclId>,
    /// Static member
    pub is_static: bool,
}

/// A resolved source function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Name used in diagnostics and the function table
    pub name: String,
    /// Function scope
    pub scope: ScopeId,
    /// Lexically enclosing function
    pub parent: Option<FuncIndex>,
    /// Kind
    pub kind: FunctionKind,
    /// `function*`
    pub is_generator: bool,
    /// `async`
    pub is_async: bool,
    /// Strict mode code
    pub strict: bool,
    /// Captured `this`, for arrows or derived constructors
    pub this_decl: Option<DeclId>,
    /// Implicit `arguments` object
    pub arguments_decl: Option<DeclId>,
    /// Captured `new.target`, for arrows
    pub new_target_decl: Option<DeclId>,
    /// Class context for `super`
    pub home: Option<HomeObject>,
    /// Captured declarations owned by this function
    pub captured: Vec<DeclId>,
    /// Declarations of enclosing functions referenced here
    pub free: Vec<DeclId>,
}

impl FunctionInfo {
    /// True for arrows, which take `this` and `arguments` from outside.
    pub fn is_arrow(&self) -> bool {
        self.kind == FunctionKind::Arrow
    }

    /// True if the body suspends.
    pub fn is_resumable(&self) -> bool {
        self.is_generator || self.is_async
    }
}

/// Output of resolution: the scope tree and all declarations.
#[derive(Debug, Clone, Default)]
pub struct SemanticModel {
    /// All scopes
    pub scopes: IndexVec<ScopeId, ScopeData>,
    /// All declarations
    pub decls: IndexVec<DeclId, Declaration>,
    /// All functions; the program is first
    pub functions: IndexVec<FuncIndex, FunctionInfo>,
}

impl SemanticModel {
    /// Scope data.
    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id]
    }

    /// Declaration data.
    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id]
    }

    /// Function data.
    pub fn function(&self, id: FuncIndex) -> &FunctionInfo {
        &self.functions[id]
    }

    /// The function that owns a declaration.
    pub fn decl_function(&self, id: DeclId) -> FuncIndex {
        self.scopes[self.decls[id].scope].function
    }

    /// True if the scope is reified as a runtime environment.
    pub fn is_materialized(&self, id: ScopeId) -> bool {
        !self.scopes[id].captured.is_empty()
    }

    /// Nearest materialized scope at or above `id`.
    pub fn materialized_ancestor(&self, id: ScopeId) -> Option<ScopeId> {
        let mut cur = Some(id);
        while let Some(s) = cur {
            if self.is_materialized(s) {
                return Some(s);
            }
            cur = self.scopes[s].parent;
        }
        None
    }

    /// Nearest materialized scope strictly above `id`.
    pub fn materialized_parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id].parent.and_then(|p| self.materialized_ancestor(p))
    }

    /// Finds a name by walking outward from `scope`.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<DeclId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(decl) = self.scopes[s].lookup(name) {
                return Some(decl);
            }
            cur = self.scopes[s].parent;
        }
        None
    }
}
