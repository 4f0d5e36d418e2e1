// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Syntax tree consumed by the compiler.
//!
//! The shape follows ESTree: a front end serializes its tree as JSON with a
//! `type` tag on every node and the compiler deserializes it directly. Fields
//! marked `#[serde(skip)]` are decorations filled in by the scope resolver.

pub mod build;

use serde::{Deserialize, Serialize};

use crate::sema::{DeclId, FuncIndex, ScopeId};

/// A line/column position. Lines are 1-based, columns 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SourceLoc {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

/// Source range of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start position
    pub start: SourceLoc,
    /// End position
    pub end: SourceLoc,
}

/// Whether top-level declarations are globals or module locals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramKind {
    /// Top-level `var` and functions become global object properties
    Script,
    /// Top-level declarations are locals of the module function
    #[default]
    Module,
}

/// A complete compilation unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// Script or module
    #[serde(default, rename = "sourceType")]
    pub kind: ProgramKind,
    /// Strict mode for the whole unit
    #[serde(default)]
    pub strict: bool,
    /// Source file name used in diagnostics
    #[serde(default)]
    pub file: String,
    /// The statements in the program
    pub body: Vec<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Top-level function scope
    #[serde(skip)]
    pub scope: Option<ScopeId>,
    /// Top-level function record
    #[serde(skip)]
    pub info: Option<FuncIndex>,
}

/// An identifier, either declaring or referencing a binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Resolved declaration; `None` means a dynamic global lookup
    #[serde(skip)]
    pub binding: Option<DeclId>,
    /// This reference may observe the binding before initialization
    #[serde(skip)]
    pub tdz_check: bool,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    /// `var`, `let` or `const`
    VariableDeclaration(VariableDeclaration),
    /// Function declaration
    FunctionDeclaration(Function),
    /// Class declaration
    ClassDeclaration(Class),
    /// Expression statement
    ExpressionStatement(ExpressionStatement),
    /// `{ ... }`
    BlockStatement(BlockStatement),
    /// `if`
    IfStatement(IfStatement),
    /// `switch`
    SwitchStatement(SwitchStatement),
    /// `while`
    WhileStatement(WhileStatement),
    /// `do ... while`
    DoWhileStatement(DoWhileStatement),
    /// `for (;;)`
    ForStatement(ForStatement),
    /// `for ... in`
    ForInStatement(ForInStatement),
    /// `for ... of`
    ForOfStatement(ForOfStatement),
    /// `return`
    ReturnStatement(ReturnStatement),
    /// `break`
    BreakStatement(JumpStatement),
    /// `continue`
    ContinueStatement(JumpStatement),
    /// `throw`
    ThrowStatement(ThrowStatement),
    /// `try`
    TryStatement(TryStatement),
    /// `label: stmt`
    LabeledStatement(LabeledStatement),
    /// `debugger`
    DebuggerStatement(EmptyStatement),
    /// `;`
    EmptyStatement(EmptyStatement),
}

/// Variable declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// var declaration
    Var,
    /// let declaration
    Let,
    /// const declaration
    Const,
}

/// A variable declaration statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableDeclaration {
    /// The kind of declaration
    pub kind: VariableKind,
    /// The declarators
    pub declarations: Vec<VariableDeclarator>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A single declarator, `pattern = init`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableDeclarator {
    /// The binding pattern
    pub id: Pattern,
    /// Optional initializer
    pub init: Option<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Body of a function: a block or, for arrows, a single expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FunctionBody {
    /// `{ ... }`
    Block(BlockStatement),
    /// Concise arrow body
    Expression(Box<Expression>),
}

/// Function declarations, expressions, arrows and methods.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    /// Function name, if any
    pub id: Option<Identifier>,
    /// Parameters
    pub params: Vec<Pattern>,
    /// Body
    pub body: FunctionBody,
    /// `async`
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// `function*`
    #[serde(default, rename = "generator")]
    pub is_generator: bool,
    /// Arrow function
    #[serde(default)]
    pub is_arrow: bool,
    /// Body carries a "use strict" directive
    #[serde(default)]
    pub strict: bool,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Function scope
    #[serde(skip)]
    pub scope: Option<ScopeId>,
    /// Resolved function record
    #[serde(skip)]
    pub info: Option<FuncIndex>,
    /// Binding of a named function expression's own name
    #[serde(skip)]
    pub self_binding: Option<DeclId>,
}

impl Function {
    /// The function's name, or an empty string.
    pub fn name(&self) -> &str {
        self.id.as_ref().map_or("", |id| id.name.as_str())
    }

    /// True if every parameter is a plain identifier.
    pub fn has_simple_params(&self) -> bool {
        self.params.iter().all(|p| matches!(p, Pattern::Identifier(_)))
    }
}

/// A class declaration or expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    /// Class name, if any
    pub id: Option<Identifier>,
    /// `extends` clause
    pub super_class: Option<Box<Expression>>,
    /// Members
    pub body: Vec<ClassMember>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Class scope, holding the inner name binding
    #[serde(skip)]
    pub scope: Option<ScopeId>,
    /// Synthetic function running instance field initializers
    #[serde(skip)]
    pub instance_init: Option<FuncIndex>,
    /// Synthetic function running static field initializers
    #[serde(skip)]
    pub static_init: Option<FuncIndex>,
    /// Binding holding the parent constructor
    #[serde(skip)]
    pub super_binding: Option<DeclId>,
    /// Binding holding the parent prototype
    #[serde(skip)]
    pub super_proto_binding: Option<DeclId>,
    /// Binding holding the instance field initializer closure
    #[serde(skip)]
    pub instance_init_binding: Option<DeclId>,
}

impl Class {
    /// The explicit constructor, if declared.
    pub fn constructor(&self) -> Option<&Function> {
        self.body.iter().find_map(|m| match m {
            ClassMember::MethodDefinition(m) if m.kind == MethodKind::Constructor => Some(&m.value),
            _ => None,
        })
    }
}

/// A class body member.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClassMember {
    /// Method, accessor or constructor
    MethodDefinition(MethodDefinition),
    /// Field
    PropertyDefinition(PropertyDefinition),
}

/// Method kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// `constructor(...)`
    Constructor,
    /// Plain method
    Method,
    /// Getter
    Get,
    /// Setter
    Set,
}

/// A class method.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodDefinition {
    /// Key
    pub key: Expression,
    /// Key is `[expr]`
    #[serde(default)]
    pub computed: bool,
    /// Kind
    pub kind: MethodKind,
    /// `static`
    #[serde(default, rename = "static")]
    pub is_static: bool,
    /// The function
    pub value: Function,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A class field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyDefinition {
    /// Key
    pub key: Expression,
    /// Key is `[expr]`
    #[serde(default)]
    pub computed: bool,
    /// `static`
    #[serde(default, rename = "static")]
    pub is_static: bool,
    /// Initializer
    pub value: Option<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// An expression statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpressionStatement {
    /// The expression
    pub expression: Expression,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BlockStatement {
    /// Statements
    pub body: Vec<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Block scope
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IfStatement {
    /// Condition
    pub test: Expression,
    /// Then branch
    pub consequent: Box<Statement>,
    /// Else branch
    pub alternate: Option<Box<Statement>>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A switch statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwitchStatement {
    /// Discriminant
    pub discriminant: Expression,
    /// Cases in source order
    pub cases: Vec<SwitchCase>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Scope shared by all case bodies
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// A `case` or `default` clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default`
    pub test: Option<Expression>,
    /// Statements
    pub consequent: Vec<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A while loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhileStatement {
    /// Condition
    pub test: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A do-while loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DoWhileStatement {
    /// Body
    pub body: Box<Statement>,
    /// Condition
    pub test: Expression,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Initializer clause of a `for (;;)` loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ForInit {
    /// `for (let i = 0; ...)`
    VariableDeclaration(VariableDeclaration),
    /// `for (i = 0; ...)`
    Expression(Expression),
}

/// A `for (;;)` loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForStatement {
    /// Initializer
    pub init: Option<ForInit>,
    /// Condition
    pub test: Option<Expression>,
    /// Update
    pub update: Option<Expression>,
    /// Body
    pub body: Box<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Scope of lexical head declarations
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// Left-hand side of `for-in`/`for-of`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ForHead {
    /// `for (const x of ...)`
    VariableDeclaration(VariableDeclaration),
    /// `for (x of ...)`
    Pattern(Pattern),
}

/// A `for-in` loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForInStatement {
    /// Binding
    pub left: ForHead,
    /// Object
    pub right: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Per-iteration scope of lexical head declarations
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// A `for-of` loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForOfStatement {
    /// Binding
    pub left: ForHead,
    /// Iterable
    pub right: Expression,
    /// Body
    pub body: Box<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Per-iteration scope of lexical head declarations
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// A return statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReturnStatement {
    /// Returned value
    pub argument: Option<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `break` or `continue`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JumpStatement {
    /// Target label
    pub label: Option<Identifier>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A throw statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThrowStatement {
    /// Thrown value
    pub argument: Expression,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A try statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TryStatement {
    /// Protected block
    pub block: BlockStatement,
    /// `catch` clause
    pub handler: Option<CatchClause>,
    /// `finally` block
    pub finalizer: Option<BlockStatement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A catch clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatchClause {
    /// Binding, absent for `catch {}`
    pub param: Option<Pattern>,
    /// Body
    pub body: BlockStatement,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Scope of the catch parameter
    #[serde(skip)]
    pub scope: Option<ScopeId>,
}

/// A labeled statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabeledStatement {
    /// Label
    pub label: Identifier,
    /// Labeled statement
    pub body: Box<Statement>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A statement with no payload.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EmptyStatement {
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A binding or assignment target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// `x`
    Identifier(Identifier),
    /// `{ a, b: c, ...rest }`
    ObjectPattern(ObjectPattern),
    /// `[a, , b, ...rest]`
    ArrayPattern(ArrayPattern),
    /// `target = default`
    AssignmentPattern(AssignmentPattern),
    /// `...target`
    RestElement(RestElement),
    /// `obj.prop`, only as an assignment target
    MemberExpression(MemberExpression),
}

impl Pattern {
    /// Source range of the pattern.
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(id) => id.span,
            Pattern::ObjectPattern(p) => p.span,
            Pattern::ArrayPattern(p) => p.span,
            Pattern::AssignmentPattern(p) => p.span,
            Pattern::RestElement(p) => p.span,
            Pattern::MemberExpression(m) => m.span,
        }
    }
}

/// An object destructuring pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectPattern {
    /// Properties in source order
    pub properties: Vec<ObjectPatternProperty>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A member of an object pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectPatternProperty {
    /// `key: value`
    Property(PatternProperty),
    /// `...rest`
    RestElement(RestElement),
}

/// `key: value` inside an object pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatternProperty {
    /// Key
    pub key: Expression,
    /// Key is `[expr]`
    #[serde(default)]
    pub computed: bool,
    /// Target
    pub value: Pattern,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// An array destructuring pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArrayPattern {
    /// Elements; `None` is an elision
    pub elements: Vec<Option<Pattern>>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A pattern with a default value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssignmentPattern {
    /// Target
    pub left: Box<Pattern>,
    /// Default
    pub right: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A rest element.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RestElement {
    /// Target
    pub argument: Box<Pattern>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// Literal value
    Literal(Literal),
    /// Identifier reference
    Identifier(Identifier),
    /// `this`
    ThisExpression(ThisExpression),
    /// `super`, as a call callee or member object
    Super(SuperExpression),
    /// `[a, b]`
    ArrayExpression(ArrayExpression),
    /// `{ a: b }`
    ObjectExpression(ObjectExpression),
    /// `function () {}`
    FunctionExpression(Function),
    /// `() => {}`
    ArrowFunctionExpression(Function),
    /// `class {}`
    ClassExpression(Class),
    /// Unary operator
    UnaryExpression(UnaryExpression),
    /// `++`/`--`
    UpdateExpression(UpdateExpression),
    /// Binary operator
    BinaryExpression(BinaryExpression),
    /// `&&`, `||`, `??`
    LogicalExpression(LogicalExpression),
    /// Assignment, plain or compound
    AssignmentExpression(AssignmentExpression),
    /// `a ? b : c`
    ConditionalExpression(ConditionalExpression),
    /// Function call
    CallExpression(CallExpression),
    /// `new`
    NewExpression(NewExpression),
    /// Property access
    MemberExpression(MemberExpression),
    /// Optional chain boundary
    ChainExpression(ChainExpression),
    /// `a, b`
    SequenceExpression(SequenceExpression),
    /// Template literal
    TemplateLiteral(TemplateLiteral),
    /// `yield`
    YieldExpression(YieldExpression),
    /// `await`
    AwaitExpression(AwaitExpression),
    /// `new.target`
    MetaProperty(MetaProperty),
    /// `...x` in call arguments and array literals
    SpreadElement(SpreadElement),
}

impl Expression {
    /// Source range of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(e) => e.span,
            Expression::Identifier(e) => e.span,
            Expression::ThisExpression(e) => e.span,
            Expression::Super(e) => e.span,
            Expression::ArrayExpression(e) => e.span,
            Expression::ObjectExpression(e) => e.span,
            Expression::FunctionExpression(e) | Expression::ArrowFunctionExpression(e) => e.span,
            Expression::ClassExpression(e) => e.span,
            Expression::UnaryExpression(e) => e.span,
            Expression::UpdateExpression(e) => e.span,
            Expression::BinaryExpression(e) => e.span,
            Expression::LogicalExpression(e) => e.span,
            Expression::AssignmentExpression(e) => e.span,
            Expression::ConditionalExpression(e) => e.span,
            Expression::CallExpression(e) => e.span,
            Expression::NewExpression(e) => e.span,
            Expression::MemberExpression(e) => e.span,
            Expression::ChainExpression(e) => e.span,
            Expression::SequenceExpression(e) => e.span,
            Expression::TemplateLiteral(e) => e.span,
            Expression::YieldExpression(e) => e.span,
            Expression::AwaitExpression(e) => e.span,
            Expression::MetaProperty(e) => e.span,
            Expression::SpreadElement(e) => e.span,
        }
    }

    /// The static name of a non-computed property key.
    pub fn static_key(&self) -> Option<String> {
        match self {
            Expression::Identifier(id) => Some(id.name.clone()),
            Expression::Literal(lit) => match &lit.value {
                LiteralValue::String(s) => Some(s.clone()),
                LiteralValue::Number(n) => Some(crate::ir::literal::number_to_string(*n)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Literal {
    /// The value
    pub value: LiteralValue,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum LiteralValue {
    /// `null`
    Null,
    /// `true`/`false`
    Boolean(bool),
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// BigInt literal, decimal digits without the `n` suffix
    BigInt(String),
    /// Regular expression literal
    RegExp {
        /// Pattern source
        pattern: String,
        /// Flags
        flags: String,
    },
}

/// `this`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ThisExpression {
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Captured `this` binding when referenced from an arrow or a derived constructor
    #[serde(skip)]
    pub binding: Option<DeclId>,
    /// Needs an initialization check (derived constructors)
    #[serde(skip)]
    pub tdz_check: bool,
}

/// `super`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SuperExpression {
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Parent constructor or prototype binding
    #[serde(skip)]
    pub binding: Option<DeclId>,
}

/// An array literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArrayExpression {
    /// Elements; `None` is a hole
    pub elements: Vec<Option<Expression>>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// An object literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectExpression {
    /// Members in source order
    pub properties: Vec<ObjectMember>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A member of an object literal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectMember {
    /// `key: value`, shorthand, method or accessor
    Property(Property),
    /// `...source`
    SpreadElement(SpreadElement),
}

/// Property kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Data property
    #[default]
    Init,
    /// Getter
    Get,
    /// Setter
    Set,
}

/// An object literal property.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Property {
    /// Key
    pub key: Expression,
    /// Value
    pub value: Expression,
    /// Kind
    #[serde(default)]
    pub kind: PropertyKind,
    /// Key is `[expr]`
    #[serde(default)]
    pub computed: bool,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UnaryOperator {
    /// `-`
    #[serde(rename = "-")]
    Minus,
    /// `+`
    #[serde(rename = "+")]
    Plus,
    /// `!`
    #[serde(rename = "!")]
    Not,
    /// `~`
    #[serde(rename = "~")]
    BitNot,
    /// `typeof`
    #[serde(rename = "typeof")]
    TypeOf,
    /// `void`
    #[serde(rename = "void")]
    Void,
    /// `delete`
    #[serde(rename = "delete")]
    Delete,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnaryExpression {
    /// Operator
    pub operator: UnaryOperator,
    /// Operand
    pub argument: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `++` or `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UpdateOperator {
    /// `++`
    #[serde(rename = "++")]
    Increment,
    /// `--`
    #[serde(rename = "--")]
    Decrement,
}

/// An update expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateExpression {
    /// Operator
    pub operator: UpdateOperator,
    /// `++x` rather than `x++`
    pub prefix: bool,
    /// Target
    pub argument: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum BinaryOperator {
    /// `+`
    #[serde(rename = "+")]
    Add,
    /// `-`
    #[serde(rename = "-")]
    Sub,
    /// `*`
    #[serde(rename = "*")]
    Mul,
    /// `/`
    #[serde(rename = "/")]
    Div,
    /// `%`
    #[serde(rename = "%")]
    Mod,
    /// `**`
    #[serde(rename = "**")]
    Exp,
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `===`
    #[serde(rename = "===")]
    StrictEq,
    /// `!==`
    #[serde(rename = "!==")]
    StrictNe,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `&`
    #[serde(rename = "&")]
    BitAnd,
    /// `|`
    #[serde(rename = "|")]
    BitOr,
    /// `^`
    #[serde(rename = "^")]
    BitXor,
    /// `<<`
    #[serde(rename = "<<")]
    Shl,
    /// `>>`
    #[serde(rename = ">>")]
    Shr,
    /// `>>>`
    #[serde(rename = ">>>")]
    UShr,
    /// `in`
    #[serde(rename = "in")]
    In,
    /// `instanceof`
    #[serde(rename = "instanceof")]
    InstanceOf,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinaryExpression {
    /// Operator
    pub operator: BinaryOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand
    pub right: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogicalOperator {
    /// `&&`
    #[serde(rename = "&&")]
    And,
    /// `||`
    #[serde(rename = "||")]
    Or,
    /// `??`
    #[serde(rename = "??")]
    Nullish,
}

/// A logical expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogicalExpression {
    /// Operator
    pub operator: LogicalOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand, evaluated conditionally
    pub right: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AssignmentOperator {
    /// `=`
    #[serde(rename = "=")]
    Assign,
    /// `op=` for an arithmetic or bitwise operator
    #[serde(untagged)]
    Compound(CompoundOperator),
}

/// Compound assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CompoundOperator {
    /// `+=`
    #[serde(rename = "+=")]
    Add,
    /// `-=`
    #[serde(rename = "-=")]
    Sub,
    /// `*=`
    #[serde(rename = "*=")]
    Mul,
    /// `/=`
    #[serde(rename = "/=")]
    Div,
    /// `%=`
    #[serde(rename = "%=")]
    Mod,
    /// `**=`
    #[serde(rename = "**=")]
    Exp,
    /// `&=`
    #[serde(rename = "&=")]
    BitAnd,
    /// `|=`
    #[serde(rename = "|=")]
    BitOr,
    /// `^=`
    #[serde(rename = "^=")]
    BitXor,
    /// `<<=`
    #[serde(rename = "<<=")]
    Shl,
    /// `>>=`
    #[serde(rename = ">>=")]
    Shr,
    /// `>>>=`
    #[serde(rename = ">>>=")]
    UShr,
    /// `&&=`
    #[serde(rename = "&&=")]
    And,
    /// `||=`
    #[serde(rename = "||=")]
    Or,
    /// `??=`
    #[serde(rename = "??=")]
    Nullish,
}

impl CompoundOperator {
    /// The arithmetic operator, or `None` for the logical forms.
    pub fn binary(self) -> Option<BinaryOperator> {
        Some(match self {
            CompoundOperator::Add => BinaryOperator::Add,
            CompoundOperator::Sub => BinaryOperator::Sub,
            CompoundOperator::Mul => BinaryOperator::Mul,
            CompoundOperator::Div => BinaryOperator::Div,
            CompoundOperator::Mod => BinaryOperator::Mod,
            CompoundOperator::Exp => BinaryOperator::Exp,
            CompoundOperator::BitAnd => BinaryOperator::BitAnd,
            CompoundOperator::BitOr => BinaryOperator::BitOr,
            CompoundOperator::BitXor => BinaryOperator::BitXor,
            CompoundOperator::Shl => BinaryOperator::Shl,
            CompoundOperator::Shr => BinaryOperator::Shr,
            CompoundOperator::UShr => BinaryOperator::UShr,
            CompoundOperator::And | CompoundOperator::Or | CompoundOperator::Nullish => return None,
        })
    }

    /// The short-circuit operator for `&&=`, `||=` and `??=`.
    pub fn logical(self) -> Option<LogicalOperator> {
        match self {
            CompoundOperator::And => Some(LogicalOperator::And),
            CompoundOperator::Or => Some(LogicalOperator::Or),
            CompoundOperator::Nullish => Some(LogicalOperator::Nullish),
            _ => None,
        }
    }
}

/// An assignment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssignmentExpression {
    /// Operator
    pub operator: AssignmentOperator,
    /// Target
    pub left: Box<Pattern>,
    /// Value
    pub right: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `test ? consequent : alternate`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionalExpression {
    /// Condition
    pub test: Box<Expression>,
    /// Value if truthy
    pub consequent: Box<Expression>,
    /// Value if falsy
    pub alternate: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// A call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallExpression {
    /// Callee; `Super` for `super(...)`
    pub callee: Box<Expression>,
    /// Arguments, possibly containing spreads
    pub arguments: Vec<Expression>,
    /// `f?.()`
    #[serde(default)]
    pub optional: bool,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `new callee(args)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewExpression {
    /// Constructor
    pub callee: Box<Expression>,
    /// Arguments
    pub arguments: Vec<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Property access.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemberExpression {
    /// Object; `Super` for `super.x`
    pub object: Box<Expression>,
    /// Property: an identifier when not computed
    pub property: Box<Expression>,
    /// `obj[expr]`
    #[serde(default)]
    pub computed: bool,
    /// `obj?.prop`
    #[serde(default)]
    pub optional: bool,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

impl MemberExpression {
    /// The property name of a non-computed access.
    pub fn static_name(&self) -> Option<&str> {
        match (&*self.property, self.computed) {
            (Expression::Identifier(id), false) => Some(&id.name),
            _ => None,
        }
    }
}

/// Wraps an optional chain; short-circuits land at its end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChainExpression {
    /// The chain
    pub expression: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `a, b, c`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SequenceExpression {
    /// Expressions in evaluation order
    pub expressions: Vec<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// Template literal text segment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateElement {
    /// Cooked text
    pub cooked: String,
}

/// `` `a${b}c` ``.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateLiteral {
    /// Text segments; one more than `expressions`
    pub quasis: Vec<TemplateElement>,
    /// Interpolations
    pub expressions: Vec<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `yield` or `yield*`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YieldExpression {
    /// Yielded value
    pub argument: Option<Box<Expression>>,
    /// `yield*`
    #[serde(default)]
    pub delegate: bool,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `await`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AwaitExpression {
    /// Awaited value
    pub argument: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

/// `new.target`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaProperty {
    /// `new`
    pub meta: Identifier,
    /// `target`
    pub property: Identifier,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
    /// Captured `new.target` binding when referenced from an arrow
    #[serde(skip)]
    pub binding: Option<DeclId>,
}

/// `...argument`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpreadElement {
    /// Spread value
    pub argument: Box<Expression>,
    /// Source range
    #[serde(default, rename = "loc")]
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_estree_json() {
        let json = r#"{
            "sourceType": "module",
            "file": "a.js",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [
                    { "id": { "type": "Identifier", "name": "x" },
                      "init": { "type": "BinaryExpression", "operator": "+",
                                "left": { "type": "Literal", "value": { "kind": "Number", "value": 1 } },
                                "right": { "type": "Identifier", "name": "y" } } }
                ] }
            ]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.kind, ProgramKind::Module);
        let Statement::VariableDeclaration(decl) = &program.body[0] else {
            panic!("expected a declaration");
        };
        assert_eq!(decl.kind, VariableKind::Let);
        assert!(matches!(
            decl.declarations[0].init,
            Some(Expression::BinaryExpression(BinaryExpression { operator: BinaryOperator::Add, .. }))
        ));
    }

    #[test]
    fn test_compound_assignment_operator() {
        let op: AssignmentOperator = serde_json::from_str(r#""+=""#).unwrap();
        assert_eq!(op, AssignmentOperator::Compound(CompoundOperator::Add));
        let op: AssignmentOperator = serde_json::from_str(r#""=""#).unwrap();
        assert_eq!(op, AssignmentOperator::Assign);
    }
}
