// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Terse constructors for syntax trees.
//!
//! Embedders that produce trees programmatically, and the test suites, use
//! these instead of spelling out every struct. All spans are empty.

use super::*;

/// A module-kind program named `test.js`.
pub fn program(body: Vec<Statement>) -> Program {
    Program {
        kind: ProgramKind::Module,
        strict: true,
        file: "test.js".to_string(),
        body,
        span: Span::default(),
        scope: None,
        info: None,
    }
}

/// A sloppy script-kind program named `test.js`.
pub fn script(body: Vec<Statement>) -> Program {
    Program {
        kind: ProgramKind::Script,
        strict: false,
        ..program(body)
    }
}

/// A bare identifier node.
pub fn ident(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
        span: Span::default(),
        binding: None,
        tdz_check: false,
    }
}

/// An identifier with a position, for diagnostics tests.
pub fn ident_at(name: &str, line: u32, column: u32) -> Identifier {
    let start = SourceLoc { line, column };
    Identifier {
        span: Span { start, end: start },
        ..ident(name)
    }
}

/// Identifier reference.
pub fn id(name: &str) -> Expression {
    Expression::Identifier(ident(name))
}

fn lit(value: LiteralValue) -> Expression {
    Expression::Literal(Literal {
        value,
        span: Span::default(),
    })
}

/// Number literal.
pub fn num(value: f64) -> Expression {
    lit(LiteralValue::Number(value))
}

/// String literal.
pub fn string(value: &str) -> Expression {
    lit(LiteralValue::String(value.to_string()))
}

/// Boolean literal.
pub fn boolean(value: bool) -> Expression {
    lit(LiteralValue::Boolean(value))
}

/// `null`.
pub fn null() -> Expression {
    lit(LiteralValue::Null)
}

/// BigInt literal from decimal digits.
pub fn bigint(digits: &str) -> Expression {
    lit(LiteralValue::BigInt(digits.to_string()))
}

/// Regular expression literal.
pub fn regexp(pattern: &str, flags: &str) -> Expression {
    lit(LiteralValue::RegExp {
        pattern: pattern.to_string(),
        flags: flags.to_string(),
    })
}

/// `this`.
pub fn this() -> Expression {
    Expression::ThisExpression(ThisExpression::default())
}

/// `super`.
pub fn super_() -> Expression {
    Expression::Super(SuperExpression::default())
}

/// `new.target`.
pub fn new_target() -> Expression {
    Expression::MetaProperty(MetaProperty {
        meta: ident("new"),
        property: ident("target"),
        span: Span::default(),
        binding: None,
    })
}

/// Binary expression.
pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::BinaryExpression(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

/// `left + right`.
pub fn add(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Add, left, right)
}

/// `left - right`.
pub fn sub(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Sub, left, right)
}

/// `left * right`.
pub fn mul(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Mul, left, right)
}

/// `left < right`.
pub fn lt(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Lt, left, right)
}

/// `left === right`.
pub fn strict_eq(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::StrictEq, left, right)
}

/// Logical expression.
pub fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::LogicalExpression(LogicalExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

/// Unary expression.
pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
    Expression::UnaryExpression(UnaryExpression {
        operator,
        argument: Box::new(argument),
        span: Span::default(),
    })
}

/// `x++` / `++x` and friends.
pub fn update(operator: UpdateOperator, prefix: bool, argument: Expression) -> Expression {
    Expression::UpdateExpression(UpdateExpression {
        operator,
        prefix,
        argument: Box::new(argument),
        span: Span::default(),
    })
}

/// `target = value` for a pattern target.
pub fn assign_to(target: Pattern, value: Expression) -> Expression {
    Expression::AssignmentExpression(AssignmentExpression {
        operator: AssignmentOperator::Assign,
        left: Box::new(target),
        right: Box::new(value),
        span: Span::default(),
    })
}

/// `name = value`.
pub fn assign(name: &str, value: Expression) -> Expression {
    assign_to(pat(name), value)
}

/// `name op= value`.
pub fn compound_assign(operator: CompoundOperator, name: &str, value: Expression) -> Expression {
    Expression::AssignmentExpression(AssignmentExpression {
        operator: AssignmentOperator::Compound(operator),
        left: Box::new(pat(name)),
        right: Box::new(value),
        span: Span::default(),
    })
}

/// `test ? consequent : alternate`.
pub fn conditional(test: Expression, consequent: Expression, alternate: Expression) -> Expression {
    Expression::ConditionalExpression(ConditionalExpression {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
        span: Span::default(),
    })
}

/// `callee(args)`.
pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::CallExpression(CallExpression {
        callee: Box::new(callee),
        arguments,
        optional: false,
        span: Span::default(),
    })
}

/// `callee?.(args)`, to be wrapped in [`chain`].
pub fn optional_call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::CallExpression(CallExpression {
        callee: Box::new(callee),
        arguments,
        optional: true,
        span: Span::default(),
    })
}

/// `new callee(args)`.
pub fn new(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::NewExpression(NewExpression {
        callee: Box::new(callee),
        arguments,
        span: Span::default(),
    })
}

/// `object.name`.
pub fn member(object: Expression, name: &str) -> Expression {
    Expression::MemberExpression(member_node(object, name, false))
}

/// `object?.name`, to be wrapped in [`chain`].
pub fn optional_member(object: Expression, name: &str) -> Expression {
    Expression::MemberExpression(member_node(object, name, true))
}

fn member_node(object: Expression, name: &str, optional: bool) -> MemberExpression {
    MemberExpression {
        object: Box::new(object),
        property: Box::new(id(name)),
        computed: false,
        optional,
        span: Span::default(),
    }
}

/// `object[key]`.
pub fn index(object: Expression, key: Expression) -> Expression {
    Expression::MemberExpression(MemberExpression {
        object: Box::new(object),
        property: Box::new(key),
        computed: true,
        optional: false,
        span: Span::default(),
    })
}

/// Optional chain boundary.
pub fn chain(expression: Expression) -> Expression {
    Expression::ChainExpression(ChainExpression {
        expression: Box::new(expression),
        span: Span::default(),
    })
}

/// `...argument`.
pub fn spread(argument: Expression) -> Expression {
    Expression::SpreadElement(SpreadElement {
        argument: Box::new(argument),
        span: Span::default(),
    })
}

/// `a, b, c`.
pub fn sequence(expressions: Vec<Expression>) -> Expression {
    Expression::SequenceExpression(SequenceExpression {
        expressions,
        span: Span::default(),
    })
}

/// Array literal without holes.
pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::ArrayExpression(ArrayExpression {
        elements: elements.into_iter().map(Some).collect(),
        span: Span::default(),
    })
}

/// Object literal with static keys.
pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::ObjectExpression(ObjectExpression {
        properties: properties
            .into_iter()
            .map(|(key, value)| {
                ObjectMember::Property(Property {
                    key: id(key),
                    value,
                    kind: PropertyKind::Init,
                    computed: false,
                    span: Span::default(),
                })
            })
            .collect(),
        span: Span::default(),
    })
}

/// Template literal from alternating text and expressions.
pub fn template(quasis: &[&str], expressions: Vec<Expression>) -> Expression {
    Expression::TemplateLiteral(TemplateLiteral {
        quasis: quasis
            .iter()
            .map(|q| TemplateElement { cooked: q.to_string() })
            .collect(),
        expressions,
        span: Span::default(),
    })
}

/// `yield argument`.
pub fn yield_(argument: Expression) -> Expression {
    Expression::YieldExpression(YieldExpression {
        argument: Some(Box::new(argument)),
        delegate: false,
        span: Span::default(),
    })
}

/// `yield* argument`.
pub fn yield_star(argument: Expression) -> Expression {
    Expression::YieldExpression(YieldExpression {
        argument: Some(Box::new(argument)),
        delegate: true,
        span: Span::default(),
    })
}

/// `await argument`.
pub fn await_(argument: Expression) -> Expression {
    Expression::AwaitExpression(AwaitExpression {
        argument: Box::new(argument),
        span: Span::default(),
    })
}

/// Identifier pattern.
pub fn pat(name: &str) -> Pattern {
    Pattern::Identifier(ident(name))
}

/// `target = default` pattern.
pub fn pat_default(target: Pattern, default: Expression) -> Pattern {
    Pattern::AssignmentPattern(AssignmentPattern {
        left: Box::new(target),
        right: Box::new(default),
        span: Span::default(),
    })
}

/// `[a, b, ...rest]` pattern.
pub fn pat_array(elements: Vec<Option<Pattern>>, rest: Option<Pattern>) -> Pattern {
    let mut elements = elements;
    if let Some(rest) = rest {
        elements.push(Some(Pattern::RestElement(RestElement {
            argument: Box::new(rest),
            span: Span::default(),
        })));
    }
    Pattern::ArrayPattern(ArrayPattern {
        elements,
        span: Span::default(),
    })
}

/// `{ key: target, ...rest }` pattern.
pub fn pat_object(properties: Vec<(&str, Pattern)>, rest: Option<Pattern>) -> Pattern {
    let mut members: Vec<ObjectPatternProperty> = properties
        .into_iter()
        .map(|(key, value)| {
            ObjectPatternProperty::Property(PatternProperty {
                key: id(key),
                computed: false,
                value,
                span: Span::default(),
            })
        })
        .collect();
    if let Some(rest) = rest {
        members.push(ObjectPatternProperty::RestElement(RestElement {
            argument: Box::new(rest),
            span: Span::default(),
        }));
    }
    Pattern::ObjectPattern(ObjectPattern {
        properties: members,
        span: Span::default(),
    })
}

/// A function node.
pub fn function_node(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Function {
    Function {
        id: name.map(ident),
        params: params.iter().map(|p| pat(p)).collect(),
        body: FunctionBody::Block(block_node(body)),
        is_async: false,
        is_generator: false,
        is_arrow: false,
        strict: false,
        span: Span::default(),
        scope: None,
        info: None,
        self_binding: None,
    }
}

/// `function name(params) { body }` declaration.
pub fn function(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(function_node(Some(name), params, body))
}

/// `function* name(params) { body }` declaration.
pub fn generator(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(Function {
        is_generator: true,
        ..function_node(Some(name), params, body)
    })
}

/// `async function name(params) { body }` declaration.
pub fn async_function(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(Function {
        is_async: true,
        ..function_node(Some(name), params, body)
    })
}

/// Function expression.
pub fn function_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::FunctionExpression(function_node(name, params, body))
}

/// Arrow function with a block body.
pub fn arrow(params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::ArrowFunctionExpression(Function {
        is_arrow: true,
        ..function_node(None, params, body)
    })
}

/// Arrow function with a concise body.
pub fn arrow_expr(params: &[&str], body: Expression) -> Expression {
    Expression::ArrowFunctionExpression(Function {
        is_arrow: true,
        body: FunctionBody::Expression(Box::new(body)),
        ..function_node(None, params, Vec::new())
    })
}

/// Class method.
pub fn method(name: &str, params: &[&str], body: Vec<Statement>) -> ClassMember {
    method_of_kind(MethodKind::Method, name, params, body, false)
}

/// Static class method.
pub fn static_method(name: &str, params: &[&str], body: Vec<Statement>) -> ClassMember {
    method_of_kind(MethodKind::Method, name, params, body, true)
}

/// Class constructor.
pub fn constructor(params: &[&str], body: Vec<Statement>) -> ClassMember {
    method_of_kind(MethodKind::Constructor, "constructor", params, body, false)
}

fn method_of_kind(
    kind: MethodKind,
    name: &str,
    params: &[&str],
    body: Vec<Statement>,
    is_static: bool,
) -> ClassMember {
    ClassMember::MethodDefinition(MethodDefinition {
        key: id(name),
        computed: false,
        kind,
        is_static,
        value: function_node(None, params, body),
        span: Span::default(),
    })
}

/// Class field.
pub fn field(name: &str, value: Option<Expression>, is_static: bool) -> ClassMember {
    ClassMember::PropertyDefinition(PropertyDefinition {
        key: id(name),
        computed: false,
        is_static,
        value,
        span: Span::default(),
    })
}

/// Class node.
pub fn class_node(name: Option<&str>, super_class: Option<Expression>, body: Vec<ClassMember>) -> Class {
    Class {
        id: name.map(ident),
        super_class: super_class.map(Box::new),
        body,
        span: Span::default(),
        scope: None,
        instance_init: None,
        static_init: None,
        super_binding: None,
        super_proto_binding: None,
        instance_init_binding: None,
    }
}

/// `class name extends super { body }` declaration.
pub fn class(name: &str, super_class: Option<Expression>, body: Vec<ClassMember>) -> Statement {
    Statement::ClassDeclaration(class_node(Some(name), super_class, body))
}

/// Expression statement.
pub fn expr(expression: Expression) -> Statement {
    Statement::ExpressionStatement(ExpressionStatement {
        expression,
        span: Span::default(),
    })
}

/// Declaration with a pattern target.
pub fn declare(kind: VariableKind, target: Pattern, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration_node(kind, target, init))
}

fn declaration_node(kind: VariableKind, target: Pattern, init: Option<Expression>) -> VariableDeclaration {
    VariableDeclaration {
        kind,
        declarations: vec![VariableDeclarator {
            id: target,
            init,
            span: Span::default(),
        }],
        span: Span::default(),
    }
}

/// `var name = init`.
pub fn var(name: &str, init: Option<Expression>) -> Statement {
    declare(VariableKind::Var, pat(name), init)
}

/// `let name = init`.
pub fn let_(name: &str, init: Option<Expression>) -> Statement {
    declare(VariableKind::Let, pat(name), init)
}

/// `const name = init`.
pub fn const_(name: &str, init: Expression) -> Statement {
    declare(VariableKind::Const, pat(name), Some(init))
}

/// `return argument`.
pub fn ret(argument: Expression) -> Statement {
    Statement::ReturnStatement(ReturnStatement {
        argument: Some(argument),
        span: Span::default(),
    })
}

/// `return`.
pub fn ret_void() -> Statement {
    Statement::ReturnStatement(ReturnStatement {
        argument: None,
        span: Span::default(),
    })
}

/// `if (test) consequent else alternate`.
pub fn if_(test: Expression, consequent: Vec<Statement>, alternate: Option<Vec<Statement>>) -> Statement {
    Statement::IfStatement(IfStatement {
        test,
        consequent: Box::new(block(consequent)),
        alternate: alternate.map(|a| Box::new(block(a))),
        span: Span::default(),
    })
}

/// `while (test) body`.
pub fn while_(test: Expression, body: Vec<Statement>) -> Statement {
    Statement::WhileStatement(WhileStatement {
        test,
        body: Box::new(block(body)),
        span: Span::default(),
    })
}

/// `do body while (test)`.
pub fn do_while(body: Vec<Statement>, test: Expression) -> Statement {
    Statement::DoWhileStatement(DoWhileStatement {
        body: Box::new(block(body)),
        test,
        span: Span::default(),
    })
}

/// `for (let name = init; test; update) body`.
pub fn for_let(
    name: &str,
    init: Expression,
    test: Expression,
    update: Expression,
    body: Vec<Statement>,
) -> Statement {
    Statement::ForStatement(ForStatement {
        init: Some(ForInit::VariableDeclaration(declaration_node(
            VariableKind::Let,
            pat(name),
            Some(init),
        ))),
        test: Some(test),
        update: Some(update),
        body: Box::new(block(body)),
        span: Span::default(),
        scope: None,
    })
}

/// `for (kind name of iterable) body`.
pub fn for_of(kind: VariableKind, name: &str, iterable: Expression, body: Vec<Statement>) -> Statement {
    Statement::ForOfStatement(ForOfStatement {
        left: ForHead::VariableDeclaration(declaration_node(kind, pat(name), None)),
        right: iterable,
        body: Box::new(block(body)),
        span: Span::default(),
        scope: None,
    })
}

/// `for (kind name in object) body`.
pub fn for_in(kind: VariableKind, name: &str, object: Expression, body: Vec<Statement>) -> Statement {
    Statement::ForInStatement(ForInStatement {
        left: ForHead::VariableDeclaration(declaration_node(kind, pat(name), None)),
        right: object,
        body: Box::new(block(body)),
        span: Span::default(),
        scope: None,
    })
}

fn block_node(body: Vec<Statement>) -> BlockStatement {
    BlockStatement {
        body,
        span: Span::default(),
        scope: None,
    }
}

/// `{ body }`.
pub fn block(body: Vec<Statement>) -> Statement {
    Statement::BlockStatement(block_node(body))
}

/// `break`.
pub fn break_() -> Statement {
    Statement::BreakStatement(JumpStatement {
        label: None,
        span: Span::default(),
    })
}

/// `break label`.
pub fn break_label(label: &str) -> Statement {
    Statement::BreakStatement(JumpStatement {
        label: Some(ident(label)),
        span: Span::default(),
    })
}

/// `continue`.
pub fn continue_() -> Statement {
    Statement::ContinueStatement(JumpStatement {
        label: None,
        span: Span::default(),
    })
}

/// `label: body`.
pub fn labeled(label: &str, body: Statement) -> Statement {
    Statement::LabeledStatement(LabeledStatement {
        label: ident(label),
        body: Box::new(body),
        span: Span::default(),
    })
}

/// `throw argument`.
pub fn throw(argument: Expression) -> Statement {
    Statement::ThrowStatement(ThrowStatement {
        argument,
        span: Span::default(),
    })
}

/// `try { block } catch (param) { handler } finally { finalizer }`.
pub fn try_(
    block: Vec<Statement>,
    handler: Option<(Option<&str>, Vec<Statement>)>,
    finalizer: Option<Vec<Statement>>,
) -> Statement {
    Statement::TryStatement(TryStatement {
        block: block_node(block),
        handler: handler.map(|(param, body)| CatchClause {
            param: param.map(pat),
            body: block_node(body),
            span: Span::default(),
            scope: None,
        }),
        finalizer: finalizer.map(block_node),
        span: Span::default(),
    })
}

/// `switch (discriminant) { cases }`; a `None` test is `default`.
pub fn switch(discriminant: Expression, cases: Vec<(Option<Expression>, Vec<Statement>)>) -> Statement {
    Statement::SwitchStatement(SwitchStatement {
        discriminant,
        cases: cases
            .into_iter()
            .map(|(test, consequent)| SwitchCase {
                test,
                consequent,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
        scope: None,
    })
}
