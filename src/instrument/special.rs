//! # Special-Form Helpers
//!
//! Scanners and node builders for the instrumenter's special-form
//! handling: `super` usage detection (arrows propagate `super`, nested
//! functions and classes cut it off), direct-`eval` scope-definition
//! literals, and the explicit-alias rewrite used around `with` bodies.

use crate::ast::{
    ArrowBody, ClassMember, Expression, ForInit, ForTarget, ObjectMember, Pattern, PropertyKey,
    Statement,
};

/// Whether any statement references `super` in the current method context.
pub fn statements_use_super(stmts: &[Statement]) -> bool {
    stmts.iter().any(statement_uses_super)
}

fn statement_uses_super(stmt: &Statement) -> bool {
    match stmt {
        Statement::ExpressionStatement { expression } => expression_uses_super(expression),
        Statement::VariableDeclaration { declarations, .. } => declarations.iter().any(|decl| {
            pattern_uses_super(&decl.id)
                || decl.init.as_ref().is_some_and(expression_uses_super)
        }),
        Statement::BlockStatement { body } => statements_use_super(body),
        Statement::ReturnStatement { argument } => {
            argument.as_ref().is_some_and(expression_uses_super)
        }
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            expression_uses_super(test)
                || statement_uses_super(consequent)
                || alternate.as_deref().is_some_and(statement_uses_super)
        }
        Statement::WhileStatement { test, body } => {
            expression_uses_super(test) || statement_uses_super(body)
        }
        Statement::DoWhileStatement { body, test } => {
            statement_uses_super(body) || expression_uses_super(test)
        }
        Statement::ForStatement {
            init,
            test,
            update,
            body,
        } => {
            (match init {
                Some(ForInit::Declaration { declarations, .. }) => declarations
                    .iter()
                    .any(|d| d.init.as_ref().is_some_and(expression_uses_super)),
                Some(ForInit::Expression(e)) => expression_uses_super(e),
                None => false,
            }) || test.as_ref().is_some_and(expression_uses_super)
                || update.as_ref().is_some_and(expression_uses_super)
                || statement_uses_super(body)
        }
        Statement::ForInStatement { left, right, body }
        | Statement::ForOfStatement {
            left, right, body, ..
        } => {
            (match left {
                ForTarget::Declaration { pattern, .. } | ForTarget::Pattern(pattern) => {
                    pattern_uses_super(pattern)
                }
            }) || expression_uses_super(right)
                || statement_uses_super(body)
        }
        Statement::SwitchStatement { discriminant, cases } => {
            expression_uses_super(discriminant)
                || cases.iter().any(|case| {
                    case.test.as_ref().is_some_and(expression_uses_super)
                        || statements_use_super(&case.consequent)
                })
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            statements_use_super(block)
                || handler.as_ref().is_some_and(|h| statements_use_super(&h.body))
                || finalizer.as_ref().is_some_and(|f| statements_use_super(f))
        }
        Statement::ThrowStatement { argument } => expression_uses_super(argument),
        Statement::LabeledStatement { body, .. } => statement_uses_super(body),
        Statement::WithStatement { object, body } => {
            expression_uses_super(object) || statement_uses_super(body)
        }
        _ => false,
    }
}

pub fn expression_uses_super(expression: &Expression) -> bool {
    match expression {
        Expression::SuperExpression => true,
        Expression::MemberExpression { object, property, .. } => {
            expression_uses_super(object)
                || matches!(property, crate::ast::MemberKey::Computed(e) if expression_uses_super(e))
        }
        Expression::CallExpression {
            callee, arguments, ..
        } => expression_uses_super(callee) || arguments.iter().any(expression_uses_super),
        Expression::NewExpression { callee, arguments } => {
            expression_uses_super(callee) || arguments.iter().any(expression_uses_super)
        }
        Expression::BinaryExpression { left, right, .. } => {
            expression_uses_super(left) || expression_uses_super(right)
        }
        Expression::LogicalExpression { left, right, .. } => {
            expression_uses_super(left) || expression_uses_super(right)
        }
        Expression::AssignmentExpression { target, value, .. } => {
            let target_uses = match target {
                crate::ast::AssignmentTarget::Member { object, property, .. } => {
                    expression_uses_super(object)
                        || matches!(property, crate::ast::MemberKey::Computed(e) if expression_uses_super(e))
                }
                crate::ast::AssignmentTarget::Pattern(p) => pattern_uses_super(p),
                crate::ast::AssignmentTarget::Identifier(_) => false,
            };
            target_uses || expression_uses_super(value)
        }
        Expression::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => {
            expression_uses_super(test)
                || expression_uses_super(consequent)
                || expression_uses_super(alternate)
        }
        Expression::UnaryExpression { argument, .. }
        | Expression::UpdateExpression { argument, .. }
        | Expression::AwaitExpression { argument }
        | Expression::SpreadElement { argument } => expression_uses_super(argument),
        Expression::YieldExpression { argument, .. } => {
            argument.as_deref().is_some_and(expression_uses_super)
        }
        Expression::SequenceExpression { expressions } => {
            expressions.iter().any(expression_uses_super)
        }
        Expression::ArrayExpression { elements } => elements
            .iter()
            .flatten()
            .any(expression_uses_super),
        Expression::ObjectExpression { properties } => properties.iter().any(|p| match p {
            // Nested object methods re-bind `super`; only plain values leak.
            ObjectMember::Property {
                value,
                method: false,
                kind: crate::ast::PropertyKind::Init,
                key,
                ..
            } => {
                expression_uses_super(value)
                    || matches!(key, PropertyKey::Computed(e) if expression_uses_super(e))
            }
            ObjectMember::Property { key, .. } => {
                matches!(key, PropertyKey::Computed(e) if expression_uses_super(e))
            }
            ObjectMember::Spread { argument } => expression_uses_super(argument),
        }),
        Expression::TemplateLiteral { expressions, .. } => {
            expressions.iter().any(expression_uses_super)
        }
        Expression::TaggedTemplateExpression {
            tag, expressions, ..
        } => expression_uses_super(tag) || expressions.iter().any(expression_uses_super),
        // Arrows keep the enclosing `super`; functions and classes re-bind.
        Expression::ArrowFunctionExpression(arrow) => match &arrow.body {
            ArrowBody::Block(body) => statements_use_super(body),
            ArrowBody::Expression(e) => expression_uses_super(e),
        },
        _ => false,
    }
}

fn pattern_uses_super(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Identifier(_) => false,
        Pattern::ArrayPattern { elements } => {
            elements.iter().flatten().any(pattern_uses_super)
        }
        Pattern::ObjectPattern { properties } => properties.iter().any(|p| match p {
            crate::ast::ObjectPatternProperty::Property { key, value, .. } => {
                pattern_uses_super(value)
                    || matches!(key, PropertyKey::Computed(e) if expression_uses_super(e))
            }
            crate::ast::ObjectPatternProperty::Rest { argument } => pattern_uses_super(argument),
        }),
        Pattern::AssignmentPattern { left, right } => {
            pattern_uses_super(left) || expression_uses_super(right)
        }
        Pattern::RestElement { argument } => pattern_uses_super(argument),
    }
}

/// Whether an object literal has methods (or accessors) referencing
/// `super`, which makes the literal a home object that must be capturable.
pub fn object_literal_uses_super(properties: &[ObjectMember]) -> bool {
    properties.iter().any(|member| match member {
        ObjectMember::Property { value, method, kind, .. } => {
            (*method || *kind != crate::ast::PropertyKind::Init)
                && match value {
                    Expression::FunctionExpression(f) => statements_use_super(&f.body),
                    _ => false,
                }
        }
        ObjectMember::Spread { .. } => false,
    })
}

/// Whether an explicit constructor's top-level statement is `super(…)`,
/// either bare or as `return super(…)`.
pub fn super_call_position(body: &[Statement]) -> (Option<u32>, bool) {
    for (index, stmt) in body.iter().enumerate() {
        match stmt {
            Statement::ExpressionStatement {
                expression:
                    Expression::CallExpression { callee, .. },
            } if matches!(**callee, Expression::SuperExpression) => {
                return (Some(index as u32), false);
            }
            Statement::ReturnStatement {
                argument: Some(Expression::CallExpression { callee, .. }),
            } if matches!(**callee, Expression::SuperExpression) => {
                return (Some(index as u32), true);
            }
            _ => {}
        }
    }
    (None, false)
}
