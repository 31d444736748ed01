//! # OXC Conversion
//!
//! Total conversion from the OXC arena AST into the owned
//! [`crate::ast`] types. Unsupported syntax (TypeScript constructs, JSX
//! elements, decorators) is reported as [`ParseError::UnsupportedSyntax`]
//! rather than silently dropped.

use oxc_ast::ast as oxc;

use crate::ast;
use crate::ast::{Identifier, Pattern, Program, SourceType, Statement};
use crate::parser::{ParseError, ParseResult};

pub fn convert_program(program: &oxc::Program<'_>, filename: &str) -> ParseResult<Program> {
    let ctx = Ctx { filename };
    let mut body = Vec::with_capacity(program.body.len());
    for directive in &program.directives {
        body.push(ast::expr_stmt(ast::string_lit(
            directive.expression.value.to_string(),
        )));
    }
    for stmt in &program.body {
        body.push(ctx.statement(stmt)?);
    }
    Ok(Program {
        body,
        source_type: if program.source_type.is_module() {
            SourceType::Module
        } else {
            SourceType::Script
        },
    })
}

struct Ctx<'f> {
    filename: &'f str,
}

impl Ctx<'_> {
    fn unsupported<T>(&self, node_type: &str) -> ParseResult<T> {
        Err(ParseError::UnsupportedSyntax {
            filename: self.filename.to_string(),
            node_type: node_type.to_string(),
        })
    }

    fn statement(&self, stmt: &oxc::Statement<'_>) -> ParseResult<Statement> {
        Ok(match stmt {
            oxc::Statement::BlockStatement(block) => Statement::BlockStatement {
                body: self.statements(&block.body)?,
            },
            oxc::Statement::BreakStatement(s) => Statement::BreakStatement {
                label: s.label.as_ref().map(|l| l.name.to_string()),
            },
            oxc::Statement::ContinueStatement(s) => Statement::ContinueStatement {
                label: s.label.as_ref().map(|l| l.name.to_string()),
            },
            oxc::Statement::DebuggerStatement(_) => Statement::DebuggerStatement,
            oxc::Statement::DoWhileStatement(s) => Statement::DoWhileStatement {
                body: Box::new(self.statement(&s.body)?),
                test: self.expression(&s.test)?,
            },
            oxc::Statement::EmptyStatement(_) => Statement::EmptyStatement,
            oxc::Statement::ExpressionStatement(s) => Statement::ExpressionStatement {
                expression: self.expression(&s.expression)?,
            },
            oxc::Statement::ForInStatement(s) => Statement::ForInStatement {
                left: self.for_target(&s.left)?,
                right: self.expression(&s.right)?,
                body: Box::new(self.statement(&s.body)?),
            },
            oxc::Statement::ForOfStatement(s) => Statement::ForOfStatement {
                is_await: s.r#await,
                left: self.for_target(&s.left)?,
                right: self.expression(&s.right)?,
                body: Box::new(self.statement(&s.body)?),
            },
            oxc::Statement::ForStatement(s) => {
                let init = match &s.init {
                    None => None,
                    Some(oxc::ForStatementInit::VariableDeclaration(decl)) => {
                        Some(ast::ForInit::Declaration {
                            kind: self.declaration_kind(decl.kind)?,
                            declarations: self.declarators(&decl.declarations)?,
                        })
                    }
                    Some(init) => match init.as_expression() {
                        Some(expression) => {
                            Some(ast::ForInit::Expression(self.expression(expression)?))
                        }
                        None => return self.unsupported("for-init"),
                    },
                };
                Statement::ForStatement {
                    init,
                    test: s.test.as_ref().map(|e| self.expression(e)).transpose()?,
                    update: s.update.as_ref().map(|e| self.expression(e)).transpose()?,
                    body: Box::new(self.statement(&s.body)?),
                }
            }
            oxc::Statement::IfStatement(s) => Statement::IfStatement {
                test: self.expression(&s.test)?,
                consequent: Box::new(self.statement(&s.consequent)?),
                alternate: s
                    .alternate
                    .as_ref()
                    .map(|alt| self.statement(alt).map(Box::new))
                    .transpose()?,
            },
            oxc::Statement::LabeledStatement(s) => Statement::LabeledStatement {
                label: s.label.name.to_string(),
                body: Box::new(self.statement(&s.body)?),
            },
            oxc::Statement::ReturnStatement(s) => Statement::ReturnStatement {
                argument: s.argument.as_ref().map(|e| self.expression(e)).transpose()?,
            },
            oxc::Statement::SwitchStatement(s) => {
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in &s.cases {
                    cases.push(ast::SwitchCase {
                        test: case.test.as_ref().map(|e| self.expression(e)).transpose()?,
                        consequent: self.statements(&case.consequent)?,
                    });
                }
                Statement::SwitchStatement {
                    discriminant: self.expression(&s.discriminant)?,
                    cases,
                }
            }
            oxc::Statement::ThrowStatement(s) => Statement::ThrowStatement {
                argument: self.expression(&s.argument)?,
            },
            oxc::Statement::TryStatement(s) => {
                let handler = match &s.handler {
                    Some(clause) => Some(ast::CatchClause {
                        param: clause
                            .param
                            .as_ref()
                            .map(|p| self.binding_pattern(&p.pattern))
                            .transpose()?,
                        body: self.statements(&clause.body.body)?,
                    }),
                    None => None,
                };
                Statement::TryStatement {
                    block: self.statements(&s.block.body)?,
                    handler,
                    finalizer: s
                        .finalizer
                        .as_ref()
                        .map(|f| self.statements(&f.body))
                        .transpose()?,
                }
            }
            oxc::Statement::WhileStatement(s) => Statement::WhileStatement {
                test: self.expression(&s.test)?,
                body: Box::new(self.statement(&s.body)?),
            },
            oxc::Statement::WithStatement(s) => Statement::WithStatement {
                object: self.expression(&s.object)?,
                body: Box::new(self.statement(&s.body)?),
            },
            oxc::Statement::VariableDeclaration(decl) => Statement::VariableDeclaration {
                kind: self.declaration_kind(decl.kind)?,
                declarations: self.declarators(&decl.declarations)?,
            },
            oxc::Statement::FunctionDeclaration(f) => {
                Statement::FunctionDeclaration(self.function(f)?)
            }
            oxc::Statement::ClassDeclaration(c) => Statement::ClassDeclaration(self.class(c)?),
            oxc::Statement::ImportDeclaration(decl) => {
                let mut specifiers = Vec::new();
                if let Some(specs) = &decl.specifiers {
                    for spec in specs {
                        specifiers.push(match spec {
                            oxc::ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                ast::ImportSpecifier::Named {
                                    imported: module_export_name(&s.imported),
                                    local: Identifier::new(s.local.name.to_string()),
                                }
                            }
                            oxc::ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                ast::ImportSpecifier::Default {
                                    local: Identifier::new(s.local.name.to_string()),
                                }
                            }
                            oxc::ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                ast::ImportSpecifier::Namespace {
                                    local: Identifier::new(s.local.name.to_string()),
                                }
                            }
                        });
                    }
                }
                Statement::ImportDeclaration {
                    specifiers,
                    source: decl.source.value.to_string(),
                }
            }
            oxc::Statement::ExportNamedDeclaration(decl) => {
                let declaration = match &decl.declaration {
                    Some(d) => Some(Box::new(self.declaration(d)?)),
                    None => None,
                };
                let specifiers = decl
                    .specifiers
                    .iter()
                    .map(|s| ast::ExportSpecifier {
                        local: module_export_name(&s.local),
                        exported: module_export_name(&s.exported),
                    })
                    .collect();
                Statement::ExportNamedDeclaration {
                    declaration,
                    specifiers,
                    source: decl.source.as_ref().map(|s| s.value.to_string()),
                }
            }
            oxc::Statement::ExportDefaultDeclaration(decl) => {
                let expression = match &decl.declaration {
                    oxc::ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        ast::Expression::FunctionExpression(self.function(f)?)
                    }
                    oxc::ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        ast::Expression::ClassExpression(self.class(c)?)
                    }
                    other => match other.as_expression() {
                        Some(expression) => self.expression(expression)?,
                        None => return self.unsupported("export-default declaration"),
                    },
                };
                Statement::ExportDefaultDeclaration { expression }
            }
            oxc::Statement::ExportAllDeclaration(decl) => Statement::ExportAllDeclaration {
                exported: decl.exported.as_ref().map(module_export_name),
                source: decl.source.value.to_string(),
            },
            _ => return self.unsupported("statement"),
        })
    }

    fn statements(&self, stmts: &[oxc::Statement<'_>]) -> ParseResult<Vec<Statement>> {
        stmts.iter().map(|s| self.statement(s)).collect()
    }

    fn declaration(&self, decl: &oxc::Declaration<'_>) -> ParseResult<Statement> {
        Ok(match decl {
            oxc::Declaration::VariableDeclaration(d) => Statement::VariableDeclaration {
                kind: self.declaration_kind(d.kind)?,
                declarations: self.declarators(&d.declarations)?,
            },
            oxc::Declaration::FunctionDeclaration(f) => {
                Statement::FunctionDeclaration(self.function(f)?)
            }
            oxc::Declaration::ClassDeclaration(c) => Statement::ClassDeclaration(self.class(c)?),
            _ => return self.unsupported("declaration"),
        })
    }

    fn declaration_kind(
        &self,
        kind: oxc::VariableDeclarationKind,
    ) -> ParseResult<ast::DeclarationKind> {
        Ok(match kind {
            oxc::VariableDeclarationKind::Var => ast::DeclarationKind::Var,
            oxc::VariableDeclarationKind::Let => ast::DeclarationKind::Let,
            oxc::VariableDeclarationKind::Const => ast::DeclarationKind::Const,
            _ => return self.unsupported("variable declaration kind"),
        })
    }

    fn declarators(
        &self,
        declarations: &[oxc::VariableDeclarator<'_>],
    ) -> ParseResult<Vec<ast::VariableDeclarator>> {
        declarations
            .iter()
            .map(|decl| {
                Ok(ast::VariableDeclarator {
                    id: self.binding_pattern(&decl.id)?,
                    init: decl.init.as_ref().map(|e| self.expression(e)).transpose()?,
                })
            })
            .collect()
    }

    fn for_target(&self, left: &oxc::ForStatementLeft<'_>) -> ParseResult<ast::ForTarget> {
        Ok(match left {
            oxc::ForStatementLeft::VariableDeclaration(decl) => {
                let declarator = decl
                    .declarations
                    .first()
                    .ok_or_else(|| ParseError::UnsupportedSyntax {
                        filename: self.filename.to_string(),
                        node_type: "empty for-target declaration".to_string(),
                    })?;
                ast::ForTarget::Declaration {
                    kind: self.declaration_kind(decl.kind)?,
                    pattern: self.binding_pattern(&declarator.id)?,
                }
            }
            other => {
                let target = self.assignment_target_from_for(other)?;
                ast::ForTarget::Pattern(target)
            }
        })
    }

    fn assignment_target_from_for(&self, left: &oxc::ForStatementLeft<'_>) -> ParseResult<Pattern> {
        match left {
            oxc::ForStatementLeft::AssignmentTargetIdentifier(id) => {
                Ok(ast::ident_pattern(id.name.to_string()))
            }
            _ => self.unsupported("for-in/of target"),
        }
    }

    fn binding_pattern(&self, pattern: &oxc::BindingPattern<'_>) -> ParseResult<Pattern> {
        Ok(match &pattern.kind {
            oxc::BindingPatternKind::BindingIdentifier(id) => {
                Pattern::Identifier(Identifier::new(id.name.to_string()))
            }
            oxc::BindingPatternKind::ObjectPattern(obj) => {
                let mut properties = Vec::with_capacity(obj.properties.len() + 1);
                for prop in &obj.properties {
                    properties.push(ast::ObjectPatternProperty::Property {
                        key: self.property_key(&prop.key, prop.computed)?,
                        value: self.binding_pattern(&prop.value)?,
                        shorthand: prop.shorthand,
                    });
                }
                if let Some(rest) = &obj.rest {
                    properties.push(ast::ObjectPatternProperty::Rest {
                        argument: self.binding_pattern(&rest.argument)?,
                    });
                }
                Pattern::ObjectPattern { properties }
            }
            oxc::BindingPatternKind::ArrayPattern(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len() + 1);
                for element in &arr.elements {
                    elements.push(match element {
                        Some(p) => Some(self.binding_pattern(p)?),
                        None => None,
                    });
                }
                if let Some(rest) = &arr.rest {
                    elements.push(Some(Pattern::RestElement {
                        argument: Box::new(self.binding_pattern(&rest.argument)?),
                    }));
                }
                Pattern::ArrayPattern { elements }
            }
            oxc::BindingPatternKind::AssignmentPattern(assign) => Pattern::AssignmentPattern {
                left: Box::new(self.binding_pattern(&assign.left)?),
                right: Box::new(self.expression(&assign.right)?),
            },
        })
    }

    fn formal_parameters(&self, params: &oxc::FormalParameters<'_>) -> ParseResult<Vec<Pattern>> {
        let mut out = Vec::with_capacity(params.items.len() + 1);
        for param in &params.items {
            out.push(self.binding_pattern(&param.pattern)?);
        }
        if let Some(rest) = &params.rest {
            out.push(Pattern::RestElement {
                argument: Box::new(self.binding_pattern(&rest.argument)?),
            });
        }
        Ok(out)
    }

    fn function(&self, function: &oxc::Function<'_>) -> ParseResult<ast::FunctionNode> {
        let body = function
            .body
            .as_ref()
            .ok_or_else(|| ParseError::UnsupportedSyntax {
                filename: self.filename.to_string(),
                node_type: "function without body".to_string(),
            })?;
        Ok(ast::FunctionNode {
            id: function
                .id
                .as_ref()
                .map(|id| Identifier::new(id.name.to_string())),
            params: self.formal_parameters(&function.params)?,
            body: self.function_body(body)?,
            is_async: function.r#async,
            is_generator: function.generator,
            body_comment: None,
        })
    }

    fn function_body(&self, body: &oxc::FunctionBody<'_>) -> ParseResult<Vec<Statement>> {
        let mut out = Vec::with_capacity(body.directives.len() + body.statements.len());
        for directive in &body.directives {
            out.push(ast::expr_stmt(ast::string_lit(
                directive.expression.value.to_string(),
            )));
        }
        for stmt in &body.statements {
            out.push(self.statement(stmt)?);
        }
        Ok(out)
    }

    fn class(&self, class: &oxc::Class<'_>) -> ParseResult<ast::ClassNode> {
        let mut body = Vec::with_capacity(class.body.body.len());
        for element in &class.body.body {
            body.push(match element {
                oxc::ClassElement::MethodDefinition(method) => ast::ClassMember::Method {
                    key: self.property_key(&method.key, method.computed)?,
                    function: self.function(&method.value)?,
                    kind: match method.kind {
                        oxc::MethodDefinitionKind::Constructor => ast::MethodKind::Constructor,
                        oxc::MethodDefinitionKind::Method => ast::MethodKind::Method,
                        oxc::MethodDefinitionKind::Get => ast::MethodKind::Get,
                        oxc::MethodDefinitionKind::Set => ast::MethodKind::Set,
                    },
                    is_static: method.r#static,
                },
                oxc::ClassElement::PropertyDefinition(prop) => ast::ClassMember::Property {
                    key: self.property_key(&prop.key, prop.computed)?,
                    value: prop.value.as_ref().map(|e| self.expression(e)).transpose()?,
                    is_static: prop.r#static,
                },
                oxc::ClassElement::StaticBlock(block) => ast::ClassMember::StaticBlock {
                    body: self.statements(&block.body)?,
                },
                _ => return self.unsupported("class element"),
            });
        }
        Ok(ast::ClassNode {
            id: class
                .id
                .as_ref()
                .map(|id| Identifier::new(id.name.to_string())),
            super_class: class
                .super_class
                .as_ref()
                .map(|e| self.expression(e).map(Box::new))
                .transpose()?,
            body,
            body_comment: None,
        })
    }

    fn property_key(
        &self,
        key: &oxc::PropertyKey<'_>,
        computed: bool,
    ) -> ParseResult<ast::PropertyKey> {
        if computed {
            let expression = key
                .as_expression()
                .ok_or_else(|| ParseError::UnsupportedSyntax {
                    filename: self.filename.to_string(),
                    node_type: "computed property key".to_string(),
                })?;
            return Ok(ast::PropertyKey::Computed(Box::new(
                self.expression(expression)?,
            )));
        }
        Ok(match key {
            oxc::PropertyKey::StaticIdentifier(id) => {
                ast::PropertyKey::Identifier(id.name.to_string())
            }
            oxc::PropertyKey::PrivateIdentifier(id) => {
                ast::PropertyKey::Private(id.name.to_string())
            }
            other => match other.as_expression() {
                Some(oxc::Expression::StringLiteral(s)) => {
                    ast::PropertyKey::String(s.value.to_string())
                }
                Some(oxc::Expression::NumericLiteral(n)) => ast::PropertyKey::Number(n.value),
                Some(expression) => {
                    ast::PropertyKey::Computed(Box::new(self.expression(expression)?))
                }
                None => return self.unsupported("property key"),
            },
        })
    }

    fn expression(&self, expression: &oxc::Expression<'_>) -> ParseResult<ast::Expression> {
        use ast::Expression as E;
        Ok(match expression {
            oxc::Expression::BooleanLiteral(l) => ast::bool_lit(l.value),
            oxc::Expression::NullLiteral(_) => ast::null_lit(),
            oxc::Expression::NumericLiteral(l) => ast::number_lit(l.value),
            oxc::Expression::BigIntLiteral(l) => E::Literal(ast::Literal::BigInt(
                l.raw.trim_end_matches('n').to_string(),
            )),
            oxc::Expression::RegExpLiteral(l) => E::Literal(ast::Literal::RegExp {
                pattern: l.regex.pattern.to_string(),
                flags: l.regex.flags.to_string(),
            }),
            oxc::Expression::StringLiteral(l) => ast::string_lit(l.value.to_string()),
            oxc::Expression::TemplateLiteral(t) => {
                let (quasis, expressions) = self.template_parts(t)?;
                E::TemplateLiteral {
                    quasis,
                    expressions,
                }
            }
            oxc::Expression::TaggedTemplateExpression(t) => {
                let (quasis, expressions) = self.template_parts(&t.quasi)?;
                E::TaggedTemplateExpression {
                    tag: Box::new(self.expression(&t.tag)?),
                    quasis,
                    expressions,
                }
            }
            oxc::Expression::Identifier(id) => ast::ident(id.name.to_string()),
            oxc::Expression::MetaProperty(m) => E::MetaProperty {
                meta: m.meta.name.to_string(),
                property: m.property.name.to_string(),
            },
            oxc::Expression::Super(_) => E::SuperExpression,
            oxc::Expression::ThisExpression(_) => E::ThisExpression,
            oxc::Expression::ArrayExpression(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    elements.push(match element {
                        oxc::ArrayExpressionElement::Elision(_) => None,
                        oxc::ArrayExpressionElement::SpreadElement(spread) => {
                            Some(E::SpreadElement {
                                argument: Box::new(self.expression(&spread.argument)?),
                            })
                        }
                        other => match other.as_expression() {
                            Some(expression) => Some(self.expression(expression)?),
                            None => return self.unsupported("array element"),
                        },
                    });
                }
                E::ArrayExpression { elements }
            }
            oxc::Expression::ObjectExpression(obj) => {
                let mut properties = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    properties.push(match prop {
                        oxc::ObjectPropertyKind::ObjectProperty(p) => ast::ObjectMember::Property {
                            key: self.property_key(&p.key, p.computed)?,
                            value: self.expression(&p.value)?,
                            kind: match p.kind {
                                oxc::PropertyKind::Init => ast::PropertyKind::Init,
                                oxc::PropertyKind::Get => ast::PropertyKind::Get,
                                oxc::PropertyKind::Set => ast::PropertyKind::Set,
                            },
                            method: p.method,
                            shorthand: p.shorthand,
                        },
                        oxc::ObjectPropertyKind::SpreadProperty(s) => ast::ObjectMember::Spread {
                            argument: self.expression(&s.argument)?,
                        },
                    });
                }
                E::ObjectExpression { properties }
            }
            oxc::Expression::FunctionExpression(f) => E::FunctionExpression(self.function(f)?),
            oxc::Expression::ArrowFunctionExpression(arrow) => {
                let params = self.formal_parameters(&arrow.params)?;
                let body = if arrow.expression {
                    let first = arrow.body.statements.first().ok_or_else(|| {
                        ParseError::UnsupportedSyntax {
                            filename: self.filename.to_string(),
                            node_type: "empty arrow expression body".to_string(),
                        }
                    })?;
                    match first {
                        oxc::Statement::ExpressionStatement(s) => {
                            ast::ArrowBody::Expression(Box::new(self.expression(&s.expression)?))
                        }
                        _ => return self.unsupported("arrow expression body"),
                    }
                } else {
                    ast::ArrowBody::Block(self.function_body(&arrow.body)?)
                };
                E::ArrowFunctionExpression(ast::ArrowNode {
                    params,
                    body,
                    is_async: arrow.r#async,
                    body_comment: None,
                })
            }
            oxc::Expression::ClassExpression(c) => E::ClassExpression(self.class(c)?),
            oxc::Expression::AssignmentExpression(assign) => E::AssignmentExpression {
                operator: self.assignment_operator(assign.operator)?,
                target: self.assignment_target(&assign.left)?,
                value: Box::new(self.expression(&assign.right)?),
            },
            oxc::Expression::AwaitExpression(a) => E::AwaitExpression {
                argument: Box::new(self.expression(&a.argument)?),
            },
            oxc::Expression::BinaryExpression(b) => E::BinaryExpression {
                left: Box::new(self.expression(&b.left)?),
                operator: self.binary_operator(b.operator)?,
                right: Box::new(self.expression(&b.right)?),
            },
            oxc::Expression::LogicalExpression(l) => E::LogicalExpression {
                left: Box::new(self.expression(&l.left)?),
                operator: match l.operator {
                    oxc::LogicalOperator::And => ast::LogicalOperator::And,
                    oxc::LogicalOperator::Or => ast::LogicalOperator::Or,
                    oxc::LogicalOperator::Coalesce => ast::LogicalOperator::NullishCoalescing,
                },
                right: Box::new(self.expression(&l.right)?),
            },
            oxc::Expression::CallExpression(c) => E::CallExpression {
                callee: Box::new(self.expression(&c.callee)?),
                arguments: self.arguments(&c.arguments)?,
                optional: c.optional,
            },
            oxc::Expression::NewExpression(n) => E::NewExpression {
                callee: Box::new(self.expression(&n.callee)?),
                arguments: self.arguments(&n.arguments)?,
            },
            oxc::Expression::ImportExpression(i) => {
                let mut arguments = vec![self.expression(&i.source)?];
                for argument in &i.arguments {
                    arguments.push(self.expression(argument)?);
                }
                E::CallExpression {
                    callee: Box::new(ast::ident("import")),
                    arguments,
                    optional: false,
                }
            }
            oxc::Expression::ConditionalExpression(c) => E::ConditionalExpression {
                test: Box::new(self.expression(&c.test)?),
                consequent: Box::new(self.expression(&c.consequent)?),
                alternate: Box::new(self.expression(&c.alternate)?),
            },
            oxc::Expression::SequenceExpression(s) => E::SequenceExpression {
                expressions: s
                    .expressions
                    .iter()
                    .map(|e| self.expression(e))
                    .collect::<ParseResult<Vec<_>>>()?,
            },
            oxc::Expression::UnaryExpression(u) => E::UnaryExpression {
                operator: match u.operator {
                    oxc::UnaryOperator::UnaryPlus => ast::UnaryOperator::Plus,
                    oxc::UnaryOperator::UnaryNegation => ast::UnaryOperator::Minus,
                    oxc::UnaryOperator::LogicalNot => ast::UnaryOperator::LogicalNot,
                    oxc::UnaryOperator::BitwiseNot => ast::UnaryOperator::BitwiseNot,
                    oxc::UnaryOperator::Typeof => ast::UnaryOperator::Typeof,
                    oxc::UnaryOperator::Void => ast::UnaryOperator::Void,
                    oxc::UnaryOperator::Delete => ast::UnaryOperator::Delete,
                },
                argument: Box::new(self.expression(&u.argument)?),
            },
            oxc::Expression::UpdateExpression(u) => E::UpdateExpression {
                operator: match u.operator {
                    oxc::UpdateOperator::Increment => ast::UpdateOperator::Increment,
                    oxc::UpdateOperator::Decrement => ast::UpdateOperator::Decrement,
                },
                argument: Box::new(self.simple_assignment_target(&u.argument)?),
                prefix: u.prefix,
            },
            oxc::Expression::YieldExpression(y) => E::YieldExpression {
                argument: y
                    .argument
                    .as_ref()
                    .map(|e| self.expression(e).map(Box::new))
                    .transpose()?,
                delegate: y.delegate,
            },
            oxc::Expression::PrivateInExpression(p) => E::BinaryExpression {
                // Prints as `#name in obj`, which re-parses identically.
                left: Box::new(ast::ident(format!("#{}", p.left.name))),
                operator: ast::BinaryOperator::In,
                right: Box::new(self.expression(&p.right)?),
            },
            oxc::Expression::ParenthesizedExpression(p) => self.expression(&p.expression)?,
            oxc::Expression::ChainExpression(chain) => match &chain.expression {
                oxc::ChainElement::CallExpression(c) => E::CallExpression {
                    callee: Box::new(self.expression(&c.callee)?),
                    arguments: self.arguments(&c.arguments)?,
                    optional: c.optional,
                },
                oxc::ChainElement::ComputedMemberExpression(m) => E::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Computed(Box::new(self.expression(&m.expression)?)),
                    optional: m.optional,
                },
                oxc::ChainElement::StaticMemberExpression(m) => E::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Static(m.property.name.to_string()),
                    optional: m.optional,
                },
                oxc::ChainElement::PrivateFieldExpression(m) => E::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Private(m.field.name.to_string()),
                    optional: m.optional,
                },
            },
            oxc::Expression::ComputedMemberExpression(m) => E::MemberExpression {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Computed(Box::new(self.expression(&m.expression)?)),
                optional: m.optional,
            },
            oxc::Expression::StaticMemberExpression(m) => E::MemberExpression {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Static(m.property.name.to_string()),
                optional: m.optional,
            },
            oxc::Expression::PrivateFieldExpression(m) => E::MemberExpression {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Private(m.field.name.to_string()),
                optional: m.optional,
            },
            _ => return self.unsupported("expression"),
        })
    }

    fn template_parts(
        &self,
        template: &oxc::TemplateLiteral<'_>,
    ) -> ParseResult<(Vec<ast::TemplateElement>, Vec<ast::Expression>)> {
        let quasis = template
            .quasis
            .iter()
            .map(|quasi| ast::TemplateElement {
                raw: quasi.value.raw.to_string(),
                cooked: quasi.value.cooked.as_ref().map(|c| c.to_string()),
                tail: quasi.tail,
            })
            .collect();
        let expressions = template
            .expressions
            .iter()
            .map(|e| self.expression(e))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok((quasis, expressions))
    }

    fn arguments(&self, arguments: &[oxc::Argument<'_>]) -> ParseResult<Vec<ast::Expression>> {
        arguments
            .iter()
            .map(|argument| match argument {
                oxc::Argument::SpreadElement(spread) => Ok(ast::Expression::SpreadElement {
                    argument: Box::new(self.expression(&spread.argument)?),
                }),
                other => match other.as_expression() {
                    Some(expression) => self.expression(expression),
                    None => self.unsupported("call argument"),
                },
            })
            .collect()
    }

    fn simple_assignment_target(
        &self,
        target: &oxc::SimpleAssignmentTarget<'_>,
    ) -> ParseResult<ast::Expression> {
        Ok(match target {
            oxc::SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                ast::ident(id.name.to_string())
            }
            oxc::SimpleAssignmentTarget::ComputedMemberExpression(m) => {
                ast::Expression::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Computed(Box::new(self.expression(&m.expression)?)),
                    optional: m.optional,
                }
            }
            oxc::SimpleAssignmentTarget::StaticMemberExpression(m) => {
                ast::Expression::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Static(m.property.name.to_string()),
                    optional: m.optional,
                }
            }
            oxc::SimpleAssignmentTarget::PrivateFieldExpression(m) => {
                ast::Expression::MemberExpression {
                    object: Box::new(self.expression(&m.object)?),
                    property: ast::MemberKey::Private(m.field.name.to_string()),
                    optional: m.optional,
                }
            }
            _ => return self.unsupported("assignment target"),
        })
    }

    fn assignment_target(
        &self,
        target: &oxc::AssignmentTarget<'_>,
    ) -> ParseResult<ast::AssignmentTarget> {
        Ok(match target {
            oxc::AssignmentTarget::AssignmentTargetIdentifier(id) => {
                ast::AssignmentTarget::Identifier(Identifier::new(id.name.to_string()))
            }
            oxc::AssignmentTarget::ComputedMemberExpression(m) => ast::AssignmentTarget::Member {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Computed(Box::new(self.expression(&m.expression)?)),
                optional: m.optional,
            },
            oxc::AssignmentTarget::StaticMemberExpression(m) => ast::AssignmentTarget::Member {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Static(m.property.name.to_string()),
                optional: m.optional,
            },
            oxc::AssignmentTarget::PrivateFieldExpression(m) => ast::AssignmentTarget::Member {
                object: Box::new(self.expression(&m.object)?),
                property: ast::MemberKey::Private(m.field.name.to_string()),
                optional: m.optional,
            },
            oxc::AssignmentTarget::ArrayAssignmentTarget(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len() + 1);
                for element in &arr.elements {
                    elements.push(match element {
                        Some(e) => Some(self.assignment_target_maybe_default(e)?),
                        None => None,
                    });
                }
                if let Some(rest) = &arr.rest {
                    elements.push(Some(Pattern::RestElement {
                        argument: Box::new(self.assignment_target_pattern(&rest.target)?),
                    }));
                }
                ast::AssignmentTarget::Pattern(Pattern::ArrayPattern { elements })
            }
            oxc::AssignmentTarget::ObjectAssignmentTarget(obj) => {
                let mut properties = Vec::with_capacity(obj.properties.len() + 1);
                for prop in &obj.properties {
                    properties.push(match prop {
                        oxc::AssignmentTargetProperty::AssignmentTargetPropertyIdentifier(p) => {
                            let value = match &p.init {
                                Some(init) => Pattern::AssignmentPattern {
                                    left: Box::new(ast::ident_pattern(p.binding.name.to_string())),
                                    right: Box::new(self.expression(init)?),
                                },
                                None => ast::ident_pattern(p.binding.name.to_string()),
                            };
                            ast::ObjectPatternProperty::Property {
                                key: ast::PropertyKey::Identifier(p.binding.name.to_string()),
                                value,
                                shorthand: true,
                            }
                        }
                        oxc::AssignmentTargetProperty::AssignmentTargetPropertyProperty(p) => {
                            ast::ObjectPatternProperty::Property {
                                key: self.property_key(&p.name, false)?,
                                value: self.assignment_target_maybe_default(&p.binding)?,
                                shorthand: false,
                            }
                        }
                    });
                }
                if let Some(rest) = &obj.rest {
                    properties.push(ast::ObjectPatternProperty::Rest {
                        argument: self.assignment_target_pattern(&rest.target)?,
                    });
                }
                ast::AssignmentTarget::Pattern(Pattern::ObjectPattern { properties })
            }
            _ => return self.unsupported("assignment target"),
        })
    }

    fn assignment_target_maybe_default(
        &self,
        target: &oxc::AssignmentTargetMaybeDefault<'_>,
    ) -> ParseResult<Pattern> {
        match target {
            oxc::AssignmentTargetMaybeDefault::AssignmentTargetWithDefault(with_default) => {
                Ok(Pattern::AssignmentPattern {
                    left: Box::new(self.assignment_target_pattern(&with_default.binding)?),
                    right: Box::new(self.expression(&with_default.init)?),
                })
            }
            other => match other.as_assignment_target() {
                Some(target) => self.assignment_target_pattern(target),
                None => self.unsupported("assignment pattern element"),
            },
        }
    }

    /// Converts an assignment target usable inside a destructuring pattern.
    fn assignment_target_pattern(&self, target: &oxc::AssignmentTarget<'_>) -> ParseResult<Pattern> {
        match self.assignment_target(target)? {
            ast::AssignmentTarget::Identifier(id) => Ok(Pattern::Identifier(id)),
            ast::AssignmentTarget::Pattern(pattern) => Ok(pattern),
            ast::AssignmentTarget::Member { .. } => {
                self.unsupported("member expression in destructuring pattern")
            }
        }
    }

    fn binary_operator(&self, operator: oxc::BinaryOperator) -> ParseResult<ast::BinaryOperator> {
        use ast::BinaryOperator as B;
        Ok(match operator {
            oxc::BinaryOperator::Addition => B::Add,
            oxc::BinaryOperator::Subtraction => B::Subtract,
            oxc::BinaryOperator::Multiplication => B::Multiply,
            oxc::BinaryOperator::Division => B::Divide,
            oxc::BinaryOperator::Remainder => B::Remainder,
            oxc::BinaryOperator::Exponential => B::Exponentiation,
            oxc::BinaryOperator::Equality => B::Equal,
            oxc::BinaryOperator::Inequality => B::NotEqual,
            oxc::BinaryOperator::StrictEquality => B::StrictEqual,
            oxc::BinaryOperator::StrictInequality => B::StrictNotEqual,
            oxc::BinaryOperator::LessThan => B::LessThan,
            oxc::BinaryOperator::LessEqualThan => B::LessThanEqual,
            oxc::BinaryOperator::GreaterThan => B::GreaterThan,
            oxc::BinaryOperator::GreaterEqualThan => B::GreaterThanEqual,
            oxc::BinaryOperator::ShiftLeft => B::LeftShift,
            oxc::BinaryOperator::ShiftRight => B::RightShift,
            oxc::BinaryOperator::ShiftRightZeroFill => B::UnsignedRightShift,
            oxc::BinaryOperator::BitwiseAnd => B::BitwiseAnd,
            oxc::BinaryOperator::BitwiseOR => B::BitwiseOr,
            oxc::BinaryOperator::BitwiseXOR => B::BitwiseXor,
            oxc::BinaryOperator::In => B::In,
            oxc::BinaryOperator::Instanceof => B::Instanceof,
        })
    }

    fn assignment_operator(
        &self,
        operator: oxc::AssignmentOperator,
    ) -> ParseResult<ast::AssignmentOperator> {
        use ast::AssignmentOperator as A;
        Ok(match operator {
            oxc::AssignmentOperator::Assign => A::Assign,
            oxc::AssignmentOperator::Addition => A::AddAssign,
            oxc::AssignmentOperator::Subtraction => A::SubtractAssign,
            oxc::AssignmentOperator::Multiplication => A::MultiplyAssign,
            oxc::AssignmentOperator::Division => A::DivideAssign,
            oxc::AssignmentOperator::Remainder => A::RemainderAssign,
            oxc::AssignmentOperator::Exponential => A::ExponentiationAssign,
            oxc::AssignmentOperator::ShiftLeft => A::LeftShiftAssign,
            oxc::AssignmentOperator::ShiftRight => A::RightShiftAssign,
            oxc::AssignmentOperator::ShiftRightZeroFill => A::UnsignedRightShiftAssign,
            oxc::AssignmentOperator::BitwiseAnd => A::BitwiseAndAssign,
            oxc::AssignmentOperator::BitwiseOR => A::BitwiseOrAssign,
            oxc::AssignmentOperator::BitwiseXOR => A::BitwiseXorAssign,
            oxc::AssignmentOperator::LogicalAnd => A::LogicalAndAssign,
            oxc::AssignmentOperator::LogicalOr => A::LogicalOrAssign,
            oxc::AssignmentOperator::LogicalNullish => A::NullishCoalescingAssign,
        })
    }
}

fn module_export_name(name: &oxc::ModuleExportName<'_>) -> String {
    match name {
        oxc::ModuleExportName::IdentifierName(id) => id.name.to_string(),
        oxc::ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        oxc::ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}
