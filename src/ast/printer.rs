//! # Printer
//!
//! Walks the AST and emits JavaScript source, handling operator precedence,
//! statement-start hazards and string/number canonicalization. Three modes:
//! `Pretty` (indented), `Minified` (one statement per line, minimal
//! whitespace) and `Compact` (single line).

use serde::{Deserialize, Serialize};

use crate::ast::*;

/// Operator precedence levels (higher binds tighter).
const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGN: u8 = 3;
const PREC_CONDITIONAL: u8 = 4;
const PREC_NULLISH: u8 = 5;
const PREC_LOGICAL_OR: u8 = 5;
const PREC_LOGICAL_AND: u8 = 6;
const PREC_BITWISE_OR: u8 = 7;
const PREC_BITWISE_XOR: u8 = 8;
const PREC_BITWISE_AND: u8 = 9;
const PREC_EQUALITY: u8 = 10;
const PREC_RELATIONAL: u8 = 11;
const PREC_SHIFT: u8 = 12;
const PREC_ADDITIVE: u8 = 13;
const PREC_MULTIPLICATIVE: u8 = 14;
const PREC_EXPONENTIATION: u8 = 15;
const PREC_UNARY: u8 = 16;
const PREC_POSTFIX: u8 = 17;
const PREC_CALL: u8 = 19;
const PREC_MEMBER: u8 = 20;
const PREC_PRIMARY: u8 = 21;

/// Output whitespace mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrintMode {
    #[default]
    Pretty,
    Minified,
    Compact,
}

/// Printer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintOptions {
    pub mode: PrintMode,
    /// Record a raw mapping at the start of every statement.
    pub mappings: bool,
}

/// Generated-position marker recorded per statement when
/// [`PrintOptions::mappings`] is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMapping {
    pub generated_line: u32,
    pub generated_column: u32,
}

pub struct Printer {
    options: PrintOptions,
    out: String,
    indent_level: usize,
    line: u32,
    column: u32,
    mappings: Vec<RawMapping>,
}

/// Prints a whole program with the given options.
pub fn print_program(program: &Program, options: &PrintOptions) -> String {
    let mut printer = Printer::new(options.clone());
    printer.program(program);
    printer.finish().0
}

/// Prints a single expression (used for record nodes and diagnostics).
pub fn print_expression(expression: &Expression, options: &PrintOptions) -> String {
    let mut printer = Printer::new(options.clone());
    printer.expression(expression, PREC_SEQUENCE);
    printer.finish().0
}

impl Printer {
    pub fn new(options: PrintOptions) -> Self {
        Self {
            options,
            out: String::with_capacity(4096),
            indent_level: 0,
            line: 0,
            column: 0,
            mappings: Vec::new(),
        }
    }

    pub fn finish(self) -> (String, Vec<RawMapping>) {
        (self.out, self.mappings)
    }

    fn write(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(text);
    }

    fn pretty(&self) -> bool {
        self.options.mode == PrintMode::Pretty
    }

    /// Space that only pretty output keeps.
    fn space(&mut self) {
        if self.pretty() {
            self.write(" ");
        }
    }

    /// Space required for token separation in every mode.
    fn hard_space(&mut self) {
        self.write(" ");
    }

    fn newline(&mut self) {
        match self.options.mode {
            PrintMode::Pretty => {
                self.write("\n");
                let indent = "  ".repeat(self.indent_level);
                self.write(&indent);
            }
            PrintMode::Minified => self.write("\n"),
            PrintMode::Compact => {}
        }
    }

    fn record_mapping(&mut self) {
        if self.options.mappings {
            self.mappings.push(RawMapping {
                generated_line: self.line,
                generated_column: self.column,
            });
        }
    }

    pub fn program(&mut self, program: &Program) {
        for (i, stmt) in program.body.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.statement(stmt);
        }
        if self.pretty() && !program.body.is_empty() {
            self.write("\n");
        }
    }

    pub fn statement(&mut self, stmt: &Statement) {
        self.record_mapping();
        match stmt {
            Statement::VariableDeclaration { kind, declarations } => {
                self.variable_declaration(*kind, declarations);
                self.write(";");
            }
            Statement::FunctionDeclaration(function) => self.function(function, true),
            Statement::ClassDeclaration(class) => self.class(class),
            Statement::ExpressionStatement { expression } => {
                if starts_statement_hazard(expression) {
                    self.write("(");
                    self.expression(expression, PREC_SEQUENCE);
                    self.write(")");
                } else {
                    self.expression(expression, PREC_SEQUENCE);
                }
                self.write(";");
            }
            Statement::BlockStatement { body } => self.block(body),
            Statement::ReturnStatement { argument } => {
                self.write("return");
                if let Some(argument) = argument {
                    self.hard_space();
                    self.expression(argument, PREC_SEQUENCE);
                }
                self.write(";");
            }
            Statement::IfStatement {
                test,
                consequent,
                alternate,
            } => {
                self.write("if");
                self.space();
                self.write("(");
                self.expression(test, PREC_SEQUENCE);
                self.write(")");
                self.embedded_statement(consequent);
                if let Some(alternate) = alternate {
                    if matches!(**consequent, Statement::BlockStatement { .. }) {
                        self.space();
                    } else {
                        self.newline();
                    }
                    self.write("else");
                    if matches!(
                        **alternate,
                        Statement::BlockStatement { .. } | Statement::IfStatement { .. }
                    ) {
                        self.space();
                        if !self.pretty() {
                            self.hard_space();
                        }
                        self.statement(alternate);
                    } else {
                        self.hard_space();
                        self.statement(alternate);
                    }
                }
            }
            Statement::WhileStatement { test, body } => {
                self.write("while");
                self.space();
                self.write("(");
                self.expression(test, PREC_SEQUENCE);
                self.write(")");
                self.embedded_statement(body);
            }
            Statement::DoWhileStatement { body, test } => {
                self.write("do");
                if matches!(**body, Statement::BlockStatement { .. }) {
                    self.space();
                    if !self.pretty() {
                        self.hard_space();
                    }
                    self.statement(body);
                    self.space();
                } else {
                    self.hard_space();
                    self.statement(body);
                    self.space();
                }
                self.write("while");
                self.space();
                self.write("(");
                self.expression(test, PREC_SEQUENCE);
                self.write(");");
            }
            Statement::ForStatement {
                init,
                test,
                update,
                body,
            } => {
                self.write("for");
                self.space();
                self.write("(");
                match init {
                    Some(ForInit::Declaration { kind, declarations }) => {
                        self.variable_declaration(*kind, declarations)
                    }
                    Some(ForInit::Expression(expression)) => {
                        self.expression(expression, PREC_SEQUENCE)
                    }
                    None => {}
                }
                self.write(";");
                if let Some(test) = test {
                    self.space();
                    self.expression(test, PREC_SEQUENCE);
                }
                self.write(";");
                if let Some(update) = update {
                    self.space();
                    self.expression(update, PREC_SEQUENCE);
                }
                self.write(")");
                self.embedded_statement(body);
            }
            Statement::ForInStatement { left, right, body } => {
                self.for_head(left, "in", right);
                self.embedded_statement(body);
            }
            Statement::ForOfStatement {
                is_await,
                left,
                right,
                body,
            } => {
                if *is_await {
                    self.write("for await");
                    self.space();
                    self.write("(");
                    self.for_target(left);
                    self.write(" of ");
                    self.expression(right, PREC_ASSIGN);
                    self.write(")");
                } else {
                    self.for_head(left, "of", right);
                }
                self.embedded_statement(body);
            }
            Statement::SwitchStatement { discriminant, cases } => {
                self.write("switch");
                self.space();
                self.write("(");
                self.expression(discriminant, PREC_SEQUENCE);
                self.write(")");
                self.space();
                self.write("{");
                self.indent_level += 1;
                for case in cases {
                    self.newline();
                    match &case.test {
                        Some(test) => {
                            self.write("case");
                            self.hard_space();
                            self.expression(test, PREC_SEQUENCE);
                            self.write(":");
                        }
                        None => self.write("default:"),
                    }
                    self.indent_level += 1;
                    for stmt in &case.consequent {
                        self.newline();
                        self.statement(stmt);
                    }
                    self.indent_level -= 1;
                }
                self.indent_level -= 1;
                self.newline();
                self.write("}");
            }
            Statement::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                self.write("try");
                self.space();
                self.block(block);
                if let Some(handler) = handler {
                    self.space();
                    self.write("catch");
                    if let Some(param) = &handler.param {
                        self.space();
                        self.write("(");
                        self.pattern(param);
                        self.write(")");
                    }
                    self.space();
                    self.block(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.space();
                    self.write("finally");
                    self.space();
                    self.block(finalizer);
                }
            }
            Statement::ThrowStatement { argument } => {
                self.write("throw");
                self.hard_space();
                self.expression(argument, PREC_SEQUENCE);
                self.write(";");
            }
            Statement::BreakStatement { label } => {
                self.write("break");
                if let Some(label) = label {
                    self.hard_space();
                    self.write(label);
                }
                self.write(";");
            }
            Statement::ContinueStatement { label } => {
                self.write("continue");
                if let Some(label) = label {
                    self.hard_space();
                    self.write(label);
                }
                self.write(";");
            }
            Statement::LabeledStatement { label, body } => {
                self.write(label);
                self.write(":");
                self.space();
                self.statement(body);
            }
            Statement::WithStatement { object, body } => {
                self.write("with");
                self.space();
                self.write("(");
                self.expression(object, PREC_SEQUENCE);
                self.write(")");
                self.embedded_statement(body);
            }
            Statement::EmptyStatement => self.write(";"),
            Statement::DebuggerStatement => self.write("debugger;"),
            Statement::ImportDeclaration { specifiers, source } => {
                self.import_declaration(specifiers, source)
            }
            Statement::ExportNamedDeclaration {
                declaration,
                specifiers,
                source,
            } => {
                self.write("export");
                if let Some(declaration) = declaration {
                    self.hard_space();
                    self.statement(declaration);
                } else {
                    self.space();
                    self.write("{");
                    for (i, spec) in specifiers.iter().enumerate() {
                        if i > 0 {
                            self.write(",");
                        }
                        self.space();
                        if spec.local == spec.exported {
                            self.write(&spec.local);
                        } else {
                            self.write(&spec.local);
                            self.write(" as ");
                            self.write(&spec.exported);
                        }
                    }
                    self.space();
                    self.write("}");
                    if let Some(source) = source {
                        self.write(" from ");
                        self.string_literal(source);
                    }
                    self.write(";");
                }
            }
            Statement::ExportDefaultDeclaration { expression } => {
                self.write("export default");
                self.hard_space();
                if starts_statement_hazard(expression) {
                    self.write("(");
                    self.expression(expression, PREC_ASSIGN);
                    self.write(")");
                } else {
                    self.expression(expression, PREC_ASSIGN);
                }
                self.write(";");
            }
            Statement::ExportAllDeclaration { exported, source } => {
                self.write("export");
                self.space();
                self.write("*");
                if let Some(exported) = exported {
                    self.write(" as ");
                    self.write(exported);
                }
                self.write(" from ");
                self.string_literal(source);
                self.write(";");
            }
        }
    }

    fn for_head(&mut self, left: &ForTarget, keyword: &str, right: &Expression) {
        self.write("for");
        self.space();
        self.write("(");
        self.for_target(left);
        self.hard_space();
        self.write(keyword);
        self.hard_space();
        self.expression(right, PREC_ASSIGN);
        self.write(")");
    }

    fn for_target(&mut self, target: &ForTarget) {
        match target {
            ForTarget::Declaration { kind, pattern } => {
                self.declaration_kind(*kind);
                self.hard_space();
                self.pattern(pattern);
            }
            ForTarget::Pattern(pattern) => self.pattern(pattern),
        }
    }

    fn declaration_kind(&mut self, kind: DeclarationKind) {
        self.write(match kind {
            DeclarationKind::Var => "var",
            DeclarationKind::Let => "let",
            DeclarationKind::Const => "const",
        });
    }

    fn variable_declaration(&mut self, kind: DeclarationKind, declarations: &[VariableDeclarator]) {
        self.declaration_kind(kind);
        self.hard_space();
        for (i, declarator) in declarations.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            self.pattern(&declarator.id);
            if let Some(init) = &declarator.init {
                self.space();
                self.write("=");
                self.space();
                self.expression(init, PREC_ASSIGN);
            }
        }
    }

    fn import_declaration(&mut self, specifiers: &[ImportSpecifier], source: &str) {
        self.write("import");
        if specifiers.is_empty() {
            self.hard_space();
            self.string_literal(source);
            self.write(";");
            return;
        }
        self.hard_space();
        let mut first = true;
        let mut named_open = false;
        for spec in specifiers {
            match spec {
                ImportSpecifier::Default { local } => {
                    if !first {
                        self.write(",");
                        self.space();
                    }
                    self.write(&local.name);
                }
                ImportSpecifier::Namespace { local } => {
                    if !first {
                        self.write(",");
                        self.space();
                    }
                    self.write("* as ");
                    self.write(&local.name);
                }
                ImportSpecifier::Named { imported, local } => {
                    if !named_open {
                        if !first {
                            self.write(",");
                            self.space();
                        }
                        self.write("{");
                        named_open = true;
                    } else {
                        self.write(",");
                        self.space();
                    }
                    if imported == &local.name {
                        self.write(imported);
                    } else {
                        self.write(imported);
                        self.write(" as ");
                        self.write(&local.name);
                    }
                }
            }
            first = false;
        }
        if named_open {
            self.write("}");
        }
        self.write(" from ");
        self.string_literal(source);
        self.write(";");
    }

    /// Prints a loop/conditional body, indenting non-block bodies.
    fn embedded_statement(&mut self, stmt: &Statement) {
        if matches!(stmt, Statement::BlockStatement { .. }) {
            self.space();
            self.statement(stmt);
        } else {
            self.indent_level += 1;
            self.newline();
            self.statement(stmt);
            self.indent_level -= 1;
        }
    }

    fn block(&mut self, body: &[Statement]) {
        self.write("{");
        if body.is_empty() {
            self.write("}");
            return;
        }
        self.indent_level += 1;
        for stmt in body {
            self.newline();
            self.statement(stmt);
        }
        self.indent_level -= 1;
        self.newline();
        self.write("}");
    }

    fn function_body(&mut self, body: &[Statement], body_comment: &Option<String>) {
        self.write("{");
        if body.is_empty() && body_comment.is_none() {
            self.write("}");
            return;
        }
        self.indent_level += 1;
        if let Some(comment) = body_comment {
            self.newline();
            self.write("/*");
            self.write(comment);
            self.write("*/");
        }
        for stmt in body {
            self.newline();
            self.statement(stmt);
        }
        self.indent_level -= 1;
        self.newline();
        self.write("}");
    }

    fn function(&mut self, function: &FunctionNode, _declaration: bool) {
        if function.is_async {
            self.write("async");
            self.hard_space();
        }
        self.write("function");
        if function.is_generator {
            self.write("*");
        }
        if let Some(id) = &function.id {
            self.hard_space();
            self.write(&id.name);
        }
        self.write("(");
        self.parameters(&function.params);
        self.write(")");
        self.space();
        self.function_body(&function.body, &function.body_comment);
    }

    fn class(&mut self, class: &ClassNode) {
        self.write("class");
        if let Some(id) = &class.id {
            self.hard_space();
            self.write(&id.name);
        }
        if let Some(super_class) = &class.super_class {
            self.write(" extends ");
            self.expression(super_class, PREC_CALL);
        }
        self.space();
        self.write("{");
        if class.body.is_empty() && class.body_comment.is_none() {
            self.write("}");
            return;
        }
        self.indent_level += 1;
        if let Some(comment) = &class.body_comment {
            self.newline();
            self.write("/*");
            self.write(comment);
            self.write("*/");
        }
        for member in &class.body {
            self.newline();
            self.class_member(member);
        }
        self.indent_level -= 1;
        self.newline();
        self.write("}");
    }

    fn class_member(&mut self, member: &ClassMember) {
        match member {
            ClassMember::Method {
                key,
                function,
                kind,
                is_static,
            } => {
                if *is_static {
                    self.write("static");
                    self.hard_space();
                }
                self.method_like(key, function, *kind);
            }
            ClassMember::Property {
                key,
                value,
                is_static,
            } => {
                if *is_static {
                    self.write("static");
                    self.hard_space();
                }
                self.property_key(key);
                if let Some(value) = value {
                    self.space();
                    self.write("=");
                    self.space();
                    self.expression(value, PREC_ASSIGN);
                }
                self.write(";");
            }
            ClassMember::StaticBlock { body } => {
                self.write("static");
                self.space();
                self.block(body);
            }
        }
    }

    fn method_like(&mut self, key: &PropertyKey, function: &FunctionNode, kind: MethodKind) {
        if function.is_async {
            self.write("async");
            self.hard_space();
        }
        if function.is_generator {
            self.write("*");
        }
        match kind {
            MethodKind::Get => {
                self.write("get");
                self.hard_space();
            }
            MethodKind::Set => {
                self.write("set");
                self.hard_space();
            }
            MethodKind::Constructor | MethodKind::Method => {}
        }
        self.property_key(key);
        self.write("(");
        self.parameters(&function.params);
        self.write(")");
        self.space();
        self.function_body(&function.body, &function.body_comment);
    }

    fn property_key(&mut self, key: &PropertyKey) {
        match key {
            PropertyKey::Identifier(name) => self.write(name),
            PropertyKey::String(value) => self.string_literal(value),
            PropertyKey::Number(value) => {
                let text = format_number(*value);
                self.write(&text);
            }
            PropertyKey::Private(name) => {
                self.write("#");
                self.write(name);
            }
            PropertyKey::Computed(expression) => {
                self.write("[");
                self.expression(expression, PREC_ASSIGN);
                self.write("]");
            }
        }
    }

    fn parameters(&mut self, params: &[Pattern]) {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            self.pattern(param);
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Identifier(id) => self.write(&id.name),
            Pattern::ArrayPattern { elements } => {
                self.write("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    if let Some(element) = element {
                        self.pattern(element);
                    }
                }
                self.write("]");
            }
            Pattern::ObjectPattern { properties } => {
                self.write("{");
                for (i, property) in properties.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                    }
                    self.space();
                    match property {
                        ObjectPatternProperty::Property {
                            key,
                            value,
                            shorthand,
                        } => {
                            if *shorthand {
                                self.pattern(value);
                            } else {
                                self.property_key(key);
                                self.write(":");
                                self.space();
                                self.pattern(value);
                            }
                        }
                        ObjectPatternProperty::Rest { argument } => {
                            self.write("...");
                            self.pattern(argument);
                        }
                    }
                }
                self.space();
                self.write("}");
            }
            Pattern::AssignmentPattern { left, right } => {
                self.pattern(left);
                self.space();
                self.write("=");
                self.space();
                self.expression(right, PREC_ASSIGN);
            }
            Pattern::RestElement { argument } => {
                self.write("...");
                self.pattern(argument);
            }
        }
    }

    pub fn expression(&mut self, expression: &Expression, min_prec: u8) {
        let prec = precedence_of(expression);
        let parens = prec < min_prec;
        if parens {
            self.write("(");
        }
        self.expression_inner(expression);
        if parens {
            self.write(")");
        }
    }

    fn expression_inner(&mut self, expression: &Expression) {
        match expression {
            Expression::Identifier(id) => self.write(&id.name),
            Expression::Literal(literal) => self.literal(literal),
            Expression::TemplateLiteral { quasis, expressions } => {
                self.template(quasis, expressions)
            }
            Expression::TaggedTemplateExpression {
                tag,
                quasis,
                expressions,
            } => {
                self.expression(tag, PREC_MEMBER);
                self.template(quasis, expressions);
            }
            Expression::ThisExpression => self.write("this"),
            Expression::SuperExpression => self.write("super"),
            Expression::ArrayExpression { elements } => {
                self.write("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        if element.is_some() {
                            self.space();
                        }
                    }
                    if let Some(element) = element {
                        self.expression(element, PREC_ASSIGN);
                    }
                }
                // A trailing hole needs an extra comma to register.
                if matches!(elements.last(), Some(None)) {
                    self.write(",");
                }
                self.write("]");
            }
            Expression::ObjectExpression { properties } => {
                self.write("{");
                for (i, member) in properties.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                    }
                    self.space();
                    self.object_member(member);
                }
                self.space();
                self.write("}");
            }
            Expression::UnaryExpression { operator, argument } => {
                let text = match operator {
                    UnaryOperator::Plus => "+",
                    UnaryOperator::Minus => "-",
                    UnaryOperator::LogicalNot => "!",
                    UnaryOperator::BitwiseNot => "~",
                    UnaryOperator::Typeof => "typeof",
                    UnaryOperator::Void => "void",
                    UnaryOperator::Delete => "delete",
                };
                self.write(text);
                if text.len() > 1 {
                    self.hard_space();
                } else if needs_space_between_sign(text, argument) {
                    self.hard_space();
                }
                self.expression(argument, PREC_UNARY);
            }
            Expression::UpdateExpression {
                operator,
                argument,
                prefix,
            } => {
                let text = match operator {
                    UpdateOperator::Increment => "++",
                    UpdateOperator::Decrement => "--",
                };
                if *prefix {
                    self.write(text);
                    self.expression(argument, PREC_UNARY);
                } else {
                    self.expression(argument, PREC_POSTFIX);
                    self.write(text);
                }
            }
            Expression::BinaryExpression {
                left,
                operator,
                right,
            } => {
                let prec = binary_precedence(*operator);
                let (left_min, right_min) = if *operator == BinaryOperator::Exponentiation {
                    // `**` rejects an unparenthesized unary on its left.
                    (PREC_POSTFIX, prec)
                } else {
                    (prec, prec + 1)
                };
                self.expression(left, left_min);
                let text = binary_operator_text(*operator);
                if text.chars().next().is_some_and(|c| c.is_alphabetic()) {
                    self.hard_space();
                    self.write(text);
                    self.hard_space();
                } else {
                    self.space();
                    self.write(text);
                    self.space();
                }
                self.expression(right, right_min);
            }
            Expression::LogicalExpression {
                left,
                operator,
                right,
            } => {
                let prec = logical_precedence(*operator);
                let mixed = |child: &Expression| {
                    matches!(
                        child,
                        Expression::LogicalExpression { operator: inner, .. }
                            if nullish_mix(*operator, *inner)
                    )
                };
                if mixed(left) {
                    self.write("(");
                    self.expression(left, PREC_SEQUENCE);
                    self.write(")");
                } else {
                    self.expression(left, prec);
                }
                self.space();
                self.write(match operator {
                    LogicalOperator::And => "&&",
                    LogicalOperator::Or => "||",
                    LogicalOperator::NullishCoalescing => "??",
                });
                self.space();
                if mixed(right) {
                    self.write("(");
                    self.expression(right, PREC_SEQUENCE);
                    self.write(")");
                } else {
                    self.expression(right, prec + 1);
                }
            }
            Expression::AssignmentExpression {
                operator,
                target,
                value,
            } => {
                match target {
                    AssignmentTarget::Identifier(id) => self.write(&id.name),
                    AssignmentTarget::Member {
                        object,
                        property,
                        optional,
                    } => self.member(object, property, *optional),
                    AssignmentTarget::Pattern(pattern) => self.pattern(pattern),
                }
                self.space();
                self.write(assignment_operator_text(*operator));
                self.space();
                self.expression(value, PREC_ASSIGN);
            }
            Expression::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test, PREC_CONDITIONAL + 1);
                self.space();
                self.write("?");
                self.space();
                self.expression(consequent, PREC_ASSIGN);
                self.space();
                self.write(":");
                self.space();
                self.expression(alternate, PREC_ASSIGN);
            }
            Expression::CallExpression {
                callee,
                arguments,
                optional,
            } => {
                self.expression(callee, PREC_CALL);
                if *optional {
                    self.write("?.");
                }
                self.arguments(arguments);
            }
            Expression::NewExpression { callee, arguments } => {
                self.write("new");
                self.hard_space();
                if callee_contains_call(callee) {
                    self.write("(");
                    self.expression(callee, PREC_SEQUENCE);
                    self.write(")");
                } else {
                    self.expression(callee, PREC_MEMBER);
                }
                self.arguments(arguments);
            }
            Expression::MemberExpression {
                object,
                property,
                optional,
            } => self.member(object, property, *optional),
            Expression::SequenceExpression { expressions } => {
                for (i, expression) in expressions.iter().enumerate() {
                    if i > 0 {
                        self.write(",");
                        self.space();
                    }
                    self.expression(expression, PREC_ASSIGN);
                }
            }
            Expression::FunctionExpression(function) => self.function(function, false),
            Expression::ArrowFunctionExpression(arrow) => self.arrow(arrow),
            Expression::ClassExpression(class) => self.class(class),
            Expression::YieldExpression { argument, delegate } => {
                self.write("yield");
                if *delegate {
                    self.write("*");
                }
                if let Some(argument) = argument {
                    self.hard_space();
                    self.expression(argument, PREC_ASSIGN);
                }
            }
            Expression::AwaitExpression { argument } => {
                self.write("await");
                self.hard_space();
                self.expression(argument, PREC_UNARY);
            }
            Expression::SpreadElement { argument } => {
                self.write("...");
                self.expression(argument, PREC_ASSIGN);
            }
            Expression::MetaProperty { meta, property } => {
                self.write(meta);
                self.write(".");
                self.write(property);
            }
        }
    }

    fn member(&mut self, object: &Expression, property: &MemberKey, optional: bool) {
        // `1.x` parses as a malformed number; parenthesize literal bases.
        let object_needs_parens = matches!(
            object,
            Expression::Literal(Literal::Number(_)) | Expression::Literal(Literal::BigInt(_))
        );
        if object_needs_parens {
            self.write("(");
            self.expression(object, PREC_SEQUENCE);
            self.write(")");
        } else {
            self.expression(object, PREC_CALL);
        }
        match property {
            MemberKey::Static(name) => {
                self.write(if optional { "?." } else { "." });
                self.write(name);
            }
            MemberKey::Private(name) => {
                self.write(if optional { "?.#" } else { ".#" });
                self.write(name);
            }
            MemberKey::Computed(expression) => {
                if optional {
                    self.write("?.");
                }
                self.write("[");
                self.expression(expression, PREC_SEQUENCE);
                self.write("]");
            }
        }
    }

    fn arguments(&mut self, arguments: &[Expression]) {
        self.write("(");
        for (i, argument) in arguments.iter().enumerate() {
            if i > 0 {
                self.write(",");
                self.space();
            }
            self.expression(argument, PREC_ASSIGN);
        }
        self.write(")");
    }

    fn arrow(&mut self, arrow: &ArrowNode) {
        if arrow.is_async {
            self.write("async");
            self.hard_space();
        }
        let single_ident = arrow.params.len() == 1
            && matches!(arrow.params[0], Pattern::Identifier(_))
            && arrow.body_comment.is_none();
        if single_ident {
            self.pattern(&arrow.params[0]);
        } else {
            self.write("(");
            self.parameters(&arrow.params);
            self.write(")");
        }
        self.space();
        self.write("=>");
        self.space();
        match &arrow.body {
            ArrowBody::Block(body) => self.function_body(body, &arrow.body_comment),
            ArrowBody::Expression(expression) => {
                if matches!(**expression, Expression::ObjectExpression { .. })
                    || starts_statement_hazard(expression)
                {
                    self.write("(");
                    self.expression(expression, PREC_SEQUENCE);
                    self.write(")");
                } else {
                    self.expression(expression, PREC_ASSIGN);
                }
            }
        }
    }

    fn object_member(&mut self, member: &ObjectMember) {
        match member {
            ObjectMember::Property {
                key,
                value,
                kind,
                method,
                shorthand,
            } => match kind {
                PropertyKind::Get | PropertyKind::Set => {
                    if let Expression::FunctionExpression(function) = value {
                        let method_kind = if *kind == PropertyKind::Get {
                            MethodKind::Get
                        } else {
                            MethodKind::Set
                        };
                        self.method_like(key, function, method_kind);
                    }
                }
                PropertyKind::Init => {
                    if *method {
                        if let Expression::FunctionExpression(function) = value {
                            self.method_like(key, function, MethodKind::Method);
                            return;
                        }
                    }
                    if *shorthand {
                        self.property_key(key);
                    } else {
                        self.property_key(key);
                        self.write(":");
                        self.space();
                        self.expression(value, PREC_ASSIGN);
                    }
                }
            },
            ObjectMember::Spread { argument } => {
                self.write("...");
                self.expression(argument, PREC_ASSIGN);
            }
        }
    }

    fn template(&mut self, quasis: &[TemplateElement], expressions: &[Expression]) {
        self.write("`");
        for (i, quasi) in quasis.iter().enumerate() {
            self.write(&quasi.raw);
            if !quasi.tail {
                if let Some(expression) = expressions.get(i) {
                    self.write("${");
                    self.expression(expression, PREC_SEQUENCE);
                    self.write("}");
                }
            }
        }
        self.write("`");
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Null => self.write("null"),
            Literal::Boolean(true) => self.write("true"),
            Literal::Boolean(false) => self.write("false"),
            Literal::Number(value) => {
                let text = format_number(*value);
                self.write(&text);
            }
            Literal::BigInt(digits) => {
                self.write(digits);
                self.write("n");
            }
            Literal::String(value) => self.string_literal(value),
            Literal::RegExp { pattern, flags } => {
                self.write("/");
                if pattern.is_empty() {
                    self.write("(?:)");
                } else {
                    self.write(pattern);
                }
                self.write("/");
                self.write(flags);
            }
        }
    }

    fn string_literal(&mut self, value: &str) {
        let escaped = escape_string(value);
        self.write(&escaped);
    }
}

/// `- -x` and `+ +x` must not fuse into `--x` / `++x`.
fn needs_space_between_sign(sign: &str, argument: &Expression) -> bool {
    match (sign, argument) {
        ("-", Expression::UnaryExpression { operator, .. }) => {
            *operator == UnaryOperator::Minus
        }
        ("-", Expression::UpdateExpression { operator, prefix: true, .. }) => {
            *operator == UpdateOperator::Decrement
        }
        ("-", Expression::Literal(Literal::Number(n))) => *n < 0.0 || n.is_sign_negative(),
        ("+", Expression::UnaryExpression { operator, .. }) => *operator == UnaryOperator::Plus,
        ("+", Expression::UpdateExpression { operator, prefix: true, .. }) => {
            *operator == UpdateOperator::Increment
        }
        _ => false,
    }
}

fn callee_contains_call(expression: &Expression) -> bool {
    match expression {
        Expression::CallExpression { .. } => true,
        Expression::MemberExpression { object, .. } => callee_contains_call(object),
        Expression::TaggedTemplateExpression { tag, .. } => callee_contains_call(tag),
        _ => false,
    }
}

/// Expressions that would be misparsed at statement start.
fn starts_statement_hazard(expression: &Expression) -> bool {
    match expression {
        Expression::ObjectExpression { .. }
        | Expression::FunctionExpression(_)
        | Expression::ClassExpression(_) => true,
        Expression::BinaryExpression { left, .. } => starts_statement_hazard(left),
        Expression::LogicalExpression { left, .. } => starts_statement_hazard(left),
        Expression::ConditionalExpression { test, .. } => starts_statement_hazard(test),
        Expression::MemberExpression { object, .. } => starts_statement_hazard(object),
        Expression::CallExpression { callee, .. } => starts_statement_hazard(callee),
        Expression::TaggedTemplateExpression { tag, .. } => starts_statement_hazard(tag),
        Expression::SequenceExpression { expressions } => expressions
            .first()
            .is_some_and(starts_statement_hazard),
        Expression::AssignmentExpression { target, .. } => match target {
            AssignmentTarget::Pattern(Pattern::ObjectPattern { .. }) => true,
            AssignmentTarget::Member { object, .. } => starts_statement_hazard(object),
            _ => false,
        },
        Expression::UpdateExpression {
            argument,
            prefix: false,
            ..
        } => starts_statement_hazard(argument),
        _ => false,
    }
}

fn precedence_of(expression: &Expression) -> u8 {
    match expression {
        Expression::SequenceExpression { .. } => PREC_SEQUENCE,
        Expression::AssignmentExpression { .. }
        | Expression::ArrowFunctionExpression(_)
        | Expression::YieldExpression { .. } => PREC_ASSIGN,
        Expression::ConditionalExpression { .. } => PREC_CONDITIONAL,
        Expression::LogicalExpression { operator, .. } => logical_precedence(*operator),
        Expression::BinaryExpression { operator, .. } => binary_precedence(*operator),
        Expression::UnaryExpression { .. } | Expression::AwaitExpression { .. } => PREC_UNARY,
        Expression::UpdateExpression { prefix, .. } => {
            if *prefix {
                PREC_UNARY
            } else {
                PREC_POSTFIX
            }
        }
        Expression::CallExpression { .. } => PREC_CALL,
        Expression::NewExpression { .. } => PREC_MEMBER,
        Expression::MemberExpression { .. } | Expression::TaggedTemplateExpression { .. } => {
            PREC_MEMBER
        }
        Expression::FunctionExpression(_) | Expression::ClassExpression(_) => PREC_PRIMARY,
        Expression::Literal(Literal::Number(n)) if *n < 0.0 || n.is_sign_negative() => PREC_UNARY,
        Expression::SpreadElement { .. } => PREC_ASSIGN,
        _ => PREC_PRIMARY,
    }
}

fn binary_precedence(operator: BinaryOperator) -> u8 {
    use BinaryOperator::*;
    match operator {
        Add | Subtract => PREC_ADDITIVE,
        Multiply | Divide | Remainder => PREC_MULTIPLICATIVE,
        Exponentiation => PREC_EXPONENTIATION,
        Equal | NotEqual | StrictEqual | StrictNotEqual => PREC_EQUALITY,
        LessThan | LessThanEqual | GreaterThan | GreaterThanEqual | In | Instanceof => {
            PREC_RELATIONAL
        }
        LeftShift | RightShift | UnsignedRightShift => PREC_SHIFT,
        BitwiseAnd => PREC_BITWISE_AND,
        BitwiseOr => PREC_BITWISE_OR,
        BitwiseXor => PREC_BITWISE_XOR,
    }
}

fn logical_precedence(operator: LogicalOperator) -> u8 {
    match operator {
        LogicalOperator::And => PREC_LOGICAL_AND,
        LogicalOperator::Or => PREC_LOGICAL_OR,
        LogicalOperator::NullishCoalescing => PREC_NULLISH,
    }
}

fn nullish_mix(parent: LogicalOperator, child: LogicalOperator) -> bool {
    let parent_nullish = parent == LogicalOperator::NullishCoalescing;
    let child_nullish = child == LogicalOperator::NullishCoalescing;
    parent_nullish != child_nullish
}

fn binary_operator_text(operator: BinaryOperator) -> &'static str {
    use BinaryOperator::*;
    match operator {
        Add => "+",
        Subtract => "-",
        Multiply => "*",
        Divide => "/",
        Remainder => "%",
        Exponentiation => "**",
        Equal => "==",
        NotEqual => "!=",
        StrictEqual => "===",
        StrictNotEqual => "!==",
        LessThan => "<",
        LessThanEqual => "<=",
        GreaterThan => ">",
        GreaterThanEqual => ">=",
        LeftShift => "<<",
        RightShift => ">>",
        UnsignedRightShift => ">>>",
        BitwiseAnd => "&",
        BitwiseOr => "|",
        BitwiseXor => "^",
        In => "in",
        Instanceof => "instanceof",
    }
}

fn assignment_operator_text(operator: AssignmentOperator) -> &'static str {
    use AssignmentOperator::*;
    match operator {
        Assign => "=",
        AddAssign => "+=",
        SubtractAssign => "-=",
        MultiplyAssign => "*=",
        DivideAssign => "/=",
        RemainderAssign => "%=",
        ExponentiationAssign => "**=",
        LeftShiftAssign => "<<=",
        RightShiftAssign => ">>=",
        UnsignedRightShiftAssign => ">>>=",
        BitwiseAndAssign => "&=",
        BitwiseOrAssign => "|=",
        BitwiseXorAssign => "^=",
        LogicalAndAssign => "&&=",
        LogicalOrAssign => "||=",
        NullishCoalescingAssign => "??=",
    }
}

/// Canonical JS spelling for a double: `NaN`, `Infinity`, `-0`, otherwise
/// Rust's shortest round-trip decimal (always valid JS).
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    format!("{value}")
}

/// Escapes a string into a double-quoted JS literal. U+2028/U+2029 are
/// escaped as well since they terminate lines in pre-ES2019 parsers.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            '\0' => out.push_str("\\0"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
