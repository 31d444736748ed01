//! # Output Assembler
//!
//! Orders records dependencies-first, assigns final identifiers (readable
//! or mangled), splices single-use values into their one reference, and
//! prints the program in the requested wrapper format.

use std::collections::{HashMap, HashSet};

use crate::ast::printer::{print_expression, print_program, PrintMode, PrintOptions};
use crate::ast::*;
use crate::serializer::record::RecordId;
use crate::serializer::trace::{Serializer, Traced};
use crate::serializer::{OutputFormat, SerializeError, SerializeResult};
use crate::util;

pub fn assemble(s: &mut Serializer<'_>, root: Traced) -> SerializeResult<String> {
    let root_rid = match &root {
        Traced::Rec(rid) => Some(*rid),
        Traced::Circular(_) => {
            return Err(SerializeError::InternalAssertion {
                message: "root value never finished construction".to_string(),
            })
        }
        Traced::Inline(_) => None,
    };

    let order = order_records(s, root_rid)?;

    // Inline decisions.
    let mut inlined: HashSet<RecordId> = HashSet::new();
    if s.options.inline {
        for &rid in &order {
            let record = s.records.get(rid);
            if Some(rid) != root_rid
                && record.dependents.len() == 1
                && record.assignments.is_empty()
                && record.import.is_none()
                && !record.no_inline
                && !record.referenced_by_assignment
            {
                inlined.insert(rid);
            }
        }
    }

    // Final identifiers.
    let mut avoid: HashSet<String> = s.global_keys_used.clone();
    for def_index in 0..s.defs.len() {
        let def = s.defs.get(def_index);
        avoid.extend(def.global_names.iter().cloned());
        avoid.extend(def.internal_names.iter().cloned());
    }
    let mut used = avoid.clone();
    let mut names: HashMap<RecordId, String> = HashMap::new();
    let mut mangler = util::NameMangler::new();
    for &rid in &order {
        if inlined.contains(&rid) {
            continue;
        }
        let name = if s.options.mangle {
            let name = mangler.next_name(&used);
            used.insert(name.clone());
            name
        } else {
            let base = util::sanitize_name(&s.records.get(rid).name_hint);
            util::unique_name(&base, &mut used)
        };
        names.insert(rid, name);
    }

    let env = ResolveEnv {
        s,
        names: &names,
        inlined: &inlined,
    };

    // Declarations (imports first under esm), then assignments.
    let mut imports: Vec<Statement> = Vec::new();
    let mut statements: Vec<Statement> = Vec::new();
    for &rid in &order {
        if inlined.contains(&rid) {
            continue;
        }
        let record = env.s.records.get(rid);
        let name = names
            .get(&rid)
            .cloned()
            .ok_or_else(|| SerializeError::InternalAssertion {
                message: "record missing a final name".to_string(),
            })?;
        if let Some(import) = &record.import {
            imports.push(Statement::ImportDeclaration {
                specifiers: vec![ImportSpecifier::Namespace {
                    local: Identifier::new(name),
                }],
                source: import.source.clone(),
            });
            continue;
        }
        let node = record
            .node
            .clone()
            .ok_or_else(|| SerializeError::CircularUnresolvable {
                trace: format!("record {rid} has no construction node"),
            })?;
        let mut node = env.resolve(node)?;
        // An anonymous function bound to a const infers the const's name;
        // preserve the runtime name when they disagree.
        let fn_name = record.fn_name.clone();
        if let Some(fn_name) = &fn_name {
            if is_anonymous_function(&node) {
                if fn_name.is_empty() {
                    node = Expression::SequenceExpression {
                        expressions: vec![number_lit(0.0), node],
                    };
                } else if *fn_name != name && util::is_legal_identifier(fn_name) {
                    name_function(&mut node, fn_name);
                }
            }
        }
        statements.push(const_decl(name, node));
    }

    let mut assignments: Vec<Statement> = Vec::new();
    for &rid in &order {
        let record = env.s.records.get(rid);
        for assignment in record.assignments.clone() {
            let stmt = env.resolve_statement(assignment.stmt)?;
            assignments.push(stmt);
        }
    }
    statements.extend(assignments);

    // The root reference.
    let root_expr = match root {
        Traced::Inline(expr) => env.resolve(expr)?,
        Traced::Rec(rid) => {
            if let Some(name) = names.get(&rid) {
                ident(name.clone())
            } else {
                // Root had a single "dependent"; it cannot be inlined, so a
                // name always exists.
                return Err(SerializeError::InternalAssertion {
                    message: "root record was inlined".to_string(),
                });
            }
        }
        Traced::Circular(_) => unreachable!(),
    };

    render(s, imports, statements, root_expr)
}

/// Dependencies-first ordering; ties resolve to first-observed (record id)
/// order through the DFS visitation sequence.
fn order_records(
    s: &Serializer<'_>,
    root: Option<RecordId>,
) -> SerializeResult<Vec<RecordId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Visiting,
        Done,
    }
    let mut state: HashMap<RecordId, State> = HashMap::new();
    let mut order = Vec::new();

    fn visit(
        s: &Serializer<'_>,
        rid: RecordId,
        state: &mut HashMap<RecordId, State>,
        order: &mut Vec<RecordId>,
    ) -> SerializeResult<()> {
        match state.get(&rid) {
            Some(State::Done) => return Ok(()),
            Some(State::Visiting) => {
                return Err(SerializeError::CircularUnresolvable {
                    trace: format!("record {rid}"),
                })
            }
            None => {}
        }
        state.insert(rid, State::Visiting);
        for dep in s.records.get(rid).dependencies.clone() {
            visit(s, dep, state, order)?;
        }
        state.insert(rid, State::Done);
        order.push(rid);
        Ok(())
    }

    let mut queue: Vec<RecordId> = Vec::new();
    if let Some(root) = root {
        queue.push(root);
    }
    // Records whose only effect is a post-construction assignment
    // (prototype chains, patched auxiliaries) are emission roots too.
    for record in s.records.iter() {
        if !record.assignments.is_empty() {
            queue.push(record.id);
        }
    }
    let mut cursor = 0;
    while cursor < queue.len() {
        let rid = queue[cursor];
        cursor += 1;
        let before = order.len();
        visit(s, rid, &mut state, &mut order)?;
        // Records pulled in by this visit may carry assignments whose
        // dependencies also need declarations.
        for &added in &order[before..] {
            for assignment in &s.records.get(added).assignments {
                for &dep in &assignment.dependencies {
                    if !state.contains_key(&dep) {
                        queue.push(dep);
                    }
                }
            }
        }
    }
    Ok(order)
}

struct ResolveEnv<'a, 'i> {
    s: &'a Serializer<'i>,
    names: &'a HashMap<RecordId, String>,
    inlined: &'a HashSet<RecordId>,
}

impl ResolveEnv<'_, '_> {
    /// Rewrites placeholder identifiers to final names, splicing inlined
    /// records' nodes in place of their single reference.
    fn resolve(&self, mut node: Expression) -> SerializeResult<Expression> {
        self.resolve_in_place(&mut node)?;
        Ok(node)
    }

    fn reference(&self, rid: RecordId, naming_key: Option<&str>) -> SerializeResult<Expression> {
        if self.inlined.contains(&rid) {
            let record = self.s.records.get(rid);
            let node = record
                .node
                .clone()
                .ok_or_else(|| SerializeError::CircularUnresolvable {
                    trace: format!("record {rid} has no construction node"),
                })?;
            let mut node = self.resolve(node)?;
            // Splicing an anonymous function into a naming position must
            // not re-name it.
            if let (Some(key), Some(fn_name)) = (naming_key, &record.fn_name) {
                if is_anonymous_function(&node) && fn_name != key {
                    node = Expression::SequenceExpression {
                        expressions: vec![number_lit(0.0), node],
                    };
                }
            }
            Ok(node)
        } else {
            let name =
                self.names
                    .get(&rid)
                    .ok_or_else(|| SerializeError::InternalAssertion {
                        message: format!("record {rid} has neither inline node nor name"),
                    })?;
            Ok(ident(name.clone()))
        }
    }

    fn resolve_in_place(&self, node: &mut Expression) -> SerializeResult<()> {
        if let Expression::Identifier(id) = node {
            if let Some(rid) = util::parse_placeholder(&id.name) {
                *node = self.reference(rid, None)?;
                return Ok(());
            }
        }
        match node {
            Expression::ObjectExpression { properties } => {
                for member in properties {
                    match member {
                        ObjectMember::Property { key, value, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.resolve_in_place(expression)?;
                            }
                            let key_name = match key {
                                PropertyKey::Identifier(k) | PropertyKey::String(k) => {
                                    Some(k.clone())
                                }
                                _ => None,
                            };
                            if let Expression::Identifier(id) = value {
                                if let Some(rid) = util::parse_placeholder(&id.name) {
                                    *value = self.reference(rid, key_name.as_deref())?;
                                    continue;
                                }
                            }
                            self.resolve_in_place(value)?;
                        }
                        ObjectMember::Spread { argument } => self.resolve_in_place(argument)?,
                    }
                }
                Ok(())
            }
            other => {
                let mut result = Ok(());
                for_each_child_expression(other, &mut |child| {
                    if result.is_ok() {
                        result = self.resolve_in_place(child);
                    }
                });
                result
            }
        }
    }

    fn resolve_statement(&self, mut stmt: Statement) -> SerializeResult<Statement> {
        let mut result = Ok(());
        for_each_statement_expression(&mut stmt, &mut |expression| {
            if result.is_ok() {
                result = self.resolve_in_place(expression);
            }
        });
        result.map(|_| stmt)
    }
}

fn is_anonymous_function(node: &Expression) -> bool {
    match node {
        Expression::FunctionExpression(f) => f.id.is_none(),
        Expression::ArrowFunctionExpression(_) => true,
        Expression::ClassExpression(c) => c.id.is_none(),
        _ => false,
    }
}

/// Gives an anonymous function expression its runtime name back by naming
/// the expression itself.
fn name_function(node: &mut Expression, name: &str) {
    match node {
        Expression::FunctionExpression(f) => f.id = Some(Identifier::new(name)),
        Expression::ClassExpression(c) => c.id = Some(Identifier::new(name)),
        // Arrows cannot carry a name; rebinding through an inner const
        // would change semantics, so the inferred name stands.
        _ => {}
    }
}

fn render(
    s: &Serializer<'_>,
    imports: Vec<Statement>,
    statements: Vec<Statement>,
    root_expr: Expression,
) -> SerializeResult<String> {
    let print_options = PrintOptions {
        mode: if s.options.minify {
            PrintMode::Compact
        } else {
            PrintMode::Pretty
        },
        mappings: false,
    };

    let program = |body: Vec<Statement>, source_type: SourceType| Program { body, source_type };

    Ok(match s.options.format {
        OutputFormat::Cjs => {
            let mut body = imports;
            body.extend(statements);
            body.push(expr_stmt(assign_expr(
                AssignmentTarget::Member {
                    object: Box::new(ident("module")),
                    property: MemberKey::Static("exports".to_string()),
                    optional: false,
                },
                root_expr,
            )));
            print_program(&program(body, SourceType::CommonJs), &print_options)
        }
        OutputFormat::Esm => {
            let mut body = imports;
            body.extend(statements);
            body.push(Statement::ExportDefaultDeclaration {
                expression: root_expr,
            });
            print_program(&program(body, SourceType::Module), &print_options)
        }
        OutputFormat::Js => {
            if imports.is_empty() && statements.is_empty() {
                print_expression(&root_expr, &print_options)
            } else {
                let mut body = imports;
                body.extend(statements);
                body.push(Statement::ReturnStatement {
                    argument: Some(root_expr),
                });
                let iife = call(arrow_block(vec![], body), vec![]);
                print_expression(&iife, &print_options)
            }
        }
        OutputFormat::Exec => {
            let mut body = imports;
            body.extend(statements);
            body.push(expr_stmt(call(root_expr, vec![])));
            print_program(&program(body, SourceType::Script), &print_options)
        }
    })
}

/// Visits every direct child expression of a node.
fn for_each_child_expression(node: &mut Expression, f: &mut impl FnMut(&mut Expression)) {
    match node {
        Expression::CallExpression { callee, arguments, .. } => {
            f(callee);
            for argument in arguments {
                f(argument);
            }
        }
        Expression::NewExpression { callee, arguments } => {
            f(callee);
            for argument in arguments {
                f(argument);
            }
        }
        Expression::MemberExpression { object, property, .. } => {
            f(object);
            if let MemberKey::Computed(expression) = property {
                f(expression);
            }
        }
        Expression::BinaryExpression { left, right, .. }
        | Expression::LogicalExpression { left, right, .. } => {
            f(left);
            f(right);
        }
        Expression::AssignmentExpression { target, value, .. } => {
            match target {
                AssignmentTarget::Member { object, property, .. } => {
                    f(object);
                    if let MemberKey::Computed(expression) = property {
                        f(expression);
                    }
                }
                AssignmentTarget::Identifier(_) | AssignmentTarget::Pattern(_) => {}
            }
            f(value);
        }
        Expression::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => {
            f(test);
            f(consequent);
            f(alternate);
        }
        Expression::SequenceExpression { expressions } => {
            for expression in expressions {
                f(expression);
            }
        }
        Expression::ArrayExpression { elements } => {
            for element in elements.iter_mut().flatten() {
                f(element);
            }
        }
        Expression::ObjectExpression { properties } => {
            for member in properties {
                match member {
                    ObjectMember::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            f(expression);
                        }
                        f(value);
                    }
                    ObjectMember::Spread { argument } => f(argument),
                }
            }
        }
        Expression::UnaryExpression { argument, .. }
        | Expression::UpdateExpression { argument, .. }
        | Expression::AwaitExpression { argument }
        | Expression::SpreadElement { argument } => f(argument),
        Expression::YieldExpression {
            argument: Some(argument),
            ..
        } => f(argument),
        Expression::TemplateLiteral { expressions, .. } => {
            for expression in expressions {
                f(expression);
            }
        }
        Expression::TaggedTemplateExpression {
            tag, expressions, ..
        } => {
            f(tag);
            for expression in expressions {
                f(expression);
            }
        }
        Expression::FunctionExpression(function) => {
            for stmt in &mut function.body {
                for_each_statement_expression(stmt, f);
            }
            for param in &mut function.params {
                for_each_pattern_expression(param, f);
            }
        }
        Expression::ArrowFunctionExpression(arrow_node) => {
            for param in &mut arrow_node.params {
                for_each_pattern_expression(param, f);
            }
            match &mut arrow_node.body {
                ArrowBody::Block(body) => {
                    for stmt in body {
                        for_each_statement_expression(stmt, f);
                    }
                }
                ArrowBody::Expression(expression) => f(expression),
            }
        }
        Expression::ClassExpression(class) => {
            if let Some(super_class) = &mut class.super_class {
                f(super_class);
            }
            for member in &mut class.body {
                match member {
                    ClassMember::Method { key, function, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            f(expression);
                        }
                        for stmt in &mut function.body {
                            for_each_statement_expression(stmt, f);
                        }
                    }
                    ClassMember::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            f(expression);
                        }
                        if let Some(value) = value {
                            f(value);
                        }
                    }
                    ClassMember::StaticBlock { body } => {
                        for stmt in body {
                            for_each_statement_expression(stmt, f);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Visits every expression inside a statement tree.
pub fn for_each_statement_expression(stmt: &mut Statement, f: &mut impl FnMut(&mut Expression)) {
    match stmt {
        Statement::ExpressionStatement { expression } => f(expression),
        Statement::ReturnStatement { argument: Some(e) } => f(e),
        Statement::ThrowStatement { argument } => f(argument),
        Statement::VariableDeclaration { declarations, .. } => {
            for decl in declarations {
                for_each_pattern_expression(&mut decl.id, f);
                if let Some(init) = &mut decl.init {
                    f(init);
                }
            }
        }
        Statement::FunctionDeclaration(function) => {
            for stmt in &mut function.body {
                for_each_statement_expression(stmt, f);
            }
        }
        Statement::ClassDeclaration(class) => {
            let mut as_expr = Expression::ClassExpression(class.clone());
            f(&mut as_expr);
            if let Expression::ClassExpression(rewritten) = as_expr {
                *class = rewritten;
            }
        }
        Statement::BlockStatement { body } => {
            for stmt in body {
                for_each_statement_expression(stmt, f);
            }
        }
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            f(test);
            for_each_statement_expression(consequent, f);
            if let Some(alternate) = alternate {
                for_each_statement_expression(alternate, f);
            }
        }
        Statement::WhileStatement { test, body } => {
            f(test);
            for_each_statement_expression(body, f);
        }
        Statement::DoWhileStatement { body, test } => {
            for_each_statement_expression(body, f);
            f(test);
        }
        Statement::ForStatement {
            init,
            test,
            update,
            body,
        } => {
            match init {
                Some(ForInit::Declaration { declarations, .. }) => {
                    for decl in declarations {
                        if let Some(init) = &mut decl.init {
                            f(init);
                        }
                    }
                }
                Some(ForInit::Expression(e)) => f(e),
                None => {}
            }
            if let Some(test) = test {
                f(test);
            }
            if let Some(update) = update {
                f(update);
            }
            for_each_statement_expression(body, f);
        }
        Statement::ForInStatement { right, body, .. }
        | Statement::ForOfStatement { right, body, .. } => {
            f(right);
            for_each_statement_expression(body, f);
        }
        Statement::SwitchStatement { discriminant, cases } => {
            f(discriminant);
            for case in cases {
                if let Some(test) = &mut case.test {
                    f(test);
                }
                for stmt in &mut case.consequent {
                    for_each_statement_expression(stmt, f);
                }
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            for stmt in block {
                for_each_statement_expression(stmt, f);
            }
            if let Some(handler) = handler {
                for stmt in &mut handler.body {
                    for_each_statement_expression(stmt, f);
                }
            }
            if let Some(finalizer) = finalizer {
                for stmt in finalizer {
                    for_each_statement_expression(stmt, f);
                }
            }
        }
        Statement::LabeledStatement { body, .. } => for_each_statement_expression(body, f),
        Statement::WithStatement { object, body } => {
            f(object);
            for_each_statement_expression(body, f);
        }
        _ => {}
    }
}

fn for_each_pattern_expression(pattern: &mut Pattern, f: &mut impl FnMut(&mut Expression)) {
    match pattern {
        Pattern::Identifier(_) => {}
        Pattern::ArrayPattern { elements } => {
            for element in elements.iter_mut().flatten() {
                for_each_pattern_expression(element, f);
            }
        }
        Pattern::ObjectPattern { properties } => {
            for property in properties {
                match property {
                    ObjectPatternProperty::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            f(expression);
                        }
                        for_each_pattern_expression(value, f);
                    }
                    ObjectPatternProperty::Rest { argument } => {
                        for_each_pattern_expression(argument, f)
                    }
                }
            }
        }
        Pattern::AssignmentPattern { left, right } => {
            for_each_pattern_expression(left, f);
            f(right);
        }
        Pattern::RestElement { argument } => for_each_pattern_expression(argument, f),
    }
}
