//! # Instrumentation Rewriter
//!
//! Single bottom-up pass over the AST. Scopes are entered with their
//! bindings pre-collected (hoisting), identifier uses are classified
//! against the scope stack, and when a function's subtree has been fully
//! processed its capture set is known and the prelude (scope-id constant,
//! tracker guard, metadata comment) is inserted.

use indexmap::{IndexMap, IndexSet};

use crate::ast::*;
use crate::instrument::scopes::{self, BlockId, ScopeTree};
use crate::instrument::special;
use crate::instrument::{InstrumentError, InstrumentOptions, InstrumentResult, ScopeMeta, TrackerInfo};

/// Whether a program already carries an instrumentation preamble.
pub fn is_instrumented(program: &Program) -> bool {
    for stmt in &program.body {
        if is_directive(stmt) {
            continue;
        }
        return match stmt {
            Statement::VariableDeclaration { declarations, .. } => declarations
                .first()
                .is_some_and(|d| matches!(&d.id, Pattern::Identifier(id) if is_injected_name(&id.name, "tracker"))),
            Statement::ImportDeclaration { specifiers, .. } => {
                specifiers.iter().any(|s| match s {
                    ImportSpecifier::Default { local } => is_injected_name(&local.name, "init"),
                    _ => false,
                })
            }
            _ => false,
        };
    }
    false
}

fn is_injected_name(name: &str, suffix: &str) -> bool {
    let Some(rest) = name.strip_prefix(super::IDENT_BASE) else {
        return false;
    };
    let digits: &str = rest
        .split('_')
        .next()
        .unwrap_or("");
    if !digits.chars().all(|c| c.is_ascii_digit()) || digits.is_empty() {
        return false;
    }
    rest[digits.len()..].strip_prefix('_') == Some(suffix)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FnKind {
    /// Function declaration or plain function expression.
    Function { has_self_binding: bool },
    /// Method or accessor of an object literal; individually tracked.
    ObjectMethod,
    /// Method of a class; tracked through the class.
    ClassMethod { is_static: bool },
    /// Explicit class constructor; the class finalizer adds the prelude.
    ClassConstructor,
}

#[derive(Debug, Clone, Copy)]
struct MethodHome {
    is_class: bool,
    is_static: bool,
}

#[derive(Debug)]
struct FnFrame {
    /// Scope-stack length at frame entry; the frame's body block sits at
    /// this index.
    depth: usize,
    body_block: Option<BlockId>,
    captures: IndexMap<BlockId, IndexSet<String>>,
    contains_direct_eval: bool,
    is_strict: bool,
    method_home: Option<MethodHome>,
    uses_super: bool,
    super_var: Option<String>,
    super_is_proto: bool,
    hoisted_temps: Vec<String>,
}

impl FnFrame {
    fn new(depth: usize, is_strict: bool, method_home: Option<MethodHome>) -> Self {
        Self {
            depth,
            body_block: None,
            captures: IndexMap::new(),
            contains_direct_eval: false,
            is_strict,
            method_home,
            uses_super: false,
            super_var: None,
            super_is_proto: false,
            hoisted_temps: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct WithFrame {
    alias: String,
    used: bool,
}

#[derive(Debug)]
struct HomeContext {
    var_name: String,
    depth: usize,
}

pub struct Rewriter<'a> {
    options: &'a InstrumentOptions,
    prefix: String,
    file_strict: bool,
    tree: ScopeTree,
    stack: Vec<BlockId>,
    frames: Vec<FnFrame>,
    withs: Vec<WithFrame>,
    homes: Vec<HomeContext>,
    next_fn_id: u32,
    next_temp: u32,
}

impl<'a> Rewriter<'a> {
    pub fn new(options: &'a InstrumentOptions, file_strict: bool, prefix_number: u32) -> Self {
        Self {
            options,
            prefix: format!("{}{}_", super::IDENT_BASE, prefix_number),
            file_strict,
            tree: ScopeTree::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            withs: Vec::new(),
            homes: Vec::new(),
            next_fn_id: 0,
            next_temp: 0,
        }
    }

    pub fn run(&mut self, program: &mut Program) -> InstrumentResult<()> {
        self.frames
            .push(FnFrame::new(0, self.file_strict, None));
        let block = self.tree.new_block(None, 0, true);
        self.collect_function_scope_bindings(block, &program.body);
        if let Some(frame) = self.frames.last_mut() {
            frame.body_block = Some(block);
        }
        self.stack.push(block);

        for stmt in &mut program.body {
            self.visit_statement(stmt);
        }

        self.stack.pop();
        let frame = self.frames.pop().ok_or_else(|| InstrumentError::Rewrite {
            filename: self.options.filename.clone(),
            message: "frame stack underflow".to_string(),
        })?;

        let directive_count = program.body.iter().take_while(|s| is_directive(s)).count();
        // Direct-eval bodies inherit the tracker bindings from the calling
        // scope (or the aliasing wrapper); only real files get a preamble.
        let mut inserted = if self.options.eval {
            Vec::new()
        } else {
            self.preamble()
        };
        if self.tree.block(block).needs_scope_id {
            inserted.push(self.scope_id_const(block));
        }
        if !frame.hoisted_temps.is_empty() {
            inserted.push(temp_var_declaration(&frame.hoisted_temps));
        }
        program.body.splice(directive_count..directive_count, inserted);
        Ok(())
    }

    // Injected names.

    fn tracker_name(&self) -> String {
        format!("{}tracker", self.prefix)
    }

    fn get_scope_id_name(&self) -> String {
        format!("{}getScopeId", self.prefix)
    }

    fn init_name(&self) -> String {
        format!("{}init", self.prefix)
    }

    fn scope_id_name(&self, block: BlockId) -> String {
        format!("{}scopeId_{}", self.prefix, block)
    }

    fn alloc_temp(&mut self) -> String {
        let name = format!("{}temp_{}", self.prefix, self.next_temp);
        self.next_temp += 1;
        // Hoist into the innermost frame-owned var scope so the `var`
        // declaration and the binding agree on a block.
        for index in (0..self.frames.len()).rev() {
            if let Some(block) = self.frames[index].body_block {
                self.tree.declare(block, &name, false);
                self.frames[index].hoisted_temps.push(name.clone());
                break;
            }
        }
        name
    }

    /// Reference to the tracker, routed through the `with` alias when one
    /// is active.
    fn tracker_ref(&mut self) -> Expression {
        if let Some(with) = self.withs.last_mut() {
            with.used = true;
            member_computed(ident(with.alias.clone()), number_lit(0.0))
        } else {
            ident(self.tracker_name())
        }
    }

    fn get_scope_id_ref(&mut self) -> Expression {
        if let Some(with) = self.withs.last_mut() {
            with.used = true;
            member_computed(ident(with.alias.clone()), number_lit(1.0))
        } else {
            ident(self.get_scope_id_name())
        }
    }

    fn scope_id_const(&mut self, block: BlockId) -> Statement {
        let getter = self.get_scope_id_ref();
        const_decl(self.scope_id_name(block), call(getter, vec![]))
    }

    fn preamble(&self) -> Vec<Statement> {
        let runtime = self.options.runtime_specifier.clone();
        let filename = self.options.filename.clone();
        match self.options.source_type {
            SourceType::Module => {
                let import = Statement::ImportDeclaration {
                    specifiers: vec![ImportSpecifier::Default {
                        local: Identifier::new(self.init_name()),
                    }],
                    source: runtime,
                };
                let bind = Statement::VariableDeclaration {
                    kind: DeclarationKind::Const,
                    declarations: vec![
                        VariableDeclarator {
                            id: ident_pattern(self.tracker_name()),
                            init: Some(method_call(
                                ident(self.init_name()),
                                "getTrackerForFile",
                                vec![string_lit(filename)],
                            )),
                        },
                        VariableDeclarator {
                            id: ident_pattern(self.get_scope_id_name()),
                            init: Some(member(ident(self.init_name()), "getScopeId")),
                        },
                    ],
                };
                vec![import, bind]
            }
            SourceType::Script | SourceType::CommonJs => {
                let require_runtime =
                    || call(ident("require"), vec![string_lit(runtime.clone())]);
                vec![
                    const_decl(
                        self.tracker_name(),
                        method_call(
                            require_runtime(),
                            "getTrackerForFile",
                            vec![string_lit(filename)],
                        ),
                    ),
                    const_decl(
                        self.get_scope_id_name(),
                        member(require_runtime(), "getScopeId"),
                    ),
                ]
            }
        }
    }

    // Scope helpers.

    fn collect_function_scope_bindings(&mut self, block: BlockId, body: &[Statement]) {
        let mut vars = Vec::new();
        scopes::hoisted_var_names(body, &mut vars);
        for name in vars {
            self.tree.declare(block, &name, false);
        }
        let mut lexical = Vec::new();
        scopes::lexical_names(body, &mut lexical);
        for (name, is_const) in lexical {
            self.tree.declare(block, &name, is_const);
        }
    }

    fn collect_block_bindings(&mut self, block: BlockId, body: &[Statement]) {
        let mut lexical = Vec::new();
        scopes::lexical_names(body, &mut lexical);
        for (name, is_const) in lexical {
            self.tree.declare(block, &name, is_const);
        }
    }

    /// Classifies a use of `name`, registering captures on every function
    /// frame between the use and the declaring scope. Returns the alias the
    /// identifier must be rewritten to, if any.
    fn resolve_use(&mut self, name: &str) -> Option<String> {
        let mut lookup = name.to_string();
        loop {
            let mut found = None;
            for (pos, &bid) in self.stack.iter().enumerate().rev() {
                if self.tree.block(bid).bindings.contains_key(&lookup) {
                    found = Some((pos, bid));
                    break;
                }
            }
            let Some((pos, bid)) = found else {
                // Global use.
                return if lookup == name { None } else { Some(lookup) };
            };
            if let Some(alias) = self
                .tree
                .block(bid)
                .bindings
                .get(&lookup)
                .and_then(|b| b.alias_of.clone())
            {
                lookup = alias;
                continue;
            }
            if lookup == "arguments" {
                self.tree.block_mut(bid).uses_arguments = true;
            }
            let mut any_capture = false;
            for frame in self.frames.iter_mut() {
                if frame.depth > pos {
                    frame
                        .captures
                        .entry(bid)
                        .or_default()
                        .insert(lookup.clone());
                    any_capture = true;
                }
            }
            if any_capture {
                let block = self.tree.block_mut(bid);
                block.captured.insert(lookup.clone());
                block.needs_scope_id = true;
            }
            return if lookup == name { None } else { Some(lookup) };
        }
    }

    /// Direct `eval` sees every visible binding: freeze all scopes on the
    /// stack and capture their entire contents into every enclosing
    /// function.
    fn mark_direct_eval(&mut self) {
        for frame in self.frames.iter_mut() {
            frame.contains_direct_eval = true;
        }
        for (pos, &bid) in self.stack.iter().enumerate() {
            let names: Vec<String> = self.tree.block(bid).bindings.keys().cloned().collect();
            {
                let block = self.tree.block_mut(bid);
                block.frozen = true;
                block.needs_scope_id = true;
            }
            let mut any_capture = false;
            for frame in self.frames.iter_mut() {
                if frame.depth > pos {
                    let entry = frame.captures.entry(bid).or_default();
                    for name in &names {
                        entry.insert(name.clone());
                    }
                    any_capture = true;
                }
            }
            if any_capture {
                let block = self.tree.block_mut(bid);
                for name in &names {
                    block.captured.insert(name.clone());
                }
            }
        }
    }

    fn record_super_use(&mut self) {
        let Some(home_pos) = self.homes.len().checked_sub(1) else {
            return;
        };
        let (home_name, home_depth) = {
            let home = &self.homes[home_pos];
            (home.var_name.clone(), home.depth)
        };
        // The innermost method frame decides whether `super` resolves
        // through the prototype (instance method) or the home itself.
        let is_proto = self
            .frames
            .iter()
            .rev()
            .find_map(|f| f.method_home)
            .map(|h| h.is_class && !h.is_static)
            .unwrap_or(false);
        for frame in self.frames.iter_mut() {
            if frame.depth >= home_depth {
                frame.uses_super = true;
                frame.super_var = Some(home_name.clone());
                frame.super_is_proto = is_proto;
            }
        }
        self.resolve_use(&home_name);
    }

    // Statement traversal.

    fn visit_statements(&mut self, stmts: &mut [Statement]) {
        for stmt in stmts {
            self.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::VariableDeclaration { declarations, .. } => {
                for decl in declarations {
                    self.visit_binding_pattern(&mut decl.id);
                    if let Some(init) = &mut decl.init {
                        self.visit_expression(init);
                    }
                }
            }
            Statement::FunctionDeclaration(function) => {
                self.function(
                    function,
                    FnKind::Function {
                        has_self_binding: false,
                    },
                );
            }
            Statement::ClassDeclaration(class) => {
                self.class_node(class, true);
            }
            Statement::ExpressionStatement { expression } => self.visit_expression(expression),
            Statement::BlockStatement { body } => {
                let block = self
                    .tree
                    .new_block(None, self.stack.len(), false);
                self.collect_block_bindings(block, body);
                self.stack.push(block);
                self.visit_statements(body);
                self.stack.pop();
                if self.tree.block(block).needs_scope_id {
                    let decl = self.scope_id_const(block);
                    body.insert(0, decl);
                }
            }
            Statement::ReturnStatement { argument } => {
                if let Some(argument) = argument {
                    self.visit_expression(argument);
                }
            }
            Statement::IfStatement {
                test,
                consequent,
                alternate,
            } => {
                self.visit_expression(test);
                self.visit_statement(consequent);
                if let Some(alternate) = alternate {
                    self.visit_statement(alternate);
                }
            }
            Statement::WhileStatement { test, body } => {
                self.visit_expression(test);
                self.visit_statement(body);
            }
            Statement::DoWhileStatement { body, test } => {
                self.visit_statement(body);
                self.visit_expression(test);
            }
            Statement::ForStatement {
                init,
                test,
                update,
                body,
            } => {
                let lexical = matches!(
                    init,
                    Some(ForInit::Declaration {
                        kind: DeclarationKind::Let | DeclarationKind::Const,
                        ..
                    })
                );
                if lexical {
                    let block = self.tree.new_block(None, self.stack.len(), false);
                    if let Some(ForInit::Declaration { kind, declarations }) = init {
                        let is_const = *kind == DeclarationKind::Const;
                        for decl in declarations.iter() {
                            let mut names = Vec::new();
                            scopes::pattern_names(&decl.id, &mut names);
                            for name in names {
                                self.tree.declare(block, &name, is_const);
                            }
                        }
                    }
                    self.stack.push(block);
                    self.visit_for_parts(init, test, update, body);
                    self.stack.pop();
                    if self.tree.block(block).needs_scope_id {
                        let decl = self.scope_id_const(block);
                        prepend_to_body(body, decl);
                    }
                } else {
                    self.visit_for_parts(init, test, update, body);
                }
            }
            Statement::ForInStatement { left, right, body }
            | Statement::ForOfStatement {
                left, right, body, ..
            } => {
                self.visit_expression(right);
                let lexical = matches!(
                    left,
                    ForTarget::Declaration {
                        kind: DeclarationKind::Let | DeclarationKind::Const,
                        ..
                    }
                );
                if lexical {
                    let block = self.tree.new_block(None, self.stack.len(), false);
                    if let ForTarget::Declaration { kind, pattern } = left {
                        let is_const = *kind == DeclarationKind::Const;
                        let mut names = Vec::new();
                        scopes::pattern_names(pattern, &mut names);
                        for name in names {
                            self.tree.declare(block, &name, is_const);
                        }
                    }
                    self.stack.push(block);
                    self.visit_for_target(left);
                    self.visit_statement(body);
                    self.stack.pop();
                    if self.tree.block(block).needs_scope_id {
                        let decl = self.scope_id_const(block);
                        prepend_to_body(body, decl);
                    }
                } else {
                    self.visit_for_target(left);
                    self.visit_statement(body);
                }
            }
            Statement::SwitchStatement { discriminant, cases } => {
                self.visit_expression(discriminant);
                let block = self.tree.new_block(None, self.stack.len(), false);
                for case in cases.iter() {
                    self.collect_block_bindings(block, &case.consequent);
                }
                self.stack.push(block);
                for case in cases.iter_mut() {
                    if let Some(test) = &mut case.test {
                        self.visit_expression(test);
                    }
                    self.visit_statements(&mut case.consequent);
                }
                self.stack.pop();
                if self.tree.block(block).needs_scope_id {
                    // The constant must run before the dispatch, so the
                    // whole switch moves into a wrapper block.
                    let decl = self.scope_id_const(block);
                    let switch = std::mem::replace(stmt, Statement::EmptyStatement);
                    *stmt = Statement::BlockStatement {
                        body: vec![decl, switch],
                    };
                }
            }
            Statement::TryStatement {
                block: try_block,
                handler,
                finalizer,
            } => {
                let block = self.tree.new_block(None, self.stack.len(), false);
                self.collect_block_bindings(block, try_block);
                self.stack.push(block);
                self.visit_statements(try_block);
                self.stack.pop();
                if self.tree.block(block).needs_scope_id {
                    let decl = self.scope_id_const(block);
                    try_block.insert(0, decl);
                }
                if let Some(clause) = handler {
                    let catch_block = self.tree.new_block(None, self.stack.len(), false);
                    if let Some(param) = &clause.param {
                        let mut names = Vec::new();
                        scopes::pattern_names(param, &mut names);
                        for name in names {
                            self.tree.declare(catch_block, &name, false);
                        }
                    }
                    self.collect_block_bindings(catch_block, &clause.body);
                    self.stack.push(catch_block);
                    if let Some(param) = &mut clause.param {
                        self.visit_binding_pattern(param);
                    }
                    self.visit_statements(&mut clause.body);
                    self.stack.pop();
                    if self.tree.block(catch_block).needs_scope_id {
                        let decl = self.scope_id_const(catch_block);
                        clause.body.insert(0, decl);
                    }
                }
                if let Some(finalizer) = finalizer {
                    let fin_block = self.tree.new_block(None, self.stack.len(), false);
                    self.collect_block_bindings(fin_block, finalizer);
                    self.stack.push(fin_block);
                    self.visit_statements(finalizer);
                    self.stack.pop();
                    if self.tree.block(fin_block).needs_scope_id {
                        let decl = self.scope_id_const(fin_block);
                        finalizer.insert(0, decl);
                    }
                }
            }
            Statement::ThrowStatement { argument } => self.visit_expression(argument),
            Statement::LabeledStatement { body, .. } => self.visit_statement(body),
            Statement::WithStatement { object, body } => {
                self.visit_expression(object);
                let alias = format!("{}temp_{}", self.prefix, self.next_temp);
                self.next_temp += 1;
                self.withs.push(WithFrame {
                    alias: alias.clone(),
                    used: false,
                });
                self.visit_statement(body);
                let frame = self.withs.pop();
                if frame.is_some_and(|f| f.used) {
                    // Alias bound outside the `with` so the body's
                    // instrumentation cannot be shadowed by object
                    // properties. Initializer built after the pop resolves
                    // through any outer alias.
                    let init = array_expr(vec![self.tracker_ref(), self.get_scope_id_ref()]);
                    let with = std::mem::replace(stmt, Statement::EmptyStatement);
                    *stmt = Statement::BlockStatement {
                        body: vec![const_decl(alias, init), with],
                    };
                }
            }
            Statement::ImportDeclaration { .. }
            | Statement::EmptyStatement
            | Statement::DebuggerStatement
            | Statement::BreakStatement { .. }
            | Statement::ContinueStatement { .. }
            | Statement::ExportAllDeclaration { .. } => {}
            Statement::ExportNamedDeclaration { declaration, .. } => {
                if let Some(declaration) = declaration {
                    self.visit_statement(declaration);
                }
            }
            Statement::ExportDefaultDeclaration { expression } => {
                self.visit_expression(expression);
            }
        }
    }

    fn visit_for_parts(
        &mut self,
        init: &mut Option<ForInit>,
        test: &mut Option<Expression>,
        update: &mut Option<Expression>,
        body: &mut Statement,
    ) {
        match init {
            Some(ForInit::Declaration { declarations, .. }) => {
                for decl in declarations {
                    self.visit_binding_pattern(&mut decl.id);
                    if let Some(init) = &mut decl.init {
                        self.visit_expression(init);
                    }
                }
            }
            Some(ForInit::Expression(expression)) => self.visit_expression(expression),
            None => {}
        }
        if let Some(test) = test {
            self.visit_expression(test);
        }
        if let Some(update) = update {
            self.visit_expression(update);
        }
        self.visit_statement(body);
    }

    fn visit_for_target(&mut self, target: &mut ForTarget) {
        match target {
            ForTarget::Declaration { pattern, .. } => self.visit_binding_pattern(pattern),
            ForTarget::Pattern(pattern) => self.visit_assignment_pattern(pattern),
        }
    }

    // Expression traversal.

    fn visit_expression(&mut self, expression: &mut Expression) {
        match expression {
            Expression::Identifier(id) => {
                if id.name == "eval" && self.is_global_eval() {
                    *expression = member(self.tracker_ref(), "evalIndirect");
                    return;
                }
                if let Some(alias) = self.resolve_use(&id.name.clone()) {
                    id.name = alias;
                }
            }
            Expression::ThisExpression => {
                self.resolve_use("this");
            }
            Expression::SuperExpression => self.record_super_use(),
            Expression::CallExpression {
                callee, arguments, ..
            } => {
                let direct_eval = matches!(&**callee, Expression::Identifier(id) if id.name == "eval")
                    && self.is_global_eval();
                for argument in arguments.iter_mut() {
                    self.visit_expression(argument);
                }
                if direct_eval {
                    let args = std::mem::take(arguments);
                    *expression = self.eval_direct_call(args);
                } else {
                    self.visit_expression(callee);
                }
            }
            Expression::NewExpression { callee, arguments } => {
                self.visit_expression(callee);
                for argument in arguments {
                    self.visit_expression(argument);
                }
            }
            Expression::MemberExpression { object, property, .. } => {
                self.visit_expression(object);
                if let MemberKey::Computed(expression) = property {
                    self.visit_expression(expression);
                }
            }
            Expression::FunctionExpression(function) => {
                let has_self_binding = function.id.is_some();
                self.function(function, FnKind::Function { has_self_binding });
            }
            Expression::ArrowFunctionExpression(arrow) => self.arrow(arrow),
            Expression::ClassExpression(class) => {
                if let Some(temp) = self.class_node_expression(class) {
                    let class_expr = std::mem::replace(expression, null_lit());
                    *expression = assign_expr(
                        AssignmentTarget::Identifier(Identifier::new(temp)),
                        class_expr,
                    );
                }
            }
            Expression::ObjectExpression { properties } => {
                let uses_super = special::object_literal_uses_super(properties);
                let temp = if uses_super {
                    let temp = self.alloc_temp();
                    self.homes.push(HomeContext {
                        var_name: temp.clone(),
                        depth: self.stack.len(),
                    });
                    Some(temp)
                } else {
                    None
                };
                for member in properties.iter_mut() {
                    match member {
                        ObjectMember::Property {
                            key, value, kind, method, ..
                        } => {
                            if let PropertyKey::Computed(key_expr) = key {
                                self.visit_expression(key_expr);
                            }
                            let is_method_like = *method || *kind != PropertyKind::Init;
                            match value {
                                Expression::FunctionExpression(f) if is_method_like => {
                                    self.function(f, FnKind::ObjectMethod);
                                }
                                other => self.visit_expression(other),
                            }
                        }
                        ObjectMember::Spread { argument } => self.visit_expression(argument),
                    }
                }
                if let Some(temp) = temp {
                    self.homes.pop();
                    let object = std::mem::replace(expression, null_lit());
                    *expression = assign_expr(
                        AssignmentTarget::Identifier(Identifier::new(temp)),
                        object,
                    );
                }
            }
            Expression::AssignmentExpression { target, value, .. } => {
                match target {
                    AssignmentTarget::Identifier(id) => {
                        if let Some(alias) = self.resolve_use(&id.name.clone()) {
                            id.name = alias;
                        }
                    }
                    AssignmentTarget::Member { object, property, .. } => {
                        self.visit_expression(object);
                        if let MemberKey::Computed(expression) = property {
                            self.visit_expression(expression);
                        }
                    }
                    AssignmentTarget::Pattern(pattern) => self.visit_assignment_pattern(pattern),
                }
                self.visit_expression(value);
            }
            Expression::UnaryExpression { argument, .. }
            | Expression::AwaitExpression { argument }
            | Expression::SpreadElement { argument }
            | Expression::UpdateExpression { argument, .. } => self.visit_expression(argument),
            Expression::BinaryExpression { left, right, .. }
            | Expression::LogicalExpression { left, right, .. } => {
                self.visit_expression(left);
                self.visit_expression(right);
            }
            Expression::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                self.visit_expression(test);
                self.visit_expression(consequent);
                self.visit_expression(alternate);
            }
            Expression::SequenceExpression { expressions } => {
                for expression in expressions {
                    self.visit_expression(expression);
                }
            }
            Expression::ArrayExpression { elements } => {
                for element in elements.iter_mut().flatten() {
                    self.visit_expression(element);
                }
            }
            Expression::TemplateLiteral { expressions, .. } => {
                for expression in expressions {
                    self.visit_expression(expression);
                }
            }
            Expression::TaggedTemplateExpression {
                tag, expressions, ..
            } => {
                self.visit_expression(tag);
                for expression in expressions {
                    self.visit_expression(expression);
                }
            }
            Expression::YieldExpression { argument, .. } => {
                if let Some(argument) = argument {
                    self.visit_expression(argument);
                }
            }
            Expression::Literal(_) | Expression::MetaProperty { .. } => {}
        }
    }

    fn is_global_eval(&self) -> bool {
        !self
            .stack
            .iter()
            .any(|&b| self.tree.block(b).bindings.contains_key("eval"))
    }

    /// Builds the `tracker.evalDirect(eval, [args], scopeDefs, isStrict,
    /// isProxied, hoistBlockId)` rewrite for a direct `eval` call.
    fn eval_direct_call(&mut self, arguments: Vec<Expression>) -> Expression {
        self.mark_direct_eval();
        let mut scope_defs = Vec::new();
        for &bid in self.stack.clone().iter() {
            let block = self.tree.block(bid);
            let names: Vec<String> = block.bindings.keys().cloned().collect();
            let consts: Vec<String> = block
                .bindings
                .iter()
                .filter(|(_, b)| b.is_const)
                .map(|(n, _)| n.clone())
                .collect();
            let id = block.id;
            scope_defs.push(array_expr(vec![
                number_lit(id as f64),
                array_expr(names.into_iter().map(string_lit).collect()),
                array_expr(consts.into_iter().map(string_lit).collect()),
                ident(self.scope_id_name(id)),
            ]));
        }
        let hoist_block = self
            .stack
            .iter()
            .rev()
            .find(|&&b| self.tree.block(b).is_var_scope)
            .copied()
            .unwrap_or(1);
        let is_strict = self.frames.last().map(|f| f.is_strict).unwrap_or(false);
        let callee = member(self.tracker_ref(), "evalDirect");
        call(
            callee,
            vec![
                ident("eval"),
                array_expr(arguments),
                array_expr(scope_defs),
                bool_lit(is_strict),
                bool_lit(!self.withs.is_empty()),
                number_lit(hoist_block as f64),
            ],
        )
    }

    // Patterns.

    /// Visits expressions nested in a declaration pattern (defaults,
    /// computed keys). The bound names are declarations, not uses.
    fn visit_binding_pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Identifier(_) => {}
            Pattern::ArrayPattern { elements } => {
                for element in elements.iter_mut().flatten() {
                    self.visit_binding_pattern(element);
                }
            }
            Pattern::ObjectPattern { properties } => {
                for property in properties {
                    match property {
                        ObjectPatternProperty::Property { key, value, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.visit_expression(expression);
                            }
                            self.visit_binding_pattern(value);
                        }
                        ObjectPatternProperty::Rest { argument } => {
                            self.visit_binding_pattern(argument)
                        }
                    }
                }
            }
            Pattern::AssignmentPattern { left, right } => {
                self.visit_binding_pattern(left);
                self.visit_expression(right);
            }
            Pattern::RestElement { argument } => self.visit_binding_pattern(argument),
        }
    }

    /// Visits a destructuring assignment target, where identifiers are
    /// writes to existing bindings.
    fn visit_assignment_pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Identifier(id) => {
                if let Some(alias) = self.resolve_use(&id.name.clone()) {
                    id.name = alias;
                }
            }
            Pattern::ArrayPattern { elements } => {
                for element in elements.iter_mut().flatten() {
                    self.visit_assignment_pattern(element);
                }
            }
            Pattern::ObjectPattern { properties } => {
                for property in properties {
                    match property {
                        ObjectPatternProperty::Property { key, value, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.visit_expression(expression);
                            }
                            self.visit_assignment_pattern(value);
                        }
                        ObjectPatternProperty::Rest { argument } => {
                            self.visit_assignment_pattern(argument)
                        }
                    }
                }
            }
            Pattern::AssignmentPattern { left, right } => {
                self.visit_assignment_pattern(left);
                self.visit_expression(right);
            }
            Pattern::RestElement { argument } => self.visit_assignment_pattern(argument),
        }
    }

    // Functions and classes.

    fn function(&mut self, function: &mut FunctionNode, kind: FnKind) -> BlockId {
        let body_strict = self.current_strict()
            || body_has_use_strict(&function.body)
            || matches!(kind, FnKind::ClassMethod { .. } | FnKind::ClassConstructor);
        let method_home = match kind {
            FnKind::ClassMethod { is_static } => Some(MethodHome {
                is_class: true,
                is_static,
            }),
            FnKind::ClassConstructor => Some(MethodHome {
                is_class: true,
                is_static: false,
            }),
            FnKind::ObjectMethod => Some(MethodHome {
                is_class: false,
                is_static: false,
            }),
            FnKind::Function { .. } => None,
        };

        let block = self.tree.new_block(
            function.id.as_ref().map(|id| id.name.clone()),
            self.stack.len(),
            true,
        );
        let mut param_names = Vec::new();
        for param in &function.params {
            scopes::pattern_names(param, &mut param_names);
        }
        for name in &param_names {
            self.tree.declare(block, name, false);
        }
        self.tree.block_mut(block).param_names = param_names;
        if let FnKind::Function {
            has_self_binding: true,
        } = kind
        {
            if let Some(id) = &function.id {
                self.tree.declare(block, &id.name, true);
            }
        }
        self.tree.declare(block, "this", true);
        self.tree.declare(block, "arguments", false);
        self.collect_function_scope_bindings(block, &function.body);

        self.frames
            .push(FnFrame::new(self.stack.len(), body_strict, method_home));
        if let Some(frame) = self.frames.last_mut() {
            frame.body_block = Some(block);
        }
        self.stack.push(block);

        for param in &mut function.params {
            self.visit_binding_pattern(param);
        }
        self.visit_statements(&mut function.body);

        self.stack.pop();
        let frame = self.frames.pop().expect("function frame");

        match kind {
            FnKind::Function { .. } | FnKind::ObjectMethod => {
                self.finalize_function(function, frame, block, kind);
            }
            FnKind::ClassMethod { .. } | FnKind::ClassConstructor => {
                // Tracked through the owning class; captures have already
                // propagated to the class frame during resolution. The body
                // still needs its scope-id constant when inner functions
                // close over it, and any hoisted temps.
                let mut inserted = Vec::new();
                if kind != FnKind::ClassConstructor && self.tree.block(block).needs_scope_id {
                    inserted.push(self.scope_id_const(block));
                }
                if !frame.hoisted_temps.is_empty() {
                    inserted.push(temp_var_declaration(&frame.hoisted_temps));
                }
                if !inserted.is_empty() {
                    let directive_count =
                        function.body.iter().take_while(|s| is_directive(s)).count();
                    function.body.splice(directive_count..directive_count, inserted);
                }
            }
        }
        block
    }

    fn arrow(&mut self, arrow: &mut ArrowNode) {
        // Expression bodies become block form so the prelude has a home.
        if let ArrowBody::Expression(expression) = &mut arrow.body {
            let argument = std::mem::replace(&mut **expression, null_lit());
            arrow.body = ArrowBody::Block(vec![Statement::ReturnStatement {
                argument: Some(argument),
            }]);
        }
        let ArrowBody::Block(body) = &mut arrow.body else {
            return;
        };

        let body_strict = self.current_strict() || body_has_use_strict(body);
        let block = self.tree.new_block(None, self.stack.len(), true);
        let mut param_names = Vec::new();
        for param in &arrow.params {
            scopes::pattern_names(param, &mut param_names);
        }
        for name in &param_names {
            self.tree.declare(block, name, false);
        }
        self.tree.block_mut(block).param_names = param_names;
        self.collect_function_scope_bindings(block, body);

        self.frames
            .push(FnFrame::new(self.stack.len(), body_strict, None));
        if let Some(frame) = self.frames.last_mut() {
            frame.body_block = Some(block);
        }
        self.stack.push(block);

        for param in &mut arrow.params {
            self.visit_binding_pattern(param);
        }
        self.visit_statements(body);

        self.stack.pop();
        let frame = self.frames.pop().expect("arrow frame");

        let info = self.build_tracker_info(&frame, TrackerFlags::default());
        let prelude = self.prelude_statements(block, &frame, &info);
        let directive_count = body.iter().take_while(|s| is_directive(s)).count();
        body.splice(directive_count..directive_count, prelude);
        arrow.body_comment = Some(info.to_comment());
    }

    fn finalize_function(
        &mut self,
        function: &mut FunctionNode,
        frame: FnFrame,
        block: BlockId,
        kind: FnKind,
    ) {
        let flags = TrackerFlags {
            is_method: kind == FnKind::ObjectMethod,
            ..TrackerFlags::default()
        };
        let info = self.build_tracker_info(&frame, flags);
        let prelude = self.prelude_statements(block, &frame, &info);
        let directive_count = function.body.iter().take_while(|s| is_directive(s)).count();
        function.body.splice(directive_count..directive_count, prelude);
        function.body_comment = Some(info.to_comment());
    }

    /// The scope-id constant, tracker guard and hoisted temp declarations
    /// that open an instrumented function body.
    fn prelude_statements(
        &mut self,
        block: BlockId,
        frame: &FnFrame,
        info: &TrackerInfo,
    ) -> Vec<Statement> {
        let mut out = Vec::with_capacity(3);
        out.push(self.scope_id_const(block));
        out.push(self.tracker_guard(block, info));
        if !frame.hoisted_temps.is_empty() {
            out.push(temp_var_declaration(&frame.hoisted_temps));
        }
        out
    }

    /// `if (<scopeId> === null) return tracker([scopeId_a, x, y], …);`
    fn tracker_guard(&mut self, own_block: BlockId, info: &TrackerInfo) -> Statement {
        let mut args = Vec::with_capacity(info.scopes.len());
        for scope in &info.scopes {
            let mut entry = vec![ident(self.scope_id_name(scope.block_id))];
            for name in &scope.var_names {
                entry.push(match name.as_str() {
                    "this" => Expression::ThisExpression,
                    other => ident(other),
                });
            }
            args.push(array_expr(entry));
        }
        let tracker = self.tracker_ref();
        Statement::IfStatement {
            test: Expression::BinaryExpression {
                left: Box::new(ident(self.scope_id_name(own_block))),
                operator: BinaryOperator::StrictEqual,
                right: Box::new(null_lit()),
            },
            consequent: Box::new(Statement::ReturnStatement {
                argument: Some(call(tracker, args)),
            }),
            alternate: None,
        }
    }

    fn build_tracker_info(&mut self, frame: &FnFrame, flags: TrackerFlags) -> TrackerInfo {
        let id = self.next_fn_id;
        self.next_fn_id += 1;

        let mut entries: Vec<(BlockId, Vec<String>)> = frame
            .captures
            .iter()
            .map(|(bid, names)| (*bid, names.iter().cloned().collect()))
            .collect();
        entries.sort_by_key(|(bid, _)| self.tree.block(*bid).depth);

        let scopes = entries
            .into_iter()
            .map(|(bid, var_names)| {
                let block = self.tree.block(bid);
                let const_names: Vec<String> = var_names
                    .iter()
                    .filter(|n| {
                        block
                            .bindings
                            .get(n.as_str())
                            .map(|b| b.is_const)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                ScopeMeta {
                    block_id: bid,
                    var_names,
                    const_names,
                    arg_names: if block.uses_arguments && !block.param_names.is_empty() {
                        Some(block.param_names.clone())
                    } else {
                        None
                    },
                    block_name: block.name.clone(),
                }
            })
            .collect();

        TrackerInfo {
            id,
            scopes,
            filename: self.options.filename.clone(),
            is_method: flags.is_method,
            is_proto_method: frame.super_is_proto,
            super_var_name: frame.super_var.clone(),
            is_strict: frame.is_strict,
            is_eval: self.options.eval,
            has_super_class: flags.has_super_class,
            contains_eval: frame.contains_direct_eval,
            returns_super: flags.returns_super,
            first_super_statement_index: flags.first_super_statement_index,
        }
    }

    fn current_strict(&self) -> bool {
        self.frames.last().map(|f| f.is_strict).unwrap_or(self.file_strict)
    }

    /// Handles `class` expressions; returns the hoisted temp the caller
    /// must assign the class into, when one is needed.
    fn class_node_expression(&mut self, class: &mut ClassNode) -> Option<String> {
        self.class_node(class, false)
    }

    fn class_node(&mut self, class: &mut ClassNode, is_declaration: bool) -> Option<String> {
        if let Some(super_class) = &mut class.super_class {
            self.visit_expression(super_class);
        }

        let uses_super = scopes::class_uses_super(&class.body);
        let (home_name, temp) = if is_declaration {
            let name = class.id.as_ref().map(|id| id.name.clone());
            (if uses_super { name } else { None }, None)
        } else if class.id.is_some() || uses_super {
            let temp = self.alloc_temp();
            (
                if uses_super { Some(temp.clone()) } else { None },
                Some(temp),
            )
        } else {
            (None, None)
        };

        // Inner references to a class expression's own name resolve to the
        // hoisted temp.
        let name_block = match (&class.id, &temp) {
            (Some(id), Some(temp)) => {
                let block = self.tree.new_block(None, self.stack.len(), false);
                self.tree
                    .declare_alias(block, &id.name, temp.clone());
                self.stack.push(block);
                Some(block)
            }
            _ => None,
        };

        self.frames.push(FnFrame::new(
            self.stack.len(),
            true,
            Some(MethodHome {
                is_class: true,
                is_static: false,
            }),
        ));
        if let Some(home) = &home_name {
            self.homes.push(HomeContext {
                var_name: home.clone(),
                depth: self.stack.len(),
            });
        }

        let mut ctor_index = None;
        let mut ctor_block = None;
        for (index, member) in class.body.iter_mut().enumerate() {
            match member {
                ClassMember::Method {
                    key,
                    function,
                    kind,
                    is_static,
                } => {
                    if let PropertyKey::Computed(key_expr) = key {
                        self.visit_expression(key_expr);
                    }
                    let fn_kind = if *kind == MethodKind::Constructor {
                        ctor_index = Some(index);
                        FnKind::ClassConstructor
                    } else {
                        FnKind::ClassMethod {
                            is_static: *is_static,
                        }
                    };
                    let block = self.function(function, fn_kind);
                    if *kind == MethodKind::Constructor {
                        ctor_block = Some(block);
                    }
                }
                ClassMember::Property { key, value, .. } => {
                    if let PropertyKey::Computed(key_expr) = key {
                        self.visit_expression(key_expr);
                    }
                    if let Some(value) = value {
                        self.visit_expression(value);
                    }
                }
                ClassMember::StaticBlock { body } => {
                    let block = self.tree.new_block(None, self.stack.len(), true);
                    self.collect_function_scope_bindings(block, body);
                    self.stack.push(block);
                    self.visit_statements(body);
                    self.stack.pop();
                    if self.tree.block(block).needs_scope_id {
                        let decl = self.scope_id_const(block);
                        body.insert(0, decl);
                    }
                }
            }
        }

        if home_name.is_some() {
            self.homes.pop();
        }
        let frame = self.frames.pop().expect("class frame");
        if let Some(block) = name_block {
            debug_assert_eq!(self.stack.last(), Some(&block));
            self.stack.pop();
        }

        // Super-call bookkeeping from the explicit constructor, computed on
        // the body before the prelude lands in it.
        let (first_super, returns_super) = match ctor_index {
            Some(index) => match &class.body[index] {
                ClassMember::Method { function, .. } => {
                    special::super_call_position(&function.body)
                }
                _ => (None, false),
            },
            None => (None, false),
        };

        let flags = TrackerFlags {
            is_method: false,
            has_super_class: class.super_class.is_some(),
            returns_super,
            first_super_statement_index: first_super,
        };
        let mut info = self.build_tracker_info(&frame, flags);
        info.super_var_name = frame.super_var.clone();
        info.is_proto_method = false;

        let needs_capture_hook = !info.scopes.is_empty();
        if let (Some(index), Some(block)) = (ctor_index, ctor_block) {
            if let ClassMember::Method { function, .. } = &mut class.body[index] {
                let prelude = self.prelude_statements(block, &frame, &info);
                let directive_count =
                    function.body.iter().take_while(|s| is_directive(s)).count();
                function.body.splice(directive_count..directive_count, prelude);
            }
        } else if needs_capture_hook {
            let block = self.tree.new_block(None, self.stack.len() + 1, true);
            let mut body = self.prelude_statements(block, &frame, &info);
            let mut params = Vec::new();
            if class.super_class.is_some() {
                let args_name = format!("{}args", self.prefix);
                params.push(Pattern::RestElement {
                    argument: Box::new(ident_pattern(args_name.clone())),
                });
                body.push(expr_stmt(call(
                    Expression::SuperExpression,
                    vec![Expression::SpreadElement {
                        argument: Box::new(ident(args_name)),
                    }],
                )));
            }
            class.body.insert(
                0,
                ClassMember::Method {
                    key: PropertyKey::Identifier("constructor".to_string()),
                    function: FunctionNode {
                        id: None,
                        params,
                        body,
                        is_async: false,
                        is_generator: false,
                        body_comment: None,
                    },
                    kind: MethodKind::Constructor,
                    is_static: false,
                },
            );
        }

        class.body_comment = Some(info.to_comment());
        temp
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TrackerFlags {
    is_method: bool,
    has_super_class: bool,
    returns_super: bool,
    first_super_statement_index: Option<u32>,
}

fn body_has_use_strict(body: &[Statement]) -> bool {
    for stmt in body {
        match stmt {
            Statement::ExpressionStatement {
                expression: Expression::Literal(Literal::String(value)),
            } => {
                if value == "use strict" {
                    return true;
                }
            }
            _ => break,
        }
    }
    false
}

fn temp_var_declaration(names: &[String]) -> Statement {
    Statement::VariableDeclaration {
        kind: DeclarationKind::Var,
        declarations: names
            .iter()
            .map(|name| VariableDeclarator {
                id: ident_pattern(name.clone()),
                init: None,
            })
            .collect(),
    }
}

/// Inserts a statement at the start of a loop body, wrapping non-block
/// bodies in a block first.
fn prepend_to_body(body: &mut Statement, stmt: Statement) {
    match body {
        Statement::BlockStatement { body } => body.insert(0, stmt),
        other => {
            let old = std::mem::replace(other, Statement::EmptyStatement);
            *other = Statement::BlockStatement {
                body: vec![stmt, old],
            };
        }
    }
}
