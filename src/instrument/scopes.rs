//! # Lexical Scope Collection
//!
//! Block arena and binding collection used by the rewriter to classify
//! identifier uses as local, upper-scope or global. Hoisting is modeled by
//! pre-collecting a scope's bindings before its statements are walked:
//! `var` and function declarations are gathered deeply (stopping at nested
//! function boundaries), lexical declarations shallowly.

use indexmap::{IndexMap, IndexSet};

use crate::ast::{
    ClassMember, DeclarationKind, ForInit, ForTarget, ObjectPatternProperty, Pattern, Statement,
};

pub type BlockId = u32;

/// One lexical scope template of the file being instrumented.
#[derive(Debug)]
pub struct BlockInfo {
    pub id: BlockId,
    /// Name used in tracker metadata (function name for body scopes).
    pub name: Option<String>,
    /// Position in the scope stack at creation time.
    pub depth: usize,
    /// Whether `var` declarations land here (function bodies, program).
    pub is_var_scope: bool,
    pub bindings: IndexMap<String, Binding>,
    /// Bindings closed over by some inner function.
    pub captured: IndexSet<String>,
    /// A `const <prefix>scopeId_<id>` statement must be emitted for this
    /// block.
    pub needs_scope_id: bool,
    /// Direct `eval` sees this scope; no name in it may ever be renamed.
    pub frozen: bool,
    /// Function-body scope that references `arguments`.
    pub uses_arguments: bool,
    /// Parameter names, for function-body scopes.
    pub param_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub is_const: bool,
    /// When set, uses of this name are rewritten to the alias before
    /// resolution continues (class-expression self-names resolve to their
    /// hoisted temp).
    pub alias_of: Option<String>,
}

/// Arena of blocks with monotonically assigned ids.
#[derive(Debug, Default)]
pub struct ScopeTree {
    blocks: Vec<BlockInfo>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_block(
        &mut self,
        name: Option<String>,
        depth: usize,
        is_var_scope: bool,
    ) -> BlockId {
        // Ids start at 1; 0 is reserved for "no block" in metadata.
        let id = self.blocks.len() as BlockId + 1;
        self.blocks.push(BlockInfo {
            id,
            name,
            depth,
            is_var_scope,
            bindings: IndexMap::new(),
            captured: IndexSet::new(),
            needs_scope_id: false,
            frozen: false,
            uses_arguments: false,
            param_names: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &BlockInfo {
        &self.blocks[(id - 1) as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockInfo {
        &mut self.blocks[(id - 1) as usize]
    }

    pub fn declare(&mut self, id: BlockId, name: &str, is_const: bool) {
        self.block_mut(id)
            .bindings
            .entry(name.to_string())
            .or_insert(Binding {
                is_const,
                alias_of: None,
            });
    }

    pub fn declare_alias(&mut self, id: BlockId, name: &str, alias_of: String) {
        self.block_mut(id).bindings.insert(
            name.to_string(),
            Binding {
                is_const: true,
                alias_of: Some(alias_of),
            },
        );
    }
}

/// Collects names bound by a binding pattern.
pub fn pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Identifier(id) => out.push(id.name.clone()),
        Pattern::ArrayPattern { elements } => {
            for element in elements.iter().flatten() {
                pattern_names(element, out);
            }
        }
        Pattern::ObjectPattern { properties } => {
            for property in properties {
                match property {
                    ObjectPatternProperty::Property { value, .. } => pattern_names(value, out),
                    ObjectPatternProperty::Rest { argument } => pattern_names(argument, out),
                }
            }
        }
        Pattern::AssignmentPattern { left, .. } => pattern_names(left, out),
        Pattern::RestElement { argument } => pattern_names(argument, out),
    }
}

/// Deep scan for `var` declarations, stopping at function boundaries.
pub fn hoisted_var_names(stmts: &[Statement], out: &mut Vec<String>) {
    for stmt in stmts {
        hoisted_in_statement(stmt, out);
    }
}

fn hoisted_in_statement(stmt: &Statement, out: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration { kind, declarations } => {
            if *kind == DeclarationKind::Var {
                for decl in declarations {
                    pattern_names(&decl.id, out);
                }
            }
        }
        Statement::BlockStatement { body } => hoisted_var_names(body, out),
        Statement::IfStatement {
            consequent,
            alternate,
            ..
        } => {
            hoisted_in_statement(consequent, out);
            if let Some(alternate) = alternate {
                hoisted_in_statement(alternate, out);
            }
        }
        Statement::WhileStatement { body, .. }
        | Statement::DoWhileStatement { body, .. }
        | Statement::LabeledStatement { body, .. }
        | Statement::WithStatement { body, .. } => hoisted_in_statement(body, out),
        Statement::ForStatement { init, body, .. } => {
            if let Some(ForInit::Declaration { kind, declarations }) = init {
                if *kind == DeclarationKind::Var {
                    for decl in declarations {
                        pattern_names(&decl.id, out);
                    }
                }
            }
            hoisted_in_statement(body, out);
        }
        Statement::ForInStatement { left, body, .. }
        | Statement::ForOfStatement { left, body, .. } => {
            if let ForTarget::Declaration { kind, pattern } = left {
                if *kind == DeclarationKind::Var {
                    pattern_names(pattern, out);
                }
            }
            hoisted_in_statement(body, out);
        }
        Statement::SwitchStatement { cases, .. } => {
            for case in cases {
                hoisted_var_names(&case.consequent, out);
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            hoisted_var_names(block, out);
            if let Some(handler) = handler {
                hoisted_var_names(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                hoisted_var_names(finalizer, out);
            }
        }
        Statement::ExportNamedDeclaration {
            declaration: Some(declaration),
            ..
        } => hoisted_in_statement(declaration, out),
        _ => {}
    }
}

/// Shallow scan for lexical (`let`/`const`/`class`/function) declarations
/// of a statement list. Returns `(name, is_const)` pairs.
pub fn lexical_names(stmts: &[Statement], out: &mut Vec<(String, bool)>) {
    for stmt in stmts {
        lexical_in_statement(stmt, out);
    }
}

fn lexical_in_statement(stmt: &Statement, out: &mut Vec<(String, bool)>) {
    match stmt {
        Statement::VariableDeclaration { kind, declarations } => match kind {
            DeclarationKind::Let | DeclarationKind::Const => {
                let is_const = *kind == DeclarationKind::Const;
                for decl in declarations {
                    let mut names = Vec::new();
                    pattern_names(&decl.id, &mut names);
                    out.extend(names.into_iter().map(|n| (n, is_const)));
                }
            }
            DeclarationKind::Var => {}
        },
        Statement::FunctionDeclaration(function) => {
            if let Some(id) = &function.id {
                out.push((id.name.clone(), false));
            }
        }
        Statement::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                out.push((id.name.clone(), false));
            }
        }
        Statement::ImportDeclaration { specifiers, .. } => {
            for spec in specifiers {
                let local = match spec {
                    crate::ast::ImportSpecifier::Default { local }
                    | crate::ast::ImportSpecifier::Namespace { local }
                    | crate::ast::ImportSpecifier::Named { local, .. } => local,
                };
                out.push((local.name.clone(), true));
            }
        }
        Statement::ExportNamedDeclaration {
            declaration: Some(declaration),
            ..
        } => lexical_in_statement(declaration, out),
        Statement::ExportDefaultDeclaration { .. } => {}
        _ => {}
    }
}

/// Whether a class member list contains any `super` usage reachable from a
/// method body (arrows propagate `super`; nested functions and classes do
/// not).
pub fn class_uses_super(members: &[ClassMember]) -> bool {
    members.iter().any(|member| match member {
        ClassMember::Method { function, .. } => super::special::statements_use_super(&function.body),
        ClassMember::Property { value: Some(v), .. } => super::special::expression_uses_super(v),
        ClassMember::Property { value: None, .. } => false,
        ClassMember::StaticBlock { body } => super::special::statements_use_super(body),
    })
}
