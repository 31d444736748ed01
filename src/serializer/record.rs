//! # Record Arena
//!
//! One [`Record`] per distinct non-primitive value the tracer has
//! observed, held in an arena with stable ids. A record whose `node` is
//! `None` is still under construction; descendants reaching it observe the
//! circular sentinel and convert their slot into a post-construction
//! assignment.
//!
//! Dependency slots inside nodes are reserved placeholder identifiers
//! (see [`crate::util::record_placeholder`]); the output assembler rewrites
//! them to final names or splices inlined expressions.

use std::collections::HashMap;

use crate::ast::{ident, Expression, Statement};
use crate::heap::ObjectId;
use crate::util::record_placeholder;

pub type RecordId = u32;

/// Post-construction mutation executed after all declarations.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub stmt: Statement,
    pub dependencies: Vec<RecordId>,
}

/// ESM-import emission for a record (built-in module reference).
#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub source: String,
}

#[derive(Debug)]
pub struct Record {
    pub id: RecordId,
    /// Suggested name, sanitized and deduplicated by the assembler.
    pub name_hint: String,
    /// Construction expression; `None` while construction is in progress.
    pub node: Option<Expression>,
    pub dependencies: Vec<RecordId>,
    pub dependents: Vec<RecordId>,
    pub assignments: Vec<Assignment>,
    /// Emit as an `import` declaration under the `esm` format.
    pub import: Option<ImportSpec>,
    /// Runtime `.name` of a serialized function, for name preservation.
    pub fn_name: Option<String>,
    /// Never splice into the single dependent (named function defs,
    /// scope machinery).
    pub no_inline: bool,
    /// Referenced from a post-construction assignment; splicing would
    /// duplicate construction and break identity.
    pub referenced_by_assignment: bool,
}

/// Arena of records plus the value-identity index.
#[derive(Debug, Default)]
pub struct Records {
    list: Vec<Record>,
    by_object: HashMap<ObjectId, RecordId>,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-progress record; `object` registers value identity.
    pub fn create(&mut self, object: Option<ObjectId>, name_hint: &str) -> RecordId {
        let id = self.list.len() as RecordId;
        self.list.push(Record {
            id,
            name_hint: name_hint.to_string(),
            node: None,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            assignments: Vec::new(),
            import: None,
            fn_name: None,
            no_inline: false,
            referenced_by_assignment: false,
        });
        if let Some(object) = object {
            self.by_object.insert(object, id);
        }
        id
    }

    pub fn lookup(&self, object: ObjectId) -> Option<RecordId> {
        self.by_object.get(&object).copied()
    }

    pub fn get(&self, id: RecordId) -> &Record {
        &self.list[id as usize]
    }

    pub fn get_mut(&mut self, id: RecordId) -> &mut Record {
        &mut self.list[id as usize]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn set_node(&mut self, id: RecordId, node: Expression) {
        self.list[id as usize].node = Some(node);
    }

    /// Whether the record is still under construction.
    pub fn in_progress(&self, id: RecordId) -> bool {
        self.list[id as usize].node.is_none()
    }

    /// Placeholder expression standing for `id` inside another record's
    /// node.
    pub fn placeholder(id: RecordId) -> Expression {
        ident(record_placeholder(id))
    }

    /// Registers that `from`'s node references `to`, mirroring the edge on
    /// `to.dependents`. Dependents record one entry per reference, so
    /// their length is the reference count the inliner consults.
    pub fn add_dependency(&mut self, from: RecordId, to: RecordId) {
        if from == to {
            return;
        }
        if !self.list[from as usize].dependencies.contains(&to) {
            self.list[from as usize].dependencies.push(to);
        }
        self.list[to as usize].dependents.push(from);
    }

    pub fn add_assignment(&mut self, id: RecordId, stmt: Statement, dependencies: Vec<RecordId>) {
        for &dep in &dependencies {
            self.list[dep as usize].referenced_by_assignment = true;
        }
        self.list[id as usize]
            .assignments
            .push(Assignment { stmt, dependencies });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.list.iter()
    }
}
