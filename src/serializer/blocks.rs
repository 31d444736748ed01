//! # Block and Scope Planner
//!
//! Arranges captured scopes into synthetic factory functions. Each block
//! becomes an arrow `(p1, p2, …) => [fn defs…, injectors…, child arrows…]`;
//! each runtime scope becomes one call of that arrow. A block with exactly
//! one function and nothing else collapses to an arrow returning the
//! function directly. The root (module) scope is flattened when its
//! captured variables are never reassigned: its values stand as plain
//! records and its functions as top-level expressions.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::ast::*;
use crate::instrument::ScopeMeta;
use crate::serializer::function::{rename_free_vars, DefId, FunctionDef, MethodWrap};
use crate::serializer::record::{RecordId, Records};
use crate::serializer::trace::Serializer;
use crate::serializer::{SerializeError, SerializeResult};

/// A captured variable's serialized form.
#[derive(Debug, Clone)]
pub struct PlannedValue {
    pub record: RecordId,
    pub is_circular: bool,
}

impl PlannedValue {
    pub fn record(record: RecordId, is_circular: bool) -> Self {
        Self {
            record,
            is_circular,
        }
    }
}

/// One lexical-scope template observed in tracker metadata.
#[derive(Debug)]
pub struct BlockPlan {
    pub id: u32,
    pub name: Option<String>,
    pub parent: Option<u32>,
    /// Captured variable names across every function using this block.
    pub params: IndexSet<String>,
    /// Direct `eval` sees this scope; names must survive verbatim.
    pub frozen: bool,
    pub scopes: IndexMap<u32, ScopePlan>,
    /// Defs whose innermost captured scope is this block.
    pub defs: IndexSet<DefId>,
}

/// One runtime instantiation of a block.
#[derive(Debug)]
pub struct ScopePlan {
    pub id: u32,
    pub parent: Option<(u32, u32)>,
    pub values: IndexMap<String, PlannedValue>,
    pub record: Option<RecordId>,
}

#[derive(Debug, Default)]
pub struct Planner {
    pub blocks: IndexMap<u32, BlockPlan>,
    /// (def, innermost block+scope) → function instance records.
    instances: IndexMap<(DefId, Option<(u32, u32)>), Vec<RecordId>>,
    /// Synthetic intermediate scopes created when late nesting re-parents
    /// a block: (new parent block, old parent scope) → synthetic scope id.
    synthetic: HashMap<(u32, u32), u32>,
    next_synthetic_id: u32,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            next_synthetic_id: u32::MAX,
            ..Self::default()
        }
    }

    pub fn ensure_block(&mut self, meta: &ScopeMeta, parent: Option<u32>, frozen: bool) {
        let block = self.blocks.entry(meta.block_id).or_insert_with(|| BlockPlan {
            id: meta.block_id,
            name: meta.block_name.clone(),
            parent,
            params: IndexSet::new(),
            frozen: false,
            scopes: IndexMap::new(),
            defs: IndexSet::new(),
        });
        for name in &meta.var_names {
            block.params.insert(name.clone());
        }
        block.frozen |= frozen;
        if block.name.is_none() {
            block.name = meta.block_name.clone();
        }

        // Deeper parents win: a chain that reveals an intermediate block
        // re-parents this one, and existing scopes pointing at the old
        // parent get synthetic intermediates with the correct lineage.
        match (parent, block.parent) {
            (Some(new_parent), Some(old_parent)) if new_parent > old_parent => {
                let stale: Vec<(u32, u32)> = block
                    .scopes
                    .values()
                    .filter_map(|scope| scope.parent)
                    .filter(|(parent_block, _)| *parent_block == old_parent)
                    .collect();
                self.blocks.get_mut(&meta.block_id).expect("block").parent = Some(new_parent);
                for (old_block, old_scope) in stale {
                    let synthetic = self.synthetic_scope(new_parent, Some((old_block, old_scope)));
                    let block = self.blocks.get_mut(&meta.block_id).expect("block");
                    for scope in block.scopes.values_mut() {
                        if scope.parent == Some((old_block, old_scope)) {
                            scope.parent = Some((new_parent, synthetic));
                        }
                    }
                }
            }
            (Some(new_parent), None) => {
                // The block was first observed as a chain root; scopes
                // recorded then bridge through a synthetic scope of the
                // newly revealed parent.
                let had_orphans = block.scopes.values().any(|scope| scope.parent.is_none());
                self.blocks.get_mut(&meta.block_id).expect("block").parent = Some(new_parent);
                if had_orphans {
                    let synthetic = self.synthetic_scope(new_parent, None);
                    let block = self.blocks.get_mut(&meta.block_id).expect("block");
                    for scope in block.scopes.values_mut() {
                        if scope.parent.is_none() {
                            scope.parent = Some((new_parent, synthetic));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Empty scope of `block` bridging to a scope of an outer block (or to
    /// the chain root when the orphaned scopes predate any parent).
    fn synthetic_scope(&mut self, block: u32, old_parent: Option<(u32, u32)>) -> u32 {
        let key = (block, old_parent.map_or(0, |(_, scope)| scope));
        if let Some(&id) = self.synthetic.get(&key) {
            return id;
        }
        let id = self.next_synthetic_id;
        self.next_synthetic_id -= 1;
        self.synthetic.insert(key, id);
        if let Some(plan) = self.blocks.get_mut(&block) {
            plan.scopes.insert(
                id,
                ScopePlan {
                    id,
                    parent: old_parent,
                    values: IndexMap::new(),
                    record: None,
                },
            );
        }
        id
    }

    pub fn ensure_scope(&mut self, block: u32, scope_id: u32, parent: Option<(u32, u32)>) {
        if let Some(plan) = self.blocks.get_mut(&block) {
            plan.scopes.entry(scope_id).or_insert_with(|| ScopePlan {
                id: scope_id,
                parent,
                values: IndexMap::new(),
                record: None,
            });
        }
    }

    pub fn scope_has_value(&self, block: u32, scope: u32, name: &str) -> bool {
        self.blocks
            .get(&block)
            .and_then(|b| b.scopes.get(&scope))
            .is_some_and(|s| s.values.contains_key(name))
    }

    pub fn set_value(&mut self, block: u32, scope: u32, name: &str, value: PlannedValue) {
        if let Some(scope) = self
            .blocks
            .get_mut(&block)
            .and_then(|b| b.scopes.get_mut(&scope))
        {
            scope.values.insert(name.to_string(), value);
        }
    }

    /// Registers a function instance. A second instance of the same def in
    /// the same scope turns the def virtual (emitted as a zero-argument
    /// child arrow so each call yields a distinct closure).
    pub fn register_instance(
        &mut self,
        def: DefId,
        innermost: Option<(u32, u32)>,
        record: RecordId,
    ) {
        self.instances
            .entry((def, innermost))
            .or_default()
            .push(record);
        if let Some((block, _)) = innermost {
            if let Some(plan) = self.blocks.get_mut(&block) {
                plan.defs.insert(def);
            }
        }
    }

    fn is_virtual(&self, def: DefId) -> bool {
        self.instances
            .iter()
            .any(|((d, scope), rids)| *d == def && scope.is_some() && rids.len() > 1)
    }
}

/// Per-block factory layout shared between node construction and scope
/// emission.
#[derive(Debug, Clone)]
struct FactoryLayout {
    /// Defs in emission order.
    defs: Vec<DefId>,
    /// Params in emission order, final (possibly renamed) spelling.
    params: Vec<(String, String)>,
    /// Params patched through injectors, by original name → element index.
    injectors: IndexMap<String, usize>,
    /// Child block ids by element index.
    children: Vec<(u32, usize)>,
    singular: bool,
}

/// Runs after tracing: computes factory layouts, emits factory / scope /
/// function-instance records and rewrites every pending placeholder node.
pub fn finalize(s: &mut Serializer<'_>) -> SerializeResult<()> {
    // Defs with no captured scopes: every instance is the def node itself.
    let rootless: Vec<(DefId, Vec<RecordId>)> = s
        .planner
        .instances
        .iter()
        .filter(|((_, scope), _)| scope.is_none())
        .map(|((def, _), rids)| (*def, rids.clone()))
        .collect();
    for (def_id, rids) in rootless {
        for rid in rids {
            let node = instance_node(s.defs.get(def_id), &HashMap::new());
            s.records.set_node(rid, node);
        }
    }

    // Emit each root block chain.
    let children = children_index(&s.planner);
    let roots: Vec<u32> = s
        .planner
        .blocks
        .values()
        .filter(|b| match b.parent {
            None => true,
            Some(parent) => !s.planner.blocks.contains_key(&parent),
        })
        .map(|b| b.id)
        .collect();
    let mut layouts: HashMap<u32, FactoryLayout> = HashMap::new();
    for root in &roots {
        compute_layouts(s, *root, &children, &mut layouts);
    }
    for root in roots {
        if flattenable(s, root, &children) {
            emit_flattened_root(s, root, &children, &layouts)?;
        } else {
            emit_factory_root(s, root, &children, &layouts)?;
        }
    }
    Ok(())
}

fn children_index(planner: &Planner) -> HashMap<u32, Vec<u32>> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for block in planner.blocks.values() {
        if let Some(parent) = block.parent {
            if planner.blocks.contains_key(&parent) {
                children.entry(parent).or_default().push(block.id);
            }
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }
    children
}

fn compute_layouts(
    s: &Serializer<'_>,
    block_id: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &mut HashMap<u32, FactoryLayout>,
) {
    let block = &s.planner.blocks[&block_id];
    let defs: Vec<DefId> = block.defs.iter().copied().collect();

    // Final param spellings: originals survive except instrumenter temps,
    // which read as `super$N` in output. Frozen blocks keep everything.
    let mut super_counter = 0usize;
    let params: Vec<(String, String)> = block
        .params
        .iter()
        .map(|name| {
            let final_name = if !block.frozen && is_injected_temp(name) {
                let renamed = format!("super${super_counter}");
                super_counter += 1;
                renamed
            } else {
                name.clone()
            };
            (name.clone(), final_name)
        })
        .collect();

    // Injectors for params that arrive circular in any scope.
    let mut injector_names: IndexSet<String> = IndexSet::new();
    for scope in block.scopes.values() {
        for (name, value) in &scope.values {
            if value.is_circular {
                injector_names.insert(name.clone());
            }
        }
    }

    let kids: Vec<u32> = children.get(&block_id).cloned().unwrap_or_default();
    let any_virtual = defs.iter().any(|d| s.planner.is_virtual(*d));
    let singular = defs.len() == 1
        && injector_names.is_empty()
        && kids.is_empty()
        && !any_virtual;

    let mut index = defs.len();
    let mut injectors = IndexMap::new();
    for name in injector_names {
        injectors.insert(name, index);
        index += 1;
    }
    let mut child_entries = Vec::new();
    for kid in &kids {
        child_entries.push((*kid, index));
        index += 1;
    }

    layouts.insert(
        block_id,
        FactoryLayout {
            defs,
            params,
            injectors,
            children: child_entries,
            singular,
        },
    );
    for kid in kids {
        compute_layouts(s, kid, children, layouts);
    }
}

fn is_injected_temp(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(crate::instrument::IDENT_BASE) else {
        return false;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && rest[digits.len()..].starts_with('_')
}

/// A root scope flattens when it was instantiated once, no function
/// reassigns its captured vars, and no direct eval froze its names.
fn flattenable(s: &Serializer<'_>, root: u32, _children: &HashMap<u32, Vec<u32>>) -> bool {
    let block = &s.planner.blocks[&root];
    if block.frozen || block.scopes.len() != 1 {
        return false;
    }
    for (def_id, _) in s.planner.instances.keys() {
        let def = s.defs.get(*def_id);
        if !def.info.scopes.iter().any(|m| m.block_id == root) {
            continue;
        }
        if def
            .writes_external
            .iter()
            .any(|name| block.params.contains(name))
        {
            return false;
        }
    }
    true
}

/// Rename map from a def's whole scope chain: original captured names to
/// final param spellings (or to record placeholders in flattened roots).
fn chain_renames(
    s: &Serializer<'_>,
    def: &FunctionDef,
    layouts: &HashMap<u32, FactoryLayout>,
    flattened: &HashMap<u32, HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut rename = HashMap::new();
    for meta in &def.info.scopes {
        if let Some(map) = flattened.get(&meta.block_id) {
            rename.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else if let Some(layout) = layouts.get(&meta.block_id) {
            for (original, final_name) in &layout.params {
                if original != final_name {
                    rename.insert(original.clone(), final_name.clone());
                }
            }
        }
    }
    rename
}

/// Builds the emitted expression for one function instance of a def.
fn instance_node(def: &FunctionDef, rename: &HashMap<String, String>) -> Expression {
    let mut node = def.node.clone();
    rename_free_vars(&mut node, rename);
    match &def.method_wrap {
        Some(MethodWrap { key, kind }) => wrap_method(node, key, *kind),
        None => node,
    }
}

/// `({ m(){…} }).m` or the descriptor access for accessors, so the
/// emitted value is a real method with its home object.
fn wrap_method(node: Expression, key: &str, kind: PropertyKind) -> Expression {
    let property = ObjectMember::Property {
        key: PropertyKey::Identifier(key.to_string()),
        value: node,
        kind,
        method: kind == PropertyKind::Init,
        shorthand: false,
    };
    let object = Expression::ObjectExpression {
        properties: vec![property],
    };
    match kind {
        PropertyKind::Init => member(object, key.to_string()),
        PropertyKind::Get | PropertyKind::Set => {
            let descriptor = method_call(
                ident("Object"),
                "getOwnPropertyDescriptor",
                vec![object, string_lit(key.to_string())],
            );
            member(descriptor, if kind == PropertyKind::Get { "get" } else { "set" })
        }
    }
}

/// Emits a flattened root: values are standalone records, functions are
/// top-level expressions with captured names rewritten to placeholders.
fn emit_flattened_root(
    s: &mut Serializer<'_>,
    root: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
) -> SerializeResult<()> {
    let (scope_id, value_map): (u32, HashMap<String, PlannedValue>) = {
        let block = &s.planner.blocks[&root];
        let (id, scope) = block
            .scopes
            .first()
            .ok_or_else(|| SerializeError::InternalAssertion {
                message: "flattened root with no scope".to_string(),
            })?;
        (
            *id,
            scope
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    };

    let rename: HashMap<String, String> = value_map
        .iter()
        .map(|(name, value)| {
            (
                name.clone(),
                crate::util::record_placeholder(value.record),
            )
        })
        .collect();
    let mut flattened = HashMap::new();
    flattened.insert(root, rename.clone());

    // Function instances of the root block.
    let defs: Vec<DefId> = s.planner.blocks[&root].defs.iter().copied().collect();
    for def_id in defs {
        let rids = s
            .planner
            .instances
            .get(&(def_id, Some((root, scope_id))))
            .cloned()
            .unwrap_or_default();
        let chain = chain_renames(s, s.defs.get(def_id), layouts, &flattened);
        for rid in rids {
            let node = instance_node(s.defs.get(def_id), &chain);
            let deps: Vec<RecordId> = s.defs.get(def_id)
                .info
                .scopes
                .iter()
                .filter(|m| m.block_id == root)
                .flat_map(|m| m.var_names.iter())
                .filter_map(|name| value_map.get(name).map(|v| v.record))
                .collect();
            for dep in deps {
                s.records.add_dependency(rid, dep);
            }
            s.records.set_node(rid, node);
        }
    }

    // Child factories become standalone records whose free root vars are
    // the same placeholders.
    for kid in children.get(&root).cloned().unwrap_or_default() {
        let factory = s.records.create(None, &factory_hint(s, kid));
        let mut node = factory_node(s, kid, children, layouts)?;
        rename_free_vars(&mut node, &rename);
        for value in value_map.values() {
            s.records.add_dependency(factory, value.record);
        }
        s.records.set_node(factory, node);
        s.records.get_mut(factory).no_inline = true;
        emit_block_scopes(s, kid, children, layouts, FactorySource::Record(factory))?;
    }
    Ok(())
}

fn factory_hint(s: &Serializer<'_>, block_id: u32) -> String {
    match &s.planner.blocks[&block_id].name {
        Some(name) => format!("createScope{}", crate::util::sanitize_name(name)),
        None => "createScope".to_string(),
    }
}

/// Emits a non-flattened root block: a factory record plus its scopes.
fn emit_factory_root(
    s: &mut Serializer<'_>,
    root: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
) -> SerializeResult<()> {
    let factory = s.records.create(None, &factory_hint(s, root));
    let node = factory_node(s, root, children, layouts)?;
    s.records.set_node(factory, node);
    s.records.get_mut(factory).no_inline = true;
    emit_block_scopes(s, root, children, layouts, FactorySource::Record(factory))
}

/// Builds `(p1, p2, …) => [defs…, injectors…, child arrows…]` (or the
/// collapsed arrow for singular blocks).
fn factory_node(
    s: &Serializer<'_>,
    block_id: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
) -> SerializeResult<Expression> {
    let layout = layouts
        .get(&block_id)
        .ok_or_else(|| SerializeError::InternalAssertion {
            message: format!("no layout for block {block_id}"),
        })?;
    let params: Vec<Pattern> = layout
        .params
        .iter()
        .map(|(_, final_name)| ident_pattern(final_name.clone()))
        .collect();
    let param_rename: HashMap<String, String> = layout
        .params
        .iter()
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (a.clone(), b.clone()))
        .collect();

    let mut elements = Vec::new();
    for def_id in &layout.defs {
        let def = s.defs.get(*def_id);
        let mut node = instance_node(def, &param_rename);
        if s.planner.is_virtual(*def_id) {
            node = arrow(vec![], node);
        }
        elements.push(node);
    }
    if layout.singular {
        let node = elements
            .into_iter()
            .next()
            .ok_or_else(|| SerializeError::InternalAssertion {
                message: "singular block without a def".to_string(),
            })?;
        return Ok(arrow_body_wrap(params, node));
    }

    for (name, _) in &layout.injectors {
        let final_name = layout
            .params
            .iter()
            .find(|(original, _)| original == name)
            .map(|(_, f)| f.clone())
            .unwrap_or_else(|| name.clone());
        // x => (name = x)
        elements.push(arrow(
            vec![ident_pattern("v")],
            assign_expr(
                AssignmentTarget::Identifier(Identifier::new(final_name)),
                ident("v"),
            ),
        ));
    }
    for (kid, _) in &layout.children {
        elements.push(factory_node(s, *kid, children, layouts)?);
    }
    Ok(arrow_body_wrap(params, array_expr(elements)))
}

fn arrow_body_wrap(params: Vec<Pattern>, body: Expression) -> Expression {
    Expression::ArrowFunctionExpression(ArrowNode {
        params,
        body: ArrowBody::Expression(Box::new(body)),
        is_async: false,
        body_comment: None,
    })
}

enum FactorySource {
    /// Standalone factory record (root blocks, flattened-root children).
    Record(RecordId),
    /// Element of the parent scope's array.
    Parent { scope_record: RecordId, index: usize },
}

/// Emits scope records and function-instance nodes for every scope of a
/// block, then recurses into child blocks per scope.
fn emit_block_scopes(
    s: &mut Serializer<'_>,
    block_id: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
    source: FactorySource,
) -> SerializeResult<()> {
    let scope_ids: Vec<u32> = s.planner.blocks[&block_id].scopes.keys().copied().collect();
    emit_selected_scopes(s, block_id, children, layouts, source, &scope_ids)
}

/// Emits only the scopes of `block` whose parent is `parent_scope`.
fn emit_child_scopes(
    s: &mut Serializer<'_>,
    block_id: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
    parent_record: RecordId,
    parent_index: usize,
    parent_scope: (u32, u32),
) -> SerializeResult<()> {
    let matching: Vec<u32> = s.planner.blocks[&block_id]
        .scopes
        .values()
        .filter(|scope| scope.parent == Some(parent_scope))
        .map(|scope| scope.id)
        .collect();
    if matching.is_empty() {
        return Ok(());
    }
    emit_selected_scopes(
        s,
        block_id,
        children,
        layouts,
        FactorySource::Parent {
            scope_record: parent_record,
            index: parent_index,
        },
        &matching,
    )
}

fn emit_selected_scopes(
    s: &mut Serializer<'_>,
    block_id: u32,
    children: &HashMap<u32, Vec<u32>>,
    layouts: &HashMap<u32, FactoryLayout>,
    source: FactorySource,
    scope_ids: &[u32],
) -> SerializeResult<()> {
    let layout = layouts
        .get(&block_id)
        .cloned()
        .ok_or_else(|| SerializeError::InternalAssertion {
            message: format!("no layout for block {block_id}"),
        })?;

    for &scope_id in scope_ids {
        let values: Vec<(String, Option<PlannedValue>)> = {
            let scope = &s.planner.blocks[&block_id].scopes[&scope_id];
            layout
                .params
                .iter()
                .map(|(original, _)| (original.clone(), scope.values.get(original).cloned()))
                .collect()
        };
        let (factory_expr, factory_dep) = match &source {
            FactorySource::Record(rid) => (Records::placeholder(*rid), *rid),
            FactorySource::Parent { scope_record, index } => (
                member_computed(
                    Records::placeholder(*scope_record),
                    number_lit(*index as f64),
                ),
                *scope_record,
            ),
        };
        let mut args = Vec::with_capacity(values.len());
        let mut deps = vec![factory_dep];
        let mut injections: Vec<(String, RecordId)> = Vec::new();
        for (name, value) in &values {
            match value {
                Some(value) if value.is_circular => {
                    args.push(number_lit(0.0));
                    injections.push((name.clone(), value.record));
                }
                Some(value) => {
                    args.push(Records::placeholder(value.record));
                    deps.push(value.record);
                }
                None => args.push(ident("undefined")),
            }
        }
        let scope_call = call(factory_expr.clone(), args);

        if layout.singular {
            let def_id = layout.defs[0];
            let rids = s
                .planner
                .instances
                .get(&(def_id, Some((block_id, scope_id))))
                .cloned()
                .unwrap_or_default();
            for rid in rids {
                for dep in &deps {
                    s.records.add_dependency(rid, *dep);
                }
                s.records.set_node(rid, scope_call.clone());
            }
            continue;
        }

        let scope_rid = s.records.create(None, "scope");
        for dep in &deps {
            s.records.add_dependency(scope_rid, *dep);
        }
        s.records.set_node(scope_rid, scope_call);
        s.records.get_mut(scope_rid).no_inline = true;
        if let Some(plan) = s
            .planner
            .blocks
            .get_mut(&block_id)
            .and_then(|b| b.scopes.get_mut(&scope_id))
        {
            plan.record = Some(scope_rid);
        }
        for (name, value_rid) in injections {
            let index = layout.injectors.get(&name).copied().ok_or_else(|| {
                SerializeError::InternalAssertion {
                    message: format!("no injector for circular scope var {name}"),
                }
            })?;
            let stmt = expr_stmt(call(
                member_computed(
                    Records::placeholder(scope_rid),
                    number_lit(index as f64),
                ),
                vec![Records::placeholder(value_rid)],
            ));
            s.records.add_assignment(scope_rid, stmt, vec![value_rid]);
        }
        for (position, def_id) in layout.defs.iter().enumerate() {
            let rids = s
                .planner
                .instances
                .get(&(*def_id, Some((block_id, scope_id))))
                .cloned()
                .unwrap_or_default();
            let is_virtual = s.planner.is_virtual(*def_id);
            for rid in rids {
                let access = member_computed(
                    Records::placeholder(scope_rid),
                    number_lit(position as f64),
                );
                let node = if is_virtual {
                    call(access, vec![])
                } else {
                    access
                };
                s.records.add_dependency(rid, scope_rid);
                s.records.set_node(rid, node);
            }
        }
        for (kid, index) in &layout.children {
            emit_child_scopes(
                s,
                *kid,
                children,
                layouts,
                scope_rid,
                *index,
                (block_id, scope_id),
            )?;
        }
    }
    Ok(())
}
