//! # Value Tracer
//!
//! Walks the live value graph, creating one record per distinct value and
//! resolving primitives, arrays, plain objects, buffers, typed arrays,
//! symbols, dates, regexes, boxed primitives, sets, maps and functions.
//! Cycles surface as the circular sentinel and become post-construction
//! assignments on the record under construction.

use std::collections::{HashMap, HashSet};

use base64::Engine;

use crate::ast::*;
use crate::heap::{
    HeapObject, ObjectId, ObjectKind, PropertyDescriptor, PropertyName, Prototype, Value,
};
use crate::runtime::Instance;
use crate::serializer::blocks::Planner;
use crate::serializer::function::{self, Defs};
use crate::serializer::output;
use crate::serializer::record::{RecordId, Records};
use crate::serializer::{SerializeError, SerializeOptions, SerializeResult};

/// Result of tracing one value.
#[derive(Debug, Clone)]
pub enum Traced {
    /// Primitive; inlined directly with no record.
    Inline(Expression),
    /// Completed record.
    Rec(RecordId),
    /// Record still under construction; the slot must become an
    /// assignment.
    Circular(RecordId),
}

pub struct Serializer<'i> {
    pub instance: &'i mut Instance,
    pub options: SerializeOptions,
    pub records: Records,
    pub defs: Defs,
    pub planner: Planner,
    trace_stack: Vec<String>,
    /// prototype object → owning constructor function.
    pub prototype_owner: HashMap<ObjectId, ObjectId>,
    /// prototype / class objects whose listed keys are produced by class
    /// emission and must not be re-serialized.
    pub emitted_keys: HashMap<ObjectId, HashSet<PropertyName>>,
    /// Built-in module records (`require("util")` / `import * as ...`).
    module_records: HashMap<String, RecordId>,
    create_binding_record: Option<RecordId>,
    /// Root global keys referenced by records; final names must not
    /// shadow them.
    pub global_keys_used: HashSet<String>,
}

impl<'i> Serializer<'i> {
    pub fn new(instance: &'i mut Instance, options: SerializeOptions) -> Self {
        Self {
            instance,
            options,
            records: Records::new(),
            defs: Defs::new(),
            planner: Planner::new(),
            trace_stack: vec!["<root>".to_string()],
            prototype_owner: HashMap::new(),
            emitted_keys: HashMap::new(),
            module_records: HashMap::new(),
            create_binding_record: None,
            global_keys_used: HashSet::new(),
        }
    }

    pub fn run(&mut self, value: &Value) -> SerializeResult<String> {
        let traced = self.serialize_value(value, "exports")?;
        crate::serializer::blocks::finalize(self)?;
        output::assemble(self, traced)
    }

    pub fn trace_string(&self) -> String {
        self.trace_stack.concat()
    }

    pub fn push_trace(&mut self, segment: String) {
        self.trace_stack.push(segment);
    }

    pub fn pop_trace(&mut self) {
        self.trace_stack.pop();
    }

    pub fn unsupported(&self, reason: impl Into<String>) -> SerializeError {
        SerializeError::UnsupportedValue {
            reason: reason.into(),
            trace: self.trace_string(),
        }
    }

    /// Entry contract of the tracer: primitives resolve to literal nodes,
    /// everything else to a record.
    pub fn serialize_value(&mut self, value: &Value, name_hint: &str) -> SerializeResult<Traced> {
        Ok(match value {
            Value::Undefined => Traced::Inline(ident("undefined")),
            Value::Null => Traced::Inline(null_lit()),
            Value::Bool(b) => Traced::Inline(bool_lit(*b)),
            Value::Number(n) => Traced::Inline(number_lit(*n)),
            Value::BigInt(digits) => {
                Traced::Inline(Expression::Literal(Literal::BigInt(digits.clone())))
            }
            Value::Str(s) => Traced::Inline(string_lit(s.clone())),
            Value::Object(id) => self.serialize_object(*id, name_hint)?,
        })
    }

    fn serialize_object(&mut self, id: ObjectId, name_hint: &str) -> SerializeResult<Traced> {
        if let Some(rid) = self.records.lookup(id) {
            return Ok(if self.records.in_progress(rid) {
                Traced::Circular(rid)
            } else {
                Traced::Rec(rid)
            });
        }

        // Globals serialize as references, never structurally.
        if self.instance.global_entry(id).is_some() {
            return self.global_reference(id, name_hint);
        }

        // `ctorFn.prototype` keeps constructor identity.
        if let Some(owner) = self.prototype_owner.get(&id).copied() {
            return self.prototype_reference(id, owner);
        }
        if let Some(owner) = self.detect_prototype(id) {
            return self.prototype_reference(id, owner);
        }

        let object = self.instance.heap.object(id).clone();
        match &object.kind {
            ObjectKind::Function(_) => function::serialize_function(self, id, name_hint),
            ObjectKind::Symbol {
                description,
                global_key,
                well_known,
            } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = if let Some(name) = well_known {
                    member(ident("Symbol"), name.clone())
                } else if let Some(key) = global_key {
                    method_call(ident("Symbol"), "for", vec![string_lit(key.clone())])
                } else {
                    let args = match description {
                        Some(d) => vec![string_lit(d.clone())],
                        None => vec![],
                    };
                    call(ident("Symbol"), args)
                };
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Plain => {
                let rid = self.records.create(Some(id), name_hint);
                let node = self.plain_object_node(rid, id, &object)?;
                self.records.set_node(rid, node);
                self.integrity_assignment(rid, &object);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Array { length } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = self.array_node(rid, id, &object, *length)?;
                self.records.set_node(rid, node);
                self.integrity_assignment(rid, &object);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Date { timestamp_ms } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(ident("Date"), vec![number_lit(*timestamp_ms)]);
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |_, _| false)?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::RegExp { pattern, flags } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = Expression::Literal(Literal::RegExp {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                });
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |name, _| {
                    matches!(name, PropertyName::Str(s) if s == "lastIndex")
                })?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Error { kind, message } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(
                    ident(kind.constructor_name()),
                    vec![string_lit(message.clone())],
                );
                self.records.set_node(rid, node);
                let expected_message = message.clone();
                self.attach_extra_props(rid, &object, move |name, desc| {
                    matches!(
                        (name, desc.value.as_ref()),
                        (PropertyName::Str(s), Some(Value::Str(m)))
                            if s == "message" && *m == expected_message
                    )
                })?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Map { entries } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = self.collection_node(rid, "Map", entries, name_hint)?;
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |_, _| false)?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Set { entries } => {
                let entries: Vec<(Value, Value)> = entries
                    .iter()
                    .map(|v| (v.clone(), Value::Undefined))
                    .collect();
                let rid = self.records.create(Some(id), name_hint);
                let node = self.collection_node(rid, "Set", &entries, name_hint)?;
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |_, _| false)?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::WeakMap { .. } => {
                let Some(entries) = self.instance.weak_map_entries(id).map(<[_]>::to_vec) else {
                    return Err(self.unsupported(
                        "WeakMap contents are not observable without the weak-collection shim",
                    ));
                };
                let rid = self.records.create(Some(id), name_hint);
                let node = self.collection_node(rid, "WeakMap", &entries, name_hint)?;
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::WeakSet { .. } => {
                let Some(entries) = self.instance.weak_set_entries(id).map(<[_]>::to_vec) else {
                    return Err(self.unsupported(
                        "WeakSet contents are not observable without the weak-collection shim",
                    ));
                };
                let entries: Vec<(Value, Value)> = entries
                    .into_iter()
                    .map(|v| (v, Value::Undefined))
                    .collect();
                let rid = self.records.create(Some(id), name_hint);
                let node = self.collection_node(rid, "WeakSet", &entries, name_hint)?;
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::ArrayBuffer { bytes } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = if bytes.iter().all(|&b| b == 0) {
                    new_expr(ident("ArrayBuffer"), vec![number_lit(bytes.len() as f64)])
                } else {
                    member(
                        new_expr(
                            ident("Uint8Array"),
                            vec![array_expr(
                                bytes.iter().map(|&b| number_lit(b as f64)).collect(),
                            )],
                        ),
                        "buffer",
                    )
                };
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::SharedArrayBuffer { .. } => {
                Err(self.unsupported("SharedArrayBuffer cannot be reconstructed from source"))
            }
            ObjectKind::TypedArray { kind, elements } => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(
                    ident(kind.constructor_name()),
                    vec![array_expr(elements.iter().map(|&n| number_lit(n)).collect())],
                );
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |name, _| {
                    matches!(name, PropertyName::Str(s) if s.parse::<u32>().is_ok())
                })?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Buffer { bytes } => {
                let rid = self.records.create(Some(id), name_hint);
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                let node = method_call(
                    ident("Buffer"),
                    "from",
                    vec![string_lit(encoded), string_lit("base64")],
                );
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |name, _| {
                    matches!(name, PropertyName::Str(s) if s.parse::<u32>().is_ok())
                })?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::BoxedString(s) => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(ident("String"), vec![string_lit(s.clone())]);
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |name, _| {
                    matches!(name, PropertyName::Str(k) if k == "length" || k.parse::<u32>().is_ok())
                })?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::BoxedNumber(n) => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(ident("Number"), vec![number_lit(*n)]);
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |_, _| false)?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::BoxedBoolean(b) => {
                let rid = self.records.create(Some(id), name_hint);
                let node = new_expr(ident("Boolean"), vec![bool_lit(*b)]);
                self.records.set_node(rid, node);
                self.attach_extra_props(rid, &object, |_, _| false)?;
                Ok(Traced::Rec(rid))
            }
            ObjectKind::BoxedBigInt(digits) => {
                let rid = self.records.create(Some(id), name_hint);
                let node = call(
                    ident("Object"),
                    vec![Expression::Literal(Literal::BigInt(digits.clone()))],
                );
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::BoxedSymbol(symbol) => {
                let rid = self.records.create(Some(id), name_hint);
                let (symbol_expr, deps) =
                    self.expr_for_value(&Value::Object(*symbol), "symbol", rid)?;
                let node = call(ident("Object"), vec![symbol_expr]);
                for dep in deps {
                    self.records.add_dependency(rid, dep);
                }
                self.records.set_node(rid, node);
                Ok(Traced::Rec(rid))
            }
            ObjectKind::Promise => {
                Err(self.unsupported(
                    "pending Promise; use splitAsync to serialize asynchronous boundaries",
                ))
            }
        }
    }

    /// Reference into the globals catalogue: `Object.assign`,
    /// `require("util").promisify`, …
    fn global_reference(&mut self, id: ObjectId, name_hint: &str) -> SerializeResult<Traced> {
        let entry = self
            .instance
            .global_entry(id)
            .cloned()
            .ok_or_else(|| SerializeError::InternalAssertion {
                message: "global entry vanished during trace".to_string(),
            })?;
        if entry.parent.is_none() && entry.is_module {
            return Ok(Traced::Rec(self.module_record(&entry.key)));
        }
        let rid = self.records.create(Some(id), name_hint);
        let node = match entry.parent {
            None => {
                self.global_keys_used.insert(entry.key.clone());
                ident(entry.key.clone())
            }
            Some(parent) => {
                let (parent_expr, deps) = self.expr_for_value(&parent, "parent", rid)?;
                for dep in deps {
                    self.records.add_dependency(rid, dep);
                }
                if crate::util::is_identifier_name(&entry.key) {
                    member(parent_expr, entry.key.clone())
                } else {
                    member_computed(parent_expr, string_lit(entry.key.clone()))
                }
            }
        };
        self.records.set_node(rid, node);
        Ok(Traced::Rec(rid))
    }

    /// Record for a built-in module's exports object.
    pub fn module_record(&mut self, name: &str) -> RecordId {
        if let Some(&rid) = self.module_records.get(name) {
            return rid;
        }
        let rid = self.records.create(None, name);
        let esm = matches!(
            self.options.format,
            crate::serializer::OutputFormat::Esm
        );
        if esm {
            self.records.get_mut(rid).import =
                Some(crate::serializer::record::ImportSpec {
                    source: name.to_string(),
                });
            // Node is unused for import records, but must be present so the
            // record counts as constructed.
            self.records.set_node(rid, ident("undefined"));
        } else {
            let node = call(ident("require"), vec![string_lit(name.to_string())]);
            self.records.set_node(rid, node);
        }
        self.records.get_mut(rid).no_inline = esm;
        rid
    }

    /// Lazily emitted `createBinding` helper for cyclic bound functions:
    /// returns a `[holder, setter]` pair.
    pub fn create_binding_record(&mut self) -> RecordId {
        if let Some(rid) = self.create_binding_record {
            return rid;
        }
        let rid = self.records.create(None, "createBinding");
        // () => { let f; return [(...args) => f(...args), v => f = v]; }
        let holder = arrow(
            vec![Pattern::RestElement {
                argument: Box::new(ident_pattern("args")),
            }],
            call(
                ident("f"),
                vec![Expression::SpreadElement {
                    argument: Box::new(ident("args")),
                }],
            ),
        );
        let setter = arrow(
            vec![ident_pattern("v")],
            assign_expr(
                AssignmentTarget::Identifier(Identifier::new("f")),
                ident("v"),
            ),
        );
        let body = vec![
            Statement::VariableDeclaration {
                kind: DeclarationKind::Let,
                declarations: vec![VariableDeclarator {
                    id: ident_pattern("f"),
                    init: None,
                }],
            },
            Statement::ReturnStatement {
                argument: Some(array_expr(vec![holder, setter])),
            },
        ];
        self.records.set_node(rid, arrow_block(vec![], body));
        self.records.get_mut(rid).no_inline = true;
        self.create_binding_record = Some(rid);
        rid
    }

    fn prototype_reference(&mut self, id: ObjectId, owner: ObjectId) -> SerializeResult<Traced> {
        let owner_traced = self.serialize_object(owner, "ctor")?;
        let rid = self.records.create(Some(id), "prototype");
        let owner_rid = match owner_traced {
            Traced::Rec(owner_rid) | Traced::Circular(owner_rid) => owner_rid,
            Traced::Inline(_) => {
                return Err(SerializeError::InternalAssertion {
                    message: "constructor traced to a primitive".to_string(),
                })
            }
        };
        self.records.add_dependency(rid, owner_rid);
        self.records
            .set_node(rid, member(Records::placeholder(owner_rid), "prototype"));
        self.prototype_owner.insert(id, owner);

        // Properties the class/function emission does not cover are
        // restored through assignments on this record.
        let object = self.instance.heap.object(id).clone();
        let emitted = self.emitted_keys.get(&id).cloned().unwrap_or_default();
        self.attach_extra_props(rid, &object, move |name, _| {
            matches!(name, PropertyName::Str(s) if s == "constructor") || emitted.contains(name)
        })?;
        Ok(Traced::Rec(rid))
    }

    /// An object is a function's `.prototype` when its own `constructor`
    /// property points at a function whose `prototype` is this object.
    fn detect_prototype(&self, id: ObjectId) -> Option<ObjectId> {
        let object = self.instance.heap.object(id);
        if !matches!(object.kind, ObjectKind::Plain) {
            return None;
        }
        let ctor = object
            .properties
            .get(&PropertyName::str("constructor"))?
            .value
            .as_ref()?
            .object_id()?;
        let ctor_object = self.instance.heap.object(ctor);
        ctor_object.function_data()?;
        let proto = ctor_object
            .properties
            .get(&PropertyName::str("prototype"))?
            .value
            .as_ref()?
            .object_id()?;
        (proto == id).then_some(ctor)
    }

    /// Expression for a value in a slot of `owner`'s node, reporting
    /// dependencies. Circular values surface as `Err(rid)`-like marker via
    /// the bool.
    fn expr_for_value(
        &mut self,
        value: &Value,
        hint: &str,
        _owner: RecordId,
    ) -> SerializeResult<(Expression, Vec<RecordId>)> {
        match self.serialize_value(value, hint)? {
            Traced::Inline(expr) => Ok((expr, vec![])),
            Traced::Rec(rid) | Traced::Circular(rid) => {
                Ok((Records::placeholder(rid), vec![rid]))
            }
        }
    }

    /// Like [`expr_for_value`] but distinguishes circular results for
    /// node-construction contexts.
    fn node_value(
        &mut self,
        value: &Value,
        hint: &str,
    ) -> SerializeResult<NodeValue> {
        Ok(match self.serialize_value(value, hint)? {
            Traced::Inline(expr) => NodeValue::Ready(expr, None),
            Traced::Rec(rid) => NodeValue::Ready(Records::placeholder(rid), Some(rid)),
            Traced::Circular(rid) => NodeValue::Circular(rid),
        })
    }

    fn plain_object_node(
        &mut self,
        rid: RecordId,
        id: ObjectId,
        object: &HeapObject,
    ) -> SerializeResult<Expression> {
        let emitted = self.emitted_keys.get(&id).cloned().unwrap_or_default();
        let proto = self.proto_expr(rid, object)?;

        let mut phase = Phase::Literal;
        let mut literal = Vec::new();
        let mut defines: Vec<ObjectMember> = Vec::new();

        for (name, desc) in &object.properties {
            if emitted.contains(name) {
                continue;
            }
            let trace_segment = match name {
                PropertyName::Str(s) => format!(".{s}"),
                PropertyName::Symbol(_) => "[symbol]".to_string(),
            };
            self.push_trace(trace_segment);
            let result = self.place_property(rid, name, desc, &mut phase, &mut literal, &mut defines);
            self.pop_trace();
            result?;
        }

        let mut node = Expression::ObjectExpression { properties: literal };
        match proto {
            ProtoExpr::Default => {}
            ProtoExpr::Explicit(proto_expr) => {
                let create = call(
                    member(ident("Object"), "create"),
                    vec![proto_expr],
                );
                node = if matches!(&node, Expression::ObjectExpression { properties } if properties.is_empty())
                {
                    create
                } else {
                    method_call(ident("Object"), "assign", vec![create, node])
                };
            }
            ProtoExpr::CircularPatch => {}
        }
        if !defines.is_empty() {
            node = method_call(
                ident("Object"),
                "defineProperties",
                vec![node, Expression::ObjectExpression { properties: defines }],
            );
        }
        Ok(node)
    }

    /// Places one property into the literal, defineProperties object or an
    /// assignment, advancing the phase so insertion order survives.
    fn place_property(
        &mut self,
        rid: RecordId,
        name: &PropertyName,
        desc: &PropertyDescriptor,
        phase: &mut Phase,
        literal: &mut Vec<ObjectMember>,
        defines: &mut Vec<ObjectMember>,
    ) -> SerializeResult<()> {
        if *phase == Phase::Assign {
            return self.prop_assignment(rid, name, desc);
        }
        if desc.is_default_data() {
            let value = desc.value.clone().unwrap_or(Value::Undefined);
            match self.node_value(&value, &property_hint(name))? {
                NodeValue::Ready(expr, dep) => {
                    if let Some(dep) = dep {
                        self.records.add_dependency(rid, dep);
                    }
                    let key = self.property_key(rid, name)?;
                    if *phase == Phase::Literal {
                        literal.push(ObjectMember::Property {
                            key,
                            value: expr,
                            kind: PropertyKind::Init,
                            method: false,
                            shorthand: false,
                        });
                    } else {
                        // Define phase: spell the full default descriptor
                        // so key order is kept.
                        defines.push(descriptor_member(key, full_data_descriptor(expr)));
                    }
                    Ok(())
                }
                NodeValue::Circular(_) => {
                    *phase = Phase::Assign;
                    self.prop_assignment(rid, name, desc)
                }
            }
        } else {
            // Non-default descriptor: move to defineProperties.
            *phase = Phase::Define;
            match self.descriptor_object(rid, desc)? {
                Some(descriptor) => {
                    let key = self.property_key(rid, name)?;
                    defines.push(descriptor_member(key, descriptor));
                    Ok(())
                }
                None => {
                    *phase = Phase::Assign;
                    self.prop_assignment(rid, name, desc)
                }
            }
        }
    }

    /// Builds a descriptor object literal, or `None` when some part is
    /// circular and the whole property must be assigned later.
    fn descriptor_object(
        &mut self,
        rid: RecordId,
        desc: &PropertyDescriptor,
    ) -> SerializeResult<Option<Expression>> {
        let mut fields = Vec::new();
        if desc.is_accessor() {
            for (slot, value) in [("get", &desc.get), ("set", &desc.set)] {
                if let Some(value) = value {
                    match self.node_value(value, slot)? {
                        NodeValue::Ready(expr, dep) => {
                            if let Some(dep) = dep {
                                self.records.add_dependency(rid, dep);
                            }
                            fields.push(plain_property(slot, expr));
                        }
                        NodeValue::Circular(_) => return Ok(None),
                    }
                }
            }
        } else {
            let value = desc.value.clone().unwrap_or(Value::Undefined);
            match self.node_value(&value, "value")? {
                NodeValue::Ready(expr, dep) => {
                    if let Some(dep) = dep {
                        self.records.add_dependency(rid, dep);
                    }
                    fields.push(plain_property("value", expr));
                }
                NodeValue::Circular(_) => return Ok(None),
            }
            if desc.writable {
                fields.push(plain_property("writable", bool_lit(true)));
            }
        }
        if desc.enumerable {
            fields.push(plain_property("enumerable", bool_lit(true)));
        }
        if desc.configurable {
            fields.push(plain_property("configurable", bool_lit(true)));
        }
        Ok(Some(Expression::ObjectExpression { properties: fields }))
    }

    /// Key expression for a literal/descriptor position; symbol keys are
    /// computed and add a dependency.
    fn property_key(
        &mut self,
        rid: RecordId,
        name: &PropertyName,
    ) -> SerializeResult<PropertyKey> {
        Ok(match name {
            PropertyName::Str(s) => {
                if crate::util::is_identifier_name(s) {
                    PropertyKey::Identifier(s.clone())
                } else {
                    PropertyKey::String(s.clone())
                }
            }
            PropertyName::Symbol(symbol) => {
                let (expr, deps) =
                    self.expr_for_value(&Value::Object(*symbol), "symbol", rid)?;
                for dep in deps {
                    self.records.add_dependency(rid, dep);
                }
                PropertyKey::Computed(Box::new(expr))
            }
        })
    }

    /// Property restored by a post-construction statement. Circular
    /// references are fine here: assignments run after every declaration.
    pub fn prop_assignment(
        &mut self,
        rid: RecordId,
        name: &PropertyName,
        desc: &PropertyDescriptor,
    ) -> SerializeResult<()> {
        let mut deps = Vec::new();
        let target = Records::placeholder(rid);
        let key = match name {
            PropertyName::Str(s) => {
                if crate::util::is_identifier_name(s) {
                    MemberKey::Static(s.clone())
                } else {
                    MemberKey::Computed(Box::new(string_lit(s.clone())))
                }
            }
            PropertyName::Symbol(symbol) => {
                let (expr, d) = self.expr_for_value(&Value::Object(*symbol), "symbol", rid)?;
                deps.extend(d);
                MemberKey::Computed(Box::new(expr))
            }
        };
        let stmt = if desc.is_default_data() {
            let value = desc.value.clone().unwrap_or(Value::Undefined);
            let (value_expr, d) = self.expr_for_value(&value, &property_hint(name), rid)?;
            deps.extend(d);
            expr_stmt(assign_expr(
                AssignmentTarget::Member {
                    object: Box::new(target),
                    property: key,
                    optional: false,
                },
                value_expr,
            ))
        } else {
            let mut fields = Vec::new();
            if desc.is_accessor() {
                for (slot, value) in [("get", &desc.get), ("set", &desc.set)] {
                    if let Some(value) = value {
                        let (expr, d) = self.expr_for_value(value, slot, rid)?;
                        deps.extend(d);
                        fields.push(plain_property(slot, expr));
                    }
                }
            } else {
                let value = desc.value.clone().unwrap_or(Value::Undefined);
                let (expr, d) = self.expr_for_value(&value, "value", rid)?;
                deps.extend(d);
                fields.push(plain_property("value", expr));
                if desc.writable {
                    fields.push(plain_property("writable", bool_lit(true)));
                }
            }
            if desc.enumerable {
                fields.push(plain_property("enumerable", bool_lit(true)));
            }
            if desc.configurable {
                fields.push(plain_property("configurable", bool_lit(true)));
            }
            let key_expr = match key {
                MemberKey::Static(s) => string_lit(s),
                MemberKey::Computed(e) => *e,
                MemberKey::Private(_) => {
                    return Err(self.unsupported("private property in descriptor"))
                }
            };
            expr_stmt(method_call(
                ident("Object"),
                "defineProperty",
                vec![
                    target,
                    key_expr,
                    Expression::ObjectExpression { properties: fields },
                ],
            ))
        };
        self.records.add_assignment(rid, stmt, deps);
        Ok(())
    }

    fn array_node(
        &mut self,
        rid: RecordId,
        _id: ObjectId,
        object: &HeapObject,
        length: u32,
    ) -> SerializeResult<Expression> {
        // Highest present index decides the literal's span; the remainder
        // is restored via `.length`.
        let mut index_props: HashMap<u32, &PropertyDescriptor> = HashMap::new();
        let mut max_index = None;
        let mut extras = Vec::new();
        for (name, desc) in &object.properties {
            match name {
                PropertyName::Str(s) => match s.parse::<u32>() {
                    Ok(index) => {
                        index_props.insert(index, desc);
                        max_index = Some(max_index.map_or(index, |m: u32| m.max(index)));
                    }
                    Err(_) if s == "length" => {}
                    Err(_) => extras.push((name.clone(), desc.clone())),
                },
                PropertyName::Symbol(_) => extras.push((name.clone(), desc.clone())),
            }
        }

        let span = max_index.map_or(0, |m| m + 1);
        let mut elements: Vec<Option<Expression>> = Vec::with_capacity(span as usize);
        for index in 0..span {
            let Some(desc) = index_props.get(&index) else {
                elements.push(None);
                continue;
            };
            self.push_trace(format!("[{index}]"));
            let placed: SerializeResult<Option<Expression>> = (|| {
                if !desc.is_default_data() {
                    self.prop_assignment(rid, &PropertyName::Str(index.to_string()), desc)?;
                    return Ok(None);
                }
                let value = desc.value.clone().unwrap_or(Value::Undefined);
                match self.node_value(&value, &format!("element{index}"))? {
                    NodeValue::Ready(expr, dep) => {
                        if let Some(dep) = dep {
                            self.records.add_dependency(rid, dep);
                        }
                        Ok(Some(expr))
                    }
                    NodeValue::Circular(_) => {
                        self.prop_assignment(rid, &PropertyName::Str(index.to_string()), desc)?;
                        Ok(None)
                    }
                }
            })();
            self.pop_trace();
            elements.push(placed?);
        }

        if length != span {
            let stmt = expr_stmt(assign_expr(
                AssignmentTarget::Member {
                    object: Box::new(Records::placeholder(rid)),
                    property: MemberKey::Static("length".to_string()),
                    optional: false,
                },
                number_lit(length as f64),
            ));
            self.records.add_assignment(rid, stmt, vec![]);
        }
        for (name, desc) in extras {
            self.prop_assignment(rid, &name, &desc)?;
        }
        Ok(Expression::ArrayExpression { elements })
    }

    /// `new Map([[k, v], …])` / `new Set([…])`; entries from the first
    /// circular one onwards become `set`/`add` assignments.
    fn collection_node(
        &mut self,
        rid: RecordId,
        ctor: &str,
        entries: &[(Value, Value)],
        _hint: &str,
    ) -> SerializeResult<Expression> {
        let keyed = matches!(ctor, "Map" | "WeakMap");
        let mut literal_entries = Vec::new();
        let mut assign_from = entries.len();
        for (index, (key, value)) in entries.iter().enumerate() {
            self.push_trace(format!("<entry {index}>"));
            let key_value = self.node_value(&key.clone(), "key")?;
            let value_value = if keyed {
                Some(self.node_value(&value.clone(), "value")?)
            } else {
                None
            };
            self.pop_trace();
            let circular = matches!(key_value, NodeValue::Circular(_))
                || matches!(value_value, Some(NodeValue::Circular(_)));
            if circular {
                assign_from = index;
                break;
            }
            let mut take = |nv: NodeValue| {
                let NodeValue::Ready(expr, dep) = nv else {
                    unreachable!()
                };
                if let Some(dep) = dep {
                    self.records.add_dependency(rid, dep);
                }
                expr
            };
            let key_expr = take(key_value);
            if keyed {
                let value_expr = take(value_value.expect("keyed entry"));
                literal_entries.push(array_expr(vec![key_expr, value_expr]));
            } else {
                literal_entries.push(key_expr);
            }
        }
        for (index, (key, value)) in entries.iter().enumerate().skip(assign_from) {
            self.push_trace(format!("<entry {index}>"));
            let mut deps = Vec::new();
            let (key_expr, d) = self.expr_for_value(&key.clone(), "key", rid)?;
            deps.extend(d);
            let args = if keyed {
                let (value_expr, d) = self.expr_for_value(&value.clone(), "value", rid)?;
                deps.extend(d);
                vec![key_expr, value_expr]
            } else {
                vec![key_expr]
            };
            self.pop_trace();
            let method = if keyed { "set" } else { "add" };
            let stmt = expr_stmt(call(
                Expression::MemberExpression {
                    object: Box::new(Records::placeholder(rid)),
                    property: MemberKey::Static(method.to_string()),
                    optional: false,
                },
                args,
            ));
            self.records.add_assignment(rid, stmt, deps);
        }
        let args = if literal_entries.is_empty() {
            vec![]
        } else {
            vec![array_expr(literal_entries)]
        };
        Ok(new_expr(ident(ctor), args))
    }

    /// Own properties of non-literal kinds (functions, dates, arrays'
    /// named props) are restored through assignments.
    pub fn attach_extra_props(
        &mut self,
        rid: RecordId,
        object: &HeapObject,
        skip: impl Fn(&PropertyName, &PropertyDescriptor) -> bool,
    ) -> SerializeResult<()> {
        let props: Vec<(PropertyName, PropertyDescriptor)> = object
            .properties
            .iter()
            .filter(|(name, desc)| !skip(name, desc))
            .map(|(n, d)| (n.clone(), d.clone()))
            .collect();
        for (name, desc) in props {
            let segment = match &name {
                PropertyName::Str(s) => format!(".{s}"),
                PropertyName::Symbol(_) => "[symbol]".to_string(),
            };
            self.push_trace(segment);
            let result = self.prop_assignment(rid, &name, &desc);
            self.pop_trace();
            result?;
        }
        self.proto_patch(rid, object)?;
        Ok(())
    }

    /// Explicit prototype links on non-plain kinds.
    fn proto_patch(&mut self, rid: RecordId, object: &HeapObject) -> SerializeResult<()> {
        match object.prototype {
            Prototype::Default => Ok(()),
            Prototype::Null => {
                let stmt = expr_stmt(method_call(
                    ident("Object"),
                    "setPrototypeOf",
                    vec![Records::placeholder(rid), null_lit()],
                ));
                self.records.add_assignment(rid, stmt, vec![]);
                Ok(())
            }
            Prototype::Object(proto) => {
                let (proto_expr, deps) =
                    self.expr_for_value(&Value::Object(proto), "proto", rid)?;
                let stmt = expr_stmt(method_call(
                    ident("Object"),
                    "setPrototypeOf",
                    vec![Records::placeholder(rid), proto_expr],
                ));
                self.records.add_assignment(rid, stmt, deps);
                Ok(())
            }
        }
    }

    fn proto_expr(
        &mut self,
        rid: RecordId,
        object: &HeapObject,
    ) -> SerializeResult<ProtoExpr> {
        match object.prototype {
            Prototype::Default => Ok(ProtoExpr::Default),
            Prototype::Null => Ok(ProtoExpr::Explicit(null_lit())),
            Prototype::Object(proto) => {
                match self.node_value(&Value::Object(proto), "proto")? {
                    NodeValue::Ready(expr, dep) => {
                        if let Some(dep) = dep {
                            self.records.add_dependency(rid, dep);
                        }
                        Ok(ProtoExpr::Explicit(expr))
                    }
                    NodeValue::Circular(proto_rid) => {
                        let stmt = expr_stmt(method_call(
                            ident("Object"),
                            "setPrototypeOf",
                            vec![
                                Records::placeholder(rid),
                                Records::placeholder(proto_rid),
                            ],
                        ));
                        self.records.add_assignment(rid, stmt, vec![proto_rid]);
                        Ok(ProtoExpr::CircularPatch)
                    }
                }
            }
        }
    }

    /// `Object.freeze` / `seal` / `preventExtensions` restored last.
    fn integrity_assignment(&mut self, rid: RecordId, object: &HeapObject) {
        if object.extensible {
            return;
        }
        let all_non_configurable = object.properties.values().all(|d| !d.configurable);
        let all_non_writable = object
            .properties
            .values()
            .all(|d| d.is_accessor() || !d.writable);
        let method = if all_non_configurable && all_non_writable {
            "freeze"
        } else if all_non_configurable {
            "seal"
        } else {
            "preventExtensions"
        };
        let stmt = expr_stmt(method_call(
            ident("Object"),
            method,
            vec![Records::placeholder(rid)],
        ));
        self.records.add_assignment(rid, stmt, vec![]);
    }
}

enum ProtoExpr {
    Default,
    Explicit(Expression),
    CircularPatch,
}

/// Property-placement phase; monotonic so insertion order survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Literal,
    Define,
    Assign,
}

#[derive(Debug)]
pub enum NodeValue {
    Ready(Expression, Option<RecordId>),
    Circular(RecordId),
}

fn property_hint(name: &PropertyName) -> String {
    match name {
        PropertyName::Str(s) => s.clone(),
        PropertyName::Symbol(_) => "symbol".to_string(),
    }
}

fn plain_property(key: &str, value: Expression) -> ObjectMember {
    ObjectMember::Property {
        key: PropertyKey::Identifier(key.to_string()),
        value,
        kind: PropertyKind::Init,
        method: false,
        shorthand: false,
    }
}

fn descriptor_member(key: PropertyKey, descriptor: Expression) -> ObjectMember {
    ObjectMember::Property {
        key,
        value: descriptor,
        kind: PropertyKind::Init,
        method: false,
        shorthand: false,
    }
}

fn full_data_descriptor(value: Expression) -> Expression {
    Expression::ObjectExpression {
        properties: vec![
            plain_property("value", value),
            plain_property("writable", bool_lit(true)),
            plain_property("enumerable", bool_lit(true)),
            plain_property("configurable", bool_lit(true)),
        ],
    }
}
