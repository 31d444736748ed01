//! # Function Serializer
//!
//! Recovers a tracked function's metadata from its `toString()` source,
//! captures its scopes through the tracker state machine, and prepares the
//! shared [`FunctionDef`] each instance is emitted from: instrumentation
//! statements stripped, `eval` rewrites reverted, `super` transpiled
//! against the captured home variable, const violations preserved.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::*;
use crate::heap::{ObjectId, PropertyName, Value};
use crate::instrument::{find_tracker_comment, TrackerInfo};
use crate::parser::{self, ParseOptions};
use crate::runtime::{RuntimeError, SpecialFunction};
use crate::serializer::record::{RecordId, Records};
use crate::serializer::trace::{Serializer, Traced};
use crate::serializer::{SerializeError, SerializeResult};

pub type DefId = usize;

/// Parsed, shared data for all instances of one source-level function.
#[derive(Debug)]
pub struct FunctionDef {
    pub info: TrackerInfo,
    /// Cleaned function/class/arrow expression.
    pub node: Expression,
    pub is_class: bool,
    pub name: Option<String>,
    /// Standalone method emission (`({m(){…}}).m`).
    pub method_wrap: Option<MethodWrap>,
    /// Free names resolving to globals; final identifiers must avoid them.
    pub global_names: HashSet<String>,
    /// Every name bound somewhere inside the function.
    pub internal_names: HashSet<String>,
    /// Captured variables the function assigns to.
    pub writes_external: HashSet<String>,
    /// Non-computed member keys the class emission covers: (key, static).
    pub class_member_keys: Vec<(String, bool)>,
}

#[derive(Debug, Clone)]
pub struct MethodWrap {
    pub key: String,
    pub kind: PropertyKind,
}

/// Registry of defs keyed by (filename, function id).
#[derive(Debug, Default)]
pub struct Defs {
    index: IndexMap<(String, u32), DefId>,
    list: Vec<FunctionDef>,
}

impl Defs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: DefId) -> &FunctionDef {
        &self.list[id]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Serializes a function value into a record (step 6 of the tracer's
/// dispatch).
pub fn serialize_function(
    s: &mut Serializer<'_>,
    id: ObjectId,
    name_hint: &str,
) -> SerializeResult<Traced> {
    if let Some(special) = s.instance.special_function(id).cloned() {
        return serialize_special(s, id, name_hint, special);
    }

    let data = s
        .instance
        .heap
        .object(id)
        .function_data()
        .cloned()
        .ok_or_else(|| SerializeError::InternalAssertion {
            message: "serialize_function on a non-function object".to_string(),
        })?;

    let Some(info) = find_tracker_comment(&data.source) else {
        return Err(SerializeError::NotInstrumentedFunction {
            name: data.name.clone(),
            trace: s.trace_string(),
        });
    };

    let def_id = get_or_create_def(s, info, &data.source)?;

    // The runtime name makes the most readable identifier; the structural
    // hint is the fallback for anonymous functions.
    let hint = if data.name.is_empty() {
        name_hint
    } else {
        data.name.as_str()
    };
    let rid = s.records.create(Some(id), hint);
    s.records.get_mut(rid).fn_name = Some(data.name.clone());

    // Capture the instance's scopes through the armed tracker.
    let innermost = if s.defs.get(def_id).info.scopes.is_empty() {
        None
    } else {
        s.instance.set_tracker_callback()?;
        let snapshots = match s.instance.invoke_for_capture(id) {
            Ok(snapshots) => snapshots,
            Err(RuntimeError::NotInstrumented) => {
                s.instance.reset_tracker_callback();
                return Err(SerializeError::NotInstrumentedFunction {
                    name: data.name.clone(),
                    trace: s.trace_string(),
                });
            }
            Err(other) => {
                s.instance.reset_tracker_callback();
                return Err(other.into());
            }
        };
        s.instance.reset_tracker_callback();
        register_scopes(s, def_id, &snapshots)?
    };

    s.planner.register_instance(def_id, innermost, rid);
    // Placeholder until the block planner rewrites it with the factory
    // call or member access.
    s.records.set_node(rid, Records::placeholder(rid));

    attach_function_props(s, rid, id, def_id)?;
    Ok(Traced::Rec(rid))
}

/// Walks metadata scopes against the captured snapshot, creating or
/// reusing scope plans and serializing each captured value once.
fn register_scopes(
    s: &mut Serializer<'_>,
    def_id: DefId,
    snapshots: &[crate::heap::ScopeSnapshot],
) -> SerializeResult<Option<(u32, u32)>> {
    let metas = s.defs.get(def_id).info.scopes.clone();
    if snapshots.len() != metas.len() {
        return Err(SerializeError::InternalAssertion {
            message: format!(
                "tracker reported {} scopes, metadata lists {}",
                snapshots.len(),
                metas.len()
            ),
        });
    }
    let frozen = s.defs.get(def_id).info.contains_eval;
    let mut parent: Option<(u32, u32)> = None;
    for (meta, snapshot) in metas.iter().zip(snapshots) {
        s.planner
            .ensure_block(meta, parent.map(|(block, _)| block), frozen);
        s.planner
            .ensure_scope(meta.block_id, snapshot.scope_id, parent);
        for (name, value) in &snapshot.values {
            if s.planner
                .scope_has_value(meta.block_id, snapshot.scope_id, name)
            {
                continue;
            }
            s.push_trace(format!("<scope var {name}>"));
            let traced = s.serialize_value(value, name);
            s.pop_trace();
            // Primitive captures get a record too, so scope parameters
            // rename uniformly to record placeholders; single-use ones are
            // spliced back by the assembler.
            let planned = match traced? {
                Traced::Inline(expr) => {
                    let rid = s.records.create(None, name);
                    s.records.set_node(rid, expr);
                    crate::serializer::blocks::PlannedValue::record(rid, false)
                }
                Traced::Rec(rid) => crate::serializer::blocks::PlannedValue::record(rid, false),
                Traced::Circular(rid) => crate::serializer::blocks::PlannedValue::record(rid, true),
            };
            s.planner
                .set_value(meta.block_id, snapshot.scope_id, name, planned);
        }
        parent = Some((meta.block_id, snapshot.scope_id));
    }
    Ok(parent)
}

/// Own properties of the function object, its prototype object, and the
/// keys the class emission already covers.
fn attach_function_props(
    s: &mut Serializer<'_>,
    rid: RecordId,
    id: ObjectId,
    def_id: DefId,
) -> SerializeResult<()> {
    let object = s.instance.heap.object(id).clone();
    let is_class = s.defs.get(def_id).is_class;
    let class_keys = s.defs.get(def_id).class_member_keys.clone();

    let proto_id = object
        .properties
        .get(&PropertyName::str("prototype"))
        .and_then(|d| d.value.as_ref())
        .and_then(Value::object_id);

    if let Some(proto_id) = proto_id {
        s.prototype_owner.insert(proto_id, id);
        if is_class {
            let proto_keys: HashSet<PropertyName> = class_keys
                .iter()
                .filter(|(_, is_static)| !is_static)
                .map(|(key, _)| PropertyName::str(key.clone()))
                .collect();
            s.emitted_keys.insert(proto_id, proto_keys);
        }
    }

    let static_keys: HashSet<String> = class_keys
        .iter()
        .filter(|(_, is_static)| *is_static)
        .map(|(key, _)| key.clone())
        .collect();

    s.attach_extra_props(rid, &object, move |name, desc| match name {
        PropertyName::Str(key) => {
            if key == "length" || key == "name" {
                return true;
            }
            if key == "prototype" {
                // Handled below: either default-shaped (skip) or
                // materialized as its own record.
                return true;
            }
            static_keys.contains(key) && desc.value.is_some()
        }
        PropertyName::Symbol(_) => false,
    })?;

    // Materialize the prototype record when it carries anything beyond the
    // back-reference: extra props, accessors, or a non-default chain.
    if let Some(proto_id) = proto_id {
        let proto = s.instance.heap.object(proto_id).clone();
        let emitted = s.emitted_keys.get(&proto_id).cloned().unwrap_or_default();
        let interesting = proto.prototype != crate::heap::Prototype::Default
            || proto.properties.iter().any(|(name, _)| {
                !matches!(name, PropertyName::Str(k) if k == "constructor")
                    && !emitted.contains(name)
            });
        if interesting || is_class {
            s.push_trace(".prototype".to_string());
            let result = s.serialize_value(&Value::Object(proto_id), "prototype");
            s.pop_trace();
            result?;
        }
    }
    Ok(())
}

/// Emitters for the special-function registry.
fn serialize_special(
    s: &mut Serializer<'_>,
    id: ObjectId,
    name_hint: &str,
    special: SpecialFunction,
) -> SerializeResult<Traced> {
    match special {
        SpecialFunction::SplitAsync { module } => {
            let rid = s.records.create(Some(id), name_hint);
            let module_traced = s.serialize_value(&Value::Object(module), "module")?;
            let module_expr = match module_traced {
                Traced::Rec(mid) | Traced::Circular(mid) => {
                    s.records.add_dependency(rid, mid);
                    Records::placeholder(mid)
                }
                Traced::Inline(expr) => expr,
            };
            // Each call yields a fresh promise of the same module object.
            let node = arrow(
                vec![],
                method_call(ident("Promise"), "resolve", vec![module_expr]),
            );
            s.records.set_node(rid, node);
            Ok(Traced::Rec(rid))
        }
        SpecialFunction::Bound {
            target,
            this_arg,
            args,
        } => serialize_bound(s, id, name_hint, &target, &this_arg, &args),
        SpecialFunction::Promisified { inner } => {
            serialize_util_wrapper(s, id, name_hint, "promisify", &inner)
        }
        SpecialFunction::Callbackified { inner } => {
            serialize_util_wrapper(s, id, name_hint, "callbackify", &inner)
        }
        SpecialFunction::Debuglog { set } => {
            let rid = s.records.create(Some(id), name_hint);
            let util = s.module_record("util");
            s.records.add_dependency(rid, util);
            let node = call(
                member(Records::placeholder(util), "debuglog"),
                vec![string_lit(set)],
            );
            s.records.set_node(rid, node);
            Ok(Traced::Rec(rid))
        }
        SpecialFunction::Require => {
            let rid = s.records.create(Some(id), name_hint);
            let node = if matches!(s.options.format, crate::serializer::OutputFormat::Esm) {
                let module = s.module_record("module");
                s.records.add_dependency(rid, module);
                call(
                    member(Records::placeholder(module), "createRequire"),
                    vec![member(
                        Expression::MetaProperty {
                            meta: "import".to_string(),
                            property: "meta".to_string(),
                        },
                        "url",
                    )],
                )
            } else {
                ident("require")
            };
            s.records.set_node(rid, node);
            Ok(Traced::Rec(rid))
        }
    }
}

/// `inner.bind(ctx, …)`, with the `createBinding` holder/setter pair when
/// the bind arguments cycle back through the bound function.
fn serialize_bound(
    s: &mut Serializer<'_>,
    id: ObjectId,
    name_hint: &str,
    target: &Value,
    this_arg: &Value,
    args: &[Value],
) -> SerializeResult<Traced> {
    let rid = s.records.create(Some(id), name_hint);

    let mut circular = false;
    let mut deps = Vec::new();
    let mut exprs = Vec::with_capacity(args.len() + 2);
    for (value, hint) in std::iter::once((target, "target"))
        .chain(std::iter::once((this_arg, "this")))
        .chain(args.iter().map(|a| (a, "arg")))
    {
        match s.serialize_value(value, hint)? {
            Traced::Inline(expr) => exprs.push(expr),
            Traced::Rec(dep) => {
                deps.push(dep);
                exprs.push(Records::placeholder(dep));
            }
            Traced::Circular(dep) => {
                circular = true;
                deps.push(dep);
                exprs.push(Records::placeholder(dep));
            }
        }
    }
    let target_expr = exprs.remove(0);
    let bind_call = method_call(target_expr, "bind", exprs);

    if circular {
        let create_binding = s.create_binding_record();
        let pair = s.records.create(None, "binding");
        s.records.add_dependency(pair, create_binding);
        s.records
            .set_node(pair, call(Records::placeholder(create_binding), vec![]));
        // The holder stands in for the bound function; the setter closes
        // the cycle after every record is declared.
        s.records.add_dependency(rid, pair);
        s.records.set_node(
            rid,
            member_computed(Records::placeholder(pair), number_lit(0.0)),
        );
        let mut assignment_deps = deps;
        assignment_deps.push(pair);
        let stmt = expr_stmt(call(
            member_computed(Records::placeholder(pair), number_lit(1.0)),
            vec![bind_call],
        ));
        s.records.add_assignment(rid, stmt, assignment_deps);
    } else {
        for dep in deps {
            s.records.add_dependency(rid, dep);
        }
        s.records.set_node(rid, bind_call);
    }
    Ok(Traced::Rec(rid))
}

fn serialize_util_wrapper(
    s: &mut Serializer<'_>,
    id: ObjectId,
    name_hint: &str,
    method: &str,
    inner: &Value,
) -> SerializeResult<Traced> {
    let rid = s.records.create(Some(id), name_hint);
    let util = s.module_record("util");
    s.records.add_dependency(rid, util);
    let (inner_expr, deps) = match s.serialize_value(inner, "inner")? {
        Traced::Inline(expr) => (expr, vec![]),
        Traced::Rec(dep) | Traced::Circular(dep) => (Records::placeholder(dep), vec![dep]),
    };
    for dep in deps {
        s.records.add_dependency(rid, dep);
    }
    let node = call(
        member(Records::placeholder(util), method.to_string()),
        vec![inner_expr],
    );
    s.records.set_node(rid, node);
    Ok(Traced::Rec(rid))
}

// Def parsing and cleaning.

fn get_or_create_def(
    s: &mut Serializer<'_>,
    info: TrackerInfo,
    source: &str,
) -> SerializeResult<DefId> {
    let key = (info.filename.clone(), info.id);
    if let Some(&id) = s.defs.index.get(&key) {
        return Ok(id);
    }
    let (mut node, method_wrap) = parse_function_source(source, &info)?;
    scrub_instrumentation_expr(&mut node);
    let is_class = matches!(node, Expression::ClassExpression(_));
    if let Expression::ClassExpression(class) = &mut node {
        // The heritage expression belonged to the original scope;
        // reconstruction wires the prototype chain from the live heap
        // instead.
        class.super_class = None;
        remove_synthetic_constructor(class);
        // Reconstruction drops `extends`, so `super` routes through the
        // class binding itself when no home variable was captured; the
        // class expression needs a self-name for that.
        let needs_self_home = info.super_var_name.is_none()
            && (info.has_super_class || !class.body.is_empty());
        if class.id.is_none() && needs_self_home && info.has_super_class {
            class.id = Some(Identifier::new("_cls"));
        }
    }
    apply_super_amendment(&mut node, &info);
    if is_class {
        if let Expression::ClassExpression(class) = &mut node {
            if info.has_super_class && !has_constructor(class) {
                let home = info
                    .super_var_name
                    .clone()
                    .or_else(|| class.id.as_ref().map(|id| id.name.clone()));
                if let Some(home) = home {
                    synthesize_derived_constructor(class, &home);
                }
            }
        }
    }

    let name = match &node {
        Expression::FunctionExpression(f) => f.id.as_ref().map(|i| i.name.clone()),
        Expression::ClassExpression(c) => c.id.as_ref().map(|i| i.name.clone()),
        _ => None,
    };

    let mut names = NameCollector::default();
    names.collect_expression(&node, &mut vec![HashSet::new()]);
    let external: HashSet<String> = info
        .scopes
        .iter()
        .flat_map(|scope| scope.var_names.iter().cloned())
        .collect();
    let const_external: HashSet<String> = info
        .scopes
        .iter()
        .flat_map(|scope| scope.const_names.iter().cloned())
        .collect();
    let global_names: HashSet<String> = names
        .free
        .iter()
        .filter(|n| !external.contains(*n))
        .cloned()
        .collect();
    let writes_external: HashSet<String> = names
        .free_writes
        .iter()
        .filter(|n| external.contains(*n))
        .cloned()
        .collect();

    // Const violations keep their observable behavior once captured
    // variables become mutable parameters.
    let rewrite = BodyRewrite {
        rename: HashMap::new(),
        const_names: const_external,
        silent_names: if info.is_strict {
            HashSet::new()
        } else {
            name.iter().cloned().collect()
        },
    };
    rewrite_expression(&mut node, &rewrite, &mut vec![HashSet::new()]);

    let class_member_keys = match &node {
        Expression::ClassExpression(class) => class
            .body
            .iter()
            .filter_map(|member| match member {
                ClassMember::Method { key, is_static, .. }
                | ClassMember::Property { key, is_static, .. } => match key {
                    PropertyKey::Identifier(k) | PropertyKey::String(k) => {
                        (k != "constructor").then(|| (k.clone(), *is_static))
                    }
                    _ => None,
                },
                ClassMember::StaticBlock { .. } => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let def = FunctionDef {
        info,
        node,
        is_class,
        name,
        method_wrap,
        global_names,
        internal_names: names.bound,
        writes_external,
        class_member_keys,
    };
    let id = s.defs.list.len();
    s.defs.list.push(def);
    s.defs.index.insert(key, id);
    Ok(id)
}

/// Parses `toString()` output into an expression node. Methods are
/// wrapped in an object literal first, anonymous function expressions in
/// parentheses.
fn parse_function_source(
    source: &str,
    info: &TrackerInfo,
) -> SerializeResult<(Expression, Option<MethodWrap>)> {
    let options = ParseOptions {
        filename: info.filename.clone(),
        source_type: crate::ast::SourceType::Script,
        jsx: false,
        strict: info.is_strict,
    };
    if info.is_method {
        let wrapped = format!("({{ {source} }})");
        let parsed = parser::parse(&wrapped, &options)?;
        let Some(Statement::ExpressionStatement {
            expression: Expression::ObjectExpression { properties },
        }) = parsed.program.body.into_iter().next()
        else {
            return Err(SerializeError::InternalAssertion {
                message: "method source did not parse to an object literal".to_string(),
            });
        };
        let Some(ObjectMember::Property { key, value, kind, .. }) = properties.into_iter().next()
        else {
            return Err(SerializeError::InternalAssertion {
                message: "method source has no property".to_string(),
            });
        };
        let key = match key {
            PropertyKey::Identifier(k) | PropertyKey::String(k) => k,
            other => {
                return Err(SerializeError::InternalAssertion {
                    message: format!("unsupported method key {other:?}"),
                })
            }
        };
        return Ok((value, Some(MethodWrap { key, kind })));
    }

    let parsed = match parser::parse(source, &options) {
        Ok(parsed) => parsed,
        Err(_) => parser::parse(&format!("({source})"), &options)?,
    };
    let expression = match parsed.program.body.into_iter().next() {
        Some(Statement::FunctionDeclaration(function)) => Expression::FunctionExpression(function),
        Some(Statement::ClassDeclaration(class)) => Expression::ClassExpression(class),
        Some(Statement::ExpressionStatement { expression }) => expression,
        other => {
            return Err(SerializeError::InternalAssertion {
                message: format!("function source parsed to {other:?}"),
            })
        }
    };
    Ok((expression, None))
}

// Instrumentation scrubbing.

fn is_injected_ident(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(crate::instrument::IDENT_BASE) else {
        return false;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && rest[digits.len()..].starts_with('_')
}

fn is_instrumentation_stmt(stmt: &Statement) -> bool {
    match stmt {
        Statement::VariableDeclaration { declarations, .. } => {
            !declarations.is_empty()
                && declarations.iter().all(|d| {
                    matches!(&d.id, Pattern::Identifier(id) if is_injected_ident(&id.name))
                })
        }
        Statement::IfStatement { test, .. } => matches!(
            test,
            Expression::BinaryExpression {
                left,
                operator: BinaryOperator::StrictEqual,
                right,
            } if matches!(&**left, Expression::Identifier(id) if is_injected_ident(&id.name))
                && matches!(&**right, Expression::Literal(Literal::Null))
        ),
        _ => false,
    }
}

fn scrub_statements(body: &mut Vec<Statement>) {
    body.retain(|stmt| !is_instrumentation_stmt(stmt));
    for stmt in body {
        scrub_statement(stmt);
    }
}

fn scrub_statement(stmt: &mut Statement) {
    match stmt {
        Statement::VariableDeclaration { declarations, .. } => {
            for decl in declarations {
                if let Some(init) = &mut decl.init {
                    scrub_instrumentation_expr(init);
                }
            }
        }
        Statement::FunctionDeclaration(function) => scrub_statements(&mut function.body),
        Statement::ClassDeclaration(class) => scrub_class(class),
        Statement::ExpressionStatement { expression } => scrub_instrumentation_expr(expression),
        Statement::BlockStatement { body } => scrub_statements(body),
        Statement::ReturnStatement { argument } => {
            if let Some(argument) = argument {
                scrub_instrumentation_expr(argument);
            }
        }
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            scrub_instrumentation_expr(test);
            scrub_embedded(consequent);
            if let Some(alternate) = alternate {
                scrub_embedded(alternate);
            }
        }
        Statement::WhileStatement { test, body } => {
            scrub_instrumentation_expr(test);
            scrub_embedded(body);
        }
        Statement::DoWhileStatement { body, test } => {
            scrub_embedded(body);
            scrub_instrumentation_expr(test);
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
                            scrub_instrumentation_expr(init);
                        }
                    }
                }
                Some(ForInit::Expression(expression)) => scrub_instrumentation_expr(expression),
                None => {}
            }
            if let Some(test) = test {
                scrub_instrumentation_expr(test);
            }
            if let Some(update) = update {
                scrub_instrumentation_expr(update);
            }
            scrub_embedded(body);
        }
        Statement::ForInStatement { right, body, .. }
        | Statement::ForOfStatement { right, body, .. } => {
            scrub_instrumentation_expr(right);
            scrub_embedded(body);
        }
        Statement::SwitchStatement { discriminant, cases } => {
            scrub_instrumentation_expr(discriminant);
            for case in cases {
                if let Some(test) = &mut case.test {
                    scrub_instrumentation_expr(test);
                }
                scrub_statements(&mut case.consequent);
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            scrub_statements(block);
            if let Some(handler) = handler {
                scrub_statements(&mut handler.body);
            }
            if let Some(finalizer) = finalizer {
                scrub_statements(finalizer);
            }
        }
        Statement::ThrowStatement { argument } => scrub_instrumentation_expr(argument),
        Statement::LabeledStatement { body, .. } => scrub_embedded(body),
        Statement::WithStatement { object, body } => {
            scrub_instrumentation_expr(object);
            scrub_embedded(body);
        }
        _ => {}
    }
}

fn scrub_embedded(stmt: &mut Box<Statement>) {
    if is_instrumentation_stmt(stmt) {
        **stmt = Statement::EmptyStatement;
        return;
    }
    scrub_statement(stmt);
}

fn scrub_class(class: &mut ClassNode) {
    class.body_comment = None;
    if let Some(super_class) = &mut class.super_class {
        scrub_instrumentation_expr(super_class);
    }
    for member in &mut class.body {
        match member {
            ClassMember::Method { function, .. } => scrub_statements(&mut function.body),
            ClassMember::Property { value: Some(v), .. } => scrub_instrumentation_expr(v),
            ClassMember::Property { value: None, .. } => {}
            ClassMember::StaticBlock { body } => scrub_statements(body),
        }
    }
}

/// Removes instrumentation inside an expression: nested function preludes,
/// `evalDirect`/`evalIndirect` rewrites, temp-var assignments.
pub fn scrub_instrumentation_expr(expression: &mut Expression) {
    // Revert eval rewrites first, then recurse.
    loop {
        let replacement = match expression {
            Expression::CallExpression { callee, arguments, .. } => match &**callee {
                Expression::MemberExpression { object, property, .. }
                    if matches!(&**object, Expression::Identifier(id) if is_injected_ident(&id.name))
                        && matches!(property, MemberKey::Static(p) if p == "evalDirect") =>
                {
                    // tracker.evalDirect(eval, [args], …) → eval(args…)
                    let args = match arguments.get(1) {
                        Some(Expression::ArrayExpression { elements }) => elements
                            .iter()
                            .flatten()
                            .cloned()
                            .collect(),
                        _ => vec![],
                    };
                    Some(call(ident("eval"), args))
                }
                _ => None,
            },
            Expression::MemberExpression { object, property, .. }
                if matches!(&**object, Expression::Identifier(id) if is_injected_ident(&id.name))
                    && matches!(&*property, MemberKey::Static(p) if p == "evalIndirect") =>
            {
                Some(ident("eval"))
            }
            Expression::AssignmentExpression {
                operator: AssignmentOperator::Assign,
                target: AssignmentTarget::Identifier(id),
                value,
            } if is_injected_ident(&id.name) => {
                // `(livepackN_temp_K = class …)` wrapper.
                Some((**value).clone())
            }
            _ => None,
        };
        match replacement {
            Some(node) => *expression = node,
            None => break,
        }
    }

    match expression {
        Expression::FunctionExpression(function) => {
            function.body_comment = None;
            scrub_statements(&mut function.body);
        }
        Expression::ArrowFunctionExpression(arrow_node) => {
            arrow_node.body_comment = None;
            match &mut arrow_node.body {
                ArrowBody::Block(body) => scrub_statements(body),
                ArrowBody::Expression(expression) => scrub_instrumentation_expr(expression),
            }
        }
        Expression::ClassExpression(class) => scrub_class(class),
        Expression::CallExpression { callee, arguments, .. } => {
            scrub_instrumentation_expr(callee);
            for argument in arguments {
                scrub_instrumentation_expr(argument);
            }
        }
        Expression::NewExpression { callee, arguments } => {
            scrub_instrumentation_expr(callee);
            for argument in arguments {
                scrub_instrumentation_expr(argument);
            }
        }
        Expression::MemberExpression { object, property, .. } => {
            scrub_instrumentation_expr(object);
            if let MemberKey::Computed(expression) = property {
                scrub_instrumentation_expr(expression);
            }
        }
        Expression::BinaryExpression { left, right, .. }
        | Expression::LogicalExpression { left, right, .. } => {
            scrub_instrumentation_expr(left);
            scrub_instrumentation_expr(right);
        }
        Expression::AssignmentExpression { target, value, .. } => {
            if let AssignmentTarget::Member { object, property, .. } = target {
                scrub_instrumentation_expr(object);
                if let MemberKey::Computed(expression) = property {
                    scrub_instrumentation_expr(expression);
                }
            }
            scrub_instrumentation_expr(value);
        }
        Expression::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => {
            scrub_instrumentation_expr(test);
            scrub_instrumentation_expr(consequent);
            scrub_instrumentation_expr(alternate);
        }
        Expression::SequenceExpression { expressions } => {
            for expression in expressions {
                scrub_instrumentation_expr(expression);
            }
        }
        Expression::ArrayExpression { elements } => {
            for element in elements.iter_mut().flatten() {
                scrub_instrumentation_expr(element);
            }
        }
        Expression::ObjectExpression { properties } => {
            for member in properties {
                match member {
                    ObjectMember::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            scrub_instrumentation_expr(expression);
                        }
                        scrub_instrumentation_expr(value);
                    }
                    ObjectMember::Spread { argument } => scrub_instrumentation_expr(argument),
                }
            }
        }
        Expression::UnaryExpression { argument, .. }
        | Expression::UpdateExpression { argument, .. }
        | Expression::AwaitExpression { argument }
        | Expression::SpreadElement { argument } => scrub_instrumentation_expr(argument),
        Expression::YieldExpression {
            argument: Some(argument),
            ..
        } => scrub_instrumentation_expr(argument),
        Expression::TemplateLiteral { expressions, .. } => {
            for expression in expressions {
                scrub_instrumentation_expr(expression);
            }
        }
        Expression::TaggedTemplateExpression {
            tag, expressions, ..
        } => {
            scrub_instrumentation_expr(tag);
            for expression in expressions {
                scrub_instrumentation_expr(expression);
            }
        }
        _ => {}
    }
}

// Synthetic constructors.

fn has_constructor(class: &ClassNode) -> bool {
    class
        .body
        .iter()
        .any(|m| matches!(m, ClassMember::Method { kind: MethodKind::Constructor, .. }))
}

/// Drops a constructor the instrumenter synthesized for capture: after
/// scrubbing, its body is empty or a single `super(...livepackN_args)`.
fn remove_synthetic_constructor(class: &mut ClassNode) {
    class.body.retain(|member| {
        let ClassMember::Method {
            kind: MethodKind::Constructor,
            function,
            ..
        } = member
        else {
            return true;
        };
        let body: Vec<&Statement> = function
            .body
            .iter()
            .filter(|s| !is_instrumentation_stmt(s))
            .collect();
        let synthetic = match body.as_slice() {
            [] => true,
            [Statement::ExpressionStatement {
                expression: Expression::CallExpression { callee, arguments, .. },
            }] => {
                matches!(&**callee, Expression::SuperExpression)
                    && arguments.len() == 1
                    && matches!(
                        &arguments[0],
                        Expression::SpreadElement { argument }
                            if matches!(&**argument, Expression::Identifier(id) if is_injected_ident(&id.name))
                    )
            }
            _ => return true,
        };
        // Only constructors whose entire parameter list is the injected
        // rest argument (or empty) qualify.
        let params_synthetic = function.params.is_empty()
            || matches!(
                function.params.as_slice(),
                [Pattern::RestElement { argument }]
                    if matches!(&**argument, Pattern::Identifier(id) if is_injected_ident(&id.name))
            );
        !(synthetic && params_synthetic)
    });
}

/// Derived class without an explicit constructor: reconstruction has no
/// `extends` clause, so construction routes through `Reflect.construct`
/// against the home binding's prototype chain.
fn synthesize_derived_constructor(class: &mut ClassNode, home: &str) {
    let construct = call(
        member(ident("Reflect"), "construct"),
        vec![
            method_call(ident("Object"), "getPrototypeOf", vec![ident(home)]),
            ident("args"),
            ident(home),
        ],
    );
    class.body.insert(
        0,
        ClassMember::Method {
            key: PropertyKey::Identifier("constructor".to_string()),
            function: FunctionNode {
                id: None,
                params: vec![Pattern::RestElement {
                    argument: Box::new(ident_pattern("args")),
                }],
                body: vec![Statement::ReturnStatement {
                    argument: Some(construct),
                }],
                is_async: false,
                is_generator: false,
                body_comment: None,
            },
            kind: MethodKind::Constructor,
            is_static: false,
        },
    );
}

// Super transpilation.

fn apply_super_amendment(node: &mut Expression, info: &TrackerInfo) {
    match node {
        Expression::ClassExpression(class) => {
            let home = info
                .super_var_name
                .clone()
                .or_else(|| class.id.as_ref().map(|id| id.name.clone()));
            for member in &mut class.body {
                if let ClassMember::Method {
                    function,
                    kind,
                    is_static,
                    ..
                } = member
                {
                    let has_super =
                        crate::instrument::special::statements_use_super(&function.body);
                    if !has_super {
                        continue;
                    }
                    let Some(home) = home.clone() else {
                        continue;
                    };
                    let ctx = SuperContext {
                        home,
                        proto_flavor: !*is_static && *kind != MethodKind::Constructor,
                        in_constructor: *kind == MethodKind::Constructor,
                    };
                    rewrite_super_in_body(&mut function.body, &ctx);
                    if ctx.in_constructor && info.has_super_class {
                        finish_constructor_super(function);
                    }
                }
            }
        }
        Expression::FunctionExpression(function) => {
            if let Some(home) = &info.super_var_name {
                let ctx = SuperContext {
                    home: home.clone(),
                    proto_flavor: info.is_proto_method,
                    in_constructor: false,
                };
                rewrite_super_in_body(&mut function.body, &ctx);
            }
        }
        Expression::ArrowFunctionExpression(arrow_node) => {
            if let Some(home) = &info.super_var_name {
                let ctx = SuperContext {
                    home: home.clone(),
                    proto_flavor: info.is_proto_method,
                    in_constructor: false,
                };
                if let ArrowBody::Block(body) = &mut arrow_node.body {
                    rewrite_super_in_body(body, &ctx);
                }
            }
        }
        _ => {}
    }
}

struct SuperContext {
    home: String,
    proto_flavor: bool,
    in_constructor: bool,
}

impl SuperContext {
    /// `Object.getPrototypeOf(home)` or `Object.getPrototypeOf(home.prototype)`.
    fn proto_expr(&self) -> Expression {
        let base = if self.proto_flavor {
            member(ident(self.home.clone()), "prototype")
        } else {
            ident(self.home.clone())
        };
        method_call(ident("Object"), "getPrototypeOf", vec![base])
    }
}

fn rewrite_super_in_body(body: &mut [Statement], ctx: &SuperContext) {
    for stmt in body {
        rewrite_super_statement(stmt, ctx);
    }
}

fn rewrite_super_statement(stmt: &mut Statement, ctx: &SuperContext) {
    match stmt {
        Statement::ExpressionStatement { expression } => rewrite_super_expression(expression, ctx),
        Statement::ReturnStatement { argument: Some(e) } => rewrite_super_expression(e, ctx),
        Statement::ReturnStatement { argument: None } => {}
        Statement::VariableDeclaration { declarations, .. } => {
            for decl in declarations {
                if let Some(init) = &mut decl.init {
                    rewrite_super_expression(init, ctx);
                }
            }
        }
        Statement::BlockStatement { body } => rewrite_super_in_body(body, ctx),
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            rewrite_super_expression(test, ctx);
            rewrite_super_statement(consequent, ctx);
            if let Some(alternate) = alternate {
                rewrite_super_statement(alternate, ctx);
            }
        }
        Statement::WhileStatement { test, body } => {
            rewrite_super_expression(test, ctx);
            rewrite_super_statement(body, ctx);
        }
        Statement::DoWhileStatement { body, test } => {
            rewrite_super_statement(body, ctx);
            rewrite_super_expression(test, ctx);
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
                            rewrite_super_expression(init, ctx);
                        }
                    }
                }
                Some(ForInit::Expression(e)) => rewrite_super_expression(e, ctx),
                None => {}
            }
            if let Some(test) = test {
                rewrite_super_expression(test, ctx);
            }
            if let Some(update) = update {
                rewrite_super_expression(update, ctx);
            }
            rewrite_super_statement(body, ctx);
        }
        Statement::ForInStatement { right, body, .. }
        | Statement::ForOfStatement { right, body, .. } => {
            rewrite_super_expression(right, ctx);
            rewrite_super_statement(body, ctx);
        }
        Statement::SwitchStatement { discriminant, cases } => {
            rewrite_super_expression(discriminant, ctx);
            for case in cases {
                if let Some(test) = &mut case.test {
                    rewrite_super_expression(test, ctx);
                }
                rewrite_super_in_body(&mut case.consequent, ctx);
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            rewrite_super_in_body(block, ctx);
            if let Some(handler) = handler {
                rewrite_super_in_body(&mut handler.body, ctx);
            }
            if let Some(finalizer) = finalizer {
                rewrite_super_in_body(finalizer, ctx);
            }
        }
        Statement::ThrowStatement { argument } => rewrite_super_expression(argument, ctx),
        Statement::LabeledStatement { body, .. } => rewrite_super_statement(body, ctx),
        _ => {}
    }
}

fn rewrite_super_expression(expression: &mut Expression, ctx: &SuperContext) {
    // Handle the composite super forms before recursing.
    let replacement: Option<Expression> = match expression {
        // super(...) → this$0 = Reflect.construct(proto, [args], home)
        Expression::CallExpression { callee, arguments, .. }
            if matches!(&**callee, Expression::SuperExpression) =>
        {
            let mut args = Vec::new();
            for argument in arguments.iter_mut() {
                rewrite_super_expression(argument, ctx);
                args.push(argument.clone());
            }
            let construct = call(
                member(ident("Reflect"), "construct"),
                vec![
                    ctx.proto_expr(),
                    array_expr(args),
                    ident(ctx.home.clone()),
                ],
            );
            Some(assign_expr(
                AssignmentTarget::Identifier(Identifier::new("this$0")),
                construct,
            ))
        }
        // super.x(args) → Reflect.get(proto, "x", this).call(this, args)
        Expression::CallExpression { callee, arguments, .. }
            if matches!(
                &**callee,
                Expression::MemberExpression { object, .. }
                    if matches!(&**object, Expression::SuperExpression)
            ) =>
        {
            let Expression::MemberExpression { property, .. } = &mut **callee else {
                unreachable!()
            };
            let key = super_key_expr(property, ctx);
            let this_expr = ctx.this_expr();
            let getter = call(
                member(ident("Reflect"), "get"),
                vec![ctx.proto_expr(), key, this_expr.clone()],
            );
            let mut args = vec![this_expr];
            for argument in arguments.iter_mut() {
                rewrite_super_expression(argument, ctx);
                args.push(argument.clone());
            }
            Some(call(member(getter, "call"), args))
        }
        // super.x → Reflect.get(proto, "x", this)
        Expression::MemberExpression { object, property, .. }
            if matches!(&**object, Expression::SuperExpression) =>
        {
            let key = super_key_expr(property, ctx);
            Some(call(
                member(ident("Reflect"), "get"),
                vec![ctx.proto_expr(), key, ctx.this_expr()],
            ))
        }
        // super.x = v → Reflect.set(proto, "x", v, this)
        Expression::AssignmentExpression {
            operator: AssignmentOperator::Assign,
            target: AssignmentTarget::Member { object, property, .. },
            value,
        } if matches!(&**object, Expression::SuperExpression) => {
            rewrite_super_expression(value, ctx);
            let key = super_key_expr(property, ctx);
            Some(call(
                member(ident("Reflect"), "set"),
                vec![ctx.proto_expr(), key, (**value).clone(), ctx.this_expr()],
            ))
        }
        _ => None,
    };
    if let Some(replacement) = replacement {
        *expression = replacement;
        return;
    }

    match expression {
        Expression::CallExpression { callee, arguments, .. } => {
            rewrite_super_expression(callee, ctx);
            for argument in arguments {
                rewrite_super_expression(argument, ctx);
            }
        }
        Expression::NewExpression { callee, arguments } => {
            rewrite_super_expression(callee, ctx);
            for argument in arguments {
                rewrite_super_expression(argument, ctx);
            }
        }
        Expression::MemberExpression { object, property, .. } => {
            rewrite_super_expression(object, ctx);
            if let MemberKey::Computed(expression) = property {
                rewrite_super_expression(expression, ctx);
            }
        }
        Expression::BinaryExpression { left, right, .. }
        | Expression::LogicalExpression { left, right, .. } => {
            rewrite_super_expression(left, ctx);
            rewrite_super_expression(right, ctx);
        }
        Expression::AssignmentExpression { target, value, .. } => {
            if let AssignmentTarget::Member { object, property, .. } = target {
                rewrite_super_expression(object, ctx);
                if let MemberKey::Computed(expression) = property {
                    rewrite_super_expression(expression, ctx);
                }
            }
            rewrite_super_expression(value, ctx);
        }
        Expression::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => {
            rewrite_super_expression(test, ctx);
            rewrite_super_expression(consequent, ctx);
            rewrite_super_expression(alternate, ctx);
        }
        Expression::SequenceExpression { expressions } => {
            for expression in expressions {
                rewrite_super_expression(expression, ctx);
            }
        }
        Expression::ArrayExpression { elements } => {
            for element in elements.iter_mut().flatten() {
                rewrite_super_expression(element, ctx);
            }
        }
        Expression::ObjectExpression { properties } => {
            for member in properties {
                match member {
                    ObjectMember::Property { key, value, method, kind, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            rewrite_super_expression(expression, ctx);
                        }
                        // Nested methods re-bind `super`.
                        if !*method && *kind == PropertyKind::Init {
                            rewrite_super_expression(value, ctx);
                        }
                    }
                    ObjectMember::Spread { argument } => rewrite_super_expression(argument, ctx),
                }
            }
        }
        Expression::UnaryExpression { argument, .. }
        | Expression::UpdateExpression { argument, .. }
        | Expression::AwaitExpression { argument }
        | Expression::SpreadElement { argument } => rewrite_super_expression(argument, ctx),
        Expression::YieldExpression {
            argument: Some(argument),
            ..
        } => rewrite_super_expression(argument, ctx),
        Expression::TemplateLiteral { expressions, .. } => {
            for expression in expressions {
                rewrite_super_expression(expression, ctx);
            }
        }
        // Arrows share the enclosing `super`; functions and classes
        // re-bind it.
        Expression::ArrowFunctionExpression(arrow_node) => match &mut arrow_node.body {
            ArrowBody::Block(body) => rewrite_super_in_body(body, ctx),
            ArrowBody::Expression(expression) => rewrite_super_expression(expression, ctx),
        },
        _ => {}
    }
}

impl SuperContext {
    fn this_expr(&self) -> Expression {
        if self.in_constructor {
            ident("this$0")
        } else {
            Expression::ThisExpression
        }
    }
}

fn super_key_expr(property: &MemberKey, _ctx: &SuperContext) -> Expression {
    match property {
        MemberKey::Static(name) => string_lit(name.clone()),
        MemberKey::Computed(expression) => (**expression).clone(),
        MemberKey::Private(name) => string_lit(format!("#{name}")),
    }
}

/// Wraps a rewritten derived constructor: `let this$0;` up front,
/// `this` → `this$0` in the remaining body, `return this$0;` at the end.
fn finish_constructor_super(function: &mut FunctionNode) {
    rewrite_this_in_body(&mut function.body);
    function.body.insert(
        0,
        Statement::VariableDeclaration {
            kind: DeclarationKind::Let,
            declarations: vec![VariableDeclarator {
                id: ident_pattern("this$0"),
                init: None,
            }],
        },
    );
    let ends_with_return = matches!(function.body.last(), Some(Statement::ReturnStatement { .. }));
    if !ends_with_return {
        function.body.push(Statement::ReturnStatement {
            argument: Some(ident("this$0")),
        });
    }
}

fn rewrite_this_in_body(body: &mut [Statement]) {
    for stmt in body {
        rewrite_this_statement(stmt);
    }
}

fn rewrite_this_statement(stmt: &mut Statement) {
    visit_expressions_shallow(stmt, &mut |expression| rewrite_this_expression(expression));
}

fn rewrite_this_expression(expression: &mut Expression) {
    match expression {
        Expression::ThisExpression => *expression = ident("this$0"),
        // Arrows capture `this`; other functions re-bind it.
        Expression::ArrowFunctionExpression(arrow_node) => match &mut arrow_node.body {
            ArrowBody::Block(body) => {
                for stmt in body {
                    rewrite_this_statement(stmt);
                }
            }
            ArrowBody::Expression(expression) => rewrite_this_expression(expression),
        },
        Expression::FunctionExpression(_) | Expression::ClassExpression(_) => {}
        _ => visit_child_expressions(expression, &mut |e| rewrite_this_expression(e)),
    }
}

// Generic shallow expression visitors used by the `this` rewrite.

fn visit_expressions_shallow(stmt: &mut Statement, f: &mut impl FnMut(&mut Expression)) {
    match stmt {
        Statement::ExpressionStatement { expression } => f(expression),
        Statement::ReturnStatement { argument: Some(e) } => f(e),
        Statement::ThrowStatement { argument } => f(argument),
        Statement::VariableDeclaration { declarations, .. } => {
            for decl in declarations {
                if let Some(init) = &mut decl.init {
                    f(init);
                }
            }
        }
        Statement::BlockStatement { body } => {
            for stmt in body {
                visit_expressions_shallow(stmt, f);
            }
        }
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            f(test);
            visit_expressions_shallow(consequent, f);
            if let Some(alternate) = alternate {
                visit_expressions_shallow(alternate, f);
            }
        }
        Statement::WhileStatement { test, body } => {
            f(test);
            visit_expressions_shallow(body, f);
        }
        Statement::DoWhileStatement { body, test } => {
            visit_expressions_shallow(body, f);
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
            visit_expressions_shallow(body, f);
        }
        Statement::ForInStatement { right, body, .. }
        | Statement::ForOfStatement { right, body, .. } => {
            f(right);
            visit_expressions_shallow(body, f);
        }
        Statement::SwitchStatement { discriminant, cases } => {
            f(discriminant);
            for case in cases {
                if let Some(test) = &mut case.test {
                    f(test);
                }
                for stmt in &mut case.consequent {
                    visit_expressions_shallow(stmt, f);
                }
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            for stmt in block {
                visit_expressions_shallow(stmt, f);
            }
            if let Some(handler) = handler {
                for stmt in &mut handler.body {
                    visit_expressions_shallow(stmt, f);
                }
            }
            if let Some(finalizer) = finalizer {
                for stmt in finalizer {
                    visit_expressions_shallow(stmt, f);
                }
            }
        }
        Statement::LabeledStatement { body, .. } => visit_expressions_shallow(body, f),
        _ => {}
    }
}

fn visit_child_expressions(expression: &mut Expression, f: &mut impl FnMut(&mut Expression)) {
    match expression {
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
            if let AssignmentTarget::Member { object, property, .. } = target {
                f(object);
                if let MemberKey::Computed(expression) = property {
                    f(expression);
                }
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
        _ => {}
    }
}

// Free-name analysis and body rewriting.

/// Collects bound names, free names and free write targets.
#[derive(Debug, Default)]
pub struct NameCollector {
    pub bound: HashSet<String>,
    pub free: HashSet<String>,
    pub free_writes: HashSet<String>,
}

impl NameCollector {
    fn is_bound(scopes: &[HashSet<String>], name: &str) -> bool {
        scopes.iter().any(|scope| scope.contains(name))
    }

    fn push_function_scope(
        &mut self,
        scopes: &mut Vec<HashSet<String>>,
        params: &[Pattern],
        body: &[Statement],
        self_name: Option<&str>,
    ) {
        push_scope_for(scopes, params, body, self_name);
        if let Some(scope) = scopes.last() {
            self.bound.extend(scope.iter().cloned());
        }
    }

    pub fn collect_expression(
        &mut self,
        expression: &Expression,
        scopes: &mut Vec<HashSet<String>>,
    ) {
        match expression {
            Expression::Identifier(id) => {
                if !Self::is_bound(scopes, &id.name) {
                    self.free.insert(id.name.clone());
                }
            }
            Expression::FunctionExpression(function) => {
                self.push_function_scope(
                    scopes,
                    &function.params,
                    &function.body,
                    function.id.as_ref().map(|i| i.name.as_str()),
                );
                self.collect_params(&function.params, scopes);
                self.collect_statements(&function.body, scopes);
                scopes.pop();
            }
            Expression::ArrowFunctionExpression(arrow_node) => {
                let body_stmts: &[Statement] = match &arrow_node.body {
                    ArrowBody::Block(body) => body,
                    ArrowBody::Expression(_) => &[],
                };
                self.push_function_scope(scopes, &arrow_node.params, body_stmts, None);
                self.collect_params(&arrow_node.params, scopes);
                match &arrow_node.body {
                    ArrowBody::Block(body) => self.collect_statements(body, scopes),
                    ArrowBody::Expression(expression) => {
                        self.collect_expression(expression, scopes)
                    }
                }
                scopes.pop();
            }
            Expression::ClassExpression(class) => {
                let mut scope = HashSet::new();
                if let Some(id) = &class.id {
                    self.bound.insert(id.name.clone());
                    scope.insert(id.name.clone());
                }
                scopes.push(scope);
                if let Some(super_class) = &class.super_class {
                    self.collect_expression(super_class, scopes);
                }
                for member in &class.body {
                    match member {
                        ClassMember::Method { key, function, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.collect_expression(expression, scopes);
                            }
                            self.push_function_scope(scopes, &function.params, &function.body, None);
                            self.collect_params(&function.params, scopes);
                            self.collect_statements(&function.body, scopes);
                            scopes.pop();
                        }
                        ClassMember::Property { key, value, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.collect_expression(expression, scopes);
                            }
                            if let Some(value) = value {
                                self.collect_expression(value, scopes);
                            }
                        }
                        ClassMember::StaticBlock { body } => {
                            scopes.push(HashSet::new());
                            self.collect_statements(body, scopes);
                            scopes.pop();
                        }
                    }
                }
                scopes.pop();
            }
            Expression::AssignmentExpression { target, value, .. } => {
                match target {
                    AssignmentTarget::Identifier(id) => {
                        if !Self::is_bound(scopes, &id.name) {
                            self.free.insert(id.name.clone());
                            self.free_writes.insert(id.name.clone());
                        }
                    }
                    AssignmentTarget::Member { object, property, .. } => {
                        self.collect_expression(object, scopes);
                        if let MemberKey::Computed(expression) = property {
                            self.collect_expression(expression, scopes);
                        }
                    }
                    AssignmentTarget::Pattern(pattern) => {
                        self.collect_assign_pattern(pattern, scopes);
                    }
                }
                self.collect_expression(value, scopes);
            }
            Expression::UpdateExpression { argument, .. } => {
                if let Expression::Identifier(id) = &**argument {
                    if !Self::is_bound(scopes, &id.name) {
                        self.free.insert(id.name.clone());
                        self.free_writes.insert(id.name.clone());
                    }
                } else {
                    self.collect_expression(argument, scopes);
                }
            }
            other => {
                let mut clone = other.clone();
                visit_child_expressions(&mut clone, &mut |child| {
                    self.collect_expression(child, scopes);
                });
            }
        }
    }

    fn collect_assign_pattern(&mut self, pattern: &Pattern, scopes: &mut Vec<HashSet<String>>) {
        match pattern {
            Pattern::Identifier(id) => {
                if !Self::is_bound(scopes, &id.name) {
                    self.free.insert(id.name.clone());
                    self.free_writes.insert(id.name.clone());
                }
            }
            Pattern::ArrayPattern { elements } => {
                for element in elements.iter().flatten() {
                    self.collect_assign_pattern(element, scopes);
                }
            }
            Pattern::ObjectPattern { properties } => {
                for property in properties {
                    match property {
                        ObjectPatternProperty::Property { key, value, .. } => {
                            if let PropertyKey::Computed(expression) = key {
                                self.collect_expression(expression, scopes);
                            }
                            self.collect_assign_pattern(value, scopes);
                        }
                        ObjectPatternProperty::Rest { argument } => {
                            self.collect_assign_pattern(argument, scopes)
                        }
                    }
                }
            }
            Pattern::AssignmentPattern { left, right } => {
                self.collect_assign_pattern(left, scopes);
                self.collect_expression(right, scopes);
            }
            Pattern::RestElement { argument } => self.collect_assign_pattern(argument, scopes),
        }
    }

    fn collect_params(&mut self, params: &[Pattern], scopes: &mut Vec<HashSet<String>>) {
        for param in params {
            if let Pattern::AssignmentPattern { right, .. } = param {
                self.collect_expression(right, scopes);
            }
        }
    }

    fn collect_statements(&mut self, body: &[Statement], scopes: &mut Vec<HashSet<String>>) {
        // Block-level lexical names were hoisted into the function scope by
        // `push_function_scope`; this keeps the walk simple at the cost of
        // treating shadowing blocks as the same binding, which only
        // over-approximates the free set.
        for stmt in body {
            let mut clone = stmt.clone();
            visit_expressions_shallow(&mut clone, &mut |expression| {
                self.collect_expression(expression, scopes);
            });
            for_each_declaration(stmt, &mut |decl| match decl {
                Statement::FunctionDeclaration(function) => {
                    self.push_function_scope(scopes, &function.params, &function.body, None);
                    self.collect_params(&function.params, scopes);
                    self.collect_statements(&function.body, scopes);
                    scopes.pop();
                }
                Statement::ClassDeclaration(class) => {
                    self.collect_expression(&Expression::ClassExpression(class.clone()), scopes);
                }
                _ => {}
            });
        }
    }
}

/// Yields function and class declarations nested anywhere in statement
/// structure (without entering function bodies).
fn for_each_declaration<'a>(stmt: &'a Statement, f: &mut dyn FnMut(&'a Statement)) {
    match stmt {
        Statement::FunctionDeclaration(_) | Statement::ClassDeclaration(_) => f(stmt),
        Statement::BlockStatement { body } => {
            for stmt in body {
                for_each_declaration(stmt, f);
            }
        }
        Statement::IfStatement {
            consequent,
            alternate,
            ..
        } => {
            for_each_declaration(consequent, f);
            if let Some(alternate) = alternate {
                for_each_declaration(alternate, f);
            }
        }
        Statement::WhileStatement { body, .. }
        | Statement::DoWhileStatement { body, .. }
        | Statement::ForStatement { body, .. }
        | Statement::ForInStatement { body, .. }
        | Statement::ForOfStatement { body, .. }
        | Statement::LabeledStatement { body, .. }
        | Statement::WithStatement { body, .. } => for_each_declaration(body, f),
        Statement::SwitchStatement { cases, .. } => {
            for case in cases {
                for stmt in &case.consequent {
                    for_each_declaration(stmt, f);
                }
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            for stmt in block {
                for_each_declaration(stmt, f);
            }
            if let Some(handler) = handler {
                for stmt in &handler.body {
                    for_each_declaration(stmt, f);
                }
            }
            if let Some(finalizer) = finalizer {
                for stmt in finalizer {
                    for_each_declaration(stmt, f);
                }
            }
        }
        Statement::ExportNamedDeclaration {
            declaration: Some(declaration),
            ..
        } => for_each_declaration(declaration, f),
        _ => {}
    }
}

/// Free-variable rewrite applied to cleaned def nodes: renames, const
/// violations, silent self-name assignment.
#[derive(Debug, Default, Clone)]
pub struct BodyRewrite {
    pub rename: HashMap<String, String>,
    pub const_names: HashSet<String>,
    pub silent_names: HashSet<String>,
}

impl BodyRewrite {
    pub fn renames(rename: HashMap<String, String>) -> Self {
        Self {
            rename,
            ..Self::default()
        }
    }
}

/// `(rhs, (() => { const c = 0; c = 0; })())` — evaluates the right side
/// then raises the authentic `TypeError`.
fn const_violation_expr(value: Expression) -> Expression {
    let throwing = call(
        arrow_block(
            vec![],
            vec![
                const_decl("c", number_lit(0.0)),
                expr_stmt(assign_expr(
                    AssignmentTarget::Identifier(Identifier::new("c")),
                    number_lit(0.0),
                )),
            ],
        ),
        vec![],
    );
    Expression::SequenceExpression {
        expressions: vec![value, throwing],
    }
}

pub fn rewrite_expression(
    expression: &mut Expression,
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    let replacement: Option<Expression> = match &mut *expression {
        Expression::Identifier(id) => {
            if !NameCollector::is_bound(scopes, &id.name) {
                if let Some(new_name) = rewrite.rename.get(&id.name) {
                    id.name = new_name.clone();
                }
            }
            None
        }
        Expression::AssignmentExpression { target, value, .. } => {
            rewrite_expression(value, rewrite, scopes);
            match target {
                AssignmentTarget::Identifier(id) if !NameCollector::is_bound(scopes, &id.name) => {
                    if rewrite.const_names.contains(&id.name) {
                        Some(const_violation_expr((**value).clone()))
                    } else if rewrite.silent_names.contains(&id.name) {
                        Some((**value).clone())
                    } else {
                        if let Some(new_name) = rewrite.rename.get(&id.name) {
                            id.name = new_name.clone();
                        }
                        None
                    }
                }
                AssignmentTarget::Member { object, property, .. } => {
                    rewrite_expression(object, rewrite, scopes);
                    if let MemberKey::Computed(expression) = property {
                        rewrite_expression(expression, rewrite, scopes);
                    }
                    None
                }
                AssignmentTarget::Pattern(pattern) => {
                    rewrite_assign_pattern(pattern, rewrite, scopes);
                    None
                }
                AssignmentTarget::Identifier(_) => None,
            }
        }
        Expression::UpdateExpression { argument, .. } => {
            if let Expression::Identifier(id) = &**argument {
                if !NameCollector::is_bound(scopes, &id.name)
                    && rewrite.const_names.contains(&id.name)
                {
                    Some(const_violation_expr((**argument).clone()))
                } else {
                    if let Expression::Identifier(id) = &mut **argument {
                        if !NameCollector::is_bound(scopes, &id.name) {
                            if let Some(new_name) = rewrite.rename.get(&id.name) {
                                id.name = new_name.clone();
                            }
                        }
                    }
                    None
                }
            } else {
                rewrite_expression(argument, rewrite, scopes);
                None
            }
        }
        Expression::FunctionExpression(function) => {
            push_scope_for(
                scopes,
                &function.params,
                &function.body,
                function.id.as_ref().map(|i| i.name.as_str()),
            );
            rewrite_params(&mut function.params, rewrite, scopes);
            rewrite_statements(&mut function.body, rewrite, scopes);
            scopes.pop();
            None
        }
        Expression::ArrowFunctionExpression(arrow_node) => {
            let body_stmts: &[Statement] = match &arrow_node.body {
                ArrowBody::Block(body) => body,
                ArrowBody::Expression(_) => &[],
            };
            push_scope_for(scopes, &arrow_node.params, body_stmts, None);
            rewrite_params(&mut arrow_node.params, rewrite, scopes);
            match &mut arrow_node.body {
                ArrowBody::Block(body) => rewrite_statements(body, rewrite, scopes),
                ArrowBody::Expression(expression) => rewrite_expression(expression, rewrite, scopes),
            }
            scopes.pop();
            None
        }
        Expression::ClassExpression(class) => {
            let mut scope = HashSet::new();
            if let Some(id) = &class.id {
                scope.insert(id.name.clone());
            }
            scopes.push(scope);
            if let Some(super_class) = &mut class.super_class {
                rewrite_expression(super_class, rewrite, scopes);
            }
            for member in &mut class.body {
                match member {
                    ClassMember::Method { key, function, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            rewrite_expression(expression, rewrite, scopes);
                        }
                        push_scope_for(scopes, &function.params, &function.body, None);
                        rewrite_params(&mut function.params, rewrite, scopes);
                        rewrite_statements(&mut function.body, rewrite, scopes);
                        scopes.pop();
                    }
                    ClassMember::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            rewrite_expression(expression, rewrite, scopes);
                        }
                        if let Some(value) = value {
                            rewrite_expression(value, rewrite, scopes);
                        }
                    }
                    ClassMember::StaticBlock { body } => {
                        scopes.push(HashSet::new());
                        rewrite_statements(body, rewrite, scopes);
                        scopes.pop();
                    }
                }
            }
            scopes.pop();
            None
        }
        other => {
            visit_child_expressions(other, &mut |child| {
                rewrite_expression(child, rewrite, scopes);
            });
            None
        }
    };
    if let Some(replacement) = replacement {
        *expression = replacement;
    }
}

fn rewrite_assign_pattern(
    pattern: &mut Pattern,
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    match pattern {
        Pattern::Identifier(id) => {
            if !NameCollector::is_bound(scopes, &id.name) {
                if let Some(new_name) = rewrite.rename.get(&id.name) {
                    id.name = new_name.clone();
                }
            }
        }
        Pattern::ArrayPattern { elements } => {
            for element in elements.iter_mut().flatten() {
                rewrite_assign_pattern(element, rewrite, scopes);
            }
        }
        Pattern::ObjectPattern { properties } => {
            for property in properties {
                match property {
                    ObjectPatternProperty::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            rewrite_expression(expression, rewrite, scopes);
                        }
                        rewrite_assign_pattern(value, rewrite, scopes);
                    }
                    ObjectPatternProperty::Rest { argument } => {
                        rewrite_assign_pattern(argument, rewrite, scopes)
                    }
                }
            }
        }
        Pattern::AssignmentPattern { left, right } => {
            rewrite_assign_pattern(left, rewrite, scopes);
            rewrite_expression(right, rewrite, scopes);
        }
        Pattern::RestElement { argument } => rewrite_assign_pattern(argument, rewrite, scopes),
    }
}

fn rewrite_params(
    params: &mut [Pattern],
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    for param in params {
        if let Pattern::AssignmentPattern { right, .. } = param {
            rewrite_expression(right, rewrite, scopes);
        }
    }
}

pub fn rewrite_statements(
    body: &mut [Statement],
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    for stmt in body {
        rewrite_statement(stmt, rewrite, scopes);
    }
}

fn rewrite_statement(
    stmt: &mut Statement,
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    match stmt {
        Statement::FunctionDeclaration(function) => {
            push_scope_for(scopes, &function.params, &function.body, None);
            rewrite_params(&mut function.params, rewrite, scopes);
            rewrite_statements(&mut function.body, rewrite, scopes);
            scopes.pop();
        }
        Statement::ClassDeclaration(class) => {
            let mut as_expr = Expression::ClassExpression(class.clone());
            rewrite_expression(&mut as_expr, rewrite, scopes);
            if let Expression::ClassExpression(rewritten) = as_expr {
                *class = rewritten;
            }
        }
        Statement::ExpressionStatement { expression } => {
            rewrite_expression(expression, rewrite, scopes)
        }
        Statement::ReturnStatement { argument: Some(e) } => rewrite_expression(e, rewrite, scopes),
        Statement::ThrowStatement { argument } => rewrite_expression(argument, rewrite, scopes),
        Statement::VariableDeclaration { declarations, .. } => {
            for decl in declarations {
                rewrite_binding_defaults(&mut decl.id, rewrite, scopes);
                if let Some(init) = &mut decl.init {
                    rewrite_expression(init, rewrite, scopes);
                }
            }
        }
        Statement::BlockStatement { body } => rewrite_statements(body, rewrite, scopes),
        Statement::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            rewrite_expression(test, rewrite, scopes);
            rewrite_statement(consequent, rewrite, scopes);
            if let Some(alternate) = alternate {
                rewrite_statement(alternate, rewrite, scopes);
            }
        }
        Statement::WhileStatement { test, body } => {
            rewrite_expression(test, rewrite, scopes);
            rewrite_statement(body, rewrite, scopes);
        }
        Statement::DoWhileStatement { body, test } => {
            rewrite_statement(body, rewrite, scopes);
            rewrite_expression(test, rewrite, scopes);
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
                            rewrite_expression(init, rewrite, scopes);
                        }
                    }
                }
                Some(ForInit::Expression(e)) => rewrite_expression(e, rewrite, scopes),
                None => {}
            }
            if let Some(test) = test {
                rewrite_expression(test, rewrite, scopes);
            }
            if let Some(update) = update {
                rewrite_expression(update, rewrite, scopes);
            }
            rewrite_statement(body, rewrite, scopes);
        }
        Statement::ForInStatement { left, right, body }
        | Statement::ForOfStatement {
            left, right, body, ..
        } => {
            if let ForTarget::Pattern(pattern) = left {
                rewrite_assign_pattern(pattern, rewrite, scopes);
            }
            rewrite_expression(right, rewrite, scopes);
            rewrite_statement(body, rewrite, scopes);
        }
        Statement::SwitchStatement { discriminant, cases } => {
            rewrite_expression(discriminant, rewrite, scopes);
            for case in cases {
                if let Some(test) = &mut case.test {
                    rewrite_expression(test, rewrite, scopes);
                }
                rewrite_statements(&mut case.consequent, rewrite, scopes);
            }
        }
        Statement::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            rewrite_statements(block, rewrite, scopes);
            if let Some(handler) = handler {
                let mut scope = HashSet::new();
                if let Some(param) = &handler.param {
                    let mut names = Vec::new();
                    crate::instrument::scopes::pattern_names(param, &mut names);
                    scope.extend(names);
                }
                scopes.push(scope);
                rewrite_statements(&mut handler.body, rewrite, scopes);
                scopes.pop();
            }
            if let Some(finalizer) = finalizer {
                rewrite_statements(finalizer, rewrite, scopes);
            }
        }
        Statement::LabeledStatement { body, .. } => rewrite_statement(body, rewrite, scopes),
        Statement::WithStatement { object, body } => {
            rewrite_expression(object, rewrite, scopes);
            rewrite_statement(body, rewrite, scopes);
        }
        _ => {}
    }
}

fn rewrite_binding_defaults(
    pattern: &mut Pattern,
    rewrite: &BodyRewrite,
    scopes: &mut Vec<HashSet<String>>,
) {
    match pattern {
        Pattern::Identifier(_) => {}
        Pattern::ArrayPattern { elements } => {
            for element in elements.iter_mut().flatten() {
                rewrite_binding_defaults(element, rewrite, scopes);
            }
        }
        Pattern::ObjectPattern { properties } => {
            for property in properties {
                match property {
                    ObjectPatternProperty::Property { key, value, .. } => {
                        if let PropertyKey::Computed(expression) = key {
                            rewrite_expression(expression, rewrite, scopes);
                        }
                        rewrite_binding_defaults(value, rewrite, scopes);
                    }
                    ObjectPatternProperty::Rest { argument } => {
                        rewrite_binding_defaults(argument, rewrite, scopes)
                    }
                }
            }
        }
        Pattern::AssignmentPattern { left, right } => {
            rewrite_binding_defaults(left, rewrite, scopes);
            rewrite_expression(right, rewrite, scopes);
        }
        Pattern::RestElement { argument } => rewrite_binding_defaults(argument, rewrite, scopes),
    }
}

/// Pushes a scope set for a function body: params, self name, hoisted vars
/// and lexical declarations.
fn push_scope_for(
    scopes: &mut Vec<HashSet<String>>,
    params: &[Pattern],
    body: &[Statement],
    self_name: Option<&str>,
) {
    let mut scope = HashSet::new();
    let mut names = Vec::new();
    for param in params {
        crate::instrument::scopes::pattern_names(param, &mut names);
    }
    crate::instrument::scopes::hoisted_var_names(body, &mut names);
    let mut lexical = Vec::new();
    crate::instrument::scopes::lexical_names(body, &mut lexical);
    names.extend(lexical.into_iter().map(|(n, _)| n));
    if let Some(name) = self_name {
        names.push(name.to_string());
    }
    names.push("arguments".to_string());
    scope.extend(names);
    scopes.push(scope);
}

/// Renames free occurrences of the mapped names inside `node`.
pub fn rename_free_vars(node: &mut Expression, rename: &HashMap<String, String>) {
    if rename.is_empty() {
        return;
    }
    let rewrite = BodyRewrite::renames(rename.clone());
    rewrite_expression(node, &rewrite, &mut vec![HashSet::new()]);
}
