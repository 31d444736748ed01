//! # Serializer Tests
//!
//! End-to-end scenarios: heaps are built the way a host records them
//! (instrumented sources with tracker comments, scope snapshots) and the
//! emitted source is asserted structurally. No tracker artifact may ever
//! survive into output.

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::heap::{
    ErrorKind, FunctionData, ObjectKind, PropertyDescriptor, PropertyName, Prototype,
    ScopeSnapshot, TypedArrayKind, Value,
};
use crate::instrument::{ScopeMeta, TrackerInfo};
use crate::runtime::{GlobalEntry, Instance, SpecialFunction};
use crate::serializer::{serialize, OutputFormat, SerializeError, SerializeOptions};

fn options() -> SerializeOptions {
    SerializeOptions {
        minify: true,
        ..SerializeOptions::default()
    }
}

fn run(instance: &mut Instance, value: &Value) -> String {
    serialize(instance, value, &options()).expect("serialize failed")
}

fn info(id: u32, scopes: Vec<ScopeMeta>) -> TrackerInfo {
    TrackerInfo {
        id,
        scopes,
        filename: "test.js".to_string(),
        is_method: false,
        is_proto_method: false,
        super_var_name: None,
        is_strict: false,
        is_eval: false,
        has_super_class: false,
        contains_eval: false,
        returns_super: false,
        first_super_statement_index: None,
    }
}

fn scope_meta(block_id: u32, vars: &[&str]) -> ScopeMeta {
    ScopeMeta {
        block_id,
        var_names: vars.iter().map(|v| v.to_string()).collect(),
        const_names: vec![],
        arg_names: None,
        block_name: None,
    }
}

/// Instrumented function source: declaration head, tracker comment,
/// prelude, body.
fn tracked_source(head: &str, info: &TrackerInfo, guard_args: &str, body: &str) -> String {
    let own = 90 + info.id;
    format!(
        "{head} {{/*{comment}*/const livepack0_scopeId_{own} = livepack0_getScopeId(); if (livepack0_scopeId_{own} === null) return livepack0_tracker({guard_args}); {body}}}",
        comment = info.to_comment(),
    )
}

#[test]
fn primitives_serialize_inline() {
    let mut instance = Instance::new();
    assert_eq!(run(&mut instance, &Value::Number(5.0)), "module.exports=5;");
    assert_eq!(run(&mut instance, &Value::Str("hi".to_string())), "module.exports=\"hi\";");
    assert_eq!(run(&mut instance, &Value::Undefined), "module.exports=undefined;");
    let js = serialize(
        &mut instance,
        &Value::Number(5.0),
        &SerializeOptions {
            format: OutputFormat::Js,
            ..options()
        },
    )
    .expect("serialize failed");
    assert_eq!(js, "5");
}

#[test]
fn self_cycle_patched_by_assignment() {
    // (() => { const a = {}; a.self = a; return a })()
    let mut instance = Instance::new();
    let a = instance.heap.alloc_plain();
    instance.heap.set_prop(a, "self", Value::Object(a));
    let code = run(&mut instance, &Value::Object(a));
    assert_eq!(
        code,
        "const exports$0={};exports$0.self=exports$0;module.exports=exports$0;"
    );
}

#[test]
fn shared_references_share_one_record() {
    let mut instance = Instance::new();
    let shared = instance.heap.alloc_plain();
    let root = instance.heap.alloc_plain();
    instance.heap.set_prop(root, "x", Value::Object(shared));
    instance.heap.set_prop(root, "y", Value::Object(shared));
    let code = run(&mut instance, &Value::Object(root));
    assert!(code.contains("const x={};"), "{code}");
    assert!(code.contains("{x:x,y:x}"), "{code}");
}

#[test]
fn sparse_array_with_length_fixup() {
    let mut instance = Instance::new();
    let arr = instance.heap.alloc(ObjectKind::Array { length: 5 });
    instance.heap.set_prop(arr, "0", Value::Number(1.0));
    instance.heap.set_prop(arr, "2", Value::Number(3.0));
    let object = instance.heap.object_mut(arr);
    if let ObjectKind::Array { length } = &mut object.kind {
        *length = 5;
    }
    let code = run(&mut instance, &Value::Object(arr));
    assert!(code.contains("[1,,3]"), "{code}");
    assert!(code.contains(".length=5;"), "{code}");
}

#[test]
fn typed_array_prints_constructor_call() {
    let mut instance = Instance::new();
    let ta = instance.heap.alloc(ObjectKind::TypedArray {
        kind: TypedArrayKind::Uint16,
        elements: vec![1000.0, 40000.0],
    });
    let code = run(&mut instance, &Value::Object(ta));
    assert_eq!(
        code,
        "const exports$0=new Uint16Array([1000,40000]);module.exports=exports$0;"
    );
}

#[test]
fn buffer_round_trips_as_base64() {
    let mut instance = Instance::new();
    let buf = instance.heap.alloc(ObjectKind::Buffer {
        bytes: b"ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_vec(),
    });
    let code = run(&mut instance, &Value::Object(buf));
    assert!(
        code.contains("Buffer.from(\"QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVo=\",\"base64\")"),
        "{code}"
    );
}

#[test]
fn boxed_primitives() {
    let mut instance = Instance::new();
    let s = instance.heap.alloc(ObjectKind::BoxedString("abc".to_string()));
    let code = run(&mut instance, &Value::Object(s));
    assert!(code.contains("new String(\"abc\")"), "{code}");
}

#[test]
fn date_and_regexp_and_error() {
    let mut instance = Instance::new();
    let date = instance.heap.alloc(ObjectKind::Date { timestamp_ms: 0.0 });
    assert!(run(&mut instance, &Value::Object(date)).contains("new Date(0)"));
    let regex = instance.heap.alloc(ObjectKind::RegExp {
        pattern: "a+".to_string(),
        flags: "g".to_string(),
    });
    assert!(run(&mut instance, &Value::Object(regex)).contains("/a+/g"));
    let error = instance.heap.alloc(ObjectKind::Error {
        kind: ErrorKind::TypeError,
        message: "bad".to_string(),
    });
    assert!(run(&mut instance, &Value::Object(error)).contains("new TypeError(\"bad\")"));
}

#[test]
fn map_and_set_with_cycles() {
    let mut instance = Instance::new();
    let map = instance.heap.alloc(ObjectKind::Map { entries: vec![] });
    if let ObjectKind::Map { entries } = &mut instance.heap.object_mut(map).kind {
        entries.push((Value::Str("self".to_string()), Value::Object(map)));
    }
    let code = run(&mut instance, &Value::Object(map));
    assert!(code.contains("new Map"), "{code}");
    assert!(code.contains(".set(\"self\",exports$0);"), "{code}");
}

#[test]
fn non_default_descriptor_uses_define_properties() {
    // Object.create({a: 1}, {b: {value: 2, enumerable: false}})
    let mut instance = Instance::new();
    let proto = instance.heap.alloc_plain();
    instance.heap.set_prop(proto, "a", Value::Number(1.0));
    let obj = instance.heap.alloc_plain();
    instance.heap.object_mut(obj).prototype = Prototype::Object(proto);
    instance.heap.define_prop(
        obj,
        PropertyName::str("b"),
        PropertyDescriptor {
            value: Some(Value::Number(2.0)),
            get: None,
            set: None,
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    let code = run(&mut instance, &Value::Object(obj));
    assert!(
        code.contains(
            "Object.defineProperties(Object.create({a:1}),{b:{value:2,writable:true,configurable:true}})"
        ),
        "{code}"
    );
}

#[test]
fn global_symbol_identity_is_shared() {
    let mut instance = Instance::new();
    let sym = instance.heap.alloc_global_symbol("k");
    let arr = instance
        .heap
        .alloc_array(vec![Value::Object(sym), Value::Object(sym)]);
    let code = run(&mut instance, &Value::Object(arr));
    assert!(code.contains("Symbol.for(\"k\")"), "{code}");
    assert!(code.contains("[k,k]"), "{code}");
}

#[test]
fn local_symbol_key_is_computed() {
    let mut instance = Instance::new();
    let sym = instance.heap.alloc_symbol(Some("tag"));
    let obj = instance.heap.alloc_plain();
    instance.heap.define_prop(
        obj,
        PropertyName::Symbol(sym),
        PropertyDescriptor::data(Value::Number(1.0)),
    );
    let code = run(&mut instance, &Value::Object(obj));
    assert!(code.contains("[Symbol(\"tag\")]:1"), "{code}");
}

#[test]
fn globals_serialize_as_references() {
    let mut instance = Instance::new();
    let json = instance.heap.alloc_plain();
    instance.register_global(
        json,
        GlobalEntry {
            parent: None,
            key: "JSON".to_string(),
            is_module: false,
        },
    );
    let code = run(&mut instance, &Value::Object(json));
    assert_eq!(code, "const exports$0=JSON;module.exports=exports$0;");
}

#[test]
fn module_global_becomes_require() {
    let mut instance = Instance::new();
    let util = instance.heap.alloc_plain();
    instance.register_global(
        util,
        GlobalEntry {
            parent: None,
            key: "util".to_string(),
            is_module: true,
        },
    );
    let promisify = instance.heap.alloc_plain();
    instance.register_global(
        promisify,
        GlobalEntry {
            parent: Some(Value::Object(util)),
            key: "promisify".to_string(),
            is_module: false,
        },
    );
    let code = run(&mut instance, &Value::Object(promisify));
    assert!(code.contains("require(\"util\")"), "{code}");
    assert!(code.contains(".promisify"), "{code}");
}

// Function scenarios.

/// `function f(x) { return x + 1 }` with `f.tag = {}` (S3).
#[test]
fn function_with_extra_property() {
    let mut instance = Instance::new();
    let i = info(0, vec![]);
    let source = tracked_source("function f(x)", &i, "", "return x + 1;");
    let f = instance.heap.alloc_function(FunctionData {
        source,
        scopes: vec![],
        name: "f".to_string(),
        length: 1,
    });
    let tag = instance.heap.alloc_plain();
    instance.heap.set_prop(f, "tag", Value::Object(tag));
    let code = run(&mut instance, &Value::Object(f));
    assert!(code.contains("function f(x){return x+1;}"), "{code}");
    assert!(code.contains("f.tag="), "{code}");
    assert!(!code.contains("livepack"), "tracker artifacts leaked: {code}");
}

/// Closure pair sharing one mutable variable (B5/S2).
#[test]
fn closures_share_scope_through_factory() {
    let mut instance = Instance::new();
    let get_info = info(0, vec![scope_meta(2, &["n"])]);
    let set_info = info(1, vec![scope_meta(2, &["n"])]);
    let snapshot = ScopeSnapshot {
        scope_id: 9,
        block_id: 2,
        values: vec![("n".to_string(), Value::Number(0.0))],
    };
    let get = instance.heap.alloc_function(FunctionData {
        source: tracked_source(
            "function get()",
            &get_info,
            "[livepack0_scopeId_2, n]",
            "return n;",
        ),
        scopes: vec![snapshot.clone()],
        name: "get".to_string(),
        length: 0,
    });
    let set = instance.heap.alloc_function(FunctionData {
        source: tracked_source(
            "function set(x)",
            &set_info,
            "[livepack0_scopeId_2, n]",
            "n = x;",
        ),
        scopes: vec![snapshot],
        name: "set".to_string(),
        length: 1,
    });
    let root = instance.heap.alloc_plain();
    instance.heap.set_prop(root, "get", Value::Object(get));
    instance.heap.set_prop(root, "set", Value::Object(set));

    let code = run(&mut instance, &Value::Object(root));
    assert_eq!(
        code,
        "const createScope=n=>[function get(){return n;},function set(x){n=x;}];\
         const scope=createScope(0);\
         const exports$0={get:scope[0],set:scope[1]};\
         module.exports=exports$0;"
    );
    assert!(!code.contains("livepack"));
}

/// A function closing over itself flattens into a self-referencing const.
#[test]
fn self_capturing_function() {
    let mut instance = Instance::new();
    let i = info(0, vec![scope_meta(1, &["f"])]);
    let source = tracked_source(
        "function f()",
        &i,
        "[livepack0_scopeId_1, f]",
        "return f;",
    );
    let f = instance.heap.alloc_function(FunctionData {
        source,
        scopes: vec![ScopeSnapshot {
            scope_id: 5,
            block_id: 1,
            values: vec![],
        }],
        name: "f".to_string(),
        length: 0,
    });
    if let ObjectKind::Function(data) = &mut instance.heap.object_mut(f).kind {
        data.scopes[0].values.push(("f".to_string(), Value::Object(f)));
    }
    let code = run(&mut instance, &Value::Object(f));
    assert_eq!(code, "const f=function f(){return f;};module.exports=f;");
}

/// A counter object with methods (S2): writes force the factory path and
/// methods re-emit wrapped in an object literal.
#[test]
fn object_methods_with_writes() {
    let mut instance = Instance::new();
    let mut inc_info = info(0, vec![scope_meta(2, &["n"])]);
    inc_info.is_method = true;
    let mut get_info = info(1, vec![scope_meta(2, &["n"])]);
    get_info.is_method = true;
    let snapshot = ScopeSnapshot {
        scope_id: 4,
        block_id: 2,
        values: vec![("n".to_string(), Value::Number(0.0))],
    };
    let inc = instance.heap.alloc_function(FunctionData {
        source: tracked_source(
            "inc()",
            &inc_info,
            "[livepack0_scopeId_2, n]",
            "n++; return n;",
        ),
        scopes: vec![snapshot.clone()],
        name: "inc".to_string(),
        length: 0,
    });
    let get = instance.heap.alloc_function(FunctionData {
        source: tracked_source(
            "get()",
            &get_info,
            "[livepack0_scopeId_2, n]",
            "return n;",
        ),
        scopes: vec![snapshot],
        name: "get".to_string(),
        length: 0,
    });
    let root = instance.heap.alloc_plain();
    instance.heap.set_prop(root, "inc", Value::Object(inc));
    instance.heap.set_prop(root, "get", Value::Object(get));

    let code = run(&mut instance, &Value::Object(root));
    assert!(code.contains("{inc(){n++;return n;}}.inc"), "{code}");
    assert!(code.contains("{get(){return n;}}.get"), "{code}");
    assert!(code.contains("createScope(0)"), "{code}");
    assert!(!code.contains("livepack"));
}

/// Class with a captured variable: the class body comment drives one
/// shared def; methods come back inside the class.
#[test]
fn class_with_captured_variable() {
    let mut instance = Instance::new();
    let i = info(0, vec![scope_meta(1, &["v"])]);
    let source = format!(
        "class C {{/*{comment}*/constructor() {{const livepack0_scopeId_8 = livepack0_getScopeId(); if (livepack0_scopeId_8 === null) return livepack0_tracker([livepack0_scopeId_1, v]);}} m() {{ return v; }}}}",
        comment = i.to_comment(),
    );
    let class = instance.heap.alloc_function(FunctionData {
        source,
        scopes: vec![ScopeSnapshot {
            scope_id: 3,
            block_id: 1,
            values: vec![("v".to_string(), Value::Number(7.0))],
        }],
        name: "C".to_string(),
        length: 0,
    });
    let proto = instance.heap.alloc_plain();
    instance
        .heap
        .set_prop(proto, "constructor", Value::Object(class));
    instance.heap.set_prop(class, "prototype", Value::Object(proto));

    let code = run(&mut instance, &Value::Object(class));
    assert!(code.contains("class C{m(){return 7;}}"), "{code}");
    assert!(!code.contains("constructor()"), "synthetic ctor dropped: {code}");
    assert!(!code.contains("livepack"));
}

/// `class B extends A {}` (B4/S7): reconstruction wires the prototype
/// chain explicitly and constructs through `Reflect.construct`.
#[test]
fn derived_class_reconstruction() {
    let mut instance = Instance::new();
    let a_info = info(0, vec![]);
    let a_source = format!("class A {{/*{}*/}}", a_info.to_comment());
    let a = instance.heap.alloc_function(FunctionData {
        source: a_source,
        scopes: vec![],
        name: "A".to_string(),
        length: 0,
    });
    let ap = instance.heap.alloc_plain();
    instance.heap.set_prop(ap, "constructor", Value::Object(a));
    instance.heap.set_prop(a, "prototype", Value::Object(ap));

    let mut b_info = info(1, vec![]);
    b_info.has_super_class = true;
    let b_source = format!("class B extends A {{/*{}*/}}", b_info.to_comment());
    let b = instance.heap.alloc_function(FunctionData {
        source: b_source,
        scopes: vec![],
        name: "B".to_string(),
        length: 0,
    });
    instance.heap.object_mut(b).prototype = Prototype::Object(a);
    let bp = instance.heap.alloc_plain();
    instance.heap.set_prop(bp, "constructor", Value::Object(b));
    instance.heap.object_mut(bp).prototype = Prototype::Object(ap);
    instance.heap.set_prop(b, "prototype", Value::Object(bp));

    let code = run(&mut instance, &Value::Object(b));
    assert!(
        code.contains("return Reflect.construct(Object.getPrototypeOf(B),args,B);"),
        "{code}"
    );
    assert!(code.contains("Object.setPrototypeOf(B,A);"), "{code}");
    assert!(code.contains("const A=class A{}"), "{code}");
    assert!(code.contains("B.prototype"), "{code}");
    assert!(code.contains("A.prototype"), "{code}");
    assert!(!code.contains("extends"), "heritage is rewired, not re-parsed: {code}");
    assert!(!code.contains("livepack"));
}

#[test]
fn untracked_function_is_an_error() {
    let mut instance = Instance::new();
    let f = instance.heap.alloc_function(FunctionData {
        source: "function native() {}".to_string(),
        scopes: vec![],
        name: "native".to_string(),
        length: 0,
    });
    let error = serialize(&mut instance, &Value::Object(f), &options()).expect_err("must fail");
    match error {
        SerializeError::NotInstrumentedFunction { name, trace } => {
            assert_eq!(name, "native");
            assert!(trace.contains("<root>"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn pending_promise_is_unsupported() {
    let mut instance = Instance::new();
    let p = instance.heap.alloc(ObjectKind::Promise);
    let error = serialize(&mut instance, &Value::Object(p), &options()).expect_err("must fail");
    assert!(matches!(error, SerializeError::UnsupportedValue { .. }));
}

#[test]
fn bound_function_emission() {
    let mut instance = Instance::new();
    let i = info(0, vec![]);
    let target = instance.heap.alloc_function(FunctionData {
        source: tracked_source("function add(a, b)", &i, "", "return a + b;"),
        scopes: vec![],
        name: "add".to_string(),
        length: 2,
    });
    let bound = instance.heap.alloc_function(FunctionData::default());
    instance.register_special(
        bound,
        SpecialFunction::Bound {
            target: Value::Object(target),
            this_arg: Value::Null,
            args: vec![Value::Number(1.0)],
        },
    );
    let code = run(&mut instance, &Value::Object(bound));
    assert!(code.contains(".bind(null,1)"), "{code}");
}

#[test]
fn split_async_emits_module_thunk() {
    let mut instance = Instance::new();
    let f = instance.split_async(Value::Number(42.0));
    let code = run(&mut instance, &f);
    assert!(code.contains("Promise.resolve("), "{code}");
    assert!(code.contains("Object.create(null)"), "{code}");
    assert!(code.contains("\"Module\""), "{code}");
    assert!(code.contains("Object.seal("), "{code}");
    assert!(code.contains("default:{value:42,writable:true,enumerable:true}"), "{code}");
}

#[test]
fn mangled_names() {
    let mut instance = Instance::new();
    let shared = instance.heap.alloc_plain();
    let root = instance.heap.alloc_plain();
    instance.heap.set_prop(root, "x", Value::Object(shared));
    instance.heap.set_prop(root, "y", Value::Object(shared));
    let code = serialize(
        &mut instance,
        &Value::Object(root),
        &SerializeOptions {
            mangle: true,
            ..options()
        },
    )
    .expect("serialize failed");
    assert!(code.starts_with("const a="), "{code}");
    assert!(code.contains("{x:a,y:a}"), "{code}");
}

#[test]
fn esm_format_imports_and_default_export() {
    let mut instance = Instance::new();
    let inner = instance.heap.alloc_plain();
    instance.register_global(
        inner,
        GlobalEntry {
            parent: None,
            key: "setTimeout".to_string(),
            is_module: false,
        },
    );
    let wrapped = instance.heap.alloc_function(FunctionData::default());
    instance.register_special(
        wrapped,
        SpecialFunction::Promisified {
            inner: Value::Object(inner),
        },
    );
    let code = serialize(
        &mut instance,
        &Value::Object(wrapped),
        &SerializeOptions {
            format: OutputFormat::Esm,
            ..options()
        },
    )
    .expect("serialize failed");
    assert!(code.contains("import * as util from \"util\";"), "{code}");
    assert!(code.contains("util.promisify(setTimeout)"), "{code}");
    assert!(code.contains("export default "), "{code}");
}

#[test]
fn exec_format_invokes_root() {
    let mut instance = Instance::new();
    let i = info(0, vec![]);
    let f = instance.heap.alloc_function(FunctionData {
        source: tracked_source("function main()", &i, "", "return 1;"),
        scopes: vec![],
        name: "main".to_string(),
        length: 0,
    });
    let code = serialize(
        &mut instance,
        &Value::Object(f),
        &SerializeOptions {
            format: OutputFormat::Exec,
            ..options()
        },
    )
    .expect("serialize failed");
    assert!(code.ends_with("main();"), "{code}");
}

#[test]
fn files_mode_wraps_output() {
    let mut instance = Instance::new();
    let files = crate::serializer::serialize_files(
        &mut instance,
        &Value::Number(1.0),
        &SerializeOptions {
            files: true,
            ..options()
        },
    )
    .expect("serialize failed");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].filename, "main.js");
    assert_eq!(files[0].content, "module.exports=1;");
}

// Randomized graphs: key sets, sharing, cycles.

#[derive(Debug, Clone)]
enum PropSpec {
    Number(u8),
    Back(u8),
    Cycle,
}

fn graph_strategy() -> impl Strategy<Value = Vec<Vec<(u8, PropSpec)>>> {
    let prop = prop_oneof![
        any::<u8>().prop_map(PropSpec::Number),
        any::<u8>().prop_map(PropSpec::Back),
        Just(PropSpec::Cycle),
    ];
    proptest::collection::vec(
        proptest::collection::vec((any::<u8>(), prop), 0..6),
        1..8,
    )
}

proptest! {
    #[test]
    fn random_object_graphs_serialize(spec in graph_strategy()) {
        let mut instance = Instance::new();
        let ids: Vec<u32> = (0..spec.len())
            .map(|_| instance.heap.alloc_plain())
            .collect();
        for (index, props) in spec.iter().enumerate() {
            for (key, prop) in props {
                let value = match prop {
                    PropSpec::Number(n) => Value::Number(*n as f64),
                    PropSpec::Back(i) => Value::Object(ids[*i as usize % (index + 1)]),
                    PropSpec::Cycle => Value::Object(ids[0]),
                };
                instance.heap.set_prop(ids[index], &format!("k{key}"), value);
            }
        }
        let root = ids[spec.len() - 1];
        let code = serialize(&mut instance, &Value::Object(root), &options())
            .expect("random graph failed to serialize");
        prop_assert!(!code.contains('\u{1}'), "placeholder leaked: {code}");
        prop_assert!(!code.contains("livepack"), "tracker artifact leaked: {code}");
        prop_assert!(code.ends_with(";"));
    }
}
