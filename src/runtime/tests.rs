//! # Tracker Runtime Tests

use crate::heap::{FunctionData, ObjectKind, PropertyName, Prototype, ScopeSnapshot, Value};
use crate::runtime::{EvalOutcome, Instance, RuntimeError, SpecialFunction};

fn tracked_function(instance: &mut Instance) -> u32 {
    // A function whose instrumented source carries a tracker comment and
    // whose scope snapshot reports one captured var.
    let source = "function f() {/*livepack_track:{\"id\":0,\"scopes\":[{\"blockId\":1,\"varNames\":[\"a\"]}],\"filename\":\"t.js\"}*/const livepack0_scopeId_2 = livepack0_getScopeId(); if (livepack0_scopeId_2 === null) return livepack0_tracker([livepack0_scopeId_1, a]); return a;}";
    instance.heap.alloc_function(FunctionData {
        source: source.to_string(),
        scopes: vec![ScopeSnapshot {
            scope_id: 7,
            block_id: 1,
            values: vec![("a".to_string(), Value::Number(1.0))],
        }],
        name: "f".to_string(),
        length: 0,
    })
}

#[test]
fn scope_ids_are_monotonic() {
    let mut instance = Instance::new();
    let a = instance.get_scope_id();
    let b = instance.get_scope_id();
    assert!(b > a);
}

#[test]
fn capture_cycle_arm_invoke_reset() {
    let mut instance = Instance::new();
    let f = tracked_function(&mut instance);
    instance.set_tracker_callback().expect("arm");
    let scopes = instance.invoke_for_capture(f).expect("capture");
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0].scope_id, 7);
    instance.reset_tracker_callback();
    // A fresh cycle works after reset.
    instance.set_tracker_callback().expect("re-arm");
    instance.reset_tracker_callback();
}

#[test]
fn reentrant_arming_is_rejected() {
    let mut instance = Instance::new();
    instance.set_tracker_callback().expect("arm");
    let error = instance.set_tracker_callback().expect_err("second arm");
    assert!(matches!(error, RuntimeError::ReentrantArm));
}

#[test]
fn invoke_without_arming_is_rejected() {
    let mut instance = Instance::new();
    let f = tracked_function(&mut instance);
    let error = instance.invoke_for_capture(f).expect_err("not armed");
    assert!(matches!(error, RuntimeError::NotArmed));
}

#[test]
fn untracked_function_is_fatal() {
    let mut instance = Instance::new();
    let f = instance.heap.alloc_function(FunctionData {
        source: "function native() { return 1; }".to_string(),
        ..FunctionData::default()
    });
    instance.set_tracker_callback().expect("arm");
    let error = instance.invoke_for_capture(f).expect_err("no metadata");
    assert!(matches!(error, RuntimeError::NotInstrumented));
}

#[test]
fn capture_consumes_the_armed_callback() {
    let mut instance = Instance::new();
    let f = tracked_function(&mut instance);
    instance.set_tracker_callback().expect("arm");
    instance.invoke_for_capture(f).expect("first capture");
    let error = instance.invoke_for_capture(f).expect_err("consumed");
    assert!(matches!(error, RuntimeError::NotArmed));
}

#[test]
fn eval_direct_reinstruments_with_higher_prefix() {
    let mut instance = Instance::new();
    let outcome = instance.eval_direct("let livepack0_x = 1; () => livepack0_x", 0, &[], false, "t.js");
    match outcome {
        EvalOutcome::Instrumented { code } => {
            // Prefix 0 is taken inside the eval body, so the wrapper
            // aliases the outer bindings under prefix 1.
            assert!(code.contains("livepack1_tracker"), "{code}");
            assert!(code.ends_with("(livepack0_tracker, livepack0_getScopeId)"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn eval_parse_failure_is_swallowed() {
    let mut instance = Instance::new();
    let outcome = instance.eval_direct("let = ;", 0, &[], false, "t.js");
    match outcome {
        EvalOutcome::ShouldThrow { code } => assert_eq!(code, "let = ;"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn split_async_builds_sealed_module_object() {
    let mut instance = Instance::new();
    let target = Value::Number(42.0);
    let f = instance.split_async(target.clone());
    let Some(f_id) = f.object_id() else {
        panic!("expected function object");
    };
    let Some(SpecialFunction::SplitAsync { module }) = instance.special_function(f_id).cloned()
    else {
        panic!("split function not registered");
    };
    let object = instance.heap.object(module);
    assert_eq!(object.prototype, Prototype::Null);
    assert!(!object.extensible);
    let default = object
        .properties
        .get(&PropertyName::str("default"))
        .expect("default property");
    assert_eq!(default.value, Some(Value::Number(42.0)));
    assert!(default.writable && default.enumerable && !default.configurable);
    // Symbol.toStringTag: "Module".
    let tag = object
        .properties
        .iter()
        .find_map(|(name, desc)| match name {
            PropertyName::Symbol(id) => Some((*id, desc)),
            _ => None,
        })
        .expect("toStringTag symbol");
    assert_eq!(tag.1.value, Some(Value::Str("Module".to_string())));
    match &instance.heap.object(tag.0).kind {
        ObjectKind::Symbol { well_known, .. } => {
            assert_eq!(well_known.as_deref(), Some("toStringTag"));
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn split_async_memoizes_module_per_value() {
    let mut instance = Instance::new();
    let obj = instance.heap.alloc_plain();
    let f1 = instance.split_async(Value::Object(obj));
    let f2 = instance.split_async(Value::Object(obj));
    let m1 = match instance.special_function(f1.object_id().unwrap()) {
        Some(SpecialFunction::SplitAsync { module }) => *module,
        _ => panic!(),
    };
    let m2 = match instance.special_function(f2.object_id().unwrap()) {
        Some(SpecialFunction::SplitAsync { module }) => *module,
        _ => panic!(),
    };
    assert_eq!(m1, m2, "same input value yields the same module object");
    assert_ne!(
        f1.object_id(),
        f2.object_id(),
        "each call returns a fresh function"
    );
}
