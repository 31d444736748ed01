//! # Instrumenter Tests
//!
//! The assertions target the compact printing of instrumented programs so
//! the inserted preamble, scope-id constants, tracker guards and metadata
//! comments are visible as plain substrings.

use pretty_assertions::assert_eq;

use crate::ast::printer::{PrintMode, PrintOptions};
use crate::ast::SourceType;
use crate::instrument::{
    choose_prefix_number, find_tracker_comment, instrument_code, InstrumentOptions,
};

fn options() -> InstrumentOptions {
    InstrumentOptions {
        filename: "test.js".to_string(),
        print: PrintOptions {
            mode: PrintMode::Compact,
            mappings: false,
        },
        ..InstrumentOptions::default()
    }
}

fn instrument(source: &str) -> String {
    instrument_code(source, &options()).expect("instrument failed").code
}

#[test]
fn prefix_number_avoids_collisions() {
    assert_eq!(choose_prefix_number("let x = 1;"), 0);
    assert_eq!(choose_prefix_number("let livepack0_tracker = 1;"), 1);
    assert_eq!(
        choose_prefix_number("let livepack0_x = 1, livepack1_y = 2;"),
        2
    );
    // Bare `livepack_` counts as prefix number zero.
    assert_eq!(choose_prefix_number("let livepack_tracker = 1;"), 1);
}

#[test]
fn preamble_binds_tracker_and_scope_counter() {
    let code = instrument("let x = 1;");
    assert!(code.starts_with(
        "const livepack0_tracker=require(\"revivify/runtime\").getTrackerForFile(\"test.js\");"
    ));
    assert!(code.contains("const livepack0_getScopeId=require(\"revivify/runtime\").getScopeId;"));
}

#[test]
fn esm_preamble_uses_import() {
    let output = instrument_code(
        "export const x = 1;",
        &InstrumentOptions {
            source_type: SourceType::Module,
            ..options()
        },
    )
    .expect("instrument failed");
    assert!(output
        .code
        .starts_with("import livepack0_init from \"revivify/runtime\";"));
    assert!(output.code.contains("livepack0_init.getTrackerForFile(\"test.js\")"));
}

#[test]
fn function_capture_gets_guard_and_comment() {
    let code = instrument("let a = 1; function f() { return a; }");
    // Program scope is identified because `a` is captured.
    assert!(code.contains("const livepack0_scopeId_1=livepack0_getScopeId();"));
    // Function body scope-id constant and guard.
    assert!(code.contains("const livepack0_scopeId_2=livepack0_getScopeId();"));
    assert!(code.contains(
        "if(livepack0_scopeId_2===null)return livepack0_tracker([livepack0_scopeId_1,a]);"
    ));
    // Metadata comment inside the function body.
    let info = find_tracker_comment(&code).expect("tracker comment missing");
    assert_eq!(info.filename, "test.js");
    assert_eq!(info.scopes.len(), 1);
    assert_eq!(info.scopes[0].block_id, 1);
    assert_eq!(info.scopes[0].var_names, vec!["a".to_string()]);
}

#[test]
fn capture_free_function_still_tracked() {
    let code = instrument("function f() { return 1; }");
    assert!(code.contains("/*livepack_track:"));
    assert!(code.contains("return livepack0_tracker();"));
}

#[test]
fn const_capture_is_marked() {
    let code = instrument("const c = 1; function f() { return c; }");
    let info = find_tracker_comment(&code).expect("comment");
    assert_eq!(info.scopes[0].const_names, vec!["c".to_string()]);
}

#[test]
fn arrow_expression_body_converted_to_block() {
    let code = instrument("const f = x => x;");
    assert!(code.contains("=>{"));
    assert!(code.contains("return x;"));
    assert!(code.contains("/*livepack_track:"));
}

#[test]
fn arrow_captures_this_from_enclosing_function() {
    let code = instrument("function f() { return () => this; }");
    assert!(code.contains(",this]"), "guard passes `this`: {code}");
    let comment_count = code.matches("/*livepack_track:").count();
    assert_eq!(comment_count, 2, "outer function and arrow both tracked");
}

#[test]
fn nested_capture_registers_on_every_intervening_function() {
    let code = instrument("let a = 1; function outer() { return function inner() { return a; }; }");
    // Both functions list the program scope in their guards.
    let guard_count = code.matches("[livepack0_scopeId_1,a]").count();
    assert_eq!(guard_count, 2);
}

#[test]
fn direct_eval_is_rewritten_and_freezes_scopes() {
    let code = instrument("function f() { const x = 1; return eval(\"x\"); }");
    assert!(code.contains("livepack0_tracker.evalDirect(eval,["));
    // Scope defs carry the visible var names.
    assert!(code.contains("\"x\""));
    let info = find_tracker_comment(&code).expect("comment");
    assert!(info.contains_eval);
}

#[test]
fn indirect_eval_reference_is_rewritten() {
    let code = instrument("const e = eval;");
    assert!(code.contains("const e=livepack0_tracker.evalIndirect;"));
}

#[test]
fn shadowed_eval_is_untouched() {
    let code = instrument("function f(eval) { return eval(\"x\"); }");
    assert!(!code.contains("evalDirect"));
    assert!(!code.contains("evalIndirect"));
}

#[test]
fn with_body_instrumentation_goes_through_alias() {
    let code = instrument("with (o) { const f = () => 1; f(); }");
    assert!(code.contains("const livepack0_temp_0=[livepack0_tracker,livepack0_getScopeId];"));
    assert!(code.contains("livepack0_temp_0[1]()"), "scope ids via alias: {code}");
    assert!(code.contains("livepack0_temp_0[0]("), "tracker via alias: {code}");
}

#[test]
fn with_without_inner_functions_is_unchanged() {
    let code = instrument("with (o) { f(); }");
    assert!(code.contains("with(o){f();}"));
    assert!(!code.contains("livepack0_temp"));
}

#[test]
fn class_comment_sits_on_class_body() {
    let code = instrument("let v = 1; class C { m() { return v; } }");
    assert!(code.contains("class C{/*livepack_track:"));
    // Synthesized constructor hosts the guard.
    assert!(code.contains("constructor(){"));
    assert!(code.contains("[livepack0_scopeId_1,v]"));
}

#[test]
fn derived_class_synthesized_constructor_forwards_args() {
    let code = instrument("let v = 1; class B extends A { m() { return v; } }");
    assert!(code.contains("constructor(...livepack0_args)"));
    assert!(code.contains("super(...livepack0_args);"));
    let info = find_tracker_comment(&code).expect("comment");
    assert!(info.has_super_class);
}

#[test]
fn class_with_super_method_captures_home() {
    let code = instrument("class B extends A { m() { return super.m(); } }");
    let info = find_tracker_comment(&code).expect("comment");
    assert_eq!(info.super_var_name.as_deref(), Some("B"));
    // The guard passes the class binding itself.
    assert!(code.contains(",B]"));
}

#[test]
fn object_method_with_super_uses_hoisted_temp() {
    let code = instrument("const o = { m() { return super.toString(); } };");
    assert!(code.contains("var livepack0_temp_0;"));
    assert!(code.contains("livepack0_temp_0={"), "object wrapped in assignment: {code}");
    let info = find_tracker_comment(&code).expect("comment");
    assert!(info.is_method);
    assert_eq!(info.super_var_name.as_deref(), Some("livepack0_temp_0"));
}

#[test]
fn named_class_expression_self_reference_goes_through_temp() {
    let code = instrument("const K = class C { m() { return C; } };");
    assert!(code.contains("livepack0_temp_0=class C"));
    assert!(code.contains("return livepack0_temp_0;"), "self reference aliased: {code}");
}

#[test]
fn explicit_constructor_super_position_recorded() {
    let code = instrument(
        "class B extends A { constructor() { super(); this.x = 1; } }",
    );
    let info = find_tracker_comment(&code).expect("comment");
    assert_eq!(info.first_super_statement_index, Some(0));
    assert!(!info.returns_super);
}

#[test]
fn for_loop_lexical_header_gets_per_iteration_scope() {
    let code = instrument("for (let i = 0; i < 3; i++) { fns.push(() => i); }");
    // The loop body opens with the header block's scope-id constant.
    assert!(code.contains("{const livepack0_scopeId_2=livepack0_getScopeId();"));
}

#[test]
fn arguments_usage_marks_parameters() {
    let code = instrument("function f(a, b) { return () => arguments[0] + a; }");
    // The arrow's comment (the second one) lists the function scope with
    // its parameter names.
    let scope = all_tracker_comments(&code)
        .into_iter()
        .flat_map(|info| info.scopes)
        .find(|s| s.arg_names.is_some())
        .expect("arguments scope");
    assert_eq!(
        scope.arg_names.as_deref(),
        Some(&["a".to_string(), "b".to_string()][..])
    );
    assert!(scope.var_names.contains(&"arguments".to_string()));
}

fn all_tracker_comments(code: &str) -> Vec<crate::instrument::TrackerInfo> {
    let mut out = Vec::new();
    let mut rest = code;
    while let Some(start) = rest.find("/*livepack_track:") {
        let body = &rest[start + 2..];
        if let Some(end) = body.find("*/") {
            if let Some(info) = crate::instrument::TrackerInfo::from_comment(&body[..end]) {
                out.push(info);
            }
            rest = &body[end..];
        } else {
            break;
        }
    }
    out
}

#[test]
fn instrumentation_is_idempotent() {
    let source = "let a = 1; function f() { return a; }";
    let once = instrument(source);
    let twice = instrument(&once);
    assert_eq!(once, twice);
}

#[test]
fn use_strict_directive_stays_first() {
    let code = instrument("\"use strict\";\nlet x = 1;");
    assert!(code.starts_with("\"use strict\";const livepack0_tracker="));
}

#[test]
fn tracker_comment_round_trips_through_find() {
    let code = instrument("let a = 1; const f = () => a;");
    let info = find_tracker_comment(&code).expect("comment");
    assert_eq!(info.scopes[0].var_names, vec!["a".to_string()]);
    assert!(!info.is_method);
}
