//! # Parser Adapter Tests

use pretty_assertions::assert_eq;

use crate::ast::printer::{print_program, PrintMode, PrintOptions};
use crate::ast::SourceType;
use crate::parser::{parse, source_maps, ParseError, ParseOptions};

fn opts() -> ParseOptions {
    ParseOptions::default()
}

fn round_trip(source: &str) -> String {
    let output = parse(source, &opts()).expect("parse failed");
    print_program(
        &output.program,
        &PrintOptions {
            mode: PrintMode::Compact,
            mappings: false,
        },
    )
}

#[test]
fn parses_declarations_and_expressions() {
    assert_eq!(round_trip("let x = 5;"), "let x=5;");
    assert_eq!(round_trip("const f = (a, b) => a + b;"), "const f=(a,b)=>a+b;");
    assert_eq!(
        round_trip("function g(x = 1, ...rest) { return rest.length + x; }"),
        "function g(x=1,...rest){return rest.length+x;}"
    );
}

#[test]
fn parses_classes() {
    assert_eq!(
        round_trip("class B extends A { constructor() { super(); } static m() {} }"),
        "class B extends A{constructor(){super();}static m(){}}"
    );
}

#[test]
fn parses_destructuring() {
    assert_eq!(round_trip("const {a, b: [c]} = obj;"), "const {a,b:[c]}=obj;");
    assert_eq!(round_trip("[a, b] = pair;"), "[a,b]=pair;");
}

#[test]
fn parses_control_flow() {
    assert_eq!(
        round_trip("try { f(); } catch (e) { g(e); } finally { h(); }"),
        "try{f();}catch(e){g(e);}finally{h();}"
    );
    assert_eq!(
        round_trip("switch (x) { case 1: a(); break; default: b(); }"),
        "switch(x){case 1:a();break;default:b();}"
    );
    assert_eq!(round_trip("for (const k in obj) f(k);"), "for(const k in obj)f(k);");
    assert_eq!(round_trip("for (const v of xs) f(v);"), "for(const v of xs)f(v);");
}

#[test]
fn parses_modules() {
    let source = "import d, {a as b} from \"m\";\nexport default d;";
    let output = parse(
        source,
        &ParseOptions {
            source_type: SourceType::Module,
            ..opts()
        },
    )
    .expect("parse failed");
    assert!(output.strict, "modules are strict");
    let printed = print_program(
        &output.program,
        &PrintOptions {
            mode: PrintMode::Compact,
            mappings: false,
        },
    );
    assert_eq!(printed, "import d,{a as b} from \"m\";export default d;");
}

#[test]
fn detects_use_strict() {
    let output = parse("\"use strict\";\nvar x = 1;", &opts()).expect("parse failed");
    assert!(output.strict);
    let output = parse("var x = 1;", &opts()).expect("parse failed");
    assert!(!output.strict);
}

#[test]
fn syntax_error_carries_filename() {
    let error = parse(
        "let = ;",
        &ParseOptions {
            filename: "bad.js".to_string(),
            ..opts()
        },
    )
    .expect_err("should fail");
    match error {
        ParseError::SyntaxError { filename, .. } => assert_eq!(filename, "bad.js"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn parses_with_statement() {
    assert_eq!(round_trip("with (obj) { f(x); }"), "with(obj){f(x);}");
}

#[test]
fn parses_template_literals() {
    assert_eq!(round_trip("const s = `a${x}b`;"), "const s=`a${x}b`;");
}

#[test]
fn strips_and_decodes_inline_source_map() {
    let map = source_maps::SourceMap {
        version: 3,
        sources: vec!["orig.js".to_string()],
        names: vec![],
        mappings: "AAAA".to_string(),
        ..Default::default()
    };
    let comment = source_maps::to_inline_comment(&map);
    let source = format!("let x = 1;\n{comment}\n");
    let (clean, decoded) = source_maps::extract(&source).expect("extract failed");
    assert!(!clean.contains("sourceMappingURL"));
    assert_eq!(decoded, Some(map));
}

#[test]
fn external_source_map_url_is_stripped_but_not_decoded() {
    let source = "let x = 1;\n//# sourceMappingURL=out.js.map\n";
    let (clean, decoded) = source_maps::extract(source).expect("extract failed");
    assert!(!clean.contains("sourceMappingURL"));
    assert_eq!(decoded, None);
}

#[test]
fn directives_preserved_in_function_bodies() {
    assert_eq!(
        round_trip("function f() { \"use strict\"; return 1; }"),
        "function f(){\"use strict\";return 1;}"
    );
}
