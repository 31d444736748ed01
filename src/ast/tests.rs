//! # AST and Printer Tests
//!
//! Covers precedence handling, statement-start hazards, literal
//! canonicalization, body comments and the whitespace modes.

use pretty_assertions::assert_eq;

use crate::ast::printer::{print_expression, print_program, PrintMode, PrintOptions};
use crate::ast::*;

fn compact() -> PrintOptions {
    PrintOptions {
        mode: PrintMode::Compact,
        mappings: false,
    }
}

fn expr(e: &Expression) -> String {
    print_expression(e, &compact())
}

fn program(body: Vec<Statement>) -> Program {
    Program {
        body,
        source_type: SourceType::Script,
    }
}

#[test]
fn prints_literals() {
    assert_eq!(expr(&null_lit()), "null");
    assert_eq!(expr(&bool_lit(true)), "true");
    assert_eq!(expr(&number_lit(5.0)), "5");
    assert_eq!(expr(&number_lit(0.5)), "0.5");
    assert_eq!(expr(&number_lit(-0.0)), "-0");
    assert_eq!(expr(&number_lit(f64::NAN)), "NaN");
    assert_eq!(expr(&number_lit(f64::INFINITY)), "Infinity");
    assert_eq!(expr(&string_lit("a\"b\n")), "\"a\\\"b\\n\"");
    assert_eq!(
        expr(&Expression::Literal(Literal::BigInt("123".to_string()))),
        "123n"
    );
    assert_eq!(
        expr(&Expression::Literal(Literal::RegExp {
            pattern: "a+".to_string(),
            flags: "gi".to_string(),
        })),
        "/a+/gi"
    );
}

#[test]
fn escapes_line_separators() {
    assert_eq!(expr(&string_lit("a\u{2028}b")), "\"a\\u2028b\"");
}

#[test]
fn binary_precedence_parenthesizes() {
    // (1 + 2) * 3
    let sum = Expression::BinaryExpression {
        left: Box::new(number_lit(1.0)),
        operator: BinaryOperator::Add,
        right: Box::new(number_lit(2.0)),
    };
    let product = Expression::BinaryExpression {
        left: Box::new(sum),
        operator: BinaryOperator::Multiply,
        right: Box::new(number_lit(3.0)),
    };
    assert_eq!(expr(&product), "(1+2)*3");
}

#[test]
fn exponentiation_left_operand_parenthesized() {
    let negated = Expression::UnaryExpression {
        operator: UnaryOperator::Minus,
        argument: Box::new(number_lit(2.0)),
    };
    let power = Expression::BinaryExpression {
        left: Box::new(negated),
        operator: BinaryOperator::Exponentiation,
        right: Box::new(number_lit(3.0)),
    };
    assert_eq!(expr(&power), "(-2)**3");
}

#[test]
fn nullish_mixed_with_or_gets_parens() {
    let or = Expression::LogicalExpression {
        left: Box::new(ident("a")),
        operator: LogicalOperator::Or,
        right: Box::new(ident("b")),
    };
    let nullish = Expression::LogicalExpression {
        left: Box::new(or),
        operator: LogicalOperator::NullishCoalescing,
        right: Box::new(ident("c")),
    };
    assert_eq!(expr(&nullish), "(a||b)??c");
}

#[test]
fn member_and_call_chains() {
    let chained = method_call(
        member(ident("a"), "b"),
        "c",
        vec![number_lit(1.0), ident("d")],
    );
    assert_eq!(expr(&chained), "a.b.c(1,d)");
}

#[test]
fn computed_member() {
    let access = member_computed(ident("obj"), string_lit("my key"));
    assert_eq!(expr(&access), "obj[\"my key\"]");
}

#[test]
fn number_base_of_member_parenthesized() {
    let access = member(number_lit(1.0), "toString");
    assert_eq!(expr(&access), "(1).toString");
}

#[test]
fn new_with_call_in_callee_parenthesized() {
    let callee = call(ident("factory"), vec![]);
    let instantiation = new_expr(callee, vec![]);
    assert_eq!(expr(&instantiation), "new (factory())()");
}

#[test]
fn arrow_with_object_body_parenthesized() {
    let body = Expression::ObjectExpression { properties: vec![] };
    let f = arrow(vec![], body);
    assert_eq!(expr(&f), "()=>({})");
}

#[test]
fn single_parameter_arrow_omits_parens() {
    let f = arrow(vec![ident_pattern("x")], ident("x"));
    assert_eq!(expr(&f), "x=>x");
}

#[test]
fn arrow_unparenthesized_in_argument_position() {
    let f = call(ident("run"), vec![arrow(vec![], number_lit(1.0))]);
    assert_eq!(expr(&f), "run(()=>1)");
}

#[test]
fn sequence_in_argument_position_parenthesized() {
    let seq = Expression::SequenceExpression {
        expressions: vec![number_lit(0.0), ident("f")],
    };
    let wrapped = call(ident("run"), vec![seq]);
    assert_eq!(expr(&wrapped), "run((0,f))");
}

#[test]
fn array_holes_round_trip() {
    let sparse = Expression::ArrayExpression {
        elements: vec![Some(number_lit(1.0)), None, None, Some(number_lit(4.0))],
    };
    assert_eq!(expr(&sparse), "[1,,,4]");
    let trailing_hole = Expression::ArrayExpression {
        elements: vec![Some(number_lit(1.0)), None],
    };
    assert_eq!(expr(&trailing_hole), "[1,,]");
}

#[test]
fn object_statement_wrapped_in_parens() {
    let stmt = expr_stmt(Expression::ObjectExpression { properties: vec![] });
    let out = print_program(&program(vec![stmt]), &compact());
    assert_eq!(out, "({});");
}

#[test]
fn negative_unary_pairs_do_not_fuse() {
    let inner = Expression::UnaryExpression {
        operator: UnaryOperator::Minus,
        argument: Box::new(ident("a")),
    };
    let outer = Expression::UnaryExpression {
        operator: UnaryOperator::Minus,
        argument: Box::new(inner),
    };
    assert_eq!(expr(&outer), "- -a");
}

#[test]
fn function_body_comment_prints_inside_braces() {
    let function = FunctionNode {
        id: Some(Identifier::new("f")),
        params: vec![],
        body: vec![Statement::ReturnStatement {
            argument: Some(number_lit(1.0)),
        }],
        is_async: false,
        is_generator: false,
        body_comment: Some("livepack_track:{\"id\":1}".to_string()),
    };
    let out = print_program(&program(vec![Statement::FunctionDeclaration(function)]), &compact());
    assert_eq!(out, "function f(){/*livepack_track:{\"id\":1}*/return 1;}");
}

#[test]
fn class_with_super_and_methods() {
    let class = ClassNode {
        id: Some(Identifier::new("B")),
        super_class: Some(Box::new(ident("A"))),
        body: vec![ClassMember::Method {
            key: PropertyKey::Identifier("constructor".to_string()),
            function: FunctionNode {
                id: None,
                params: vec![],
                body: vec![expr_stmt(call(Expression::SuperExpression, vec![]))],
                is_async: false,
                is_generator: false,
                body_comment: None,
            },
            kind: MethodKind::Constructor,
            is_static: false,
        }],
        body_comment: None,
    };
    let out = print_program(&program(vec![Statement::ClassDeclaration(class)]), &compact());
    assert_eq!(out, "class B extends A{constructor(){super();}}");
}

#[test]
fn getter_setter_object_literal() {
    let getter = ObjectMember::Property {
        key: PropertyKey::Identifier("x".to_string()),
        value: Expression::FunctionExpression(FunctionNode {
            id: None,
            params: vec![],
            body: vec![Statement::ReturnStatement {
                argument: Some(number_lit(1.0)),
            }],
            is_async: false,
            is_generator: false,
            body_comment: None,
        }),
        kind: PropertyKind::Get,
        method: false,
        shorthand: false,
    };
    let object = Expression::ObjectExpression {
        properties: vec![getter],
    };
    assert_eq!(expr(&object), "{get x(){return 1;}}");
}

#[test]
fn template_literal_round_trip() {
    let template = Expression::TemplateLiteral {
        quasis: vec![
            TemplateElement {
                raw: "a".to_string(),
                cooked: Some("a".to_string()),
                tail: false,
            },
            TemplateElement {
                raw: "b".to_string(),
                cooked: Some("b".to_string()),
                tail: true,
            },
        ],
        expressions: vec![ident("x")],
    };
    assert_eq!(expr(&template), "`a${x}b`");
}

#[test]
fn pretty_mode_indents_blocks() {
    let stmt = Statement::IfStatement {
        test: ident("a"),
        consequent: Box::new(Statement::BlockStatement {
            body: vec![expr_stmt(call(ident("f"), vec![]))],
        }),
        alternate: None,
    };
    let out = print_program(
        &program(vec![stmt]),
        &PrintOptions {
            mode: PrintMode::Pretty,
            mappings: false,
        },
    );
    assert_eq!(out, "if (a) {\n  f();\n}\n");
}

#[test]
fn minified_mode_separates_statements_with_newlines() {
    let out = print_program(
        &program(vec![
            const_decl("a", number_lit(1.0)),
            const_decl("b", number_lit(2.0)),
        ]),
        &PrintOptions {
            mode: PrintMode::Minified,
            mappings: false,
        },
    );
    assert_eq!(out, "const a=1;\nconst b=2;");
}

#[test]
fn import_and_export_forms() {
    let import = Statement::ImportDeclaration {
        specifiers: vec![
            ImportSpecifier::Default {
                local: Identifier::new("d"),
            },
            ImportSpecifier::Named {
                imported: "a".to_string(),
                local: Identifier::new("b"),
            },
        ],
        source: "mod".to_string(),
    };
    let export = Statement::ExportDefaultDeclaration {
        expression: ident("d"),
    };
    let out = print_program(&program(vec![import, export]), &compact());
    assert_eq!(out, "import d,{a as b} from \"mod\";export default d;");
}

#[test]
fn spread_in_calls_and_arrays() {
    let spread = Expression::SpreadElement {
        argument: Box::new(ident("xs")),
    };
    assert_eq!(expr(&call(ident("f"), vec![spread.clone()])), "f(...xs)");
    assert_eq!(
        expr(&Expression::ArrayExpression {
            elements: vec![Some(spread)],
        }),
        "[...xs]"
    );
}

#[test]
fn optional_chaining() {
    let access = Expression::MemberExpression {
        object: Box::new(ident("a")),
        property: MemberKey::Static("b".to_string()),
        optional: true,
    };
    assert_eq!(expr(&access), "a?.b");
    let invoke = Expression::CallExpression {
        callee: Box::new(ident("f")),
        arguments: vec![],
        optional: true,
    };
    assert_eq!(expr(&invoke), "f?.()");
}

#[test]
fn assignment_operators() {
    let add_assign = Expression::AssignmentExpression {
        operator: AssignmentOperator::AddAssign,
        target: AssignmentTarget::Identifier(Identifier::new("a")),
        value: Box::new(number_lit(1.0)),
    };
    assert_eq!(expr(&add_assign), "a+=1");
}

#[test]
fn labeled_and_loop_statements() {
    let body = Statement::ForStatement {
        init: Some(ForInit::Declaration {
            kind: DeclarationKind::Let,
            declarations: vec![VariableDeclarator {
                id: ident_pattern("i"),
                init: Some(number_lit(0.0)),
            }],
        }),
        test: Some(Expression::BinaryExpression {
            left: Box::new(ident("i")),
            operator: BinaryOperator::LessThan,
            right: Box::new(number_lit(3.0)),
        }),
        update: Some(Expression::UpdateExpression {
            operator: UpdateOperator::Increment,
            argument: Box::new(ident("i")),
            prefix: false,
        }),
        body: Box::new(Statement::BreakStatement {
            label: Some("outer".to_string()),
        }),
    };
    let labeled = Statement::LabeledStatement {
        label: "outer".to_string(),
        body: Box::new(body),
    };
    let out = print_program(&program(vec![labeled]), &compact());
    assert_eq!(out, "outer:for(let i=0;i<3;i++)break outer;");
}
