//! Parser tests: declaration shapes, precedence, patterns, and recovery.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn parse(source: &str) -> Program {
    let (program, errors) = Parser::new(Lexer::new(source).tokenize()).parse();
    assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
    program
}

fn parse_with_errors(source: &str) -> (Program, Vec<pawc_base::CompileError>) {
    Parser::new(Lexer::new(source).tokenize()).parse()
}

fn parse_expr(source: &str) -> Expr {
    Parser::new(Lexer::new(source).tokenize())
        .parse_single_expression()
        .expect("expression should parse")
}

fn only_function(program: &Program) -> &FunctionDecl {
    match &program.statements[0].kind {
        StmtKind::Function(f) => f,
        other => panic!("expected function, got {other:?}"),
    }
}

// ============================================================================
// Declarations
// ============================================================================

#[test]
fn parses_simple_function() {
    let program = parse("fn main() -> i32 { return 2 + 3 * 4; }");
    let func = only_function(&program);
    assert_eq!(func.name, "main");
    assert!(!func.is_public);
    assert!(!func.is_method);
    assert_eq!(
        func.return_type.as_ref().unwrap().kind,
        TypeKind::Primitive(PrimitiveTy::I32)
    );
    assert_eq!(func.body.len(), 1);
}

#[test]
fn precedence_multiplication_binds_tighter() {
    let program = parse("fn main() -> i32 { return 2 + 3 * 4; }");
    let func = only_function(&program);
    let StmtKind::Return(Some(expr)) = &func.body[0].kind else {
        panic!("expected return");
    };
    // 2 + (3 * 4)
    let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = &expr.kind else {
        panic!("expected addition at the root, got {:?}", expr.kind);
    };
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn parses_generic_function_with_type_param() {
    let program = parse("fn id<T>(x: T) -> T { return x; }");
    let func = only_function(&program);
    assert_eq!(func.generic_params.len(), 1);
    assert_eq!(func.generic_params[0].name, "T");
    let Param::Named { ty, .. } = &func.params[0] else {
        panic!("expected named param");
    };
    assert_eq!(ty.kind, TypeKind::Generic("T".to_string()));
    assert_eq!(
        func.return_type.as_ref().unwrap().kind,
        TypeKind::Generic("T".to_string())
    );
}

#[test]
fn duplicate_generic_params_are_rejected() {
    let (_, errors) = parse_with_errors("fn f<T, T>(x: T) -> T { return x; }");
    assert!(errors.iter().any(|e| e.message.contains("duplicate type parameter")));
}

#[test]
fn parses_struct_with_fields_and_methods() {
    let program = parse(
        "struct Point {\n\
         \tx: i32,\n\
         \ty: i32,\n\
         \tfn sum(self) -> i32 { return self.x + self.y; }\n\
         \tfn origin() -> Self { return Point { x: 0, y: 0 }; }\n\
         }",
    );
    let StmtKind::Struct(decl) = &program.statements[0].kind else {
        panic!("expected struct");
    };
    assert_eq!(decl.fields.len(), 2);
    assert_eq!(decl.methods.len(), 2);
    assert!(decl.methods[0].is_method);
    assert!(!decl.methods[1].is_method);
    assert_eq!(
        decl.methods[1].return_type.as_ref().unwrap().kind,
        TypeKind::SelfType
    );
}

#[test]
fn parses_generic_struct() {
    let program = parse("struct Pair<K, V> { key: K, value: V, }");
    let StmtKind::Struct(decl) = &program.statements[0].kind else {
        panic!("expected struct");
    };
    assert_eq!(decl.generic_params.len(), 2);
    assert_eq!(decl.fields[0].ty.kind, TypeKind::Generic("K".to_string()));
}

#[test]
fn parses_enum_with_payloads() {
    let program = parse("enum Shape { Circle(i32), Point, Rect(i32, i32) }");
    let StmtKind::Enum(decl) = &program.statements[0].kind else {
        panic!("expected enum");
    };
    assert_eq!(decl.variants.len(), 3);
    assert_eq!(decl.variants[0].associated_types.len(), 1);
    assert!(decl.variants[1].associated_types.is_empty());
    assert_eq!(decl.variants[2].associated_types.len(), 2);
}

#[test]
fn parses_pub_visibility() {
    let program = parse("pub fn add(a: i32, b: i32) -> i32 { return a + b; } fn hidden() { }");
    let StmtKind::Function(public) = &program.statements[0].kind else {
        panic!();
    };
    let StmtKind::Function(private) = &program.statements[1].kind else {
        panic!();
    };
    assert!(public.is_public);
    assert!(!private.is_public);
}

#[test]
fn parses_import_paths() {
    let program = parse("import std::math;\nimport utils;");
    assert_eq!(program.imports(), vec!["std::math", "utils"]);
}

#[test]
fn parses_extern_declaration() {
    let program = parse("extern fn write(fd: i32, buf: string, n: i64) -> i64;");
    let StmtKind::Extern(decl) = &program.statements[0].kind else {
        panic!("expected extern");
    };
    assert_eq!(decl.name, "write");
    assert_eq!(decl.params.len(), 3);
    assert_eq!(
        decl.return_type.as_ref().unwrap().kind,
        TypeKind::Primitive(PrimitiveTy::I64)
    );
}

#[test]
fn parses_type_alias() {
    let program = parse("type Meters = i64;");
    let StmtKind::TypeAlias { name, aliased, .. } = &program.statements[0].kind else {
        panic!("expected type alias");
    };
    assert_eq!(name, "Meters");
    assert_eq!(aliased.kind, TypeKind::Primitive(PrimitiveTy::I64));
}

#[test]
fn parses_legacy_impl_block() {
    let program = parse(
        "struct Point { x: i32, }\n\
         impl Point { fn get_x(self) -> i32 { return self.x; } }",
    );
    let StmtKind::Impl { target, methods } = &program.statements[1].kind else {
        panic!("expected impl");
    };
    assert_eq!(target, "Point");
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_method);
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn parses_optional_and_array_types() {
    let program = parse(
        "fn f(a: [i32; 4], s: string) -> i32? { let b: [i64] = [1, 2]; return ok(0); }",
    );
    let func = only_function(&program);
    let Param::Named { ty, .. } = &func.params[0] else { panic!() };
    let TypeKind::Array { element, size } = &ty.kind else {
        panic!("expected array type");
    };
    assert_eq!(element.kind, TypeKind::Primitive(PrimitiveTy::I32));
    assert_eq!(*size, Some(4));
    let ret = func.return_type.as_ref().unwrap();
    assert!(matches!(ret.kind, TypeKind::Optional(_)));

    let StmtKind::Let { ty: Some(let_ty), .. } = &func.body[0].kind else {
        panic!("expected let with type");
    };
    assert!(matches!(
        let_ty.kind,
        TypeKind::Array { size: None, .. }
    ));
}

#[test]
fn parses_named_generic_type() {
    let program = parse("fn f(p: Pair<i32, string>) { }");
    let func = only_function(&program);
    let Param::Named { ty, .. } = &func.params[0] else { panic!() };
    let TypeKind::Named { name, generic_args } = &ty.kind else {
        panic!("expected named type");
    };
    assert_eq!(name, "Pair");
    assert_eq!(generic_args.len(), 2);
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn parses_generic_call_with_explicit_type_args() {
    let expr = parse_expr("id<i32>(7)");
    let ExprKind::Call { type_args, args, module_prefix, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert!(module_prefix.is_none());
    assert_eq!(type_args.len(), 1);
    assert_eq!(args.len(), 1);
}

#[test]
fn less_than_is_not_mistaken_for_type_args() {
    let expr = parse_expr("a < b");
    assert!(matches!(
        expr.kind,
        ExprKind::Binary { op: BinaryOp::Lt, .. }
    ));
}

#[test]
fn parses_module_qualified_call() {
    let expr = parse_expr("math::add(40, 2)");
    let ExprKind::Call { module_prefix, callee, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(module_prefix.as_deref(), Some("math"));
    assert!(matches!(&callee.kind, ExprKind::Identifier(n) if n == "add"));
}

#[test]
fn parses_cross_module_generic_call() {
    let expr = parse_expr("util::max<i64>(a, b)");
    let ExprKind::Call { module_prefix, type_args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(module_prefix.as_deref(), Some("util"));
    assert_eq!(type_args.len(), 1);
}

#[test]
fn enum_variant_vs_module_call_classification() {
    let program = parse(
        "enum Color { Red, Green, Blue }\n\
         fn main() -> i32 {\n\
         \tlet c = Color::Green;\n\
         \tlet x = m::f(1);\n\
         \treturn 0;\n\
         }",
    );
    let func = match &program.statements[1].kind {
        StmtKind::Function(f) => f,
        _ => panic!(),
    };
    let StmtKind::Let { init: Some(enum_init), .. } = &func.body[0].kind else {
        panic!();
    };
    assert!(matches!(
        &enum_init.kind,
        ExprKind::EnumVariant { enum_name, variant, .. }
            if enum_name == "Color" && variant == "Green"
    ));
    let StmtKind::Let { init: Some(call_init), .. } = &func.body[1].kind else {
        panic!();
    };
    assert!(matches!(
        &call_init.kind,
        ExprKind::Call { module_prefix: Some(m), .. } if m == "m"
    ));
}

#[test]
fn enum_classification_works_before_declaration() {
    // The enum is declared after its use; the pre-scan still classifies it.
    let program = parse(
        "fn main() -> i32 { let c = Color::Red; return 0; }\n\
         enum Color { Red }",
    );
    let func = only_function(&program);
    let StmtKind::Let { init: Some(init), .. } = &func.body[0].kind else {
        panic!();
    };
    assert!(matches!(init.kind, ExprKind::EnumVariant { .. }));
}

#[test]
fn parses_struct_literal_and_member_chain() {
    let program = parse(
        "struct Point { x: i32, }\n\
         fn f() -> i32 { let p = Point { x: 3 }; return p.x; }",
    );
    let StmtKind::Function(func) = &program.statements[1].kind else {
        panic!();
    };
    let StmtKind::Let { init: Some(init), .. } = &func.body[0].kind else {
        panic!();
    };
    assert!(matches!(&init.kind, ExprKind::StructLiteral { name, .. } if name == "Point"));
}

#[test]
fn struct_literal_requires_parens_in_condition() {
    // `if p { … }` must treat `{` as the body even though `p` could name a
    // struct; parenthesized literals are still allowed.
    let program = parse(
        "struct Flag { on: bool, }\n\
         fn f(flag: bool) -> i32 {\n\
         \tif flag { return 1; }\n\
         \treturn 0;\n\
         }",
    );
    assert_eq!(program.statements.len(), 2);
}

#[test]
fn parses_method_call_chain() {
    let expr = parse_expr("p.distance(q)");
    let ExprKind::Call { callee, args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert!(matches!(&callee.kind, ExprKind::Member { field, .. } if field == "distance"));
    assert_eq!(args.len(), 1);
}

#[test]
fn parses_try_and_cast_postfix() {
    let expr = parse_expr("parse(s)? as i64");
    let ExprKind::Cast { value, target } = &expr.kind else {
        panic!("expected cast");
    };
    assert_eq!(target.kind, TypeKind::Primitive(PrimitiveTy::I64));
    assert!(matches!(&value.kind, ExprKind::Try(_)));
}

#[test]
fn parses_ok_err_expressions() {
    assert!(matches!(parse_expr("ok(42)").kind, ExprKind::Ok(_)));
    assert!(matches!(parse_expr("err(\"nope\")").kind, ExprKind::Err(_)));
}

#[test]
fn parses_is_with_binding_pattern() {
    let expr = parse_expr("r is Error(m)");
    let ExprKind::Is { pattern, .. } = &expr.kind else {
        panic!("expected is");
    };
    let PatternKind::EnumVariant { enum_name, variant, bindings } = &pattern.kind else {
        panic!("expected variant pattern");
    };
    assert!(enum_name.is_none());
    assert_eq!(variant, "Error");
    assert!(matches!(&bindings[0].kind, PatternKind::Identifier(n) if n == "m"));
}

#[test]
fn parses_match_expression_with_arms() {
    let expr = parse_expr(
        "match c { Color::Red => 1, Color::Green => 2, _ => 0 }",
    );
    let ExprKind::Match { arms, .. } = &expr.kind else {
        panic!("expected match");
    };
    assert_eq!(arms.len(), 3);
    assert!(matches!(arms[2].pattern.kind, PatternKind::Wildcard));
}

#[test]
fn match_is_contextual_and_stays_usable_as_a_name() {
    let expr = parse_expr("match + 1");
    assert!(matches!(
        expr.kind,
        ExprKind::Binary { op: BinaryOp::Add, .. }
    ));
}

#[test]
fn parses_if_expression_with_phi_branches() {
    let expr = parse_expr("if a { 1 } else { 2 }");
    assert!(matches!(expr.kind, ExprKind::IfExpr { .. }));
}

#[test]
fn compound_assignment_desugars() {
    let expr = parse_expr("x += 2");
    let ExprKind::Assign { target, value } = &expr.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(&target.kind, ExprKind::Identifier(n) if n == "x"));
    assert!(matches!(
        &value.kind,
        ExprKind::Binary { op: BinaryOp::Add, .. }
    ));
}

#[test]
fn assignment_to_literal_is_rejected() {
    let result = Parser::new(Lexer::new("1 = 2").tokenize()).parse_single_expression();
    assert!(result.unwrap_err().message.contains("assignment target"));
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn parses_all_four_loop_shapes() {
    let program = parse(
        "fn f(arr: [i32; 3]) {\n\
         \tloop { break; }\n\
         \tloop x < 10 { continue; }\n\
         \tloop i in 0..10 { }\n\
         \tloop item in arr { }\n\
         }",
    );
    let func = only_function(&program);
    let kinds: Vec<_> = func
        .body
        .iter()
        .map(|s| match &s.kind {
            StmtKind::Loop { kind, .. } => kind,
            other => panic!("expected loop, got {other:?}"),
        })
        .collect();
    assert!(matches!(kinds[0], LoopKind::Infinite));
    assert!(matches!(kinds[1], LoopKind::Condition(_)));
    assert!(matches!(kinds[2], LoopKind::Range { .. }));
    assert!(matches!(kinds[3], LoopKind::Iterator { .. }));
}

// ============================================================================
// Error recovery and determinism
// ============================================================================

#[test]
fn recovers_and_reports_multiple_errors() {
    let (_, errors) = parse_with_errors(
        "fn a() { let = 1; }\n\
         fn b() { return 2; }\n\
         fn c() { let x 3; }",
    );
    assert!(errors.len() >= 2, "expected at least two errors, got {errors:?}");
}

#[test]
fn later_statements_survive_earlier_errors() {
    let (program, errors) = parse_with_errors(
        "fn broken() { let = ; }\n\
         fn fine() -> i32 { return 1; }",
    );
    assert!(!errors.is_empty());
    assert!(program.statements.iter().any(|s| matches!(
        &s.kind,
        StmtKind::Function(f) if f.name == "fine"
    )));
}

#[test]
fn invalid_token_surfaces_lexer_message() {
    let (_, errors) = parse_with_errors("fn f() { let s = \"oops; }");
    assert!(errors.iter().any(|e| e.message.contains("unterminated")));
}

#[test]
fn parse_is_deterministic() {
    let source = "struct P { x: i32, }\n\
                  enum E { A(i32), B }\n\
                  fn main() -> i32 {\n\
                  \tlet p = P { x: 1 };\n\
                  \treturn match E::A(2) { E::A(v) => v, _ => 0 };\n\
                  }";
    let first = parse(source);
    let second = parse(source);
    assert_eq!(first, second);
}

#[test]
fn self_outside_struct_is_rejected() {
    let (_, errors) = parse_with_errors("fn free(self) { }");
    assert!(errors.iter().any(|e| e.message.contains("struct methods")));
}
