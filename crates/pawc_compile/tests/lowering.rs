//! End-to-end lowering tests: source text in, textual IR out.
//!
//! These drive the same path the CLI uses (lex → parse → lower against a
//! shared symbol table) and assert on the decisive structure of the
//! generated IR rather than executing it, since running binaries needs the
//! external toolchain.

use pawc_base::CompileError;
use pawc_compile::{Lowerer, SymbolTable};
use pawc_llir::Module;
use pawc_syntax::{Lexer, Parser};

/// Parses and lowers a set of modules in dependency order (dependencies
/// first, entry last), sharing one symbol table.
fn lower_modules(
    sources: &[(&str, &str)],
    strict_match: bool,
) -> Result<Vec<Module>, CompileError> {
    let programs: Vec<(String, pawc_syntax::ast::Program)> = sources
        .iter()
        .map(|(name, source)| {
            let tokens = Lexer::new(source).tokenize();
            let (program, errors) = Parser::new(tokens).parse();
            assert!(errors.is_empty(), "parse errors in '{name}': {errors:?}");
            (name.to_string(), program)
        })
        .collect();

    let mut symbols = SymbolTable::new();
    let mut modules = Vec::new();
    for (name, program) in &programs {
        let mut lowerer = Lowerer::new(name.clone(), &mut symbols, strict_match);
        lowerer.lower_program(program)?;
        modules.push(lowerer.finish());
    }
    Ok(modules)
}

fn lower(source: &str) -> Module {
    lower_modules(&[("main", source)], false)
        .expect("lowering should succeed")
        .pop()
        .unwrap()
}

fn lower_err(source: &str) -> CompileError {
    lower_modules(&[("main", source)], false).expect_err("lowering should fail")
}

// ============================================================================
// Arithmetic and casts
// ============================================================================

#[test]
fn arithmetic_lowers_with_precedence() {
    let ir = lower("fn main() -> i32 { return 2 + 3 * 4; }").print_ir();
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("mul i32 3, 4"));
    assert!(ir.contains("add i32 2"));
}

#[test]
fn division_and_modulo_are_signed() {
    let ir = lower("fn main() -> i32 { return 7 / 2 + 7 % 2; }").print_ir();
    assert!(ir.contains("sdiv i32 7, 2"));
    assert!(ir.contains("srem i32 7, 2"));
}

#[test]
fn mixed_width_operands_sign_extend_the_narrow_side() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet a: i64 = 5;\n\
         \tlet b: i32 = 3;\n\
         \tlet c: i64 = a + b;\n\
         \treturn 0;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("sext i32"), "narrower operand must be sign-extended:\n{ir}");
}

#[test]
fn identity_cast_emits_no_conversion() {
    let ir = lower("fn main() -> i32 { let x: i32 = 5; return x as i32; }").print_ir();
    assert!(!ir.contains("sext"));
    assert!(!ir.contains("trunc"));
}

#[test]
fn widening_and_float_casts_use_signed_conversions() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet x: i32 = 5;\n\
         \tlet wide: i64 = x as i64;\n\
         \tlet f: f64 = x as f64;\n\
         \tlet back: i32 = f as i32;\n\
         \treturn back;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("sext i32"));
    assert!(ir.contains("sitofp i32"));
    assert!(ir.contains("fptosi double"));
}

// ============================================================================
// Strings and builtins
// ============================================================================

#[test]
fn string_concat_goes_through_the_runtime() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet s: string = \"foo\" + \"bar\";\n\
         \treturn 0;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("call i64 @strlen"));
    assert!(ir.contains("call ptr @malloc"));
    assert!(ir.contains("call ptr @strcpy"));
    assert!(ir.contains("call ptr @strcat"));
}

#[test]
fn println_builtin_is_emitted_link_once() {
    let ir = lower(
        "fn main() -> i32 { println(\"hi\"); return 0; }",
    )
    .print_ir();
    assert!(ir.contains("define linkonce_odr void @println"));
    assert!(ir.contains("call void @println(ptr @.str."));
}

// ============================================================================
// Generics (S2)
// ============================================================================

#[test]
fn generic_instantiation_is_cached_per_type_argument_list() {
    let ir = lower(
        "fn id<T>(x: T) -> T { return x; }\n\
         fn main() -> i32 {\n\
         \tlet a: i32 = id<i32>(7);\n\
         \tlet b: i32 = id<i32>(9);\n\
         \tlet c: i64 = id<i64>(11);\n\
         \treturn a;\n\
         }",
    )
    .print_ir();

    let id_i32_definitions = ir.matches("define i32 @id_i32(").count();
    assert_eq!(id_i32_definitions, 1, "one backend function per type-argument list:\n{ir}");
    assert!(ir.contains("define i64 @id_i64("));
    assert!(ir.contains("call i32 @id_i32(i32 7)"));
}

#[test]
fn generic_call_without_type_arguments_is_an_error() {
    let err = lower_err(
        "fn id<T>(x: T) -> T { return x; }\n\
         fn main() -> i32 { return id(7); }",
    );
    assert!(err.message.contains("requires explicit type arguments"));
}

#[test]
fn generic_arity_mismatch_is_an_error() {
    let err = lower_err(
        "fn pick<A, B>(a: A, b: B) -> A { return a; }\n\
         fn main() -> i32 { return pick<i32>(1, 2); }",
    );
    assert!(err.message.contains("expects 2 type argument(s)"));
}

#[test]
fn generic_struct_instantiates_type_and_methods() {
    let ir = lower(
        "struct Pair<K, V> {\n\
         \tkey: K,\n\
         \tvalue: V,\n\
         \tfn get_key(self) -> K { return self.key; }\n\
         }\n\
         fn main() -> i32 {\n\
         \tlet p: Pair<i32, i64> = Pair { key: 1, value: 2 };\n\
         \treturn p.get_key();\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("%Pair_i32_i64 = type"));
    assert!(ir.contains("define i32 @get_key_i32_i64(ptr"));
    assert!(ir.contains("call i32 @get_key_i32_i64(ptr"));
}

// ============================================================================
// Optionals (S3 and the Optional laws)
// ============================================================================

#[test]
fn ok_builds_a_tag_zero_record() {
    let ir = lower(
        "fn answer() -> i32? { return ok(42); }\n\
         fn main() -> i32 { return 0; }",
    )
    .print_ir();
    assert!(ir.contains("{ i32, i32, ptr }"));
    assert!(ir.contains("store i32 0"), "ok() must store tag 0:\n{ir}");
    assert!(ir.contains("store i32 42"));
    assert!(ir.contains("call ptr @malloc"));
    assert!(ir.contains("call ptr @memcpy"));
}

#[test]
fn err_builds_a_tag_one_record_with_message() {
    let ir = lower(
        "fn parse(s: string) -> i32? { return err(\"nope\"); }\n\
         fn main() -> i32 { return 0; }",
    )
    .print_ir();
    assert!(ir.contains("store i32 1"), "err() must store tag 1:\n{ir}");
    assert!(ir.contains("c\"nope\\00\""));
}

#[test]
fn err_outside_an_optional_function_is_an_error() {
    let err = lower_err("fn main() -> i32 { return err(\"boom\"); }");
    assert!(err.message.contains("'err' is only valid"));
}

#[test]
fn try_branches_on_the_tag_and_propagates_errors() {
    let ir = lower(
        "fn parse(s: string) -> i32? { return err(\"no\"); }\n\
         fn double(s: string) -> i32? {\n\
         \tlet v: i32 = parse(s)?;\n\
         \treturn ok(v + v);\n\
         }\n\
         fn main() -> i32 { return 0; }",
    )
    .print_ir();
    assert!(ir.contains("try_error:"));
    assert!(ir.contains("try_value:"));
    // The error path returns the whole Optional pointer to the caller.
    assert!(ir.contains("icmp eq i32 %"));
}

#[test]
fn try_in_a_non_optional_function_is_an_error() {
    let err = lower_err(
        "fn parse(s: string) -> i32? { return ok(1); }\n\
         fn main() -> i32 { let v: i32 = parse(\"x\")?; return v; }",
    );
    assert!(err.message.contains("enclosing function to return"));
}

#[test]
fn optional_propagation_scenario_compiles() {
    // S3: is-binding on the Error variant.
    let ir = lower(
        "fn parse(s: string) -> i32? { return err(\"nope\"); }\n\
         fn main() -> i32 {\n\
         \tlet r: i32? = parse(\"x\");\n\
         \tif (r is Error(m)) { return 1; }\n\
         \treturn 0;\n\
         }",
    )
    .print_ir();
    // Tag test against the Error ordinal.
    assert!(ir.contains("icmp eq i32"));
    assert!(ir.contains("define ptr @parse(ptr"));
}

// ============================================================================
// is-binding scope (property 7)
// ============================================================================

#[test]
fn is_binding_is_visible_in_then_branch() {
    lower(
        "fn parse(s: string) -> i32? { return ok(5); }\n\
         fn main() -> i32 {\n\
         \tlet r: i32? = parse(\"x\");\n\
         \tif (r is Value(x)) { return x; }\n\
         \treturn 0;\n\
         }",
    );
}

#[test]
fn is_binding_is_invisible_in_else_branch() {
    let err = lower_err(
        "fn parse(s: string) -> i32? { return ok(5); }\n\
         fn main() -> i32 {\n\
         \tlet r: i32? = parse(\"x\");\n\
         \tif (r is Value(x)) { return x; } else { return x; }\n\
         \treturn 0;\n\
         }",
    );
    assert!(err.message.contains("unknown variable 'x'"));
}

// ============================================================================
// match (S4)
// ============================================================================

#[test]
fn match_on_enum_switches_on_the_tag() {
    let ir = lower(
        "enum Color { Red, Green, Blue }\n\
         fn v(c: Color) -> i32 {\n\
         \treturn match c { Color::Red => 1, Color::Green => 2, Color::Blue => 3 };\n\
         }\n\
         fn main() -> i32 { return v(Color::Green); }",
    )
    .print_ir();
    assert!(ir.contains("switch i32 %"));
    assert!(ir.contains("i32 0, label %match_arm"));
    assert!(ir.contains("i32 1, label %match_arm"));
    assert!(ir.contains("i32 2, label %match_arm"));
}

#[test]
fn match_payload_binding_truncates_from_the_bit_bag() {
    let ir = lower(
        "enum Shape { Dot, Circle(i32) }\n\
         fn area(s: Shape) -> i32 {\n\
         \treturn match s { Shape::Circle(r) => r * r, _ => 0 };\n\
         }\n\
         fn main() -> i32 { return area(Shape::Circle(3)); }",
    )
    .print_ir();
    assert!(ir.contains("load i64"), "payload loads the i64 bit-bag:\n{ir}");
    assert!(ir.contains("trunc i64"));
}

#[test]
fn non_exhaustive_match_defaults_to_zero() {
    let ir = lower(
        "enum Color { Red, Green, Blue }\n\
         fn v(c: Color) -> i32 { return match c { Color::Red => 1 }; }\n\
         fn main() -> i32 { return v(Color::Red); }",
    )
    .print_ir();
    assert!(ir.contains("match_default:"));
    assert!(ir.contains("store i32 0"));
}

#[test]
fn strict_match_rejects_non_exhaustive_match() {
    let result = lower_modules(
        &[(
            "main",
            "enum Color { Red, Green, Blue }\n\
             fn v(c: Color) -> i32 { return match c { Color::Red => 1 }; }\n\
             fn main() -> i32 { return v(Color::Red); }",
        )],
        true,
    );
    let err = result.expect_err("strict matching must reject this");
    assert!(err.message.contains("non-exhaustive"));
}

#[test]
fn match_enum_ordinals_follow_declaration_order() {
    let ir = lower(
        "enum Direction { North, South, East, West }\n\
         fn code(d: Direction) -> i32 {\n\
         \treturn match d { Direction::West => 4, Direction::North => 1, _ => 0 };\n\
         }\n\
         fn main() -> i32 { return code(Direction::West); }",
    )
    .print_ir();
    // West is ordinal 3, North ordinal 0, regardless of arm order.
    assert!(ir.contains("i32 3, label"));
    assert!(ir.contains("i32 0, label"));
}

// ============================================================================
// Structs and methods
// ============================================================================

#[test]
fn struct_literal_heap_allocates_and_stores_fields() {
    let ir = lower(
        "struct Point { x: i32, y: i32, }\n\
         fn main() -> i32 {\n\
         \tlet p = Point { x: 10, y: 20 };\n\
         \treturn p.x;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("%Point = type { i32, i32 }"));
    assert!(ir.contains("call ptr @malloc(i64 8)"));
    assert!(ir.contains("getelementptr inbounds %Point, ptr %"));
}

#[test]
fn method_call_passes_the_struct_pointer_first() {
    let ir = lower(
        "struct Point {\n\
         \tx: i32,\n\
         \ty: i32,\n\
         \tfn sum(self) -> i32 { return self.x + self.y; }\n\
         }\n\
         fn main() -> i32 {\n\
         \tlet p = Point { x: 1, y: 2 };\n\
         \treturn p.sum();\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("define i32 @sum(ptr %arg0)"));
    assert!(ir.contains("call i32 @sum(ptr %"));
}

#[test]
fn associated_function_returns_the_struct_value() {
    let ir = lower(
        "struct Point {\n\
         \tx: i32,\n\
         \ty: i32,\n\
         \tfn origin() -> Self { return Point { x: 0, y: 0 }; }\n\
         }\n\
         fn main() -> i32 {\n\
         \tlet p = Point::origin();\n\
         \treturn p.x;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("define %Point @origin()"));
    // The returned heap pointer is dereferenced into the value return.
    assert!(ir.contains("load %Point, ptr %"));
}

#[test]
fn reassigning_an_immutable_variable_is_an_error() {
    let err = lower_err("fn main() -> i32 { let x = 1; x = 2; return x; }");
    assert!(err.message.contains("immutable"));
    assert!(err.hints.iter().any(|h| h.contains("let mut")));
}

#[test]
fn mutable_variables_can_be_reassigned() {
    let ir = lower("fn main() -> i32 { let mut x = 1; x = 2; x += 3; return x; }").print_ir();
    assert!(ir.contains("store i32 2"));
}

// ============================================================================
// Loops and control flow
// ============================================================================

#[test]
fn range_loop_has_test_and_step_blocks() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet mut total = 0;\n\
         \tloop i in 0..10 { total = total + i; }\n\
         \treturn total;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("rangeloop:"));
    assert!(ir.contains("rangestep:"));
    assert!(ir.contains("icmp slt i32"));
}

#[test]
fn continue_in_a_range_loop_jumps_to_the_step_block() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet mut total = 0;\n\
         \tloop i in 0..10 {\n\
         \t\tif i == 3 { continue; }\n\
         \t\ttotal = total + i;\n\
         \t}\n\
         \treturn total;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("br label %rangestep"));
}

#[test]
fn iterator_loop_walks_the_array_by_index() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet xs: [i32] = [1, 2, 3];\n\
         \tlet mut total = 0;\n\
         \tloop x in xs { total = total + x; }\n\
         \treturn total;\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("iterloop:"));
    assert!(ir.contains("icmp slt i32 %"));
    assert!(ir.contains("getelementptr inbounds [3 x i32]"));
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let err = lower_err("fn main() -> i32 { break; return 0; }");
    assert!(err.message.contains("'break' outside of a loop"));
}

#[test]
fn continue_outside_a_loop_is_an_error() {
    let err = lower_err("fn main() -> i32 { continue; return 0; }");
    assert!(err.message.contains("'continue' outside of a loop"));
}

#[test]
fn array_length_is_inferred_from_the_literal() {
    let ir = lower(
        "fn main() -> i32 {\n\
         \tlet xs: [i32] = [1, 2, 3, 4, 5];\n\
         \treturn xs[2];\n\
         }",
    )
    .print_ir();
    assert!(ir.contains("alloca [5 x i32]"));
}

// ============================================================================
// Modules and visibility (S5)
// ============================================================================

#[test]
fn public_cross_module_call_declares_a_local_mirror() {
    let modules = lower_modules(
        &[
            ("m", "pub fn add(a: i32, b: i32) -> i32 { return a + b; }"),
            ("main", "import m;\nfn main() -> i32 { return m::add(40, 2); }"),
        ],
        false,
    )
    .unwrap();

    let main_ir = modules[1].print_ir();
    assert!(main_ir.contains("declare i32 @add(i32, i32)"));
    assert!(main_ir.contains("call i32 @add(i32 40, i32 2)"));
}

#[test]
fn private_cross_module_call_is_rejected() {
    let err = lower_modules(
        &[
            (
                "m",
                "pub fn add(a: i32, b: i32) -> i32 { return a + b; }\n\
                 fn secret(a: i32, b: i32) -> i32 { return a - b; }",
            ),
            ("main", "import m;\nfn main() -> i32 { return m::secret(40, 2); }"),
        ],
        false,
    )
    .expect_err("private symbols must be inaccessible");
    assert!(err.message.contains("private"));
}

#[test]
fn cross_module_generic_instantiates_in_the_calling_module() {
    let modules = lower_modules(
        &[
            ("util", "pub fn id<T>(x: T) -> T { return x; }"),
            ("main", "import util;\nfn main() -> i32 { return util::id<i32>(7); }"),
        ],
        false,
    )
    .unwrap();

    let util_ir = modules[0].print_ir();
    let main_ir = modules[1].print_ir();
    assert!(
        main_ir.contains("define i32 @id_i32(i32 %arg0)"),
        "instance must live in the caller's module:\n{main_ir}"
    );
    assert!(!util_ir.contains("define i32 @id_i32"));
}

#[test]
fn double_registration_in_one_module_is_an_error() {
    let err = lower_err(
        "fn twice(x: i32) -> i32 { return x + x; }\n\
         fn twice(x: i32) -> i32 { return 2 * x; }",
    );
    assert!(err.message.contains("already defined"));
}

// ============================================================================
// Functions verify
// ============================================================================

#[test]
fn every_emitted_function_passes_verification() {
    let module = lower(
        "enum Color { Red, Green }\n\
         struct P { x: i32, fn get(self) -> i32 { return self.x; } }\n\
         fn pick(c: Color) -> i32 { return match c { Color::Red => 1, _ => 2 }; }\n\
         fn main() -> i32 {\n\
         \tlet p = P { x: 4 };\n\
         \tloop i in 0..3 { if i == 1 { break; } }\n\
         \treturn p.get() + pick(Color::Red);\n\
         }",
    );
    for (id, func) in module.functions() {
        assert!(
            module.verify_function(id).is_ok(),
            "function '{}' failed verification",
            func.name()
        );
    }
}
