//! End-to-end compile scenarios, driven through the public
//! `compile_file_with_config` entry point on whole source strings rather
//! than poking at individual codegen functions.

use emberc::config::{CompilerConfig, EmitKind};
use emberc::{compile_file_with_config, CompileOutcome};
use std::io::Write;

fn source_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".ember").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn jit(contents: &str) -> i32 {
    let file = source_file(contents);
    let config = CompilerConfig::new().with_emit(EmitKind::Jit);
    match compile_file_with_config(file.path(), &config).unwrap() {
        CompileOutcome::JitExit(code) => code,
        CompileOutcome::Artifacts(_) => panic!("expected JIT exit, got artifacts"),
    }
}

#[test]
fn main_returns_constant_via_jit() {
    let code = jit("nomangle main() -> i32 { return 42; }");
    assert_eq!(code, 42);
}

#[test]
fn textual_ir_emission_defines_main() {
    let file = source_file("nomangle main() -> i32 { return 42; }");
    let config = CompilerConfig::new().with_emit(EmitKind::TextualIr);
    let outcome = compile_file_with_config(file.path(), &config).unwrap();
    let CompileOutcome::Artifacts(paths) = outcome else {
        panic!("expected artifact paths");
    };
    assert_eq!(paths.len(), 1);
    let rendered = std::fs::read_to_string(&paths[0]).unwrap();
    assert!(rendered.contains("define") && rendered.contains("main"));
}

#[test]
fn function_call_adds_arguments() {
    let code = jit(
        "add(a: i32, b: i32) -> i32 { return a + b; }\n\
         nomangle main() -> i32 { return add(19, 23); }",
    );
    assert_eq!(code, 42);
}

#[test]
fn for_loop_counts_to_ten() {
    let code = jit(
        "nomangle main() -> i32 {\n\
         \x20  var i: i32 = 0;\n\
         \x20  for (var j: i32 = 0; j < 10; j = j + 1) {\n\
         \x20    i = i + 1;\n\
         \x20  }\n\
         \x20  return i;\n\
         }",
    );
    assert_eq!(code, 10);
}

#[test]
fn class_constructor_and_default_destructor_run() {
    // `Box` gets no user-written `__dtor`, so the default destructor (one
    // per instance, reverse field order) runs when `b` goes out of scope
    // at the end of `main`'s block. The constructor sets `value` through
    // the implicit `self` receiver.
    let code = jit(
        "class Box {\n\
         \x20  value: i32;\n\
         \x20  new(v: i32) { self.value = v; }\n\
         }\n\
         nomangle main() -> i32 {\n\
         \x20  var b: Box = new Box(42);\n\
         \x20  return b.value;\n\
         }",
    );
    assert_eq!(code, 42);
}

#[test]
fn generic_identity_instantiates_once_over_i32() {
    let code = jit(
        "id<T>(x: T) -> T { return x; }\n\
         nomangle main() -> i32 { return id<i32>(7); }",
    );
    assert_eq!(code, 7);

    let file = source_file(
        "id<T>(x: T) -> T { return x; }\n\
         nomangle main() -> i32 { return id<i32>(7); }",
    );
    let config = CompilerConfig::new().with_emit(EmitKind::TextualIr);
    let CompileOutcome::Artifacts(paths) = compile_file_with_config(file.path(), &config).unwrap() else {
        panic!("expected artifact paths");
    };
    let rendered = std::fs::read_to_string(&paths[0]).unwrap();
    let instantiations = rendered.matches("_Tmpl").count();
    assert_eq!(instantiations, 1, "calling id<i32> once must produce exactly one instantiation");
}

#[test]
fn method_call_on_an_instance_reads_a_field() {
    let code = jit(
        "class Box {\n\
         \x20  value: i32;\n\
         \x20  new(v: i32) { self.value = v; }\n\
         \x20  doubled() -> i32 { return self.value + self.value; }\n\
         }\n\
         nomangle main() -> i32 {\n\
         \x20  var b: Box = new Box(21);\n\
         \x20  return b.doubled();\n\
         }",
    );
    assert_eq!(code, 42);
}

#[test]
fn namespace_scoped_call_resolves_against_its_own_path() {
    let code = jit(
        "namespace math {\n\
         \x20  square(x: i32) -> i32 { return x * x; }\n\
         }\n\
         nomangle main() -> i32 { return math::square(7); }",
    );
    assert_eq!(code, 49);
}

#[test]
fn pipeline_operator_desugars_to_nested_calls() {
    let code = jit(
        "inc(x: i32) -> i32 { return x + 1; }\n\
         double(x: i32) -> i32 { return x * 2; }\n\
         nomangle main() -> i32 { return 20 |> inc |> double; }",
    );
    assert_eq!(code, 42);
}

#[test]
fn array_literal_indexes_like_any_array() {
    let code = jit(
        "nomangle main() -> i32 {\n\
         \x20  var xs: i32[3] = [10, 20, 12];\n\
         \x20  return xs[0] + xs[1] + xs[2];\n\
         }",
    );
    assert_eq!(code, 42);
}

#[test]
fn bare_class_literal_constructs_without_the_new_keyword() {
    let code = jit(
        "class Box {\n\
         \x20  value: i32;\n\
         \x20  new(v: i32) { self.value = v; }\n\
         }\n\
         nomangle main() -> i32 {\n\
         \x20  var b: Box = Box(42);\n\
         \x20  return b.value;\n\
         }",
    );
    assert_eq!(code, 42);
}

#[test]
fn two_broken_statements_report_two_parse_errors_and_no_object() {
    let file = source_file(
        "broken() -> i32 {\n\
         \x20  1 + ;\n\
         \x20  return 42;\n\
         \x20  2 + ;\n\
         }",
    );
    let config = CompilerConfig::new().with_emit(EmitKind::Object);
    let err = compile_file_with_config(file.path(), &config).unwrap_err();
    match err {
        emberc::diagnostics::CompileError::Parse(count, _) => assert_eq!(count, 2),
        other => panic!("expected a parse failure, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
}
