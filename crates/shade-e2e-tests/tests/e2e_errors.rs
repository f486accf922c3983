mod common;

use shade_backend_core::{Backend, BackendOptions, EmitError};
use shade_backend_wgsl::WgslBackend;
use shade_diag::{Formatter, Location, SourceFile, Style};

#[test]
fn missing_return_type_reports_one_error_at_exact_location() {
    let file = SourceFile::new("bad.wgsl", "fn f() -> { }");
    let (_, diags) = shade_parser::parse(&file);
    assert_eq!(diags.error_count(), 1);
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.span.start, Location::new(1, 11));
    assert_eq!(diag.message, "expected return type, found '{'");
}

#[test]
fn formatted_diagnostic_quotes_the_line_with_a_caret() {
    let file = SourceFile::new("bad.wgsl", "fn f() -> { }");
    let (_, diags) = shade_parser::parse(&file);
    let text = Formatter::new(Style::default()).format(&file, &diags);
    assert_eq!(
        text,
        "bad.wgsl:1:11 error: expected return type, found '{'\n\
         fn f() -> { }\n\
         \u{20}         ^\n"
    );
}

#[test]
fn lexical_errors_recover_and_accumulate() {
    let file = SourceFile::new("bad.wgsl", "fn f() { let x\u{1} = 1; }\nfn g\u{2}() { }\n");
    let (module, diags) = shade_parser::parse(&file);
    assert!(diags.error_count() >= 2, "{diags:?}");
    // The lexer synthesized error tokens instead of aborting the file.
    assert!(!module.declarations.is_empty());
}

#[test]
fn semantic_errors_poison_only_their_declaration() {
    let (_, program) = common::resolve(
        "fn bad() { let x = missing; }\n\
         fn good() -> i32 { return 1; }\n",
    );
    assert!(!program.is_valid());
    // The healthy declaration still resolved.
    assert!(program.function_info(1).is_some());
}

#[test]
fn invalid_programs_never_reach_backend_output() {
    let (_, program) = common::resolve("fn f() { let x = missing; }");
    assert!(!program.is_valid());
    let module = shade_ir::Module::default();
    let err = WgslBackend
        .emit(&program, &module, &BackendOptions::default())
        .unwrap_err();
    assert!(matches!(err, EmitError::InvalidProgram));
    assert_eq!(err.to_string(), "input program is not valid");
}

#[test]
fn type_mismatch_cites_both_types() {
    let (_, program) = common::resolve("fn f() { var x: i32 = 1.5; }");
    assert!(!program.is_valid());
    let message = &program.diagnostics().iter().next().unwrap().message;
    assert!(message.contains("i32"), "{message}");
}

#[test]
fn attribute_misplacement_is_a_diagnostic_not_a_crash() {
    let (_, program) = common::resolve("@builtin(position) var<private> p: vec4<f32>;\nfn f() { }");
    assert!(!program.is_valid());
}
