//! Integration tests for the WGSL parser.

use shade_diag::{Location, SourceFile};
use shade_parser::ast::{
    AttributeKind, Declaration, DirectiveKind, Extension, StatementKind, TypeExprKind,
};
use shade_parser::parse;

fn parse_src(source: &str) -> (shade_parser::ast::Module, shade_diag::DiagnosticList) {
    parse(&SourceFile::new("test.wgsl", source))
}

#[test]
fn empty_source_is_an_empty_module() {
    let (module, diags) = parse_src("");
    assert!(module.declarations.is_empty());
    assert!(module.directives.is_empty());
    assert!(diags.is_empty());
}

#[test]
fn parse_compute_entry_point() {
    let source = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> c: array<f32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    c[i] = a[i] + b[i];
}
"#;
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors(), "unexpected diagnostics");
    assert_eq!(module.declarations.len(), 4);

    let Declaration::Function(func) = &module.declarations[3] else {
        panic!("expected a function declaration");
    };
    assert_eq!(func.name.name, "main");
    assert_eq!(func.params.len(), 1);
    assert!(func
        .attributes
        .iter()
        .any(|a| matches!(a.kind, AttributeKind::Compute)));
    assert!(func
        .attributes
        .iter()
        .any(|a| matches!(a.kind, AttributeKind::WorkgroupSize { .. })));
    assert_eq!(func.body.statements.len(), 2);
}

#[test]
fn parse_vertex_entry_point_io() {
    let source = r#"
@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
"#;
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors());

    let Declaration::Function(func) = &module.declarations[0] else {
        panic!("expected a function");
    };
    assert!(func
        .attributes
        .iter()
        .any(|a| matches!(a.kind, AttributeKind::Vertex)));
    assert!(func
        .return_attributes
        .iter()
        .any(|a| matches!(&a.kind, AttributeKind::Builtin(b) if b.name == "position")));
    assert!(matches!(
        func.return_type.as_ref().map(|t| &t.kind),
        Some(TypeExprKind::Vector { .. })
    ));
}

#[test]
fn parse_struct_and_alias() {
    let source = r#"
struct Params {
    @size(16) count: u32,
    scale: f32,
}
alias Row = array<f32, 4>;
"#;
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors());
    assert_eq!(module.declarations.len(), 2);

    let Declaration::Struct(s) = &module.declarations[0] else {
        panic!("expected a struct");
    };
    assert_eq!(s.members.len(), 2);
    assert!(matches!(s.members[0].attributes[0].kind, AttributeKind::Size(_)));

    let Declaration::Alias(a) = &module.declarations[1] else {
        panic!("expected an alias");
    };
    assert!(matches!(a.ty.kind, TypeExprKind::Array { .. }));
}

#[test]
fn parse_directives() {
    let source = "enable f16;\nenable undefined_ext;\nrequires readonly_and_readwrite_storage_textures;\n";
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors());
    assert_eq!(module.directives.len(), 3);
    assert!(matches!(
        &module.directives[0].kind,
        DirectiveKind::Enable(Extension::F16)
    ));
    assert!(matches!(
        &module.directives[1].kind,
        DirectiveKind::Enable(Extension::Undefined(name)) if name == "undefined_ext"
    ));
}

#[test]
fn parse_control_flow_statements() {
    let source = r#"
fn f(x: i32) -> i32 {
    var total = 0;
    for (var i = 0; i < x; i++) {
        total += i;
    }
    while total > 100 {
        total -= 10;
    }
    loop {
        if total == 0 { break; }
        continuing {
            total -= 1;
            break if total < 0;
        }
    }
    switch total {
        case 0, 1: { return 0; }
        default: { }
    }
    return total;
}
"#;
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors(), "unexpected diagnostics");

    let Declaration::Function(func) = &module.declarations[0] else {
        panic!("expected a function");
    };
    let kinds: Vec<_> = func
        .body
        .statements
        .iter()
        .map(|s| std::mem::discriminant(&s.kind))
        .collect();
    assert_eq!(kinds.len(), 6);
    assert!(matches!(func.body.statements[1].kind, StatementKind::For { .. }));
    assert!(matches!(func.body.statements[2].kind, StatementKind::While { .. }));
    assert!(matches!(func.body.statements[3].kind, StatementKind::Loop { .. }));
    assert!(matches!(func.body.statements[4].kind, StatementKind::Switch { .. }));
}

#[test]
fn nested_template_close_splits_shift_token() {
    let (module, diags) = parse_src("var<storage> m: array<vec3<f32>>;\n");
    assert!(!diags.has_errors(), "'>>' should close both templates");
    assert_eq!(module.declarations.len(), 1);

    let (module, diags) = parse_src("var<private> m: array<vec3<f32>, 2>;\n");
    assert!(!diags.has_errors());
    assert_eq!(module.declarations.len(), 1);
}

#[test]
fn missing_return_type_is_one_error_at_exact_location() {
    // The '{' sits at line 1, column 11, where the return type belongs.
    let (_, diags) = parse_src("fn f() -> { }");
    assert_eq!(diags.error_count(), 1);
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.span.start, Location::new(1, 11));
    assert_eq!(diag.message, "expected return type, found '{'");
}

#[test]
fn multiple_independent_errors_surface_in_one_pass() {
    let source = "fn f() -> { }\nfn g() { let = 1; }\nfn ok() { }\n";
    let (module, diags) = parse_src(source);
    assert_eq!(diags.error_count(), 2);
    // The valid declaration after both errors still parses.
    assert!(module
        .declarations
        .iter()
        .any(|d| d.name().is_some_and(|n| n.name == "ok")));
}

#[test]
fn error_recovery_is_deterministic() {
    let source = "fn broken( { let x = ; }\nconst c = 1\nfn also_ok() { }\n";
    let (_, first) = parse_src(source);
    let (_, second) = parse_src(source);
    let render = |diags: &shade_diag::DiagnosticList| {
        diags
            .iter()
            .map(|d| format!("{}:{}", d.span.start, d.message))
            .collect::<Vec<_>>()
    };
    assert_eq!(render(&first), render(&second));
    assert!(first.has_errors());
}

#[test]
fn phony_assignment_and_const_assert() {
    let source = "const LIMIT = 8;\nconst_assert LIMIT > 0;\nfn f() { _ = LIMIT; }\n";
    let (module, diags) = parse_src(source);
    assert!(!diags.has_errors());
    assert!(matches!(module.declarations[1], Declaration::ConstAssert(_)));
}
