mod common;

use shade_backend_wgsl::WgslBackend;
use shade_diag::{Formatter, SourceFile, Style};
use shade_ir::{Arena, Function, NameKey, NameMap};

const KERNEL: &str = r#"
@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i < arrayLength(&input) {
        output[i] = input[i] * 2.0;
    }
}
"#;

#[test]
fn empty_source_compiles_to_an_empty_module() {
    let (_, program, module) = common::compile("");
    assert!(program.ast().declarations.is_empty());
    assert!(program.diagnostics().is_empty());
    assert!(module.functions.is_empty());
    assert!(module.globals.is_empty());
}

#[test]
fn repeated_resolution_is_deterministic() {
    // Byte-identical diagnostics and IR naming across runs.
    let source = format!("enable undefined_ext;\n{KERNEL}");
    let render = |source: &str| {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, _) = shade_parser::parse(&file);
        let program = shade_resolver::resolve(&file, ast);
        let diags = Formatter::new(Style::default()).format(&file, program.diagnostics());
        let module = shade_resolver::lower::build_module(&program);
        (diags, shade_ir::dump_module(&module))
    };
    assert_eq!(render(&source), render(&source));
}

#[test]
fn wgsl_round_trip_is_a_fixed_point() {
    let first = common::emit_text(KERNEL, &WgslBackend);
    let second = common::emit_text(&first, &WgslBackend);
    assert_eq!(first, second);
}

#[test]
fn round_tripped_program_is_isomorphic() {
    let (_, original, _) = common::compile(KERNEL);
    let emitted = common::emit_text(KERNEL, &WgslBackend);
    let (_, reparsed, _) = common::compile(&emitted);
    assert_eq!(
        original.ast().declarations.len(),
        reparsed.ast().declarations.len()
    );
    assert_eq!(original.extensions().len(), reparsed.extensions().len());
    assert!(reparsed.is_valid());
}

#[test]
fn ir_values_map_back_to_source_spans() {
    let (_, _, module) = common::compile(KERNEL);
    for (_, function) in module.functions.iter() {
        for (_, value) in function.values.iter() {
            assert!(value.span.is_valid(), "IR value lost its source span");
        }
    }
}

#[test]
fn colliding_value_names_get_numeric_suffixes() {
    let mut functions: Arena<Function> = Arena::new();
    let a = functions.append(Function::new("a"));
    let b = functions.append(Function::new("b"));
    let c = functions.append(Function::new("c"));
    let mut names = NameMap::new();
    assert_eq!(names.set_name(NameKey::Function(a), "x"), "x");
    assert_eq!(names.set_name(NameKey::Function(b), "x"), "x_1");
    assert_eq!(names.set_name(NameKey::Function(c), "x"), "x_2");
}

#[test]
fn shadowing_resolves_to_the_innermost_declaration() {
    let (_, program) = common::resolve(
        r#"
fn f() -> i32 {
    var x = 1;
    {
        var x = 2.0;
        x = 3.0;
    }
    return x;
}
"#,
    );
    assert!(program.is_valid(), "{:?}", program.diagnostics());
}
