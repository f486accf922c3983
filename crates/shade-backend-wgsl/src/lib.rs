//! WGSL text emitter.
//!
//! Re-renders the resolved program as WGSL source. Emitted output
//! re-parses to an isomorphic program: emitting it again produces the
//! same text.

mod emit;

use shade_backend_core::{
    Backend, BackendOptions, BackendOutput, EmitError, OutputContent,
};
use shade_ir::Module;
use shade_resolver::Program;

/// Backend rendering the program back to WGSL.
#[derive(Debug)]
pub struct WgslBackend;

impl Backend for WgslBackend {
    fn name(&self) -> &str {
        "WGSL"
    }

    fn targets(&self) -> &[&str] {
        &["wgsl"]
    }

    fn emit(
        &self,
        program: &Program,
        _module: &Module,
        _options: &BackendOptions,
    ) -> Result<BackendOutput, EmitError> {
        if !program.is_valid() {
            return Err(EmitError::InvalidProgram);
        }
        // WGSL re-emits every directive verbatim, so no extension check.
        let text = emit::emit_program(program);
        Ok(BackendOutput::single(
            "shader.wgsl",
            OutputContent::Text(text),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_diag::SourceFile;

    fn emit(source: &str) -> String {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        let program = shade_resolver::resolve(&file, ast);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
        let module = shade_resolver::lower::build_module(&program);
        let output = WgslBackend
            .emit(&program, &module, &BackendOptions::default())
            .unwrap();
        match output.files.into_iter().next().unwrap().content {
            OutputContent::Text(text) => text,
            _ => panic!("expected text output"),
        }
    }

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
    fn emits_parsable_wgsl() {
        let text = emit(KERNEL);
        assert!(text.contains("@group(0) @binding(0) var<storage, read> input: array<f32>;"));
        assert!(text.contains("@compute @workgroup_size(64)"));
        assert!(text.contains("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {"));

        let file = SourceFile::new("roundtrip.wgsl", &text);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "emitted WGSL failed to re-parse: {diags:?}");
        let program = shade_resolver::resolve(&file, ast);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
    }

    #[test]
    fn emission_is_a_fixed_point() {
        let first = emit(KERNEL);
        let second = emit(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn directives_round_trip() {
        let text = emit("enable f16;\nfn f() { var x: f16 = 1.0h; }");
        assert!(text.starts_with("enable f16;\n"));
        assert!(text.contains("var x: f16 = 1.0h;"));
    }

    #[test]
    fn control_flow_round_trips() {
        let source = r#"
fn iterate(n: i32) -> i32 {
    var total = 0;
    for (var i = 0; i < n; i++) {
        total += i;
    }
    loop {
        if total > 100 {
            break;
        }
        continuing {
            total++;
            break if total < 0;
        }
    }
    switch total {
        case 0, 1: {
            return 0;
        }
        default: {
        }
    }
    while total > 10 {
        total -= 10;
    }
    return total;
}
"#;
        let first = emit(source);
        let second = emit(&first);
        assert_eq!(first, second);
        assert!(first.contains("break if"));
        assert!(first.contains("case 0, 1: {"));
    }

    #[test]
    fn structs_and_aliases_round_trip() {
        let source = "struct Light {\n  @size(16) pos: vec3<f32>,\n  intensity: f32,\n}\nalias Lights = array<Light, 4>;\n@group(0) @binding(0) var<uniform> lights: Lights;\n";
        let first = emit(source);
        assert!(first.contains("struct Light {"));
        assert!(first.contains("@size(16) pos: vec3<f32>,"));
        assert!(first.contains("alias Lights = array<Light, 4>;"));
        assert_eq!(first, emit(&first));
    }

    #[test]
    fn invalid_program_is_rejected() {
        let file = SourceFile::new("bad.wgsl", "fn f() { let x = missing; }");
        let (ast, _) = shade_parser::parse(&file);
        let program = shade_resolver::resolve(&file, ast);
        let module = shade_ir::Module::default();
        let err = WgslBackend
            .emit(&program, &module, &BackendOptions::default())
            .unwrap_err();
        assert!(matches!(err, EmitError::InvalidProgram));
    }
}
