//! HLSL text emitter.
//!
//! Walks the resolved program and renders Shader Model 5 style HLSL:
//! storage buffers become `(RW)StructuredBuffer`, uniforms become
//! `cbuffer` blocks, and entry points carry `SV_` semantics. Constructs
//! the dialect cannot express produce a fatal [`EmitError`] with the
//! offending source location.

mod emit;

use shade_backend_core::{
    check_supported_extensions, Backend, BackendOptions, BackendOutput, EmitError, OutputContent,
};
use shade_ir::Module;
use shade_parser::ast::Extension;
use shade_resolver::Program;

const SUPPORTED_EXTENSIONS: &[Extension] =
    &[Extension::F16, Extension::DisableUniformityAnalysis];

/// Backend emitting HLSL source.
#[derive(Debug)]
pub struct HlslBackend;

impl Backend for HlslBackend {
    fn name(&self) -> &str {
        "HLSL"
    }

    fn targets(&self) -> &[&str] {
        &["hlsl"]
    }

    fn emit(
        &self,
        program: &Program,
        _module: &Module,
        options: &BackendOptions,
    ) -> Result<BackendOutput, EmitError> {
        if !program.is_valid() {
            return Err(EmitError::InvalidProgram);
        }
        check_supported_extensions("HLSL", program, SUPPORTED_EXTENSIONS)?;
        let text = emit::emit_program(program, options)?;
        Ok(BackendOutput::single(
            "shader.hlsl",
            OutputContent::Text(text),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_diag::SourceFile;

    fn emit(source: &str) -> Result<String, EmitError> {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        let program = shade_resolver::resolve(&file, ast);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
        let module = shade_resolver::lower::build_module(&program);
        let output = HlslBackend.emit(&program, &module, &BackendOptions::default())?;
        match output.files.into_iter().next().unwrap().content {
            OutputContent::Text(text) => Ok(text),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn compute_kernel_gets_numthreads_and_buffers() {
        let text = emit(
            r#"
@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    output[gid.x] = input[gid.x] * 2.0;
}
"#,
        )
        .unwrap();
        assert!(text.contains("StructuredBuffer<float> input : register(t0, space0);"));
        assert!(text.contains("RWStructuredBuffer<float> output : register(u1, space0);"));
        assert!(text.contains("[numthreads(64, 1, 1)]"));
        assert!(text.contains("void main(uint3 gid : SV_DispatchThreadID) {"));
        assert!(text.contains("output[gid.x] = input[gid.x] * 2.0f;"));
    }

    #[test]
    fn types_map_to_hlsl_names() {
        let text = emit(
            "fn f() { var a: f32 = 1.0; var b: vec4<i32>; var c: mat2x2<f32>; var d: vec3<bool>; }",
        )
        .unwrap();
        assert!(text.contains("float a = 1.0f;"));
        assert!(text.contains("int4 b;"));
        assert!(text.contains("float2x2 c;"));
        assert!(text.contains("bool3 d;"));
    }

    #[test]
    fn uniform_becomes_a_cbuffer() {
        let text = emit(
            r#"
struct Params {
    scale: f32,
    count: u32,
}
@group(1) @binding(2) var<uniform> params: Params;

fn use_params() -> f32 {
    return params.scale;
}
"#,
        )
        .unwrap();
        assert!(text.contains("struct Params {"));
        assert!(text.contains("cbuffer cbuffer_params : register(b2, space1) {"));
        assert!(text.contains("Params params;"));
    }

    #[test]
    fn builtin_functions_are_renamed() {
        let text = emit(
            r#"
@compute @workgroup_size(1)
fn main() {
    var x = 0.5;
    x = mix(x, fract(x), inverseSqrt(x + 1.0));
    workgroupBarrier();
}
"#,
        )
        .unwrap();
        assert!(text.contains("lerp("));
        assert!(text.contains("frac("));
        assert!(text.contains("rsqrt("));
        assert!(text.contains("GroupMemoryBarrierWithGroupSync();"));
    }

    #[test]
    fn unsupported_extension_is_fatal() {
        let err = emit("enable undefined_ext;\nfn f() { }").unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1 error: HLSL backend does not support extension 'undefined_ext'"
        );
    }

    #[test]
    fn array_length_is_unsupported_with_location() {
        let err = emit(
            r#"
@group(0) @binding(0) var<storage, read> data: array<f32>;

@compute @workgroup_size(1)
fn main() {
    let n = arrayLength(&data);
}
"#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("error:"), "{text}");
        assert!(text.contains("arrayLength"), "{text}");
        assert!(text.starts_with("6:13"), "{text}");
    }

    #[test]
    fn fragment_entry_point() {
        let text = emit(
            r#"
@fragment
fn main(@builtin(front_facing) facing: bool) -> @location(0) vec4<f32> {
    if facing {
        return vec4<f32>(1.0, 0.0, 0.0, 1.0);
    }
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
"#,
        )
        .unwrap();
        assert!(text.contains("float4 main(bool facing : SV_IsFrontFace) : SV_Target0 {"));
        assert!(text.contains("return float4(1.0f, 0.0f, 0.0f, 1.0f);"));
    }
}
