//! Metal Shading Language emitter.
//!
//! Entry points receive their resources as attributed parameters
//! (`[[buffer(n)]]`, `[[texture(n)]]`) the way Metal kernels do;
//! workgroup and private variables become body-scope `threadgroup` /
//! `thread` declarations. Constructs Metal cannot express produce a
//! fatal [`EmitError`] with the offending source location.

mod emit;

use shade_backend_core::{
    check_supported_extensions, Backend, BackendOptions, BackendOutput, EmitError, OutputContent,
};
use shade_ir::Module;
use shade_parser::ast::Extension;
use shade_resolver::Program;

const SUPPORTED_EXTENSIONS: &[Extension] =
    &[Extension::F16, Extension::DisableUniformityAnalysis];

/// Backend emitting MSL source.
#[derive(Debug)]
pub struct MslBackend;

impl Backend for MslBackend {
    fn name(&self) -> &str {
        "MSL"
    }

    fn targets(&self) -> &[&str] {
        &["msl", "metal"]
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
        check_supported_extensions("MSL", program, SUPPORTED_EXTENSIONS)?;
        let text = emit::emit_program(program, options)?;
        Ok(BackendOutput::single(
            "shader.metal",
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
        let output = MslBackend.emit(&program, &module, &BackendOptions::default())?;
        match output.files.into_iter().next().unwrap().content {
            OutputContent::Text(text) => Ok(text),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn kernel_receives_resources_as_parameters() {
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
        assert!(text.starts_with("#include <metal_stdlib>\n\nusing namespace metal;\n"));
        assert!(text.contains("kernel void main_("));
        assert!(text.contains("device const float* input [[buffer(0)]]"));
        assert!(text.contains("device float* output [[buffer(1)]]"));
        assert!(text.contains("uint3 gid [[thread_position_in_grid]]"));
        assert!(text.contains("output[gid.x] = input[gid.x] * 2.0f;"));
    }

    #[test]
    fn workgroup_vars_declared_in_the_body() {
        let text = emit(
            r#"
var<workgroup> tile: array<f32, 64>;

@compute @workgroup_size(64)
fn main(@builtin(local_invocation_index) lid: u32) {
    tile[lid] = 0.0;
    workgroupBarrier();
}
"#,
        )
        .unwrap();
        assert!(text.contains("threadgroup float tile[64];"));
        assert!(text.contains("threadgroup_barrier(mem_flags::mem_threadgroup);"));
    }

    #[test]
    fn atomics_use_explicit_memory_order() {
        let text = emit(
            r#"
@group(0) @binding(0) var<storage, read_write> counter: atomic<u32>;

@compute @workgroup_size(1)
fn main() {
    let old = atomicAdd(&counter, 1u);
    _ = old;
}
"#,
        )
        .unwrap();
        assert!(text.contains("device atomic_uint& counter [[buffer(0)]]"));
        assert!(
            text.contains("atomic_fetch_add_explicit(&counter, 1u, memory_order_relaxed)"),
            "{text}"
        );
    }

    #[test]
    fn texture_sampling() {
        let text = emit(
            r#"
@group(0) @binding(0) var t: texture_2d<f32>;
@group(0) @binding(1) var s: sampler;

@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t, s, uv);
}
"#,
        )
        .unwrap();
        assert!(text.contains("texture2d<float> t [[texture(0)]]"));
        assert!(text.contains("sampler s [[sampler(1)]]"));
        assert!(text.contains("t.sample(s, uv)"));
    }

    #[test]
    fn unsupported_extension_is_fatal() {
        let err = emit("enable undefined_ext;\nfn f() { }").unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1 error: MSL backend does not support extension 'undefined_ext'"
        );
    }
}
