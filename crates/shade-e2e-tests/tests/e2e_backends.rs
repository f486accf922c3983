mod common;

use shade_backend_core::{
    Backend, BackendOptions, BackendRegistry, GlslVersion, IrDumpBackend, OutputContent,
};
use shade_backend_glsl::GlslBackend;
use shade_backend_hlsl::HlslBackend;
use shade_backend_msl::MslBackend;
use shade_backend_spirv::SpirvBackend;
use shade_backend_wgsl::WgslBackend;

const KERNEL: &str = r#"
@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    output[i] = input[i] * 2.0;
}
"#;

#[test]
fn every_backend_handles_the_same_kernel() {
    let (_, program, module) = common::compile(KERNEL);
    let backends: Vec<Box<dyn Backend>> = vec![
        Box::new(WgslBackend),
        Box::new(HlslBackend),
        Box::new(MslBackend),
        Box::new(GlslBackend),
        Box::new(SpirvBackend),
        Box::new(IrDumpBackend),
    ];
    for backend in backends {
        let output = backend
            .emit(&program, &module, &BackendOptions::default())
            .unwrap_or_else(|e| panic!("{} failed: {e}", backend.name()));
        assert_eq!(output.files.len(), 1, "{}", backend.name());
    }
}

#[test]
fn registry_dispatches_every_target() {
    let mut registry = BackendRegistry::with_builtins();
    registry.register(Box::new(WgslBackend));
    registry.register(Box::new(HlslBackend));
    registry.register(Box::new(MslBackend));
    registry.register(Box::new(GlslBackend));
    registry.register(Box::new(SpirvBackend));
    for target in ["wgsl", "hlsl", "msl", "glsl", "spirv", "spv", "ir"] {
        assert!(registry.find(target).is_some(), "no backend for '{target}'");
    }
    assert!(registry.find("dxbc").is_none());
}

#[test]
fn dialects_disagree_on_spelling_but_not_structure() {
    let wgsl = common::emit_text(KERNEL, &WgslBackend);
    let hlsl = common::emit_text(KERNEL, &HlslBackend);
    let msl = common::emit_text(KERNEL, &MslBackend);
    let glsl = common::emit_text(KERNEL, &GlslBackend);

    assert!(wgsl.contains("@compute @workgroup_size(64)"));
    assert!(hlsl.contains("[numthreads(64, 1, 1)]"));
    assert!(msl.contains("kernel void main_("));
    assert!(glsl.contains("layout(local_size_x = 64, local_size_y = 1, local_size_z = 1) in;"));

    assert!(wgsl.contains("var<storage, read_write> output: array<f32>;"));
    assert!(hlsl.contains("RWStructuredBuffer<float> output"));
    assert!(msl.contains("device float* output [[buffer(1)]]"));
    assert!(glsl.contains("buffer output_block_ssbo"));
}

#[test]
fn glsl_version_options_select_the_header() {
    let (_, program, module) = common::compile(KERNEL);
    let desktop = BackendOptions::default();
    let es = BackendOptions {
        glsl_version: GlslVersion::Es(310),
        ..Default::default()
    };
    let text = |options: &BackendOptions| {
        let output = GlslBackend.emit(&program, &module, options).unwrap();
        match output.files.into_iter().next().unwrap().content {
            OutputContent::Text(text) => text,
            _ => panic!("expected text"),
        }
    };
    assert!(text(&desktop).starts_with("#version 450\n"));
    assert!(text(&es).starts_with("#version 310 es\n"));
}

#[test]
fn spirv_output_is_a_word_stream() {
    let (_, program, module) = common::compile(KERNEL);
    let output = SpirvBackend
        .emit(&program, &module, &BackendOptions::default())
        .unwrap();
    let OutputContent::Binary(bytes) = &output.files[0].content else {
        panic!("expected binary output");
    };
    assert_eq!(bytes.len() % 4, 0);
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(magic, 0x0723_0203);
}

#[test]
fn spirv_rejects_unknown_extensions_with_location() {
    let (_, program) = common::resolve("enable undefined_ext;\nfn f() { }");
    assert!(program.is_valid(), "unknown extensions only warn at resolve");
    let module = shade_resolver::lower::build_module(&program);
    let err = SpirvBackend
        .emit(&program, &module, &BackendOptions::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "1:1 error: SPIR-V backend does not support extension 'undefined_ext'"
    );
    // No output accompanies a fatal emission error; other backends are
    // unaffected.
    assert!(WgslBackend
        .emit(&program, &module, &BackendOptions::default())
        .is_ok());
}

#[test]
fn unsupported_constructs_carry_their_source_location() {
    let err = common::emit(
        "@group(0) @binding(0) var<storage, read> data: array<f32>;\n\
         @compute @workgroup_size(1)\n\
         fn main() {\n    let n = arrayLength(&data);\n}\n",
        &MslBackend,
    )
    .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("error:"), "{text}");
    assert!(text.contains("arrayLength"), "{text}");
}
