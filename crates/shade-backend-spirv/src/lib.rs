//! SPIR-V binary emitter.
//!
//! Walks the lowered IR module and assembles a SPIR-V 1.3 word stream:
//! header, capabilities, memory model, entry points with execution
//! modes, debug names (taken from the module's name map), decorations,
//! types/constants/globals, and functions whose basic blocks become
//! `OpLabel`-led blocks with explicit branch terminators.

mod emit;
mod words;

use shade_backend_core::{
    check_supported_extensions, Backend, BackendOptions, BackendOutput, EmitError, OutputContent,
};
use shade_ir::Module;
use shade_parser::ast::Extension;
use shade_resolver::Program;

const SUPPORTED_EXTENSIONS: &[Extension] =
    &[Extension::F16, Extension::DisableUniformityAnalysis];

/// Backend emitting a SPIR-V binary module.
#[derive(Debug)]
pub struct SpirvBackend;

impl Backend for SpirvBackend {
    fn name(&self) -> &str {
        "SPIR-V"
    }

    fn targets(&self) -> &[&str] {
        &["spirv", "spv"]
    }

    fn emit(
        &self,
        program: &Program,
        module: &Module,
        _options: &BackendOptions,
    ) -> Result<BackendOutput, EmitError> {
        if !program.is_valid() {
            return Err(EmitError::InvalidProgram);
        }
        check_supported_extensions("SPIR-V", program, SUPPORTED_EXTENSIONS)?;
        let module_words = emit::emit_module(module)?;
        let mut bytes = Vec::with_capacity(module_words.len() * 4);
        for word in module_words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        Ok(BackendOutput::single(
            "shader.spv",
            OutputContent::Binary(bytes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_diag::SourceFile;

    fn emit(source: &str) -> Result<Vec<u32>, EmitError> {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        let program = shade_resolver::resolve(&file, ast);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
        let module = shade_resolver::lower::build_module(&program);
        let output = SpirvBackend.emit(&program, &module, &BackendOptions::default())?;
        let OutputContent::Binary(bytes) = &output.files[0].content else {
            panic!("expected binary output");
        };
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Iterates `(opcode, operand words)` over an assembled module.
    fn instructions(module_words: &[u32]) -> Vec<(u16, &[u32])> {
        let mut out = Vec::new();
        let mut cursor = 5; // skip the header
        while cursor < module_words.len() {
            let word = module_words[cursor];
            let count = (word >> 16) as usize;
            let opcode = (word & 0xffff) as u16;
            assert!(count > 0, "zero-length instruction at word {cursor}");
            out.push((opcode, &module_words[cursor + 1..cursor + count]));
            cursor += count;
        }
        out
    }

    fn count_op(module_words: &[u32], opcode: u16) -> usize {
        instructions(module_words)
            .iter()
            .filter(|(code, _)| *code == opcode)
            .count()
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
    fn header_magic_version_and_bound() {
        let module_words = emit(KERNEL).unwrap();
        assert_eq!(module_words[0], 0x0723_0203);
        assert_eq!(module_words[1], 0x0001_0300);
        let bound = module_words[3];
        assert!(bound > 1);
        // Every result id fits under the declared bound.
        for (opcode, operands) in instructions(&module_words) {
            if opcode == 248 {
                // OpLabel's result id is its only operand.
                assert!(operands[0] < bound);
            }
        }
    }

    #[test]
    fn entry_point_and_execution_mode() {
        let module_words = emit(KERNEL).unwrap();
        let instrs = instructions(&module_words);
        let entry = instrs
            .iter()
            .find(|(opcode, _)| *opcode == 15)
            .expect("OpEntryPoint present");
        assert_eq!(entry.1[0], 5, "GLCompute execution model");
        // The entry name string starts at operand 2.
        assert_eq!(entry.1[2], u32::from_le_bytes(*b"main"));
        let mode = instrs
            .iter()
            .find(|(opcode, _)| *opcode == 16)
            .expect("OpExecutionMode present");
        assert_eq!(&mode.1[1..], &[17, 64, 1, 1], "LocalSize 64 1 1");
    }

    #[test]
    fn every_block_is_labelled_and_terminated() {
        let module_words = emit(KERNEL).unwrap();
        let instrs = instructions(&module_words);
        let labels = count_op(&module_words, 248);
        let terminators = instrs
            .iter()
            .filter(|(opcode, _)| matches!(opcode, 249 | 250 | 251 | 252 | 253 | 254 | 255))
            .count();
        assert!(labels > 0);
        assert_eq!(labels, terminators);
    }

    #[test]
    fn structured_selection_carries_a_merge() {
        let module_words = emit(KERNEL).unwrap();
        // The `if` becomes OpSelectionMerge + OpBranchConditional.
        assert_eq!(count_op(&module_words, 247), 1);
        assert_eq!(count_op(&module_words, 250), 1);
    }

    #[test]
    fn loops_get_loop_merges() {
        let module_words = emit(
            r#"
fn spin(n: u32) -> u32 {
    var i = 0u;
    while i < n {
        i = i + 1u;
    }
    return i;
}
"#,
        )
        .unwrap();
        assert_eq!(count_op(&module_words, 246), 1, "OpLoopMerge on the header");
    }

    #[test]
    fn storage_buffers_are_block_wrapped() {
        let module_words = emit(KERNEL).unwrap();
        let instrs = instructions(&module_words);
        // Two globals, each wrapped: Block decorations on the structs.
        let blocks = instrs
            .iter()
            .filter(|(opcode, operands)| *opcode == 71 && operands.get(1) == Some(&2))
            .count();
        assert_eq!(blocks, 2);
        // arrayLength lowers to OpArrayLength against the wrapper.
        assert_eq!(count_op(&module_words, 68), 1);
    }

    #[test]
    fn debug_names_come_from_the_name_map() {
        let module_words = emit(KERNEL).unwrap();
        let instrs = instructions(&module_words);
        let named: Vec<String> = instrs
            .iter()
            .filter(|(opcode, _)| *opcode == 5)
            .map(|(_, operands)| {
                let bytes: Vec<u8> = operands[1..]
                    .iter()
                    .flat_map(|w| w.to_le_bytes())
                    .take_while(|&b| b != 0)
                    .collect();
                String::from_utf8(bytes).unwrap()
            })
            .collect();
        assert!(named.contains(&"main".to_string()), "{named:?}");
        assert!(named.contains(&"gid".to_string()), "{named:?}");
        assert!(named.contains(&"input".to_string()), "{named:?}");
    }

    #[test]
    fn emission_is_deterministic() {
        assert_eq!(emit(KERNEL).unwrap(), emit(KERNEL).unwrap());
    }

    #[test]
    fn barrier_lowering() {
        let module_words = emit(
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
        assert_eq!(count_op(&module_words, 224), 1, "OpControlBarrier");
    }

    #[test]
    fn unsupported_extension_is_fatal_with_location() {
        let file = SourceFile::new("test.wgsl", "enable undefined_ext;\nfn f() { }");
        let (ast, _) = shade_parser::parse(&file);
        let program = shade_resolver::resolve(&file, ast);
        let module = shade_resolver::lower::build_module(&program);
        let err = SpirvBackend
            .emit(&program, &module, &BackendOptions::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1 error: SPIR-V backend does not support extension 'undefined_ext'"
        );
    }
}
