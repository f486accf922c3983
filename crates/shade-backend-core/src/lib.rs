#![warn(missing_docs)]
//! Backend trait and shared emitter scaffolding.
//!
//! Defines the [`Backend`] trait that every target emitter implements,
//! along with supporting types ([`BackendOptions`], [`BackendOutput`],
//! [`EmitError`]), a [`BackendRegistry`] for CLI dispatch, the shared
//! supported-extension check, and the indented text writer used by the
//! textual backends.

mod writer;

pub use writer::IndentedWriter;

use std::fmt::{self, Debug};

use shade_diag::{DiagnosticList, Location};
use shade_ir::Module;
use shade_parser::ast::Extension;
use shade_resolver::Program;

/// GLSL target version: desktop core profile or OpenGL ES.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlslVersion {
    /// Desktop OpenGL, e.g. `Desktop(450)` for `#version 450`.
    Desktop(u16),
    /// OpenGL ES, e.g. `Es(310)` for `#version 310 es`.
    Es(u16),
}

impl Default for GlslVersion {
    fn default() -> Self {
        Self::Desktop(450)
    }
}

impl fmt::Display for GlslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desktop(v) => write!(f, "{v}"),
            Self::Es(v) => write!(f, "{v} es"),
        }
    }
}

/// MSL language version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MslVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl Default for MslVersion {
    fn default() -> Self {
        Self { major: 2, minor: 1 }
    }
}

/// HLSL shader model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HlslShaderModel {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl Default for HlslShaderModel {
    fn default() -> Self {
        Self { major: 5, minor: 1 }
    }
}

/// Options passed to a backend during emission. Parsed once per
/// invocation; backends never mutate them.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackendOptions {
    /// Target version for the GLSL backend.
    pub glsl_version: GlslVersion,
    /// Target version for the MSL backend.
    pub msl_version: MslVersion,
    /// Target shader model for the HLSL backend.
    pub hlsl_shader_model: HlslShaderModel,
}

/// The output produced by a backend.
#[derive(Clone, Debug)]
pub struct BackendOutput {
    /// One or more output files.
    pub files: Vec<OutputFile>,
    /// Informational diagnostics; never errors (errors are [`EmitError`]s).
    pub diagnostics: DiagnosticList,
}

impl BackendOutput {
    /// Wraps a single output file with no diagnostics.
    pub fn single(name: impl Into<String>, content: OutputContent) -> Self {
        Self {
            files: vec![OutputFile {
                name: name.into(),
                content,
            }],
            diagnostics: DiagnosticList::new(),
        }
    }
}

/// A single output file.
#[derive(Clone, Debug)]
pub struct OutputFile {
    /// Suggested filename (e.g. "shader.hlsl", "shader.spv").
    pub name: String,
    /// The file content.
    pub content: OutputContent,
}

/// Content of an output file.
#[derive(Clone, Debug)]
pub enum OutputContent {
    /// UTF-8 text.
    Text(String),
    /// Raw binary data (SPIR-V words).
    Binary(Vec<u8>),
}

impl fmt::Display for OutputContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text({} chars)", s.len()),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
        }
    }
}

/// Errors that abort one backend's emission. Other backends and other
/// compilations are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The module enables an extension this backend cannot express.
    #[error("{location} error: {backend} backend does not support extension '{name}'")]
    UnsupportedExtension {
        /// Location of the `enable` directive.
        location: Location,
        /// The reporting backend's name.
        backend: &'static str,
        /// The extension's source spelling.
        name: String,
    },

    /// A source construct this backend cannot express.
    #[error("{location} error: {message}")]
    Unsupported {
        /// Location of the offending construct.
        location: Location,
        /// What could not be emitted.
        message: String,
    },

    /// The caller handed over a program that failed resolution.
    #[error("input program is not valid")]
    InvalidProgram,
}

/// A backend that emits one target dialect from the resolved program
/// and/or the lowered IR module.
pub trait Backend: Debug + Send + Sync {
    /// Human-readable name (e.g. "SPIR-V").
    fn name(&self) -> &str;

    /// Target identifiers this backend handles (for `--target` dispatch).
    fn targets(&self) -> &[&str];

    /// Emits the target representation. On any error there is no
    /// output.
    fn emit(
        &self,
        program: &Program,
        module: &Module,
        options: &BackendOptions,
    ) -> Result<BackendOutput, EmitError>;
}

/// Rejects any enabled extension outside `supported`, reporting the
/// first offender at its `enable` directive.
pub fn check_supported_extensions(
    backend: &'static str,
    program: &Program,
    supported: &[Extension],
) -> Result<(), EmitError> {
    for (extension, span) in program.extensions() {
        if !supported.contains(extension) {
            return Err(EmitError::UnsupportedExtension {
                location: span.start,
                backend,
                name: extension.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Registry of available backends, used for CLI `--target` dispatch.
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Creates a registry pre-populated with built-in backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(IrDumpBackend));
        registry
    }

    /// Registers a backend.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Finds a backend that handles the given target identifier.
    pub fn find(&self, target: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.targets().contains(&target))
            .map(|b| &**b)
    }

    /// Lists all supported target identifiers.
    pub fn list_targets(&self) -> Vec<&str> {
        self.backends
            .iter()
            .flat_map(|b| b.targets().iter().copied())
            .collect()
    }
}

/// Built-in backend that renders the IR module as text.
#[derive(Debug)]
pub struct IrDumpBackend;

impl Backend for IrDumpBackend {
    fn name(&self) -> &str {
        "IR dump"
    }

    fn targets(&self) -> &[&str] {
        &["ir", "ir-dump"]
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
        Ok(BackendOutput::single(
            "shader.ir",
            OutputContent::Text(shade_ir::dump_module(module)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_diag::SourceFile;

    fn resolve(source: &str) -> (Program, Module) {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors());
        let program = shade_resolver::resolve(&file, ast);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
        let module = shade_resolver::lower::build_module(&program);
        (program, module)
    }

    #[test]
    fn registry_finds_builtin_targets() {
        let registry = BackendRegistry::with_builtins();
        assert!(registry.find("ir").is_some());
        assert!(registry.find("ir-dump").is_some());
        assert!(registry.find("nonexistent").is_none());
        assert!(registry.list_targets().contains(&"ir"));
    }

    #[test]
    fn ir_dump_emits_text() {
        let (program, module) = resolve("@compute @workgroup_size(1) fn main() { }");
        let output = IrDumpBackend
            .emit(&program, &module, &BackendOptions::default())
            .unwrap();
        assert_eq!(output.files.len(), 1);
        match &output.files[0].content {
            OutputContent::Text(text) => assert!(text.contains("fn main")),
            other => panic!("expected text output, got {other}"),
        }
    }

    #[test]
    fn unsupported_extension_error_format() {
        let file = SourceFile::new("test.wgsl", "enable undefined_ext;\n");
        let (ast, _) = shade_parser::parse(&file);
        let program = shade_resolver::resolve(&file, ast);
        let err = check_supported_extensions("SPIR-V", &program, &[Extension::F16]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1 error: SPIR-V backend does not support extension 'undefined_ext'"
        );
    }

    #[test]
    fn supported_extensions_pass_the_check() {
        let file = SourceFile::new("test.wgsl", "enable f16;\n");
        let (ast, _) = shade_parser::parse(&file);
        let program = shade_resolver::resolve(&file, ast);
        assert!(check_supported_extensions("MSL", &program, &[Extension::F16]).is_ok());
    }

    #[test]
    fn glsl_version_headers() {
        assert_eq!(GlslVersion::Desktop(450).to_string(), "450");
        assert_eq!(GlslVersion::Es(310).to_string(), "310 es");
    }
}
