use shade_backend_core::{Backend, BackendOptions, BackendOutput, EmitError, OutputContent};
use shade_diag::SourceFile;
use shade_ir::Module;
use shade_resolver::{Program, ResolveOptions};
use shade_xform::Driver;

/// Parse and resolve a source that must be syntactically well-formed;
/// semantic problems stay in the program's diagnostic list.
#[allow(dead_code)]
pub fn resolve(source: &str) -> (SourceFile, Program) {
    resolve_with(source, &ResolveOptions::default())
}

#[allow(dead_code)]
pub fn resolve_with(source: &str, options: &ResolveOptions) -> (SourceFile, Program) {
    let file = SourceFile::new("test.wgsl", source);
    let (ast, parse_diags) = shade_parser::parse(&file);
    assert!(!parse_diags.has_errors(), "parse failed: {parse_diags:?}");
    let program = shade_resolver::resolve_with(&file, ast, options);
    (file, program)
}

/// Parse, resolve, lower, and run the default transform pipeline,
/// asserting every stage succeeds.
#[allow(dead_code)]
pub fn compile(source: &str) -> (SourceFile, Program, Module) {
    let (file, program) = resolve(source);
    assert!(
        program.is_valid(),
        "program failed to resolve: {:?}",
        program.diagnostics()
    );
    let mut module = shade_resolver::lower::build_module(&program);
    Driver::with_defaults().run(&mut module);
    (file, program, module)
}

/// Run the full pipeline and one backend.
#[allow(dead_code)]
pub fn emit(source: &str, backend: &dyn Backend) -> Result<BackendOutput, EmitError> {
    let (_, program, module) = compile(source);
    backend.emit(&program, &module, &BackendOptions::default())
}

/// Run the full pipeline and one textual backend, returning its output.
#[allow(dead_code)]
pub fn emit_text(source: &str, backend: &dyn Backend) -> String {
    let output = emit(source, backend).expect("backend emission failed");
    match output.files.into_iter().next().expect("one output file").content {
        OutputContent::Text(text) => text,
        OutputContent::Binary(_) => panic!("expected text output"),
    }
}
