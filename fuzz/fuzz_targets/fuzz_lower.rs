#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let file = shade_diag::SourceFile::new("fuzz.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        if diags.has_errors() {
            return;
        }
        let program = shade_resolver::resolve(&file, ast);
        if program.is_valid() {
            // Valid programs must lower without panicking.
            let _ = shade_resolver::lower::build_module(&program);
        }
    }
});
