#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // The front end never panics: bad input becomes diagnostics.
        let file = shade_diag::SourceFile::new("fuzz.wgsl", source);
        let _ = shade_parser::parse(&file);
    }
});
