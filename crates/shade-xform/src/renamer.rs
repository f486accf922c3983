//! Renaming of identifiers that collide with target keywords.

use shade_ir::{Module, NameKey};

use crate::Pass;

/// Keywords reserved by at least one target dialect. Emitting any of
/// these as an identifier would produce uncompilable output.
const RESERVED: &[&str] = &[
    // HLSL
    "cbuffer", "column_major", "compile", "dword", "groupshared", "line", "linear", "matrix",
    "numthreads", "pass", "point", "precise", "register", "row_major", "sample", "sampler_state",
    "technique", "texture", "uniform", "vector",
    // MSL
    "constant", "device", "fragment", "half", "kernel", "metal", "namespace", "template",
    "thread", "threadgroup", "using", "vertex",
    // GLSL
    "attribute", "buffer", "centroid", "flat", "gl_Position", "highp", "in", "inout", "lowp",
    "mediump", "out", "patch", "precision", "shared", "smooth", "subroutine", "varying",
    // Common
    "auto", "bool", "break", "case", "char", "const", "continue", "default", "do", "double",
    "else", "enum", "extern", "float", "for", "goto", "if", "int", "long", "main", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned",
    "void", "volatile", "while",
];

/// Renames module entities whose names collide with a reserved-word set,
/// via the name map's deterministic suffix retry.
#[derive(Debug, Default)]
pub struct Renamer {
    reserved: Vec<&'static str>,
}

impl Renamer {
    /// A renamer using the built-in reserved-word set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A renamer for a caller-supplied reserved-word set.
    pub fn with_reserved(reserved: Vec<&'static str>) -> Self {
        Self { reserved }
    }

    fn is_reserved(&self, name: &str) -> bool {
        if self.reserved.is_empty() {
            RESERVED.contains(&name)
        } else {
            self.reserved.contains(&name)
        }
    }
}

impl Pass for Renamer {
    fn name(&self) -> &str {
        "renamer"
    }

    fn should_run(&self, module: &Module) -> bool {
        module.names.iter().any(|(_, name)| self.is_reserved(name))
    }

    fn run(&mut self, module: &mut Module) {
        let mut colliding: Vec<(NameKey, String)> = module
            .names
            .iter()
            .filter(|(_, name)| self.is_reserved(name))
            .map(|(key, name)| (key, name.to_string()))
            .collect();
        // Names are unique per module, so name order is total; the map
        // itself iterates in hash order, which must not leak into the
        // rename sequence.
        colliding.sort_by(|a, b| a.1.cmp(&b.1));
        for (key, name) in colliding {
            module.names.remove(key);
            let assigned = module.names.set_name(key, &format!("{name}_")).to_string();
            log::debug!("renamed reserved identifier '{name}' to '{assigned}'");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_ir::{Arena, Function};

    fn keyed_module(names: &[&str]) -> Module {
        let mut functions: Arena<Function> = Arena::new();
        let mut module = Module::default();
        for &name in names {
            let handle = functions.append(Function::new(name));
            module.names.set_name(NameKey::Function(handle), name);
        }
        module.functions = functions;
        module
    }

    #[test]
    fn reserved_names_are_rewritten() {
        let mut module = keyed_module(&["texture", "compute_main"]);
        let mut pass = Renamer::new();
        assert!(pass.should_run(&module));
        pass.run(&mut module);
        assert!(!pass.should_run(&module));

        let names: Vec<_> = module.names.iter().map(|(_, n)| n.to_string()).collect();
        assert!(names.contains(&"texture_".to_string()));
        assert!(names.contains(&"compute_main".to_string()));
        assert!(!names.contains(&"texture".to_string()));
    }

    #[test]
    fn rename_respects_existing_names() {
        // "float_" is already taken, so renaming "float" retries to
        // "float__1" through the name map's suffix machinery.
        let mut module = keyed_module(&["float_", "float"]);
        let mut pass = Renamer::new();
        pass.run(&mut module);
        let names: Vec<_> = module.names.iter().map(|(_, n)| n.to_string()).collect();
        assert!(names.contains(&"float_".to_string()));
        assert!(names.contains(&"float__1".to_string()));
    }

    #[test]
    fn clean_module_is_skipped() {
        let module = keyed_module(&["compute_main", "helper"]);
        assert!(!Renamer::new().should_run(&module));
    }

    #[test]
    fn custom_reserved_set() {
        let module = keyed_module(&["my_keyword"]);
        let pass = Renamer::with_reserved(vec!["my_keyword"]);
        assert!(pass.should_run(&module));
        assert!(!Renamer::new().should_run(&module));
    }
}
