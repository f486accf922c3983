//! shade intermediate representation.
//!
//! An arena-based, basic-block IR for shader programs. The resolver
//! lowers a type-checked program into a [`Module`]; transform passes
//! rewrite it; backends walk it (or the resolved program) to emit a
//! target dialect.

pub mod arena;
mod builtin;
mod display;
mod func;
mod global;
mod names;
mod types;
mod validate;
mod value;

pub use arena::{Arena, Handle, UniqueArena};
pub use builtin::Builtin;
pub use display::{dump_module, format_type};
pub use func::{
    Block, Function, FunctionParam, FunctionResult, LocalVariable, Stage,
};
pub use global::{
    AddressSpace, Binding, BuiltinValue, GlobalVariable, ResourceBinding, StorageAccess,
};
pub use names::{NameKey, NameMap, MAX_NAME_RETRIES};
pub use types::{
    ArraySize, Bytes, Scalar, ScalarKind, StructMember, Type, TypeInner, VectorSize,
};
pub use validate::IrError;
pub use value::{
    BinaryOp, Instruction, Literal, Op, SwitchCase, SwizzleComponent, Terminator, UnaryOp, Value,
};

/// Module-wide marker flags stamped by transform passes.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct ModuleFlags(u32);

impl ModuleFlags {
    /// No flags set.
    pub const EMPTY: Self = Self(0);
    /// Uniformity analysis was waived for this module; downstream
    /// tooling must not assume the uniform-control-flow guarantee.
    pub const UNIFORMITY_DISABLED: Self = Self(1);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ModuleFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModuleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A lowered shader module.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Deduplicated type arena.
    pub types: UniqueArena<Type>,
    /// Module-scope variables.
    pub globals: Arena<GlobalVariable>,
    /// All functions, entry points included.
    pub functions: Arena<Function>,
    /// Debug names for functions, globals, locals, and values.
    pub names: NameMap,
    /// Markers stamped by transform passes.
    pub flags: ModuleFlags,
}

impl Module {
    /// Iterates over the entry-point functions.
    pub fn entry_points(&self) -> impl Iterator<Item = (Handle<Function>, &Function)> {
        self.functions.iter().filter(|(_, f)| f.stage.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_flags() {
        let mut flags = ModuleFlags::EMPTY;
        assert!(flags.is_empty());
        assert!(!flags.contains(ModuleFlags::UNIFORMITY_DISABLED));
        flags |= ModuleFlags::UNIFORMITY_DISABLED;
        assert!(flags.contains(ModuleFlags::UNIFORMITY_DISABLED));
    }

    #[test]
    fn entry_point_filter() {
        let mut module = Module::default();
        module.functions.append(Function::new("helper"));
        let mut main = Function::new("main");
        main.stage = Some(Stage::Compute);
        main.workgroup_size = Some([64, 1, 1]);
        module.functions.append(main);
        let entries: Vec<_> = module.entry_points().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.name.as_deref(), Some("main"));
    }
}
