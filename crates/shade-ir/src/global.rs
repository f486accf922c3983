//! Global variables, address spaces, and entry-point IO bindings.

use crate::arena::Handle;
use crate::types::Type;
use crate::value::Literal;

/// Bitflags for storage buffer access modes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct StorageAccess(u32);

impl StorageAccess {
    /// No access.
    pub const EMPTY: Self = Self(0);
    /// Read access.
    pub const LOAD: Self = Self(1);
    /// Write access.
    pub const STORE: Self = Self(2);

    /// Returns `true` if `self` contains all flags in `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for StorageAccess {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StorageAccess {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Memory address space for variables.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum AddressSpace {
    /// Function-local storage.
    Function,
    /// Module-scope per-invocation storage.
    Private,
    /// Workgroup shared storage.
    Workgroup,
    /// Uniform buffer (read-only).
    Uniform,
    /// Storage buffer with specified access.
    Storage { access: StorageAccess },
    /// Opaque resource handles (textures, samplers).
    Handle,
}

/// `@group(N) @binding(N)` resource binding.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
}

/// Built-in shader inputs and outputs.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BuiltinValue {
    /// `@builtin(global_invocation_id)` — vec3<u32>
    GlobalInvocationId,
    /// `@builtin(local_invocation_id)` — vec3<u32>
    LocalInvocationId,
    /// `@builtin(local_invocation_index)` — u32
    LocalInvocationIndex,
    /// `@builtin(workgroup_id)` — vec3<u32>
    WorkgroupId,
    /// `@builtin(num_workgroups)` — vec3<u32>
    NumWorkgroups,
    /// `@builtin(position)` — vec4<f32>
    Position,
    /// `@builtin(vertex_index)` — u32
    VertexIndex,
    /// `@builtin(instance_index)` — u32
    InstanceIndex,
    /// `@builtin(front_facing)` — bool
    FrontFacing,
    /// `@builtin(frag_depth)` — f32, output only
    FragDepth,
    /// `@builtin(sample_index)` — u32
    SampleIndex,
    /// `@builtin(sample_mask)` — u32
    SampleMask,
}

impl BuiltinValue {
    /// Maps a `@builtin(...)` argument to its value, if recognized.
    pub fn from_str(name: &str) -> Option<Self> {
        Some(match name {
            "global_invocation_id" => Self::GlobalInvocationId,
            "local_invocation_id" => Self::LocalInvocationId,
            "local_invocation_index" => Self::LocalInvocationIndex,
            "workgroup_id" => Self::WorkgroupId,
            "num_workgroups" => Self::NumWorkgroups,
            "position" => Self::Position,
            "vertex_index" => Self::VertexIndex,
            "instance_index" => Self::InstanceIndex,
            "front_facing" => Self::FrontFacing,
            "frag_depth" => Self::FragDepth,
            "sample_index" => Self::SampleIndex,
            "sample_mask" => Self::SampleMask,
            _ => return None,
        })
    }

    /// The WGSL spelling of this builtin value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GlobalInvocationId => "global_invocation_id",
            Self::LocalInvocationId => "local_invocation_id",
            Self::LocalInvocationIndex => "local_invocation_index",
            Self::WorkgroupId => "workgroup_id",
            Self::NumWorkgroups => "num_workgroups",
            Self::Position => "position",
            Self::VertexIndex => "vertex_index",
            Self::InstanceIndex => "instance_index",
            Self::FrontFacing => "front_facing",
            Self::FragDepth => "frag_depth",
            Self::SampleIndex => "sample_index",
            Self::SampleMask => "sample_mask",
        }
    }

    /// Returns `true` if this input holds the same value for every
    /// invocation in the workgroup. Everything else is per-invocation
    /// and therefore a source of non-uniformity.
    pub fn is_uniform(self) -> bool {
        matches!(self, Self::WorkgroupId | Self::NumWorkgroups)
    }
}

/// An IO binding for a function parameter or result.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Binding {
    /// A built-in shader value.
    BuiltIn(BuiltinValue),
    /// A user-defined inter-stage location.
    Location(u32),
}

/// A module-scope variable.
#[derive(Clone, Debug)]
pub struct GlobalVariable {
    pub name: Option<String>,
    pub space: AddressSpace,
    pub binding: Option<ResourceBinding>,
    pub ty: Handle<Type>,
    /// Constant initializer, where one was written and is scalar.
    pub init: Option<Literal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_access_flags() {
        let rw = StorageAccess::LOAD | StorageAccess::STORE;
        assert!(rw.contains(StorageAccess::LOAD));
        assert!(rw.contains(StorageAccess::STORE));
        assert!(!StorageAccess::LOAD.contains(StorageAccess::STORE));
        assert!(StorageAccess::EMPTY.is_empty());
    }

    #[test]
    fn builtin_round_trip() {
        for name in [
            "global_invocation_id",
            "workgroup_id",
            "position",
            "front_facing",
            "sample_mask",
        ] {
            let b = BuiltinValue::from_str(name).unwrap();
            assert_eq!(b.as_str(), name);
        }
        assert_eq!(BuiltinValue::from_str("no_such_builtin"), None);
    }

    #[test]
    fn only_group_scoped_builtins_are_uniform() {
        assert!(BuiltinValue::WorkgroupId.is_uniform());
        assert!(BuiltinValue::NumWorkgroups.is_uniform());
        assert!(!BuiltinValue::GlobalInvocationId.is_uniform());
        assert!(!BuiltinValue::Position.is_uniform());
        assert!(!BuiltinValue::VertexIndex.is_uniform());
        assert!(!BuiltinValue::SampleIndex.is_uniform());
    }
}
