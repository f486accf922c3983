//! The type system shared by the resolver and the IR.
//!
//! Types are interned in a per-program [`UniqueArena`](crate::UniqueArena):
//! structurally equal types always receive the same handle, so `atomic<T>`
//! is unique for a given `T` and type equality is handle equality.

use crate::arena::Handle;

/// Width of a scalar type in bytes.
pub type Bytes = u8;

/// The kind of a scalar type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
    /// An untyped integer literal, concretized at first use.
    AbstractInt,
    /// An untyped float literal, concretized at first use.
    AbstractFloat,
}

impl ScalarKind {
    /// Returns `true` for the abstract literal kinds.
    pub fn is_abstract(self) -> bool {
        matches!(self, Self::AbstractInt | Self::AbstractFloat)
    }
}

/// A scalar type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 1,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const U32: Self = Self {
        kind: ScalarKind::Uint,
        width: 4,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
    pub const F16: Self = Self {
        kind: ScalarKind::Float,
        width: 2,
    };
    pub const ABSTRACT_INT: Self = Self {
        kind: ScalarKind::AbstractInt,
        width: 8,
    };
    pub const ABSTRACT_FLOAT: Self = Self {
        kind: ScalarKind::AbstractFloat,
        width: 8,
    };

    /// Returns `true` for abstract literal scalars.
    pub fn is_abstract(self) -> bool {
        self.kind.is_abstract()
    }

    /// Returns `true` for signed/unsigned integer scalars, abstract included.
    pub fn is_integer(self) -> bool {
        matches!(
            self.kind,
            ScalarKind::Sint | ScalarKind::Uint | ScalarKind::AbstractInt
        )
    }

    /// Returns `true` for float scalars, abstract included.
    pub fn is_float(self) -> bool {
        matches!(self.kind, ScalarKind::Float | ScalarKind::AbstractFloat)
    }

    /// The WGSL spelling of this scalar type.
    pub fn wgsl_name(self) -> &'static str {
        match (self.kind, self.width) {
            (ScalarKind::Bool, _) => "bool",
            (ScalarKind::Sint, _) => "i32",
            (ScalarKind::Uint, _) => "u32",
            (ScalarKind::Float, 2) => "f16",
            (ScalarKind::Float, _) => "f32",
            (ScalarKind::AbstractInt, _) => "abstract-int",
            (ScalarKind::AbstractFloat, _) => "abstract-float",
        }
    }
}

/// Number of components in a vector.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum VectorSize {
    /// 2 components.
    Bi = 2,
    /// 3 components.
    Tri = 3,
    /// 4 components.
    Quad = 4,
}

/// Size of an array.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArraySize {
    /// Fixed-size array.
    Constant(u32),
    /// Runtime-sized array (last member of a storage buffer).
    Dynamic,
}

/// A member of a struct type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Handle<Type>,
    /// Byte offset within the struct.
    pub offset: u32,
}

/// A named type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    /// Present for struct and alias-introduced types.
    pub name: Option<String>,
    pub inner: TypeInner,
}

/// The shape of a type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeInner {
    /// The type of calls that produce no value.
    Void,
    /// A single scalar value.
    Scalar(Scalar),
    /// A vector of scalars.
    Vector { size: VectorSize, scalar: Scalar },
    /// A matrix of column vectors.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    /// An atomic scalar.
    Atomic(Scalar),
    /// A pointer to a value in a given address space.
    Pointer {
        base: Handle<Type>,
        space: crate::AddressSpace,
    },
    /// A fixed-size or runtime-sized array.
    Array {
        base: Handle<Type>,
        size: ArraySize,
        stride: u32,
    },
    /// A composite struct type.
    Struct {
        members: Vec<StructMember>,
        /// Total byte size.
        span: u32,
    },
    /// A texture sampler.
    Sampler,
    /// A sampled 2D texture (`texture_2d<T>`).
    SampledTexture2d { scalar: Scalar },
    /// An imported external video texture (`texture_external`).
    TextureExternal,
}

impl TypeInner {
    /// The scalar component of a scalar or vector type.
    pub fn scalar(&self) -> Option<Scalar> {
        match *self {
            Self::Scalar(s) | Self::Vector { scalar: s, .. } | Self::Atomic(s) => Some(s),
            Self::Matrix { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    /// Returns `true` if any component of the type is abstract.
    pub fn is_abstract(&self) -> bool {
        self.scalar().is_some_and(Scalar::is_abstract)
    }

    /// Returns `true` for types bound as opaque resource handles.
    pub fn is_handle(&self) -> bool {
        matches!(
            self,
            Self::Sampler | Self::SampledTexture2d { .. } | Self::TextureExternal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::UniqueArena;

    #[test]
    fn scalar_constants() {
        assert_eq!(Scalar::F32.kind, ScalarKind::Float);
        assert_eq!(Scalar::F32.width, 4);
        assert_eq!(Scalar::F16.width, 2);
        assert!(Scalar::ABSTRACT_INT.is_abstract());
        assert!(!Scalar::U32.is_abstract());
        assert!(Scalar::ABSTRACT_FLOAT.is_float());
        assert!(Scalar::ABSTRACT_INT.is_integer());
    }

    #[test]
    fn scalar_names() {
        assert_eq!(Scalar::BOOL.wgsl_name(), "bool");
        assert_eq!(Scalar::I32.wgsl_name(), "i32");
        assert_eq!(Scalar::F16.wgsl_name(), "f16");
        assert_eq!(Scalar::ABSTRACT_INT.wgsl_name(), "abstract-int");
    }

    #[test]
    fn type_interning_is_structural() {
        let mut types = UniqueArena::new();
        let a = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::F32),
        });
        let b = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::F32),
        });
        let c = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::I32),
        });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn atomic_unique_per_component() {
        let mut types = UniqueArena::new();
        let a = types.insert(Type {
            name: None,
            inner: TypeInner::Atomic(Scalar::U32),
        });
        let b = types.insert(Type {
            name: None,
            inner: TypeInner::Atomic(Scalar::U32),
        });
        let c = types.insert(Type {
            name: None,
            inner: TypeInner::Atomic(Scalar::I32),
        });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn handle_types() {
        assert!(TypeInner::Sampler.is_handle());
        assert!(TypeInner::TextureExternal.is_handle());
        assert!(!TypeInner::Scalar(Scalar::F32).is_handle());
    }
}
