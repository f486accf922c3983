//! Built-in function identities shared by the resolver, IR, and backends.

/// A WGSL built-in function.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Builtin {
    // Component-wise math
    Abs,
    Min,
    Max,
    Clamp,
    Saturate,
    Floor,
    Ceil,
    Round,
    Fract,
    Trunc,
    Sign,
    // Trigonometric
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    // Exponential
    Sqrt,
    InverseSqrt,
    Log,
    Log2,
    Exp,
    Exp2,
    Pow,
    // Linear algebra
    Dot,
    Cross,
    Normalize,
    Length,
    Distance,
    // Interpolation
    Mix,
    Step,
    SmoothStep,
    Fma,
    // Selection and queries
    Select,
    ArrayLength,
    // Atomics
    AtomicLoad,
    AtomicStore,
    AtomicAdd,
    AtomicSub,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    AtomicMin,
    AtomicMax,
    AtomicExchange,
    // Synchronization
    WorkgroupBarrier,
    StorageBarrier,
    // Derivatives
    Dpdx,
    Dpdy,
    Fwidth,
    // Textures
    TextureSample,
    TextureLoad,
    TextureDimensions,
}

impl Builtin {
    /// Maps a WGSL call name to its builtin, if it is one.
    pub fn from_str(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "clamp" => Self::Clamp,
            "saturate" => Self::Saturate,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "fract" => Self::Fract,
            "trunc" => Self::Trunc,
            "sign" => Self::Sign,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "sqrt" => Self::Sqrt,
            "inverseSqrt" => Self::InverseSqrt,
            "log" => Self::Log,
            "log2" => Self::Log2,
            "exp" => Self::Exp,
            "exp2" => Self::Exp2,
            "pow" => Self::Pow,
            "dot" => Self::Dot,
            "cross" => Self::Cross,
            "normalize" => Self::Normalize,
            "length" => Self::Length,
            "distance" => Self::Distance,
            "mix" => Self::Mix,
            "step" => Self::Step,
            "smoothstep" => Self::SmoothStep,
            "fma" => Self::Fma,
            "select" => Self::Select,
            "arrayLength" => Self::ArrayLength,
            "atomicLoad" => Self::AtomicLoad,
            "atomicStore" => Self::AtomicStore,
            "atomicAdd" => Self::AtomicAdd,
            "atomicSub" => Self::AtomicSub,
            "atomicAnd" => Self::AtomicAnd,
            "atomicOr" => Self::AtomicOr,
            "atomicXor" => Self::AtomicXor,
            "atomicMin" => Self::AtomicMin,
            "atomicMax" => Self::AtomicMax,
            "atomicExchange" => Self::AtomicExchange,
            "workgroupBarrier" => Self::WorkgroupBarrier,
            "storageBarrier" => Self::StorageBarrier,
            "dpdx" => Self::Dpdx,
            "dpdy" => Self::Dpdy,
            "fwidth" => Self::Fwidth,
            "textureSample" => Self::TextureSample,
            "textureLoad" => Self::TextureLoad,
            "textureDimensions" => Self::TextureDimensions,
            _ => return None,
        })
    }

    /// The WGSL spelling of this builtin.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Clamp => "clamp",
            Self::Saturate => "saturate",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Fract => "fract",
            Self::Trunc => "trunc",
            Self::Sign => "sign",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Sqrt => "sqrt",
            Self::InverseSqrt => "inverseSqrt",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Exp => "exp",
            Self::Exp2 => "exp2",
            Self::Pow => "pow",
            Self::Dot => "dot",
            Self::Cross => "cross",
            Self::Normalize => "normalize",
            Self::Length => "length",
            Self::Distance => "distance",
            Self::Mix => "mix",
            Self::Step => "step",
            Self::SmoothStep => "smoothstep",
            Self::Fma => "fma",
            Self::Select => "select",
            Self::ArrayLength => "arrayLength",
            Self::AtomicLoad => "atomicLoad",
            Self::AtomicStore => "atomicStore",
            Self::AtomicAdd => "atomicAdd",
            Self::AtomicSub => "atomicSub",
            Self::AtomicAnd => "atomicAnd",
            Self::AtomicOr => "atomicOr",
            Self::AtomicXor => "atomicXor",
            Self::AtomicMin => "atomicMin",
            Self::AtomicMax => "atomicMax",
            Self::AtomicExchange => "atomicExchange",
            Self::WorkgroupBarrier => "workgroupBarrier",
            Self::StorageBarrier => "storageBarrier",
            Self::Dpdx => "dpdx",
            Self::Dpdy => "dpdy",
            Self::Fwidth => "fwidth",
            Self::TextureSample => "textureSample",
            Self::TextureLoad => "textureLoad",
            Self::TextureDimensions => "textureDimensions",
        }
    }

    /// Returns `true` for builtins that must only be reached under
    /// control flow that is uniform across the invocation group:
    /// cross-invocation barriers, and operations that take implicit
    /// derivatives of neighboring invocations.
    pub fn requires_uniformity(self) -> bool {
        matches!(
            self,
            Self::WorkgroupBarrier
                | Self::StorageBarrier
                | Self::Dpdx
                | Self::Dpdy
                | Self::Fwidth
                | Self::TextureSample
        )
    }

    /// Returns `true` for the atomic read-modify-write family.
    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            Self::AtomicLoad
                | Self::AtomicStore
                | Self::AtomicAdd
                | Self::AtomicSub
                | Self::AtomicAnd
                | Self::AtomicOr
                | Self::AtomicXor
                | Self::AtomicMin
                | Self::AtomicMax
                | Self::AtomicExchange
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for name in ["abs", "workgroupBarrier", "textureSample", "atomicAdd", "dpdx"] {
            let b = Builtin::from_str(name).unwrap();
            assert_eq!(b.wgsl_name(), name);
        }
        assert_eq!(Builtin::from_str("notABuiltin"), None);
    }

    #[test]
    fn uniformity_requirements() {
        assert!(Builtin::WorkgroupBarrier.requires_uniformity());
        assert!(Builtin::StorageBarrier.requires_uniformity());
        assert!(Builtin::Dpdx.requires_uniformity());
        assert!(Builtin::TextureSample.requires_uniformity());
        assert!(!Builtin::TextureLoad.requires_uniformity());
        assert!(!Builtin::Abs.requires_uniformity());
        assert!(!Builtin::AtomicAdd.requires_uniformity());
    }

    #[test]
    fn atomic_family() {
        assert!(Builtin::AtomicExchange.is_atomic());
        assert!(!Builtin::WorkgroupBarrier.is_atomic());
    }
}
