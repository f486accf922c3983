//! Display implementations and the text dump used by `--emit-ir`.

use std::fmt;

use crate::arena::{Handle, UniqueArena};
use crate::func::{Block, Function};
use crate::global::{AddressSpace, Binding, BuiltinValue, ResourceBinding, StorageAccess};
use crate::types::{ArraySize, Scalar, Type, TypeInner, VectorSize};
use crate::value::{BinaryOp, Literal, Op, Terminator, UnaryOp};
use crate::{Module, ModuleFlags};

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

impl fmt::Display for StorageAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let has_load = self.contains(StorageAccess::LOAD);
        let has_store = self.contains(StorageAccess::STORE);
        match (has_load, has_store) {
            (true, true) => write!(f, "read_write"),
            (true, false) => write!(f, "read"),
            (false, true) => write!(f, "write"),
            (false, false) => write!(f, "none"),
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Private => write!(f, "private"),
            Self::Workgroup => write!(f, "workgroup"),
            Self::Uniform => write!(f, "uniform"),
            Self::Storage { access } => write!(f, "storage, {access}"),
            Self::Handle => write!(f, "handle"),
        }
    }
}

impl fmt::Display for BuiltinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn(b) => write!(f, "@builtin({b})"),
            Self::Location(loc) => write!(f, "@location({loc})"),
        }
    }
}

impl fmt::Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}i"),
            Self::U32(v) => write!(f, "{v}u"),
            Self::F32(v) => write!(f, "{v}f"),
            Self::F16(v) => write!(f, "{v}h"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negate => "-",
            Self::LogicalNot => "!",
            Self::BitwiseNot => "~",
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        })
    }
}

/// Formats a type handle as WGSL-like text.
pub fn format_type(types: &UniqueArena<Type>, handle: Handle<Type>) -> String {
    let ty = &types[handle];
    if let Some(name) = &ty.name {
        return name.clone();
    }
    match &ty.inner {
        TypeInner::Void => "void".into(),
        TypeInner::Scalar(s) => s.to_string(),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Atomic(s) => format!("atomic<{s}>"),
        TypeInner::Pointer { base, space } => {
            format!("ptr<{space}, {}>", format_type(types, *base))
        }
        TypeInner::Array { base, size, .. } => match size {
            ArraySize::Constant(n) => format!("array<{}, {n}>", format_type(types, *base)),
            ArraySize::Dynamic => format!("array<{}>", format_type(types, *base)),
        },
        TypeInner::Struct { members, .. } => {
            let fields: Vec<String> = members
                .iter()
                .map(|m| format!("{}: {}", m.name, format_type(types, m.ty)))
                .collect();
            format!("struct {{ {} }}", fields.join(", "))
        }
        TypeInner::Sampler => "sampler".into(),
        TypeInner::SampledTexture2d { scalar } => format!("texture_2d<{scalar}>"),
        TypeInner::TextureExternal => "texture_external".into(),
    }
}

/// Renders a module as text for debugging and the `ir` CLI target.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();

    out.push_str("Flags:");
    if module.flags.contains(ModuleFlags::UNIFORMITY_DISABLED) {
        out.push_str(" uniformity_disabled");
    }
    if module.flags.is_empty() {
        out.push_str(" (none)");
    }
    out.push('\n');

    out.push_str("Types:\n");
    for (handle, _) in module.types.iter() {
        out.push_str(&format!(
            "  t{} = {}\n",
            handle.index(),
            format_type(&module.types, handle)
        ));
    }

    out.push_str("Globals:\n");
    for (handle, var) in module.globals.iter() {
        let name = module
            .names
            .name_of(crate::NameKey::Global(handle))
            .or(var.name.as_deref())
            .unwrap_or("_");
        let binding = var
            .binding
            .map(|b| format!("{b} "))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {binding}var<{}> {name}: {}\n",
            var.space,
            format_type(&module.types, var.ty)
        ));
    }

    for (handle, function) in module.functions.iter() {
        dump_function(module, handle, function, &mut out);
    }
    out
}

fn dump_function(
    module: &Module,
    handle: Handle<Function>,
    function: &Function,
    out: &mut String,
) {
    let name = module
        .names
        .name_of(crate::NameKey::Function(handle))
        .or(function.name.as_deref())
        .unwrap_or("_");
    out.push_str(&format!("fn {name}"));
    if let Some(stage) = function.stage {
        out.push_str(&format!(" [{}", stage.as_str()));
        if let Some([x, y, z]) = function.workgroup_size {
            out.push_str(&format!(" @workgroup_size({x}, {y}, {z})"));
        }
        out.push(']');
    }
    out.push_str(" {\n");
    for (local, var) in function.locals.iter() {
        let lname = module
            .names
            .name_of(crate::NameKey::Local(handle, local))
            .or(var.name.as_deref())
            .unwrap_or("_");
        out.push_str(&format!(
            "  local {lname}: {}\n",
            format_type(&module.types, var.ty)
        ));
    }
    for (block_handle, block) in function.blocks.iter() {
        out.push_str(&format!("  b{}:\n", block_handle.index()));
        dump_block(module, block, out);
    }
    out.push_str("}\n");
}

fn dump_block(module: &Module, block: &Block, out: &mut String) {
    let val = |v: Handle<crate::value::Value>| format!("%{}", v.index());
    for inst in &block.instructions {
        let lhs = match inst.result {
            Some(r) => format!("    {} = ", val(r)),
            None => "    ".to_string(),
        };
        let rhs = match &inst.op {
            Op::Literal(lit) => format!("literal {lit}"),
            Op::Param(i) => format!("param {i}"),
            Op::GlobalRef(g) => format!("global_ref g{}", g.index()),
            Op::LocalRef(l) => format!("local_ref l{}", l.index()),
            Op::Load { pointer } => format!("load {}", val(*pointer)),
            Op::Store { pointer, value } => {
                format!("store {} <- {}", val(*pointer), val(*value))
            }
            Op::Access { base, index } => format!("access {}[{}]", val(*base), val(*index)),
            Op::AccessMember { base, member } => {
                format!("access_member {}.{member}", val(*base))
            }
            Op::Swizzle { vector, size, pattern } => {
                let letters = ['x', 'y', 'z', 'w'];
                let text: String = pattern
                    .iter()
                    .take(*size as usize)
                    .map(|c| letters[*c as usize])
                    .collect();
                format!("swizzle {}.{text}", val(*vector))
            }
            Op::Construct { ty, components } => {
                let args: Vec<String> = components.iter().map(|&c| val(c)).collect();
                format!(
                    "construct {}({})",
                    format_type(&module.types, *ty),
                    args.join(", ")
                )
            }
            Op::Convert { value, kind, width } => {
                let scalar = Scalar {
                    kind: *kind,
                    width: *width,
                };
                format!("convert {} to {scalar}", val(*value))
            }
            Op::Unary { op, value } => format!("{op}{}", val(*value)),
            Op::Binary { op, left, right } => {
                format!("{} {op} {}", val(*left), val(*right))
            }
            Op::Call { function: callee, arguments } => {
                let args: Vec<String> = arguments.iter().map(|&a| val(a)).collect();
                let callee_name = module
                    .names
                    .name_of(crate::NameKey::Function(*callee))
                    .unwrap_or("_");
                format!("call {callee_name}({})", args.join(", "))
            }
            Op::Builtin { fun, arguments } => {
                let args: Vec<String> = arguments.iter().map(|&a| val(a)).collect();
                format!("{}({})", fun.wgsl_name(), args.join(", "))
            }
        };
        out.push_str(&lhs);
        out.push_str(&rhs);
        out.push('\n');
    }
    let term = match &block.terminator {
        Terminator::Branch { target } => format!("branch b{}", target.index()),
        Terminator::BranchIf {
            condition,
            then_block,
            else_block,
        } => format!(
            "branch_if {} b{} b{}",
            val(*condition),
            then_block.index(),
            else_block.index()
        ),
        Terminator::Switch {
            selector,
            cases,
            default,
        } => {
            let arms: Vec<String> = cases
                .iter()
                .map(|c| format!("{} -> b{}", c.selector, c.block.index()))
                .collect();
            format!(
                "switch {} [{}] default b{}",
                val(*selector),
                arms.join(", "),
                default.index()
            )
        }
        Terminator::Return { value: Some(v) } => format!("return {}", val(*v)),
        Terminator::Return { value: None } => "return".to_string(),
        Terminator::Discard => "discard".to_string(),
        Terminator::Unreachable => "unreachable".to_string(),
    };
    out.push_str("    ");
    out.push_str(&term);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instruction, NameKey, Stage};
    use shade_diag::Span;

    #[test]
    fn format_basic_types() {
        let mut types = UniqueArena::new();
        let f32_ty = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::F32),
        });
        let vec3 = types.insert(Type {
            name: None,
            inner: TypeInner::Vector {
                size: VectorSize::Tri,
                scalar: Scalar::F32,
            },
        });
        let arr = types.insert(Type {
            name: None,
            inner: TypeInner::Array {
                base: f32_ty,
                size: ArraySize::Dynamic,
                stride: 4,
            },
        });
        assert_eq!(format_type(&types, f32_ty), "f32");
        assert_eq!(format_type(&types, vec3), "vec3<f32>");
        assert_eq!(format_type(&types, arr), "array<f32>");
    }

    #[test]
    fn named_types_print_their_name() {
        let mut types = UniqueArena::new();
        let u32_ty = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::U32),
        });
        let s = types.insert(Type {
            name: Some("Params".into()),
            inner: TypeInner::Struct {
                members: vec![crate::StructMember {
                    name: "count".into(),
                    ty: u32_ty,
                    offset: 0,
                }],
                span: 4,
            },
        });
        assert_eq!(format_type(&types, s), "Params");
    }

    #[test]
    fn dump_contains_entry_point_and_blocks() {
        let mut module = Module::default();
        let i32_ty = module.types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::I32),
        });
        let mut f = Function::new("main");
        f.stage = Some(Stage::Compute);
        f.workgroup_size = Some([8, 8, 1]);
        let v = f.add_value(i32_ty, Span::default());
        f.blocks[f.entry].instructions.push(Instruction {
            result: Some(v),
            op: Op::Literal(Literal::I32(7)),
        });
        f.blocks[f.entry].terminator = Terminator::Return { value: None };
        let handle = module.functions.append(f);
        module.names.set_name(NameKey::Function(handle), "main");

        let dump = dump_module(&module);
        assert!(dump.contains("fn main [compute @workgroup_size(8, 8, 1)]"));
        assert!(dump.contains("b0:"));
        assert!(dump.contains("%0 = literal 7i"));
        assert!(dump.contains("return"));
    }

    #[test]
    fn dump_reports_waiver_flag() {
        let mut module = Module::default();
        module.flags |= ModuleFlags::UNIFORMITY_DISABLED;
        assert!(dump_module(&module).contains("uniformity_disabled"));
    }
}
