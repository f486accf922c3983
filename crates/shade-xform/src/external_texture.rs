//! Expansion of `texture_external` into ordinary sampled textures.
//!
//! External (video) textures may arrive as one RGBA plane or as two
//! YUV planes plus conversion parameters. Targets have no such type,
//! so every external texture global is rewritten into a
//! `texture_2d<f32>` primary plane, a secondary plane, and a uniform
//! parameter block, and the operations on it are retargeted at the
//! primary plane.

use shade_ir::{
    AddressSpace, Builtin, GlobalVariable, Instruction, Literal, Module, NameKey, Op,
    ResourceBinding, Scalar, StructMember, Type, TypeInner,
};

use crate::Pass;

/// Replaces every `texture_external` with multi-planar sampled textures.
#[derive(Debug, Default)]
pub struct ExternalTextureExpansion;

impl Pass for ExternalTextureExpansion {
    fn name(&self) -> &str {
        "external-texture-expansion"
    }

    fn should_run(&self, module: &Module) -> bool {
        module
            .globals
            .iter()
            .any(|(_, var)| matches!(module.types[var.ty].inner, TypeInner::TextureExternal))
    }

    fn run(&mut self, module: &mut Module) {
        let external_ty = match module
            .types
            .iter()
            .find(|(_, ty)| matches!(ty.inner, TypeInner::TextureExternal))
        {
            Some((handle, _)) => handle,
            None => return,
        };
        let plane_ty = module.types.insert(Type {
            name: None,
            inner: TypeInner::SampledTexture2d { scalar: Scalar::F32 },
        });
        let u32_ty = module.types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::U32),
        });
        let params_ty = module.types.insert(Type {
            name: Some("ExternalTextureParams".into()),
            inner: TypeInner::Struct {
                members: vec![
                    StructMember {
                        name: "num_planes".into(),
                        ty: u32_ty,
                        offset: 0,
                    },
                    StructMember {
                        name: "do_yuv_to_rgb".into(),
                        ty: u32_ty,
                        offset: 4,
                    },
                ],
                span: 8,
            },
        });

        let targets: Vec<_> = module
            .globals
            .iter()
            .filter(|(_, var)| var.ty == external_ty)
            .map(|(handle, _)| handle)
            .collect();

        for global in targets {
            let (base_name, group) = {
                let var = &module.globals[global];
                (
                    var.name.clone().unwrap_or_else(|| "ext_tex".into()),
                    var.binding.map(|b| b.group).unwrap_or(0),
                )
            };
            // The original global becomes the primary plane.
            module.globals[global].ty = plane_ty;

            let next = next_free_binding(module, group);
            let plane1 = module.globals.append(GlobalVariable {
                name: Some(format!("{base_name}_plane1")),
                space: AddressSpace::Handle,
                binding: Some(ResourceBinding {
                    group,
                    binding: next,
                }),
                ty: plane_ty,
                init: None,
            });
            module
                .names
                .set_name(NameKey::Global(plane1), &format!("{base_name}_plane1"));

            let params = module.globals.append(GlobalVariable {
                name: Some(format!("{base_name}_params")),
                space: AddressSpace::Uniform,
                binding: Some(ResourceBinding {
                    group,
                    binding: next + 1,
                }),
                ty: params_ty,
                init: None,
            });
            module
                .names
                .set_name(NameKey::Global(params), &format!("{base_name}_params"));
        }

        retarget_operations(module, external_ty, plane_ty, u32_ty);
    }
}

/// Retypes values that carried the external texture type and gives
/// level-less `textureLoad` calls their explicit mip level.
fn retarget_operations(
    module: &mut Module,
    external_ty: shade_ir::Handle<Type>,
    plane_ty: shade_ir::Handle<Type>,
    u32_ty: shade_ir::Handle<Type>,
) {
    for (_, function) in module.functions.iter_mut() {
        let mut retyped = Vec::new();
        for (value, data) in function.values.iter_mut() {
            if data.ty == external_ty {
                data.ty = plane_ty;
                retyped.push(value);
            }
        }
        if retyped.is_empty() {
            continue;
        }
        for (_, block) in function.blocks.iter_mut() {
            let mut rewritten = Vec::with_capacity(block.instructions.len());
            for inst in block.instructions.drain(..) {
                match inst.op {
                    Op::Builtin {
                        fun: Builtin::TextureLoad,
                        ref arguments,
                    } if arguments.len() == 2 && retyped.contains(&arguments[0]) => {
                        // Plane loads always address an explicit level.
                        let span = inst
                            .result
                            .map(|r| function.values[r].span)
                            .unwrap_or_default();
                        let level = function.values.append(shade_ir::Value {
                            ty: u32_ty,
                            span,
                        });
                        rewritten.push(Instruction {
                            result: Some(level),
                            op: Op::Literal(Literal::U32(0)),
                        });
                        let mut arguments = arguments.clone();
                        arguments.push(level);
                        rewritten.push(Instruction {
                            result: inst.result,
                            op: Op::Builtin {
                                fun: Builtin::TextureLoad,
                                arguments,
                            },
                        });
                    }
                    _ => rewritten.push(inst),
                }
            }
            block.instructions = rewritten;
        }
    }
}

fn next_free_binding(module: &Module, group: u32) -> u32 {
    module
        .globals
        .iter()
        .filter_map(|(_, var)| var.binding)
        .filter(|b| b.group == group)
        .map(|b| b.binding + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_external_texture() -> Module {
        let mut module = Module::default();
        let external = module.types.insert(Type {
            name: None,
            inner: TypeInner::TextureExternal,
        });
        let global = module.globals.append(GlobalVariable {
            name: Some("video".into()),
            space: AddressSpace::Handle,
            binding: Some(ResourceBinding { group: 0, binding: 2 }),
            ty: external,
            init: None,
        });
        module.names.set_name(NameKey::Global(global), "video");
        module
    }

    #[test]
    fn expands_into_planes_and_params() {
        let mut module = module_with_external_texture();
        let mut pass = ExternalTextureExpansion;
        assert!(pass.should_run(&module));
        pass.run(&mut module);

        assert_eq!(module.globals.len(), 3);
        let globals: Vec<_> = module.globals.iter().map(|(_, v)| v).collect();
        assert!(matches!(
            module.types[globals[0].ty].inner,
            TypeInner::SampledTexture2d { scalar: Scalar::F32 }
        ));
        assert_eq!(globals[1].name.as_deref(), Some("video_plane1"));
        assert_eq!(globals[1].binding, Some(ResourceBinding { group: 0, binding: 3 }));
        assert_eq!(globals[2].name.as_deref(), Some("video_params"));
        assert_eq!(globals[2].space, AddressSpace::Uniform);
        assert_eq!(globals[2].binding, Some(ResourceBinding { group: 0, binding: 4 }));
    }

    #[test]
    fn precondition_clears_after_one_run() {
        let mut module = module_with_external_texture();
        let mut pass = ExternalTextureExpansion;
        pass.run(&mut module);
        assert!(!pass.should_run(&module));
        let globals = module.globals.len();
        pass.run(&mut module);
        assert_eq!(module.globals.len(), globals);
    }

    #[test]
    fn untouched_module_is_not_a_target() {
        let module = Module::default();
        assert!(!ExternalTextureExpansion.should_run(&module));
    }
}
