//! Structural validation of a lowered module.

use crate::arena::Handle;
use crate::func::Function;
use crate::value::{Op, Terminator};
use crate::Module;

/// Errors reported by [`Module::validate`].
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for its arena.
    #[error("in function '{function}': handle index {index} out of bounds (arena size: {size})")]
    BadHandle {
        function: String,
        index: usize,
        size: usize,
    },

    /// A compute entry point has a zero workgroup dimension.
    #[error("invalid workgroup size: [{}, {}, {}]", .0[0], .0[1], .0[2])]
    InvalidWorkgroupSize([u32; 3]),

    /// A compute entry point is missing its workgroup size.
    #[error("compute entry point '{0}' has no workgroup size")]
    MissingWorkgroupSize(String),
}

impl Module {
    /// Checks that every block, value, local, and global reference in the
    /// module points into its arena and that entry-point metadata is
    /// well-formed. Cheap enough to run before every backend dispatch.
    pub fn validate(&self) -> Result<(), IrError> {
        for (_, function) in self.functions.iter() {
            self.validate_function(function)?;
        }
        Ok(())
    }

    fn validate_function(&self, function: &Function) -> Result<(), IrError> {
        let name = function.name.clone().unwrap_or_default();
        let bad = |index: usize, size: usize| IrError::BadHandle {
            function: name.clone(),
            index,
            size,
        };
        let check_value = |v: Handle<crate::value::Value>| {
            if v.index() < function.values.len() {
                Ok(())
            } else {
                Err(bad(v.index(), function.values.len()))
            }
        };
        let check_block = |b: Handle<crate::func::Block>| {
            if b.index() < function.blocks.len() {
                Ok(())
            } else {
                Err(bad(b.index(), function.blocks.len()))
            }
        };

        if let Some(size) = function.workgroup_size {
            if size.iter().any(|&d| d == 0) {
                return Err(IrError::InvalidWorkgroupSize(size));
            }
        }
        if function.stage == Some(crate::Stage::Compute) && function.workgroup_size.is_none() {
            return Err(IrError::MissingWorkgroupSize(name.clone()));
        }

        check_block(function.entry)?;
        for (_, block) in function.blocks.iter() {
            for inst in &block.instructions {
                if let Some(result) = inst.result {
                    check_value(result)?;
                }
                match &inst.op {
                    Op::Literal(_) | Op::Param(_) => {}
                    Op::GlobalRef(g) => {
                        if g.index() >= self.globals.len() {
                            return Err(bad(g.index(), self.globals.len()));
                        }
                    }
                    Op::LocalRef(l) => {
                        if l.index() >= function.locals.len() {
                            return Err(bad(l.index(), function.locals.len()));
                        }
                    }
                    Op::Load { pointer } => check_value(*pointer)?,
                    Op::Store { pointer, value } => {
                        check_value(*pointer)?;
                        check_value(*value)?;
                    }
                    Op::Access { base, index } => {
                        check_value(*base)?;
                        check_value(*index)?;
                    }
                    Op::AccessMember { base, .. } => check_value(*base)?,
                    Op::Swizzle { vector, .. } => check_value(*vector)?,
                    Op::Construct { components, .. } => {
                        for &c in components {
                            check_value(c)?;
                        }
                    }
                    Op::Convert { value, .. } => check_value(*value)?,
                    Op::Unary { value, .. } => check_value(*value)?,
                    Op::Binary { left, right, .. } => {
                        check_value(*left)?;
                        check_value(*right)?;
                    }
                    Op::Call {
                        function: callee,
                        arguments,
                    } => {
                        if callee.index() >= self.functions.len() {
                            return Err(bad(callee.index(), self.functions.len()));
                        }
                        for &a in arguments {
                            check_value(a)?;
                        }
                    }
                    Op::Builtin { arguments, .. } => {
                        for &a in arguments {
                            check_value(a)?;
                        }
                    }
                }
            }
            match &block.terminator {
                Terminator::Branch { target } => check_block(*target)?,
                Terminator::BranchIf {
                    condition,
                    then_block,
                    else_block,
                } => {
                    check_value(*condition)?;
                    check_block(*then_block)?;
                    check_block(*else_block)?;
                }
                Terminator::Switch {
                    selector,
                    cases,
                    default,
                } => {
                    check_value(*selector)?;
                    for case in cases {
                        check_block(case.block)?;
                    }
                    check_block(*default)?;
                }
                Terminator::Return { value } => {
                    if let Some(v) = value {
                        check_value(*v)?;
                    }
                }
                Terminator::Discard | Terminator::Unreachable => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Stage, Terminator};

    #[test]
    fn empty_module_is_valid() {
        assert!(Module::default().validate().is_ok());
    }

    #[test]
    fn compute_without_workgroup_size_is_invalid() {
        let mut module = Module::default();
        let mut f = Function::new("main");
        f.stage = Some(Stage::Compute);
        f.blocks[f.entry].terminator = Terminator::Return { value: None };
        module.functions.append(f);
        assert!(matches!(
            module.validate(),
            Err(IrError::MissingWorkgroupSize(_))
        ));
    }

    #[test]
    fn zero_workgroup_dimension_is_invalid() {
        let mut module = Module::default();
        let mut f = Function::new("main");
        f.stage = Some(Stage::Compute);
        f.workgroup_size = Some([8, 0, 1]);
        module.functions.append(f);
        assert!(matches!(
            module.validate(),
            Err(IrError::InvalidWorkgroupSize([8, 0, 1]))
        ));
    }

    #[test]
    fn dangling_branch_target_is_invalid() {
        let mut module = Module::default();
        let mut f = Function::new("f");
        let entry = f.entry;
        let exit = f.add_block();
        f.blocks[exit].terminator = Terminator::Return { value: None };
        f.blocks[entry].terminator = Terminator::Branch { target: exit };
        module.functions.append(f.clone());
        assert!(module.validate().is_ok());

        // Truncate the block arena by rebuilding the function without exit.
        let mut broken = Function::new("f");
        broken.blocks[broken.entry].terminator = Terminator::Branch { target: exit };
        let mut module = Module::default();
        module.functions.append(broken);
        assert!(matches!(module.validate(), Err(IrError::BadHandle { .. })));
    }
}
