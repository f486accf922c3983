//! Stamps the uniformity-analysis waiver on a module.

use shade_ir::{Module, ModuleFlags};

use crate::Pass;

/// Marks a module as having waived uniformity analysis.
///
/// The analysis itself runs (or is skipped) in the resolver; this pass
/// records the waiver on the IR so downstream tooling knows the
/// uniform-control-flow guarantee does not hold. The precondition is
/// simply the absence of the marker, which makes re-running the pass a
/// no-op.
#[derive(Debug, Default)]
pub struct DisableUniformityAnalysis;

impl Pass for DisableUniformityAnalysis {
    fn name(&self) -> &str {
        "disable-uniformity-analysis"
    }

    fn should_run(&self, module: &Module) -> bool {
        !module.flags.contains(ModuleFlags::UNIFORMITY_DISABLED)
    }

    fn run(&mut self, module: &mut Module) {
        module.flags |= ModuleFlags::UNIFORMITY_DISABLED;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_the_waiver_flag() {
        let mut module = Module::default();
        let mut pass = DisableUniformityAnalysis;
        assert!(pass.should_run(&module));
        pass.run(&mut module);
        assert!(module.flags.contains(ModuleFlags::UNIFORMITY_DISABLED));
    }

    #[test]
    fn rerunning_is_a_noop() {
        let mut module = Module::default();
        let mut pass = DisableUniformityAnalysis;
        pass.run(&mut module);
        assert!(!pass.should_run(&module));
        let flags = module.flags;
        pass.run(&mut module);
        assert_eq!(module.flags, flags);
    }
}
