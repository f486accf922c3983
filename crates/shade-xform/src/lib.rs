//! IR transform passes.
//!
//! Each pass exposes a precondition ([`Pass::should_run`]) and a rewrite
//! ([`Pass::run`]), composed by a [`Driver`] that applies a fixed
//! sequence, skipping passes whose precondition does not hold. Every
//! pass is idempotent: after `run`, its own `should_run` is false, so
//! re-running a pass is a no-op.

mod disable_uniformity;
mod external_texture;
mod renamer;

pub use disable_uniformity::DisableUniformityAnalysis;
pub use external_texture::ExternalTextureExpansion;
pub use renamer::Renamer;

use shade_ir::Module;

/// A module-level rewrite with an explicit precondition.
pub trait Pass {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Returns `true` if the module still needs this pass.
    fn should_run(&self, module: &Module) -> bool;

    /// Rewrites the module. After this, [`should_run`](Pass::should_run)
    /// must return `false`.
    fn run(&mut self, module: &mut Module);
}

/// Applies passes in a fixed sequence, skipping any whose precondition
/// is already satisfied.
#[derive(Default)]
pub struct Driver {
    passes: Vec<Box<dyn Pass>>,
}

impl Driver {
    /// Creates an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass to the sequence.
    pub fn push(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// The standard sequence applied before every backend.
    pub fn with_defaults() -> Self {
        let mut driver = Self::new();
        driver.push(Box::new(ExternalTextureExpansion));
        driver.push(Box::new(Renamer::default()));
        driver
    }

    /// Runs each pass whose precondition holds, in order.
    pub fn run(&mut self, module: &mut Module) {
        for pass in &mut self.passes {
            if !pass.should_run(module) {
                log::debug!("pass {} skipped (precondition already satisfied)", pass.name());
                continue;
            }
            log::debug!("running pass {}", pass.name());
            pass.run(module);
            debug_assert!(
                !pass.should_run(module),
                "pass {} is not idempotent",
                pass.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPass {
        runs: std::rc::Rc<std::cell::Cell<u32>>,
        armed: bool,
    }

    impl Pass for CountingPass {
        fn name(&self) -> &str {
            "counting"
        }
        fn should_run(&self, _module: &Module) -> bool {
            self.armed
        }
        fn run(&mut self, _module: &mut Module) {
            self.armed = false;
            self.runs.set(self.runs.get() + 1);
        }
    }

    #[test]
    fn driver_skips_passes_whose_precondition_is_false() {
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut driver = Driver::new();
        driver.push(Box::new(CountingPass {
            runs: runs.clone(),
            armed: false,
        }));
        driver.run(&mut Module::default());
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn driver_runs_armed_passes_once() {
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut driver = Driver::new();
        driver.push(Box::new(CountingPass {
            runs: runs.clone(),
            armed: true,
        }));
        let mut module = Module::default();
        driver.run(&mut module);
        driver.run(&mut module);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn default_sequence_is_a_noop_on_an_empty_module() {
        let mut module = Module::default();
        Driver::with_defaults().run(&mut module);
        assert!(module.flags.is_empty());
        assert!(module.globals.is_empty());
    }
}
