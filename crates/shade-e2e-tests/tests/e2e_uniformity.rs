mod common;

use shade_ir::ModuleFlags;
use shade_resolver::ResolveOptions;
use shade_xform::{DisableUniformityAnalysis, Driver, Pass};

const UNIFORM_BARRIER: &str = r#"
var<workgroup> tile: array<f32, 64>;

@compute @workgroup_size(64)
fn main(@builtin(workgroup_id) wid: vec3<u32>) {
    if wid.x > 0u {
        workgroupBarrier();
    }
}
"#;

const DIVERGENT_BARRIER: &str = r#"
var<workgroup> tile: array<f32, 64>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x > 0u {
        workgroupBarrier();
    }
}
"#;

#[test]
fn barrier_under_uniform_condition_passes() {
    let (_, program) = common::resolve(UNIFORM_BARRIER);
    assert!(program.is_valid(), "{:?}", program.diagnostics());
    assert!(program.diagnostics().is_empty());
}

#[test]
fn barrier_under_divergent_condition_cites_the_call() {
    let (_, program) = common::resolve(DIVERGENT_BARRIER);
    assert!(!program.is_valid());
    assert_eq!(program.diagnostics().error_count(), 1);
    let error = program.diagnostics().iter().next().unwrap();
    assert_eq!(
        error.message,
        "'workgroupBarrier' must only be called from uniform control flow"
    );
    // The call site, not the condition, carries the error.
    assert_eq!(error.span.start.line, 7);
}

#[test]
fn divergence_flows_through_helper_functions() {
    let (_, program) = common::resolve(
        r#"
fn sync() {
    workgroupBarrier();
}

@compute @workgroup_size(64)
fn main(@builtin(local_invocation_index) lid: u32) {
    if lid > 0u {
        sync();
    }
}
"#,
    );
    assert!(!program.is_valid());
    assert_eq!(program.diagnostics().error_count(), 1);
    let error = program.diagnostics().iter().next().unwrap();
    assert!(error.message.contains("'sync'"), "{}", error.message);
}

#[test]
fn opt_out_extension_waives_the_analysis() {
    let source = format!("enable disable_uniformity_analysis;\n{DIVERGENT_BARRIER}");
    let (_, program) = common::resolve(&source);
    assert!(program.is_valid(), "{:?}", program.diagnostics());
}

#[test]
fn opt_out_flag_waives_the_analysis() {
    let options = ResolveOptions {
        disable_uniformity: true,
    };
    let (_, program) = common::resolve_with(DIVERGENT_BARRIER, &options);
    assert!(program.is_valid(), "{:?}", program.diagnostics());
}

#[test]
fn waiver_is_stamped_on_the_module() {
    let source = format!("enable disable_uniformity_analysis;\n{DIVERGENT_BARRIER}");
    let (_, program) = common::resolve(&source);
    let mut module = shade_resolver::lower::build_module(&program);
    assert!(!module.flags.contains(ModuleFlags::UNIFORMITY_DISABLED));

    let mut driver = Driver::with_defaults();
    driver.push(Box::new(DisableUniformityAnalysis));
    driver.run(&mut module);
    assert!(module.flags.contains(ModuleFlags::UNIFORMITY_DISABLED));
}

#[test]
fn disable_pass_is_idempotent() {
    let (_, _, mut module) = common::compile(UNIFORM_BARRIER);
    let mut pass = DisableUniformityAnalysis;
    assert!(pass.should_run(&module));
    pass.run(&mut module);
    assert!(!pass.should_run(&module), "rerunning must be a no-op");
    let flags = module.flags;
    pass.run(&mut module);
    assert_eq!(module.flags, flags);
}
