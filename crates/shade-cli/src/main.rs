use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use shade_backend_core::{
    BackendOptions, BackendRegistry, GlslVersion, OutputContent,
};
use shade_diag::{Formatter, SourceFile, Style};
use shade_resolver::ResolveOptions;
use shade_xform::{DisableUniformityAnalysis, Driver};

/// shade — WGSL cross-compiler
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input WGSL file
    input: PathBuf,

    /// Target backend (default: wgsl)
    #[arg(short, long, default_value = "wgsl")]
    target: String,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the uniformity analysis, as if the module enabled
    /// `disable_uniformity_analysis`
    #[arg(long)]
    disable_uniformity: bool,

    /// GLSL target version: a number for desktop (e.g. 450) or with an
    /// "es" suffix for OpenGL ES (e.g. 310es)
    #[arg(long, default_value = "450", value_parser = parse_glsl_version)]
    glsl_version: GlslVersion,

    /// Dump IR to stderr before backend emission
    #[arg(long)]
    emit_ir: bool,

    /// Validate and transform without producing output
    #[arg(long)]
    dry_run: bool,
}

fn parse_glsl_version(s: &str) -> Result<GlslVersion, String> {
    let (digits, es) = match s.strip_suffix("es") {
        Some(digits) => (digits.trim_end_matches(' '), true),
        None => (s, false),
    };
    let version: u16 = digits
        .parse()
        .map_err(|_| format!("invalid GLSL version '{s}', expected e.g. 450 or 310es"))?;
    Ok(if es {
        GlslVersion::Es(version)
    } else {
        GlslVersion::Desktop(version)
    })
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;
    let file_name = cli.input.to_string_lossy().into_owned();
    let file = SourceFile::new(file_name, source);

    // 2. Parse and resolve; every problem goes through the diagnostic
    //    formatter, never a bare Debug dump.
    let formatter = Formatter::new(Style {
        print_newline_at_end: true,
        ..Style::default()
    });
    let (ast, parse_diags) = shade_parser::parse(&file);
    if !parse_diags.is_empty() {
        eprint!("{}", formatter.format(&file, &parse_diags));
    }
    if parse_diags.has_errors() {
        return Err(miette::miette!("input program is not valid"));
    }

    let options = ResolveOptions {
        disable_uniformity: cli.disable_uniformity,
    };
    let program = shade_resolver::resolve_with(&file, ast, &options);
    if !program.diagnostics().is_empty() {
        eprint!("{}", formatter.format(&file, program.diagnostics()));
    }
    if !program.is_valid() {
        return Err(miette::miette!("input program is not valid"));
    }

    // 3. Lower and run the transform pipeline.
    let mut module = shade_resolver::lower::build_module(&program);
    let mut driver = Driver::with_defaults();
    if cli.disable_uniformity
        || program.has_extension(&shade_parser::ast::Extension::DisableUniformityAnalysis)
    {
        driver.push(Box::new(DisableUniformityAnalysis));
    }
    driver.run(&mut module);

    // 4. Optionally dump IR to stderr.
    if cli.emit_ir {
        eprintln!("{}", shade_ir::dump_module(&module));
    }

    // 5. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 6. Backend dispatch.
    let mut registry = BackendRegistry::with_builtins();
    registry.register(Box::new(shade_backend_wgsl::WgslBackend));
    registry.register(Box::new(shade_backend_hlsl::HlslBackend));
    registry.register(Box::new(shade_backend_msl::MslBackend));
    registry.register(Box::new(shade_backend_glsl::GlslBackend));
    registry.register(Box::new(shade_backend_spirv::SpirvBackend));
    let backend = registry.find(&cli.target).ok_or_else(|| {
        let available = registry.list_targets().join(", ");
        miette::miette!("unknown target '{}' (available: {})", cli.target, available)
    })?;

    let opts = BackendOptions {
        glsl_version: cli.glsl_version,
        ..Default::default()
    };

    let output = backend
        .emit(&program, &module, &opts)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("{} emission failed", backend.name()))?;

    // 7. Print informational diagnostics.
    if !output.diagnostics.is_empty() {
        eprint!("{}", formatter.format(&file, &output.diagnostics));
    }

    // 8. Write output.
    for out_file in &output.files {
        match (&cli.output, &out_file.content) {
            (Some(path), OutputContent::Text(text)) => {
                std::fs::write(path, text)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (Some(path), OutputContent::Binary(data)) => {
                std::fs::write(path, data)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (None, OutputContent::Text(text)) => {
                print!("{text}");
            }
            (None, OutputContent::Binary(_)) => {
                return Err(miette::miette!(
                    "backend produced binary output but no --output path was specified"
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_version_parsing() {
        assert_eq!(parse_glsl_version("450"), Ok(GlslVersion::Desktop(450)));
        assert_eq!(parse_glsl_version("310es"), Ok(GlslVersion::Es(310)));
        assert!(parse_glsl_version("es").is_err());
        assert!(parse_glsl_version("fast").is_err());
    }

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["shade", "kernel.wgsl"]);
        assert_eq!(cli.target, "wgsl");
        assert!(!cli.disable_uniformity);
        assert_eq!(cli.glsl_version, GlslVersion::Desktop(450));
    }

    #[test]
    fn cli_parses_target_and_flags() {
        let cli = Cli::parse_from([
            "shade",
            "kernel.wgsl",
            "--target",
            "spirv",
            "--disable-uniformity",
            "--glsl-version",
            "310es",
            "--emit-ir",
        ]);
        assert_eq!(cli.target, "spirv");
        assert!(cli.disable_uniformity);
        assert!(cli.emit_ir);
        assert_eq!(cli.glsl_version, GlslVersion::Es(310));
    }
}
