//! Command-line interface implementation for cdf-build.
//! Provides argument parsing with clap and the `run` entry point used by the binary.

use crate::build::BuildCommand;
use crate::error::{ToolkitError, ToolkitResult};
use clap::Parser;
use log::info;
use std::path::PathBuf;

/// Command-line arguments structure for cdf-build.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cdf-build: build configuration modules into deployable resource files",
    long_about = None
)]
pub struct Args {
    /// Organization directory holding `modules/` and `config.<env>.yaml`
    #[arg(value_name = "ORGANIZATION_DIR", default_value = ".")]
    pub organization_dir: PathBuf,

    /// Directory the built resource files are written to
    #[arg(short, long, value_name = "BUILD_DIR", default_value = "build")]
    pub build_dir: PathBuf,

    /// Environment to build, selects `config.<env>.yaml`
    #[arg(short, long, default_value = "dev")]
    pub env: String,

    /// Keep existing files in the build directory instead of removing them first
    #[arg(long)]
    pub no_clean: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Exit with a non-zero status when the build produced any warning
    #[arg(long)]
    pub exit_non_zero_on_warning: bool,
}

/// Parses command line arguments and returns the Args structure.
pub fn get_args() -> Args {
    Args::parse()
}

/// Builds the organization directory described by `args`.
///
/// # Errors
/// * Any fatal error of [`BuildCommand::execute`]
/// * `ToolkitError::ConfigError` if a module failed to build, or if warnings were raised
///   and `--exit-non-zero-on-warning` is set
pub fn run(args: Args) -> ToolkitResult<()> {
    let mut command = BuildCommand::new();
    let built =
        command.execute(&args.organization_dir, &args.build_dir, &args.env, !args.no_clean)?;

    let failed: Vec<String> =
        built.failed().map(|module| format!("{} ({})", module.name, module.status)).collect();
    if !failed.is_empty() {
        return Err(ToolkitError::ConfigError(format!(
            "Failed to build module(s): {}",
            failed.join(", ")
        )));
    }
    if args.exit_non_zero_on_warning && !built.warnings.is_empty() {
        return Err(ToolkitError::ConfigError(format!(
            "Build finished with {} warning(s)",
            built.warnings.len()
        )));
    }
    info!("Build finished successfully in {}.", args.build_dir.display());
    Ok(())
}
