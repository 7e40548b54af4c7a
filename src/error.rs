//! Error handling for the build pipeline.
//! Defines the fatal error types and the result alias used throughout the crate.
//! Recoverable conditions are not errors; see [`crate::warning`].

use std::io;
use thiserror::Error;

/// Fatal errors raised while building a project.
///
/// Module-selection errors abort the whole build. Every other variant raised while one
/// module is being built is caught by the orchestrator and recorded as that module's status.
#[derive(Error, Debug)]
pub enum ToolkitError {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// Represents errors that occur while walking the organization directory
    #[error("Directory walk error: {0}.")]
    WalkError(#[from] walkdir::Error),

    /// Represents errors in the environment configuration file
    #[error("Configuration error: {0}.")]
    ConfigError(String),

    /// A template file is not valid YAML after variable substitution
    #[error("YAML format error in '{path}': {message}.")]
    YamlFormatError { path: String, message: String },

    /// Several unrelated resource kinds claim the same file
    #[error(
        "Ambiguous resource file '{path}': it could be any of {kinds}. \
         Use the '<name>.<kind>.yaml' filename convention to select one."
    )]
    AmbiguousResourceFileError { path: String, kinds: String },

    /// A capability object failed while listing the dependencies of an item
    #[error("Failed to extract dependencies from '{path}'{element}: {message}.")]
    DependencyExtractionError { path: String, element: String, message: String },

    /// A module name selected by name exists in several places
    #[error(
        "Ambiguous module name '{name}', it matches: {paths}. Select the module by path instead."
    )]
    AmbiguousModuleError { name: String, paths: String },

    /// Selected modules that do not exist in the organization directory
    #[error("Modules not found: {names}.{suggestions}")]
    MissingModuleError { names: String, suggestions: String },

    /// A package lists modules that do not exist
    #[error("Package '{package}' references missing module(s): {modules}.")]
    MissingPackageModuleError { package: String, modules: String },

    /// Nothing matched the selection
    #[error("No modules selected. Check the 'selected' list of the environment configuration.")]
    EmptySelectionError,

    /// Represents errors in processing the .toolkitignore file
    #[error("Ignore file error: {0}.")]
    IgnoreFileError(String),
}

impl ToolkitError {
    /// Stable name recorded as the status of a module whose build failed.
    pub fn type_name(&self) -> &'static str {
        match self {
            ToolkitError::IoError(_) | ToolkitError::WalkError(_) => "ToolkitIOError",
            ToolkitError::ConfigError(_) => "ToolkitConfigError",
            ToolkitError::YamlFormatError { .. } => "ToolkitYAMLFormatError",
            ToolkitError::AmbiguousResourceFileError { .. } => "AmbiguousResourceFileError",
            ToolkitError::DependencyExtractionError { .. } => "ToolkitDependencyExtractionError",
            ToolkitError::AmbiguousModuleError { .. } => "ToolkitAmbiguousModuleError",
            ToolkitError::MissingModuleError { .. } => "ToolkitMissingModuleError",
            ToolkitError::MissingPackageModuleError { .. } => "ToolkitMissingPackageModuleError",
            ToolkitError::EmptySelectionError => "ToolkitEmptySelectionError",
            ToolkitError::IgnoreFileError(_) => "ToolkitIgnoreFileError",
        }
    }

    pub(crate) fn yaml_format<P: AsRef<std::path::Path>>(path: P, message: impl ToString) -> Self {
        ToolkitError::YamlFormatError {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Convenience type alias for Results with ToolkitError as the error type.
pub type ToolkitResult<T> = Result<T, ToolkitError>;

/// Default error handler that prints the error and exits the program.
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: ToolkitError) {
    eprintln!("{}", err);
    std::process::exit(1);
}
