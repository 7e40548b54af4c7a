//! cdf-build turns a tree of configuration modules into a flat directory of deployable
//! resource files. It substitutes environment variables into YAML templates, validates the
//! resources they define, and reports references to resources no module provides.

/// Build orchestration across modules and iterations
pub mod build;

/// Per-folder build step: substitution, numbering, validation
pub mod builder;

/// Command-line interface module for the cdf-build application
pub mod cli;

/// Environment configuration, `config.<env>.yaml`
pub mod config;

/// Presentation hooks for warnings and progress
pub mod console;

/// Constants shared across the crate
pub mod constants;

/// Error types and handling for the cdf-build application
pub mod error;

/// File and directory ignore patterns
/// Processes .toolkitignore files to exclude specific paths
pub mod ignore;

/// Resource capability objects and their folder registry
pub mod loader;

/// Logging setup for the binary
pub mod logger;

/// Existence checks for referenced resources
pub mod lookup;

/// Module discovery and selection
pub mod modules;

/// Field and type checks for resource items
pub mod validation;

/// Variable scoping and substitution
pub mod variables;

/// Structured build warnings
pub mod warning;
