//! File and directory ignore pattern handling for organization directories.
//! This module processes .toolkitignore files to exclude specific paths
//! from module discovery, similar to .gitignore functionality.

use crate::error::{ToolkitError, ToolkitResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::debug;
use std::{fs::read_to_string, path::Path};

pub use crate::constants::IGNORE_FILE;

/// Patterns that are always ignored.
pub const DEFAULT_IGNORE_PATTERNS: [&str; 2] = ["**/.DS_Store", "**/__pycache__/**"];

/// Whether a directory, relative to the organization directory, is ignored.
///
/// Directory patterns such as `modules/drafts/**` only match paths below the directory,
/// so the path is also tried with a trailing `/`.
pub fn is_ignored_dir(ignore: &GlobSet, relative_dir: &Path) -> bool {
    ignore.is_match(relative_dir) || ignore.is_match(format!("{}/", relative_dir.display()))
}

/// Reads the .toolkitignore file of an organization directory into a set of glob patterns.
///
/// # Arguments
/// * `organization_dir` - Directory that may contain a .toolkitignore file
///
/// # Returns
/// * `ToolkitResult<GlobSet>` - Set of compiled glob patterns, matched against paths
///   relative to the organization directory
///
/// # Notes
/// - If the file doesn't exist, only the default patterns are returned
/// - Empty lines and lines starting with `#` are skipped
/// - Invalid patterns result in an IgnoreFileError
pub fn parse_ignore_file<P: AsRef<Path>>(organization_dir: P) -> ToolkitResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_IGNORE_PATTERNS {
        builder.add(Glob::new(pattern).map_err(|e| ToolkitError::IgnoreFileError(e.to_string()))?);
    }

    let ignore_path = organization_dir.as_ref().join(IGNORE_FILE);
    if let Ok(contents) = read_to_string(&ignore_path) {
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            builder.add(Glob::new(line).map_err(|e| {
                ToolkitError::IgnoreFileError(format!("{} loading failed: {}", IGNORE_FILE, e))
            })?);
        }
    } else {
        debug!("{} does not exist", IGNORE_FILE);
    }

    builder.build().map_err(|e| {
        ToolkitError::IgnoreFileError(format!("{} loading failed: {}", IGNORE_FILE, e))
    })
}
