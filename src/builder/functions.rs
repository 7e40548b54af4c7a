//! Function code directories.
//!
//! A function with external id `fn_a` expects its code in `functions/fn_a/` inside the
//! module. The directory is copied as is to `<build_dir>/functions/fn_a/`.

use super::{FolderExtension, ItemReport, ValidatedItem};
use crate::constants::FUNCTIONS_FOLDER;
use crate::error::{ToolkitError, ToolkitResult};
use crate::modules::ModuleLocation;
use crate::warning::{Severity, ToolkitWarning};
use log::debug;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub struct FunctionExtension {
    build_dir: PathBuf,
}

impl FunctionExtension {
    pub fn new(build_dir: &Path) -> Self {
        Self { build_dir: build_dir.to_path_buf() }
    }
}

/// A function id names one directory, never a path out of `functions/`.
fn is_directory_name(external_id: &str) -> bool {
    let mut components = Path::new(external_id).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

fn copy_dir(source: &Path, destination: &Path) -> ToolkitResult<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ToolkitError::ConfigError(e.to_string()))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl FolderExtension for FunctionExtension {
    fn process_item(
        &self,
        item: &ValidatedItem,
        source: &Path,
        module: &ModuleLocation,
    ) -> ToolkitResult<ItemReport> {
        let mut report = ItemReport::default();
        let Some(external_id) = item.item.get("externalId").and_then(|value| value.as_str()) else {
            return Ok(report);
        };
        if !is_directory_name(external_id) {
            report.warnings.push(ToolkitWarning::Advisory {
                source: Some(source.to_path_buf()),
                severity: Severity::Medium,
                message: format!(
                    "Function '{external_id}' cannot be used as a code directory name, \
                     its code is not copied."
                ),
            });
            return Ok(report);
        }
        let code_dir = module.dir.join(FUNCTIONS_FOLDER).join(external_id);
        if !code_dir.is_dir() {
            report.warnings.push(ToolkitWarning::Advisory {
                source: Some(source.to_path_buf()),
                severity: Severity::Medium,
                message: format!(
                    "Function '{}' has no code directory '{}'.",
                    external_id,
                    code_dir.display()
                ),
            });
            return Ok(report);
        }

        let destination = self.build_dir.join(FUNCTIONS_FOLDER).join(external_id);
        debug!("Copying function code {} to {}", code_dir.display(), destination.display());
        if !destination.exists() {
            report.written.push(destination.clone());
        }
        copy_dir(&code_dir, &destination)?;
        report.extra_sources.push(code_dir);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_directory_name() {
        assert!(is_directory_name("fn_a"));
        assert!(is_directory_name("fn.v2"));
        assert!(!is_directory_name("../escape"));
        assert!(!is_directory_name("nested/fn"));
        assert!(!is_directory_name("/abs"));
        assert!(!is_directory_name(".."));
        assert!(!is_directory_name(""));
    }
}
