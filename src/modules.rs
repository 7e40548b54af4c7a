//! Module discovery and selection.
//!
//! A module is any directory under `<organization>/modules` that has at least one
//! resource folder as a direct child. Modules do not nest: discovery stops descending
//! once a module is found.

use crate::constants::{FUNCTIONS_FOLDER, MODULES_DIR, MODULE_FILE};
use crate::error::{ToolkitError, ToolkitResult};
use crate::ignore::is_ignored_dir;
use crate::loader::LoaderRegistry;
use globset::GlobSet;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default, Deserialize)]
struct ModuleMetadata {
    #[serde(default)]
    dev_only: bool,
}

/// One discovered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub name: String,
    /// Path relative to the organization directory, starting with `modules`
    pub relative_path: PathBuf,
    pub dir: PathBuf,
    /// Resource folder name to its source files, in folder build order
    pub resource_directories: IndexMap<String, Vec<PathBuf>>,
    pub not_resource_directories: BTreeSet<String>,
    pub dev_only: bool,
}

impl ModuleLocation {
    /// Path segments from the organization directory to the module,
    /// e.g. `["modules", "my_module"]`.
    pub fn path_segments(&self) -> Vec<String> {
        path_segments(&self.relative_path)
    }

    pub fn resource_files(&self, folder: &str) -> &[PathBuf] {
        self.resource_directories.get(folder).map(Vec::as_slice).unwrap_or_default()
    }
}

pub(crate) fn path_segments(path: &Path) -> Vec<String> {
    path.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect()
}

/// Every module found in an organization directory, ordered by relative path.
#[derive(Debug, Clone, Default)]
pub struct ModuleDirectories(Vec<ModuleLocation>);

impl ModuleDirectories {
    /// Walks `<organization_dir>/modules` and collects every module.
    ///
    /// # Errors
    /// * `ToolkitError::ConfigError` if the modules directory does not exist
    /// * `ToolkitError::WalkError` / `ToolkitError::IoError` on file system failures
    pub fn load<P: AsRef<Path>>(
        organization_dir: P,
        registry: &LoaderRegistry,
        ignore: &GlobSet,
    ) -> ToolkitResult<Self> {
        let organization_dir = organization_dir.as_ref();
        let modules_root = organization_dir.join(MODULES_DIR);
        if !modules_root.is_dir() {
            return Err(ToolkitError::ConfigError(format!(
                "modules directory '{}' does not exist",
                modules_root.display()
            )));
        }

        let mut modules = Vec::new();
        let mut walker = WalkDir::new(&modules_root).min_depth(1).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let relative_path = entry
                .path()
                .strip_prefix(organization_dir)
                .map_err(|e| ToolkitError::ConfigError(e.to_string()))?
                .to_path_buf();
            if is_ignored_dir(ignore, &relative_path) {
                debug!("Skipping ignored directory {}", relative_path.display());
                walker.skip_current_dir();
                continue;
            }
            let module =
                Self::read_module(entry.path(), relative_path, registry, ignore, organization_dir)?;
            if let Some(module) = module {
                debug!("Found module '{}' at {}", module.name, module.relative_path.display());
                modules.push(module);
                walker.skip_current_dir();
            }
        }
        Ok(Self(modules))
    }

    fn read_module(
        dir: &Path,
        relative_path: PathBuf,
        registry: &LoaderRegistry,
        ignore: &GlobSet,
        organization_dir: &Path,
    ) -> ToolkitResult<Option<ModuleLocation>> {
        let mut child_dirs: Vec<String> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        child_dirs.sort();
        if !child_dirs.iter().any(|name| registry.is_resource_folder(name)) {
            return Ok(None);
        }

        let mut resource_directories = IndexMap::new();
        let mut ignored_files = 0;
        for folder in registry.folder_names() {
            if !child_dirs.iter().any(|name| name == folder) {
                continue;
            }
            let folder_dir = dir.join(folder);
            let walker = WalkDir::new(&folder_dir).min_depth(1).sort_by_file_name();
            let walker = if folder == FUNCTIONS_FOLDER { walker.max_depth(1) } else { walker };
            let mut files = Vec::new();
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let ignored = entry
                    .path()
                    .strip_prefix(organization_dir)
                    .map(|relative| ignore.is_match(relative))
                    .unwrap_or(false);
                if ignored {
                    ignored_files += 1;
                } else {
                    files.push(entry.into_path());
                }
            }
            resource_directories.insert(folder.to_string(), files);
        }
        if ignored_files > 0 && resource_directories.values().all(Vec::is_empty) {
            debug!("Skipping {}: every resource file is ignored", relative_path.display());
            return Ok(None);
        }

        let not_resource_directories =
            child_dirs.into_iter().filter(|name| !registry.is_resource_folder(name)).collect();

        let metadata_path = dir.join(MODULE_FILE);
        let metadata: ModuleMetadata = if metadata_path.is_file() {
            let content = fs::read_to_string(&metadata_path)?;
            serde_yaml::from_str::<Option<ModuleMetadata>>(&content)
                .map_err(|e| ToolkitError::yaml_format(&metadata_path, e))?
                .unwrap_or_default()
        } else {
            ModuleMetadata::default()
        };

        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(ModuleLocation {
            name,
            relative_path,
            dir: dir.to_path_buf(),
            resource_directories,
            not_resource_directories,
            dev_only: metadata.dev_only,
        }))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModuleLocation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the selection of an environment into modules.
    ///
    /// Entries are module names, paths such as `modules/sub/`, or package names that
    /// expand to their member entries.
    ///
    /// # Errors
    /// * `ToolkitError::MissingPackageModuleError` if a package lists an unknown module
    /// * `ToolkitError::AmbiguousModuleError` if a name matches several modules
    /// * `ToolkitError::MissingModuleError` if an entry matches nothing
    /// * `ToolkitError::EmptySelectionError` if the selection is empty
    pub fn select(
        &self,
        selected: &[String],
        packages: &IndexMap<String, Vec<String>>,
    ) -> ToolkitResult<Vec<&ModuleLocation>> {
        let mut entries: Vec<&String> = Vec::new();
        for entry in selected {
            let Some(members) = packages.get(entry) else {
                entries.push(entry);
                continue;
            };
            let missing: Vec<&str> = members
                .iter()
                .filter(|member| {
                    self.matching(member).map(|found| found.is_empty()).unwrap_or(false)
                })
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(ToolkitError::MissingPackageModuleError {
                    package: entry.clone(),
                    modules: missing.join(", "),
                });
            }
            entries.extend(members);
        }

        let mut chosen: Vec<&ModuleLocation> = Vec::new();
        let mut missing: Vec<&str> = Vec::new();
        for entry in entries {
            let found = self.matching(entry)?;
            if found.is_empty() {
                missing.push(entry);
            }
            for module in found {
                if !chosen.iter().any(|c| c.relative_path == module.relative_path) {
                    chosen.push(module);
                }
            }
        }

        if !missing.is_empty() {
            return Err(ToolkitError::MissingModuleError {
                names: missing.join(", "),
                suggestions: self.suggestions(&missing),
            });
        }
        if chosen.is_empty() {
            return Err(ToolkitError::EmptySelectionError);
        }
        chosen.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(chosen)
    }

    fn matching(&self, entry: &str) -> ToolkitResult<Vec<&ModuleLocation>> {
        if entry.contains('/') || entry.contains('\\') {
            let selection = PathBuf::from(entry.trim_end_matches(['/', '\\']));
            let selection = if selection.starts_with(MODULES_DIR) {
                selection
            } else {
                Path::new(MODULES_DIR).join(selection)
            };
            return Ok(self.0.iter().filter(|m| m.relative_path.starts_with(&selection)).collect());
        }
        let found: Vec<&ModuleLocation> = self.0.iter().filter(|m| m.name == entry).collect();
        if found.len() > 1 {
            let paths: Vec<String> =
                found.iter().map(|m| m.relative_path.display().to_string()).collect();
            return Err(ToolkitError::AmbiguousModuleError {
                name: entry.to_string(),
                paths: paths.join(", "),
            });
        }
        Ok(found)
    }

    fn suggestions(&self, missing: &[&str]) -> String {
        let mut close: BTreeSet<&str> = BTreeSet::new();
        for entry in missing {
            for module in &self.0 {
                if strsim::normalized_levenshtein(entry, &module.name) >= 0.7 {
                    close.insert(&module.name);
                }
            }
        }
        if close.is_empty() {
            String::new()
        } else {
            format!(" Did you mean: {}?", close.into_iter().collect::<Vec<_>>().join(", "))
        }
    }
}

impl<'a> IntoIterator for &'a ModuleDirectories {
    type Item = &'a ModuleLocation;
    type IntoIter = std::slice::Iter<'a, ModuleLocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
