//! Per-folder build step.
//!
//! A [`Builder`] owns one resource folder of the build directory. It substitutes variables
//! into every template of that folder, writes the result under a flat numbered name, and
//! validates what it wrote against the capability objects of the folder.

use crate::console::Console;
use crate::constants::{FUNCTIONS_FOLDER, INDEX_PATTERN, TEMPLATE_VARS_FILE_SUFFIXES};
use crate::error::{ToolkitError, ToolkitResult};
use crate::loader::{is_yaml_file, Dependency, Identifier, LoaderKind, LoaderRegistry, Resolution};
use crate::modules::ModuleLocation;
use crate::variables::{unresolved_tokens, BuildVariables};
use crate::warning::{ToolkitWarning, WarningList};
use indexmap::map::Entry;
use indexmap::IndexMap;
use log::debug;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub mod files;
pub mod functions;
pub mod transformations;

/// Block-style `version:` entries, with an optional trailing comment.
static BLOCK_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?mR)^([ \t]*(?:-[ \t]+)?["']?version["']?[ \t]*:[ \t]+)"#,
        r#"([^\s'"\[{|>#&*!][^\r\n]*?)((?:[ \t]+#[^\r\n]*)?)[ \t]*$"#,
    ))
    .expect("block version pattern is valid")
});

/// `version:` entries inside a single-line flow mapping such as `{space: sp, version: 1}`.
static FLOW_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"([{,][ \t]*["']?version["']?[ \t]*:[ \t]*)"#,
        r#"([^\s'"\[{,}#][^,}\r\n]*?)([ \t]*[,}])"#,
    ))
    .expect("flow version pattern is valid")
});

/// Quotes unquoted `version:` scalars, which YAML would otherwise read as numbers.
fn quote_versions(content: &str) -> String {
    let block = BLOCK_VERSION.replace_all(content, quote_version);
    FLOW_VERSION.replace_all(&block, quote_version).into_owned()
}

fn quote_version(caps: &Captures<'_>) -> String {
    let value = &caps[2];
    let quoted = match value {
        "~" | "null" | "Null" | "NULL" => value.to_string(),
        _ => format!("'{}'", value.replace('\'', "''")),
    };
    format!("{}{}{}", &caps[1], quoted, &caps[3])
}

/// First 8 hex characters of the SHA-256 of `content`.
pub fn calculate_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}

/// One template file and the hash of its raw contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub hash: String,
}

impl SourceLocation {
    pub fn new(path: impl Into<PathBuf>, content: &[u8]) -> Self {
        Self { path: path.into(), hash: calculate_hash(content) }
    }
}

/// One item of one template file, as written to the build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltResource {
    pub identifier: Identifier,
    pub loader: LoaderKind,
    pub kind: &'static str,
    pub source: SourceLocation,
    pub destination: PathBuf,
    /// Companion files the item needs, such as a transformation's SQL or a function's code
    pub extra_sources: Vec<PathBuf>,
}

pub type BuiltResourceList = Vec<BuiltResource>;

/// An item that passed identifier extraction.
#[derive(Debug, Clone)]
pub struct ValidatedItem {
    pub loader: LoaderKind,
    pub kind: &'static str,
    pub identifier: Identifier,
    pub item: Value,
}

/// Project-wide identifier and dependency bookkeeping, shared by every builder.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    ids: IndexMap<(LoaderKind, Identifier), SourceLocation>,
    dependencies: IndexMap<Dependency, Vec<(Identifier, PathBuf)>>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records where an identifier was first defined.
    ///
    /// Returns the earlier location when the identifier was already known; the first
    /// definition is kept.
    pub fn record(
        &mut self,
        loader: LoaderKind,
        identifier: Identifier,
        source: &SourceLocation,
    ) -> Option<SourceLocation> {
        match self.ids.entry((loader, identifier)) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(source.clone());
                None
            }
        }
    }

    pub fn add_dependency(&mut self, required: Dependency, required_by: (Identifier, PathBuf)) {
        let entry = self.dependencies.entry(required).or_default();
        if !entry.contains(&required_by) {
            entry.push(required_by);
        }
    }

    pub fn is_defined(&self, loader: LoaderKind, identifier: &Identifier) -> bool {
        self.ids.contains_key(&(loader, identifier.clone()))
    }

    /// Dependencies whose target was never defined in this build, in first-seen order.
    pub fn missing_dependencies(
        &self,
    ) -> impl Iterator<Item = (&Dependency, &Vec<(Identifier, PathBuf)>)> + '_ {
        self.dependencies
            .iter()
            .filter(|((loader, identifier), _)| !self.is_defined(*loader, identifier))
    }
}

/// What a folder extension produced for one item.
#[derive(Debug, Default)]
pub struct ItemReport {
    pub extra_sources: Vec<PathBuf>,
    /// Paths written outside the numbered template output, removed on rollback
    pub written: Vec<PathBuf>,
    pub warnings: WarningList,
}

/// Folder-specific behaviour layered on top of the generic build step.
pub trait FolderExtension {
    /// Rewrites substituted content before it is written.
    fn prepare_content(
        &self,
        content: String,
        _source: &Path,
        _module: &ModuleLocation,
    ) -> ToolkitResult<String> {
        Ok(content)
    }

    /// Checks one validated item and collects its companion files.
    fn process_item(
        &self,
        item: &ValidatedItem,
        source: &Path,
        module: &ModuleLocation,
    ) -> ToolkitResult<ItemReport>;
}

fn extension_for(folder: &str, build_dir: &Path) -> Option<Box<dyn FolderExtension>> {
    match folder {
        "files" => Some(Box::new(files::FileMetadataExtension)),
        "transformations" => Some(Box::new(transformations::TransformationExtension)),
        FUNCTIONS_FOLDER => Some(Box::new(functions::FunctionExtension::new(build_dir))),
        _ => None,
    }
}

/// Everything a builder reads but does not own while building one module iteration.
pub struct BuildContext<'a> {
    pub registry: &'a LoaderRegistry,
    pub console: &'a dyn Console,
    pub module: &'a ModuleLocation,
    pub variables: &'a BuildVariables,
    /// Set when the module is built once per variable set
    pub iteration: Option<usize>,
}

pub fn is_template_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEMPLATE_VARS_FILE_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Stem shared by a template and its companions: `1.load.Transformation.yaml` and
/// `load.sql` both give `load`.
pub fn stem_key(filename: &str) -> String {
    let stripped = INDEX_PATTERN.replace(filename, "");
    let stem = Path::new(stripped.as_ref())
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.rsplit_once('.') {
        Some((base, suffix)) if LoaderKind::is_kind_name(suffix) => base.to_string(),
        _ => stem,
    }
}

fn file_name(path: &Path) -> ToolkitResult<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ToolkitError::ConfigError(format!("Invalid file name '{}'", path.display())))
}

fn write_file(path: &Path, content: &str) -> ToolkitResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> ToolkitResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination)?;
    Ok(())
}

fn items(parsed: &Value) -> Vec<(Option<usize>, &Value)> {
    match parsed {
        Value::Null => Vec::new(),
        Value::Array(elements) => {
            elements.iter().enumerate().map(|(i, item)| (Some(i + 1), item)).collect()
        }
        other => vec![(None, other)],
    }
}

/// Builds one resource folder of the build directory.
pub struct Builder {
    build_dir: PathBuf,
    folder: String,
    /// `module/relative/dir/stem` to its output number
    index_by_stem: HashMap<PathBuf, usize>,
    extension: Option<Box<dyn FolderExtension>>,
    last_warnings: WarningList,
    written: Vec<PathBuf>,
}

impl Builder {
    pub fn new(build_dir: impl Into<PathBuf>, folder: impl Into<String>) -> Self {
        let build_dir = build_dir.into();
        let folder = folder.into();
        let extension = extension_for(&folder, &build_dir);
        Self {
            build_dir,
            folder,
            index_by_stem: HashMap::new(),
            extension,
            last_warnings: WarningList::new(),
            written: Vec::new(),
        }
    }

    /// Warnings produced by the most recent [`Builder::build_resource_folder`] call.
    pub fn last_build_warnings(&self) -> &WarningList {
        &self.last_warnings
    }

    /// Builds every file of this folder for one module iteration.
    ///
    /// Warnings are printed per file through the console as they are found and returned
    /// together with the built resources.
    ///
    /// # Errors
    /// * `ToolkitError::YamlFormatError` if a template is not valid YAML after substitution
    /// * `ToolkitError::AmbiguousResourceFileError` if unrelated kinds claim a file
    /// * `ToolkitError::DependencyExtractionError` if references of an item cannot be read
    pub fn build_resource_folder(
        &mut self,
        files: &[PathBuf],
        ctx: &BuildContext<'_>,
        index: &mut ResourceIndex,
    ) -> ToolkitResult<(BuiltResourceList, WarningList)> {
        self.last_warnings = WarningList::new();
        let mut built = BuiltResourceList::new();
        for source in files {
            let destination = self.create_destination_path(source, ctx.module, ctx.iteration)?;
            if !is_template_file(source) {
                debug!("Copying {} to {}", source.display(), destination.display());
                copy_file(source, &destination)?;
                self.written.push(destination);
                continue;
            }
            let (resources, warnings) = self.build_file(source, &destination, ctx, index)?;
            let grouped: Vec<&ToolkitWarning> = warnings.iter().collect();
            ctx.console.warn_group(Some(source), &grouped);
            self.last_warnings.extend(warnings);
            built.extend(resources);
        }
        Ok((built, self.last_warnings.clone()))
    }

    fn build_file(
        &mut self,
        source: &Path,
        destination: &Path,
        ctx: &BuildContext<'_>,
        index: &mut ResourceIndex,
    ) -> ToolkitResult<(BuiltResourceList, WarningList)> {
        debug!("Building {} into {}", source.display(), destination.display());
        let raw = fs::read(source)?;
        let location = SourceLocation::new(source, &raw);
        let suffix = source.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        let mut content = ctx.variables.replace(&String::from_utf8_lossy(&raw), suffix);
        if let Some(extension) = &self.extension {
            content = extension.prepare_content(content, source, ctx.module)?;
        }
        write_file(destination, &content)?;
        self.written.push(destination.to_path_buf());

        let (validated, mut warnings) =
            self.validate(&content, &location, destination, ctx, index)?;
        let mut resources = BuiltResourceList::new();
        for item in validated {
            let mut extra_sources = Vec::new();
            if let Some(extension) = &self.extension {
                let report = extension.process_item(&item, source, ctx.module)?;
                extra_sources = report.extra_sources;
                self.written.extend(report.written);
                warnings.extend(report.warnings);
            }
            resources.push(BuiltResource {
                identifier: item.identifier,
                loader: item.loader,
                kind: item.kind,
                source: location.clone(),
                destination: destination.to_path_buf(),
                extra_sources,
            });
        }
        Ok((resources, warnings))
    }

    /// Output path for a source file: `<build_dir>/<folder>/<N>.<filename>`.
    ///
    /// `N` is assigned the first time a module-relative stem is seen and reused for every
    /// other file with the same stem. Each iteration of a templated module gets its own stems.
    pub fn create_destination_path(
        &mut self,
        source: &Path,
        module: &ModuleLocation,
        iteration: Option<usize>,
    ) -> ToolkitResult<PathBuf> {
        let filename = INDEX_PATTERN.replace(file_name(source)?, "").into_owned();
        let relative_dir = source
            .parent()
            .and_then(|parent| parent.strip_prefix(&module.dir).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let module_key = match iteration {
            Some(iteration) => {
                PathBuf::from(format!("{}#{iteration}", module.relative_path.display()))
            }
            None => module.relative_path.clone(),
        };
        let relative_stem = module_key.join(relative_dir).join(stem_key(&filename));

        let next = self.index_by_stem.len() + 1;
        let index = *self.index_by_stem.entry(relative_stem).or_insert(next);
        Ok(self.build_dir.join(&self.folder).join(format!("{index}.{filename}")))
    }

    /// Checks substituted content and records its identifiers and dependencies.
    ///
    /// # Errors
    /// * `ToolkitError::YamlFormatError` if the content is not valid YAML; warnings found
    ///   before the failure are printed first
    /// * `ToolkitError::AmbiguousResourceFileError` if unrelated kinds claim the file
    /// * `ToolkitError::DependencyExtractionError` if references of an item cannot be read
    pub fn validate(
        &self,
        content: &str,
        source: &SourceLocation,
        destination: &Path,
        ctx: &BuildContext<'_>,
        index: &mut ResourceIndex,
    ) -> ToolkitResult<(Vec<ValidatedItem>, WarningList)> {
        let mut warnings = WarningList::new();
        let unresolved = unresolved_tokens(content);
        if !unresolved.is_empty() {
            warnings.push(ToolkitWarning::UnresolvedVariable {
                source: source.path.clone(),
                variables: unresolved,
            });
        }
        if !is_yaml_file(destination) {
            return Ok((Vec::new(), warnings));
        }

        let normalized = quote_versions(content);
        let parsed = serde_yaml::from_str::<serde_yaml::Value>(&normalized)
            .map_err(|e| e.to_string())
            .and_then(|yaml| serde_json::to_value(yaml).map_err(|e| e.to_string()));
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(message) => {
                let grouped: Vec<&ToolkitWarning> = warnings.iter().collect();
                ctx.console.warn_group(Some(&source.path), &grouped);
                return Err(ToolkitError::yaml_format(&source.path, message));
            }
        };

        let loaders = match ctx.registry.resolve(&self.folder, destination)? {
            Resolution::Loaders(loaders) => loaders,
            Resolution::Unsupported => {
                warnings.push(ToolkitWarning::UnknownResourceType {
                    source: source.path.clone(),
                    folder: self.folder.clone(),
                });
                return Ok((Vec::new(), warnings));
            }
        };

        let mut validated = Vec::new();
        for (element, item) in items(&parsed) {
            let mut missing = None;
            let mut found = None;
            for loader in &loaders {
                match loader.get_id(item) {
                    Ok(identifier) => {
                        found = Some((*loader, identifier));
                        break;
                    }
                    Err(error) => {
                        missing.get_or_insert(error);
                    }
                }
            }
            let Some((loader, identifier)) = found else {
                warnings.push(ToolkitWarning::MissingRequiredIdentifier {
                    source: source.path.clone(),
                    element,
                    message: missing.map(|error| error.to_string()).unwrap_or_default(),
                });
                continue;
            };

            let loader_kind = loader.loader_kind();
            if let Some(first_seen) = index.record(loader_kind, identifier.clone(), source) {
                let same_source = first_seen.path == source.path && first_seen.hash == source.hash;
                if !same_source && loader_kind != LoaderKind::RawDatabase {
                    warnings.push(ToolkitWarning::DuplicatedItem {
                        source: source.path.clone(),
                        kind: loader_kind,
                        identifier: identifier.clone(),
                        first_seen: first_seen.path,
                    });
                    continue;
                }
            }

            let dependencies = loader.get_dependent_items(item).map_err(|e| {
                ToolkitError::DependencyExtractionError {
                    path: source.path.display().to_string(),
                    element: element.map(|i| format!(" (element {i})")).unwrap_or_default(),
                    message: e.to_string(),
                }
            })?;
            for dependency in dependencies {
                index.add_dependency(dependency, (identifier.clone(), source.path.clone()));
            }

            if let Some(spec) = loader.parameter_spec() {
                for issue in spec.validate(item) {
                    warnings.push(ToolkitWarning::ParameterMismatch {
                        source: source.path.clone(),
                        element,
                        kind: loader_kind,
                        issue,
                    });
                }
            }

            let has_data_set =
                item.get("dataSetExternalId").is_some() || item.get("dataSetId").is_some();
            if loader.requires_data_set() && !has_data_set {
                warnings.push(ToolkitWarning::MissingDataSet {
                    source: source.path.clone(),
                    element,
                    kind: loader_kind,
                });
            }

            validated.push(ValidatedItem {
                loader: loader_kind,
                kind: loader.kind(),
                identifier,
                item: item.clone(),
            });
        }
        Ok((validated, warnings))
    }

    /// Forgets the files written so far; called once a module iteration succeeded.
    pub fn commit(&mut self) {
        self.written.clear();
    }

    /// Removes every file written since the last [`Builder::commit`].
    pub fn rollback(&mut self) -> ToolkitResult<()> {
        for path in self.written.drain(..) {
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_key() {
        assert_eq!(stem_key("1.load.Transformation.yaml"), "load");
        assert_eq!(stem_key("1.load.sql"), "load");
        assert_eq!(stem_key("my.file.yaml"), "my.file");
        assert_eq!(stem_key("ts1.TimeSeries.yaml"), "ts1");
    }

    #[test]
    fn test_calculate_hash_is_truncated() {
        let hash = calculate_hash(b"externalId: a");
        assert_eq!(hash.len(), 8);
        assert_eq!(hash, calculate_hash(b"externalId: a"));
        assert_ne!(hash, calculate_hash(b"externalId: b"));
    }

    #[test]
    fn test_version_scalar_is_quoted() {
        let normalized = quote_versions("version: 1.0\nviews:\n  - version: v2\nother: 3\n");
        assert_eq!(normalized, "version: '1.0'\nviews:\n  - version: 'v2'\nother: 3\n");
        assert_eq!(quote_versions("version: '1'"), "version: '1'");
        assert_eq!(quote_versions("version: ~\n"), "version: ~\n");
    }

    #[test]
    fn test_version_with_trailing_comment() {
        let normalized = quote_versions("space: sp\nversion: 1.10 # bumped\r\nname: x\n");
        assert_eq!(normalized, "space: sp\nversion: '1.10' # bumped\r\nname: x\n");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&normalized).unwrap();
        assert_eq!(parsed["version"].as_str(), Some("1.10"));
    }

    #[test]
    fn test_version_in_flow_mapping() {
        let normalized = quote_versions("view: {space: sp, externalId: Valve, version: 1.10}\n");
        assert_eq!(normalized, "view: {space: sp, externalId: Valve, version: '1.10'}\n");
        let nested =
            quote_versions("views:\n  - {version: 2, externalId: Pump}\n  - {version: \"3\"}\n");
        assert_eq!(
            nested,
            "views:\n  - {version: '2', externalId: Pump}\n  - {version: \"3\"}\n"
        );
    }

    #[test]
    fn test_is_template_file() {
        assert!(is_template_file(Path::new("a.yaml")));
        assert!(is_template_file(Path::new("query.SQL")));
        assert!(!is_template_file(Path::new("manual.pdf")));
        assert!(!is_template_file(Path::new("README")));
    }

    #[test]
    fn test_resource_index_keeps_first_definition() {
        let mut index = ResourceIndex::new();
        let first = SourceLocation::new("a.yaml", b"a");
        let second = SourceLocation::new("b.yaml", b"b");
        let id = Identifier::external_id("x");
        assert!(index.record(LoaderKind::Asset, id.clone(), &first).is_none());
        assert_eq!(index.record(LoaderKind::Asset, id.clone(), &second), Some(first));
        assert!(index.is_defined(LoaderKind::Asset, &id));
        assert!(!index.is_defined(LoaderKind::TimeSeries, &id));
    }

    #[test]
    fn test_missing_dependencies() {
        let mut index = ResourceIndex::new();
        let source = SourceLocation::new("ts.yaml", b"ts");
        index.record(LoaderKind::DataSet, Identifier::external_id("ds"), &source);
        let by = (Identifier::external_id("ts"), PathBuf::from("ts.yaml"));
        index.add_dependency((LoaderKind::DataSet, Identifier::external_id("ds")), by.clone());
        index.add_dependency((LoaderKind::Asset, Identifier::external_id("pump")), by.clone());
        index.add_dependency((LoaderKind::Asset, Identifier::external_id("pump")), by);
        let missing: Vec<_> = index.missing_dependencies().collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0 .1, Identifier::external_id("pump"));
        assert_eq!(missing[0].1.len(), 1);
    }
}
