//! Build orchestration.
//!
//! [`BuildCommand`] resolves the selected modules of an environment, builds every module
//! iteration folder by folder, isolates failures per iteration, and finishes with a
//! project-wide sweep for references to resources that no module defines.

use crate::builder::{BuildContext, Builder, BuiltResourceList, ResourceIndex};
use crate::config::BuildConfig;
use crate::console::{Console, LogConsole};
use crate::constants::BUILD_ENVIRONMENT_FILE;
use crate::error::{ToolkitError, ToolkitResult};
use crate::ignore::parse_ignore_file;
use crate::loader::{Identifier, LoaderKind, LoaderRegistry};
use crate::lookup::{LookupCache, ResourceLookup};
use crate::modules::{ModuleDirectories, ModuleLocation};
use crate::variables::BuildVariables;
use crate::warning::{ToolkitWarning, WarningList};
use indexmap::IndexMap;
use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Status of a module iteration that built without a fatal error.
pub const SUCCESS_STATUS: &str = "Success";

/// The build result of one module iteration.
#[derive(Debug, Clone)]
pub struct BuiltModule {
    /// Module name, suffixed with `_<iteration>` when the module has several variable sets
    pub name: String,
    pub location: ModuleLocation,
    pub variables: BuildVariables,
    /// Resource folder to the resources built from it
    pub resources: IndexMap<String, BuiltResourceList>,
    pub warning_count: usize,
    /// `"Success"` or the type name of the error that stopped the iteration
    pub status: String,
    pub iteration: Option<usize>,
}

impl BuiltModule {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Every built module of one invocation, plus all warnings in the order they were raised.
#[derive(Debug, Clone, Default)]
pub struct BuiltModuleList {
    modules: Vec<BuiltModule>,
    pub warnings: WarningList,
}

impl BuiltModuleList {
    pub fn iter(&self) -> std::slice::Iter<'_, BuiltModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BuiltModule> {
        self.modules.iter().find(|module| module.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BuiltModule> + '_ {
        self.modules.iter().filter(|module| !module.is_success())
    }
}

impl<'a> IntoIterator for &'a BuiltModuleList {
    type Item = &'a BuiltModule;
    type IntoIter = std::slice::Iter<'a, BuiltModule>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}

/// Decides which identifiers name platform-provided resources every project has.
#[derive(Debug, Clone, Default)]
pub struct SystemResources {
    prefixes: Vec<String>,
}

impl SystemResources {
    pub fn from_prefixes(prefixes: &[String]) -> Self {
        Self { prefixes: prefixes.to_vec() }
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        let key = match identifier {
            Identifier::Space(space) | Identifier::Schema { space, .. } => space,
            Identifier::ExternalId(value) | Identifier::Name(value) => value,
            Identifier::RawDatabase { db_name } | Identifier::RawTable { db_name, .. } => db_name,
        };
        self.prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct BuildEnvironment<'a> {
    name: &'a str,
    project: &'a str,
    validation_type: &'a str,
    selected: &'a [String],
    modules: Vec<ModuleSummary<'a>>,
}

#[derive(Serialize)]
struct ModuleSummary<'a> {
    name: &'a str,
    path: String,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    iteration: Option<usize>,
    resources: IndexMap<&'a str, Vec<ResourceSummary<'a>>>,
}

#[derive(Serialize)]
struct ResourceSummary<'a> {
    kind: &'a str,
    identifier: &'a Identifier,
    destination: String,
    hash: &'a str,
}

/// Builds the selected modules of an environment into a flat build directory.
pub struct BuildCommand {
    registry: LoaderRegistry,
    console: Box<dyn Console>,
    lookup: Option<Box<dyn ResourceLookup>>,
    builders: IndexMap<String, Builder>,
    index: ResourceIndex,
    hint_shown: bool,
}

impl Default for BuildCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildCommand {
    pub fn new() -> Self {
        Self {
            registry: LoaderRegistry::standard(),
            console: Box::new(LogConsole::new()),
            lookup: None,
            builders: IndexMap::new(),
            index: ResourceIndex::new(),
            hint_shown: false,
        }
    }

    pub fn with_console(mut self, console: Box<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn with_lookup(mut self, lookup: Box<dyn ResourceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_registry(mut self, registry: LoaderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Loads `config.<env>.yaml` from the organization directory and builds it.
    ///
    /// # Errors
    /// * `ToolkitError::ConfigError` if the config file is missing or invalid
    /// * Module selection errors, see [`BuildCommand::build_config`]
    pub fn execute<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        organization_dir: P,
        build_dir: Q,
        env: &str,
        clean: bool,
    ) -> ToolkitResult<BuiltModuleList> {
        let config = BuildConfig::load_from_directory(&organization_dir, env)?;
        self.build_config(organization_dir, build_dir, &config, clean)
    }

    /// Builds every selected module of `config` into `build_dir`.
    ///
    /// A fatal error inside one module iteration is recorded as that module's status and the
    /// build continues with the next one.
    ///
    /// # Errors
    /// * `ToolkitError::AmbiguousModuleError`, `MissingModuleError`,
    ///   `MissingPackageModuleError` or `EmptySelectionError` for an invalid selection
    /// * `ToolkitError::IoError` if the build directory cannot be prepared
    pub fn build_config<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        organization_dir: P,
        build_dir: Q,
        config: &BuildConfig,
        clean: bool,
    ) -> ToolkitResult<BuiltModuleList> {
        let organization_dir = organization_dir.as_ref();
        let build_dir = build_dir.as_ref();
        self.builders.clear();
        self.index = ResourceIndex::new();
        self.hint_shown = false;

        let mut warnings = prepare_build_dir(build_dir, clean)?;

        let ignore = parse_ignore_file(organization_dir)?;
        let modules = ModuleDirectories::load(organization_dir, &self.registry, &ignore)?;
        let selected = modules.select(&config.environment.selected, &config.packages)?;
        info!("Selected {} of {} module(s)", selected.len(), modules.len());

        for module in &selected {
            if module.dev_only && !config.environment.is_dev() {
                warnings.push(ToolkitWarning::DevOnlyModule {
                    module: module.name.clone(),
                    validation_type: config.environment.validation_type.clone(),
                });
            }
            if !module.not_resource_directories.is_empty() {
                warnings.push(ToolkitWarning::UnknownResourceFolder {
                    module: module.name.clone(),
                    module_dir: module.dir.clone(),
                    folders: module.not_resource_directories.iter().cloned().collect(),
                });
            }
        }

        let variables = BuildVariables::load_raw(&config.variables, modules.iter());
        warnings.extend(variables.template_markers());
        self.print(&warnings);
        let key_locations = variables.key_locations();

        let mut built = Vec::new();
        for module in selected {
            let iterations = variables.get_module_variables(module);
            let templated = iterations.len() > 1;
            let mut previous: Option<HashSet<(Identifier, PathBuf)>> = None;
            for (position, module_variables) in iterations.into_iter().enumerate() {
                let iteration = templated.then_some(position + 1);
                let name = match iteration {
                    Some(iteration) => format!("{}_{}", module.name, iteration),
                    None => module.name.clone(),
                };
                self.console.info(&format!("Building module '{}'", name));

                let snapshot = self.index.clone();
                let mut iteration_warnings = WarningList::new();
                let outcome = self.build_module(
                    build_dir,
                    module,
                    &module_variables,
                    iteration,
                    &mut iteration_warnings,
                );
                let (resources, status) = match outcome {
                    Ok(resources) => {
                        self.builders.values_mut().for_each(Builder::commit);
                        (resources, SUCCESS_STATUS.to_string())
                    }
                    Err(err) => {
                        error!("Failed to build module '{}': {}", name, err);
                        for builder in self.builders.values_mut() {
                            builder.rollback()?;
                        }
                        self.index = snapshot;
                        (IndexMap::new(), err.type_name().to_string())
                    }
                };

                let current: HashSet<(Identifier, PathBuf)> = resources
                    .values()
                    .flatten()
                    .map(|resource| (resource.identifier.clone(), resource.source.path.clone()))
                    .collect();
                if let Some(previous) = &previous {
                    let mut repeated: Vec<&(Identifier, PathBuf)> =
                        current.intersection(previous).collect();
                    repeated.sort();
                    let duplicates: WarningList = repeated
                        .into_iter()
                        .map(|(identifier, source)| ToolkitWarning::DuplicatedAcrossIterations {
                            module: module.name.clone(),
                            source: source.clone(),
                            identifier: identifier.clone(),
                        })
                        .collect();
                    self.print(&duplicates);
                    iteration_warnings.extend(duplicates);
                }
                if templated && !current.is_empty() {
                    previous = Some(current);
                }

                self.hint_misplaced_variables(&iteration_warnings, &key_locations, &name);
                debug!(
                    "Module '{}' finished with status {} and {} warning(s)",
                    name,
                    status,
                    iteration_warnings.len()
                );
                built.push(BuiltModule {
                    name,
                    location: module.clone(),
                    variables: module_variables,
                    resources,
                    warning_count: iteration_warnings.len(),
                    status,
                    iteration,
                });
                warnings.extend(iteration_warnings);
            }
        }

        let system = SystemResources::from_prefixes(&config.environment.system_prefixes);
        let missing = self.check_missing_dependencies(&system);
        self.print(&missing);
        warnings.extend(missing);

        let result = BuiltModuleList { modules: built, warnings };
        write_build_environment(build_dir, config, &result)?;
        info!(
            "Built {} module(s) into {} with {} warning(s)",
            result.len(),
            build_dir.display(),
            result.warnings.len()
        );
        Ok(result)
    }

    fn build_module(
        &mut self,
        build_dir: &Path,
        module: &ModuleLocation,
        variables: &BuildVariables,
        iteration: Option<usize>,
        warnings: &mut WarningList,
    ) -> ToolkitResult<IndexMap<String, BuiltResourceList>> {
        let mut resources = IndexMap::new();
        let ctx = BuildContext {
            registry: &self.registry,
            console: self.console.as_ref(),
            module,
            variables,
            iteration,
        };
        for (folder, files) in &module.resource_directories {
            let builder = self
                .builders
                .entry(folder.clone())
                .or_insert_with(|| Builder::new(build_dir, folder.clone()));
            match builder.build_resource_folder(files, &ctx, &mut self.index) {
                Ok((built, folder_warnings)) => {
                    warnings.extend(folder_warnings);
                    resources.insert(folder.clone(), built);
                }
                Err(err) => {
                    warnings.extend(builder.last_build_warnings().clone());
                    return Err(err);
                }
            }
        }
        Ok(resources)
    }

    /// Warns about references to resources no module defines.
    ///
    /// System resources and empty identifiers are skipped, then resources that already
    /// exist according to the lookup, then RAW databases, which are created with their tables.
    pub fn check_missing_dependencies(&self, system: &SystemResources) -> WarningList {
        let candidates: Vec<_> = self
            .index
            .missing_dependencies()
            .filter(|((_, identifier), _)| !system.contains(identifier) && !identifier.is_empty())
            .collect();

        let mut cache = LookupCache::new();
        if let Some(lookup) = &self.lookup {
            let mut by_loader: IndexMap<LoaderKind, Vec<Identifier>> = IndexMap::new();
            for ((loader, identifier), _) in &candidates {
                by_loader.entry(*loader).or_default().push(identifier.clone());
            }
            for (loader, identifiers) in by_loader {
                cache.fetch(lookup.as_ref(), loader, &identifiers);
            }
        }

        candidates
            .into_iter()
            .filter(|((loader, identifier), _)| !cache.exists(*loader, identifier))
            .filter(|((loader, _), _)| *loader != LoaderKind::RawDatabase)
            .map(|((loader, identifier), required_by)| ToolkitWarning::MissingDependency {
                kind: *loader,
                identifier: identifier.clone(),
                required_by: required_by.clone(),
            })
            .collect()
    }

    /// Prints a one-time hint when an unresolved variable is defined for another module.
    fn hint_misplaced_variables(
        &mut self,
        warnings: &WarningList,
        key_locations: &IndexMap<String, Vec<String>>,
        module_name: &str,
    ) {
        if self.hint_shown {
            return;
        }
        for warning in warnings {
            let ToolkitWarning::UnresolvedVariable { variables, .. } = warning else {
                continue;
            };
            for variable in variables {
                if let Some(locations) = key_locations.get(variable) {
                    self.console.info(&format!(
                        "Hint: variable '{}' used by module '{}' is only defined under {}. \
                         Variables are only visible to the modules below the place they are \
                         defined; check the structure of the variables section of your config \
                         file.",
                        variable,
                        module_name,
                        locations.join(", ")
                    ));
                    self.hint_shown = true;
                    return;
                }
            }
        }
    }

    fn print(&self, warnings: &WarningList) {
        for (source, group) in warnings.group_by_source() {
            self.console.warn_group(source, &group);
        }
    }
}

fn prepare_build_dir(build_dir: &Path, clean: bool) -> ToolkitResult<WarningList> {
    let mut warnings = WarningList::new();
    let populated = build_dir.is_dir() && fs::read_dir(build_dir)?.next().is_some();
    if populated && clean {
        info!("Cleaning build directory {}", build_dir.display());
        fs::remove_dir_all(build_dir)?;
    } else if populated {
        warnings.push(ToolkitWarning::BuildDirectoryNotEmpty {
            build_dir: build_dir.to_path_buf(),
        });
    }
    fs::create_dir_all(build_dir)?;
    Ok(warnings)
}

fn write_build_environment(
    build_dir: &Path,
    config: &BuildConfig,
    built: &BuiltModuleList,
) -> ToolkitResult<()> {
    let modules = built
        .iter()
        .map(|module| ModuleSummary {
            name: &module.name,
            path: module.location.relative_path.display().to_string(),
            status: &module.status,
            iteration: module.iteration,
            resources: module
                .resources
                .iter()
                .map(|(folder, resources)| {
                    let summaries = resources
                        .iter()
                        .map(|resource| ResourceSummary {
                            kind: resource.kind,
                            identifier: &resource.identifier,
                            destination: resource
                                .destination
                                .strip_prefix(build_dir)
                                .unwrap_or(resource.destination.as_path())
                                .display()
                                .to_string(),
                            hash: &resource.source.hash,
                        })
                        .collect();
                    (folder.as_str(), summaries)
                })
                .collect(),
        })
        .collect();
    let environment = BuildEnvironment {
        name: &config.environment.name,
        project: &config.environment.project,
        validation_type: &config.environment.validation_type,
        selected: &config.environment.selected,
        modules,
    };
    let content = serde_yaml::to_string(&environment)
        .map_err(|e| ToolkitError::ConfigError(format!("Failed to write build summary: {}", e)))?;
    fs::write(build_dir.join(BUILD_ENVIRONMENT_FILE), content)?;
    Ok(())
}
