//! Resource capability objects and the folder registry.
//!
//! The build pipeline never looks at concrete resource types. Each resource folder
//! (`timeseries`, `data_models`, `raw`, ...) maps to one or more [`ResourceLoader`]s that
//! know how to turn a parsed item into an [`Identifier`] and list what it depends on.
use crate::error::{ToolkitError, ToolkitResult};
use crate::validation::ParameterSpec;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::Path;

pub mod auth;
pub mod classic;
pub mod data_modeling;
pub mod raw;
pub mod workflows;

/// Closed set of resource types known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoaderKind {
    Group,
    DataSet,
    Space,
    Container,
    View,
    DataModel,
    RawDatabase,
    RawTable,
    Asset,
    TimeSeries,
    FileMetadata,
    Transformation,
    Function,
    LocationFilter,
}

impl LoaderKind {
    pub const ALL: [LoaderKind; 14] = [
        LoaderKind::Group,
        LoaderKind::DataSet,
        LoaderKind::Space,
        LoaderKind::Container,
        LoaderKind::View,
        LoaderKind::DataModel,
        LoaderKind::RawDatabase,
        LoaderKind::RawTable,
        LoaderKind::Asset,
        LoaderKind::TimeSeries,
        LoaderKind::FileMetadata,
        LoaderKind::Transformation,
        LoaderKind::Function,
        LoaderKind::LocationFilter,
    ];

    /// Human-facing kind, also the `<name>.<kind>.yaml` filename suffix.
    pub fn kind_name(&self) -> &'static str {
        match self {
            LoaderKind::Group => "Group",
            LoaderKind::DataSet => "DataSet",
            LoaderKind::Space => "Space",
            LoaderKind::Container => "Container",
            LoaderKind::View => "View",
            LoaderKind::DataModel => "DataModel",
            LoaderKind::RawDatabase => "Database",
            LoaderKind::RawTable => "Table",
            LoaderKind::Asset => "Asset",
            LoaderKind::TimeSeries => "TimeSeries",
            LoaderKind::FileMetadata => "FileMetadata",
            LoaderKind::Transformation => "Transformation",
            LoaderKind::Function => "Function",
            LoaderKind::LocationFilter => "LocationFilter",
        }
    }

    /// Whether `name` is the kind suffix of any known resource type.
    pub fn is_kind_name(name: &str) -> bool {
        Self::ALL.iter().any(|kind| kind.kind_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind_name())
    }
}

/// Resource-type specific key used for duplicate and dependency tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    ExternalId(String),
    Name(String),
    Space(String),
    Schema { space: String, external_id: String, version: Option<String> },
    RawDatabase { db_name: String },
    RawTable { db_name: String, table_name: String },
}

impl Identifier {
    pub fn external_id(value: impl Into<String>) -> Self {
        Identifier::ExternalId(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Identifier::ExternalId(value) | Identifier::Name(value) | Identifier::Space(value) => {
                value.is_empty()
            }
            Identifier::Schema { space, external_id, .. } => {
                space.is_empty() && external_id.is_empty()
            }
            Identifier::RawDatabase { db_name } => db_name.is_empty(),
            Identifier::RawTable { db_name, table_name } => {
                db_name.is_empty() && table_name.is_empty()
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::ExternalId(value) | Identifier::Name(value) | Identifier::Space(value) => {
                write!(f, "{value}")
            }
            Identifier::Schema { space, external_id, version: Some(version) } => {
                write!(f, "{space}:{external_id}(version={version})")
            }
            Identifier::Schema { space, external_id, version: None } => {
                write!(f, "{space}:{external_id}")
            }
            Identifier::RawDatabase { db_name } => write!(f, "{db_name}"),
            Identifier::RawTable { db_name, table_name } => write!(f, "{db_name}.{table_name}"),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An item lacks the fields needed to build its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIdentifier {
    pub kind: &'static str,
    pub fields: Vec<&'static str>,
}

impl fmt::Display for MissingIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(|field| format!("'{field}'")).collect();
        write!(f, "{} is missing required identifier field(s) {}", self.kind, fields.join(", "))
    }
}

/// A capability object could not read the references of an item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DependencyError(pub String);

/// A reference from one item to another resource.
pub type Dependency = (LoaderKind, Identifier);

/// Narrow capability contract the build pipeline uses for every resource type.
pub trait ResourceLoader: Send + Sync {
    fn loader_kind(&self) -> LoaderKind;

    fn folder_name(&self) -> &'static str;

    fn kind(&self) -> &'static str {
        self.loader_kind().kind_name()
    }

    /// Loaders of one family share a folder and are tried in registration order.
    fn family(&self) -> Option<&'static str> {
        None
    }

    fn is_supported_file(&self, path: &Path) -> bool {
        is_yaml_file(path)
            && kind_suffix(path).map_or(true, |suffix| suffix.eq_ignore_ascii_case(self.kind()))
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier>;

    fn get_dependent_items(&self, _item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        Ok(Vec::new())
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        None
    }

    /// Whether items of this type must reference a data set.
    fn requires_data_set(&self) -> bool {
        false
    }
}

/// Outcome of looking up the capability objects responsible for one file.
pub enum Resolution<'a> {
    Unsupported,
    /// Loaders to try in priority order; more than one only for a disambiguation family.
    Loaders(Vec<&'a dyn ResourceLoader>),
}

/// Folder name to capability objects, in folder build order.
#[derive(Default)]
pub struct LoaderRegistry {
    folders: IndexMap<&'static str, Vec<Box<dyn ResourceLoader>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every resource type this crate knows about.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(auth::GroupLoader));
        registry.register(Box::new(classic::DataSetLoader));
        registry.register(Box::new(data_modeling::SpaceLoader));
        registry.register(Box::new(data_modeling::ContainerLoader));
        registry.register(Box::new(data_modeling::ViewLoader));
        registry.register(Box::new(data_modeling::DataModelLoader));
        registry.register(Box::new(raw::RawTableLoader));
        registry.register(Box::new(raw::RawDatabaseLoader));
        registry.register(Box::new(classic::AssetLoader));
        registry.register(Box::new(classic::TimeSeriesLoader));
        registry.register(Box::new(classic::FileMetadataLoader));
        registry.register(Box::new(workflows::TransformationLoader));
        registry.register(Box::new(workflows::FunctionLoader));
        registry.register(Box::new(workflows::LocationFilterLoader));
        registry
    }

    pub fn register(&mut self, loader: Box<dyn ResourceLoader>) {
        self.folders.entry(loader.folder_name()).or_default().push(loader);
    }

    pub fn folder_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.folders.keys().copied()
    }

    pub fn is_resource_folder(&self, name: &str) -> bool {
        self.folders.contains_key(name)
    }

    pub fn loaders_for(&self, folder: &str) -> &[Box<dyn ResourceLoader>] {
        self.folders.get(folder).map(Vec::as_slice).unwrap_or_default()
    }

    /// Picks the capability objects responsible for `path` inside `folder`.
    ///
    /// # Errors
    /// * `ToolkitError::AmbiguousResourceFileError` when unrelated kinds claim the file
    pub fn resolve(&self, folder: &str, path: &Path) -> ToolkitResult<Resolution<'_>> {
        let candidates: Vec<&dyn ResourceLoader> = self
            .loaders_for(folder)
            .iter()
            .map(Box::as_ref)
            .filter(|loader| loader.is_supported_file(path))
            .collect();

        match candidates.as_slice() {
            [] => Ok(Resolution::Unsupported),
            [_] => Ok(Resolution::Loaders(candidates)),
            [first, rest @ ..] => {
                let family = first.family();
                if family.is_some() && rest.iter().all(|loader| loader.family() == family) {
                    return Ok(Resolution::Loaders(candidates));
                }
                if let Some(suffix) = kind_suffix(path) {
                    let explicit: Vec<&dyn ResourceLoader> = candidates
                        .iter()
                        .copied()
                        .filter(|loader| loader.kind().eq_ignore_ascii_case(&suffix))
                        .collect();
                    if explicit.len() == 1 {
                        return Ok(Resolution::Loaders(explicit));
                    }
                }
                let kinds: Vec<&str> = candidates.iter().map(|loader| loader.kind()).collect();
                Err(ToolkitError::AmbiguousResourceFileError {
                    path: path.display().to_string(),
                    kinds: kinds.join(", "),
                })
            }
        }
    }
}

pub fn is_yaml_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
}

/// The `<kind>` part of a `<name>.<kind>.yaml` filename, if it names a known kind.
pub fn kind_suffix(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = crate::constants::INDEX_PATTERN.replace(stem, "");
    let (_, suffix) = stem.rsplit_once('.')?;
    LoaderKind::is_kind_name(suffix).then(|| suffix.to_string())
}

/// Reads a scalar field as a string; numbers and booleans are accepted.
pub(crate) fn scalar_field(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Reads every field needed for an identifier, reporting all that are missing at once.
pub(crate) fn required_fields<const N: usize>(
    kind: &'static str,
    item: &Value,
    fields: [&'static str; N],
) -> Result<[String; N], MissingIdentifier> {
    let missing: Vec<&'static str> =
        fields.iter().copied().filter(|field| scalar_field(item, field).is_none()).collect();
    if !missing.is_empty() {
        return Err(MissingIdentifier { kind, fields: missing });
    }
    Ok(fields.map(|field| scalar_field(item, field).unwrap_or_default()))
}

/// Reads an optional list of strings; an absent field is an empty list.
pub(crate) fn string_list(item: &Value, field: &str) -> Result<Vec<String>, DependencyError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| match value {
                Value::String(value) => Ok(value.clone()),
                other => Err(DependencyError(format!(
                    "'{field}' must only contain strings, got {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(DependencyError(format!("'{field}' must be a list, got {other}"))),
    }
}

/// Reads an optional string reference, rejecting non-string values.
pub(crate) fn optional_reference(
    item: &Value,
    field: &str,
) -> Result<Option<String>, DependencyError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(DependencyError(format!("'{field}' must be a string, got {other}"))),
    }
}

/// `dataSetExternalId` reference shared by most classic resource types.
pub(crate) fn data_set_dependency(item: &Value) -> Result<Option<Dependency>, DependencyError> {
    Ok(optional_reference(item, "dataSetExternalId")?
        .map(|external_id| (LoaderKind::DataSet, Identifier::ExternalId(external_id))))
}

/// Reads a `{space, externalId, version?}` reference.
pub(crate) fn schema_reference(
    value: &Value,
    context: &str,
) -> Result<Identifier, DependencyError> {
    let read = |field: &str| match value.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(DependencyError(format!(
            "'{context}.{field}' must be a string, got {other}"
        ))),
        None => Err(DependencyError(format!("'{context}' is missing '{field}'"))),
    };
    Ok(Identifier::Schema {
        space: read("space")?,
        external_id: read("externalId")?,
        version: scalar_field(value, "version"),
    })
}
