//! Data sets, assets, time series and file metadata.
use super::{
    data_set_dependency, optional_reference, required_fields, string_list, Dependency,
    DependencyError, Identifier, LoaderKind, MissingIdentifier, ResourceLoader,
};
use crate::validation::{ParameterSpec, ParameterType};
use serde_json::Value;
use std::sync::LazyLock;

static DATA_SET_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
        .optional("writeProtected", ParameterType::Boolean)
});

static ASSET_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .required("name", ParameterType::String)
        .optional("parentExternalId", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("source", ParameterType::String)
        .optional("labels", ParameterType::Array)
        .optional("labels.*", ParameterType::Any)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
});

static TIME_SERIES_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("assetExternalId", ParameterType::String)
        .optional("isString", ParameterType::Boolean)
        .optional("isStep", ParameterType::Boolean)
        .optional("unit", ParameterType::String)
        .optional("unitExternalId", ParameterType::String)
        .optional("securityCategoryNames", ParameterType::Array)
        .optional("securityCategoryNames.*", ParameterType::String)
        .optional("legacyName", ParameterType::String)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
});

static FILE_METADATA_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .required("name", ParameterType::String)
        .optional("directory", ParameterType::String)
        .optional("source", ParameterType::String)
        .optional("mimeType", ParameterType::String)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("assetExternalIds", ParameterType::Array)
        .optional("assetExternalIds.*", ParameterType::String)
        .optional("labels", ParameterType::Array)
        .optional("labels.*", ParameterType::Any)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
});

fn external_id(kind: &'static str, item: &Value) -> Result<Identifier, MissingIdentifier> {
    let [external_id] = required_fields(kind, item, ["externalId"])?;
    Ok(Identifier::ExternalId(external_id))
}

pub struct DataSetLoader;

impl ResourceLoader for DataSetLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::DataSet
    }

    fn folder_name(&self) -> &'static str {
        "data_sets"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        external_id(self.kind(), item)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*DATA_SET_SPEC)
    }
}

pub struct AssetLoader;

impl ResourceLoader for AssetLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Asset
    }

    fn folder_name(&self) -> &'static str {
        "assets"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        external_id(self.kind(), item)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies: Vec<Dependency> = data_set_dependency(item)?.into_iter().collect();
        if let Some(parent) = optional_reference(item, "parentExternalId")? {
            dependencies.push((LoaderKind::Asset, Identifier::ExternalId(parent)));
        }
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*ASSET_SPEC)
    }

    fn requires_data_set(&self) -> bool {
        true
    }
}

pub struct TimeSeriesLoader;

impl ResourceLoader for TimeSeriesLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::TimeSeries
    }

    fn folder_name(&self) -> &'static str {
        "timeseries"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        external_id(self.kind(), item)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies: Vec<Dependency> = data_set_dependency(item)?.into_iter().collect();
        if let Some(asset) = optional_reference(item, "assetExternalId")? {
            dependencies.push((LoaderKind::Asset, Identifier::ExternalId(asset)));
        }
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*TIME_SERIES_SPEC)
    }
}

pub struct FileMetadataLoader;

impl ResourceLoader for FileMetadataLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::FileMetadata
    }

    fn folder_name(&self) -> &'static str {
        "files"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        external_id(self.kind(), item)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies: Vec<Dependency> = data_set_dependency(item)?.into_iter().collect();
        dependencies.extend(
            string_list(item, "assetExternalIds")?
                .into_iter()
                .map(|asset| (LoaderKind::Asset, Identifier::ExternalId(asset))),
        );
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*FILE_METADATA_SPEC)
    }

    fn requires_data_set(&self) -> bool {
        true
    }
}
