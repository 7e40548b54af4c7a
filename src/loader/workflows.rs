//! Transformations, functions and location filters.
use super::{
    data_set_dependency, optional_reference, required_fields, schema_reference, string_list,
    Dependency, DependencyError, Identifier, LoaderKind, MissingIdentifier, ResourceLoader,
};
use crate::validation::{ParameterSpec, ParameterType};
use serde_json::Value;
use std::sync::LazyLock;

static TRANSFORMATION_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .required("name", ParameterType::String)
        .optional("query", ParameterType::String)
        .optional("destination", ParameterType::Object)
        .optional("destination.*", ParameterType::Any)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("ignoreNullFields", ParameterType::Boolean)
        .optional("isPublic", ParameterType::Boolean)
        .optional("conflictMode", ParameterType::String)
        .optional("authentication", ParameterType::Object)
        .optional("authentication.*", ParameterType::Any)
        .optional("tags", ParameterType::Array)
        .optional("tags.*", ParameterType::String)
});

static FUNCTION_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .required("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("owner", ParameterType::String)
        .optional("functionPath", ParameterType::String)
        .optional("runtime", ParameterType::String)
        .optional("cpu", ParameterType::Number)
        .optional("memory", ParameterType::Number)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("envVars", ParameterType::Object)
        .optional("envVars.*", ParameterType::String)
        .optional("secrets", ParameterType::Object)
        .optional("secrets.*", ParameterType::String)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
});

static LOCATION_FILTER_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("externalId", ParameterType::String)
        .required("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("parentExternalId", ParameterType::String)
        .optional("dataSetExternalId", ParameterType::String)
        .optional("dataModels", ParameterType::Array)
        .optional("dataModels.*", ParameterType::Object)
        .optional("instanceSpaces", ParameterType::Array)
        .optional("instanceSpaces.*", ParameterType::String)
        .optional("assetCentric", ParameterType::Object)
        .optional("assetCentric.*", ParameterType::Any)
});

pub struct TransformationLoader;

impl ResourceLoader for TransformationLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Transformation
    }

    fn folder_name(&self) -> &'static str {
        "transformations"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [external_id] = required_fields(self.kind(), item, ["externalId"])?;
        Ok(Identifier::ExternalId(external_id))
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies: Vec<Dependency> = data_set_dependency(item)?.into_iter().collect();
        let Some(destination) = item.get("destination") else {
            return Ok(dependencies);
        };
        if let Some(view) = destination.get("view") {
            dependencies.push((LoaderKind::View, schema_reference(view, "destination.view")?));
        }
        if let Some(model) = destination.get("dataModel") {
            let model = schema_reference(model, "destination.dataModel")?;
            dependencies.push((LoaderKind::DataModel, model));
        }
        if let Some(space) = optional_reference(destination, "instanceSpace")? {
            dependencies.push((LoaderKind::Space, Identifier::Space(space)));
        }
        if destination.get("type").and_then(Value::as_str) == Some("raw") {
            let db_name = optional_reference(destination, "database")?;
            let table_name = optional_reference(destination, "table")?;
            if let Some(db_name) = db_name {
                let database = Identifier::RawDatabase { db_name: db_name.clone() };
                dependencies.push((LoaderKind::RawDatabase, database));
                if let Some(table_name) = table_name {
                    let table = Identifier::RawTable { db_name, table_name };
                    dependencies.push((LoaderKind::RawTable, table));
                }
            }
        }
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*TRANSFORMATION_SPEC)
    }
}

pub struct FunctionLoader;

impl ResourceLoader for FunctionLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Function
    }

    fn folder_name(&self) -> &'static str {
        "functions"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [external_id] = required_fields(self.kind(), item, ["externalId"])?;
        Ok(Identifier::ExternalId(external_id))
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        Ok(data_set_dependency(item)?.into_iter().collect())
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*FUNCTION_SPEC)
    }

    fn requires_data_set(&self) -> bool {
        true
    }
}

pub struct LocationFilterLoader;

impl ResourceLoader for LocationFilterLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::LocationFilter
    }

    fn folder_name(&self) -> &'static str {
        "locations"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [external_id] = required_fields(self.kind(), item, ["externalId"])?;
        Ok(Identifier::ExternalId(external_id))
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        // An empty dataSetExternalId is kept: it means "exclude all classic resources".
        let mut dependencies: Vec<Dependency> = data_set_dependency(item)?.into_iter().collect();
        if let Some(parent) = optional_reference(item, "parentExternalId")? {
            dependencies.push((LoaderKind::LocationFilter, Identifier::ExternalId(parent)));
        }
        if let Some(Value::Array(models)) = item.get("dataModels") {
            for (index, model) in models.iter().enumerate() {
                let context = format!("dataModels[{index}]");
                dependencies.push((LoaderKind::DataModel, schema_reference(model, &context)?));
            }
        } else if let Some(other) = item.get("dataModels").filter(|v| !v.is_null()) {
            return Err(DependencyError(format!("'dataModels' must be a list, got {other}")));
        }
        dependencies.extend(
            string_list(item, "instanceSpaces")?
                .into_iter()
                .map(|space| (LoaderKind::Space, Identifier::Space(space))),
        );
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*LOCATION_FILTER_SPEC)
    }
}
