//! Spaces, containers, views and data models.
//!
//! All four share the `data_models` folder, so files must use the
//! `<name>.<kind>.yaml` convention for the registry to tell them apart.
use super::{
    required_fields, scalar_field, schema_reference, Dependency, DependencyError, Identifier,
    LoaderKind, MissingIdentifier, ResourceLoader,
};
use crate::validation::{ParameterSpec, ParameterType};
use serde_json::Value;
use std::sync::LazyLock;

static SPACE_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("space", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
});

static CONTAINER_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("space", ParameterType::String)
        .required("externalId", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("usedFor", ParameterType::String)
        .required("properties", ParameterType::Object)
        .optional("properties.*", ParameterType::Object)
        .optional("constraints", ParameterType::Object)
        .optional("indexes", ParameterType::Object)
});

static VIEW_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("space", ParameterType::String)
        .required("externalId", ParameterType::String)
        .required("version", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("filter", ParameterType::Object)
        .optional("implements", ParameterType::Array)
        .optional("implements.*", ParameterType::Object)
        .optional("properties", ParameterType::Object)
        .optional("properties.*", ParameterType::Object)
});

static DATA_MODEL_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("space", ParameterType::String)
        .required("externalId", ParameterType::String)
        .required("version", ParameterType::String)
        .optional("name", ParameterType::String)
        .optional("description", ParameterType::String)
        .optional("views", ParameterType::Array)
        .optional("views.*", ParameterType::Object)
});

fn space_dependency(item: &Value) -> Vec<Dependency> {
    scalar_field(item, "space")
        .map(|space| (LoaderKind::Space, Identifier::Space(space)))
        .into_iter()
        .collect()
}

fn schema_id(
    kind: &'static str,
    item: &Value,
    versioned: bool,
) -> Result<Identifier, MissingIdentifier> {
    if versioned {
        let [space, external_id, version] =
            required_fields(kind, item, ["space", "externalId", "version"])?;
        Ok(Identifier::Schema { space, external_id, version: Some(version) })
    } else {
        let [space, external_id] = required_fields(kind, item, ["space", "externalId"])?;
        Ok(Identifier::Schema { space, external_id, version: None })
    }
}

/// References listed under `field`, each a `{space, externalId, version?}` mapping.
fn schema_references(
    item: &Value,
    field: &str,
    kind: LoaderKind,
) -> Result<Vec<Dependency>, DependencyError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(references)) => references
            .iter()
            .enumerate()
            .map(|(index, reference)| {
                Ok((kind, schema_reference(reference, &format!("{field}[{index}]"))?))
            })
            .collect(),
        Some(other) => Err(DependencyError(format!("'{field}' must be a list, got {other}"))),
    }
}

pub struct SpaceLoader;

impl ResourceLoader for SpaceLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Space
    }

    fn folder_name(&self) -> &'static str {
        "data_models"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [space] = required_fields(self.kind(), item, ["space"])?;
        Ok(Identifier::Space(space))
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*SPACE_SPEC)
    }
}

pub struct ContainerLoader;

impl ResourceLoader for ContainerLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Container
    }

    fn folder_name(&self) -> &'static str {
        "data_models"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        schema_id(self.kind(), item, false)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        Ok(space_dependency(item))
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*CONTAINER_SPEC)
    }
}

pub struct ViewLoader;

impl ResourceLoader for ViewLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::View
    }

    fn folder_name(&self) -> &'static str {
        "data_models"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        schema_id(self.kind(), item, true)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies = space_dependency(item);
        dependencies.extend(schema_references(item, "implements", LoaderKind::View)?);
        match item.get("properties") {
            None | Some(Value::Null) => {}
            Some(Value::Object(properties)) => {
                for (name, property) in properties {
                    if let Some(container) = property.get("container") {
                        let context = format!("properties.{name}.container");
                        let container = schema_reference(container, &context)?;
                        let container = match container {
                            Identifier::Schema { space, external_id, .. } => {
                                Identifier::Schema { space, external_id, version: None }
                            }
                            other => other,
                        };
                        dependencies.push((LoaderKind::Container, container));
                    }
                    if let Some(source) = property.get("source") {
                        let context = format!("properties.{name}.source");
                        dependencies.push((LoaderKind::View, schema_reference(source, &context)?));
                    }
                }
            }
            Some(other) => {
                return Err(DependencyError(format!("'properties' must be a mapping, got {other}")))
            }
        }
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*VIEW_SPEC)
    }
}

pub struct DataModelLoader;

impl ResourceLoader for DataModelLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::DataModel
    }

    fn folder_name(&self) -> &'static str {
        "data_models"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        schema_id(self.kind(), item, true)
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies = space_dependency(item);
        dependencies.extend(schema_references(item, "views", LoaderKind::View)?);
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*DATA_MODEL_SPEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_dependencies() {
        let view = json!({
            "space": "sp",
            "externalId": "Pump",
            "version": "v1",
            "implements": [{"space": "cdf_cdm", "externalId": "CogniteAsset", "version": "v1"}],
            "properties": {
                "name": {
                    "container": {"space": "sp", "externalId": "PumpContainer", "type": "container"}
                }
            }
        });
        let dependencies = ViewLoader.get_dependent_items(&view).unwrap();
        assert_eq!(dependencies.len(), 3);
        assert_eq!(dependencies[0], (LoaderKind::Space, Identifier::Space("sp".to_string())));
        assert_eq!(dependencies[2], (LoaderKind::Container, Identifier::Schema {
            space: "sp".to_string(),
            external_id: "PumpContainer".to_string(),
            version: None,
        }));
    }

    #[test]
    fn test_view_id_requires_version() {
        let err = ViewLoader.get_id(&json!({"space": "sp", "externalId": "Pump"})).unwrap_err();
        assert_eq!(err.fields, vec!["version"]);
    }

    #[test]
    fn test_data_model_views_must_be_a_list() {
        let model = json!({"space": "sp", "externalId": "M", "version": "1", "views": "Pump"});
        assert!(DataModelLoader.get_dependent_items(&model).is_err());
    }
}
