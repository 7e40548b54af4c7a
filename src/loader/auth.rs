//! Access groups.
use super::{
    required_fields, string_list, Dependency, DependencyError, Identifier, LoaderKind,
    MissingIdentifier, ResourceLoader,
};
use crate::validation::{ParameterSpec, ParameterType};
use serde_json::Value;
use std::sync::LazyLock;

static GROUP_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("name", ParameterType::String)
        .optional("sourceId", ParameterType::String)
        .optional("members", ParameterType::Any)
        .optional("metadata", ParameterType::Object)
        .optional("metadata.*", ParameterType::String)
        .optional("capabilities", ParameterType::Array)
        .optional("capabilities.*", ParameterType::Object)
        .optional("capabilities.*.*", ParameterType::Object)
        .optional("capabilities.*.*.actions", ParameterType::Array)
        .optional("capabilities.*.*.actions.*", ParameterType::String)
        .optional("capabilities.*.*.scope", ParameterType::Object)
        .optional("capabilities.*.*.scope.*", ParameterType::Any)
});

pub struct GroupLoader;

impl GroupLoader {
    fn scope_dependencies(
        scope: &Value,
        context: &str,
    ) -> Result<Vec<Dependency>, DependencyError> {
        let mut dependencies = Vec::new();
        if let Some(data_sets) = scope.get("datasetScope") {
            dependencies.extend(
                string_list(data_sets, "ids")
                    .map_err(|e| DependencyError(format!("{context}.datasetScope: {e}")))?
                    .into_iter()
                    .map(|id| (LoaderKind::DataSet, Identifier::ExternalId(id))),
            );
        }
        if let Some(spaces) = scope.get("spaceIdScope") {
            dependencies.extend(
                string_list(spaces, "spaceIds")
                    .map_err(|e| DependencyError(format!("{context}.spaceIdScope: {e}")))?
                    .into_iter()
                    .map(|space| (LoaderKind::Space, Identifier::Space(space))),
            );
        }
        if let Some(tables) = scope.get("tableScope").and_then(|t| t.get("dbsToTables")) {
            let Value::Object(tables) = tables else {
                return Err(DependencyError(format!(
                    "{context}.tableScope.dbsToTables must be a mapping, got {tables}"
                )));
            };
            for (db_name, table_names) in tables {
                dependencies.push((
                    LoaderKind::RawDatabase,
                    Identifier::RawDatabase { db_name: db_name.clone() },
                ));
                let table_names: &[Value] = match table_names {
                    Value::Array(names) => names.as_slice(),
                    Value::Null => &[],
                    other => {
                        return Err(DependencyError(format!(
                            "{context}.tableScope.dbsToTables.{db_name} must be a list, got {other}"
                        )))
                    }
                };
                for table_name in table_names.iter().filter_map(Value::as_str) {
                    dependencies.push((LoaderKind::RawTable, Identifier::RawTable {
                        db_name: db_name.clone(),
                        table_name: table_name.to_string(),
                    }));
                }
            }
        }
        Ok(dependencies)
    }
}

impl ResourceLoader for GroupLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::Group
    }

    fn folder_name(&self) -> &'static str {
        "auth"
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [name] = required_fields(self.kind(), item, ["name"])?;
        Ok(Identifier::Name(name))
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        let capabilities = match item.get("capabilities") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(capabilities)) => capabilities,
            Some(other) => {
                return Err(DependencyError(format!("'capabilities' must be a list, got {other}")))
            }
        };
        let mut dependencies = Vec::new();
        for (index, capability) in capabilities.iter().enumerate() {
            let Value::Object(acls) = capability else {
                return Err(DependencyError(format!("capabilities[{index}] must be a mapping")));
            };
            for (acl, definition) in acls {
                if let Some(scope) = definition.get("scope") {
                    let context = format!("capabilities[{index}].{acl}.scope");
                    dependencies.extend(Self::scope_dependencies(scope, &context)?);
                }
            }
        }
        Ok(dependencies)
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*GROUP_SPEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_scope_dependencies() {
        let group = json!({
            "name": "readers",
            "capabilities": [
                {"timeSeriesAcl": {
                    "actions": ["READ"],
                    "scope": {"datasetScope": {"ids": ["ds_a"]}}
                }},
                {"dataModelInstancesAcl": {
                    "actions": ["READ"],
                    "scope": {"spaceIdScope": {"spaceIds": ["sp"]}}
                }},
                {"rawAcl": {
                    "actions": ["READ"],
                    "scope": {"tableScope": {"dbsToTables": {"db": ["t1"]}}}
                }}
            ]
        });
        let dependencies = GroupLoader.get_dependent_items(&group).unwrap();
        assert_eq!(dependencies, vec![
            (LoaderKind::DataSet, Identifier::external_id("ds_a")),
            (LoaderKind::Space, Identifier::Space("sp".to_string())),
            (LoaderKind::RawDatabase, Identifier::RawDatabase { db_name: "db".to_string() }),
            (LoaderKind::RawTable, Identifier::RawTable {
                db_name: "db".to_string(),
                table_name: "t1".to_string(),
            }),
        ]);
        assert_eq!(GroupLoader.get_id(&group).unwrap(), Identifier::Name("readers".to_string()));
    }

    #[test]
    fn test_capability_must_be_mapping() {
        let group = json!({"name": "g", "capabilities": ["timeSeriesAcl"]});
        let err = GroupLoader.get_dependent_items(&group).unwrap_err();
        assert_eq!(err.to_string(), "capabilities[0] must be a mapping");
    }
}
