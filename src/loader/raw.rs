//! RAW databases and tables.
//!
//! Both live in the `raw` folder and form the `raw` family: an item is tried as a table
//! first and falls back to a database when it only carries `dbName`.
use super::{
    is_yaml_file, kind_suffix, required_fields, Dependency, DependencyError, Identifier, LoaderKind,
    MissingIdentifier, ResourceLoader,
};
use crate::validation::{ParameterSpec, ParameterType};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

static RAW_TABLE_SPEC: LazyLock<ParameterSpec> = LazyLock::new(|| {
    ParameterSpec::new()
        .required("dbName", ParameterType::String)
        .required("tableName", ParameterType::String)
});

static RAW_DATABASE_SPEC: LazyLock<ParameterSpec> =
    LazyLock::new(|| ParameterSpec::new().required("dbName", ParameterType::String));

const RAW_FAMILY: &str = "raw";

fn is_raw_file(path: &Path) -> bool {
    is_yaml_file(path)
        && kind_suffix(path).map_or(true, |suffix| {
            suffix.eq_ignore_ascii_case(LoaderKind::RawTable.kind_name())
                || suffix.eq_ignore_ascii_case(LoaderKind::RawDatabase.kind_name())
        })
}

pub struct RawTableLoader;

impl ResourceLoader for RawTableLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::RawTable
    }

    fn folder_name(&self) -> &'static str {
        "raw"
    }

    fn family(&self) -> Option<&'static str> {
        Some(RAW_FAMILY)
    }

    fn is_supported_file(&self, path: &Path) -> bool {
        is_raw_file(path)
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [db_name, table_name] = required_fields(self.kind(), item, ["dbName", "tableName"])?;
        Ok(Identifier::RawTable { db_name, table_name })
    }

    fn get_dependent_items(&self, item: &Value) -> Result<Vec<Dependency>, DependencyError> {
        match item.get("dbName") {
            Some(Value::String(db_name)) => {
                let database = Identifier::RawDatabase { db_name: db_name.clone() };
                Ok(vec![(LoaderKind::RawDatabase, database)])
            }
            Some(other) => Err(DependencyError(format!("'dbName' must be a string, got {other}"))),
            None => Ok(Vec::new()),
        }
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*RAW_TABLE_SPEC)
    }
}

pub struct RawDatabaseLoader;

impl ResourceLoader for RawDatabaseLoader {
    fn loader_kind(&self) -> LoaderKind {
        LoaderKind::RawDatabase
    }

    fn folder_name(&self) -> &'static str {
        "raw"
    }

    fn family(&self) -> Option<&'static str> {
        Some(RAW_FAMILY)
    }

    fn is_supported_file(&self, path: &Path) -> bool {
        is_raw_file(path)
    }

    fn get_id(&self, item: &Value) -> Result<Identifier, MissingIdentifier> {
        let [db_name] = required_fields(self.kind(), item, ["dbName"])?;
        Ok(Identifier::RawDatabase { db_name })
    }

    fn parameter_spec(&self) -> Option<&ParameterSpec> {
        Some(&*RAW_DATABASE_SPEC)
    }
}
