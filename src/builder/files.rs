//! File metadata templates.
//!
//! A template whose strings contain `$FILENAME` is expanded into one item per data file of
//! the module's `files` folder.

use super::{FolderExtension, ItemReport, ValidatedItem};
use crate::constants::FILENAME_VARIABLE;
use crate::error::ToolkitResult;
use crate::loader::is_yaml_file;
use crate::modules::ModuleLocation;
use crate::warning::{Severity, ToolkitWarning};
use log::debug;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

const FILES_FOLDER: &str = "files";

pub struct FileMetadataExtension;

fn data_files(module: &ModuleLocation) -> Vec<&PathBuf> {
    module.resource_files(FILES_FOLDER).iter().filter(|path| !is_yaml_file(path)).collect()
}

fn substitute_filename(value: &Value, filename: &str) -> Value {
    match value {
        Value::String(text) => Value::String(text.replace(FILENAME_VARIABLE, filename)),
        Value::Sequence(values) => {
            Value::Sequence(values.iter().map(|v| substitute_filename(v, filename)).collect())
        }
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .iter()
                .map(|(key, value)| (key.clone(), substitute_filename(value, filename)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Expands `$FILENAME` templates into one item per file name.
pub fn expand_filename_template(content: &str, filenames: &[String]) -> Option<String> {
    let parsed: Value = serde_yaml::from_str(content).ok()?;
    let templates = match parsed {
        Value::Sequence(templates) => templates,
        mapping @ Value::Mapping(_) => vec![mapping],
        _ => return None,
    };
    let expanded: Vec<Value> = templates
        .iter()
        .flat_map(|template| {
            filenames.iter().map(move |filename| substitute_filename(template, filename))
        })
        .collect();
    serde_yaml::to_string(&Value::Sequence(expanded)).ok()
}

impl FolderExtension for FileMetadataExtension {
    fn prepare_content(
        &self,
        content: String,
        source: &Path,
        module: &ModuleLocation,
    ) -> ToolkitResult<String> {
        if !content.contains(FILENAME_VARIABLE) || !is_yaml_file(source) {
            return Ok(content);
        }
        let filenames: Vec<String> = data_files(module)
            .into_iter()
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();
        debug!(
            "Expanding {} for {} file(s) in {}",
            FILENAME_VARIABLE,
            filenames.len(),
            source.display()
        );
        // Content that does not parse is left alone so validation reports it.
        Ok(expand_filename_template(&content, &filenames).unwrap_or(content))
    }

    fn process_item(
        &self,
        item: &ValidatedItem,
        source: &Path,
        module: &ModuleLocation,
    ) -> ToolkitResult<ItemReport> {
        let mut report = ItemReport::default();
        let Some(name) = item.item.get("name").and_then(|name| name.as_str()) else {
            return Ok(report);
        };
        let matching = data_files(module)
            .into_iter()
            .find(|path| path.file_name().is_some_and(|file_name| file_name == name));
        match matching {
            Some(path) => report.extra_sources.push(path.clone()),
            None => report.warnings.push(ToolkitWarning::Advisory {
                source: Some(source.to_path_buf()),
                severity: Severity::Medium,
                message: format!(
                    "FileMetadata '{}' has name '{}', but there is no such file in the {} folder.",
                    item.identifier, name, FILES_FOLDER
                ),
            }),
        }
        Ok(report)
    }
}
