//! Transformations may keep their query in a companion `<stem>.sql` file.
use super::{stem_key, FolderExtension, ItemReport, ValidatedItem};
use crate::error::ToolkitResult;
use crate::modules::ModuleLocation;
use crate::warning::{Severity, ToolkitWarning};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub struct TransformationExtension;

/// `<stem>.sql` next to `source`, where the stem ignores index prefixes and kind suffixes.
pub fn companion_query_file(source: &Path) -> Option<PathBuf> {
    let stem = stem_key(source.file_name()?.to_str()?);
    let mut candidates: Vec<PathBuf> = fs::read_dir(source.parent()?)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| stem_key(name) == stem)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

impl FolderExtension for TransformationExtension {
    fn process_item(
        &self,
        item: &ValidatedItem,
        source: &Path,
        _module: &ModuleLocation,
    ) -> ToolkitResult<ItemReport> {
        let mut report = ItemReport::default();
        if let Some(query_file) = companion_query_file(source) {
            report.extra_sources.push(query_file);
            return Ok(report);
        }
        let has_query = matches!(
            item.item.get("query"),
            Some(Value::String(query)) if !query.trim().is_empty()
        );
        if !has_query {
            report.warnings.push(ToolkitWarning::Advisory {
                source: Some(source.to_path_buf()),
                severity: Severity::Medium,
                message: format!(
                    "Transformation '{}' has no 'query' and no companion '{}.sql' file.",
                    item.identifier,
                    source
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(stem_key)
                        .unwrap_or_default()
                ),
            });
        }
        Ok(report)
    }
}
