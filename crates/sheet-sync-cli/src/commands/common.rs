use std::env;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sheet_sync_core::models::{Field, FieldPath};
use sheet_sync_core::{Document, FieldValue, SyncConfig};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_CONFIG_PATH: &str = "SHEET_SYNC_CONFIG";

#[derive(Debug, Serialize, PartialEq)]
pub struct FieldListItem {
    pub path: FieldPath,
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value: FieldValue,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<String>,
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheet-sync")
        .join(CONFIG_FILE_NAME)
}

/// Config file (if any) with `SHEET_SYNC_*` environment overrides applied.
pub fn load_config(path: &Path) -> Result<SyncConfig, CliError> {
    Ok(SyncConfig::load_from_path(path)?.with_env_overrides()?)
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|error| CliError::InvalidFile {
        path: path.display().to_string(),
        reason: error.to_string(),
    })
}

pub fn read_sheet(path: &Path) -> Result<Document, CliError> {
    let document = read_json_file::<Document>(path)?;
    document.validate()?;
    Ok(document)
}

pub fn field_to_list_item(path: FieldPath, field: &Field) -> FieldListItem {
    FieldListItem {
        path,
        id: field.id.clone(),
        label: field.label.clone(),
        field_type: field.field_type.to_string(),
        value: field.value.clone(),
        locked: field.locked,
        last_edited_by: field.last_edited_by.clone(),
    }
}

pub fn format_field_lines(document: &Document) -> Vec<String> {
    document
        .fields()
        .map(|(path, field)| {
            let lock = if field.locked { " [locked]" } else { "" };
            format!(
                "{path}  {} ({}){lock}: {}",
                field.label,
                field.field_type,
                value_preview(&field.value, 40)
            )
        })
        .collect()
}

pub fn value_preview(value: &FieldValue, max_chars: usize) -> String {
    let text = value.to_string().replace('\n', " ");
    let mut chars = text.chars();
    let mut preview = chars.by_ref().take(max_chars).collect::<String>();
    if chars.next().is_some() {
        preview.push_str("...");
    }
    if preview.is_empty() {
        "(empty)".to_string()
    } else {
        preview
    }
}
