//! Reading and parsing individual configuration layers.

use std::path::{Path, PathBuf};

use directories::UserDirs;
use serde_json::Value;

use super::schema::validate_layer_schema;
use super::{DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, SYSTEM_CONFIG_PATH, SchemaMode};
use crate::error::ConfigError;

/// A raw layer after parsing and partial-schema validation.
pub(super) struct ParsedLayer {
    pub(super) value: Value,
}

/// Load a layer that may legitimately be absent.
pub(super) fn load_optional_layer(
    path: &Path,
    label: &str,
) -> Result<Option<ParsedLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_required_layer(path, label).map(Some)
}

/// Load a layer that must exist and parse cleanly.
pub(super) fn load_required_layer(path: &Path, label: &str) -> Result<ParsedLayer, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let value: Value = json5::from_str(&raw)?;
    validate_layer_schema(&value, SchemaMode::Partial, &layer_label(label, path))?;
    Ok(ParsedLayer { value })
}

/// Human-readable layer name used in error paths, e.g. `cwd(/proj/streamlens.json5)`.
pub(super) fn layer_label(label: &str, path: &Path) -> String {
    format!("{label}({})", path.display())
}

/// The machine-wide config path for this platform.
pub(super) fn default_system_config_path() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_PATH)
}

/// The per-user config path, if a home directory can be resolved.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    Some(
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE),
    )
}
