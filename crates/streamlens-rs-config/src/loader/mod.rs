//! Layered JSON5 configuration loading for Streamlens.
//!
//! Configuration is merged from several locations, later layers overriding
//! earlier ones:
//!
//! 1. system config (`/etc/streamlens/streamlens.json5` on Unix)
//! 2. user config (`~/.streamlens/streamlens.json5`)
//! 3. project root `streamlens.json5`
//! 4. working directory `streamlens.json5`
//! 5. project `.streamlens/streamlens.json5`
//! 6. explicit runtime paths (highest precedence)

mod layer_io;
mod merge;
mod schema;
#[cfg(test)]
mod tests;
mod utils;

use std::env;
use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;

use crate::error::ConfigError;
use crate::model::StreamlensConfig;
use layer_io::{
    default_system_config_path, default_user_config_path, layer_label, load_optional_layer,
    load_required_layer,
};
use merge::merge_json_values;
use utils::{find_project_root, normalize_path, unique_path};

/// Default config file name looked up in project and working directories.
pub const DEFAULT_CONFIG_FILE: &str = "streamlens.json5";
/// Default per-project config directory.
pub const DEFAULT_CONFIG_DIR: &str = ".streamlens";
/// Markers that identify a project root when walking up from the cwd.
pub const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git", DEFAULT_CONFIG_DIR];

#[cfg(unix)]
pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/streamlens/streamlens.json5";
#[cfg(windows)]
pub(crate) const SYSTEM_CONFIG_PATH: &str = "C:\\ProgramData\\streamlens\\streamlens.json5";

/// A fully merged configuration together with the layers that produced it.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// The merged, validated configuration.
    pub config: StreamlensConfig,
    /// Layers in merge order (lowest precedence first).
    pub layers: Vec<ConfigLayer>,
}

/// Where a configuration layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Machine-wide config under `/etc`.
    System,
    /// Per-user config under the home directory.
    User,
    /// `streamlens.json5` at the project root.
    Project,
    /// `streamlens.json5` in the working directory.
    Cwd,
    /// `.streamlens/streamlens.json5` at the project root.
    Repo,
    /// A path passed explicitly at startup.
    Runtime,
}

/// One loaded (or skipped) configuration layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Which slot in the precedence order this layer fills.
    pub source: ConfigLayerSource,
    /// The file the layer was read from.
    pub path: PathBuf,
}

/// How strictly a layer is validated against the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Individual layers may omit any section.
    Partial,
    /// The merged result must decode into [`StreamlensConfig`].
    Full,
}

/// Options controlling layered loading, mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct LayeredConfigOptions {
    /// Working directory to resolve relative layers against.
    pub cwd: Option<PathBuf>,
    /// Override for the system config path.
    pub system_config_path: Option<PathBuf>,
    /// Override for the user config path.
    pub user_config_path: Option<PathBuf>,
    /// Explicit config files merged last, in order.
    pub runtime_paths: Vec<PathBuf>,
    /// Override for the project root markers.
    pub project_root_markers: Option<Vec<String>>,
}

impl LayeredConfigOptions {
    /// Create empty options (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a runtime config path merged after all implicit layers.
    pub fn with_runtime_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_paths.push(path.into());
        self
    }
}

impl StreamlensConfig {
    /// Load a single config file, validating it as a complete config.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config (path={})", path.display());
        let raw = std::fs::read_to_string(path)?;
        let value: Value = json5::from_str(&raw)?;
        config_from_value(value, &layer_label("runtime", path))
    }

    /// Parse a config from an in-memory JSON5 string.
    pub fn load_from_str(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = json5::from_str(raw)?;
        config_from_value(value, "inline")
    }

    /// Load the layered configuration rooted at the current directory.
    pub fn load_layered() -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new())
    }

    /// Load the layered configuration with explicit options.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = match options.cwd {
            Some(cwd) => cwd,
            None => env::current_dir()?,
        };
        let cwd = normalize_path(&cwd);

        let marker_storage: Vec<String>;
        let markers: Vec<&str> = match &options.project_root_markers {
            Some(custom) => {
                marker_storage = custom.clone();
                marker_storage.iter().map(String::as_str).collect()
            }
            None => DEFAULT_PROJECT_ROOT_MARKERS.to_vec(),
        };
        let project_root = find_project_root(&cwd, &markers);

        let mut loaded: Vec<LoadedLayer> = Vec::new();
        let mut seen_paths: Vec<PathBuf> = Vec::new();

        let system_path = options
            .system_config_path
            .unwrap_or_else(default_system_config_path);
        if let Some(layer) = load_optional_layer(&system_path, "system")? {
            seen_paths.push(normalize_path(&system_path));
            loaded.push(LoadedLayer {
                source: ConfigLayerSource::System,
                path: system_path,
                value: layer.value,
            });
        }

        if let Some(user_path) = options.user_config_path.or_else(default_user_config_path) {
            if let Some(layer) = load_optional_layer(&user_path, "user")? {
                if unique_path(&mut seen_paths, &user_path) {
                    loaded.push(LoadedLayer {
                        source: ConfigLayerSource::User,
                        path: user_path,
                        value: layer.value,
                    });
                }
            }
        }

        let mut local_layers: Vec<LocalLayer> = Vec::new();
        if let Some(root) = &project_root {
            local_layers.push(LocalLayer {
                source: ConfigLayerSource::Project,
                path: root.join(DEFAULT_CONFIG_FILE),
                label: "project",
            });
        }
        local_layers.push(LocalLayer {
            source: ConfigLayerSource::Cwd,
            path: cwd.join(DEFAULT_CONFIG_FILE),
            label: "cwd",
        });
        if let Some(root) = &project_root {
            local_layers.push(LocalLayer {
                source: ConfigLayerSource::Repo,
                path: root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
                label: "repo",
            });
        }
        for local in local_layers {
            if let Some(layer) = load_local_layer(&mut seen_paths, &local)? {
                loaded.push(layer);
            }
        }

        for runtime_path in options.runtime_paths {
            let layer = load_required_layer(&runtime_path, "runtime")?;
            loaded.push(LoadedLayer {
                source: ConfigLayerSource::Runtime,
                path: runtime_path,
                value: layer.value,
            });
        }

        let mut merged = Value::Object(serde_json::Map::new());
        for layer in &loaded {
            merge_json_values(&mut merged, &layer.value);
        }
        let config = config_from_value(merged, "effective")?;

        let layers = loaded
            .into_iter()
            .map(|layer| ConfigLayer {
                source: layer.source,
                path: layer.path,
            })
            .collect();

        Ok(LayeredConfig { config, layers })
    }

    /// Check invariants that the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.websocket_url.is_empty() {
            return Err(ConfigError::Invalid(
                "endpoints.websocket_url must not be empty".to_string(),
            ));
        }
        if !self.endpoints.websocket_url.starts_with("ws://")
            && !self.endpoints.websocket_url.starts_with("wss://")
        {
            return Err(ConfigError::Invalid(
                "endpoints.websocket_url must use the ws:// or wss:// scheme".to_string(),
            ));
        }
        if self.channel.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "channel.event_buffer must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.temperature) {
            return Err(ConfigError::Invalid(
                "analysis.temperature must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A parsed layer before merging.
struct LoadedLayer {
    source: ConfigLayerSource,
    path: PathBuf,
    value: Value,
}

/// A candidate project-local layer to probe for.
struct LocalLayer {
    source: ConfigLayerSource,
    path: PathBuf,
    label: &'static str,
}

/// Decode a merged value into a validated [`StreamlensConfig`].
fn config_from_value(value: Value, layer: &str) -> Result<StreamlensConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, layer)?;
    let config: StreamlensConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Load a project-local layer if it exists and was not already consumed.
fn load_local_layer(
    seen_paths: &mut Vec<PathBuf>,
    local: &LocalLayer,
) -> Result<Option<LoadedLayer>, ConfigError> {
    if !local.path.exists() {
        return Ok(None);
    }
    if !unique_path(seen_paths, &local.path) {
        return Ok(None);
    }
    let layer = load_required_layer(&local.path, local.label)?;
    Ok(Some(LoadedLayer {
        source: local.source,
        path: local.path.clone(),
        value: layer.value,
    }))
}
