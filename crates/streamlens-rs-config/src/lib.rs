//! Configuration models and layered config loading.
//!
//! This crate owns the Streamlens config schema, validation, and layer-merging
//! logic used by both the client library and the CLI.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Layered config types and loader options.
pub use loader::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, LayeredConfig,
    LayeredConfigOptions,
};
/// Configuration schema models.
pub use model::*;
