//! ConfigLoader: composes sources and deserializes to PluginCacheConfig.

use super::{xdg, PluginCacheConfig};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use std::path::Path;

const ENV_PREFIX: &str = "PLUGIN_CACHE";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file, an optional explicit file,
    /// and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<PluginCacheConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(global) = xdg::global_config_file() {
            builder = builder.add_source(File::from(global.as_path()).required(false));
        }
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let builder = add_environment(builder);

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a single file, without global or environment
    /// overlays
    pub fn load_from_file(path: &Path) -> Result<PluginCacheConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }
}

fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    )
}
