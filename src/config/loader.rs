//! Configuration Loader
//!
//! Environment-aware layered loading: built-in defaults, then
//! `harvest.toml`, then `harvest.<environment>.toml`, then `HARVEST__*`
//! environment variables (`__` separates sections, e.g.
//! `HARVEST__RETRY__MAX_RETRIES=5`).

use super::HarvestConfig;
use crate::error::Result;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "HARVEST";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration together with the environment it was resolved for
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: HarvestConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        Self::load_with_env_source(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`], reading overrides from
    /// `env_source` instead of the process environment when given
    pub fn load_with_env_source(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_source: Option<HashMap<String, String>>,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading harvest configuration"
        );

        let config = Self::build(&config_directory, environment, env_source)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_retries = config.retry.max_retries,
            loading_timeout_ms = config.loading.default_timeout_ms,
            cache_ttl_ms = config.cache.default_ttl_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (validated first)
    pub fn from_config(config: HarvestConfig, environment: &str) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build(
        directory: &Path,
        environment: &str,
        env_source: Option<HashMap<String, String>>,
    ) -> Result<HarvestConfig> {
        let base_file = directory.join("harvest.toml");
        let environment_file = directory.join(format!("harvest.{environment}.toml"));

        let builder = Config::builder()
            .add_source(Config::try_from(&HarvestConfig::default())?)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(environment_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env_source),
            );

        Ok(builder.build()?.try_deserialize::<HarvestConfig>()?)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }
}
