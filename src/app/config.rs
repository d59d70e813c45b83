use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    APP_NAME, DEFAULT_API_KEY_ENV, DEFAULT_GEMINI_API_BASE, DEFAULT_MODEL_ID,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT, ENV_PREFIX, HTTP_REQUEST_TIMEOUT_SECS,
    LOCAL_CONFIG_DIR,
};
use crate::models::{default_catalog_entries, CatalogEntry, ModelCatalog};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model selected at startup (catalog key or model id)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Start the terminal chat in streaming mode
    #[serde(default)]
    pub stream: bool,

    /// Remote API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model catalog, in display order
    #[serde(default = "default_catalog_entries")]
    pub models: Vec<CatalogEntry>,
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            stream: false,
            api: ApiConfig::default(),
            server: ServerConfig::default(),
            models: default_catalog_entries(),
        }
    }
}

impl Config {
    /// Build the model catalog described by this configuration
    pub fn catalog(&self) -> Result<ModelCatalog> {
        ModelCatalog::from_entries(self.models.clone())
    }

    /// Check that the catalog is usable and contains the default model
    pub fn validate(&self) -> Result<()> {
        let catalog = self.catalog()?;
        if catalog.resolve(&self.default_model).is_none() {
            anyhow::bail!(
                "Default model '{}' is not in the model catalog",
                self.default_model
            );
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Generative Language API
    pub base_url: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Upper bound for a single request, streamed bodies included
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: HTTP_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// Load configuration from the global file, the local project file and the environment
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(LOCAL_CONFIG_DIR).join("config.toml");

    let files: Vec<PathBuf> = [global_config, local_config]
        .into_iter()
        .filter(|path| path.exists())
        .collect();

    extract(build_figment(&files))
}

/// Load configuration from an explicit file (plus the environment)
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    extract(build_figment(&[path.to_path_buf()]))
}

fn build_figment(files: &[PathBuf]) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for file in files {
        figment = figment.merge(Toml::file(file));
    }

    // GEMINI_CHAT_DEFAULT_MODEL, GEMINI_CHAT_SERVER__PORT, ...
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

fn extract(figment: Figment) -> Result<Config> {
    let config: Config = figment
        .extract()
        .context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Load variables from a `.env` file without overriding ones already set
///
/// With no path, `.env` is searched for in the current directory and its parents.
/// Returns the file that was read, if any.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|_| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
        Ok(proj_dirs.config_dir().to_path_buf())
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".config").join(APP_NAME))
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
///
/// Returns the path of the file and whether it was newly written.
pub fn init_config() -> Result<(PathBuf, bool)> {
    let config_file = get_config_dir()?.join("config.toml");

    if config_file.exists() {
        return Ok((config_file, false));
    }

    save_config(&Config::default(), Some(config_file.clone()))?;
    Ok((config_file, true))
}
