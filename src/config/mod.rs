// Required external crates for configuration management and serialization
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config, ConfigError, Environment, File};

use crate::fileserver::FileserverConfig;

/// Connection details for the remote fileserver
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the fileserver
    pub url: String,
    /// Value sent in the `X-Fileserver-API-Key` header
    pub api_key: String,
}

/// Configuration for archive uploads
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Request timeout for the multipart upload
    pub timeout_secs: u64,
}

/// Configuration for the remote catalog
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path of the catalog document relative to the server URL
    pub path: String,
    /// Request timeout for catalog reads and writes
    pub timeout_secs: u64,
    /// Guard catalog writes with the ETag returned by the last read
    pub conditional_writes: bool,
    /// Total fetch-merge-write attempts before giving up on a conflicting catalog
    pub max_attempts: u32,
}

/// Local working directories owned by a publish run
#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Converted models land in `<models_dir>/<asset_name>/`
    pub models_dir: PathBuf,
    /// Textures written by the converter
    pub textures_dir: PathBuf,
}

/// Defaults stamped onto every published metadata record
#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    /// Provenance tag
    pub source: String,
    /// Normalization factor
    pub scale: f64,
}

/// External conversion program
#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    pub program: String,
    /// Arguments; `{source}`, `{target}` and `{name}` are substituted per run
    pub args: Vec<String>,
}

/// Demo scene template
#[derive(Debug, Deserialize, Clone)]
pub struct SceneConfig {
    pub template: PathBuf,
    /// Where the generated world is written. Must sit outside the workspace,
    /// which is removed after every upload.
    pub output: PathBuf,
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Optional log directory
    pub file: Option<PathBuf>,
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub index: IndexConfig,
    pub workspace: WorkspaceConfig,
    pub publish: PublishConfig,
    pub converter: ConverterConfig,
    pub scene: SceneConfig,
    pub logging: LoggingConfig,
}

/// Implementation for loading and parsing configuration
impl Settings {
    /// Loads settings from the `config` directory under the current directory.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(
                format!("Failed to get current directory: {}", e)
            ))?
            .join("config");
        Self::load(&config_dir)
    }

    /// Creates a new Settings instance by loading config from multiple sources
    /// in the following order of precedence (highest to lowest):
    /// 1. `FILESERVER_URL` / `FILESERVER_API_KEY`
    /// 2. Environment variables prefixed with MODELPUB_ (`__` between sections)
    /// 3. Local config file (local.toml) if present
    /// 4. Default config file (default.toml)
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        if !config_dir.exists() {
            return Err(ConfigError::Message(
                format!("Config directory not found at: {}", config_dir.display())
            ));
        }

        let default_config = config_dir.join("default.toml");
        if !default_config.exists() {
            return Err(ConfigError::Message(
                format!("Default configuration file not found at: {}", default_config.display())
            ));
        }
        let local_config = config_dir.join("local.toml");

        let settings = Config::builder()
            .add_source(File::from(default_config))
            .add_source(File::from(local_config).required(false))
            .add_source(Environment::with_prefix("MODELPUB").prefix_separator("_").separator("__"))
            .set_override_option("server.url", std::env::var("FILESERVER_URL").ok())?
            .set_override_option("server.api_key", std::env::var("FILESERVER_API_KEY").ok())?
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Connection details handed to the uploader and the index client
    pub fn fileserver(&self) -> FileserverConfig {
        FileserverConfig::new(&self.server.url, &self.server.api_key)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index.timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Message(
                "server.url is empty; set FILESERVER_URL".to_string()
            ));
        }
        if !self.server.url.starts_with("http://") && !self.server.url.starts_with("https://") {
            return Err(ConfigError::Message(
                format!("server.url must be an http(s) URL, got: {}", self.server.url)
            ));
        }
        if self.server.api_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "server.api_key is empty; set FILESERVER_API_KEY".to_string()
            ));
        }

        if self.upload.timeout_secs == 0 || self.index.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "timeouts must be greater than 0".to_string()
            ));
        }

        if self.index.max_attempts == 0 {
            return Err(ConfigError::Message(
                "index.max_attempts must be greater than 0".to_string()
            ));
        }

        if self.index.path.trim_matches('/').is_empty() {
            return Err(ConfigError::Message(
                "index.path must not be empty".to_string()
            ));
        }

        if !(self.publish.scale.is_finite() && self.publish.scale > 0.0) {
            return Err(ConfigError::Message(
                format!("publish.scale must be a positive number, got: {}", self.publish.scale)
            ));
        }

        let scene_output = &self.scene.output;
        if scene_output.as_os_str().is_empty()
            || scene_output.starts_with(&self.workspace.models_dir)
            || scene_output.starts_with(&self.workspace.textures_dir)
        {
            return Err(ConfigError::Message(
                format!("scene.output must be a file outside the workspace, got: {}", scene_output.display())
            ));
        }

        if self.converter.program.trim().is_empty() {
            return Err(ConfigError::Message(
                "converter.program must not be empty".to_string()
            ));
        }

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(
                format!("Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                    self.logging.level)
            )),
        }?;

        Ok(())
    }
}
