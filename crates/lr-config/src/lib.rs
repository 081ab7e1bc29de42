//! Configuration management for lr.
//!
//! Parses `lr.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `live_reload.environment`
//!
//! ## Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 7878
//!
//! [watch]
//! root = "public"
//! patterns = ["**/*.html", "**/*.css", "**/*.js"]
//! debounce_ms = 100
//!
//! [live_reload]
//! environment = "${LR_ENV:-development}"
//! endpoint = "/__livereload"
//! ```

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override watched root directory.
    pub root: Option<PathBuf>,
    /// Override environment name (e.g. "development", "production").
    pub environment: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "lr.toml";

/// Default push endpoint path.
const DEFAULT_ENDPOINT: &str = "/__livereload";

/// Default debounce window in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Watch configuration (root is a relative string from TOML).
    watch: WatchConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
        }
    }
}

/// Raw watch configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    root: Option<String>,
    patterns: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

/// Resolved watch configuration with an absolute root.
#[derive(Debug)]
pub struct WatchConfig {
    /// Directory tree to watch and serve.
    pub root: PathBuf,
    /// Glob patterns (relative to root) that trigger a reload. Empty matches everything.
    pub patterns: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            patterns: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Environment name. Live reload is only active in development.
    pub environment: String,
    /// Path of the push endpoint clients subscribe to.
    pub endpoint: String,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            environment: "${LR_ENV:-development}".to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LR_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `lr.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, so CLI
    /// arguments take precedence over config file values. Environment
    /// variables are expanded last, including in the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.root {
            self.watch_resolved.root.clone_from(root);
        }
        if let Some(environment) = &settings.environment {
            self.live_reload.environment.clone_from(environment);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            watch: WatchConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            watch_resolved: WatchConfig {
                root: base.to_path_buf(),
                ..WatchConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watch()?;
        self.validate_live_reload()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_watch(&self) -> Result<(), ConfigError> {
        const MAX_DEBOUNCE_MS: u64 = 10_000;

        let debounce_ms = self.watch_resolved.debounce_ms;
        if debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be greater than 0".to_owned(),
            ));
        }
        if debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "watch.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }

        for pattern in &self.watch_resolved.patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("watch.patterns: invalid glob {pattern:?}: {e}"))
            })?;
        }

        Ok(())
    }

    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let endpoint = &self.live_reload.endpoint;
        if !endpoint.starts_with('/') || endpoint.len() < 2 {
            return Err(ConfigError::Validation(
                "live_reload.endpoint must be an absolute path other than /".to_owned(),
            ));
        }
        if endpoint.ends_with('/') {
            return Err(ConfigError::Validation(
                "live_reload.endpoint cannot end with /".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.live_reload.environment =
            expand::expand_env(&self.live_reload.environment, "live_reload.environment")?;
        Ok(())
    }

    /// Resolve the watch root relative to the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.watch_resolved = WatchConfig {
            root: config_dir.join(self.watch.root.as_deref().unwrap_or(".")),
            patterns: self.watch.patterns.clone().unwrap_or_default(),
            debounce_ms: self.watch.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
        };
    }
}
