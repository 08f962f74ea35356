//! Configuration loading and management
//!
//! Agent options are normally built in code and handed to
//! [`crate::init`]. Tools can also load them from
//! `~/.config/obs/config.toml`, with `OBS_*` environment variables taking
//! precedence over the file:
//!
//! ```toml
//! [agent]
//! dsn = "https://key@collector.example.com"
//! environment = "production"
//! server_name = "web-1"
//! queue_capacity = 256
//!
//! [logging]
//! level = "warn"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`Options::dsn`]
pub const ENV_DSN: &str = "OBS_DSN";
/// Environment variable overriding [`Options::environment`]
pub const ENV_ENVIRONMENT: &str = "OBS_ENVIRONMENT";
/// Environment variable overriding [`Options::server_name`]
pub const ENV_SERVER_NAME: &str = "OBS_SERVER_NAME";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Agent options
    #[serde(default)]
    pub agent: Options,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Options consumed once when an agent is created
#[derive(Debug, Deserialize, Clone)]
pub struct Options {
    /// Connection string, `scheme://apikey@host[:port]`
    #[serde(default)]
    pub dsn: String,

    /// Environment label (e.g. "production")
    #[serde(default)]
    pub environment: String,

    /// Server label; the system host name is used when empty
    #[serde(default)]
    pub server_name: String,

    /// Slots in the delivery queue; events beyond this are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How long a [`FlushGuard`](crate::global::FlushGuard) waits on drop
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            environment: String::new(),
            server_name: String::new(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_timeout(),
            flush_timeout_secs: default_flush_timeout(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_timeout() -> u64 {
    30
}

fn default_flush_timeout() -> u64 {
    2
}

impl Options {
    /// Options for the given DSN with everything else defaulted.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn flush_timeout_secs(mut self, secs: u64) -> Self {
        self.flush_timeout_secs = secs;
        self
    }

    /// Validate the parts of the options that are not the DSN
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "agent.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "agent.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Server name to stamp on events
    pub fn resolved_server_name(&self) -> String {
        if self.server_name.is_empty() {
            hostname()
        } else {
            self.server_name.clone()
        }
    }

    /// Overlay `OBS_DSN`, `OBS_ENVIRONMENT` and `OBS_SERVER_NAME`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(dsn) = non_empty(ENV_DSN) {
            self.dsn = dsn;
        }
        if let Some(environment) = non_empty(ENV_ENVIRONMENT) {
            self.environment = environment;
        }
        if let Some(server_name) = non_empty(ENV_SERVER_NAME) {
            self.server_name = server_name;
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write daily-rotated log files here instead of stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from the default path, then apply the environment
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.agent.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/obs/config.toml` (~/.config/obs/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("obs").join("config.toml")
    }
}

/// The host name reported when no server name is configured.
///
/// `HOSTNAME` wins over the system call so containers can override it.
pub fn hostname() -> String {
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    #[cfg(unix)]
    {
        match nix::unistd::gethostname() {
            Ok(name) => {
                if let Some(name) = name.to_str().filter(|n| !n.is_empty()) {
                    return name.to_string();
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to get system hostname"),
        }
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.queue_capacity, 256);
        assert_eq!(options.timeout_secs, 30);
        assert_eq!(options.flush_timeout_secs, 2);
        assert!(options.dsn.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        let options = Options::new("http://k@localhost").queue_capacity(0);
        assert!(matches!(options.validate(), Err(Error::Config(_))));

        let options = Options {
            timeout_secs: 0,
            ..Options::new("http://k@localhost")
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[agent]
dsn = "http://key@localhost:8000"
environment = "staging"
queue_capacity = 16
flush_timeout_secs = 10

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.dsn, "http://key@localhost:8000");
        assert_eq!(config.agent.environment, "staging");
        assert_eq!(config.agent.server_name, "");
        assert_eq!(config.agent.queue_capacity, 16);
        assert_eq!(config.agent.timeout_secs, 30);
        assert_eq!(config.agent.flush_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nserver_name = \"web-1\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent.server_name, "web-1");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DSN, "http://envkey@collector:9000"),
            (ENV_ENVIRONMENT, "production"),
            (ENV_SERVER_NAME, ""),
        ]
        .into_iter()
        .collect();

        let mut options = Options::new("http://filekey@localhost").server_name("from-file");
        options.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(options.dsn, "http://envkey@collector:9000");
        assert_eq!(options.environment, "production");
        // empty values do not override
        assert_eq!(options.server_name, "from-file");
    }

    #[test]
    fn test_server_name_defaults_to_hostname() {
        let options = Options::new("http://k@localhost");
        assert!(!options.resolved_server_name().is_empty());

        let options = options.server_name("explicit");
        assert_eq!(options.resolved_server_name(), "explicit");
    }
}
