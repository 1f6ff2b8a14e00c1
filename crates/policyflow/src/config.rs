use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Development-only secret used when none is configured.
pub const INSECURE_DEFAULT_SECRET: &str = "dev-secret-change-me-in-production";

const MIN_SECRET_LEN: usize = 16;

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens.
    #[serde(default = "default_session_secret")]
    pub session_secret: String,

    /// Lifetime of an issued token, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_session_secret() -> String {
    INSECURE_DEFAULT_SECRET.to_string()
}

fn default_token_ttl() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: default_session_secret(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// First-run seeding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Seed an empty database when the server starts.
    #[serde(default = "default_seed_on_start")]
    pub seed_on_start: bool,

    #[serde(default)]
    pub admin_email: String,

    #[serde(default)]
    pub admin_name: String,
}

fn default_seed_on_start() -> bool {
    true
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            seed_on_start: default_seed_on_start(),
            admin_email: String::new(),
            admin_name: String::new(),
        }
    }
}

/// Top-level configuration, read from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("policyflow.db")
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(AppError::Io)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(AppError::Io)?;
            }
        }
        std::fs::write(path, contents).map_err(AppError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::Config("database_path must not be empty".into()));
        }
        if self.server.bind.trim().is_empty() {
            return Err(AppError::Config("server.bind must not be empty".into()));
        }
        if self.auth.session_secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(AppError::Config("auth.token_ttl_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn uses_insecure_secret(&self) -> bool {
        self.auth.session_secret == INSECURE_DEFAULT_SECRET
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".policyflow/config.toml")
    }
}
