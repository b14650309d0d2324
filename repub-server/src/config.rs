//! # Configuration Management
//!
//! Configuration for the repository server, loaded from a JSON file and then
//! overlaid with environment variables.
//!
//! - [`ServerConfig`]: bind address and the public base URL
//! - [`StorageConfig`]: data directory holding archives and the package catalog
//! - [`LimitsConfig`]: upload size and pending upload lifetime
//! - [`AuthConfig`]: read and write bearer tokens
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! # use repub_server::config::Config;
//! let mut config = Config::load_or_default("repub.json")?;
//! config.apply_env(std::env::vars());
//! config.validate()?;
//! # Ok::<(), repub_server::error::AppError>(())
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `HOST`, `PORT` | bind address |
//! | `BASE_URL` | public base URL used in every generated link |
//! | `STORAGE_PATH` | data directory |
//! | `LOG_LEVEL` | default log filter |
//! | `READ_TOKEN_<NAME>` | adds a read token named `<name>` |
//! | `WRITE_TOKEN_<NAME>` | adds a write token named `<name>` |

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::urls::PublicUrls;
use crate::validation::DEFAULT_MAX_UPLOAD_SIZE_MB;

const READ_TOKEN_PREFIX: &str = "READ_TOKEN_";
const WRITE_TOKEN_PREFIX: &str = "WRITE_TOKEN_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Default log filter, consumed by the binary when initializing logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Server network settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL clients reach the server at (e.g., "https://pub.example.com")
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
            base_url: "http://localhost:9090".to_string(),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of all server data
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    /// Directory holding package archives.
    pub fn archives_dir(&self) -> PathBuf {
        self.data_dir.join("archives")
    }

    /// JSON document holding the package catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("metadata").join("packages.json")
    }
}

/// Upload limits configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_size_mb: usize,
    /// Seconds a staged upload waits for finalization; 0 keeps it forever
    pub pending_upload_ttl_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: DEFAULT_MAX_UPLOAD_SIZE_MB,
            pending_upload_ttl_secs: 3600,
        }
    }
}

/// A named bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Identity recorded for requests made with this token
    pub name: String,
    pub value: String,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Bearer tokens accepted by the server. Write tokens also grant read access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub read_tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub write_tokens: Vec<TokenConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            auth: AuthConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// Sections missing from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// configuration format.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file with fallback to defaults.
    ///
    /// A missing file yields [`Config::default`]; a file that exists but does
    /// not parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay environment variables onto the loaded configuration.
    ///
    /// Takes the variables as an iterator so callers decide where they come
    /// from (`std::env::vars()` in the binary). Unparseable `PORT` values are
    /// ignored. Token variables are appended, so file-configured tokens stay.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let value: String = value.into();

            match key {
                "HOST" => self.server.host = value,
                "PORT" => {
                    if let Ok(port) = value.trim().parse() {
                        self.server.port = port;
                    }
                }
                "BASE_URL" => self.server.base_url = value,
                "STORAGE_PATH" => self.storage.data_dir = PathBuf::from(value),
                "LOG_LEVEL" => self.log_level = value,
                _ => {
                    if let Some(name) = key.strip_prefix(WRITE_TOKEN_PREFIX) {
                        push_token(&mut self.auth.write_tokens, name, value);
                    } else if let Some(name) = key.strip_prefix(READ_TOKEN_PREFIX) {
                        push_token(&mut self.auth.read_tokens, name, value);
                    }
                }
            }
        }
    }

    /// Check that the configuration can serve requests.
    ///
    /// # Errors
    ///
    /// Fails when no token is configured at all, when a token is empty, when
    /// the upload limit is zero or when the base URL is not an http(s) URL.
    pub fn validate(&self) -> AppResult<()> {
        if self.auth.read_tokens.is_empty() && self.auth.write_tokens.is_empty() {
            return Err(AppError::InternalError(
                "no access tokens configured; set READ_TOKEN_<NAME> or WRITE_TOKEN_<NAME>"
                    .to_string(),
            ));
        }

        if let Some(token) = self
            .auth
            .read_tokens
            .iter()
            .chain(&self.auth.write_tokens)
            .find(|t| t.name.is_empty() || t.value.is_empty())
        {
            return Err(AppError::InternalError(format!(
                "token {:?} must have a non-empty name and value",
                token.name
            )));
        }

        if self.limits.max_upload_size_mb == 0 {
            return Err(AppError::InternalError(
                "limits.max_upload_size_mb must be greater than zero".to_string(),
            ));
        }

        PublicUrls::new(&self.server.base_url)?;
        Ok(())
    }

    /// Get the maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }

    /// Lifetime of a pending upload, `None` when expiry is disabled.
    pub fn pending_upload_ttl(&self) -> Option<Duration> {
        match self.limits.pending_upload_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn push_token(tokens: &mut Vec<TokenConfig>, env_name: &str, value: String) {
    if env_name.is_empty() || value.is_empty() {
        return;
    }
    tokens.push(TokenConfig {
        name: env_name.to_lowercase(),
        value,
    });
}
