//! Configuration management for Reposter

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Default seconds between repost attempts (50 minutes)
pub const DEFAULT_CHECK_INTERVAL: u64 = 3000;

/// Default retention window for staged artifacts (24 hours)
pub const DEFAULT_RETENTION_SECS: u64 = 86_400;

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Handle of the account posts are sampled from
    pub source_username: String,
    /// Handle of the account posts are republished to
    pub target_username: String,
    pub target_password: String,
    /// Seconds between repost attempts
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("source_username", &self.source_username)
            .field("target_username", &self.target_username)
            .field("target_password", &"[REDACTED]")
            .field("check_interval", &self.check_interval)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            staging_dir: default_staging_dir(),
            log_file: default_log_file(),
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL
}

fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}

fn default_ledger_path() -> String {
    "~/.local/share/reposter/reposted_ids.json".to_string()
}

fn default_staging_dir() -> String {
    "~/.local/share/reposter/staging".to_string()
}

fn default_log_file() -> String {
    "~/.local/share/reposter/reposter.log".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    ///
    /// A missing file is replaced by a template with blank credentials and
    /// reported as [`ConfigError::TemplateCreated`]; the caller must not
    /// continue with it.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            write_template(path)?;
            return Err(ConfigError::TemplateCreated(path.to_path_buf()).into());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Template written on first run
    pub fn template() -> Self {
        Self {
            source_username: String::new(),
            target_username: String::new(),
            target_password: String::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            storage: StorageConfig::default(),
        }
    }

    /// Reject blank credentials and nonsensical intervals
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("source_username", &self.source_username),
            ("target_username", &self.target_username),
            ("target_password", &self.target_password),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()).into());
            }
        }

        if self.check_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "check_interval".to_string(),
                reason: "must be at least 1 second".to_string(),
            }
            .into());
        }

        // Staging is purged and removed wholesale, so nothing else may live in it
        let staging_dir = self.storage.staging_dir();
        let persistent = [
            ("ledger_path", self.storage.ledger_path()),
            ("log_file", self.storage.log_file()),
        ];
        for (name, path) in persistent {
            if path.starts_with(&staging_dir) {
                return Err(ConfigError::Invalid {
                    field: "storage.staging_dir".to_string(),
                    reason: format!(
                        "{} must not contain storage.{} ({})",
                        staging_dir.display(),
                        name,
                        path.display()
                    ),
                }
                .into());
            }
        }

        if self.storage.retention_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "storage.retention_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl StorageConfig {
    pub fn ledger_path(&self) -> PathBuf {
        expand_path(&self.ledger_path)
    }

    pub fn staging_dir(&self) -> PathBuf {
        expand_path(&self.staging_dir)
    }

    pub fn log_file(&self) -> PathBuf {
        expand_path(&self.log_file)
    }
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", parent.display(), e)))?;
    }

    let content = toml::to_string_pretty(&Config::template())
        .map_err(|e| ConfigError::WriteError(e.to_string()))?;
    std::fs::write(path, content)
        .map_err(|e| ConfigError::WriteError(format!("{}: {}", path.display(), e)))?;

    tracing::error!("Please fill in your credentials in {}", path.display());
    Ok(())
}

/// Expand a leading `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REPOSTER_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("reposter").join("config.toml"))
}
