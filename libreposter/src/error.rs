//! Error types for Reposter

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepostError>;

#[derive(Error, Debug)]
pub enum RepostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Staging error: {0}")]
    Stage(#[from] StageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RepostError {
    /// Returns the process exit code for this error
    ///
    /// Every error that reaches the top of the process is fatal, so all of
    /// them map to 1. Clean shutdown is the only path to 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            RepostError::Config(_) => 1,
            RepostError::Platform(PlatformError::Authentication(_)) => 1,
            RepostError::Platform(_) => 1,
            RepostError::Ledger(_) => 1,
            RepostError::Stage(_) => 1,
            RepostError::InvalidInput(_) => 1,
        }
    }

    /// True when the underlying cause is a remote rate-limit signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RepostError::Platform(e) if e.is_rate_limit())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to write config template: {0}")]
    WriteError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Created a config template at {}; fill in source_username, target_username and target_password, then restart", .0.display())]
    TemplateCreated(PathBuf),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger file {} is corrupted: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, PlatformError::RateLimit(_))
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Download returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Download failed for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Staging I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_is_one_for_fatal_errors() {
        let config = RepostError::Config(ConfigError::MissingField("target_password".into()));
        assert_eq!(config.exit_code(), 1);

        let login = RepostError::Platform(PlatformError::Authentication("bad password".into()));
        assert_eq!(login.exit_code(), 1);

        let ledger = RepostError::Ledger(LedgerError::Io {
            path: PathBuf::from("/tmp/ledger.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        });
        assert_eq!(ledger.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_platform() {
        let error = RepostError::Platform(PlatformError::Posting("upload rejected".into()));
        assert_eq!(
            error.to_string(),
            "Platform error: Posting failed: upload rejected"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = RepostError::Config(ConfigError::MissingField("source_username".into()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: source_username"
        );
    }

    #[test]
    fn test_template_created_message_names_the_path() {
        let error = ConfigError::TemplateCreated(PathBuf::from("/home/u/.config/reposter/config.toml"));
        let message = error.to_string();
        assert!(message.contains("/home/u/.config/reposter/config.toml"));
        assert!(message.contains("target_password"));
    }

    #[test]
    fn test_stage_error_http_formatting() {
        let error = StageError::Http {
            status: 404,
            url: "https://cdn.example/a.jpg".into(),
        };
        assert_eq!(
            error.to_string(),
            "Download returned HTTP 404 for https://cdn.example/a.jpg"
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        let limited: RepostError = PlatformError::RateLimit("Please wait a few minutes".into()).into();
        assert!(limited.is_rate_limit());

        let other: RepostError = PlatformError::Network("connection reset".into()).into();
        assert!(!other.is_rate_limit());

        let config: RepostError = ConfigError::MissingField("x".into()).into();
        assert!(!config.is_rate_limit());
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Fetch("offset 9 out of range".into());
        let error: RepostError = platform_error.into();
        match error {
            RepostError::Platform(PlatformError::Fetch(msg)) => assert!(msg.contains("offset 9")),
            _ => panic!("Expected RepostError::Platform"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
