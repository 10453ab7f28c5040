//! Platform abstraction and implementations
//!
//! The repost loop only ever talks to the remote platform through the
//! [`Platform`] trait: login, account lookup, offset-indexed media fetch and
//! photo publishing. Everything platform specific (sessions, endpoints,
//! error payloads) lives behind it.
//!
//! # Examples
//!
//! ```no_run
//! use libreposter::platforms::{instagram::InstagramClient, Platform};
//! use secrecy::SecretString;
//!
//! # async fn example() -> libreposter::error::Result<()> {
//! let mut session = InstagramClient::new()?;
//! let password = SecretString::from("hunter2".to_string());
//! session.authenticate("my_mirror", &password).await?;
//!
//! let account = session.lookup_account("natgeo").await?;
//! println!("{} has {} posts", account.handle, account.post_count);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt;
use std::path::Path;

use crate::error::{PlatformError, Result};
use crate::types::{AccountInfo, MediaItem};

pub mod instagram;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Unified interface to the remote social platform
///
/// An authenticated implementation doubles as the target session: publishes
/// go to the account it logged in as.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Log in as the target account
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are
    /// rejected or the platform demands an interactive challenge.
    async fn authenticate(&mut self, username: &str, password: &SecretString) -> Result<()>;

    /// Resolve an account handle to its identifier and post count
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::NotFound` for unknown handles.
    async fn lookup_account(&self, handle: &str) -> Result<AccountInfo>;

    /// Fetch exactly one item at `offset` (0 = newest) from an account's posts
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Fetch` when the offset is past the end of the
    /// collection, which can happen if posts were deleted since the count
    /// was read.
    async fn fetch_item_at_offset(&self, account_id: &str, offset: u64) -> Result<MediaItem>;

    /// Publish a local image file with a caption, returning the new media id
    async fn publish_photo(&self, path: &Path, caption: &str) -> Result<String>;

    /// Lowercase platform identifier (e.g. "instagram")
    fn name(&self) -> &str;
}

/// Remote operation an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Lookup,
    Fetch,
    Publish,
}

impl Operation {
    /// Error kind used when nothing more specific matches
    fn fallback(self, detail: String) -> PlatformError {
        match self {
            Operation::Login => PlatformError::Authentication(detail),
            Operation::Lookup | Operation::Fetch => PlatformError::Fetch(detail),
            Operation::Publish => PlatformError::Posting(detail),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Login => write!(f, "login"),
            Operation::Lookup => write!(f, "lookup account"),
            Operation::Fetch => write!(f, "fetch media"),
            Operation::Publish => write!(f, "publish photo"),
        }
    }
}

/// Message fragments the platform uses when throttling a client
const RATE_LIMIT_SIGNATURES: &[&str] = &[
    "please wait a few minutes",
    "rate limit",
    "too many requests",
];

/// Message fragments meaning the session is no longer usable
const AUTH_SIGNATURES: &[&str] = &[
    "login_required",
    "checkpoint_required",
    "challenge_required",
    "bad_password",
];

/// Check whether a remote error message is a throttling signal
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Classify a remote failure into a [`PlatformError`]
///
/// # Error Mapping
///
/// - HTTP 429 or a throttling message → `PlatformError::RateLimit`
/// - HTTP 401/403 or a session message → `PlatformError::Authentication`
/// - HTTP 404 → `PlatformError::NotFound`
/// - HTTP 5xx or no status (transport failure) → `PlatformError::Network`
/// - Anything else → the operation's own kind (`Fetch`, `Posting`, ...)
///
/// Throttling is checked first: the platform reports it with a 400 status
/// and a "Please wait a few minutes" message as often as with a 429.
pub fn classify_remote_error(
    operation: Operation,
    status: Option<u16>,
    message: &str,
) -> PlatformError {
    let detail = match status {
        Some(code) => format!("{} failed with HTTP {}: {}", operation, code, message),
        None => format!("{} failed: {}", operation, message),
    };
    let lower = message.to_lowercase();

    if status == Some(429) || is_rate_limit_message(message) {
        return PlatformError::RateLimit(detail);
    }

    if matches!(status, Some(401) | Some(403))
        || AUTH_SIGNATURES.iter().any(|sig| lower.contains(sig))
    {
        return PlatformError::Authentication(detail);
    }

    match status {
        Some(404) => PlatformError::NotFound(detail),
        Some(500..=599) | None => PlatformError::Network(detail),
        Some(_) => operation.fallback(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_from_message_without_429() {
        let err = classify_remote_error(
            Operation::Fetch,
            Some(400),
            "Please wait a few minutes before you try again.",
        );
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[test]
    fn test_rate_limit_from_status() {
        let err = classify_remote_error(Operation::Publish, Some(429), "");
        assert!(matches!(err, PlatformError::RateLimit(_)));
    }

    #[test]
    fn test_rate_limit_wins_over_transport() {
        let err = classify_remote_error(Operation::Lookup, None, "Too Many Requests");
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_authentication_mapping() {
        assert!(matches!(
            classify_remote_error(Operation::Fetch, Some(401), "unauthorized"),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_remote_error(Operation::Fetch, Some(400), "{\"message\":\"login_required\"}"),
            PlatformError::Authentication(_)
        ));
    }

    #[test]
    fn test_not_found_and_server_errors() {
        assert!(matches!(
            classify_remote_error(Operation::Lookup, Some(404), "User not found"),
            PlatformError::NotFound(_)
        ));
        assert!(matches!(
            classify_remote_error(Operation::Publish, Some(503), "unavailable"),
            PlatformError::Network(_)
        ));
        assert!(matches!(
            classify_remote_error(Operation::Fetch, None, "connection reset"),
            PlatformError::Network(_)
        ));
    }

    #[test]
    fn test_fallback_follows_operation() {
        assert!(matches!(
            classify_remote_error(Operation::Publish, Some(400), "media needs to be reviewed"),
            PlatformError::Posting(_)
        ));
        assert!(matches!(
            classify_remote_error(Operation::Fetch, Some(400), "bad request"),
            PlatformError::Fetch(_)
        ));
        assert!(matches!(
            classify_remote_error(Operation::Login, Some(400), "invalid user"),
            PlatformError::Authentication(_)
        ));
    }

    #[test]
    fn test_is_rate_limit_message_case_insensitive() {
        assert!(is_rate_limit_message("PLEASE WAIT A FEW MINUTES"));
        assert!(is_rate_limit_message("rate limit exceeded"));
        assert!(!is_rate_limit_message("media not found"));
    }
}
