//! Core data types for Reposter

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// A single post from the source account
///
/// Read-only snapshot of remote state; never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Platform identifier, stable across requests
    pub id: String,
    /// URL of the image content to republish
    pub content_url: String,
    pub caption: Option<String>,
    /// Offset the item was fetched at (only meaningful during sampling)
    #[serde(default)]
    pub offset: u64,
}

impl MediaItem {
    /// Caption to publish with, empty when the source had none
    pub fn caption_or_empty(&self) -> &str {
        self.caption.as_deref().unwrap_or("")
    }
}

/// Result of resolving an account handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub handle: String,
    /// Total number of posts in the account's collection
    pub post_count: u64,
}

/// An artifact downloaded into the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Normalized item identifier the artifact was staged for
    pub id: String,
    pub path: PathBuf,
    pub created_at: SystemTime,
}

/// Why an iteration ended without publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Account missing or has no posts
    NotFound,
    /// Remote platform asked us to back off
    RateLimited,
    AlreadyReposted,
    /// Sampling failed for a reason other than rate limiting
    FetchFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "no post found"),
            SkipReason::RateLimited => write!(f, "rate limited"),
            SkipReason::AlreadyReposted => write!(f, "already reposted"),
            SkipReason::FetchFailed(detail) => write!(f, "fetch failed: {}", detail),
        }
    }
}

/// Outcome of a single repost attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reposted(String),
    Skipped(SkipReason),
    Failed(String),
}

impl Outcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Outcome::Skipped(SkipReason::RateLimited))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Reposted(id) => write!(f, "reposted {}", id),
            Outcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            Outcome::Failed(error) => write!(f, "failed ({})", error),
        }
    }
}
