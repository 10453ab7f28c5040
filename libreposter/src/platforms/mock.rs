//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate
//! accounts, rate limits, fetch failures and publish failures without network
//! access. All counters live behind `Arc<Mutex<_>>` so a clone of the mock
//! kept by a test observes calls made through the one handed to the loop.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{AccountInfo, MediaItem};

/// A publish the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPhoto {
    pub path: PathBuf,
    pub caption: String,
    /// Bytes of the staged file at publish time
    pub bytes: Vec<u8>,
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Password accepted by `authenticate`; `None` accepts anything
    pub password: Option<String>,

    /// Posts per account handle, newest first
    pub accounts: HashMap<String, Vec<MediaItem>>,

    /// Reported post count override (simulates a collection that shrank)
    pub reported_count: Option<u64>,

    /// Error returned from every lookup
    pub lookup_error: Option<PlatformError>,

    /// Error returned from every offset fetch
    pub fetch_error: Option<PlatformError>,

    /// Error returned from every publish
    pub publish_error: Option<PlatformError>,

    pub auth_call_count: Arc<Mutex<usize>>,
    pub lookup_call_count: Arc<Mutex<usize>>,
    pub fetch_call_count: Arc<Mutex<usize>>,
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Offsets requested from `fetch_item_at_offset`, in call order
    pub fetched_offsets: Arc<Mutex<Vec<u64>>>,

    pub published: Arc<Mutex<Vec<PublishedPhoto>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            password: None,
            accounts: HashMap::new(),
            reported_count: None,
            lookup_error: None,
            fetch_error: None,
            publish_error: None,
            auth_call_count: Arc::new(Mutex::new(0)),
            lookup_call_count: Arc::new(Mutex::new(0)),
            fetch_call_count: Arc::new(Mutex::new(0)),
            publish_call_count: Arc::new(Mutex::new(0)),
            fetched_offsets: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
    authenticated: bool,
}

/// Build a media item with a predictable URL
pub fn media_item(id: &str, caption: Option<&str>) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        content_url: format!("https://cdn.mock/{}.jpg", id),
        caption: caption.map(str::to_string),
        offset: 0,
    }
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Create an authenticated mock serving one account
    pub fn with_account(handle: &str, posts: Vec<MediaItem>) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(handle.to_string(), posts);
        let mut platform = Self::new(MockConfig {
            accounts,
            ..Default::default()
        });
        platform.authenticated = true;
        platform
    }

    /// Create a mock that rejects every password except `password`
    pub fn requiring_password(password: &str) -> Self {
        Self::new(MockConfig {
            password: Some(password.to_string()),
            ..Default::default()
        })
    }

    pub fn with_reported_count(mut self, count: u64) -> Self {
        self.config.reported_count = Some(count);
        self
    }

    pub fn with_lookup_error(mut self, error: PlatformError) -> Self {
        self.config.lookup_error = Some(error);
        self
    }

    pub fn with_fetch_error(mut self, error: PlatformError) -> Self {
        self.config.fetch_error = Some(error);
        self
    }

    pub fn with_publish_error(mut self, error: PlatformError) -> Self {
        self.config.publish_error = Some(error);
        self
    }

    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    pub fn lookup_call_count(&self) -> usize {
        *self.config.lookup_call_count.lock().unwrap()
    }

    pub fn fetch_call_count(&self) -> usize {
        *self.config.fetch_call_count.lock().unwrap()
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn fetched_offsets(&self) -> Vec<u64> {
        self.config.fetched_offsets.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<PublishedPhoto> {
        self.config.published.lock().unwrap().clone()
    }

    fn account_id(handle: &str) -> String {
        format!("id-{}", handle)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn authenticate(&mut self, username: &str, password: &SecretString) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;

        if let Some(expected) = &self.config.password {
            if password.expose_secret() != expected.as_str() {
                return Err(PlatformError::Authentication(format!(
                    "The password you entered for {} is incorrect",
                    username
                ))
                .into());
            }
        }

        self.authenticated = true;
        Ok(())
    }

    async fn lookup_account(&self, handle: &str) -> Result<AccountInfo> {
        *self.config.lookup_call_count.lock().unwrap() += 1;

        if let Some(error) = &self.config.lookup_error {
            return Err(error.clone().into());
        }

        let posts = self
            .config
            .accounts
            .get(handle)
            .ok_or_else(|| PlatformError::NotFound(format!("User not found: {}", handle)))?;

        Ok(AccountInfo {
            id: Self::account_id(handle),
            handle: handle.to_string(),
            post_count: self.config.reported_count.unwrap_or(posts.len() as u64),
        })
    }

    async fn fetch_item_at_offset(&self, account_id: &str, offset: u64) -> Result<MediaItem> {
        *self.config.fetch_call_count.lock().unwrap() += 1;
        self.config.fetched_offsets.lock().unwrap().push(offset);

        if let Some(error) = &self.config.fetch_error {
            return Err(error.clone().into());
        }

        let posts = self
            .config
            .accounts
            .iter()
            .find(|(handle, _)| Self::account_id(handle) == account_id)
            .map(|(_, posts)| posts)
            .ok_or_else(|| PlatformError::NotFound(format!("Unknown account id {}", account_id)))?;

        let mut item = posts
            .get(offset as usize)
            .cloned()
            .ok_or_else(|| PlatformError::Fetch(format!("No media at offset {}", offset)))?;
        item.offset = offset;
        Ok(item)
    }

    async fn publish_photo(&self, path: &Path, caption: &str) -> Result<String> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone().into());
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PlatformError::Posting(format!("Cannot read {}: {}", path.display(), e))
        })?;

        self.config.published.lock().unwrap().push(PublishedPhoto {
            path: path.to_path_buf(),
            caption: caption.to_string(),
            bytes,
        });

        Ok(format!("{}:media-{}", self.config.name, uuid::Uuid::new_v4()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}
