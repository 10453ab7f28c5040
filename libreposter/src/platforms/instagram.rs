//! Instagram platform implementation
//!
//! Talks to the same JSON endpoints the Instagram web client uses, with a
//! cookie-backed `reqwest` session. Login goes through the web login form;
//! lookups, feed paging and photo uploads go through the `i.instagram.com`
//! API host.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{PlatformError, Result};
use crate::platforms::{classify_remote_error, Operation, Platform};
use crate::types::{AccountInfo, MediaItem};

const WEB_BASE: &str = "https://www.instagram.com";
const API_BASE: &str = "https://i.instagram.com/api/v1";
const UPLOAD_BASE: &str = "https://i.instagram.com/rupload_igphoto";

/// Application id the web client sends on API calls
const WEB_APP_ID: &str = "936619743392459";

/// Items requested per feed page while walking to an offset
const FEED_PAGE_SIZE: u64 = 33;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Instagram session client
///
/// Unauthenticated until [`Platform::authenticate`] succeeds; the cookie jar
/// then carries the session for every later call.
pub struct InstagramClient {
    http: reqwest::Client,
    web_base: String,
    api_base: String,
    upload_base: String,
    csrf_token: Option<String>,
    username: Option<String>,
}

impl InstagramClient {
    /// Create a client against the public Instagram hosts
    pub fn new() -> Result<Self> {
        Self::with_endpoints(WEB_BASE, API_BASE, UPLOAD_BASE)
    }

    /// Create a client against custom hosts (proxies, test servers)
    pub fn with_endpoints(web_base: &str, api_base: &str, upload_base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("X-IG-App-ID", HeaderValue::from_static(WEB_APP_ID));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            web_base: web_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            csrf_token: None,
            username: None,
        })
    }

    /// Username of the logged-in account, if any
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn csrf_token(&self) -> std::result::Result<&str, PlatformError> {
        self.csrf_token
            .as_deref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()))
    }

    async fn fetch_feed_page(
        &self,
        account_id: &str,
        max_id: Option<&str>,
    ) -> std::result::Result<FeedPage, PlatformError> {
        let mut request = self
            .http
            .get(format!("{}/feed/user/{}/", self.api_base, account_id))
            .query(&[("count", FEED_PAGE_SIZE)]);
        if let Some(cursor) = max_id {
            request = request.query(&[("max_id", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(Operation::Fetch, e))?;
        read_json(response, Operation::Fetch).await
    }
}

#[async_trait]
impl Platform for InstagramClient {
    async fn authenticate(&mut self, username: &str, password: &SecretString) -> Result<()> {
        let login_page = format!("{}/accounts/login/", self.web_base);

        let response = self
            .http
            .get(&login_page)
            .send()
            .await
            .map_err(|e| transport_error(Operation::Login, e))?;
        let csrf = csrf_cookie(&response).ok_or_else(|| {
            PlatformError::Authentication("Login page did not issue a csrftoken cookie".to_string())
        })?;

        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            chrono::Utc::now().timestamp(),
            password.expose_secret()
        );
        let form = [
            ("username", username),
            ("enc_password", enc_password.as_str()),
            ("queryParams", "{}"),
            ("optIntoOneTap", "false"),
        ];

        let response = self
            .http
            .post(format!("{}/accounts/login/ajax/", self.web_base))
            .header("X-CSRFToken", csrf.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, login_page.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(Operation::Login, e))?;
        let fresh_csrf = csrf_cookie(&response);
        let login: LoginResponse = read_json(response, Operation::Login).await?;

        if !login.authenticated {
            let reason = login
                .message
                .unwrap_or_else(|| "credentials rejected".to_string());
            return Err(PlatformError::Authentication(format!(
                "Login failed for {}: {}",
                username, reason
            ))
            .into());
        }

        self.csrf_token = Some(fresh_csrf.unwrap_or(csrf));
        self.username = Some(username.to_string());
        info!("Successfully logged in as {}", username);
        Ok(())
    }

    async fn lookup_account(&self, handle: &str) -> Result<AccountInfo> {
        let response = self
            .http
            .get(format!("{}/users/web_profile_info/", self.api_base))
            .query(&[("username", handle)])
            .send()
            .await
            .map_err(|e| transport_error(Operation::Lookup, e))?;
        let profile: ProfileResponse = read_json(response, Operation::Lookup).await?;

        let user = profile
            .data
            .user
            .ok_or_else(|| PlatformError::NotFound(format!("Could not find user: {}", handle)))?;

        Ok(AccountInfo {
            id: user.id.into_string(),
            handle: handle.to_string(),
            post_count: user.edge_owner_to_timeline_media.count,
        })
    }

    /// Walks the paged feed until the page holding `offset`
    ///
    /// The feed endpoint is cursor based with no random access, so this is a
    /// partial walk of the collection: `offset / FEED_PAGE_SIZE + 1` page
    /// requests (see [`feed_pages_for_offset`]). It is still one call from
    /// the sampler's point of view, and only the item at `offset` is
    /// converted and returned.
    async fn fetch_item_at_offset(&self, account_id: &str, offset: u64) -> Result<MediaItem> {
        debug!(
            "Offset {} needs {} feed page requests",
            offset,
            feed_pages_for_offset(offset)
        );
        let mut remaining = offset;
        let mut max_id: Option<String> = None;

        loop {
            let page = self.fetch_feed_page(account_id, max_id.as_deref()).await?;
            let len = page.items.len() as u64;
            debug!(
                "Feed page for {} returned {} items ({} to skip)",
                account_id, len, remaining
            );

            if remaining < len {
                let item = page
                    .items
                    .into_iter()
                    .nth(remaining as usize)
                    .ok_or_else(|| PlatformError::Fetch(format!("No media at offset {}", offset)))?;
                return item.into_media_item(offset).map_err(Into::into);
            }
            remaining -= len;

            match page.next_max_id {
                Some(cursor) if page.more_available && len > 0 => max_id = Some(cursor),
                _ => {
                    return Err(PlatformError::Fetch(format!(
                        "Failed to fetch media at offset {}: collection ended early",
                        offset
                    ))
                    .into())
                }
            }
        }
    }

    async fn publish_photo(&self, path: &Path, caption: &str) -> Result<String> {
        let csrf = self.csrf_token()?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PlatformError::Posting(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let upload_id = chrono::Utc::now().timestamp_millis().to_string();
        let entity_name = format!("{}_0_{}", upload_id, rand::random::<u32>());
        let rupload_params = serde_json::json!({
            "media_type": 1,
            "upload_id": &upload_id,
            "image_compression": r#"{"lib_name":"moz","lib_version":"3.1.m","quality":"80"}"#,
        })
        .to_string();

        let response = self
            .http
            .post(format!("{}/{}", self.upload_base, entity_name))
            .header("X-Instagram-Rupload-Params", rupload_params)
            .header("X-Entity-Name", entity_name.as_str())
            .header("X-Entity-Length", bytes.len().to_string())
            .header("X-Entity-Type", "image/jpeg")
            .header("Offset", "0")
            .header("X-CSRFToken", csrf)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(Operation::Publish, e))?;
        let _: Value = read_json(response, Operation::Publish).await?;

        let form = [
            ("upload_id", upload_id.as_str()),
            ("caption", caption),
            ("source_type", "4"),
        ];
        let response = self
            .http
            .post(format!("{}/media/configure/", self.api_base))
            .header("X-CSRFToken", csrf)
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(Operation::Publish, e))?;
        let configured: ConfigureResponse = read_json(response, Operation::Publish).await?;

        let media = configured.media.ok_or_else(|| {
            PlatformError::Posting("configure call returned no media".to_string())
        })?;
        Ok(media.pk.into_string())
    }

    fn name(&self) -> &str {
        "instagram"
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Identifiers arrive as JSON numbers on some endpoints and strings on others
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RemoteId {
    Text(String),
    Number(u64),
}

impl RemoteId {
    fn into_string(self) -> String {
        match self {
            RemoteId::Text(s) => s,
            RemoteId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    data: ProfileData,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: Option<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    id: RemoteId,
    edge_owner_to_timeline_media: EdgeCount,
}

#[derive(Debug, Deserialize)]
struct EdgeCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    items: Vec<FeedItem>,
    #[serde(default)]
    more_available: bool,
    next_max_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    pk: RemoteId,
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    carousel_media: Vec<CarouselItem>,
    caption: Option<Caption>,
}

#[derive(Debug, Deserialize)]
struct CarouselItem {
    image_versions2: Option<ImageVersions>,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<ImageCandidate>,
}

#[derive(Debug, Deserialize)]
struct ImageCandidate {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Caption {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ConfigureResponse {
    media: Option<ConfiguredMedia>,
}

#[derive(Debug, Deserialize)]
struct ConfiguredMedia {
    pk: RemoteId,
}

impl ImageVersions {
    /// Candidates are ordered largest first
    fn best_url(&self) -> Option<&str> {
        self.candidates.first().map(|c| c.url.as_str())
    }
}

impl FeedItem {
    /// Convert to a [`MediaItem`], using the first carousel image for albums
    /// and the cover frame for videos
    fn into_media_item(self, offset: u64) -> std::result::Result<MediaItem, PlatformError> {
        let id = self.pk.into_string();
        let content_url = self
            .image_versions2
            .as_ref()
            .and_then(ImageVersions::best_url)
            .or_else(|| {
                self.carousel_media
                    .iter()
                    .filter_map(|c| c.image_versions2.as_ref())
                    .find_map(ImageVersions::best_url)
            })
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Fetch(format!("Media {} has no image URL", id)))?;

        Ok(MediaItem {
            id,
            content_url,
            caption: self.caption.map(|c| c.text),
            offset,
        })
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn csrf_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .cookies()
        .find(|c| c.name() == "csrftoken")
        .map(|c| c.value().to_string())
}

fn transport_error(operation: Operation, error: reqwest::Error) -> PlatformError {
    classify_remote_error(
        operation,
        error.status().map(|s| s.as_u16()),
        &error.to_string(),
    )
}

/// Pull the human readable message out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Decode a JSON response, classifying HTTP and `"status": "fail"` errors
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: Operation,
) -> std::result::Result<T, PlatformError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;
    decode_body(operation, status.as_u16(), &body)
}

fn decode_body<T: DeserializeOwned>(
    operation: Operation,
    status: u16,
    body: &str,
) -> std::result::Result<T, PlatformError> {
    if !(200..300).contains(&status) {
        return Err(classify_remote_error(
            operation,
            Some(status),
            &error_message(body),
        ));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        classify_remote_error(operation, Some(status), &format!("unparseable response: {}", e))
    })?;

    if value.get("status").and_then(Value::as_str) == Some("fail") {
        return Err(classify_remote_error(
            operation,
            Some(status),
            &error_message(body),
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        classify_remote_error(operation, Some(status), &format!("unexpected response shape: {}", e))
    })
}

/// Feed page requests needed to reach `offset` when pages are full
pub fn feed_pages_for_offset(offset: u64) -> u64 {
    offset / FEED_PAGE_SIZE + 1
}
