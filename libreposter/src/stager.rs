//! Artifact staging: downloaded media waiting to be published
//!
//! Each artifact is a single file named after its item identifier inside
//! the staging directory. Files leave the directory after a successful
//! publish, when they outlive the retention window, or when the whole
//! directory is cleared at shutdown.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::error::StageError;
use crate::types::StagedArtifact;

type StageResult<T> = std::result::Result<T, StageError>;

/// Browser identification sent with media downloads
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/91.0.4472.124 Safari/537.36";

/// Fetches remote bytes into a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body at `url` to `dest`, returning the number of bytes
    async fn download(&self, url: &str, dest: &Path) -> StageResult<u64>;
}

/// `reqwest` downloader that streams the body chunk by chunk
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> StageResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StageError::Network {
                url: String::new(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> StageResult<u64> {
        let network = |e: reqwest::Error| StageError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let io = |source: std::io::Error| StageError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StageError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(io)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(network)? {
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;
        Ok(written)
    }
}

/// Canned responses keyed by URL, for tests
///
/// Unknown URLs answer 404. Clones share the recorded request list.
#[derive(Debug, Clone, Default)]
pub struct MockDownloader {
    responses: HashMap<String, std::result::Result<Vec<u8>, u16>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_vec()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(&self, url: &str, dest: &Path) -> StageResult<u64> {
        self.requests.lock().unwrap().push(url.to_string());

        match self.responses.get(url) {
            Some(Ok(body)) => {
                tokio::fs::write(dest, body)
                    .await
                    .map_err(|source| StageError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                Ok(body.len() as u64)
            }
            Some(Err(status)) => Err(StageError::Http {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(StageError::Http {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Owner of the staging directory
pub struct ArtifactStager {
    dir: PathBuf,
    downloader: Box<dyn Downloader>,
}

impl ArtifactStager {
    pub fn new(dir: impl Into<PathBuf>, downloader: impl Downloader + 'static) -> Self {
        Self {
            dir: dir.into(),
            downloader: Box::new(downloader),
        }
    }

    /// Stager backed by [`HttpDownloader`]
    pub fn with_http(dir: impl Into<PathBuf>) -> StageResult<Self> {
        Ok(Self::new(dir, HttpDownloader::new()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an artifact for `id` is stored at
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", file_stem(id)))
    }

    /// Download `url` into the staging directory under `id`
    ///
    /// On failure nothing is left behind for this id.
    pub async fn stage(&self, url: &str, id: &str) -> StageResult<StagedArtifact> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StageError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.artifact_path(id);
        info!("Downloading image from: {}", url);

        match self.downloader.download(url, &path).await {
            Ok(bytes) => {
                debug!("Staged {} bytes at {}", bytes, path.display());
                Ok(StagedArtifact {
                    id: id.to_string(),
                    path,
                    created_at: SystemTime::now(),
                })
            }
            Err(e) => {
                error!("Failed to download image: {}", e);
                if let Err(cleanup) = remove_if_present(&path).await {
                    warn!("Could not remove partial download {}: {}", path.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    /// Remove one artifact after it has been published
    pub async fn discard(&self, artifact: &StagedArtifact) -> StageResult<()> {
        remove_if_present(&artifact.path)
            .await
            .map_err(|source| StageError::Io {
                path: artifact.path.clone(),
                source,
            })
    }

    /// Delete staged files older than `retention`
    pub async fn purge_expired(&self, retention: Duration) -> StageResult<usize> {
        self.purge_expired_at(SystemTime::now(), retention).await
    }

    /// Delete staged files whose age at `now` is strictly greater than
    /// `retention`, returning how many were removed
    pub async fn purge_expired_at(&self, now: SystemTime, retention: Duration) -> StageResult<usize> {
        let io = |path: &Path, source: std::io::Error| StageError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io(&self.dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io(&self.dir, e))? {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| io(&path, e))?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().map_err(|e| io(&path, e))?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > retention {
                remove_if_present(&path).await.map_err(|e| io(&path, e))?;
                info!(
                    "Cleaned up old image: {}",
                    entry.file_name().to_string_lossy()
                );
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Remove the whole staging directory
    pub fn clear(&self) -> StageResult<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StageError::Io {
                path: self.dir.clone(),
                source,
            }),
        }
    }
}

/// File-name-safe form of an identifier
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(86_400);

    fn backdate(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn stager(temp_dir: &TempDir, downloader: MockDownloader) -> ArtifactStager {
        ArtifactStager::new(temp_dir.path().join("staging"), downloader)
    }

    #[tokio::test]
    async fn test_stage_writes_file_named_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new().with_body("https://cdn/100.jpg", b"jpeg");
        let stager = stager(&temp_dir, downloader);

        let artifact = stager.stage("https://cdn/100.jpg", "100").await.unwrap();
        assert_eq!(artifact.id, "100");
        assert_eq!(artifact.path, stager.dir().join("100.jpg"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_stage_non_success_status_fails_and_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new().with_status("https://cdn/100.jpg", 403);
        let stager = stager(&temp_dir, downloader);

        let err = stager.stage("https://cdn/100.jpg", "100").await.unwrap_err();
        assert!(matches!(err, StageError::Http { status: 403, .. }));
        assert!(!stager.artifact_path("100").exists());
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let stager = stager(&temp_dir, MockDownloader::new());
        std::fs::create_dir_all(stager.dir()).unwrap();
        std::fs::write(stager.artifact_path("100"), b"partial").unwrap();

        assert!(stager.stage("https://cdn/missing.jpg", "100").await.is_err());
        assert!(!stager.artifact_path("100").exists());
    }

    #[tokio::test]
    async fn test_discard_removes_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new().with_body("u", b"x");
        let stager = stager(&temp_dir, downloader);

        let artifact = stager.stage("u", "100").await.unwrap();
        stager.discard(&artifact).await.unwrap();
        assert!(!artifact.path.exists());

        // Second discard is a no-op
        stager.discard(&artifact).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired_respects_retention_window() {
        let temp_dir = TempDir::new().unwrap();
        let stager = stager(&temp_dir, MockDownloader::new());
        std::fs::create_dir_all(stager.dir()).unwrap();

        let stale = stager.artifact_path("stale");
        let fresh = stager.artifact_path("fresh");
        let almost = stager.artifact_path("almost");
        for path in [&stale, &fresh, &almost] {
            std::fs::write(path, b"x").unwrap();
        }
        backdate(&stale, DAY + Duration::from_secs(3600));
        backdate(&almost, DAY - Duration::from_secs(3600));

        let removed = stager.purge_expired(DAY).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(almost.exists());
    }

    #[tokio::test]
    async fn test_purge_boundary_is_strict() {
        let temp_dir = TempDir::new().unwrap();
        let stager = stager(&temp_dir, MockDownloader::new());
        std::fs::create_dir_all(stager.dir()).unwrap();

        let path = stager.artifact_path("edge");
        std::fs::write(&path, b"x").unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let removed = stager.purge_expired_at(modified + DAY, DAY).await.unwrap();
        assert_eq!(removed, 0);
        assert!(path.exists());

        let removed = stager
            .purge_expired_at(modified + DAY + Duration::from_secs(1), DAY)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_purge_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let stager = stager(&temp_dir, MockDownloader::new());

        assert_eq!(stager.purge_expired(DAY).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new().with_body("a", b"1").with_body("b", b"2");
        let stager = stager(&temp_dir, downloader);

        stager.stage("a", "1").await.unwrap();
        stager.stage("b", "2").await.unwrap();
        stager.clear().unwrap();
        assert!(!stager.dir().exists());

        // Clearing an absent directory is fine
        stager.clear().unwrap();
    }

    #[test]
    fn test_file_stem_sanitizes_separators() {
        assert_eq!(file_stem("3141592653589793_25025320"), "3141592653589793_25025320");
        assert_eq!(file_stem("../../etc/passwd"), "______etc_passwd");
    }
}
