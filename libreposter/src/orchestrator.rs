//! One repost attempt: sample, dedupe, stage, publish, record

use tracing::{error, info, warn};

use crate::error::Result;
use crate::ledger::{normalize_id, DuplicateLedger};
use crate::platforms::Platform;
use crate::sampler::{MediaSampler, Sample};
use crate::stager::ArtifactStager;
use crate::types::{Outcome, SkipReason};

/// Composes the sampler, ledger and stager into a single repost attempt
///
/// The orchestrator owns the ledger and stager for the life of the process.
/// The remote session is passed in per call so the loop keeps ownership of it.
pub struct RepostOrchestrator {
    sampler: MediaSampler,
    ledger: DuplicateLedger,
    stager: ArtifactStager,
}

impl RepostOrchestrator {
    pub fn new(sampler: MediaSampler, ledger: DuplicateLedger, stager: ArtifactStager) -> Self {
        Self {
            sampler,
            ledger,
            stager,
        }
    }

    pub fn ledger(&self) -> &DuplicateLedger {
        &self.ledger
    }

    pub fn stager(&self) -> &ArtifactStager {
        &self.stager
    }

    /// Attempt to repost one random item from `source` through `session`
    ///
    /// Expected failures come back as [`Outcome::Skipped`] or
    /// [`Outcome::Failed`]. `Err` means something outside the remote
    /// workflow broke, such as the ledger failing to persist.
    pub async fn run_once(&mut self, session: &dyn Platform, source: &str) -> Result<Outcome> {
        let item = match self.sampler.sample(session, source).await {
            Sample::Found(item) => item,
            Sample::NotFound => return Ok(Outcome::Skipped(SkipReason::NotFound)),
            Sample::RateLimited => return Ok(Outcome::Skipped(SkipReason::RateLimited)),
            Sample::FetchFailed(detail) => {
                return Ok(Outcome::Skipped(SkipReason::FetchFailed(detail)))
            }
        };

        let id = normalize_id(&item.id);
        if self.ledger.contains(&id) {
            info!("Media {} has already been reposted, skipping...", id);
            return Ok(Outcome::Skipped(SkipReason::AlreadyReposted));
        }

        let artifact = match self.stager.stage(&item.content_url, &id).await {
            Ok(artifact) => artifact,
            Err(_) => return Ok(Outcome::Failed("download failed".to_string())),
        };

        info!("Uploading photo to {}", session.name());
        if let Err(e) = session
            .publish_photo(&artifact.path, item.caption_or_empty())
            .await
        {
            if e.is_rate_limit() {
                warn!("Rate limited while publishing {}: {}", id, e);
                return Ok(Outcome::Skipped(SkipReason::RateLimited));
            }
            error!("Error uploading photo: {}", e);
            return Ok(Outcome::Failed(e.to_string()));
        }

        if let Err(e) = self.stager.discard(&artifact).await {
            warn!("Published {} but could not remove staged file: {}", id, e);
        }

        self.ledger.add(&id)?;
        info!("Successfully reposted media {}", id);
        Ok(Outcome::Reposted(id))
    }
}
