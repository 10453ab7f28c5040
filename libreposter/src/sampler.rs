//! Random media sampling from a source account
//!
//! One sample costs one account lookup plus one offset-indexed fetch, no
//! matter how many posts the account has. The offset is drawn uniformly over
//! the post count returned by the lookup; if the collection changes between
//! the two calls the draw is only approximately uniform.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use crate::error::{PlatformError, RepostError};
use crate::platforms::Platform;
use crate::types::MediaItem;

/// Result of one sampling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Found(MediaItem),
    /// Account unknown or without posts
    NotFound,
    /// Platform asked us to back off; the caller owns the cool-down
    RateLimited,
    /// Any other remote failure, with its detail
    FetchFailed(String),
}

/// Picks one pseudo-random post from an account
pub struct MediaSampler {
    rng: StdRng,
}

impl MediaSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampler for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub async fn sample(&mut self, platform: &dyn Platform, handle: &str) -> Sample {
        let account = match platform.lookup_account(handle).await {
            Ok(account) => account,
            Err(e) => return classify_failure(e, handle),
        };

        if account.post_count == 0 {
            error!("No media found for user: {}", handle);
            return Sample::NotFound;
        }

        let offset = self.rng.gen_range(0..account.post_count);
        info!(
            "Sampling offset {} of {} from {}",
            offset, account.post_count, handle
        );

        match platform.fetch_item_at_offset(&account.id, offset).await {
            Ok(item) => Sample::Found(item),
            Err(RepostError::Platform(PlatformError::NotFound(detail))) => {
                // The account resolved a moment ago, so a missing item means
                // the collection shifted under us
                error!("Failed to fetch media at offset {}: {}", offset, detail);
                Sample::FetchFailed(detail)
            }
            Err(e) => classify_failure(e, handle),
        }
    }
}

impl Default for MediaSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_failure(error: RepostError, handle: &str) -> Sample {
    match error {
        RepostError::Platform(PlatformError::RateLimit(detail)) => {
            warn!("Rate limited while sampling {}: {}", handle, detail);
            Sample::RateLimited
        }
        RepostError::Platform(PlatformError::NotFound(detail)) => {
            error!("Could not find user {}: {}", handle, detail);
            Sample::NotFound
        }
        other => {
            error!("Error fetching media from {}: {}", handle, other);
            Sample::FetchFailed(other.to_string())
        }
    }
}
