//! Reposter - republish random posts from one account to another
//!
//! This library provides the sampling, deduplication, staging and polling
//! machinery behind the `reposter` binary. Remote platforms are reached
//! through the [`platforms::Platform`] trait.

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod poll_loop;
pub mod sampler;
pub mod stager;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{RepostError, Result};
pub use ledger::{DuplicateLedger, JsonFileStore, LedgerStore};
pub use orchestrator::RepostOrchestrator;
pub use poll_loop::PollLoop;
pub use sampler::MediaSampler;
pub use stager::ArtifactStager;
pub use types::{MediaItem, Outcome, SkipReason, StagedArtifact};
