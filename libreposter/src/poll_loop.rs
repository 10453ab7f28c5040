//! Long-running driver that repeats repost attempts
//!
//! Each iteration runs the orchestrator once, purges stale staged files, and
//! then sleeps. The sleep is the configured check interval, or the fixed
//! cool-down after a rate limit or an unexpected failure. Sleeps are sliced
//! into one-second steps so a shutdown request is noticed promptly.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_RETENTION_SECS;
use crate::orchestrator::RepostOrchestrator;
use crate::platforms::Platform;
use crate::types::Outcome;

/// Wait applied after a rate limit or an unexpected failure
pub const COOLDOWN: Duration = Duration::from_secs(300);

const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct PollLoop {
    session: Box<dyn Platform>,
    orchestrator: RepostOrchestrator,
    source: String,
    check_interval: Duration,
    cooldown: Duration,
    retention: Duration,
    shutdown: Arc<AtomicBool>,
    max_iterations: Option<u64>,
}

impl PollLoop {
    pub fn new(
        session: Box<dyn Platform>,
        orchestrator: RepostOrchestrator,
        source: impl Into<String>,
        check_interval: Duration,
    ) -> Self {
        Self {
            session,
            orchestrator,
            source: source.into(),
            check_interval,
            cooldown: COOLDOWN,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            shutdown: Arc::new(AtomicBool::new(false)),
            max_iterations: None,
        }
    }

    /// Share a shutdown flag with the signal handler
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Age past which staged files are purged
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Stop after `n` iterations (used by `--once`)
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn orchestrator(&self) -> &RepostOrchestrator {
        &self.orchestrator
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run until shutdown is requested or the iteration cap is reached
    ///
    /// Returns the number of iterations completed.
    pub async fn run(&mut self) -> u64 {
        info!(
            "Watching {} on {}, checking every {}",
            self.source,
            self.session.name(),
            humantime::format_duration(self.check_interval)
        );

        let mut iterations = 0;
        while !self.shutdown_requested() {
            let delay = self.run_iteration().await;
            iterations += 1;

            if self.max_iterations.is_some_and(|max| iterations >= max) {
                debug!("Reached iteration limit of {}", iterations);
                break;
            }

            match next_check_time(delay) {
                Some(at) => info!(
                    "Waiting {} before next check (at {})...",
                    humantime::format_duration(delay),
                    at
                ),
                None => info!(
                    "Waiting {} before next check...",
                    humantime::format_duration(delay)
                ),
            }
            if !self.sleep(delay).await {
                break;
            }
        }

        if self.shutdown_requested() {
            info!("Shutdown requested, stopping after {} iterations", iterations);
        }
        iterations
    }

    /// One attempt plus housekeeping; returns how long to wait afterwards
    ///
    /// Never fails: errors and panics from the attempt are logged and
    /// turned into the cool-down delay.
    pub async fn run_iteration(&mut self) -> Duration {
        let attempt = self
            .orchestrator
            .run_once(self.session.as_ref(), &self.source);

        let delay = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(outcome)) => self.report(&outcome),
            Ok(Err(e)) => {
                error!("Unexpected error in main loop: {:?}", e);
                self.cooldown
            }
            Err(panic) => {
                error!("Unexpected panic in main loop: {}", panic_message(&*panic));
                self.cooldown
            }
        };

        match self.orchestrator.stager().purge_expired(self.retention).await {
            Ok(0) => {}
            Ok(n) => debug!("Purged {} expired staged files", n),
            Err(e) => warn!("Failed to purge staging directory: {}", e),
        }

        delay
    }

    fn report(&self, outcome: &Outcome) -> Duration {
        match outcome {
            Outcome::Reposted(id) => info!("Reposted {} to {}", id, self.session.name()),
            Outcome::Skipped(reason) if outcome.is_rate_limited() => {
                warn!(
                    "Skipped ({}), cooling down for {}",
                    reason,
                    humantime::format_duration(self.cooldown)
                );
                return self.cooldown;
            }
            Outcome::Skipped(reason) => info!("Skipped: {}", reason),
            Outcome::Failed(detail) => warn!("Repost failed: {}", detail),
        }
        self.check_interval
    }

    /// Sleep in short slices; returns false if shutdown was requested
    async fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.shutdown_requested() {
                return false;
            }
            let step = remaining.min(SLEEP_SLICE);
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        !self.shutdown_requested()
    }
}

/// Wall-clock time `delay` from now, `None` when it is past chrono's range
fn next_check_time(delay: Duration) -> Option<String> {
    let delay = chrono::Duration::from_std(delay).ok()?;
    let at = chrono::Local::now().checked_add_signed(delay)?;
    Some(at.format("%H:%M:%S").to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
