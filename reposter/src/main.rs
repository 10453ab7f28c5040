//! reposter - Random repost daemon
//!
//! Periodically picks a random post from a source account and republishes
//! it to a target account, never reposting the same item twice.

use anyhow::{bail, Context};
use clap::Parser;
use libreposter::logging::{LogFormat, LoggingConfig};
use libreposter::platforms::instagram::InstagramClient;
use libreposter::platforms::Platform;
use libreposter::{
    ArtifactStager, Config, DuplicateLedger, JsonFileStore, MediaSampler, PollLoop,
    RepostError, RepostOrchestrator,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "reposter")]
#[command(version)]
#[command(about = "Repost a random post from one account to another")]
#[command(long_about = "\
reposter - Random repost daemon

DESCRIPTION:
    reposter logs in to the target account, then repeatedly picks one
    random post from the source account and republishes its image and
    caption. Reposted ids are remembered across restarts so the same
    post is never published twice.

USAGE:
    # Run in foreground (logs to stderr and the log file)
    reposter

    # Check every 10 minutes instead of the configured interval
    reposter --interval 600

    # Use a specific configuration file
    reposter --config ./config.toml

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current attempt)

CONFIGURATION:
    Configuration file: ~/.config/reposter/config.toml
    Reposted ids:       ~/.local/share/reposter/reposted_ids.json

    source_username = \"natgeo\"
    target_username = \"my_mirror\"
    target_password = \"...\"
    check_interval = 3000   # seconds between attempts

    A template is written on first run if the file does not exist.

EXIT CODES:
    0 - Clean shutdown
    1 - Configuration or login error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "REPOSTER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between repost attempts (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Console log format: text, json or pretty
    #[arg(long, env = "REPOSTER_LOG_FORMAT", value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Run a single attempt and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<RepostError>()
            .map(RepostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let logging = logging_config(&cli);

    // The log file location comes from the config, so config problems are
    // reported on the console only
    let config = {
        let _console = logging.init_console_scoped();
        load_config(&cli).inspect_err(|e| error!("Fatal error: {:#}", e))?
    };

    let log_file = config.storage.log_file();
    let _log_guard = logging
        .with_log_file(&log_file)
        .init()
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    // Keep the file writer alive until the failure is recorded
    serve(&cli, config)
        .await
        .inspect_err(|e| error!("Fatal error: {:#}", e))
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    if cli.interval == Some(0) {
        bail!("--interval must be at least 1 second");
    }
    Ok(config)
}

async fn serve(cli: &Cli, config: Config) -> anyhow::Result<()> {
    info!("reposter starting");
    let check_interval = cli.interval.unwrap_or(config.check_interval);

    // Local state first so a broken ledger fails before any remote call
    let ledger = DuplicateLedger::load(JsonFileStore::new(config.storage.ledger_path()))?;
    info!("Loaded {} previously reposted ids", ledger.len());

    let stager = ArtifactStager::with_http(config.storage.staging_dir())?;
    let orchestrator = RepostOrchestrator::new(MediaSampler::new(), ledger, stager);

    let mut session = InstagramClient::new()?;
    let password = SecretString::from(config.target_password.clone());
    info!("Logging in as {}", config.target_username);
    session
        .authenticate(&config.target_username, &password)
        .await
        .with_context(|| format!("Login failed for {}", config.target_username))?;
    info!("Successfully logged in as {}", config.target_username);

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let mut poll = PollLoop::new(
        Box::new(session),
        orchestrator,
        config.source_username.clone(),
        Duration::from_secs(check_interval),
    )
    .with_shutdown(shutdown)
    .with_retention(Duration::from_secs(config.storage.retention_secs));

    if cli.once {
        poll = poll.with_max_iterations(1);
    }

    poll.run().await;

    if let Err(e) = poll.orchestrator().stager().clear() {
        warn!("Failed to clear staging directory: {}", e);
    }

    info!("reposter stopped");
    Ok(())
}

/// Logging settings from the environment with CLI overrides applied
fn logging_config(cli: &Cli) -> LoggingConfig {
    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}
