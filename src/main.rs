mod config;
mod error;
mod filter;
mod lease;
mod models;
mod notify;
mod poll_loop;
mod scrapers;
mod store;
mod watcher;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, Stdio};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{append_search_item, Config, DEFAULT_CONFIG_PATH};
use lease::{InstanceLease, InstanceStatus, StopOutcome, DEFAULT_PID_FILE};
use notify::Dispatcher;
use poll_loop::{LoopTiming, PollLoop};
use scrapers::browser::ChromeLauncher;
use scrapers::query::parse_search_url;
use scrapers::traits::BrowserLauncher;
use store::ListingStore;
use watcher::Watcher;

const BACKGROUND_LOG: &str = "logs/background_scraper.log";

#[derive(Parser, Debug)]
#[command(name = "listing-scout", about = "Watch Carousell searches for new listings")]
struct Cli {
    /// Path to the JSON configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Instance marker file
    #[arg(long, global = true, default_value = DEFAULT_PID_FILE)]
    pid_file: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the polling loop in the foreground
    Run,
    /// Start the polling loop as a detached background process
    Start,
    /// Stop the running instance
    Stop,
    /// Report whether an instance is running
    Status,
    /// Save a search copied from the browser address bar
    AddUrl { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Cmd::Run => run(&cli.config, &cli.pid_file).await,
        Cmd::Start => start(&cli.config, &cli.pid_file),
        Cmd::Stop => stop(&cli.pid_file),
        Cmd::Status => status(&cli.pid_file),
        Cmd::AddUrl { ref url } => add_url(&cli.config, url),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &Path, pid_file: &Path) -> Result<()> {
    info!("Carousell listing scout starting");

    let config = Config::load(config_path).context("Error loading configuration")?;
    let lease = InstanceLease::acquire(pid_file)?;

    let dispatcher = Dispatcher::from_credentials(
        config.telegram_bot_token.as_deref(),
        config.telegram_chat_id.as_deref(),
    )
    .await;
    let store = ListingStore::new(config.listings_path.clone(), config.fallback_path());
    let launcher = ChromeLauncher::new(config.render_timeout());
    info!(
        pid = lease.record().pid,
        store = %store.path().display(),
        notifications = dispatcher.channel(),
        browser = launcher.name(),
        searches = config.search_items.len(),
        "Scout ready"
    );

    let timing = LoopTiming {
        poll_interval: config.poll_interval(),
        retry_backoff: config.retry_backoff(),
        liveness_check: config.liveness_check(),
    };
    let watcher = Watcher::new(
        config.search_items,
        config.base_url,
        config.max_listings,
        store,
        dispatcher,
    )?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let stats = PollLoop::new(&watcher, &launcher, &lease, timing)
        .run(&token)
        .await;
    info!(
        iterations = stats.iterations,
        failed = stats.failed_iterations,
        new_listings = stats.new_listings,
        "Scout stopped"
    );
    lease.release();
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Stop requested, finishing current iteration");
    token.cancel();
}

fn start(config_path: &Path, pid_file: &Path) -> Result<()> {
    if let InstanceStatus::Running { record, .. } = lease::status(pid_file)? {
        println!("Scraper is already running (PID {})", record.pid);
        return Ok(());
    }
    // Fail here rather than in the detached process
    Config::load(config_path).context("Error loading configuration")?;

    let log_path = Path::new(BACKGROUND_LOG);
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let mut command = Command::new(exe);
    command
        .arg("--config")
        .arg(config_path)
        .arg("--pid-file")
        .arg(pid_file)
        .arg("run")
        .stdin(Stdio::null())
        .stdout(log.try_clone().context("Failed to duplicate log handle")?)
        .stderr(log);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("Failed to start background scraper")?;
    println!("Scraper started in background with PID {}", child.id());
    println!("Logs: {}", log_path.display());
    Ok(())
}

fn stop(pid_file: &Path) -> Result<()> {
    match lease::stop(pid_file)? {
        StopOutcome::Terminated(pid) => println!("Scraper process {pid} stopped"),
        StopOutcome::StaleCleared(pid) => {
            println!("No process found with PID {pid}, removed stale marker")
        }
        StopOutcome::NotRunning => println!("Scraper is not running"),
    }
    Ok(())
}

fn status(pid_file: &Path) -> Result<()> {
    match lease::status(pid_file)? {
        InstanceStatus::Running {
            record,
            process_name,
        } => {
            print!("Scraper is running (PID {}", record.pid);
            if let Some(name) = process_name {
                print!(", {name}");
            }
            if let Some(started) = record.started_at {
                print!(", started {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!(")");
        }
        InstanceStatus::Stale(record) => println!(
            "Scraper is not running (stale marker for PID {} in {})",
            record.pid,
            pid_file.display()
        ),
        InstanceStatus::NotRunning => println!("Scraper is not running"),
    }
    Ok(())
}

fn add_url(config_path: &Path, url: &str) -> Result<()> {
    let spec = parse_search_url(url);
    append_search_item(config_path, &spec)
        .with_context(|| format!("Failed to update {}", config_path.display()))?;
    println!("Added search: {}", spec.label());
    Ok(())
}
