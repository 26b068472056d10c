mod backend;
mod cache;
mod config;
mod console;
mod engine;
mod notifications;
mod types;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backend::HttpBackend;
use cache::StatusCache;
use config::{ConsoleSettings, LoadOutcome};
use console::{render_config, ConsoleSession};
use engine::{CommandReport, FleetCommand};

#[derive(Parser)]
#[command(name = "fleet-console")]
#[command(version = "0.1.0")]
#[command(about = "Operator console for a fleet of per-symbol trading bots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Console settings file
    #[arg(short, long, default_value = "console.toml")]
    settings: PathBuf,

    /// Override the backend base URL
    #[arg(long)]
    backend_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Live status table, refreshed on every poll until Ctrl+C
    Watch {
        /// Poll interval in seconds (overrides settings)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Poll once and print the status table
    Status,
    /// Show or edit the fleet configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start every bot in the fleet
    Start,
    /// Shut the fleet down
    Shutdown,
    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective console settings
    Settings,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Apply `key=value` edits and save them to the backend
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    match cli.command {
        Commands::Init { force } => {
            write_default_settings(&cli.settings, force)?;
        }
        Commands::Settings => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            print!("{}", settings.to_toml()?);
        }
        Commands::Watch { interval } => {
            let mut settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            if let Some(secs) = interval {
                if secs == 0 {
                    bail!("--interval must be > 0");
                }
                settings.poll_interval_secs = secs;
            }
            run_watch(&settings).await?;
        }
        Commands::Status => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            let session = open_session(&settings)?;
            session.poll_and_seed().await;
            print_status(&session).await;
        }
        Commands::Config { action: ConfigAction::Show } => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            let session = open_session(&settings)?;
            if let LoadOutcome::Defaulted(e) = session.config.load().await {
                warn!("Showing defaults: {}", e);
            }
            print!("{}", render_config(&session.config.form().await));
        }
        Commands::Config { action: ConfigAction::Set { assignments } } => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            run_config_set(&settings, &assignments).await?;
        }
        Commands::Start => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            run_command(&settings, FleetCommand::Start).await?;
        }
        Commands::Shutdown => {
            let settings = load_settings(&cli.settings, cli.backend_url.as_deref())?;
            run_command(&settings, FleetCommand::Shutdown).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

fn load_settings(path: &Path, backend_url: Option<&str>) -> Result<ConsoleSettings> {
    let mut settings = ConsoleSettings::load(path)?;
    if let Some(url) = backend_url {
        settings.backend_url = url.to_string();
        settings
            .validate()
            .map_err(|errors| anyhow!("invalid console settings: {}", errors.join(", ")))?;
    }
    Ok(settings)
}

fn write_default_settings(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, ConsoleSettings::default().to_toml()?)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn open_session(settings: &ConsoleSettings) -> Result<ConsoleSession> {
    let api = HttpBackend::new(&settings.backend_url, settings.request_timeout())?;
    let cache = StatusCache::open(&settings.cache_path);
    Ok(ConsoleSession::new(Arc::new(api), cache, settings))
}

async fn print_status(session: &ConsoleSession) {
    print!("{}", session.status_screen().await);
}

async fn run_watch(settings: &ConsoleSettings) -> Result<()> {
    info!("Fleet console v0.1.0 watching {}", settings.backend_url);
    let session = open_session(settings)?;

    // Cached data is shown before the first network round trip.
    print_status(&session).await;

    session.initialize().await;
    redraw(&session.status_screen().await);

    let events = session.poller.subscribe();
    let poll_handle = session.poller.spawn(settings.poll_interval());
    session.watch(events, tokio::signal::ctrl_c(), redraw).await;

    drop(poll_handle);
    Ok(())
}

fn redraw(screen: &str) {
    print!("\x1B[2J\x1B[H{}", screen);
}

async fn run_config_set(settings: &ConsoleSettings, assignments: &[String]) -> Result<()> {
    let session = open_session(settings)?;
    if let LoadOutcome::Defaulted(e) = session.config.load().await {
        bail!("Refusing to save over a configuration that could not be read: {}", e);
    }

    let report = session.config.apply_assignments(assignments).await;
    for rejection in &report.rejected {
        eprintln!("Skipped: {}", rejection);
    }
    if report.applied.is_empty() {
        bail!("No assignment could be applied; nothing saved");
    }
    for field in &report.applied {
        info!(%field, "Edited");
    }

    let outcome = session.config.save().await;
    print!("{}", render_config(&session.config.form().await));
    if outcome.success {
        println!("{}", outcome.message);
        Ok(())
    } else {
        bail!("Save failed: {}", outcome.message)
    }
}

async fn run_command(settings: &ConsoleSettings, command: FleetCommand) -> Result<()> {
    let session = open_session(settings)?;
    session.poll_and_seed().await;
    if !session.fleet.is_seeded() {
        bail!("Cannot {}: the fleet state could not be read from the backend", command);
    }

    let report: CommandReport = match command {
        FleetCommand::Start => session.fleet.start().await?,
        FleetCommand::Shutdown => session.fleet.shutdown().await?,
    };

    println!("{} -> fleet is {}", report.message, report.belief);
    if report.success {
        Ok(())
    } else {
        bail!("{} failed", report.command)
    }
}
