use anyhow::Context;
use clap::Parser;
use nf_core::{AppConfig, SharedClock, SystemClock};
use nf_sources::logging::init_logging;
use nf_sources::{handle_command, IngestCommands, ReqwestHttpClient, Runtime};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| "Duration is too large".to_string())?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // a trailing bare number counts as seconds
        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| "Duration is too large".to_string())?;
            has_unit = true;
        }

        if !has_unit || total_seconds == 0 {
            return Err("Duration must be a positive number".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "nf",
    author,
    version,
    about = "Resilient multi-source news ingestion",
    long_about = None
)]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(long, global = true)]
    config: Option<String>,
    /// Article storage backend: memory or sqlite
    #[arg(long, global = true)]
    storage: Option<String>,
    /// SQLite database file
    #[arg(long, global = true)]
    db_path: Option<String>,
    /// Shared state backend for circuit and rate limit state: memory or redis
    #[arg(long, global = true)]
    state: Option<String>,
    #[arg(long, global = true)]
    state_url: Option<String>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch all configured sources once, or periodically with --interval
    Fetch {
        #[arg(long)]
        min_sources: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Repeat on this interval (e.g. 1h, 30m, 1d, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    /// List configured sources and their circuit state
    Sources,
    /// Print the newest stored articles
    Latest {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(storage) = &self.storage {
            config.storage.backend = storage.clone();
        }
        if let Some(path) = &self.db_path {
            config.storage.path = path.clone();
        }
        if let Some(state) = &self.state {
            config.state.backend = state.clone();
        }
        if let Some(url) = &self.state_url {
            config.state.url = Some(url.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

async fn build_runtime(config: AppConfig) -> anyhow::Result<Runtime> {
    let clock: SharedClock = Arc::new(SystemClock);

    let storage = nf_storage::create_storage(&config.storage)
        .await
        .context("failed to open article storage")?;
    info!("🏦 Storage backend initialized (using {})", config.storage.backend);

    let state = nf_storage::create_state_store(&config.state, clock.clone())
        .await
        .context("failed to open state store")?;
    info!("🔌 State store initialized (using {})", config.state.backend);

    let http = Arc::new(ReqwestHttpClient::new(&config.ingestion.user_agent)?);

    Ok(Runtime {
        config,
        storage,
        state,
        http,
        clock,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    init_logging(&config.logging.level);

    let runtime = build_runtime(config).await?;

    match cli.command {
        Commands::Fetch {
            min_sources,
            concurrency,
            interval,
        } => {
            let command = IngestCommands::Fetch {
                min_sources,
                concurrency,
            };

            if let Some(interval) = interval {
                info!("Running in periodic mode with {}s interval", interval.0.as_secs());
                loop {
                    info!("Starting ingestion cycle");
                    if let Err(e) = handle_command(command.clone(), &runtime).await {
                        if e.is_systemic() {
                            return Err(e.into());
                        }
                        error!("Error during ingestion: {}", e);
                    }
                    info!("Waiting {}s before next run", interval.0.as_secs());
                    tokio::time::sleep(interval.0).await;
                }
            } else {
                handle_command(command, &runtime).await?;
            }
        }
        Commands::Sources => handle_command(IngestCommands::Sources, &runtime).await?,
        Commands::Latest { limit } => {
            handle_command(IngestCommands::Latest { limit }, &runtime).await?
        }
    }

    Ok(())
}
