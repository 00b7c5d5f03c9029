use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ribcache_core::{RefreshOutcome, RibCache, Settings, Task, TaskOutcome, Updater};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[clap(author, version, about = "Keeps the cached RIB prefix database and AS-name directory current")]
#[clap(propagate_version = true)]
struct Cli {
    /// Settings file (TOML); RIBCACHE_* environment variables override it
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Application base directory, overrides the settings file
    #[clap(long)]
    base_dir: Option<PathBuf>,

    /// Print debug information
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the AS-name listing and rewrite the directory
    FetchAsNames,

    /// Refresh the prefix database from the latest RIB snapshot
    FetchRib {
        /// Refresh even if the expected snapshot was already ingested
        #[clap(short, long)]
        force: bool,
    },

    /// Run a task by its scheduler identifier
    Run {
        /// fetch-as-names or fetch-rib
        task: Task,

        /// Only meaningful for fetch-rib
        #[clap(short, long)]
        force: bool,
    },

    /// Run every task periodically
    Watch {
        #[clap(short, long, default_value_t = 30)]
        interval_minutes: u64,
    },

    /// Show the persisted refresh state
    Status,

    /// Look up the origin AS of an IP address in the cached database
    Lookup { ip: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn report(outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::AsNames { entries } => println!("AS-name directory updated: {} entries", entries),
        TaskOutcome::Rib(RefreshOutcome::UpToDate(file)) => println!("Up to date: {}", file),
        TaskOutcome::Rib(RefreshOutcome::Refreshed { file, summary }) => println!(
            "Refreshed from {}: {} IPv4 and {} IPv6 prefixes",
            file, summary.prefixes_v4, summary.prefixes_v6
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(base_dir) = cli.base_dir {
        settings.base_dir = base_dir;
    }
    let cache = Arc::new(RibCache::new(settings).context("failed to initialize")?);

    match cli.command {
        Commands::FetchAsNames => report(&cache.run(Task::FetchAsNames, false).await?),
        Commands::FetchRib { force } => report(&cache.run(Task::FetchRib, force).await?),
        Commands::Run { task, force } => report(&cache.run(task, force).await?),
        Commands::Watch { interval_minutes } => {
            let handle = Updater::new(cache.clone(), interval_minutes)?.spawn();
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            handle.abort();
        }
        Commands::Status => {
            let state = cache.state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Lookup { ip } => {
            let found = cache.lookup(&ip).await?;
            if found.announced {
                let origins: Vec<String> = found.origin_asns.iter().map(|a| a.to_string()).collect();
                println!(
                    "{}\t{}\t{}",
                    found.ip,
                    found.prefix.unwrap_or_default(),
                    origins.join(",")
                );
            } else {
                println!("{}\tnot announced", found.ip);
            }
        }
    }

    Ok(())
}
