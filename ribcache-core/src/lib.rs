pub mod asnames;
pub mod bucket;
pub mod database;
pub mod error;
pub mod fetcher;
pub mod fsutil;
pub mod ingestor;
pub mod lock;
pub mod parser;
pub mod pipeline;
pub mod settings;
pub mod state;
pub mod store;
pub mod updater;

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

pub use asnames::{AsNameDirectory, AsNameDirectoryBuilder};
pub use bucket::{SnapshotFilename, SnapshotRequest, TimeBucket};
pub use database::{Origin, PrefixDatabase};
pub use error::{AppError, Result};
pub use fetcher::{Downloader, SnapshotFetcher};
pub use ingestor::{IngestSummary, SnapshotIngestor};
pub use lock::ResourceLock;
pub use parser::{BgpkitRibParser, PrefixRecord, RibParser};
pub use pipeline::{RefreshOutcome, RefreshPipeline};
pub use settings::{Paths, Settings};
pub use state::{RefreshState, StalenessGate, StateStore};
pub use store::PrefixStore;
pub use updater::Updater;

/**
 * Operations a scheduler can trigger, by stable identifier
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    FetchAsNames,
    FetchRib,
}

impl Task {
    pub const ALL: [Task; 2] = [Task::FetchAsNames, Task::FetchRib];

    pub fn id(&self) -> &'static str {
        match self {
            Task::FetchAsNames => "fetch-as-names",
            Task::FetchRib => "fetch-rib",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.id() == s)
            .ok_or_else(|| format!("unknown task: {}", s))
    }
}

/**
 * What a triggered task did
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    AsNames { entries: usize },
    Rib(RefreshOutcome),
}

// Result of a prefix lookup against the cached database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    pub ip: String,
    pub announced: bool,
    pub prefix: Option<String>,
    pub origin_asns: Vec<u32>,
}

/**
 * Entry point wiring every component from one set of settings
 */
pub struct RibCache {
    settings: Settings,
    paths: Paths,
    pipeline: RefreshPipeline,
    directory: AsNameDirectoryBuilder,
    state: StateStore,
}

impl RibCache {
    // Create an instance parsing snapshots with bgpkit-parser
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_parser(settings, Arc::new(BgpkitRibParser))
    }

    pub fn with_parser(settings: Settings, parser: Arc<dyn RibParser>) -> Result<Self> {
        settings.validate()?;
        let paths = settings.paths();
        let downloader = Downloader::new(settings.http_timeout())?;

        let state = StateStore::new(&paths.state);
        let gate = StalenessGate::new(state.clone())
            .refresh_when_missing(settings.refresh_when_state_missing);
        let pipeline = RefreshPipeline::new(
            settings.rib_base_url.clone(),
            gate,
            SnapshotFetcher::new(downloader.clone(), &paths.ribs_dir),
            SnapshotIngestor::new(parser, &paths.database),
            state.clone(),
        );
        let directory =
            AsNameDirectoryBuilder::new(downloader, settings.as_names_url.clone(), &paths.as_names);

        info!("ribcache initialized: base_dir={}", settings.base_dir.display());
        Ok(Self {
            settings,
            paths,
            pipeline,
            directory,
            state,
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    fn lock(&self, name: &str) -> Result<ResourceLock> {
        ResourceLock::acquire(&self.paths.locks_dir, name, self.settings.lock_stale_after())
    }

    // fetch-as-names
    pub async fn fetch_as_names(&self) -> Result<AsNameDirectory> {
        let _guard = self.lock(lock::AS_DIRECTORY_LOCK)?;
        self.directory.build().await
    }

    // fetch-rib
    pub async fn fetch_rib(&self, force: bool) -> Result<RefreshOutcome> {
        let _guard = self.lock(lock::RIB_LOCK)?;
        self.pipeline.run(force).await
    }

    pub async fn fetch_rib_at(&self, now: OffsetDateTime, force: bool) -> Result<RefreshOutcome> {
        let _guard = self.lock(lock::RIB_LOCK)?;
        self.pipeline.run_at(now, force).await
    }

    // `force` only applies to fetch-rib
    pub async fn run(&self, task: Task, force: bool) -> Result<TaskOutcome> {
        info!("Running task {}", task);
        match task {
            Task::FetchAsNames => {
                let directory = self.fetch_as_names().await?;
                Ok(TaskOutcome::AsNames {
                    entries: directory.len(),
                })
            }
            Task::FetchRib => self.fetch_rib(force).await.map(TaskOutcome::Rib),
        }
    }

    pub async fn state(&self) -> Result<RefreshState> {
        self.state.read().await
    }

    /**
     * Look up an IP address in the cached prefix database
     * @param ip - IP address to look up (IPv4 or IPv6)
     */
    pub async fn lookup(&self, ip: &str) -> Result<PrefixMatch> {
        let parsed_ip = ip
            .parse::<IpAddr>()
            .map_err(|_| AppError::InvalidIp(ip.to_string()))?;

        let store = PrefixStore::load(&self.paths.database).await?;

        Ok(match store.lookup(parsed_ip) {
            Some((prefix, origin)) => PrefixMatch {
                ip: ip.to_string(),
                announced: true,
                prefix: Some(prefix.to_string()),
                origin_asns: origin.asns(),
            },
            None => PrefixMatch {
                ip: ip.to_string(),
                announced: false,
                prefix: None,
                origin_asns: vec![],
            },
        })
    }
}
