use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RIB_BASE_URL: &str = "http://archive.routeviews.org/bgpdata";
pub const DEFAULT_AS_NAMES_URL: &str = "http://www.cidr-report.org/as2.0/autnums.html";

const ENV_PREFIX: &str = "RIBCACHE";

/**
 * Runtime settings, handed to every component at construction time
 */
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application base directory; every artifact lives below `<base_dir>/resources`
    pub base_dir: PathBuf,

    /// Archive root the RIB snapshots are published under
    pub rib_base_url: String,

    /// AS-name directory document
    pub as_names_url: String,

    /// Per-request timeout for every download
    pub http_timeout_secs: u64,

    /// Treat a missing refresh-state record as stale instead of failing
    pub refresh_when_state_missing: bool,

    /// Lock files older than this are considered abandoned
    pub lock_stale_after_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data"),
            rib_base_url: DEFAULT_RIB_BASE_URL.to_string(),
            as_names_url: DEFAULT_AS_NAMES_URL.to_string(),
            http_timeout_secs: 300,
            refresh_when_state_missing: false,
            lock_stale_after_secs: 6 * 60 * 60,
        }
    }
}

impl Settings {
    // Layer an optional TOML file and RIBCACHE_* environment variables over the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(p) = path {
            if !p.exists() {
                return Err(AppError::Settings(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            debug!("Reading settings from {}", p.display());
            builder = builder.add_source(config::File::from(p));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Settings(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(AppError::Settings(
                "http_timeout_secs must be greater than 0".to_string(),
            ));
        }
        for url in [&self.rib_base_url, &self.as_names_url] {
            if url.trim().is_empty() {
                return Err(AppError::Settings("download URLs must not be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    pub fn paths(&self) -> Paths {
        Paths::new(&self.base_dir)
    }
}

/**
 * Fixed filesystem layout below the application base directory
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub ribs_dir: PathBuf,
    pub database: PathBuf,
    pub state: PathBuf,
    pub as_names: PathBuf,
    pub locks_dir: PathBuf,
}

impl Paths {
    pub fn new(base_dir: &Path) -> Self {
        let resources = base_dir.join("resources");
        Self {
            ribs_dir: resources.join("ribs"),
            database: resources.join("current"),
            state: resources.join("config.json"),
            as_names: resources.join("as_names.json"),
            locks_dir: resources.join("locks"),
        }
    }
}
