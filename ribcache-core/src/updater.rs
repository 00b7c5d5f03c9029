use crate::error::{AppError, Result};
use crate::{RibCache, Task, TaskOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/**
 * Runs every task on a fixed interval; failures are logged and retried on
 * the next tick
 */
pub struct Updater {
    cache: Arc<RibCache>,
    interval: Duration,
}

impl Updater {
    // Create a new updater; the interval must be at least one minute
    pub fn new(cache: Arc<RibCache>, interval_minutes: u64) -> Result<Self> {
        if interval_minutes == 0 {
            return Err(AppError::Settings(
                "update interval must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            cache,
            interval: Duration::from_secs(interval_minutes.saturating_mul(60)),
        })
    }

    // Start the update loop in the background
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    // Start the update loop (runs forever); the first tick fires immediately
    pub async fn run(self) {
        info!("Updater started (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    // Run each task once
    pub async fn tick(&self) {
        for task in Task::ALL {
            match self.cache.run(task, false).await {
                Ok(TaskOutcome::AsNames { entries }) => {
                    info!("{} finished ({} entries)", task, entries);
                }
                Ok(TaskOutcome::Rib(outcome)) => {
                    info!("{} finished: {:?}", task, outcome);
                }
                Err(AppError::Busy(resource)) => {
                    info!("{} skipped, {} is locked", task, resource);
                }
                Err(e) => {
                    warn!("{} failed: {}", task, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;

    fn cache(dir: &std::path::Path) -> Arc<RibCache> {
        let settings = Settings {
            base_dir: dir.to_path_buf(),
            rib_base_url: "file:///nonexistent/bgpdata".to_string(),
            as_names_url: "file:///nonexistent/autnums.html".to_string(),
            ..Settings::default()
        };
        Arc::new(RibCache::new(settings).unwrap())
    }

    #[test]
    fn test_interval_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        assert!(matches!(
            Updater::new(cache.clone(), 0),
            Err(AppError::Settings(_))
        ));

        let updater = Updater::new(cache, u64::MAX).unwrap();
        assert_eq!(updater.interval, Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_tick_survives_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        Updater::new(cache.clone(), 60).unwrap().tick().await;

        assert!(!cache.paths().as_names.exists());
        assert!(!cache.paths().state.exists());
    }
}
