use crate::bucket::SnapshotFilename;
use crate::error::{AppError, Result};
use crate::fsutil::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info};

/**
 * Persisted record of the last successfully ingested snapshot
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshState {
    #[serde(rename = "file")]
    pub last_file: SnapshotFilename,
    #[serde(with = "timestamp")]
    pub last_update: OffsetDateTime,
}

// Written as RFC 3339; read back from any ISO-8601-like shape, offset-less values taken as UTC
mod timestamp {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(raw.trim()).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {raw:?}")))
    }

    pub(super) fn parse(raw: &str) -> Option<OffsetDateTime> {
        if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
            return Some(value);
        }
        let local_formats = [
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ];
        local_formats
            .iter()
            .find_map(|format| PrimitiveDateTime::parse(raw, *format).ok())
            .map(PrimitiveDateTime::assume_utc)
    }
}

/**
 * Reads and writes the refresh-state record as a whole JSON document.
 * Callers serialize access; the store itself takes no lock.
 */
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<RefreshState> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::ConfigMissing(self.path.clone()));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let state = serde_json::from_slice::<RefreshState>(&content).map_err(|e| {
            AppError::ConfigCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!("Loaded refresh state: file={}", state.last_file);
        Ok(state)
    }

    pub async fn write(&self, state: &RefreshState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| AppError::Persist {
            path: self.path.clone(),
            source: e.into(),
        })?;

        write_atomic(&self.path, &json).await?;
        info!("Refresh state saved: file={}", state.last_file);
        Ok(())
    }
}

/**
 * Decides whether the expected snapshot differs from the last one ingested
 */
#[derive(Debug, Clone)]
pub struct StalenessGate {
    store: StateStore,
    refresh_when_missing: bool,
}

impl StalenessGate {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            refresh_when_missing: false,
        }
    }

    // Treat an absent state record as "never refreshed" rather than an error
    pub fn refresh_when_missing(mut self, enabled: bool) -> Self {
        self.refresh_when_missing = enabled;
        self
    }

    pub async fn needs_refresh(&self, candidate: &SnapshotFilename) -> Result<bool> {
        let state = match self.store.read().await {
            Ok(state) => state,
            Err(AppError::ConfigMissing(path)) if self.refresh_when_missing => {
                info!("No refresh state at {}, treating as stale", path.display());
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        Ok(state.last_file != *candidate)
    }
}
