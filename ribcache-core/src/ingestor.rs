use crate::database::PrefixDatabase;
use crate::error::{AppError, Result};
use crate::fsutil::write_atomic;
use crate::parser::RibParser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/**
 * Summary of one ingestion run
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub prefixes_v4: usize,
    pub prefixes_v6: usize,
    pub without_origin: usize,
}

impl IngestSummary {
    pub fn prefixes(&self) -> usize {
        self.prefixes_v4 + self.prefixes_v6
    }
}

/**
 * Turns a downloaded snapshot into the prefix database at a fixed path
 */
#[derive(Clone)]
pub struct SnapshotIngestor {
    parser: Arc<dyn RibParser>,
    database_path: PathBuf,
}

impl SnapshotIngestor {
    pub fn new(parser: Arc<dyn RibParser>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            parser,
            database_path: database_path.into(),
        }
    }

    pub async fn ingest(&self, snapshot: &Path) -> Result<IngestSummary> {
        let parser = self.parser.clone();
        let path = snapshot.to_path_buf();

        // MRT decoding is CPU bound and blocking
        let records = tokio::task::spawn_blocking(move || parser.parse(&path, true))
            .await
            .map_err(|e| AppError::Parse(format!("parser task failed: {}", e)))??;

        let (database, stats) = PrefixDatabase::from_records(records);
        debug!(
            "{} records collapsed into {} prefixes ({} duplicates)",
            stats.records,
            database.len(),
            stats.duplicates
        );
        if stats.without_origin > 0 {
            warn!("{} records carried no origin AS", stats.without_origin);
        }
        if database.is_empty() {
            warn!("Snapshot {} produced an empty prefix database", snapshot.display());
        }

        let text = database.render(&snapshot.display().to_string(), OffsetDateTime::now_utc());
        write_atomic(&self.database_path, text.as_bytes()).await?;

        let summary = IngestSummary {
            prefixes_v4: database.v4_count(),
            prefixes_v6: database.v6_count(),
            without_origin: stats.without_origin,
        };
        info!(
            "Prefix database written to {} ({} IPv4, {} IPv6 prefixes)",
            self.database_path.display(),
            summary.prefixes_v4,
            summary.prefixes_v6
        );
        Ok(summary)
    }
}
