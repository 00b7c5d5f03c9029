use crate::bucket::{SnapshotFilename, SnapshotRequest, TimeBucket};
use crate::error::Result;
use crate::fetcher::SnapshotFetcher;
use crate::ingestor::{IngestSummary, SnapshotIngestor};
use crate::state::{RefreshState, StalenessGate, StateStore};
use time::OffsetDateTime;
use tracing::{error, info};

/**
 * Result of one pipeline invocation
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    // The expected snapshot is already ingested; nothing was touched
    UpToDate(SnapshotFilename),
    Refreshed {
        file: SnapshotFilename,
        summary: IngestSummary,
    },
}

/**
 * Check, fetch, ingest, commit.
 *
 * The refresh state is written only after ingestion succeeded, so a failed
 * run leaves it pointing at the last snapshot that was fully ingested.
 */
#[derive(Clone)]
pub struct RefreshPipeline {
    rib_base_url: String,
    gate: StalenessGate,
    fetcher: SnapshotFetcher,
    ingestor: SnapshotIngestor,
    state: StateStore,
}

impl RefreshPipeline {
    pub fn new(
        rib_base_url: impl Into<String>,
        gate: StalenessGate,
        fetcher: SnapshotFetcher,
        ingestor: SnapshotIngestor,
        state: StateStore,
    ) -> Self {
        Self {
            rib_base_url: rib_base_url.into(),
            gate,
            fetcher,
            ingestor,
            state,
        }
    }

    pub async fn run(&self, force: bool) -> Result<RefreshOutcome> {
        self.run_at(OffsetDateTime::now_utc(), force).await
    }

    pub async fn run_at(&self, now: OffsetDateTime, force: bool) -> Result<RefreshOutcome> {
        let bucket = TimeBucket::resolve(now);
        let candidate = bucket.filename();

        if !force && !self.gate.needs_refresh(&candidate).await? {
            info!("Snapshot {} already ingested, nothing to do", candidate);
            return Ok(RefreshOutcome::UpToDate(candidate));
        }

        let request = SnapshotRequest::new(&self.rib_base_url, &bucket);
        info!("Downloading the latest RIB: {}", request.url);
        let snapshot = self.fetcher.fetch(&request).await.inspect_err(|e| {
            error!("Fetching {} failed: {}", request.filename, e);
        })?;

        info!("Converting {} to database format", request.filename);
        let summary = self.ingestor.ingest(&snapshot).await.inspect_err(|e| {
            error!("Ingesting {} failed: {}", request.filename, e);
        })?;

        self.state
            .write(&RefreshState {
                last_file: candidate.clone(),
                last_update: OffsetDateTime::now_utc(),
            })
            .await?;

        info!("Refresh complete: {} ({} prefixes)", candidate, summary.prefixes());
        Ok(RefreshOutcome::Refreshed {
            file: candidate,
            summary,
        })
    }
}
