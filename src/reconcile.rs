//! Scan, diff and submit cycles for one workspace

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::diff::{diff, ModelDiff};
use crate::error::{Result, SyncError};
use crate::remote::{guarded, OrbitApi};
use crate::scan::{LocalScanner, RemoteScanner};
use crate::transaction::{RecordStats, SubmissionOutcome, TransactionRecord, TransactionTracker};
use crate::types::{SyncConfig, WorkspaceContext};

/// What one reconciliation cycle found and requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub workspace: String,
    pub diff: ModelDiff,
    pub uploads: Vec<SubmissionOutcome>,
    pub downloads: Vec<SubmissionOutcome>,
    pub record: RecordStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    /// Requests actually sent this cycle
    pub fn submitted(&self) -> usize {
        self.uploads
            .iter()
            .chain(self.downloads.iter())
            .filter(|o| o.status.was_sent())
            .count()
    }
}

/// Reconciles a local root against a remote mount folder
pub struct Reconciler<A: OrbitApi + ?Sized> {
    api: Arc<A>,
    context: WorkspaceContext,
    config: SyncConfig,
    tracker: TransactionTracker<A>,
}

impl<A: OrbitApi + ?Sized> Reconciler<A> {
    /// Fails if the local root cannot be resolved
    pub fn new(api: Arc<A>, context: WorkspaceContext, mut config: SyncConfig) -> Result<Self> {
        let local_root = std::fs::canonicalize(&config.local_root).map_err(|e| {
            SyncError::Config(format!(
                "Cannot resolve local root {:?}: {}",
                config.local_root, e
            ))
        })?;
        config.local_root = local_root;

        let record = Arc::new(TransactionRecord::new(config.transactions.clone()));
        let tracker = TransactionTracker::new(
            api.clone(),
            context.clone(),
            config.local_root.clone(),
            config.remote_root.clone(),
            record,
        )
        .with_request_timeout(config.request_timeout());

        Ok(Self {
            api,
            context,
            config,
            tracker,
        })
    }

    pub fn context(&self) -> &WorkspaceContext {
        &self.context
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_root(&self) -> &Path {
        &self.config.local_root
    }

    pub fn record(&self) -> &Arc<TransactionRecord> {
        self.tracker.record()
    }

    /// Scan both sides concurrently and diff them
    pub async fn analyze(&self, cancel: &CancellationToken) -> Result<ModelDiff> {
        let scanner = LocalScanner::new(self.config.local_root.clone());
        let local = async {
            let task = tokio::task::spawn_blocking(move || scanner.scan());
            guarded(cancel, None, task)
                .await?
                .map_err(|e| SyncError::Internal(format!("Local scan task failed: {}", e)))?
        };

        let remote_scanner = RemoteScanner::new(
            self.api.as_ref(),
            &self.context,
            self.config.remote_root.clone(),
            self.config.max_depth,
        )
        .with_concurrency(self.config.scan_concurrency)
        .with_request_timeout(self.config.request_timeout())
        .with_cancellation(cancel.clone());

        let (local, remote) = tokio::try_join!(local, remote_scanner.scan())?;
        tracing::debug!("Local model: {:?}", local);
        tracing::debug!("Remote model: {:?}", remote);

        Ok(diff(&local, &remote))
    }

    /// One full cycle: analyze, then submit uploads and downloads
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport> {
        let started_at = Utc::now();

        let purged = self.record().remove_expired();
        if purged > 0 {
            tracing::debug!("Purged {} expired transaction keys", purged);
        }

        let diff = self.analyze(cancel).await?;
        if diff.is_in_sync() {
            tracing::info!("{} is in sync", self.context);
        }

        let (uploads, downloads) = self.tracker.submit_all(&diff, cancel).await?;
        let report = CycleReport {
            workspace: self.context.to_string(),
            diff,
            uploads,
            downloads,
            record: self.record().stats(),
            started_at,
            completed_at: Utc::now(),
        };

        tracing::info!(
            "Cycle done: {} file(s) to upload, {} to download, {} request(s) sent",
            report.diff.local_only.file_count(),
            report.diff.remote_only.file_count(),
            report.submitted()
        );
        Ok(report)
    }

    /// Run cycles every `interval` until `cancel` fires
    ///
    /// A failed cycle is logged and the next one runs on schedule. A zero
    /// interval is rejected with [`SyncError::Config`].
    pub async fn run_every<F>(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
        mut on_report: F,
    ) -> Result<()>
    where
        F: FnMut(&CycleReport),
    {
        if interval.is_zero() {
            return Err(SyncError::Config(
                "Sync interval must be greater than zero".to_string(),
            ));
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle(cancel).await {
                Ok(report) => on_report(&report),
                Err(SyncError::Cancelled) => break,
                Err(e) => tracing::error!("Sync cycle failed: {}", e),
            }
        }

        tracing::info!("Stopped syncing {}", self.context);
        Ok(())
    }
}
