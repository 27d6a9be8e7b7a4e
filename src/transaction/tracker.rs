//! Turns diff results into transfer requests
//!
//! One request per folder: every file of the folder becomes a source, the
//! counterpart folder on the other side is the target. Requests whose
//! (folder, file set) is already in flight are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{FailurePolicy, Reservation, TransactionKey, TransactionRecord};
use crate::diff::ModelDiff;
use crate::error::{Result, SyncError};
use crate::model::DiffResult;
use crate::paths;
use crate::remote::{guarded, OrbitApi, SyncPayload, SyncSource, SyncTarget};
use crate::types::{SyncDirection, WorkspaceContext};

/// How a folder's request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// The remote accepted the request (2xx)
    Accepted { status: u16 },
    /// The remote answered with a non-2xx status
    Rejected { status: u16 },
    /// The request never got a status
    TransportFailed { message: String },
    /// An identical request is already recorded; nothing was sent
    AlreadyInFlight,
}

impl SubmissionStatus {
    pub fn was_sent(&self) -> bool {
        !matches!(self, SubmissionStatus::AlreadyInFlight)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Rejected { .. } | SubmissionStatus::TransportFailed { .. }
        )
    }
}

/// Result of submitting one folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub direction: SyncDirection,
    pub folder: String,
    pub files: Vec<String>,
    /// The new transaction, or the one already in flight
    pub transaction_id: Uuid,
    pub status: SubmissionStatus,
}

/// Build the request body for one folder
///
/// `folder` is a relative folder key with or without its leading separator;
/// the root (`"/"`) maps to the roots themselves.
pub fn build_payload(
    direction: SyncDirection,
    local_root: &Path,
    remote_root: &str,
    folder: &str,
    files: &[String],
    transaction_id: Uuid,
) -> SyncPayload {
    let folder = paths::strip_leading_separator(folder);
    let local_folder: PathBuf = paths::local_folder(local_root, folder);
    let remote_folder = paths::join(&[remote_root, folder]);
    let transaction_id = transaction_id.to_string();

    let source_path = |name: &str| -> String {
        match direction {
            SyncDirection::Up => local_folder.join(name).to_string_lossy().into_owned(),
            SyncDirection::Down => paths::join(&[remote_folder.as_str(), name]),
        }
    };
    let sources = files
        .iter()
        .map(|name| SyncSource {
            filepath: source_path(name),
            transaction_id: transaction_id.clone(),
        })
        .collect();

    let target = match direction {
        SyncDirection::Up => remote_folder.clone(),
        SyncDirection::Down => local_folder.to_string_lossy().into_owned(),
    };

    SyncPayload {
        direction,
        sources,
        target: SyncTarget { path: target },
    }
}

/// Submits deduplicated transfer requests for one workspace
pub struct TransactionTracker<A: OrbitApi + ?Sized> {
    api: Arc<A>,
    context: WorkspaceContext,
    local_root: PathBuf,
    remote_root: String,
    record: Arc<TransactionRecord>,
    request_timeout: Option<Duration>,
}

impl<A: OrbitApi + ?Sized> TransactionTracker<A> {
    pub fn new(
        api: Arc<A>,
        context: WorkspaceContext,
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        record: Arc<TransactionRecord>,
    ) -> Self {
        Self {
            api,
            context,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            record,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn record(&self) -> &Arc<TransactionRecord> {
        &self.record
    }

    /// Submit one request per folder of `diff`
    ///
    /// Submission failures are reported in the outcomes, never as errors;
    /// only cancellation aborts the batch.
    pub async fn submit(
        &self,
        direction: SyncDirection,
        diff: &DiffResult,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubmissionOutcome>> {
        let mut outcomes = Vec::with_capacity(diff.len());
        for (folder, files) in diff.iter() {
            if files.is_empty() {
                continue;
            }
            outcomes.push(self.submit_folder(direction, folder, files, cancel).await?);
        }
        Ok(outcomes)
    }

    /// Submit uploads, then downloads
    pub async fn submit_all(
        &self,
        diff: &ModelDiff,
        cancel: &CancellationToken,
    ) -> Result<(Vec<SubmissionOutcome>, Vec<SubmissionOutcome>)> {
        let uploads = self.submit(SyncDirection::Up, &diff.local_only, cancel).await?;
        let downloads = self
            .submit(SyncDirection::Down, &diff.remote_only, cancel)
            .await?;
        Ok((uploads, downloads))
    }

    async fn submit_folder(
        &self,
        direction: SyncDirection,
        folder: &str,
        files: &[String],
        cancel: &CancellationToken,
    ) -> Result<SubmissionOutcome> {
        let key = TransactionKey::new(folder, files);
        let recorded = match self.record.reserve(key.clone(), direction) {
            Reservation::Fresh(recorded) => recorded,
            Reservation::InFlight(existing) => {
                tracing::debug!(
                    "{} - Transaction already requested for {}",
                    existing.transaction_id,
                    key
                );
                return Ok(SubmissionOutcome {
                    direction,
                    folder: folder.to_string(),
                    files: files.to_vec(),
                    transaction_id: existing.transaction_id,
                    status: SubmissionStatus::AlreadyInFlight,
                });
            }
        };
        let transaction_id = recorded.transaction_id;

        let payload = build_payload(
            direction,
            &self.local_root,
            &self.remote_root,
            folder,
            files,
            transaction_id,
        );
        tracing::debug!(
            "{} - {} {} file(s) into {}",
            transaction_id,
            direction,
            payload.sources.len(),
            payload.target.path
        );

        let call = self.api.submit_sync_transaction(
            self.context.group_id(),
            self.context.mount_id(),
            &payload,
        );
        let status = match guarded(cancel, self.request_timeout, call).await {
            Ok(Ok(response)) if response.is_success() => SubmissionStatus::Accepted {
                status: response.status,
            },
            Ok(Ok(response)) => SubmissionStatus::Rejected {
                status: response.status,
            },
            Ok(Err(e)) => SubmissionStatus::TransportFailed {
                message: e.to_string(),
            },
            Err(SyncError::Cancelled) => {
                // Cancelled mid-call: free the key so a later cycle submits again
                self.record.retract(&key, transaction_id);
                return Err(SyncError::Cancelled);
            }
            Err(e) => SubmissionStatus::TransportFailed {
                message: e.to_string(),
            },
        };

        match &status {
            SubmissionStatus::Accepted { status } => {
                tracing::info!("{} - {} requested. Status: {}", transaction_id, direction, status);
            }
            SubmissionStatus::Rejected { status } => {
                tracing::warn!("{} - {} rejected. Status: {}", transaction_id, direction, status);
            }
            SubmissionStatus::TransportFailed { message } => {
                tracing::warn!("{} - {} failed: {}", transaction_id, direction, message);
            }
            SubmissionStatus::AlreadyInFlight => {}
        }

        if status.is_failure() && self.record.config().failure_policy == FailurePolicy::Retract {
            self.record.retract(&key, transaction_id);
        }

        Ok(SubmissionOutcome {
            direction,
            folder: folder.to_string(),
            files: files.to_vec(),
            transaction_id,
            status,
        })
    }
}
