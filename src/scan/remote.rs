//! Recursive, depth-bounded remote folder scanning
//!
//! Every folder level costs one listing round trip, so the scan stops at
//! `max_depth`: folders below it are never queried and count as absent on
//! the remote side. Sibling folders are listed concurrently, with at most
//! `concurrency` listing calls in flight. Sub-scans own disjoint folder
//! keys, so their models are merged without conflict handling.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{ListingFailure, Result, SyncError};
use crate::model::{is_eligible, DirectoryModel};
use crate::paths;
use crate::remote::{guarded, OrbitApi, RemoteEntry};
use crate::types::WorkspaceContext;

/// Lists a remote mount folder tree into a [`DirectoryModel`]
pub struct RemoteScanner<'a, A: OrbitApi + ?Sized> {
    api: &'a A,
    context: &'a WorkspaceContext,
    remote_root: String,
    max_depth: usize,
    permits: Arc<Semaphore>,
    request_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<'a, A: OrbitApi + ?Sized> RemoteScanner<'a, A> {
    pub fn new(
        api: &'a A,
        context: &'a WorkspaceContext,
        remote_root: impl Into<String>,
        max_depth: usize,
    ) -> Self {
        Self {
            api,
            context,
            remote_root: remote_root.into(),
            max_depth,
            permits: Arc::new(Semaphore::new(1)),
            request_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Allow up to `limit` listing calls in flight
    ///
    /// Clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS)));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan from the remote root
    ///
    /// The first failing listing aborts the whole scan; no partial model is
    /// returned.
    pub async fn scan(&self) -> Result<DirectoryModel> {
        let model = self.scan_folder(paths::ROOT.to_string()).await?;
        tracing::debug!(
            "Remote scan of {}: {} files in {} folders",
            self.remote_root,
            model.file_count(),
            model.len()
        );
        Ok(model)
    }

    fn scan_folder(&self, relative: String) -> BoxFuture<'_, Result<DirectoryModel>> {
        async move {
            let relative = paths::normalize_relative(&relative);

            if paths::depth(&relative) > self.max_depth {
                return Ok(DirectoryModel::new());
            }

            let remote_path = paths::join(&[self.remote_root.as_str(), relative.as_str()]);
            let entries = self.list(&remote_path).await?;

            let mut model = DirectoryModel::new();
            let mut subfolders = Vec::new();
            for entry in entries {
                if !is_eligible(&entry.name) {
                    continue;
                }
                if entry.is_directory() {
                    subfolders.push(self.scan_folder(paths::child(&relative, &entry.name)));
                } else {
                    model.insert_file(relative.clone(), entry.name);
                }
            }

            for submodel in try_join_all(subfolders).await? {
                model.merge(submodel);
            }
            Ok(model)
        }
        .boxed()
    }

    async fn list(&self, remote_path: &str) -> Result<Vec<RemoteEntry>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SyncError::Internal("Listing semaphore closed".to_string()))?;

        tracing::debug!("Getting remote file listing for {}", remote_path);
        let call = self.api.list_remote_files(
            self.context.group_id(),
            self.context.mount_id(),
            remote_path,
        );
        let response = guarded(&self.cancel, self.request_timeout, call)
            .await?
            .map_err(|e| {
                SyncError::remote_listing(remote_path, ListingFailure::Transport(e.to_string()))
            })?;

        if !response.is_success() {
            return Err(SyncError::remote_listing(
                remote_path,
                ListingFailure::Status(response.status),
            ));
        }

        response
            .body
            .files
            .ok_or_else(|| SyncError::remote_listing(remote_path, ListingFailure::MissingFiles))
    }
}
