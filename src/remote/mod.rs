//! Remote mount API
//!
//! The [`OrbitApi`] trait is the collaborator contract the scanners, the
//! transaction tracker and the workspace selector consume. Backends:
//! - [`OrbitClient`] over HTTP - requires `http` feature
//! - [`InMemoryOrbit`] in-process tree for tests and offline runs
//!
//! Every call answers with the HTTP status and a decoded body. Transport
//! failures (connection loss, interrupted chunked transfer, undecodable
//! bodies) are reported separately as [`TransportError`].

#[cfg(feature = "http")]
mod http;
mod memory;

#[cfg(feature = "http")]
pub use http::{OrbitClient, OrbitClientConfig};
pub use memory::{InMemoryOrbit, ListingFault, RecordedSubmission};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::types::{Mount, Organization, SyncDirection};

/// Failure below the HTTP status level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("chunked transfer interrupted: {0}")]
    ChunkedEncoding(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        SyncError::Api(e.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<ApiResponse<T>, TransportError>;

/// Status code plus decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: T,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16, body: T) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `GET /orgs` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgListing {
    #[serde(default)]
    pub groups: Vec<Organization>,
}

/// `GET /orgs/{group}/mounts` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MountListing {
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

/// Kind of a remote listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    File,
    Directory,
    /// Anything else the API reports; synced like a plain file
    #[serde(other)]
    Other,
}

/// One entry of a remote folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// `GET /orgs/{group}/mounts/{mount}/files` body
///
/// `files` is optional so a response without it can be told apart from an
/// empty folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<RemoteEntry>>,
}

/// One file of a transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSource {
    pub filepath: String,
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
}

/// Destination folder of a transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub path: String,
}

/// Body of `POST /orgs/{group}/mounts/{mount}/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub direction: SyncDirection,
    pub sources: Vec<SyncSource>,
    pub target: SyncTarget,
}

/// Remote mount API consumed by the core
#[async_trait]
pub trait OrbitApi: Send + Sync {
    /// List organizations visible to the caller
    async fn list_orgs(&self) -> ApiResult<OrgListing>;

    /// List mounts of an organization
    async fn list_mounts(&self, group_id: &str) -> ApiResult<MountListing>;

    /// List the immediate entries of a remote folder
    async fn list_remote_files(
        &self,
        group_id: &str,
        mount_id: &str,
        path: &str,
    ) -> ApiResult<FileListing>;

    /// Ask the remote service to perform a transfer
    async fn submit_sync_transaction(
        &self,
        group_id: &str,
        mount_id: &str,
        payload: &SyncPayload,
    ) -> ApiResult<serde_json::Value>;
}

/// Await a remote call, giving up on cancellation or when `timeout` elapses
pub async fn guarded<F, T>(
    cancel: &CancellationToken,
    timeout: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = T>,
{
    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| SyncError::Timeout(limit)),
            None => Ok(call.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = bounded => result,
    }
}
