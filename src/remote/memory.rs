//! In-process mount API backed by an in-memory tree
//!
//! Records every listing and submission call and supports fault injection,
//! which makes it the backend of choice for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ApiResponse, ApiResult, EntryType, FileListing, MountListing, OrbitApi, OrgListing,
    RemoteEntry, SyncPayload, TransportError,
};
use crate::paths;
use crate::types::{Mount, Organization};

/// Injected failure for a listing path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingFault {
    /// Answer with this status and no body
    Status(u16),
    /// Answer 200 without a `files` field
    MissingFiles,
    /// Fail as if the chunked response was cut off
    Chunked,
}

/// A submission as the API received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub group_id: String,
    pub mount_id: String,
    pub payload: SyncPayload,
}

/// In-memory remote mount
pub struct InMemoryOrbit {
    orgs: Vec<Organization>,
    mounts: HashMap<String, Vec<Mount>>,
    /// Absolute folder path → entry name → type
    tree: Mutex<BTreeMap<String, BTreeMap<String, EntryType>>>,
    faults: Mutex<HashMap<String, ListingFault>>,
    submit_status: Mutex<Option<u16>>,
    listing_calls: Mutex<Vec<String>>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    listing_delay: Option<Duration>,
    submit_delay: Option<Duration>,
    listings_in_flight: AtomicUsize,
    peak_listings: AtomicUsize,
}

impl Default for InMemoryOrbit {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrbit {
    /// Empty mount tree with only the root folder
    pub fn new() -> Self {
        let mut tree = BTreeMap::new();
        tree.insert(paths::ROOT.to_string(), BTreeMap::new());
        Self {
            orgs: Vec::new(),
            mounts: HashMap::new(),
            tree: Mutex::new(tree),
            faults: Mutex::new(HashMap::new()),
            submit_status: Mutex::new(Some(200)),
            listing_calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            listing_delay: None,
            submit_delay: None,
            listings_in_flight: AtomicUsize::new(0),
            peak_listings: AtomicUsize::new(0),
        }
    }

    /// Register an organization and one of its mounts
    pub fn with_workspace(mut self, org: Organization, mount: Mount) -> Self {
        if !self.orgs.iter().any(|o| o.id == org.id) {
            self.orgs.push(org.clone());
        }
        self.mounts.entry(org.id).or_default().push(mount);
        self
    }

    /// Add a file (and its parent folders) at an absolute remote path
    pub fn with_file(self, path: &str) -> Self {
        self.add_entry(path, EntryType::File);
        self
    }

    /// Add an empty folder (and its parents) at an absolute remote path
    pub fn with_directory(self, path: &str) -> Self {
        self.add_entry(path, EntryType::Directory);
        self
    }

    /// Make listing `path` fail
    pub fn with_listing_fault(self, path: &str, fault: ListingFault) -> Self {
        self.faults
            .lock()
            .insert(paths::join(&[path]), fault);
        self
    }

    /// Make every listing call take `delay` before answering
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }

    /// Make every submission take `delay` before answering
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Status answered to submissions; `None` makes them fail in transport
    pub fn set_submit_status(&self, status: Option<u16>) {
        *self.submit_status.lock() = status;
    }

    pub fn add_entry(&self, path: &str, entry_type: EntryType) {
        let path = paths::join(&[path]);
        let mut tree = self.tree.lock();
        let mut parent = paths::ROOT.to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            let kind = if is_last {
                entry_type
            } else {
                EntryType::Directory
            };
            tree.entry(parent.clone())
                .or_default()
                .insert(segment.to_string(), kind);
            let current = paths::child(&parent, segment);
            if kind == EntryType::Directory {
                tree.entry(current.clone()).or_default();
            }
            parent = current;
        }
    }

    /// Paths passed to `list_remote_files`, in call order
    pub fn listing_calls(&self) -> Vec<String> {
        self.listing_calls.lock().clone()
    }

    /// Submissions received, in call order
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().clone()
    }

    /// Highest number of listing calls seen running at the same time
    pub fn peak_listings_in_flight(&self) -> usize {
        self.peak_listings.load(Ordering::SeqCst)
    }

    fn known_mount(&self, group_id: &str, mount_id: &str) -> bool {
        // No registered workspaces means any ids are accepted
        self.mounts.is_empty()
            || self
                .mounts
                .get(group_id)
                .is_some_and(|mounts| mounts.iter().any(|m| m.id == mount_id))
    }
}

#[async_trait]
impl OrbitApi for InMemoryOrbit {
    async fn list_orgs(&self) -> ApiResult<OrgListing> {
        Ok(ApiResponse::new(
            200,
            OrgListing {
                groups: self.orgs.clone(),
            },
        ))
    }

    async fn list_mounts(&self, group_id: &str) -> ApiResult<MountListing> {
        match self.mounts.get(group_id) {
            Some(mounts) => Ok(ApiResponse::new(
                200,
                MountListing {
                    mounts: mounts.clone(),
                },
            )),
            None => Ok(ApiResponse::new(404, MountListing::default())),
        }
    }

    async fn list_remote_files(
        &self,
        group_id: &str,
        mount_id: &str,
        path: &str,
    ) -> ApiResult<FileListing> {
        self.listing_calls.lock().push(path.to_string());

        let running = self.listings_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_listings.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }
        self.listings_in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.known_mount(group_id, mount_id) {
            return Ok(ApiResponse::new(404, FileListing::default()));
        }

        let path = paths::join(&[path]);
        if let Some(fault) = self.faults.lock().get(&path).cloned() {
            return match fault {
                ListingFault::Status(status) => Ok(ApiResponse::new(status, FileListing::default())),
                ListingFault::MissingFiles => Ok(ApiResponse::new(200, FileListing::default())),
                ListingFault::Chunked => Err(TransportError::ChunkedEncoding(format!(
                    "connection closed while reading listing of {}",
                    path
                ))),
            };
        }

        let tree = self.tree.lock();
        match tree.get(&path) {
            Some(children) => {
                let files = children
                    .iter()
                    .map(|(name, kind)| RemoteEntry {
                        name: name.clone(),
                        entry_type: *kind,
                    })
                    .collect();
                Ok(ApiResponse::new(200, FileListing { files: Some(files) }))
            }
            None => Ok(ApiResponse::new(404, FileListing::default())),
        }
    }

    async fn submit_sync_transaction(
        &self,
        group_id: &str,
        mount_id: &str,
        payload: &SyncPayload,
    ) -> ApiResult<serde_json::Value> {
        self.submissions.lock().push(RecordedSubmission {
            group_id: group_id.to_string(),
            mount_id: mount_id.to_string(),
            payload: payload.clone(),
        });

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }

        match *self.submit_status.lock() {
            Some(status) => Ok(ApiResponse::new(
                status,
                serde_json::json!({ "accepted": (200..300).contains(&status) }),
            )),
            None => Err(TransportError::Connection(
                "connection reset by peer".to_string(),
            )),
        }
    }
}
