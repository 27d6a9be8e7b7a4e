//! Folder-granular presence diff between two directory models
//!
//! This is a presence diff: a filename that exists on both sides is in sync
//! regardless of size, modification time or content.

use serde::{Deserialize, Serialize};

use crate::model::{DiffResult, DirectoryModel};
use crate::types::SyncDirection;

/// Both directions of a local/remote comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDiff {
    /// Present locally, missing remotely (upload set)
    pub local_only: DiffResult,
    /// Present remotely, missing locally (download set)
    pub remote_only: DiffResult,
}

impl ModelDiff {
    /// The transfer set for one direction
    pub fn for_direction(&self, direction: SyncDirection) -> &DiffResult {
        match direction {
            SyncDirection::Up => &self.local_only,
            SyncDirection::Down => &self.remote_only,
        }
    }

    pub fn is_in_sync(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty()
    }
}

/// Files of `source` that `target` lacks, per folder
pub fn diff_one_way(source: &DirectoryModel, target: &DirectoryModel) -> DiffResult {
    let mut unique = DiffResult::new();
    for (folder, files) in source.iter() {
        let missing: Vec<String> = match target.files(folder) {
            Some(existing) => files
                .iter()
                .filter(|name| !existing.contains(*name))
                .cloned()
                .collect(),
            None => files.iter().cloned().collect(),
        };
        unique.insert(folder, missing);
    }
    unique
}

/// Compare a local and a remote model in both directions
pub fn diff(local: &DirectoryModel, remote: &DirectoryModel) -> ModelDiff {
    ModelDiff {
        local_only: diff_one_way(local, remote),
        remote_only: diff_one_way(remote, local),
    }
}
