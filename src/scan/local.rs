//! Local folder scanning

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::model::DirectoryModel;
use crate::paths;

/// Walks a local root and collects eligible files per relative folder
pub struct LocalScanner {
    root: PathBuf,
}

impl LocalScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree below the root
    ///
    /// Fails if the root itself cannot be read. Unreadable folders further
    /// down are skipped with a warning. Symlinks are not followed.
    pub fn scan(&self) -> Result<DirectoryModel> {
        // Surface a missing or unreadable root instead of an empty model
        std::fs::read_dir(&self.root)?;

        let mut model = DirectoryModel::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SyncError::LocalScan {
                        root: self.root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable path under {:?}: {}", self.root, e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }
            // A symlink to a folder is listed as a folder, not descended into
            if entry.path_is_symlink() && entry.path().is_dir() {
                continue;
            }

            let Some(parent) = entry.path().parent() else {
                continue;
            };
            let Some(folder) = paths::relative_key(&self.root, parent) else {
                continue;
            };
            model.insert_file(folder, entry.file_name().to_string_lossy().into_owned());
        }

        tracing::debug!(
            "Local scan of {:?}: {} files in {} folders",
            self.root,
            model.file_count(),
            model.len()
        );
        Ok(model)
    }
}
