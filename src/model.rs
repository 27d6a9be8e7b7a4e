//! Directory models and diff results
//!
//! A [`DirectoryModel`] is a folder → file-set snapshot of one side of a
//! workspace. A [`DiffResult`] lists, per folder, the files one side has and
//! the other lacks.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Whether a file or folder name takes part in syncing
///
/// Hidden (`.`-prefixed) and temporary (`.tmp`-suffixed) names are ignored
/// on both sides.
pub fn is_eligible(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.ends_with(".tmp")
}

/// Snapshot of one side: relative folder path → eligible filenames
///
/// Folders without eligible files are never present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectoryModel {
    folders: BTreeMap<String, BTreeSet<String>>,
}

impl DirectoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file under `folder`; ineligible names are dropped
    ///
    /// Returns true if the file was added.
    pub fn insert_file(&mut self, folder: impl Into<String>, name: impl Into<String>) -> bool {
        let name = name.into();
        if !is_eligible(&name) {
            return false;
        }
        self.folders.entry(folder.into()).or_default().insert(name)
    }

    /// Union another model into this one
    ///
    /// Sub-scans own disjoint folder keys, so this is normally a plain key
    /// union; overlapping keys have their file sets merged.
    pub fn merge(&mut self, other: DirectoryModel) {
        for (folder, files) in other.folders {
            match self.folders.entry(folder) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(files);
                }
                btree_map::Entry::Occupied(mut slot) => {
                    slot.get_mut().extend(files);
                }
            }
        }
    }

    pub fn files(&self, folder: &str) -> Option<&BTreeSet<String>> {
        self.folders.get(folder)
    }

    pub fn contains_folder(&self, folder: &str) -> bool {
        self.folders.contains_key(folder)
    }

    pub fn contains_file(&self, folder: &str, name: &str) -> bool {
        self.folders
            .get(folder)
            .is_some_and(|files| files.contains(name))
    }

    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.folders.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.folders.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of folders with at least one file
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Total number of files across all folders
    pub fn file_count(&self) -> usize {
        self.folders.values().map(BTreeSet::len).sum()
    }
}

impl<F, I, N> FromIterator<(F, I)> for DirectoryModel
where
    F: Into<String>,
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (F, I)>>(iter: T) -> Self {
        let mut model = DirectoryModel::new();
        for (folder, names) in iter {
            let folder = folder.into();
            for name in names {
                model.insert_file(folder.clone(), name);
            }
        }
        model
    }
}

// Decoding goes through `insert_file` so hidden names and empty folders are dropped
impl<'de> Deserialize<'de> for DirectoryModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let folders = BTreeMap::<String, BTreeSet<String>>::deserialize(deserializer)?;
        Ok(folders.into_iter().collect())
    }
}

/// Folder → files present on the source side but missing on the target side
///
/// Never holds a folder with an empty file list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffResult {
    folders: BTreeMap<String, Vec<String>>,
}

impl DiffResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a folder entry; an empty file list is ignored
    pub fn insert(&mut self, folder: impl Into<String>, files: Vec<String>) {
        if !files.is_empty() {
            self.folders.insert(folder.into(), files);
        }
    }

    pub fn get(&self, folder: &str) -> Option<&[String]> {
        self.folders.get(folder).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.folders
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.folders.values().map(Vec::len).sum()
    }
}

impl<F, I, N> FromIterator<(F, I)> for DiffResult
where
    F: Into<String>,
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (F, I)>>(iter: T) -> Self {
        let mut result = DiffResult::new();
        for (folder, names) in iter {
            result.insert(folder, names.into_iter().map(Into::into).collect());
        }
        result
    }
}

impl<'de> Deserialize<'de> for DiffResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let folders = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
        Ok(folders.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility() {
        assert!(is_eligible("keep.txt"));
        assert!(is_eligible("tmp.txt"));
        assert!(!is_eligible(".hidden"));
        assert!(!is_eligible("a.tmp"));
        assert!(!is_eligible(""));
    }

    #[test]
    fn test_insert_filters_names() {
        let mut model = DirectoryModel::new();
        assert!(!model.insert_file("/", ".hidden"));
        assert!(!model.insert_file("/", "a.tmp"));
        assert!(model.insert_file("/", "keep.txt"));
        assert!(!model.insert_file("/", "keep.txt"));

        assert_eq!(model.len(), 1);
        assert_eq!(
            model.files("/").unwrap().iter().collect::<Vec<_>>(),
            vec!["keep.txt"]
        );
    }

    #[test]
    fn test_folder_with_only_ineligible_files_is_absent() {
        let model: DirectoryModel = [("/sub", vec![".DS_Store", "x.tmp"])]
            .into_iter()
            .collect();
        assert!(model.is_empty());
        assert!(!model.contains_folder("/sub"));
    }

    #[test]
    fn test_merge_is_key_union() {
        let mut a: DirectoryModel = [("/", vec!["a.txt"])].into_iter().collect();
        let b: DirectoryModel = [("/sub", vec!["b.txt"]), ("/", vec!["c.txt"])]
            .into_iter()
            .collect();
        a.merge(b);

        assert_eq!(a.len(), 2);
        assert_eq!(a.file_count(), 3);
        assert!(a.contains_file("/", "a.txt"));
        assert!(a.contains_file("/", "c.txt"));
        assert!(a.contains_file("/sub", "b.txt"));
    }

    #[test]
    fn test_diff_result_drops_empty_lists() {
        let mut diff = DiffResult::new();
        diff.insert("/", vec![]);
        diff.insert("/sub", vec!["x.txt".to_string()]);
        assert_eq!(diff.len(), 1);
        assert!(diff.get("/").is_none());
        assert_eq!(diff.get("/sub"), Some(&["x.txt".to_string()][..]));
    }

    #[test]
    fn test_model_serializes_as_plain_map() {
        let model: DirectoryModel = [("/", vec!["b.txt", "a.txt"])].into_iter().collect();
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#"{"/":["a.txt","b.txt"]}"#);
    }

    #[test]
    fn test_model_decoding_filters_names() {
        let model: DirectoryModel =
            serde_json::from_str(r#"{"/sub": [], "/": [".hidden", "a.txt", "b.tmp"]}"#).unwrap();
        assert_eq!(model.len(), 1);
        assert!(!model.contains_folder("/sub"));
        assert_eq!(model.files("/").map(BTreeSet::len), Some(1));
        assert!(model.contains_file("/", "a.txt"));

        let hidden_only: DirectoryModel = serde_json::from_str(r#"{"/": [".hidden"]}"#).unwrap();
        assert!(hidden_only.is_empty());
    }

    #[test]
    fn test_diff_result_decoding_drops_empty_lists() {
        let diff: DiffResult = serde_json::from_str(r#"{"/sub": [], "/": ["a.txt"]}"#).unwrap();
        assert_eq!(diff.len(), 1);
        assert!(diff.get("/sub").is_none());
        assert_eq!(diff.get("/"), Some(&["a.txt".to_string()][..]));
    }
}
