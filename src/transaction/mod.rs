//! Transfer request tracking
//!
//! Provides:
//! - [`TransactionKey`] dedup fingerprints over (folder, file set)
//! - [`TransactionRecord`] of in-flight requests with an eviction policy
//! - [`TransactionTracker`] turning diff results into submitted requests

mod record;
mod tracker;

pub use record::{
    FailurePolicy, RecordConfig, RecordStats, RecordedTransaction, Reservation, TransactionRecord,
};
pub use tracker::{build_payload, SubmissionOutcome, SubmissionStatus, TransactionTracker};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::paths;

/// Dedup fingerprint of a transfer request
///
/// Two requests for the same folder and the same set of files map to the
/// same key regardless of file order or a leading separator on the folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionKey {
    folder: String,
    files: Vec<String>,
}

impl TransactionKey {
    pub fn new<S: AsRef<str>>(folder: &str, files: &[S]) -> Self {
        let mut files: Vec<String> = files.iter().map(|f| f.as_ref().to_string()).collect();
        files.sort();
        files.dedup();
        Self {
            folder: paths::strip_leading_separator(folder).to_string(),
            files,
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.folder, self.files.join(", "))
    }
}
