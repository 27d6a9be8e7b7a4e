//! Elara - local/remote folder reconciliation
//!
//! Scans a local folder tree and a remote mount, diffs the two and submits
//! deduplicated transfer requests so both sides converge.

pub mod context;
pub mod diff;
pub mod error;
pub mod model;
pub mod paths;
pub mod reconcile;
pub mod remote;
pub mod scan;
pub mod transaction;
pub mod types;

pub use diff::{diff, diff_one_way, ModelDiff};
pub use error::{Result, SyncError};
pub use model::{DiffResult, DirectoryModel};
pub use reconcile::{CycleReport, Reconciler};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
