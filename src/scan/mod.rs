//! Tree scanners producing [`DirectoryModel`](crate::model::DirectoryModel)s
//!
//! - [`LocalScanner`] walks a local folder
//! - [`RemoteScanner`] recursively lists a remote mount folder, depth-bounded

mod local;
mod remote;

pub use local::LocalScanner;
pub use remote::RemoteScanner;
