//! Core types for elara

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::transaction::RecordConfig;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncDirection {
    /// Local → remote
    Up,
    /// Remote → local
    Down,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Up => "UP",
            SyncDirection::Down => "DOWN",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "upload" => Ok(SyncDirection::Up),
            "down" | "download" => Ok(SyncDirection::Down),
            _ => Err(format!("Unknown sync direction: {}", s)),
        }
    }
}

/// Accept ids sent either as JSON strings or numbers
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// An organization (group) visible to the current credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A mount inside an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub mount_location: String,
    #[serde(default)]
    pub name: String,
}

/// The bound (organization, mount) pair every remote call is scoped by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    organization: Organization,
    mount: Mount,
}

impl WorkspaceContext {
    pub fn new(organization: Organization, mount: Mount) -> Self {
        Self {
            organization,
            mount,
        }
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub fn group_id(&self) -> &str {
        &self.organization.id
    }

    pub fn mount_id(&self) -> &str {
        &self.mount.id
    }

    /// The identifiers persisted between runs
    pub fn ids(&self) -> ContextIds {
        ContextIds {
            group_id: self.organization.id.clone(),
            mount_id: self.mount.id.clone(),
        }
    }
}

impl fmt::Display for WorkspaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}",
            self.organization.name, self.mount.mount_location
        )
    }
}

impl Serialize for WorkspaceContext {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ids().serialize(serializer)
    }
}

/// Persisted workspace identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextIds {
    #[serde(rename = "groupid", deserialize_with = "deserialize_id")]
    pub group_id: String,
    #[serde(rename = "mountid", deserialize_with = "deserialize_id")]
    pub mount_id: String,
}

/// Reconciliation settings for one local root / remote root pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local folder to reconcile
    pub local_root: PathBuf,
    /// Folder on the mount the local root corresponds to
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// Deepest remote folder level queried; deeper folders count as absent
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum remote listing calls in flight at once
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    /// Per-request deadline for remote calls (None = wait indefinitely)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: Option<u64>,
    /// Dedup record policy
    #[serde(default)]
    pub transactions: RecordConfig,
}

fn default_remote_root() -> String {
    "/".to_string()
}

fn default_max_depth() -> usize {
    4
}

fn default_scan_concurrency() -> usize {
    4
}

fn default_request_timeout() -> Option<u64> {
    Some(30_000)
}

impl SyncConfig {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            max_depth: default_max_depth(),
            scan_concurrency: default_scan_concurrency(),
            request_timeout_ms: default_request_timeout(),
            transactions: RecordConfig::default(),
        }
    }

    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        self.request_timeout_ms
            .map(std::time::Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serde() {
        assert_eq!(
            serde_json::to_string(&SyncDirection::Up).unwrap(),
            "\"UP\""
        );
        let parsed: SyncDirection = serde_json::from_str("\"DOWN\"").unwrap();
        assert_eq!(parsed, SyncDirection::Down);
        assert_eq!("upload".parse::<SyncDirection>(), Ok(SyncDirection::Up));
        assert!("sideways".parse::<SyncDirection>().is_err());
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let org: Organization = serde_json::from_str(r#"{"id": 42, "name": "Foundry"}"#).unwrap();
        assert_eq!(org.id, "42");

        let mount: Mount = serde_json::from_str(
            r#"{"id": "m-7", "mountLocation": "/mnt/projects", "name": "projects"}"#,
        )
        .unwrap();
        assert_eq!(mount.id, "m-7");
        assert_eq!(mount.mount_location, "/mnt/projects");
    }

    #[test]
    fn test_context_serializes_to_ids() {
        let ctx = WorkspaceContext::new(
            Organization {
                id: "1".into(),
                name: "Org".into(),
            },
            Mount {
                id: "2".into(),
                mount_location: "/mnt".into(),
                name: "mnt".into(),
            },
        );
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json, serde_json::json!({"groupid": "1", "mountid": "2"}));

        let ids: ContextIds = serde_json::from_value(json).unwrap();
        assert_eq!(ids, ctx.ids());
    }

    #[test]
    fn test_sync_config_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"local_root": "/tmp/work"}"#).unwrap();
        assert_eq!(config.remote_root, "/");
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.scan_concurrency, 4);
        assert_eq!(
            config.request_timeout(),
            Some(std::time::Duration::from_secs(30))
        );
    }
}
