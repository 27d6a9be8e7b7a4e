//! Reconciliation tests against a temporary folder and the in-memory API
//!
//! Run with: cargo test --test reconcile_tests

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

use elara::reconcile::Reconciler;
use elara::remote::{InMemoryOrbit, RecordedSubmission};
use elara::transaction::{FailurePolicy, RecordConfig, SubmissionStatus};
use elara::types::{Mount, Organization, SyncConfig, SyncDirection, WorkspaceContext};
use elara::SyncError;

fn context() -> WorkspaceContext {
    WorkspaceContext::new(
        Organization {
            id: "g1".into(),
            name: "Studio".into(),
        },
        Mount {
            id: "m1".into(),
            mount_location: "/mnt/shows".into(),
            name: "shows".into(),
        },
    )
}

fn api() -> InMemoryOrbit {
    let ctx = context();
    InMemoryOrbit::new()
        .with_workspace(ctx.organization().clone(), ctx.mount().clone())
        .with_directory("/projects")
}

/// Local tree `{"/": ["x.txt"], "/sub": ["y.txt"]}` plus ignored files
fn local_tree() -> TempDir {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("x.txt"), "x").unwrap();
    fs::write(dir.path().join("sub/y.txt"), "y").unwrap();
    fs::write(dir.path().join(".DS_Store"), "").unwrap();
    fs::write(dir.path().join("sub/render.tmp"), "").unwrap();
    dir
}

fn canonical(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

fn find<'a>(submissions: &'a [RecordedSubmission], target: &str) -> &'a RecordedSubmission {
    submissions
        .iter()
        .find(|s| s.payload.target.path == target)
        .unwrap_or_else(|| panic!("no submission targeting {target}"))
}

#[tokio::test]
async fn test_end_to_end_cycle() {
    let local = local_tree();
    let api = Arc::new(api().with_file("/projects/z.txt").with_file("/projects/.hidden"));
    let reconciler = Reconciler::new(
        api.clone(),
        context(),
        SyncConfig::new(local.path(), "/projects"),
    )
    .unwrap();

    let report = reconciler
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.diff.local_only.get("/"), Some(&["x.txt".to_string()][..]));
    assert_eq!(report.diff.local_only.get("/sub"), Some(&["y.txt".to_string()][..]));
    assert_eq!(report.diff.remote_only.get("/"), Some(&["z.txt".to_string()][..]));
    assert_eq!(report.diff.remote_only.len(), 1);
    assert_eq!(report.uploads.len(), 2);
    assert_eq!(report.downloads.len(), 1);
    assert_eq!(report.submitted(), 3);

    let root = canonical(local.path());
    let submissions = api.submissions();
    assert_eq!(submissions.len(), 3);

    let up_root = find(&submissions, "/projects");
    assert_eq!(up_root.payload.direction, SyncDirection::Up);
    assert_eq!(up_root.payload.sources[0].filepath, format!("{root}/x.txt"));

    let up_sub = find(&submissions, "/projects/sub");
    assert_eq!(up_sub.payload.direction, SyncDirection::Up);
    assert_eq!(up_sub.payload.sources[0].filepath, format!("{root}/sub/y.txt"));

    let down = find(&submissions, &root);
    assert_eq!(down.payload.direction, SyncDirection::Down);
    assert_eq!(down.payload.sources[0].filepath, "/projects/z.txt");
    assert_eq!(down.group_id, "g1");
    assert_eq!(down.mount_id, "m1");
}

#[tokio::test]
async fn test_repeated_cycles_do_not_resubmit() {
    let local = local_tree();
    let api = Arc::new(api().with_file("/projects/z.txt"));
    let reconciler = Reconciler::new(
        api.clone(),
        context(),
        SyncConfig::new(local.path(), "/projects"),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    reconciler.run_cycle(&cancel).await.unwrap();
    let second = reconciler.run_cycle(&cancel).await.unwrap();

    assert_eq!(api.submissions().len(), 3);
    assert_eq!(second.submitted(), 0);
    assert!(second
        .uploads
        .iter()
        .chain(second.downloads.iter())
        .all(|o| o.status == SubmissionStatus::AlreadyInFlight));
    assert_eq!(second.record.entries, 3);
}

#[tokio::test]
async fn test_changed_file_set_is_a_new_request() {
    let local = local_tree();
    let api = Arc::new(api());
    let reconciler = Reconciler::new(
        api.clone(),
        context(),
        SyncConfig::new(local.path(), "/projects"),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    reconciler.run_cycle(&cancel).await.unwrap();
    fs::write(local.path().join("sub/w.txt"), "w").unwrap();
    let second = reconciler.run_cycle(&cancel).await.unwrap();

    let sub = second
        .uploads
        .iter()
        .find(|o| o.folder == "/sub")
        .unwrap();
    assert_eq!(sub.files, vec!["w.txt", "y.txt"]);
    assert_eq!(sub.status, SubmissionStatus::Accepted { status: 200 });
    assert_eq!(api.submissions().len(), 3);
}

#[tokio::test]
async fn test_depth_bound_reports_deep_files_as_uploads() {
    let local = tempdir().unwrap();
    fs::create_dir_all(local.path().join("a/b")).unwrap();
    fs::write(local.path().join("a/b/deep.txt"), "d").unwrap();
    let api = Arc::new(api().with_file("/projects/a/b/deep.txt"));

    let mut config = SyncConfig::new(local.path(), "/projects");
    config.max_depth = 1;
    let reconciler = Reconciler::new(api.clone(), context(), config).unwrap();
    let diff = reconciler.analyze(&CancellationToken::new()).await.unwrap();

    assert_eq!(diff.local_only.get("/a/b"), Some(&["deep.txt".to_string()][..]));
    assert!(diff.remote_only.is_empty());
    assert!(!api.listing_calls().contains(&"/projects/a/b".to_string()));
}

#[tokio::test]
async fn test_failed_submission_retried_with_retract_policy() {
    let local = local_tree();
    let api = Arc::new(api());
    api.set_submit_status(Some(503));

    let mut config = SyncConfig::new(local.path(), "/projects");
    config.transactions = RecordConfig {
        failure_policy: FailurePolicy::Retract,
        ..Default::default()
    };
    let reconciler = Reconciler::new(api.clone(), context(), config).unwrap();
    let cancel = CancellationToken::new();

    let first = reconciler.run_cycle(&cancel).await.unwrap();
    assert!(first.uploads.iter().all(|o| o.status.is_failure()));
    assert!(reconciler.record().is_empty());

    api.set_submit_status(Some(200));
    let second = reconciler.run_cycle(&cancel).await.unwrap();
    assert_eq!(second.submitted(), 2);
    assert_eq!(api.submissions().len(), 4);
}

#[tokio::test]
async fn test_unknown_workspace_aborts_cycle() {
    let local = local_tree();
    let api = Arc::new(api());
    let other = WorkspaceContext::new(
        context().organization().clone(),
        Mount {
            id: "gone".into(),
            mount_location: "/mnt/old".into(),
            name: "old".into(),
        },
    );

    let reconciler =
        Reconciler::new(api.clone(), other, SyncConfig::new(local.path(), "/")).unwrap();
    let err = reconciler
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RemoteListing { .. }));
    assert!(api.submissions().is_empty());
}
