//! Disk/database reconciliation and storage accounting tests.

mod common;

use std::ffi::OsString;

use common::TestEnv;
use hoard::db::ResourceKind;
use hoard::storage::TreeReconciler;
use hoard::tenant::{ACCOUNTANT_JOB, RECONCILER_JOB};

async fn reconciler(env: &TestEnv, tenant: &str) -> TreeReconciler {
    let handle = env.service.handle(tenant).await.unwrap();
    TreeReconciler::new(
        env.db().pool().clone(),
        tenant,
        handle.paths().clone(),
    )
}

#[tokio::test]
async fn test_orphan_blob_is_removed_and_usage_drops() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.add_resource(ResourceKind::File, "t1", "b", b"kept", None)
        .await;
    env.write_blob(ResourceKind::File, "t1", "a", b"orphaned bytes")
        .await;

    env.scheduler.tick_job("t1", ACCOUNTANT_JOB).await;
    let before = env.service.storage_used("t1").await.unwrap();
    assert_eq!(before, 18);

    env.scheduler.tick_job("t1", RECONCILER_JOB).await;
    assert!(!env.blob_exists(ResourceKind::File, "t1", "a").await);
    assert!(env.blob_exists(ResourceKind::File, "t1", "b").await);

    // Usage only changes on the next accountant tick.
    assert_eq!(env.service.storage_used("t1").await.unwrap(), before);
    env.scheduler.tick_job("t1", ACCOUNTANT_JOB).await;
    assert_eq!(env.service.storage_used("t1").await.unwrap(), 4);
}

#[tokio::test]
async fn test_missing_blob_drops_row() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.add_resource(ResourceKind::Pastebin, "t1", "p1", b"text", None)
        .await;
    env.add_resource(ResourceKind::Pastebin, "t1", "p2", b"text", None)
        .await;
    let handle = env.service.handle("t1").await.unwrap();
    tokio::fs::remove_file(handle.paths().resource_path(ResourceKind::Pastebin, "p2"))
        .await
        .unwrap();

    let report = reconciler(&env, "t1").await.reconcile().await.unwrap();

    assert_eq!(report.pastebins.removed_from_db, vec!["p2"]);
    assert!(report.files.is_empty());
    assert_eq!(env.resource_ids(ResourceKind::Pastebin, "t1").await, vec!["p1"]);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.add_resource(ResourceKind::File, "t1", "keep", b"x", None)
        .await;
    env.write_blob(ResourceKind::File, "t1", "stray", b"y").await;
    env.write_blob(ResourceKind::Pastebin, "t1", "stray", b"z").await;

    let reconciler = reconciler(&env, "t1").await;
    let first = reconciler.reconcile().await.unwrap();
    assert!(!first.is_empty());

    let second = reconciler.reconcile().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(env.resource_ids(ResourceKind::File, "t1").await, vec!["keep"]);
    assert!(env.blob_exists(ResourceKind::File, "t1", "keep").await);
}

#[tokio::test]
async fn test_tenants_are_reconciled_independently() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.create("t2").await;
    env.write_blob(ResourceKind::File, "t1", "a", b"orphan").await;
    env.write_blob(ResourceKind::File, "t2", "a", b"orphan").await;

    env.scheduler.tick_job("t1", RECONCILER_JOB).await;

    assert!(!env.blob_exists(ResourceKind::File, "t1", "a").await);
    assert!(env.blob_exists(ResourceKind::File, "t2", "a").await);
}

#[tokio::test]
async fn test_upload_between_plan_and_apply_is_not_touched() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.write_blob(ResourceKind::File, "t1", "orphan", b"x").await;

    let reconciler = reconciler(&env, "t1").await;
    let plan = reconciler.plan(ResourceKind::File).await.unwrap();
    assert_eq!(plan.on_disk_not_in_db, vec![OsString::from("orphan")]);

    // An upload lands after the listings were taken.
    env.add_resource(ResourceKind::File, "t1", "fresh", b"new", None)
        .await;

    let report = reconciler.apply(&plan).await.unwrap();
    assert_eq!(report.removed_from_disk, vec!["orphan"]);
    assert!(env.blob_exists(ResourceKind::File, "t1", "fresh").await);
    assert_eq!(env.resource_ids(ResourceKind::File, "t1").await, vec!["fresh"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_orphan_is_removed() {
    use std::os::unix::ffi::OsStrExt;

    let env = TestEnv::new().await;
    env.create("t1").await;
    let handle = env.service.handle("t1").await.unwrap();
    let odd = handle
        .paths()
        .dir(ResourceKind::File)
        .join(std::ffi::OsStr::from_bytes(b"orph\xffan"));
    tokio::fs::write(&odd, vec![0u8; 100]).await.unwrap();

    env.scheduler.tick_job("t1", ACCOUNTANT_JOB).await;
    assert_eq!(env.service.storage_used("t1").await.unwrap(), 100);

    env.scheduler.tick_job("t1", RECONCILER_JOB).await;
    env.scheduler.tick_job("t1", ACCOUNTANT_JOB).await;

    assert!(!odd.exists());
    assert_eq!(env.service.storage_used("t1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_directory_keeps_rows() {
    let env = TestEnv::new().await;
    env.create("t1").await;
    env.add_resource(ResourceKind::File, "t1", "a", b"one", None)
        .await;
    env.add_resource(ResourceKind::File, "t1", "b", b"two", None)
        .await;
    let handle = env.service.handle("t1").await.unwrap();
    tokio::fs::remove_dir_all(handle.paths().dir(ResourceKind::File))
        .await
        .unwrap();

    let reconciler = reconciler(&env, "t1").await;
    assert!(reconciler.plan(ResourceKind::File).await.is_err());

    env.scheduler.tick_job("t1", RECONCILER_JOB).await;
    assert_eq!(
        env.resource_ids(ResourceKind::File, "t1").await,
        vec!["a", "b"]
    );
}
