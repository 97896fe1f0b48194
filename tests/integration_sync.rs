//! End-to-end sync runs against the in-memory store

mod common;

use common::{mtime, set_mtime, test_config, write_file, MemoryStore, BUCKET};
use s3push::config::Config;
use s3push::error::Error;
use s3push::sync::{backup_prefix, SyncEngine, SyncTarget};
use s3push::types::SyncStats;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn target(store: &Arc<MemoryStore>, prefix: &str) -> SyncTarget {
    SyncTarget::new(store.clone(), BUCKET, prefix)
}

async fn run(
    store: &Arc<MemoryStore>,
    prefix: &str,
    config: Config,
    root: &std::path::Path,
) -> SyncStats {
    SyncEngine::new(config, target(store, prefix))
        .sync(root, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_new_files_uploaded_under_prefix() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"hello");
    write_file(dir.path(), "2024/05/photo.jpg", b"\xff\xd8\xff\xe0 jpeg");

    let store = Arc::new(MemoryStore::new());
    let stats = run(&store, "/site/uploads/", test_config(2), dir.path()).await;

    assert_eq!(stats.files_scanned, 2);
    assert_eq!(stats.files_planned, 2);
    assert_eq!(stats.files_uploaded, 2);
    assert_eq!(stats.bytes_transferred, 5 + 9);
    assert!(stats.is_complete());
    assert_eq!(
        store.keys(),
        vec!["site/uploads/2024/05/photo.jpg", "site/uploads/a.txt"]
    );
    assert_eq!(store.get("site/uploads/a.txt").unwrap().body, b"hello");
}

#[tokio::test]
async fn test_diff_rule_scenarios() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.txt", b"0123456789");
    write_file(dir.path(), "b.txt", b"fresh");
    let d = write_file(dir.path(), "d.txt", b"same");

    let store = Arc::new(MemoryStore::new());
    // a.txt: same size, remote older -> upload
    store.insert("p/a.txt", b"9876543210", mtime(&a) - Duration::from_secs(3600));
    // c.txt: remote only -> untouched
    store.insert("p/c.txt", b"keep me", mtime(&a));
    // d.txt: same size, remote newer -> skip
    store.insert("p/d.txt", b"SAME", mtime(&d) + Duration::from_secs(60));

    let stats = run(&store, "p", test_config(4), dir.path()).await;

    assert_eq!(stats.remote_listed, 3);
    assert_eq!(stats.files_matched, 2);
    assert_eq!(stats.files_planned, 2);
    assert_eq!(stats.files_uploaded, 2);
    assert_eq!(stats.files_skipped(), 1);
    assert_eq!(store.put_count(), 2);

    assert_eq!(store.get("p/a.txt").unwrap().body, b"0123456789");
    assert_eq!(store.get("p/b.txt").unwrap().body, b"fresh");
    assert_eq!(store.get("p/c.txt").unwrap().body, b"keep me");
    assert_eq!(store.get("p/d.txt").unwrap().body, b"SAME");
}

#[tokio::test]
async fn test_equal_mtime_and_size_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "same.bin", b"abc");

    let store = Arc::new(MemoryStore::new());
    store.insert("same.bin", b"xyz", mtime(&path));

    let stats = run(&store, "", test_config(1), dir.path()).await;
    assert_eq!(stats.files_planned, 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_size_change_uploads_even_if_remote_newer() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "grown.log", b"longer than before");

    let store = Arc::new(MemoryStore::new());
    store.insert("grown.log", b"short", mtime(&path) + Duration::from_secs(3600));

    let stats = run(&store, "", test_config(1), dir.path()).await;
    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(store.get("grown.log").unwrap().body, b"longer than before");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        let path = write_file(dir.path(), &format!("dir{}/file{}.txt", i % 2, i), b"data");
        set_mtime(&path, std::time::SystemTime::now() - Duration::from_secs(60));
    }

    let store = Arc::new(MemoryStore::new().with_page_size(2));
    let first = run(&store, "uploads", test_config(3), dir.path()).await;
    assert_eq!(first.files_uploaded, 5);

    let second = run(&store, "uploads", test_config(3), dir.path()).await;
    assert_eq!(second.remote_listed, 5);
    assert_eq!(second.files_matched, 5);
    assert_eq!(second.files_planned, 0);
    assert_eq!(second.files_uploaded, 0);
    assert_eq!(store.put_count(), 5);
    // 5 objects at 2 per page
    assert!(store.list_calls() >= 3);
}

#[tokio::test]
async fn test_sibling_prefix_not_matched() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.txt", b"abc");

    let store = Arc::new(MemoryStore::new());
    store.insert("uploads-old/a.txt", b"abc", mtime(&path) + Duration::from_secs(60));

    let stats = run(&store, "uploads", test_config(1), dir.path()).await;
    assert_eq!(stats.remote_listed, 0);
    assert_eq!(stats.files_uploaded, 1);
    assert!(store.get("uploads/a.txt").is_some());
}

#[tokio::test]
async fn test_concurrency_bound() {
    let dir = TempDir::new().unwrap();
    for i in 0..20 {
        write_file(dir.path(), &format!("f{:02}.dat", i), &[i as u8; 64]);
    }

    let store = Arc::new(MemoryStore::new().with_put_delay(Duration::from_millis(20)));
    let stats = run(&store, "bulk", test_config(3), dir.path()).await;

    assert_eq!(stats.files_uploaded, 20);
    assert_eq!(store.put_count(), 20);
    assert!(store.max_in_flight() <= 3, "max in flight {}", store.max_in_flight());
    assert!(store.max_in_flight() >= 2);
}

#[tokio::test]
async fn test_failed_upload_does_not_stop_others() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "good1.txt", b"1");
    write_file(dir.path(), "bad.txt", b"2");
    write_file(dir.path(), "good2.txt", b"3");

    let store = Arc::new(MemoryStore::new().fail_put("p/bad.txt"));
    let stats = run(&store, "p", test_config(2), dir.path()).await;

    assert_eq!(stats.files_planned, 3);
    assert_eq!(stats.files_uploaded, 2);
    assert_eq!(stats.upload_failures, 1);
    assert_eq!(stats.failed_files, vec!["bad.txt".to_string()]);
    assert!(!stats.is_complete());
    assert!(store.get("p/good1.txt").is_some());
    assert!(store.get("p/good2.txt").is_some());
    assert!(store.get("p/bad.txt").is_none());
}

#[tokio::test]
async fn test_truncated_listing_uploads_unmatched() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new().with_page_size(3).fail_listing_after(1));

    for i in 0..10 {
        let name = format!("f{}.txt", i);
        let path = write_file(dir.path(), &name, b"content");
        store.insert(&format!("p/{}", name), b"content", mtime(&path) + Duration::from_secs(60));
    }

    let stats = run(&store, "p", test_config(4), dir.path()).await;

    assert!(stats.remote_truncated);
    assert_eq!(stats.remote_listed, 3);
    assert_eq!(stats.files_matched, 3);
    assert_eq!(stats.files_planned, 7);
    assert_eq!(stats.files_uploaded, 7);
    assert_eq!(store.put_count(), 7);
}

#[tokio::test]
async fn test_missing_root_fails_before_upload() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let result = SyncEngine::new(test_config(1), target(&store, "p"))
        .sync(&dir.path().join("nope"), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_dry_run_uploads_nothing() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"aaaa");
    write_file(dir.path(), "b.txt", b"bb");

    let mut config = test_config(2);
    config.dry_run = true;

    let store = Arc::new(MemoryStore::new());
    let stats = run(&store, "p", config, dir.path()).await;

    assert_eq!(stats.files_planned, 2);
    assert_eq!(stats.bytes_planned, 6);
    assert_eq!(stats.files_uploaded, 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_content_types_sniffed() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "logo.png",
        &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d, b'I', b'H', b'D', b'R'],
    );
    write_file(dir.path(), "index.html", b"<!DOCTYPE html><html></html>");
    write_file(dir.path(), "notes", b"plain words\n");
    write_file(dir.path(), "empty", b"");

    let store = Arc::new(MemoryStore::new());
    run(&store, "", test_config(2), dir.path()).await;

    assert_eq!(store.get("logo.png").unwrap().content_type, "image/png");
    assert_eq!(
        store.get("index.html").unwrap().content_type,
        "text/html; charset=utf-8"
    );
    assert_eq!(
        store.get("notes").unwrap().content_type,
        "text/plain; charset=utf-8"
    );
    assert_eq!(store.get("empty").unwrap().content_type, "application/octet-stream");
    assert!(store.get("empty").unwrap().body.is_empty());
}

#[tokio::test]
async fn test_single_file_backup() {
    let dir = TempDir::new().unwrap();
    let dump = write_file(dir.path(), "dump.sql", b"CREATE TABLE t (id int);\n");

    let config = test_config(1);
    let prefix = backup_prefix(&config, "2024-01-02_03-04-05").unwrap();

    let store = Arc::new(MemoryStore::new());
    let stats = run(&store, &prefix, config, &dump).await;

    assert_eq!(stats.files_uploaded, 1);
    assert_eq!(
        store.keys(),
        vec!["database_backups/2024-01-02_03-04-05/dump.sql"]
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.txt", b"a");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let store = Arc::new(MemoryStore::new());
    let result = SyncEngine::new(test_config(1), target(&store, "p"))
        .sync(dir.path(), &cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_cancel_mid_run_joins_running_uploads() {
    let dir = TempDir::new().unwrap();
    for i in 0..30 {
        write_file(dir.path(), &format!("f{:02}", i), b"x");
    }

    let store = Arc::new(MemoryStore::new().with_put_delay(Duration::from_millis(50)));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        trigger.cancel();
    });

    let result = SyncEngine::new(test_config(2), target(&store, "p"))
        .sync(dir.path(), &cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    let done = store.put_count();
    assert!(done > 0 && done < 30, "uploaded {}", done);
    // nothing left running once sync returned
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.put_count(), done);
}
