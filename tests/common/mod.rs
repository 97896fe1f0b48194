//! Shared fixtures for integration tests: an in-memory object store and
//! helpers for building local trees.

#![allow(dead_code)]

use async_trait::async_trait;
use s3push::config::Config;
use s3push::error::{Error, Result};
use s3push::storage::{ListPage, ObjectEntry, ObjectStore};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub const BUCKET: &str = "test-bucket";

/// An object held by [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub last_modified: SystemTime,
}

/// Single-bucket store kept in memory
///
/// Listing is sorted by key and paginated with the entry offset as the
/// continuation token. Uploads stamp `last_modified` with the current time,
/// like a real store does.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
    fail_listing_after: Option<usize>,
    fail_keys: HashSet<String>,
    put_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    puts: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: 1000,
            fail_listing_after: None,
            fail_keys: HashSet::new(),
            put_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Serve `pages` listing pages successfully, then fail
    pub fn fail_listing_after(mut self, pages: usize) -> Self {
        self.fail_listing_after = Some(pages);
        self
    }

    /// Reject uploads to `key`
    pub fn fail_put(mut self, key: &str) -> Self {
        self.fail_keys.insert(key.to_string());
        self
    }

    /// Hold every upload open for `delay`
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn insert(&self, key: &str, body: &[u8], last_modified: SystemTime) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: "application/octet-stream".to_string(),
                last_modified,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_bucket(bucket: &str) -> Result<()> {
        if bucket == BUCKET {
            Ok(())
        } else {
            Err(Error::storage(format!("NoSuchBucket: {}", bucket)))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        Self::check_bucket(bucket)?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let offset: usize = match continuation {
            Some(token) => token
                .parse()
                .map_err(|_| Error::storage(format!("bad continuation token: {}", token)))?,
            None => 0,
        };

        if let Some(pages) = self.fail_listing_after {
            if offset / self.page_size >= pages {
                return Err(Error::storage("InternalError: listing interrupted"));
            }
        }

        let objects = self.objects.lock().unwrap();
        let matching: Vec<_> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();

        let entries: Vec<ObjectEntry> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|(key, obj)| ObjectEntry {
                key: key.to_string(),
                size: obj.body.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();

        let next = offset + entries.len();
        let next_continuation = (next < matching.len()).then(|| next.to_string());

        Ok(ListPage {
            entries,
            next_continuation,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: File,
        len: u64,
        content_type: &str,
    ) -> Result<()> {
        Self::check_bucket(bucket)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        let mut data = Vec::new();
        let read = body.read_to_end(&mut data).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        read?;

        if self.fail_keys.contains(key) {
            return Err(Error::storage(format!("AccessDenied: {}", key)));
        }
        if data.len() as u64 != len {
            return Err(Error::storage(format!(
                "length mismatch for {}: declared {}, read {}",
                key,
                len,
                data.len()
            )));
        }

        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body: data,
                content_type: content_type.to_string(),
                last_modified: SystemTime::now(),
            },
        );
        Ok(())
    }
}

/// Configuration for tests: no retries, no progress bars
pub fn test_config(jobs: usize) -> Config {
    Config {
        s3_url: format!("s3://{}", BUCKET),
        jobs,
        max_retries: 0,
        retry_delay_ms: 1,
        ..Default::default()
    }
}

/// Write `contents` to `root/rel`, creating parent directories
pub fn write_file(root: &Path, rel: &str, contents: &[u8]) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}
