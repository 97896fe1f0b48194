//! Object store capability used by the sync engine

pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use std::time::SystemTime;
use tokio::fs::File;

pub use s3::S3Backend;

/// One object returned by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last-modified time reported by the store
    pub last_modified: SystemTime,
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page
    pub entries: Vec<ObjectEntry>,
    /// Token for the next page, `None` once the listing is complete
    pub next_continuation: Option<String>,
}

/// Operations the sync engine needs from a remote object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of this backend (for logging)
    fn name(&self) -> &'static str;

    /// List one page of objects under `prefix`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// Upload `len` bytes read from `body` (positioned at its start) to `key`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        len: u64,
        content_type: &str,
    ) -> Result<()>;
}
