//! AWS S3 storage backend

use crate::config::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE, S3_MIN_PART_SIZE};
use crate::error::{Error, Result};
use crate::storage::{ListPage, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// S3 caps a multipart upload at this many parts
const MAX_PARTS: u64 = 10_000;

/// AWS S3 storage backend
#[derive(Clone)]
pub struct S3Backend {
    /// S3 client
    client: Client,
    /// Bodies at or above this size go through multipart upload
    multipart_threshold: u64,
    /// Preferred multipart part size
    part_size: u64,
}

impl S3Backend {
    /// Create a new S3 backend from the default credential and region chain
    pub async fn new(region: Option<String>, endpoint: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let client = match endpoint {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&sdk_config),
        };

        Self::from_client(client)
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Override the multipart threshold and part size
    pub fn with_multipart(mut self, threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = threshold;
        self.part_size = part_size.max(S3_MIN_PART_SIZE);
        self
    }

    /// Part size for a body of `len` bytes, grown so it fits in `MAX_PARTS`
    fn part_size_for(&self, len: u64) -> u64 {
        let min_for_len = len.div_ceil(MAX_PARTS);
        self.part_size.max(min_for_len)
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        content_type: &str,
    ) -> Result<()> {
        let stream = ByteStream::read_from()
            .file(body)
            .build()
            .await
            .map_err(|e| Error::storage(format!("preparing body for {}: {}", key, e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(stream)
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        len: u64,
        content_type: &str,
    ) -> Result<()> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;

        let upload_id = output
            .upload_id()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::MultipartUpload {
                message: "no upload ID returned".to_string(),
                upload_id: None,
            })?;

        match self.upload_parts(bucket, key, &upload_id, body, len).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| Error::MultipartUpload {
                        message: DisplayErrorContext(&e).to_string(),
                        upload_id: Some(upload_id.clone()),
                    })?;

                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        key = %key,
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut body: File,
        len: u64,
    ) -> Result<Vec<CompletedPart>> {
        let part_size = self.part_size_for(len);
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut buffer = Vec::with_capacity(part_size as usize);
            (&mut body)
                .take(part_size)
                .read_to_end(&mut buffer)
                .await
                .map_err(|e| Error::io(format!("reading part {} of {}", part_number, key), e))?;

            if buffer.is_empty() {
                break;
            }

            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(Bytes::from(buffer)))
                .send()
                .await
                .map_err(|e| Error::MultipartUpload {
                    message: DisplayErrorContext(&e).to_string(),
                    upload_id: Some(upload_id.to_string()),
                })?;

            let etag = output.e_tag().ok_or_else(|| Error::MultipartUpload {
                message: "no ETag returned for part".to_string(),
                upload_id: Some(upload_id.to_string()),
            })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| Error::aws(DisplayErrorContext(&e)))?;

        let entries = output
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectEntry {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .map(to_system_time)
                        .unwrap_or(UNIX_EPOCH),
                })
            })
            .collect();

        Ok(ListPage {
            entries,
            next_continuation: output.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        len: u64,
        content_type: &str,
    ) -> Result<()> {
        if len >= self.multipart_threshold {
            self.put_multipart(bucket, key, body, len, content_type).await
        } else {
            self.put_single(bucket, key, body, content_type).await
        }
    }
}

/// Convert an SDK timestamp, clamping anything before the epoch to the epoch
fn to_system_time(t: &DateTime) -> SystemTime {
    if t.secs() < 0 {
        return UNIX_EPOCH;
    }
    UNIX_EPOCH
        .checked_add(Duration::new(t.secs() as u64, t.subsec_nanos()))
        .unwrap_or(UNIX_EPOCH)
}
