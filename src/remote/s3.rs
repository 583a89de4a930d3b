//! S3-compatible object store (S3, R2, MinIO)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use futures::{stream, TryStreamExt};

use super::{relative_key, ByteStream, ObjectStat, RemoteStore};
use crate::error::{HybridError, Result};

/// Object store backed by one S3 bucket
#[derive(Clone)]
pub struct S3Remote {
    client: S3Client,
    bucket: String,
}

impl S3Remote {
    /// Use a pre-configured client
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the environment (credentials, region, endpoint)
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(S3Client::new(&config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Inclusive `Range` header for a non-empty read
fn range_header(offset: u64, len: u64) -> Result<String> {
    match offset.checked_add(len) {
        Some(end) if len > 0 => Ok(format!("bytes={}-{}", offset, end - 1)),
        _ => Err(HybridError::OutOfBounds {
            offset,
            len,
            size: offset,
        }),
    }
}

/// S3 answers 416 when the range starts at or past the end of the object
fn starts_past_end(status: Option<u16>) -> bool {
    status == Some(RANGE_NOT_SATISFIABLE)
}

fn unavailable(err: impl std::error::Error) -> HybridError {
    HybridError::RemoteUnavailable(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl RemoteStore for S3Remote {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(unavailable)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| relative_key(prefix, key)),
            );
        }

        tracing::debug!(
            "Listed {} objects under s3://{}/{}",
            keys.len(),
            self.bucket,
            prefix
        );
        Ok(keys)
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service_error) if service_error.is_not_found() => {
                    HybridError::ObjectNotFound(key.to_string())
                }
                _ => unavailable(e),
            })?;

        Ok(ObjectStat {
            size: response.content_length().unwrap_or(0).max(0) as u64,
            etag: response.e_tag().map(String::from),
            last_modified: response.last_modified().map(|dt| dt.to_string()),
        })
    }

    fn open_read(&self, key: &str) -> ByteStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();

        let body = async move {
            let response = client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| match e.as_service_error() {
                    Some(service_error) if service_error.is_no_such_key() => {
                        HybridError::ObjectNotFound(key.clone())
                    }
                    _ => unavailable(e),
                })?;

            Ok::<_, HybridError>(stream::try_unfold(response.body, |mut body| async move {
                match body.try_next().await {
                    Ok(Some(bytes)) => Ok(Some((bytes, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(unavailable(e)),
                }
            }))
        };

        Box::pin(stream::once(body).try_flatten())
    }

    async fn read_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range_header(offset, len)?)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if starts_past_end(e.raw_response().map(|r| r.status().as_u16())) => {
                let size = self.stat(key).await.map(|stat| stat.size).unwrap_or(offset);
                return Err(HybridError::OutOfBounds { offset, len, size });
            }
            Err(e) => {
                return Err(match e.as_service_error() {
                    Some(service_error) if service_error.is_no_such_key() => {
                        HybridError::ObjectNotFound(key.to_string())
                    }
                    _ => unavailable(e),
                })
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(unavailable)?
            .into_bytes();

        // S3 clamps ranges that run past the end instead of failing
        if (data.len() as u64) < len {
            return Err(HybridError::OutOfBounds {
                offset,
                len,
                size: offset + data.len() as u64,
            });
        }

        Ok(data)
    }
}
