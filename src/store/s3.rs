//! S3-backed [`ObjectStore`] (§4.B).
//!
//! Credential/config bootstrap follows `bestool::aws::init`: load the
//! ambient AWS config chain (environment, credentials file, IMDS, ...) via
//! `aws_config::ConfigLoader`, tagged with this binary's app name. Chunked
//! uploads use real S3 multipart upload, grounded in the block-staging
//! pattern from `src/file_chunker.rs` and
//! `original_source/src/azure_client.py::_upload_in_blocks`.

use aws_config::{AppName, BehaviorVersion, ConfigLoader};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{BackupError, Result};

use super::{ObjectInfo, ObjectStore, CHUNK_RETRY_ATTEMPTS, CHUNK_SIZE};

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(bucket: impl Into<String>) -> Self {
        let config = ConfigLoader::default()
            .behavior_version(BehaviorVersion::v2023_11_09())
            .app_name(AppName::new("vaultkeep").expect("static app name is valid"))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
        }
    }

    fn classify(err: impl std::error::Error) -> BackupError {
        BackupError::transient(err.to_string())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(Self::classify)?;
        Ok(())
    }

    async fn put_chunked(&self, key: &str, data: Vec<u8>) -> Result<()> {
        if data.len() <= CHUNK_SIZE {
            return self.put(key, data).await;
        }

        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::classify)?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| BackupError::transient("multipart upload had no upload id"))?
            .to_string();

        let mut completed_parts = Vec::new();
        for (index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let part_number = index as i32 + 1;
            let mut last_err = None;

            'retry: for attempt in 0..CHUNK_RETRY_ATTEMPTS {
                match self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(chunk.to_vec()))
                    .send()
                    .await
                {
                    Ok(part) => {
                        completed_parts.push(
                            CompletedPart::builder()
                                .e_tag(part.e_tag().unwrap_or_default())
                                .part_number(part_number)
                                .build(),
                        );
                        last_err = None;
                        break 'retry;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        if attempt + 1 < CHUNK_RETRY_ATTEMPTS {
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }

            if let Some(e) = last_err {
                self.client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                    .ok();
                return Err(Self::classify(e));
            }
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(Self::classify)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    BackupError::not_found(format!("object {key}"))
                } else {
                    Self::classify(e)
                }
            })?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| BackupError::transient(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), 0))
                    .unwrap_or_else(Utc::now),
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if !self.exists(key).await? {
            return Ok(false);
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::classify)?;
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let output = req.send().await.map_err(Self::classify)?;

            for object in output.contents() {
                objects.push(ObjectInfo {
                    key: object.key().unwrap_or_default().to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), 0))
                        .unwrap_or_else(Utc::now),
                });
            }

            if output.is_truncated().unwrap_or(false) {
                continuation = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }
        Ok(objects)
    }

    async fn test_connection(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => Err(Self::classify(e)),
        }
    }
}

fn is_not_found(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
    format!("{err:?}").contains("NotFound") || format!("{err:?}").contains("NoSuchKey")
}
