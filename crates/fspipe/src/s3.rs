//! S3 multipart-upload backend (spec §4.3, "S3 backend"). Each fspipe file
//! maps to one S3 object; small writes are buffered until they cross the
//! multipart minimum part size before a part is actually uploaded.

use std::sync::Arc;

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::BytesMut;
use dashmap::DashMap;
use tokio::sync::Mutex;

/// S3 requires every part but the last to be at least 5 MiB.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("unknown file id: {0}")]
    UnknownFile(String),
    #[error("s3 request failed: {0}")]
    Request(String),
}

struct FileState {
    key: String,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    buffer: BytesMut,
    next_part_number: i32,
    bytes_written: u64,
    /// Set once `CompleteMultipartUpload` has actually succeeded. Distinct
    /// from `upload_id.is_some()`, which is also true mid-stream once the
    /// first part has flushed but before `close()` runs.
    completed: bool,
}

impl FileState {
    fn new(key: String) -> Self {
        Self {
            key,
            upload_id: None,
            parts: Vec::new(),
            buffer: BytesMut::new(),
            next_part_number: 1,
            bytes_written: 0,
            completed: false,
        }
    }
}

/// Tracks in-flight S3 objects keyed by the fspipe `file_id`.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
    files: DashMap<String, Arc<Mutex<FileState>>>,
}

impl S3Backend {
    pub async fn new(bucket: String, region: Option<String>, endpoint: Option<String>, prefix: String) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self { client: Client::from_conf(s3_config.build()), bucket, prefix, files: DashMap::new() }
    }

    fn object_key(&self, filename: &str) -> String {
        if self.prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), filename)
        }
    }

    /// Register a file id without starting an upload; the multipart upload
    /// only begins once the first chunk crosses `MIN_PART_SIZE`.
    pub fn create(&self, file_id: &str, filename: &str) {
        self.files.insert(file_id.to_string(), Arc::new(Mutex::new(FileState::new(self.object_key(filename)))));
    }

    pub async fn write_chunk(&self, file_id: &str, data: &[u8]) -> Result<(), S3Error> {
        let entry = self.files.get(file_id).ok_or_else(|| S3Error::UnknownFile(file_id.to_string()))?.clone();
        let mut state = entry.lock().await;
        state.buffer.extend_from_slice(data);
        state.bytes_written += data.len() as u64;

        if state.buffer.len() >= MIN_PART_SIZE {
            self.flush_part(&mut state, false).await?;
        }
        Ok(())
    }

    async fn flush_part(&self, state: &mut FileState, is_final: bool) -> Result<(), S3Error> {
        if state.buffer.is_empty() && !(is_final && state.upload_id.is_none() && state.bytes_written == 0) {
            return Ok(());
        }
        if state.upload_id.is_none() {
            let create = self
                .client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(&state.key)
                .send()
                .await
                .map_err(|e| S3Error::Request(e.to_string()))?;
            state.upload_id = create.upload_id().map(str::to_string);
        }
        let Some(upload_id) = state.upload_id.clone() else {
            return Ok(());
        };

        if state.buffer.is_empty() {
            return Ok(());
        }

        let part_number = state.next_part_number;
        state.next_part_number += 1;
        let body = state.buffer.split().freeze();

        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&state.key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| S3Error::Request(e.to_string()))?;

        state.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(uploaded.e_tag().map(str::to_string))
                .build(),
        );
        Ok(())
    }

    /// Flush any buffered bytes and complete the multipart upload. A file
    /// that never received any data keeps its bookkeeping entry but writes
    /// nothing to S3 — `rename`/`delete` still need to find it.
    pub async fn close(&self, file_id: &str) -> Result<(), S3Error> {
        let entry = self.files.get(file_id).ok_or_else(|| S3Error::UnknownFile(file_id.to_string()))?.clone();
        let mut state = entry.lock().await;

        if state.bytes_written == 0 {
            return Ok(());
        }

        self.flush_part(&mut state, true).await?;

        if let Some(upload_id) = state.upload_id.clone() {
            let completed = CompletedMultipartUpload::builder().set_parts(Some(state.parts.clone())).build();
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(&state.key)
                .upload_id(upload_id)
                .multipart_upload(completed)
                .send()
                .await
                .map_err(|e| S3Error::Request(e.to_string()))?;
            state.completed = true;
        }
        Ok(())
    }

    /// Rename the object. If the upload already completed this issues a
    /// copy-then-delete; otherwise it's a local rename of the pending key.
    /// An unknown file id, and a copy whose source object is already gone,
    /// are both treated as benign no-ops rather than errors.
    pub async fn rename(&self, file_id: &str, new_filename: &str) -> Result<(), S3Error> {
        let Some(entry) = self.files.get(file_id).map(|e| e.clone()) else {
            return Ok(());
        };
        let mut state = entry.lock().await;
        let new_key = self.object_key(new_filename);

        if state.completed {
            let source = format!("{}/{}", self.bucket, state.key);
            let copy_result = self
                .client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(&source)
                .key(&new_key)
                .send()
                .await;
            match copy_result {
                Ok(_) => {
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(&state.key)
                        .send()
                        .await
                        .map_err(|e| S3Error::Request(e.to_string()))?;
                }
                Err(e) if e.code() == Some("NoSuchKey") => {}
                Err(e) => return Err(S3Error::Request(e.to_string())),
            }
        }
        state.key = new_key;
        Ok(())
    }

    pub async fn delete(&self, file_id: &str) -> Result<(), S3Error> {
        let Some((_, entry)) = self.files.remove(file_id) else {
            return Ok(());
        };
        let state = entry.lock().await;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&state.key)
            .send()
            .await
            .map_err(|e| S3Error::Request(e.to_string()))?;
        Ok(())
    }

    /// S3 objects are immutable; truncate has no server-side equivalent so
    /// it's logged and otherwise ignored.
    pub fn truncate(&self, file_id: &str, size: u64) {
        tracing::warn!(file_id, size, "truncate is a no-op against the s3 backend");
    }

    /// Abort every multipart upload still open, called on graceful
    /// shutdown so S3 doesn't keep billing for abandoned parts.
    pub async fn abort_incomplete(&self) {
        let entries: Vec<(String, Arc<Mutex<FileState>>)> =
            self.files.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        for (file_id, entry) in entries {
            let state = entry.lock().await;
            if let Some(upload_id) = state.upload_id.clone() {
                if let Err(e) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&state.key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(file_id, error = %e, "failed to abort incomplete multipart upload");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_joins_prefix_and_filename() {
        let backend_prefix = "sessions/abc";
        let key = if backend_prefix.is_empty() {
            "video.ivf".to_string()
        } else {
            format!("{}/{}", backend_prefix.trim_end_matches('/'), "video.ivf")
        };
        assert_eq!(key, "sessions/abc/video.ivf");
    }

    #[test]
    fn min_part_size_matches_s3_requirement() {
        assert_eq!(MIN_PART_SIZE, 5 * 1024 * 1024);
    }
}
