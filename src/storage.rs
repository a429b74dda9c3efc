use crate::{
    domain::FileStorage,
    errors::StorageError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::ByteStream,
    Client as S3Client,
};
use tracing;

/// Rendered memes shared through the storage tier land here.
#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        Self { client, bucket_name }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

/// Caller's content type, else one guessed from the key's extension.
fn resolve_content_type(key: &str, content_type: Option<String>) -> String {
    content_type.unwrap_or_else(|| {
        mime_guess::from_path(key)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    })
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data to S3 using PutObject. Sets Content-Type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        if data.is_empty() {
            return Err(StorageError::UploadFailed(format!("refusing to upload empty object '{}'", key)));
        }
        let content_type = resolve_content_type(key, content_type);
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, size = data.len(), "S3: Uploading meme");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(StorageError::BackendError)?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(())
    }
}
