use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, RgbaImage};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::FileStorage;
use crate::errors::{RenderError, StorageError};

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Encoded meme ready to leave the process.
#[derive(Debug, Clone)]
pub struct ExportedMeme {
    pub png: Vec<u8>,
    pub file_name: String,
}

pub fn export_png(image: &RgbaImage, now: DateTime<Utc>) -> Result<ExportedMeme, RenderError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
        .map_err(RenderError::Encode)?;
    Ok(ExportedMeme {
        png,
        file_name: format!("problem-baba-meme-{}.png", now.timestamp_millis()),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ShareOutcome {
    Stored { key: String, location: String },
    Clipboard { data_url: String },
    Download {
        file_name: String,
        #[serde(skip)]
        png: Vec<u8>,
    },
}

/// One way of getting a meme to the user. Tried in order until one works.
#[async_trait]
pub trait ShareStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self, meme: &ExportedMeme) -> bool;

    async fn share(&self, meme: &ExportedMeme) -> Result<ShareOutcome, StorageError>;
}

/// Upload to the file store and hand back its location.
pub struct StorageShare {
    storage: Arc<dyn FileStorage>,
    bucket_name: String,
}

impl StorageShare {
    pub fn new(storage: Arc<dyn FileStorage>, bucket_name: String) -> Self {
        Self { storage, bucket_name }
    }
}

#[async_trait]
impl ShareStrategy for StorageShare {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn is_available(&self, _meme: &ExportedMeme) -> bool {
        true
    }

    async fn share(&self, meme: &ExportedMeme) -> Result<ShareOutcome, StorageError> {
        let key = format!("memes/{}.png", Uuid::new_v4());
        self.storage
            .upload(&key, meme.png.clone(), Some(PNG_CONTENT_TYPE.to_string()))
            .await?;
        Ok(ShareOutcome::Stored {
            location: format!("s3://{}/{}", self.bucket_name, key),
            key,
        })
    }
}

/// Inline data URL for the client to put on its clipboard.
pub struct ClipboardShare {
    client_supports: bool,
    max_bytes: usize,
}

impl ClipboardShare {
    pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;

    pub fn new(client_supports: bool, max_bytes: usize) -> Self {
        Self { client_supports, max_bytes }
    }
}

#[async_trait]
impl ShareStrategy for ClipboardShare {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn is_available(&self, meme: &ExportedMeme) -> bool {
        self.client_supports && meme.png.len() <= self.max_bytes
    }

    async fn share(&self, meme: &ExportedMeme) -> Result<ShareOutcome, StorageError> {
        Ok(ShareOutcome::Clipboard {
            data_url: format!("data:{};base64,{}", PNG_CONTENT_TYPE, STANDARD.encode(&meme.png)),
        })
    }
}

pub struct DownloadShare;

#[async_trait]
impl ShareStrategy for DownloadShare {
    fn name(&self) -> &'static str {
        "download"
    }

    fn is_available(&self, _meme: &ExportedMeme) -> bool {
        true
    }

    async fn share(&self, meme: &ExportedMeme) -> Result<ShareOutcome, StorageError> {
        Ok(ShareOutcome::Download { file_name: meme.file_name.clone(), png: meme.png.clone() })
    }
}

/// Walks the strategies in order; failures are logged and skipped.
/// Ends in a download when nothing else succeeds.
pub async fn share_with_fallback(strategies: &[Box<dyn ShareStrategy>], meme: &ExportedMeme) -> ShareOutcome {
    for strategy in strategies {
        if !strategy.is_available(meme) {
            tracing::debug!(strategy = strategy.name(), "share strategy unavailable, skipping");
            continue;
        }
        match strategy.share(meme).await {
            Ok(outcome) => {
                tracing::info!(strategy = strategy.name(), "meme shared");
                return outcome;
            }
            Err(e) => {
                tracing::warn!(strategy = strategy.name(), error = %e, "share strategy failed, trying next");
            }
        }
    }
    ShareOutcome::Download { file_name: meme.file_name.clone(), png: meme.png.clone() }
}
