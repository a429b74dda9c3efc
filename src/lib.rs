pub mod account;
pub mod config;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod meme;
pub mod models;
pub mod provider;
pub mod related;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod startup;
pub mod storage;
pub mod synthesizer;

use std::sync::Arc;

use crate::config::{Config, PersistenceBackend};
use crate::domain::{FileStorage, ProblemRepository};
use crate::errors::AppError;
use crate::meme::{BlockTypeface, GlyphTypeface, MemeCompositor, Typeface};
use crate::provider::ChatCompletionsProvider;
use crate::repositories::{DynamoDbProblemRepository, InMemoryProblemRepository};
use crate::session::SessionRegistry;
use crate::storage::S3FileStorage;
use crate::synthesizer::Synthesizer;

/// A file store plus the bucket it writes to, for share links.
#[derive(Clone)]
pub struct SharedStorage {
    pub storage: Arc<dyn FileStorage>,
    pub bucket_name: String,
}

/// Shared resources handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ProblemRepository>,
    pub file_storage: Option<SharedStorage>,
    pub synthesizer: Synthesizer,
    pub compositor: MemeCompositor,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn ProblemRepository>,
        file_storage: Option<SharedStorage>,
        synthesizer: Synthesizer,
        compositor: MemeCompositor,
    ) -> Self {
        Self { repo, file_storage, synthesizer, compositor, sessions: SessionRegistry::default() }
    }
}

fn load_typeface(config: &Config) -> Result<Arc<dyn Typeface>, AppError> {
    match &config.meme_font_path {
        Some(path) => {
            let typeface = GlyphTypeface::from_file(path)?;
            tracing::info!(font = %path.display(), "Loaded meme font");
            Ok(Arc::new(typeface))
        }
        None => {
            tracing::warn!("MEME_FONT_PATH not set; captions use block glyphs");
            Ok(Arc::new(BlockTypeface))
        }
    }
}

/// Wires up clients and backends from configuration.
pub async fn build_state(config: &Config) -> Result<AppState, AppError> {
    let provider = ChatCompletionsProvider::new(&config.completion)
        .map_err(|e| AppError::InitError(format!("Failed to build completion client: {}", e)))?;
    let synthesizer = Synthesizer::new(Arc::new(provider));
    let compositor = MemeCompositor::new(config.canvas_width, config.canvas_height, load_typeface(config)?);

    let (repo, file_storage): (Arc<dyn ProblemRepository>, Option<SharedStorage>) = match config.persistence {
        PersistenceBackend::Memory => {
            tracing::info!("Using in-memory persistence; data is lost on restart");
            (Arc::new(InMemoryProblemRepository::default()), None)
        }
        PersistenceBackend::DynamoDb => {
            let sdk_config = startup::create_sdk_config(config).await;
            let db_client = startup::create_dynamodb_client(&sdk_config);
            let s3_client = config
                .meme_bucket_name
                .as_ref()
                .map(|_| startup::create_s3_client(&sdk_config));
            startup::init_resources(&db_client, s3_client.as_ref(), config).await?;

            let file_storage = match (s3_client, &config.meme_bucket_name) {
                (Some(client), Some(bucket)) => {
                    let s3 = S3FileStorage::new(client, bucket.clone());
                    Some(SharedStorage { bucket_name: s3.bucket_name().to_string(), storage: Arc::new(s3) })
                }
                _ => None,
            };
            (
                Arc::new(DynamoDbProblemRepository::new(db_client, config.tables.clone())),
                file_storage,
            )
        }
    };

    Ok(AppState::new(repo, file_storage, synthesizer, compositor))
}
