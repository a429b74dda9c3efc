use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("User profile not found: {0}")]
    NotFound(String),

    #[error("Stored record is malformed: {0}")]
    DataCorruption(String),

    #[error("Persistence backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

/// Failures talking to the completion provider. The synthesizer turns every
/// variant into the apology answer; none of them reach the HTTP layer.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion response had no message content")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not decode uploaded image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Could not encode meme image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Could not load meme font: {0}")]
    Font(String),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing form field: {0}")]
    MissingFormField(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    #[error("Missing or empty x-user-id header")]
    Unauthenticated,
    #[error("A request is already in progress for user {0}")]
    RequestInFlight(String),

    // Domain/Service level errors
    #[error("User profile not found: {0}")]
    ProfileNotFound(String),
    #[error("Could not access user data")]
    RepositoryError(#[source] RepoError),
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError),
    #[error("Could not render meme")]
    RenderError(#[source] RenderError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(user_id) => AppError::ProfileNotFound(user_id),
            e => AppError::RepositoryError(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageError(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::RenderError(err)
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InitError(err.to_string())
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MissingFormField(field) => (StatusCode::BAD_REQUEST, format!("Missing form field: {}", field)),
            AppError::MultipartError(e) => (StatusCode::BAD_REQUEST, format!("Invalid multipart form data: {}", e)),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Please login first!".to_string()),
            AppError::RequestInFlight(_) => (
                StatusCode::CONFLICT,
                "ProblemBaba is still thinking about your last problem".to_string(),
            ),
            AppError::ProfileNotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
            AppError::RenderError(RenderError::Decode(e)) => {
                (StatusCode::BAD_REQUEST, format!("Unsupported or corrupt image: {}", e))
            }

            // 5xx Server Errors
            AppError::RenderError(e) => {
                tracing::error!(error.source = ?e, "Render error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Meme rendering failed".to_string())
            }
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string())
            }
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "File storage operation failed".to_string())
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        tracing::warn!(error.message = %error_message, error.detail = %self, status = %status, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

// Helper macro for creating internal server errors with context
macro_rules! internal_error {
    ($err:expr) => {
        $crate::errors::AppError::InternalServerError(format!("{}: {}", std::line!(), $err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AppError::InternalServerError(format!(concat!("{}: ", $fmt), std::line!(), $($arg)*))
    };
}
pub(crate) use internal_error;
