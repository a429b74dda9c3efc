use crate::{
    account::{self, CheckoutOptions, PaymentOutcome, SubscriptionView},
    errors::{internal_error, AppError, RenderError},
    meme::{
        export_png, share_with_fallback, ClipboardShare, DownloadShare, ExportedMeme, MemeCompositor, ShareOutcome,
        ShareStrategy, StorageShare,
    },
    models::{AuxData, OutputFormat, PersonalityMode, QaRecord, UserProfile},
    related::{self, RelatedLinks},
    session::CurrentUser,
    synthesizer,
    AppState,
};
use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing;

const DEFAULT_RECENT_LIMIT: usize = 5;
const MAX_RECENT_LIMIT: usize = 50;
const QUESTION_PREVIEW_CHARS: usize = 50;

// --- Profile ---

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub email: String,
}

pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::InvalidInput("a valid email is required".to_string()));
    }
    let profile = account::new_profile(&user.id, email, Utc::now());
    state.repo.create_profile(&profile).await?;
    tracing::info!(user_id = %user.id, "Profile created with 30-day trial");
    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub subscription: SubscriptionView,
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = state
        .repo
        .get_profile(&user.id)
        .await?
        .ok_or_else(|| AppError::ProfileNotFound(user.id.clone()))?;
    let subscription = account::subscription_view(&profile, Utc::now());
    Ok(Json(ProfileResponse { profile, subscription }))
}

// --- Chat ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub problem: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MemeCaptions {
    pub top_text: String,
    pub bottom_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub data: Option<AuxData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meme_captions: Option<MemeCaptions>,
    pub category: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let problem = req.problem.trim().to_string();
    if problem.is_empty() {
        return Err(AppError::InvalidInput("problem must not be empty".to_string()));
    }
    let format = OutputFormat::parse_lenient(req.format.as_deref());
    let personality = PersonalityMode::parse_lenient(req.personality.as_deref());

    // Held until the handler returns, success or not.
    let _guard = state.sessions.begin(&user.id)?;
    tracing::debug!(user_id = %user.id, %format, %personality, "Handling chat request");

    let answer = state.synthesizer.synthesize(&problem, format, personality).await;

    let record = QaRecord {
        user_id: user.id.clone(),
        question: problem.clone(),
        answer: answer.text.clone(),
        format,
        personality,
        timestamp: Utc::now(),
    };
    let repo = state.repo.clone();
    tokio::spawn(async move {
        if let Err(e) = repo.save_qa(&record).await {
            tracing::error!(user_id = %record.user_id, error = %e, "Failed to save question");
        }
    });

    let meme_captions = (format == OutputFormat::Meme).then(|| {
        let (top_text, bottom_text) = synthesizer::meme_captions(&answer.text);
        MemeCaptions { top_text, bottom_text }
    });

    Ok(Json(ChatResponse {
        text: answer.text,
        data: answer.data,
        meme_captions,
        category: related::problem_category(&problem).to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentQuestion {
    pub question: String,
    pub preview: String,
    pub answer: String,
    pub format: OutputFormat,
    pub personality: PersonalityMode,
    pub asked: String,
}

pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<RecentQuestion>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT).min(MAX_RECENT_LIMIT);
    let now = Utc::now();
    let records = state.repo.list_recent_qa(&user.id, limit).await?;
    tracing::debug!(user_id = %user.id, count = records.len(), "Listed recent questions");
    let items = records
        .into_iter()
        .map(|r| RecentQuestion {
            preview: related::preview(&r.question, QUESTION_PREVIEW_CHARS),
            asked: related::relative_time(r.timestamp, now),
            question: r.question,
            answer: r.answer,
            format: r.format,
            personality: r.personality,
        })
        .collect();
    Ok(Json(items))
}

// --- Streak ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub streak: u32,
    pub message: String,
}

pub async fn check_in(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<CheckInResponse>, AppError> {
    let streak = account::check_in(state.repo.as_ref(), &user.id, Utc::now()).await?;
    Ok(Json(CheckInResponse {
        streak,
        message: format!("🔥 Daily check-in complete! Your streak is now {} days! Keep it up!", streak),
    }))
}

// --- Meme ---

struct MemeForm {
    image: Option<Vec<u8>>,
    top_text: String,
    bottom_text: String,
    clipboard: bool,
}

async fn read_meme_form(mut multipart: Multipart) -> Result<MemeForm, AppError> {
    let mut form = MemeForm { image: None, top_text: String::new(), bottom_text: String::new(), clipboard: false };

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "top_text" => form.top_text = field.text().await?,
            "bottom_text" => form.bottom_text = field.text().await?,
            "clipboard" => form.clipboard = matches!(field.text().await?.trim(), "true" | "1" | "on"),
            "image" => {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.image = Some(bytes.to_vec());
                }
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }
    Ok(form)
}

fn compose_blocking(compositor: &MemeCompositor, form: &MemeForm) -> Result<ExportedMeme, RenderError> {
    let base = match &form.image {
        Some(bytes) => image::load_from_memory(bytes).map_err(RenderError::Decode)?,
        None => DynamicImage::ImageRgba8(compositor.default_background()),
    };
    let rendered = compositor.render(&base, &form.top_text, &form.bottom_text);
    export_png(&rendered, Utc::now())
}

// Decode, render and encode run on the blocking pool.
async fn compose(state: &AppState, form: MemeForm) -> Result<ExportedMeme, AppError> {
    let compositor = state.compositor.clone();
    let meme = tokio::task::spawn_blocking(move || compose_blocking(&compositor, &form))
        .await
        .map_err(|e| internal_error!("Meme render task failed: {}", e))??;
    Ok(meme)
}

fn png_attachment(file_name: &str, png: Vec<u8>) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, crate::meme::export::PNG_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name))
        .body(Body::from(png))
        .map_err(|e| internal_error!("Failed to build image response: {}", e))
}

/// Renders the meme and returns it as a PNG download.
pub async fn render_meme(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_meme_form(multipart).await?;
    let meme = compose(&state, form).await?;
    tracing::debug!(file_name = %meme.file_name, size = meme.png.len(), "Meme rendered");
    png_attachment(&meme.file_name, meme.png)
}

/// Renders the meme and shares it through the first strategy that works.
pub async fn share_meme(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_meme_form(multipart).await?;
    let clipboard = form.clipboard;
    let meme = compose(&state, form).await?;

    let mut strategies: Vec<Box<dyn ShareStrategy>> = Vec::new();
    if let Some(shared) = &state.file_storage {
        strategies.push(Box::new(StorageShare::new(shared.storage.clone(), shared.bucket_name.clone())));
    }
    strategies.push(Box::new(ClipboardShare::new(clipboard, ClipboardShare::DEFAULT_MAX_BYTES)));
    strategies.push(Box::new(DownloadShare));

    match share_with_fallback(&strategies, &meme).await {
        ShareOutcome::Download { file_name, png } => png_attachment(&file_name, png),
        outcome => Ok(Json(outcome).into_response()),
    }
}

// --- Payments ---

pub async fn checkout_options(_user: CurrentUser) -> Json<CheckoutOptions> {
    Json(account::checkout_options())
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
}

pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payment_id = req.payment_id.trim();
    if payment_id.is_empty() {
        return Err(AppError::MissingFormField("payment_id".to_string()));
    }
    let outcome = account::confirm_payment(state.repo.as_ref(), &user.id, payment_id, Utc::now()).await;
    let status = match outcome {
        PaymentOutcome::Confirmed { .. } => StatusCode::OK,
        // Payment went through; the account row is what failed.
        PaymentOutcome::PaidButAccountNotUpdated { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

// --- Related content ---

#[derive(Debug, Deserialize)]
pub struct ProblemQuery {
    pub problem: String,
}

pub async fn related_content(Query(query): Query<ProblemQuery>) -> Json<RelatedLinks> {
    Json(related::search_related_content(&query.problem))
}

pub async fn problem_category(Query(query): Query<ProblemQuery>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "category": related::problem_category(&query.problem) }))
}

pub async fn problem_of_the_day() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "problem": related::problem_of_the_day() }))
}
