use crate::{
    handlers,
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/profile", post(handlers::create_profile).get(handlers::get_profile))
        .route("/chat", post(handlers::chat))
        .route("/questions", get(handlers::list_questions))
        .route("/streak/check-in", post(handlers::check_in))
        .route("/meme/render", post(handlers::render_meme))
        .route("/meme/share", post(handlers::share_meme))
        .route("/payments/checkout", get(handlers::checkout_options))
        .route("/payments/confirm", post(handlers::confirm_payment))
        .route("/related", get(handlers::related_content))
        .route("/category", get(handlers::problem_category))
        .route("/problem-of-the-day", get(handlers::problem_of_the_day))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        // Uploaded base images for memes
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
