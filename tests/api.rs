use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use problem_baba::{
    domain::{CompletionProvider, FileStorage, ProblemRepository},
    errors::{ProviderError, StorageError},
    meme::{BlockTypeface, MemeCompositor},
    repositories::InMemoryProblemRepository,
    routes::create_router,
    synthesizer::{Synthesizer, APOLOGY_TEXT},
    AppState, SharedStorage,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

const BOUNDARY: &str = "problem-baba-test-boundary";

/// Replies with a fixed text, optionally waiting for a release signal first.
struct StubProvider {
    reply: Result<String, ()>,
    calls: Mutex<Vec<(String, String)>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl StubProvider {
    fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.into()), calls: Mutex::new(Vec::new()), gate: None, entered: Arc::new(Notify::new()) }
    }

    fn failing() -> Self {
        Self { reply: Err(()), ..Self::replying("") }
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push((system_prompt.into(), user_prompt.into()));
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(()) => Err(ProviderError::Status { status: 500, body: "boom".into() }),
        }
    }
}

struct BrokenStorage;

#[async_trait]
impl FileStorage for BrokenStorage {
    async fn upload(&self, _key: &str, _data: Vec<u8>, _content_type: Option<String>) -> Result<(), StorageError> {
        Err(StorageError::UploadFailed("no bucket".into()))
    }
}

struct TestApp {
    router: Router,
    repo: Arc<InMemoryProblemRepository>,
}

fn test_app(provider: Arc<StubProvider>, storage: Option<SharedStorage>) -> TestApp {
    let repo = Arc::new(InMemoryProblemRepository::default());
    let state = AppState::new(
        repo.clone(),
        storage,
        Synthesizer::new(provider),
        MemeCompositor::new(200, 150, Arc::new(BlockTypeface)),
    );
    TestApp { router: create_router(Arc::new(state)), repo }
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let fields: Vec<(&str, Vec<u8>)> = fields.iter().map(|(name, value)| (*name, value.as_bytes().to_vec())).collect();
    multipart_bytes_request(uri, &fields)
}

fn multipart_bytes_request(uri: &str, fields: &[(&str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_saved_questions(repo: &InMemoryProblemRepository, user: &str, expected: usize) {
    for _ in 0..100 {
        if repo.list_recent_qa(user, 10).await.unwrap().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("questions for {user} were never saved");
}

#[tokio::test]
async fn plain_chat_returns_raw_answer_and_saves_question() {
    let provider = Arc::new(StubProvider::replying("Put your phone in another room."));
    let app = test_app(provider.clone(), None);

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/chat",
            Some("u1"),
            serde_json::json!({ "problem": "How to focus?", "format": "plain", "personality": "serious" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text"], "Put your phone in another room.");
    assert_eq!(
        body["data"],
        serde_json::json!({ "share_text": "Problem: How to focus?\nSolution: Put your phone in another room...." })
    );
    assert!(body.get("meme_captions").is_none());

    {
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.starts_with("You are a wise and experienced advisor"));
        assert!(calls[0].1.ends_with("Provide a clear, practical solution."));
    }

    wait_for_saved_questions(&app.repo, "u1", 1).await;
    let response = app.router.oneshot(get_request("/questions?limit=5", Some("u1"))).await.unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed[0]["question"], "How to focus?");
    assert_eq!(listed[0]["preview"], "How to focus?...");
    assert_eq!(listed[0]["asked"], "Just now");
    assert_eq!(listed[0]["personality"], "serious");
}

#[tokio::test]
async fn meme_chat_strips_tags_and_suggests_captions() {
    let provider = Arc::new(StubProvider::replying("SOLUTION: Unplug the router. Wait ten seconds | MEME: Have you tried turning it off"));
    let app = test_app(provider, None);

    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/chat",
            Some("u1"),
            serde_json::json!({ "problem": "Wifi keeps dropping", "format": "meme", "personality": "chaotic" }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["text"], "Unplug the router. Wait ten seconds");
    assert_eq!(body["data"]["meme_text"], "Have you tried turning it off");
    assert_eq!(body["meme_captions"]["top_text"], "Unplug the router");
    assert_eq!(body["meme_captions"]["bottom_text"], "Wait ten seconds");
}

#[tokio::test]
async fn provider_failure_degrades_to_apology() {
    let app = test_app(Arc::new(StubProvider::failing()), None);
    let response = app
        .router
        .oneshot(json_request("POST", "/chat", Some("u1"), serde_json::json!({ "problem": "Anything" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text"], APOLOGY_TEXT);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn chat_rejects_anonymous_and_blank_requests() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);
    let anonymous = app
        .router
        .clone()
        .oneshot(json_request("POST", "/chat", None, serde_json::json!({ "problem": "hi" })))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let blank = app
        .router
        .oneshot(json_request("POST", "/chat", Some("u1"), serde_json::json!({ "problem": "   " })))
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overlapping_chat_for_same_user_is_rejected_then_released() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(StubProvider { gate: Some(gate.clone()), ..StubProvider::replying("slow answer") });
    let app = test_app(provider.clone(), None);

    let first = tokio::spawn(app.router.clone().oneshot(json_request(
        "POST",
        "/chat",
        Some("u1"),
        serde_json::json!({ "problem": "first" }),
    )));
    provider.entered.notified().await;

    let second = app
        .router
        .clone()
        .oneshot(json_request("POST", "/chat", Some("u1"), serde_json::json!({ "problem": "second" })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Flag is cleared once the first request completes.
    let provider_calls_before = provider.calls.lock().unwrap().len();
    let third = tokio::spawn(app.router.clone().oneshot(json_request(
        "POST",
        "/chat",
        Some("u1"),
        serde_json::json!({ "problem": "third" }),
    )));
    provider.entered.notified().await;
    gate.notify_one();
    assert_eq!(third.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(provider.calls.lock().unwrap().len(), provider_calls_before + 1);
}

#[tokio::test]
async fn profile_and_check_in_flow() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);

    let created = app
        .router
        .clone()
        .oneshot(json_request("POST", "/profile", Some("u7"), serde_json::json!({ "email": "seven@example.com" })))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let fetched = body_json(app.router.clone().oneshot(get_request("/profile", Some("u7"))).await.unwrap()).await;
    assert_eq!(fetched["profile"]["subscription_status"], "trial");
    assert_eq!(fetched["subscription"]["label"], "Trial: 30 days left");

    // Profile was created today with streak 0, so a same-day check-in keeps it.
    let checked = body_json(app.router.clone().oneshot(json_request("POST", "/streak/check-in", Some("u7"), Value::Null)).await.unwrap()).await;
    assert_eq!(checked["streak"], 0);

    let missing = app.router.oneshot(json_request("POST", "/streak/check-in", Some("ghost"), Value::Null)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_confirmation_outcomes() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);

    let orphan = app
        .router
        .clone()
        .oneshot(json_request("POST", "/payments/confirm", Some("nobody"), serde_json::json!({ "payment_id": "pay_1" })))
        .await
        .unwrap();
    assert_eq!(orphan.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(orphan).await["status"], "paid_but_account_not_updated");

    app.router
        .clone()
        .oneshot(json_request("POST", "/profile", Some("u2"), serde_json::json!({ "email": "two@example.com" })))
        .await
        .unwrap();
    let confirmed = app
        .router
        .clone()
        .oneshot(json_request("POST", "/payments/confirm", Some("u2"), serde_json::json!({ "payment_id": "pay_2" })))
        .await
        .unwrap();
    assert_eq!(confirmed.status(), StatusCode::OK);
    assert_eq!(body_json(confirmed).await["status"], "confirmed");

    let profile = body_json(app.router.clone().oneshot(get_request("/profile", Some("u2"))).await.unwrap()).await;
    assert_eq!(profile["subscription"]["label"], "Pro Member");
    assert_eq!(app.repo.payments().len(), 2);

    let checkout = body_json(app.router.oneshot(get_request("/payments/checkout", Some("u2"))).await.unwrap()).await;
    assert_eq!(checkout["amount"], 5000);
    assert_eq!(checkout["currency"], "INR");
}

#[tokio::test]
async fn meme_render_returns_png_download() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);
    let response = app
        .router
        .oneshot(multipart_request("/meme/render", &[("top_text", "when the build is green"), ("bottom_text", "first try")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"problem-baba-meme-"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 150));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn uploaded_image_is_resized_and_captioned() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);
    let mut upload = Vec::new();
    image::RgbaImage::from_pixel(640, 480, image::Rgba([0, 0, 255, 255]))
        .write_to(&mut std::io::Cursor::new(&mut upload), image::ImageFormat::Png)
        .unwrap();

    let response = app
        .router
        .oneshot(multipart_bytes_request(
            "/meme/render",
            &[("image", upload), ("top_text", "TOP".as_bytes().to_vec())],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let rendered = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(rendered.dimensions(), (200, 150));
    // Corner keeps the uploaded colour; the caption row is painted over it.
    assert_eq!(rendered.get_pixel(2, 2).0, [0, 0, 255, 255]);
    assert_eq!(rendered.get_pixel(100, 50).0, [255, 255, 255, 255]);
}

#[tokio::test]
async fn meme_render_rejects_garbage_image() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);
    let response = app
        .router
        .oneshot(multipart_request("/meme/render", &[("image", "definitely not an image"), ("top_text", "hi")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn meme_share_falls_back_through_tiers() {
    let broken = SharedStorage { storage: Arc::new(BrokenStorage), bucket_name: "memes".into() };
    let app = test_app(Arc::new(StubProvider::replying("x")), Some(broken));

    let clipboard = app
        .router
        .clone()
        .oneshot(multipart_request("/meme/share", &[("top_text", "hello"), ("clipboard", "true")]))
        .await
        .unwrap();
    assert_eq!(clipboard.status(), StatusCode::OK);
    let body = body_json(clipboard).await;
    assert_eq!(body["method"], "clipboard");
    assert!(body["data_url"].as_str().unwrap().starts_with("data:image/png;base64,"));

    let download = app
        .router
        .oneshot(multipart_request("/meme/share", &[("top_text", "hello")]))
        .await
        .unwrap();
    assert_eq!(download.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn related_links_and_category() {
    let app = test_app(Arc::new(StubProvider::replying("x")), None);
    let links = body_json(app.router.clone().oneshot(get_request("/related?problem=slow%20laptop", None)).await.unwrap()).await;
    assert_eq!(links["google"], "https://www.google.com/search?q=slow%20laptop%20solution%20tutorial");

    let category = body_json(app.router.clone().oneshot(get_request("/category?problem=college%20exam%20stress", None)).await.unwrap()).await;
    assert_eq!(category["category"], "health");

    let potd = body_json(app.router.oneshot(get_request("/problem-of-the-day", None)).await.unwrap()).await;
    assert!(potd["problem"].as_str().unwrap().ends_with('?'));
}
