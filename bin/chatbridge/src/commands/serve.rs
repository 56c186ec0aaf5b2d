use chatbridge_chat::{ChatService, SessionInfo};
use chatbridge_core::{Config, Error, Paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<ChatService>,
    api_token: Option<String>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub(crate) fn new(service: Arc<ChatService>, api_token: Option<String>) -> Self {
        Self {
            service,
            api_token: api_token.filter(|t| !t.is_empty()),
            started_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bearer token authentication middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = state.api_token.as_deref() else {
        return next.run(req).await;
    };

    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|presented| secure_eq(presented, token))
        .unwrap_or(false);

    if authorized {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized: invalid or missing Bearer token").into_response()
    }
}

fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ---------------------------------------------------------------------------
// HTTP request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    context_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    chat_id: String,
    result: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    sessions: usize,
    in_flight: usize,
    uptime_secs: i64,
    version: String,
}

fn error_response(err: &Error) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response_with(status, err)
}

fn error_response_with(status: StatusCode, err: &Error) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: err.kind().to_string(),
            details: err.details(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /chat: submit a prompt, optionally continuing `contextId`
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return error_response(&Error::Validation(rejection.body_text()));
        }
    };

    let request_id = uuid::Uuid::new_v4();
    let prompt = req.prompt.unwrap_or_default();
    let context_id = req.context_id.filter(|c| !c.trim().is_empty());
    info!(%request_id, context_id = ?context_id, chars = prompt.len(), "Chat request");

    match state.service.handle_prompt(&prompt, context_id.as_deref()).await {
        Ok(reply) => {
            debug!(%request_id, chat_id = %reply.session_id, "Chat request complete");
            (
                StatusCode::OK,
                Json(ChatResponse {
                    chat_id: reply.session_id,
                    result: reply.reply,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!(%request_id, kind = e.kind(), error = %e, "Chat request failed");
            error_response(&e)
        }
    }
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.service.session_count().await,
        in_flight: state.service.in_flight(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /sessions: live sessions
async fn handle_sessions_list(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.service.sessions().await)
}

/// DELETE /sessions/:id: close a session and its tab
async fn handle_session_delete(
    State(state): State<AppState>,
    AxumPath(chat_id): AxumPath<String>,
) -> Response {
    if state.service.close_session(&chat_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response_with(
            StatusCode::NOT_FOUND,
            &Error::NotFound(format!("No session {}", chat_id)),
        )
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .route("/sessions", get(handle_sessions_list))
        .route("/sessions/:id", delete(handle_session_delete))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive().allow_credentials(false))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run(host: Option<String>, port: Option<u16>, headed: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_with_env(&paths)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if headed {
        config.browser.headless = false;
    }

    let (service, _anchor) = super::start_service(&config, &paths).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let maintenance_handle = tokio::spawn(service.clone().run_maintenance(shutdown_tx.subscribe()));

    let state = AppState::new(service.clone(), config.gateway.api_token.clone());
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, auth = config.gateway.api_token.is_some(), "chatbridge listening");

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, closing sessions...");
    let _ = shutdown_tx.send(());

    for (name, handle) in [("http_server", http_handle), ("maintenance", maintenance_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Task ended abnormally during shutdown");
        }
    }

    if let Err(e) = service.shutdown().await {
        warn!(error = %e, "Browser shutdown failed");
    }
    info!("chatbridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use chatbridge_chat::testing::FakeDriver;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(token: Option<&str>) -> (Arc<FakeDriver>, Arc<ChatService>, Router) {
        let driver = Arc::new(FakeDriver::new());
        let service = Arc::new(ChatService::new(driver.clone(), &Config::default()).unwrap());
        let app = router(AppState::new(service.clone(), token.map(str::to_string)));
        (driver, service, app)
    }

    fn post_chat(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_empty_prompt_is_400() {
        let (driver, _service, app) = app_with(None);
        let resp = app.oneshot(post_chat(json!({ "prompt": "" }))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "ValidationError", "details": "No prompt provided" })
        );
        assert_eq!(driver.opened_tabs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_missing_prompt_is_400() {
        let (_driver, _service, app) = app_with(None);
        let resp = app.oneshot(post_chat(json!({ "contextId": "abc" }))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["details"], "No prompt provided");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_malformed_body_is_400() {
        let (_driver, _service, app) = app_with(None);
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "ValidationError");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_hello() {
        let (_driver, _service, app) = app_with(None);
        let resp = app
            .clone()
            .oneshot(post_chat(json!({ "prompt": "Hello" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let chat_id = body["chatId"].as_str().unwrap().to_string();
        assert!(!chat_id.is_empty());
        assert_eq!(body["result"], "Echo: Hello");

        let resp = app
            .oneshot(post_chat(json!({ "prompt": "More", "contextId": &chat_id })))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["chatId"], chat_id.as_str());
        assert_eq!(body["result"], "Echo: More");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_null_context_starts_new_session() {
        let (_driver, service, app) = app_with(None);
        let resp = app
            .oneshot(post_chat(json!({ "prompt": "Hi", "contextId": null })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_completion_timeout_is_500_and_session_recovers() {
        let (_driver, service, app) = app_with(None);
        let resp = app
            .clone()
            .oneshot(post_chat(json!({ "prompt": "first" })))
            .await
            .unwrap();
        let chat_id = body_json(resp).await["chatId"].as_str().unwrap().to_string();

        let resp = app
            .oneshot(post_chat(json!({ "prompt": "[slow] second", "contextId": &chat_id })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "CompletionTimeout");

        tokio::time::sleep(std::time::Duration::from_secs(20)).await;
        let sessions = service.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].chat_id, chat_id);
        assert_eq!(sessions[0].state, chatbridge_chat::SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_creation_failure_is_500() {
        let (driver, _service, app) = app_with(None);
        driver.configure(|b| b.fail_open_tab = true);
        let resp = app.oneshot(post_chat(json!({ "prompt": "Hello" }))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "SessionCreationFailure");
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_and_sessions() {
        let (_driver, service, app) = app_with(None);
        service.handle_prompt("Hello", None).await.unwrap();

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let health = body_json(resp).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 1);
        assert_eq!(health["inFlight"], 0);

        let resp = app
            .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let sessions = body_json(resp).await;
        assert_eq!(sessions[0]["chatId"], "thread-1");
        assert_eq!(sessions[0]["state"], "READY");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_session() {
        let (_driver, service, app) = app_with(None);
        let id = service.handle_prompt("Hello", None).await.unwrap().session_id;

        let delete = |id: &str| {
            Request::delete(format!("/sessions/{}", id))
                .body(Body::empty())
                .unwrap()
        };
        let resp = app.clone().oneshot(delete(&id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(service.session_count().await, 0);

        let resp = app.oneshot(delete(&id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "NotFound");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bearer_token_required() {
        let (_driver, _service, app) = app_with(Some("s3cret"));

        let resp = app
            .clone()
            .oneshot(post_chat(json!({ "prompt": "Hello" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut req = post_chat(json!({ "prompt": "Hello" }));
        req.headers_mut()
            .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut req = Request::get("/sessions").body(Body::empty()).unwrap();
        req.headers_mut()
            .insert(header::AUTHORIZATION, "Bearer wrong!".parse().unwrap());
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_secure_eq() {
        assert!(secure_eq("abc", "abc"));
        assert!(!secure_eq("abc", "abd"));
        assert!(!secure_eq("abc", "abcd"));
    }
}
