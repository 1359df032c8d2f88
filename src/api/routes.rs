use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::api::dto::*;
use crate::api::rate_limiter::{rate_limit_middleware, RateLimiter};
use crate::auth::TenantIdentity;
use crate::config::Config;
use crate::orchestrator::{
    QuotaItem, QuotaStatus, TurnError, TurnOrchestrator, TurnOutcome, TurnRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, orchestrator: Arc<TurnOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status and body for each turn failure.
pub fn turn_error_response(err: &TurnError) -> ApiError {
    let (status, code) = match err {
        TurnError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalidPayload"),
        TurnError::SessionNotFound => (StatusCode::NOT_FOUND, "sessionNotFound"),
        TurnError::ChatNotFound => (StatusCode::NOT_FOUND, "chatNotFound"),
        TurnError::MissingCredential { .. } => (StatusCode::BAD_REQUEST, "missingApiKey"),
        TurnError::TokenLimitExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "tokenLimit"),
        TurnError::ModelFailed { .. } => (StatusCode::BAD_GATEWAY, "modelFailed"),
        TurnError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    let mut body = ErrorResponse::new(err.to_string(), code);
    match err {
        TurnError::TokenLimitExceeded { status } => {
            body = body.with_details(json!({ "limits": status.items }));
        }
        TurnError::ModelFailed {
            user_message_id, ..
        } => {
            body = body.with_details(json!({
                "userMessagePersisted": true,
                "userMessageId": user_message_id,
            }));
        }
        TurnError::MissingCredential { provider, .. } => {
            body = body.with_details(json!({ "provider": provider.as_str() }));
        }
        TurnError::Storage(e) => {
            tracing::error!("Turn failed with storage error: {}", e);
            body.error = "Internal storage error".to_string();
        }
        _ => {}
    }

    (status, Json(body))
}

/// Body rejections (bad JSON, wrong types, wrong content type) are
/// reported as `invalidPayload` like any other rejected turn.
fn turn_payload(
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<ChatTurnRequest, ApiError> {
    payload.map(|Json(req)| req).map_err(|rejection| {
        tracing::debug!(status = %rejection.status(), "Rejected turn body: {}", rejection.body_text());
        turn_error_response(&TurnError::InvalidPayload(rejection.body_text()))
    })
}

fn turn_request(identity: TenantIdentity, req: &ChatTurnRequest) -> TurnRequest {
    TurnRequest {
        organization_id: identity.organization_id,
        member_id: identity.member_id,
        session_id: req.session_id.clone().unwrap_or_default(),
        content: req.user_content().unwrap_or_default().to_string(),
        locale: req.locale.clone(),
    }
}

fn turn_response(outcome: TurnOutcome) -> ChatTurnResponse {
    ChatTurnResponse {
        session_id: outcome.session_id,
        user_message_id: outcome.user_message_id,
        assistant_message_id: outcome.assistant_message.id,
        content: outcome.assistant_message.content,
        model_invoked: outcome.model_invoked,
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/chat",
    request_body = ChatTurnRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatTurnResponse),
        (status = 400, description = "Invalid payload or missing provider credential", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Session or chat not found", body = ErrorResponse),
        (status = 429, description = "Token limit or rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Model call failed; the user message was stored", body = ErrorResponse)
    )
)]
pub async fn chat(
    identity: TenantIdentity,
    State(state): State<AppState>,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    let req = turn_payload(payload)?;
    let outcome = state
        .orchestrator
        .run_turn(turn_request(identity, &req))
        .await
        .map_err(|e| turn_error_response(&e))?;

    Ok(Json(turn_response(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/chat/stream",
    request_body = ChatTurnRequest,
    responses(
        (status = 200, description = "SSE stream of `delta` events, then `done` or `error`"),
        (status = 400, description = "Invalid payload or missing provider credential", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Session or chat not found", body = ErrorResponse),
        (status = 429, description = "Token limit or rate limit exceeded", body = ErrorResponse)
    )
)]
pub async fn chat_stream(
    identity: TenantIdentity,
    State(state): State<AppState>,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let req = turn_payload(payload)?;
    let prepared = state
        .orchestrator
        .prepare(turn_request(identity, &req))
        .await
        .map_err(|e| turn_error_response(&e))?;

    let (event_tx, event_rx) = mpsc::channel::<Event>(64);
    let orchestrator = state.orchestrator.clone();

    // Detached so a disconnecting client never interrupts persistence.
    tokio::spawn(async move {
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
        let forward_tx = event_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(delta) = delta_rx.recv().await {
                let _ = forward_tx.send(delta_event(&delta)).await;
            }
        });

        let result = orchestrator.complete_turn(prepared, Some(delta_tx)).await;
        let _ = forwarder.await;

        let last = match result {
            Ok(outcome) => json_event("done", &turn_response(outcome)),
            Err(e) => {
                let (_, Json(body)) = turn_error_response(&e);
                json_event("error", &body)
            }
        };
        let _ = event_tx.send(last).await;
    });

    let events = stream::unfold(event_rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn delta_event(text: &str) -> Event {
    json_event("delta", &json!({ "text": text }))
}

fn json_event<T: serde::Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

#[utoipa::path(
    get,
    path = "/api/v1/quota",
    responses(
        (status = 200, description = "Token usage per configured interval", body = QuotaResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn quota(
    identity: TenantIdentity,
    State(state): State<AppState>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let QuotaStatus { blocked, items } = state
        .orchestrator
        .quota()
        .check_and_status(identity.member_id, identity.organization_id, 0)
        .await
        .map_err(|e| turn_error_response(&TurnError::Storage(e)))?;

    Ok(Json(QuotaResponse { blocked, items }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(chat, chat_stream, quota, health),
    components(schemas(
        ChatTurnRequest,
        ChatTurnResponse,
        MessageDto,
        QuotaResponse,
        QuotaItem,
        HealthResponse,
        ErrorResponse
    )),
    info(title = "RagChat Controller API")
)]
pub struct ApiDoc;

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: AppState) -> Router {
    let limiter = RateLimiter::new(state.config.rate_limit_per_minute);
    limiter.spawn_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);

    let api = Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/stream", post(chat_stream))
        .route("/api/v1/quota", get(quota))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let mut router = Router::new()
        .merge(api)
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(Extension(state.config.clone()))
        .layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}
