//! Extraction backend HTTP server.
//!
//! Accepts a base64 image, forwards it to the configured [`VisionModel`],
//! and relays the model's output to the caller.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/process-image` | Extract a checklist from `{ "base64Image": "..." }` |
//! | `OPTIONS` | `/process-image` | CORS preflight, answers `ok` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response modes
//!
//! In `stream` mode the response is `text/event-stream`: one
//! `data: {"thought":bool,"text":"..."}` record per model part, then
//! `data: [DONE]`. A model failure after the stream has started is sent as
//! `data: {"error":"..."}` and ends the stream without `[DONE]`.
//!
//! In `json` mode the answer is collected and returned as one JSON array of
//! `{text}`; a model failure is a `500` with an error body.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "No image provided" }
//! ```
//!
//! `400` for a missing or malformed body, `401` when `auth_token` is set and
//! the bearer token does not match, `500` for model failures in `json` mode.
//!
//! # CORS
//!
//! A request whose `Origin` is in `allowed_origins` gets it echoed back in
//! `Access-Control-Allow-Origin`; every other request gets the first
//! allowed origin.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, ORIGIN,
        },
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use gptodo_core::answer::parse_segments;
use gptodo_core::models::{AnswerSegment, ErrorBody, ExtractRequest};
use gptodo_core::sse::{StreamRecord, DONE_SENTINEL};

use crate::config::{Config, ResponseMode, ServerConfig};
use crate::vision::{create_model, PartStream, VisionModel};

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    model: Arc<dyn VisionModel>,
}

/// Starts the extraction backend with the model named in `[model]`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let model = create_model(&config.model)?;
    run_server_with_model(&config.server, model).await
}

/// Starts the extraction backend with a caller-supplied model.
pub async fn run_server_with_model(
    config: &ServerConfig,
    model: Arc<dyn VisionModel>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        model = model.name(),
        mode = ?config.mode,
        "extraction backend listening"
    );

    axum::serve(listener, router(config.clone(), model)).await?;
    Ok(())
}

/// Build the router without binding a socket.
pub fn router(config: ServerConfig, model: Arc<dyn VisionModel>) -> Router {
    let state = AppState {
        config: Arc::new(config),
        model,
    };

    Router::new()
        .route(
            "/process-image",
            post(handle_process_image).options(handle_preflight),
        )
        .route("/health", get(handle_health))
        .layer(middleware::from_fn_with_state(state.clone(), apply_cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ CORS ============

/// Pick the `Access-Control-Allow-Origin` value for a request.
pub fn allow_origin<'a>(allowed: &'a [String], origin: Option<&'a str>) -> &'a str {
    match origin {
        Some(origin) if allowed.iter().any(|a| a == origin) => origin,
        _ => allowed.first().map(String::as_str).unwrap_or(""),
    }
}

async fn apply_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;

    let value = allow_origin(&state.config.allowed_origins, origin.as_deref());
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

async fn handle_preflight() -> &'static str {
    "ok"
}

// ============ Error response ============

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        message: "Unauthorized".to_string(),
    }
}

fn model_error(err: anyhow::Error) -> AppError {
    warn!(error = %err, "model request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: err.to_string(),
    }
}

fn authorize(config: &ServerConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &config.auth_token else {
        return Ok(());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /process-image ============

async fn handle_process_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("process_image", %request_id);

    authorize(&state.config, &headers).inspect_err(|_| {
        warn!(%request_id, "rejected request with missing or wrong token");
    })?;

    let request: ExtractRequest =
        serde_json::from_slice(&body).map_err(|e| bad_request(format!("Invalid request body: {}", e)))?;
    let image = request.base64_image.trim().to_string();
    if image.is_empty() {
        return Err(bad_request("No image provided"));
    }

    span.in_scope(|| {
        info!(
            digest = %image_digest(&image),
            bytes = image.len(),
            model = state.model.name(),
            "processing image"
        );
    });

    match state.config.mode {
        ResponseMode::Stream => Ok(stream_response(state.model.clone(), image, span)),
        ResponseMode::Json => json_response(state.model.as_ref(), &image)
            .instrument(span)
            .await,
    }
}

/// Short content digest for correlating log lines, never the image itself.
fn image_digest(image: &str) -> String {
    let digest = Sha256::digest(image.as_bytes());
    hex::encode(&digest[..6])
}

enum Relay {
    Start(Arc<dyn VisionModel>, String),
    Streaming(PartStream),
    Finished,
}

fn stream_response(model: Arc<dyn VisionModel>, image: String, span: tracing::Span) -> Response {
    let events = stream::unfold(Relay::Start(model, image), move |relay| {
        let span = span.clone();
        async move {
            match relay {
                Relay::Start(model, image) => match model.stream_parts(&image).await {
                    Ok(parts) => next_event(parts).await,
                    Err(e) => {
                        warn!(error = %e, "model request failed");
                        Some((record_event(&StreamRecord::error(e.to_string())), Relay::Finished))
                    }
                },
                Relay::Streaming(parts) => next_event(parts).await,
                Relay::Finished => None,
            }
        }
        .instrument(span)
    });

    Sse::new(events).into_response()
}

fn record_event(record: &StreamRecord) -> Result<Event, axum::Error> {
    Event::default().json_data(record)
}

async fn next_event(mut parts: PartStream) -> Option<(Result<Event, axum::Error>, Relay)> {
    match parts.next().await {
        Some(Ok(part)) => Some((
            record_event(&StreamRecord::part(part.thought, part.text)),
            Relay::Streaming(parts),
        )),
        Some(Err(e)) => {
            warn!(error = %e, "model stream failed");
            Some((record_event(&StreamRecord::error(e.to_string())), Relay::Finished))
        }
        None => {
            info!("model stream complete");
            Some((Ok(Event::default().data(DONE_SENTINEL)), Relay::Finished))
        }
    }
}

async fn json_response(model: &dyn VisionModel, image: &str) -> Result<Response, AppError> {
    let mut parts = model.stream_parts(image).await.map_err(model_error)?;

    let mut answer = String::new();
    while let Some(part) = parts.next().await {
        let part = part.map_err(model_error)?;
        if !part.thought {
            answer.push_str(&part.text);
        }
    }

    let segments = parse_segments(&answer)
        .map_err(|e| model_error(anyhow::anyhow!("unusable model answer: {}", e)))?;
    info!(items = segments.len(), "model answer complete");

    let body: Vec<AnswerSegment> = segments
        .into_iter()
        .map(|text| AnswerSegment { text })
        .collect();
    Ok(Json(body).into_response())
}
