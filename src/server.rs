//! HTTP server for the HR question-answering API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask-hr` | Answer `{ "question": "..." }` from the indexed handbook |
//! | `GET`  | `/health` | Reachability of the models and the index, plus point count |
//! | `GET`  | `/ready` | `{ "ready": bool }`, 503 until every dependency is up |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "error": { "code": "VALIDATION_ERROR", "message": "Question cannot be empty" } }
//! ```
//!
//! Rate-limited responses add `"retryAfter": <seconds>`. In production,
//! messages of 500 responses are replaced with `"Internal server error"`.
//!
//! # CORS
//!
//! Development allows any origin. Production allows only
//! `server.allowed_origins`. Methods `GET`/`POST`, headers
//! `Content-Type`/`Authorization`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::GatewayError;
use crate::pipeline::{validate_question, RagPipeline};
use crate::rate_limit::RateLimiter;

const MAX_BODY_BYTES: usize = 10 * 1024;
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
    limiter: RateLimiter,
    production: bool,
    started: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, limiter: RateLimiter, production: bool) -> Self {
        Self {
            pipeline,
            limiter,
            production,
            started: Instant::now(),
        }
    }
}

/// Starts the server on `server.bind` and runs until Ctrl-C or SIGTERM.
///
/// Retriever initialization is attempted up front; a failure is logged and
/// retried lazily on the first question.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(RagPipeline::from_config(config)?);
    if let Err(e) = pipeline.retriever().initialize().await {
        warn!(error = %e, "vector index not ready yet; will retry on first request");
    }

    let limiter = RateLimiter::from_config(&config.rate_limit);
    spawn_purge_task(limiter.clone());

    let state = AppState::new(pipeline, limiter, config.server.is_production());
    let app = build_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        env = %config.server.environment,
        "server listening"
    );

    serve_on(listener, app, shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}

/// Serve `app` on an already-bound listener until `shutdown` resolves.
pub async fn serve_on<F>(listener: tokio::net::TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/ask-hr", post(handle_ask))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if !server.is_production() {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

pub fn spawn_purge_task(limiter: RateLimiter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.purge();
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down gracefully"),
        _ = terminate => info!("SIGTERM received, shutting down gracefully"),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    retry_after: Option<u64>,
}

impl AppError {
    fn from_gateway(err: GatewayError, production: bool, route: &str) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = err.code();

        if status.is_server_error() {
            error!(code, status = status.as_u16(), route, error = %err, "request failed");
        } else {
            warn!(code, status = status.as_u16(), route, error = %err, "request rejected");
        }

        let message = if production && status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            code: code.to_string(),
            message,
            retry_after: err.retry_after(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                retry_after: self.retry_after,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn body_rejection(rejection: JsonRejection) -> AppError {
    let status = rejection.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status,
            code: "PAYLOAD_TOO_LARGE".to_string(),
            message: "Request body too large".to_string(),
            retry_after: None,
        }
    } else {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR".to_string(),
            message: rejection.body_text(),
            retry_after: None,
        }
    }
}

// ============ POST /ask-hr ============

async fn handle_ask(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let fail = |e: GatewayError| AppError::from_gateway(e, state.production, "/ask-hr");

    state.limiter.check(&addr.ip().to_string()).map_err(fail)?;

    let Json(body) = body.map_err(body_rejection)?;
    let question = validate_question(body.get("question"), state.pipeline.max_question_chars())
        .map_err(fail)?;

    let outcome = state.pipeline.ask(&question).await.map_err(fail)?;

    Ok(Json(json!({ "success": true, "data": outcome })))
}

// ============ GET /health, GET /ready ============

fn up_down(up: bool) -> &'static str {
    if up {
        "up"
    } else {
        "down"
    }
}

async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let report = state.pipeline.health().await;
    let healthy = report.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "uptime": state.started.elapsed().as_secs_f64(),
        "services": {
            "embedding": { "status": up_down(report.embedding) },
            "generation": { "status": up_down(report.generation) },
            "index": {
                "status": up_down(report.index.connected),
                "collection": report.index.collection,
                "vectorCount": report.index.point_count,
            },
        },
    });
    (status, Json(body))
}

async fn handle_ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.pipeline.health().await.is_healthy() {
        (StatusCode::OK, Json(json!({ "ready": true })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ready": false })))
    }
}

async fn handle_not_found(method: Method, uri: Uri) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "NOT_FOUND".to_string(),
        message: format!("Route {} {} not found", method, uri.path()),
        retry_after: None,
    }
}
