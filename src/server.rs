//! HTTP server for device pages.
//!
//! This module provides an HTTP server that:
//! - Accepts raw `deviceorientation`/`devicemotion` events via POST /events
//! - Toggles recording and classifying via POST /recording and POST /classifying
//! - Exposes the status text and counters via GET /status
//!
//! # Architecture
//!
//! ```text
//! Device page ──→ POST /events ──→ SensorBus ──→ sessions ──→ collectors / classifiers
//!             ──→ POST /recording, /classifying ──→ SessionController
//! ```

use crate::config::Config;
use crate::core::{RecordingLabels, SessionController, SessionError};
use crate::device::{generate_subject_id, DeviceTags};
use crate::sensor::{Sample, SensorBus};
use crate::service::collector_service;
use crate::stats::{create_shared_stats_with_persistence, SharedStats, StatsSnapshot};
use crate::status::StatusBoard;
use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// Activity recorded when a request names none.
pub const DEFAULT_ACTIVITY: &str = "unlabeled";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Agent configuration
    pub config: Config,
    /// Upload datasets to the backend instead of writing files
    pub remote: bool,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, config: Config, remote: bool) -> Self {
        Self {
            port,
            config,
            remote,
        }
    }
}

/// Shared server state
pub struct ServerState {
    controller: Mutex<SessionController>,
    bus: SensorBus,
    status: StatusBoard,
    stats: SharedStats,
    /// Participant ID used when a recording request names none
    subject_id: String,
}

impl ServerState {
    pub fn new(controller: SessionController) -> Self {
        Self {
            bus: controller.bus().clone(),
            status: controller.status().clone(),
            stats: Arc::clone(controller.stats()),
            controller: Mutex::new(controller),
            subject_id: generate_subject_id(),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Current status text
    pub status: String,
    pub recording: bool,
    pub classifying: bool,
    pub subject_id: String,
    pub stats: StatsSnapshot,
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Events parsed and published
    pub accepted: usize,
    /// Deliveries to live subscriptions
    pub delivered: usize,
}

/// Body of POST /recording
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingRequest {
    pub enabled: bool,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
}

/// Body of POST /classifying
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyingRequest {
    pub enabled: bool,
}

/// Response from the toggle endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub enabled: bool,
    pub status: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn session_error(e: SessionError) -> ApiError {
    let status = match e {
        SessionError::AlreadyActive(_) => StatusCode::CONFLICT,
        SessionError::ModelUnavailable(_) | SessionError::PredictionUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SessionError::CollectorUnavailable { .. }
        | SessionError::ClassifierUnavailable { .. }
        | SessionError::FinalizeFailed(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let (recording, classifying) = {
        let controller = state.controller.lock().await;
        (controller.is_recording(), controller.is_classifying())
    };

    Json(StatusResponse {
        status: state.status.get(),
        recording,
        classifying,
        subject_id: state.subject_id.clone(),
        stats: state.stats.snapshot(),
    })
}

/// POST /events
///
/// Accepts one raw sensor event or an array of them. Events are parsed
/// before any is published, so a malformed batch publishes nothing.
async fn events(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> Result<Json<EventsResponse>, ApiError> {
    let raw = match body {
        Value::Array(items) => items,
        single => vec![single],
    };

    let samples = raw
        .into_iter()
        .enumerate()
        .map(|(i, event)| {
            Sample::from_event(event).map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("Invalid event at index {i}: {e}"),
                        code: "INVALID_EVENT".to_string(),
                    }),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let accepted = samples.len();
    let delivered = samples.into_iter().map(|s| state.bus.publish(s)).sum();

    Ok(Json(EventsResponse {
        accepted,
        delivered,
    }))
}

/// POST /recording
async fn recording(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<RecordingRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let mut controller = state.controller.lock().await;

    if request.enabled {
        if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
            controller.set_device(DeviceTags::from_user_agent(agent));
        }
        let labels = RecordingLabels::new(
            request.subject_id.unwrap_or_else(|| state.subject_id.clone()),
            request
                .activity
                .unwrap_or_else(|| DEFAULT_ACTIVITY.to_string()),
        );
        controller
            .start_recording(labels)
            .await
            .map_err(session_error)?;
    } else {
        controller.stop_recording().await.map_err(session_error)?;
        if let Err(e) = state.stats.save() {
            tracing::warn!("Could not save session stats: {e}");
        }
    }

    Ok(Json(ToggleResponse {
        enabled: controller.is_recording(),
        status: state.status.get(),
    }))
}

/// POST /classifying
async fn classifying(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ClassifyingRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let mut controller = state.controller.lock().await;

    if request.enabled {
        controller
            .start_classifying()
            .await
            .map_err(session_error)?;
    } else {
        controller.stop_classifying().await;
    }

    Ok(Json(ToggleResponse {
        enabled: controller.is_classifying(),
        status: state.status.get(),
    }))
}

/// Build the router over existing state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events", post(events))
        .route("/recording", post(recording))
        .route("/classifying", post(classifying))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Address, shutdown trigger and the task that completes open sessions
/// after the server stops.
pub type ServerHandle = (SocketAddr, oneshot::Sender<()>, JoinHandle<()>);

/// Run the HTTP server
pub async fn run(config: ServerConfig) -> anyhow::Result<ServerHandle> {
    let collectors = collector_service(&config.config, config.remote)?;
    let device = config
        .config
        .user_agent
        .as_deref()
        .map(DeviceTags::from_user_agent)
        .unwrap_or_default();
    let stats = create_shared_stats_with_persistence(config.config.stats_path());
    let controller = SessionController::from_config(&config.config, SensorBus::new(), collectors, device)
        .with_stats(stats);

    serve(config.port, Arc::new(ServerState::new(controller))).await
}

/// Serve existing state on a local port.
///
/// The returned task finishes once the server has stopped and every open
/// session has been completed.
pub async fn serve(port: u16, state: Arc<ServerState>) -> anyhow::Result<ServerHandle> {
    let app = router(Arc::clone(&state));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Motion sensor server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }

        // Complete any open datasets before the state goes away
        if let Err(e) = state.controller.lock().await.shutdown().await {
            tracing::error!("Failed to stop sessions: {e}");
        }
        if let Err(e) = state.stats.save() {
            tracing::warn!("Could not save session stats: {e}");
        }
    });

    Ok((actual_addr, shutdown_tx, task))
}
