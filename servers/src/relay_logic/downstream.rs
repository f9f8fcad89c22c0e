use crate::relay_logic::broadcast;
use crate::relay_logic::config::Config;
use crate::relay_logic::error::RelayError;
use crate::relay_logic::model::{
    HealthResponse, LatestDataResponse, RegisterRequest, RegisterResponse, SendDataRequest,
    SendDataResponse,
};
use crate::relay_logic::state::AppState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::sync::broadcast::Receiver;
use tower_http::cors::{Any, CorsLayer};

/// Serves the relay's JSON API until the shutdown signal fires.
pub async fn run(config: Config, app_state: AppState, mut shutdown: Receiver<()>) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/api/latest-data", get(latest_data_handler))
        .route("/api/register-esp", post(register_handler))
        .route("/api/send-data", post(send_data_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("IoT data relay listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind API port");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("API server shutting down.");
        })
        .await
        .expect("API server failed");
}

async fn index_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "IoT Data Relay Backend is running",
        "endpoints": {
            "GET /api/latest-data": "Get latest sensor data",
            "POST /api/register-esp": "Register ESP32 receiver URL",
            "POST /api/send-data": "Send data to registered ESP32 devices",
            "GET /api/health": "Health check"
        }
    }))
}

/// Always 200 with the last-known snapshot; a source outage is invisible here
/// beyond a stale timestamp.
async fn latest_data_handler(State(state): State<AppState>) -> Json<LatestDataResponse> {
    let (data, timestamp) = state.latest_snapshot().await;
    Json(LatestDataResponse {
        status: "success".to_string(),
        message: "Latest data from source backend".to_string(),
        data,
        timestamp,
    })
}

async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, RelayError> {
    let count = state
        .register_receiver(req.api_key.as_deref(), req.esp_url)
        .await?;
    Ok(Json(RegisterResponse {
        status: "success".to_string(),
        message: "ESP32 registered successfully".to_string(),
        registered_esps: count,
    }))
}

/// Manual broadcast: same credential check as registration, but the pushed
/// payload comes from the caller instead of the cache.
async fn send_data_handler(
    State(state): State<AppState>,
    Json(req): Json<SendDataRequest>,
) -> Result<Json<SendDataResponse>, RelayError> {
    state.authorize(req.api_key.as_deref())?;
    let data = req
        .data
        .filter(|data| !data.is_null())
        .ok_or(RelayError::MissingField("data"))?;

    let receivers = state.receiver_list().await;
    let report = broadcast::fan_out(&state.http, &data, &receivers).await;

    Ok(Json(SendDataResponse {
        status: "success".to_string(),
        message: "Broadcast complete".to_string(),
        sent: report.sent,
        failed: report.failed,
        total_esps: receivers.len(),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Relay backend is running".to_string(),
        uptime: state.uptime_secs(),
        registered_esps: state.receiver_count().await,
        last_data_update: state.last_update().await,
    })
}
