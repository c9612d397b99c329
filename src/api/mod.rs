use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    address::display_address,
    eth::EthClient,
    models::{EventKind, StatsReport},
    service::{StatsError, StatsQuery, StatsService},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StatsService<EthClient>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct EventInfo {
    key: u8,
    name: EventKind,
    topic: Option<String>,
}

#[derive(Serialize)]
struct EventsResponse {
    contract: String,
    events: Vec<EventInfo>,
}

#[derive(Deserialize)]
struct StatsParams {
    addresses: String,
    #[serde(default = "all_events")]
    events: String,
}

fn all_events() -> String {
    "all".to_string()
}

struct ApiError(StatsError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            StatsError::NoValidAddresses { rejected } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.0.to_string(), "rejected": rejected }),
            ),
            StatsError::InvalidSelection(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.0.to_string() }),
            ),
            StatsError::Fetch(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": self.0.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn events(State(state): State<AppState>) -> Json<EventsResponse> {
    let contract = state.service.contract();
    let events = EventKind::ALL
        .into_iter()
        .map(|kind| EventInfo {
            key: kind.key(),
            name: kind,
            topic: contract.topic(kind).map(|t| format!("{:#x}", t)),
        })
        .collect();
    Json(EventsResponse {
        contract: display_address(&contract.address()),
        events,
    })
}

async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsReport>, ApiError> {
    let query = StatsQuery::parse(&params.addresses, &params.events).map_err(ApiError)?;
    let report = state.service.run(&query).await.map_err(|err| {
        tracing::warn!("stats request failed: {}", err);
        ApiError(err)
    })?;
    Ok(Json(report))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", get(events))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn run_http_server(addr: &str, state: AppState) -> Result<()> {
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
