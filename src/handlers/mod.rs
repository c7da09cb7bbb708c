pub mod history;
pub mod products;
pub mod stats;
pub mod users;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub ledger: DependencyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let ledger = match state.ledger.product_count().await {
        Ok(_) => DependencyStatus::Healthy {
            status: "reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => DependencyStatus::Unhealthy {
            status: "unreachable".to_string(),
            error: e.to_string(),
        },
    };

    let healthy = matches!(ledger, DependencyStatus::Healthy { .. });
    let body = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger,
        circuit_breaker: state.ledger.circuit_state(),
    };

    // Return 503 if the ledger is down, 200 otherwise
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(body))
}
