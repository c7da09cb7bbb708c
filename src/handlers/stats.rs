use axum::{extract::State, Json};

use crate::domain::HistoryOrder;
use crate::error::AppError;
use crate::services::ActivityStats;
use crate::AppState;

/// Transactions per sender and per day, plus users per effective role.
pub async fn activity_stats(
    State(state): State<AppState>,
) -> Result<Json<ActivityStats>, AppError> {
    let events = state
        .reconciler
        .fetch_history(None, HistoryOrder::NewestFirst)
        .await?;
    let users = state.roles.list_users().await?;
    Ok(Json(ActivityStats::summarize(&events, &users)))
}
