use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::domain::{HistoryOrder, TransactionEvent};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// `asc` or `desc`; newest first when absent.
    pub order: Option<String>,
}

pub async fn global_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionEvent>>, AppError> {
    let order = match query.order {
        Some(raw) => raw.parse::<HistoryOrder>().map_err(AppError::BadRequest)?,
        None => HistoryOrder::NewestFirst,
    };
    let events = state.reconciler.fetch_history(None, order).await?;
    Ok(Json(events))
}
