use axum::{extract::State, Json};

use crate::error::AppError;
use crate::services::RoleAssignment;
use crate::AppState;

/// Ledger roles with local overrides applied.
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleAssignment>>, AppError> {
    Ok(Json(state.roles.list_users().await?))
}
