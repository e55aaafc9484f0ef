//! HTTP handlers for ledger movements

use axum::{extract::State, http::StatusCode, Json};
use shared::{ApiResponse, LedgerEntry};
use uuid::Uuid;

use super::{JsonBody, PathParam};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::{MovementInput, ReverseInput};
use crate::AppState;

/// Record an inbound, outbound or adjustment movement
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    JsonBody(input): JsonBody<MovementInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<LedgerEntry>>)> {
    current_user.0.require("inventory", "create")?;
    let entry = state
        .ledger()
        .apply_movement(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

/// Get a ledger entry
pub async fn get_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(entry_id): PathParam<Uuid>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    current_user.0.require("inventory", "view")?;
    let entry = state.ledger().get_entry(entry_id).await?;
    Ok(Json(ApiResponse::ok(entry)))
}

/// Reverse a ledger entry, returning the compensating entry
pub async fn reverse_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(entry_id): PathParam<Uuid>,
    JsonBody(input): JsonBody<ReverseInput>,
) -> AppResult<Json<ApiResponse<LedgerEntry>>> {
    current_user.0.require("inventory", "edit")?;
    let entry = state
        .ledger()
        .reverse_movement(current_user.0.user_id, entry_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(entry)))
}
