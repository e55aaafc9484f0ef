//! HTTP handlers for stock alerts

use axum::{extract::State, Json};
use shared::{AlertReport, ApiResponse};

use super::QueryParams;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::alerts::AlertQuery;
use crate::AppState;

/// Low-stock and out-of-stock records
pub async fn list_alerts(
    State(state): State<AppState>,
    current_user: CurrentUser,
    QueryParams(query): QueryParams<AlertQuery>,
) -> AppResult<Json<ApiResponse<AlertReport>>> {
    current_user.0.require("inventory", "view")?;
    let report = state.alerts().alerts(query).await?;
    Ok(Json(ApiResponse::ok(report)))
}
