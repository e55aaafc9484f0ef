//! HTTP handlers for stock record endpoints

use axum::{extract::State, http::StatusCode, Json};
use shared::{
    ApiResponse, LedgerEntry, PaginatedResponse, Pagination, Reconciliation, StockRecord,
    StockRecordDetail,
};
use uuid::Uuid;

use super::{JsonBody, PathParam, QueryParams};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock::{CreateStockInput, StockQuery, UpdateStockInput};
use crate::AppState;

/// Create a stock record
pub async fn create_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    JsonBody(input): JsonBody<CreateStockInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockRecord>>)> {
    current_user.0.require("inventory", "create")?;
    let record = state.stock().create(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

/// List stock records
pub async fn list_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    QueryParams(query): QueryParams<StockQuery>,
) -> AppResult<Json<ApiResponse<Vec<StockRecord>>>> {
    current_user.0.require("inventory", "view")?;
    let records = state.stock().list(query).await?;
    Ok(Json(ApiResponse::ok(records)))
}

/// Get a stock record with its recent entries
pub async fn get_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(record_id): PathParam<Uuid>,
) -> AppResult<Json<ApiResponse<StockRecordDetail>>> {
    current_user.0.require("inventory", "view")?;
    let detail = state.stock().get(record_id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Update the reorder threshold
pub async fn update_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(record_id): PathParam<Uuid>,
    JsonBody(input): JsonBody<UpdateStockInput>,
) -> AppResult<Json<ApiResponse<StockRecord>>> {
    current_user.0.require("inventory", "edit")?;
    let record = state
        .stock()
        .update(current_user.0.user_id, record_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(record)))
}

/// Void an empty stock record
pub async fn void_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(record_id): PathParam<Uuid>,
) -> AppResult<Json<ApiResponse<StockRecord>>> {
    current_user.0.require("inventory", "delete")?;
    let record = state.stock().void(current_user.0.user_id, record_id).await?;
    Ok(Json(ApiResponse::ok(record)))
}

/// Page through the ledger of a stock record
pub async fn list_stock_entries(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(record_id): PathParam<Uuid>,
    QueryParams(pagination): QueryParams<Pagination>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<LedgerEntry>>>> {
    current_user.0.require("inventory", "view")?;
    let page = state.stock().entries(record_id, pagination).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// Compare the stored balance with the ledger fold
pub async fn reconcile_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    PathParam(record_id): PathParam<Uuid>,
) -> AppResult<Json<ApiResponse<Reconciliation>>> {
    current_user.0.require("inventory", "view")?;
    let report = state.stock().reconcile(record_id).await?;
    Ok(Json(ApiResponse::ok(report)))
}
