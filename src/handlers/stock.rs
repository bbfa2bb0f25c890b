// src/handlers/stock.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::inventory::{SalesPointStock, StockTransaction, StockTxnReason},
};

// Saldo com as quantidades derivadas já calculadas, como os painéis esperam.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLevelView {
    #[serde(flatten)]
    pub stock: SalesPointStock,
    pub remaining_qty: i32,
    pub available_qty: i32,
}

impl From<SalesPointStock> for StockLevelView {
    fn from(stock: SalesPointStock) -> Self {
        let remaining_qty = stock.remaining_qty();
        let available_qty = stock.available_qty();
        Self {
            stock,
            remaining_qty,
            available_qty,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/stock/{salespointId}/levels",
    responses((status = 200, body = [StockLevelView])),
    security(("bearer_auth" = []))
)]
pub async fn list_levels(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(salespoint_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let levels = app_state
        .stock_service
        .repo()
        .list_levels(&app_state.db_pool, salespoint_id)
        .await?;
    let views: Vec<StockLevelView> = levels.into_iter().map(StockLevelView::from).collect();
    Ok((StatusCode::OK, Json(views)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JournalFilters {
    pub product_id: Option<Uuid>,
    pub reason: Option<StockTxnReason>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/stock/{salespointId}/transactions",
    responses((status = 200, body = [StockTransaction])),
    security(("bearer_auth" = []))
)]
pub async fn list_transactions(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(salespoint_id): Path<Uuid>,
    Query(filters): Query<JournalFilters>,
) -> Result<impl IntoResponse, AppError> {
    let limit = filters.limit.unwrap_or(100).clamp(1, 500);
    let rows = app_state
        .stock_service
        .repo()
        .list_transactions(
            &app_state.db_pool,
            salespoint_id,
            filters.product_id,
            filters.reason,
            limit,
        )
        .await?;
    Ok((StatusCode::OK, Json(rows)))
}
