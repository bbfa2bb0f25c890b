// src/handlers/sales.rs

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::sales::{CancellationRequest, PaymentType, Sale, SaleItem, SaleKind},
    services::sales_service::SaleLineInput,
    services::stock_service::LowStockAlert,
};

// Ponto de venda efetivo: o vinculado ao ator, ou o explícito no payload
// (direção comercial opera em nome de qualquer ponto).
fn resolve_salespoint(
    actor_salespoint: Option<Uuid>,
    payload_salespoint: Option<Uuid>,
) -> Result<Uuid, AppError> {
    actor_salespoint
        .or(payload_salespoint)
        .ok_or_else(|| AppError::InvalidRequest("nenhum ponto de venda vinculado".into()))
}

// ---
// Payload: criação de rascunho de venda
// ---
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleLinePayload {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    pub qty: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSalePayload {
    pub salespoint_id: Option<Uuid>,
    pub kind: SaleKind,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub payment_type: PaymentType,
    #[validate(length(min = 1, message = "Pelo menos um artigo é obrigatório."), nested)]
    pub items: Vec<SaleLinePayload>,
}

#[utoipa::path(
    post,
    path = "/api/sales",
    request_body = CreateSalePayload,
    responses((status = 201, body = Sale), (status = 409, description = "Estoque insuficiente")),
    security(("bearer_auth" = []))
)]
pub async fn create_sale_draft(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateSalePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let salespoint_id = resolve_salespoint(user.0.salespoint_id, payload.salespoint_id)?;
    let lines: Vec<SaleLineInput> = payload
        .items
        .iter()
        .map(|it| SaleLineInput {
            product_id: it.product_id,
            quantity: it.qty,
            unit_price: it.unit_price,
        })
        .collect();

    let sale = app_state
        .sales_service
        .create_draft(
            &app_state.db_pool,
            salespoint_id,
            user.0.user_id,
            payload.kind,
            payload.customer_name.as_deref(),
            payload.customer_phone.as_deref(),
            payload.payment_type,
            &lines,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(sale)))
}

// ---
// Detalhe de venda (cabeçalho + linhas)
// ---
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleDetail {
    #[serde(flatten)]
    pub header: Sale,
    pub items: Vec<SaleItem>,
}

#[utoipa::path(
    get,
    path = "/api/sales/{id}",
    responses((status = 200, body = SaleDetail), (status = 404)),
    security(("bearer_auth" = []))
)]
pub async fn get_sale(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(sale_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let header = app_state
        .sales_service
        .repo()
        .get_sale(&app_state.db_pool, sale_id)
        .await?;
    let items = app_state
        .sales_service
        .repo()
        .list_items(&app_state.db_pool, sale_id)
        .await?;
    Ok((StatusCode::OK, Json(SaleDetail { header, items })))
}

#[utoipa::path(
    get,
    path = "/api/sales/number/{number}",
    responses((status = 200, body = SaleDetail), (status = 404, description = "Recibo não encontrado")),
    security(("bearer_auth" = []))
)]
pub async fn find_sale_by_number(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let salespoint_id = user
        .0
        .salespoint_id
        .ok_or_else(|| AppError::InvalidRequest("nenhum ponto de venda vinculado".into()))?;
    let (header, items) = app_state
        .sales_service
        .find_by_number(&app_state.db_pool, salespoint_id, &number)
        .await?;
    Ok((StatusCode::OK, Json(SaleDetail { header, items })))
}

// ---
// Validação na caixa
// ---
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveSalePayload {
    pub amount_received: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveSaleResponse {
    pub sale: Sale,
    pub change_due: Decimal,
    pub low_stock: Vec<LowStockAlert>,
}

#[utoipa::path(
    post,
    path = "/api/sales/{id}/approve",
    request_body = ApproveSalePayload,
    responses((status = 200, body = ApproveSaleResponse), (status = 400, description = "Montante insuficiente")),
    security(("bearer_auth" = []))
)]
pub async fn approve_sale(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(sale_id): Path<Uuid>,
    Json(payload): Json<ApproveSalePayload>,
) -> Result<impl IntoResponse, AppError> {
    if !matches!(user.0.role.as_str(), "cashier" | "admin") {
        return Err(AppError::Forbidden(
            "apenas a caixa pode validar vendas".into(),
        ));
    }

    let outcome = app_state
        .sales_service
        .approve(
            &app_state.db_pool,
            sale_id,
            user.0.user_id,
            payload.amount_received,
        )
        .await?;

    for alert in &outcome.low_stock {
        tracing::info!(
            "Estoque baixo: produto {} no ponto {} (restam {}, alerta {})",
            alert.product_id,
            alert.salespoint_id,
            alert.remaining_qty,
            alert.alert_qty
        );
    }

    Ok((
        StatusCode::OK,
        Json(ApproveSaleResponse {
            sale: outcome.sale,
            change_due: outcome.change_due,
            low_stock: outcome.low_stock,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/sales/{id}/cancel",
    responses((status = 200, body = Sale)),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler(state = AppState)]
pub async fn cancel_sale(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(sale_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let sale = app_state
        .sales_service
        .cancel(&app_state.db_pool, sale_id)
        .await?;
    Ok((StatusCode::OK, Json(sale)))
}

// ---
// Anulação instantânea (mesmo dia) e pedidos de anulação
// ---
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReverseSalePayload {
    // id da linha de venda -> quantidade a anular; ausente = anula tudo
    pub line_quantities: Option<HashMap<Uuid, i32>>,
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/sales/{id}/reverse",
    request_body = ReverseSalePayload,
    responses((status = 200, body = Sale), (status = 400, description = "Fora da janela do dia")),
    security(("bearer_auth" = []))
)]
pub async fn reverse_sale_same_day(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(sale_id): Path<Uuid>,
    Json(payload): Json<ReverseSalePayload>,
) -> Result<impl IntoResponse, AppError> {
    let sale = app_state
        .sales_service
        .reverse_same_day(
            &app_state.db_pool,
            sale_id,
            payload.line_quantities.as_ref(),
            user.0.user_id,
            payload.reason.as_deref().unwrap_or(""),
        )
        .await?;
    Ok((StatusCode::OK, Json(sale)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequestPayload {
    pub line_quantities: Option<HashMap<Uuid, i32>>,
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/api/sales/{id}/cancellation-requests",
    request_body = CancellationRequestPayload,
    responses((status = 201, body = CancellationRequest)),
    security(("bearer_auth" = []))
)]
pub async fn create_cancellation_request(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(sale_id): Path<Uuid>,
    Json(payload): Json<CancellationRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    let request = app_state
        .sales_service
        .create_cancellation_request(
            &app_state.db_pool,
            sale_id,
            payload.line_quantities.as_ref(),
            user.0.user_id,
            &payload.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    post,
    path = "/api/sales/cancellations/{id}/approve",
    responses((status = 200, body = CancellationRequest)),
    security(("bearer_auth" = []))
)]
pub async fn approve_cancellation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !matches!(user.0.role.as_str(), "accounting" | "admin") {
        return Err(AppError::Forbidden(
            "apenas a contabilidade pode aprovar anulações".into(),
        ));
    }
    let request = app_state
        .sales_service
        .approve_cancellation_request(&app_state.db_pool, request_id, user.0.user_id)
        .await?;
    Ok((StatusCode::OK, Json(request)))
}

#[utoipa::path(
    post,
    path = "/api/sales/cancellations/{id}/reject",
    responses((status = 200, body = CancellationRequest)),
    security(("bearer_auth" = []))
)]
pub async fn reject_cancellation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !matches!(user.0.role.as_str(), "accounting" | "admin") {
        return Err(AppError::Forbidden(
            "apenas a contabilidade pode decidir anulações".into(),
        ));
    }
    let request = app_state
        .sales_service
        .reject_cancellation_request(&app_state.db_pool, request_id, user.0.user_id)
        .await?;
    Ok((StatusCode::OK, Json(request)))
}
