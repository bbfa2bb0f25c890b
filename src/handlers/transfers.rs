// src/handlers/transfers.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::inventory::{TransferRequest, TransferRequestLine},
    services::transfer_service::{TransferDecision, TransferGrant, TransferLineInput},
};

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferLinePayload {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    pub qty: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveTransferPayload {
    // Ponto de venda que CEDE o estoque; o destino é o do ator.
    pub from_salespoint_id: Uuid,
    #[validate(length(min = 1, message = "Pelo menos um artigo é obrigatório."), nested)]
    pub lines: Vec<TransferLinePayload>,
    pub notes: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/transfers",
    request_body = SaveTransferPayload,
    responses((status = 201, body = TransferRequest)),
    security(("bearer_auth" = []))
)]
pub async fn save_draft(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SaveTransferPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let to_salespoint_id = user
        .0
        .salespoint_id
        .ok_or_else(|| AppError::InvalidRequest("nenhum ponto de venda vinculado".into()))?;

    let lines: Vec<TransferLineInput> = payload
        .lines
        .iter()
        .map(|l| TransferLineInput {
            product_id: l.product_id,
            quantity: l.qty,
        })
        .collect();

    let request = app_state
        .transfer_service
        .save_draft(
            &app_state.db_pool,
            payload.from_salespoint_id,
            to_salespoint_id,
            user.0.user_id,
            &lines,
            payload.notes.as_deref().unwrap_or(""),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    post,
    path = "/api/transfers/{id}/send",
    responses((status = 200, body = TransferRequest)),
    security(("bearer_auth" = []))
)]
pub async fn send(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let request = app_state
        .transfer_service
        .send(&app_state.db_pool, request_id, user.0.salespoint_id)
        .await?;
    Ok((StatusCode::OK, Json(request)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecideTransferPayload {
    // "approve" | "reject"
    pub decision: String,
    // Quantidades concedidas por produto, quando aprovando
    #[serde(default)]
    pub lines: Vec<TransferLinePayload>,
}

#[utoipa::path(
    post,
    path = "/api/transfers/{id}/decide",
    request_body = DecideTransferPayload,
    responses((status = 200, body = TransferRequest), (status = 403)),
    security(("bearer_auth" = []))
)]
pub async fn decide(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<DecideTransferPayload>,
) -> Result<impl IntoResponse, AppError> {
    let decision = match payload.decision.to_lowercase().as_str() {
        "approve" => TransferDecision::Approve,
        "reject" => TransferDecision::Reject,
        _ => return Err(AppError::InvalidRequest("decisão inválida".into())),
    };
    let grants: Vec<TransferGrant> = payload
        .lines
        .iter()
        .map(|l| TransferGrant {
            product_id: l.product_id,
            quantity: l.qty,
        })
        .collect();

    let request = app_state
        .transfer_service
        .decide(
            &app_state.db_pool,
            request_id,
            decision,
            &grants,
            user.0.user_id,
            user.0.salespoint_id,
        )
        .await?;
    Ok((StatusCode::OK, Json(request)))
}

#[utoipa::path(
    get,
    path = "/api/transfers/{id}/lines",
    responses((status = 200, body = [TransferRequestLine])),
    security(("bearer_auth" = []))
)]
pub async fn list_lines(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let lines = app_state
        .transfer_service
        .list_lines(&app_state.db_pool, request_id)
        .await?;
    Ok((StatusCode::OK, Json(lines)))
}
