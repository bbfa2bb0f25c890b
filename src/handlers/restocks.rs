// src/handlers/restocks.rs

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
    models::auth::Actor,
    models::inventory::{RestockLine, RestockRequest},
    services::restock_service::{
        RestockDecision, RestockGrant, RestockLineInput, ValidatedLineInput,
    },
};

fn require_warehouse_role(actor: &Actor) -> Result<(), AppError> {
    if matches!(actor.role.as_str(), "warehouse_mgr" | "admin") {
        Ok(())
    } else {
        Err(AppError::Forbidden("acesso reservado ao entreposto".into()))
    }
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestockLinePayload {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "A quantidade deve ser positiva."))]
    pub qty: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRestockPayload {
    #[validate(length(min = 1, message = "Pelo menos um artigo é obrigatório."), nested)]
    pub lines: Vec<RestockLinePayload>,
    pub notes: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/restocks",
    request_body = CreateRestockPayload,
    responses((status = 201, body = RestockRequest)),
    security(("bearer_auth" = []))
)]
pub async fn create_request(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRestockPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let salespoint_id = user
        .0
        .salespoint_id
        .ok_or_else(|| AppError::InvalidRequest("nenhum ponto de venda vinculado".into()))?;

    let lines: Vec<RestockLineInput> = payload
        .lines
        .iter()
        .map(|l| RestockLineInput {
            product_id: l.product_id,
            quantity: l.qty,
        })
        .collect();

    let request = app_state
        .restock_service
        .create_request(
            &app_state.db_pool,
            salespoint_id,
            user.0.user_id,
            &lines,
            payload.notes.as_deref().unwrap_or(""),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[utoipa::path(
    post,
    path = "/api/restocks/{id}/send",
    responses((status = 200, body = RestockRequest)),
    security(("bearer_auth" = []))
)]
pub async fn send_request(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let request = app_state
        .restock_service
        .send_request(&app_state.db_pool, request_id)
        .await?;
    Ok((StatusCode::OK, Json(request)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecideRestockPayload {
    // "approve" | "reject"
    pub decision: String,
    // Quantidades concedidas por produto; ausente = concede o solicitado
    #[serde(default)]
    pub grants: Vec<RestockLinePayload>,
}

#[utoipa::path(
    post,
    path = "/api/restocks/{id}/decide",
    request_body = DecideRestockPayload,
    responses((status = 200, body = RestockRequest), (status = 403)),
    security(("bearer_auth" = []))
)]
pub async fn decide(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<DecideRestockPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_warehouse_role(&user.0)?;
    let decision = match payload.decision.to_lowercase().as_str() {
        "approve" => RestockDecision::Approve,
        "reject" => RestockDecision::Reject,
        _ => return Err(AppError::InvalidRequest("decisão inválida".into())),
    };
    let grants: Vec<RestockGrant> = payload
        .grants
        .iter()
        .map(|g| RestockGrant {
            product_id: g.product_id,
            quantity: g.qty,
        })
        .collect();

    let request = app_state
        .restock_service
        .decide(&app_state.db_pool, request_id, decision, &grants, user.0.user_id)
        .await?;
    Ok((StatusCode::OK, Json(request)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WarehousePushPayload {
    pub to_salespoint_id: Uuid,
    // 'P' (peças) ou 'M' (motos); entra na referência do dia
    pub kind: Option<char>,
    #[validate(length(min = 1, message = "Pelo menos um artigo é obrigatório."), nested)]
    pub lines: Vec<RestockLinePayload>,
}

#[utoipa::path(
    post,
    path = "/api/restocks/push",
    request_body = WarehousePushPayload,
    responses((status = 201, body = RestockRequest), (status = 403)),
    security(("bearer_auth" = []))
)]
pub async fn warehouse_push(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<WarehousePushPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    require_warehouse_role(&user.0)?;

    let lines: Vec<RestockLineInput> = payload
        .lines
        .iter()
        .map(|l| RestockLineInput {
            product_id: l.product_id,
            quantity: l.qty,
        })
        .collect();

    let request = app_state
        .restock_service
        .warehouse_push(
            &app_state.db_pool,
            payload.to_salespoint_id,
            user.0.user_id,
            payload.kind.unwrap_or('P'),
            &lines,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateLinePayload {
    pub line_id: Uuid,
    #[serde(default)]
    pub cost_price: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRestockPayload {
    pub validated_lines: Vec<ValidateLinePayload>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRestockResponse {
    pub request: RestockRequest,
    pub validated_count: usize,
    pub total_value: Decimal,
}

#[utoipa::path(
    post,
    path = "/api/restocks/{id}/validate",
    request_body = ValidateRestockPayload,
    responses((status = 200, body = ValidateRestockResponse)),
    security(("bearer_auth" = []))
)]
pub async fn validate_lines(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<ValidateRestockPayload>,
) -> Result<impl IntoResponse, AppError> {
    let validated: Vec<ValidatedLineInput> = payload
        .validated_lines
        .iter()
        .map(|v| ValidatedLineInput {
            line_id: v.line_id,
            cost_price: v.cost_price,
        })
        .collect();

    let outcome = app_state
        .restock_service
        .validate_lines(
            &app_state.db_pool,
            request_id,
            &validated,
            user.0.user_id,
            user.0.salespoint_id,
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(ValidateRestockResponse {
            request: outcome.request,
            validated_count: outcome.validated_count,
            total_value: outcome.total_value,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/restocks/{id}/lines",
    responses((status = 200, body = [RestockLine])),
    security(("bearer_auth" = []))
)]
pub async fn list_lines(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let lines = app_state
        .restock_service
        .list_lines(&app_state.db_pool, request_id)
        .await?;
    Ok((StatusCode::OK, Json(lines)))
}
