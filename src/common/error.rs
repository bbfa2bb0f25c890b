use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Erros de negócio sobem até o chamador; dentro de uma transação de estoque
// eles provocam rollback completo (nunca há aplicação parcial).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // --- Erros de negócio do motor de estoque ---
    #[error("Quantidade inválida")]
    InvalidQuantity,

    #[error("Estoque insuficiente para o produto {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error("Reserva insuficiente para o produto {product_id}")]
    InsufficientReservation { product_id: Uuid },

    #[error("Montante recebido insuficiente")]
    InsufficientPayment,

    #[error("Não foi possível gerar um número de documento único")]
    DuplicateReference,

    #[error("Transição de estado inválida: {0}")]
    InvalidStateTransition(String),

    #[error("Artigo de venda inválido: {0}")]
    InvalidSaleLine(String),

    #[error("Requisição inválida: {0}")]
    InvalidRequest(String),

    // --- Recursos ausentes ---
    #[error("Produto {product_id} indisponível neste ponto de venda")]
    StockRowNotFound { product_id: Uuid },

    #[error("Venda não encontrada")]
    SaleNotFound,

    #[error("Pedido não encontrado")]
    RequestNotFound,

    #[error("Ponto de venda não encontrado")]
    SalesPointNotFound,

    #[error("Produto não encontrado")]
    ProductNotFound,

    #[error("O entreposto não está configurado")]
    WarehouseNotConfigured,

    #[error("Acesso recusado: {0}")]
    Forbidden(String),

    #[error("Token inválido")]
    InvalidToken,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::InvalidQuantity
            | AppError::InvalidSaleLine(_)
            | AppError::InvalidRequest(_)
            | AppError::InsufficientPayment
            | AppError::InvalidStateTransition(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            AppError::InsufficientStock { .. }
            | AppError::InsufficientReservation { .. }
            | AppError::DuplicateReference => (StatusCode::CONFLICT, self.to_string()),

            AppError::StockRowNotFound { .. }
            | AppError::SaleNotFound
            | AppError::RequestNotFound
            | AppError::SalesPointNotFound
            | AppError::ProductNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            AppError::WarehouseNotConfigured => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }

            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),

            AppError::InvalidToken | AppError::JwtError(_) => (
                StatusCode::UNAUTHORIZED,
                "Token de autenticação inválido ou ausente.".to_string(),
            ),

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Ocorreu um erro inesperado.".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
