// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- ESTOQUE ---
        handlers::stock::list_levels,
        handlers::stock::list_transactions,

        // --- VENDAS ---
        handlers::sales::create_sale_draft,
        handlers::sales::get_sale,
        handlers::sales::find_sale_by_number,
        handlers::sales::approve_sale,
        handlers::sales::cancel_sale,
        handlers::sales::reverse_sale_same_day,
        handlers::sales::create_cancellation_request,
        handlers::sales::approve_cancellation,
        handlers::sales::reject_cancellation,

        // --- TRANSFERÊNCIAS ---
        handlers::transfers::save_draft,
        handlers::transfers::send,
        handlers::transfers::decide,
        handlers::transfers::list_lines,

        // --- REABASTECIMENTOS ---
        handlers::restocks::create_request,
        handlers::restocks::send_request,
        handlers::restocks::decide,
        handlers::restocks::warehouse_push,
        handlers::restocks::validate_lines,
        handlers::restocks::list_lines,
    ),
    components(
        schemas(
            models::inventory::SalesPoint,
            models::inventory::Product,
            models::inventory::SalesPointStock,
            models::inventory::StockTransaction,
            models::inventory::StockTxnReason,
            models::inventory::TransferRequest,
            models::inventory::TransferRequestLine,
            models::inventory::TransferStatus,
            models::inventory::RestockRequest,
            models::inventory::RestockLine,
            models::inventory::RestockStatus,
            models::inventory::RestockValidationAudit,
            models::sales::Sale,
            models::sales::SaleItem,
            models::sales::SaleKind,
            models::sales::SaleStatus,
            models::sales::PaymentType,
            models::sales::CancellationRequest,
            models::sales::CancellationLine,
            models::sales::CancellationStatus,
            services::stock_service::LowStockAlert,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "gestock", description = "Motor de estoque: reservas, vendas, transferências e reabastecimentos")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
