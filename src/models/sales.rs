// src/models/sales.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums ---

// 'P' = peças/acessórios, 'M' = moto (venda de unidade única).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sale_kind")]
pub enum SaleKind {
    #[sqlx(rename = "P")]
    #[serde(rename = "P")]
    Pieces,
    #[sqlx(rename = "M")]
    #[serde(rename = "M")]
    Moto,
}

impl SaleKind {
    /// Letra usada no número de fatura (PP-DDMMYY-K-0001).
    pub fn code(&self) -> char {
        match self {
            SaleKind::Pieces => 'P',
            SaleKind::Moto => 'M',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "sale_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Draft,
    AwaitingCashier,
    Approved,
    // Reservado para intervenção manual; o fluxo normal nunca chega aqui.
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Cash,
    Mobile,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "cancellation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CancellationStatus {
    Pending,
    Approved,
    Rejected,
}

// --- Venda ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    pub salespoint_id: Uuid,
    pub seller_id: Uuid,
    pub kind: SaleKind,
    // Ex.: AD-140825-P-0001, único por ponto de venda
    pub number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_type: PaymentType,
    pub status: SaleStatus,
    pub total_amount: Decimal,
    pub total_cost: Decimal,
    pub gross_profit: Decimal,
    pub cashier_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub received_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Troco a devolver ao cliente (quando received_amount existe).
    pub fn change_due(&self) -> Decimal {
        match self.received_amount {
            Some(received) => received - self.total_amount,
            None => Decimal::ZERO,
        }
    }

    pub fn is_awaiting_cashier(&self) -> bool {
        self.status == SaleStatus::AwaitingCashier
    }
}

// Custo capturado do produto no momento da criação da linha; nunca
// recarregado depois (exatidão histórica vale mais que o custo corrente).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub unit_cost: Decimal,
    pub line_cost: Decimal,
    pub line_profit: Decimal,
    pub created_at: DateTime<Utc>,
}

// --- Pedido de anulação (fora do mesmo dia) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub requested_by: Uuid,
    pub reason: String,
    pub status: CancellationStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// Snapshot das linhas pedidas em anulação (suporta anulação parcial).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancellationLine {
    pub id: Uuid,
    pub request_id: Uuid,
    pub sale_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(total: Decimal, received: Option<Decimal>) -> Sale {
        Sale {
            id: Uuid::new_v4(),
            salespoint_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            kind: SaleKind::Pieces,
            number: "AD-140825-P-0001".into(),
            customer_name: "DIVERS".into(),
            customer_phone: String::new(),
            payment_type: PaymentType::Cash,
            status: SaleStatus::AwaitingCashier,
            total_amount: total,
            total_cost: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            cashier_id: None,
            approved_at: None,
            cancelled_at: None,
            received_amount: received,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn change_due_is_zero_without_received_amount() {
        assert_eq!(sale(Decimal::from(5000), None).change_due(), Decimal::ZERO);
    }

    #[test]
    fn change_due_subtracts_total() {
        let s = sale(Decimal::from(5000), Some(Decimal::from(6000)));
        assert_eq!(s.change_due(), Decimal::from(1000));
    }

    #[test]
    fn kind_codes_match_invoice_format() {
        assert_eq!(SaleKind::Pieces.code(), 'P');
        assert_eq!(SaleKind::Moto.code(), 'M');
    }
}
