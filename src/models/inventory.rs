// src/models/inventory.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- 1. Pontos de Venda ---
// O entreposto também é um SalesPoint, marcado com is_warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesPoint {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub is_warehouse: bool,
    pub created_at: DateTime<Utc>,
}

// --- 2. Produtos (catálogo mínimo) ---
// O CRUD completo de produtos vive fora deste serviço; aqui só precisamos
// do custo para o snapshot na venda.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub created_at: DateTime<Utc>,
}

// --- 3. Saldo de Estoque por (ponto de venda, produto) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesPointStock {
    pub id: Uuid,
    pub salespoint_id: Uuid,
    pub product_id: Uuid,
    pub opening_qty: i32,
    pub sold_qty: i32,
    pub transfer_in: i32,
    pub transfer_out: i32,
    // Quantidade segurada por vendas pendentes (ainda não validadas na caixa)
    pub reserved_qty: i32,
    pub alert_qty: i32,
    pub updated_at: DateTime<Utc>,
}

impl SalesPointStock {
    /// Estoque fisicamente presente: saldo de abertura mais os movimentos
    /// registrados. Nunca negativo.
    pub fn remaining_qty(&self) -> i32 {
        let rem = (self.opening_qty + self.transfer_in) - (self.sold_qty + self.transfer_out);
        rem.max(0)
    }

    /// O que ainda pode ser reservado agora (remaining - reserved).
    /// Nunca negativo.
    pub fn available_qty(&self) -> i32 {
        (self.remaining_qty() - self.reserved_qty).max(0)
    }

    pub fn is_below_alert(&self) -> bool {
        self.remaining_qty() <= self.alert_qty
    }
}

// --- 4. Movimentações de Estoque (livro-razão imutável) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "stock_txn_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StockTxnReason {
    Sale,
    Return,
    TransferIn,
    TransferOut,
    Restock,
    RestockSent,
    RestockReceived,
    RestockValidated,
    Adjustment,
}

// Quantidade positiva = entrada, negativa = saída. Linhas nunca são
// alteradas ou apagadas; correções entram como nova linha com
// is_reversal = true e quantidade oposta.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockTransaction {
    pub id: Uuid,
    pub salespoint_id: Uuid,
    pub product_id: Uuid,
    pub qty: i32,
    pub reason: StockTxnReason,
    pub reference: String,
    pub user_id: Option<Uuid>,
    pub document_type: String,
    pub document_id: Option<Uuid>,
    pub notes: String,
    pub is_reversal: bool,
    pub reversed_transaction_id: Option<Uuid>,
    pub reversal_reason: String,
    pub created_at: DateTime<Utc>,
}

// --- 5. Pedido de Transferência (gerente -> gerente) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub id: Uuid,
    pub from_salespoint_id: Uuid,
    pub to_salespoint_id: Uuid,
    pub requested_by: Uuid,
    pub status: TransferStatus,
    pub notes: String,
    // Numeração diária legível por humanos, atribuída no envio
    pub number: String,
    pub number_date: Option<NaiveDate>,
    pub number_seq: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequestLine {
    pub id: Uuid,
    pub request_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    // Snapshot do disponível na origem no momento do pedido
    pub available_at_source: i32,
}

// --- 6. Pedido de Reabastecimento (entreposto <-> ponto de venda) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "restock_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestockStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
    PartiallyValidated,
    Validated,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestockRequest {
    pub id: Uuid,
    pub salespoint_id: Uuid,
    pub requested_by: Uuid,
    pub status: RestockStatus,
    pub notes: String,
    pub reference: String,
    pub total_amount: Decimal,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestockLine {
    pub id: Uuid,
    pub request_id: Uuid,
    pub product_id: Uuid,
    pub quantity_requested: Option<i32>,
    pub quantity_approved: Option<i32>,
    pub validated_at: Option<DateTime<Utc>>,
    pub stock_qty_at_validation: Option<i32>,
}

impl RestockLine {
    /// Quantidade efetiva: aprovada se existir, senão a solicitada.
    pub fn effective_quantity(&self) -> i32 {
        self.quantity_approved
            .or(self.quantity_requested)
            .unwrap_or(0)
    }
}

// --- 7. Auditoria de validação de reabastecimento ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestockValidationAudit {
    pub id: Uuid,
    pub restock_request_id: Uuid,
    pub product_id: Uuid,
    pub validated_by: Uuid,
    pub quantity_validated: i32,
    pub stock_before_validation: i32,
    pub stock_after_validation: i32,
    pub cost_price_at_validation: Decimal,
    pub total_value: Decimal,
    pub validated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(opening: i32, sold: i32, t_in: i32, t_out: i32, reserved: i32) -> SalesPointStock {
        SalesPointStock {
            id: Uuid::new_v4(),
            salespoint_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            opening_qty: opening,
            sold_qty: sold,
            transfer_in: t_in,
            transfer_out: t_out,
            reserved_qty: reserved,
            alert_qty: 5,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn remaining_combines_counters() {
        let s = stock(10, 3, 4, 2, 0);
        assert_eq!(s.remaining_qty(), 9);
    }

    #[test]
    fn remaining_never_negative() {
        let s = stock(2, 10, 0, 0, 0);
        assert_eq!(s.remaining_qty(), 0);
    }

    #[test]
    fn available_subtracts_reservation() {
        let s = stock(10, 0, 0, 0, 3);
        assert_eq!(s.available_qty(), 7);
    }

    #[test]
    fn available_never_negative() {
        let s = stock(3, 0, 0, 0, 10);
        assert_eq!(s.available_qty(), 0);
    }

    #[test]
    fn restock_line_effective_quantity_prefers_approved() {
        let line = RestockLine {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity_requested: Some(10),
            quantity_approved: Some(6),
            validated_at: None,
            stock_qty_at_validation: None,
        };
        assert_eq!(line.effective_quantity(), 6);
    }
}
