// src/services/restock_service.rs
//
// Reabastecimento entreposto <-> ponto de venda. Dois pontos de entrada:
// o ponto de venda pede (WH-RQ-DDMMYY-0001, draft -> sent -> decisão do
// entreposto) ou o entreposto empurra direto (WH-DDMMYY-P-0001, nasce em
// "sent" com linhas pré-aprovadas). Nos dois casos a mercadoria concedida
// sai do entreposto como "em trânsito" (transfer_out) na hora, e cada linha
// é validada independentemente na chegada: o destino credita transfer_in e
// o em-trânsito do entreposto converte em venda.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::{error::AppError, refgen},
    db::{stock_repo::NewStockTransaction, stock_repo::StockRepository, transfer_repo::TransferRepository},
    models::inventory::{RestockRequest, RestockStatus, SalesPoint, StockTxnReason},
    services::stock_service::StockService,
};

#[derive(Debug, Clone)]
pub struct RestockLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct RestockGrant {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestockDecision {
    Approve,
    Reject,
}

/// Linha marcada como recebida pelo gerente, com o custo praticado.
#[derive(Debug, Clone)]
pub struct ValidatedLineInput {
    pub line_id: Uuid,
    pub cost_price: Decimal,
}

#[derive(Debug)]
pub struct ValidationOutcome {
    pub request: RestockRequest,
    pub validated_count: usize,
    pub total_value: Decimal,
}

#[derive(Clone)]
pub struct RestockService {
    transfer_repo: TransferRepository,
    stock_repo: StockRepository,
    stock_service: StockService,
}

impl RestockService {
    pub fn new(
        transfer_repo: TransferRepository,
        stock_repo: StockRepository,
        stock_service: StockService,
    ) -> Self {
        Self {
            transfer_repo,
            stock_repo,
            stock_service,
        }
    }

    /// Rascunho de pedido do ponto de venda para o entreposto.
    pub async fn create_request<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        requested_by: Uuid,
        lines: &[RestockLineInput],
        notes: &str,
    ) -> Result<RestockRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let valid: Vec<&RestockLineInput> = lines.iter().filter(|l| l.quantity > 0).collect();
        if valid.is_empty() {
            return Err(AppError::InvalidRequest("nenhum artigo".into()));
        }

        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .insert_restock(&mut *tx, salespoint_id, requested_by, RestockStatus::Draft, "", notes, None)
            .await?;
        for line in valid {
            self.transfer_repo
                .insert_restock_line(&mut *tx, request.id, line.product_id, Some(line.quantity), None)
                .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    /// draft -> sent, atribuindo a referência WH-RQ do dia sob lock.
    pub async fn send_request<'a, A>(&self, conn: A, request_id: Uuid) -> Result<RestockRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .get_restock_for_update(&mut tx, request_id)
            .await?;
        if request.status != RestockStatus::Draft {
            return Err(AppError::InvalidStateTransition(
                "este pedido não está em rascunho".into(),
            ));
        }

        if request.reference.is_empty() {
            // O lock do scan não cobre o dia ainda vazio: na colisão de
            // corrida, tenta de novo num savepoint com a sequência seguinte.
            let prefix = refgen::daily_prefix("WH-RQ", Utc::now().date_naive());
            let mut assigned = false;
            for _ in 0..4 {
                let existing = self
                    .transfer_repo
                    .references_with_prefix_for_update(&mut tx, &prefix)
                    .await?;
                let reference = refgen::next_reference(&prefix, &existing);
                let mut attempt = (&mut *tx).begin().await?;
                match self
                    .transfer_repo
                    .set_restock_reference(&mut *attempt, request.id, &reference)
                    .await
                {
                    Ok(()) => {
                        attempt.commit().await?;
                        assigned = true;
                        break;
                    }
                    Err(AppError::DuplicateReference) => continue,
                    Err(e) => return Err(e),
                }
            }
            if !assigned {
                return Err(AppError::DuplicateReference);
            }
        }
        let request = self
            .transfer_repo
            .set_restock_status(&mut *tx, request.id, RestockStatus::Sent)
            .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Decisão do entreposto sobre um pedido enviado. Na aprovação, a
    /// quantidade concedida por linha é limitada ao disponível no entreposto
    /// e sai imediatamente como em-trânsito.
    pub async fn decide<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        decision: RestockDecision,
        grants: &[RestockGrant],
        approver_id: Uuid,
    ) -> Result<RestockRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .get_restock_for_update(&mut tx, request_id)
            .await?;
        if request.status != RestockStatus::Sent {
            return Err(AppError::InvalidStateTransition("estado incompatível".into()));
        }

        if decision == RestockDecision::Reject {
            let request = self
                .transfer_repo
                .set_restock_status(&mut *tx, request.id, RestockStatus::Rejected)
                .await?;
            tx.commit().await?;
            return Ok(request);
        }

        let warehouse = self.stock_repo.get_warehouse(&mut *tx).await?;
        let reference = Self::reference_of(&request);

        let lines = self.transfer_repo.list_restock_lines(&mut *tx, request.id).await?;
        for line in &lines {
            let requested = line.quantity_requested.unwrap_or(0);
            let mut granted = grants
                .iter()
                .find(|g| g.product_id == line.product_id)
                .map(|g| g.quantity)
                .unwrap_or(requested);
            if granted <= 0 {
                self.transfer_repo.set_line_approved(&mut *tx, line.id, 0).await?;
                continue;
            }

            let wh_stock = self
                .stock_repo
                .get_or_create_for_update(&mut tx, warehouse.id, line.product_id)
                .await?;
            let available = wh_stock.available_qty();
            if available > 0 && granted > available {
                granted = available;
            }

            self.transfer_repo
                .set_line_approved(&mut *tx, line.id, granted)
                .await?;
            self.dispatch_from_warehouse(&mut tx, &warehouse, &request, line.product_id, granted, &reference, approver_id)
                .await?;
        }

        let request = self
            .transfer_repo
            .set_restock_status(&mut *tx, request.id, RestockStatus::Approved)
            .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// O entreposto empurra mercadoria sem pedido prévio: o documento nasce
    /// em "sent" com as linhas pré-aprovadas e referência WH-DDMMYY-K-0001.
    pub async fn warehouse_push<'a, A>(
        &self,
        conn: A,
        to_salespoint_id: Uuid,
        requested_by: Uuid,
        kind: char,
        lines: &[RestockLineInput],
    ) -> Result<RestockRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let valid: Vec<&RestockLineInput> = lines.iter().filter(|l| l.quantity > 0).collect();
        if valid.is_empty() {
            return Err(AppError::InvalidRequest("nenhum artigo".into()));
        }
        let kind = if kind == 'M' { 'M' } else { 'P' };

        let mut tx = conn.begin().await?;

        let warehouse = self.stock_repo.get_warehouse(&mut *tx).await?;
        // Destino tem de existir (e não ser o próprio entreposto)
        let destination = self.stock_repo.get_salespoint(&mut *tx, to_salespoint_id).await?;
        if destination.id == warehouse.id {
            return Err(AppError::InvalidRequest(
                "ponto de venda de destino requerido".into(),
            ));
        }

        // Referência diária com retry: o lock do scan não cobre o dia ainda
        // vazio, então a colisão de corrida cai na violação de unicidade.
        let prefix = refgen::daily_prefix_with_kind("WH", Utc::now().date_naive(), kind);
        let mut created: Option<(RestockRequest, String)> = None;
        for _ in 0..4 {
            let existing = self
                .transfer_repo
                .references_with_prefix_for_update(&mut tx, &prefix)
                .await?;
            let reference = refgen::next_reference(&prefix, &existing);
            let mut attempt = (&mut *tx).begin().await?;
            match self
                .transfer_repo
                .insert_restock(
                    &mut *attempt,
                    to_salespoint_id,
                    requested_by,
                    RestockStatus::Sent,
                    &reference,
                    "",
                    Some(Utc::now()),
                )
                .await
            {
                Ok(request) => {
                    attempt.commit().await?;
                    created = Some((request, reference));
                    break;
                }
                Err(AppError::DuplicateReference) => continue,
                Err(e) => return Err(e),
            }
        }
        let (request, reference) = created.ok_or(AppError::DuplicateReference)?;

        for line in valid {
            let wh_stock = self
                .stock_repo
                .get_or_create_for_update(&mut tx, warehouse.id, line.product_id)
                .await?;
            let available = wh_stock.available_qty();
            let mut qty = line.quantity;
            if available > 0 && qty > available {
                qty = available;
            }
            if qty <= 0 {
                continue;
            }

            self.transfer_repo
                .insert_restock_line(&mut *tx, request.id, line.product_id, Some(qty), Some(qty))
                .await?;
            self.dispatch_from_warehouse(&mut tx, &warehouse, &request, line.product_id, qty, &reference, requested_by)
                .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    /// Valida linhas individuais na chegada. O pedido agrega para
    /// "validated" só quando todas as linhas têm carimbo de validação;
    /// senão fica "partially_validated".
    pub async fn validate_lines<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        validated: &[ValidatedLineInput],
        actor_id: Uuid,
        actor_salespoint_id: Option<Uuid>,
    ) -> Result<ValidationOutcome, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if validated.is_empty() {
            return Err(AppError::InvalidRequest(
                "nenhuma linha selecionada para validação".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .get_restock_for_update(&mut tx, request_id)
            .await?;
        if let Some(sp_id) = actor_salespoint_id {
            if request.salespoint_id != sp_id {
                return Err(AppError::Forbidden(
                    "este pedido não pertence ao seu ponto de venda".into(),
                ));
            }
        }
        if !matches!(
            request.status,
            RestockStatus::Sent | RestockStatus::Approved | RestockStatus::PartiallyValidated
        ) {
            return Err(AppError::InvalidStateTransition(format!(
                "este pedido não pode mais ser modificado (estado atual: {:?})",
                request.status
            )));
        }

        let warehouse = self.stock_repo.get_warehouse(&mut *tx).await?;
        let reference = Self::reference_of(&request);
        let lines = self.transfer_repo.list_restock_lines(&mut *tx, request.id).await?;

        let mut validated_count = 0usize;
        let mut total_value = Decimal::ZERO;

        for input in validated {
            let Some(line) = lines.iter().find(|l| l.id == input.line_id) else {
                continue;
            };
            // Linha já validada não aplica estoque duas vezes
            if line.validated_at.is_some() {
                continue;
            }
            let qty = line.effective_quantity();
            if qty <= 0 {
                continue;
            }

            // Foto do estoque do destino ANTES da validação, para auditoria
            let dest_stock = self
                .stock_repo
                .get_or_create_for_update(&mut tx, request.salespoint_id, line.product_id)
                .await?;
            let stock_before = (dest_stock.opening_qty + dest_stock.transfer_in)
                - (dest_stock.transfer_out + dest_stock.sold_qty);

            self.transfer_repo
                .mark_line_validated(&mut *tx, line.id, Utc::now(), stock_before)
                .await?;
            self.stock_repo
                .add_transfer_in(&mut *tx, dest_stock.id, qty)
                .await?;

            // No entreposto, o em-trânsito vira venda no momento da validação
            let wh_stock = self
                .stock_repo
                .get_or_create_for_update(&mut tx, warehouse.id, line.product_id)
                .await?;
            self.stock_repo
                .convert_in_transit_to_sold(&mut *tx, wh_stock.id, qty)
                .await?;

            self.stock_service
                .log_movement(
                    &mut *tx,
                    NewStockTransaction {
                        document_type: "RestockRequest",
                        document_id: Some(request.id),
                        ..NewStockTransaction::movement(
                            warehouse.id,
                            line.product_id,
                            0,
                            StockTxnReason::RestockValidated,
                            &reference,
                            Some(actor_id),
                        )
                    },
                )
                .await;
            self.stock_service
                .log_movement(
                    &mut *tx,
                    NewStockTransaction {
                        document_type: "RestockRequest",
                        document_id: Some(request.id),
                        ..NewStockTransaction::movement(
                            request.salespoint_id,
                            line.product_id,
                            qty,
                            StockTxnReason::Restock,
                            &reference,
                            Some(actor_id),
                        )
                    },
                )
                .await;

            let cost_price = if input.cost_price > Decimal::ZERO {
                input.cost_price
            } else {
                self.stock_repo
                    .get_product(&mut *tx, line.product_id)
                    .await
                    .map(|p| p.cost_price)
                    .unwrap_or(Decimal::ZERO)
            };
            self.record_validation_audit(
                &mut tx,
                request.id,
                line.product_id,
                actor_id,
                qty,
                stock_before,
                stock_before + qty,
                cost_price,
            )
            .await;

            validated_count += 1;
            total_value += cost_price * Decimal::from(qty);
        }

        // Agregado do pedido a partir dos carimbos de linha
        let lines = self.transfer_repo.list_restock_lines(&mut *tx, request.id).await?;
        let total_lines = lines.len();
        let validated_lines = lines.iter().filter(|l| l.validated_at.is_some()).count();

        let request = if validated_lines == total_lines && total_lines > 0 {
            self.transfer_repo
                .set_restock_status(&mut *tx, request.id, RestockStatus::Validated)
                .await?
        } else if validated_lines > 0 {
            self.transfer_repo
                .set_restock_status(&mut *tx, request.id, RestockStatus::PartiallyValidated)
                .await?
        } else {
            request
        };

        tx.commit().await?;
        Ok(ValidationOutcome {
            request,
            validated_count,
            total_value,
        })
    }

    pub async fn list_lines<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
    ) -> Result<Vec<crate::models::inventory::RestockLine>, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut conn = conn.acquire().await?;
        self.transfer_repo.list_restock_lines(&mut *conn, request_id).await
    }

    // ---
    // Internos
    // ---

    fn reference_of(request: &RestockRequest) -> String {
        if request.reference.is_empty() {
            format!("REQ-{}", request.id)
        } else {
            request.reference.clone()
        }
    }

    /// Saída imediata do entreposto como em-trânsito (transfer_out),
    /// com lançamento negativo de auditoria.
    async fn dispatch_from_warehouse(
        &self,
        tx: &mut PgConnection,
        warehouse: &SalesPoint,
        request: &RestockRequest,
        product_id: Uuid,
        qty: i32,
        reference: &str,
        actor_id: Uuid,
    ) -> Result<(), AppError> {
        let wh_stock = self
            .stock_repo
            .get_or_create_for_update(&mut *tx, warehouse.id, product_id)
            .await?;
        self.stock_repo
            .add_transfer_out(&mut *tx, wh_stock.id, qty)
            .await?;

        self.stock_service
            .log_movement(
                &mut *tx,
                NewStockTransaction {
                    document_type: "RestockRequest",
                    document_id: Some(request.id),
                    ..NewStockTransaction::movement(
                        warehouse.id,
                        product_id,
                        -qty,
                        StockTxnReason::RestockSent,
                        reference,
                        Some(actor_id),
                    )
                },
            )
            .await;

        Ok(())
    }

    /// Auditoria em melhor esforço: um erro aqui não derruba a validação.
    #[allow(clippy::too_many_arguments)]
    async fn record_validation_audit(
        &self,
        conn: &mut PgConnection,
        request_id: Uuid,
        product_id: Uuid,
        validated_by: Uuid,
        qty: i32,
        stock_before: i32,
        stock_after: i32,
        cost_price: Decimal,
    ) {
        let outcome = async {
            let mut sp = (&mut *conn).begin().await?;
            self.transfer_repo
                .insert_validation_audit(
                    &mut *sp,
                    request_id,
                    product_id,
                    validated_by,
                    qty,
                    stock_before,
                    stock_after,
                    cost_price,
                )
                .await?;
            sp.commit().await?;
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(err) = outcome {
            tracing::warn!("Falha ao gravar auditoria de validação: {}", err);
        }
    }
}
