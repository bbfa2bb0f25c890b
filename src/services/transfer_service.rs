// src/services/transfer_service.rs
//
// Pedido de transferência entre pontos de venda: o gerente do destino monta
// o rascunho e envia; só a origem decide. Na aprovação os contadores mudam
// imediatamente (transfer_out na origem, transfer_in no destino): o estoque
// fica vendável no momento da aprovação, não na chegada física.

use chrono::Utc;
use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{stock_repo::NewStockTransaction, stock_repo::StockRepository, transfer_repo::TransferRepository},
    models::inventory::{StockTxnReason, TransferRequest, TransferStatus},
    services::stock_service::StockService,
};

#[derive(Debug, Clone)]
pub struct TransferLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Quantidade efetivamente concedida por linha, definida pela origem na
/// aprovação.
#[derive(Debug, Clone)]
pub struct TransferGrant {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDecision {
    Approve,
    Reject,
}

#[derive(Clone)]
pub struct TransferService {
    transfer_repo: TransferRepository,
    stock_repo: StockRepository,
    stock_service: StockService,
}

impl TransferService {
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

    /// Cria ou substitui o rascunho da rota (origem -> destino do pedinte),
    /// com snapshot do disponível na origem por linha.
    pub async fn save_draft<'a, A>(
        &self,
        conn: A,
        from_salespoint_id: Uuid,
        to_salespoint_id: Uuid,
        requested_by: Uuid,
        lines: &[TransferLineInput],
        notes: &str,
    ) -> Result<TransferRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if from_salespoint_id == to_salespoint_id {
            return Err(AppError::InvalidRequest(
                "ponto de venda de origem inválido".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let request = match self
            .transfer_repo
            .find_draft(&mut *tx, from_salespoint_id, to_salespoint_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                self.transfer_repo
                    .insert_request(&mut *tx, from_salespoint_id, to_salespoint_id, requested_by, notes)
                    .await?
            }
        };

        self.transfer_repo.delete_lines(&mut *tx, request.id).await?;
        for line in lines {
            if line.quantity <= 0 {
                continue;
            }
            let available_at_source = self
                .stock_repo
                .get_level(&mut *tx, from_salespoint_id, line.product_id)
                .await?
                .map(|s| s.available_qty())
                .unwrap_or(0);
            self.transfer_repo
                .insert_line(
                    &mut *tx,
                    request.id,
                    line.product_id,
                    line.quantity,
                    available_at_source,
                )
                .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    /// draft -> sent: atribui a numeração diária (se faltar) sob lock e
    /// carimba sent_at.
    pub async fn send<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        actor_salespoint_id: Option<Uuid>,
    ) -> Result<TransferRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .get_request_for_update(&mut tx, request_id)
            .await?;
        if let Some(sp_id) = actor_salespoint_id {
            if request.to_salespoint_id != sp_id {
                return Err(AppError::Forbidden(
                    "este rascunho não pertence ao seu ponto de venda".into(),
                ));
            }
        }
        if request.status != TransferStatus::Draft {
            return Err(AppError::InvalidStateTransition(
                "este pedido não está em rascunho".into(),
            ));
        }

        let request = if request.number.is_empty() {
            let today = Utc::now().date_naive();
            let seqs = self
                .transfer_repo
                .sequences_for_day_for_update(&mut tx, request.to_salespoint_id, today)
                .await?;
            let mut seq = seqs.into_iter().max().unwrap_or(0) + 1;

            let dest = self
                .stock_repo
                .get_salespoint(&mut *tx, request.to_salespoint_id)
                .await?;
            let prefix: String = dest
                .name
                .trim()
                .to_uppercase()
                .chars()
                .filter(|c| !c.is_whitespace())
                .take(2)
                .collect();
            let prefix = if prefix.is_empty() { "SP".to_string() } else { prefix };

            // Garante unicidade global mesmo com reescritas manuais do histórico
            let mut number = format!("{}-TRANS-{}-P-{:04}", prefix, today.format("%d%m%y"), seq);
            while self.transfer_repo.number_exists(&mut *tx, &number).await? {
                seq += 1;
                number = format!("{}-TRANS-{}-P-{:04}", prefix, today.format("%d%m%y"), seq);
            }

            self.transfer_repo
                .mark_sent(&mut *tx, request.id, &number, today, seq, Utc::now())
                .await?
        } else {
            self.transfer_repo
                .mark_sent(
                    &mut *tx,
                    request.id,
                    &request.number.clone(),
                    request.number_date.unwrap_or_else(|| Utc::now().date_naive()),
                    request.number_seq,
                    Utc::now(),
                )
                .await?
        };

        tx.commit().await?;
        Ok(request)
    }

    /// Aprova ou rejeita um pedido enviado. Na aprovação, a quantidade
    /// concedida por linha é limitada ao snapshot de disponível na origem e
    /// os contadores dos dois lados mudam na hora, com lançamentos pareados
    /// no livro-razão.
    pub async fn decide<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        decision: TransferDecision,
        grants: &[TransferGrant],
        approver_id: Uuid,
        approver_salespoint_id: Option<Uuid>,
    ) -> Result<TransferRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .transfer_repo
            .get_request_for_update(&mut tx, request_id)
            .await?;
        // Só o ponto de venda que CEDE o estoque pode decidir.
        if let Some(sp_id) = approver_salespoint_id {
            if request.from_salespoint_id != sp_id {
                return Err(AppError::Forbidden(
                    "apenas o ponto de venda de origem pode decidir este pedido".into(),
                ));
            }
        }
        if request.status != TransferStatus::Sent {
            return Err(AppError::InvalidStateTransition("estado incompatível".into()));
        }

        if decision == TransferDecision::Reject {
            let request = self
                .transfer_repo
                .decide_transfer(&mut *tx, request_id, TransferStatus::Rejected, None, None)
                .await?;
            tx.commit().await?;
            return Ok(request);
        }

        let reference = if request.number.is_empty() {
            format!("TR-{}", request.id)
        } else {
            request.number.clone()
        };

        let lines = self.transfer_repo.list_lines(&mut *tx, request_id).await?;
        for line in &lines {
            let mut send_qty = grants
                .iter()
                .find(|g| g.product_id == line.product_id)
                .map(|g| g.quantity)
                .unwrap_or(0);
            if send_qty <= 0 {
                continue;
            }
            // Limita ao snapshot tirado na criação do rascunho
            if line.available_at_source > 0 && send_qty > line.available_at_source {
                send_qty = line.available_at_source;
            }
            if send_qty != line.quantity {
                self.transfer_repo
                    .update_line_quantity(&mut *tx, line.id, send_qty)
                    .await?;
            }

            self.apply_movement(&mut tx, &request, line.product_id, send_qty, &reference, approver_id)
                .await?;
        }

        let request = self
            .transfer_repo
            .decide_transfer(
                &mut *tx,
                request_id,
                TransferStatus::Approved,
                Some(approver_id),
                Some(Utc::now()),
            )
            .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Saída na origem e entrada no destino, imediatamente, sob lock de cada
    /// linha de saldo.
    async fn apply_movement(
        &self,
        tx: &mut PgConnection,
        request: &TransferRequest,
        product_id: Uuid,
        qty: i32,
        reference: &str,
        approver_id: Uuid,
    ) -> Result<(), AppError> {
        let src = self
            .stock_repo
            .get_or_create_for_update(&mut *tx, request.from_salespoint_id, product_id)
            .await?;
        self.stock_repo.add_transfer_out(&mut *tx, src.id, qty).await?;

        let dst = self
            .stock_repo
            .get_or_create_for_update(&mut *tx, request.to_salespoint_id, product_id)
            .await?;
        self.stock_repo.add_transfer_in(&mut *tx, dst.id, qty).await?;

        self.stock_service
            .log_movement(
                &mut *tx,
                NewStockTransaction {
                    document_type: "TransferRequest",
                    document_id: Some(request.id),
                    ..NewStockTransaction::movement(
                        request.from_salespoint_id,
                        product_id,
                        -qty,
                        StockTxnReason::TransferOut,
                        reference,
                        Some(approver_id),
                    )
                },
            )
            .await;
        self.stock_service
            .log_movement(
                &mut *tx,
                NewStockTransaction {
                    document_type: "TransferRequest",
                    document_id: Some(request.id),
                    ..NewStockTransaction::movement(
                        request.to_salespoint_id,
                        product_id,
                        qty,
                        StockTxnReason::TransferIn,
                        reference,
                        Some(approver_id),
                    )
                },
            )
            .await;

        Ok(())
    }

    pub async fn list_lines<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
    ) -> Result<Vec<crate::models::inventory::TransferRequestLine>, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut conn = conn.acquire().await?;
        self.transfer_repo.list_lines(&mut *conn, request_id).await
    }
}
