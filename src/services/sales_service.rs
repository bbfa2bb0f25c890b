// src/services/sales_service.rs
//
// Fluxo de venda: rascunho -> reserva de estoque -> validação na caixa ->
// baixa definitiva (reserved -> sold), ou cancelamento -> liberação.
// A anulação de uma venda já aprovada no mesmo dia devolve quantidades ao
// estoque reduzindo sold_qty; fora do dia, passa pelo pedido de anulação
// com aprovação.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Acquire, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::{error::AppError, refgen},
    db::{sales_repo::SalesRepository, stock_repo::NewStockTransaction, stock_repo::StockRepository},
    models::{
        inventory::{SalesPoint, StockTxnReason},
        sales::{
            CancellationRequest, CancellationStatus, PaymentType, Sale, SaleItem, SaleKind,
            SaleStatus,
        },
    },
    services::stock_service::{LowStockAlert, StockService},
};

// Tokens ignorados ao derivar o prefixo da fatura a partir do nome do ponto
// de venda ("PDV Akwa" -> "AK", não "PD").
const PREFIX_STOP_TOKENS: [&str; 6] = ["SP", "PDV", "POS", "PV", "AGENCE", "DEPOT"];

/// Linha de venda como chega do chamador, antes da normalização.
#[derive(Debug, Clone)]
pub struct SaleLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Resultado da validação na caixa.
#[derive(Debug)]
pub struct ApproveOutcome {
    pub sale: Sale,
    pub change_due: Decimal,
    pub low_stock: Vec<LowStockAlert>,
}

#[derive(Clone)]
pub struct SalesService {
    sales_repo: SalesRepository,
    stock_repo: StockRepository,
    stock_service: StockService,
}

impl SalesService {
    pub fn new(
        sales_repo: SalesRepository,
        stock_repo: StockRepository,
        stock_service: StockService,
    ) -> Self {
        Self {
            sales_repo,
            stock_repo,
            stock_service,
        }
    }

    pub fn repo(&self) -> &SalesRepository {
        &self.sales_repo
    }

    // ---
    // Normalização das linhas: agrupa por produto, valida quantidade e preço.
    // ---
    fn normalize_items(items: &[SaleLineInput]) -> Result<Vec<SaleLineInput>, AppError> {
        let mut merged: Vec<SaleLineInput> = Vec::new();
        for it in items {
            if it.quantity <= 0 {
                return Err(AppError::InvalidSaleLine(
                    "produto ou quantidade inválidos".into(),
                ));
            }
            if it.unit_price <= Decimal::ZERO {
                return Err(AppError::InvalidSaleLine("preço unitário inválido".into()));
            }
            match merged.iter_mut().find(|m| m.product_id == it.product_id) {
                Some(m) => {
                    if m.unit_price != it.unit_price {
                        return Err(AppError::InvalidSaleLine(format!(
                            "preço incoerente para o produto {}",
                            it.product_id
                        )));
                    }
                    m.quantity += it.quantity;
                }
                None => merged.push(it.clone()),
            }
        }
        Ok(merged)
    }

    /// Duas letras da primeira palavra significativa do nome do ponto de
    /// venda; fallback "EC".
    fn salespoint_prefix(name: &str) -> String {
        let upper = name.to_uppercase();
        let tokens: Vec<&str> = upper
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| !t.is_empty())
            .collect();

        if let Some(token) = tokens
            .iter()
            .find(|t| !PREFIX_STOP_TOKENS.contains(t) && t.chars().count() >= 2)
        {
            return token.chars().take(2).collect();
        }

        let letters: String = upper.chars().filter(|c| c.is_alphabetic()).take(2).collect();
        if letters.is_empty() {
            "EC".to_string()
        } else {
            letters
        }
    }

    /// Formato: PP-DDMMYY-K-0001, sequência diária por ponto de venda + tipo,
    /// derivada varrendo os números existentes sob lock.
    async fn generate_invoice_number(
        &self,
        conn: &mut PgConnection,
        salespoint: &SalesPoint,
        kind: SaleKind,
    ) -> Result<String, AppError> {
        let prefix = Self::salespoint_prefix(&salespoint.name);
        let base = refgen::daily_prefix_with_kind(&prefix, Utc::now().date_naive(), kind.code());
        let existing = self
            .sales_repo
            .numbers_with_prefix_for_update(conn, salespoint.id, &base)
            .await?;
        Ok(refgen::next_reference(&base, &existing))
    }

    /// Cria a venda em "awaiting_cashier" e RESERVA o estoque de cada linha.
    /// Tudo dentro de uma única transação externa: qualquer falha de reserva
    /// desfaz a venda inteira, nenhuma reserva parcial sobrevive.
    pub async fn create_draft<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        seller_id: Uuid,
        kind: SaleKind,
        customer_name: Option<&str>,
        customer_phone: Option<&str>,
        payment_type: PaymentType,
        items: &[SaleLineInput],
    ) -> Result<Sale, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if items.is_empty() {
            return Err(AppError::InvalidSaleLine("nenhum artigo fornecido".into()));
        }
        let lines = Self::normalize_items(items)?;

        // Uma venda de moto carrega chassi/motor únicos: uma única linha, qty 1.
        if kind == SaleKind::Moto {
            if lines.len() != 1 {
                return Err(AppError::InvalidSaleLine(
                    "uma venda de moto deve conter uma única moto".into(),
                ));
            }
            if lines[0].quantity != 1 {
                return Err(AppError::InvalidSaleLine(
                    "a quantidade de uma moto deve ser 1".into(),
                ));
            }
        }

        let total: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let total = total.round_dp(0);

        let mut tx = conn.begin().await?;

        let salespoint = self.stock_repo.get_salespoint(&mut *tx, salespoint_id).await?;

        // Gera o número com retry em caso de colisão de corrida. Cada
        // tentativa roda num savepoint para que a violação de unicidade não
        // aborte a transação externa.
        let mut sale: Option<Sale> = None;
        for _ in 0..4 {
            let number = self
                .generate_invoice_number(&mut tx, &salespoint, kind)
                .await?;
            let mut attempt = (&mut *tx).begin().await?;
            match self
                .sales_repo
                .insert_sale(
                    &mut *attempt,
                    salespoint_id,
                    seller_id,
                    kind,
                    &number,
                    customer_name.filter(|n| !n.trim().is_empty()).unwrap_or("DIVERS"),
                    customer_phone.unwrap_or(""),
                    payment_type,
                    total,
                )
                .await
            {
                Ok(created) => {
                    attempt.commit().await?;
                    sale = Some(created);
                    break;
                }
                Err(AppError::DuplicateReference) => continue,
                Err(e) => return Err(e),
            }
        }
        let sale = sale.ok_or(AppError::DuplicateReference)?;

        // Reserva por linha, com snapshot do custo do produto no momento.
        let mut total_cost = Decimal::ZERO;
        for line in &lines {
            self.stock_service
                .reserve(&mut *tx, salespoint_id, line.product_id, line.quantity)
                .await?;
            let product = self.stock_repo.get_product(&mut *tx, line.product_id).await?;
            let item = self
                .sales_repo
                .insert_item(
                    &mut *tx,
                    sale.id,
                    line.product_id,
                    line.quantity,
                    line.unit_price,
                    product.cost_price,
                )
                .await?;
            total_cost += item.line_cost;
        }

        self.sales_repo
            .update_totals(&mut *tx, sale.id, total, total_cost, total - total_cost)
            .await?;
        let sale = self.sales_repo.get_sale(&mut *tx, sale.id).await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Finaliza uma venda reservada: baixa o estoque e marca como aprovada.
    /// Aprovar uma venda que não está aguardando caixa é no-op (mas o troco
    /// ainda é calculado para o chamador).
    pub async fn approve<'a, A>(
        &self,
        conn: A,
        sale_id: Uuid,
        cashier_id: Uuid,
        amount_received: Option<Decimal>,
    ) -> Result<ApproveOutcome, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
        A::Connection: Send,
    {
        let mut tx = conn.begin().await?;

        let sale = self.sales_repo.get_sale_for_update(&mut tx, sale_id).await?;
        let total = sale.total_amount.round_dp(0);
        let received = amount_received.unwrap_or(Decimal::ZERO).round_dp(0);

        // Em pagamento à vista o valor recebido tem de cobrir o total.
        if sale.payment_type == PaymentType::Cash && received < total {
            return Err(AppError::InsufficientPayment);
        }

        if !matches!(sale.status, SaleStatus::AwaitingCashier | SaleStatus::Draft) {
            tx.commit().await?;
            return Ok(ApproveOutcome {
                change_due: received - total,
                sale,
                low_stock: Vec::new(),
            });
        }

        let items = self.sales_repo.list_items(&mut *tx, sale_id).await?;
        let low_stock = self
            .stock_service
            .commit_for_sale(&mut *tx, &sale, &items, Some(cashier_id))
            .await?;

        let sale = self
            .sales_repo
            .mark_approved(
                &mut *tx,
                sale_id,
                cashier_id,
                amount_received.map(|_| received),
                Utc::now(),
            )
            .await?;

        tx.commit().await?;
        Ok(ApproveOutcome {
            change_due: received - total,
            sale,
            low_stock,
        })
    }

    /// Cancela um rascunho/venda aguardando caixa: libera as reservas.
    /// Qualquer outro estado é no-op.
    pub async fn cancel<'a, A>(&self, conn: A, sale_id: Uuid) -> Result<Sale, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
        A::Connection: Send,
    {
        let mut tx = conn.begin().await?;

        let sale = self.sales_repo.get_sale_for_update(&mut tx, sale_id).await?;
        if !matches!(sale.status, SaleStatus::AwaitingCashier | SaleStatus::Draft) {
            tx.commit().await?;
            return Ok(sale);
        }

        let items = self.sales_repo.list_items(&mut *tx, sale_id).await?;
        self.stock_service
            .release_for_sale(&mut *tx, sale.salespoint_id, &items)
            .await?;

        let sale = self
            .sales_repo
            .set_status(&mut *tx, sale_id, SaleStatus::Cancelled, Some(Utc::now()))
            .await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Busca pelo número humano da fatura (fluxo de anulação na caixa).
    pub async fn find_by_number<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        number: &str,
    ) -> Result<(Sale, Vec<SaleItem>), AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;
        let sale = self
            .sales_repo
            .find_by_number_for_update(&mut tx, salespoint_id, number)
            .await?;
        let items = self.sales_repo.list_items(&mut *tx, sale.id).await?;
        tx.commit().await?;
        Ok((sale, items))
    }

    /// Anula linhas de uma venda *aprovada* no mesmo dia. `line_quantities`
    /// mapeia id da linha -> quantidade a anular; None anula tudo. O estoque
    /// volta reduzindo sold_qty; se não sobrar linha, a venda é cancelada.
    pub async fn reverse_same_day<'a, A>(
        &self,
        conn: A,
        sale_id: Uuid,
        line_quantities: Option<&HashMap<Uuid, i32>>,
        actor_id: Uuid,
        reason: &str,
    ) -> Result<Sale, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let sale = self.sales_repo.get_sale_for_update(&mut tx, sale_id).await?;
        if sale.status != SaleStatus::Approved {
            return Err(AppError::InvalidStateTransition(
                "apenas vendas aprovadas podem ser anuladas aqui".into(),
            ));
        }
        if let Some(approved_at) = sale.approved_at {
            if approved_at.date_naive() != Utc::now().date_naive() {
                return Err(AppError::InvalidStateTransition(
                    "anulação instantânea limitada às vendas do dia".into(),
                ));
            }
        }

        let items = self.sales_repo.list_items(&mut *tx, sale_id).await?;
        let selections = Self::build_selections(&items, line_quantities)?;

        let sale = self
            .reverse_lines(&mut tx, &sale, &selections, actor_id, reason)
            .await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Abre um pedido de anulação pendente (vendas de dias anteriores),
    /// com snapshot das linhas pedidas.
    pub async fn create_cancellation_request<'a, A>(
        &self,
        conn: A,
        sale_id: Uuid,
        line_quantities: Option<&HashMap<Uuid, i32>>,
        requested_by: Uuid,
        reason: &str,
    ) -> Result<CancellationRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if reason.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "um motivo de anulação é necessário".into(),
            ));
        }

        let mut tx = conn.begin().await?;

        let sale = self.sales_repo.get_sale_for_update(&mut tx, sale_id).await?;
        if sale.status != SaleStatus::Approved {
            return Err(AppError::InvalidStateTransition(
                "apenas vendas aprovadas podem ser pedidas em anulação".into(),
            ));
        }

        let items = self.sales_repo.list_items(&mut *tx, sale_id).await?;
        let selections = Self::build_selections(&items, line_quantities)?;

        let request = self
            .sales_repo
            .insert_cancellation_request(&mut *tx, sale_id, requested_by, reason.trim())
            .await?;
        for (item, qty) in &selections {
            self.sales_repo
                .insert_cancellation_line(&mut *tx, request.id, item, *qty)
                .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    /// Aprova um pedido pendente e aplica os ajustes de estoque e de venda.
    /// Pedido já decidido é no-op.
    pub async fn approve_cancellation_request<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        approver_id: Uuid,
    ) -> Result<CancellationRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .sales_repo
            .get_cancellation_for_update(&mut tx, request_id)
            .await?;
        if request.status != CancellationStatus::Pending {
            tx.commit().await?;
            return Ok(request);
        }

        let sale = self
            .sales_repo
            .get_sale_for_update(&mut tx, request.sale_id)
            .await?;
        let items = self.sales_repo.list_items(&mut *tx, sale.id).await?;
        let lines = self
            .sales_repo
            .list_cancellation_lines(&mut *tx, request_id)
            .await?;

        // Reconstrói {linha de venda -> qty} a partir do snapshot; se a linha
        // já não existe pelo id, tenta pelo produto.
        let mut qty_by_item: HashMap<Uuid, i32> = HashMap::new();
        for line in &lines {
            let item = items
                .iter()
                .find(|it| it.id == line.sale_item_id)
                .or_else(|| items.iter().find(|it| it.product_id == line.product_id))
                .ok_or_else(|| {
                    AppError::InvalidRequest(
                        "não foi possível encontrar uma linha correspondente para a anulação"
                            .into(),
                    )
                })?;
            *qty_by_item.entry(item.id).or_insert(0) += line.quantity;
        }

        let selections = Self::build_selections(&items, Some(&qty_by_item))?;
        // Sem guarda de "mesmo dia": este fluxo existe justamente para as
        // vendas de dias anteriores, já autorizadas por quem aprova.
        self.reverse_lines(&mut tx, &sale, &selections, approver_id, &request.reason)
            .await?;

        let request = self
            .sales_repo
            .decide_cancellation(&mut *tx, request_id, CancellationStatus::Approved, approver_id)
            .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// Rejeita um pedido pendente sem tocar no estoque.
    pub async fn reject_cancellation_request<'a, A>(
        &self,
        conn: A,
        request_id: Uuid,
        approver_id: Uuid,
    ) -> Result<CancellationRequest, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut tx = conn.begin().await?;

        let request = self
            .sales_repo
            .get_cancellation_for_update(&mut tx, request_id)
            .await?;
        if request.status != CancellationStatus::Pending {
            tx.commit().await?;
            return Ok(request);
        }
        let request = self
            .sales_repo
            .decide_cancellation(&mut *tx, request_id, CancellationStatus::Rejected, approver_id)
            .await?;

        tx.commit().await?;
        Ok(request)
    }

    // ---
    // Internos
    // ---

    fn build_selections(
        items: &[SaleItem],
        line_quantities: Option<&HashMap<Uuid, i32>>,
    ) -> Result<Vec<(SaleItem, i32)>, AppError> {
        match line_quantities {
            Some(map) => {
                let mut selections = Vec::new();
                for (item_id, qty) in map {
                    let item = items
                        .iter()
                        .find(|it| it.id == *item_id)
                        .ok_or_else(|| {
                            AppError::InvalidRequest(format!(
                                "linha de venda desconhecida (id={item_id})"
                            ))
                        })?;
                    if *qty <= 0 || *qty > item.quantity {
                        return Err(AppError::InvalidRequest(
                            "quantidade de anulação inválida".into(),
                        ));
                    }
                    selections.push((item.clone(), *qty));
                }
                Ok(selections)
            }
            None => Ok(items.iter().map(|it| (it.clone(), it.quantity)).collect()),
        }
    }

    /// Devolve quantidades ao estoque (sold_qty -= qty, nunca negativo),
    /// encolhe ou apaga as linhas e recalcula os totais. Compartilhado entre
    /// a anulação do dia e a aprovação de pedidos de anulação.
    async fn reverse_lines(
        &self,
        tx: &mut PgConnection,
        sale: &Sale,
        selections: &[(SaleItem, i32)],
        actor_id: Uuid,
        reason: &str,
    ) -> Result<Sale, AppError> {
        let reversal_reference = format!("REV-{}", sale.number);

        for (item, qty) in selections {
            let stock = self
                .stock_repo
                .get_for_update(&mut *tx, sale.salespoint_id, item.product_id)
                .await?;
            let new_sold = (stock.sold_qty - qty).max(0);
            if new_sold != stock.sold_qty {
                self.stock_repo.set_sold(&mut *tx, stock.id, new_sold).await?;
            }

            // Correção no livro-razão: nova linha com quantidade oposta,
            // apontando para a movimentação original quando encontrada.
            let original = self
                .stock_repo
                .find_original_transaction(&mut *tx, sale.salespoint_id, item.product_id, &sale.number)
                .await
                .ok()
                .flatten();
            self.stock_service
                .log_movement(
                    &mut *tx,
                    NewStockTransaction {
                        document_type: "Sale",
                        document_id: Some(sale.id),
                        is_reversal: true,
                        reversed_transaction_id: original.map(|t| t.id),
                        reversal_reason: reason,
                        ..NewStockTransaction::movement(
                            sale.salespoint_id,
                            item.product_id,
                            *qty,
                            StockTxnReason::Sale,
                            &reversal_reference,
                            Some(actor_id),
                        )
                    },
                )
                .await;

            if *qty == item.quantity {
                self.sales_repo.delete_item(&mut *tx, item.id).await?;
            } else {
                let remaining = item.quantity - qty;
                let qty_dec = Decimal::from(remaining);
                let line_total = (item.unit_price * qty_dec).round_dp(0);
                let line_cost = item.unit_cost * qty_dec;
                self.sales_repo
                    .shrink_item(
                        &mut *tx,
                        item.id,
                        remaining,
                        line_total,
                        line_cost,
                        line_total - line_cost,
                    )
                    .await?;
            }
        }

        // Recalcula os totais a partir das linhas restantes; sem linhas, a
        // venda inteira fica cancelada.
        let remaining_items = self.sales_repo.list_items(&mut *tx, sale.id).await?;
        if remaining_items.is_empty() {
            return self
                .sales_repo
                .set_status(&mut *tx, sale.id, SaleStatus::Cancelled, Some(Utc::now()))
                .await;
        }

        let total: Decimal = remaining_items.iter().map(|it| it.line_total).sum();
        let cost: Decimal = remaining_items.iter().map(|it| it.line_cost).sum();
        self.sales_repo
            .update_totals(&mut *tx, sale.id, total.round_dp(0), cost, total.round_dp(0) - cost)
            .await?;
        self.sales_repo.get_sale(&mut *tx, sale.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, qty: i32, price: i64) -> SaleLineInput {
        SaleLineInput {
            product_id,
            quantity: qty,
            unit_price: Decimal::from(price),
        }
    }

    #[test]
    fn normalize_merges_same_product() {
        let pid = Uuid::new_v4();
        let merged =
            SalesService::normalize_items(&[line(pid, 2, 1500), line(pid, 3, 1500)]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 5);
    }

    #[test]
    fn normalize_rejects_non_positive_quantity() {
        let err = SalesService::normalize_items(&[line(Uuid::new_v4(), 0, 1500)]).unwrap_err();
        assert!(matches!(err, AppError::InvalidSaleLine(_)));
    }

    #[test]
    fn normalize_rejects_zero_price() {
        let err = SalesService::normalize_items(&[line(Uuid::new_v4(), 1, 0)]).unwrap_err();
        assert!(matches!(err, AppError::InvalidSaleLine(_)));
    }

    #[test]
    fn normalize_rejects_inconsistent_price() {
        let pid = Uuid::new_v4();
        let err =
            SalesService::normalize_items(&[line(pid, 1, 1500), line(pid, 1, 2000)]).unwrap_err();
        assert!(matches!(err, AppError::InvalidSaleLine(_)));
    }

    #[test]
    fn prefix_skips_stop_tokens() {
        assert_eq!(SalesService::salespoint_prefix("PDV Akwa"), "AK");
        assert_eq!(SalesService::salespoint_prefix("SP Douala Centre"), "DO");
    }

    #[test]
    fn prefix_uses_first_meaningful_word() {
        assert_eq!(SalesService::salespoint_prefix("Adamaoua Moto"), "AD");
    }

    #[test]
    fn prefix_falls_back_to_ec() {
        assert_eq!(SalesService::salespoint_prefix("42"), "EC");
        assert_eq!(SalesService::salespoint_prefix(""), "EC");
    }
}

#[allow(dead_code)]
fn _probe_send(s: &SalesService, pool: &sqlx::PgPool, id: Uuid) {
    fn req_send<F: std::future::Future + Send>(_f: F) {}
    req_send(s.approve(pool, id, id, None));
    req_send(s.cancel(pool, id));
}
