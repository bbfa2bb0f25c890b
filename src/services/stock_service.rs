// src/services/stock_service.rs
//
// Primitivas atômicas do estoque: reserve -> (commit | release).
//
// Cada primitiva roda na sua própria transação e toma um lock exclusivo
// (`FOR UPDATE`) na linha de saldo antes de ler qualquer quantidade derivada.
// Dois rascunhos de venda concorrentes para o mesmo produto no mesmo ponto
// de venda serializam nesse lock; sem ele, ambos passariam na checagem de
// disponibilidade sobre uma foto velha e venderíamos além do estoque.

use serde::Serialize;
use sqlx::{Acquire, PgConnection, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::stock_repo::{NewStockTransaction, StockRepository},
    models::{
        inventory::{SalesPointStock, StockTxnReason},
        sales::{Sale, SaleItem},
    },
};

/// Linha que cruzou o limiar de alerta durante uma operação. Acumulado e
/// devolvido ao chamador; nenhum estado global de processo.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub salespoint_id: Uuid,
    pub product_id: Uuid,
    pub remaining_qty: i32,
    pub alert_qty: i32,
}

#[derive(Clone)]
pub struct StockService {
    stock_repo: StockRepository,
}

impl StockService {
    pub fn new(stock_repo: StockRepository) -> Self {
        Self { stock_repo }
    }

    /// Reserva `qty` unidades para que outro rascunho não possa vendê-las.
    /// Falha com `InsufficientStock` se o disponível (já sob lock) não chega.
    pub async fn reserve<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        product_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if qty <= 0 {
            return Err(AppError::InvalidQuantity);
        }
        let mut tx = conn.begin().await?;

        let stock = self
            .stock_repo
            .get_or_create_for_update(&mut tx, salespoint_id, product_id)
            .await?;
        if stock.available_qty() < qty {
            return Err(AppError::InsufficientStock { product_id });
        }
        let updated = self.stock_repo.add_reserved(&mut *tx, stock.id, qty).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Libera uma reserva anterior (cancelamento/rejeição). Quantidades não
    /// positivas são ignoradas e a reserva nunca fica negativa: caminho de
    /// limpeza, um release a mais não pode corromper os contadores.
    pub async fn release<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        product_id: Uuid,
        qty: i32,
    ) -> Result<Option<SalesPointStock>, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if qty <= 0 {
            return Ok(None);
        }
        let mut tx = conn.begin().await?;

        let stock = self
            .stock_repo
            .get_or_create_for_update(&mut tx, salespoint_id, product_id)
            .await?;
        let new_reserved = (stock.reserved_qty - qty).max(0);
        let updated = self
            .stock_repo
            .set_reserved(&mut *tx, stock.id, new_reserved)
            .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Converte uma reserva em baixa definitiva: reserved -= qty,
    /// sold += qty. Ao contrário de `release`, reserva insuficiente aqui é
    /// erro de negócio. Sempre emparelhado com um lançamento no livro-razão
    /// (qty negativa, razão `sale`), gravado em melhor esforço.
    pub async fn commit<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        product_id: Uuid,
        qty: i32,
        reference: &str,
        user_id: Option<Uuid>,
        document_id: Option<Uuid>,
    ) -> Result<SalesPointStock, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        if qty <= 0 {
            return Err(AppError::InvalidQuantity);
        }
        let mut tx = conn.begin().await?;

        let stock = self
            .stock_repo
            .get_or_create_for_update(&mut tx, salespoint_id, product_id)
            .await?;
        if stock.reserved_qty < qty {
            return Err(AppError::InsufficientReservation { product_id });
        }
        let updated = self
            .stock_repo
            .commit_reserved_to_sold(&mut *tx, stock.id, qty)
            .await?;

        self.log_movement(
            &mut tx,
            NewStockTransaction {
                document_type: "Sale",
                document_id,
                ..NewStockTransaction::movement(
                    salespoint_id,
                    product_id,
                    -qty,
                    StockTxnReason::Sale,
                    reference,
                    user_id,
                )
            },
        )
        .await;

        tx.commit().await?;
        Ok(updated)
    }

    // ---
    // Variantes em lote sobre as linhas de uma venda. Cada chamada de
    // primitiva é atômica por si; NÃO há garantia entre linhas quando o
    // chamador não segura uma transação externa (a falha na linha N deixa
    // as linhas 1..N-1 aplicadas). O fluxo de aprovação de venda embrulha
    // tudo numa transação externa e recupera o tudo-ou-nada.
    // ---

    /// Reserva o estoque de cada linha de um rascunho de venda.
    pub async fn reserve_for_sale<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        items: &[SaleItem],
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut conn = conn.acquire().await?;
        for item in items {
            if item.quantity > 0 {
                self.reserve(&mut *conn, salespoint_id, item.product_id, item.quantity)
                    .await?;
            }
        }
        Ok(())
    }

    /// Libera as reservas de uma venda cancelada/rejeitada.
    pub async fn release_for_sale<'a, A>(
        &self,
        conn: A,
        salespoint_id: Uuid,
        items: &[SaleItem],
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut conn = conn.acquire().await?;
        for item in items {
            if item.quantity > 0 {
                self.release(&mut *conn, salespoint_id, item.product_id, item.quantity)
                    .await?;
            }
        }
        Ok(())
    }

    /// Converte as reservas de uma venda aprovada em baixa (reserved -> sold)
    /// e devolve as linhas que ficaram abaixo do limiar de alerta.
    pub async fn commit_for_sale<'a, A>(
        &self,
        conn: A,
        sale: &Sale,
        items: &[SaleItem],
        cashier_id: Option<Uuid>,
    ) -> Result<Vec<LowStockAlert>, AppError>
    where
        A: Acquire<'a, Database = Postgres> + Send,
    {
        let mut conn = conn.acquire().await?;
        let mut alerts = Vec::new();
        for item in items {
            if item.quantity <= 0 {
                continue;
            }
            let stock = self
                .commit(
                    &mut *conn,
                    sale.salespoint_id,
                    item.product_id,
                    item.quantity,
                    &sale.number,
                    cashier_id,
                    Some(sale.id),
                )
                .await?;
            if stock.is_below_alert() {
                alerts.push(LowStockAlert {
                    salespoint_id: stock.salespoint_id,
                    product_id: stock.product_id,
                    remaining_qty: stock.remaining_qty(),
                    alert_qty: stock.alert_qty,
                });
            }
        }
        Ok(alerts)
    }

    /// Grava um lançamento de auditoria em melhor esforço, dentro de um
    /// savepoint próprio: uma falha aqui não pode abortar (nem desfazer) a
    /// movimentação de estoque que a originou.
    pub async fn log_movement(&self, conn: &mut PgConnection, txn: NewStockTransaction<'_>) {
        let outcome = async {
            let mut sp = (&mut *conn).begin().await?;
            self.stock_repo.record_transaction(&mut *sp, txn).await?;
            sp.commit().await?;
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(err) = outcome {
            tracing::warn!("Falha ao gravar movimentação no livro-razão: {}", err);
        }
    }

    pub fn repo(&self) -> &StockRepository {
        &self.stock_repo
    }
}
