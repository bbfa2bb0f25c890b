// src/db/stock_repo.rs

use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{Product, SalesPoint, SalesPointStock, StockTransaction, StockTxnReason},
};

/// Campos de um lançamento no livro-razão. O repositório só insere; linhas
/// existentes nunca são alteradas.
#[derive(Debug, Clone)]
pub struct NewStockTransaction<'a> {
    pub salespoint_id: Uuid,
    pub product_id: Uuid,
    pub qty: i32,
    pub reason: StockTxnReason,
    pub reference: &'a str,
    pub user_id: Option<Uuid>,
    pub document_type: &'a str,
    pub document_id: Option<Uuid>,
    pub notes: &'a str,
    pub is_reversal: bool,
    pub reversed_transaction_id: Option<Uuid>,
    pub reversal_reason: &'a str,
}

impl<'a> NewStockTransaction<'a> {
    pub fn movement(
        salespoint_id: Uuid,
        product_id: Uuid,
        qty: i32,
        reason: StockTxnReason,
        reference: &'a str,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            salespoint_id,
            product_id,
            qty,
            reason,
            reference,
            user_id,
            document_type: "",
            document_id: None,
            notes: "",
            is_reversal: false,
            reversed_transaction_id: None,
            reversal_reason: "",
        }
    }
}

#[derive(Clone)]
pub struct StockRepository {
    pool: PgPool,
}

impl StockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Saldos de estoque
    // ---

    /// Busca o saldo com lock exclusivo (`FOR UPDATE`), criando a linha sob
    /// demanda. Duas operações concorrentes sobre o mesmo par
    /// (ponto de venda, produto) serializam aqui.
    pub async fn get_or_create_for_update(
        &self,
        conn: &mut PgConnection,
        salespoint_id: Uuid,
        product_id: Uuid,
    ) -> Result<SalesPointStock, AppError> {
        sqlx::query(
            r#"
            INSERT INTO salespoint_stocks (salespoint_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT (salespoint_id, product_id) DO NOTHING
            "#,
        )
        .bind(salespoint_id)
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

        let stock = sqlx::query_as::<_, SalesPointStock>(
            "SELECT * FROM salespoint_stocks WHERE salespoint_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(salespoint_id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(stock)
    }

    /// Busca o saldo com lock exclusivo, sem criar. Usado pelos fluxos de
    /// venda, onde um produto sem linha de estoque é um erro amigável.
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        salespoint_id: Uuid,
        product_id: Uuid,
    ) -> Result<SalesPointStock, AppError> {
        sqlx::query_as::<_, SalesPointStock>(
            "SELECT * FROM salespoint_stocks WHERE salespoint_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(salespoint_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::StockRowNotFound { product_id })
    }

    pub async fn get_level<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<SalesPointStock>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            "SELECT * FROM salespoint_stocks WHERE salespoint_id = $1 AND product_id = $2",
        )
        .bind(salespoint_id)
        .bind(product_id)
        .fetch_optional(executor)
        .await?;
        Ok(stock)
    }

    pub async fn list_levels<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
    ) -> Result<Vec<SalesPointStock>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let levels = sqlx::query_as::<_, SalesPointStock>(
            "SELECT * FROM salespoint_stocks WHERE salespoint_id = $1 ORDER BY updated_at DESC",
        )
        .bind(salespoint_id)
        .fetch_all(executor)
        .await?;
        Ok(levels)
    }

    // ---
    // Mutações de contadores. Todas assumem que o chamador já segura o lock
    // da linha (get_*_for_update) dentro da mesma transação.
    // ---

    pub async fn add_reserved<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET reserved_qty = reserved_qty + $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    pub async fn set_reserved<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        reserved_qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET reserved_qty = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(reserved_qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    /// reserved -= qty; sold += qty, em um único UPDATE atômico.
    pub async fn commit_reserved_to_sold<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET reserved_qty = reserved_qty - $2,
                sold_qty = sold_qty + $2,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    pub async fn set_sold<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        sold_qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET sold_qty = $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(sold_qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    pub async fn add_transfer_out<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET transfer_out = transfer_out + $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    pub async fn add_transfer_in<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET transfer_in = transfer_in + $2, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    /// Na validação do reabastecimento: o "em trânsito" do entreposto vira
    /// venda (transfer_out -= qty; sold_qty += qty). O decremento trava em
    /// zero: reescritas manuais do histórico podem deixar menos em trânsito
    /// do que o validado.
    pub async fn convert_in_transit_to_sold<'e, E>(
        &self,
        executor: E,
        stock_id: Uuid,
        qty: i32,
    ) -> Result<SalesPointStock, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stock = sqlx::query_as::<_, SalesPointStock>(
            r#"
            UPDATE salespoint_stocks
            SET transfer_out = GREATEST(transfer_out - $2, 0),
                sold_qty = sold_qty + $2,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(stock_id)
        .bind(qty)
        .fetch_one(executor)
        .await?;
        Ok(stock)
    }

    // ---
    // Livro-razão (auditoria)
    // ---

    pub async fn record_transaction<'e, E>(
        &self,
        executor: E,
        txn: NewStockTransaction<'_>,
    ) -> Result<StockTransaction, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StockTransaction>(
            r#"
            INSERT INTO stock_transactions (
                salespoint_id, product_id, qty, reason, reference, user_id,
                document_type, document_id, notes, is_reversal,
                reversed_transaction_id, reversal_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(txn.salespoint_id)
        .bind(txn.product_id)
        .bind(txn.qty)
        .bind(txn.reason)
        .bind(txn.reference)
        .bind(txn.user_id)
        .bind(txn.document_type)
        .bind(txn.document_id)
        .bind(txn.notes)
        .bind(txn.is_reversal)
        .bind(txn.reversed_transaction_id)
        .bind(txn.reversal_reason)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    /// Última movimentação original (não-reversão) de uma referência, para
    /// encadear a linha de correção.
    pub async fn find_original_transaction<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
        product_id: Uuid,
        reference: &str,
    ) -> Result<Option<StockTransaction>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE salespoint_id = $1 AND product_id = $2
              AND reference = $3 AND is_reversal = FALSE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(salespoint_id)
        .bind(product_id)
        .bind(reference)
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    pub async fn list_transactions<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
        product_id: Option<Uuid>,
        reason: Option<StockTxnReason>,
        limit: i64,
    ) -> Result<Vec<StockTransaction>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE salespoint_id = $1
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::stock_txn_reason IS NULL OR reason = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(salespoint_id)
        .bind(product_id)
        .bind(reason)
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    // ---
    // Consultas auxiliares (catálogo e pontos de venda)
    // ---

    pub async fn get_product<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::ProductNotFound)
    }

    pub async fn get_salespoint<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
    ) -> Result<SalesPoint, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, SalesPoint>("SELECT * FROM salespoints WHERE id = $1")
            .bind(salespoint_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::SalesPointNotFound)
    }

    pub async fn get_warehouse<'e, E>(&self, executor: E) -> Result<SalesPoint, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, SalesPoint>(
            "SELECT * FROM salespoints WHERE is_warehouse = TRUE ORDER BY created_at LIMIT 1",
        )
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::WarehouseNotConfigured)
    }
}
