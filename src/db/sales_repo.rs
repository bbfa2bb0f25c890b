// src/db/sales_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::sales::{
        CancellationLine, CancellationRequest, CancellationStatus, PaymentType, Sale, SaleItem,
        SaleKind, SaleStatus,
    },
};

#[derive(Clone)]
pub struct SalesRepository {
    pool: PgPool,
}

impl SalesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Vendas
    // ---

    /// Insere o cabeçalho da venda. Colisão no número único vira
    /// `DuplicateReference`, que o serviço usa para tentar de novo.
    pub async fn insert_sale<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
        seller_id: Uuid,
        kind: SaleKind,
        number: &str,
        customer_name: &str,
        customer_phone: &str,
        payment_type: PaymentType,
        total_amount: Decimal,
    ) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO sales (
                salespoint_id, seller_id, kind, number, customer_name,
                customer_phone, payment_type, status, total_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'awaiting_cashier', $8)
            RETURNING *
            "#,
        )
        .bind(salespoint_id)
        .bind(seller_id)
        .bind(kind)
        .bind(number)
        .bind(customer_name)
        .bind(customer_phone)
        .bind(payment_type)
        .bind(total_amount)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::DuplicateReference;
                }
            }
            e.into()
        })
    }

    pub async fn insert_item<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
        unit_cost: Decimal,
    ) -> Result<SaleItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let qty = Decimal::from(quantity);
        let line_total = (unit_price * qty).round_dp(0);
        let line_cost = unit_cost * qty;
        let line_profit = line_total - line_cost;

        let item = sqlx::query_as::<_, SaleItem>(
            r#"
            INSERT INTO sale_items (
                sale_id, product_id, quantity, unit_price, line_total,
                unit_cost, line_cost, line_profit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total)
        .bind(unit_cost)
        .bind(line_cost)
        .bind(line_profit)
        .fetch_one(executor)
        .await?;
        Ok(item)
    }

    pub async fn get_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = $1")
            .bind(sale_id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::SaleNotFound)
    }

    pub async fn get_sale_for_update(
        &self,
        conn: &mut PgConnection,
        sale_id: Uuid,
    ) -> Result<Sale, AppError> {
        sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = $1 FOR UPDATE")
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(AppError::SaleNotFound)
    }

    /// Busca pelo número humano da fatura, com lock (fluxo de anulação).
    pub async fn find_by_number_for_update(
        &self,
        conn: &mut PgConnection,
        salespoint_id: Uuid,
        number: &str,
    ) -> Result<Sale, AppError> {
        sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE salespoint_id = $1 AND number = $2 FOR UPDATE",
        )
        .bind(salespoint_id)
        .bind(number.trim())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::SaleNotFound)
    }

    pub async fn list_items<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<Vec<SaleItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = $1 ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(executor)
        .await?;
        Ok(items)
    }

    /// Varre os números de fatura existentes no prefixo do dia, sob lock,
    /// para derivar a próxima sequência.
    pub async fn numbers_with_prefix_for_update(
        &self,
        conn: &mut PgConnection,
        salespoint_id: Uuid,
        prefix: &str,
    ) -> Result<Vec<String>, AppError> {
        let numbers = sqlx::query_scalar::<_, String>(
            "SELECT number FROM sales WHERE salespoint_id = $1 AND number LIKE $2 || '%' FOR UPDATE",
        )
        .bind(salespoint_id)
        .bind(prefix)
        .fetch_all(&mut *conn)
        .await?;
        Ok(numbers)
    }

    pub async fn update_totals<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
        total_amount: Decimal,
        total_cost: Decimal,
        gross_profit: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE sales SET total_amount = $2, total_cost = $3, gross_profit = $4 WHERE id = $1",
        )
        .bind(sale_id)
        .bind(total_amount)
        .bind(total_cost)
        .bind(gross_profit)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_approved<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
        cashier_id: Uuid,
        received_amount: Option<Decimal>,
        approved_at: DateTime<Utc>,
    ) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            UPDATE sales
            SET status = 'approved', cashier_id = $2, received_amount = $3, approved_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(cashier_id)
        .bind(received_amount)
        .bind(approved_at)
        .fetch_one(executor)
        .await?;
        Ok(sale)
    }

    pub async fn set_status<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
        status: SaleStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            UPDATE sales
            SET status = $2, cancelled_at = COALESCE($3, cancelled_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(status)
        .bind(cancelled_at)
        .fetch_one(executor)
        .await?;
        Ok(sale)
    }

    pub async fn shrink_item<'e, E>(
        &self,
        executor: E,
        item_id: Uuid,
        quantity: i32,
        line_total: Decimal,
        line_cost: Decimal,
        line_profit: Decimal,
    ) -> Result<SaleItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let item = sqlx::query_as::<_, SaleItem>(
            r#"
            UPDATE sale_items
            SET quantity = $2, line_total = $3, line_cost = $4, line_profit = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(line_total)
        .bind(line_cost)
        .bind(line_profit)
        .fetch_one(executor)
        .await?;
        Ok(item)
    }

    pub async fn delete_item<'e, E>(&self, executor: E, item_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM sale_items WHERE id = $1")
            .bind(item_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    // ---
    // Pedidos de anulação
    // ---

    pub async fn insert_cancellation_request<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
        requested_by: Uuid,
        reason: &str,
    ) -> Result<CancellationRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, CancellationRequest>(
            r#"
            INSERT INTO cancellation_requests (sale_id, requested_by, reason)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(sale_id)
        .bind(requested_by)
        .bind(reason)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }

    pub async fn insert_cancellation_line<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        item: &SaleItem,
        quantity: i32,
    ) -> Result<CancellationLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line_total = (item.unit_price * Decimal::from(quantity)).round_dp(0);
        let line = sqlx::query_as::<_, CancellationLine>(
            r#"
            INSERT INTO cancellation_lines (
                request_id, sale_item_id, product_id, quantity,
                unit_price, unit_cost, line_total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(item.id)
        .bind(item.product_id)
        .bind(quantity)
        .bind(item.unit_price)
        .bind(item.unit_cost)
        .bind(line_total)
        .fetch_one(executor)
        .await?;
        Ok(line)
    }

    pub async fn get_cancellation_for_update(
        &self,
        conn: &mut PgConnection,
        request_id: Uuid,
    ) -> Result<CancellationRequest, AppError> {
        sqlx::query_as::<_, CancellationRequest>(
            "SELECT * FROM cancellation_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::RequestNotFound)
    }

    pub async fn list_cancellation_lines<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
    ) -> Result<Vec<CancellationLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, CancellationLine>(
            "SELECT * FROM cancellation_lines WHERE request_id = $1 ORDER BY created_at",
        )
        .bind(request_id)
        .fetch_all(executor)
        .await?;
        Ok(lines)
    }

    pub async fn decide_cancellation<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        status: CancellationStatus,
        approved_by: Uuid,
    ) -> Result<CancellationRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, CancellationRequest>(
            r#"
            UPDATE cancellation_requests
            SET status = $2, approved_by = $3, approved_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(status)
        .bind(approved_by)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }
}
