// src/db/transfer_repo.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{
        RestockLine, RestockRequest, RestockStatus, RestockValidationAudit, TransferRequest,
        TransferRequestLine, TransferStatus,
    },
};

#[derive(Clone)]
pub struct TransferRepository {
    pool: PgPool,
}

impl TransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  TRANSFERÊNCIAS (ponto de venda -> ponto de venda)
    // =========================================================================

    /// Rascunho mais recente para a rota, se houver (o construtor de pedidos
    /// reaproveita o rascunho em vez de acumular um por clique).
    pub async fn find_draft<'e, E>(
        &self,
        executor: E,
        from_salespoint_id: Uuid,
        to_salespoint_id: Uuid,
    ) -> Result<Option<TransferRequest>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, TransferRequest>(
            r#"
            SELECT * FROM transfer_requests
            WHERE from_salespoint_id = $1 AND to_salespoint_id = $2 AND status = 'draft'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(from_salespoint_id)
        .bind(to_salespoint_id)
        .fetch_optional(executor)
        .await?;
        Ok(req)
    }

    pub async fn insert_request<'e, E>(
        &self,
        executor: E,
        from_salespoint_id: Uuid,
        to_salespoint_id: Uuid,
        requested_by: Uuid,
        notes: &str,
    ) -> Result<TransferRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, TransferRequest>(
            r#"
            INSERT INTO transfer_requests (from_salespoint_id, to_salespoint_id, requested_by, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(from_salespoint_id)
        .bind(to_salespoint_id)
        .bind(requested_by)
        .bind(notes)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }

    pub async fn get_request_for_update(
        &self,
        conn: &mut PgConnection,
        request_id: Uuid,
    ) -> Result<TransferRequest, AppError> {
        sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::RequestNotFound)
    }

    pub async fn delete_lines<'e, E>(&self, executor: E, request_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("DELETE FROM transfer_request_lines WHERE request_id = $1")
            .bind(request_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn insert_line<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        available_at_source: i32,
    ) -> Result<TransferRequestLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, TransferRequestLine>(
            r#"
            INSERT INTO transfer_request_lines (request_id, product_id, quantity, available_at_source)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(product_id)
        .bind(quantity)
        .bind(available_at_source)
        .fetch_one(executor)
        .await?;
        Ok(line)
    }

    pub async fn list_lines<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
    ) -> Result<Vec<TransferRequestLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, TransferRequestLine>(
            "SELECT * FROM transfer_request_lines WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_all(executor)
        .await?;
        Ok(lines)
    }

    pub async fn update_line_quantity<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE transfer_request_lines SET quantity = $2 WHERE id = $1")
            .bind(line_id)
            .bind(quantity)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Sequências já usadas pelo destino no dia, sob lock, para derivar a
    /// próxima numeração diária.
    pub async fn sequences_for_day_for_update(
        &self,
        conn: &mut PgConnection,
        to_salespoint_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<i32>, AppError> {
        let seqs = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT number_seq FROM transfer_requests
            WHERE to_salespoint_id = $1 AND number_date = $2
            FOR UPDATE
            "#,
        )
        .bind(to_salespoint_id)
        .bind(date)
        .fetch_all(&mut *conn)
        .await?;
        Ok(seqs)
    }

    pub async fn number_exists<'e, E>(&self, executor: E, number: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM transfer_requests WHERE number = $1)",
        )
        .bind(number)
        .fetch_one(executor)
        .await?;
        Ok(exists)
    }

    pub async fn mark_sent<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        number: &str,
        number_date: NaiveDate,
        number_seq: i32,
        sent_at: DateTime<Utc>,
    ) -> Result<TransferRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, TransferRequest>(
            r#"
            UPDATE transfer_requests
            SET status = 'sent', number = $2, number_date = $3, number_seq = $4,
                sent_at = $5, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(number)
        .bind(number_date)
        .bind(number_seq)
        .bind(sent_at)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }

    pub async fn decide_transfer<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        status: TransferStatus,
        approved_by: Option<Uuid>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<TransferRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, TransferRequest>(
            r#"
            UPDATE transfer_requests
            SET status = $2, approved_by = $3, approved_at = $4, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(status)
        .bind(approved_by)
        .bind(approved_at)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }

    // =========================================================================
    //  REABASTECIMENTOS (entreposto <-> ponto de venda)
    // =========================================================================

    pub async fn insert_restock<'e, E>(
        &self,
        executor: E,
        salespoint_id: Uuid,
        requested_by: Uuid,
        status: RestockStatus,
        reference: &str,
        notes: &str,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<RestockRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, RestockRequest>(
            r#"
            INSERT INTO restock_requests (salespoint_id, requested_by, status, reference, notes, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(salespoint_id)
        .bind(requested_by)
        .bind(status)
        .bind(reference)
        .bind(notes)
        .bind(sent_at)
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

    pub async fn get_restock_for_update(
        &self,
        conn: &mut PgConnection,
        request_id: Uuid,
    ) -> Result<RestockRequest, AppError> {
        sqlx::query_as::<_, RestockRequest>(
            "SELECT * FROM restock_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::RequestNotFound)
    }

    /// Referências do dia sob lock (o escopo é global: há um único
    /// entreposto emitindo neste prefixo).
    pub async fn references_with_prefix_for_update(
        &self,
        conn: &mut PgConnection,
        prefix: &str,
    ) -> Result<Vec<String>, AppError> {
        let refs = sqlx::query_scalar::<_, String>(
            "SELECT reference FROM restock_requests WHERE reference LIKE $1 || '%' FOR UPDATE",
        )
        .bind(prefix)
        .fetch_all(&mut *conn)
        .await?;
        Ok(refs)
    }

    pub async fn insert_restock_line<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        product_id: Uuid,
        quantity_requested: Option<i32>,
        quantity_approved: Option<i32>,
    ) -> Result<RestockLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, RestockLine>(
            r#"
            INSERT INTO restock_lines (request_id, product_id, quantity_requested, quantity_approved)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(product_id)
        .bind(quantity_requested)
        .bind(quantity_approved)
        .fetch_one(executor)
        .await?;
        Ok(line)
    }

    pub async fn list_restock_lines<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
    ) -> Result<Vec<RestockLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, RestockLine>(
            "SELECT * FROM restock_lines WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_all(executor)
        .await?;
        Ok(lines)
    }

    pub async fn set_line_approved<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
        quantity_approved: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE restock_lines SET quantity_approved = $2 WHERE id = $1")
            .bind(line_id)
            .bind(quantity_approved)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn mark_line_validated<'e, E>(
        &self,
        executor: E,
        line_id: Uuid,
        validated_at: DateTime<Utc>,
        stock_qty_at_validation: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE restock_lines SET validated_at = $2, stock_qty_at_validation = $3 WHERE id = $1",
        )
        .bind(line_id)
        .bind(validated_at)
        .bind(stock_qty_at_validation)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn set_restock_status<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        status: RestockStatus,
    ) -> Result<RestockRequest, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let req = sqlx::query_as::<_, RestockRequest>(
            r#"
            UPDATE restock_requests
            SET status = $2,
                sent_at = CASE WHEN $2 = 'sent' THEN now() ELSE sent_at END,
                approved_at = CASE WHEN $2 = 'approved' THEN now() ELSE approved_at END,
                rejected_at = CASE WHEN $2 = 'rejected' THEN now() ELSE rejected_at END,
                validated_at = CASE WHEN $2 = 'validated' THEN now() ELSE validated_at END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(status)
        .fetch_one(executor)
        .await?;
        Ok(req)
    }

    pub async fn set_restock_reference<'e, E>(
        &self,
        executor: E,
        request_id: Uuid,
        reference: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE restock_requests SET reference = $2, updated_at = now() WHERE id = $1")
            .bind(request_id)
            .bind(reference)
            .execute(executor)
            .await
            .map_err(|e| {
                if let Some(db_err) = e.as_database_error() {
                    if db_err.is_unique_violation() {
                        return AppError::DuplicateReference;
                    }
                }
                e.into()
            })?;
        Ok(())
    }

    pub async fn insert_validation_audit<'e, E>(
        &self,
        executor: E,
        restock_request_id: Uuid,
        product_id: Uuid,
        validated_by: Uuid,
        quantity_validated: i32,
        stock_before: i32,
        stock_after: i32,
        cost_price: Decimal,
    ) -> Result<RestockValidationAudit, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total_value = cost_price * Decimal::from(quantity_validated);
        let audit = sqlx::query_as::<_, RestockValidationAudit>(
            r#"
            INSERT INTO restock_validation_audits (
                restock_request_id, product_id, validated_by, quantity_validated,
                stock_before_validation, stock_after_validation,
                cost_price_at_validation, total_value
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(restock_request_id)
        .bind(product_id)
        .bind(validated_by)
        .bind(quantity_validated)
        .bind(stock_before)
        .bind(stock_after)
        .bind(cost_price)
        .bind(total_value)
        .fetch_one(executor)
        .await?;
        Ok(audit)
    }
}
