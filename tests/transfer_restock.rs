// Fluxos de movimentação entre locais: transferências gerente-a-gerente e
// reabastecimentos entreposto <-> ponto de venda, com numeração diária.

mod common;

use common::*;
use gestock::common::error::AppError;
use gestock::models::inventory::{RestockStatus, StockTxnReason, TransferStatus};
use gestock::services::restock_service::{
    RestockDecision, RestockGrant, RestockLineInput, ValidatedLineInput,
};
use gestock::services::transfer_service::{TransferDecision, TransferGrant, TransferLineInput};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use uuid::Uuid;

fn tline(product_id: Uuid, qty: i32) -> TransferLineInput {
    TransferLineInput {
        product_id,
        quantity: qty,
    }
}

fn rline(product_id: Uuid, qty: i32) -> RestockLineInput {
    RestockLineInput {
        product_id,
        quantity: qty,
    }
}

// ---
// Transferências
// ---

#[sqlx::test]
async fn transfer_approval_clamps_to_the_source_snapshot(pool: PgPool) {
    let svc = services(&pool);
    let source = create_salespoint(&pool, "Akwa", false).await;
    let dest = create_salespoint(&pool, "Bonaberi", false).await;
    let product = create_product(&pool, "Pneu", 8000, 12000).await;
    seed_stock(&pool, source, product, 6, 0).await;

    let request = svc
        .transfers
        .save_draft(&pool, source, dest, actor(), &[tline(product, 10)], "")
        .await
        .unwrap();
    assert_eq!(request.status, TransferStatus::Draft);

    let lines = svc.transfers.list_lines(&pool, request.id).await.unwrap();
    assert_eq!(lines[0].available_at_source, 6);

    let sent = svc
        .transfers
        .send(&pool, request.id, Some(dest))
        .await
        .unwrap();
    assert_eq!(sent.status, TransferStatus::Sent);
    assert!(sent.number.starts_with("BO-TRANS-"));
    assert!(sent.number.ends_with("-P-0001"));
    assert!(sent.sent_at.is_some());

    // A origem concede 10, mas o snapshot de disponível era 6: corta em 6
    let approved = svc
        .transfers
        .decide(
            &pool,
            request.id,
            TransferDecision::Approve,
            &[TransferGrant {
                product_id: product,
                quantity: 10,
            }],
            actor(),
            Some(source),
        )
        .await
        .unwrap();
    assert_eq!(approved.status, TransferStatus::Approved);
    assert!(approved.approved_at.is_some());

    // Contadores dos dois lados mudam na aprovação, sem etapa de recepção
    let src_row = stock_row(&pool, source, product).await;
    assert_eq!(src_row.transfer_out, 6);
    assert_eq!(src_row.remaining_qty(), 0);
    let dst_row = stock_row(&pool, dest, product).await;
    assert_eq!(dst_row.transfer_in, 6);
    assert_eq!(dst_row.remaining_qty(), 6);

    let lines = svc.transfers.list_lines(&pool, request.id).await.unwrap();
    assert_eq!(lines[0].quantity, 6);

    // Lançamentos pareados no razão
    let out = ledger_entries(&pool, source, product).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].qty, -6);
    assert_eq!(out[0].reason, StockTxnReason::TransferOut);
    let inn = ledger_entries(&pool, dest, product).await;
    assert_eq!(inn[0].qty, 6);
    assert_eq!(inn[0].reason, StockTxnReason::TransferIn);
}

#[sqlx::test]
async fn only_the_source_salespoint_decides(pool: PgPool) {
    let svc = services(&pool);
    let source = create_salespoint(&pool, "Akwa", false).await;
    let dest = create_salespoint(&pool, "Bonaberi", false).await;
    let product = create_product(&pool, "Pneu", 8000, 12000).await;
    seed_stock(&pool, source, product, 6, 0).await;

    let request = svc
        .transfers
        .save_draft(&pool, source, dest, actor(), &[tline(product, 2)], "")
        .await
        .unwrap();
    svc.transfers.send(&pool, request.id, Some(dest)).await.unwrap();

    let err = svc
        .transfers
        .decide(
            &pool,
            request.id,
            TransferDecision::Approve,
            &[],
            actor(),
            Some(dest), // o destino tentando decidir
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[sqlx::test]
async fn rejecting_a_transfer_moves_no_stock(pool: PgPool) {
    let svc = services(&pool);
    let source = create_salespoint(&pool, "Akwa", false).await;
    let dest = create_salespoint(&pool, "Bonaberi", false).await;
    let product = create_product(&pool, "Pneu", 8000, 12000).await;
    seed_stock(&pool, source, product, 6, 0).await;

    let request = svc
        .transfers
        .save_draft(&pool, source, dest, actor(), &[tline(product, 2)], "")
        .await
        .unwrap();
    svc.transfers.send(&pool, request.id, Some(dest)).await.unwrap();

    let rejected = svc
        .transfers
        .decide(&pool, request.id, TransferDecision::Reject, &[], actor(), Some(source))
        .await
        .unwrap();
    assert_eq!(rejected.status, TransferStatus::Rejected);

    let src_row = stock_row(&pool, source, product).await;
    assert_eq!(src_row.transfer_out, 0);
}

#[sqlx::test]
async fn sending_twice_is_an_invalid_transition(pool: PgPool) {
    let svc = services(&pool);
    let source = create_salespoint(&pool, "Akwa", false).await;
    let dest = create_salespoint(&pool, "Bonaberi", false).await;
    let product = create_product(&pool, "Pneu", 8000, 12000).await;
    seed_stock(&pool, source, product, 6, 0).await;

    let request = svc
        .transfers
        .save_draft(&pool, source, dest, actor(), &[tline(product, 2)], "")
        .await
        .unwrap();
    svc.transfers.send(&pool, request.id, Some(dest)).await.unwrap();

    let err = svc
        .transfers
        .send(&pool, request.id, Some(dest))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

// ---
// Reabastecimentos
// ---

#[sqlx::test]
async fn restock_request_roundtrip_with_line_validation(pool: PgPool) {
    let svc = services(&pool);
    let warehouse = create_salespoint(&pool, "Entrepôt Central", true).await;
    let shop = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Óleo 10W40", 2500, 4000).await;
    seed_stock(&pool, warehouse, product, 50, 0).await;

    let manager = actor();
    let request = svc
        .restocks
        .create_request(&pool, shop, manager, &[rline(product, 80)], "reposição mensal")
        .await
        .unwrap();
    assert_eq!(request.status, RestockStatus::Draft);

    let sent = svc.restocks.send_request(&pool, request.id).await.unwrap();
    assert_eq!(sent.status, RestockStatus::Sent);
    assert!(sent.reference.starts_with("WH-RQ-"));
    assert!(sent.reference.ends_with("-0001"));

    // O entreposto concede 80, mas só tem 50 disponíveis: corta em 50 e o
    // concedido sai imediatamente como em-trânsito
    let approved = svc
        .restocks
        .decide(
            &pool,
            request.id,
            RestockDecision::Approve,
            &[RestockGrant {
                product_id: product,
                quantity: 80,
            }],
            actor(),
        )
        .await
        .unwrap();
    assert_eq!(approved.status, RestockStatus::Approved);

    let wh_row = stock_row(&pool, warehouse, product).await;
    assert_eq!(wh_row.transfer_out, 50);
    assert_eq!(wh_row.sold_qty, 0);

    let lines = svc.restocks.list_lines(&pool, request.id).await.unwrap();
    assert_eq!(lines[0].quantity_approved, Some(50));

    // Validação na chegada: o destino credita e o em-trânsito vira venda
    let outcome = svc
        .restocks
        .validate_lines(
            &pool,
            request.id,
            &[ValidatedLineInput {
                line_id: lines[0].id,
                cost_price: Decimal::from(2500),
            }],
            manager,
            Some(shop),
        )
        .await
        .unwrap();
    assert_eq!(outcome.validated_count, 1);
    assert_eq!(outcome.total_value, Decimal::from(125_000));
    assert_eq!(outcome.request.status, RestockStatus::Validated);
    assert!(outcome.request.validated_at.is_some());

    let shop_row = stock_row(&pool, shop, product).await;
    assert_eq!(shop_row.transfer_in, 50);
    assert_eq!(shop_row.remaining_qty(), 50);

    let wh_row = stock_row(&pool, warehouse, product).await;
    assert_eq!(wh_row.transfer_out, 0);
    assert_eq!(wh_row.sold_qty, 50);

    // Auditoria de validação com a foto do estoque antes/depois
    let audits: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM restock_validation_audits WHERE restock_request_id = $1",
    )
    .bind(request.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audits, 1);
    let (before, after): (i32, i32) = sqlx::query_as(
        r#"
        SELECT stock_before_validation, stock_after_validation
        FROM restock_validation_audits WHERE restock_request_id = $1
        "#,
    )
    .bind(request.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(before, 0);
    assert_eq!(after, 50);

    // O pedido fechado não aceita nova validação
    let err = svc
        .restocks
        .validate_lines(
            &pool,
            request.id,
            &[ValidatedLineInput {
                line_id: lines[0].id,
                cost_price: Decimal::from(2500),
            }],
            manager,
            Some(shop),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    let shop_row = stock_row(&pool, shop, product).await;
    assert_eq!(shop_row.transfer_in, 50);
}

#[sqlx::test]
async fn partial_validation_keeps_the_request_partially_validated(pool: PgPool) {
    let svc = services(&pool);
    let warehouse = create_salespoint(&pool, "Entrepôt Central", true).await;
    let shop = create_salespoint(&pool, "Akwa", false).await;
    let oil = create_product(&pool, "Óleo", 2500, 4000).await;
    let filter = create_product(&pool, "Filtro", 1500, 2500).await;
    seed_stock(&pool, warehouse, oil, 30, 0).await;
    seed_stock(&pool, warehouse, filter, 30, 0).await;

    let request = svc
        .restocks
        .warehouse_push(&pool, shop, actor(), 'P', &[rline(oil, 10), rline(filter, 5)])
        .await
        .unwrap();
    assert_eq!(request.status, RestockStatus::Sent);
    assert!(request.reference.starts_with("WH-"));
    assert!(request.reference.contains("-P-"));

    let lines = svc.restocks.list_lines(&pool, request.id).await.unwrap();
    let oil_line = lines.iter().find(|l| l.product_id == oil).unwrap();

    let outcome = svc
        .restocks
        .validate_lines(
            &pool,
            request.id,
            &[ValidatedLineInput {
                line_id: oil_line.id,
                cost_price: Decimal::from(2500),
            }],
            actor(),
            Some(shop),
        )
        .await
        .unwrap();
    assert_eq!(outcome.request.status, RestockStatus::PartiallyValidated);

    // Revalidar a mesma linha não aplica estoque duas vezes
    let again = svc
        .restocks
        .validate_lines(
            &pool,
            request.id,
            &[ValidatedLineInput {
                line_id: oil_line.id,
                cost_price: Decimal::from(2500),
            }],
            actor(),
            Some(shop),
        )
        .await
        .unwrap();
    assert_eq!(again.validated_count, 0);
    let shop_oil = stock_row(&pool, shop, oil).await;
    assert_eq!(shop_oil.transfer_in, 10);

    // Valida a segunda linha: o agregado fecha em "validated"
    let filter_line = lines.iter().find(|l| l.product_id == filter).unwrap();
    let outcome = svc
        .restocks
        .validate_lines(
            &pool,
            request.id,
            &[ValidatedLineInput {
                line_id: filter_line.id,
                cost_price: Decimal::from(1500),
            }],
            actor(),
            Some(shop),
        )
        .await
        .unwrap();
    assert_eq!(outcome.request.status, RestockStatus::Validated);
}

#[sqlx::test]
async fn warehouse_push_preapproves_and_deducts_in_transit(pool: PgPool) {
    let svc = services(&pool);
    let warehouse = create_salespoint(&pool, "Entrepôt Central", true).await;
    let shop = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Corrente", 2000, 3500).await;
    seed_stock(&pool, warehouse, product, 8, 0).await;

    // Pede 20, o entreposto só tem 8: a linha nasce cortada e pré-aprovada
    let request = svc
        .restocks
        .warehouse_push(&pool, shop, actor(), 'P', &[rline(product, 20)])
        .await
        .unwrap();

    let lines = svc.restocks.list_lines(&pool, request.id).await.unwrap();
    assert_eq!(lines[0].quantity_approved, Some(8));

    let wh_row = stock_row(&pool, warehouse, product).await;
    assert_eq!(wh_row.transfer_out, 8);

    let entries = ledger_entries(&pool, warehouse, product).await;
    assert_eq!(entries[0].qty, -8);
    assert_eq!(entries[0].reason, StockTxnReason::RestockSent);
}

#[sqlx::test]
async fn daily_references_increment_within_the_day(pool: PgPool) {
    let svc = services(&pool);
    let warehouse = create_salespoint(&pool, "Entrepôt Central", true).await;
    let shop = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Corrente", 2000, 3500).await;
    seed_stock(&pool, warehouse, product, 100, 0).await;

    let first = svc
        .restocks
        .warehouse_push(&pool, shop, actor(), 'P', &[rline(product, 1)])
        .await
        .unwrap();
    let second = svc
        .restocks
        .warehouse_push(&pool, shop, actor(), 'P', &[rline(product, 1)])
        .await
        .unwrap();

    assert!(first.reference.ends_with("-0001"));
    assert!(second.reference.ends_with("-0002"));
    // Prefixos por tipo têm sequências independentes
    let moto = svc
        .restocks
        .warehouse_push(&pool, shop, actor(), 'M', &[rline(product, 1)])
        .await
        .unwrap();
    assert!(moto.reference.contains("-M-"));
    assert!(moto.reference.ends_with("-0001"));
}

// Referências geradas concorrentemente no mesmo dia/prefixo saem todas
// distintas (as colisões caem na violação de unicidade e tentam de novo).
#[sqlx::test]
async fn concurrent_pushes_get_distinct_references(
    pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let pool = pool_opts
        .max_connections(8)
        .connect_with(connect_opts)
        .await
        .unwrap();
    let svc = services(&pool);
    let warehouse = create_salespoint(&pool, "Entrepôt Central", true).await;
    let shop = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Corrente", 2000, 3500).await;
    seed_stock(&pool, warehouse, product, 100, 0).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let restocks = svc.restocks.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            restocks
                .warehouse_push(&pool, shop, actor(), 'P', &[rline(product, 1)])
                .await
        }));
    }

    let mut references = Vec::new();
    for handle in handles {
        references.push(handle.await.unwrap().unwrap().reference);
    }
    references.sort();
    references.dedup();
    assert_eq!(references.len(), 4);
}
