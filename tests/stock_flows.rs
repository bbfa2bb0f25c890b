// Primitivas atômicas do estoque: reserve / release / commit, invariantes e
// comportamento sob concorrência.

mod common;

use common::*;
use gestock::common::error::AppError;
use gestock::models::inventory::StockTxnReason;
use gestock::models::sales::{PaymentType, SaleKind};
use gestock::services::sales_service::SaleLineInput;
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

#[sqlx::test]
async fn reserve_then_commit_roundtrip(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Filtro de óleo", 1000, 1500).await;
    seed_stock(&pool, sp, product, 10, 2).await;

    let reserved = svc.stock.reserve(&pool, sp, product, 3).await.unwrap();
    assert_eq!(reserved.reserved_qty, 3);
    assert_eq!(reserved.remaining_qty(), 10);
    assert_eq!(reserved.available_qty(), 7);

    let committed = svc
        .stock
        .commit(&pool, sp, product, 3, "AK-010125-P-0001", None, None)
        .await
        .unwrap();
    assert_eq!(committed.reserved_qty, 0);
    assert_eq!(committed.sold_qty, 3);
    assert_eq!(committed.remaining_qty(), 7);

    // O commit sempre vem emparelhado com o lançamento negativo no razão
    let entries = ledger_entries(&pool, sp, product).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].qty, -3);
    assert_eq!(entries[0].reason, StockTxnReason::Sale);
    assert_eq!(entries[0].reference, "AK-010125-P-0001");
}

#[sqlx::test]
async fn reserve_insufficient_stock_fails_and_leaves_row_unchanged(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Vela", 500, 900).await;
    seed_stock(&pool, sp, product, 2, 0).await;

    let err = svc.stock.reserve(&pool, sp, product, 5).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    let row = stock_row(&pool, sp, product).await;
    assert_eq!(row.reserved_qty, 0);
    assert_eq!(row.remaining_qty(), 2);
}

#[sqlx::test]
async fn reserve_rejects_non_positive_quantity(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Vela", 500, 900).await;
    seed_stock(&pool, sp, product, 2, 0).await;

    let err = svc.stock.reserve(&pool, sp, product, 0).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity));
}

#[sqlx::test]
async fn release_clamps_at_zero_on_over_release(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Corrente", 2000, 3500).await;
    seed_stock(&pool, sp, product, 10, 0).await;

    svc.stock.reserve(&pool, sp, product, 3).await.unwrap();
    let released = svc
        .stock
        .release(&pool, sp, product, 100)
        .await
        .unwrap()
        .expect("release com qty positiva devolve a linha");
    assert_eq!(released.reserved_qty, 0);
}

#[sqlx::test]
async fn release_with_non_positive_quantity_is_a_noop(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Corrente", 2000, 3500).await;
    seed_stock(&pool, sp, product, 10, 0).await;

    assert!(svc.stock.release(&pool, sp, product, 0).await.unwrap().is_none());
    assert!(svc.stock.release(&pool, sp, product, -4).await.unwrap().is_none());
}

#[sqlx::test]
async fn commit_without_reservation_fails(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Pneu", 8000, 12000).await;
    seed_stock(&pool, sp, product, 10, 0).await;

    let err = svc
        .stock
        .commit(&pool, sp, product, 1, "X", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientReservation { .. }));

    let row = stock_row(&pool, sp, product).await;
    assert_eq!(row.sold_qty, 0);
}

#[sqlx::test]
async fn rows_are_created_lazily_on_first_reference(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Guidon", 3000, 5000).await;
    // Sem seed: a primeira operação cria a linha zerada

    let err = svc.stock.reserve(&pool, sp, product, 1).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    let row = stock_row(&pool, sp, product).await;
    assert_eq!(row.opening_qty, 0);
    assert_eq!(row.reserved_qty, 0);
}

#[sqlx::test]
async fn ledger_failure_never_blocks_the_stock_movement(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Espelho", 700, 1200).await;
    seed_stock(&pool, sp, product, 5, 0).await;
    svc.stock.reserve(&pool, sp, product, 2).await.unwrap();

    // Quebra a trilha de auditoria de propósito
    sqlx::query("DROP TABLE stock_transactions CASCADE")
        .execute(&pool)
        .await
        .unwrap();

    // A baixa de estoque continua passando; a falha do razão é engolida
    let committed = svc
        .stock
        .commit(&pool, sp, product, 2, "AK-X", None, None)
        .await
        .unwrap();
    assert_eq!(committed.sold_qty, 2);
    assert_eq!(committed.reserved_qty, 0);
}

// N reservas concorrentes sobre o mesmo par nunca concedem mais do que o
// disponível: com 10 disponíveis e 20 pedidos de 1, exatamente 10 passam.
#[sqlx::test]
async fn concurrent_reserves_never_oversell(
    pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) {
    let pool = pool_opts
        .max_connections(10)
        .connect_with(connect_opts)
        .await
        .unwrap();
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product = create_product(&pool, "Bateria", 9000, 15000).await;
    seed_stock(&pool, sp, product, 10, 0).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let stock = svc.stock.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            stock.reserve(&pool, sp, product, 1).await
        }));
    }

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(AppError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("erro inesperado: {other}"),
        }
    }
    assert_eq!(ok, 10);
    assert_eq!(insufficient, 10);

    let row = stock_row(&pool, sp, product).await;
    assert_eq!(row.reserved_qty, 10);
    assert_eq!(row.available_qty(), 0);
    // Invariante: 0 <= reserved <= remaining
    assert!(row.reserved_qty <= row.remaining_qty());
}

// Comportamento assumido dos lotes: cada linha é atômica por si, mas uma
// falha no meio NÃO desfaz as linhas anteriores quando o chamador não segura
// uma transação externa. O fluxo de aprovação de venda embrulha o lote numa
// transação e por isso é tudo-ou-nada; chamado direto, o lote é por-linha.
#[sqlx::test]
async fn batch_commit_without_outer_transaction_is_per_line(pool: PgPool) {
    let svc = services(&pool);
    let sp = create_salespoint(&pool, "Akwa", false).await;
    let product_a = create_product(&pool, "Óleo 10W40", 2500, 4000).await;
    let product_b = create_product(&pool, "Filtro de ar", 1500, 2500).await;
    seed_stock(&pool, sp, product_a, 10, 0).await;
    seed_stock(&pool, sp, product_b, 10, 0).await;

    let seller = actor();
    let sale = svc
        .sales
        .create_draft(
            &pool,
            sp,
            seller,
            SaleKind::Pieces,
            None,
            None,
            PaymentType::Cash,
            &[
                SaleLineInput {
                    product_id: product_a,
                    quantity: 2,
                    unit_price: Decimal::from(4000),
                },
                SaleLineInput {
                    product_id: product_b,
                    quantity: 3,
                    unit_price: Decimal::from(2500),
                },
            ],
        )
        .await
        .unwrap();

    // Sabota a reserva do produto B para forçar a falha da segunda linha
    sqlx::query(
        "UPDATE salespoint_stocks SET reserved_qty = 0 WHERE salespoint_id = $1 AND product_id = $2",
    )
    .bind(sp)
    .bind(product_b)
    .execute(&pool)
    .await
    .unwrap();

    let items = svc.sales.repo().list_items(&pool, sale.id).await.unwrap();
    let item_a = items.iter().find(|i| i.product_id == product_a).unwrap().clone();
    let item_b = items.iter().find(|i| i.product_id == product_b).unwrap().clone();

    let err = svc
        .stock
        .commit_for_sale(&pool, &sale, &[item_a, item_b], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientReservation { .. }));

    // A primeira linha ficou aplicada: comportamento assumido do lote,
    // fixado aqui de propósito.
    let row_a = stock_row(&pool, sp, product_a).await;
    assert_eq!(row_a.sold_qty, 2);
    let row_b = stock_row(&pool, sp, product_b).await;
    assert_eq!(row_b.sold_qty, 0);
}
