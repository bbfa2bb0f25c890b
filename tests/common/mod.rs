// Infraestrutura compartilhada dos testes de integração: monta o gráfico de
// serviços sobre a pool de teste e semeia pontos de venda / produtos / saldos.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use gestock::db::{SalesRepository, StockRepository, TransferRepository};
use gestock::models::inventory::{SalesPointStock, StockTransaction};
use gestock::services::{RestockService, SalesService, StockService, TransferService};

pub struct TestServices {
    pub stock: StockService,
    pub sales: SalesService,
    pub transfers: TransferService,
    pub restocks: RestockService,
}

pub fn services(pool: &PgPool) -> TestServices {
    let stock_repo = StockRepository::new(pool.clone());
    let sales_repo = SalesRepository::new(pool.clone());
    let transfer_repo = TransferRepository::new(pool.clone());

    let stock = StockService::new(stock_repo.clone());
    TestServices {
        sales: SalesService::new(sales_repo, stock_repo.clone(), stock.clone()),
        transfers: TransferService::new(transfer_repo.clone(), stock_repo.clone(), stock.clone()),
        restocks: RestockService::new(transfer_repo, stock_repo, stock.clone()),
        stock,
    }
}

pub async fn create_salespoint(pool: &PgPool, name: &str, is_warehouse: bool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO salespoints (name, is_warehouse) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(is_warehouse)
    .fetch_one(pool)
    .await
    .expect("falha ao criar ponto de venda")
}

pub async fn create_product(pool: &PgPool, name: &str, cost: i64, price: i64) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO products (name, cost_price, selling_price) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(Decimal::from(cost))
    .bind(Decimal::from(price))
    .fetch_one(pool)
    .await
    .expect("falha ao criar produto")
}

pub async fn seed_stock(
    pool: &PgPool,
    salespoint_id: Uuid,
    product_id: Uuid,
    opening_qty: i32,
    alert_qty: i32,
) {
    sqlx::query(
        r#"
        INSERT INTO salespoint_stocks (salespoint_id, product_id, opening_qty, alert_qty)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(salespoint_id)
    .bind(product_id)
    .bind(opening_qty)
    .bind(alert_qty)
    .execute(pool)
    .await
    .expect("falha ao semear estoque");
}

pub async fn stock_row(pool: &PgPool, salespoint_id: Uuid, product_id: Uuid) -> SalesPointStock {
    sqlx::query_as::<_, SalesPointStock>(
        "SELECT * FROM salespoint_stocks WHERE salespoint_id = $1 AND product_id = $2",
    )
    .bind(salespoint_id)
    .bind(product_id)
    .fetch_one(pool)
    .await
    .expect("linha de estoque ausente")
}

pub async fn ledger_entries(
    pool: &PgPool,
    salespoint_id: Uuid,
    product_id: Uuid,
) -> Vec<StockTransaction> {
    sqlx::query_as::<_, StockTransaction>(
        r#"
        SELECT * FROM stock_transactions
        WHERE salespoint_id = $1 AND product_id = $2
        ORDER BY created_at, id
        "#,
    )
    .bind(salespoint_id)
    .bind(product_id)
    .fetch_all(pool)
    .await
    .expect("falha ao ler o livro-razão")
}

pub fn actor() -> Uuid {
    Uuid::new_v4()
}
