// src/config.rs

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

use crate::{
    db::{SalesRepository, StockRepository, TransferRepository},
    services::{RestockService, SalesService, StockService, TransferService},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_secret: String,
    pub stock_service: StockService,
    pub sales_service: SalesService,
    pub transfer_service: TransferService,
    pub restock_service: RestockService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let stock_repo = StockRepository::new(db_pool.clone());
        let sales_repo = SalesRepository::new(db_pool.clone());
        let transfer_repo = TransferRepository::new(db_pool.clone());

        let stock_service = StockService::new(stock_repo.clone());
        let sales_service =
            SalesService::new(sales_repo, stock_repo.clone(), stock_service.clone());
        let transfer_service =
            TransferService::new(transfer_repo.clone(), stock_repo.clone(), stock_service.clone());
        let restock_service = RestockService::new(transfer_repo, stock_repo, stock_service.clone());

        Ok(Self {
            db_pool,
            jwt_secret,
            stock_service,
            sales_service,
            transfer_service,
            restock_service,
        })
    }
}
