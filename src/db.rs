pub mod stock_repo;
pub use stock_repo::StockRepository;
pub mod sales_repo;
pub use sales_repo::SalesRepository;
pub mod transfer_repo;
pub use transfer_repo::TransferRepository;
