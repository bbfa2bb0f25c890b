pub mod stock_service;
pub use stock_service::StockService;
pub mod sales_service;
pub use sales_service::SalesService;
pub mod transfer_service;
pub use transfer_service::TransferService;
pub mod restock_service;
pub use restock_service::RestockService;
