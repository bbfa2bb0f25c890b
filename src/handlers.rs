pub mod restocks;
pub mod sales;
pub mod stock;
pub mod transfers;
