//! Business logic services for the inventory ledger

pub mod alerts;
pub mod ledger;
pub mod stock;

pub use alerts::AlertService;
pub use ledger::LedgerService;
pub use stock::StockService;
