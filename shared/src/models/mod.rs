//! Domain models for the inventory ledger

mod alert;
mod ledger;
mod stock;

pub use alert::*;
pub use ledger::*;
pub use stock::*;
