//! Stock record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity tuple of a stock record
///
/// The variant bundles the color and brand dimensions of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub variant_id: Uuid,
}

/// Current quantity on hand for one (product, location, variant)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub variant_id: Uuid,
    pub quantity_on_hand: i64,
    pub reorder_threshold: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Uuid>,
    pub modified_at: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl StockRecord {
    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id,
            location_id: self.location_id,
            variant_id: self.variant_id,
        }
    }

    pub fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }
}

/// Payload for inserting a stock record
#[derive(Debug, Clone)]
pub struct NewStockRecord {
    pub key: StockKey,
    pub reorder_threshold: i64,
    pub created_by: Uuid,
}

/// Stock record with its most recent ledger entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecordDetail {
    #[serde(flatten)]
    pub record: StockRecord,
    pub status: super::StockStatus,
    pub recent_entries: Vec<super::LedgerEntry>,
}

/// Result of folding a record's ledger against its stored balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub stock_record_id: Uuid,
    pub quantity_on_hand: i64,
    pub ledger_total: i64,
    pub live_total: i64,
    pub entry_count: i64,
    pub consistent: bool,
}
