//! Storage seams for stock records, the movement ledger and catalog lookups
//!
//! A [`LedgerStore`] hands out [`RecordTxn`] units of work. A unit holds the
//! row lock on exactly one stock record until it is committed or dropped;
//! dropping without `commit` discards every staged write.

use async_trait::async_trait;
use shared::{LedgerEntry, LedgerTotals, NewLedgerEntry, NewStockRecord, Pagination, StockRecord};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCatalog, MemoryLedgerStore};
pub use postgres::{PgCatalog, PgLedgerStore};

/// Filters for listing stock records
#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub location_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
}

impl StockFilter {
    pub fn matches(&self, record: &StockRecord) -> bool {
        self.location_id.map_or(true, |id| record.location_id == id)
            && self.product_id.map_or(true, |id| record.product_id == id)
            && self.variant_id.map_or(true, |id| record.variant_id == id)
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Check that the backing store is reachable
    async fn ping(&self) -> AppResult<()>;

    /// Open a unit of work around a brand new stock record.
    ///
    /// Fails with `DuplicateRecord` when a non-voided record already holds the key.
    async fn begin_create(&self, new: NewStockRecord) -> AppResult<Box<dyn RecordTxn>>;

    /// Lock an existing stock record, voided or not. `None` when it does not exist.
    async fn lock_record(&self, record_id: Uuid) -> AppResult<Option<Box<dyn RecordTxn>>>;

    async fn find_record(&self, record_id: Uuid) -> AppResult<Option<StockRecord>>;

    async fn find_entry(&self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>>;

    /// Non-voided records matching the filter, oldest first
    async fn list_records(&self, filter: &StockFilter) -> AppResult<Vec<StockRecord>>;

    /// Entries of one record, newest first
    async fn list_entries(
        &self,
        record_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<LedgerEntry>, u64)>;

    async fn ledger_totals(&self, record_id: Uuid) -> AppResult<LedgerTotals>;
}

/// A locked stock record plus staged writes
#[async_trait]
pub trait RecordTxn: Send {
    /// The record as it looks with staged writes applied
    fn record(&self) -> &StockRecord;

    /// Read an entry of the locked record
    async fn find_entry(&mut self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>>;

    async fn set_balance(&mut self, quantity_on_hand: i64, actor_id: Uuid) -> AppResult<()>;

    async fn set_threshold(&mut self, reorder_threshold: i64, actor_id: Uuid) -> AppResult<()>;

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> AppResult<LedgerEntry>;

    /// Flip `voided` on an entry of the locked record
    async fn void_entry(&mut self, entry_id: Uuid, actor_id: Uuid) -> AppResult<()>;

    async fn void_record(&mut self, actor_id: Uuid) -> AppResult<()>;

    /// Make every staged write visible and release the lock
    async fn commit(self: Box<Self>) -> AppResult<StockRecord>;
}

/// Referenced catalog entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogRef {
    Product,
    Location,
    Variant,
}

impl CatalogRef {
    pub fn label(&self) -> &'static str {
        match self {
            CatalogRef::Product => "Product",
            CatalogRef::Location => "Location",
            CatalogRef::Variant => "Variant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStatus {
    Active,
    Voided,
    Missing,
}

/// Existence checks against the product, branch and variant catalog
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn status(&self, kind: CatalogRef, id: Uuid) -> AppResult<ReferenceStatus>;
}
