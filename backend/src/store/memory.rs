//! In-process ledger store
//!
//! Each stock record owns a `tokio::sync::Mutex` that plays the role of the
//! row lock, next to the last committed state. A unit of work holds the mutex,
//! stages its writes and publishes them to the committed state on `commit`.
//! Reads only ever look at committed state and never wait for a unit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    LedgerEntry, LedgerTotals, NewLedgerEntry, NewStockRecord, Pagination, StockKey, StockRecord,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{CatalogLookup, CatalogRef, LedgerStore, RecordTxn, ReferenceStatus, StockFilter};
use crate::error::{AppError, AppResult};

#[derive(Debug)]
struct Slot {
    /// Held for the lifetime of a unit of work
    writer: Arc<Mutex<()>>,
    committed: RwLock<Committed>,
}

#[derive(Debug)]
struct Committed {
    record: StockRecord,
    /// Append order
    entries: Vec<LedgerEntry>,
}

impl Slot {
    fn new(record: StockRecord) -> Self {
        Self {
            writer: Arc::new(Mutex::new(())),
            committed: RwLock::new(Committed {
                record,
                entries: Vec::new(),
            }),
        }
    }
}

#[derive(Default)]
struct Index {
    records: HashMap<Uuid, Arc<Slot>>,
    /// Key of every non-voided record
    active_keys: HashMap<StockKey, Uuid>,
    entry_owner: HashMap<Uuid, Uuid>,
}

/// Ledger store kept entirely in memory
#[derive(Clone)]
pub struct MemoryLedgerStore {
    index: Arc<RwLock<Index>>,
    lock_timeout: Duration,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl MemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            lock_timeout,
        }
    }

    async fn slot(&self, record_id: Uuid) -> Option<Arc<Slot>> {
        self.index.read().await.records.get(&record_id).cloned()
    }

    async fn acquire(&self, slot: &Slot) -> AppResult<OwnedMutexGuard<()>> {
        tokio::time::timeout(self.lock_timeout, slot.writer.clone().lock_owned())
            .await
            .map_err(|_| AppError::Busy)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn begin_create(&self, new: NewStockRecord) -> AppResult<Box<dyn RecordTxn>> {
        if self.index.read().await.active_keys.contains_key(&new.key) {
            return Err(AppError::DuplicateRecord);
        }

        let record = StockRecord {
            id: Uuid::new_v4(),
            product_id: new.key.product_id,
            location_id: new.key.location_id,
            variant_id: new.key.variant_id,
            quantity_on_hand: 0,
            reorder_threshold: new.reorder_threshold,
            created_by: new.created_by,
            created_at: Utc::now(),
            modified_by: None,
            modified_at: None,
            voided_by: None,
            voided_at: None,
        };

        let slot = Arc::new(Slot::new(record.clone()));
        let writer = slot.writer.clone().lock_owned().await;

        Ok(Box::new(MemoryRecordTxn {
            index: self.index.clone(),
            slot,
            _writer: writer,
            working: record,
            appended: Vec::new(),
            voided: Vec::new(),
            is_new: true,
        }))
    }

    async fn lock_record(&self, record_id: Uuid) -> AppResult<Option<Box<dyn RecordTxn>>> {
        let Some(slot) = self.slot(record_id).await else {
            return Ok(None);
        };
        let writer = self.acquire(&slot).await?;
        let working = slot.committed.read().await.record.clone();

        Ok(Some(Box::new(MemoryRecordTxn {
            index: self.index.clone(),
            slot,
            _writer: writer,
            working,
            appended: Vec::new(),
            voided: Vec::new(),
            is_new: false,
        })))
    }

    async fn find_record(&self, record_id: Uuid) -> AppResult<Option<StockRecord>> {
        match self.slot(record_id).await {
            Some(slot) => Ok(Some(slot.committed.read().await.record.clone())),
            None => Ok(None),
        }
    }

    async fn find_entry(&self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>> {
        let owner = self.index.read().await.entry_owner.get(&entry_id).copied();
        let Some(record_id) = owner else {
            return Ok(None);
        };
        let Some(slot) = self.slot(record_id).await else {
            return Ok(None);
        };

        let committed = slot.committed.read().await;
        Ok(committed.entries.iter().find(|e| e.id == entry_id).cloned())
    }

    async fn list_records(&self, filter: &StockFilter) -> AppResult<Vec<StockRecord>> {
        let slots: Vec<Arc<Slot>> = self.index.read().await.records.values().cloned().collect();

        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            let committed = slot.committed.read().await;
            if !committed.record.is_voided() && filter.matches(&committed.record) {
                records.push(committed.record.clone());
            }
        }

        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn list_entries(
        &self,
        record_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<LedgerEntry>, u64)> {
        let Some(slot) = self.slot(record_id).await else {
            return Ok((Vec::new(), 0));
        };

        let committed = slot.committed.read().await;
        let page = committed
            .entries
            .iter()
            .rev()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect();

        Ok((page, committed.entries.len() as u64))
    }

    async fn ledger_totals(&self, record_id: Uuid) -> AppResult<LedgerTotals> {
        match self.slot(record_id).await {
            Some(slot) => Ok(LedgerTotals::fold(&slot.committed.read().await.entries)),
            None => Ok(LedgerTotals::default()),
        }
    }
}

struct MemoryRecordTxn {
    index: Arc<RwLock<Index>>,
    slot: Arc<Slot>,
    _writer: OwnedMutexGuard<()>,
    working: StockRecord,
    appended: Vec<LedgerEntry>,
    /// (entry, actor, when)
    voided: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    is_new: bool,
}

impl MemoryRecordTxn {
    /// Entry as seen through the staged writes
    async fn staged_entry(&self, entry_id: Uuid) -> Option<LedgerEntry> {
        let mut entry = self
            .slot
            .committed
            .read()
            .await
            .entries
            .iter()
            .chain(self.appended.iter())
            .find(|e| e.id == entry_id)
            .cloned()?;

        if let Some((_, actor_id, at)) = self.voided.iter().find(|(id, _, _)| *id == entry_id) {
            entry.voided = true;
            entry.voided_at = Some(*at);
            entry.voided_by = Some(*actor_id);
        }

        Some(entry)
    }

    fn touch(&mut self, actor_id: Uuid) {
        self.working.modified_by = Some(actor_id);
        self.working.modified_at = Some(Utc::now());
    }
}

#[async_trait]
impl RecordTxn for MemoryRecordTxn {
    fn record(&self) -> &StockRecord {
        &self.working
    }

    async fn find_entry(&mut self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>> {
        Ok(self.staged_entry(entry_id).await)
    }

    async fn set_balance(&mut self, quantity_on_hand: i64, actor_id: Uuid) -> AppResult<()> {
        if quantity_on_hand < 0 {
            return Err(AppError::Internal(format!(
                "refusing negative balance {} on stock record {}",
                quantity_on_hand, self.working.id
            )));
        }
        self.working.quantity_on_hand = quantity_on_hand;
        self.touch(actor_id);
        Ok(())
    }

    async fn set_threshold(&mut self, reorder_threshold: i64, actor_id: Uuid) -> AppResult<()> {
        self.working.reorder_threshold = reorder_threshold;
        self.touch(actor_id);
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> AppResult<LedgerEntry> {
        if let Some(original) = entry.reversal_of_entry_id {
            let taken = self
                .slot
                .committed
                .read()
                .await
                .entries
                .iter()
                .chain(self.appended.iter())
                .any(|e| e.reversal_of_entry_id == Some(original));
            if taken {
                return Err(AppError::AlreadyVoided("Ledger entry".to_string()));
            }
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            stock_record_id: self.working.id,
            kind: entry.kind,
            quantity_delta: entry.quantity_delta,
            resulting_balance: entry.resulting_balance,
            reason: entry.reason,
            actor_id: entry.actor_id,
            created_at: Utc::now(),
            voided: false,
            voided_at: None,
            voided_by: None,
            reversal_of_entry_id: entry.reversal_of_entry_id,
        };
        self.appended.push(entry.clone());
        Ok(entry)
    }

    async fn void_entry(&mut self, entry_id: Uuid, actor_id: Uuid) -> AppResult<()> {
        match self.staged_entry(entry_id).await {
            None => Err(AppError::NotFound("Ledger entry".to_string())),
            Some(entry) if entry.voided => Err(AppError::AlreadyVoided("Ledger entry".to_string())),
            Some(_) => {
                self.voided.push((entry_id, actor_id, Utc::now()));
                Ok(())
            }
        }
    }

    async fn void_record(&mut self, actor_id: Uuid) -> AppResult<()> {
        let now = Utc::now();
        self.working.voided_at = Some(now);
        self.working.voided_by = Some(actor_id);
        self.working.modified_at = Some(now);
        self.working.modified_by = Some(actor_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<StockRecord> {
        let MemoryRecordTxn {
            index,
            slot,
            _writer,
            working,
            mut appended,
            voided,
            is_new,
        } = *self;

        let mut index = index.write().await;

        if is_new {
            if index.active_keys.contains_key(&working.key()) {
                return Err(AppError::DuplicateRecord);
            }
            index.records.insert(working.id, slot.clone());
            index.active_keys.insert(working.key(), working.id);
        }

        if working.is_voided() && index.active_keys.get(&working.key()) == Some(&working.id) {
            index.active_keys.remove(&working.key());
        }

        let mut committed = slot.committed.write().await;

        for (entry_id, actor_id, at) in voided {
            let target = committed
                .entries
                .iter_mut()
                .chain(appended.iter_mut())
                .find(|e| e.id == entry_id);
            if let Some(entry) = target {
                entry.voided = true;
                entry.voided_at = Some(at);
                entry.voided_by = Some(actor_id);
            }
        }

        for entry in appended {
            index.entry_owner.insert(entry.id, working.id);
            committed.entries.push(entry);
        }

        committed.record = working.clone();
        Ok(working)
    }
}

/// Catalog held in memory; unknown ids resolve to `default_status`
pub struct MemoryCatalog {
    entries: RwLock<HashMap<(CatalogRef, Uuid), ReferenceStatus>>,
    default_status: ReferenceStatus,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_status: ReferenceStatus::Missing,
        }
    }
}

impl MemoryCatalog {
    /// Catalog that treats every unknown reference as active
    pub fn permissive() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_status: ReferenceStatus::Active,
        }
    }

    pub async fn set(&self, kind: CatalogRef, id: Uuid, status: ReferenceStatus) {
        self.entries.write().await.insert((kind, id), status);
    }

    /// Register product, location and variant of a key as active
    pub async fn register(&self, key: StockKey) {
        let mut entries = self.entries.write().await;
        entries.insert((CatalogRef::Product, key.product_id), ReferenceStatus::Active);
        entries.insert((CatalogRef::Location, key.location_id), ReferenceStatus::Active);
        entries.insert((CatalogRef::Variant, key.variant_id), ReferenceStatus::Active);
    }
}

#[async_trait]
impl CatalogLookup for MemoryCatalog {
    async fn status(&self, kind: CatalogRef, id: Uuid) -> AppResult<ReferenceStatus> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(kind, id))
            .copied()
            .unwrap_or(self.default_status))
    }
}
