//! PostgreSQL implementation of the ledger store
//!
//! Every unit of work is a transaction that holds `FOR UPDATE` on the stock
//! record row. `lock_timeout` is set per transaction so a contended row fails
//! fast with `Busy` instead of queueing indefinitely.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    LedgerEntry, LedgerTotals, MovementKind, NewLedgerEntry, NewStockRecord, Pagination,
    StockRecord,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{CatalogLookup, CatalogRef, LedgerStore, RecordTxn, ReferenceStatus, StockFilter};
use crate::error::{classify_db_error, AppError, AppResult};

const RECORD_COLUMNS: &str = "id, product_id, location_id, variant_id, quantity_on_hand, \
     reorder_threshold, created_by, created_at, modified_by, modified_at, voided_by, voided_at";

const ENTRY_COLUMNS: &str = "id, stock_record_id, kind, quantity_delta, resulting_balance, \
     reason, actor_id, created_at, voided, voided_at, voided_by, reversal_of_entry_id";

/// Row for stock record queries
#[derive(Debug, FromRow)]
struct StockRecordRow {
    id: Uuid,
    product_id: Uuid,
    location_id: Uuid,
    variant_id: Uuid,
    quantity_on_hand: i64,
    reorder_threshold: i64,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    modified_by: Option<Uuid>,
    modified_at: Option<DateTime<Utc>>,
    voided_by: Option<Uuid>,
    voided_at: Option<DateTime<Utc>>,
}

impl From<StockRecordRow> for StockRecord {
    fn from(row: StockRecordRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            variant_id: row.variant_id,
            quantity_on_hand: row.quantity_on_hand,
            reorder_threshold: row.reorder_threshold,
            created_by: row.created_by,
            created_at: row.created_at,
            modified_by: row.modified_by,
            modified_at: row.modified_at,
            voided_by: row.voided_by,
            voided_at: row.voided_at,
        }
    }
}

/// Row for ledger entry queries
#[derive(Debug, FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    stock_record_id: Uuid,
    kind: String,
    quantity_delta: i64,
    resulting_balance: i64,
    reason: String,
    actor_id: Uuid,
    created_at: DateTime<Utc>,
    voided: bool,
    voided_at: Option<DateTime<Utc>>,
    voided_by: Option<Uuid>,
    reversal_of_entry_id: Option<Uuid>,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<MovementKind>()
            .map_err(|e| AppError::Internal(format!("ledger entry {}: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            stock_record_id: row.stock_record_id,
            kind,
            quantity_delta: row.quantity_delta,
            resulting_balance: row.resulting_balance,
            reason: row.reason,
            actor_id: row.actor_id,
            created_at: row.created_at,
            voided: row.voided,
            voided_at: row.voided_at,
            voided_by: row.voided_by,
            reversal_of_entry_id: row.reversal_of_entry_id,
        })
    }
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Start a transaction with a bounded lock wait
    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.db.begin().await?;

        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(tx)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn begin_create(&self, new: NewStockRecord) -> AppResult<Box<dyn RecordTxn>> {
        let mut tx = self.begin().await?;

        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            r#"
            INSERT INTO stock_records (product_id, location_id, variant_id, quantity_on_hand, reorder_threshold, created_by)
            VALUES ($1, $2, $3, 0, $4, $5)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(new.key.product_id)
        .bind(new.key.location_id)
        .bind(new.key.variant_id)
        .bind(new.reorder_threshold)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_db_error)?;

        Ok(Box::new(PgRecordTxn {
            tx,
            record: row.into(),
        }))
    }

    async fn lock_record(&self, record_id: Uuid) -> AppResult<Option<Box<dyn RecordTxn>>> {
        let mut tx = self.begin().await?;

        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE id = $1 FOR UPDATE"
        ))
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify_db_error)?;

        Ok(row.map(|row| {
            Box::new(PgRecordTxn {
                tx,
                record: row.into(),
            }) as Box<dyn RecordTxn>
        }))
    }

    async fn find_record(&self, record_id: Uuid) -> AppResult<Option<StockRecord>> {
        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE id = $1"
        ))
        .bind(record_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_entry(&self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn list_records(&self, filter: &StockFilter) -> AppResult<Vec<StockRecord>> {
        let rows = sqlx::query_as::<_, StockRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM stock_records
            WHERE voided_at IS NULL
              AND ($1::uuid IS NULL OR location_id = $1)
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::uuid IS NULL OR variant_id = $3)
            ORDER BY created_at, id
            "#
        ))
        .bind(filter.location_id)
        .bind(filter.product_id)
        .bind(filter.variant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_entries(
        &self,
        record_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<LedgerEntry>, u64)> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ledger_entries WHERE stock_record_id = $1",
        )
        .bind(record_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE stock_record_id = $1
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(record_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let entries = rows
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((entries, total.max(0) as u64))
    }

    async fn ledger_totals(&self, record_id: Uuid) -> AppResult<LedgerTotals> {
        let (ledger_total, live_total, entry_count) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'outbound' THEN -quantity_delta ELSE quantity_delta END), 0)::BIGINT,
                COALESCE(SUM(
                    CASE WHEN voided OR reversal_of_entry_id IS NOT NULL THEN 0
                         WHEN kind = 'outbound' THEN -quantity_delta
                         ELSE quantity_delta
                    END), 0)::BIGINT,
                COUNT(*)
            FROM ledger_entries
            WHERE stock_record_id = $1
            "#,
        )
        .bind(record_id)
        .fetch_one(&self.db)
        .await?;

        Ok(LedgerTotals {
            ledger_total,
            live_total,
            entry_count,
        })
    }
}

/// Open transaction holding the row lock on one stock record
struct PgRecordTxn {
    tx: Transaction<'static, Postgres>,
    record: StockRecord,
}

#[async_trait]
impl RecordTxn for PgRecordTxn {
    fn record(&self) -> &StockRecord {
        &self.record
    }

    async fn find_entry(&mut self, entry_id: Uuid) -> AppResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1 AND stock_record_id = $2 FOR UPDATE"
        ))
        .bind(entry_id)
        .bind(self.record.id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn set_balance(&mut self, quantity_on_hand: i64, actor_id: Uuid) -> AppResult<()> {
        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            r#"
            UPDATE stock_records
            SET quantity_on_hand = $1, modified_by = $2, modified_at = NOW()
            WHERE id = $3
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(quantity_on_hand)
        .bind(actor_id)
        .bind(self.record.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        self.record = row.into();
        Ok(())
    }

    async fn set_threshold(&mut self, reorder_threshold: i64, actor_id: Uuid) -> AppResult<()> {
        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            r#"
            UPDATE stock_records
            SET reorder_threshold = $1, modified_by = $2, modified_at = NOW()
            WHERE id = $3
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(reorder_threshold)
        .bind(actor_id)
        .bind(self.record.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        self.record = row.into();
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> AppResult<LedgerEntry> {
        let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            r#"
            INSERT INTO ledger_entries (
                stock_record_id, kind, quantity_delta, resulting_balance, reason, actor_id, reversal_of_entry_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(self.record.id)
        .bind(entry.kind.as_str())
        .bind(entry.quantity_delta)
        .bind(entry.resulting_balance)
        .bind(&entry.reason)
        .bind(entry.actor_id)
        .bind(entry.reversal_of_entry_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        row.try_into()
    }

    async fn void_entry(&mut self, entry_id: Uuid, actor_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET voided = TRUE, voided_at = NOW(), voided_by = $1
            WHERE id = $2 AND stock_record_id = $3 AND voided = FALSE
            "#,
        )
        .bind(actor_id)
        .bind(entry_id)
        .bind(self.record.id)
        .execute(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyVoided("Ledger entry".to_string()));
        }

        Ok(())
    }

    async fn void_record(&mut self, actor_id: Uuid) -> AppResult<()> {
        let row = sqlx::query_as::<_, StockRecordRow>(&format!(
            r#"
            UPDATE stock_records
            SET voided_at = NOW(), voided_by = $1, modified_by = $1, modified_at = NOW()
            WHERE id = $2
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(actor_id)
        .bind(self.record.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify_db_error)?;

        self.record = row.into();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<StockRecord> {
        let PgRecordTxn { tx, record } = *self;
        tx.commit().await.map_err(classify_db_error)?;
        Ok(record)
    }
}

/// Catalog lookups against the product, branch and variant tables
#[derive(Clone)]
pub struct PgCatalog {
    db: PgPool,
}

impl PgCatalog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogLookup for PgCatalog {
    async fn status(&self, kind: CatalogRef, id: Uuid) -> AppResult<ReferenceStatus> {
        let table = match kind {
            CatalogRef::Product => "products",
            CatalogRef::Location => "branches",
            CatalogRef::Variant => "variants",
        };

        let active = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT (is_active AND voided_at IS NULL) FROM {table} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(match active {
            Some(true) => ReferenceStatus::Active,
            Some(false) => ReferenceStatus::Voided,
            None => ReferenceStatus::Missing,
        })
    }
}
