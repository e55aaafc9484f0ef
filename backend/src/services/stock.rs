//! Stock record service: lifecycle of (product, location, variant) balances

use std::sync::Arc;

use serde::Deserialize;
use shared::{
    validate_pagination, LedgerEntry, Movement, MovementKind, NewStockRecord,
    PaginatedResponse, Pagination, PaginationMeta, Reconciliation, StockKey, StockRecord,
    StockRecordDetail, StockStatus,
};
use uuid::Uuid;
use validator::Validate;

use super::ledger::{bounded, ensure_active, next_balance, persist_movement};
use crate::audit::{AuditAction, AuditEvent, AuditHook};
use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{CatalogLookup, CatalogRef, LedgerStore, ReferenceStatus, StockFilter};

const OPENING_REASON: &str = "Initial stock";

/// Stock record service
#[derive(Clone)]
pub struct StockService {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<dyn CatalogLookup>,
    audit: AuditHook,
    config: LedgerConfig,
}

/// Input for creating a stock record
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStockInput {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub variant_id: Uuid,
    #[serde(default)]
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "Reorder threshold cannot be negative"))]
    pub reorder_threshold: i64,
}

/// Input for updating a stock record.
///
/// Quantity only changes through movements.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateStockInput {
    #[validate(range(min = 0, message = "Reorder threshold cannot be negative"))]
    pub reorder_threshold: i64,
}

/// Query parameters for listing stock records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockQuery {
    pub location_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    /// `low`, `out` or `normal`
    pub status: Option<String>,
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<dyn CatalogLookup>,
        audit: AuditHook,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            audit,
            config,
        }
    }

    /// Create a stock record, writing an opening inbound entry when it starts with stock
    #[tracing::instrument(skip(self, input), fields(product_id = %input.product_id, location_id = %input.location_id))]
    pub async fn create(&self, actor_id: Uuid, input: CreateStockInput) -> AppResult<StockRecord> {
        let description = format!(
            "create stock record for product {} at location {}",
            input.product_id, input.location_id
        );

        let result = bounded(&self.config, self.create_unit(actor_id, input)).await;

        self.audit.emit(AuditEvent::for_result(
            AuditAction::CreateStock,
            actor_id,
            "stock_record",
            result.as_ref().ok().map(|r| r.id),
            description,
            &result,
        ));

        if let Ok(record) = &result {
            tracing::info!(record_id = %record.id, quantity = record.quantity_on_hand, "Stock record created");
        }

        result
    }

    async fn create_unit(&self, actor_id: Uuid, input: CreateStockInput) -> AppResult<StockRecord> {
        input.validate()?;

        let key = StockKey {
            product_id: input.product_id,
            location_id: input.location_id,
            variant_id: input.variant_id,
        };
        self.ensure_references(&key).await?;

        let mut txn = self
            .store
            .begin_create(NewStockRecord {
                key,
                reorder_threshold: input.reorder_threshold,
                created_by: actor_id,
            })
            .await?;

        if input.quantity > 0 {
            let opening = Movement::new(MovementKind::Inbound, input.quantity)
                .map_err(|msg| AppError::InvalidQuantity(msg.to_string()))?;
            let balance = next_balance(txn.record(), opening)?;
            persist_movement(
                txn.as_mut(),
                opening,
                balance,
                OPENING_REASON.to_string(),
                actor_id,
                None,
            )
            .await?;
        }

        txn.commit().await
    }

    /// Product, location and variant must all exist and be active
    async fn ensure_references(&self, key: &StockKey) -> AppResult<()> {
        for (kind, id) in [
            (CatalogRef::Product, key.product_id),
            (CatalogRef::Location, key.location_id),
            (CatalogRef::Variant, key.variant_id),
        ] {
            match self.catalog.status(kind, id).await? {
                ReferenceStatus::Active => {}
                ReferenceStatus::Voided => return Err(AppError::Voided(kind.label().to_string())),
                ReferenceStatus::Missing => {
                    return Err(AppError::NotFound(kind.label().to_string()))
                }
            }
        }
        Ok(())
    }

    /// Update the reorder threshold of a stock record
    #[tracing::instrument(skip(self, input))]
    pub async fn update(
        &self,
        actor_id: Uuid,
        record_id: Uuid,
        input: UpdateStockInput,
    ) -> AppResult<StockRecord> {
        let description = format!(
            "set reorder threshold to {} on stock record {}",
            input.reorder_threshold, record_id
        );

        let result = bounded(&self.config, async {
            input.validate()?;

            let mut txn = self
                .store
                .lock_record(record_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;
            ensure_active(txn.record())?;

            txn.set_threshold(input.reorder_threshold, actor_id).await?;
            txn.commit().await
        })
        .await;

        self.audit.emit(AuditEvent::for_result(
            AuditAction::UpdateStock,
            actor_id,
            "stock_record",
            Some(record_id),
            description,
            &result,
        ));

        result
    }

    /// Void a stock record. Only allowed once its balance is zero.
    #[tracing::instrument(skip(self))]
    pub async fn void(&self, actor_id: Uuid, record_id: Uuid) -> AppResult<StockRecord> {
        let result = bounded(&self.config, async {
            let mut txn = self
                .store
                .lock_record(record_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;

            let record = txn.record();
            if record.is_voided() {
                return Err(AppError::AlreadyVoided("Stock record".to_string()));
            }
            if record.quantity_on_hand != 0 {
                return Err(AppError::HasStock(record.quantity_on_hand));
            }

            txn.void_record(actor_id).await?;
            txn.commit().await
        })
        .await;

        self.audit.emit(AuditEvent::for_result(
            AuditAction::VoidStock,
            actor_id,
            "stock_record",
            Some(record_id),
            format!("void stock record {}", record_id),
            &result,
        ));

        if result.is_ok() {
            tracing::info!(record_id = %record_id, "Stock record voided");
        }

        result
    }

    /// Get a stock record with its status and latest entries
    pub async fn get(&self, record_id: Uuid) -> AppResult<StockRecordDetail> {
        let record = self
            .store
            .find_record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;
        ensure_active(&record)?;

        let recent = Pagination {
            page: 1,
            per_page: self.config.recent_entries.max(1),
        };
        let (recent_entries, _) = self.store.list_entries(record_id, &recent).await?;

        Ok(StockRecordDetail {
            status: StockStatus::of(&record),
            record,
            recent_entries,
        })
    }

    /// List non-voided stock records
    pub async fn list(&self, query: StockQuery) -> AppResult<Vec<StockRecord>> {
        let status = match query.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(StockStatus::from_filter(raw).ok_or_else(|| {
                AppError::ValidationError(format!("Unknown stock status filter: {}", raw))
            })?),
        };

        let filter = StockFilter {
            location_id: query.location_id,
            product_id: query.product_id,
            variant_id: query.variant_id,
        };

        let records = self.store.list_records(&filter).await?;

        Ok(match status {
            Some(status) => records
                .into_iter()
                .filter(|r| StockStatus::of(r) == status)
                .collect(),
            None => records,
        })
    }

    /// Page through a record's ledger, newest entry first
    pub async fn entries(
        &self,
        record_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<LedgerEntry>> {
        validate_pagination(&pagination).map_err(|msg| AppError::ValidationError(msg.to_string()))?;

        if self.store.find_record(record_id).await?.is_none() {
            return Err(AppError::NotFound("Stock record".to_string()));
        }

        let (data, total) = self.store.list_entries(record_id, &pagination).await?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total),
        })
    }

    /// Fold the ledger and compare it with the stored balance
    pub async fn reconcile(&self, record_id: Uuid) -> AppResult<Reconciliation> {
        let record = self
            .store
            .find_record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;

        let totals = self.store.ledger_totals(record_id).await?;
        let consistent = totals.matches(record.quantity_on_hand);

        if !consistent {
            tracing::error!(
                record_id = %record_id,
                quantity_on_hand = record.quantity_on_hand,
                ledger_total = totals.ledger_total,
                live_total = totals.live_total,
                "Stock record balance disagrees with its ledger"
            );
        }

        Ok(Reconciliation {
            stock_record_id: record_id,
            quantity_on_hand: record.quantity_on_hand,
            ledger_total: totals.ledger_total,
            live_total: totals.live_total,
            entry_count: totals.entry_count,
            consistent,
        })
    }
}
