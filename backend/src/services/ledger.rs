//! Ledger engine: applies and reverses stock movements
//!
//! Every operation runs as one unit of work against a locked stock record:
//! the balance check, the new balance and the ledger entry are committed
//! together or not at all. One audit event is emitted per outcome, after the
//! unit has finished.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use shared::{
    normalize_reason, BalanceError, LedgerEntry, Movement, MovementKind, NewLedgerEntry,
    StockRecord,
};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditHook};
use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, RecordTxn};

/// Ledger engine
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    audit: AuditHook,
    config: LedgerConfig,
}

/// Input for recording a movement
///
/// `quantity` is a positive magnitude for inbound and outbound movements and
/// a signed value for adjustments.
#[derive(Debug, Clone, Deserialize)]
pub struct MovementInput {
    pub stock_record_id: Uuid,
    pub kind: String,
    pub quantity: i64,
    pub reason: String,
}

/// Input for reversing a ledger entry
#[derive(Debug, Clone, Deserialize)]
pub struct ReverseInput {
    pub reason: String,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(store: Arc<dyn LedgerStore>, audit: AuditHook, config: LedgerConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Record an inbound, outbound or adjustment movement
    #[tracing::instrument(skip(self, input), fields(record_id = %input.stock_record_id, kind = %input.kind))]
    pub async fn apply_movement(
        &self,
        actor_id: Uuid,
        input: MovementInput,
    ) -> AppResult<LedgerEntry> {
        let record_id = input.stock_record_id;
        let description = format!(
            "{} {} on stock record {}",
            input.kind, input.quantity, record_id
        );

        let result = bounded(&self.config, self.apply_unit(actor_id, input)).await;

        self.audit.emit(AuditEvent::for_result(
            AuditAction::ApplyMovement,
            actor_id,
            "stock_record",
            Some(record_id),
            description,
            &result,
        ));

        if let Ok(entry) = &result {
            tracing::info!(
                entry_id = %entry.id,
                balance = entry.resulting_balance,
                "Movement recorded"
            );
        }

        result
    }

    async fn apply_unit(&self, actor_id: Uuid, input: MovementInput) -> AppResult<LedgerEntry> {
        let kind = input
            .kind
            .parse::<MovementKind>()
            .map_err(|_| AppError::InvalidKind(input.kind.clone()))?;
        let movement = Movement::new(kind, input.quantity)
            .map_err(|msg| AppError::InvalidQuantity(msg.to_string()))?;
        let reason =
            normalize_reason(&input.reason).map_err(|msg| AppError::InvalidReason(msg.to_string()))?;

        let mut txn = self
            .store
            .lock_record(input.stock_record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;
        ensure_active(txn.record())?;

        let new_balance = next_balance(txn.record(), movement)?;
        let entry =
            persist_movement(txn.as_mut(), movement, new_balance, reason, actor_id, None).await?;

        txn.commit().await?;
        Ok(entry)
    }

    /// Compensate a past entry with a new opposite entry and void the original
    #[tracing::instrument(skip(self, input), fields(entry_id = %entry_id))]
    pub async fn reverse_movement(
        &self,
        actor_id: Uuid,
        entry_id: Uuid,
        input: ReverseInput,
    ) -> AppResult<LedgerEntry> {
        let result = bounded(&self.config, self.reverse_unit(actor_id, entry_id, input)).await;

        self.audit.emit(AuditEvent::for_result(
            AuditAction::ReverseMovement,
            actor_id,
            "ledger_entry",
            Some(entry_id),
            format!("reverse ledger entry {}", entry_id),
            &result,
        ));

        if let Ok(entry) = &result {
            tracing::info!(
                reversal_id = %entry.id,
                balance = entry.resulting_balance,
                "Movement reversed"
            );
        }

        result
    }

    async fn reverse_unit(
        &self,
        actor_id: Uuid,
        entry_id: Uuid,
        input: ReverseInput,
    ) -> AppResult<LedgerEntry> {
        let reason =
            normalize_reason(&input.reason).map_err(|msg| AppError::InvalidReason(msg.to_string()))?;

        let original = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ledger entry".to_string()))?;
        ensure_reversible(&original)?;

        let mut txn = self
            .store
            .lock_record(original.stock_record_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock record".to_string()))?;
        ensure_active(txn.record())?;

        // the first read was unlocked; a concurrent reversal may have won since
        let original = txn
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ledger entry".to_string()))?;
        ensure_reversible(&original)?;

        let compensation = original.compensating_movement();
        let new_balance = next_balance(txn.record(), compensation)?;

        txn.void_entry(entry_id, actor_id).await?;
        let reversal = persist_movement(
            txn.as_mut(),
            compensation,
            new_balance,
            reason,
            actor_id,
            Some(entry_id),
        )
        .await?;

        txn.commit().await?;
        Ok(reversal)
    }

    /// Get a single ledger entry
    pub async fn get_entry(&self, entry_id: Uuid) -> AppResult<LedgerEntry> {
        self.store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Ledger entry".to_string()))
    }
}

/// Run a unit of work under the configured upper bound.
///
/// On expiry the unit's future is dropped, which rolls its transaction back.
pub(crate) async fn bounded<T, F>(config: &LedgerConfig, unit: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(config.unit_timeout(), unit).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.unit_timeout_ms,
                "Ledger unit of work timed out"
            );
            Err(AppError::Timeout)
        }
    }
}

pub(crate) fn ensure_active(record: &StockRecord) -> AppResult<()> {
    if record.is_voided() {
        return Err(AppError::Voided("Stock record".to_string()));
    }
    Ok(())
}

fn ensure_reversible(entry: &LedgerEntry) -> AppResult<()> {
    if entry.is_reversal() {
        return Err(AppError::ChainedReversal);
    }
    if entry.voided {
        return Err(AppError::AlreadyVoided("Ledger entry".to_string()));
    }
    Ok(())
}

pub(crate) fn next_balance(record: &StockRecord, movement: Movement) -> AppResult<i64> {
    movement
        .resulting_balance(record.quantity_on_hand)
        .map_err(|e| match e {
            BalanceError::Insufficient {
                available,
                requested,
            } => AppError::InsufficientStock {
                available,
                requested,
            },
            BalanceError::Overflow => {
                AppError::InvalidQuantity("Resulting balance is out of range".to_string())
            }
        })
}

/// Write the new balance and its ledger entry inside an open unit
pub(crate) async fn persist_movement(
    txn: &mut dyn RecordTxn,
    movement: Movement,
    new_balance: i64,
    reason: String,
    actor_id: Uuid,
    reversal_of_entry_id: Option<Uuid>,
) -> AppResult<LedgerEntry> {
    txn.set_balance(new_balance, actor_id).await?;
    txn.append_entry(NewLedgerEntry {
        kind: movement.kind,
        quantity_delta: movement.quantity_delta,
        resulting_balance: new_balance,
        reason,
        actor_id,
        reversal_of_entry_id,
    })
    .await
}
